//! Error types for the CropLedger gateway.
//!
//! All errors use the `LG_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Session / provider errors
//! - 2xx: Transaction execution errors
//! - 3xx: State-guard and ownership errors
//! - 4xx: Decoding / amount errors
//! - 9xx: Configuration errors

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Address, ContractName, ListingId, NetworkId, TokenId, TxHash};

/// Central error enum for all gateway operations.
///
/// Every public operation returns `Result<T, LedgerError>` so the UI layer
/// can branch on the failure kind instead of parsing messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    // =================================================================
    // Session / Provider Errors (1xx)
    // =================================================================
    /// No key/session provider is reachable.
    #[error("LG_ERR_100: No provider found")]
    NoProviderFound,

    /// The user explicitly declined the request in their wallet.
    #[error("LG_ERR_101: Request rejected by user")]
    UserRejected,

    /// A connect request is already in flight.
    #[error("LG_ERR_102: Connect request already pending")]
    AlreadyPending,

    /// The operation needs a connected account.
    #[error("LG_ERR_103: Session not connected")]
    NotConnected,

    /// Switching the provider's active network failed after registration.
    #[error("LG_ERR_104: Network switch to {network} failed: {reason}")]
    NetworkSwitchFailed { network: NetworkId, reason: String },

    /// The network is not in the local profile registry.
    #[error("LG_ERR_105: Unsupported network: {0}")]
    UnsupportedNetwork(NetworkId),

    // =================================================================
    // Execution Errors (2xx)
    // =================================================================
    /// The contract has no deployment on the selected network.
    #[error("LG_ERR_200: Contract {contract} unavailable on {network}")]
    ContractUnavailable {
        contract: ContractName,
        network: NetworkId,
    },

    /// Gas estimation failed: the call would revert or funds are short.
    #[error("LG_ERR_201: Estimation failed: {reason}")]
    EstimationFailed { reason: String },

    /// Transport failure before a hash was obtained. Safe to retry.
    #[error("LG_ERR_202: Submission failed: {reason}")]
    SubmissionFailed { reason: String },

    /// Included in a block but execution failed. Re-check preconditions
    /// before retrying.
    #[error("LG_ERR_203: Transaction {hash} reverted on chain")]
    RevertedOnChain {
        hash: TxHash,
        block_number: Option<u64>,
    },

    /// No receipt within the poll bound. Outcome unknown; re-query by hash.
    #[error("LG_ERR_204: Transaction {hash} not confirmed after {attempts} polls")]
    TimedOut { hash: TxHash, attempts: u32 },

    /// A read-only query failed at the transport level.
    #[error("LG_ERR_205: Query failed: {reason}")]
    QueryFailed { reason: String },

    /// The transaction confirmed, but reading back its effect failed. The
    /// write happened; reconcile by hash instead of resubmitting.
    #[error("LG_ERR_206: Transaction {hash} confirmed but read-back failed: {source}")]
    ReadBackFailed {
        hash: TxHash,
        source: Box<LedgerError>,
    },

    // =================================================================
    // State Guard Errors (3xx)
    // =================================================================
    /// The requested action is not valid from the subject's current state.
    #[error("LG_ERR_300: Cannot {action} {subject} in state {state}")]
    InvalidStateTransition {
        subject: String,
        state: String,
        action: String,
    },

    /// The acting account does not own the token or listing.
    #[error("LG_ERR_301: Not owner: {actual} acting, owner is {expected}")]
    NotOwner { expected: Address, actual: Address },

    /// The Ready token was already redeemed.
    #[error("LG_ERR_302: {token_id} already redeemed")]
    AlreadyRedeemed {
        token_id: TokenId,
        hash: Option<TxHash>,
    },

    /// The session account is not the party required to sign this call.
    #[error("LG_ERR_303: Signer mismatch: expected {expected}, session is {actual}")]
    SignerMismatch { expected: Address, actual: Address },

    /// The listing is no longer active.
    #[error("LG_ERR_304: {0} is not active")]
    ListingInactive(ListingId),

    /// The offered price differs from the on-chain listing price.
    #[error("LG_ERR_305: Price mismatch: listed {listed}, offered {offered}")]
    PriceMismatch { listed: Decimal, offered: Decimal },

    // =================================================================
    // Decoding Errors (4xx)
    // =================================================================
    /// A confirmed receipt lacks the event field carrying the assigned id.
    #[error("LG_ERR_400: Malformed confirmation {hash}: missing {event}.{field}")]
    MalformedConfirmation {
        hash: TxHash,
        event: String,
        field: String,
    },

    /// A contract query returned values of the wrong shape.
    #[error("LG_ERR_401: Malformed response from {method}: {reason}")]
    MalformedResponse { method: String, reason: String },

    /// An amount cannot be represented in the network's base units.
    #[error("LG_ERR_402: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    // =================================================================
    // Configuration (9xx)
    // =================================================================
    /// Configuration error (bad config file, duplicate network, bad address).
    #[error("LG_ERR_900: Configuration error: {0}")]
    Configuration(String),

    /// Serialization / deserialization error.
    #[error("LG_ERR_901: Serialization error: {0}")]
    Serialization(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Flat discriminant of [`LedgerError`], for UI rendering and outcome records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoProviderFound,
    UserRejected,
    AlreadyPending,
    NotConnected,
    NetworkSwitchFailed,
    UnsupportedNetwork,
    ContractUnavailable,
    EstimationFailed,
    SubmissionFailed,
    RevertedOnChain,
    TimedOut,
    QueryFailed,
    ReadBackFailed,
    InvalidStateTransition,
    NotOwner,
    AlreadyRedeemed,
    SignerMismatch,
    ListingInactive,
    PriceMismatch,
    MalformedConfirmation,
    MalformedResponse,
    InvalidAmount,
    Configuration,
    Serialization,
}

impl LedgerError {
    /// The flat kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoProviderFound => ErrorKind::NoProviderFound,
            Self::UserRejected => ErrorKind::UserRejected,
            Self::AlreadyPending => ErrorKind::AlreadyPending,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::NetworkSwitchFailed { .. } => ErrorKind::NetworkSwitchFailed,
            Self::UnsupportedNetwork(_) => ErrorKind::UnsupportedNetwork,
            Self::ContractUnavailable { .. } => ErrorKind::ContractUnavailable,
            Self::EstimationFailed { .. } => ErrorKind::EstimationFailed,
            Self::SubmissionFailed { .. } => ErrorKind::SubmissionFailed,
            Self::RevertedOnChain { .. } => ErrorKind::RevertedOnChain,
            Self::TimedOut { .. } => ErrorKind::TimedOut,
            Self::QueryFailed { .. } => ErrorKind::QueryFailed,
            Self::ReadBackFailed { .. } => ErrorKind::ReadBackFailed,
            Self::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
            Self::NotOwner { .. } => ErrorKind::NotOwner,
            Self::AlreadyRedeemed { .. } => ErrorKind::AlreadyRedeemed,
            Self::SignerMismatch { .. } => ErrorKind::SignerMismatch,
            Self::ListingInactive(_) => ErrorKind::ListingInactive,
            Self::PriceMismatch { .. } => ErrorKind::PriceMismatch,
            Self::MalformedConfirmation { .. } => ErrorKind::MalformedConfirmation,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Whether re-running the whole operation from scratch cannot duplicate
    /// an effect. Only a transport failure before a hash existed qualifies.
    #[must_use]
    pub fn is_retry_safe(&self) -> bool {
        matches!(self, Self::SubmissionFailed { .. })
    }

    /// Wrap a failure that happened after `hash` confirmed, keeping the hash.
    #[must_use]
    pub fn after_confirmation(self, hash: TxHash) -> Self {
        Self::ReadBackFailed {
            hash,
            source: Box::new(self),
        }
    }

    /// The transaction hash this error refers to, if one was obtained.
    #[must_use]
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            Self::RevertedOnChain { hash, .. }
            | Self::TimedOut { hash, .. }
            | Self::MalformedConfirmation { hash, .. }
            | Self::ReadBackFailed { hash, .. } => Some(*hash),
            Self::AlreadyRedeemed { hash, .. } => *hash,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Failure reported by a ledger client or key provider implementation.
///
/// The executor and session manager translate these into [`LedgerError`]
/// according to which step produced them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider cannot be reached at all.
    #[error("provider unavailable")]
    Unavailable,

    /// The user declined the request.
    #[error("user rejected the request")]
    UserRejected,

    /// The provider does not know the requested network.
    #[error("network {0} not recognized by provider")]
    UnrecognizedNetwork(NetworkId),

    /// The node simulated the call and it would revert.
    #[error("execution reverted: {0}")]
    Reverted(String),

    /// Any other transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = LedgerError::NoProviderFound;
        let msg = format!("{err}");
        assert!(msg.starts_with("LG_ERR_100"), "Got: {msg}");
    }

    #[test]
    fn contract_unavailable_display() {
        let err = LedgerError::ContractUnavailable {
            contract: ContractName::Escrow,
            network: NetworkId::new("sepolia"),
        };
        let msg = format!("{err}");
        assert!(msg.contains("LG_ERR_200"));
        assert!(msg.contains("Escrow"));
        assert!(msg.contains("sepolia"));
    }

    #[test]
    fn all_errors_have_lg_err_prefix() {
        let hash = TxHash([7u8; 32]);
        let errors: Vec<LedgerError> = vec![
            LedgerError::UserRejected,
            LedgerError::AlreadyPending,
            LedgerError::TimedOut { hash, attempts: 60 },
            LedgerError::RevertedOnChain {
                hash,
                block_number: Some(12),
            },
            LedgerError::ListingInactive(ListingId(1)),
            LedgerError::Configuration("test".into()),
            LedgerError::QueryFailed { reason: "eof".into() }.after_confirmation(hash),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(msg.starts_with("LG_ERR_"), "Error missing LG_ERR_ prefix: {msg}");
        }
    }

    #[test]
    fn only_submission_failure_is_retry_safe() {
        assert!(LedgerError::SubmissionFailed { reason: "eof".into() }.is_retry_safe());
        assert!(!LedgerError::TimedOut { hash: TxHash([0u8; 32]), attempts: 1 }.is_retry_safe());
        assert!(!LedgerError::RevertedOnChain { hash: TxHash([0u8; 32]), block_number: None }
            .is_retry_safe());
        assert!(!LedgerError::UserRejected.is_retry_safe());
    }

    #[test]
    fn tx_hash_is_carried_by_post_submission_errors() {
        let hash = TxHash([9u8; 32]);
        assert_eq!(LedgerError::TimedOut { hash, attempts: 3 }.tx_hash(), Some(hash));
        assert_eq!(
            LedgerError::AlreadyRedeemed { token_id: TokenId(1), hash: Some(hash) }.tx_hash(),
            Some(hash)
        );
        assert_eq!(LedgerError::NotConnected.tx_hash(), None);
    }

    #[test]
    fn read_back_failure_keeps_hash_and_cause() {
        let hash = TxHash([4u8; 32]);
        let cause = LedgerError::QueryFailed { reason: "eof".into() };
        let err = cause.clone().after_confirmation(hash);
        assert_eq!(err.kind(), ErrorKind::ReadBackFailed);
        assert_eq!(err.tx_hash(), Some(hash));
        assert!(!err.is_retry_safe());
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), cause.to_string());
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(LedgerError::UserRejected.kind(), ErrorKind::UserRejected);
        assert_eq!(
            LedgerError::NotOwner { expected: Address::ZERO, actual: Address::ZERO }.kind(),
            ErrorKind::NotOwner
        );
    }
}
