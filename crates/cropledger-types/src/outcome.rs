//! Transaction outcomes.
//!
//! ## Status Machine
//!
//! ```text
//!   ┌─────────┐  receipt ok     ┌───────────┐
//!   │ PENDING ├────────────────▶│ CONFIRMED │
//!   └─┬─────┬─┘                 └───────────┘
//!     │     │ receipt failed    ┌────────┐
//!     │     └──────────────────▶│ FAILED │
//!     │ poll bound exhausted    └────────┘
//!     ▼
//!   ┌───────────┐  later re-query by hash
//!   │ TIMED_OUT ├──────────────────────────▶ CONFIRMED | FAILED
//!   └───────────┘
//! ```
//!
//! `TimedOut` is the only non-final "terminal" status: it ends one executor
//! call, but the hash it carries can still be reconciled later.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ContractEvent, ErrorKind, LedgerError, Receipt, Result, TxHash};

/// Where a submitted transaction stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
    TimedOut,
}

impl TxStatus {
    /// Whether the network has given a final answer.
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Confirmed => write!(f, "CONFIRMED"),
            Self::Failed => write!(f, "FAILED"),
            Self::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

/// Result of driving one submitted transaction.
///
/// Transient: not persisted, but the `hash` is always handed back to the
/// caller so the outcome can be re-derived from the network after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutcome {
    pub hash: TxHash,
    pub status: TxStatus,
    pub block_number: Option<u64>,
    pub error_kind: Option<ErrorKind>,
    #[serde(default)]
    pub events: Vec<ContractEvent>,
}

impl TransactionOutcome {
    /// Submitted, no receipt yet.
    #[must_use]
    pub fn pending(hash: TxHash) -> Self {
        Self {
            hash,
            status: TxStatus::Pending,
            block_number: None,
            error_kind: None,
            events: Vec::new(),
        }
    }

    /// Poll bound exhausted without a receipt.
    #[must_use]
    pub fn timed_out(hash: TxHash) -> Self {
        Self {
            status: TxStatus::TimedOut,
            error_kind: Some(ErrorKind::TimedOut),
            ..Self::pending(hash)
        }
    }

    /// Map a receipt to `Confirmed` or `Failed`.
    #[must_use]
    pub fn from_receipt(receipt: Receipt) -> Self {
        let (status, error_kind) = if receipt.success {
            (TxStatus::Confirmed, None)
        } else {
            (TxStatus::Failed, Some(ErrorKind::RevertedOnChain))
        };
        Self {
            hash: receipt.hash,
            status,
            block_number: Some(receipt.block_number),
            error_kind,
            events: receipt.events,
        }
    }

    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.status == TxStatus::Confirmed
    }

    /// Turn a non-confirmed outcome into the matching error, keeping the hash.
    ///
    /// # Errors
    /// `RevertedOnChain` for `Failed`, `TimedOut` for `TimedOut` and `Pending`.
    pub fn into_confirmed(self, attempts: u32) -> Result<Self> {
        match self.status {
            TxStatus::Confirmed => Ok(self),
            TxStatus::Failed => Err(LedgerError::RevertedOnChain {
                hash: self.hash,
                block_number: self.block_number,
            }),
            TxStatus::Pending | TxStatus::TimedOut => Err(LedgerError::TimedOut {
                hash: self.hash,
                attempts,
            }),
        }
    }

    /// Find the first event with this name.
    #[must_use]
    pub fn event(&self, name: &str) -> Option<&ContractEvent> {
        self.events.iter().find(|e| e.name == name)
    }

    /// Decode a contract-assigned numeric id from an event field.
    ///
    /// # Errors
    /// `MalformedConfirmation` when the event or field is missing, or the
    /// field is not an unsigned integer that fits in `u64`.
    pub fn decode_id(&self, event: &str, field: &str) -> Result<u64> {
        self.event(event)
            .and_then(|e| e.fields.get(field))
            .and_then(crate::CallValue::as_uint)
            .and_then(|raw| u64::try_from(raw).ok())
            .ok_or_else(|| LedgerError::MalformedConfirmation {
                hash: self.hash,
                event: event.to_string(),
                field: field.to_string(),
            })
    }
}

/// A domain value together with the transaction that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committed<T> {
    pub value: T,
    pub outcome: TransactionOutcome,
}

impl<T> Committed<T> {
    #[must_use]
    pub fn new(value: T, outcome: TransactionOutcome) -> Self {
        Self { value, outcome }
    }

    #[must_use]
    pub fn hash(&self) -> TxHash {
        self.outcome.hash
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(success: bool) -> Receipt {
        Receipt {
            hash: TxHash([1u8; 32]),
            success,
            block_number: 42,
            gas_used: 21_000,
            events: vec![ContractEvent::new("EscrowCreated").with_field("escrowId", 5u64)],
        }
    }

    #[test]
    fn success_receipt_confirms() {
        let outcome = TransactionOutcome::from_receipt(receipt(true));
        assert_eq!(outcome.status, TxStatus::Confirmed);
        assert_eq!(outcome.block_number, Some(42));
        assert!(outcome.error_kind.is_none());
        assert!(outcome.into_confirmed(1).is_ok());
    }

    #[test]
    fn failed_receipt_maps_to_revert() {
        let outcome = TransactionOutcome::from_receipt(receipt(false));
        assert_eq!(outcome.status, TxStatus::Failed);
        assert_eq!(outcome.error_kind, Some(ErrorKind::RevertedOnChain));
        let err = outcome.into_confirmed(1).unwrap_err();
        assert!(matches!(err, LedgerError::RevertedOnChain { block_number: Some(42), .. }));
    }

    #[test]
    fn timed_out_keeps_hash() {
        let hash = TxHash([3u8; 32]);
        let err = TransactionOutcome::timed_out(hash).into_confirmed(60).unwrap_err();
        assert_eq!(err.tx_hash(), Some(hash));
        assert!(matches!(err, LedgerError::TimedOut { attempts: 60, .. }));
    }

    #[test]
    fn decode_id_from_event() {
        let outcome = TransactionOutcome::from_receipt(receipt(true));
        assert_eq!(outcome.decode_id("EscrowCreated", "escrowId").unwrap(), 5);
    }

    #[test]
    fn decode_id_missing_field_is_malformed() {
        let outcome = TransactionOutcome::from_receipt(receipt(true));
        let err = outcome.decode_id("EscrowCreated", "listingId").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::MalformedConfirmation { ref field, .. } if field == "listingId"
        ));
        let err = outcome.decode_id("Listed", "listingId").unwrap_err();
        assert!(matches!(err, LedgerError::MalformedConfirmation { .. }));
    }

    #[test]
    fn status_finality() {
        assert!(TxStatus::Confirmed.is_final());
        assert!(TxStatus::Failed.is_final());
        assert!(!TxStatus::TimedOut.is_final());
        assert!(!TxStatus::Pending.is_final());
    }
}
