//! External collaborator traits: the ledger client and the key provider.
//!
//! Both are consumed, never implemented, by this workspace (apart from the
//! in-memory doubles behind the `test-helpers` feature). Failures come back
//! as [`ProviderError`]; the session manager and executor decide what each
//! one means for the operation in progress.

use async_trait::async_trait;
use cropledger_types::{
    Address, CallValue, LedgerError, NetworkId, NetworkProfile, ProviderError, Receipt,
    TransactionRequest, TxHash,
};
use tokio::sync::broadcast;

/// Out-of-band notifications from the wallet / provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The authorized account list changed. Empty means access was revoked.
    AccountsChanged(Vec<Address>),
    /// The provider's active network changed.
    NetworkChanged(NetworkId),
}

/// Query/submit surface of the distributed ledger network.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// The provider's currently active network.
    async fn network_id(&self) -> Result<NetworkId, ProviderError>;

    /// Native balance in base units.
    async fn balance(&self, address: Address) -> Result<u128, ProviderError>;

    /// Gas needed for the request. Fails if the call would revert.
    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, ProviderError>;

    /// Sign (through the wallet) and broadcast; returns the pending hash.
    async fn submit(&self, request: &TransactionRequest) -> Result<TxHash, ProviderError>;

    /// The receipt if the transaction has been included, `None` otherwise.
    async fn receipt(&self, hash: TxHash) -> Result<Option<Receipt>, ProviderError>;

    /// Read-only contract query.
    async fn call(
        &self,
        contract: Address,
        method: &str,
        args: &[CallValue],
    ) -> Result<Vec<CallValue>, ProviderError>;

    /// Ask the provider to make `network` active.
    async fn switch_network(&self, network: &NetworkId) -> Result<(), ProviderError>;

    /// Register a network the provider does not know yet.
    async fn add_network(&self, profile: &NetworkProfile) -> Result<(), ProviderError>;

    /// Subscribe to account / network change notifications.
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}

/// The user's signing authority.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Ask the user to authorize account access.
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;

    /// Sign an arbitrary message with the given account.
    async fn sign_message(
        &self,
        address: Address,
        message: &[u8],
    ) -> Result<Vec<u8>, ProviderError>;
}

/// Map a provider failure on a read path.
pub(crate) fn query_error(err: ProviderError) -> LedgerError {
    match err {
        ProviderError::Unavailable => LedgerError::NoProviderFound,
        ProviderError::UserRejected => LedgerError::UserRejected,
        other => LedgerError::QueryFailed {
            reason: other.to_string(),
        },
    }
}
