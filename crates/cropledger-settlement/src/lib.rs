//! # cropledger-settlement
//!
//! **Settlement plane**: the coordinators that turn user intent into
//! contract calls and track the resulting domain state.
//!
//! - [`TokenLifecycleManager`]: mint, transfer, redeem, and read claim tokens
//! - [`EscrowCoordinator`]: create escrows and drive release / refund
//! - [`MarketplaceCoordinator`]: list, buy, cancel, and read listings
//! - [`Gateway`]: composition root wiring all of the above to one client
//!
//! ## Write Path
//!
//! Every write follows the same shape:
//! 1. Read the session (account + network) immediately before use
//! 2. Re-derive owner / status / price from the network
//! 3. Reject locally what the contract would reject (no submission)
//! 4. Execute through the [`TransactionExecutor`](cropledger_gateway::TransactionExecutor)
//! 5. Decode any contract-assigned id from the confirmation and re-read
//!
//! Each write returns [`Committed`](cropledger_types::Committed): the domain
//! value plus the transaction outcome that produced it.

pub mod escrow;
pub mod gateway;
pub mod marketplace;
pub mod token;

pub use escrow::EscrowCoordinator;
pub use gateway::Gateway;
pub use marketplace::MarketplaceCoordinator;
pub use token::TokenLifecycleManager;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use cropledger_gateway::testing::{InMemoryLedger, StaticKeyProvider};
    use cropledger_types::{ExecutorConfig, GatewayConfig};

    use crate::Gateway;

    pub struct Party {
        pub keys: Arc<StaticKeyProvider>,
        pub gateway: Gateway,
    }

    pub fn config() -> GatewayConfig {
        GatewayConfig {
            executor: ExecutorConfig {
                poll_interval_ms: 1,
                max_poll_attempts: 5,
                ..ExecutorConfig::default()
            },
            ..GatewayConfig::default()
        }
    }

    pub fn ledger() -> Arc<InMemoryLedger> {
        Arc::new(InMemoryLedger::new(Arc::new(config().networks)))
    }

    /// A connected gateway on `ledger` with its own key.
    pub async fn party(ledger: &Arc<InMemoryLedger>, seed: u8) -> Party {
        let keys = Arc::new(StaticKeyProvider::from_seed([seed; 32]));
        let gateway = Gateway::new(config(), ledger.clone(), Some(keys.clone())).unwrap();
        gateway.session().connect().await.unwrap();
        Party { keys, gateway }
    }
}
