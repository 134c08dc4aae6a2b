//! Composition root: wires one session, one executor, and the three
//! coordinators around a single ledger client.

use std::sync::Arc;

use cropledger_gateway::{KeyProvider, LedgerClient, SessionManager, TransactionExecutor};
use cropledger_types::{GatewayConfig, Result};
use tokio::task::JoinHandle;

use crate::{
    escrow::EscrowCoordinator, marketplace::MarketplaceCoordinator, token::TokenLifecycleManager,
};

/// Everything a client application needs, built from one configuration.
pub struct Gateway {
    config: GatewayConfig,
    session: Arc<SessionManager>,
    executor: Arc<TransactionExecutor>,
    tokens: TokenLifecycleManager,
    escrow: EscrowCoordinator,
    marketplace: MarketplaceCoordinator,
}

impl Gateway {
    /// Build a gateway. `keys` is `None` when no key provider is present;
    /// every connect then fails with `NoProviderFound`.
    ///
    /// # Errors
    /// `Configuration` if `config` does not validate.
    pub fn new(
        config: GatewayConfig,
        client: Arc<dyn LedgerClient>,
        keys: Option<Arc<dyn KeyProvider>>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(config.networks.clone());
        let session = Arc::new(SessionManager::new(Arc::clone(&client), keys, registry));
        let executor = Arc::new(TransactionExecutor::new(
            client,
            Arc::clone(&session),
            config.executor.clone(),
        ));
        tracing::info!(
            engine = cropledger_types::constants::ENGINE_NAME,
            version = cropledger_types::constants::VERSION,
            networks = config.networks.len(),
            "Gateway initialised"
        );
        Ok(Self {
            tokens: TokenLifecycleManager::new(Arc::clone(&executor)),
            escrow: EscrowCoordinator::new(Arc::clone(&executor)),
            marketplace: MarketplaceCoordinator::new(Arc::clone(&executor)),
            config,
            session,
            executor,
        })
    }

    /// Start applying provider notifications to the session.
    pub fn listen(&self) -> JoinHandle<()> {
        self.session.listen()
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    #[must_use]
    pub fn executor(&self) -> &Arc<TransactionExecutor> {
        &self.executor
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenLifecycleManager {
        &self.tokens
    }

    #[must_use]
    pub fn escrow(&self) -> &EscrowCoordinator {
        &self.escrow
    }

    #[must_use]
    pub fn marketplace(&self) -> &MarketplaceCoordinator {
        &self.marketplace
    }
}
