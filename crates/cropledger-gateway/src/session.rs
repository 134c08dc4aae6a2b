//! Session manager: owns the one [`Session`] of a running client.
//!
//! The session is the single source of truth for who is acting and on which
//! network. It lives behind one `RwLock`; the lock is never held across a
//! network round trip. Writes that follow a round trip check a generation
//! counter first, so a `disconnect()` that lands while a connect or balance
//! refresh is in flight is never overwritten by the stale result.
//!
//! ## Notifications
//!
//! [`SessionManager::listen`] subscribes to the ledger client's event stream
//! and routes every [`ProviderEvent`] through [`SessionManager::handle_event`].
//! It is the only consumer of those events.

use std::sync::{Arc, Weak};

use cropledger_types::{
    Address, ConnectionState, LedgerError, NetworkId, NetworkProfile, NetworkRegistry,
    ProviderError, Result, Session, base_units_to_decimal, constants,
};
use rust_decimal::Decimal;
use tokio::{
    sync::{Mutex, RwLock, broadcast::error::RecvError},
    task::JoinHandle,
};

use crate::client::{KeyProvider, LedgerClient, ProviderEvent, query_error};

/// Who is acting and where: what a coordinator needs for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActingContext {
    pub account: Address,
    pub network: NetworkProfile,
}

struct SessionState {
    session: Session,
    /// Bumped on every disconnect; results computed under an older
    /// generation are discarded.
    generation: u64,
}

/// Owns the session: connect/disconnect, network switching, balance cache,
/// and reaction to provider notifications.
pub struct SessionManager {
    client: Arc<dyn LedgerClient>,
    keys: Option<Arc<dyn KeyProvider>>,
    registry: Arc<NetworkRegistry>,
    state: RwLock<SessionState>,
    /// Held for the whole duration of a connect. Acquired with `try_lock` so
    /// a second connect fails fast instead of queueing.
    connect_gate: Mutex<()>,
}

impl SessionManager {
    /// Create a manager in the `Disconnected` state. `keys` is `None` when no
    /// wallet / key provider could be found in the environment.
    #[must_use]
    pub fn new(
        client: Arc<dyn LedgerClient>,
        keys: Option<Arc<dyn KeyProvider>>,
        registry: Arc<NetworkRegistry>,
    ) -> Self {
        Self {
            client,
            keys,
            registry,
            state: RwLock::new(SessionState {
                session: Session::disconnected(),
                generation: 0,
            }),
            connect_gate: Mutex::new(()),
        }
    }

    // -----------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------

    /// A copy of the current session.
    pub async fn snapshot(&self) -> Session {
        self.state.read().await.session.clone()
    }

    /// The connected account and its network profile.
    ///
    /// # Errors
    /// `NotConnected` when disconnected, `UnsupportedNetwork` when the
    /// provider sits on a network missing from the registry.
    pub async fn acting(&self) -> Result<ActingContext> {
        let session = self.snapshot().await;
        let account = match (session.state, session.account) {
            (ConnectionState::Connected, Some(account)) => account,
            _ => return Err(LedgerError::NotConnected),
        };
        let network_id = session.network_id.ok_or(LedgerError::NotConnected)?;
        let network = self.registry.require_profile(&network_id)?.clone();
        Ok(ActingContext { account, network })
    }

    /// The profile of the session's current network, connected or not.
    ///
    /// # Errors
    /// `NotConnected` if no network has been resolved yet,
    /// `UnsupportedNetwork` if it is not in the registry.
    pub async fn current_network(&self) -> Result<NetworkProfile> {
        let network_id = self
            .snapshot()
            .await
            .network_id
            .ok_or(LedgerError::NotConnected)?;
        Ok(self.registry.require_profile(&network_id)?.clone())
    }

    #[must_use]
    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    // -----------------------------------------------------------------
    // Connect / disconnect
    // -----------------------------------------------------------------

    /// Request account access and bring the session to `Connected`.
    ///
    /// # Errors
    /// - `NoProviderFound` if there is no key provider or it is unreachable
    /// - `UserRejected` if the user declined or authorized no account
    /// - `AlreadyPending` if another connect is in flight
    pub async fn connect(&self) -> Result<Session> {
        let keys = self.keys.as_ref().ok_or(LedgerError::NoProviderFound)?;
        let Ok(_gate) = self.connect_gate.try_lock() else {
            tracing::warn!("Connect rejected: another connect is in flight");
            return Err(LedgerError::AlreadyPending);
        };

        let generation = {
            let mut state = self.state.write().await;
            state.session.state = ConnectionState::Connecting;
            state.generation
        };

        match self.establish(keys.as_ref()).await {
            Ok((account, network_id)) => {
                {
                    let mut state = self.state.write().await;
                    if state.generation != generation {
                        tracing::info!("Connect superseded by disconnect");
                        return Err(LedgerError::NotConnected);
                    }
                    state.session = Session {
                        account: Some(account),
                        network_id: Some(network_id.clone()),
                        cached_balance: Decimal::ZERO,
                        state: ConnectionState::Connected,
                    };
                }
                tracing::info!(
                    account = %account,
                    network = %network_id,
                    supported = self.registry.profile(&network_id).is_some(),
                    "Session connected"
                );
                self.refresh_or_warn().await;
                Ok(self.snapshot().await)
            }
            Err(err) => {
                let mut state = self.state.write().await;
                if state.generation == generation {
                    state.session = Session::disconnected();
                }
                tracing::warn!(error = %err, "Connect failed");
                Err(err)
            }
        }
    }

    async fn establish(&self, keys: &dyn KeyProvider) -> Result<(Address, NetworkId)> {
        let accounts = keys.request_accounts().await.map_err(|e| match e {
            ProviderError::UserRejected => LedgerError::UserRejected,
            ProviderError::Unavailable => LedgerError::NoProviderFound,
            other => LedgerError::QueryFailed {
                reason: other.to_string(),
            },
        })?;
        let account = accounts.first().copied().ok_or(LedgerError::UserRejected)?;
        let network_id = self.client.network_id().await.map_err(query_error)?;
        Ok((account, network_id))
    }

    /// Reset to `Disconnected`. Always succeeds; calling it twice is a no-op.
    pub async fn disconnect(&self) -> Session {
        let mut state = self.state.write().await;
        let was = state.session.state;
        state.session = Session::disconnected();
        state.generation += 1;
        if was != ConnectionState::Disconnected {
            tracing::info!(previous = %was, "Session disconnected");
        }
        state.session.clone()
    }

    // -----------------------------------------------------------------
    // Balance
    // -----------------------------------------------------------------

    /// Re-query the native balance of the connected account.
    ///
    /// When disconnected this returns the cached zero without any network
    /// call.
    ///
    /// # Errors
    /// `QueryFailed` / `NoProviderFound` on provider failure; the cached
    /// value is left untouched.
    pub async fn refresh_balance(&self) -> Result<Decimal> {
        let (session, generation) = {
            let state = self.state.read().await;
            (state.session.clone(), state.generation)
        };
        let Some(account) = session.account.filter(|_| session.is_connected()) else {
            return Ok(session.cached_balance);
        };

        let units = self.client.balance(account).await.map_err(query_error)?;
        let decimals = session
            .network_id
            .as_ref()
            .and_then(|id| self.registry.profile(id))
            .map_or(constants::DEFAULT_NATIVE_DECIMALS, |p| p.native_asset_decimals);
        let balance = base_units_to_decimal(units, decimals)?;

        let mut state = self.state.write().await;
        if state.generation == generation
            && state.session.account == Some(account)
            && state.session.network_id == session.network_id
        {
            state.session.cached_balance = balance;
            tracing::debug!(account = %account, balance = %balance, "Balance refreshed");
        }
        Ok(balance)
    }

    async fn refresh_or_warn(&self) {
        if let Err(err) = self.refresh_balance().await {
            tracing::warn!(error = %err, "Balance refresh failed");
        }
    }

    // -----------------------------------------------------------------
    // Network switching
    // -----------------------------------------------------------------

    /// Make `target` the provider's active network.
    ///
    /// If the provider does not recognize the network, its profile is
    /// registered and the switch retried exactly once.
    ///
    /// # Errors
    /// - `UnsupportedNetwork` if `target` is not in the local registry
    /// - `UserRejected` if the user declined the switch
    /// - `NetworkSwitchFailed` if registration or the retry fails
    pub async fn switch_network(&self, target: &NetworkId) -> Result<Session> {
        let profile = self.registry.require_profile(target)?.clone();

        match self.client.switch_network(target).await {
            Ok(()) => {}
            Err(ProviderError::UnrecognizedNetwork(_)) => {
                tracing::info!(network = %target, "Provider does not know network, registering");
                self.client
                    .add_network(&profile)
                    .await
                    .map_err(|e| switch_failed(target, &e))?;
                self.client
                    .switch_network(target)
                    .await
                    .map_err(|e| switch_failed(target, &e))?;
            }
            Err(ProviderError::UserRejected) => return Err(LedgerError::UserRejected),
            Err(other) => return Err(switch_failed(target, &other)),
        }

        self.set_network(target.clone()).await;
        tracing::info!(network = %target, "Network switched");
        self.refresh_or_warn().await;
        Ok(self.snapshot().await)
    }

    async fn set_network(&self, network_id: NetworkId) {
        let mut state = self.state.write().await;
        if state.session.network_id.as_ref() != Some(&network_id) {
            state.session.network_id = Some(network_id);
            state.session.cached_balance = Decimal::ZERO;
        }
    }

    // -----------------------------------------------------------------
    // Signing
    // -----------------------------------------------------------------

    /// Sign an arbitrary message with the connected account.
    ///
    /// # Errors
    /// `NotConnected`, `NoProviderFound`, or `UserRejected`.
    pub async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>> {
        let keys = self.keys.as_ref().ok_or(LedgerError::NoProviderFound)?;
        let account = self
            .snapshot()
            .await
            .account
            .ok_or(LedgerError::NotConnected)?;
        keys.sign_message(account, message).await.map_err(query_error)
    }

    // -----------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------

    /// Subscribe to provider notifications and apply them until the
    /// provider closes the stream or the manager is dropped.
    pub fn listen(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.client.subscribe();
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let event = events.recv().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                match event {
                    Ok(event) => manager.handle_event(event).await,
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Provider notifications lagged, resyncing network");
                        manager.resync_network().await;
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!("Provider notification stream closed");
                        break;
                    }
                }
            }
        })
    }

    /// Apply one provider notification.
    pub async fn handle_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                None => {
                    tracing::info!("Provider revoked account access");
                    self.disconnect().await;
                }
                Some(&account) => {
                    {
                        let mut state = self.state.write().await;
                        if !state.session.is_connected() {
                            return;
                        }
                        if state.session.account != Some(account) {
                            state.session.account = Some(account);
                            state.session.cached_balance = Decimal::ZERO;
                        }
                    }
                    tracing::info!(account = %account, "Active account changed");
                    self.refresh_or_warn().await;
                }
            },
            ProviderEvent::NetworkChanged(network_id) => {
                if self.registry.profile(&network_id).is_none() {
                    tracing::warn!(
                        network = %network_id,
                        "Provider moved to an unsupported network"
                    );
                } else {
                    tracing::info!(network = %network_id, "Active network changed");
                }
                self.set_network(network_id).await;
                self.refresh_or_warn().await;
            }
        }
    }

    async fn resync_network(&self) {
        match self.client.network_id().await {
            Ok(network_id) => self.handle_event(ProviderEvent::NetworkChanged(network_id)).await,
            Err(err) => tracing::warn!(error = %err, "Network resync failed"),
        }
    }
}

fn switch_failed(target: &NetworkId, err: &ProviderError) -> LedgerError {
    LedgerError::NetworkSwitchFailed {
        network: target.clone(),
        reason: err.to_string(),
    }
}
