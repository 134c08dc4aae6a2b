//! Transaction executor: drives one state-changing call from intent to a
//! final (or timed-out) outcome.
//!
//! ## Pipeline
//!
//! ```text
//!   ContractCall ─▶ resolve ─▶ estimate ─▶ pad ─▶ submit ─▶ poll ─▶ outcome
//!                    │           │                            │
//!                    │           │ would revert               └─ bound hit ─▶ TimedOut
//!                    │           └─▶ EstimationFailed (nothing submitted)
//!                    └─▶ NotConnected / ContractUnavailable (no network call)
//! ```
//!
//! A confirmed receipt is the only thing that ever yields `Ok`. After a
//! timeout the hash is all the caller has; [`TransactionExecutor::reconcile`]
//! turns it back into a final status once the network has one.

use std::sync::Arc;

use cropledger_types::{
    CallId, CallValue, ContractCall, ContractName, ExecutorConfig, LedgerError, NetworkProfile,
    ProviderError, Result, TransactionOutcome, TransactionRequest, TxHash,
};

use crate::{
    client::{LedgerClient, query_error},
    session::{ActingContext, SessionManager},
};

/// Submits contract calls on behalf of the session's current account.
pub struct TransactionExecutor {
    client: Arc<dyn LedgerClient>,
    session: Arc<SessionManager>,
    config: ExecutorConfig,
}

impl TransactionExecutor {
    #[must_use]
    pub fn new(
        client: Arc<dyn LedgerClient>,
        session: Arc<SessionManager>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            client,
            session,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Submit `call` as the session's current account, on its current
    /// network, and wait for a confirmed receipt.
    ///
    /// # Errors
    /// Everything [`submit_and_wait`](Self::submit_and_wait) returns, plus
    /// `RevertedOnChain` for a failed receipt and `TimedOut` when the poll
    /// bound is exhausted. Both carry the transaction hash.
    pub async fn execute(&self, call: ContractCall) -> Result<TransactionOutcome> {
        let acting = self.session.acting().await?;
        self.execute_as(&acting, call).await
    }

    /// Like [`execute`](Self::execute), pinned to an acting context the
    /// caller already read. Pre-checks, the write and the read-back then
    /// all address the same network even if the session moves meanwhile.
    ///
    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn execute_as(
        &self,
        acting: &ActingContext,
        call: ContractCall,
    ) -> Result<TransactionOutcome> {
        self.submit_and_wait_as(acting, call)
            .await?
            .into_confirmed(self.config.max_poll_attempts)
    }

    /// Submit `call` and poll for its receipt, returning whatever outcome
    /// was reached: `Confirmed`, `Failed`, or `TimedOut`.
    ///
    /// # Errors
    /// - `NotConnected` / `UnsupportedNetwork` from the session
    /// - `ContractUnavailable` if the contract is not deployed on the network
    /// - `InvalidAmount` if the attached value cannot be expressed in base units
    /// - `EstimationFailed` if the call would revert (nothing is submitted)
    /// - `UserRejected` if the user declined to sign
    /// - `SubmissionFailed` if broadcasting failed
    pub async fn submit_and_wait(&self, call: ContractCall) -> Result<TransactionOutcome> {
        let acting = self.session.acting().await?;
        self.submit_and_wait_as(&acting, call).await
    }

    /// [`submit_and_wait`](Self::submit_and_wait) for a given acting context.
    ///
    /// # Errors
    /// See [`submit_and_wait`](Self::submit_and_wait).
    pub async fn submit_and_wait_as(
        &self,
        acting: &ActingContext,
        call: ContractCall,
    ) -> Result<TransactionOutcome> {
        let call_id = CallId::new();
        let to = self
            .session
            .registry()
            .contract_address(call.contract, &acting.network.id)?;
        let value = if call.is_payable() {
            acting.network.to_base_units(call.value)?
        } else {
            0
        };

        let mut request = TransactionRequest {
            from: acting.account,
            to,
            method: call.method.clone(),
            args: call.args,
            value,
            gas_limit: None,
        };

        let estimate = self.client.estimate_gas(&request).await.map_err(|e| {
            tracing::warn!(
                call_id = %call_id,
                contract = %call.contract,
                method = %request.method,
                error = %e,
                "Gas estimation failed"
            );
            match e {
                ProviderError::UserRejected => LedgerError::UserRejected,
                other => LedgerError::EstimationFailed {
                    reason: other.to_string(),
                },
            }
        })?;
        let gas_limit = self.config.apply_margin(estimate);
        request.gas_limit = Some(gas_limit);

        let hash = self.client.submit(&request).await.map_err(|e| {
            tracing::warn!(
                call_id = %call_id,
                method = %request.method,
                error = %e,
                "Submission failed"
            );
            match e {
                ProviderError::UserRejected => LedgerError::UserRejected,
                other => LedgerError::SubmissionFailed {
                    reason: other.to_string(),
                },
            }
        })?;

        tracing::info!(
            call_id = %call_id,
            contract = %call.contract,
            method = %request.method,
            from = %acting.account.short(),
            network = %acting.network.id,
            gas_estimate = estimate,
            gas_limit,
            hash = %hash.short(),
            "Transaction submitted"
        );

        let outcome = self.poll(hash).await;
        tracing::info!(
            call_id = %call_id,
            method = %request.method,
            hash = %hash.short(),
            status = %outcome.status,
            block = ?outcome.block_number,
            "Transaction settled"
        );
        Ok(outcome)
    }

    async fn poll(&self, hash: TxHash) -> TransactionOutcome {
        let interval = self.config.poll_interval();
        for attempt in 1..=self.config.max_poll_attempts {
            match self.client.receipt(hash).await {
                Ok(Some(receipt)) => return TransactionOutcome::from_receipt(receipt),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(
                        hash = %hash.short(),
                        attempt,
                        error = %e,
                        "Receipt poll failed"
                    );
                }
            }
            if attempt < self.config.max_poll_attempts {
                tokio::time::sleep(interval).await;
            }
        }
        tracing::warn!(
            hash = %hash.short(),
            attempts = self.config.max_poll_attempts,
            "Receipt poll bound exhausted"
        );
        TransactionOutcome::timed_out(hash)
    }

    /// Re-query the network for a previously submitted transaction.
    ///
    /// Returns `Pending` while the network still has no receipt.
    ///
    /// # Errors
    /// `QueryFailed` / `NoProviderFound` if the receipt lookup fails.
    pub async fn reconcile(&self, hash: TxHash) -> Result<TransactionOutcome> {
        let outcome = match self.client.receipt(hash).await.map_err(query_error)? {
            Some(receipt) => TransactionOutcome::from_receipt(receipt),
            None => TransactionOutcome::pending(hash),
        };
        tracing::info!(hash = %hash.short(), status = %outcome.status, "Transaction reconciled");
        Ok(outcome)
    }

    /// Read-only contract query against the given network.
    ///
    /// # Errors
    /// `ContractUnavailable` if the contract is not deployed there,
    /// `QueryFailed` / `NoProviderFound` on provider failure.
    pub async fn query(
        &self,
        network: &NetworkProfile,
        contract: ContractName,
        method: &str,
        args: &[CallValue],
    ) -> Result<Vec<CallValue>> {
        let address = self.session.registry().contract_address(contract, &network.id)?;
        self.client
            .call(address, method, args)
            .await
            .map_err(query_error)
    }
}

#[cfg(test)]
mod tests {
    use cropledger_types::{
        Address, NetworkId, NetworkRegistry, TokenId, TokenKind, TxStatus, constants::methods,
    };
    use rust_decimal::Decimal;

    use super::*;
    use crate::testing::{InMemoryLedger, StaticKeyProvider};

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            poll_interval_ms: 1,
            max_poll_attempts: 3,
            ..ExecutorConfig::default()
        }
    }

    async fn setup(
        registry: NetworkRegistry,
    ) -> (Arc<InMemoryLedger>, Arc<StaticKeyProvider>, TransactionExecutor) {
        let registry = Arc::new(registry);
        let ledger = Arc::new(InMemoryLedger::new(Arc::clone(&registry)));
        let keys = Arc::new(StaticKeyProvider::from_seed([7u8; 32]));
        let session = Arc::new(SessionManager::new(
            ledger.clone(),
            Some(keys.clone()),
            registry,
        ));
        session.connect().await.unwrap();
        let executor = TransactionExecutor::new(ledger.clone(), session, fast_config());
        (ledger, keys, executor)
    }

    fn transfer(token: u64, from: Address, to: Address) -> ContractCall {
        ContractCall::new(ContractName::ReadyClaimToken, methods::TRANSFER_FROM)
            .arg(from)
            .arg(to)
            .arg(token)
    }

    #[tokio::test]
    async fn confirmed_call_pads_gas_estimate() {
        let (ledger, keys, executor) = setup(NetworkRegistry::builtin()).await;
        ledger.seed_token(TokenKind::Ready, TokenId(1), keys.address(), "maize", 10);

        let outcome = executor
            .execute(transfer(1, keys.address(), Address::repeat(9)))
            .await
            .unwrap();
        assert_eq!(outcome.status, TxStatus::Confirmed);
        assert!(outcome.block_number.is_some());

        let counters = ledger.counters();
        let estimate = counters.last_estimate.unwrap();
        assert_eq!(counters.last_gas_limit, Some(executor.config().apply_margin(estimate)));
        assert!(counters.last_gas_limit.unwrap() > estimate);
    }

    #[tokio::test]
    async fn failed_estimate_submits_nothing() {
        let (ledger, keys, executor) = setup(NetworkRegistry::builtin()).await;
        // Token 5 does not exist: the dry run reverts.
        let err = executor
            .execute(transfer(5, keys.address(), Address::repeat(9)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::EstimationFailed { .. }));
        assert_eq!(ledger.counters().submits, 0);
    }

    #[tokio::test]
    async fn undeployed_contract_makes_no_network_call() {
        let (ledger, _keys, executor) = setup(NetworkRegistry::builtin()).await;
        executor
            .session()
            .handle_event(crate::ProviderEvent::NetworkChanged(NetworkId::new("sepolia")))
            .await;
        let before = ledger.counters();

        let err = executor
            .execute(ContractCall::new(ContractName::Escrow, methods::REFUND).arg(1u64))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ContractUnavailable { contract: ContractName::Escrow, .. }
        ));
        let after = ledger.counters();
        assert_eq!(after.estimates, before.estimates);
        assert_eq!(after.submits, before.submits);
    }

    #[tokio::test]
    async fn disconnected_session_is_rejected() {
        let (ledger, _keys, executor) = setup(NetworkRegistry::builtin()).await;
        executor.session().disconnect().await;
        let err = executor
            .execute(transfer(1, Address::repeat(1), Address::repeat(2)))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::NotConnected);
        assert_eq!(ledger.counters().estimates, 0);
    }

    #[tokio::test]
    async fn timeout_then_reconcile_confirms() {
        let (ledger, keys, executor) = setup(NetworkRegistry::builtin()).await;
        ledger.seed_token(TokenKind::Ready, TokenId(1), keys.address(), "maize", 10);
        ledger.set_mine_after_polls(100);

        let err = executor
            .execute(transfer(1, keys.address(), Address::repeat(9)))
            .await
            .unwrap_err();
        let LedgerError::TimedOut { hash, attempts } = err else {
            panic!("expected timeout, got {err:?}");
        };
        assert_eq!(attempts, 3);
        assert_eq!(ledger.counters().receipt_polls, 3);
        assert_eq!(executor.reconcile(hash).await.unwrap().status, TxStatus::Pending);

        ledger.mine_pending();
        let outcome = executor.reconcile(hash).await.unwrap();
        assert_eq!(outcome.status, TxStatus::Confirmed);
        assert_eq!(outcome.hash, hash);
    }

    #[tokio::test]
    async fn conflicting_calls_both_estimate_one_reverts() {
        let (ledger, keys, executor) = setup(NetworkRegistry::builtin()).await;
        ledger.seed_token(TokenKind::Ready, TokenId(1), keys.address(), "maize", 10);
        // Both estimates run against the same state; the token has moved by
        // the time the second block is mined.
        ledger.set_mine_after_polls(1);
        let (first, second) = tokio::join!(
            executor.submit_and_wait(transfer(1, keys.address(), Address::repeat(9))),
            executor.submit_and_wait(transfer(1, keys.address(), Address::repeat(8))),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        let statuses = [first.status, second.status];
        assert!(statuses.contains(&TxStatus::Confirmed));
        assert!(statuses.contains(&TxStatus::Failed));
        let failed = if first.status == TxStatus::Failed { first } else { second };
        let err = failed.into_confirmed(3).unwrap_err();
        assert!(matches!(err, LedgerError::RevertedOnChain { block_number: Some(_), .. }));
        assert!(err.tx_hash().is_some());
    }

    #[tokio::test]
    async fn user_rejection_at_signing() {
        let (ledger, keys, executor) = setup(NetworkRegistry::builtin()).await;
        ledger.seed_token(TokenKind::Ready, TokenId(1), keys.address(), "maize", 10);
        ledger.fail_next_submit(ProviderError::UserRejected);
        let err = executor
            .execute(transfer(1, keys.address(), Address::repeat(9)))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::UserRejected);
    }

    #[tokio::test]
    async fn broadcast_failure_is_retry_safe() {
        let (ledger, keys, executor) = setup(NetworkRegistry::builtin()).await;
        ledger.seed_token(TokenKind::Ready, TokenId(1), keys.address(), "maize", 10);
        ledger.fail_next_submit(ProviderError::Transport("connection reset".into()));
        let err = executor
            .execute(transfer(1, keys.address(), Address::repeat(9)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::SubmissionFailed { .. }));
        assert!(err.is_retry_safe());
    }

    #[tokio::test]
    async fn payable_value_is_sent_in_base_units() {
        let (ledger, keys, executor) = setup(NetworkRegistry::builtin()).await;
        ledger.fund(keys.address(), Decimal::new(10, 0));
        ledger.seed_token(TokenKind::Ready, TokenId(3), Address::repeat(5), "maize", 1);

        let call = ContractCall::new(ContractName::Escrow, methods::CREATE_ESCROW)
            .arg(Address::repeat(5))
            .arg(3u64)
            .payable(Decimal::new(25, 1));
        executor.execute(call).await.unwrap();
        assert_eq!(ledger.native_balance(keys.address()), Decimal::new(75, 1));
    }

    #[tokio::test]
    async fn pinned_call_ignores_later_network_change() {
        let (ledger, keys, executor) = setup(NetworkRegistry::builtin()).await;
        ledger.seed_token(TokenKind::Ready, TokenId(1), keys.address(), "maize", 10);
        let acting = executor.session().acting().await.unwrap();

        executor
            .session()
            .handle_event(crate::client::ProviderEvent::NetworkChanged(NetworkId::new(
                "sepolia",
            )))
            .await;

        let outcome = executor
            .execute_as(&acting, transfer(1, keys.address(), Address::repeat(9)))
            .await
            .unwrap();
        assert_eq!(outcome.status, TxStatus::Confirmed);
        assert_eq!(ledger.token_owner(TokenKind::Ready, TokenId(1)), Some(Address::repeat(9)));

        // Unpinned calls follow the session onto sepolia.
        let submits = ledger.counters().submits;
        let err = executor
            .execute(transfer(1, Address::repeat(9), keys.address()))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ContractUnavailable { .. }));
        assert_eq!(ledger.counters().submits, submits);
    }

    #[tokio::test]
    async fn query_reads_view() {
        let (ledger, keys, executor) = setup(NetworkRegistry::builtin()).await;
        ledger.seed_token(TokenKind::Future, TokenId(4), keys.address(), "wheat", 2);
        let network = executor.session().current_network().await.unwrap();
        let values = executor
            .query(
                &network,
                ContractName::FutureClaimToken,
                methods::BALANCE_OF,
                &[CallValue::Address(keys.address())],
            )
            .await
            .unwrap();
        assert_eq!(values, vec![CallValue::Uint(1)]);
    }
}
