//! Escrow coordinator.
//!
//! ```text
//!                 release    ┌───────────┐
//!            ┌──────────────▶│ COMPLETED │
//!   ┌────────┴┐              └───────────┘
//!   │ PENDING │   refund     ┌──────────┐
//!   └────────┬┴─────────────▶│ REFUNDED │
//!            │               └──────────┘
//!            │ arbitration   ┌──────────┐
//!            └ ─ ─ ─ ─ ─ ─ ─▶│ DISPUTED │  (read only here)
//!                            └──────────┘
//! ```
//!
//! Every write re-reads the agreement first, so a terminal status is
//! rejected locally with `InvalidStateTransition` and nothing is submitted.
//! After confirmation the agreement is read back on the same network; if
//! that read fails the error still carries the transaction hash.

use std::sync::Arc;

use cropledger_gateway::TransactionExecutor;
use cropledger_types::{
    Address, CallValue, Committed, ContractCall, ContractName, EscrowAgreement, EscrowId,
    EscrowStatus, LedgerError, NetworkProfile, Result, TokenId,
    constants::{events, methods},
};
use rust_decimal::Decimal;

pub struct EscrowCoordinator {
    executor: Arc<TransactionExecutor>,
}

impl EscrowCoordinator {
    #[must_use]
    pub fn new(executor: Arc<TransactionExecutor>) -> Self {
        Self { executor }
    }

    /// Lock `amount` from `buyer` against `token_id` in favour of `seller`.
    ///
    /// `buyer` must be the connected account, since it signs and pays.
    pub async fn create_escrow(
        &self,
        buyer: Address,
        seller: Address,
        amount: Decimal,
        token_id: TokenId,
    ) -> Result<Committed<EscrowAgreement>> {
        let acting = self.executor.session().acting().await?;
        if buyer != acting.account {
            return Err(LedgerError::SignerMismatch {
                expected: buyer,
                actual: acting.account,
            });
        }
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount {
                reason: format!("escrow amount {amount} must be positive"),
            });
        }

        let call = ContractCall::new(ContractName::Escrow, methods::CREATE_ESCROW)
            .arg(seller)
            .arg(token_id.0)
            .payable(amount);
        let outcome = self.executor.execute_as(&acting, call).await?;
        let escrow_id =
            EscrowId(outcome.decode_id(events::ESCROW_CREATED, events::ESCROW_CREATED_ID)?);

        let agreement = self
            .fetch(&acting.network, escrow_id)
            .await
            .map_err(|e| e.after_confirmation(outcome.hash))?;
        tracing::info!(
            escrow = %escrow_id,
            buyer = %buyer.short(),
            seller = %seller.short(),
            amount = %amount,
            token = %token_id,
            hash = %outcome.hash.short(),
            "Escrow created"
        );
        Ok(Committed::new(agreement, outcome))
    }

    /// Pay the seller. Valid only from `Pending`.
    pub async fn release(&self, escrow_id: EscrowId) -> Result<Committed<EscrowAgreement>> {
        self.transition(escrow_id, EscrowStatus::Completed, methods::RELEASE_FUNDS, "release")
            .await
    }

    /// Return the funds to the buyer. Valid only from `Pending`.
    pub async fn refund(&self, escrow_id: EscrowId) -> Result<Committed<EscrowAgreement>> {
        self.transition(escrow_id, EscrowStatus::Refunded, methods::REFUND, "refund")
            .await
    }

    /// The agreement as the network sees it now.
    pub async fn get_details(&self, escrow_id: EscrowId) -> Result<EscrowAgreement> {
        let network = self.executor.session().current_network().await?;
        self.fetch(&network, escrow_id).await
    }

    async fn transition(
        &self,
        escrow_id: EscrowId,
        target: EscrowStatus,
        method: &str,
        action: &str,
    ) -> Result<Committed<EscrowAgreement>> {
        let acting = self.executor.session().acting().await?;
        let current = self.fetch(&acting.network, escrow_id).await?;
        if let Err(err) = current.check_transition(target, action) {
            tracing::warn!(
                escrow = %escrow_id,
                status = %current.status,
                action,
                "Escrow transition rejected"
            );
            return Err(err);
        }

        let call = ContractCall::new(ContractName::Escrow, method).arg(escrow_id.0);
        let outcome = self.executor.execute_as(&acting, call).await?;
        let updated = self
            .fetch(&acting.network, escrow_id)
            .await
            .map_err(|e| e.after_confirmation(outcome.hash))?;
        tracing::info!(
            escrow = %escrow_id,
            from = %current.status,
            to = %updated.status,
            hash = %outcome.hash.short(),
            "Escrow settled"
        );
        Ok(Committed::new(updated, outcome))
    }

    async fn fetch(
        &self,
        network: &NetworkProfile,
        escrow_id: EscrowId,
    ) -> Result<EscrowAgreement> {
        let args = [CallValue::from(escrow_id.0)];
        let values = self
            .executor
            .query(network, ContractName::Escrow, methods::GET_ESCROW, &args)
            .await?;
        EscrowAgreement::from_values(escrow_id, network, &values)
    }
}

#[cfg(test)]
mod tests {
    use cropledger_types::{ErrorKind, ProviderError, TxStatus};

    use super::*;
    use crate::test_support::{ledger, party};

    #[tokio::test]
    async fn buyer_must_be_signer() {
        let ledger = ledger();
        let me = party(&ledger, 1).await;
        let err = me
            .gateway
            .escrow()
            .create_escrow(Address::repeat(3), Address::repeat(4), Decimal::ONE, TokenId(1))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::SignerMismatch {
                expected: Address::repeat(3),
                actual: me.keys.address()
            }
        );
        assert_eq!(ledger.counters().estimates, 0);
    }

    #[tokio::test]
    async fn non_positive_amount_rejected() {
        let ledger = ledger();
        let me = party(&ledger, 1).await;
        let err = me
            .gateway
            .escrow()
            .create_escrow(me.keys.address(), Address::repeat(4), Decimal::ZERO, TokenId(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAmount);
    }

    #[tokio::test]
    async fn seller_refund_returns_funds() {
        let ledger = ledger();
        let buyer = party(&ledger, 1).await;
        let seller = party(&ledger, 2).await;
        ledger.fund(buyer.keys.address(), Decimal::new(100, 0));

        let created = buyer
            .gateway
            .escrow()
            .create_escrow(
                buyer.keys.address(),
                seller.keys.address(),
                Decimal::new(40, 0),
                TokenId(5),
            )
            .await
            .unwrap();
        assert_eq!(ledger.native_balance(buyer.keys.address()), Decimal::new(60, 0));

        let refunded = seller
            .gateway
            .escrow()
            .refund(created.value.escrow_id)
            .await
            .unwrap();
        assert_eq!(refunded.value.status, EscrowStatus::Refunded);
        assert_eq!(refunded.outcome.status, TxStatus::Confirmed);
        assert_eq!(ledger.native_balance(buyer.keys.address()), Decimal::new(100, 0));
    }

    #[tokio::test]
    async fn disputed_escrow_is_read_only() {
        let ledger = ledger();
        let buyer = party(&ledger, 1).await;
        ledger.fund(buyer.keys.address(), Decimal::new(10, 0));
        let created = buyer
            .gateway
            .escrow()
            .create_escrow(buyer.keys.address(), Address::repeat(4), Decimal::new(2, 0), TokenId(5))
            .await
            .unwrap();
        let id = created.value.escrow_id;
        assert!(ledger.set_escrow_status(id, EscrowStatus::Disputed));
        let submits = ledger.counters().submits;

        for result in [
            buyer.gateway.escrow().release(id).await,
            buyer.gateway.escrow().refund(id).await,
        ] {
            assert!(matches!(
                result,
                Err(LedgerError::InvalidStateTransition { ref state, .. }) if state == "DISPUTED"
            ));
        }
        assert_eq!(ledger.counters().submits, submits);
        assert_eq!(
            buyer.gateway.escrow().get_details(id).await.unwrap().status,
            EscrowStatus::Disputed
        );
    }

    #[tokio::test]
    async fn missing_creation_event_is_malformed() {
        let ledger = ledger();
        let buyer = party(&ledger, 1).await;
        ledger.fund(buyer.keys.address(), Decimal::new(10, 0));
        ledger.set_emit_events(false);

        let err = buyer
            .gateway
            .escrow()
            .create_escrow(buyer.keys.address(), Address::repeat(4), Decimal::ONE, TokenId(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::MalformedConfirmation { ref event, .. } if event == "EscrowCreated"
        ));
        assert!(err.tx_hash().is_some());
    }

    #[tokio::test]
    async fn release_read_back_failure_keeps_hash() {
        let ledger = ledger();
        let buyer = party(&ledger, 1).await;
        let seller = Address::repeat(4);
        ledger.fund(buyer.keys.address(), Decimal::new(10, 0));
        let id = buyer
            .gateway
            .escrow()
            .create_escrow(buyer.keys.address(), seller, Decimal::new(3, 0), TokenId(5))
            .await
            .unwrap()
            .into_value()
            .escrow_id;

        // Mining waits one poll, so the failure lands after the pre-read
        // and before the read-back.
        ledger.set_mine_after_polls(1);
        let (result, ()) = tokio::join!(buyer.gateway.escrow().release(id), async {
            ledger.fail_next_view(ProviderError::Transport("eof".into()));
        });
        let err = result.unwrap_err();
        let LedgerError::ReadBackFailed { hash, ref source } = err else {
            panic!("expected a read-back failure, got {err:?}");
        };
        assert_eq!(source.kind(), ErrorKind::QueryFailed);
        assert_eq!(ledger.native_balance(seller), Decimal::new(3, 0));
        let outcome = buyer.gateway.executor().reconcile(hash).await.unwrap();
        assert_eq!(outcome.status, TxStatus::Confirmed);
    }
}
