//! Token lifecycle: mint, transfer, redeem, and reads of claim tokens.
//!
//! Local pre-checks (ownership, redeemed flag) are read fresh from the
//! network right before submission but remain advisory: two actors can pass
//! the same pre-check concurrently. The contract's rejection is the final
//! word. A redeem that loses the race, whether the node refuses it at
//! estimation or it reverts in a block, is reported as `AlreadyRedeemed`.
//!
//! Every write is pinned to the network the operation started on, and a
//! read-back failure after confirmation still carries the hash.

use std::sync::Arc;

use cropledger_gateway::TransactionExecutor;
use cropledger_types::{
    Address, CallValue, Committed, ContractCall, CropMetadata, LedgerError, NetworkProfile,
    Result, Token, TokenId, TokenKind, ValueReader,
    constants::{self, events, methods},
    date_to_unix,
};

/// Mints, moves, and redeems crop claim tokens.
pub struct TokenLifecycleManager {
    executor: Arc<TransactionExecutor>,
}

impl TokenLifecycleManager {
    #[must_use]
    pub fn new(executor: Arc<TransactionExecutor>) -> Self {
        Self { executor }
    }

    /// Mint a new claim of `kind` to `to`.
    ///
    /// The token id is assigned by the contract and decoded from the
    /// confirmation.
    pub async fn mint(
        &self,
        kind: TokenKind,
        to: Address,
        quantity: u64,
        metadata: CropMetadata,
    ) -> Result<Committed<Token>> {
        if quantity == 0 {
            return Err(LedgerError::InvalidAmount {
                reason: "quantity must be positive".to_string(),
            });
        }
        let acting = self.executor.session().acting().await?;
        let call = ContractCall::new(kind.contract(), methods::MINT)
            .arg(to)
            .arg(metadata.crop_type.as_str())
            .arg(quantity)
            .arg(date_to_unix(metadata.harvest_or_ready_date));
        let outcome = self.executor.execute_as(&acting, call).await?;
        let token_id = TokenId(outcome.decode_id(events::MINTED, events::MINTED_ID)?);

        let token = fetch_token(&self.executor, &acting.network, kind, token_id)
            .await
            .map_err(|e| e.after_confirmation(outcome.hash))?;
        tracing::info!(
            token = %token_id,
            kind = %kind,
            crop = %token.crop_type,
            quantity,
            owner = %to.short(),
            hash = %outcome.hash.short(),
            "Token minted"
        );
        Ok(Committed::new(token, outcome))
    }

    /// Move `token_id` from `from` to `to`.
    ///
    /// `from` must be the connected account and the current on-chain owner;
    /// otherwise this fails with `NotOwner` before anything is submitted.
    pub async fn transfer(
        &self,
        kind: TokenKind,
        token_id: TokenId,
        from: Address,
        to: Address,
    ) -> Result<Committed<Token>> {
        let acting = self.executor.session().acting().await?;
        if from != acting.account {
            return Err(LedgerError::NotOwner {
                expected: from,
                actual: acting.account,
            });
        }
        let token = fetch_token(&self.executor, &acting.network, kind, token_id).await?;
        if token.owner != acting.account {
            return Err(LedgerError::NotOwner {
                expected: token.owner,
                actual: acting.account,
            });
        }
        if token.redeemed {
            return Err(LedgerError::InvalidStateTransition {
                subject: token_id.to_string(),
                state: "REDEEMED".to_string(),
                action: "transfer".to_string(),
            });
        }

        let call = ContractCall::new(kind.contract(), methods::TRANSFER_FROM)
            .arg(from)
            .arg(to)
            .arg(token_id.0);
        let outcome = self.executor.execute_as(&acting, call).await?;
        let token = fetch_token(&self.executor, &acting.network, kind, token_id)
            .await
            .map_err(|e| e.after_confirmation(outcome.hash))?;
        tracing::info!(
            token = %token_id,
            from = %from.short(),
            to = %to.short(),
            hash = %outcome.hash.short(),
            "Token transferred"
        );
        Ok(Committed::new(token, outcome))
    }

    /// Redeem a Ready claim. Succeeds at most once per token.
    ///
    /// # Errors
    /// `AlreadyRedeemed` if the fresh read shows the token redeemed, if the
    /// node refuses the call at estimation because a competing redeem landed
    /// first (both without a hash), or if the contract rejected the
    /// redemption in a block (with the hash of the rejected transaction).
    pub async fn redeem(&self, token_id: TokenId) -> Result<Committed<Token>> {
        let acting = self.executor.session().acting().await?;
        let token = fetch_token(&self.executor, &acting.network, TokenKind::Ready, token_id).await?;
        if token.redeemed {
            return Err(LedgerError::AlreadyRedeemed { token_id, hash: None });
        }
        if token.owner != acting.account {
            return Err(LedgerError::NotOwner {
                expected: token.owner,
                actual: acting.account,
            });
        }

        let call = ContractCall::new(TokenKind::Ready.contract(), methods::REDEEM).arg(token_id.0);
        let outcome = match self.executor.execute_as(&acting, call).await {
            Ok(outcome) => outcome,
            Err(LedgerError::RevertedOnChain { hash, .. }) => {
                tracing::warn!(token = %token_id, hash = %hash.short(), "Redeem rejected on chain");
                return Err(LedgerError::AlreadyRedeemed {
                    token_id,
                    hash: Some(hash),
                });
            }
            Err(err @ LedgerError::EstimationFailed { .. }) => {
                return Err(self.explain_refused_redeem(&acting.network, token_id, err).await);
            }
            Err(err) => return Err(err),
        };
        let token = fetch_token(&self.executor, &acting.network, TokenKind::Ready, token_id)
            .await
            .map_err(|e| e.after_confirmation(outcome.hash))?;
        tracing::info!(token = %token_id, hash = %outcome.hash.short(), "Token redeemed");
        Ok(Committed::new(token, outcome))
    }

    /// A redeem refused at estimation: if the token is now redeemed, a
    /// competing redeem landed after the pre-check. Otherwise keep `err`.
    async fn explain_refused_redeem(
        &self,
        network: &NetworkProfile,
        token_id: TokenId,
        err: LedgerError,
    ) -> LedgerError {
        match fetch_token(&self.executor, network, TokenKind::Ready, token_id).await {
            Ok(token) if token.redeemed => {
                tracing::warn!(token = %token_id, "Redeem refused at estimation: already redeemed");
                LedgerError::AlreadyRedeemed { token_id, hash: None }
            }
            _ => err,
        }
    }

    /// Read a token's current state from the network.
    pub async fn get_metadata(&self, kind: TokenKind, token_id: TokenId) -> Result<Token> {
        let network = self.executor.session().current_network().await?;
        fetch_token(&self.executor, &network, kind, token_id).await
    }

    /// Every token of `kind` held by `owner`.
    ///
    /// One round trip for the count, then two per token. Counts above
    /// [`constants::MAX_OWNED_ENUMERATION`] are truncated.
    pub async fn list_owned(&self, kind: TokenKind, owner: Address) -> Result<Vec<Token>> {
        let network = self.executor.session().current_network().await?;
        let values = self
            .executor
            .query(&network, kind.contract(), methods::BALANCE_OF, &[CallValue::Address(owner)])
            .await?;
        let count = ValueReader::new(methods::BALANCE_OF, &values).u64()?;
        if count > constants::MAX_OWNED_ENUMERATION {
            tracing::warn!(
                owner = %owner.short(),
                count,
                limit = constants::MAX_OWNED_ENUMERATION,
                "Owned token enumeration truncated"
            );
        }
        let count = count.min(constants::MAX_OWNED_ENUMERATION);
        tracing::debug!(owner = %owner.short(), kind = %kind, count, "Enumerating owned tokens");

        let mut tokens = Vec::new();
        for index in 0..count {
            let values = self
                .executor
                .query(
                    &network,
                    kind.contract(),
                    methods::TOKEN_OF_OWNER_BY_INDEX,
                    &[CallValue::Address(owner), CallValue::from(index)],
                )
                .await?;
            let token_id =
                TokenId(ValueReader::new(methods::TOKEN_OF_OWNER_BY_INDEX, &values).u64()?);
            tracing::debug!(owner = %owner.short(), index, token = %token_id, "Owned token");
            tokens.push(fetch_token(&self.executor, &network, kind, token_id).await?);
        }
        Ok(tokens)
    }
}

/// Read `tokenInfo` for one token.
pub(crate) async fn fetch_token(
    executor: &TransactionExecutor,
    network: &NetworkProfile,
    kind: TokenKind,
    token_id: TokenId,
) -> Result<Token> {
    let values = executor
        .query(network, kind.contract(), methods::TOKEN_INFO, &[CallValue::from(token_id.0)])
        .await?;
    Token::from_values(token_id, kind, &values)
}
