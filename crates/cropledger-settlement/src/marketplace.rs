//! Marketplace coordinator: list, buy, and cancel.
//!
//! Price, seller, and active flag are always re-read from the network right
//! before a write. A price supplied by the caller is only ever compared
//! against the on-chain price, never sent in its place.

use std::sync::Arc;

use cropledger_gateway::TransactionExecutor;
use cropledger_types::{
    CallValue, Committed, ContractCall, ContractName, LedgerError, Listing, ListingId,
    NetworkProfile, Result, TokenId, TokenKind,
    constants::{events, methods},
};
use rust_decimal::Decimal;

use crate::token::fetch_token;

pub struct MarketplaceCoordinator {
    executor: Arc<TransactionExecutor>,
}

impl MarketplaceCoordinator {
    #[must_use]
    pub fn new(executor: Arc<TransactionExecutor>) -> Self {
        Self { executor }
    }

    /// Offer `token_id` for sale at `price`. The connected account must own it.
    pub async fn list(
        &self,
        token_id: TokenId,
        price: Decimal,
        kind: TokenKind,
    ) -> Result<Committed<Listing>> {
        let acting = self.executor.session().acting().await?;
        if price <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount {
                reason: format!("listing price {price} must be positive"),
            });
        }
        let price_units = acting.network.to_base_units(price)?;
        let token = fetch_token(&self.executor, &acting.network, kind, token_id).await?;
        if token.owner != acting.account {
            return Err(LedgerError::NotOwner {
                expected: token.owner,
                actual: acting.account,
            });
        }

        let call = ContractCall::new(ContractName::Marketplace, methods::LIST_TOKEN)
            .arg(token_id.0)
            .arg(kind.code())
            .arg(price_units);
        let outcome = self.executor.execute_as(&acting, call).await?;
        let listing_id = ListingId(outcome.decode_id(events::LISTED, events::LISTED_ID)?);

        let listing = self
            .fetch(&acting.network, listing_id)
            .await
            .map_err(|e| e.after_confirmation(outcome.hash))?;
        tracing::info!(
            listing = %listing_id,
            token = %token_id,
            kind = %kind,
            price = %price,
            seller = %acting.account.short(),
            hash = %outcome.hash.short(),
            "Token listed"
        );
        Ok(Committed::new(listing, outcome))
    }

    /// Buy a listing, paying exactly the on-chain price.
    ///
    /// The returned listing is the pre-purchase read with `active` cleared;
    /// it is a hint, not a fresh read.
    ///
    /// # Errors
    /// `ListingInactive` if the listing is no longer on sale, `PriceMismatch`
    /// if `price` differs from the on-chain price.
    pub async fn buy(&self, listing_id: ListingId, price: Decimal) -> Result<Committed<Listing>> {
        let acting = self.executor.session().acting().await?;
        let listing = self.fetch(&acting.network, listing_id).await?;
        if !listing.active {
            return Err(LedgerError::ListingInactive(listing_id));
        }
        if listing.price != price {
            tracing::warn!(
                listing = %listing_id,
                listed = %listing.price,
                offered = %price,
                "Price mismatch"
            );
            return Err(LedgerError::PriceMismatch {
                listed: listing.price,
                offered: price,
            });
        }

        let call = ContractCall::new(ContractName::Marketplace, methods::BUY_TOKEN)
            .arg(listing_id.0)
            .payable(listing.price);
        let outcome = self.executor.execute_as(&acting, call).await?;
        tracing::info!(
            listing = %listing_id,
            token = %listing.token_id,
            buyer = %acting.account.short(),
            price = %listing.price,
            hash = %outcome.hash.short(),
            "Listing bought"
        );
        Ok(Committed::new(Listing { active: false, ..listing }, outcome))
    }

    /// Withdraw a listing. Only its seller may cancel it.
    pub async fn cancel(&self, listing_id: ListingId) -> Result<Committed<Listing>> {
        let acting = self.executor.session().acting().await?;
        let listing = self.fetch(&acting.network, listing_id).await?;
        if listing.seller != acting.account {
            return Err(LedgerError::NotOwner {
                expected: listing.seller,
                actual: acting.account,
            });
        }
        if !listing.active {
            return Err(LedgerError::ListingInactive(listing_id));
        }

        let call =
            ContractCall::new(ContractName::Marketplace, methods::CANCEL_LISTING).arg(listing_id.0);
        let outcome = self.executor.execute_as(&acting, call).await?;
        let listing = self
            .fetch(&acting.network, listing_id)
            .await
            .map_err(|e| e.after_confirmation(outcome.hash))?;
        tracing::info!(listing = %listing_id, hash = %outcome.hash.short(), "Listing cancelled");
        Ok(Committed::new(listing, outcome))
    }

    pub async fn get_active_listings(&self) -> Result<Vec<ListingId>> {
        let network = self.executor.session().current_network().await?;
        let values = self
            .executor
            .query(&network, ContractName::Marketplace, methods::GET_ACTIVE_LISTINGS, &[])
            .await?;
        Listing::ids_from_values(&values)
    }

    pub async fn get_listing(&self, listing_id: ListingId) -> Result<Listing> {
        let network = self.executor.session().current_network().await?;
        self.fetch(&network, listing_id).await
    }

    async fn fetch(&self, network: &NetworkProfile, listing_id: ListingId) -> Result<Listing> {
        let args = [CallValue::from(listing_id.0)];
        let values = self
            .executor
            .query(network, ContractName::Marketplace, methods::GET_LISTING, &args)
            .await?;
        Listing::from_values(listing_id, network, &values)
    }
}
