//! Marketplace listings.
//!
//! A listing is created by `list` and deactivated, never deleted, by a
//! cancel or a successful purchase.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    Address, CallValue, ListingId, NetworkProfile, Result, TokenId, TokenKind, ValueReader,
    constants::methods,
};

/// A seller's offer as last read from the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub listing_id: ListingId,
    pub token_id: TokenId,
    pub token_kind: TokenKind,
    /// Asking price in the native asset.
    pub price: Decimal,
    pub seller: Address,
    pub active: bool,
}

impl Listing {
    /// Decode a `getListing` result: `[tokenId, tokenKind, price, seller, active]`.
    ///
    /// # Errors
    /// `MalformedResponse` / `InvalidAmount` on a bad payload.
    pub fn from_values(
        listing_id: ListingId,
        profile: &NetworkProfile,
        values: &[CallValue],
    ) -> Result<Self> {
        let mut r = ValueReader::new(methods::GET_LISTING, values);
        let token_id = TokenId(r.u64()?);
        let token_kind = TokenKind::from_code(r.uint()?)?;
        let price = profile.from_base_units(r.uint()?)?;
        let seller = r.address()?;
        let active = r.bool()?;
        Ok(Self {
            listing_id,
            token_id,
            token_kind,
            price,
            seller,
            active,
        })
    }

    /// Decode a `getActiveListings` result: a single list of ids.
    ///
    /// # Errors
    /// `MalformedResponse` if the payload is not a list of uints.
    pub fn ids_from_values(values: &[CallValue]) -> Result<Vec<ListingId>> {
        let mut r = ValueReader::new(methods::GET_ACTIVE_LISTINGS, values);
        let items = r.list()?;
        let mut inner = ValueReader::new(methods::GET_ACTIVE_LISTINGS, items);
        (0..items.len())
            .map(|_| inner.u64().map(ListingId))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LedgerError, NetworkId, NetworkRegistry};

    fn profile() -> NetworkProfile {
        NetworkRegistry::builtin()
            .profile(&NetworkId::new("localnet"))
            .cloned()
            .unwrap()
    }

    #[test]
    fn decode_listing() {
        let p = profile();
        let values = vec![
            CallValue::Uint(77),
            CallValue::Uint(1),
            CallValue::Uint(p.to_base_units(Decimal::new(500, 2)).unwrap()),
            CallValue::Address(Address::repeat(3)),
            CallValue::Bool(true),
        ];
        let listing = Listing::from_values(ListingId(4), &p, &values).unwrap();
        assert_eq!(listing.token_id, TokenId(77));
        assert_eq!(listing.token_kind, TokenKind::Ready);
        assert_eq!(listing.price, Decimal::new(5, 0));
        assert!(listing.active);
    }

    #[test]
    fn decode_active_ids() {
        let values = vec![CallValue::List(vec![CallValue::Uint(1), CallValue::Uint(3)])];
        let ids = Listing::ids_from_values(&values).unwrap();
        assert_eq!(ids, vec![ListingId(1), ListingId(3)]);
    }

    #[test]
    fn decode_active_ids_rejects_non_list() {
        let err = Listing::ids_from_values(&[CallValue::Uint(1)]).unwrap_err();
        assert!(matches!(err, LedgerError::MalformedResponse { .. }));
    }
}
