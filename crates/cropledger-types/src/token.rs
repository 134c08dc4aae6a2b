//! Crop claim tokens.
//!
//! Two token families share one contract interface:
//! - **Future** claims are minted against an expected harvest and are never
//!   redeemed by this layer (delivery workflows consume them elsewhere).
//! - **Ready** claims cover harvested, deliverable produce and flip
//!   `redeemed` from `false` to `true` exactly once. That flip is terminal.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{Address, CallValue, ContractName, LedgerError, Result, TokenId, ValueReader};

/// Which claim-token contract a token lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Future,
    Ready,
}

impl TokenKind {
    /// The contract that holds tokens of this kind.
    #[must_use]
    pub fn contract(self) -> ContractName {
        match self {
            Self::Future => ContractName::FutureClaimToken,
            Self::Ready => ContractName::ReadyClaimToken,
        }
    }

    /// On-chain numeric code, as stored by the marketplace.
    #[must_use]
    pub fn code(self) -> u64 {
        match self {
            Self::Future => 0,
            Self::Ready => 1,
        }
    }

    /// Parse an on-chain code.
    ///
    /// # Errors
    /// `MalformedResponse` for unknown codes.
    pub fn from_code(code: u128) -> Result<Self> {
        match code {
            0 => Ok(Self::Future),
            1 => Ok(Self::Ready),
            other => Err(LedgerError::MalformedResponse {
                method: "tokenKind".to_string(),
                reason: format!("unknown token kind code {other}"),
            }),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Future => write!(f, "FUTURE"),
            Self::Ready => write!(f, "READY"),
        }
    }
}

/// Descriptive data supplied at mint time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropMetadata {
    pub crop_type: String,
    /// Expected harvest date for Future claims, ready date for Ready claims.
    pub harvest_or_ready_date: NaiveDate,
}

impl CropMetadata {
    #[must_use]
    pub fn new(crop_type: impl Into<String>, harvest_or_ready_date: NaiveDate) -> Self {
        Self {
            crop_type: crop_type.into(),
            harvest_or_ready_date,
        }
    }
}

/// A claim token as last read from the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token_id: TokenId,
    pub kind: TokenKind,
    pub crop_type: String,
    pub quantity: u64,
    pub owner: Address,
    pub harvest_or_ready_date: NaiveDate,
    /// Always `false` for Future tokens.
    pub redeemed: bool,
}

impl Token {
    /// Decode a `tokenInfo` result: `[owner, cropType, quantity, date, redeemed]`.
    ///
    /// # Errors
    /// `MalformedResponse` if the values have the wrong shape.
    pub fn from_values(token_id: TokenId, kind: TokenKind, values: &[CallValue]) -> Result<Self> {
        let mut r = ValueReader::new(crate::constants::methods::TOKEN_INFO, values);
        let owner = r.address()?;
        let crop_type = r.text()?;
        let quantity = r.u64()?;
        let date = date_from_unix(r.uint()?)?;
        let redeemed = r.bool()?;
        Ok(Self {
            token_id,
            kind,
            crop_type,
            quantity,
            owner,
            harvest_or_ready_date: date,
            redeemed: kind == TokenKind::Ready && redeemed,
        })
    }

    #[must_use]
    pub fn is_redeemable(&self) -> bool {
        self.kind == TokenKind::Ready && !self.redeemed
    }
}

/// Encode a date as unix seconds at midnight UTC. Pre-epoch dates clamp to 0.
#[must_use]
pub fn date_to_unix(date: NaiveDate) -> u128 {
    let secs = date.and_time(NaiveTime::MIN).and_utc().timestamp();
    u128::try_from(secs).unwrap_or(0)
}

/// Decode unix seconds into a date.
///
/// # Errors
/// `MalformedResponse` if the timestamp is out of range.
pub fn date_from_unix(secs: u128) -> Result<NaiveDate> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .map(|dt| dt.date_naive())
        .ok_or_else(|| LedgerError::MalformedResponse {
            method: crate::constants::methods::TOKEN_INFO.to_string(),
            reason: format!("timestamp {secs} out of range"),
        })
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl CropMetadata {
    pub fn dummy(crop_type: &str) -> Self {
        Self::new(
            crop_type,
            NaiveDate::from_ymd_opt(2026, 11, 15).unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(redeemed: bool) -> Vec<CallValue> {
        let date = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        vec![
            CallValue::Address(Address::repeat(7)),
            CallValue::Text("sorghum".into()),
            CallValue::Uint(1200),
            CallValue::Uint(date_to_unix(date)),
            CallValue::Bool(redeemed),
        ]
    }

    #[test]
    fn decode_ready_token() {
        let token = Token::from_values(TokenId(77), TokenKind::Ready, &info(false)).unwrap();
        assert_eq!(token.owner, Address::repeat(7));
        assert_eq!(token.crop_type, "sorghum");
        assert_eq!(token.quantity, 1200);
        assert_eq!(
            token.harvest_or_ready_date,
            NaiveDate::from_ymd_opt(2026, 9, 1).unwrap()
        );
        assert!(token.is_redeemable());
    }

    #[test]
    fn future_tokens_never_report_redeemed() {
        let token = Token::from_values(TokenId(1), TokenKind::Future, &info(true)).unwrap();
        assert!(!token.redeemed);
        assert!(!token.is_redeemable());
    }

    #[test]
    fn decode_rejects_short_payload() {
        let err = Token::from_values(TokenId(1), TokenKind::Ready, &info(false)[..3]).unwrap_err();
        assert!(matches!(err, LedgerError::MalformedResponse { .. }));
    }

    #[test]
    fn kind_maps_to_contract() {
        assert_eq!(TokenKind::Future.contract(), ContractName::FutureClaimToken);
        assert_eq!(TokenKind::Ready.contract(), ContractName::ReadyClaimToken);
        assert_eq!(TokenKind::from_code(1).unwrap(), TokenKind::Ready);
        assert!(TokenKind::from_code(9).is_err());
    }

    #[test]
    fn date_roundtrip() {
        let date = NaiveDate::from_ymd_opt(2027, 3, 14).unwrap();
        assert_eq!(date_from_unix(date_to_unix(date)).unwrap(), date);
    }
}
