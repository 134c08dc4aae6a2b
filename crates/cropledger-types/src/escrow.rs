//! Escrow agreements.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐  release   ┌───────────┐
//!   │ PENDING ├───────────▶│ COMPLETED │
//!   └─┬─────┬─┘            └───────────┘
//!     │     │ refund       ┌──────────┐
//!     │     └─────────────▶│ REFUNDED │
//!     │ arbitration        └──────────┘
//!     ▼ (out of band, read only)
//!   ┌──────────┐
//!   │ DISPUTED │
//!   └──────────┘
//! ```
//!
//! All three non-pending states are terminal. Funds are locked atomically
//! with creation; `status` is the only field that changes afterwards.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    Address, CallValue, EscrowId, LedgerError, NetworkProfile, Result, TokenId, ValueReader,
    constants::methods,
};

/// Lifecycle state of an escrow agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowStatus {
    /// Funds locked, awaiting delivery confirmation.
    Pending,
    /// Funds released to the seller.
    Completed,
    /// Funds returned to the buyer.
    Refunded,
    /// Under external arbitration. Never set by this layer.
    Disputed,
}

impl EscrowStatus {
    /// Can the escrow move from this state to `target` through this layer?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Completed | Self::Refunded)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Parse the escrow contract's numeric status code.
    ///
    /// # Errors
    /// `MalformedResponse` for unknown codes.
    pub fn from_code(code: u128) -> Result<Self> {
        match code {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Completed),
            2 => Ok(Self::Refunded),
            3 => Ok(Self::Disputed),
            other => Err(LedgerError::MalformedResponse {
                method: methods::GET_ESCROW.to_string(),
                reason: format!("unknown escrow status code {other}"),
            }),
        }
    }

    #[must_use]
    pub fn code(self) -> u64 {
        match self {
            Self::Pending => 0,
            Self::Completed => 1,
            Self::Refunded => 2,
            Self::Disputed => 3,
        }
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Refunded => write!(f, "REFUNDED"),
            Self::Disputed => write!(f, "DISPUTED"),
        }
    }
}

/// An escrow agreement as last read from the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowAgreement {
    pub escrow_id: EscrowId,
    pub buyer: Address,
    pub seller: Address,
    /// Locked amount in the native asset.
    pub amount: Decimal,
    pub token_id: TokenId,
    pub status: EscrowStatus,
}

impl EscrowAgreement {
    /// Decode a `getEscrow` result: `[buyer, seller, amount, tokenId, status]`.
    ///
    /// # Errors
    /// `MalformedResponse` / `InvalidAmount` on a bad payload.
    pub fn from_values(
        escrow_id: EscrowId,
        profile: &NetworkProfile,
        values: &[CallValue],
    ) -> Result<Self> {
        let mut r = ValueReader::new(methods::GET_ESCROW, values);
        let buyer = r.address()?;
        let seller = r.address()?;
        let amount = profile.from_base_units(r.uint()?)?;
        let token_id = TokenId(r.u64()?);
        let status = EscrowStatus::from_code(r.uint()?)?;
        Ok(Self {
            escrow_id,
            buyer,
            seller,
            amount,
            token_id,
            status,
        })
    }

    /// Guard a transition, naming the action in the error.
    ///
    /// # Errors
    /// `InvalidStateTransition` if `target` is not reachable from the
    /// current status.
    pub fn check_transition(&self, target: EscrowStatus, action: &str) -> Result<()> {
        if self.status.can_transition_to(target) {
            Ok(())
        } else {
            Err(LedgerError::InvalidStateTransition {
                subject: self.escrow_id.to_string(),
                state: self.status.to_string(),
                action: action.to_string(),
            })
        }
    }
}
