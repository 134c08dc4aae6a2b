//! # cropledger-types
//!
//! Shared types, errors, and configuration for the **CropLedger** gateway.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`Address`], [`TxHash`], [`NetworkId`], [`TokenId`], [`EscrowId`],
//!   [`ListingId`], [`CallId`]
//! - **Network registry**: [`NetworkProfile`], [`ContractName`], [`ContractAddresses`],
//!   [`NetworkRegistry`]
//! - **Session model**: [`Session`], [`ConnectionState`]
//! - **Token model**: [`Token`], [`TokenKind`], [`CropMetadata`]
//! - **Escrow model**: [`EscrowAgreement`], [`EscrowStatus`]
//! - **Listing model**: [`Listing`]
//! - **Calls and outcomes**: [`ContractCall`], [`TransactionRequest`], [`Receipt`],
//!   [`TransactionOutcome`], [`Committed`]
//! - **Configuration**: [`ExecutorConfig`], [`GatewayConfig`]
//! - **Errors**: [`LedgerError`] with `LG_ERR_` prefix codes, [`ProviderError`]
//! - **Constants**: defaults, contract method and event names

pub mod call;
pub mod config;
pub mod constants;
pub mod error;
pub mod escrow;
pub mod ids;
pub mod listing;
pub mod network;
pub mod outcome;
pub mod session;
pub mod token;

// Re-export all primary types at crate root for ergonomic imports:
//   use cropledger_types::{Address, Token, EscrowAgreement, ...};

pub use call::*;
pub use config::*;
pub use error::*;
pub use escrow::*;
pub use ids::*;
pub use listing::*;
pub use network::*;
pub use outcome::*;
pub use session::*;
pub use token::*;

// Constants are accessed via `cropledger_types::constants::FOO`
// (not re-exported to avoid name collisions).
