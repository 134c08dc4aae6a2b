//! # cropledger-gateway
//!
//! Ledger-facing plane of the **CropLedger** gateway.
//!
//! - [`LedgerClient`] / [`KeyProvider`]: the external collaborators, as traits
//! - [`SessionManager`]: connection state, active account and network, balance cache
//! - [`TransactionExecutor`]: estimate, pad, submit, poll, and reconcile contract calls
//!
//! ## Call Flow
//!
//! ```text
//! ┌─────────────┐  acting()   ┌────────────────┐  estimate/submit  ┌──────────────┐
//! │ Coordinator ├────────────▶│ SessionManager │                   │ LedgerClient │
//! │             │             └────────────────┘                   │              │
//! │             │  execute()  ┌─────────────────────┐              │              │
//! │             ├────────────▶│ TransactionExecutor ├─────────────▶│              │
//! └─────────────┘             └─────────────────────┘   receipt    └──────┬───────┘
//!                                                                         │ events
//!                                        SessionManager::listen ◀─────────┘
//! ```
//!
//! With the `test-helpers` feature, [`testing`] provides an in-memory ledger
//! and a static key provider.

pub mod client;
pub mod executor;
pub mod session;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use client::{KeyProvider, LedgerClient, ProviderEvent};
pub use executor::TransactionExecutor;
pub use session::{ActingContext, SessionManager};
