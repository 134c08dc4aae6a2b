//! Session model: who is acting, on which network.
//!
//! There is exactly one `Session` per running client. Only the session
//! manager mutates it; coordinators read a snapshot immediately before each
//! operation and never keep it past that operation.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, NetworkId};

/// Connection lifecycle of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
        }
    }
}

/// The connected account, current network, and cached native balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub account: Option<Address>,
    pub network_id: Option<NetworkId>,
    pub cached_balance: Decimal,
    pub state: ConnectionState,
}

impl Session {
    /// The startup state.
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            account: None,
            network_id: None,
            cached_balance: Decimal::ZERO,
            state: ConnectionState::Disconnected,
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.account.is_some()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::disconnected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_disconnected() {
        let s = Session::default();
        assert_eq!(s.state, ConnectionState::Disconnected);
        assert!(s.account.is_none());
        assert!(s.network_id.is_none());
        assert_eq!(s.cached_balance, Decimal::ZERO);
        assert!(!s.is_connected());
    }

    #[test]
    fn connected_requires_account() {
        let mut s = Session::default();
        s.state = ConnectionState::Connected;
        assert!(!s.is_connected());
        s.account = Some(Address::repeat(4));
        assert!(s.is_connected());
    }

    #[test]
    fn state_display() {
        assert_eq!(format!("{}", ConnectionState::Connecting), "CONNECTING");
    }
}
