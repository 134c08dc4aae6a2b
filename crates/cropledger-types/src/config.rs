//! Configuration types for the gateway.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{LedgerError, NetworkRegistry, Result, constants, network::RawRegistry};

/// Transaction executor tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Percentage added on top of every gas estimate. Never shrinks it.
    pub gas_margin_percent: u32,
    /// Interval between receipt polls in milliseconds.
    pub poll_interval_ms: u64,
    /// Receipt polls before the call is reported as timed out.
    pub max_poll_attempts: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            gas_margin_percent: constants::DEFAULT_GAS_MARGIN_PERCENT,
            poll_interval_ms: constants::DEFAULT_POLL_INTERVAL_MS,
            max_poll_attempts: constants::DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Upper bound on how long one call may spend polling.
    #[must_use]
    pub fn poll_budget(&self) -> Duration {
        self.poll_interval() * self.max_poll_attempts
    }

    /// Pad a gas estimate by the configured margin, rounding up.
    #[must_use]
    pub fn apply_margin(&self, estimate: u64) -> u64 {
        let padded = u128::from(estimate) * (100 + u128::from(self.gas_margin_percent));
        let padded = padded.div_ceil(100);
        u64::try_from(padded).unwrap_or(u64::MAX).max(estimate)
    }

    /// # Errors
    /// `Configuration` if the poll loop could never observe a receipt.
    pub fn validate(&self) -> Result<()> {
        if self.max_poll_attempts == 0 {
            return Err(LedgerError::Configuration(
                "max_poll_attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub networks: NetworkRegistry,
}

/// Shape of the JSON document. The registry is validated separately so its
/// problems surface as `Configuration` rather than as a parse failure.
#[derive(Deserialize)]
struct RawGatewayConfig {
    #[serde(default)]
    executor: ExecutorConfig,
    networks: Option<RawRegistry>,
}

impl GatewayConfig {
    /// Parse and validate a JSON configuration document.
    ///
    /// # Errors
    /// `Serialization` for malformed JSON, `Configuration` for an invalid
    /// network registry or executor settings.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawGatewayConfig = serde_json::from_str(json)?;
        let networks = match raw.networks {
            Some(networks) => NetworkRegistry::try_from(networks)?,
            None => NetworkRegistry::default(),
        };
        let config = Self {
            executor: raw.executor,
            networks,
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// See [`ExecutorConfig::validate`].
    pub fn validate(&self) -> Result<()> {
        self.executor.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContractName, NetworkId};

    #[test]
    fn executor_defaults() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.gas_margin_percent, 20);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.max_poll_attempts, 60);
        assert_eq!(cfg.poll_budget(), Duration::from_secs(60));
    }

    #[test]
    fn margin_rounds_up_and_never_shrinks() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.apply_margin(100_000), 120_000);
        assert_eq!(cfg.apply_margin(1), 2);
        assert_eq!(cfg.apply_margin(0), 0);
        let none = ExecutorConfig {
            gas_margin_percent: 0,
            ..ExecutorConfig::default()
        };
        assert_eq!(none.apply_margin(21_000), 21_000);
        assert_eq!(cfg.apply_margin(u64::MAX), u64::MAX);
    }

    #[test]
    fn zero_poll_attempts_rejected() {
        let cfg = ExecutorConfig {
            max_poll_attempts: 0,
            ..ExecutorConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(LedgerError::Configuration(_))));
    }

    #[test]
    fn empty_json_uses_defaults() {
        let cfg = GatewayConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, GatewayConfig::default());
    }

    #[test]
    fn json_overrides() {
        let json = r#"{
            "executor": { "poll_interval_ms": 250 },
            "networks": {
                "profiles": [{
                    "id": "devnet",
                    "display_name": "Devnet",
                    "rpc_endpoint": "http://10.0.0.2:8545",
                    "native_asset_symbol": "DEV",
                    "native_asset_decimals": 6
                }],
                "contracts": {
                    "devnet": { "escrow": "0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0" }
                }
            }
        }"#;
        let cfg = GatewayConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.executor.poll_interval_ms, 250);
        assert_eq!(cfg.executor.max_poll_attempts, 60);
        let devnet = NetworkId::new("devnet");
        assert!(cfg.networks.is_available(ContractName::Escrow, &devnet));
        assert!(!cfg.networks.is_available(ContractName::Marketplace, &devnet));
    }

    #[test]
    fn invalid_registry_in_json_is_a_configuration_error() {
        let json = r#"{ "networks": { "profiles": [], "contracts": { "ghost": {} } } }"#;
        assert!(matches!(
            GatewayConfig::from_json_str(json),
            Err(LedgerError::Configuration(_))
        ));
    }

    #[test]
    fn duplicate_network_in_json_is_a_configuration_error() {
        let profile = r#"{
            "id": "devnet",
            "display_name": "Devnet",
            "rpc_endpoint": "http://10.0.0.2:8545",
            "native_asset_symbol": "DEV",
            "native_asset_decimals": 6
        }"#;
        let json = format!(r#"{{ "networks": {{ "profiles": [{profile}, {profile}] }} }}"#);
        let err = GatewayConfig::from_json_str(&json).unwrap_err();
        assert!(
            matches!(err, LedgerError::Configuration(ref msg) if msg.contains("duplicate")),
            "{err:?}"
        );
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        assert!(matches!(
            GatewayConfig::from_json_str(r#"{ "executor": "#),
            Err(LedgerError::Serialization(_))
        ));
    }
}
