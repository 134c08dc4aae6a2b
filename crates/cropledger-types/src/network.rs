//! Network profile registry.
//!
//! Static catalogue of the ledger networks the gateway can talk to, plus the
//! per-network deployment addresses of the four logical contracts. Loaded
//! once at startup and never mutated afterwards.
//!
//! A contract is **available** on a network only when its address is present
//! and non-zero. Callers ask [`NetworkRegistry::contract_address`] before any
//! network traffic, so a missing deployment fails as a configuration error
//! instead of a wasted round trip.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::{Address, LedgerError, NetworkId, Result, TxHash, constants};

// ---------------------------------------------------------------------------
// NetworkProfile
// ---------------------------------------------------------------------------

/// Immutable description of one ledger network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    pub id: NetworkId,
    pub display_name: String,
    pub rpc_endpoint: String,
    /// Explorer link template with `{kind}` (`tx` or `address`) and `{value}`
    /// placeholders. Empty when the network has no explorer.
    #[serde(default)]
    pub explorer_url_template: String,
    pub native_asset_symbol: String,
    pub native_asset_decimals: u32,
}

impl NetworkProfile {
    /// Explorer link for a transaction.
    #[must_use]
    pub fn tx_url(&self, hash: &TxHash) -> Option<String> {
        self.explorer_url("tx", &hash.to_string())
    }

    /// Explorer link for an account or contract.
    #[must_use]
    pub fn address_url(&self, address: &Address) -> Option<String> {
        self.explorer_url("address", &address.to_string())
    }

    fn explorer_url(&self, kind: &str, value: &str) -> Option<String> {
        if self.explorer_url_template.is_empty() {
            return None;
        }
        Some(
            self.explorer_url_template
                .replace("{kind}", kind)
                .replace("{value}", value),
        )
    }

    /// Convert a native-asset amount into integer base units.
    ///
    /// # Errors
    /// `InvalidAmount` for negative amounts, amounts finer than the asset's
    /// decimals, or amounts that overflow.
    pub fn to_base_units(&self, amount: Decimal) -> Result<u128> {
        if amount.is_sign_negative() {
            return Err(LedgerError::InvalidAmount {
                reason: format!("{amount} is negative"),
            });
        }
        let scaled = amount
            .checked_mul(self.unit_scale()?)
            .ok_or_else(|| LedgerError::InvalidAmount {
                reason: format!("{amount} {} overflows base units", self.native_asset_symbol),
            })?;
        if !scaled.fract().is_zero() {
            return Err(LedgerError::InvalidAmount {
                reason: format!(
                    "{amount} has more than {} decimals",
                    self.native_asset_decimals
                ),
            });
        }
        scaled.to_u128().ok_or_else(|| LedgerError::InvalidAmount {
            reason: format!("{amount} does not fit in base units"),
        })
    }

    /// Convert integer base units back into a native-asset amount.
    ///
    /// # Errors
    /// `InvalidAmount` if the value exceeds what `Decimal` can represent.
    pub fn from_base_units(&self, units: u128) -> Result<Decimal> {
        base_units_to_decimal(units, self.native_asset_decimals)
    }

    fn unit_scale(&self) -> Result<Decimal> {
        (0..self.native_asset_decimals)
            .try_fold(Decimal::ONE, |acc, _| acc.checked_mul(Decimal::TEN))
            .ok_or_else(|| LedgerError::InvalidAmount {
                reason: format!("{} decimals out of range", self.native_asset_decimals),
            })
    }
}

/// Convert base units with the given decimals into a `Decimal`.
///
/// # Errors
/// `InvalidAmount` when the value or scale is out of `Decimal` range.
pub fn base_units_to_decimal(units: u128, decimals: u32) -> Result<Decimal> {
    let signed = i128::try_from(units).map_err(|_| LedgerError::InvalidAmount {
        reason: format!("{units} base units out of range"),
    })?;
    Decimal::try_from_i128_with_scale(signed, decimals)
        .map(|d| d.normalize())
        .map_err(|e| LedgerError::InvalidAmount {
            reason: format!("{units} base units at scale {decimals}: {e}"),
        })
}

// ---------------------------------------------------------------------------
// ContractName / ContractRegistry
// ---------------------------------------------------------------------------

/// The four logical contracts the gateway talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum ContractName {
    FutureClaimToken,
    ReadyClaimToken,
    Escrow,
    Marketplace,
}

impl ContractName {
    pub const ALL: [Self; 4] = [
        Self::FutureClaimToken,
        Self::ReadyClaimToken,
        Self::Escrow,
        Self::Marketplace,
    ];
}

impl fmt::Display for ContractName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FutureClaimToken => write!(f, "FutureClaimToken"),
            Self::ReadyClaimToken => write!(f, "ReadyClaimToken"),
            Self::Escrow => write!(f, "Escrow"),
            Self::Marketplace => write!(f, "Marketplace"),
        }
    }
}

/// Deployment addresses of the four contracts on one network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddresses {
    #[serde(default)]
    pub future_claim_token: Option<Address>,
    #[serde(default)]
    pub ready_claim_token: Option<Address>,
    #[serde(default)]
    pub escrow: Option<Address>,
    #[serde(default)]
    pub marketplace: Option<Address>,
}

impl ContractAddresses {
    /// The configured address, treating the zero address as "not deployed".
    #[must_use]
    pub fn get(&self, contract: ContractName) -> Option<Address> {
        let slot = match contract {
            ContractName::FutureClaimToken => self.future_claim_token,
            ContractName::ReadyClaimToken => self.ready_claim_token,
            ContractName::Escrow => self.escrow,
            ContractName::Marketplace => self.marketplace,
        };
        slot.filter(|addr| !addr.is_zero())
    }
}

/// Per-network contract deployments.
pub type ContractRegistry = BTreeMap<NetworkId, ContractAddresses>;

// ---------------------------------------------------------------------------
// NetworkRegistry
// ---------------------------------------------------------------------------

/// Supported networks and their contract deployments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRegistry", into = "RawRegistry")]
pub struct NetworkRegistry {
    profiles: BTreeMap<NetworkId, NetworkProfile>,
    contracts: ContractRegistry,
}

/// Registry as written in configuration, before validation.
#[derive(Serialize, Deserialize)]
pub(crate) struct RawRegistry {
    profiles: Vec<NetworkProfile>,
    #[serde(default)]
    contracts: ContractRegistry,
}

impl TryFrom<RawRegistry> for NetworkRegistry {
    type Error = LedgerError;

    fn try_from(raw: RawRegistry) -> Result<Self> {
        Self::new(raw.profiles, raw.contracts)
    }
}

impl From<NetworkRegistry> for RawRegistry {
    fn from(registry: NetworkRegistry) -> Self {
        Self {
            profiles: registry.profiles.into_values().collect(),
            contracts: registry.contracts,
        }
    }
}

impl NetworkRegistry {
    /// Build a registry, rejecting duplicate ids, out-of-range decimals, and
    /// deployments for networks with no profile.
    ///
    /// # Errors
    /// `Configuration` describing the first problem found.
    pub fn new(profiles: Vec<NetworkProfile>, contracts: ContractRegistry) -> Result<Self> {
        let mut by_id = BTreeMap::new();
        for profile in profiles {
            if profile.native_asset_decimals > constants::MAX_NATIVE_DECIMALS {
                return Err(LedgerError::Configuration(format!(
                    "network {} declares {} decimals (max {})",
                    profile.id,
                    profile.native_asset_decimals,
                    constants::MAX_NATIVE_DECIMALS
                )));
            }
            let id = profile.id.clone();
            if by_id.insert(id.clone(), profile).is_some() {
                return Err(LedgerError::Configuration(format!(
                    "duplicate network id {id}"
                )));
            }
        }
        let known: BTreeSet<&NetworkId> = by_id.keys().collect();
        if let Some(orphan) = contracts.keys().find(|id| !known.contains(id)) {
            return Err(LedgerError::Configuration(format!(
                "contracts configured for unknown network {orphan}"
            )));
        }
        Ok(Self {
            profiles: by_id,
            contracts,
        })
    }

    /// Built-in catalogue: a local development chain with the default
    /// deployment addresses of a fresh dev node, plus Sepolia and Polygon
    /// Amoy with no deployments yet.
    #[must_use]
    pub fn builtin() -> Self {
        let localnet = NetworkProfile {
            id: NetworkId::new("localnet"),
            display_name: "Local Development Chain".to_string(),
            rpc_endpoint: "http://127.0.0.1:8545".to_string(),
            explorer_url_template: String::new(),
            native_asset_symbol: "ETH".to_string(),
            native_asset_decimals: 18,
        };
        let sepolia = NetworkProfile {
            id: NetworkId::new("sepolia"),
            display_name: "Sepolia Testnet".to_string(),
            rpc_endpoint: "https://rpc.sepolia.org".to_string(),
            explorer_url_template: "https://sepolia.etherscan.io/{kind}/{value}".to_string(),
            native_asset_symbol: "ETH".to_string(),
            native_asset_decimals: 18,
        };
        let amoy = NetworkProfile {
            id: NetworkId::new("polygon-amoy"),
            display_name: "Polygon Amoy Testnet".to_string(),
            rpc_endpoint: "https://rpc-amoy.polygon.technology".to_string(),
            explorer_url_template: "https://amoy.polygonscan.com/{kind}/{value}".to_string(),
            native_asset_symbol: "POL".to_string(),
            native_asset_decimals: 18,
        };

        let mut contracts = ContractRegistry::new();
        contracts.insert(
            localnet.id.clone(),
            ContractAddresses {
                future_claim_token: Some(LOCALNET_FUTURE_CLAIM_TOKEN),
                ready_claim_token: Some(LOCALNET_READY_CLAIM_TOKEN),
                escrow: Some(LOCALNET_ESCROW),
                marketplace: Some(LOCALNET_MARKETPLACE),
            },
        );
        contracts.insert(sepolia.id.clone(), ContractAddresses::default());
        contracts.insert(amoy.id.clone(), ContractAddresses::default());

        let profiles = [localnet, sepolia, amoy]
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        Self {
            profiles,
            contracts,
        }
    }

    #[must_use]
    pub fn profile(&self, id: &NetworkId) -> Option<&NetworkProfile> {
        self.profiles.get(id)
    }

    /// Look up a profile, failing with `UnsupportedNetwork` when absent.
    pub fn require_profile(&self, id: &NetworkId) -> Result<&NetworkProfile> {
        self.profiles
            .get(id)
            .ok_or_else(|| LedgerError::UnsupportedNetwork(id.clone()))
    }

    /// Resolve a contract address, failing fast when it is not deployed.
    ///
    /// # Errors
    /// `ContractUnavailable` if the network has no non-zero address for it.
    pub fn contract_address(&self, contract: ContractName, network: &NetworkId) -> Result<Address> {
        self.contracts
            .get(network)
            .and_then(|deployed| deployed.get(contract))
            .ok_or_else(|| LedgerError::ContractUnavailable {
                contract,
                network: network.clone(),
            })
    }

    #[must_use]
    pub fn is_available(&self, contract: ContractName, network: &NetworkId) -> bool {
        self.contract_address(contract, network).is_ok()
    }

    pub fn network_ids(&self) -> impl Iterator<Item = &NetworkId> {
        self.profiles.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

// Deployment addresses a fresh local dev node assigns, in deploy order.
const LOCALNET_FUTURE_CLAIM_TOKEN: Address =
    Address::from_hex_const("0x5FbDB2315678afecb367f032d93F642f64180aa3");
const LOCALNET_READY_CLAIM_TOKEN: Address =
    Address::from_hex_const("0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512");
const LOCALNET_ESCROW: Address =
    Address::from_hex_const("0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0");
const LOCALNET_MARKETPLACE: Address =
    Address::from_hex_const("0xCf7Ed3AccA5a467e9e704C703E8D87F634fB0Fc9");

impl Default for NetworkRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Address {
    /// Parse a `0x`-prefixed, 40-digit hex literal. Only used to initialize
    /// `const` items, so malformed input is a compile error.
    const fn from_hex_const(s: &str) -> Self {
        const fn nibble(c: u8) -> u8 {
            match c {
                b'0'..=b'9' => c - b'0',
                b'a'..=b'f' => c - b'a' + 10,
                b'A'..=b'F' => c - b'A' + 10,
                _ => panic!("invalid hex digit in address literal"),
            }
        }
        let b = s.as_bytes();
        assert!(
            b.len() == 42 && b[0] == b'0' && b[1] == b'x',
            "address literal must be 0x + 40 hex digits"
        );
        let mut out = [0u8; 20];
        let mut i = 0;
        while i < 20 {
            out[i] = (nibble(b[2 + 2 * i]) << 4) | nibble(b[3 + 2 * i]);
            i += 1;
        }
        Self(out)
    }
}
