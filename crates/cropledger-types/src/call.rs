//! Contract call and receipt types exchanged with the ledger client.
//!
//! A [`ContractCall`] is what a coordinator asks the executor for: a logical
//! contract, a method, typed arguments, and an optional native-asset value.
//! The executor resolves it into a [`TransactionRequest`] (concrete address,
//! base-unit value, gas limit) before handing it to the client.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, ContractName, LedgerError, Result, TxHash};

/// A typed contract argument or return value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallValue {
    Address(Address),
    Uint(u128),
    Bool(bool),
    Text(String),
    List(Vec<CallValue>),
}

impl CallValue {
    #[must_use]
    pub fn as_uint(&self) -> Option<u128> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_address(&self) -> Option<Address> {
        match self {
            Self::Address(a) => Some(*a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[CallValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<Address> for CallValue {
    fn from(value: Address) -> Self {
        Self::Address(value)
    }
}

impl From<u64> for CallValue {
    fn from(value: u64) -> Self {
        Self::Uint(u128::from(value))
    }
}

impl From<u128> for CallValue {
    fn from(value: u128) -> Self {
        Self::Uint(value)
    }
}

impl From<bool> for CallValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for CallValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CallValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Positional reader over a query result, with typed accessors that fail
/// with `MalformedResponse` instead of panicking.
pub struct ValueReader<'a> {
    method: &'a str,
    values: &'a [CallValue],
    pos: usize,
}

impl<'a> ValueReader<'a> {
    #[must_use]
    pub fn new(method: &'a str, values: &'a [CallValue]) -> Self {
        Self {
            method,
            values,
            pos: 0,
        }
    }

    fn next(&mut self, expected: &str) -> Result<&'a CallValue> {
        let value = self.values.get(self.pos).ok_or_else(|| self.malformed(format!(
            "missing {expected} at position {}",
            self.pos
        )))?;
        self.pos += 1;
        Ok(value)
    }

    fn malformed(&self, reason: String) -> LedgerError {
        LedgerError::MalformedResponse {
            method: self.method.to_string(),
            reason,
        }
    }

    pub fn uint(&mut self) -> Result<u128> {
        let value = self.next("uint")?;
        value
            .as_uint()
            .ok_or_else(|| self.malformed(format!("expected uint, got {value:?}")))
    }

    pub fn u64(&mut self) -> Result<u64> {
        let raw = self.uint()?;
        u64::try_from(raw).map_err(|_| self.malformed(format!("{raw} exceeds u64")))
    }

    pub fn address(&mut self) -> Result<Address> {
        let value = self.next("address")?;
        value
            .as_address()
            .ok_or_else(|| self.malformed(format!("expected address, got {value:?}")))
    }

    pub fn bool(&mut self) -> Result<bool> {
        let value = self.next("bool")?;
        value
            .as_bool()
            .ok_or_else(|| self.malformed(format!("expected bool, got {value:?}")))
    }

    pub fn text(&mut self) -> Result<String> {
        let value = self.next("text")?;
        value
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| self.malformed(format!("expected text, got {value:?}")))
    }

    pub fn list(&mut self) -> Result<&'a [CallValue]> {
        let value = self.next("list")?;
        value
            .as_list()
            .ok_or_else(|| self.malformed(format!("expected list, got {value:?}")))
    }
}

// ---------------------------------------------------------------------------
// ContractCall / TransactionRequest
// ---------------------------------------------------------------------------

/// A write intent against a logical contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    pub contract: ContractName,
    pub method: String,
    pub args: Vec<CallValue>,
    /// Native-asset value attached to the call. Zero for non-payable methods.
    pub value: Decimal,
}

impl ContractCall {
    #[must_use]
    pub fn new(contract: ContractName, method: impl Into<String>) -> Self {
        Self {
            contract,
            method: method.into(),
            args: Vec::new(),
            value: Decimal::ZERO,
        }
    }

    #[must_use]
    pub fn arg(mut self, value: impl Into<CallValue>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Attach a native-asset value. Only payable methods should use this.
    #[must_use]
    pub fn payable(mut self, value: Decimal) -> Self {
        self.value = value;
        self
    }

    #[must_use]
    pub fn is_payable(&self) -> bool {
        !self.value.is_zero()
    }
}

/// A fully resolved transaction, ready for estimation or submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub method: String,
    pub args: Vec<CallValue>,
    /// Value in base units of the native asset.
    pub value: u128,
    /// `None` while estimating; the padded estimate on submission.
    pub gas_limit: Option<u64>,
}

// ---------------------------------------------------------------------------
// Receipt
// ---------------------------------------------------------------------------

/// A decoded event log emitted by a contract during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub name: String,
    pub fields: BTreeMap<String, CallValue>,
}

impl ContractEvent {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<CallValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// The network's authoritative record of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub hash: TxHash,
    pub success: bool,
    pub block_number: u64,
    pub gas_used: u64,
    #[serde(default)]
    pub events: Vec<ContractEvent>,
}
