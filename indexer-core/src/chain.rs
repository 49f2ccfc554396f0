//! Synchronous contract reads
//!
//! Handlers query token metadata while an event is being processed. Any
//! failed read means "value unavailable": callers apply a documented
//! fallback and never abort the event because of it.

use crate::decimal::Decimals;
use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Failed contract call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Call reverted or the contract does not implement the method
    #[error("{method}() reverted on {contract}")]
    Reverted {
        /// Called contract
        contract: Address,
        /// Method name
        method: &'static str,
    },

    /// Node or transport failure
    #[error("Call transport error: {0}")]
    Transport(String),
}

/// Result of a contract call
pub type CallResult<T> = std::result::Result<T, CallError>;

/// Read-only view of contract state at the block being indexed
pub trait ContractReader {
    /// ERC-20 `symbol()`
    fn symbol(&self, contract: Address) -> CallResult<String>;

    /// ERC-20 `name()`
    fn name(&self, contract: Address) -> CallResult<String>;

    /// ERC-20 `decimals()`
    fn decimals(&self, contract: Address) -> CallResult<Decimals>;

    /// Pool token `underlying()`
    fn underlying(&self, contract: Address) -> CallResult<Address>;

    /// Proxy `implementation()`
    fn implementation(&self, contract: Address) -> CallResult<Address>;

    /// Pool token `interestRateModel()`
    fn interest_rate_model(&self, contract: Address) -> CallResult<Address>;

    /// Comptroller `admin()`
    fn admin(&self, contract: Address) -> CallResult<Address>;

    /// Comptroller `comptrollerImplementation()`
    fn comptroller_implementation(&self, contract: Address) -> CallResult<Address>;
}

/// Known return values of one contract; an absent field reverts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContractFixture {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<Decimals>,
    pub underlying: Option<Address>,
    pub implementation: Option<Address>,
    pub interest_rate_model: Option<Address>,
    pub admin: Option<Address>,
    pub comptroller_implementation: Option<Address>,
}

/// Contract reader answering from fixed per-contract values
///
/// Fixture file format: a JSON object keyed by contract address.
///
/// ```text
/// {"0x...": {"symbol": "cDAI", "decimals": 8, "underlying": "0x..."}}
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticContractReader {
    contracts: HashMap<Address, ContractFixture>,
}

impl StaticContractReader {
    /// Reader where every call reverts
    pub fn new() -> Self {
        Self::default()
    }

    /// Load fixtures from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Set the values of one contract
    pub fn insert(&mut self, contract: Address, fixture: ContractFixture) -> &mut Self {
        self.contracts.insert(contract, fixture);
        self
    }

    /// Builder form of [`StaticContractReader::insert`]
    pub fn with(mut self, contract: Address, fixture: ContractFixture) -> Self {
        self.insert(contract, fixture);
        self
    }

    /// ERC-20 token fixture
    pub fn with_token(self, contract: Address, symbol: &str, name: &str, decimals: u8) -> Self {
        self.with(
            contract,
            ContractFixture {
                symbol: Some(symbol.to_string()),
                name: Some(name.to_string()),
                decimals: Some(Decimals::new(decimals)),
                ..ContractFixture::default()
            },
        )
    }

    fn field<T: Clone>(
        &self,
        contract: Address,
        method: &'static str,
        get: impl FnOnce(&ContractFixture) -> &Option<T>,
    ) -> CallResult<T> {
        self.contracts
            .get(&contract)
            .and_then(|fixture| get(fixture).clone())
            .ok_or(CallError::Reverted { contract, method })
    }
}

impl ContractReader for StaticContractReader {
    fn symbol(&self, contract: Address) -> CallResult<String> {
        self.field(contract, "symbol", |f| &f.symbol)
    }

    fn name(&self, contract: Address) -> CallResult<String> {
        self.field(contract, "name", |f| &f.name)
    }

    fn decimals(&self, contract: Address) -> CallResult<Decimals> {
        self.field(contract, "decimals", |f| &f.decimals)
    }

    fn underlying(&self, contract: Address) -> CallResult<Address> {
        self.field(contract, "underlying", |f| &f.underlying)
    }

    fn implementation(&self, contract: Address) -> CallResult<Address> {
        self.field(contract, "implementation", |f| &f.implementation)
    }

    fn interest_rate_model(&self, contract: Address) -> CallResult<Address> {
        self.field(contract, "interestRateModel", |f| &f.interest_rate_model)
    }

    fn admin(&self, contract: Address) -> CallResult<Address> {
        self.field(contract, "admin", |f| &f.admin)
    }

    fn comptroller_implementation(&self, contract: Address) -> CallResult<Address> {
        self.field(contract, "comptrollerImplementation", |f| {
            &f.comptroller_implementation
        })
    }
}
