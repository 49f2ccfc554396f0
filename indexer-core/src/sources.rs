//! Dynamic data sources
//!
//! Markets and staking pools are discovered at runtime (`MarketListed`,
//! `StakingRewardsCreated`). The handler that discovers one registers it
//! exactly once, before any of its events can be expected; the event source
//! uses the registry to decide which contracts to deliver logs for.

use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Contract kind whose events the indexer decodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceTemplate {
    /// The comptroller (static source)
    Comptroller,
    /// A listed pool token
    CToken,
    /// The staking-rewards factory (static source)
    StakingRewardsFactory,
    /// A staking pool deployed by the factory
    StakingRewards,
}

impl fmt::Display for SourceTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceTemplate::Comptroller => "Comptroller",
            SourceTemplate::CToken => "CToken",
            SourceTemplate::StakingRewardsFactory => "StakingRewardsFactory",
            SourceTemplate::StakingRewards => "StakingRewards",
        };
        f.write_str(name)
    }
}

/// Collaborator that starts tracking a newly discovered contract
pub trait DataSourceRegistry {
    /// Begin delivering events of `address` decoded as `template`
    fn track(&mut self, template: SourceTemplate, address: Address);
}

/// In-process registry of tracked contracts
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    tracked: BTreeMap<Address, SourceTemplate>,
}

impl SourceSet {
    /// Create empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the static sources
    pub fn with_static(comptroller: Address, staking_factory: Option<Address>) -> Self {
        let mut sources = Self::new();
        sources.track(SourceTemplate::Comptroller, comptroller);
        if let Some(factory) = staking_factory {
            sources.track(SourceTemplate::StakingRewardsFactory, factory);
        }
        sources
    }

    /// Template an address is tracked under
    pub fn template_of(&self, address: &Address) -> Option<SourceTemplate> {
        self.tracked.get(address).copied()
    }

    /// Whether events from `address` decoded as `template` should be delivered
    pub fn accepts(&self, address: &Address, template: SourceTemplate) -> bool {
        self.template_of(address) == Some(template)
    }

    /// Number of tracked contracts
    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    /// No contract tracked
    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}

impl DataSourceRegistry for SourceSet {
    fn track(&mut self, template: SourceTemplate, address: Address) {
        match self.tracked.get(&address) {
            Some(existing) if *existing == template => {
                tracing::debug!(%address, %template, "Data source already tracked");
            }
            Some(existing) => {
                tracing::warn!(
                    %address,
                    %existing,
                    requested = %template,
                    "Data source already tracked under another template"
                );
            }
            None => {
                tracing::info!(%address, %template, "Tracking new data source");
                self.tracked.insert(address, template);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    #[test]
    fn test_static_sources() {
        let sources = SourceSet::with_static(addr(1), Some(addr(2)));
        assert_eq!(sources.len(), 2);
        assert!(sources.accepts(&addr(1), SourceTemplate::Comptroller));
        assert!(sources.accepts(&addr(2), SourceTemplate::StakingRewardsFactory));
        assert!(!sources.accepts(&addr(1), SourceTemplate::CToken));
    }

    #[test]
    fn test_repeated_registration_is_noop() {
        let mut sources = SourceSet::new();
        sources.track(SourceTemplate::CToken, addr(3));
        sources.track(SourceTemplate::CToken, addr(3));
        sources.track(SourceTemplate::StakingRewards, addr(3));

        assert_eq!(sources.len(), 1);
        assert_eq!(sources.template_of(&addr(3)), Some(SourceTemplate::CToken));
    }
}
