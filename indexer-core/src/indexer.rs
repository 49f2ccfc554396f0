//! Event processing loop
//!
//! [`Indexer::process`] folds one event into the entity store: it opens a unit
//! of work, dispatches the event to its handler and commits every staged
//! entity as one batch. A handler error drops the unit of work, so a failed
//! event leaves the store untouched.
//!
//! # Invariants
//!
//! - Events are processed one at a time, to completion, in arrival order
//! - Each event is applied entirely or not at all
//! - Ordering is the event source's responsibility; a non-increasing
//!   `(block, log index)` is reported but still applied
//! - A discovered source is registered only after its event commits, and
//!   every market and staking pool already in the store is re-registered
//!   when an indexer is created over it

use crate::chain::ContractReader;
use crate::entities::EntityFamily;
use crate::events::LogEvent;
use crate::handlers::{self, Context};
use crate::metrics::Metrics;
use crate::repository::{Entity, Repository};
use crate::sources::{DataSourceRegistry, SourceSet, SourceTemplate};
use crate::storage::EntityStore;
use crate::Result;
use std::time::Instant;

/// Counters of one indexer instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexerStats {
    /// Events applied
    pub processed: u64,
    /// Events rejected
    pub failed: u64,
    /// Entities written
    pub entities_written: u64,
}

/// Forward-only fold of log events into entities
#[derive(Debug)]
pub struct Indexer<S, R, D = SourceSet> {
    store: S,
    reader: R,
    sources: D,
    metrics: Metrics,
    last_position: Option<(u64, u64)>,
    stats: IndexerStats,
}

impl<S, R, D> Indexer<S, R, D>
where
    S: EntityStore,
    R: ContractReader,
    D: DataSourceRegistry,
{
    /// Create an indexer over a store, a contract reader and a source registry
    ///
    /// Markets and staking pools found in the store are tracked again, so a
    /// resumed run keeps receiving their events.
    pub fn new(store: S, reader: R, mut sources: D) -> Result<Self> {
        restore_sources(&store, &mut sources)?;

        Ok(Self {
            store,
            reader,
            sources,
            metrics: Metrics::new()?,
            last_position: None,
            stats: IndexerStats::default(),
        })
    }

    /// Apply one event
    pub fn process(&mut self, event: &LogEvent) -> Result<()> {
        let name = event.event.name();
        let meta = &event.meta;
        let span = tracing::debug_span!(
            "event",
            name,
            block = meta.block_number,
            log = meta.log_index,
            time = ?meta.block_time(),
            tx = %meta.transaction_hash,
        );
        let _enter = span.enter();

        self.check_order(meta.position());

        let started = Instant::now();
        match self.apply(event) {
            Ok(written) => {
                self.stats.processed += 1;
                self.stats.entities_written += written as u64;
                self.metrics
                    .record_event(name, written, started.elapsed().as_secs_f64());
                tracing::debug!(entities = written, "Event applied");
                Ok(())
            }
            Err(err) => {
                self.stats.failed += 1;
                self.metrics.record_failure(name);
                tracing::error!(error = %err, address = %meta.address, "Event rejected");
                Err(err)
            }
        }
    }

    fn apply(&mut self, event: &LogEvent) -> Result<usize> {
        let store: &dyn EntityStore = &self.store;
        let mut ctx = Context {
            repo: Repository::new(store),
            reader: &self.reader,
            discovered: Vec::new(),
            meta: &event.meta,
        };

        let applied = handlers::apply(&mut ctx, &event.event)?;
        let written = ctx.repo.commit()?;

        for (template, address) in applied.discovered {
            self.sources.track(template, address);
        }
        if let Some(total) = applied.total_markets {
            self.metrics.set_markets_listed(total);
        }
        Ok(written)
    }

    fn check_order(&mut self, position: (u64, u64)) {
        if let Some(last) = self.last_position {
            if position <= last {
                tracing::warn!(
                    block = position.0,
                    log = position.1,
                    last_block = last.0,
                    last_log = last.1,
                    "Event out of order, applying anyway"
                );
                return;
            }
        }
        self.last_position = Some(position);
    }

    /// Read an entity as committed
    pub fn load<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        let store: &dyn EntityStore = &self.store;
        Repository::new(store).load(id)
    }

    /// Entity store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Source registry
    pub fn sources(&self) -> &D {
        &self.sources
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Counters since creation
    pub fn stats(&self) -> IndexerStats {
        self.stats
    }

    /// Position of the latest in-order event
    pub fn last_position(&self) -> Option<(u64, u64)> {
        self.last_position
    }

    /// Give back the store
    pub fn into_store(self) -> S {
        self.store
    }
}

/// Re-register the contracts discovered by earlier runs over the same store
fn restore_sources<S, D>(store: &S, sources: &mut D) -> Result<usize>
where
    S: EntityStore,
    D: DataSourceRegistry,
{
    let mut restored = 0;
    for (family, template) in [
        (EntityFamily::Market, SourceTemplate::CToken),
        (EntityFamily::StakingRewards, SourceTemplate::StakingRewards),
    ] {
        for id in store.ids(family)? {
            sources.track(template, id.parse()?);
            restored += 1;
        }
    }

    if restored > 0 {
        tracing::info!(sources = restored, "Restored data sources from store");
    }
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::StaticContractReader;
    use crate::entities::{Comptroller, Market};
    use crate::events::{EventKind, MarketListed, Mint, NewCloseFactor};
    use crate::storage::{EntityWrite, MemoryStore, Storage};
    use crate::types::{Address, EventMeta, TxHash};
    use crate::{Config, Error};
    use bigdecimal::BigDecimal;
    use num_bigint::BigInt;
    use std::str::FromStr;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    fn event(emitter: Address, block: u64, log: u64, kind: EventKind) -> LogEvent {
        LogEvent {
            meta: EventMeta {
                address: emitter,
                block_number: block,
                block_timestamp: 1_600_000_000 + block as i64,
                transaction_hash: TxHash::from_bytes([block as u8; 32]),
                log_index: log,
            },
            event: kind,
        }
    }

    fn indexer() -> Indexer<MemoryStore, StaticContractReader> {
        let reader = StaticContractReader::new().with_token(addr(10), "cDAI", "Cream DAI", 8);
        Indexer::new(MemoryStore::new(), reader, SourceSet::with_static(addr(1), None)).unwrap()
    }

    #[test]
    fn test_comptroller_created_on_first_event() {
        let mut indexer = indexer();
        indexer
            .process(&event(
                addr(1),
                1,
                0,
                EventKind::NewCloseFactor(NewCloseFactor {
                    new_close_factor_mantissa: BigInt::from(500_000_000_000_000_000u64),
                }),
            ))
            .unwrap();

        let comptroller: Comptroller = indexer.load(&addr(1).to_hex()).unwrap().unwrap();
        assert_eq!(comptroller.close_factor, BigDecimal::from_str("0.5").unwrap());
        assert!(comptroller.admin.is_none());
        assert_eq!(indexer.stats().processed, 1);
    }

    #[test]
    fn test_listing_registers_source_and_metrics() {
        let mut indexer = indexer();
        indexer
            .process(&event(
                addr(1),
                1,
                0,
                EventKind::MarketListed(MarketListed { c_token: addr(10) }),
            ))
            .unwrap();

        assert!(indexer
            .sources()
            .accepts(&addr(10), crate::sources::SourceTemplate::CToken));
        assert_eq!(indexer.metrics().markets_listed.get(), 1);

        let market: Market = indexer.load(&addr(10).to_hex()).unwrap().unwrap();
        assert_eq!(market.symbol, "cDAI");
    }

    #[test]
    fn test_failed_event_leaves_store_untouched() {
        let mut indexer = indexer();
        let result = indexer.process(&event(
            addr(10),
            1,
            0,
            EventKind::Mint(Mint {
                minter: addr(2),
                mint_amount: BigInt::from(100),
                mint_tokens: BigInt::from(100),
            }),
        ));

        assert!(matches!(result, Err(crate::Error::MarketNotFound(_))));
        assert!(indexer.store().is_empty());
        assert_eq!(indexer.stats().failed, 1);
    }

    #[test]
    fn test_out_of_order_event_is_still_applied() {
        let mut indexer = indexer();
        let listed = |block| {
            event(
                addr(1),
                block,
                0,
                EventKind::MarketListed(MarketListed { c_token: addr(10 + block as u8) }),
            )
        };

        indexer.process(&listed(5)).unwrap();
        indexer.process(&listed(3)).unwrap();

        assert_eq!(indexer.last_position(), Some((5, 0)));
        assert!(indexer.load::<Market>(&addr(13).to_hex()).unwrap().is_some());
    }

    /// Store that accepts reads but rejects every commit
    struct RejectingStore(MemoryStore);

    impl EntityStore for RejectingStore {
        fn get(&self, family: EntityFamily, id: &str) -> Result<Option<Vec<u8>>> {
            self.0.get(family, id)
        }

        fn write_batch(&self, _writes: Vec<EntityWrite>) -> Result<()> {
            Err(Error::Storage("disk full".to_string()))
        }

        fn ids(&self, family: EntityFamily) -> Result<Vec<String>> {
            self.0.ids(family)
        }
    }

    #[test]
    fn test_sources_restored_from_existing_store() {
        let mut first = indexer();
        first
            .process(&event(
                addr(1),
                1,
                0,
                EventKind::MarketListed(MarketListed { c_token: addr(10) }),
            ))
            .unwrap();

        let reader = StaticContractReader::new();
        let resumed = Indexer::new(
            first.into_store(),
            reader,
            SourceSet::with_static(addr(1), None),
        )
        .unwrap();

        assert!(resumed
            .sources()
            .accepts(&addr(10), crate::sources::SourceTemplate::CToken));
        assert!(resumed
            .sources()
            .accepts(&addr(1), crate::sources::SourceTemplate::Comptroller));
        assert_eq!(resumed.sources().len(), 2);
    }

    #[test]
    fn test_sources_restored_after_reopening_storage() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let reader = || StaticContractReader::new().with_token(addr(10), "cDAI", "Cream DAI", 8);
        let sources = || SourceSet::with_static(addr(1), None);

        let mut first = Indexer::new(Storage::open(&config).unwrap(), reader(), sources()).unwrap();
        first
            .process(&event(
                addr(1),
                1,
                0,
                EventKind::MarketListed(MarketListed { c_token: addr(10) }),
            ))
            .unwrap();
        first.into_store().close().unwrap();

        let mut resumed = Indexer::new(Storage::open(&config).unwrap(), reader(), sources()).unwrap();
        assert!(resumed
            .sources()
            .accepts(&addr(10), crate::sources::SourceTemplate::CToken));

        resumed
            .process(&event(
                addr(10),
                2,
                0,
                EventKind::Mint(Mint {
                    minter: addr(2),
                    mint_amount: BigInt::from(100),
                    mint_tokens: BigInt::from(100),
                }),
            ))
            .unwrap();
        assert_eq!(resumed.stats().processed, 1);
    }

    #[test]
    fn test_failed_commit_does_not_track_source() {
        let reader = StaticContractReader::new();
        let mut indexer = Indexer::new(
            RejectingStore(MemoryStore::new()),
            reader,
            SourceSet::with_static(addr(1), None),
        )
        .unwrap();

        let result = indexer.process(&event(
            addr(1),
            1,
            0,
            EventKind::MarketListed(MarketListed { c_token: addr(10) }),
        ));

        assert!(matches!(result, Err(Error::Storage(_))));
        assert!(indexer.sources().template_of(&addr(10)).is_none());
        assert_eq!(indexer.metrics().markets_listed.get(), 0);
    }
}
