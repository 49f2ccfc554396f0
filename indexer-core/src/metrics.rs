//! Metrics collection for observability
//!
//! Prometheus metrics for monitoring the indexer. Collectors are registered
//! in a private [`Registry`] only, so several indexers can live in one
//! process (tests do this).
//!
//! # Metrics
//!
//! - `indexer_events_total{event}` - Events applied, by event name
//! - `indexer_events_failed_total{event}` - Events rejected by a handler
//! - `indexer_entities_written_total` - Entities written by committed events
//! - `indexer_handler_duration_seconds` - Histogram of per-event latency
//! - `indexer_markets_listed` - Markets currently listed

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::fmt;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Events applied
    pub events_total: IntCounterVec,

    /// Events rejected
    pub events_failed: IntCounterVec,

    /// Entities written
    pub entities_written: IntCounter,

    /// Per-event latency histogram
    pub handler_duration: Histogram,

    /// Listed markets
    pub markets_listed: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let events_total = IntCounterVec::new(
            Opts::new("indexer_events_total", "Events applied, by event name"),
            &["event"],
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let events_failed = IntCounterVec::new(
            Opts::new("indexer_events_failed_total", "Events rejected by a handler"),
            &["event"],
        )?;
        registry.register(Box::new(events_failed.clone()))?;

        let entities_written = IntCounter::new(
            "indexer_entities_written_total",
            "Entities written by committed events",
        )?;
        registry.register(Box::new(entities_written.clone()))?;

        let handler_duration = Histogram::with_opts(
            HistogramOpts::new(
                "indexer_handler_duration_seconds",
                "Histogram of per-event latency",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0]),
        )?;
        registry.register(Box::new(handler_duration.clone()))?;

        let markets_listed = IntGauge::new("indexer_markets_listed", "Markets currently listed")?;
        registry.register(Box::new(markets_listed.clone()))?;

        Ok(Self {
            events_total,
            events_failed,
            entities_written,
            handler_duration,
            markets_listed,
            registry,
        })
    }

    /// Record an applied event
    pub fn record_event(&self, event: &str, entities: usize, duration_seconds: f64) {
        self.events_total.with_label_values(&[event]).inc();
        self.entities_written.inc_by(entities as u64);
        self.handler_duration.observe(duration_seconds);
    }

    /// Record a rejected event
    pub fn record_failure(&self, event: &str) {
        self.events_failed.with_label_values(&[event]).inc();
    }

    /// Update listed market count
    pub fn set_markets_listed(&self, count: u32) {
        self.markets_listed.set(i64::from(count));
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("entities_written", &self.entities_written.get())
            .field("markets_listed", &self.markets_listed.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.entities_written.get(), 0);
        assert_eq!(metrics.markets_listed.get(), 0);

        // A second collector must not clash with the first
        assert!(Metrics::new().is_ok());
    }

    #[test]
    fn test_record_event() {
        let metrics = Metrics::new().unwrap();
        metrics.record_event("Mint", 3, 0.001);
        metrics.record_event("Mint", 2, 0.002);
        metrics.record_failure("Borrow");

        assert_eq!(metrics.events_total.with_label_values(&["Mint"]).get(), 2);
        assert_eq!(metrics.events_failed.with_label_values(&["Borrow"]).get(), 1);
        assert_eq!(metrics.entities_written.get(), 5);
        assert_eq!(metrics.handler_duration.get_sample_count(), 2);
    }

    #[test]
    fn test_registry_gathers_all_families() {
        let metrics = Metrics::new().unwrap();
        metrics.record_event("Transfer", 1, 0.0);
        metrics.record_failure("Transfer");
        metrics.set_markets_listed(4);

        let names: Vec<_> = metrics
            .registry()
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"indexer_events_total".to_string()));
        assert!(names.contains(&"indexer_markets_listed".to_string()));
    }
}
