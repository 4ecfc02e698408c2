//! Source-fallback orchestration.
//!
//! Sources are tried in a fixed order and the first usable answer wins:
//!
//! 1. the persisted store (hot path, nothing else is touched on success)
//! 2. the live feed, after which the aggregator is started in the background
//!    so the store is warm for the next read
//! 3. the aggregator, in the foreground
//! 4. the static fallback, which cannot fail
//!
//! Orchestration never touches the cache; it only decides which table wins.
//! Background warm-ups are owned by the orchestrator so a short-lived caller
//! can wait for them with [`Orchestrator::wait_for_warmups`] before exiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ratefeed_common::{CurrencyCode, RateTable, SourceKind};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::error::{SourceError, SourceResult};
use crate::fallback::StaticFallback;
use crate::source::RateSource;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Pivot currency tables are built around.
    pub pivot: CurrencyCode,
    /// Start the aggregator in the background after a live-feed success.
    pub warm_store_after_feed: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pivot: CurrencyCode::try_lira(),
            warm_store_after_feed: true,
        }
    }
}

/// One source that did not produce a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: SourceKind,
    pub error: SourceError,
}

/// Result of one orchestration, with the failures that led to it.
#[derive(Debug, Clone)]
pub struct Orchestration {
    pub table: RateTable,
    pub failures: Vec<SourceFailure>,
}

impl Orchestration {
    /// Whether every live source failed.
    pub fn is_degraded(&self) -> bool {
        self.table.is_degraded()
    }
}

/// Picks the best available rate table.
pub struct Orchestrator {
    cache_reader: Arc<dyn RateSource>,
    feed: Arc<dyn RateSource>,
    aggregator: Arc<dyn RateSource>,
    fallback: StaticFallback,
    config: OrchestratorConfig,
    warmups_started: AtomicU64,
    warmups: Mutex<JoinSet<()>>,
}

impl Orchestrator {
    /// Create an orchestrator over the three ranked sources.
    pub fn new(
        cache_reader: Arc<dyn RateSource>,
        feed: Arc<dyn RateSource>,
        aggregator: Arc<dyn RateSource>,
        fallback: StaticFallback,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            cache_reader,
            feed,
            aggregator,
            fallback,
            config,
            warmups_started: AtomicU64::new(0),
            warmups: Mutex::new(JoinSet::new()),
        }
    }

    /// The fallback this orchestrator ends on.
    pub fn fallback(&self) -> &StaticFallback {
        &self.fallback
    }

    /// Number of background store warm-ups started so far.
    pub fn warmups_started(&self) -> u64 {
        self.warmups_started.load(Ordering::Relaxed)
    }

    /// Wait for background warm-ups started so far.
    ///
    /// Returns false if some were still running after `timeout`; those are
    /// aborted.
    pub async fn wait_for_warmups(&self, timeout: Duration) -> bool {
        let mut pending = std::mem::take(&mut *self.warmups.lock());
        if pending.is_empty() {
            return true;
        }

        let drained = tokio::time::timeout(timeout, async {
            while pending.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        if !drained {
            warn!(pending = pending.len(), "Abandoning background store warm-up");
        }
        drained
    }

    /// Produce the best available table. Never fails.
    pub async fn orchestrate(&self) -> RateTable {
        self.orchestrate_detailed().await.table
    }

    /// Produce the best available table together with the failures seen on
    /// the way.
    #[instrument(skip(self))]
    pub async fn orchestrate_detailed(&self) -> Orchestration {
        let mut failures = Vec::new();

        match self.try_source(self.cache_reader.as_ref()).await {
            Ok(table) => return self.adopt(table, failures),
            Err(e) => self.record(&mut failures, SourceKind::Cache, e),
        }

        match self.try_source(self.feed.as_ref()).await {
            Ok(table) => {
                if self.config.warm_store_after_feed {
                    self.warm_store();
                }
                return self.adopt(table, failures);
            }
            Err(e) => self.record(&mut failures, SourceKind::DirectFeed, e),
        }

        match self.try_source(self.aggregator.as_ref()).await {
            Ok(table) => return self.adopt(table, failures),
            Err(e) => self.record(&mut failures, SourceKind::Aggregator, e),
        }

        let table = self.fallback.table();
        warn!(
            failed_sources = failures.len(),
            snapshot_date = %table.snapshot_date(),
            "All rate sources failed, using static fallback"
        );
        Orchestration { table, failures }
    }

    async fn try_source(&self, source: &dyn RateSource) -> SourceResult<RateTable> {
        let rates = source.fetch().await?;
        if rates.is_empty() {
            return Err(SourceError::NotFound(format!(
                "{} returned an empty list",
                source.kind()
            )));
        }

        Ok(RateTable::from_rates(rates, &self.config.pivot, source.kind())?)
    }

    fn adopt(&self, table: RateTable, failures: Vec<SourceFailure>) -> Orchestration {
        info!(
            source = %table.source(),
            snapshot_date = %table.snapshot_date(),
            currencies = table.len(),
            "Adopted rate table"
        );
        Orchestration { table, failures }
    }

    fn record(&self, failures: &mut Vec<SourceFailure>, source: SourceKind, error: SourceError) {
        warn!(
            source = %source,
            error_kind = error.kind(),
            error = %error,
            "Rate source failed, trying next"
        );
        failures.push(SourceFailure { source, error });
    }

    /// Background aggregator call so the store has today's rows. The caller
    /// never sees its result.
    fn warm_store(&self) {
        self.warmups_started.fetch_add(1, Ordering::Relaxed);
        let aggregator = self.aggregator.clone();

        let mut warmups = self.warmups.lock();
        // Reap finished warm-ups.
        while warmups.try_join_next().is_some() {}

        warmups.spawn(async move {
            match aggregator.fetch().await {
                Ok(rates) => debug!(rows = rates.len(), "Background store warm-up finished"),
                Err(e) => warn!(
                    source = %aggregator.kind(),
                    error_kind = e.kind(),
                    error = %e,
                    "Background store warm-up failed"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockRateSource;
    use chrono::NaiveDate;
    use ratefeed_common::ExchangeRate;
    use rust_decimal_macros::dec;

    fn rows(day: u32, usd: rust_decimal::Decimal) -> Vec<ExchangeRate> {
        let date = NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        vec![
            ExchangeRate::new(CurrencyCode::usd(), usd, usd + dec!(0.06), date),
            ExchangeRate::new(CurrencyCode::eur(), dec!(35.58), dec!(35.64), date),
        ]
    }

    fn down(kind: SourceKind) -> Arc<MockRateSource> {
        Arc::new(MockRateSource::failing(
            kind,
            SourceError::Network("connection refused".into()),
        ))
    }

    fn up(kind: SourceKind, usd: rust_decimal::Decimal) -> Arc<MockRateSource> {
        Arc::new(MockRateSource::succeeding(kind, rows(15, usd)))
    }

    fn orchestrator(
        cache: Arc<MockRateSource>,
        feed: Arc<MockRateSource>,
        aggregator: Arc<MockRateSource>,
    ) -> Orchestrator {
        Orchestrator::new(
            cache,
            feed,
            aggregator,
            StaticFallback::default(),
            OrchestratorConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_cache_hit_short_circuits() {
        let cache = up(SourceKind::Cache, dec!(32.50));
        let feed = up(SourceKind::DirectFeed, dec!(40));
        let aggregator = up(SourceKind::Aggregator, dec!(50));
        let orch = orchestrator(cache.clone(), feed.clone(), aggregator.clone());

        let table = orch.orchestrate().await;

        assert_eq!(table.source(), SourceKind::Cache);
        assert_eq!(
            table.get(&CurrencyCode::usd()).unwrap().forex_buying,
            Some(dec!(32.50))
        );
        assert_eq!(feed.calls(), 0);
        assert_eq!(aggregator.calls(), 0);
    }

    #[tokio::test]
    async fn test_feed_success_warms_store_once() {
        let cache = down(SourceKind::Cache);
        let feed = up(SourceKind::DirectFeed, dec!(32.50));
        let aggregator = Arc::new(
            MockRateSource::failing(SourceKind::Aggregator, SourceError::Network("down".into()))
                .with_delay(Duration::from_millis(20)),
        );
        let orch = orchestrator(cache, feed.clone(), aggregator.clone());

        let result = orch.orchestrate_detailed().await;

        assert_eq!(result.table.source(), SourceKind::DirectFeed);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].source, SourceKind::Cache);
        assert_eq!(feed.calls(), 1);
        assert_eq!(orch.warmups_started(), 1);

        assert!(orch.wait_for_warmups(Duration::from_secs(1)).await);
        assert_eq!(aggregator.calls(), 1);
        // The background failure never reached the returned table.
        assert_eq!(
            result.table.get(&CurrencyCode::usd()).unwrap().forex_buying,
            Some(dec!(32.50))
        );
    }

    #[tokio::test]
    async fn test_short_lived_caller_waits_for_warm_up() {
        let aggregator = Arc::new(
            MockRateSource::succeeding(SourceKind::Aggregator, rows(15, dec!(32.50)))
                .with_delay(Duration::from_millis(150)),
        );
        let orch = orchestrator(
            down(SourceKind::Cache),
            up(SourceKind::DirectFeed, dec!(32.50)),
            aggregator.clone(),
        );

        orch.orchestrate().await;
        assert!(orch.wait_for_warmups(Duration::from_secs(2)).await);
        assert_eq!(aggregator.calls(), 1);
        assert_eq!(aggregator.in_flight(), 0);

        // Nothing left to wait for.
        assert!(orch.wait_for_warmups(Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn test_slow_warm_up_is_abandoned_after_timeout() {
        let aggregator = Arc::new(
            MockRateSource::succeeding(SourceKind::Aggregator, rows(15, dec!(32.50)))
                .with_delay(Duration::from_secs(30)),
        );
        let orch = orchestrator(
            down(SourceKind::Cache),
            up(SourceKind::DirectFeed, dec!(32.50)),
            aggregator,
        );

        orch.orchestrate().await;
        assert!(!orch.wait_for_warmups(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_aggregator_in_foreground() {
        let cache = down(SourceKind::Cache);
        let feed = Arc::new(MockRateSource::failing(
            SourceKind::DirectFeed,
            SourceError::Parse("bad xml".into()),
        ));
        let aggregator = up(SourceKind::Aggregator, dec!(33));
        let orch = orchestrator(cache, feed, aggregator.clone());

        let result = orch.orchestrate_detailed().await;

        assert_eq!(result.table.source(), SourceKind::Aggregator);
        assert_eq!(aggregator.calls(), 1);
        assert_eq!(orch.warmups_started(), 0);
        assert_eq!(
            result
                .failures
                .iter()
                .map(|f| f.error.kind())
                .collect::<Vec<_>>(),
            vec!["NETWORK", "PARSE"]
        );
    }

    #[tokio::test]
    async fn test_all_sources_down_uses_fallback() {
        let orch = orchestrator(
            down(SourceKind::Cache),
            down(SourceKind::DirectFeed),
            down(SourceKind::Aggregator),
        );

        let result = orch.orchestrate_detailed().await;

        assert!(result.is_degraded());
        assert_eq!(result.table.source(), SourceKind::StaticFallback);
        assert_eq!(result.table.len(), 6);
        assert!(result.table.contains(&CurrencyCode::try_lira()));
        assert_eq!(result.failures.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_answer_counts_as_not_found() {
        let cache = Arc::new(MockRateSource::succeeding(SourceKind::Cache, vec![]));
        let feed = up(SourceKind::DirectFeed, dec!(32.50));
        let orch = orchestrator(cache, feed, down(SourceKind::Aggregator));

        let result = orch.orchestrate_detailed().await;

        assert_eq!(result.table.source(), SourceKind::DirectFeed);
        assert!(matches!(
            result.failures[0].error,
            SourceError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_pivot_only_answer_is_rejected() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let cache = Arc::new(MockRateSource::succeeding(
            SourceKind::Cache,
            vec![ExchangeRate::pivot(CurrencyCode::try_lira(), date)],
        ));
        let feed = up(SourceKind::DirectFeed, dec!(32.50));
        let orch = orchestrator(cache, feed, down(SourceKind::Aggregator));

        assert_eq!(orch.orchestrate().await.source(), SourceKind::DirectFeed);
    }

    #[tokio::test]
    async fn test_warm_up_can_be_disabled() {
        let aggregator = up(SourceKind::Aggregator, dec!(33));
        let orch = Orchestrator::new(
            down(SourceKind::Cache),
            up(SourceKind::DirectFeed, dec!(32.50)),
            aggregator.clone(),
            StaticFallback::default(),
            OrchestratorConfig {
                warm_store_after_feed: false,
                ..Default::default()
            },
        );

        orch.orchestrate().await;
        tokio::task::yield_now().await;
        assert_eq!(orch.warmups_started(), 0);
        assert_eq!(aggregator.calls(), 0);
    }
}
