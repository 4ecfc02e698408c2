//! Wires the rate pipeline from configuration.

use std::sync::Arc;
use std::time::Duration;

use ratefeed_fx::{
    AggregatorInvoker, CacheReader, ChangeScheduler, ChangeSubscription, ConversionEngine,
    DirectFeedFetcher, ManualRefresh, Orchestrator, OrchestratorConfig, RateCache,
    SchedulerConfig, SchedulerHandle, StaticFallback,
};
use ratefeed_store::{ensure_schema, PgChangeListener, PgRateStore, StoreError};
use tracing::{info, warn};

use crate::config::NodeConfig;

/// The assembled rate pipeline.
pub struct Pipeline {
    config: NodeConfig,
    store: PgRateStore,
    orchestrator: Arc<Orchestrator>,
    cache: Arc<RateCache>,
}

impl Pipeline {
    /// Build every source. No connection is opened yet.
    pub fn build(config: NodeConfig) -> Result<Self, StoreError> {
        let store = PgRateStore::connect_lazy(&config.database_url, config.db_acquire_timeout)?;
        let fallback = StaticFallback::default();
        let cache = Arc::new(RateCache::seeded(&fallback));

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(CacheReader::new(Arc::new(store.clone()))),
            Arc::new(DirectFeedFetcher::new(config.feed.clone())),
            Arc::new(AggregatorInvoker::new(config.aggregator.clone())),
            fallback,
            OrchestratorConfig::default(),
        ));

        Ok(Self {
            config,
            store,
            orchestrator,
            cache,
        })
    }

    pub fn cache(&self) -> Arc<RateCache> {
        self.cache.clone()
    }

    pub fn engine(&self) -> ConversionEngine {
        ConversionEngine::new(self.cache.clone(), self.config.locale)
    }

    /// Create the store schema if configured to.
    pub async fn prepare_store(&self) -> Result<(), StoreError> {
        if !self.config.ensure_schema {
            return Ok(());
        }
        ensure_schema(self.store.pool(), &self.config.notify_channel).await
    }

    /// Start polling and, when the store is reachable, push notifications.
    pub async fn start(&self) -> SchedulerHandle {
        let subscription: Option<Box<dyn ChangeSubscription>> =
            match PgChangeListener::connect(self.store.pool(), &self.config.notify_channel).await {
                Ok(listener) => Some(Box::new(listener)),
                Err(e) => {
                    warn!(error = %e, "Push notifications unavailable, polling only");
                    None
                }
            };

        ChangeScheduler::new(
            self.config.scheduler.clone(),
            self.orchestrator.clone(),
            self.cache.clone(),
        )
        .start(subscription)
    }

    /// Run one manual refresh without timers or push.
    pub async fn refresh_once(&self) -> ManualRefresh {
        let config = SchedulerConfig {
            refresh_on_start: false,
            ..self.config.scheduler.clone()
        };
        let handle = ChangeScheduler::new(config, self.orchestrator.clone(), self.cache.clone())
            .start(None);

        let refresh = handle.refresh_manual().await;
        handle.stop().await;
        self.finish_warmups().await;

        info!(outcome = ?refresh.outcome, "One-shot refresh finished");
        refresh
    }

    /// Wait for background store warm-ups, bounded by the aggregator timeout.
    pub async fn finish_warmups(&self) {
        let grace = self.config.aggregator.request_timeout + Duration::from_secs(1);
        if !self.orchestrator.wait_for_warmups(grace).await {
            warn!(
                grace_secs = grace.as_secs(),
                "Store warm-up did not finish before exit"
            );
        }
    }
}
