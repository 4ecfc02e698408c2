//! End-to-end wiring: store, live feed, aggregator, fallback, scheduler and
//! conversion working together.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use ratefeed_common::{CurrencyCode, ExchangeRate, SourceKind};
use ratefeed_fx::{
    CacheReader, ChangeEvent, ChangeScheduler, ConversionEngine, DirectFeedFetcher, FeedConfig,
    Locale, MemoryRateStore, MockRateSource, Orchestrator, OrchestratorConfig, RateCache,
    RefreshOutcome, SchedulerConfig, SourceError, StaticFallback, Trigger,
};
use ratefeed_fx::test_server;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Tarih_Date Tarih="16.01.2024" Date="2024-01-16" Bulten_No="2024/11">
  <Currency Kod="USD" CurrencyCode="USD">
    <Unit>1</Unit>
    <ForexBuying>30,00</ForexBuying>
    <ForexSelling>30,10</ForexSelling>
  </Currency>
  <Currency Kod="EUR" CurrencyCode="EUR">
    <Unit>1</Unit>
    <ForexBuying>33,00</ForexBuying>
    <ForexSelling>33,10</ForexSelling>
  </Currency>
</Tarih_Date>"#;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

fn stored_rows(day: u32, usd: rust_decimal::Decimal) -> Vec<ExchangeRate> {
    vec![
        ExchangeRate::new(CurrencyCode::usd(), usd, usd + dec!(0.06), date(day)),
        ExchangeRate::new(CurrencyCode::gbp(), dec!(41.20), dec!(41.40), date(day)),
    ]
}

fn orchestrator(
    store: Arc<MemoryRateStore>,
    feed_url: String,
    aggregator: Arc<MockRateSource>,
) -> Arc<Orchestrator> {
    let feed = DirectFeedFetcher::new(FeedConfig {
        url: feed_url,
        request_timeout: Duration::from_secs(2),
        ..Default::default()
    });

    Arc::new(Orchestrator::new(
        Arc::new(CacheReader::new(store)),
        Arc::new(feed),
        aggregator,
        StaticFallback::default(),
        OrchestratorConfig::default(),
    ))
}

fn quiet() -> SchedulerConfig {
    SchedulerConfig {
        poll_interval: Duration::from_secs(3600),
        refresh_on_start: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_empty_store_reads_live_feed_and_warms_store() {
    let store = Arc::new(MemoryRateStore::new());
    let aggregator = Arc::new(MockRateSource::succeeding(
        SourceKind::Aggregator,
        stored_rows(16, dec!(30)),
    ));
    let orch = orchestrator(store, test_server::serve(200, FEED).await, aggregator.clone());
    let cache = Arc::new(RateCache::seeded(orch.fallback()));
    let handle = ChangeScheduler::new(quiet(), orch.clone(), cache.clone()).start(None);

    let outcome = handle.refresh(Trigger::Manual).await;

    assert!(matches!(
        outcome,
        RefreshOutcome::Updated {
            source: SourceKind::DirectFeed,
            ..
        }
    ));
    assert_eq!(cache.snapshot_date(), date(16));

    assert!(orch.wait_for_warmups(Duration::from_secs(1)).await);
    assert_eq!(aggregator.calls(), 1);
    assert_eq!(cache.current().table().source(), SourceKind::DirectFeed);

    let engine = ConversionEngine::new(cache, Locale::TrTr);
    assert_eq!(
        engine
            .convert_and_format(dec!(100), &CurrencyCode::usd(), &CurrencyCode::try_lira())
            .unwrap(),
        "₺3.000,00"
    );
    assert_eq!(
        engine.convert(dec!(33), &CurrencyCode::eur(), &CurrencyCode::usd()),
        Ok(dec!(36.3))
    );

    handle.stop().await;
}

#[tokio::test]
async fn test_push_event_picks_up_new_store_rows() {
    let store = Arc::new(MemoryRateStore::new());
    store.insert(stored_rows(15, dec!(32.50)));
    let aggregator = Arc::new(MockRateSource::failing(
        SourceKind::Aggregator,
        SourceError::Network("unreachable".into()),
    ));
    let feed_url = test_server::serve(200, FEED).await;
    let orch = orchestrator(store.clone(), feed_url, aggregator.clone());
    let cache = Arc::new(RateCache::seeded(orch.fallback()));
    let mut updates = cache.subscribe();
    let (push_tx, push_rx) = mpsc::channel(4);
    let handle = ChangeScheduler::new(quiet(), orch, cache.clone()).start(Some(Box::new(push_rx)));

    handle.refresh(Trigger::Manual).await;
    assert_eq!(cache.current().table().source(), SourceKind::Cache);
    assert_eq!(cache.snapshot_date(), date(15));
    updates.borrow_and_update();

    store.insert(stored_rows(17, dec!(31)));
    push_tx
        .send(ChangeEvent {
            detail: Some("INSERT".into()),
        })
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), updates.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cache.snapshot_date(), date(17));
    assert_eq!(
        cache.current().rates_map().get(&CurrencyCode::usd()),
        Some(dec!(31))
    );
    assert_eq!(aggregator.calls(), 0);

    handle.stop().await;
}

#[tokio::test]
async fn test_everything_down_serves_fallback() {
    let store = Arc::new(MemoryRateStore::new());
    store.fail_with(SourceError::Network("pool timed out".into()));
    let closed = test_server::closed_url().await;
    let aggregator = Arc::new(MockRateSource::failing(
        SourceKind::Aggregator,
        SourceError::NotFound("aggregator returned no data".into()),
    ));
    let orch = orchestrator(store, closed, aggregator);
    let cache = Arc::new(RateCache::seeded(orch.fallback()));
    let handle = ChangeScheduler::new(quiet(), orch, cache.clone()).start(None);

    let refresh = handle.refresh_manual().await;

    assert!(refresh.is_degraded());
    assert_eq!(refresh.failures.len(), 3);
    assert!(refresh.degraded_notice().is_some());
    assert_eq!(cache.current().table().len(), 6);
    assert!(cache.last_error().is_some());

    let engine = ConversionEngine::new(cache, Locale::EnUs);
    assert_eq!(
        engine
            .convert_and_format(dec!(1), &CurrencyCode::usd(), &CurrencyCode::try_lira())
            .unwrap(),
        "₺29.70"
    );

    handle.stop().await;
}
