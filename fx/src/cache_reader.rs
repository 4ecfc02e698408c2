//! Reads the latest snapshot back from the persisted store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use ratefeed_common::{ExchangeRate, SourceKind};
use tracing::debug;

use crate::error::{SourceError, SourceResult};
use crate::source::RateSource;

/// Read side of the persisted rate store.
///
/// The store is written by the aggregation service only.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Most recent `update_date` present, if any rows exist at all.
    async fn latest_update_date(&self) -> SourceResult<Option<NaiveDate>>;

    /// Every row stored for one snapshot date.
    async fn rates_for_date(&self, date: NaiveDate) -> SourceResult<Vec<ExchangeRate>>;
}

/// First-ranked source: the newest snapshot already in the store.
pub struct CacheReader {
    store: Arc<dyn RateStore>,
}

impl CacheReader {
    pub fn new(store: Arc<dyn RateStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RateSource for CacheReader {
    fn kind(&self) -> SourceKind {
        SourceKind::Cache
    }

    async fn fetch(&self) -> SourceResult<Vec<ExchangeRate>> {
        let date = self
            .store
            .latest_update_date()
            .await?
            .ok_or_else(|| SourceError::NotFound("store holds no rates".to_string()))?;

        let rates = self.store.rates_for_date(date).await?;
        if rates.is_empty() {
            return Err(SourceError::NotFound(format!("no rows for {date}")));
        }

        debug!(snapshot_date = %date, rows = rates.len(), "Read snapshot from store");
        Ok(rates)
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryRateStore;

#[cfg(any(test, feature = "test-utils"))]
mod memory {
    use std::collections::BTreeMap;

    use parking_lot::RwLock;

    use super::*;

    /// In-memory store keyed by snapshot date.
    #[derive(Default)]
    pub struct MemoryRateStore {
        rows: RwLock<BTreeMap<NaiveDate, Vec<ExchangeRate>>>,
        failure: RwLock<Option<SourceError>>,
    }

    impl MemoryRateStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add rows, grouped by their own dates.
        pub fn insert(&self, rates: Vec<ExchangeRate>) {
            let mut rows = self.rows.write();
            for rate in rates {
                rows.entry(rate.update_date).or_default().push(rate);
            }
        }

        /// Make every query fail with this error.
        pub fn fail_with(&self, error: SourceError) {
            *self.failure.write() = Some(error);
        }

        fn check(&self) -> SourceResult<()> {
            match self.failure.read().as_ref() {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl RateStore for MemoryRateStore {
        async fn latest_update_date(&self) -> SourceResult<Option<NaiveDate>> {
            self.check()?;
            Ok(self.rows.read().keys().next_back().copied())
        }

        async fn rates_for_date(&self, date: NaiveDate) -> SourceResult<Vec<ExchangeRate>> {
            self.check()?;
            Ok(self.rows.read().get(&date).cloned().unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratefeed_common::CurrencyCode;
    use rust_decimal_macros::dec;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[tokio::test]
    async fn test_reads_latest_date_only() {
        let store = Arc::new(MemoryRateStore::new());
        store.insert(vec![
            ExchangeRate::new(CurrencyCode::usd(), dec!(31), dec!(31.1), date(14)),
            ExchangeRate::new(CurrencyCode::usd(), dec!(32.5), dec!(32.6), date(15)),
            ExchangeRate::new(CurrencyCode::eur(), dec!(35.5), dec!(35.6), date(15)),
        ]);
        let reader = CacheReader::new(store);

        let rates = reader.fetch().await.unwrap();
        assert_eq!(rates.len(), 2);
        assert!(rates.iter().all(|r| r.update_date == date(15)));
    }

    #[tokio::test]
    async fn test_empty_store_is_not_found() {
        let reader = CacheReader::new(Arc::new(MemoryRateStore::new()));
        assert!(matches!(reader.fetch().await, Err(SourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = Arc::new(MemoryRateStore::new());
        store.fail_with(SourceError::Network("connection refused".into()));
        let reader = CacheReader::new(store);
        assert!(matches!(reader.fetch().await, Err(SourceError::Network(_))));
    }

    proptest::proptest! {
        #[test]
        fn prop_returns_newest_snapshot(days in proptest::collection::vec(1u32..28, 1..20)) {
            let store = Arc::new(MemoryRateStore::new());
            store.insert(
                days.iter()
                    .map(|d| ExchangeRate::new(CurrencyCode::usd(), dec!(30), dec!(30.1), date(*d)))
                    .collect(),
            );
            let newest = days.iter().copied().max().map(date);

            let rates = tokio_test::block_on(CacheReader::new(store).fetch()).unwrap();

            proptest::prop_assert!(rates.iter().all(|r| Some(r.update_date) == newest));
        }
    }
}
