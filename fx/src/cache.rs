//! Current rate table with change notification.

use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::RwLock;
use ratefeed_common::{RateTable, RatesMap};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::fallback::StaticFallback;

/// A cached table and the rates map derived from it.
#[derive(Debug)]
pub struct CachedRates {
    table: RateTable,
    rates_map: RatesMap,
}

impl CachedRates {
    fn new(table: RateTable) -> Self {
        let rates_map = table.rates_map();
        Self { table, rates_map }
    }

    pub fn table(&self) -> &RateTable {
        &self.table
    }

    pub fn rates_map(&self) -> &RatesMap {
        &self.rates_map
    }
}

/// What [`RateCache::replace`] did with the offered table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The table is now current.
    Replaced,
    /// The table was older than the current one and was dropped.
    Stale {
        current: NaiveDate,
        offered: NaiveDate,
    },
}

#[derive(Debug, Default)]
struct CacheStatus {
    loading: bool,
    last_error: Option<String>,
}

/// Holds the current rate table.
///
/// Tables are swapped whole; readers always see one complete snapshot.
/// Snapshot dates never go backwards.
pub struct RateCache {
    current: watch::Sender<Arc<CachedRates>>,
    status: RwLock<CacheStatus>,
}

impl RateCache {
    /// Create a cache holding `initial`.
    pub fn new(initial: RateTable) -> Self {
        let (current, _) = watch::channel(Arc::new(CachedRates::new(initial)));
        Self {
            current,
            status: RwLock::new(CacheStatus::default()),
        }
    }

    /// Create a cache seeded with the fallback table.
    pub fn seeded(fallback: &StaticFallback) -> Self {
        Self::new(fallback.table())
    }

    /// The current snapshot.
    pub fn current(&self) -> Arc<CachedRates> {
        self.current.borrow().clone()
    }

    /// Snapshot date of the current table.
    pub fn snapshot_date(&self) -> NaiveDate {
        self.current.borrow().table.snapshot_date()
    }

    /// Receive every future replacement.
    pub fn subscribe(&self) -> watch::Receiver<Arc<CachedRates>> {
        self.current.subscribe()
    }

    /// Swap in a new table unless it is older than the current one.
    pub fn replace(&self, table: RateTable) -> ReplaceOutcome {
        let mut outcome = ReplaceOutcome::Replaced;

        self.current.send_if_modified(|current| {
            let current_date = current.table.snapshot_date();
            if table.snapshot_date() < current_date {
                outcome = ReplaceOutcome::Stale {
                    current: current_date,
                    offered: table.snapshot_date(),
                };
                return false;
            }
            *current = Arc::new(CachedRates::new(table));
            true
        });

        match outcome {
            ReplaceOutcome::Replaced => {
                let current = self.current();
                info!(
                    source = %current.table.source(),
                    snapshot_date = %current.table.snapshot_date(),
                    currencies = current.table.len(),
                    "Rate cache replaced"
                );
            }
            ReplaceOutcome::Stale { current, offered } => {
                warn!(
                    current = %current,
                    offered = %offered,
                    "Rejected older snapshot"
                );
            }
        }

        outcome
    }

    /// Whether a refresh is running.
    pub fn is_loading(&self) -> bool {
        self.status.read().loading
    }

    pub fn set_loading(&self, loading: bool) {
        self.status.write().loading = loading;
    }

    /// Last refresh problem, for display only.
    pub fn last_error(&self) -> Option<String> {
        self.status.read().last_error.clone()
    }

    pub fn set_last_error(&self, error: impl Into<String>) {
        let error = error.into();
        debug!(error = %error, "Recording refresh problem");
        self.status.write().last_error = Some(error);
    }

    pub fn clear_last_error(&self) {
        self.status.write().last_error = None;
    }
}
