//! ratefeed Rate Pipeline
//!
//! Acquires the current multi-currency rate table from ranked sources and
//! serves conversions from it.
//!
//! # Features
//!
//! - Central-bank XML feed parsing
//! - Ranked sources: persisted store, live feed, aggregation service
//! - Built-in fallback rates when every live source is down
//! - Single-writer rate cache with monotonic snapshot dates
//! - Poll and push refresh triggers sharing one in-flight pass
//! - Locale-aware conversion and formatting
//!
//! # Example
//!
//! ```rust,ignore
//! use ratefeed_fx::{ChangeScheduler, ConversionEngine, Locale, RateCache, StaticFallback};
//!
//! let fallback = StaticFallback::default();
//! let cache = Arc::new(RateCache::seeded(&fallback));
//! let handle = ChangeScheduler::new(config, orchestrator, cache.clone()).start(None);
//!
//! let engine = ConversionEngine::new(cache, Locale::TrTr);
//! println!("{}", engine.convert_and_format(dec!(100), &usd, &lira)?);
//! ```

pub mod aggregator;
pub mod cache;
pub mod cache_reader;
pub mod conversion;
pub mod error;
pub mod fallback;
pub mod feed_fetcher;
pub mod format;
mod http;
pub mod orchestrator;
pub mod parser;
pub mod scheduler;
pub mod source;

pub use aggregator::{AggregatorConfig, AggregatorInvoker};
pub use cache::{CachedRates, RateCache, ReplaceOutcome};
pub use cache_reader::{CacheReader, RateStore};
pub use conversion::ConversionEngine;
pub use error::{SourceError, SourceResult};
pub use fallback::StaticFallback;
pub use feed_fetcher::{DirectFeedFetcher, FeedConfig};
pub use format::{format_money, Locale};
pub use orchestrator::{Orchestration, Orchestrator, OrchestratorConfig, SourceFailure};
pub use parser::{FeedFormat, FeedParser};
pub use scheduler::{
    ChangeEvent, ChangeScheduler, ChangeSubscription, ManualRefresh, RefreshOutcome,
    SchedulerConfig, SchedulerHandle, Trigger,
};
pub use source::RateSource;

#[cfg(any(test, feature = "test-utils"))]
pub use cache_reader::MemoryRateStore;
#[cfg(any(test, feature = "test-utils"))]
pub use http::test_server;
#[cfg(any(test, feature = "test-utils"))]
pub use source::MockRateSource;
