//! Node configuration.

use std::time::Duration;

use ratefeed_fx::{AggregatorConfig, FeedConfig, Locale, SchedulerConfig};
use ratefeed_store::DEFAULT_NOTIFY_CHANNEL;

/// Configuration for the `ratefeed` binary.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// PostgreSQL URL of the persisted rate store.
    pub database_url: String,
    /// How long to wait for a store connection.
    pub db_acquire_timeout: Duration,
    /// Create the rate table and its trigger on startup.
    pub ensure_schema: bool,
    /// Notification channel the store trigger uses.
    pub notify_channel: String,
    /// Live feed source.
    pub feed: FeedConfig,
    /// Aggregation service source.
    pub aggregator: AggregatorConfig,
    /// Refresh triggers.
    pub scheduler: SchedulerConfig,
    /// Display locale for formatted amounts.
    pub locale: Locale,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/ratefeed".to_string(),
            db_acquire_timeout: Duration::from_secs(5),
            ensure_schema: false,
            notify_channel: DEFAULT_NOTIFY_CHANNEL.to_string(),
            feed: FeedConfig::default(),
            aggregator: AggregatorConfig::default(),
            scheduler: SchedulerConfig::default(),
            locale: Locale::default(),
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup. Unparseable values keep
    /// their defaults.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let secs = |key: &str| {
            var(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
        };

        if let Some(url) = var("DATABASE_URL") {
            config.database_url = url;
        }

        if let Some(flag) = var("RATEFEED_ENSURE_SCHEMA") {
            config.ensure_schema = matches!(flag.trim(), "1" | "true" | "yes");
        }

        if let Some(channel) = var("RATEFEED_NOTIFY_CHANNEL") {
            config.notify_channel = channel;
        }

        if let Some(url) = var("RATEFEED_FEED_URL") {
            config.feed.url = url;
        }

        if let Some(separator) = var("RATEFEED_DECIMAL_SEPARATOR") {
            if let Some(c) = separator.trim().chars().next() {
                config.feed.format.decimal_separator = c;
            }
        }

        if let Some(timeout) = secs("RATEFEED_HTTP_TIMEOUT_SECS") {
            config.feed.request_timeout = timeout;
        }

        if let Some(url) = var("RATEFEED_AGGREGATOR_URL") {
            config.aggregator.url = url;
        }

        if let Some(token) = var("RATEFEED_AGGREGATOR_TOKEN") {
            config.aggregator.token = Some(token).filter(|t| !t.is_empty());
        }

        if let Some(action) = var("RATEFEED_AGGREGATOR_ACTION") {
            config.aggregator.action = action;
        }

        if let Some(timeout) = secs("RATEFEED_AGGREGATOR_TIMEOUT_SECS") {
            config.aggregator.request_timeout = timeout;
        }

        if let Some(interval) = secs("RATEFEED_POLL_SECS") {
            config.scheduler.poll_interval = interval;
        }

        if let Some(locale) = var("RATEFEED_LOCALE") {
            if let Ok(locale) = locale.parse() {
                config.locale = locale;
            }
        }

        if let Some(level) = var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        if self.notify_channel.is_empty() {
            return Err("Notification channel cannot be empty".to_string());
        }

        self.feed.validate()?;
        self.aggregator.validate()?;
        self.scheduler.validate()?;

        Ok(())
    }
}
