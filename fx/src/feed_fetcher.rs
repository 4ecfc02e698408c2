//! Fetches the live central-bank feed.

use std::time::Duration;

use async_trait::async_trait;
use ratefeed_common::{ExchangeRate, SourceKind};
use reqwest::Client;
use tracing::debug;

use crate::error::{SourceError, SourceResult};
use crate::http;
use crate::parser::{FeedFormat, FeedParser};
use crate::source::RateSource;

/// Daily rates published by the central bank.
pub const DEFAULT_FEED_URL: &str = "https://www.tcmb.gov.tr/kurlar/today.xml";

/// Configuration for the live feed source.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// URL of the XML feed.
    pub url: String,
    /// Number conventions of the feed.
    pub format: FeedFormat,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            format: FeedFormat::default(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl FeedConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Feed URL cannot be empty".to_string());
        }

        if !matches!(self.format.decimal_separator, ',' | '.') {
            return Err(format!(
                "Unsupported decimal separator {:?}",
                self.format.decimal_separator
            ));
        }

        if self.request_timeout.is_zero() {
            return Err("Feed request timeout cannot be zero".to_string());
        }

        Ok(())
    }
}

/// Second-ranked source: the live feed, parsed in-process.
pub struct DirectFeedFetcher {
    client: Client,
    url: String,
    parser: FeedParser,
}

impl DirectFeedFetcher {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            client: http::client(config.request_timeout),
            url: config.url,
            parser: FeedParser::new(config.format),
        }
    }
}

#[async_trait]
impl RateSource for DirectFeedFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::DirectFeed
    }

    async fn fetch(&self) -> SourceResult<Vec<ExchangeRate>> {
        let response = self.client.get(&self.url).send().await?;
        let body = http::success_body(response).await?;
        let rates = self.parser.parse(&body)?;

        let pivot = &self.parser.format().pivot;
        if rates.iter().all(|r| &r.currency_code == pivot) {
            return Err(SourceError::NotFound(
                "feed lists no supported currency".to_string(),
            ));
        }

        debug!(url = %self.url, rows = rates.len(), "Fetched central-bank feed");
        Ok(rates)
    }
}
