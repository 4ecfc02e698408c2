//! Invokes the remote aggregation service.
//!
//! The service fetches rates on its own, writes them to the persisted store,
//! and echoes the rows back as `{ "success": bool, "data": [...] }`.

use std::time::Duration;

use async_trait::async_trait;
use ratefeed_common::{ExchangeRate, SourceKind};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SourceError, SourceResult};
use crate::http;
use crate::source::RateSource;

/// Configuration for the aggregation service.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Endpoint that runs the aggregation.
    pub url: String,
    /// Action marker sent as the only request field.
    pub action: String,
    /// Optional bearer token.
    pub token: Option<String>,
    /// Per-request timeout. Aggregation does its own upstream fetches, so
    /// this is longer than the feed's.
    pub request_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8787/exchange-rates".to_string(),
            action: "fetch".to_string(),
            token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl AggregatorConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Aggregator URL cannot be empty".to_string());
        }

        if self.action.is_empty() {
            return Err("Aggregator action cannot be empty".to_string());
        }

        if self.request_timeout.is_zero() {
            return Err("Aggregator request timeout cannot be zero".to_string());
        }

        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    action: &'a str,
}

#[derive(Debug, Deserialize)]
struct InvokeResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Vec<ExchangeRate>>,
    #[serde(default)]
    error: Option<String>,
}

impl InvokeResponse {
    fn into_rates(self) -> SourceResult<Vec<ExchangeRate>> {
        if !self.success {
            return Err(SourceError::NotFound(
                self.error
                    .unwrap_or_else(|| "aggregator reported failure".to_string()),
            ));
        }

        match self.data {
            Some(rates) if !rates.is_empty() => Ok(rates),
            _ => Err(SourceError::NotFound(
                "aggregator returned no data".to_string(),
            )),
        }
    }
}

/// Third-ranked source, also used to warm the store in the background.
pub struct AggregatorInvoker {
    client: Client,
    config: AggregatorConfig,
}

impl AggregatorInvoker {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            client: http::client(config.request_timeout),
            config,
        }
    }
}

#[async_trait]
impl RateSource for AggregatorInvoker {
    fn kind(&self) -> SourceKind {
        SourceKind::Aggregator
    }

    async fn fetch(&self) -> SourceResult<Vec<ExchangeRate>> {
        let mut request = self.client.post(&self.config.url).json(&InvokeRequest {
            action: &self.config.action,
        });
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let body = http::success_body(response).await?;
        let rates = serde_json::from_slice::<InvokeResponse>(&body)?.into_rates()?;

        debug!(url = %self.config.url, rows = rates.len(), "Aggregator returned rates");
        Ok(rates)
    }
}
