//! HTTP JSON Price Provider - Generic REST Quote Source
//!
//! One adapter covers every REST ticker endpoint: the price is picked
//! out of the response body with a JSON pointer, so adding an exchange
//! is a config change. Numbers and numeric strings are both accepted.
//! An optional per-provider quota keeps us under public API limits; a
//! call over quota fails immediately instead of waiting.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use crate::config::ProviderConfig;
use crate::domain::errors::FeedError;
use crate::domain::quote::parse_price;
use crate::ports::price_provider::PriceProvider;

/// A REST endpoint returning the tracked asset's price as JSON.
pub struct HttpPriceProvider {
    /// Provider name for logs and metrics.
    name: String,
    /// Full request URL.
    url: String,
    /// JSON pointer to the price field ("" = whole body).
    price_pointer: String,
    /// Shared HTTP client.
    http: Client,
    /// Request quota, if configured.
    limiter: Option<DefaultDirectRateLimiter>,
}

impl HttpPriceProvider {
    /// Create a provider from its config entry.
    pub fn new(config: &ProviderConfig, http: Client) -> Self {
        let limiter = config
            .requests_per_minute
            .and_then(NonZeroU32::new)
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));

        Self {
            name: config.name.clone(),
            url: config.url.clone(),
            price_pointer: config.price_pointer.clone(),
            http,
            limiter,
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> FeedError {
        FeedError::ProviderUnavailable {
            provider: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Extract the price from a response body.
    fn extract(&self, body: &serde_json::Value) -> Result<Decimal, FeedError> {
        let field = body
            .pointer(&self.price_pointer)
            .ok_or_else(|| self.unavailable(format!("no value at {}", self.price_pointer)))?;
        parse_price(field).ok_or_else(|| self.unavailable(format!("non-numeric price: {field}")))
    }
}

#[async_trait]
impl PriceProvider for HttpPriceProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(provider = %self.name))]
    async fn fetch_price(&self) -> Result<Decimal, FeedError> {
        if let Some(limiter) = &self.limiter {
            if limiter.check().is_err() {
                return Err(self.unavailable("request quota exhausted"));
            }
        }

        let response = self
            .http
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.unavailable(format!("HTTP {status}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("invalid JSON: {e}")))?;

        let price = self.extract(&body)?;
        debug!(price = %price, "Provider responded");
        Ok(price)
    }
}

/// Build the shared HTTP client used by all providers.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(2)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}
