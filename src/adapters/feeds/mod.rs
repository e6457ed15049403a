//! Price Feed Adapters - HTTP Quote Providers
//!
//! Every configured provider (primary or secondary) is an
//! `HttpPriceProvider`; they differ only in URL and JSON pointer.

pub mod http;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::config::{FeedsConfig, ProviderConfig};
use crate::ports::price_provider::PriceProvider;

pub use http::HttpPriceProvider;

/// Primary and secondary provider lists, in configured order.
pub struct ProviderSet {
    pub primary: Vec<Arc<dyn PriceProvider>>,
    pub secondary: Vec<Arc<dyn PriceProvider>>,
}

/// Instantiate every provider named in `[feeds]`.
pub fn providers_from_config(feeds: &FeedsConfig) -> Result<ProviderSet> {
    let client = http::build_client(Duration::from_millis(feeds.provider_timeout_ms))?;

    let build = |list: &[ProviderConfig]| -> Vec<Arc<dyn PriceProvider>> {
        list.iter()
            .map(|p| Arc::new(HttpPriceProvider::new(p, client.clone())) as Arc<dyn PriceProvider>)
            .collect()
    };

    let set = ProviderSet {
        primary: build(&feeds.primary),
        secondary: build(&feeds.secondary),
    };

    info!(
        primary = ?feeds.primary.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        secondary = ?feeds.secondary.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        "Price providers configured"
    );

    Ok(set)
}
