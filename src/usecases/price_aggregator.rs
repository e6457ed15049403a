//! Price Aggregator - Trustworthy Quotes From Unreliable Providers
//!
//! Produces one numeric quote for the tracked asset:
//! 1. Probe primary providers sequentially, in priority order
//! 2. First value that arrives in time and passes range validation wins
//! 3. Volatility-gated cross-check against the secondary provider set
//! 4. If every primary fails: last accepted quote, then fallback constant
//!
//! Probing is sequential, not fan-out, so the provider that wins is
//! reproducible. Worst-case latency is the sum of per-provider timeouts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::config::FeedsConfig;
use crate::domain::errors::FeedError;
use crate::domain::quote::{
  median_floor, relative_diff_pct, PriceBounds, PriceQuote, PriceSample, QuoteOrigin,
  ResolvedQuote, SampleWindow, SourceTier,
};
use crate::ports::price_provider::PriceProvider;

/// Tunables for the aggregator.
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
  /// Sanity range and rounding applied to every provider value.
  pub bounds: PriceBounds,
  /// Upper bound on a single provider call.
  pub provider_timeout: Duration,
  /// Quote used when nothing was ever accepted.
  pub fallback_price: Decimal,
  /// Recent spread (%) above which secondaries are consulted.
  pub volatility_threshold_pct: Decimal,
  /// Median/candidate divergence (%) above which the median wins.
  pub divergence_threshold_pct: Decimal,
}

impl Default for AggregatorSettings {
  fn default() -> Self {
    Self {
      bounds: PriceBounds::default(),
      provider_timeout: Duration::from_secs(3),
      fallback_price: dec!(65432.10),
      volatility_threshold_pct: dec!(5),
      divergence_threshold_pct: dec!(2),
    }
  }
}

impl AggregatorSettings {
  /// Build settings from the `[feeds]` config section.
  pub fn from_config(feeds: &FeedsConfig) -> Self {
    Self {
      bounds: PriceBounds {
        min: feeds.min_valid_price,
        max: feeds.max_valid_price,
        precision: feeds.price_precision,
      },
      provider_timeout: Duration::from_millis(feeds.provider_timeout_ms),
      fallback_price: feeds.fallback_price,
      volatility_threshold_pct: feeds.volatility_threshold_pct,
      divergence_threshold_pct: feeds.divergence_threshold_pct,
    }
  }
}

/// Aggregates primary and secondary price providers into one quote.
pub struct PriceAggregator {
  /// Primary providers in priority order.
  primary: Vec<Arc<dyn PriceProvider>>,
  /// Independent providers used only for cross-checks.
  secondary: Vec<Arc<dyn PriceProvider>>,
  settings: AggregatorSettings,
  /// Recent accepted candidates, for volatility.
  samples: Mutex<SampleWindow>,
  /// Last quote accepted through the live path.
  last_accepted: RwLock<Option<PriceQuote>>,
}

impl PriceAggregator {
  /// Create a new aggregator.
  pub fn new(
    primary: Vec<Arc<dyn PriceProvider>>,
    secondary: Vec<Arc<dyn PriceProvider>>,
    settings: AggregatorSettings,
  ) -> Self {
    Self {
      primary,
      secondary,
      settings,
      samples: Mutex::new(SampleWindow::default()),
      last_accepted: RwLock::new(None),
    }
  }

  /// Last quote accepted through the live path, if any.
  pub async fn last_accepted(&self) -> Option<PriceQuote> {
    self.last_accepted.read().await.clone()
  }

  /// Number of samples currently in the volatility window.
  pub async fn sample_count(&self) -> usize {
    self.samples.lock().await.len()
  }

  /// Call one provider under the per-provider timeout and validate the value.
  async fn probe(&self, provider: &dyn PriceProvider) -> Result<Decimal, FeedError> {
    let unavailable = |reason: String| FeedError::ProviderUnavailable {
      provider: provider.name().to_string(),
      reason,
    };

    let raw = tokio::time::timeout(self.settings.provider_timeout, provider.fetch_price())
      .await
      .map_err(|_| {
        unavailable(format!(
          "timed out after {}ms",
          self.settings.provider_timeout.as_millis()
        ))
      })??;

    self
      .settings
      .bounds
      .accept(raw)
      .ok_or_else(|| unavailable(format!("value {raw} outside sane range")))
  }

  /// Return the first valid quote from the primary providers, in order.
  #[instrument(skip(self))]
  pub async fn fetch_primary_quote(&self) -> Result<PriceQuote, FeedError> {
    for provider in &self.primary {
      match self.probe(provider.as_ref()).await {
        Ok(value) => {
          debug!(provider = provider.name(), price = %value, "Primary quote accepted");
          return Ok(PriceQuote::new(value, Utc::now(), SourceTier::Primary));
        }
        Err(e) => {
          warn!(error = %e, "Primary provider failed, trying next");
        }
      }
    }

    Err(FeedError::AllProvidersFailed)
  }

  /// Record a candidate and cross-check it when recent volatility is high.
  ///
  /// Returns the candidate unless the secondary median diverges from it by
  /// more than the divergence threshold.
  #[instrument(skip(self, candidate), fields(candidate = %candidate.value))]
  pub async fn verify(&self, candidate: PriceQuote) -> PriceQuote {
    let volatility = {
      let mut samples = self.samples.lock().await;
      samples.push(PriceSample {
        value: candidate.value,
        obtained_at: candidate.obtained_at,
      });
      samples.recent_volatility_pct()
    };

    let Some(volatility) = volatility else {
      return candidate;
    };
    if volatility <= self.settings.volatility_threshold_pct {
      return candidate;
    }

    info!(
      volatility_pct = %volatility.round_dp(4),
      threshold_pct = %self.settings.volatility_threshold_pct,
      "Volatility above threshold, cross-checking secondary providers"
    );

    let mut values = Vec::with_capacity(self.secondary.len());
    for provider in &self.secondary {
      match self.probe(provider.as_ref()).await {
        Ok(value) => values.push(value),
        Err(e) => debug!(error = %e, "Secondary provider failed"),
      }
    }

    let Some(median) = median_floor(&values) else {
      warn!("No secondary provider returned a valid price, keeping candidate");
      return candidate;
    };

    let divergence = relative_diff_pct(median, candidate.value);
    if divergence > self.settings.divergence_threshold_pct {
      warn!(
        median = %median,
        responses = values.len(),
        divergence_pct = %divergence.round_dp(4),
        "Candidate diverges from secondary median, using median"
      );
      PriceQuote::new(median, Utc::now(), SourceTier::Secondary)
    } else {
      debug!(median = %median, "Candidate confirmed by secondary providers");
      candidate
    }
  }

  /// Resolve a quote for the scheduler. Never fails.
  ///
  /// Stale and fallback values are reported through `QuoteOrigin` and are
  /// not added to the volatility window.
  #[instrument(skip(self))]
  pub async fn resolve_quote(&self) -> ResolvedQuote {
    match self.fetch_primary_quote().await {
      Ok(candidate) => {
        let accepted = self.verify(candidate).await;
        *self.last_accepted.write().await = Some(accepted.clone());
        ResolvedQuote {
          quote: accepted,
          origin: QuoteOrigin::Live,
        }
      }
      Err(e) => {
        let last = self.last_accepted.read().await.clone();
        match last {
          Some(quote) => {
            warn!(error = %e, price = %quote.value, "Using last accepted quote");
            ResolvedQuote {
              quote,
              origin: QuoteOrigin::LastKnown,
            }
          }
          None => {
            warn!(
              error = %e,
              price = %self.settings.fallback_price,
              "No quote ever accepted, using fallback price"
            );
            ResolvedQuote {
              quote: PriceQuote::new(
                self.settings.fallback_price,
                Utc::now(),
                SourceTier::Primary,
              ),
              origin: QuoteOrigin::Fallback,
            }
          }
        }
      }
    }
  }
}
