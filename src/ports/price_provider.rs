//! Price Provider Port - Single-Quote Price Source Interface
//!
//! Every upstream price service, whatever its transport or response
//! shape, is reduced to one operation: fetch the current price of the
//! tracked asset. The aggregator iterates providers polymorphically,
//! so adding or removing one is a configuration change.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::errors::FeedError;

/// Trait for independently-addressed price sources.
///
/// Implementors own transport and parsing. Range validation and the
/// per-call timeout are enforced again by the aggregator, so a provider
/// returning an absurd value is treated exactly like one that is down.
#[async_trait]
pub trait PriceProvider: Send + Sync + 'static {
  /// Provider name used in logs and metrics.
  fn name(&self) -> &str;

  /// Fetch and parse the current price.
  ///
  /// Any failure is reported as `FeedError::ProviderUnavailable`.
  async fn fetch_price(&self) -> Result<Decimal, FeedError>;
}
