//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::info;

use super::{AppConfig, ProviderConfig};
use crate::domain::settlement::MAX_RATE_SCALE;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    primary_providers = config.feeds.primary.len(),
    secondary_providers = config.feeds.secondary.len(),
    round_secs = config.round.duration_secs,
    lock_window_secs = config.round.lock_window_secs,
    commission = %config.betting.commission_rate,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content)
    .with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - A lock window that is a strict suffix of the round
/// - Ordered, positive bet limits and a commission in [0, 1)
/// - A sane price range containing the fallback constant
/// - Non-empty, well-formed provider definitions
fn validate_config(config: &AppConfig) -> Result<()> {
  // Round timing
  anyhow::ensure!(
    config.round.duration_secs > 0,
    "round.duration_secs must be positive"
  );
  anyhow::ensure!(
    config.round.lock_window_secs < config.round.duration_secs,
    "round.lock_window_secs ({}) must be shorter than round.duration_secs ({})",
    config.round.lock_window_secs,
    config.round.duration_secs
  );
  anyhow::ensure!(
    config.round.tick_interval_ms > 0,
    "round.tick_interval_ms must be positive"
  );

  // Betting
  anyhow::ensure!(
    config.betting.min_bet > 0,
    "betting.min_bet must be positive"
  );
  anyhow::ensure!(
    config.betting.min_bet <= config.betting.max_bet,
    "betting.min_bet ({}) exceeds betting.max_bet ({})",
    config.betting.min_bet,
    config.betting.max_bet
  );
  anyhow::ensure!(
    config.betting.commission_rate >= Decimal::ZERO
      && config.betting.commission_rate < Decimal::ONE,
    "betting.commission_rate must be in [0, 1), got {}",
    config.betting.commission_rate
  );
  anyhow::ensure!(
    config.betting.commission_rate.normalize().scale() <= MAX_RATE_SCALE,
    "betting.commission_rate may have at most {} decimal places, got {}",
    MAX_RATE_SCALE,
    config.betting.commission_rate
  );

  // Feeds
  let feeds = &config.feeds;
  anyhow::ensure!(
    (1_000..=5_000).contains(&feeds.provider_timeout_ms),
    "feeds.provider_timeout_ms must be in [1000, 5000], got {}",
    feeds.provider_timeout_ms
  );
  anyhow::ensure!(
    feeds.min_valid_price > Decimal::ZERO && feeds.min_valid_price < feeds.max_valid_price,
    "feeds price range ({}, {}) is invalid",
    feeds.min_valid_price,
    feeds.max_valid_price
  );
  anyhow::ensure!(
    feeds.fallback_price > feeds.min_valid_price && feeds.fallback_price < feeds.max_valid_price,
    "feeds.fallback_price {} outside the valid price range",
    feeds.fallback_price
  );
  anyhow::ensure!(
    feeds.volatility_threshold_pct > Decimal::ZERO,
    "feeds.volatility_threshold_pct must be positive"
  );
  anyhow::ensure!(
    feeds.divergence_threshold_pct > Decimal::ZERO,
    "feeds.divergence_threshold_pct must be positive"
  );
  anyhow::ensure!(
    feeds.price_update_interval_secs > 0,
    "feeds.price_update_interval_secs must be positive"
  );
  anyhow::ensure!(
    !feeds.primary.is_empty(),
    "At least one primary price provider must be configured"
  );

  for (tier, providers) in [("primary", &feeds.primary), ("secondary", &feeds.secondary)] {
    for (i, provider) in providers.iter().enumerate() {
      validate_provider(tier, i, provider)?;
    }
  }

  // Secondary endpoints must be independent from the primary list
  for secondary in &feeds.secondary {
    anyhow::ensure!(
      !feeds.primary.iter().any(|p| p.url == secondary.url),
      "Secondary provider {} reuses a primary endpoint",
      secondary.name
    );
  }

  anyhow::ensure!(
    config.persistence.snapshot_interval_secs > 0,
    "persistence.snapshot_interval_secs must be positive"
  );

  Ok(())
}

fn validate_provider(tier: &str, index: usize, provider: &ProviderConfig) -> Result<()> {
  anyhow::ensure!(
    !provider.name.is_empty(),
    "{} provider {} has an empty name",
    tier,
    index
  );
  anyhow::ensure!(
    provider.url.starts_with("http://") || provider.url.starts_with("https://"),
    "{} provider {} ({}) has a non-HTTP url",
    tier,
    index,
    provider.name
  );
  anyhow::ensure!(
    provider.price_pointer.is_empty() || provider.price_pointer.starts_with('/'),
    "{} provider {} ({}) price_pointer must be a JSON pointer",
    tier,
    index,
    provider.name
  );
  if let Some(rpm) = provider.requests_per_minute {
    anyhow::ensure!(
      rpm > 0,
      "{} provider {} ({}) requests_per_minute must be positive",
      tier,
      index,
      provider.name
    );
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;

  const MINIMAL: &str = r#"
    [[feeds.primary]]
    name = "binance"
    url = "https://api.binance.com/api/v3/ticker/price?symbol=BTCUSDT"
    price_pointer = "/price"
  "#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = parse_config(MINIMAL).unwrap();
    assert_eq!(config.round.duration_secs, 300);
    assert_eq!(config.round.lock_window_secs, 10);
    assert_eq!(config.round.settlement_display_secs, 5);
    assert_eq!(config.betting.min_bet, 10);
    assert_eq!(config.betting.max_bet, 1000);
    assert_eq!(config.betting.commission_rate, dec!(0.1));
    assert_eq!(config.feeds.fallback_price, dec!(65432.10));
    assert_eq!(config.feeds.primary.len(), 1);
    assert!(config.feeds.secondary.is_empty());
  }

  #[test]
  fn test_commission_as_string() {
    let text = format!("[betting]\ncommission_rate = \"0.05\"\n{MINIMAL}");
    let config = parse_config(&text).unwrap();
    assert_eq!(config.betting.commission_rate, dec!(0.05));
  }

  #[test]
  fn test_rejects_missing_primary() {
    assert!(parse_config("").is_err());
  }

  #[test]
  fn test_rejects_lock_window_not_shorter_than_round() {
    let text = format!("[round]\nduration_secs = 10\nlock_window_secs = 10\n{MINIMAL}");
    assert!(parse_config(&text).is_err());
  }

  #[test]
  fn test_rejects_full_commission() {
    let text = format!("[betting]\ncommission_rate = \"1\"\n{MINIMAL}");
    assert!(parse_config(&text).is_err());
  }

  #[test]
  fn test_rejects_overlong_commission_rate() {
    let text = format!("[betting]\ncommission_rate = \"0.3333333333333333333333333333\"\n{MINIMAL}");
    assert!(parse_config(&text).is_err());
  }

  #[test]
  fn test_rejects_shared_secondary_endpoint() {
    let text = format!(
      "{MINIMAL}\n[[feeds.secondary]]\nname = \"dup\"\nurl = \"https://api.binance.com/api/v3/ticker/price?symbol=BTCUSDT\"\nprice_pointer = \"/price\"\n"
    );
    assert!(parse_config(&text).is_err());
  }
}
