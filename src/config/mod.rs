//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! Round timing, betting limits, commission and the price provider
//! lists are all externalized here - nothing is hardcoded in the
//! domain layer. Every section has defaults matching the reference
//! game (5-minute rounds, 10 s lock window, 10% commission).

pub mod loader;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
  /// Service identity and logging.
  #[serde(default)]
  pub service: ServiceConfig,
  /// Round timing.
  #[serde(default)]
  pub round: RoundConfig,
  /// Bet limits and commission.
  #[serde(default)]
  pub betting: BettingConfig,
  /// Price providers and verification thresholds.
  #[serde(default)]
  pub feeds: FeedsConfig,
  /// Bets/round HTTP API.
  #[serde(default)]
  pub api: ApiConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Persistence configuration.
  #[serde(default)]
  pub persistence: PersistenceConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  #[serde(default = "default_name")]
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Round timing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RoundConfig {
  /// OPEN + LOCKED duration in seconds.
  #[serde(default = "default_round_duration")]
  pub duration_secs: u64,
  /// Length of the locked suffix of the round in seconds.
  #[serde(default = "default_lock_window")]
  pub lock_window_secs: u64,
  /// Pause between settlement and the next round (seconds).
  #[serde(default = "default_display_delay")]
  pub settlement_display_secs: u64,
  /// Scheduler tick period (milliseconds).
  #[serde(default = "default_tick_interval")]
  pub tick_interval_ms: u64,
}

/// Bet limits and pool commission.
#[derive(Debug, Clone, Deserialize)]
pub struct BettingConfig {
  /// Smallest admissible stake.
  #[serde(default = "default_min_bet")]
  pub min_bet: u64,
  /// Largest admissible stake.
  #[serde(default = "default_max_bet")]
  pub max_bet: u64,
  /// Fraction of the pool retained as commission, in [0, 1).
  #[serde(default = "default_commission_rate")]
  pub commission_rate: Decimal,
  /// Balance credited to a participant the first time they are seen.
  #[serde(default)]
  pub initial_balance: u64,
}

/// A single HTTP price provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
  /// Provider name for logs and metrics.
  pub name: String,
  /// Full request URL.
  pub url: String,
  /// JSON pointer (RFC 6901) to the price inside the response body.
  pub price_pointer: String,
  /// Optional request quota; calls over quota count as failures.
  pub requests_per_minute: Option<u32>,
}

/// Price feed configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedsConfig {
  /// Interval between background price refreshes (seconds).
  #[serde(default = "default_price_update_interval")]
  pub price_update_interval_secs: u64,
  /// Per-provider request timeout (milliseconds).
  #[serde(default = "default_provider_timeout")]
  pub provider_timeout_ms: u64,
  /// Exclusive lower bound for a sane quote.
  #[serde(default = "default_min_valid_price")]
  pub min_valid_price: Decimal,
  /// Exclusive upper bound for a sane quote.
  #[serde(default = "default_max_valid_price")]
  pub max_valid_price: Decimal,
  /// Quote used when no provider ever answered.
  #[serde(default = "default_fallback_price")]
  pub fallback_price: Decimal,
  /// Decimal places kept on accepted quotes.
  #[serde(default = "default_price_precision")]
  pub price_precision: u32,
  /// Volatility (%) over recent samples that triggers a cross-check.
  #[serde(default = "default_volatility_threshold")]
  pub volatility_threshold_pct: Decimal,
  /// Divergence (%) beyond which the secondary median wins.
  #[serde(default = "default_divergence_threshold")]
  pub divergence_threshold_pct: Decimal,
  /// Primary providers in priority order.
  #[serde(default)]
  pub primary: Vec<ProviderConfig>,
  /// Independent providers used only for cross-checks.
  #[serde(default)]
  pub secondary: Vec<ProviderConfig>,
}

/// HTTP API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Enable the bets/round API.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// API bind address.
  #[serde(default = "default_api_addr")]
  pub bind_address: String,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory for round logs and balance snapshots.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
  /// Balance snapshot interval (seconds).
  #[serde(default = "default_snapshot_interval")]
  pub snapshot_interval_secs: u64,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      name: default_name(),
      log_level: default_log_level(),
    }
  }
}

impl Default for RoundConfig {
  fn default() -> Self {
    Self {
      duration_secs: default_round_duration(),
      lock_window_secs: default_lock_window(),
      settlement_display_secs: default_display_delay(),
      tick_interval_ms: default_tick_interval(),
    }
  }
}

impl Default for BettingConfig {
  fn default() -> Self {
    Self {
      min_bet: default_min_bet(),
      max_bet: default_max_bet(),
      commission_rate: default_commission_rate(),
      initial_balance: 0,
    }
  }
}

impl Default for FeedsConfig {
  fn default() -> Self {
    Self {
      price_update_interval_secs: default_price_update_interval(),
      provider_timeout_ms: default_provider_timeout(),
      min_valid_price: default_min_valid_price(),
      max_valid_price: default_max_valid_price(),
      fallback_price: default_fallback_price(),
      price_precision: default_price_precision(),
      volatility_threshold_pct: default_volatility_threshold(),
      divergence_threshold_pct: default_divergence_threshold(),
      primary: Vec::new(),
      secondary: Vec::new(),
    }
  }
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_api_addr(),
    }
  }
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
      snapshot_interval_secs: default_snapshot_interval(),
    }
  }
}

// Default value functions for serde

fn default_name() -> String {
  "updown-rounds".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_round_duration() -> u64 {
  300
}

fn default_lock_window() -> u64 {
  10
}

fn default_display_delay() -> u64 {
  5
}

fn default_tick_interval() -> u64 {
  1000
}

fn default_min_bet() -> u64 {
  10
}

fn default_max_bet() -> u64 {
  1000
}

fn default_commission_rate() -> Decimal {
  dec!(0.1)
}

fn default_price_update_interval() -> u64 {
  15
}

fn default_provider_timeout() -> u64 {
  3000
}

fn default_min_valid_price() -> Decimal {
  dec!(1000)
}

fn default_max_valid_price() -> Decimal {
  dec!(200000)
}

fn default_fallback_price() -> Decimal {
  dec!(65432.10)
}

fn default_price_precision() -> u32 {
  2
}

fn default_volatility_threshold() -> Decimal {
  dec!(5)
}

fn default_divergence_threshold() -> Decimal {
  dec!(2)
}

fn default_api_addr() -> String {
  "0.0.0.0:8000".to_string()
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_snapshot_interval() -> u64 {
  60
}
