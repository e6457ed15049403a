//! Price quotes and the rolling sample window.
//!
//! A `PriceQuote` is one accepted observation of the tracked asset.
//! The `SampleWindow` keeps the most recent accepted values so the
//! aggregator can decide when a secondary cross-check is worth paying for.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Maximum number of samples retained by the window.
pub const SAMPLE_CAPACITY: usize = 100;

/// Number of most recent samples the volatility check looks at.
pub const VOLATILITY_WINDOW: usize = 10;

/// Which provider set produced a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    Primary,
    Secondary,
}

impl std::fmt::Display for SourceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

/// A single accepted price observation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub value: Decimal,
    pub obtained_at: DateTime<Utc>,
    pub source_tier: SourceTier,
}

impl PriceQuote {
    pub const fn new(value: Decimal, obtained_at: DateTime<Utc>, source_tier: SourceTier) -> Self {
        Self {
            value,
            obtained_at,
            source_tier,
        }
    }
}

/// How fresh a resolved quote is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteOrigin {
    /// Fetched from a provider during this resolution.
    Live,
    /// Every primary provider failed; last accepted quote reused as-is.
    LastKnown,
    /// Nothing was ever accepted; configured constant used.
    Fallback,
}

impl QuoteOrigin {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::LastKnown => "last_known",
            Self::Fallback => "fallback",
        }
    }

    pub const fn is_live(self) -> bool {
        matches!(self, Self::Live)
    }
}

/// A quote together with its provenance. This is what the scheduler consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedQuote {
    pub quote: PriceQuote,
    pub origin: QuoteOrigin,
}

/// Sanity range and precision applied to every provider value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBounds {
    pub min: Decimal,
    pub max: Decimal,
    pub precision: u32,
}

impl Default for PriceBounds {
    fn default() -> Self {
        Self {
            min: dec!(1000),
            max: dec!(200000),
            precision: 2,
        }
    }
}

impl PriceBounds {
    /// Validate a raw provider value and round it to the configured precision.
    ///
    /// Bounds are exclusive on both ends. Returns `None` for anything that
    /// must be treated as a provider failure.
    pub fn accept(&self, raw: Decimal) -> Option<Decimal> {
        if raw > self.min && raw < self.max {
            Some(raw.round_dp(self.precision))
        } else {
            None
        }
    }
}

/// Parse a provider value that may arrive as a JSON string or number.
pub fn parse_price(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                n.as_f64().and_then(Decimal::from_f64)
            }
        }
        _ => None,
    }
}

/// Rolling history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSample {
    pub value: Decimal,
    pub obtained_at: DateTime<Utc>,
}

/// Bounded ring buffer of the most recent accepted samples.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<PriceSample>,
    capacity: usize,
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::with_capacity(SAMPLE_CAPACITY)
    }
}

impl SampleWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest on overflow.
    pub fn push(&mut self, sample: PriceSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&PriceSample> {
        self.samples.back()
    }

    /// Percentage spread `(max - min) / min * 100` over the most recent
    /// `VOLATILITY_WINDOW` samples.
    ///
    /// Only defined once the window holds strictly more than
    /// `VOLATILITY_WINDOW` samples.
    pub fn recent_volatility_pct(&self) -> Option<Decimal> {
        if self.samples.len() <= VOLATILITY_WINDOW {
            return None;
        }

        let recent = self.samples.iter().rev().take(VOLATILITY_WINDOW);
        let (min, max) = recent.fold((Decimal::MAX, Decimal::MIN), |(lo, hi), s| {
            (lo.min(s.value), hi.max(s.value))
        });

        if min <= Decimal::ZERO {
            return None;
        }

        Some((max - min) / min * dec!(100))
    }
}

/// Upper-middle element of the sorted values: `sorted[floor(n / 2)]`.
///
/// For an even count this is NOT the interpolated median.
pub fn median_floor(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort();
    Some(sorted[sorted.len() / 2])
}

/// Relative difference `|a - b| / b * 100`.
pub fn relative_diff_pct(a: Decimal, b: Decimal) -> Decimal {
    if b.is_zero() {
        return Decimal::ZERO;
    }
    ((a - b) / b).abs() * dec!(100)
}
