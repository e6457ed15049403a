//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement the
//! service's core workflows.
//!
//! Use cases:
//! - `PriceAggregator`: primary/secondary quote resolution with fallbacks
//! - `BetLedger`: wager admission for the active round
//! - `RoundScheduler`: round lifecycle, settlement and event fan-out

pub mod bet_ledger;
pub mod price_aggregator;
pub mod round_scheduler;

pub use bet_ledger::{BetLedger, BetLimits, PlaceBetError, PoolSummary};
pub use price_aggregator::{AggregatorSettings, PriceAggregator};
pub use round_scheduler::{RoundEvent, RoundScheduler, RoundView, SchedulerSettings};
