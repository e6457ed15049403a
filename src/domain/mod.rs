//! Domain layer - Core round, wager and settlement logic.
//!
//! Pure types and algorithms with no I/O (hexagonal architecture inner
//! ring). Everything here is deterministic and testable in isolation.

pub mod errors;
pub mod quote;
pub mod round;
pub mod settlement;
pub mod stats;
pub mod wager;

// Re-export core types for convenience
pub use errors::{BetRejection, FeedError, SettlementError};
pub use quote::{PriceBounds, PriceQuote, QuoteOrigin, ResolvedQuote, SampleWindow, SourceTier};
pub use round::{Phase, Round, RoundClock, outcome_of};
pub use settlement::{NetResult, SettlementEngine, SettlementResult, WagerOutcome};
pub use stats::{ParticipantStats, StatsBook};
pub use wager::{Direction, ParticipantId, Wager};
