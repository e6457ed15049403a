//! Domain error types.
//!
//! Feed errors are recovered inside the aggregator, bet rejections are
//! returned to whoever called `place()`, and settlement errors are
//! programming errors that stop the scheduler.

use serde::Serialize;

/// Failure of the price feed layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("Provider unavailable ({provider}): {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("All price providers failed")]
    AllProvidersFailed,
}

/// Reason a wager was not admitted.
///
/// Variants are declared in the order the ledger checks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum BetRejection {
    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("Round is not accepting bets")]
    RoundNotAcceptingBets,

    #[error("Participant already has a wager this round")]
    DuplicateWager,

    #[error("Bet amount {amount} outside [{min}, {max}]")]
    InvalidAmount { amount: u64, min: u64, max: u64 },
}

impl BetRejection {
    /// Stable label used for metrics and API responses.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::RoundNotAcceptingBets => "round_not_accepting_bets",
            Self::DuplicateWager => "duplicate_wager",
            Self::InvalidAmount { .. } => "invalid_amount",
        }
    }
}

/// Settlement can only fail on input that the ledger never produces.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    #[error("Malformed settlement input: {0}")]
    MalformedSettlementInput(String),
}
