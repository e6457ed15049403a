//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the domain/usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `PriceProvider`: One upstream price source
//! - `BalanceBook`: Participant balances (debit at bet, credit at payout)
//! - `RoundRepository`: Settled round history and balance snapshots

pub mod balance;
pub mod price_provider;
pub mod repository;
