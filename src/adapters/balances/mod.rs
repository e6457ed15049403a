//! Balance Adapters - Participant Funds Storage
//!
//! In-memory implementation of the `BalanceBook` port; durability comes
//! from periodic snapshots through the `RoundRepository`.

pub mod memory;

pub use memory::InMemoryBalanceBook;
