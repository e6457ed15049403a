//! Persistence Adapters - JSONL-based File Storage
//!
//! Implements the `RoundRepository` port using append-only JSONL files
//! for settled rounds and atomic JSON snapshots for balances.
//! No database dependency.

pub mod repository_impl;
pub mod rounds;
pub mod state;

pub use repository_impl::FileRepository;
pub use rounds::RoundLog;
pub use state::BalanceStore;
