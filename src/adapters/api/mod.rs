//! HTTP API Adapter - Bets and Round Queries
//!
//! Small axum 0.7 API in front of the round scheduler:
//! - `POST /bets`: place a wager in the active round
//! - `GET /round`: active round view plus the last settled round
//! - `GET /balances/:id`: participant balance
//! - `GET /stats/:id`: participant statistics

pub mod routes;

pub use routes::{router, ApiServer, ApiState};
