//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, HTTP servers, file I/O). Each
//! sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `api`: bets/round HTTP API (axum)
//! - `balances`: in-memory participant balance book
//! - `feeds`: HTTP JSON price providers (reqwest + governor)
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: JSONL round log and atomic balance snapshots

pub mod api;
pub mod balances;
pub mod feeds;
pub mod metrics;
pub mod persistence;
