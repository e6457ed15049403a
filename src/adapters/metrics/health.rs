//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7. Readiness requires
//! the round scheduler to be running, the most recent quote to have
//! come from a live provider rather than a stale or fallback value, and
//! the repository to be writable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::ports::repository::RoundRepository;
use crate::usecases::round_scheduler::RoundEvent;

/// Shared health state polled by readiness probes.
#[derive(Debug)]
pub struct HealthState {
    /// Whether the last resolved quote was live.
    pub feed_live: AtomicBool,
    /// Whether the scheduler loop is running.
    pub scheduler_running: AtomicBool,
    /// Result of the last repository health check.
    pub storage_healthy: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Not ready until the first live quote arrives.
    pub const fn new() -> Self {
        Self {
            feed_live: AtomicBool::new(false),
            scheduler_running: AtomicBool::new(false),
            storage_healthy: AtomicBool::new(true),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.feed_live.load(Ordering::Relaxed)
            && self.scheduler_running.load(Ordering::Relaxed)
            && self.storage_healthy.load(Ordering::Relaxed)
    }

    /// Poll the repository and record whether it is writable.
    pub async fn check_storage<R: RoundRepository + ?Sized>(&self, repository: &R) -> bool {
        let healthy = repository.is_healthy().await;
        if self.storage_healthy.swap(healthy, Ordering::Relaxed) && !healthy {
            warn!("Repository unhealthy");
        }
        healthy
    }

    /// Track quote provenance from round events.
    pub fn observe(&self, event: &RoundEvent) {
        let origin = match event {
            RoundEvent::Opened { origin, .. } | RoundEvent::PriceUpdated { origin, .. } => *origin,
            RoundEvent::Settled { end_origin, .. } => *end_origin,
            _ => return,
        };
        let live = origin.is_live();
        if self.feed_live.swap(live, Ordering::Relaxed) && !live {
            warn!(origin = origin.as_str(), "Price feed degraded");
        }
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    state: Arc<HealthState>,
    /// Bind port (default 8080 from config).
    port: u16,
}

impl HealthServer {
    pub const fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(Arc::clone(&self.state))
    }

    /// Serve probes until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = self.router();
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}
