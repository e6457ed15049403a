//! Metrics and Monitoring Adapters
//!
//! Prometheus metrics export on :9090 and health check endpoints
//! (/live, /ready) via axum 0.7. Both are fed from the scheduler's
//! round event stream.

pub mod health;
pub mod prometheus;

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::usecases::round_scheduler::RoundEvent;

pub use health::{HealthServer, HealthState};
pub use prometheus::MetricsRegistry;

/// Feed round events into metrics and health until shutdown.
pub async fn observe_events(
    mut events: broadcast::Receiver<RoundEvent>,
    metrics: Option<Arc<MetricsRegistry>>,
    health: Arc<HealthState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping event observer");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    debug!(?event, "Round event");
                    health.observe(&event);
                    if let Some(metrics) = &metrics {
                        metrics.record(&event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event observer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
