//! Prometheus Metrics Registry - Round Observability
//!
//! Registers and exposes Prometheus metrics on :9090. Covers round
//! throughput, outcomes, bet admissions and rejections, pool sizes,
//! commission retained and the provenance of every resolved quote.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use prometheus::{
    Counter, Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::usecases::round_scheduler::RoundEvent;

/// Centralized Prometheus metrics for the round service.
///
/// All metrics follow the naming convention `updown_*`.
pub struct MetricsRegistry {
    registry: Registry,
    /// Rounds opened.
    pub rounds_opened: IntCounter,
    /// Rounds settled by outcome.
    pub rounds_settled: IntCounterVec,
    /// Wagers admitted by direction.
    pub bets_accepted: IntCounterVec,
    /// Wagers refused by reason.
    pub bets_rejected: IntCounterVec,
    /// Resolved quotes by origin (live, last_known, fallback).
    pub quotes_resolved: IntCounterVec,
    /// Last resolved price.
    pub last_price: Gauge,
    /// Active round number.
    pub round_number: IntGauge,
    /// Seconds until the active round's end deadline.
    pub seconds_remaining: IntGauge,
    /// Settled pool size distribution.
    pub pool_size: HistogramVec,
    /// Cumulative commission retained.
    pub commission_retained: Counter,
    /// Cumulative amount paid out to winners.
    pub payouts_total: IntCounter,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let rounds_opened = IntCounter::new("updown_rounds_opened_total", "Total rounds opened")?;

        let rounds_settled = IntCounterVec::new(
            Opts::new("updown_rounds_settled_total", "Total rounds settled"),
            &["outcome"],
        )?;

        let bets_accepted = IntCounterVec::new(
            Opts::new("updown_bets_accepted_total", "Total wagers accepted"),
            &["direction"],
        )?;

        let bets_rejected = IntCounterVec::new(
            Opts::new("updown_bets_rejected_total", "Total wagers rejected"),
            &["reason"],
        )?;

        let quotes_resolved = IntCounterVec::new(
            Opts::new(
                "updown_quotes_resolved_total",
                "Resolved quotes by origin (live, last_known, fallback)",
            ),
            &["origin"],
        )?;

        let last_price = Gauge::new("updown_last_price", "Last resolved price")?;

        let round_number = IntGauge::new("updown_round_number", "Active round number")?;

        let seconds_remaining = IntGauge::new(
            "updown_round_seconds_remaining",
            "Seconds until the active round ends",
        )?;

        let pool_size = HistogramVec::new(
            HistogramOpts::new("updown_pool_size", "Total pool of settled rounds")
                .buckets(vec![0.0, 10.0, 100.0, 1_000.0, 10_000.0, 100_000.0]),
            &["outcome"],
        )?;

        let commission_retained = Counter::new(
            "updown_commission_retained_total",
            "Cumulative commission retained from settled pools",
        )?;

        let payouts_total = IntCounter::new(
            "updown_payouts_total",
            "Cumulative amount credited to winners",
        )?;

        registry.register(Box::new(rounds_opened.clone()))?;
        registry.register(Box::new(rounds_settled.clone()))?;
        registry.register(Box::new(bets_accepted.clone()))?;
        registry.register(Box::new(bets_rejected.clone()))?;
        registry.register(Box::new(quotes_resolved.clone()))?;
        registry.register(Box::new(last_price.clone()))?;
        registry.register(Box::new(round_number.clone()))?;
        registry.register(Box::new(seconds_remaining.clone()))?;
        registry.register(Box::new(pool_size.clone()))?;
        registry.register(Box::new(commission_retained.clone()))?;
        registry.register(Box::new(payouts_total.clone()))?;

        Ok(Self {
            registry,
            rounds_opened,
            rounds_settled,
            bets_accepted,
            bets_rejected,
            quotes_resolved,
            last_price,
            round_number,
            seconds_remaining,
            pool_size,
            commission_retained,
            payouts_total,
        })
    }

    /// Update metrics from one round event.
    pub fn record(&self, event: &RoundEvent) {
        match event {
            RoundEvent::Opened {
                round_number,
                start_price,
                origin,
                ..
            } => {
                self.rounds_opened.inc();
                self.round_number
                    .set(i64::try_from(*round_number).unwrap_or(i64::MAX));
                self.quotes_resolved.with_label_values(&[origin.as_str()]).inc();
                self.last_price.set(start_price.to_f64().unwrap_or_default());
            }
            RoundEvent::Locked { .. } => {}
            RoundEvent::Settled {
                outcome,
                end_price,
                end_origin,
                total_pool,
                commission,
                total_paid,
                ..
            } => {
                let outcome = outcome.to_string();
                self.rounds_settled.with_label_values(&[&outcome]).inc();
                self.pool_size
                    .with_label_values(&[&outcome])
                    .observe(*total_pool as f64);
                self.commission_retained
                    .inc_by(commission.to_f64().unwrap_or_default());
                self.payouts_total.inc_by(*total_paid);
                self.quotes_resolved.with_label_values(&[end_origin.as_str()]).inc();
                self.last_price.set(end_price.to_f64().unwrap_or_default());
            }
            RoundEvent::Tick {
                seconds_remaining, ..
            } => {
                self.seconds_remaining.set(*seconds_remaining);
            }
            RoundEvent::PriceUpdated { price, origin } => {
                self.quotes_resolved.with_label_values(&[origin.as_str()]).inc();
                self.last_price.set(price.to_f64().unwrap_or_default());
            }
            RoundEvent::BetAccepted { direction, .. } => {
                self.bets_accepted
                    .with_label_values(&[&direction.to_string()])
                    .inc();
            }
            RoundEvent::BetRejected { reason, .. } => {
                self.bets_rejected.with_label_values(&[reason.label()]).inc();
            }
        }
    }

    /// Render every registered metric in the text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics = Arc::clone(&self);
        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics);
                async move { metrics.render() }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}
