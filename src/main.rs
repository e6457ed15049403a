//! Up/Down Rounds - Entry Point
//!
//! Initializes configuration, logging, price providers and the round
//! scheduler. Runs until SIGINT or a fatal scheduler error.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Open the file repository, restore the last balance snapshot and load the round log
//! 4. Build HTTP price providers and the PriceAggregator
//! 5. Create the RoundScheduler (ledger + settlement engine inside) and replay history
//! 6. Spawn event observer (metrics + readiness), metrics, health and API servers
//! 7. Spawn the scheduler loop and the periodic balance snapshot task
//! 8. Wait for SIGINT → graceful shutdown (stop→snapshot→exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use updown_rounds::adapters::api::{ApiServer, ApiState};
use updown_rounds::adapters::balances::InMemoryBalanceBook;
use updown_rounds::adapters::feeds::providers_from_config;
use updown_rounds::adapters::metrics::{observe_events, HealthServer, HealthState, MetricsRegistry};
use updown_rounds::adapters::persistence::FileRepository;
use updown_rounds::config;
use updown_rounds::domain::settlement::SettlementEngine;
use updown_rounds::ports::repository::{BalanceSnapshot, RoundRepository};
use updown_rounds::usecases::{
    AggregatorSettings, BetLimits, PriceAggregator, RoundScheduler, SchedulerSettings,
};

type Scheduler = RoundScheduler<InMemoryBalanceBook, FileRepository>;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&config_path).context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.service.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        round_secs = config.round.duration_secs,
        min_bet = config.betting.min_bet,
        max_bet = config.betting.max_bet,
        "Starting up/down round service"
    );

    // ── 3. Shutdown signal channel ──────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 4. Persistence + balances ───────────────────────────
    let repository = Arc::new(
        FileRepository::from_data_dir(&config.persistence.data_dir)
            .await
            .context("Failed to open data directory")?,
    );
    let balances = Arc::new(InMemoryBalanceBook::new(config.betting.initial_balance));
    let last_round = match repository.load_balances().await {
        Ok(Some(snapshot)) => {
            balances.restore(snapshot.balances).await;
            snapshot.last_round
        }
        Ok(None) => 0,
        Err(e) => {
            warn!(error = %e, "Balance snapshot unreadable, starting with empty balances");
            0
        }
    };
    let history = repository.load_rounds().await.unwrap_or_else(|e| {
        warn!(error = %e, "Round log unreadable, starting without history");
        Vec::new()
    });

    // ── 5. Price feed ───────────────────────────────────────
    let providers = providers_from_config(&config.feeds)?;
    let aggregator = Arc::new(PriceAggregator::new(
        providers.primary,
        providers.secondary,
        AggregatorSettings::from_config(&config.feeds),
    ));

    // ── 6. Round scheduler ──────────────────────────────────
    let engine = SettlementEngine::new(config.betting.commission_rate)
        .context("Invalid commission rate")?;
    let scheduler: Arc<Scheduler> = Arc::new(RoundScheduler::new(
        aggregator,
        Arc::clone(&balances),
        Arc::clone(&repository),
        engine,
        BetLimits::from_config(&config.betting),
        SchedulerSettings::from_config(&config),
    ));
    scheduler.restore(&history, last_round).await;

    // ── 7. Observability ────────────────────────────────────
    let health = Arc::new(HealthState::new());
    health.check_storage(repository.as_ref()).await;
    let metrics = if config.metrics.enabled {
        Some(Arc::new(MetricsRegistry::new().context("Failed to register metrics")?))
    } else {
        None
    };

    let observer_handle = tokio::spawn(observe_events(
        scheduler.subscribe(),
        metrics.clone(),
        Arc::clone(&health),
        shutdown_tx.subscribe(),
    ));

    if let Some(metrics) = metrics {
        let bind = config.metrics.bind_address.clone();
        let rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = metrics.serve(bind, rx).await {
                error!(error = %e, "Metrics server failed");
            }
        });
    }

    let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
    let health_rx = shutdown_tx.subscribe();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run(health_rx).await {
            error!(error = %e, "Health server failed");
        }
    });

    // ── 8. Bets/round API ───────────────────────────────────
    let api_handle = if config.api.enabled {
        let server = ApiServer::new(
            ApiState {
                scheduler: Arc::clone(&scheduler),
                balances: Arc::clone(&balances),
            },
            config.api.bind_address.clone(),
        );
        let rx = shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(rx).await {
                error!(error = %e, "API server failed");
            }
        }))
    } else {
        None
    };

    // ── 9. Scheduler loop + balance snapshots ───────────────
    let scheduler_rx = shutdown_tx.subscribe();
    let scheduler_ref = Arc::clone(&scheduler);
    let scheduler_health = Arc::clone(&health);
    let mut scheduler_handle = tokio::spawn(async move {
        scheduler_health.scheduler_running.store(true, Ordering::Relaxed);
        let result = scheduler_ref.run(scheduler_rx).await;
        scheduler_health.scheduler_running.store(false, Ordering::Relaxed);
        result
    });

    let snapshot_handle = tokio::spawn(run_snapshots(
        Arc::clone(&scheduler),
        Arc::clone(&balances),
        Arc::clone(&repository),
        Arc::clone(&health),
        Duration::from_secs(config.persistence.snapshot_interval_secs),
        shutdown_tx.subscribe(),
    ));

    info!("All tasks spawned - service is running");

    // ── 10. Wait for SIGINT or a fatal scheduler error ──────
    let mut scheduler_done = false;
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("SIGINT received, initiating graceful shutdown");
        }
        result = &mut scheduler_handle => {
            scheduler_done = true;
            match result {
                Ok(Ok(())) => warn!("Round scheduler exited unexpectedly"),
                Ok(Err(e)) => error!(error = %e, "Round scheduler failed"),
                Err(e) => error!(error = %e, "Round scheduler task panicked"),
            }
        }
    }

    // ── Graceful shutdown ───────────────────────────────────

    // 1. Signal all tasks to stop
    let _ = shutdown_tx.send(());
    health.scheduler_running.store(false, Ordering::Relaxed);
    info!("Shutdown signal broadcast to all tasks");

    // 2. Let the scheduler finish its current tick and refund an unsettled round (up to 30s)
    if scheduler_done {
        scheduler.refund_unsettled().await;
    } else {
        let _ = tokio::time::timeout(Duration::from_secs(30), scheduler_handle).await;
    }

    // 3. Final balance snapshot
    let _ = tokio::time::timeout(Duration::from_secs(5), snapshot_handle).await;
    if let Err(e) = save_snapshot(&scheduler, &balances, &repository).await {
        error!(error = %e, "Final balance snapshot failed");
    }

    // 4. Wait for servers to drain (up to 5s each)
    if let Some(handle) = api_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), observer_handle).await;
    health_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

/// Persist balances and refresh storage health every `interval` until shutdown.
async fn run_snapshots(
    scheduler: Arc<Scheduler>,
    balances: Arc<InMemoryBalanceBook>,
    repository: Arc<FileRepository>,
    health: Arc<HealthState>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                health.check_storage(repository.as_ref()).await;
                if let Err(e) = save_snapshot(&scheduler, &balances, &repository).await {
                    warn!(error = %e, "Periodic balance snapshot failed");
                }
            }
        }
    }
}

async fn save_snapshot(
    scheduler: &Scheduler,
    balances: &InMemoryBalanceBook,
    repository: &FileRepository,
) -> Result<()> {
    let snapshot = BalanceSnapshot {
        timestamp_ms: Utc::now().timestamp_millis(),
        last_round: scheduler.current_round_number(),
        balances: balances.snapshot().await,
    };
    repository
        .save_balances(&snapshot)
        .await
        .context("Failed to save balance snapshot")
}
