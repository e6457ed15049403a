//! Round Scheduler - OPEN → LOCKED → SETTLED Lifecycle
//!
//! Owns the single active round and drives it through its phases:
//! 1. OPEN: start quote taken, ledger accepts wagers
//! 2. LOCKED: ledger closed at `lock_deadline`
//! 3. SETTLED: end quote taken at `end_deadline`, pool settled,
//!    payouts credited, stats updated, round record persisted
//! 4. After the display delay the next round opens
//!
//! The phase is always re-derived from the round clock on every tick,
//! so a late tick catches up through several transitions at once.
//!
//! On restart, `restore()` replays the persisted round log into the stats
//! book and continues numbering after the last known round. On shutdown
//! the stakes of a round that never settled are refunded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::time::{interval, interval_at, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use crate::config::AppConfig;
use crate::domain::errors::BetRejection;
use crate::domain::quote::{QuoteOrigin, ResolvedQuote};
use crate::domain::round::{outcome_of, Phase, Round, RoundClock};
use crate::domain::settlement::{SettlementEngine, SettlementResult};
use crate::domain::stats::{ParticipantStats, StatsBook};
use crate::domain::wager::{Direction, ParticipantId, Wager};
use crate::ports::balance::BalanceBook;
use crate::ports::repository::{RoundRecord, RoundRepository};
use crate::usecases::bet_ledger::{BetLedger, BetLimits, PlaceBetError};
use crate::usecases::price_aggregator::PriceAggregator;

/// Capacity of the presentation event channel.
const EVENT_CAPACITY: usize = 256;

/// Notifications for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoundEvent {
  Opened {
    round_number: u64,
    start_price: Decimal,
    origin: QuoteOrigin,
    lock_deadline: DateTime<Utc>,
    end_deadline: DateTime<Utc>,
  },
  Locked {
    round_number: u64,
  },
  Settled {
    round_number: u64,
    outcome: Direction,
    start_price: Decimal,
    end_price: Decimal,
    end_origin: QuoteOrigin,
    total_pool: u64,
    commission: Decimal,
    total_paid: u64,
    winners: usize,
  },
  Tick {
    round_number: u64,
    phase: Phase,
    seconds_remaining: i64,
  },
  PriceUpdated {
    price: Decimal,
    origin: QuoteOrigin,
  },
  BetAccepted {
    round_number: u64,
    participant_id: ParticipantId,
    direction: Direction,
    amount: u64,
  },
  BetRejected {
    participant_id: ParticipantId,
    reason: BetRejection,
  },
}

/// Read-only view of the active round for the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundView {
  pub round_number: u64,
  pub phase: Phase,
  pub start_price: Decimal,
  pub start_origin: QuoteOrigin,
  pub end_price: Option<Decimal>,
  pub opened_at: DateTime<Utc>,
  pub lock_deadline: DateTime<Utc>,
  pub end_deadline: DateTime<Utc>,
  pub seconds_remaining: i64,
  pub up_pool: u64,
  pub down_pool: u64,
  pub wager_count: usize,
  /// Whether a wager placed now passes the phase check.
  pub accepting_bets: bool,
  pub min_bet: u64,
  pub max_bet: u64,
  pub commission_rate: Decimal,
  /// Outcome of the active round once settled.
  pub outcome: Option<Direction>,
}

/// Round timing for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
  /// OPEN + LOCKED duration.
  pub round_duration: Duration,
  /// Locked suffix of the round.
  pub lock_window: Duration,
  /// Pause between settlement and the next round.
  pub display_delay: Duration,
  /// Reconciliation tick period.
  pub tick_interval: std::time::Duration,
  /// Background price refresh period.
  pub price_update_interval: std::time::Duration,
}

impl Default for SchedulerSettings {
  fn default() -> Self {
    Self {
      round_duration: Duration::seconds(300),
      lock_window: Duration::seconds(10),
      display_delay: Duration::seconds(5),
      tick_interval: std::time::Duration::from_secs(1),
      price_update_interval: std::time::Duration::from_secs(15),
    }
  }
}

impl SchedulerSettings {
  /// Build settings from the `[round]` and `[feeds]` config sections.
  pub fn from_config(config: &AppConfig) -> Self {
    Self {
      round_duration: secs(config.round.duration_secs),
      lock_window: secs(config.round.lock_window_secs),
      display_delay: secs(config.round.settlement_display_secs),
      tick_interval: std::time::Duration::from_millis(config.round.tick_interval_ms),
      price_update_interval: std::time::Duration::from_secs(config.feeds.price_update_interval_secs),
    }
  }
}

fn secs(value: u64) -> Duration {
  Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX))
}

/// The active round plus scheduler bookkeeping.
#[derive(Debug, Clone)]
struct RoundContext {
  round: Round,
  start_origin: QuoteOrigin,
  /// Outcome once SETTLED.
  settlement: Option<SettlementResult>,
  settled_at: Option<DateTime<Utc>>,
}

/// Drives rounds and wires the aggregator, ledger and settlement together.
pub struct RoundScheduler<B: BalanceBook, R: RoundRepository> {
  aggregator: Arc<PriceAggregator>,
  ledger: BetLedger<B>,
  balances: Arc<B>,
  repository: Arc<R>,
  engine: SettlementEngine,
  settings: SchedulerSettings,
  context: Mutex<Option<RoundContext>>,
  /// Number given to the round opened by `start()`.
  next_round: AtomicU64,
  stats: RwLock<StatsBook>,
  last_record: RwLock<Option<RoundRecord>>,
  events: broadcast::Sender<RoundEvent>,
  view: watch::Sender<Option<RoundView>>,
}

impl<B: BalanceBook, R: RoundRepository> RoundScheduler<B, R> {
  /// Create a scheduler. No round exists until `start()`.
  pub fn new(
    aggregator: Arc<PriceAggregator>,
    balances: Arc<B>,
    repository: Arc<R>,
    engine: SettlementEngine,
    limits: BetLimits,
    settings: SchedulerSettings,
  ) -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let (view, _) = watch::channel(None);
    Self {
      aggregator,
      ledger: BetLedger::new(balances.clone(), limits),
      balances,
      repository,
      engine,
      settings,
      context: Mutex::new(None),
      next_round: AtomicU64::new(1),
      stats: RwLock::new(StatsBook::new()),
      last_record: RwLock::new(None),
      events,
      view,
    }
  }

  /// Subscribe to round events.
  pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
    self.events.subscribe()
  }

  /// Latest view of the active round (`None` before `start()`).
  pub fn round_view(&self) -> Option<RoundView> {
    self.view.borrow().clone()
  }

  /// Number of the active round (0 before `start()`).
  pub fn current_round_number(&self) -> u64 {
    self.view.borrow().as_ref().map_or(0, |v| v.round_number)
  }

  /// Record of the most recently settled round.
  pub async fn last_settled(&self) -> Option<RoundRecord> {
    self.last_record.read().await.clone()
  }

  /// Accumulated stats of a participant.
  pub async fn stats(&self, participant_id: &str) -> Option<ParticipantStats> {
    self.stats.read().await.get(participant_id).cloned()
  }

  /// Rebuild stats and round numbering from persisted history.
  ///
  /// `records` must be in settlement order. `last_round` is the round
  /// recorded in the latest balance snapshot, which may not have settled.
  /// Call before `start()`.
  #[instrument(skip(self, records), fields(records = records.len()))]
  pub async fn restore(&self, records: &[RoundRecord], last_round: u64) {
    {
      let mut stats = self.stats.write().await;
      for record in records {
        stats.apply(&record.settlement);
      }
    }

    let highest = records
      .iter()
      .map(|r| r.round_number)
      .max()
      .unwrap_or(0)
      .max(last_round);
    self.next_round.store(highest.saturating_add(1), Ordering::Relaxed);
    *self.last_record.write().await = records.last().cloned();

    info!(
      participants = self.stats.read().await.len(),
      next_round = highest.saturating_add(1),
      "Round history restored"
    );
  }

  /// Open the first round. Does nothing if a round already exists.
  #[instrument(skip(self))]
  pub async fn start(&self, now: DateTime<Utc>) {
    let mut guard = self.context.lock().await;
    if guard.is_some() {
      return;
    }
    let ctx = self.open_round(self.next_round.load(Ordering::Relaxed), now).await;
    *guard = Some(ctx);
  }

  /// Reconcile the active round with the clock as of `now`.
  ///
  /// # Errors
  /// Fails only when settlement input is malformed or the ledger is
  /// finalized twice; both stop the scheduler.
  pub async fn tick(&self, now: DateTime<Utc>) -> Result<()> {
    let mut guard = self.context.lock().await;
    let Some(ctx) = guard.as_mut() else {
      return Ok(());
    };

    loop {
      match ctx.round.phase {
        Phase::Open => {
          if ctx.round.clock.phase_at(now) == Phase::Open {
            break;
          }
          self.lock_round(ctx).await;
        }
        Phase::Locked => {
          if ctx.round.clock.phase_at(now) != Phase::Settled {
            break;
          }
          self.settle_round(ctx, now).await?;
        }
        Phase::Settled => {
          let settled_at = ctx.settled_at.unwrap_or(ctx.round.clock.end_deadline);
          if now < settled_at + self.settings.display_delay {
            break;
          }
          let next = ctx.round.round_number + 1;
          *ctx = self.open_round(next, now).await;
        }
      }
    }

    let seconds_remaining = if ctx.round.phase == Phase::Settled {
      0
    } else {
      ctx.round.clock.seconds_remaining(now)
    };
    self.emit(RoundEvent::Tick {
      round_number: ctx.round.round_number,
      phase: ctx.round.phase,
      seconds_remaining,
    });
    self.publish_view(ctx, now).await;
    Ok(())
  }

  /// Place a wager in the active round at the current time.
  pub async fn place_bet(
    &self,
    participant_id: &str,
    direction: Direction,
    amount: u64,
  ) -> Result<Wager, PlaceBetError> {
    self.place_bet_at(participant_id, direction, amount, Utc::now()).await
  }

  /// Place a wager as of `now`, emitting the accept/reject event.
  pub async fn place_bet_at(
    &self,
    participant_id: &str,
    direction: Direction,
    amount: u64,
    now: DateTime<Utc>,
  ) -> Result<Wager, PlaceBetError> {
    let result = self.ledger.place_at(participant_id, direction, amount, now).await;
    match &result {
      Ok(wager) => {
        let round_number = self.ledger.pool_summary().await.round_number;
        self.emit(RoundEvent::BetAccepted {
          round_number,
          participant_id: wager.participant_id.clone(),
          direction,
          amount,
        });
        self.refresh_pool_view().await;
      }
      Err(PlaceBetError::Rejected(reason)) => {
        info!(participant = participant_id, reason = reason.label(), "Wager rejected");
        self.emit(RoundEvent::BetRejected {
          participant_id: participant_id.to_string(),
          reason: *reason,
        });
      }
      Err(PlaceBetError::Balance(e)) => {
        error!(participant = participant_id, error = %e, "Balance book failed during placement");
      }
    }
    result
  }

  /// Resolve a fresh quote for display.
  #[instrument(skip(self))]
  pub async fn refresh_price(&self) -> ResolvedQuote {
    let resolved = self.aggregator.resolve_quote().await;
    self.emit(RoundEvent::PriceUpdated {
      price: resolved.quote.value,
      origin: resolved.origin,
    });
    resolved
  }

  /// Drive rounds until shutdown.
  ///
  /// # Errors
  /// Returns the first fatal tick error.
  #[instrument(skip(self, shutdown_rx), name = "round_loop")]
  pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    self.start(Utc::now()).await;

    let mut ticker = interval(self.settings.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let period = self.settings.price_update_interval;
    let mut price_ticker = interval_at(tokio::time::Instant::now() + period, period);
    price_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
      round_secs = self.settings.round_duration.num_seconds(),
      lock_window_secs = self.settings.lock_window.num_seconds(),
      commission_rate = %self.engine.commission_rate(),
      "Round scheduler running"
    );

    loop {
      tokio::select! {
        biased;

        _ = shutdown_rx.recv() => {
          info!("Shutdown signal received, stopping round scheduler");
          break;
        }
        _ = ticker.tick() => {
          self.tick(Utc::now()).await.context("Round scheduler stopped")?;
        }
        _ = price_ticker.tick() => {
          self.refresh_price().await;
        }
      }
    }

    self.refund_unsettled().await;
    Ok(())
  }

  /// Return the stakes of an active round that has not settled.
  ///
  /// Ends the active round; returns the total amount refunded.
  #[instrument(skip(self))]
  pub async fn refund_unsettled(&self) -> u64 {
    let mut guard = self.context.lock().await;
    let Some(ctx) = guard.take() else {
      return 0;
    };
    if ctx.round.phase == Phase::Settled {
      return 0;
    }

    let wagers = match self.ledger.finalize().await {
      Ok(wagers) => wagers,
      Err(e) => {
        warn!(error = %e, "Unsettled round has no wagers to refund");
        return 0;
      }
    };

    let mut refunded = 0u64;
    for wager in &wagers {
      match self.balances.credit(&wager.participant_id, wager.amount).await {
        Ok(_) => refunded = refunded.saturating_add(wager.amount),
        Err(e) => error!(
          participant = %wager.participant_id,
          amount = wager.amount,
          error = %e,
          "Failed to refund stake"
        ),
      }
    }

    info!(
      round = ctx.round.round_number,
      wagers = wagers.len(),
      refunded,
      "Unsettled round refunded"
    );
    refunded
  }

  async fn lock_round(&self, ctx: &mut RoundContext) {
    self.ledger.close().await;
    ctx.round.phase = Phase::Locked;
    info!(round = ctx.round.round_number, "Round locked");
    self.emit(RoundEvent::Locked {
      round_number: ctx.round.round_number,
    });
  }

  #[instrument(skip(self, ctx), fields(round = ctx.round.round_number))]
  async fn settle_round(&self, ctx: &mut RoundContext, now: DateTime<Utc>) -> Result<()> {
    let wagers = self.ledger.finalize().await?;
    let end = self.aggregator.resolve_quote().await;
    let outcome = outcome_of(&ctx.round.start_quote, &end.quote);

    let result = self
      .engine
      .settle(&wagers, outcome)
      .with_context(|| format!("Failed to settle round {}", ctx.round.round_number))?;

    for (participant_id, payout) in result.payouts.iter().filter(|(_, p)| **p > 0) {
      if let Err(e) = self.balances.credit(participant_id, *payout).await {
        error!(
          participant = %participant_id,
          payout,
          error = %e,
          "Failed to credit payout"
        );
      }
    }

    self.stats.write().await.apply(&result);

    ctx.round.end_quote = Some(end.quote.clone());
    ctx.round.phase = Phase::Settled;
    ctx.settled_at = Some(now);
    ctx.settlement = Some(result.clone());

    info!(
      outcome = %outcome,
      start = %ctx.round.start_quote.value,
      end = %end.quote.value,
      end_origin = end.origin.as_str(),
      pool = result.total_pool,
      commission = %result.commission,
      paid = result.total_paid(),
      winners = result.winner_count(),
      "Round settled"
    );

    self.emit(RoundEvent::Settled {
      round_number: ctx.round.round_number,
      outcome,
      start_price: ctx.round.start_quote.value,
      end_price: end.quote.value,
      end_origin: end.origin,
      total_pool: result.total_pool,
      commission: result.commission,
      total_paid: result.total_paid(),
      winners: result.winner_count(),
    });

    let record = RoundRecord {
      round_number: ctx.round.round_number,
      start_quote: ctx.round.start_quote.clone(),
      start_origin: ctx.start_origin,
      end_quote: end.quote,
      end_origin: end.origin,
      settlement: result,
      opened_at: ctx.round.clock.opened_at,
      settled_at: now,
    };
    if let Err(e) = self.repository.save_round(&record).await {
      warn!(error = %e, "Failed to persist round record");
    }
    *self.last_record.write().await = Some(record);

    Ok(())
  }

  /// Resolve the start quote and open a round with the ledger reset.
  async fn open_round(&self, round_number: u64, now: DateTime<Utc>) -> RoundContext {
    let started = Instant::now();
    let start = self.aggregator.resolve_quote().await;
    let elapsed = Duration::from_std(started.elapsed()).unwrap_or_else(|_| Duration::zero());

    let clock = RoundClock::new(now + elapsed, self.settings.round_duration, self.settings.lock_window);
    self.ledger.open(round_number, clock.lock_deadline).await;

    info!(
      round = round_number,
      start = %start.quote.value,
      origin = start.origin.as_str(),
      lock_deadline = %clock.lock_deadline,
      end_deadline = %clock.end_deadline,
      "Round opened"
    );
    self.emit(RoundEvent::Opened {
      round_number,
      start_price: start.quote.value,
      origin: start.origin,
      lock_deadline: clock.lock_deadline,
      end_deadline: clock.end_deadline,
    });

    let ctx = RoundContext {
      round: Round::open(round_number, start.quote, clock),
      start_origin: start.origin,
      settlement: None,
      settled_at: None,
    };
    self.publish_view(&ctx, now).await;
    ctx
  }

  async fn publish_view(&self, ctx: &RoundContext, now: DateTime<Utc>) {
    let pool = self.ledger.pool_summary().await;
    let accepting_bets = self.ledger.is_accepting_at(now).await;
    let limits = self.ledger.limits();
    let (up_pool, down_pool, wager_count) = match &ctx.settlement {
      Some(result) => {
        let up = result
          .wagers
          .iter()
          .filter(|w| w.direction == Direction::Up)
          .map(|w| w.stake)
          .sum();
        (up, result.total_pool - up, result.wagers.len())
      }
      None => (pool.up_total, pool.down_total, pool.wager_count),
    };
    let round = &ctx.round;
    self.view.send_replace(Some(RoundView {
      round_number: round.round_number,
      phase: round.phase,
      start_price: round.start_quote.value,
      start_origin: ctx.start_origin,
      end_price: round.end_quote.as_ref().map(|q| q.value),
      opened_at: round.clock.opened_at,
      lock_deadline: round.clock.lock_deadline,
      end_deadline: round.clock.end_deadline,
      seconds_remaining: if round.phase == Phase::Settled {
        0
      } else {
        round.clock.seconds_remaining(now)
      },
      up_pool,
      down_pool,
      wager_count,
      accepting_bets,
      min_bet: limits.min_bet,
      max_bet: limits.max_bet,
      commission_rate: self.engine.commission_rate(),
      outcome: ctx.settlement.as_ref().map(|s| s.outcome),
    }));
  }

  /// Update pool figures without touching the round context lock.
  async fn refresh_pool_view(&self) {
    let pool = self.ledger.pool_summary().await;
    self.view.send_if_modified(|view| match view {
      Some(v) if v.round_number == pool.round_number && v.phase != Phase::Settled => {
        v.up_pool = pool.up_total;
        v.down_pool = pool.down_total;
        v.wager_count = pool.wager_count;
        true
      }
      _ => false,
    });
  }

  fn emit(&self, event: RoundEvent) {
    // No subscribers is fine
    let _ = self.events.send(event);
  }
}
