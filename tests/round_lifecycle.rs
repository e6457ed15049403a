//! Integration Tests - Round Lifecycle End to End
//!
//! Drives the scheduler through whole rounds against mocked ports.
//! Uses mockall for trait mocking and tokio::test for async tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use mockall::mock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use updown_rounds::adapters::balances::InMemoryBalanceBook;
use updown_rounds::adapters::metrics::HealthState;
use updown_rounds::domain::errors::{BetRejection, FeedError};
use updown_rounds::domain::quote::{PriceQuote, QuoteOrigin, SourceTier};
use updown_rounds::domain::round::Phase;
use updown_rounds::domain::settlement::{settle, SettlementEngine};
use updown_rounds::domain::wager::{Direction, Wager};
use updown_rounds::ports::balance::BalanceBook;
use updown_rounds::ports::price_provider::PriceProvider;
use updown_rounds::ports::repository::{BalanceSnapshot, RoundRecord, RoundRepository};
use updown_rounds::usecases::{
    AggregatorSettings, BetLimits, PriceAggregator, RoundEvent, RoundScheduler, SchedulerSettings,
};

// ---- Mock Definitions ----

mock! {
    pub Repo {}

    #[async_trait::async_trait]
    impl RoundRepository for Repo {
        async fn save_round(&self, record: &RoundRecord) -> anyhow::Result<()>;
        async fn load_rounds(&self) -> anyhow::Result<Vec<RoundRecord>>;
        async fn save_balances(&self, snapshot: &BalanceSnapshot) -> anyhow::Result<()>;
        async fn load_balances(&self) -> anyhow::Result<Option<BalanceSnapshot>>;
        async fn is_healthy(&self) -> bool;
    }
}

mock! {
    pub Balances {}

    #[async_trait::async_trait]
    impl BalanceBook for Balances {
        async fn balance(&self, participant_id: &str) -> anyhow::Result<u64>;
        async fn debit(&self, participant_id: &str, amount: u64) -> anyhow::Result<u64>;
        async fn credit(&self, participant_id: &str, amount: u64) -> anyhow::Result<u64>;
    }
}

// ---- Helpers ----

/// Primary provider fed from a script; `None` entries are outages.
#[derive(Clone, Default)]
struct ScriptedFeed {
    script: Arc<Mutex<VecDeque<Option<Decimal>>>>,
}

impl ScriptedFeed {
    fn push(&self, entry: Option<Decimal>) {
        self.script.lock().unwrap().push_back(entry);
    }
}

#[async_trait::async_trait]
impl PriceProvider for ScriptedFeed {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_price(&self) -> Result<Decimal, FeedError> {
        match self.script.lock().unwrap().pop_front().flatten() {
            Some(price) => Ok(price),
            None => Err(FeedError::ProviderUnavailable {
                provider: "scripted".to_string(),
                reason: "outage".to_string(),
            }),
        }
    }
}

fn aggregator(feed: &ScriptedFeed) -> Arc<PriceAggregator> {
    let primary: Arc<dyn PriceProvider> = Arc::new(feed.clone());
    Arc::new(PriceAggregator::new(
        vec![primary],
        vec![],
        AggregatorSettings::default(),
    ))
}

fn scheduler<B: BalanceBook>(
    feed: &ScriptedFeed,
    balances: Arc<B>,
    repo: MockRepo,
) -> RoundScheduler<B, MockRepo> {
    RoundScheduler::new(
        aggregator(feed),
        balances,
        Arc::new(repo),
        SettlementEngine::new(dec!(0.1)).unwrap(),
        BetLimits::default(),
        SchedulerSettings::default(),
    )
}

fn opened_at<B: BalanceBook>(s: &RoundScheduler<B, MockRepo>) -> DateTime<Utc> {
    s.round_view().unwrap().opened_at
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<RoundEvent>) -> Vec<RoundEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---- Tests ----

#[tokio::test]
async fn test_reference_round_pays_winners_and_persists_once() {
    let feed = ScriptedFeed::default();
    feed.push(Some(dec!(60000)));
    feed.push(Some(dec!(60500)));

    let mut repo = MockRepo::new();
    repo.expect_save_round()
        .withf(|r: &RoundRecord| {
            r.round_number == 1
                && r.settlement.total_pool == 400
                && r.settlement.commission == dec!(40)
                && r.settlement.payouts.get("alice") == Some(&120)
                && r.settlement.payouts.get("bob") == Some(&240)
                && r.settlement.payouts.get("carol") == Some(&0)
        })
        .times(1)
        .returning(|_| Ok(()));

    let balances = Arc::new(InMemoryBalanceBook::new(1000));
    let s = scheduler(&feed, Arc::clone(&balances), repo);
    s.start(Utc::now()).await;
    let t0 = opened_at(&s);

    s.place_bet_at("alice", Direction::Up, 100, t0).await.unwrap();
    s.place_bet_at("bob", Direction::Up, 200, t0).await.unwrap();
    s.place_bet_at("carol", Direction::Down, 100, t0).await.unwrap();

    let end = t0 + Duration::seconds(300);
    s.tick(end).await.unwrap();
    // A second tick at the same instant must not settle again.
    s.tick(end).await.unwrap();

    assert_eq!(balances.balance("alice").await.unwrap(), 1020);
    assert_eq!(balances.balance("bob").await.unwrap(), 1040);
    assert_eq!(balances.balance("carol").await.unwrap(), 900);
}

#[tokio::test]
async fn test_no_winners_keeps_pool_undisbursed() {
    let feed = ScriptedFeed::default();
    feed.push(Some(dec!(60000)));
    feed.push(Some(dec!(59000)));

    let mut repo = MockRepo::new();
    repo.expect_save_round()
        .withf(|r: &RoundRecord| {
            r.settlement.outcome == Direction::Down && r.settlement.total_paid() == 0
        })
        .times(1)
        .returning(|_| Ok(()));

    let balances = Arc::new(InMemoryBalanceBook::new(1000));
    let s = scheduler(&feed, Arc::clone(&balances), repo);
    s.start(Utc::now()).await;
    let t0 = opened_at(&s);

    s.place_bet_at("alice", Direction::Up, 100, t0).await.unwrap();
    s.place_bet_at("bob", Direction::Up, 50, t0).await.unwrap();
    s.tick(t0 + Duration::seconds(300)).await.unwrap();

    assert_eq!(balances.balance("alice").await.unwrap(), 900);
    assert_eq!(balances.balance("bob").await.unwrap(), 950);
}

#[tokio::test]
async fn test_feed_outage_at_end_uses_last_known_quote() {
    let feed = ScriptedFeed::default();
    feed.push(Some(dec!(60000)));
    feed.push(None);

    let mut repo = MockRepo::new();
    repo.expect_save_round()
        .withf(|r: &RoundRecord| {
            r.end_origin == QuoteOrigin::LastKnown
                && r.end_quote.value == dec!(60000)
                && r.settlement.outcome == Direction::Down
        })
        .times(1)
        .returning(|_| Ok(()));

    let balances = Arc::new(InMemoryBalanceBook::new(1000));
    let s = scheduler(&feed, balances, repo);
    s.start(Utc::now()).await;
    let t0 = opened_at(&s);

    s.tick(t0 + Duration::seconds(300)).await.unwrap();
    assert_eq!(s.round_view().unwrap().outcome, Some(Direction::Down));
}

#[tokio::test]
async fn test_repository_failure_does_not_stop_rounds() {
    let feed = ScriptedFeed::default();
    for price in [dec!(60000), dec!(60100), dec!(60200)] {
        feed.push(Some(price));
    }

    let mut repo = MockRepo::new();
    repo.expect_save_round()
        .times(1)
        .returning(|_| Err(anyhow::anyhow!("disk full")));

    let balances = Arc::new(InMemoryBalanceBook::new(1000));
    let s = scheduler(&feed, balances, repo);
    s.start(Utc::now()).await;
    let t0 = opened_at(&s);

    let end = t0 + Duration::seconds(300);
    s.tick(end).await.unwrap();
    s.tick(end + Duration::seconds(5)).await.unwrap();

    let view = s.round_view().unwrap();
    assert_eq!(view.round_number, 2);
    assert_eq!(view.phase, Phase::Open);
    assert_eq!(s.last_settled().await.unwrap().round_number, 1);
}

#[tokio::test]
async fn test_credit_failure_is_logged_not_fatal() {
    let feed = ScriptedFeed::default();
    feed.push(Some(dec!(60000)));
    feed.push(Some(dec!(61000)));

    let mut balances = MockBalances::new();
    balances.expect_balance().returning(|_| Ok(1000));
    balances
        .expect_debit()
        .withf(|id: &str, amount: &u64| id == "alice" && *amount == 100)
        .times(1)
        .returning(|_, _| Ok(900));
    balances
        .expect_credit()
        .withf(|id: &str, amount: &u64| id == "alice" && *amount == 90)
        .times(1)
        .returning(|_, _| Err(anyhow::anyhow!("ledger offline")));

    let mut repo = MockRepo::new();
    repo.expect_save_round().times(1).returning(|_| Ok(()));

    let s = scheduler(&feed, Arc::new(balances), repo);
    s.start(Utc::now()).await;
    let t0 = opened_at(&s);

    s.place_bet_at("alice", Direction::Up, 100, t0).await.unwrap();
    assert!(s.tick(t0 + Duration::seconds(300)).await.is_ok());

    let stats = s.stats("alice").await.unwrap();
    assert_eq!(stats.total_bets, 1);
    assert_eq!(stats.losses, 1);
}

#[tokio::test]
async fn test_lock_boundary_and_event_order() {
    let feed = ScriptedFeed::default();
    feed.push(Some(dec!(60000)));
    feed.push(Some(dec!(60001)));

    let mut repo = MockRepo::new();
    repo.expect_save_round().times(1).returning(|_| Ok(()));

    let balances = Arc::new(InMemoryBalanceBook::new(1000));
    let s = scheduler(&feed, balances, repo);
    let mut events = s.subscribe();
    s.start(Utc::now()).await;
    let t0 = opened_at(&s);

    let lock = t0 + Duration::seconds(290);
    s.place_bet_at("alice", Direction::Up, 100, lock - Duration::milliseconds(1))
        .await
        .unwrap();
    let err = s.place_bet_at("bob", Direction::Up, 100, lock).await.unwrap_err();
    assert_eq!(err.rejection(), Some(BetRejection::RoundNotAcceptingBets));

    s.tick(lock).await.unwrap();
    s.tick(t0 + Duration::seconds(300)).await.unwrap();

    let kinds: Vec<&'static str> = drain(&mut events)
        .iter()
        .map(|e| match e {
            RoundEvent::Opened { .. } => "opened",
            RoundEvent::Locked { .. } => "locked",
            RoundEvent::Settled { .. } => "settled",
            RoundEvent::Tick { .. } => "tick",
            RoundEvent::PriceUpdated { .. } => "price",
            RoundEvent::BetAccepted { .. } => "accepted",
            RoundEvent::BetRejected { .. } => "rejected",
        })
        .collect();
    assert_eq!(
        kinds,
        ["opened", "accepted", "rejected", "locked", "tick", "settled", "tick"]
    );
}

#[tokio::test]
async fn test_price_refresh_emits_update() {
    let feed = ScriptedFeed::default();
    feed.push(Some(dec!(60000)));
    feed.push(Some(dec!(60250.456)));

    let repo = MockRepo::new();
    let balances = Arc::new(InMemoryBalanceBook::new(0));
    let s = scheduler(&feed, balances, repo);
    let mut events = s.subscribe();
    s.start(Utc::now()).await;

    let resolved = s.refresh_price().await;
    assert_eq!(resolved.quote.value, dec!(60250.46));

    let last = drain(&mut events).pop().unwrap();
    assert_eq!(
        last,
        RoundEvent::PriceUpdated {
            price: dec!(60250.46),
            origin: QuoteOrigin::Live,
        }
    );
}

fn history_record(round_number: u64, settled_at: DateTime<Utc>) -> RoundRecord {
    let wagers = vec![
        Wager::new("alice", Direction::Up, 100, settled_at),
        Wager::new("bob", Direction::Down, 100, settled_at),
    ];
    let quote = |value| PriceQuote::new(value, settled_at, SourceTier::Primary);
    RoundRecord {
        round_number,
        start_quote: quote(dec!(60000)),
        start_origin: QuoteOrigin::Live,
        end_quote: quote(dec!(60100)),
        end_origin: QuoteOrigin::Live,
        settlement: settle(&wagers, Direction::Up, dec!(0.1)).unwrap(),
        opened_at: settled_at - Duration::seconds(300),
        settled_at,
    }
}

#[tokio::test]
async fn test_restart_restores_stats_and_round_numbering() {
    let feed = ScriptedFeed::default();
    feed.push(Some(dec!(60000)));

    let earlier = Utc::now() - Duration::hours(1);
    let history = vec![
        history_record(41, earlier),
        history_record(42, earlier + Duration::seconds(305)),
    ];
    let mut repo = MockRepo::new();
    repo.expect_load_rounds()
        .times(1)
        .returning(move || Ok(history.clone()));
    let repo = Arc::new(repo);
    let records = repo.load_rounds().await.unwrap();

    let s = RoundScheduler::new(
        aggregator(&feed),
        Arc::new(InMemoryBalanceBook::new(1000)),
        Arc::clone(&repo),
        SettlementEngine::new(dec!(0.1)).unwrap(),
        BetLimits::default(),
        SchedulerSettings::default(),
    );
    s.restore(&records, 40).await;

    let alice = s.stats("alice").await.unwrap();
    assert_eq!(alice.total_bets, 2);
    assert_eq!(alice.wins, 2);
    assert_eq!(s.stats("bob").await.unwrap().losses, 2);
    assert_eq!(s.last_settled().await.unwrap().round_number, 42);

    s.start(Utc::now()).await;
    assert_eq!(s.current_round_number(), 43);
}

#[tokio::test]
async fn test_shutdown_refunds_unsettled_stakes() {
    let feed = ScriptedFeed::default();
    feed.push(Some(dec!(60000)));

    let mut repo = MockRepo::new();
    repo.expect_save_round().never();

    let balances = Arc::new(InMemoryBalanceBook::new(1000));
    let s = scheduler(&feed, Arc::clone(&balances), repo);
    s.start(Utc::now()).await;
    let t0 = opened_at(&s);
    s.place_bet_at("alice", Direction::Up, 300, t0).await.unwrap();
    assert_eq!(balances.balance("alice").await.unwrap(), 700);

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    shutdown_tx.send(()).unwrap();
    s.run(shutdown_rx).await.unwrap();

    assert_eq!(balances.balance("alice").await.unwrap(), 1000);
    assert!(s.stats("alice").await.is_none());
}

#[tokio::test]
async fn test_readiness_tracks_repository_health() {
    let mut repo = MockRepo::new();
    let mut answers = vec![true, false].into_iter();
    repo.expect_is_healthy()
        .times(2)
        .returning(move || answers.next().unwrap_or(false));

    let health = HealthState::new();
    health.scheduler_running.store(true, std::sync::atomic::Ordering::Relaxed);
    health.observe(&RoundEvent::PriceUpdated {
        price: dec!(60000),
        origin: QuoteOrigin::Live,
    });

    assert!(health.check_storage(&repo).await);
    assert!(health.is_ready());
    assert!(!health.check_storage(&repo).await);
    assert!(!health.is_ready());
}
