//! Property-Based Tests - Settlement and Clock Invariants
//!
//! Uses `proptest` to verify that settlement and the round clock
//! maintain their invariants across random inputs.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;

use updown_rounds::domain::quote::median_floor;
use updown_rounds::domain::round::{Phase, RoundClock};
use updown_rounds::domain::settlement::settle;
use updown_rounds::domain::wager::{Direction, Wager};

fn wagers_strategy() -> impl Strategy<Value = Vec<Wager>> {
    prop::collection::vec((0u8..12, any::<bool>(), 1u64..=10_000), 0..40).prop_map(|raw| {
        let placed_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        raw.into_iter()
            .map(|(p, up, amount)| {
                let direction = if up { Direction::Up } else { Direction::Down };
                Wager::new(format!("p{p}"), direction, amount, placed_at)
            })
            .collect()
    })
}

fn rate_strategy() -> impl Strategy<Value = Decimal> {
    (0u32..10_000).prop_map(|bps| Decimal::new(i64::from(bps), 4))
}

fn outcome_strategy() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Up), Just(Direction::Down)]
}

// ── Settlement Properties ───────────────────────────────────

proptest! {
    /// Paid ≤ distributable ≤ pool, and commission + distributable = pool.
    #[test]
    fn payouts_never_exceed_distributable(
        wagers in wagers_strategy(),
        outcome in outcome_strategy(),
        rate in rate_strategy(),
    ) {
        let result = settle(&wagers, outcome, rate).unwrap();
        let pool = Decimal::from(result.total_pool);

        prop_assert!(Decimal::from(result.total_paid()) <= result.distributable);
        prop_assert!(result.distributable <= pool);
        prop_assert_eq!(result.commission + result.distributable, pool);
    }

    /// Losing wagers are paid nothing; winners only lose the floor remainder.
    #[test]
    fn losers_get_nothing_and_remainder_is_small(
        wagers in wagers_strategy(),
        outcome in outcome_strategy(),
        rate in rate_strategy(),
    ) {
        let result = settle(&wagers, outcome, rate).unwrap();

        for w in &result.wagers {
            if w.direction != outcome {
                prop_assert_eq!(w.payout, 0);
            }
        }

        let winning = result.wagers.iter().filter(|w| w.direction == outcome).count();
        if winning == 0 {
            prop_assert_eq!(result.total_paid(), 0);
        } else {
            prop_assert!(result.undisbursed() < Decimal::from(winning));
        }
    }

    /// A larger winning stake never receives a smaller payout.
    #[test]
    fn payout_monotonic_in_stake(
        wagers in wagers_strategy(),
        outcome in outcome_strategy(),
        rate in rate_strategy(),
    ) {
        let result = settle(&wagers, outcome, rate).unwrap();
        let mut winners: Vec<_> = result
            .wagers
            .iter()
            .filter(|w| w.direction == outcome)
            .map(|w| (w.stake, w.payout))
            .collect();
        winners.sort_unstable();

        for pair in winners.windows(2) {
            prop_assert!(pair[0].1 <= pair[1].1, "stake {:?} vs {:?}", pair[0], pair[1]);
        }
    }

    /// Settling the same inputs twice gives the same result.
    #[test]
    fn settlement_is_deterministic(
        wagers in wagers_strategy(),
        outcome in outcome_strategy(),
        rate in rate_strategy(),
    ) {
        let first = settle(&wagers, outcome, rate).unwrap();
        let second = settle(&wagers, outcome, rate).unwrap();
        prop_assert_eq!(first, second);
    }

    /// The payout map sums each participant's per-wager payouts.
    #[test]
    fn payout_map_matches_wager_outcomes(
        wagers in wagers_strategy(),
        outcome in outcome_strategy(),
        rate in rate_strategy(),
    ) {
        let result = settle(&wagers, outcome, rate).unwrap();
        for (participant, total) in &result.payouts {
            let summed: u64 = result
                .wagers
                .iter()
                .filter(|w| &w.participant_id == participant)
                .map(|w| w.payout)
                .sum();
            prop_assert_eq!(*total, summed);
        }
    }
}

// ── Round Clock Properties ──────────────────────────────────

proptest! {
    /// Bets are accepted exactly while the derived phase is OPEN.
    #[test]
    fn accepts_bets_iff_open(
        duration in 20i64..3_600,
        lock in 1i64..20,
        offset_ms in -10_000i64..4_000_000,
    ) {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = RoundClock::new(t0, Duration::seconds(duration), Duration::seconds(lock));
        let now = t0 + Duration::milliseconds(offset_ms);

        prop_assert_eq!(clock.accepts_bets_at(now), clock.phase_at(now) == Phase::Open);
        prop_assert!(clock.seconds_remaining(now) >= 0);
    }

    /// Phase never moves backwards as time advances.
    #[test]
    fn phase_is_monotonic(
        a_ms in 0i64..400_000,
        b_ms in 0i64..400_000,
    ) {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = RoundClock::new(t0, Duration::seconds(300), Duration::seconds(10));
        let (early, late) = (a_ms.min(b_ms), a_ms.max(b_ms));
        let rank = |p: Phase| match p {
            Phase::Open => 0,
            Phase::Locked => 1,
            Phase::Settled => 2,
        };

        let p1 = clock.phase_at(t0 + Duration::milliseconds(early));
        let p2 = clock.phase_at(t0 + Duration::milliseconds(late));
        prop_assert!(rank(p1) <= rank(p2));
    }

    /// The secondary median is always one of the inputs, within their range.
    #[test]
    fn median_is_an_input(values in prop::collection::vec(1_000i64..200_000, 1..15)) {
        let values: Vec<Decimal> = values.into_iter().map(Decimal::from).collect();
        let median = median_floor(&values).unwrap();
        prop_assert!(values.contains(&median));
    }
}
