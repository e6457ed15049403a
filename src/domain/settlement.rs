//! Pari-mutuel settlement engine.
//!
//! All stakes form one pool, commission is removed, and the remainder is
//! split among winning wagers proportional to stake. Payouts are truncated
//! toward zero per wager; the truncation remainder stays undisbursed.
//!
//! Commission and distributable amounts are exact `Decimal` values
//! (`total_pool * rate`, no flooring). Per-wager payouts are computed in
//! integer arithmetic on the decimal mantissa so the floor is exact.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::SettlementError;
use super::wager::{Direction, ParticipantId, Wager};

/// Most decimal places a commission rate may carry.
///
/// Bounds the scale of the distributable amount, which keeps the exact
/// payout arithmetic inside `u128` for any realistic pool.
pub const MAX_RATE_SCALE: u32 = 6;

/// Sign of a wager's net result, used for statistics.
///
/// Getting money back is not a win: only `payout > stake` counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetResult {
    Win,
    LossOrBreakeven,
}

/// Settlement of one wager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerOutcome {
    pub wager_id: Uuid,
    pub participant_id: ParticipantId,
    pub direction: Direction,
    pub stake: u64,
    pub payout: u64,
    pub net: NetResult,
}

/// Result of settling one round. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub outcome: Direction,
    pub total_pool: u64,
    pub commission: Decimal,
    pub distributable: Decimal,
    /// Participant → total payout (0 for losers).
    pub payouts: BTreeMap<ParticipantId, u64>,
    /// Per-wager breakdown in ledger order.
    pub wagers: Vec<WagerOutcome>,
}

impl SettlementResult {
    /// Sum of all payouts.
    pub fn total_paid(&self) -> u64 {
        self.wagers.iter().map(|w| w.payout).sum()
    }

    /// Part of the distributable amount that is not paid to anyone.
    ///
    /// Floor-rounding loss, or the whole distributable amount when
    /// nobody picked the winning side.
    pub fn undisbursed(&self) -> Decimal {
        self.distributable - Decimal::from(self.total_paid())
    }

    pub fn winner_count(&self) -> usize {
        self.wagers
            .iter()
            .filter(|w| w.direction == self.outcome)
            .count()
    }
}

/// Settlement engine bound to a commission rate.
#[derive(Debug, Clone, Copy)]
pub struct SettlementEngine {
    commission_rate: Decimal,
}

impl SettlementEngine {
    /// Create an engine. The rate must lie in `[0, 1)` with at most
    /// `MAX_RATE_SCALE` decimal places.
    pub fn new(commission_rate: Decimal) -> Result<Self, SettlementError> {
        validate_rate(commission_rate)?;
        Ok(Self { commission_rate })
    }

    pub const fn commission_rate(&self) -> Decimal {
        self.commission_rate
    }

    pub fn settle(
        &self,
        wagers: &[Wager],
        outcome: Direction,
    ) -> Result<SettlementResult, SettlementError> {
        settle(wagers, outcome, self.commission_rate)
    }
}

fn validate_rate(rate: Decimal) -> Result<(), SettlementError> {
    if rate < Decimal::ZERO || rate >= Decimal::ONE {
        return Err(SettlementError::MalformedSettlementInput(format!(
            "commission rate {rate} outside [0, 1)"
        )));
    }
    if rate.normalize().scale() > MAX_RATE_SCALE {
        return Err(SettlementError::MalformedSettlementInput(format!(
            "commission rate {rate} has more than {MAX_RATE_SCALE} decimal places"
        )));
    }
    Ok(())
}

fn overflow() -> SettlementError {
    SettlementError::MalformedSettlementInput("arithmetic overflow".to_string())
}

/// Settle a round's wagers against its outcome.
///
/// Pure and deterministic: identical inputs always give identical results.
pub fn settle(
    wagers: &[Wager],
    outcome: Direction,
    commission_rate: Decimal,
) -> Result<SettlementResult, SettlementError> {
    validate_rate(commission_rate)?;

    if let Some(w) = wagers.iter().find(|w| w.amount == 0) {
        return Err(SettlementError::MalformedSettlementInput(format!(
            "wager {} from {} has zero amount",
            w.id, w.participant_id
        )));
    }

    let total_pool = wagers
        .iter()
        .try_fold(0u64, |acc, w| acc.checked_add(w.amount))
        .ok_or_else(overflow)?;
    let total_winning = wagers
        .iter()
        .filter(|w| w.direction == outcome)
        .try_fold(0u64, |acc, w| acc.checked_add(w.amount))
        .ok_or_else(overflow)?;

    let pool = Decimal::from(total_pool);
    let commission = pool.checked_mul(commission_rate).ok_or_else(overflow)?;
    let distributable = pool - commission;

    // distributable = mantissa / 10^scale, both non-negative here.
    let normalized = distributable.normalize();
    let mantissa = u128::try_from(normalized.mantissa()).map_err(|_| overflow())?;
    let scale_factor = 10u128
        .checked_pow(normalized.scale())
        .ok_or_else(overflow)?;
    let denominator = u128::from(total_winning)
        .checked_mul(scale_factor)
        .ok_or_else(overflow)?;

    let mut payouts: BTreeMap<ParticipantId, u64> = BTreeMap::new();
    let mut outcomes = Vec::with_capacity(wagers.len());

    for wager in wagers {
        let payout = if wager.direction == outcome && total_winning > 0 {
            let numerator = mantissa
                .checked_mul(u128::from(wager.amount))
                .ok_or_else(overflow)?;
            u64::try_from(numerator / denominator).map_err(|_| overflow())?
        } else {
            0
        };

        let entry = payouts.entry(wager.participant_id.clone()).or_insert(0);
        *entry = entry.checked_add(payout).ok_or_else(overflow)?;

        outcomes.push(WagerOutcome {
            wager_id: wager.id,
            participant_id: wager.participant_id.clone(),
            direction: wager.direction,
            stake: wager.amount,
            payout,
            net: if payout > wager.amount {
                NetResult::Win
            } else {
                NetResult::LossOrBreakeven
            },
        });
    }

    Ok(SettlementResult {
        outcome,
        total_pool,
        commission,
        distributable,
        payouts,
        wagers: outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn wager(id: &str, direction: Direction, amount: u64) -> Wager {
        Wager::new(id, direction, amount, Utc::now())
    }

    #[test]
    fn test_reference_scenario() {
        let wagers = vec![
            wager("A", Direction::Up, 100),
            wager("B", Direction::Down, 100),
            wager("C", Direction::Down, 200),
        ];

        let result = settle(&wagers, Direction::Down, dec!(0.1)).unwrap();

        assert_eq!(result.total_pool, 400);
        assert_eq!(result.commission, dec!(40));
        assert_eq!(result.distributable, dec!(360));
        assert_eq!(result.payouts["A"], 0);
        assert_eq!(result.payouts["B"], 120);
        assert_eq!(result.payouts["C"], 240);
        assert_eq!(result.total_paid(), 360);
        assert_eq!(result.undisbursed(), Decimal::ZERO);
        assert_eq!(result.winner_count(), 2);
    }

    #[test]
    fn test_no_winners_pays_nothing() {
        let wagers = vec![
            wager("A", Direction::Up, 500),
            wager("B", Direction::Up, 300),
        ];

        let result = settle(&wagers, Direction::Down, dec!(0.1)).unwrap();

        assert_eq!(result.total_pool, 800);
        assert_eq!(result.distributable, dec!(720));
        assert!(result.payouts.values().all(|&p| p == 0));
        assert_eq!(result.undisbursed(), dec!(720));
    }

    #[test]
    fn test_floor_rounding_remainder_is_kept() {
        let wagers = vec![
            wager("A", Direction::Up, 10),
            wager("B", Direction::Up, 10),
            wager("C", Direction::Up, 10),
            wager("D", Direction::Down, 11),
        ];

        let result = settle(&wagers, Direction::Up, dec!(0.1)).unwrap();

        // 41 * 0.9 = 36.9, each winner gets floor(12.3) = 12
        assert_eq!(result.distributable, dec!(36.9));
        assert_eq!(result.payouts["A"], 12);
        assert_eq!(result.total_paid(), 36);
        assert_eq!(result.undisbursed(), dec!(0.9));
    }

    #[test]
    fn test_net_result_is_profit_sign() {
        let wagers = vec![
            wager("A", Direction::Up, 100),
            wager("B", Direction::Up, 100),
            wager("C", Direction::Down, 10),
        ];

        // 210 * 0.9 = 189, each winner gets 94 < stake
        let result = settle(&wagers, Direction::Up, dec!(0.1)).unwrap();
        assert_eq!(result.payouts["A"], 94);
        assert!(
            result
                .wagers
                .iter()
                .all(|w| w.net == NetResult::LossOrBreakeven)
        );

        let single = vec![wager("A", Direction::Up, 100), wager("B", Direction::Down, 100)];
        let result = settle(&single, Direction::Up, dec!(0.1)).unwrap();
        assert_eq!(result.payouts["A"], 180);
        assert_eq!(result.wagers[0].net, NetResult::Win);
    }

    #[test]
    fn test_zero_commission_breakeven_is_not_a_win() {
        let wagers = vec![wager("A", Direction::Up, 100)];
        let result = settle(&wagers, Direction::Up, Decimal::ZERO).unwrap();
        assert_eq!(result.payouts["A"], 100);
        assert_eq!(result.wagers[0].net, NetResult::LossOrBreakeven);
    }

    #[test]
    fn test_multiple_wagers_per_participant_are_summed() {
        let wagers = vec![
            wager("A", Direction::Up, 100),
            wager("A", Direction::Up, 100),
            wager("B", Direction::Down, 200),
        ];
        let result = settle(&wagers, Direction::Up, dec!(0.1)).unwrap();
        assert_eq!(result.payouts["A"], 360);
        assert_eq!(result.wagers.len(), 3);
    }

    #[test]
    fn test_empty_round() {
        let result = settle(&[], Direction::Up, dec!(0.1)).unwrap();
        assert_eq!(result.total_pool, 0);
        assert_eq!(result.distributable, Decimal::ZERO);
        assert!(result.payouts.is_empty());
    }

    #[test]
    fn test_malformed_input_rejected() {
        let zero = vec![wager("A", Direction::Up, 0)];
        assert!(matches!(
            settle(&zero, Direction::Up, dec!(0.1)),
            Err(SettlementError::MalformedSettlementInput(_))
        ));

        let ok = vec![wager("A", Direction::Up, 10)];
        assert!(settle(&ok, Direction::Up, dec!(1)).is_err());
        assert!(settle(&ok, Direction::Up, dec!(-0.1)).is_err());
        assert!(SettlementEngine::new(dec!(1.5)).is_err());
    }

    #[test]
    fn test_overlong_rate_rejected() {
        let rate: Decimal = "0.3333333333333333333333333333".parse().unwrap();
        assert!(SettlementEngine::new(rate).is_err());
        assert!(SettlementEngine::new(dec!(0.123456)).is_ok());
        assert!(SettlementEngine::new(dec!(0.1000000)).is_ok());
    }

    #[test]
    fn test_large_pool_with_finest_rate_does_not_overflow() {
        let wagers: Vec<Wager> = (0..1_000)
            .map(|i| {
                let direction = if i % 3 == 0 { Direction::Down } else { Direction::Up };
                wager(&format!("p{i}"), direction, 1_000_000_000)
            })
            .collect();

        let result = settle(&wagers, Direction::Up, dec!(0.333333)).unwrap();

        assert_eq!(result.total_pool, 1_000_000_000_000);
        assert_eq!(result.commission, dec!(333333000000));
        assert!(result.total_paid() <= 666_667_000_000);
        assert!(result.undisbursed() < Decimal::from(result.winner_count()));
    }

    #[test]
    fn test_engine_is_idempotent() {
        let engine = SettlementEngine::new(dec!(0.05)).unwrap();
        let wagers = vec![
            wager("A", Direction::Up, 37),
            wager("B", Direction::Down, 91),
            wager("C", Direction::Up, 13),
        ];
        let first = engine.settle(&wagers, Direction::Up).unwrap();
        let second = engine.settle(&wagers, Direction::Up).unwrap();
        assert_eq!(first, second);
    }
}
