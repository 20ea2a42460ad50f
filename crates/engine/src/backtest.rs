//! Chronological backtest replay and deterministic ranking
//!
//! Replays a price series oldest-first, opening a long position on Buy and
//! closing on Sell. All arithmetic runs on `Decimal`; the single narrowing
//! point to plain `f64`/`u32` is [`normalize_metrics`], which is the only
//! way numbers leave this module.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::signals::{build_generator, Signal};
use crate::types::{CandidateStrategy, PricePoint, StrategyMetrics, StrategyResult, StrategyStatus};

/// Position state during replay
struct OpenPosition {
    entry_price: Decimal,
}

/// Pre-normalization tallies, still in wide representations
struct RawMetrics {
    wins: u32,
    trade_count: u32,
    gross_gain: Decimal,
    gross_loss: Decimal,
    compounded: Decimal,
}

/// Backtesting engine that replays a series point-by-point
pub struct BacktestEngine;

impl BacktestEngine {
    /// Score one candidate against a series.
    ///
    /// The produced result is immutable; reruns of the same strategy_id
    /// must be written under a new `version`.
    pub fn run(candidate: &CandidateStrategy, series: &[PricePoint], version: u32) -> StrategyResult {
        let mut generator = build_generator(&candidate.rule);
        let mut position: Option<OpenPosition> = None;
        let mut returns: Vec<Decimal> = Vec::new();

        for point in series {
            let signal = generator.on_value(value_f64(point));
            match signal {
                Signal::Buy => {
                    if position.is_none() {
                        position = Some(OpenPosition {
                            entry_price: point.value,
                        });
                    }
                }
                Signal::Sell => {
                    if let Some(pos) = position.take() {
                        returns.push(trade_return(&pos, point.value));
                    }
                }
                Signal::Hold => {}
            }
        }

        // Close any position still open at the end of the series
        if let (Some(pos), Some(last)) = (position.take(), series.last()) {
            returns.push(trade_return(&pos, last.value));
        }

        let raw = tally(&returns);
        let metrics = normalize_metrics(raw);

        debug!(
            strategy_id = %candidate.strategy_id,
            version,
            trades = metrics.trade_count,
            total_return = metrics.total_return,
            "Backtest complete"
        );

        let mut parameters = serde_json::to_value(&candidate.rule).unwrap_or_default();
        if let (Some(seed), Some(obj)) = (candidate.seed, parameters.as_object_mut()) {
            obj.insert("seed".to_string(), seed.into());
        }

        StrategyResult {
            strategy_id: candidate.strategy_id.clone(),
            version,
            parameters,
            metrics,
            status: StrategyStatus::Candidate,
        }
    }
}

fn value_f64(point: &PricePoint) -> f64 {
    point.value.to_f64().unwrap_or(0.0)
}

fn trade_return(pos: &OpenPosition, exit_price: Decimal) -> Decimal {
    if pos.entry_price > Decimal::ZERO {
        (exit_price - pos.entry_price) / pos.entry_price
    } else {
        Decimal::ZERO
    }
}

fn tally(returns: &[Decimal]) -> RawMetrics {
    let wins = returns.iter().filter(|r| **r > Decimal::ZERO).count() as u32;
    let gross_gain: Decimal = returns.iter().filter(|r| **r > Decimal::ZERO).sum();
    let gross_loss: Decimal = returns
        .iter()
        .filter(|r| **r < Decimal::ZERO)
        .map(|r| r.abs())
        .sum();
    let compounded = returns
        .iter()
        .fold(Decimal::ONE, |acc, r| acc * (Decimal::ONE + r))
        - Decimal::ONE;

    RawMetrics {
        wins,
        trade_count: returns.len() as u32,
        gross_gain,
        gross_loss,
        compounded,
    }
}

/// The engine's output boundary: every wide numeric representation is
/// narrowed to a plain primitive here, and nowhere else.
fn normalize_metrics(raw: RawMetrics) -> StrategyMetrics {
    if raw.trade_count == 0 {
        return StrategyMetrics::zero();
    }

    let win_rate = (f64::from(raw.wins) / f64::from(raw.trade_count)).clamp(0.0, 1.0);

    let profit_factor = if raw.gross_loss > Decimal::ZERO {
        Some(narrow(raw.gross_gain / raw.gross_loss))
    } else if raw.gross_gain > Decimal::ZERO {
        // Gains with no losses: the ratio is undefined rather than a
        // made-up huge number.
        None
    } else {
        Some(0.0)
    };

    StrategyMetrics {
        win_rate,
        profit_factor,
        total_return: narrow(raw.compounded),
        trade_count: raw.trade_count,
    }
}

fn narrow(value: Decimal) -> f64 {
    let narrowed = value.to_f64().unwrap_or(0.0);
    debug_assert!(narrowed.is_finite(), "non-finite metric escaped normalization");
    narrowed
}

/// Deterministic ordering for reproducible reports: total_return desc,
/// profit_factor desc (undefined ranks above every finite value), win_rate
/// desc, strategy_id asc.
pub fn rank(mut results: Vec<StrategyResult>) -> Vec<StrategyResult> {
    results.sort_by(|a, b| {
        b.metrics
            .total_return
            .total_cmp(&a.metrics.total_return)
            .then_with(|| pf_key(b).total_cmp(&pf_key(a)))
            .then_with(|| b.metrics.win_rate.total_cmp(&a.metrics.win_rate))
            .then_with(|| a.strategy_id.cmp(&b.strategy_id))
    });
    results
}

fn pf_key(result: &StrategyResult) -> f64 {
    result.metrics.profit_factor.unwrap_or(f64::INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalRule;
    use crate::types::PriceSource;
    use rust_decimal_macros::dec;

    fn series(prices: &[i64]) -> Vec<PricePoint> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| PricePoint {
                timestamp: i as i64 * 60_000,
                value: Decimal::from(*p),
                source: PriceSource::Purchased,
            })
            .collect()
    }

    fn result(id: &str, total_return: f64, pf: Option<f64>, win_rate: f64) -> StrategyResult {
        StrategyResult {
            strategy_id: id.to_string(),
            version: 1,
            parameters: serde_json::json!({}),
            metrics: StrategyMetrics {
                win_rate,
                profit_factor: pf,
                total_return,
                trade_count: 4,
            },
            status: StrategyStatus::Candidate,
        }
    }

    #[test]
    fn zero_trades_yield_zero_metrics_not_an_error() {
        // 60-point window over a 50-point series: generator never warms up
        let points = series(&[100; 50]);
        let candidate = CandidateStrategy::from_rule(SignalRule::MeanReversion {
            period: 60,
            z_entry: 2.0,
        });

        let result = BacktestEngine::run(&candidate, &points, 1);
        assert_eq!(result.metrics, StrategyMetrics::zero());
        assert_eq!(result.status, StrategyStatus::Candidate);
    }

    #[test]
    fn replay_produces_bounded_metrics() {
        // Down leg then up leg to force crossovers and at least one trade
        let mut prices: Vec<i64> = (0..25).map(|i| 100 - i).collect();
        prices.extend((0..25).map(|i| 76 + i * 2));
        let points = series(&prices);

        let candidate =
            CandidateStrategy::from_rule(SignalRule::MaCrossover { fast: 3, slow: 8 });
        let result = BacktestEngine::run(&candidate, &points, 1);

        assert!(result.metrics.trade_count > 0);
        assert!((0.0..=1.0).contains(&result.metrics.win_rate));
        assert!(result.metrics.total_return.is_finite());
        if let Some(pf) = result.metrics.profit_factor {
            assert!(pf >= 0.0 && pf.is_finite());
        }
    }

    #[test]
    fn profit_factor_undefined_when_only_gains() {
        let raw = RawMetrics {
            wins: 2,
            trade_count: 2,
            gross_gain: dec!(0.3),
            gross_loss: Decimal::ZERO,
            compounded: dec!(0.32),
        };
        let metrics = normalize_metrics(raw);
        assert_eq!(metrics.profit_factor, None);
        assert_eq!(metrics.win_rate, 1.0);
    }

    #[test]
    fn profit_factor_zero_when_flat() {
        let raw = RawMetrics {
            wins: 0,
            trade_count: 3,
            gross_gain: Decimal::ZERO,
            gross_loss: Decimal::ZERO,
            compounded: Decimal::ZERO,
        };
        let metrics = normalize_metrics(raw);
        assert_eq!(metrics.profit_factor, Some(0.0));
        assert_eq!(metrics.win_rate, 0.0);
    }

    #[test]
    fn rank_orders_fully_deterministically() {
        let results = vec![
            result("c", 0.10, Some(1.5), 0.5),
            result("a", 0.20, Some(2.0), 0.6),
            result("b", 0.20, None, 0.4),
            result("d", 0.10, Some(1.5), 0.5),
        ];
        let ranked = rank(results);
        let ids: Vec<&str> = ranked.iter().map(|r| r.strategy_id.as_str()).collect();
        // Undefined profit factor outranks finite at equal return;
        // final tie on "c" vs "d" broken by id ascending.
        assert_eq!(ids, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn result_serialization_round_trip() {
        let candidate = CandidateStrategy::explored(
            SignalRule::Breakout {
                lookback: 20,
                margin: 0.01,
            },
            7,
        );
        let mut prices: Vec<i64> = (0..30).map(|i| 100 + (i % 5)).collect();
        prices.push(150);
        let original = BacktestEngine::run(&candidate, &series(&prices), 3);

        let json = serde_json::to_string(&original).unwrap();
        let reloaded: StrategyResult = serde_json::from_str(&json).unwrap();
        assert_eq!(original, reloaded);
        assert_eq!(reloaded.parameters["seed"], 7);
    }
}
