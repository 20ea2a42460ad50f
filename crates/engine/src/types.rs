//! Types shared across the engine

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::signals::SignalRule;

/// Where a price observation came from.
///
/// Provenance is load-bearing: consumers that require real market data
/// filter on `Purchased` instead of trusting an ambient mode flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    /// Bought from the metered gateway.
    Purchased,
    /// Re-read from a persisted series during historical replay.
    Replay,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchased => "purchased",
            Self::Replay => "replay",
        }
    }
}

/// A single observed price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Millisecond epoch timestamp; unique per point.
    pub timestamp: i64,
    pub value: Decimal,
    pub source: PriceSource,
}

/// A parameterized heuristic not yet scored against history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateStrategy {
    pub strategy_id: String,
    pub rule: SignalRule,
    /// RNG seed recorded for exploration candidates; None for the fixed grid.
    pub seed: Option<u64>,
}

impl CandidateStrategy {
    pub fn from_rule(rule: SignalRule) -> Self {
        Self {
            strategy_id: rule.strategy_id(),
            rule,
            seed: None,
        }
    }

    pub fn explored(rule: SignalRule, seed: u64) -> Self {
        Self {
            strategy_id: rule.strategy_id(),
            rule,
            seed: Some(seed),
        }
    }
}

/// Backtest performance numbers, narrowed to plain primitives.
///
/// Every field here must survive a JSON round-trip unchanged; wide internal
/// representations stop at [`crate::backtest::normalize_metrics`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyMetrics {
    /// winning_trades / trade_count, in [0, 1]; 0 when no trades closed.
    pub win_rate: f64,
    /// gross_gain / gross_loss; `None` means undefined (gains with zero
    /// losses), `Some(0.0)` when both sides are zero.
    pub profit_factor: Option<f64>,
    /// Compounded fractional return across all closed trades.
    pub total_return: f64,
    pub trade_count: u32,
}

impl StrategyMetrics {
    pub fn zero() -> Self {
        Self {
            win_rate: 0.0,
            profit_factor: Some(0.0),
            total_return: 0.0,
            trade_count: 0,
        }
    }
}

/// Lifecycle of a scored result: `Candidate` until a newer version of the
/// same strategy_id supersedes it, then `Archived` (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyStatus {
    Candidate,
    Archived,
}

impl StrategyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::Archived => "archived",
        }
    }
}

/// Immutable outcome of one backtest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyResult {
    pub strategy_id: String,
    /// Monotonically increasing per strategy_id; a rerun writes a new
    /// version, never mutates an old one.
    pub version: u32,
    pub parameters: serde_json::Value,
    pub metrics: StrategyMetrics,
    pub status: StrategyStatus,
}
