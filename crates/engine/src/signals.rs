//! Signal rules and their point-by-point generators
//!
//! Each rule processes the price series one observation at a time and emits
//! Buy/Sell/Hold signals. Generators hold until their indicator window has
//! warmed up, so short series simply produce no trades.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use ta::indicators::{
    BollingerBands, Maximum, Minimum, RelativeStrengthIndex, SimpleMovingAverage,
    StandardDeviation,
};
use ta::Next;

/// Trading signal for a single observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// A fully-parameterized heuristic rule.
///
/// Serialized form doubles as the persisted `parameters` payload of a
/// strategy result, so every field must be a plain primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SignalRule {
    MaCrossover {
        fast: usize,
        slow: usize,
    },
    Breakout {
        lookback: usize,
        /// Fractional margin above/below the channel (0.01 = 1%)
        margin: f64,
    },
    MomentumReversal {
        rsi_period: usize,
        overbought: f64,
        oversold: f64,
    },
    MeanReversion {
        period: usize,
        z_entry: f64,
    },
    VolatilitySqueeze {
        period: usize,
        /// Bollinger band width, in standard deviations
        multiplier: f64,
        /// Squeeze fires when the current relative band width drops below
        /// this fraction of the recent average width
        squeeze_ratio: f64,
    },
}

impl SignalRule {
    /// Stable identifier shared by all versions of the same heuristic shape
    pub fn strategy_id(&self) -> String {
        match self {
            Self::MaCrossover { fast, slow } => format!("ma_crossover_{fast}_{slow}"),
            Self::Breakout { lookback, .. } => format!("breakout_{lookback}"),
            Self::MomentumReversal { rsi_period, .. } => format!("momentum_reversal_{rsi_period}"),
            Self::MeanReversion { period, .. } => format!("mean_reversion_{period}"),
            Self::VolatilitySqueeze { period, .. } => format!("volatility_squeeze_{period}"),
        }
    }
}

/// Point-by-point signal generation over a price series
pub trait SignalGenerator: Send {
    fn on_value(&mut self, value: f64) -> Signal;
}

/// Build the generator for a rule
pub fn build_generator(rule: &SignalRule) -> Box<dyn SignalGenerator> {
    match rule {
        SignalRule::MaCrossover { fast, slow } => Box::new(MaCrossoverGenerator::new(*fast, *slow)),
        SignalRule::Breakout { lookback, margin } => {
            Box::new(BreakoutGenerator::new(*lookback, *margin))
        }
        SignalRule::MomentumReversal {
            rsi_period,
            overbought,
            oversold,
        } => Box::new(MomentumReversalGenerator::new(*rsi_period, *overbought, *oversold)),
        SignalRule::MeanReversion { period, z_entry } => {
            Box::new(MeanReversionGenerator::new(*period, *z_entry))
        }
        SignalRule::VolatilitySqueeze {
            period,
            multiplier,
            squeeze_ratio,
        } => Box::new(VolatilitySqueezeGenerator::new(*period, *multiplier, *squeeze_ratio)),
    }
}

// ============================================================================
// MA crossover
// ============================================================================

struct MaCrossoverGenerator {
    fast: SimpleMovingAverage,
    slow: SimpleMovingAverage,
    slow_period: usize,
    seen: usize,
    prev_diff: Option<f64>,
}

impl MaCrossoverGenerator {
    fn new(fast: usize, slow: usize) -> Self {
        Self {
            fast: SimpleMovingAverage::new(fast).expect("Invalid fast MA period"),
            slow: SimpleMovingAverage::new(slow).expect("Invalid slow MA period"),
            slow_period: slow,
            seen: 0,
            prev_diff: None,
        }
    }
}

impl SignalGenerator for MaCrossoverGenerator {
    fn on_value(&mut self, value: f64) -> Signal {
        let fast = self.fast.next(value);
        let slow = self.slow.next(value);
        self.seen += 1;

        let diff = fast - slow;
        let signal = match self.prev_diff {
            Some(prev) if self.seen > self.slow_period => {
                if prev <= 0.0 && diff > 0.0 {
                    Signal::Buy
                } else if prev >= 0.0 && diff < 0.0 {
                    Signal::Sell
                } else {
                    Signal::Hold
                }
            }
            _ => Signal::Hold,
        };
        self.prev_diff = Some(diff);
        signal
    }
}

// ============================================================================
// Channel breakout
// ============================================================================

struct BreakoutGenerator {
    max: Maximum,
    min: Minimum,
    lookback: usize,
    margin: f64,
    seen: usize,
    prev_high: f64,
    prev_low: f64,
}

impl BreakoutGenerator {
    fn new(lookback: usize, margin: f64) -> Self {
        Self {
            max: Maximum::new(lookback).expect("Invalid breakout lookback"),
            min: Minimum::new(lookback).expect("Invalid breakout lookback"),
            lookback,
            margin,
            seen: 0,
            prev_high: 0.0,
            prev_low: 0.0,
        }
    }
}

impl SignalGenerator for BreakoutGenerator {
    fn on_value(&mut self, value: f64) -> Signal {
        // Compare against the channel formed by earlier points, then fold
        // the current point into the window.
        let signal = if self.seen >= self.lookback {
            if value > self.prev_high * (1.0 + self.margin) {
                Signal::Buy
            } else if value < self.prev_low * (1.0 - self.margin) {
                Signal::Sell
            } else {
                Signal::Hold
            }
        } else {
            Signal::Hold
        };

        self.prev_high = self.max.next(value);
        self.prev_low = self.min.next(value);
        self.seen += 1;
        signal
    }
}

// ============================================================================
// RSI momentum reversal
// ============================================================================

struct MomentumReversalGenerator {
    rsi: RelativeStrengthIndex,
    period: usize,
    overbought: f64,
    oversold: f64,
    seen: usize,
}

impl MomentumReversalGenerator {
    fn new(period: usize, overbought: f64, oversold: f64) -> Self {
        Self {
            rsi: RelativeStrengthIndex::new(period).expect("Invalid RSI period"),
            period,
            overbought,
            oversold,
            seen: 0,
        }
    }
}

impl SignalGenerator for MomentumReversalGenerator {
    fn on_value(&mut self, value: f64) -> Signal {
        let rsi = self.rsi.next(value);
        self.seen += 1;
        if self.seen <= self.period {
            return Signal::Hold;
        }
        if rsi < self.oversold {
            Signal::Buy
        } else if rsi > self.overbought {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }
}

// ============================================================================
// Z-score mean reversion
// ============================================================================

struct MeanReversionGenerator {
    ma: SimpleMovingAverage,
    sd: StandardDeviation,
    period: usize,
    z_entry: f64,
    seen: usize,
}

impl MeanReversionGenerator {
    fn new(period: usize, z_entry: f64) -> Self {
        Self {
            ma: SimpleMovingAverage::new(period).expect("Invalid mean reversion period"),
            sd: StandardDeviation::new(period).expect("Invalid mean reversion period"),
            period,
            z_entry,
            seen: 0,
        }
    }
}

impl SignalGenerator for MeanReversionGenerator {
    fn on_value(&mut self, value: f64) -> Signal {
        let ma = self.ma.next(value);
        let sd = self.sd.next(value);
        self.seen += 1;
        if self.seen <= self.period || sd < f64::EPSILON {
            return Signal::Hold;
        }
        let z = (value - ma) / sd;
        if z <= -self.z_entry {
            Signal::Buy
        } else if z >= self.z_entry {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }
}

// ============================================================================
// Volatility squeeze breakout
// ============================================================================

/// Widths averaged over this many preceding bars to detect contraction
const SQUEEZE_WIDTH_WINDOW: usize = 5;

struct VolatilitySqueezeGenerator {
    bb: BollingerBands,
    period: usize,
    squeeze_ratio: f64,
    seen: usize,
    prev_upper: f64,
    prev_lower: f64,
    prev_width: f64,
    recent_widths: VecDeque<f64>,
}

impl VolatilitySqueezeGenerator {
    fn new(period: usize, multiplier: f64, squeeze_ratio: f64) -> Self {
        Self {
            bb: BollingerBands::new(period, multiplier).expect("Invalid BB params"),
            period,
            squeeze_ratio,
            seen: 0,
            prev_upper: 0.0,
            prev_lower: 0.0,
            prev_width: 0.0,
            recent_widths: VecDeque::with_capacity(SQUEEZE_WIDTH_WINDOW),
        }
    }
}

impl SignalGenerator for VolatilitySqueezeGenerator {
    fn on_value(&mut self, value: f64) -> Signal {
        // Squeeze and breakout are judged against the bands formed by
        // earlier points, before this one widens them.
        let mut signal = Signal::Hold;
        if self.seen > self.period + SQUEEZE_WIDTH_WINDOW && !self.recent_widths.is_empty() {
            let avg_width = self.recent_widths.iter().sum::<f64>()
                / self.recent_widths.len() as f64;
            if avg_width > 0.0 && self.prev_width < avg_width * self.squeeze_ratio {
                if value > self.prev_upper {
                    signal = Signal::Buy;
                } else if value < self.prev_lower {
                    signal = Signal::Sell;
                }
            }
        }

        let out = self.bb.next(value);
        self.seen += 1;
        let width = if out.average > 0.0 {
            (out.upper - out.lower) / out.average
        } else {
            0.0
        };
        self.recent_widths.push_back(self.prev_width);
        if self.recent_widths.len() > SQUEEZE_WIDTH_WINDOW {
            self.recent_widths.pop_front();
        }
        self.prev_upper = out.upper;
        self.prev_lower = out.lower;
        self.prev_width = width;
        signal
    }
}
