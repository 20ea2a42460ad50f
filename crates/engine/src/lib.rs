//! Sol-Scout Engine — price series storage, candidate generation, and backtesting
//!
//! Self-contained crate providing:
//! - Append-only, deduplicated price store with provenance tags
//! - Signal rules (MA crossover, breakout, RSI reversal, mean reversion,
//!   volatility squeeze)
//! - Deterministic candidate proposal (fixed grid + seeded exploration)
//! - Chronological backtest replay with JSON-safe metric output

pub mod backtest;
pub mod proposal;
pub mod signals;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use backtest::{rank, BacktestEngine};
pub use proposal::{propose, ProposalConfig};
pub use signals::{build_generator, Signal, SignalGenerator, SignalRule};
pub use store::{EngineError, PriceStore};
pub use types::*;
