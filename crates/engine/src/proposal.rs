//! Candidate generation — deterministic given the same series and config
//!
//! A fixed grid of known-reasonable parameterizations is always proposed
//! first, followed by seeded-RNG exploration variants. The seed is explicit
//! config and is recorded on every exploration candidate, so a proposal run
//! can be reproduced exactly.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::signals::SignalRule;
use crate::store::{EngineError, PriceStore};
use crate::types::CandidateStrategy;

/// Configuration for one proposal run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalConfig {
    /// Minimum stored observations before synthesis is permitted.
    pub min_samples: usize,
    /// Number of seeded exploration candidates on top of the fixed grid.
    pub exploration: usize,
    pub seed: u64,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            min_samples: 100,
            exploration: 4,
            seed: 42,
        }
    }
}

/// The always-proposed baseline grid
fn fixed_grid() -> Vec<SignalRule> {
    vec![
        SignalRule::MaCrossover { fast: 5, slow: 15 },
        SignalRule::MaCrossover { fast: 10, slow: 30 },
        SignalRule::Breakout {
            lookback: 20,
            margin: 0.01,
        },
        SignalRule::MomentumReversal {
            rsi_period: 14,
            overbought: 70.0,
            oversold: 30.0,
        },
        SignalRule::MeanReversion {
            period: 20,
            z_entry: 2.0,
        },
        SignalRule::MeanReversion {
            period: 50,
            z_entry: 2.0,
        },
        SignalRule::VolatilitySqueeze {
            period: 20,
            multiplier: 2.0,
            squeeze_ratio: 0.7,
        },
    ]
}

fn random_rule(rng: &mut StdRng) -> SignalRule {
    match rng.gen_range(0..5) {
        0 => {
            let fast = rng.gen_range(3..=12);
            let slow = rng.gen_range((fast + 3)..=40);
            SignalRule::MaCrossover { fast, slow }
        }
        1 => SignalRule::Breakout {
            lookback: rng.gen_range(10..=40),
            margin: rng.gen_range(0.005..=0.03),
        },
        2 => SignalRule::MomentumReversal {
            rsi_period: rng.gen_range(7..=21),
            overbought: rng.gen_range(65.0..=80.0),
            oversold: rng.gen_range(20.0..=35.0),
        },
        3 => SignalRule::MeanReversion {
            period: rng.gen_range(15..=60),
            z_entry: rng.gen_range(1.5..=3.0),
        },
        _ => SignalRule::VolatilitySqueeze {
            period: rng.gen_range(15..=30),
            multiplier: rng.gen_range(1.5..=2.5),
            squeeze_ratio: rng.gen_range(0.6..=0.8),
        },
    }
}

/// Generate the ordered candidate set for a series.
///
/// Refuses with [`EngineError::InsufficientData`] below `min_samples`;
/// there is no fallback that invents observations.
pub fn propose(
    store: &PriceStore,
    config: &ProposalConfig,
) -> Result<Vec<CandidateStrategy>, EngineError> {
    store.require_minimum(config.min_samples)?;

    let mut candidates: Vec<CandidateStrategy> =
        fixed_grid().into_iter().map(CandidateStrategy::from_rule).collect();

    let mut rng = StdRng::seed_from_u64(config.seed);
    for _ in 0..config.exploration {
        let rule = random_rule(&mut rng);
        let candidate = CandidateStrategy::explored(rule, config.seed);
        // Fixed-grid parameterizations win on id collision
        if candidates
            .iter()
            .all(|c| c.strategy_id != candidate.strategy_id)
        {
            candidates.push(candidate);
        }
    }

    debug!(
        count = candidates.len(),
        seed = config.seed,
        samples = store.len(),
        "Candidate set proposed"
    );
    Ok(candidates)
}
