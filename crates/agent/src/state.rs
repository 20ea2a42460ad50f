//! Agent snapshot — small JSON file, atomically replaced every cycle
//!
//! The snapshot is the resume point and the supervisor surface: cycle
//! count, cumulative spend, and goal statuses. Unbounded history lives in
//! the knowledge base, never here.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::goals::Goal;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("corrupt state snapshot: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub cycle_count: u64,
    /// Sum of gateway-reported charges, in USDC
    pub cumulative_spend: Decimal,
    pub last_run: Option<DateTime<Utc>>,
    pub goals: Vec<Goal>,
}

impl AgentState {
    pub fn fresh(goals: Vec<Goal>) -> Self {
        Self {
            cycle_count: 0,
            cumulative_spend: Decimal::ZERO,
            last_run: None,
            goals,
        }
    }
}

pub struct StateManager {
    path: PathBuf,
}

impl StateManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_load(&self) -> Result<AgentState, StateError> {
        let raw = std::fs::read_to_string(&self.path)?;
        let state: AgentState =
            serde_json::from_str(&raw).map_err(|e| StateError::Corrupt(e.to_string()))?;
        if state.cumulative_spend < Decimal::ZERO {
            return Err(StateError::Corrupt(format!(
                "negative cumulative_spend: {}",
                state.cumulative_spend
            )));
        }
        Ok(state)
    }

    /// Restore the previous snapshot, or start fresh when there is none.
    /// A corrupt snapshot is logged and replaced with a fresh state rather
    /// than crashing the loop; the knowledge base still holds the history.
    pub fn load(&self, default_goals: Vec<Goal>) -> AgentState {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No snapshot, starting fresh");
            return AgentState::fresh(default_goals);
        }
        match self.try_load() {
            Ok(state) => {
                info!(
                    cycle_count = state.cycle_count,
                    cumulative_spend = %state.cumulative_spend,
                    "Snapshot restored"
                );
                state
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Snapshot unreadable, starting fresh");
                AgentState::fresh(default_goals)
            }
        }
    }

    /// Write the snapshot atomically: serialize to a sibling temp file,
    /// then rename over the target. A crash mid-write leaves the previous
    /// snapshot intact.
    pub fn save(&self, state: &AgentState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::Corrupt(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goals::default_goals;
    use rust_decimal_macros::dec;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StateManager::new(dir.path().join("state.json"));

        let mut state = AgentState::fresh(default_goals());
        state.cycle_count = 42;
        state.cumulative_spend = dec!(0.042);
        state.last_run = Some(Utc::now());
        manager.save(&state).unwrap();

        let loaded = manager.load(vec![]);
        assert_eq!(loaded, state);
        // Temp file must not linger after the rename
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn missing_snapshot_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StateManager::new(dir.path().join("state.json"));

        let state = manager.load(default_goals());
        assert_eq!(state.cycle_count, 0);
        assert_eq!(state.cumulative_spend, Decimal::ZERO);
        assert_eq!(state.goals.len(), 3);
    }

    #[test]
    fn corrupt_snapshot_falls_back_to_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{\"cycle_count\": \"not a number\"").unwrap();

        let manager = StateManager::new(&path);
        let state = manager.load(default_goals());
        assert_eq!(state.cycle_count, 0);
    }

    #[test]
    fn negative_spend_is_treated_as_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut bad = AgentState::fresh(vec![]);
        bad.cumulative_spend = dec!(-1);
        std::fs::write(&path, serde_json::to_string(&bad).unwrap()).unwrap();

        let state = StateManager::new(&path).load(default_goals());
        assert_eq!(state.cumulative_spend, Decimal::ZERO);
        assert_eq!(state.goals.len(), 3);
    }
}
