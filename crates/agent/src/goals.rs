//! Goal manager — the prioritized research agenda
//!
//! Goals are declared in a human-editable `goals.json`; statuses move
//! through a one-way lifecycle (blocked is the single recoverable detour)
//! and survive restarts via the agent snapshot.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GoalError {
    #[error("unknown goal: {0}")]
    UnknownGoal(String),

    #[error("invalid status transition for {goal_id}: {from} -> {to}")]
    InvalidTransition {
        goal_id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("could not import goals file: {0}")]
    Import(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalPriority {
    High,
    Medium,
    Low,
}

impl GoalPriority {
    /// Lower rank = more urgent; used as a sort key.
    fn rank(&self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    NotStarted,
    InProgress,
    Blocked,
    Completed,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    MarketAnalysis,
    TrendAnalysis,
    StrategyDevelopment,
}

impl GoalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarketAnalysis => "market_analysis",
            Self::TrendAnalysis => "trend_analysis",
            Self::StrategyDevelopment => "strategy_development",
        }
    }

    /// Whether working this goal spends money on a fresh observation.
    /// Strategy synthesis replays what is already stored.
    pub fn requires_fresh_data(&self) -> bool {
        !matches!(self, Self::StrategyDevelopment)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub title: String,
    pub goal_type: GoalType,
    pub priority: GoalPriority,
    #[serde(default = "default_status")]
    pub status: GoalStatus,
    pub objective: String,
    #[serde(default)]
    pub target_metrics: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Completion threshold for data-gathering goals
    #[serde(default)]
    pub target_samples: Option<usize>,
    #[serde(default)]
    pub blocked_reason: Option<String>,
}

fn default_status() -> GoalStatus {
    GoalStatus::NotStarted
}

#[derive(Deserialize)]
struct GoalsFile {
    goals: Vec<Goal>,
}

/// Holds the agenda in declaration order; declaration order is the
/// tie-breaker for equal priorities.
#[derive(Debug, Clone)]
pub struct GoalManager {
    goals: Vec<Goal>,
}

impl GoalManager {
    pub fn new(goals: Vec<Goal>) -> Self {
        Self { goals }
    }

    /// Import goals from `goals.json` if present, otherwise start from the
    /// built-in agenda. A present-but-corrupt file is an error: silently
    /// replacing a hand-edited agenda would be worse than stopping.
    pub fn load(path: &Path) -> Result<Self, GoalError> {
        if !path.exists() {
            info!(path = %path.display(), "No goals file, using default agenda");
            return Ok(Self::new(default_goals()));
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| GoalError::Import(format!("{}: {e}", path.display())))?;
        let file: GoalsFile = serde_json::from_str(&raw)
            .map_err(|e| GoalError::Import(format!("{}: {e}", path.display())))?;
        if file.goals.is_empty() {
            return Err(GoalError::Import(format!(
                "{}: no goals declared",
                path.display()
            )));
        }
        info!(path = %path.display(), count = file.goals.len(), "Goals imported");
        Ok(Self::new(file.goals))
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn get(&self, id: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == id)
    }

    fn is_completed(&self, id: &str) -> bool {
        self.get(id).map(|g| g.status == GoalStatus::Completed).unwrap_or(false)
    }

    fn deps_completed(&self, goal: &Goal) -> bool {
        goal.depends_on.iter().all(|dep| self.is_completed(dep))
    }

    /// The next goal to work: highest priority among not_started and
    /// in_progress goals whose dependencies are all completed. Ties go to
    /// the earliest declared goal.
    pub fn next_goal(&self) -> Option<&Goal> {
        self.goals
            .iter()
            .filter(|g| {
                matches!(g.status, GoalStatus::NotStarted | GoalStatus::InProgress)
                    && self.deps_completed(g)
            })
            .min_by_key(|g| g.priority.rank())
    }

    /// Apply a status change, enforcing the lifecycle: completed is
    /// terminal, nothing returns to not_started, and blocked -> in_progress
    /// is the only backward move.
    pub fn mark_progress(&mut self, id: &str, to: GoalStatus) -> Result<(), GoalError> {
        let goal = self
            .goals
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| GoalError::UnknownGoal(id.to_string()))?;

        let from = goal.status;
        let allowed = from == to
            || match (from, to) {
                (GoalStatus::Completed, _) => false,
                (_, GoalStatus::NotStarted) => false,
                _ => true,
            };
        if !allowed {
            return Err(GoalError::InvalidTransition {
                goal_id: id.to_string(),
                from: from.as_str(),
                to: to.as_str(),
            });
        }

        if from != to {
            debug!(goal_id = id, from = from.as_str(), to = to.as_str(), "Goal transition");
        }
        goal.status = to;
        if to != GoalStatus::Blocked {
            goal.blocked_reason = None;
        }
        Ok(())
    }

    /// Block a goal with a human-readable reason
    pub fn block(&mut self, id: &str, reason: String) -> Result<(), GoalError> {
        self.mark_progress(id, GoalStatus::Blocked)?;
        if let Some(goal) = self.goals.iter_mut().find(|g| g.id == id) {
            warn!(goal_id = id, reason = %reason, "Goal blocked");
            goal.blocked_reason = Some(reason);
        }
        Ok(())
    }

    /// Block every active goal waiting on an incomplete dependency,
    /// naming the dependency in the reason so status reports surface it.
    /// Returns what was blocked; [`Self::unblock_ready`] is the inverse
    /// once the dependency completes.
    pub fn block_dependency_starved(&mut self) -> Result<Vec<(String, String)>, GoalError> {
        let starved: Vec<(String, String)> = self
            .goals
            .iter()
            .filter(|g| matches!(g.status, GoalStatus::NotStarted | GoalStatus::InProgress))
            .filter_map(|g| {
                g.depends_on
                    .iter()
                    .find(|dep| !self.is_completed(dep.as_str()))
                    .map(|dep| {
                        (
                            g.id.clone(),
                            format!("waiting on incomplete dependency: {dep}"),
                        )
                    })
            })
            .collect();

        for (id, reason) in &starved {
            self.block(id, reason.clone())?;
        }
        Ok(starved)
    }

    /// Re-activate blocked goals whose blocking condition has cleared:
    /// dependencies completed, and (for strategy goals) enough samples
    /// accumulated. Runs at the top of every cycle.
    pub fn unblock_ready(&mut self, sample_count: usize, min_samples: usize) {
        let ids: Vec<String> = self
            .goals
            .iter()
            .filter(|g| g.status == GoalStatus::Blocked)
            .filter(|g| self.deps_completed(g))
            .filter(|g| {
                g.goal_type != GoalType::StrategyDevelopment || sample_count >= min_samples
            })
            .map(|g| g.id.clone())
            .collect();

        for id in ids {
            info!(goal_id = %id, "Goal unblocked");
            // Transition is always legal from Blocked
            let _ = self.mark_progress(&id, GoalStatus::InProgress);
        }
    }

    /// Overlay statuses from a restored snapshot onto the declared agenda.
    /// Goals added to the file since the snapshot keep their declared
    /// status; snapshot-only goals are dropped with a warning.
    pub fn restore(&mut self, snapshot: &[Goal]) {
        for restored in snapshot {
            match self.goals.iter_mut().find(|g| g.id == restored.id) {
                Some(goal) => {
                    goal.status = restored.status;
                    goal.blocked_reason = restored.blocked_reason.clone();
                }
                None => {
                    warn!(goal_id = %restored.id, "Snapshot goal no longer declared, dropping");
                }
            }
        }
    }
}

/// The built-in agenda used when no goals.json exists
pub fn default_goals() -> Vec<Goal> {
    vec![
        Goal {
            id: "goal_001".to_string(),
            title: "Track SOL market price".to_string(),
            goal_type: GoalType::MarketAnalysis,
            priority: GoalPriority::High,
            status: GoalStatus::NotStarted,
            objective: "Accumulate a continuous SOL/USD price series from the metered feed"
                .to_string(),
            target_metrics: vec!["price".to_string(), "sample_count".to_string()],
            depends_on: vec![],
            target_samples: Some(100),
            blocked_reason: None,
        },
        Goal {
            id: "goal_002".to_string(),
            title: "Characterize short-term trend structure".to_string(),
            goal_type: GoalType::TrendAnalysis,
            priority: GoalPriority::Medium,
            status: GoalStatus::NotStarted,
            objective: "Keep observing price action to expose trend and reversal structure"
                .to_string(),
            target_metrics: vec!["price_change_pct".to_string()],
            depends_on: vec![],
            target_samples: None,
            blocked_reason: None,
        },
        Goal {
            id: "goal_003".to_string(),
            title: "Develop and backtest trading heuristics".to_string(),
            goal_type: GoalType::StrategyDevelopment,
            priority: GoalPriority::High,
            status: GoalStatus::NotStarted,
            objective: "Propose rule-based strategies and score them against accumulated history"
                .to_string(),
            target_metrics: vec![
                "win_rate".to_string(),
                "profit_factor".to_string(),
                "total_return".to_string(),
            ],
            depends_on: vec!["goal_001".to_string()],
            target_samples: None,
            blocked_reason: None,
        },
    ]
}
