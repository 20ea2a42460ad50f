//! The research loop
//!
//! Each cycle: unblock goals whose conditions cleared, pick the highest
//! priority eligible goal, make at most one metered purchase for it, run
//! strategy synthesis when enough real data has accumulated, record a
//! finding, and atomically snapshot state. Errors inside a cycle degrade
//! to a skipped step; only payment failures and storage faults stop the
//! loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{error, info, warn};

use engine::{
    propose, rank, BacktestEngine, EngineError, PricePoint, PriceSource, PriceStore,
    ProposalConfig, StrategyResult,
};
use persistence::repository::{
    FindingRecord, FindingsRepository, ParameterTemplate, PatternRepository, PriceRepository,
    PriceRow, StrategyRepository, StrategyRow,
};
use persistence::{Database, SqlitePool};

use crate::config::AgentConfig;
use crate::gateway::{GatewayError, MeteredGateway, PurchaseReceipt};
use crate::goals::{Goal, GoalManager, GoalStatus, GoalType};
use crate::narrator::{NarrationError, Narrator};
use crate::state::{AgentState, StateManager};

/// What one cycle did, for logging and tests
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub goal_id: Option<String>,
    pub purchased: bool,
    pub top_strategy: Option<String>,
    /// Goals blocked during selection this cycle, with reasons
    pub blocked: Vec<(String, String)>,
}

pub struct Orchestrator {
    config: AgentConfig,
    gateway: Arc<dyn MeteredGateway>,
    narrator: Option<Arc<dyn Narrator>>,
    goals: GoalManager,
    store: PriceStore,
    state: AgentState,
    state_manager: StateManager,
    pool: SqlitePool,
}

impl Orchestrator {
    /// Restore goals, snapshot, and the persisted price series, then hand
    /// back a loop ready to run.
    pub async fn bootstrap(
        config: AgentConfig,
        gateway: Arc<dyn MeteredGateway>,
        narrator: Option<Arc<dyn Narrator>>,
        db: &Database,
    ) -> Result<Self> {
        let mut goals = GoalManager::load(&config.goals_path())?;
        let state_manager = StateManager::new(config.state_path());
        let state = state_manager.load(goals.goals().to_vec());
        goals.restore(&state.goals);

        let pool = db.pool_clone();
        let mut store = PriceStore::new();
        for row in PriceRepository::new(&pool).load_all().await? {
            match row.value.parse::<Decimal>() {
                Ok(value) => {
                    let source = match row.source.as_str() {
                        "purchased" => PriceSource::Purchased,
                        _ => PriceSource::Replay,
                    };
                    if let Err(e) = store.append(PricePoint {
                        timestamp: row.timestamp,
                        value,
                        source,
                    }) {
                        warn!(error = %e, "Skipping stored price point");
                    }
                }
                Err(_) => warn!(
                    timestamp = row.timestamp,
                    value = %row.value,
                    "Skipping unparseable stored price"
                ),
            }
        }

        info!(
            cycle_count = state.cycle_count,
            samples = store.len(),
            cumulative_spend = %state.cumulative_spend,
            "Orchestrator bootstrapped"
        );
        Ok(Self {
            config,
            gateway,
            narrator,
            goals,
            store,
            state,
            state_manager,
            pool,
        })
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn store(&self) -> &PriceStore {
        &self.store
    }

    pub fn goals(&self) -> &GoalManager {
        &self.goals
    }

    /// Run cycles until shutdown, the cycle limit, or the spend ceiling.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, stopping after snapshot");
                break;
            }
            if self.state.cumulative_spend + self.config.item_price > self.config.max_spend {
                info!(
                    spent = %self.state.cumulative_spend,
                    ceiling = %self.config.max_spend,
                    "Spend ceiling reached, stopping"
                );
                break;
            }

            let report = self.run_cycle().await?;
            info!(
                cycle = report.cycle,
                goal = report.goal_id.as_deref().unwrap_or("-"),
                purchased = report.purchased,
                top_strategy = report.top_strategy.as_deref().unwrap_or("-"),
                "Cycle complete"
            );

            if let Some(max) = self.config.max_cycles {
                if self.state.cycle_count >= max {
                    info!(max, "Cycle limit reached");
                    break;
                }
            }
            self.sleep_between_cycles(&shutdown).await;
        }
        Ok(())
    }

    /// Interval sleep, sliced so shutdown stays responsive.
    async fn sleep_between_cycles(&self, shutdown: &AtomicBool) {
        let step = Duration::from_millis(500);
        let mut remaining = self.config.loop_interval;
        while !remaining.is_zero() && !shutdown.load(Ordering::Relaxed) {
            let chunk = remaining.min(step);
            tokio::time::sleep(chunk).await;
            remaining = remaining.saturating_sub(chunk);
        }
    }

    /// One full cycle. Returns Err only on faults that must stop the loop
    /// (payment rejection, storage failure); everything softer is logged
    /// and the cycle still completes with its snapshot written.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let cycle = self.state.cycle_count + 1;
        self.goals
            .unblock_ready(self.store.len(), self.config.min_samples);

        // Goals waiting on an incomplete dependency are blocked up front
        // with the dependency named, so status reports carry the reason.
        // The unblock pass above reverses this once the dependency lands.
        let mut blocked: Vec<(String, String)> = self.goals.block_dependency_starved()?;

        // Selection may block further goals on the way to an eligible one:
        // a strategy goal short on samples records its reason and yields
        // to the next candidate in the same cycle.
        let selected: Option<Goal> = loop {
            let candidate = match self.goals.next_goal() {
                None => break None,
                Some(g) => g.clone(),
            };
            if candidate.goal_type == GoalType::StrategyDevelopment
                && !self.store.has_minimum(self.config.min_samples)
            {
                let reason = EngineError::InsufficientData {
                    have: self.store.len(),
                    need: self.config.min_samples,
                }
                .to_string();
                self.goals.block(&candidate.id, reason.clone())?;
                blocked.push((candidate.id, reason));
                continue;
            }
            break Some(candidate);
        };

        let Some(goal) = selected else {
            info!(cycle, "No eligible goal");
            self.finish_cycle(cycle)?;
            return Ok(CycleReport {
                cycle,
                goal_id: None,
                purchased: false,
                top_strategy: None,
                blocked,
            });
        };

        info!(cycle, goal_id = %goal.id, goal_type = goal.goal_type.as_str(), "Working goal");
        if goal.status == GoalStatus::NotStarted {
            self.goals.mark_progress(&goal.id, GoalStatus::InProgress)?;
        }

        let mut purchased: Option<PricePoint> = None;
        if goal.goal_type.requires_fresh_data() {
            purchased = self.acquire_observation(&goal).await?;
        }

        let mut top: Option<StrategyResult> = None;
        if goal.goal_type == GoalType::StrategyDevelopment {
            top = self.synthesize_strategies().await?;
        }

        self.check_completion(&goal, top.as_ref())?;

        if purchased.is_some() || top.is_some() {
            let summary = cycle_summary(cycle, &goal, purchased.as_ref(), top.as_ref());
            let commentary = self.narrate(&summary).await;
            FindingsRepository::new(&self.pool)
                .insert(&FindingRecord {
                    cycle: cycle as i64,
                    created_at: Utc::now().timestamp_millis(),
                    goal_id: goal.id.clone(),
                    price_timestamp: purchased.as_ref().map(|p| p.timestamp),
                    price_value: purchased.as_ref().map(|p| p.value.to_string()),
                    strategy_json: top.as_ref().and_then(|t| serde_json::to_string(t).ok()),
                    commentary,
                })
                .await?;
        }

        self.finish_cycle(cycle)?;
        Ok(CycleReport {
            cycle,
            goal_id: Some(goal.id),
            purchased: purchased.is_some(),
            top_strategy: top.map(|t| t.strategy_id),
            blocked,
        })
    }

    /// Make the cycle's single metered purchase and fold the result into
    /// the store and knowledge base. Ok(None) means the cycle goes without
    /// a new observation; Err means the loop must stop.
    async fn acquire_observation(&mut self, goal: &Goal) -> Result<Option<PricePoint>> {
        let goal_type = goal.goal_type.as_str();
        let patterns = PatternRepository::new(&self.pool);
        let template = match patterns.recommend(goal_type).await? {
            Some(t) => t,
            None => self.default_template(),
        };

        let receipt = match self.purchase_with_retry(&template).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => {
                patterns.record_failure(goal_type, &template);
                return Ok(None);
            }
            Err(e) => {
                error!(error = %e, "Payment failure, stopping");
                return Err(e.into());
            }
        };

        // The gateway's reported charge is authoritative, even when the
        // payload turns out to be unusable.
        self.state.cumulative_spend += receipt.cost_charged;
        info!(
            cost = %receipt.cost_charged,
            cumulative_spend = %self.state.cumulative_spend,
            "Charge recorded"
        );

        let point = match receipt.price_point() {
            Ok(point) => point,
            Err(e) => {
                warn!(error = %e, "Charged but payload unusable");
                patterns.record_failure(goal_type, &template);
                return Ok(None);
            }
        };

        match self.store.append(point.clone()) {
            Ok(()) => {
                PriceRepository::new(&self.pool)
                    .insert(&PriceRow {
                        timestamp: point.timestamp,
                        value: point.value.to_string(),
                        source: point.source.as_str().to_string(),
                    })
                    .await?;
                patterns.record_success(goal_type, &template).await?;
                Ok(Some(point))
            }
            Err(e) => {
                // Duplicate or invalid observation: money spent, nothing
                // learned. The stored series stays untouched.
                warn!(error = %e, "Purchased point discarded");
                patterns.record_failure(goal_type, &template);
                Ok(None)
            }
        }
    }

    async fn purchase_with_retry(
        &self,
        template: &ParameterTemplate,
    ) -> Result<Option<PurchaseReceipt>, GatewayError> {
        let mut attempt: u32 = 0;
        loop {
            let outcome = match tokio::time::timeout(
                self.config.purchase_timeout,
                self.gateway.purchase(
                    &self.config.item_id,
                    template,
                    self.config.item_price,
                    &self.config.payment_method,
                ),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout),
            };

            match outcome {
                Ok(receipt) => return Ok(Some(receipt)),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let backoff = self.config.retry_backoff * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(error = %e, attempt, backoff_ms = backoff.as_millis() as u64, "Purchase retry");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!(error = %e, "Purchase abandoned for this cycle");
                    return Ok(None);
                }
            }
        }
    }

    /// Propose, backtest, rank, and persist strategy results against the
    /// purchased series. Returns the top-ranked result.
    async fn synthesize_strategies(&mut self) -> Result<Option<StrategyResult>> {
        let proposal_config = ProposalConfig {
            min_samples: self.config.min_samples,
            exploration: self.config.exploration,
            seed: self.config.proposal_seed,
        };
        let candidates = match propose(&self.store, &proposal_config) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "Proposal refused");
                return Ok(None);
            }
        };

        let series = self.store.purchased_series();
        let repo = StrategyRepository::new(&self.pool);
        let now = Utc::now().timestamp_millis();

        let mut results = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let version = repo.next_version(&candidate.strategy_id).await? as u32;
            results.push(BacktestEngine::run(candidate, &series, version));
        }

        let ranked = rank(results);
        for result in &ranked {
            repo.insert(&strategy_row(result, now)).await?;
            repo.archive_superseded(&result.strategy_id, result.version as i64)
                .await?;
        }

        let top = ranked.into_iter().next();
        if let Some(t) = &top {
            info!(
                strategy_id = %t.strategy_id,
                version = t.version,
                total_return = t.metrics.total_return,
                win_rate = t.metrics.win_rate,
                trade_count = t.metrics.trade_count,
                "Top strategy"
            );
        }
        Ok(top)
    }

    fn check_completion(&mut self, goal: &Goal, top: Option<&StrategyResult>) -> Result<()> {
        let done = match goal.goal_type {
            GoalType::StrategyDevelopment => top
                .map(|t| t.metrics.trade_count > 0)
                .unwrap_or(false),
            _ => goal
                .target_samples
                .map(|n| self.store.len() >= n)
                .unwrap_or(false),
        };
        if done {
            info!(goal_id = %goal.id, "Goal completed");
            self.goals.mark_progress(&goal.id, GoalStatus::Completed)?;
        }
        Ok(())
    }

    async fn narrate(&self, summary: &str) -> Option<String> {
        let narrator = self.narrator.as_ref()?;
        let outcome =
            match tokio::time::timeout(self.config.narration_timeout, narrator.narrate(summary))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(NarrationError::Timeout),
            };
        match outcome {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "Narration failed, continuing without commentary");
                None
            }
        }
    }

    fn default_template(&self) -> ParameterTemplate {
        let mut template = ParameterTemplate::new();
        template.insert(
            "token_address".to_string(),
            json!(self.config.token_address),
        );
        template
    }

    /// Advance the cycle counter and write the snapshot. Runs on every
    /// cycle, including idle and failed ones.
    fn finish_cycle(&mut self, cycle: u64) -> Result<()> {
        self.state.cycle_count = cycle;
        self.state.last_run = Some(Utc::now());
        self.state.goals = self.goals.goals().to_vec();
        self.state_manager.save(&self.state)?;
        Ok(())
    }
}

fn strategy_row(result: &StrategyResult, created_at: i64) -> StrategyRow {
    StrategyRow {
        strategy_id: result.strategy_id.clone(),
        version: result.version as i64,
        parameters: result.parameters.to_string(),
        win_rate: result.metrics.win_rate,
        profit_factor: result.metrics.profit_factor,
        total_return: result.metrics.total_return,
        trade_count: result.metrics.trade_count as i64,
        status: result.status.as_str().to_string(),
        created_at,
    }
}

fn cycle_summary(
    cycle: u64,
    goal: &Goal,
    purchased: Option<&PricePoint>,
    top: Option<&StrategyResult>,
) -> String {
    let mut parts = vec![format!("cycle {cycle}: {}", goal.title)];
    if let Some(p) = purchased {
        parts.push(format!("observed price {} at {}", p.value, p.timestamp));
    }
    if let Some(t) = top {
        parts.push(format!(
            "top strategy {} v{} returned {:.4}",
            t.strategy_id, t.version, t.metrics.total_return
        ));
    }
    parts.join("; ")
}
