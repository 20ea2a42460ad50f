//! Runtime configuration, resolved from CLI flags and SOL_SCOUT_* env vars

use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Everything the loop needs to run. CLI flags override env vars, env
/// vars override defaults.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub data_dir: PathBuf,

    /// Pause between cycles
    pub loop_interval: Duration,
    /// Samples required before strategy synthesis is allowed
    pub min_samples: usize,
    /// Stop after this many total cycles; None runs until shutdown
    pub max_cycles: Option<u64>,

    pub gateway_url: String,
    pub item_id: String,
    /// Quoted per-call price, in USDC
    pub item_price: Decimal,
    pub payment_method: String,
    /// Token the default query template asks about
    pub token_address: String,

    /// Hard ceiling on cumulative spend; the loop stops cleanly at it
    pub max_spend: Decimal,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub purchase_timeout: Duration,
    pub narration_timeout: Duration,

    /// Exploration candidates per proposal round, and their RNG seed
    pub exploration: usize,
    pub proposal_seed: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            loop_interval: Duration::from_secs(300),
            min_samples: 100,
            max_cycles: None,
            gateway_url: "https://mcp.fluora.ai/solana-price".to_string(),
            item_id: "sol-usd-spot".to_string(),
            item_price: dec!(0.001),
            payment_method: "usdc-solana".to_string(),
            token_address: "So11111111111111111111111111111111111111112".to_string(),
            max_spend: dec!(1.00),
            max_retries: 3,
            retry_backoff: Duration::from_secs(2),
            purchase_timeout: Duration::from_secs(30),
            narration_timeout: Duration::from_secs(10),
            exploration: 4,
            proposal_seed: 42,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl AgentConfig {
    /// Defaults overlaid with SOL_SCOUT_* environment variables.
    /// Unparseable values fall back to the default rather than erroring:
    /// the authoritative knobs are the CLI flags.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(dir) = env_var("SOL_SCOUT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = env_var("SOL_SCOUT_GATEWAY_URL") {
            config.gateway_url = url;
        }
        if let Some(item) = env_var("SOL_SCOUT_ITEM_ID") {
            config.item_id = item;
        }
        if let Some(price) = env_var("SOL_SCOUT_ITEM_PRICE").and_then(|v| v.parse().ok()) {
            config.item_price = price;
        }
        if let Some(method) = env_var("SOL_SCOUT_PAYMENT_METHOD") {
            config.payment_method = method;
        }
        if let Some(token) = env_var("SOL_SCOUT_TOKEN_ADDRESS") {
            config.token_address = token;
        }
        if let Some(ceiling) = env_var("SOL_SCOUT_MAX_SPEND").and_then(|v| v.parse().ok()) {
            config.max_spend = ceiling;
        }

        config
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("knowledge.db")
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    pub fn goals_path(&self) -> PathBuf {
        self.data_dir.join("goals.json")
    }

    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_live_under_the_data_dir() {
        let config = AgentConfig::default().with_data_dir("/tmp/scout");
        assert_eq!(config.db_path(), PathBuf::from("/tmp/scout/knowledge.db"));
        assert_eq!(config.state_path(), PathBuf::from("/tmp/scout/state.json"));
        assert_eq!(config.goals_path(), PathBuf::from("/tmp/scout/goals.json"));
    }

    #[test]
    fn defaults_are_sane() {
        let config = AgentConfig::default();
        assert_eq!(config.min_samples, 100);
        assert_eq!(config.item_price, dec!(0.001));
        assert!(config.max_spend > config.item_price);
    }
}
