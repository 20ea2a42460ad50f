//! sol-scout — autonomous, budget-aware SOL market research loop

mod config;
mod gateway;
mod goals;
mod narrator;
mod orchestrator;
mod state;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use persistence::repository::FindingsRepository;
use persistence::Database;

use crate::config::AgentConfig;
use crate::gateway::{FluoraGateway, MeteredGateway};
use crate::orchestrator::Orchestrator;
use crate::state::AgentState;

#[derive(Parser)]
#[command(name = "sol-scout", about = "Autonomous SOL market research loop", version)]
struct Cli {
    /// Verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the research loop
    Run {
        /// Seconds between cycles
        #[arg(long)]
        interval: Option<u64>,
        /// Real samples required before strategy synthesis
        #[arg(long)]
        threshold: Option<usize>,
        /// Stop after this many total cycles
        #[arg(long)]
        max_cycles: Option<u64>,
        /// Where the knowledge base and snapshot live
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Print the latest agent snapshot
    Status {
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Show recent findings from the knowledge base
    Findings {
        #[arg(long, default_value_t = 10)]
        limit: i64,
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "debug,sqlx=info,hyper=info,reqwest=info"
    } else {
        "info,sqlx=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

fn resolve_config(data_dir: Option<PathBuf>) -> AgentConfig {
    let mut config = AgentConfig::from_env();
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            interval,
            threshold,
            max_cycles,
            data_dir,
        } => {
            let mut config = resolve_config(data_dir);
            if let Some(secs) = interval {
                config.loop_interval = Duration::from_secs(secs);
            }
            if let Some(samples) = threshold {
                config.min_samples = samples;
            }
            if max_cycles.is_some() {
                config.max_cycles = max_cycles;
            }
            run(config).await
        }
        Commands::Status { data_dir } => status(resolve_config(data_dir)),
        Commands::Findings { limit, data_dir } => findings(resolve_config(data_dir), limit).await,
    }
}

async fn run(config: AgentConfig) -> Result<()> {
    info!(
        data_dir = %config.data_dir.display(),
        gateway = %config.gateway_url,
        max_spend = %config.max_spend,
        "Starting sol-scout"
    );

    let db = Database::open(config.db_path()).await?;
    let gateway: Arc<dyn MeteredGateway> = Arc::new(FluoraGateway::new(
        config.gateway_url.clone(),
        config.purchase_timeout,
    )?);
    let mut orchestrator = Orchestrator::bootstrap(config, gateway, None, &db).await?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, finishing current cycle");
            flag.store(true, Ordering::Relaxed);
        }
    });

    orchestrator.run(shutdown).await?;
    info!("sol-scout stopped");
    Ok(())
}

fn status(config: AgentConfig) -> Result<()> {
    let path = config.state_path();
    if !path.exists() {
        println!("No snapshot at {}", path.display());
        return Ok(());
    }
    let raw = std::fs::read_to_string(&path)?;
    let state: AgentState = serde_json::from_str(&raw)?;

    println!("cycle_count:      {}", state.cycle_count);
    println!("cumulative_spend: {} USDC", state.cumulative_spend);
    if let Some(last) = state.last_run {
        println!("last_run:         {}", last.to_rfc3339());
    }
    println!("goals:");
    for goal in &state.goals {
        let reason = goal
            .blocked_reason
            .as_deref()
            .map(|r| format!("  [{r}]"))
            .unwrap_or_default();
        println!(
            "  {:<10} {:<12} {}{reason}",
            goal.id,
            goal.status.as_str(),
            goal.title
        );
    }
    Ok(())
}

async fn findings(config: AgentConfig, limit: i64) -> Result<()> {
    let db = Database::open(config.db_path()).await?;
    let records = FindingsRepository::new(db.pool()).latest(limit).await?;
    if records.is_empty() {
        println!("No findings recorded yet");
        return Ok(());
    }
    for finding in records {
        let price = finding.price_value.as_deref().unwrap_or("-");
        let strategy = finding
            .strategy_json
            .as_deref()
            .map(|_| "strategy result")
            .unwrap_or("-");
        println!(
            "cycle {:>5}  goal {:<10}  price {:<12}  {}",
            finding.cycle, finding.goal_id, price, strategy
        );
        if let Some(commentary) = &finding.commentary {
            println!("             {commentary}");
        }
    }
    Ok(())
}
