//! CLI entry point for the strategic orchestrator.
//!
//! A single binary with four subcommands: `run` starts both long-lived
//! drivers, `cycle-once`/`hunter-once` are the testable single-shot
//! entry points, and `status` is a read-only snapshot.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use btc_agent_orchestrator::agent::{Agent, StandardAgent};
use btc_agent_orchestrator::clock::SystemClock;
use btc_agent_orchestrator::config::Config;
use btc_agent_orchestrator::domain::{AgentId, Goal, GoalTree};
use btc_agent_orchestrator::market_data::{HttpMarketData, MarketData};
use btc_agent_orchestrator::market_hunter::MarketHunterAgent;
use btc_agent_orchestrator::message_bus::MessageBus;
use btc_agent_orchestrator::orchestrator::Orchestrator;
use btc_agent_orchestrator::store::{open_store, Store};
use btc_agent_orchestrator::{logging, metrics};

const EXIT_OK: i32 = 0;
const EXIT_CONFIG_ERROR: i32 = 1;
const EXIT_STORE_UNREACHABLE: i32 = 2;
const EXIT_INTERNAL_ERROR: i32 = 3;

/// The five strategic agents the orchestrator starts with: one primary goal each, one modifiable secondary
/// goal, and a descending autonomy ladder.
const STRATEGIC_AGENT_NAMES: [&str; 5] = [
    "strategic-orchestrator",
    "risk-manager",
    "signal-curator",
    "execution-planner",
    "reputation-auditor",
];
const STRATEGIC_AGENT_AUTONOMY: [f64; 5] = [0.95, 0.85, 0.80, 0.75, 0.80];
const MARKET_HUNTER_AGENT_ID: &str = "market-hunter";

#[derive(Parser, Debug)]
#[command(name = "btc-agent-orchestrator", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Override the strategic cycle cadence, seconds (T1).
    #[arg(long)]
    cycle_interval: Option<u64>,

    /// Override the market hunter loop cadence, seconds.
    #[arg(long)]
    hunter_interval: Option<u64>,

    /// Override the max sources queried per market hunter cycle.
    #[arg(long)]
    max_sources: Option<usize>,

    /// Override the market hunter's exploration rate.
    #[arg(long)]
    exploration_rate: Option<f64>,

    /// Override the store DSN (`memory://` or `sled://<path>`).
    #[arg(long)]
    store: Option<String>,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Start the orchestrator and market hunter (default).
    Run,
    /// Run one strategic cycle and exit.
    CycleOnce,
    /// Run one market hunter iteration and exit.
    HunterOnce,
    /// Print registered agents, autonomy levels, reputations, and the
    /// latest portfolio.
    Status,
}

fn main() {
    let cli = Cli::parse();
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return EXIT_CONFIG_ERROR;
        }
    };

    if let Err(err) = logging::init_with_file(&config.monitoring.log_level, cli.log_file.as_deref()) {
        eprintln!("failed to initialize logging: {err}");
        return EXIT_CONFIG_ERROR;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "starting btc-agent-orchestrator");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            error!(error = %err, "failed to start tokio runtime");
            return EXIT_INTERNAL_ERROR;
        }
    };

    runtime.block_on(async move {
        match cli.command.unwrap_or(Command::Run) {
            Command::Run => run_forever(config).await,
            Command::CycleOnce => cycle_once(config).await,
            Command::HunterOnce => hunter_once(config).await,
            Command::Status => status(config).await,
        }
    })
}

fn load_config(cli: &Cli) -> Result<Config, btc_agent_orchestrator::errors::ConfigError> {
    let mut config = if std::path::Path::new(&cli.config).exists() {
        Config::from_file_with_env(&cli.config)?
    } else {
        warn!(path = %cli.config, "config file not found, using defaults with env overrides");
        Config::default().with_env_overrides()
    };

    if let Some(v) = cli.cycle_interval {
        config.orchestrator.cycle_interval_secs = v;
    }
    if let Some(v) = cli.hunter_interval {
        config.market_hunter.check_interval_secs = v;
    }
    if let Some(v) = cli.max_sources {
        config.market_hunter.max_sources_per_cycle = v;
    }
    if let Some(v) = cli.exploration_rate {
        config.market_hunter.exploration_rate = v;
    }
    if let Some(v) = &cli.store {
        config.store.dsn = v.clone();
    }
    Ok(config)
}

/// One goal tree per strategic agent: an immutable primary goal plus one
/// `autonomouslyModifiable` secondary goal.
fn strategic_goals(name: &str) -> GoalTree {
    GoalTree::new(Goal::new(
        format!("{name}-primary"),
        format!("{name}: grow risk-adjusted portfolio value"),
        1.0,
    ))
    .with_secondary(vec![Goal::new(
        format!("{name}-secondary"),
        format!("{name}: adapt tactics to market regime"),
        0.5,
    )
    .modifiable(true)])
}

fn build_strategic_agents(history_capacity: usize) -> Vec<Arc<dyn Agent>> {
    STRATEGIC_AGENT_NAMES
        .iter()
        .zip(STRATEGIC_AGENT_AUTONOMY)
        .map(|(name, autonomy)| {
            Arc::new(StandardAgent::new(
                AgentId::new(*name),
                strategic_goals(name),
                HashMap::new(),
                autonomy,
                history_capacity,
            )) as Arc<dyn Agent>
        })
        .collect()
}

async fn open_configured_store(
    dsn: &str,
) -> Result<Arc<dyn Store>, btc_agent_orchestrator::errors::StoreError> {
    open_store(dsn).await.map(Arc::from)
}

fn build_market_data(config: &Config) -> Arc<dyn MarketData> {
    Arc::new(HttpMarketData::new(
        config.providers.timeout_ms,
        config.providers.rate_limit_rps,
        config.providers.max_retries,
    ))
}

fn build_orchestrator(config: &Config, store: Arc<dyn Store>, market_data: Arc<dyn MarketData>) -> Arc<Orchestrator> {
    let bus = Arc::new(MessageBus::new());
    let orchestrator = Arc::new(Orchestrator::new(
        config.orchestrator.clone(),
        store.clone(),
        market_data,
        bus.clone(),
        Arc::new(SystemClock),
        config.orchestrator.decision_buffer_capacity,
    ));
    for agent in build_strategic_agents(config.orchestrator.history_capacity) {
        orchestrator.register_agent(agent);
    }
    orchestrator
}

fn build_hunter(
    config: &Config,
    store: Arc<dyn Store>,
    market_data: Arc<dyn MarketData>,
    bus: Arc<MessageBus>,
) -> Arc<MarketHunterAgent> {
    let targets = STRATEGIC_AGENT_NAMES.iter().map(|n| AgentId::new(*n)).collect();
    Arc::new(MarketHunterAgent::new(
        AgentId::new(MARKET_HUNTER_AGENT_ID),
        config.market_hunter.clone(),
        market_data,
        store,
        bus,
        targets,
        Arc::new(SystemClock),
    ))
}

async fn run_forever(config: Config) -> i32 {
    let store = match open_configured_store(&config.store.dsn).await {
        Ok(s) => s,
        Err(err) => {
            error!(error = %err, "store unreachable at startup");
            return EXIT_STORE_UNREACHABLE;
        }
    };

    let market_data = build_market_data(&config);
    let orchestrator = build_orchestrator(&config, store.clone(), market_data.clone());

    let hunter = build_hunter(&config, store.clone(), market_data, orchestrator.bus());
    orchestrator.register_agent(hunter.clone() as Arc<dyn Agent>);

    let m = metrics::metrics();
    m.active_agents.set((STRATEGIC_AGENT_NAMES.len() + 1) as i64);

    let hunter_cancel = Arc::new(tokio::sync::Notify::new());
    let hunter_task = {
        let hunter = hunter.clone();
        let cancel = hunter_cancel.clone();
        tokio::spawn(async move { hunter.run(cancel).await })
    };

    let orchestrator_task = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run().await })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    orchestrator.stop().await;
    hunter_cancel.notify_waiters();
    let _ = orchestrator_task.await;
    let _ = hunter_task.await;
    info!("shutdown complete");
    EXIT_OK
}

async fn cycle_once(config: Config) -> i32 {
    let store = match open_configured_store(&config.store.dsn).await {
        Ok(s) => s,
        Err(err) => {
            error!(error = %err, "store unreachable");
            return EXIT_STORE_UNREACHABLE;
        }
    };
    let market_data = build_market_data(&config);
    let orchestrator = build_orchestrator(&config, store, market_data);

    let outcome = orchestrator.run_cycle_once().await;
    println!(
        "cycle {} complete: aborted={} decisions={} results={}",
        outcome.cycle_id,
        outcome.aborted,
        outcome.decisions_emitted,
        outcome.execution_results.len()
    );
    orchestrator.stop().await;
    if outcome.aborted {
        EXIT_INTERNAL_ERROR
    } else {
        EXIT_OK
    }
}

async fn hunter_once(config: Config) -> i32 {
    let store = match open_configured_store(&config.store.dsn).await {
        Ok(s) => s,
        Err(err) => {
            error!(error = %err, "store unreachable");
            return EXIT_STORE_UNREACHABLE;
        }
    };
    let market_data = build_market_data(&config);
    let hunter = build_hunter(&config, store, market_data, Arc::new(MessageBus::new()));

    if let Err(err) = hunter.load_historical_metrics().await {
        warn!(error = %err, "could not load historical source metrics; starting cold");
    }
    let outcome = hunter.run_once().await;
    println!(
        "hunter cycle complete: sources_queried={} signals_emitted={} had_exception={}",
        outcome.sources_queried.len(),
        outcome.signals_emitted,
        outcome.had_exception
    );
    if outcome.had_exception {
        EXIT_INTERNAL_ERROR
    } else {
        EXIT_OK
    }
}

async fn status(config: Config) -> i32 {
    let store = match open_configured_store(&config.store.dsn).await {
        Ok(s) => s,
        Err(err) => {
            error!(error = %err, "store unreachable");
            return EXIT_STORE_UNREACHABLE;
        }
    };
    let market_data = build_market_data(&config);
    let orchestrator = build_orchestrator(&config, store.clone(), market_data);

    println!("registered agents:");
    for id in orchestrator.registry().ids() {
        let autonomy = orchestrator.registry().get_autonomy(&id).unwrap_or(0.0);
        let reputation = orchestrator.registry().get_reputation(&id).unwrap_or(0.0);
        println!("  {:<24} autonomy={:.2} reputation={:.2}", id.as_str(), autonomy, reputation);
    }

    match store.read_portfolio().await {
        Ok(p) => println!(
            "portfolio: btc={:.6} usd={:.2} total_usd={:.2} updated_at={}",
            p.btc, p.usd, p.total_value_usd, p.updated_at
        ),
        Err(err) => println!("portfolio: unavailable ({err})"),
    }
    EXIT_OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_run() {
        let cli = Cli::parse_from(["btc-agent-orchestrator"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_parses_cycle_once() {
        let cli = Cli::parse_from(["btc-agent-orchestrator", "cycle-once", "--store", "memory://"]);
        assert_eq!(cli.command, Some(Command::CycleOnce));
        assert_eq!(cli.store.as_deref(), Some("memory://"));
    }

    #[test]
    fn strategic_agents_have_the_spec_autonomy_ladder() {
        let agents = build_strategic_agents(64);
        let autonomies: Vec<f64> = agents.iter().map(|a| a.autonomy()).collect();
        assert_eq!(autonomies, STRATEGIC_AGENT_AUTONOMY.to_vec());
    }

    #[tokio::test]
    async fn load_config_applies_cli_overrides_over_defaults() {
        let cli = Cli {
            command: None,
            config: "does-not-exist.toml".to_string(),
            cycle_interval: Some(42),
            hunter_interval: None,
            max_sources: Some(3),
            exploration_rate: None,
            store: Some("memory://".to_string()),
            log_file: None,
        };
        let config = load_config(&cli).unwrap();
        assert_eq!(config.orchestrator.cycle_interval_secs, 42);
        assert_eq!(config.market_hunter.max_sources_per_cycle, 3);
        assert_eq!(config.store.dsn, "memory://");
    }
}
