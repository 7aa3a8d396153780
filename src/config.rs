//! Configuration for the orchestrator binary.
//!
//! Layered: a TOML file provides the base, environment variables override
//! specific fields, and everything has
//! a sane default so `cycle-once`/`hunter-once` work with zero setup.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub orchestrator: OrchestratorConfig,
    pub market_hunter: MarketHunterConfig,
    pub store: StoreConfig,
    pub providers: ProviderConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// T1: strategic cycle cadence, seconds. Default 600 (10 minutes).
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,

    /// Soft wall-clock budget for a full cycle before the overrun is logged.
    #[serde(default = "default_cycle_soft_deadline_secs")]
    pub cycle_soft_deadline_secs: u64,

    /// Per-agent-hook deadline.
    #[serde(default = "default_agent_deadline_ms")]
    pub agent_deadline_ms: u64,

    /// Capacity of each agent's bounded decision/perf history ring buffers.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Bound on the in-memory decision buffer used when the Store is down.
    #[serde(default = "default_decision_buffer_capacity")]
    pub decision_buffer_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketHunterConfig {
    /// Hunter loop cadence, seconds. Default 600 (10 minutes).
    #[serde(default = "default_hunter_interval_secs")]
    pub check_interval_secs: u64,

    /// Sleep duration after an exception before retrying, seconds.
    #[serde(default = "default_hunter_retry_secs")]
    pub retry_backoff_secs: u64,

    /// Max sources queried per cycle.
    #[serde(default = "default_max_sources")]
    pub max_sources_per_cycle: usize,

    /// Probability of an exploration bonus being applied to a source.
    #[serde(default = "default_exploration_rate")]
    pub exploration_rate: f64,

    /// EWMA smoothing factor for source-metric learning.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Minimum confidence required to broadcast a synthesized signal.
    #[serde(default = "default_min_confidence")]
    pub min_confidence_threshold: f64,

    /// Per-source fetch timeout, milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Seed for the exploration RNG. `None` draws a fresh seed at startup.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Data store connection string (`STORE_DSN`). `memory://` or
    /// `sled://<path>`.
    #[serde(default = "default_store_dsn")]
    pub dsn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub news_api_key: Option<String>,
    #[serde(default)]
    pub market_api_key: Option<String>,
    #[serde(default)]
    pub derivatives_api_key: Option<String>,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_provider_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_provider_rate_limit_rps")]
    pub rate_limit_rps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_true")]
    pub enable_metrics: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_cycle_interval_secs() -> u64 {
    600
}
fn default_cycle_soft_deadline_secs() -> u64 {
    120
}
fn default_agent_deadline_ms() -> u64 {
    2_000
}
fn default_history_capacity() -> usize {
    256
}
fn default_decision_buffer_capacity() -> usize {
    1024
}
fn default_hunter_interval_secs() -> u64 {
    600
}
fn default_hunter_retry_secs() -> u64 {
    60
}
fn default_max_sources() -> usize {
    5
}
fn default_exploration_rate() -> f64 {
    0.2
}
fn default_learning_rate() -> f64 {
    0.1
}
fn default_min_confidence() -> f64 {
    0.6
}
fn default_fetch_timeout_ms() -> u64 {
    5_000
}
fn default_store_dsn() -> String {
    "memory://".to_string()
}
fn default_provider_timeout_ms() -> u64 {
    5_000
}
fn default_provider_max_retries() -> u32 {
    2
}
fn default_provider_rate_limit_rps() -> u32 {
    5
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval_secs(),
            cycle_soft_deadline_secs: default_cycle_soft_deadline_secs(),
            agent_deadline_ms: default_agent_deadline_ms(),
            history_capacity: default_history_capacity(),
            decision_buffer_capacity: default_decision_buffer_capacity(),
        }
    }
}

impl Default for MarketHunterConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_hunter_interval_secs(),
            retry_backoff_secs: default_hunter_retry_secs(),
            max_sources_per_cycle: default_max_sources(),
            exploration_rate: default_exploration_rate(),
            learning_rate: default_learning_rate(),
            min_confidence_threshold: default_min_confidence(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            rng_seed: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dsn: default_store_dsn(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            news_api_key: None,
            market_api_key: None,
            derivatives_api_key: None,
            timeout_ms: default_provider_timeout_ms(),
            max_retries: default_provider_max_retries(),
            rate_limit_rps: default_provider_rate_limit_rps(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: default_true(),
            log_level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            market_hunter: MarketHunterConfig::default(),
            store: StoreConfig::default(),
            providers: ProviderConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Load configuration from a TOML file, then apply environment
    /// variable overrides.
    pub fn from_file_with_env(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let base = if std::path::Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        Ok(base.with_env_overrides())
    }

    /// Apply recognized environment variables on top of this config.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dsn) = std::env::var("STORE_DSN") {
            self.store.dsn = dsn;
        }
        if let Ok(key) = std::env::var("NEWS_API_KEY") {
            self.providers.news_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("MARKET_API_KEY") {
            self.providers.market_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("DERIVATIVES_API_KEY") {
            self.providers.derivatives_api_key = Some(key);
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.monitoring.log_level = level;
        }
        if let Ok(secs) = std::env::var("CYCLE_INTERVAL_SECONDS") {
            if let Ok(v) = secs.parse() {
                self.orchestrator.cycle_interval_secs = v;
            }
        }
        if let Ok(secs) = std::env::var("HUNTER_INTERVAL_SECONDS") {
            if let Ok(v) = secs.parse() {
                self.market_hunter.check_interval_secs = v;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let config = Config::default();
        assert_eq!(config.orchestrator.cycle_interval_secs, 600);
        assert_eq!(config.market_hunter.max_sources_per_cycle, 5);
        assert!(config.market_hunter.exploration_rate > 0.0);
    }

    #[test]
    fn env_overrides_take_precedence() {
        std::env::set_var("STORE_DSN", "sled:///tmp/test-store");
        std::env::set_var("CYCLE_INTERVAL_SECONDS", "42");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.store.dsn, "sled:///tmp/test-store");
        assert_eq!(config.orchestrator.cycle_interval_secs, 42);
        std::env::remove_var("STORE_DSN");
        std::env::remove_var("CYCLE_INTERVAL_SECONDS");
    }
}
