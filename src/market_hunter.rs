//! Specialized autonomous agent: continuous source-selection bandit loop,
//! signal synthesis, broadcast, per-source learning. Picks among the eight
//! data sources with an epsilon-greedy-flavored score and feeds observed
//! outcomes back through `SourceMetric::ewma_update`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use parking_lot::Mutex as SyncMutex;
use tracing::{error, info, warn};

use crate::agent::{Agent, ActionTag, Assessment, GoalProgress, StandardAgent};
use crate::clock::Clock;
use crate::config::MarketHunterConfig;
use crate::domain::{AgentId, Decision, Goal, GoalTree, MarketSnapshot, Severity, Signal, SignalKind, SourceMetric, SourceMetricMap};
use crate::errors::PolicyError;
use crate::market_data::{MarketData, SourceKind, SourceRecord};
use crate::message_bus::MessageBus;
use crate::store::Store;

const WEIGHT_SUCCESS_RATE: f64 = 0.3;
const WEIGHT_SIGNAL_QUALITY: f64 = 0.3;
const WEIGHT_RECENCY: f64 = 0.2;
const WEIGHT_CONTEXT: f64 = 0.4;
const EXPLORATION_BONUS: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Volatility {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Asian,
    European,
    American,
    Overlap,
}

#[derive(Debug, Clone, Copy)]
pub struct MarketContext {
    pub volatility: Volatility,
    pub trend: Trend,
    pub volume: VolumeLevel,
    pub time_of_day: TimeOfDay,
    pub fear_greed: f64,
}

/// Categorize the current market snapshot into discrete regime buckets.
/// Thresholds are this crate's own policy; only the enum shapes are fixed.
pub fn assess_market_context(market: &MarketSnapshot, at: DateTime<Utc>) -> MarketContext {
    let volatility = if market.change_24h.abs() > 8.0 {
        Volatility::High
    } else if market.change_24h.abs() > 2.0 {
        Volatility::Medium
    } else {
        Volatility::Low
    };

    let trend = if market.change_24h > 1.0 {
        Trend::Bullish
    } else if market.change_24h < -1.0 {
        Trend::Bearish
    } else {
        Trend::Neutral
    };

    let volume = if market.volume_24h > 1.0e10 {
        VolumeLevel::High
    } else if market.volume_24h > 1.0e9 {
        VolumeLevel::Medium
    } else {
        VolumeLevel::Low
    };

    let hour = at.hour();
    let time_of_day = match hour {
        0..=7 => TimeOfDay::Asian,
        8..=11 => TimeOfDay::European,
        12..=15 => TimeOfDay::Overlap,
        _ => TimeOfDay::American,
    };

    MarketContext {
        volatility,
        trend,
        volume,
        time_of_day,
        fear_greed: market.fear_greed,
    }
}

/// Policy table mapping (source, context) to a relevance score in `[0, 1]`
///. Kept as a pure function rather than a literal
/// lookup table — see DESIGN.md Open Question 1.
fn context_relevance(source: SourceKind, ctx: &MarketContext) -> f64 {
    match source {
        SourceKind::WhaleAlert => match ctx.volatility {
            Volatility::High => 0.9,
            Volatility::Medium => 0.6,
            Volatility::Low => 0.3,
        },
        SourceKind::NewsAggregator => match ctx.trend {
            Trend::Neutral => 0.4,
            _ => 0.7,
        },
        SourceKind::Arbitrage => match ctx.volume {
            VolumeLevel::High => 0.8,
            VolumeLevel::Medium => 0.5,
            VolumeLevel::Low => 0.2,
        },
        SourceKind::Influencer => match ctx.time_of_day {
            TimeOfDay::American | TimeOfDay::Overlap => 0.7,
            _ => 0.4,
        },
        SourceKind::Technical => match ctx.volatility {
            Volatility::High => 0.8,
            Volatility::Medium => 0.6,
            Volatility::Low => 0.4,
        },
        SourceKind::InstitutionalHoldings => match ctx.trend {
            Trend::Bullish => 0.7,
            _ => 0.4,
        },
        SourceKind::DerivativesFunding => match ctx.volatility {
            Volatility::High => 0.85,
            _ => 0.5,
        },
        SourceKind::FearGreed => {
            if ctx.fear_greed > 75.0 || ctx.fear_greed < 25.0 {
                0.9
            } else {
                0.5
            }
        }
    }
}

fn recency_score(last_used_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match last_used_at {
        None => 1.0,
        Some(at) => {
            let hours = (now - at).num_minutes() as f64 / 60.0;
            (hours / 24.0).clamp(0.0, 1.0)
        }
    }
}

/// `Decide sources to query`. Returns up to
/// `max_sources` distinct `SourceKind`s ranked by score, highest first.
pub fn select_sources(
    context: &MarketContext,
    metrics: &SourceMetricMap,
    rng: &SyncMutex<fastrand::Rng>,
    exploration_rate: f64,
    max_sources: usize,
) -> Vec<SourceKind> {
    let now = Utc::now();
    let mut scored: Vec<(SourceKind, f64)> = SourceKind::ALL
        .iter()
        .map(|&source| {
            let metric = metrics.get(source.name());
            let success_rate = metric.map(|m| m.success_rate).unwrap_or(0.5);
            let avg_signal_quality = metric.map(|m| m.avg_signal_quality).unwrap_or(0.5);
            let recency = recency_score(metric.and_then(|m| m.last_used_at), now);
            let relevance = context_relevance(source, context);

            let explore = rng.lock().f64() < exploration_rate;
            let bonus = if explore { EXPLORATION_BONUS } else { 0.0 };

            let score = WEIGHT_SUCCESS_RATE * success_rate
                + WEIGHT_SIGNAL_QUALITY * avg_signal_quality
                + WEIGHT_RECENCY * recency
                + WEIGHT_CONTEXT * relevance
                + bonus;

            (source, score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(max_sources).map(|(s, _)| s).collect()
}

/// Turn a raw source record into a signal, if its content clears the
/// severity bar for its kind. The whale, narrative, institutional,
/// derivative, and fear-greed thresholds are fixed constants; the
/// arbitrage/influencer/technical thresholds are this crate's own policy.
pub fn synthesize_signal(_source: SourceKind, record: &SourceRecord, _at: DateTime<Utc>) -> Option<(SignalKind, Severity, f64, serde_json::Value, String)> {
    match record {
        SourceRecord::Whale { largest_transfer_btc } if *largest_transfer_btc > 100.0 => Some((
            SignalKind::Whale,
            Severity::High,
            (*largest_transfer_btc / 200.0).clamp(0.6, 1.0),
            serde_json::json!({ "largest_transfer_btc": largest_transfer_btc }),
            "WHALE_MOVEMENT".to_string(),
        )),
        SourceRecord::Narrative { bullish_theme_count } if *bullish_theme_count >= 3 => Some((
            SignalKind::Narrative,
            Severity::Medium,
            (0.5 + 0.05 * *bullish_theme_count as f64).clamp(0.6, 1.0),
            serde_json::json!({ "bullish_theme_count": bullish_theme_count }),
            "POSITIVE_NARRATIVE".to_string(),
        )),
        SourceRecord::Institutional { disclosed_holdings_usd } if *disclosed_holdings_usd > 50.0e9 => Some((
            SignalKind::Institutional,
            Severity::High,
            0.7,
            serde_json::json!({ "disclosed_holdings_usd": disclosed_holdings_usd }),
            "INSTITUTIONAL_ACCUMULATION".to_string(),
        )),
        SourceRecord::Derivative { funding_rate } if funding_rate.abs() > 0.05 => Some((
            SignalKind::Derivative,
            Severity::Critical,
            0.8,
            serde_json::json!({ "funding_rate": funding_rate }),
            "EXTREME_FUNDING".to_string(),
        )),
        SourceRecord::Macro { fear_greed } if *fear_greed > 75.0 => Some((
            SignalKind::Macro,
            Severity::Medium,
            0.65,
            serde_json::json!({ "fear_greed": fear_greed }),
            "EXTREME_GREED".to_string(),
        )),
        SourceRecord::Macro { fear_greed } if *fear_greed < 25.0 => Some((
            SignalKind::Macro,
            Severity::Medium,
            0.65,
            serde_json::json!({ "fear_greed": fear_greed }),
            "EXTREME_FEAR".to_string(),
        )),
        SourceRecord::Arbitrage { spread_bps } if *spread_bps > 50.0 => Some((
            SignalKind::Arbitrage,
            Severity::Low,
            (*spread_bps / 200.0).clamp(0.6, 1.0),
            serde_json::json!({ "spread_bps": spread_bps }),
            "ARBITRAGE_SPREAD".to_string(),
        )),
        SourceRecord::Influencer { mention_count, sentiment } if *mention_count > 1_000 && *sentiment > 0.6 => Some((
            SignalKind::Influencer,
            Severity::Low,
            sentiment.clamp(0.6, 1.0),
            serde_json::json!({ "mention_count": mention_count, "sentiment": sentiment }),
            "INFLUENCER_SURGE".to_string(),
        )),
        SourceRecord::Technical { rsi, trend_strength } if *rsi > 70.0 || *rsi < 30.0 => Some((
            SignalKind::Technical,
            Severity::Low,
            trend_strength.clamp(0.6, 1.0),
            serde_json::json!({ "rsi": rsi, "trend_strength": trend_strength }),
            "TECHNICAL_EXTREME".to_string(),
        )),
        _ => None,
    }
}

pub struct HunterCycleOutcome {
    pub sources_queried: Vec<SourceKind>,
    pub signals_emitted: usize,
    pub had_exception: bool,
}

pub struct MarketHunterAgent {
    standard: StandardAgent,
    source_metrics: parking_lot::RwLock<SourceMetricMap>,
    rng: SyncMutex<fastrand::Rng>,
    config: MarketHunterConfig,
    market_data: Arc<dyn MarketData>,
    store: Arc<dyn Store>,
    bus: Arc<MessageBus>,
    target_agents: Vec<AgentId>,
    clock: Arc<dyn Clock>,
}

impl MarketHunterAgent {
    pub fn new(
        id: AgentId,
        config: MarketHunterConfig,
        market_data: Arc<dyn MarketData>,
        store: Arc<dyn Store>,
        bus: Arc<MessageBus>,
        target_agents: Vec<AgentId>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        let goals = GoalTree::new(Goal::new("discover-signals", "find actionable market signals", 0.8));
        let standard = StandardAgent::new(id, goals, HashMap::new(), 0.9, 256);
        bus.register(standard.id());
        Self {
            standard,
            source_metrics: parking_lot::RwLock::new(SourceMetricMap::new()),
            rng: SyncMutex::new(rng),
            config,
            market_data,
            store,
            bus,
            target_agents,
            clock,
        }
    }

    /// `LoadHistoricalMetrics`.
    pub async fn load_historical_metrics(&self) -> Result<(), crate::errors::StoreError> {
        let metrics = self.store.read_source_metrics().await?;
        *self.source_metrics.write() = metrics;
        Ok(())
    }

    pub fn source_metrics(&self) -> SourceMetricMap {
        self.source_metrics.read().clone()
    }

    /// One full iteration: assess the market, pick sources, query them,
    /// synthesize and broadcast signals, then update per-source metrics.
    pub async fn run_once(&self) -> HunterCycleOutcome {
        let price = match self.market_data.fetch_price().await {
            Ok(p) => p,
            Err(err) => {
                warn!(error = %err, "market hunter failed to fetch price; skipping iteration");
                return HunterCycleOutcome {
                    sources_queried: Vec::new(),
                    signals_emitted: 0,
                    had_exception: true,
                };
            }
        };

        let fear_greed = match self.market_data.fetch_source(SourceKind::FearGreed).await {
            Ok(SourceRecord::Macro { fear_greed }) => fear_greed,
            _ => price.fear_greed,
        };
        let mut price = price;
        price.fear_greed = fear_greed;

        let context = assess_market_context(&price, self.clock.now());
        let metrics_snapshot = self.source_metrics();
        let selected = select_sources(
            &context,
            &metrics_snapshot,
            &self.rng,
            self.config.exploration_rate,
            self.config.max_sources_per_cycle,
        );

        let fetch_timeout = Duration::from_millis(self.config.fetch_timeout_ms);
        let fetches = selected.iter().map(|&source| {
            let market_data = self.market_data.clone();
            async move {
                let result = tokio::time::timeout(fetch_timeout, market_data.fetch_source(source)).await;
                (source, result)
            }
        });
        let results = futures::future::join_all(fetches).await;

        let mut signals_emitted = 0usize;
        let mut metrics = self.source_metrics();
        let now = self.clock.now();

        for (source, outcome) in results {
            let entry = metrics
                .entry(source.name().to_string())
                .or_insert_with(|| SourceMetric::new(source.name()));

            let record = match outcome {
                Ok(Ok(record)) => {
                    entry.record_call(true, now);
                    Some(record)
                }
                Ok(Err(err)) => {
                    warn!(source = source.name(), error = %err, "source fetch failed");
                    entry.record_call(false, now);
                    None
                }
                Err(_) => {
                    warn!(source = source.name(), "source fetch exceeded its deadline");
                    entry.record_call(false, now);
                    None
                }
            };

            if let Some(record) = record {
                if let Some((kind, severity, confidence, payload, description)) =
                    synthesize_signal(source, &record, now)
                {
                    if confidence >= self.config.min_confidence_threshold {
                        entry.signals_generated += 1;
                        let targets: HashSet<AgentId> = self.target_agents.iter().cloned().collect();
                        let signal = Signal::new(kind, severity, confidence, targets, payload, now);
                        self.broadcast_signal(&signal, &description);
                        if let Err(err) = self.store.append_signal(kind, signal).await {
                            warn!(error = %err, "failed to persist signal");
                        }
                        signals_emitted += 1;
                        entry.ewma_update(self.config.learning_rate, 1.0, confidence);
                    } else {
                        entry.ewma_update(self.config.learning_rate, 1.0, confidence);
                    }
                } else {
                    entry.ewma_update(self.config.learning_rate, 1.0, 0.0);
                }
            }
        }

        *self.source_metrics.write() = metrics.clone();
        if let Err(err) = self.store.write_source_metrics(metrics).await {
            error!(error = %err, "failed to persist source metrics");
        }

        let m = crate::metrics::metrics();
        m.hunter_cycles_run.inc();
        m.hunter_sources_queried.inc_by(selected.len() as u64);
        m.signals_emitted.inc_by(signals_emitted as u64);

        HunterCycleOutcome {
            sources_queried: selected,
            signals_emitted,
            had_exception: false,
        }
    }

    /// Delivers to each agent in `signal.targets` individually, per spec
    /// §4.3 step 5 ("broadcast ... to each signal's target agents") — not a
    /// bus-wide `Recipient::Broadcast`, which would fan out beyond the
    /// signal's intended recipients.
    fn broadcast_signal(&self, signal: &Signal, description: &str) {
        let payload = serde_json::json!({
            "kind": format!("{:?}", signal.kind),
            "severity": format!("{:?}", signal.severity),
            "confidence": signal.confidence,
            "description": description,
            "payload": signal.payload,
        });
        for target in &signal.targets {
            self.bus.publish(crate::domain::Message {
                from: self.standard.id().clone(),
                to: crate::domain::Recipient::Agent(target.clone()),
                kind: crate::domain::MessageKind::Signal,
                payload: payload.clone(),
                at: signal.at,
            });
        }
    }

    /// Long-running loop: sleeps `check_interval_secs`
    /// between iterations; on an exception, sleeps 60s then retries.
    pub async fn run(&self, cancel: Arc<tokio::sync::Notify>) {
        if let Err(err) = self.load_historical_metrics().await {
            warn!(error = %err, "market hunter could not load historical metrics; starting cold");
        }

        loop {
            let outcome = self.run_once().await;
            info!(
                sources = outcome.sources_queried.len(),
                signals = outcome.signals_emitted,
                "market hunter iteration complete"
            );

            let sleep_duration = if outcome.had_exception {
                Duration::from_secs(self.config.retry_backoff_secs)
            } else {
                Duration::from_secs(self.config.check_interval_secs)
            };
            tokio::select! {
                _ = self.clock.sleep(sleep_duration) => {}
                _ = cancel.notified() => {
                    info!("market hunter loop cancelled");
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl Agent for MarketHunterAgent {
    fn id(&self) -> &AgentId {
        self.standard.id()
    }

    async fn assess_state(&self) -> Assessment {
        self.standard.assess_state().await
    }

    async fn evaluate_goal_progress(&self) -> GoalProgress {
        self.standard.evaluate_goal_progress().await
    }

    async fn evolve_goals(&self, decision: &Decision) -> Result<GoalTree, PolicyError> {
        self.standard.evolve_goals(decision).await
    }

    async fn execute_adaptation(&self, actions: &[ActionTag]) {
        self.standard.execute_adaptation(actions).await
    }

    fn update_autonomy(&self, autonomy: f64) {
        self.standard.update_autonomy(autonomy)
    }

    fn autonomy(&self) -> f64 {
        self.standard.autonomy()
    }

    fn reputation(&self) -> f64 {
        self.standard.reputation()
    }

    fn bump_reputation(&self, delta: f64) {
        self.standard.bump_reputation(delta)
    }

    fn adaptation_count(&self) -> u64 {
        self.standard.adaptation_count()
    }

    fn goals(&self) -> GoalTree {
        self.standard.goals()
    }

    fn traits(&self) -> HashMap<crate::domain::TraitName, u8> {
        self.standard.traits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::market_data::MockMarketData;
    use crate::store::InMemoryStore;
    use chrono::Utc;

    fn context(volatility: Volatility) -> MarketContext {
        MarketContext {
            volatility,
            trend: Trend::Neutral,
            volume: VolumeLevel::Medium,
            time_of_day: TimeOfDay::Overlap,
            fear_greed: 50.0,
        }
    }

    #[test]
    fn select_sources_respects_max_sources_and_distinctness() {
        let metrics = SourceMetricMap::new();
        let rng = SyncMutex::new(fastrand::Rng::with_seed(42));
        let selected = select_sources(&context(Volatility::High), &metrics, &rng, 0.2, 5);
        assert!(selected.len() <= 5);
        let unique: HashSet<_> = selected.iter().collect();
        assert_eq!(unique.len(), selected.len());
    }

    #[test]
    fn whale_signal_above_threshold() {
        let record = SourceRecord::Whale { largest_transfer_btc: 150.0 };
        let (kind, severity, confidence, _, _) =
            synthesize_signal(SourceKind::WhaleAlert, &record, Utc::now()).unwrap();
        assert_eq!(kind, SignalKind::Whale);
        assert_eq!(severity, Severity::High);
        assert!(confidence >= 0.6);
    }

    #[test]
    fn whale_signal_below_threshold_is_none() {
        let record = SourceRecord::Whale { largest_transfer_btc: 50.0 };
        assert!(synthesize_signal(SourceKind::WhaleAlert, &record, Utc::now()).is_none());
    }

    #[test]
    fn extreme_greed_signal_emitted() {
        let record = SourceRecord::Macro { fear_greed: 80.0 };
        let (kind, severity, confidence, _, tag) =
            synthesize_signal(SourceKind::FearGreed, &record, Utc::now()).unwrap();
        assert_eq!(kind, SignalKind::Macro);
        assert_eq!(severity, Severity::Medium);
        assert!(confidence >= 0.6);
        assert!(tag.starts_with("EXTREME_GREED"));
    }

    #[tokio::test]
    async fn run_once_broadcasts_whale_signal() {
        let price = MarketSnapshot {
            price_usd: 50_000.0,
            volume_24h: 1.0e9,
            change_24h: 1.0,
            fear_greed: 50.0,
            at: Utc::now(),
        };
        let market_data = Arc::new(
            MockMarketData::new(price)
                .with_source(SourceKind::WhaleAlert, SourceRecord::Whale { largest_transfer_btc: 150.0 })
                .with_source(SourceKind::FearGreed, SourceRecord::Macro { fear_greed: 50.0 }),
        );
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(MessageBus::new());
        let target = AgentId::new("strategic-orchestrator");
        bus.register(&target);

        let hunter = MarketHunterAgent::new(
            AgentId::new("market-hunter"),
            MarketHunterConfig {
                max_sources_per_cycle: 8,
                exploration_rate: 0.0,
                min_confidence_threshold: 0.1,
                ..MarketHunterConfig::default()
            },
            market_data,
            store,
            bus.clone(),
            vec![target.clone()],
            Arc::new(SystemClock),
        );

        let outcome = hunter.run_once().await;
        assert!(outcome.signals_emitted >= 1);
        let messages = bus.poll(&target);
        assert!(!messages.is_empty());
    }
}
