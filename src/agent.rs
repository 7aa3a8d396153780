//! Generic agent contract and its one concrete bookkeeping
//! implementation, `StandardAgent`: `Arc<RwLock<state>>` plus bounded stats
//! and a message inbox. Discrete action-selection under uncertainty lives
//! in `market_hunter.rs`, the one place in this crate that still does it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::warn;

use crate::domain::{AgentId, Decision, GoalTree, PerfSample, TraitName};
use crate::errors::PolicyError;
use crate::message_bus::MessageBus;

pub const MIN_AUTONOMY: f64 = 0.30;
pub const MAX_AUTONOMY: f64 = 0.99;

/// Snapshot returned by `Agent::assess_state`.
#[derive(Debug, Clone, Copy)]
pub struct Assessment {
    pub perf: PerfSample,
    pub goal_progress: f64,
    pub autonomy: f64,
}

/// Returned by `Agent::evaluate_goal_progress`.
#[derive(Debug, Clone, Copy)]
pub struct GoalProgress {
    pub overall_progress: f64,
    pub needs_adaptation: bool,
}

impl GoalProgress {
    pub fn new(overall_progress: f64) -> Self {
        let overall_progress = overall_progress.clamp(0.0, 1.0);
        Self {
            overall_progress,
            needs_adaptation: overall_progress < 0.6,
        }
    }
}

/// Valid tags for `Agent::execute_adaptation`; unknown tags are no-ops
/// recorded at warning severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionTag {
    GoalAdaptation,
    StrategyAdjustment,
    IncreaseAutonomy,
    Unknown,
}

impl From<&str> for ActionTag {
    fn from(s: &str) -> Self {
        match s {
            "GOAL_ADAPTATION" => ActionTag::GoalAdaptation,
            "STRATEGY_ADJUSTMENT" => ActionTag::StrategyAdjustment,
            "INCREASE_AUTONOMY" => ActionTag::IncreaseAutonomy,
            _ => ActionTag::Unknown,
        }
    }
}

/// The generic agent contract. Every hook is non-blocking
/// from the caller's perspective; the orchestrator wraps each call in
/// `tokio::time::timeout` using the configured per-agent deadline.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &AgentId;

    async fn assess_state(&self) -> Assessment;

    async fn evaluate_goal_progress(&self) -> GoalProgress;

    /// Only goals with `autonomously_modifiable = true` may change;
    /// increments `adaptationCount` on success.
    async fn evolve_goals(&self, decision: &Decision) -> Result<GoalTree, PolicyError>;

    /// Unknown tags are no-ops, recorded at warning severity.
    async fn execute_adaptation(&self, actions: &[ActionTag]);

    /// Clamped to `[MIN_AUTONOMY, MAX_AUTONOMY]`.
    fn update_autonomy(&self, autonomy: f64);

    fn autonomy(&self) -> f64;

    fn reputation(&self) -> f64;

    /// Apply a bounded reputation delta, clamped to `[0, 1]`.
    fn bump_reputation(&self, delta: f64);

    fn adaptation_count(&self) -> u64;

    fn goals(&self) -> GoalTree;

    fn traits(&self) -> HashMap<TraitName, u8>;

    /// Drain this agent's mailbox from the shared bus.
    fn poll_inbox(&self, bus: &MessageBus) -> Vec<crate::domain::Message> {
        bus.poll(self.id())
    }
}

/// The default bookkeeping agent: five instances of this back the
/// orchestrator's own registry in its end-to-end test scenarios.
/// All mutable state is single-writer (the agent itself), guarded by
/// `parking_lot::RwLock` — cheap since no hook ever awaits while holding one.
pub struct StandardAgent {
    id: AgentId,
    traits: HashMap<TraitName, u8>,
    goals: RwLock<GoalTree>,
    autonomy: RwLock<f64>,
    reputation: RwLock<f64>,
    decision_history: RwLock<VecDeque<Decision>>,
    perf_history: RwLock<VecDeque<PerfSample>>,
    adaptation_count: AtomicU64,
    history_capacity: usize,
    latest_goal_progress: RwLock<f64>,
}

impl StandardAgent {
    pub fn new(
        id: AgentId,
        goals: GoalTree,
        traits: HashMap<TraitName, u8>,
        initial_autonomy: f64,
        history_capacity: usize,
    ) -> Self {
        let mut perf_history = VecDeque::with_capacity(history_capacity.min(64));
        perf_history.push_back(PerfSample::new(0.75, 0.75, 0.75, Utc::now()));
        Self {
            id,
            traits,
            goals: RwLock::new(goals),
            autonomy: RwLock::new(initial_autonomy.clamp(MIN_AUTONOMY, MAX_AUTONOMY)),
            reputation: RwLock::new(0.7),
            decision_history: RwLock::new(VecDeque::with_capacity(history_capacity.min(64))),
            perf_history: RwLock::new(perf_history),
            adaptation_count: AtomicU64::new(0),
            history_capacity,
            latest_goal_progress: RwLock::new(0.7),
        }
    }

    /// Feed an externally-observed outcome into this agent's bookkeeping.
    /// Called by the orchestrator after a decision executes so subsequent
    /// `assess_state`/`evaluate_goal_progress` calls reflect it.
    pub fn record_outcome(&self, decision: Decision, sample: PerfSample, goal_progress: f64) {
        let mut history = self.decision_history.write();
        if history.len() >= self.history_capacity {
            history.pop_front();
        }
        history.push_back(decision);
        drop(history);

        let mut perf = self.perf_history.write();
        if perf.len() >= self.history_capacity {
            perf.pop_front();
        }
        perf.push_back(sample);
        drop(perf);

        *self.latest_goal_progress.write() = goal_progress.clamp(0.0, 1.0);
    }

    fn mean_perf(&self) -> PerfSample {
        let perf = self.perf_history.read();
        let n = perf.len().max(1) as f64;
        let (mut e, mut a, mut r) = (0.0, 0.0, 0.0);
        for p in perf.iter() {
            e += p.efficiency;
            a += p.accuracy;
            r += p.responsiveness;
        }
        PerfSample::new(e / n, a / n, r / n, Utc::now())
    }
}

#[async_trait]
impl Agent for StandardAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    async fn assess_state(&self) -> Assessment {
        Assessment {
            perf: self.mean_perf(),
            goal_progress: *self.latest_goal_progress.read(),
            autonomy: *self.autonomy.read(),
        }
    }

    async fn evaluate_goal_progress(&self) -> GoalProgress {
        GoalProgress::new(*self.latest_goal_progress.read())
    }

    async fn evolve_goals(&self, decision: &Decision) -> Result<GoalTree, PolicyError> {
        let current = self.goals.read().clone();
        let proposed = current.clone();
        let evolved = current.apply_evolution(proposed)?;
        self.adaptation_count.fetch_add(1, Ordering::Relaxed);
        *self.goals.write() = evolved.clone();
        let _ = decision;
        Ok(evolved)
    }

    async fn execute_adaptation(&self, actions: &[ActionTag]) {
        for action in actions {
            match action {
                ActionTag::GoalAdaptation | ActionTag::StrategyAdjustment => {}
                ActionTag::IncreaseAutonomy => {
                    let current = *self.autonomy.read();
                    self.update_autonomy(current * 1.05);
                }
                ActionTag::Unknown => {
                    warn!(agent = %self.id, "execute_adaptation received an unknown action tag");
                }
            }
        }
    }

    fn update_autonomy(&self, autonomy: f64) {
        *self.autonomy.write() = autonomy.clamp(MIN_AUTONOMY, MAX_AUTONOMY);
    }

    fn autonomy(&self) -> f64 {
        *self.autonomy.read()
    }

    fn reputation(&self) -> f64 {
        *self.reputation.read()
    }

    fn bump_reputation(&self, delta: f64) {
        let mut rep = self.reputation.write();
        *rep = (*rep + delta).clamp(0.0, 1.0);
    }

    fn adaptation_count(&self) -> u64 {
        self.adaptation_count.load(Ordering::Relaxed)
    }

    fn goals(&self) -> GoalTree {
        self.goals.read().clone()
    }

    fn traits(&self) -> HashMap<TraitName, u8> {
        self.traits.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Goal;

    fn make_agent() -> StandardAgent {
        let goals = GoalTree::new(Goal::new("primary", "grow portfolio", 1.0))
            .with_secondary(vec![Goal::new("secondary", "manage risk", 0.5).modifiable(true)]);
        StandardAgent::new(AgentId::new("test-agent"), goals, HashMap::new(), 0.8, 256)
    }

    #[tokio::test]
    async fn update_autonomy_clamps_to_bounds() {
        let agent = make_agent();
        agent.update_autonomy(10.0);
        assert_eq!(agent.autonomy(), MAX_AUTONOMY);
        agent.update_autonomy(-5.0);
        assert_eq!(agent.autonomy(), MIN_AUTONOMY);
    }

    #[tokio::test]
    async fn update_autonomy_twice_same_value_is_idempotent() {
        let agent = make_agent();
        agent.update_autonomy(0.5);
        let first = agent.autonomy();
        agent.update_autonomy(0.5);
        assert_eq!(first, agent.autonomy());
    }

    #[tokio::test]
    async fn needs_adaptation_below_threshold() {
        let agent = make_agent();
        agent.record_outcome(
            Decision::builder(
                "d1".into(),
                agent.id().clone(),
                "c0".into(),
                crate::domain::DecisionType::AgentAdaptation,
                agent.goals(),
                agent.autonomy(),
                Utc::now(),
            )
            .build(),
            PerfSample::new(0.5, 0.5, 0.5, Utc::now()),
            0.4,
        );
        let progress = agent.evaluate_goal_progress().await;
        assert!(progress.needs_adaptation);
    }

    #[tokio::test]
    async fn unknown_action_tag_is_a_no_op() {
        let agent = make_agent();
        let before = agent.autonomy();
        agent.execute_adaptation(&[ActionTag::Unknown]).await;
        assert_eq!(before, agent.autonomy());
    }
}
