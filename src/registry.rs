//! Agent registry plus the orchestrator-owned autonomy/reputation/learning
//! state, shared via `Arc<DashMap<..>>` across the cycle driver and readers.
//!
//! The registry is the single writer for autonomy, reputation, and the
//! system learning rate; agents themselves hold a local copy (pushed via
//! `Agent::update_autonomy`) purely so `AssessState` can report it without
//! a lock round-trip back through the registry.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::agent::Agent;
use crate::domain::AgentId;

pub const LEARNING_RATE_FLOOR: f64 = 0.05;
pub const LEARNING_RATE_CAP: f64 = 0.3;

pub struct AgentRegistry {
    agents: DashMap<AgentId, Arc<dyn Agent>>,
    autonomy: DashMap<AgentId, f64>,
    reputation: DashMap<AgentId, f64>,
    learning_rate: RwLock<f64>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
            autonomy: DashMap::new(),
            reputation: DashMap::new(),
            learning_rate: RwLock::new(0.1),
        }
    }

    /// Register an agent for the process lifetime. Idempotent by id.
    pub fn register(&self, agent: Arc<dyn Agent>) {
        let id = agent.id().clone();
        self.autonomy.insert(id.clone(), agent.autonomy());
        self.reputation.insert(id.clone(), agent.reputation());
        self.agents.insert(id, agent);
    }

    pub fn get(&self, id: &AgentId) -> Option<Arc<dyn Agent>> {
        self.agents.get(id).map(|a| a.clone())
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(|e| e.key().clone()).collect()
    }

    pub fn iter(&self) -> Vec<Arc<dyn Agent>> {
        self.agents.iter().map(|e| e.value().clone()).collect()
    }

    pub fn get_autonomy(&self, id: &AgentId) -> Option<f64> {
        self.autonomy.get(id).map(|v| *v)
    }

    /// Clamped to `[MIN_AUTONOMY, MAX_AUTONOMY]`; pushed down to the agent.
    pub fn set_autonomy(&self, id: &AgentId, value: f64) {
        let clamped = value.clamp(crate::agent::MIN_AUTONOMY, crate::agent::MAX_AUTONOMY);
        self.autonomy.insert(id.clone(), clamped);
        if let Some(agent) = self.agents.get(id) {
            agent.update_autonomy(clamped);
        }
    }

    pub fn get_reputation(&self, id: &AgentId) -> Option<f64> {
        self.reputation.get(id).map(|v| *v)
    }

    /// `Δ = (qualityScore - 0.5) * 0.05`, clamped to `[0, 1]`.
    pub fn bump_reputation(&self, id: &AgentId, delta: f64) {
        let mut entry = self
            .reputation
            .entry(id.clone())
            .or_insert(0.7);
        *entry = (*entry + delta).clamp(0.0, 1.0);
        if let Some(agent) = self.agents.get(id) {
            agent.bump_reputation(delta);
        }
    }

    pub fn learning_rate(&self) -> f64 {
        *self.learning_rate.read()
    }

    /// Phase 7: `>0.8` multiplies by 1.1 (cap 0.3); `<0.5`
    /// multiplies by 0.9 (floor 0.05); otherwise unchanged.
    pub fn nudge_learning_rate(&self, success_rate: f64) {
        let mut rate = self.learning_rate.write();
        if success_rate > 0.8 {
            *rate = (*rate * 1.1).min(LEARNING_RATE_CAP);
        } else if success_rate < 0.5 {
            *rate = (*rate * 0.9).max(LEARNING_RATE_FLOOR);
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::StandardAgent;
    use crate::domain::{Goal, GoalTree};
    use std::collections::HashMap as StdHashMap;

    fn agent(id: &str) -> Arc<dyn Agent> {
        Arc::new(StandardAgent::new(
            AgentId::new(id),
            GoalTree::new(Goal::new("p", "d", 1.0)),
            StdHashMap::new(),
            0.8,
            64,
        ))
    }

    #[test]
    fn learning_rate_respects_cap_and_floor() {
        let registry = AgentRegistry::new();
        *registry.learning_rate.write() = 0.3;
        registry.nudge_learning_rate(0.9);
        assert_eq!(registry.learning_rate(), 0.3);

        *registry.learning_rate.write() = 0.05;
        registry.nudge_learning_rate(0.3);
        assert_eq!(registry.learning_rate(), 0.05);
    }

    #[test]
    fn set_autonomy_pushes_down_to_agent() {
        let registry = AgentRegistry::new();
        let a = agent("a");
        registry.register(a.clone());
        registry.set_autonomy(&AgentId::new("a"), 5.0);
        assert_eq!(a.autonomy(), crate::agent::MAX_AUTONOMY);
        assert_eq!(registry.get_autonomy(&AgentId::new("a")), Some(crate::agent::MAX_AUTONOMY));
    }

    #[test]
    fn bump_reputation_clamped() {
        let registry = AgentRegistry::new();
        let a = agent("a");
        registry.register(a.clone());
        for _ in 0..50 {
            registry.bump_reputation(&AgentId::new("a"), 0.5);
        }
        assert_eq!(registry.get_reputation(&AgentId::new("a")), Some(1.0));
    }
}
