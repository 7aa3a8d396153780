//! Decision and execution-result entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AgentId, GoalTree};

/// Decision types emitted by the Orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecisionType {
    SystemRealignment,
    AgentAdaptation,
    ConflictResolution,
    AmplifyEmergentBehavior,
    ExpertRiskControl,
    ExpertRegimeAdaptation,
    ExpertMethodologyIntegration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskAssessment {
    Low,
    Medium,
    High,
    Critical,
}

/// Priority tier used for phase-6 execution ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub agent_id: AgentId,
    pub cycle_id: String,
    pub decision_type: DecisionType,
    pub rationale: String,
    pub inputs: Value,
    pub alternatives: Vec<String>,
    pub selected: String,
    /// Clamped to `[0, 1]`.
    pub confidence: f64,
    pub risk_assessment: RiskAssessment,
    pub action: String,
    pub parameters: Value,
    pub expected_result: String,
    pub autonomy_level_at_decision: f64,
    pub goals_snapshot: GoalTree,
    pub at: DateTime<Utc>,
    pub priority: Priority,
    pub expected_improvement: f64,
    pub expected_duration_ms: u64,
}

impl Decision {
    pub fn builder(
        id: String,
        agent_id: AgentId,
        cycle_id: String,
        decision_type: DecisionType,
        goals_snapshot: GoalTree,
        autonomy_level_at_decision: f64,
        at: DateTime<Utc>,
    ) -> DecisionBuilder {
        DecisionBuilder {
            decision: Decision {
                id,
                agent_id,
                cycle_id,
                decision_type,
                rationale: String::new(),
                inputs: Value::Null,
                alternatives: Vec::new(),
                selected: String::new(),
                confidence: 0.0,
                risk_assessment: RiskAssessment::Low,
                action: String::new(),
                parameters: Value::Null,
                expected_result: String::new(),
                autonomy_level_at_decision,
                goals_snapshot,
                at,
                priority: Priority::Medium,
                expected_improvement: 0.0,
                expected_duration_ms: 0,
            },
        }
    }
}

pub struct DecisionBuilder {
    decision: Decision,
}

impl DecisionBuilder {
    pub fn rationale(mut self, r: impl Into<String>) -> Self {
        self.decision.rationale = r.into();
        self
    }
    pub fn inputs(mut self, v: Value) -> Self {
        self.decision.inputs = v;
        self
    }
    pub fn alternatives(mut self, a: Vec<String>) -> Self {
        self.decision.alternatives = a;
        self
    }
    pub fn selected(mut self, s: impl Into<String>) -> Self {
        self.decision.selected = s.into();
        self
    }
    pub fn confidence(mut self, c: f64) -> Self {
        self.decision.confidence = c.clamp(0.0, 1.0);
        self
    }
    pub fn risk_assessment(mut self, r: RiskAssessment) -> Self {
        self.decision.risk_assessment = r;
        self
    }
    pub fn action(mut self, a: impl Into<String>) -> Self {
        self.decision.action = a.into();
        self
    }
    pub fn parameters(mut self, v: Value) -> Self {
        self.decision.parameters = v;
        self
    }
    pub fn expected_result(mut self, s: impl Into<String>) -> Self {
        self.decision.expected_result = s.into();
        self
    }
    pub fn priority(mut self, p: Priority) -> Self {
        self.decision.priority = p;
        self
    }
    pub fn expected_improvement(mut self, v: f64) -> Self {
        self.decision.expected_improvement = v;
        self
    }
    pub fn expected_duration_ms(mut self, v: u64) -> Self {
        self.decision.expected_duration_ms = v;
        self
    }
    pub fn build(self) -> Decision {
        self.decision
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub decision_id: String,
    pub success: bool,
    /// Clamped to `[0, 1]`.
    pub quality_score: f64,
    pub duration_ms: u64,
    pub decision_type: DecisionType,
}
