//! `SystemLearning`: derives the success rate for
//! a cycle's executed decisions and feeds it to the registry's learning-rate
//! scalar. Split out from `AgentRegistry::nudge_learning_rate` itself so the
//! cap/floor policy has one named call site rather than being buried inside
//! the cycle's loop body.

use crate::domain::ExecutionResult;
use crate::registry::AgentRegistry;

#[derive(Debug, Clone, Copy)]
pub struct LearningOutcome {
    pub success_rate: f64,
    pub learning_rate_after: f64,
}

/// `successRate = successCount / totalCount`; drives `NudgeLearningRate`
///.
pub fn apply_system_learning(registry: &AgentRegistry, results: &[ExecutionResult]) -> LearningOutcome {
    let total = results.len();
    let success_rate = if total == 0 {
        1.0
    } else {
        results.iter().filter(|r| r.success).count() as f64 / total as f64
    };

    registry.nudge_learning_rate(success_rate);

    LearningOutcome {
        success_rate,
        learning_rate_after: registry.learning_rate(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DecisionType;

    fn outcome(success: bool) -> ExecutionResult {
        ExecutionResult {
            decision_id: "d".into(),
            success,
            quality_score: if success { 0.9 } else { 0.2 },
            duration_ms: 10,
            decision_type: DecisionType::AgentAdaptation,
        }
    }

    #[test]
    fn high_success_rate_increases_learning_rate() {
        let registry = AgentRegistry::new();
        let before = registry.learning_rate();
        let results = vec![outcome(true); 9]
            .into_iter()
            .chain(std::iter::once(outcome(false)))
            .collect::<Vec<_>>();
        let outcome = apply_system_learning(&registry, &results);
        assert!(outcome.success_rate > 0.8);
        assert!(outcome.learning_rate_after >= before);
    }

    #[test]
    fn low_success_rate_decreases_learning_rate() {
        let registry = AgentRegistry::new();
        let before = registry.learning_rate();
        let results = vec![outcome(false); 9]
            .into_iter()
            .chain(std::iter::once(outcome(true)))
            .collect::<Vec<_>>();
        let outcome = apply_system_learning(&registry, &results);
        assert!(outcome.success_rate < 0.5);
        assert!(outcome.learning_rate_after <= before);
    }

    #[test]
    fn empty_results_default_to_full_success_rate() {
        let registry = AgentRegistry::new();
        let outcome = apply_system_learning(&registry, &[]);
        assert_eq!(outcome.success_rate, 1.0);
    }
}
