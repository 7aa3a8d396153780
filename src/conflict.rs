//! `ConflictResolver` and `EmergentBehaviorDetector`: pure
//! policy hooks over agent goal state and recent decision history. Kept as
//! the simplest defensible heuristics — see DESIGN.md Open Question 2 for
//! why nothing more elaborate is implied.

use std::collections::HashSet;

use crate::domain::{Decision, DecisionType, GoalTree};

/// KPI pairs treated as mutually exclusive: progress on one degrades the
/// other. Not exhaustive — a documented starting policy, not a claim of
/// completeness.
const MUTUALLY_EXCLUSIVE_KPI_PAIRS: &[(&str, &str)] = &[
    ("maximize_growth", "minimize_drawdown"),
    ("increase_exposure", "reduce_exposure"),
    ("aggressive_entry", "capital_preservation"),
    ("maximize_yield", "minimize_risk"),
];

#[derive(Debug, Clone)]
pub struct ConflictReport {
    pub severity: f64,
    pub description: String,
}

/// `AnalyzeConflict(a1, a2)`. Compares the two goal trees'
/// KPI sets; each mutually-exclusive pair present on both sides raises
/// severity, with a clamp to keep it in `[0, 1]`.
pub fn analyze_conflict(a1_id: &str, tree1: &GoalTree, a2_id: &str, tree2: &GoalTree) -> ConflictReport {
    let kpis1: HashSet<&str> = tree1.all_kpis();
    let kpis2: HashSet<&str> = tree2.all_kpis();

    let mut hits = Vec::new();
    for &(left, right) in MUTUALLY_EXCLUSIVE_KPI_PAIRS {
        let forward = kpis1.contains(left) && kpis2.contains(right);
        let backward = kpis1.contains(right) && kpis2.contains(left);
        if forward || backward {
            hits.push((left, right));
        }
    }

    let severity = (hits.len() as f64 / MUTUALLY_EXCLUSIVE_KPI_PAIRS.len() as f64).clamp(0.0, 1.0);
    let description = if hits.is_empty() {
        format!("no mutually-exclusive KPI overlap between {a1_id} and {a2_id}")
    } else {
        let pairs: Vec<String> = hits.iter().map(|(l, r)| format!("{l}/{r}")).collect();
        format!("{a1_id} and {a2_id} conflict on: {}", pairs.join(", "))
    };

    ConflictReport { severity, description }
}

#[derive(Debug, Clone)]
pub struct EmergentBehavior {
    pub kind: String,
    pub description: String,
    pub beneficial: bool,
    pub strength: f64,
}

/// Decision types whose coordinated appearance across agents is read as
/// constructive rather than merely coincidental.
fn is_beneficial_pattern(decision_type: DecisionType) -> bool {
    matches!(
        decision_type,
        DecisionType::AgentAdaptation
            | DecisionType::ExpertMethodologyIntegration
            | DecisionType::ExpertRegimeAdaptation
    )
}

/// `DetectEmergent(recentDecisions)`. Looks for the same
/// decision type emitted by at least three distinct agents within the
/// supplied window; that many independently-arrived-at decisions of the
/// same type is read as a coordinated, emergent pattern.
const COORDINATION_THRESHOLD: usize = 3;

pub fn detect_emergent(recent_decisions: &[Decision]) -> Vec<EmergentBehavior> {
    let mut by_type: std::collections::HashMap<DecisionType, HashSet<&str>> =
        std::collections::HashMap::new();

    for decision in recent_decisions {
        by_type
            .entry(decision.decision_type)
            .or_default()
            .insert(decision.agent_id.as_str());
    }

    by_type
        .into_iter()
        .filter(|(_, agents)| agents.len() >= COORDINATION_THRESHOLD)
        .map(|(decision_type, agents)| {
            let strength = (agents.len() as f64 / recent_decisions.len().max(1) as f64).clamp(0.0, 1.0);
            EmergentBehavior {
                kind: format!("{decision_type:?}"),
                description: format!(
                    "{} distinct agents independently emitted {:?} within the recent window",
                    agents.len(),
                    decision_type
                ),
                beneficial: is_beneficial_pattern(decision_type),
                strength,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentId, Goal};

    #[test]
    fn shared_non_conflicting_kpis_yield_zero_severity() {
        let t1 = GoalTree::new(Goal::new("p", "d", 1.0).with_kpis(["growth".to_string()]));
        let t2 = GoalTree::new(Goal::new("p", "d", 1.0).with_kpis(["growth".to_string()]));
        let report = analyze_conflict("a", &t1, "b", &t2);
        assert_eq!(report.severity, 0.0);
    }

    #[test]
    fn mutually_exclusive_kpis_raise_severity() {
        let t1 = GoalTree::new(Goal::new("p", "d", 1.0).with_kpis(["maximize_growth".to_string()]));
        let t2 = GoalTree::new(Goal::new("p", "d", 1.0).with_kpis(["minimize_drawdown".to_string()]));
        let report = analyze_conflict("a", &t1, "b", &t2);
        assert!(report.severity > 0.0);
    }

    fn decision(agent: &str, decision_type: DecisionType) -> Decision {
        Decision::builder(
            format!("{agent}-d"),
            AgentId::new(agent),
            "c0".into(),
            decision_type,
            GoalTree::new(Goal::new("p", "d", 1.0)),
            0.8,
            chrono::Utc::now(),
        )
        .build()
    }

    #[test]
    fn three_agents_same_type_is_emergent() {
        let decisions = vec![
            decision("a1", DecisionType::AgentAdaptation),
            decision("a2", DecisionType::AgentAdaptation),
            decision("a3", DecisionType::AgentAdaptation),
        ];
        let emergent = detect_emergent(&decisions);
        assert_eq!(emergent.len(), 1);
        assert!(emergent[0].beneficial);
    }

    #[test]
    fn two_agents_same_type_is_not_emergent() {
        let decisions = vec![
            decision("a1", DecisionType::AgentAdaptation),
            decision("a2", DecisionType::AgentAdaptation),
        ];
        assert!(detect_emergent(&decisions).is_empty());
    }
}
