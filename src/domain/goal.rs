//! GoalTree and trait types.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::PolicyError;

/// Closed set of personality traits, each a bounded `0..=100` integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraitName {
    Aggression,
    Patience,
    RiskTolerance,
    Curiosity,
    Discipline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub description: String,
    /// Clamped to `[0, 1]`.
    pub priority: f64,
    pub kpis: HashSet<String>,
    pub autonomously_modifiable: bool,
}

impl Goal {
    pub fn new(id: impl Into<String>, description: impl Into<String>, priority: f64) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            priority: priority.clamp(0.0, 1.0),
            kpis: HashSet::new(),
            autonomously_modifiable: false,
        }
    }

    pub fn with_kpis(mut self, kpis: impl IntoIterator<Item = String>) -> Self {
        self.kpis = kpis.into_iter().collect();
        self
    }

    pub fn modifiable(mut self, yes: bool) -> Self {
        self.autonomously_modifiable = yes;
        self
    }
}

/// Exactly one primary goal, plus an ordered sequence of secondary goals.
/// All goal ids are unique within the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalTree {
    pub primary: Goal,
    pub secondary: Vec<Goal>,
}

impl GoalTree {
    pub fn new(primary: Goal) -> Self {
        Self {
            primary,
            secondary: Vec::new(),
        }
    }

    pub fn with_secondary(mut self, goals: Vec<Goal>) -> Self {
        self.secondary = goals;
        self
    }

    /// All goal ids in this tree, primary first.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.id.as_str())
            .chain(self.secondary.iter().map(|g| g.id.as_str()))
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut seen = HashSet::new();
        for id in self.ids() {
            if !seen.insert(id) {
                return Err(PolicyError::DuplicateGoalId(id.to_string()));
            }
        }
        Ok(())
    }

    pub fn all_kpis(&self) -> HashSet<&str> {
        let mut kpis: HashSet<&str> = self.primary.kpis.iter().map(|s| s.as_str()).collect();
        for g in &self.secondary {
            kpis.extend(g.kpis.iter().map(|s| s.as_str()));
        }
        kpis
    }

    /// Apply a proposed replacement tree, enforcing that non-modifiable
    /// goals are carried over byte-identical and
    /// that ids stay unique.
    pub fn apply_evolution(&self, proposed: GoalTree) -> Result<GoalTree, PolicyError> {
        proposed.validate()?;

        let resolve = |current: &Goal, candidate: Option<&Goal>| -> Goal {
            match candidate {
                Some(c) if current.autonomously_modifiable => c.clone(),
                _ => current.clone(),
            }
        };

        let find = |id: &str, goals: &[Goal]| goals.iter().find(|g| g.id == id);

        let new_primary = resolve(
            &self.primary,
            if proposed.primary.id == self.primary.id {
                Some(&proposed.primary)
            } else {
                None
            },
        );

        let mut new_secondary = Vec::with_capacity(self.secondary.len());
        for g in &self.secondary {
            let candidate = find(&g.id, &proposed.secondary);
            new_secondary.push(resolve(g, candidate));
        }

        let tree = GoalTree {
            primary: new_primary,
            secondary: new_secondary,
        };
        tree.validate()?;
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> GoalTree {
        GoalTree::new(Goal::new("primary", "grow portfolio", 1.0).modifiable(false)).with_secondary(
            vec![
                Goal::new("secondary-1", "manage risk", 0.5).modifiable(true),
                Goal::new("secondary-2", "discover signals", 0.3).modifiable(false),
            ],
        )
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let mut tree = sample_tree();
        tree.secondary.push(Goal::new("primary", "dup", 0.1));
        assert!(tree.validate().is_err());
    }

    #[test]
    fn non_modifiable_goals_survive_evolution_unchanged() {
        let tree = sample_tree();
        let mut proposed = tree.clone();
        proposed.secondary[1].description = "hijacked".to_string();
        proposed.primary.description = "hijacked primary".to_string();

        let evolved = tree.apply_evolution(proposed).unwrap();
        assert_eq!(evolved.primary.description, "grow portfolio");
        assert_eq!(evolved.secondary[1].description, "manage risk");
    }

    #[test]
    fn modifiable_goals_change() {
        let tree = sample_tree();
        let mut proposed = tree.clone();
        proposed.secondary[0].description = "new risk approach".to_string();

        let evolved = tree.apply_evolution(proposed).unwrap();
        assert_eq!(evolved.secondary[0].description, "new risk approach");
    }
}
