//! MarketHunter signal entity.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    Whale,
    Narrative,
    Arbitrage,
    Influencer,
    Technical,
    Institutional,
    Derivative,
    Macro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub severity: Severity,
    /// Clamped to `[0, 1]`.
    pub confidence: f64,
    pub targets: HashSet<AgentId>,
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl Signal {
    pub fn new(
        kind: SignalKind,
        severity: Severity,
        confidence: f64,
        targets: HashSet<AgentId>,
        payload: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            targets,
            payload,
            at,
        }
    }
}
