//! Store-facing record types: per-source bandit statistics, the
//! agent-execution log, simulated trades, and the aggregate performance view
//! `ReadPerformanceMetrics` returns.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AgentId;

/// Rolling per-data-source quality statistics.
/// Invariant: both counters monotone nondecreasing; `successful_calls ≤
/// total_calls`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetric {
    pub name: String,
    pub success_rate: f64,
    pub avg_signal_quality: f64,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub signals_generated: u64,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl SourceMetric {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success_rate: 0.5,
            avg_signal_quality: 0.5,
            total_calls: 0,
            successful_calls: 0,
            signals_generated: 0,
            last_used_at: None,
        }
    }

    pub fn record_call(&mut self, success: bool, at: DateTime<Utc>) {
        self.total_calls += 1;
        if success {
            self.successful_calls += 1;
        }
        self.last_used_at = Some(at);
        debug_assert!(self.successful_calls <= self.total_calls);
    }

    /// EWMA update: `m <- (1-a)*m + a*observation`.
    pub fn ewma_update(&mut self, alpha: f64, success_observation: f64, quality_observation: f64) {
        self.success_rate = (1.0 - alpha) * self.success_rate + alpha * success_observation;
        self.avg_signal_quality =
            (1.0 - alpha) * self.avg_signal_quality + alpha * quality_observation;
    }
}

pub type SourceMetricMap = HashMap<String, SourceMetric>;

/// One row of the `agent_executions` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecutionRecord {
    pub agent_id: AgentId,
    pub kind: String,
    pub inputs: serde_json::Value,
    pub outputs: serde_json::Value,
    pub success: bool,
    pub quality_score: f64,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// A simulated trade resulting from an EXPERT_* decision's execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub decision_id: String,
    pub action: String,
    pub size_fraction: f64,
    pub price_usd: f64,
    pub at: DateTime<Utc>,
}

/// Aggregate view returned by `Store::read_performance_metrics`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub average_quality_score: f64,
}

impl PerformanceMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            return 1.0;
        }
        self.successful_executions as f64 / self.total_executions as f64
    }
}
