//! Core entities shared by every component.

pub mod agent_id;
pub mod decision;
pub mod goal;
pub mod message;
pub mod perf;
pub mod portfolio;
pub mod records;
pub mod signal;

pub use agent_id::AgentId;
pub use decision::{Decision, DecisionType, ExecutionResult, Priority, RiskAssessment};
pub use goal::{Goal, GoalTree, TraitName};
pub use message::{Message, MessageKind, Recipient};
pub use perf::PerfSample;
pub use portfolio::{MarketSnapshot, Portfolio};
pub use records::{AgentExecutionRecord, PerformanceMetrics, SourceMetric, SourceMetricMap, Trade};
pub use signal::{Severity, Signal, SignalKind};
