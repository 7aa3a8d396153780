//! Metrics collection module: flat counters/gauges/histograms behind a
//! lazily-initialized global registry, pointed at the strategic cycle and
//! the market hunter.

use prometheus::{Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};
use std::time::Instant;

/// Global metrics registry.
pub struct Metrics {
    registry: Registry,

    // Cycle counters
    pub cycles_run: IntCounter,
    pub cycles_aborted: IntCounter,
    pub cycles_skipped_reentrant: IntCounter,

    // Decision counters, one per DecisionType
    pub decisions_system_realignment: IntCounter,
    pub decisions_agent_adaptation: IntCounter,
    pub decisions_conflict_resolution: IntCounter,
    pub decisions_amplify_emergent_behavior: IntCounter,
    pub decisions_expert_risk_control: IntCounter,
    pub decisions_expert_regime_adaptation: IntCounter,
    pub decisions_expert_methodology_integration: IntCounter,

    // Market hunter counters
    pub hunter_cycles_run: IntCounter,
    pub hunter_sources_queried: IntCounter,
    pub signals_emitted: IntCounter,

    // Gauges
    pub active_agents: IntGauge,
    pub learning_rate: Gauge,
    pub strategic_alignment: Gauge,

    // Histograms
    pub cycle_duration: Histogram,
    pub source_query_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let cycles_run =
            IntCounter::with_opts(Opts::new("cycles_run_total", "Strategic cycles completed"))?;
        let cycles_aborted = IntCounter::with_opts(Opts::new(
            "cycles_aborted_total",
            "Strategic cycles aborted during data gathering",
        ))?;
        let cycles_skipped_reentrant = IntCounter::with_opts(Opts::new(
            "cycles_skipped_reentrant_total",
            "Cycle ticks skipped because a cycle was already in flight",
        ))?;

        let decisions_system_realignment = IntCounter::with_opts(Opts::new(
            "decisions_system_realignment_total",
            "SYSTEM_REALIGNMENT decisions emitted",
        ))?;
        let decisions_agent_adaptation = IntCounter::with_opts(Opts::new(
            "decisions_agent_adaptation_total",
            "AGENT_ADAPTATION decisions emitted",
        ))?;
        let decisions_conflict_resolution = IntCounter::with_opts(Opts::new(
            "decisions_conflict_resolution_total",
            "CONFLICT_RESOLUTION decisions emitted",
        ))?;
        let decisions_amplify_emergent_behavior = IntCounter::with_opts(Opts::new(
            "decisions_amplify_emergent_behavior_total",
            "AMPLIFY_EMERGENT_BEHAVIOR decisions emitted",
        ))?;
        let decisions_expert_risk_control = IntCounter::with_opts(Opts::new(
            "decisions_expert_risk_control_total",
            "EXPERT_RISK_CONTROL decisions emitted",
        ))?;
        let decisions_expert_regime_adaptation = IntCounter::with_opts(Opts::new(
            "decisions_expert_regime_adaptation_total",
            "EXPERT_REGIME_ADAPTATION decisions emitted",
        ))?;
        let decisions_expert_methodology_integration = IntCounter::with_opts(Opts::new(
            "decisions_expert_methodology_integration_total",
            "EXPERT_METHODOLOGY_INTEGRATION decisions emitted",
        ))?;

        let hunter_cycles_run = IntCounter::with_opts(Opts::new(
            "hunter_cycles_run_total",
            "MarketHunter cycles completed",
        ))?;
        let hunter_sources_queried = IntCounter::with_opts(Opts::new(
            "hunter_sources_queried_total",
            "Data sources queried by MarketHunter",
        ))?;
        let signals_emitted =
            IntCounter::with_opts(Opts::new("signals_emitted_total", "Signals broadcast to the message bus"))?;

        let active_agents =
            IntGauge::with_opts(Opts::new("active_agents", "Agents currently registered"))?;
        let learning_rate = Gauge::with_opts(Opts::new("learning_rate", "Current system learning rate"))?;
        let strategic_alignment =
            Gauge::with_opts(Opts::new("strategic_alignment", "Most recently computed strategic alignment"))?;

        let cycle_duration = Histogram::with_opts(
            HistogramOpts::new("cycle_duration_seconds", "Strategic cycle wall-clock duration")
                .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0]),
        )?;
        let source_query_latency = Histogram::with_opts(
            HistogramOpts::new("source_query_latency_seconds", "MarketData source fetch latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        )?;

        registry.register(Box::new(cycles_run.clone()))?;
        registry.register(Box::new(cycles_aborted.clone()))?;
        registry.register(Box::new(cycles_skipped_reentrant.clone()))?;
        registry.register(Box::new(decisions_system_realignment.clone()))?;
        registry.register(Box::new(decisions_agent_adaptation.clone()))?;
        registry.register(Box::new(decisions_conflict_resolution.clone()))?;
        registry.register(Box::new(decisions_amplify_emergent_behavior.clone()))?;
        registry.register(Box::new(decisions_expert_risk_control.clone()))?;
        registry.register(Box::new(decisions_expert_regime_adaptation.clone()))?;
        registry.register(Box::new(decisions_expert_methodology_integration.clone()))?;
        registry.register(Box::new(hunter_cycles_run.clone()))?;
        registry.register(Box::new(hunter_sources_queried.clone()))?;
        registry.register(Box::new(signals_emitted.clone()))?;
        registry.register(Box::new(active_agents.clone()))?;
        registry.register(Box::new(learning_rate.clone()))?;
        registry.register(Box::new(strategic_alignment.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;
        registry.register(Box::new(source_query_latency.clone()))?;

        Ok(Self {
            registry,
            cycles_run,
            cycles_aborted,
            cycles_skipped_reentrant,
            decisions_system_realignment,
            decisions_agent_adaptation,
            decisions_conflict_resolution,
            decisions_amplify_emergent_behavior,
            decisions_expert_risk_control,
            decisions_expert_regime_adaptation,
            decisions_expert_methodology_integration,
            hunter_cycles_run,
            hunter_sources_queried,
            signals_emitted,
            active_agents,
            learning_rate,
            strategic_alignment,
            cycle_duration,
            source_query_latency,
        })
    }

    /// Get the registry for exporting.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Bump the counter matching a `DecisionType`'s `Debug` spelling.
    pub fn record_decision(&self, decision_type_debug: &str) {
        match decision_type_debug {
            "SystemRealignment" => self.decisions_system_realignment.inc(),
            "AgentAdaptation" => self.decisions_agent_adaptation.inc(),
            "ConflictResolution" => self.decisions_conflict_resolution.inc(),
            "AmplifyEmergentBehavior" => self.decisions_amplify_emergent_behavior.inc(),
            "ExpertRiskControl" => self.decisions_expert_risk_control.inc(),
            "ExpertRegimeAdaptation" => self.decisions_expert_regime_adaptation.inc(),
            "ExpertMethodologyIntegration" => self.decisions_expert_methodology_integration.inc(),
            other => tracing::debug!("unrecognized decision type for metrics: {}", other),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

/// Global metrics instance.
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration.
pub struct Timer {
    start: Instant,
    histogram_name: Option<String>,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            histogram_name: None,
        }
    }

    /// Create a timer with a histogram name for automatic recording.
    pub fn with_name(histogram_name: &str) -> Self {
        Self {
            start: Instant::now(),
            histogram_name: Some(histogram_name.to_string()),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        let duration = self.start.elapsed();
        histogram.observe(duration.as_secs_f64());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Finish the timer and record to the associated histogram.
    pub fn finish(self) {
        if let Some(name) = self.histogram_name {
            let duration = self.start.elapsed().as_secs_f64();
            match name.as_str() {
                "cycle_duration_seconds" => metrics().cycle_duration.observe(duration),
                "source_query_latency_seconds" => metrics().source_query_latency.observe(duration),
                _ => tracing::debug!("Unknown histogram name: {}", name),
            }
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_decision_routes_to_the_right_counter() {
        let m = Metrics::new().unwrap();
        m.record_decision("ExpertRiskControl");
        assert_eq!(m.decisions_expert_risk_control.get(), 1);
        assert_eq!(m.decisions_agent_adaptation.get(), 0);
    }
}
