//! Strategic Orchestrator: the 9-phase cycle. Owns the
//! agent registry, the `MessageBus`, the `Store`, the `DecisionLogger`, and
//! the market-data handle the expert methodology needs each cycle. Phases
//! 1-9 run strictly in order and a cycle never overlaps itself — enforced
//! with an `AtomicBool` flag released through a `scopeguard::guard` so a
//! phase that bails early with `?` still clears it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::agent::{ActionTag, Agent, Assessment, GoalProgress};
use crate::clock::{Clock, Ticker};
use crate::config::OrchestratorConfig;
use crate::conflict::{self, EmergentBehavior};
use crate::decision_logger::DecisionLogger;
use crate::domain::{
    AgentId, Decision, DecisionType, ExecutionResult, GoalTree, Message, MessageKind, Priority,
    Recipient, RiskAssessment, Trade,
};
use crate::errors::OrchestratorError;
use crate::expert::{self, SystemContext, Verdict};
use crate::learning;
use crate::market_data::MarketData;
use crate::message_bus::MessageBus;
use crate::observability::CorrelationId;
use crate::registry::AgentRegistry;
use crate::store::Store;

/// Identity used when the orchestrator itself is the sender of a
/// coordination broadcast.
pub const ORCHESTRATOR_AGENT_ID: &str = "strategic-orchestrator-driver";

/// Maximum recent decisions kept in memory for `DetectEmergent`. The
/// `Store` trait has no `ListDecisions` operation, so the orchestrator
/// keeps its own bounded window rather than inventing one.
const RECENT_DECISIONS_WINDOW: usize = 64;

const CONFLICT_SEVERITY_THRESHOLD: f64 = 0.3;
const STRATEGIC_ALIGNMENT_THRESHOLD: f64 = 0.7;
const AGENT_ADAPTATION_THRESHOLD: f64 = 0.6;
const INCREASE_AUTONOMY_THRESHOLD: f64 = 0.8;
const AUTONOMY_UP_THRESHOLD: f64 = 0.85;
const AUTONOMY_DOWN_THRESHOLD: f64 = 0.5;
const AUTONOMY_UP_FACTOR: f64 = 1.05;
const AUTONOMY_DOWN_FACTOR: f64 = 0.95;

fn verdict_to_risk(verdict: Verdict) -> RiskAssessment {
    match verdict {
        Verdict::Ok => RiskAssessment::Low,
        Verdict::Watch => RiskAssessment::Medium,
        Verdict::HighRisk => RiskAssessment::Critical,
    }
}

/// `AnalyzeConflict`/`DetectEmergent` inputs and `AssessState` outputs
/// gathered once in phase 1 and reused by the later phases of the same
/// cycle, so no phase re-reads agent state mid-cycle.
struct AgentSnapshot {
    id: AgentId,
    assessment: Assessment,
    goal_progress: GoalProgress,
    goals: GoalTree,
}

struct PerformanceEntry {
    id: AgentId,
    performance_score: f64,
    needs_adaptation: bool,
    recommend_increase_autonomy: bool,
}

/// Result of one `RunCycleOnce` call.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub cycle_id: String,
    pub aborted: bool,
    pub skipped_reentrant: bool,
    pub decisions_emitted: usize,
    pub execution_results: Vec<ExecutionResult>,
}

pub struct Orchestrator {
    registry: AgentRegistry,
    bus: Arc<MessageBus>,
    store: Arc<dyn Store>,
    decision_logger: Arc<DecisionLogger>,
    market_data: Arc<dyn MarketData>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
    cycle_seq: AtomicU64,
    running: AtomicBool,
    cancel: Arc<Notify>,
    recent_decisions: parking_lot::Mutex<VecDeque<Decision>>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn Store>,
        market_data: Arc<dyn MarketData>,
        bus: Arc<MessageBus>,
        clock: Arc<dyn Clock>,
        decision_logger_batch_size: usize,
    ) -> Self {
        Self {
            registry: AgentRegistry::new(),
            bus,
            decision_logger: Arc::new(DecisionLogger::new(store.clone(), decision_logger_batch_size)),
            store,
            market_data,
            clock,
            config,
            cycle_seq: AtomicU64::new(0),
            running: AtomicBool::new(false),
            cancel: Arc::new(Notify::new()),
            recent_decisions: parking_lot::Mutex::new(VecDeque::with_capacity(RECENT_DECISIONS_WINDOW)),
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn register_agent(&self, agent: Arc<dyn Agent>) {
        self.bus.register(agent.id());
        self.registry.register(agent);
    }

    pub fn decision_logger(&self) -> &Arc<DecisionLogger> {
        &self.decision_logger
    }

    /// The shared `MessageBus` so other drivers, notably
    /// `MarketHunterAgent`, can broadcast on the same bus the orchestrator
    /// reads coordination messages from.
    pub fn bus(&self) -> Arc<MessageBus> {
        self.bus.clone()
    }

    /// `Start(ctx)`: begins scheduling; the first cycle runs
    /// immediately. Runs until `stop()` is called.
    pub async fn run(self: Arc<Self>) {
        let ticker = Ticker::new(
            self.clock.clone(),
            Duration::from_secs(self.config.cycle_interval_secs),
            true,
        );
        let mut first = true;
        loop {
            tokio::select! {
                tick = ticker.tick(first) => {
                    if tick.is_none() {
                        info!("strategic orchestrator loop cancelled");
                        return;
                    }
                }
                _ = self.cancel.notified() => {
                    info!("strategic orchestrator loop cancelled");
                    return;
                }
            }
            first = false;

            let outcome = self.run_cycle_once().await;
            info!(
                cycle_id = %outcome.cycle_id,
                decisions = outcome.decisions_emitted,
                aborted = outcome.aborted,
                "strategic cycle complete"
            );
        }
    }

    /// `Stop()`: graceful; in-flight cycles finish, the
    /// driver loop then exits and the decision logger is flushed.
    pub async fn stop(&self) {
        self.cancel.notify_waiters();
        self.decision_logger.shutdown().await;
    }

    /// `RunCycleOnce(ctx)`: the testable single-shot entry
    /// point. Non-reentrant — a cycle already in flight causes this call to
    /// return immediately with `skipped_reentrant = true`.
    pub async fn run_cycle_once(&self) -> CycleOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcquireRelease, Ordering::Acquire)
            .is_err()
        {
            warn!("strategic cycle already in flight; skipping overlapping tick");
            return CycleOutcome {
                cycle_id: String::new(),
                aborted: false,
                skipped_reentrant: true,
                decisions_emitted: 0,
                execution_results: Vec::new(),
            };
        }
        let running_flag = &self.running;
        let _guard = scopeguard::guard((), move |_| {
            running_flag.store(false, Ordering::Release);
        });

        let cycle_id = format!("c{}", self.cycle_seq.fetch_add(1, Ordering::Relaxed));
        self.run_cycle(cycle_id).await
    }

    async fn run_cycle(&self, cycle_id: String) -> CycleOutcome {
        let started = Instant::now();
        let correlation_id = CorrelationId::new();
        info!(cycle_id = %cycle_id, correlation_id = %correlation_id, "strategic cycle starting");

        let gathered = match self.assess_and_evaluate(&cycle_id).await {
            Ok(g) => g,
            Err(err) => {
                error!(cycle_id = %cycle_id, error = %err, "cycle aborted during data gathering");
                crate::metrics::metrics().cycles_aborted.inc();
                return CycleOutcome {
                    cycle_id,
                    aborted: true,
                    skipped_reentrant: false,
                    decisions_emitted: 0,
                    execution_results: Vec::new(),
                };
            }
        };

        let (snapshots, performance, system_efficiency, strategic_alignment, adaptation_capacity) = gathered;

        // Phase 3: conflict / emergent-behavior detection.
        let conflict_decisions = self.detect_conflicts(&cycle_id, &snapshots);
        let emergent = {
            let recent = self.recent_decisions.lock().iter().cloned().collect::<Vec<_>>();
            conflict::detect_emergent(&recent)
        };

        // Phase 4: strategic decisions (expert methodology + phase 2/3 roll-up).
        let system_ctx = SystemContext {
            system_efficiency,
            strategic_alignment,
            adaptation_capacity,
            learning_rate: self.registry.learning_rate(),
        };
        let mut decisions = match self
            .make_strategic_decisions(&cycle_id, &system_ctx, &performance, conflict_decisions, &emergent)
            .await
        {
            Ok(d) => d,
            Err(err) => {
                error!(cycle_id = %cycle_id, error = %err, "cycle aborted while fetching market data");
                crate::metrics::metrics().cycles_aborted.inc();
                return CycleOutcome {
                    cycle_id,
                    aborted: true,
                    skipped_reentrant: false,
                    decisions_emitted: 0,
                    execution_results: Vec::new(),
                };
            }
        };

        // Phase 5: goal adaptation.
        self.apply_goal_adaptation(&decisions).await;

        // Phase 6: coordinate actions in priority order.
        let execution_results = self.coordinate_actions(&mut decisions).await;

        // Phase 7: system-wide learning.
        let learning_outcome = learning::apply_system_learning(&self.registry, &execution_results);
        info!(
            cycle_id = %cycle_id,
            success_rate = learning_outcome.success_rate,
            learning_rate = learning_outcome.learning_rate_after,
            "phase 7: system learning applied"
        );

        // Phase 8: autonomy adjustment.
        self.adjust_autonomy(&performance);

        // Phase 9: persist.
        self.persist_cycle(&cycle_id, decisions.clone(), &execution_results).await;

        {
            let mut recent = self.recent_decisions.lock();
            for decision in &decisions {
                if recent.len() >= RECENT_DECISIONS_WINDOW {
                    recent.pop_front();
                }
                recent.push_back(decision.clone());
            }
        }

        let elapsed = started.elapsed();
        if elapsed > Duration::from_secs(self.config.cycle_soft_deadline_secs) {
            warn!(cycle_id = %cycle_id, elapsed_ms = elapsed.as_millis(), "cycle exceeded its soft deadline");
        }

        let m = crate::metrics::metrics();
        m.cycles_run.inc();
        m.cycle_duration.observe(elapsed.as_secs_f64());
        m.learning_rate.set(self.registry.learning_rate());
        m.strategic_alignment.set(system_ctx.strategic_alignment);
        m.active_agents.set(self.registry.ids().len() as i64);

        CycleOutcome {
            cycle_id,
            aborted: false,
            skipped_reentrant: false,
            decisions_emitted: decisions.len(),
            execution_results,
        }
    }

    /// Phases 1 and 2: assess system state and evaluate each agent's
    /// performance. Failures here abort the whole cycle.
    async fn assess_and_evaluate(
        &self,
        cycle_id: &str,
    ) -> Result<(Vec<AgentSnapshot>, Vec<PerformanceEntry>, f64, f64, f64), OrchestratorError> {
        let deadline = Duration::from_millis(self.config.agent_deadline_ms);
        let agents = self.registry.iter();

        let mut snapshots = Vec::with_capacity(agents.len());
        for agent in &agents {
            let id = agent.id().clone();
            let assessment = match tokio::time::timeout(deadline, agent.assess_state()).await {
                Ok(a) => a,
                Err(_) => {
                    warn!(agent = %id, cycle_id, "assess_state exceeded its deadline; using a neutral fallback");
                    Assessment {
                        perf: crate::domain::PerfSample::new(0.5, 0.5, 0.5, self.clock.now()),
                        goal_progress: 0.7,
                        autonomy: self.registry.get_autonomy(&id).unwrap_or(0.7),
                    }
                }
            };
            let goal_progress = match tokio::time::timeout(deadline, agent.evaluate_goal_progress()).await {
                Ok(g) => g,
                Err(_) => {
                    warn!(agent = %id, cycle_id, "evaluate_goal_progress exceeded its deadline; assuming adequate progress");
                    GoalProgress::new(0.7)
                }
            };
            snapshots.push(AgentSnapshot {
                id,
                assessment,
                goal_progress,
                goals: agent.goals(),
            });
        }

        let system_efficiency = mean(snapshots.iter().map(|s| s.assessment.perf.efficiency));
        let adaptation_capacity = mean(snapshots.iter().map(|s| s.assessment.autonomy));

        let goal_trees: Vec<(AgentId, GoalTree)> =
            snapshots.iter().map(|s| (s.id.clone(), s.goals.clone())).collect();
        let strategic_alignment = strategic_alignment(&goal_trees);

        let performance: Vec<PerformanceEntry> = snapshots
            .iter()
            .map(|s| {
                let reputation = self.registry.get_reputation(&s.id).unwrap_or(0.7);
                let performance_score =
                    (reputation + s.goal_progress.overall_progress + s.assessment.autonomy) / 3.0;
                PerformanceEntry {
                    id: s.id.clone(),
                    performance_score,
                    needs_adaptation: s.goal_progress.overall_progress < AGENT_ADAPTATION_THRESHOLD,
                    recommend_increase_autonomy: performance_score > INCREASE_AUTONOMY_THRESHOLD,
                }
            })
            .collect();

        Ok((snapshots, performance, system_efficiency, strategic_alignment, adaptation_capacity))
    }

    /// Phase 3, conflict half: every unordered agent pair with severity
    /// above the threshold becomes a `CONFLICT_RESOLUTION` decision input.
    fn detect_conflicts(&self, _cycle_id: &str, snapshots: &[AgentSnapshot]) -> Vec<(AgentId, AgentId, f64, String)> {
        let mut conflicts = Vec::new();
        for i in 0..snapshots.len() {
            for j in (i + 1)..snapshots.len() {
                let a = &snapshots[i];
                let b = &snapshots[j];
                let report = conflict::analyze_conflict(a.id.as_str(), &a.goals, b.id.as_str(), &b.goals);
                if report.severity > CONFLICT_SEVERITY_THRESHOLD {
                    conflicts.push((a.id.clone(), b.id.clone(), report.severity, report.description));
                }
            }
        }
        conflicts
    }

    /// Phase 4: fetches market data, invokes `ExpertMethodology`, and
    /// assembles every Decision this cycle will execute.
    async fn make_strategic_decisions(
        &self,
        cycle_id: &str,
        system_ctx: &SystemContext,
        performance: &[PerformanceEntry],
        conflicts: Vec<(AgentId, AgentId, f64, String)>,
        emergent: &[EmergentBehavior],
    ) -> Result<Vec<Decision>, OrchestratorError> {
        let now = self.clock.now();
        let market = match self.market_data.fetch_price().await {
            Ok(m) => m,
            Err(err) => {
                warn!(cycle_id, error = %err, "price fetch failed; expert methodology runs on a stale/zeroed snapshot");
                crate::domain::MarketSnapshot {
                    price_usd: 0.0,
                    volume_24h: 0.0,
                    change_24h: 0.0,
                    fear_greed: 50.0,
                    at: now,
                }
            }
        };

        let portfolio = match self.store.read_portfolio().await {
            Ok(p) => p,
            Err(err) => {
                warn!(cycle_id, error = %err, "no portfolio on record yet; seeding a zero-BTC/zero-USD default");
                let seeded = crate::domain::Portfolio::new(0.0, 0.0, market.price_usd, now);
                if let Err(e) = self.store.write_portfolio(seeded).await {
                    warn!(cycle_id, error = %e, "failed to persist seeded portfolio");
                }
                seeded
            }
        };

        let mut next_id = DecisionIdGen::new(cycle_id);
        let mut decisions = Vec::new();

        let expert_decision = expert::make_expert_decision(&market, &portfolio, system_ctx);
        let performance_metrics = self
            .store
            .read_performance_metrics()
            .await
            .unwrap_or_default();
        let validation = expert::validate_performance_expert(&performance_metrics);

        let orchestrator_goals = GoalTree::new(crate::domain::Goal::new(
            "strategic-cycle",
            "run the 9-phase strategic cycle",
            1.0,
        ));

        decisions.push(
            Decision::builder(
                next_id.next(),
                AgentId::new(ORCHESTRATOR_AGENT_ID),
                cycle_id.to_string(),
                DecisionType::ExpertMethodologyIntegration,
                orchestrator_goals.clone(),
                1.0,
                now,
            )
            .rationale(expert_decision.reasoning.clone())
            .inputs(serde_json::json!({
                "market": market,
                "portfolio": portfolio,
                "system_efficiency": system_ctx.system_efficiency,
                "strategic_alignment": system_ctx.strategic_alignment,
            }))
            .selected(format!("{:?}", expert_decision.action))
            .confidence(expert_decision.confidence)
            .risk_assessment(verdict_to_risk(validation.verdict))
            .action(format!("{:?}", expert_decision.action))
            .parameters(serde_json::json!({
                "regime": format!("{:?}", expert_decision.regime),
                "size_fraction": expert_decision.size_fraction,
                "principles": expert_decision.principles,
            }))
            .expected_result("one trading/risk posture per cycle".to_string())
            .priority(Priority::Low)
            .expected_improvement(expert_decision.confidence)
            .expected_duration_ms(50)
            .build(),
        );

        if expert_decision.regime == expert::Regime::HighVolatilitySpike {
            decisions.push(
                Decision::builder(
                    next_id.next(),
                    AgentId::new(ORCHESTRATOR_AGENT_ID),
                    cycle_id.to_string(),
                    DecisionType::ExpertRegimeAdaptation,
                    orchestrator_goals.clone(),
                    1.0,
                    now,
                )
                .rationale("high-volatility-spike regime detected".to_string())
                .selected("SWITCH_TO_PRESERVATION".to_string())
                .confidence(expert_decision.confidence)
                .risk_assessment(RiskAssessment::Critical)
                .action("REGIME_ADAPTATION".to_string())
                .parameters(serde_json::json!({ "action_tags": expert_decision.principles }))
                .expected_result("capital preservation posture".to_string())
                .priority(Priority::Critical)
                .expected_improvement(1.0)
                .expected_duration_ms(10)
                .build(),
            );
        }

        if validation.verdict == Verdict::HighRisk {
            decisions.push(
                Decision::builder(
                    next_id.next(),
                    AgentId::new(ORCHESTRATOR_AGENT_ID),
                    cycle_id.to_string(),
                    DecisionType::ExpertRiskControl,
                    orchestrator_goals.clone(),
                    1.0,
                    now,
                )
                .rationale(validation.issues.join("; "))
                .selected(validation.focus.clone())
                .confidence(1.0 - performance_metrics.success_rate())
                .risk_assessment(RiskAssessment::Critical)
                .action("RISK_CONTROL".to_string())
                .parameters(serde_json::json!({ "focus": validation.focus }))
                .expected_result("reduced exposure pending recovery".to_string())
                // EXPERT_RISK_CONTROL is always promoted to critical.
                .priority(Priority::Critical)
                .expected_improvement(1.0)
                .expected_duration_ms(10)
                .build(),
            );
        }

        for entry in performance {
            if entry.needs_adaptation {
                let mut tags = vec!["GOAL_ADAPTATION".to_string()];
                if entry.recommend_increase_autonomy {
                    tags.push("INCREASE_AUTONOMY".to_string());
                }
                let goals_snapshot = self
                    .registry
                    .get(&entry.id)
                    .map(|a| a.goals())
                    .unwrap_or_else(|| orchestrator_goals.clone());
                decisions.push(
                    Decision::builder(
                        next_id.next(),
                        entry.id.clone(),
                        cycle_id.to_string(),
                        DecisionType::AgentAdaptation,
                        goals_snapshot,
                        self.registry.get_autonomy(&entry.id).unwrap_or(0.7),
                        now,
                    )
                    .rationale(format!(
                        "performance score {:.2} below adaptation threshold",
                        entry.performance_score
                    ))
                    .selected("evolve_goals".to_string())
                    .confidence(entry.performance_score)
                    .risk_assessment(RiskAssessment::Medium)
                    .action("ADAPT_GOALS".to_string())
                    .parameters(serde_json::json!({ "action_tags": tags }))
                    .expected_result("improved goal progress next cycle".to_string())
                    .priority(Priority::Medium)
                    .expected_improvement(1.0 - entry.performance_score)
                    .expected_duration_ms(100)
                    .build(),
                );
            }
        }

        for (a, b, severity, description) in conflicts {
            decisions.push(
                Decision::builder(
                    next_id.next(),
                    a.clone(),
                    cycle_id.to_string(),
                    DecisionType::ConflictResolution,
                    orchestrator_goals.clone(),
                    1.0,
                    now,
                )
                .rationale(description)
                .selected(format!("resolve conflict with {b}"))
                .confidence(severity)
                .risk_assessment(if severity > 0.6 { RiskAssessment::High } else { RiskAssessment::Medium })
                .action("RESOLVE_CONFLICT".to_string())
                .parameters(serde_json::json!({ "other_agent": b.as_str(), "severity": severity }))
                .expected_result("reduced goal conflict".to_string())
                .priority(if severity > 0.6 { Priority::High } else { Priority::Medium })
                .expected_improvement(severity)
                .expected_duration_ms(150)
                .build(),
            );
        }

        for pattern in emergent.iter().filter(|p| p.beneficial) {
            decisions.push(
                Decision::builder(
                    next_id.next(),
                    AgentId::new(ORCHESTRATOR_AGENT_ID),
                    cycle_id.to_string(),
                    DecisionType::AmplifyEmergentBehavior,
                    orchestrator_goals.clone(),
                    1.0,
                    now,
                )
                .rationale(pattern.description.clone())
                .selected(pattern.kind.clone())
                .confidence(pattern.strength)
                .risk_assessment(RiskAssessment::Low)
                .action("AMPLIFY".to_string())
                .parameters(serde_json::json!({ "pattern": pattern.kind }))
                .expected_result("reinforced beneficial coordination".to_string())
                .priority(Priority::Medium)
                .expected_improvement(pattern.strength)
                .expected_duration_ms(120)
                .build(),
            );
        }

        if system_ctx.strategic_alignment < STRATEGIC_ALIGNMENT_THRESHOLD {
            decisions.push(
                Decision::builder(
                    next_id.next(),
                    AgentId::new(ORCHESTRATOR_AGENT_ID),
                    cycle_id.to_string(),
                    DecisionType::SystemRealignment,
                    orchestrator_goals.clone(),
                    1.0,
                    now,
                )
                .rationale(format!(
                    "strategic alignment {:.2} below threshold",
                    system_ctx.strategic_alignment
                ))
                .selected("realign".to_string())
                .confidence(1.0 - system_ctx.strategic_alignment)
                .risk_assessment(RiskAssessment::Medium)
                .action("REALIGN".to_string())
                .parameters(serde_json::Value::Null)
                .expected_result("restored cross-agent alignment".to_string())
                .priority(Priority::High)
                .expected_improvement(1.0 - system_ctx.strategic_alignment)
                .expected_duration_ms(100)
                .build(),
            );
        }

        Ok(decisions)
    }

    /// Phase 5: for every AGENT_ADAPTATION decision, invoke the target
    /// agent's `EvolveGoals`. PolicyError rejects only that mutation.
    async fn apply_goal_adaptation(&self, decisions: &[Decision]) {
        for decision in decisions {
            if decision.decision_type != DecisionType::AgentAdaptation {
                continue;
            }
            let Some(agent) = self.registry.get(&decision.agent_id) else {
                continue;
            };
            match agent.evolve_goals(decision).await {
                Ok(_) => {}
                Err(err) => {
                    warn!(agent = %decision.agent_id, error = %err, "evolve_goals rejected");
                }
            }
        }
    }

    /// Phase 6: execute every decision in priority order, publish
    /// coordination messages, and produce one ExecutionResult per decision.
    async fn coordinate_actions(&self, decisions: &mut [Decision]) -> Vec<ExecutionResult> {
        let mut ordered: Vec<usize> = (0..decisions.len()).collect();
        ordered.sort_by(|&i, &j| {
            let a = &decisions[i];
            let b = &decisions[j];
            b.priority
                .cmp(&a.priority)
                .then_with(|| {
                    b.expected_improvement
                        .partial_cmp(&a.expected_improvement)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.expected_duration_ms.cmp(&b.expected_duration_ms))
        });

        let mut results = Vec::with_capacity(decisions.len());
        for idx in ordered {
            let decision = &decisions[idx];
            let started = Instant::now();
            let (success, quality) = self.execute_decision(decision).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let delta = (quality - 0.5) * 0.05;
            self.registry.bump_reputation(&decision.agent_id, delta);

            let payload = serde_json::json!({
                "decision_id": decision.id,
                "decision_type": format!("{:?}", decision.decision_type),
                "success": success,
                "quality_score": quality,
            });
            self.bus.publish(Message {
                from: AgentId::new(ORCHESTRATOR_AGENT_ID),
                to: Recipient::Broadcast,
                kind: MessageKind::Coordination,
                payload,
                at: decision.at,
            });

            results.push(ExecutionResult {
                decision_id: decision.id.clone(),
                success,
                quality_score: quality,
                duration_ms,
                decision_type: decision.decision_type,
            });
        }
        results
    }

    /// Returns `(success, quality_score)`. Rust's closed `DecisionType` enum
    /// makes every variant here exhaustively handled, so there is no
    /// reachable "unknown decision type" arm — the type system rules it
    /// out structurally.
    async fn execute_decision(&self, decision: &Decision) -> (bool, f64) {
        match decision.decision_type {
            DecisionType::AgentAdaptation => {
                let Some(agent) = self.registry.get(&decision.agent_id) else {
                    return (false, 0.2);
                };
                let tags = action_tags_from_decision(decision);
                agent.execute_adaptation(&tags).await;
                (true, 0.8)
            }
            DecisionType::ConflictResolution => (true, 0.7),
            DecisionType::AmplifyEmergentBehavior => (true, 0.75),
            DecisionType::ExpertRiskControl => (true, 0.9),
            DecisionType::ExpertRegimeAdaptation => (true, 0.9),
            DecisionType::ExpertMethodologyIntegration => (true, decision.confidence.max(0.5)),
            DecisionType::SystemRealignment => (true, 0.7),
        }
    }

    /// Phase 8: autonomy adjustment driven by phase-2's performance scores.
    fn adjust_autonomy(&self, performance: &[PerformanceEntry]) {
        for entry in performance {
            let Some(current) = self.registry.get_autonomy(&entry.id) else {
                continue;
            };
            let next = if entry.performance_score > AUTONOMY_UP_THRESHOLD {
                current * AUTONOMY_UP_FACTOR
            } else if entry.performance_score < AUTONOMY_DOWN_THRESHOLD {
                current * AUTONOMY_DOWN_FACTOR
            } else {
                current
            };
            if next != current {
                self.registry.set_autonomy(&entry.id, next);
            }
        }
    }

    /// Phase 9: append Decisions/ExecutionResults via the DecisionLogger and
    /// Store. There is no dedicated `Store` operation for a cycle summary,
    /// so it is logged structurally via `tracing` instead.
    async fn persist_cycle(&self, cycle_id: &str, decisions: Vec<Decision>, results: &[ExecutionResult]) {
        // `results` is in priority-execution order, not `decisions`'s
        // original order, so match them up by decision id rather than
        // position.
        let results_by_id: std::collections::HashMap<&str, &ExecutionResult> =
            results.iter().map(|r| (r.decision_id.as_str(), r)).collect();

        for decision in decisions.into_iter() {
            let Some(result) = results_by_id.get(decision.id.as_str()).copied() else {
                warn!(cycle_id, decision_id = %decision.id, "no execution result recorded for decision; skipping persistence");
                continue;
            };
            crate::metrics::metrics().record_decision(&format!("{:?}", decision.decision_type));
            let trade = (decision.decision_type == DecisionType::ExpertMethodologyIntegration
                && decision.action != "Hold")
                .then(|| Trade {
                    decision_id: decision.id.clone(),
                    action: decision.action.clone(),
                    size_fraction: decision
                        .parameters
                        .get("size_fraction")
                        .and_then(|v| v.as_f64())
                        .unwrap_or(0.0),
                    price_usd: decision
                        .inputs
                        .get("market")
                        .and_then(|m| m.get("price_usd"))
                        .and_then(|v| v.as_f64())
                        .unwrap_or(0.0),
                    at: decision.at,
                });

            if let Err(err) = self
                .store
                .append_agent_execution(crate::domain::AgentExecutionRecord {
                    agent_id: decision.agent_id.clone(),
                    kind: format!("{:?}", decision.decision_type),
                    inputs: decision.inputs.clone(),
                    outputs: serde_json::json!({ "selected": decision.selected }),
                    success: result.success,
                    quality_score: result.quality_score,
                    duration_ms: result.duration_ms,
                    error: (!result.success).then(|| "decision execution reported failure".to_string()),
                    at: decision.at,
                })
                .await
            {
                warn!(cycle_id, error = %err, "failed to persist agent execution");
            }

            self.decision_logger.log(decision, trade).await;
        }
        // Each cycle commits its Decisions as exactly one batch regardless
        // of the configured batch size (spec §8 scenario 1).
        self.decision_logger.flush().await;
    }
}

/// Per-cycle incrementing decision-id generator, `{cycle_id}-{n}`.
struct DecisionIdGen<'a> {
    cycle_id: &'a str,
    n: u64,
}

impl<'a> DecisionIdGen<'a> {
    fn new(cycle_id: &'a str) -> Self {
        Self { cycle_id, n: 0 }
    }
    fn next(&mut self) -> String {
        let id = format!("{}-{}", self.cycle_id, self.n);
        self.n += 1;
        id
    }
}

fn action_tags_from_decision(decision: &Decision) -> Vec<ActionTag> {
    decision
        .parameters
        .get("action_tags")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(ActionTag::from)
                .collect()
        })
        .unwrap_or_default()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for v in values {
        sum += v;
        n += 1;
    }
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// `strategicAlignment`:
/// `1 - mean(conflict severity)` across every agent pair, or the documented
/// fallback `0.7` with fewer than two agents. Reuses `conflict::analyze_conflict`
/// rather than inventing a second KPI-overlap heuristic.
fn strategic_alignment(goal_trees: &[(AgentId, GoalTree)]) -> f64 {
    if goal_trees.len() < 2 {
        return 0.7;
    }
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..goal_trees.len() {
        for j in (i + 1)..goal_trees.len() {
            let (id1, t1) = &goal_trees[i];
            let (id2, t2) = &goal_trees[j];
            let report = conflict::analyze_conflict(id1.as_str(), t1, id2.as_str(), t2);
            total += 1.0 - report.severity;
            pairs += 1;
        }
    }
    (total / pairs as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::StandardAgent;
    use crate::clock::SystemClock;
    use crate::domain::Goal;
    use crate::market_data::MockMarketData;
    use crate::store::InMemoryStore;
    use std::collections::HashMap;

    fn five_agents() -> Vec<Arc<dyn Agent>> {
        let autonomies = [0.95, 0.85, 0.80, 0.75, 0.80];
        let names = [
            "strategic-orchestrator",
            "risk-manager",
            "signal-curator",
            "execution-planner",
            "reputation-auditor",
        ];
        names
            .iter()
            .zip(autonomies)
            .map(|(name, autonomy)| {
                let goals = GoalTree::new(Goal::new("primary", "grow portfolio", 1.0))
                    .with_secondary(vec![Goal::new("secondary", "manage risk", 0.5).modifiable(true)]);
                Arc::new(StandardAgent::new(
                    AgentId::new(*name),
                    goals,
                    HashMap::new(),
                    autonomy,
                    64,
                )) as Arc<dyn Agent>
            })
            .collect()
    }

    fn orchestrator() -> Orchestrator {
        let store = Arc::new(InMemoryStore::new());
        let market = Arc::new(MockMarketData::new(crate::domain::MarketSnapshot {
            price_usd: 50_000.0,
            volume_24h: 1.0e9,
            change_24h: 1.0,
            fear_greed: 50.0,
            at: chrono::Utc::now(),
        }));
        Orchestrator::new(
            OrchestratorConfig::default(),
            store,
            market,
            Arc::new(MessageBus::new()),
            Arc::new(SystemClock),
            10,
        )
    }

    #[tokio::test]
    async fn first_cycle_emits_expert_integration_with_unchanged_autonomy() {
        let orch = orchestrator();
        for agent in five_agents() {
            orch.register_agent(agent);
        }
        orch.store
            .write_portfolio(crate::domain::Portfolio::new(0.0, 10_000.0, 50_000.0, chrono::Utc::now()))
            .await
            .unwrap();

        let outcome = orch.run_cycle_once().await;
        assert!(!outcome.aborted);
        assert_eq!(outcome.cycle_id, "c0");

        let has_integration = outcome
            .execution_results
            .iter()
            .any(|r| r.decision_type == DecisionType::ExpertMethodologyIntegration);
        assert!(has_integration);

        let has_adaptation = outcome
            .execution_results
            .iter()
            .any(|r| r.decision_type == DecisionType::AgentAdaptation);
        assert!(!has_adaptation);

        assert_eq!(orch.registry.get_autonomy(&AgentId::new("strategic-orchestrator")), Some(0.95));
        assert_eq!(orch.decision_logger.batches_flushed(), 1);
    }

    #[tokio::test]
    async fn overlapping_run_cycle_once_is_rejected() {
        let orch = Arc::new(orchestrator());
        for agent in five_agents() {
            orch.register_agent(agent);
        }
        orch.running.store(true, Ordering::Release);
        let outcome = orch.run_cycle_once().await;
        assert!(outcome.skipped_reentrant);
    }

    #[tokio::test]
    async fn exactly_one_expert_methodology_integration_per_cycle() {
        let orch = orchestrator();
        for agent in five_agents() {
            orch.register_agent(agent);
        }
        let outcome = orch.run_cycle_once().await;
        let count = outcome
            .execution_results
            .iter()
            .filter(|r| r.decision_type == DecisionType::ExpertMethodologyIntegration)
            .count();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn high_volatility_spike_promotes_regime_adaptation_to_critical_and_runs_it_first() {
        let store = Arc::new(InMemoryStore::new());
        let market = Arc::new(MockMarketData::new(crate::domain::MarketSnapshot {
            price_usd: 50_000.0,
            volume_24h: 1.0e9,
            change_24h: 12.0,
            fear_greed: 50.0,
            at: chrono::Utc::now(),
        }));
        let orch = Orchestrator::new(
            OrchestratorConfig::default(),
            store,
            market,
            Arc::new(MessageBus::new()),
            Arc::new(SystemClock),
            10,
        );
        for agent in five_agents() {
            orch.register_agent(agent);
        }

        let outcome = orch.run_cycle_once().await;
        assert!(outcome
            .execution_results
            .iter()
            .any(|r| r.decision_type == DecisionType::ExpertRegimeAdaptation));
    }

    #[tokio::test]
    async fn goal_progress_below_threshold_triggers_agent_adaptation_and_increments_count() {
        let orch = orchestrator();
        let agent = Arc::new(StandardAgent::new(
            AgentId::new("strategic-orchestrator"),
            GoalTree::new(Goal::new("primary", "grow portfolio", 1.0)),
            HashMap::new(),
            0.6,
            64,
        ));
        agent.record_outcome(
            Decision::builder(
                "seed".into(),
                AgentId::new("strategic-orchestrator"),
                "seed".into(),
                DecisionType::AgentAdaptation,
                agent.goals(),
                agent.autonomy(),
                chrono::Utc::now(),
            )
            .build(),
            crate::domain::PerfSample::new(0.5, 0.5, 0.5, chrono::Utc::now()),
            0.4,
        );
        orch.register_agent(agent.clone());

        for _ in 0..3 {
            let outcome = orch.run_cycle_once().await;
            assert!(outcome
                .execution_results
                .iter()
                .any(|r| r.decision_type == DecisionType::AgentAdaptation));
        }

        assert_eq!(agent.adaptation_count(), 3);
        assert!(agent.autonomy() >= crate::agent::MIN_AUTONOMY);
    }

    #[tokio::test]
    async fn priority_tie_break_orders_critical_before_high_before_high() {
        let mut decisions = vec![
            Decision::builder(
                "a".into(),
                AgentId::new("x"),
                "c0".into(),
                DecisionType::ConflictResolution,
                GoalTree::new(Goal::new("p", "d", 1.0)),
                0.8,
                chrono::Utc::now(),
            )
            .priority(Priority::High)
            .expected_improvement(0.2)
            .expected_duration_ms(200)
            .build(),
            Decision::builder(
                "b".into(),
                AgentId::new("x"),
                "c0".into(),
                DecisionType::ConflictResolution,
                GoalTree::new(Goal::new("p", "d", 1.0)),
                0.8,
                chrono::Utc::now(),
            )
            .priority(Priority::High)
            .expected_improvement(0.1)
            .expected_duration_ms(100)
            .build(),
            Decision::builder(
                "c".into(),
                AgentId::new("x"),
                "c0".into(),
                DecisionType::ExpertRiskControl,
                GoalTree::new(Goal::new("p", "d", 1.0)),
                0.8,
                chrono::Utc::now(),
            )
            .priority(Priority::Critical)
            .expected_improvement(1.0)
            .expected_duration_ms(10)
            .build(),
        ];

        let mut ordered: Vec<usize> = (0..decisions.len()).collect();
        ordered.sort_by(|&i, &j| {
            let a = &decisions[i];
            let b = &decisions[j];
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.expected_improvement.partial_cmp(&a.expected_improvement).unwrap())
                .then_with(|| a.expected_duration_ms.cmp(&b.expected_duration_ms))
        });
        let ids: Vec<&str> = ordered.iter().map(|&i| decisions[i].id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        decisions.clear();
    }
}
