//! Pure expert trading methodology. No I/O: every function
//! here is a deterministic fold over its inputs, which is what makes
//! `MakeExpertDecision` replayable in tests without a fake clock or a
//! mocked `Store`. Grounded in the pack's `warning_engine.rs`-style
//! categorical market-regime read (`Noderrxyz-Old-Trading-Bot`), adapted
//! from its warning taxonomy to this spec's regime/action/risk taxonomy.

use crate::domain::{MarketSnapshot, PerformanceMetrics, Portfolio};

pub const MAX_SIZE_FRACTION: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Trending,
    ChoppyRangeBound,
    HighVolatilitySpike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone)]
pub struct ExpertDecision {
    pub regime: Regime,
    pub action: Action,
    pub size_fraction: f64,
    pub confidence: f64,
    pub reasoning: String,
    pub principles: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    Watch,
    HighRisk,
}

#[derive(Debug, Clone)]
pub struct PerformanceValidation {
    pub verdict: Verdict,
    pub focus: String,
    pub issues: Vec<String>,
}

/// Aggregate system-level context the orchestrator threads into the expert
///.
#[derive(Debug, Clone, Copy)]
pub struct SystemContext {
    pub system_efficiency: f64,
    pub strategic_alignment: f64,
    pub adaptation_capacity: f64,
    pub learning_rate: f64,
}

/// Volatility threshold above which the regime is classified a spike
/// rather than a mere trend (percent, matching `MarketSnapshot.change_24h`).
const HIGH_VOLATILITY_CHANGE_PCT: f64 = 8.0;
const TRENDING_CHANGE_PCT: f64 = 2.0;

fn classify_regime(market: &MarketSnapshot) -> Regime {
    let change = market.change_24h.abs();
    if change > HIGH_VOLATILITY_CHANGE_PCT {
        Regime::HighVolatilitySpike
    } else if change > TRENDING_CHANGE_PCT {
        Regime::Trending
    } else {
        Regime::ChoppyRangeBound
    }
}

/// `MakeExpertDecision`. Pure: same inputs, same output.
pub fn make_expert_decision(
    market: &MarketSnapshot,
    portfolio: &Portfolio,
    system: &SystemContext,
) -> ExpertDecision {
    let regime = classify_regime(market);
    let confidence = (system.system_efficiency * 0.5 + system.adaptation_capacity * 0.5).clamp(0.0, 1.0);

    let (action, size_fraction, reasoning, mut principles) = match regime {
        Regime::HighVolatilitySpike => (
            Action::Hold,
            0.0,
            format!(
                "24h change {:.2}% exceeds the volatility-spike threshold; preserving capital",
                market.change_24h
            ),
            vec![
                "SWITCH_TO_PRESERVATION".to_string(),
                "REDUCE_LEVERAGE".to_string(),
                "WAIT_FOR_STABILITY".to_string(),
            ],
        ),
        Regime::Trending if market.change_24h > 0.0 => (
            Action::Buy,
            (confidence * MAX_SIZE_FRACTION).min(MAX_SIZE_FRACTION),
            format!("bullish trend, 24h change {:.2}%", market.change_24h),
            vec!["FOLLOW_TREND".to_string(), "SIZE_BY_CONFIDENCE".to_string()],
        ),
        Regime::Trending => (
            Action::Sell,
            (confidence * MAX_SIZE_FRACTION).min(MAX_SIZE_FRACTION),
            format!("bearish trend, 24h change {:.2}%", market.change_24h),
            vec!["FOLLOW_TREND".to_string(), "SIZE_BY_CONFIDENCE".to_string()],
        ),
        Regime::ChoppyRangeBound => (
            Action::Hold,
            0.0,
            "range-bound market offers no directional edge".to_string(),
            vec!["AWAIT_BREAKOUT".to_string()],
        ),
    };

    principles.push(format!("learning_rate={:.3}", system.learning_rate));
    let _ = portfolio;

    ExpertDecision {
        regime,
        action,
        size_fraction: size_fraction.min(MAX_SIZE_FRACTION),
        confidence,
        reasoning,
        principles,
    }
}

/// `ValidatePerformanceExpert`.
pub fn validate_performance_expert(metrics: &PerformanceMetrics) -> PerformanceValidation {
    let success_rate = metrics.success_rate();
    let mut issues = Vec::new();

    let verdict = if success_rate < 0.5 {
        issues.push(format!("success rate {success_rate:.2} below 0.5"));
        Verdict::HighRisk
    } else if success_rate < 0.8 {
        issues.push(format!("success rate {success_rate:.2} below 0.8"));
        Verdict::Watch
    } else {
        Verdict::Ok
    };

    let focus = match verdict {
        Verdict::HighRisk => "execution reliability".to_string(),
        Verdict::Watch => "decision quality".to_string(),
        Verdict::Ok => "none".to_string(),
    };

    PerformanceValidation {
        verdict,
        focus,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn market(change_24h: f64) -> MarketSnapshot {
        MarketSnapshot {
            price_usd: 50_000.0,
            volume_24h: 1.0,
            change_24h,
            fear_greed: 50.0,
            at: Utc::now(),
        }
    }

    fn portfolio() -> Portfolio {
        Portfolio::new(1.0, 1_000.0, 50_000.0, Utc::now())
    }

    fn system_ctx() -> SystemContext {
        SystemContext {
            system_efficiency: 0.8,
            strategic_alignment: 0.9,
            adaptation_capacity: 0.8,
            learning_rate: 0.1,
        }
    }

    #[test]
    fn high_volatility_spike_holds_with_zero_size() {
        let decision = make_expert_decision(&market(12.0), &portfolio(), &system_ctx());
        assert_eq!(decision.regime, Regime::HighVolatilitySpike);
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.size_fraction, 0.0);
        assert!(decision.principles.contains(&"SWITCH_TO_PRESERVATION".to_string()));
    }

    #[test]
    fn size_fraction_never_exceeds_cap() {
        let decision = make_expert_decision(&market(5.0), &portfolio(), &system_ctx());
        assert!(decision.size_fraction <= MAX_SIZE_FRACTION);
    }

    #[test]
    fn validate_performance_flags_high_risk_below_half() {
        let metrics = PerformanceMetrics {
            total_executions: 10,
            successful_executions: 3,
            average_quality_score: 0.4,
        };
        let validation = validate_performance_expert(&metrics);
        assert_eq!(validation.verdict, Verdict::HighRisk);
    }

    #[test]
    fn validate_performance_ok_above_threshold() {
        let metrics = PerformanceMetrics {
            total_executions: 10,
            successful_executions: 9,
            average_quality_score: 0.9,
        };
        let validation = validate_performance_expert(&metrics);
        assert_eq!(validation.verdict, Verdict::Ok);
        assert!(validation.issues.is_empty());
    }
}
