use crate::models::{RiskLevel, Trend};

/// Week-over-week surge multiplier that enrolls a group.
const SURGE_FACTOR: f64 = 1.5;

/// Absolute attitude error-rate ceiling for agents, in percent.
const AGENT_ATTITUDE_LIMIT: f64 = 5.0;

/// Absolute ops error-rate ceiling for agents, in percent.
const AGENT_OPS_LIMIT: f64 = 6.0;

/// Evaluate the group-level enrollment rules. Rules are OR-combined and every
/// matched reason is returned, in rule order, so the list doubles as the
/// audit trail shown to managers. An empty list means "not enrolled".
pub fn group_watch_reasons(
    achievement_probability: u8,
    current_rate: f64,
    previous_week_rate: Option<f64>,
    target_rate: f64,
    trend: Trend,
    risk_level: RiskLevel,
) -> Vec<String> {
    let mut reasons = Vec::new();

    if achievement_probability < 30 {
        reasons.push("목표 달성 확률 30% 미만".to_string());
    }

    if let Some(previous) = previous_week_rate {
        if current_rate > previous * SURGE_FACTOR {
            reasons.push(format!(
                "전주 대비 오류율 50% 이상 급증 ({:.1}% → {:.1}%)",
                previous, current_rate
            ));
        }
    }

    if trend == Trend::Worsening && current_rate > target_rate {
        reasons.push("목표 초과 상태에서 악화 추세".to_string());
    }

    if risk_level == RiskLevel::Critical {
        reasons.push("위험 수준 심각".to_string());
    }

    reasons
}

/// Agent-level rules: absolute thresholds only, strict `>`, no trend or
/// probability involved. The offending rate is quoted in the reason text.
pub fn agent_watch_reasons(attitude_rate: f64, process_rate: f64) -> Vec<String> {
    let mut reasons = Vec::new();

    if attitude_rate > AGENT_ATTITUDE_LIMIT {
        reasons.push(format!(
            "태도 오류율 {:.2}% (기준 {:.1}% 초과)",
            attitude_rate, AGENT_ATTITUDE_LIMIT
        ));
    }

    if process_rate > AGENT_OPS_LIMIT {
        reasons.push(format!(
            "업무 오류율 {:.2}% (기준 {:.1}% 초과)",
            process_rate, AGENT_OPS_LIMIT
        ));
    }

    reasons
}
