use std::fmt::Write;

use crate::models::{AgentPrediction, GroupPrediction, RiskLevel};

fn risk_mix(groups: &[GroupPrediction]) -> Vec<(RiskLevel, usize)> {
    [
        RiskLevel::Critical,
        RiskLevel::High,
        RiskLevel::Medium,
        RiskLevel::Low,
    ]
    .into_iter()
    .map(|tier| {
        (
            tier,
            groups.iter().filter(|g| g.overall_risk == tier).count(),
        )
    })
    .collect()
}

pub fn build_report(
    scope: Option<&str>,
    month: &str,
    groups: &[GroupPrediction],
    agents: &[AgentPrediction],
) -> String {
    let mut output = String::new();
    let scope_label = scope.unwrap_or("all centers");

    let _ = writeln!(output, "# Quality Early Warning Report");
    let _ = writeln!(output, "Generated for {} ({})", scope_label, month);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Mix");

    if groups.is_empty() {
        let _ = writeln!(output, "No evaluated groups for this month.");
    } else {
        for (tier, count) in risk_mix(groups) {
            let _ = writeln!(output, "- {}: {} groups", tier.label(), count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Watch List");

    let enrolled: Vec<&GroupPrediction> = groups
        .iter()
        .filter(|g| !g.watch_reasons.is_empty())
        .collect();

    if enrolled.is_empty() {
        let _ = writeln!(output, "No groups enrolled for this month.");
    } else {
        for group in enrolled.iter().take(10) {
            let total = &group.total_prediction;
            let _ = writeln!(
                output,
                "- {}/{}/{}: {:.2}% now, {:.2}% projected (target {:.2}%, {}% to hit it)",
                group.center,
                group.service,
                group.channel,
                total.current_rate,
                total.predicted_rate,
                total.target_rate,
                total.achievement_probability
            );
            for reason in &group.watch_reasons {
                let _ = writeln!(output, "  - {}", reason);
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Agents To Watch");

    let flagged: Vec<&AgentPrediction> = agents
        .iter()
        .filter(|a| !a.watch_reasons.is_empty())
        .collect();

    if flagged.is_empty() {
        let _ = writeln!(output, "No agents over the absolute thresholds.");
    } else {
        for agent in flagged.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({}, {} {}) attitude {:.2}% / ops {:.2}%, risk {}",
                agent.agent_name,
                agent.agent_id,
                agent.center,
                agent.group,
                agent.attitude_rate,
                agent.process_rate,
                agent.risk_level.label()
            );
            for reason in &agent.watch_reasons {
                let _ = writeln!(output, "  - {}", reason);
            }
            for item in agent.top_errors.iter().take(3) {
                let _ = writeln!(
                    output,
                    "  - 주요 오류: {} ({}건, {:.2}%)",
                    item.name, item.count, item.rate
                );
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PredictionResult, TopError, Trend};

    fn prediction(risk: RiskLevel) -> PredictionResult {
        PredictionResult {
            current_rate: 4.0,
            predicted_rate: 4.5,
            target_rate: 3.0,
            achievement_probability: 20,
            trend: Trend::Worsening,
            risk_level: risk,
            weekly_rates: vec![3.0, 4.0],
            w4_predicted: 5.0,
        }
    }

    fn group(risk: RiskLevel, reasons: Vec<String>) -> GroupPrediction {
        GroupPrediction {
            center: "A".to_string(),
            service: "billing".to_string(),
            channel: "phone".to_string(),
            attitude_prediction: prediction(risk),
            process_prediction: prediction(risk),
            total_prediction: prediction(risk),
            overall_risk: risk,
            alert_flag: !reasons.is_empty(),
            watch_reasons: reasons,
            evaluation_count: 8,
        }
    }

    #[test]
    fn report_lists_watch_reasons_under_their_group() {
        let groups = vec![
            group(RiskLevel::Critical, vec!["위험 수준 심각".to_string()]),
            group(RiskLevel::Low, Vec::new()),
        ];
        let agents = vec![AgentPrediction {
            agent_id: "A-1042".to_string(),
            agent_name: "김하늘".to_string(),
            center: "A".to_string(),
            group: "1팀".to_string(),
            attitude_rate: 5.5,
            process_rate: 2.0,
            total_rate: 3.75,
            trend: Trend::Stable,
            risk_level: RiskLevel::High,
            watch_reasons: vec!["태도 오류율 5.5% (기준 5.0% 초과)".to_string()],
            top_errors: vec![TopError {
                name: "불친절 응대".to_string(),
                count: 3,
                rate: 2.5,
            }],
            evaluation_count: 12,
        }];

        let report = build_report(Some("A"), "2026-07", &groups, &agents);
        assert!(report.contains("# Quality Early Warning Report"));
        assert!(report.contains("Generated for A (2026-07)"));
        assert!(report.contains("- critical: 1 groups"));
        assert!(report.contains("A/billing/phone"));
        assert!(report.contains("위험 수준 심각"));
        assert!(report.contains("김하늘"));
        assert!(report.contains("불친절 응대"));
    }

    #[test]
    fn empty_report_keeps_its_sections() {
        let report = build_report(None, "2026-07", &[], &[]);
        assert!(report.contains("No evaluated groups for this month."));
        assert!(report.contains("No groups enrolled for this month."));
        assert!(report.contains("No agents over the absolute thresholds."));
        assert!(report.contains("all centers"));
    }
}
