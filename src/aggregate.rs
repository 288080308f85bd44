use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};

use crate::forecast::{bucket_day, classify_trend, forecast_month_end, round2, MonthWindow};
use crate::models::{
    AgentDayRow, AgentPrediction, Category, DayRow, GroupPrediction, PredictionResult, RiskLevel,
    TargetConfig, TargetRow, TopError, Trend, WeekBucket, WeeklyRate,
};
use crate::probability::{achievement_probability, ProbabilityModel};
use crate::risk::{classify_risk, worse_of};
use crate::watchlist::{agent_watch_reasons, group_watch_reasons};

/// Resolves the target rate for a center and category: active warehouse rows
/// first, configured per-center defaults otherwise.
pub struct TargetBook<'a> {
    rows: HashMap<(String, Category), f64>,
    config: &'a TargetConfig,
}

impl<'a> TargetBook<'a> {
    pub fn new(rows: Vec<TargetRow>, config: &'a TargetConfig) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| ((row.center, row.category), row.target_rate))
            .collect();
        TargetBook { rows, config }
    }

    pub fn rate_for(&self, center: &str, category: Category) -> f64 {
        self.rows
            .get(&(center.to_string(), category))
            .copied()
            .unwrap_or_else(|| self.config.for_center(center).rate_for(category))
    }
}

#[derive(Debug, Clone, Copy)]
struct DaySample {
    date: NaiveDate,
    errors: f64,
    score: f64,
    evals: i64,
}

/// One metric's assembled month: elapsed-month rate plus weekly buckets.
#[derive(Debug, Clone, Default)]
struct MetricSeries {
    current_rate: f64,
    weekly: Vec<WeeklyRate>,
}

impl MetricSeries {
    fn rates(&self) -> Vec<f64> {
        self.weekly.iter().map(|w| w.rate).collect()
    }
}

/// Bucket day samples into W1..W4 and reduce to rates. Weeks with no scored
/// evaluations produce no point rather than a zero.
fn series_from_days(days: &[DaySample]) -> MetricSeries {
    let mut buckets: BTreeMap<WeekBucket, (f64, f64, u32)> = BTreeMap::new();
    let mut error_total = 0.0;
    let mut score_total = 0.0;

    for day in days {
        let entry = buckets
            .entry(bucket_day(day.date.day()))
            .or_insert((0.0, 0.0, 0));
        entry.0 += day.errors;
        entry.1 += day.score;
        entry.2 += day.evals.max(0) as u32;
        error_total += day.errors;
        score_total += day.score;
    }

    let weekly = buckets
        .into_iter()
        .filter(|(_, (_, score, _))| *score > 0.0)
        .map(|(week, (errors, score, samples))| WeeklyRate {
            week,
            rate: round2(errors / score * 100.0),
            sample_count: samples,
        })
        .collect();

    let current_rate = if score_total > 0.0 {
        round2(error_total / score_total * 100.0)
    } else {
        0.0
    };

    MetricSeries {
        current_rate,
        weekly,
    }
}

/// Run the full pipeline for one metric of one dimension.
fn predict_metric(
    series: &MetricSeries,
    target: f64,
    window: &MonthWindow,
    model: ProbabilityModel,
) -> PredictionResult {
    let weekly = series.rates();
    let trend = classify_trend(&weekly);
    let forecast =
        forecast_month_end(series.current_rate, &weekly, window.days_passed, window.days_remaining);
    let probability =
        achievement_probability(model, forecast.predicted, target, &weekly, trend);
    let risk_level = classify_risk(probability, forecast.predicted, target, trend);

    PredictionResult {
        current_rate: series.current_rate,
        predicted_rate: forecast.predicted,
        target_rate: target,
        achievement_probability: probability,
        trend,
        risk_level,
        weekly_rates: weekly,
        w4_predicted: forecast.w4_predicted,
    }
}

/// Combine the two sub-metric trends: worsening if either worsens, improving
/// only if both improve.
fn combine_trends(a: Trend, b: Trend) -> Trend {
    if a == Trend::Worsening || b == Trend::Worsening {
        Trend::Worsening
    } else if a == Trend::Improving && b == Trend::Improving {
        Trend::Improving
    } else {
        Trend::Stable
    }
}

/// Element-wise mean of the two weekly series over the union of their weeks;
/// a week present on one side only contributes that side alone.
fn blend_weekly(attitude: &MetricSeries, ops: &MetricSeries) -> Vec<f64> {
    let mut merged: BTreeMap<WeekBucket, Vec<f64>> = BTreeMap::new();
    for rate in attitude.weekly.iter().chain(ops.weekly.iter()) {
        merged.entry(rate.week).or_default().push(rate.rate);
    }
    merged
        .into_values()
        .map(|rates| round2(rates.iter().sum::<f64>() / rates.len() as f64))
        .collect()
}

/// Blend attitude and ops into the total prediction: unweighted means of the
/// rates (the two categories count equally), the trend-combine rule, and a
/// fresh risk classification over the blended values.
fn blend_total(
    attitude_series: &MetricSeries,
    ops_series: &MetricSeries,
    attitude: &PredictionResult,
    ops: &PredictionResult,
    model: ProbabilityModel,
) -> PredictionResult {
    let current_rate = round2((attitude.current_rate + ops.current_rate) / 2.0);
    let predicted_rate = round2((attitude.predicted_rate + ops.predicted_rate) / 2.0);
    let target_rate = round2((attitude.target_rate + ops.target_rate) / 2.0);
    let w4_predicted = round2((attitude.w4_predicted + ops.w4_predicted) / 2.0);
    let trend = combine_trends(attitude.trend, ops.trend);
    let weekly_rates = blend_weekly(attitude_series, ops_series);
    let probability =
        achievement_probability(model, predicted_rate, target_rate, &weekly_rates, trend);
    let risk_level = classify_risk(probability, predicted_rate, target_rate, trend);

    PredictionResult {
        current_rate,
        predicted_rate,
        target_rate,
        achievement_probability: probability,
        trend,
        risk_level,
        weekly_rates,
        w4_predicted,
    }
}

fn previous_week_rate(weekly: &[f64]) -> Option<f64> {
    if weekly.len() >= 2 {
        Some(weekly[weekly.len() - 2])
    } else {
        None
    }
}

/// Build ranked group predictions for one month of warehouse day rows.
pub fn build_group_predictions(
    rows: &[DayRow],
    targets: &TargetBook<'_>,
    window: &MonthWindow,
    model: ProbabilityModel,
) -> Vec<GroupPrediction> {
    let mut dimensions: BTreeMap<(String, String, String), HashMap<Category, Vec<DaySample>>> =
        BTreeMap::new();

    for row in rows {
        let key = (row.center.clone(), row.service.clone(), row.channel.clone());
        dimensions.entry(key).or_default().entry(row.category).or_default().push(
            DaySample {
                date: row.date,
                errors: row.error_sum,
                score: row.score_sum,
                evals: row.eval_count,
            },
        );
    }

    let mut predictions: Vec<GroupPrediction> = dimensions
        .into_iter()
        .map(|((center, service, channel), mut days)| {
            let attitude_series =
                series_from_days(&days.remove(&Category::Attitude).unwrap_or_default());
            let ops_series = series_from_days(&days.remove(&Category::Ops).unwrap_or_default());

            let attitude_prediction = predict_metric(
                &attitude_series,
                targets.rate_for(&center, Category::Attitude),
                window,
                model,
            );
            let process_prediction = predict_metric(
                &ops_series,
                targets.rate_for(&center, Category::Ops),
                window,
                model,
            );
            let total_prediction = blend_total(
                &attitude_series,
                &ops_series,
                &attitude_prediction,
                &process_prediction,
                model,
            );

            let evaluation_count: u32 = attitude_series
                .weekly
                .iter()
                .chain(ops_series.weekly.iter())
                .map(|w| w.sample_count)
                .sum();
            let overall_risk =
                worse_of(attitude_prediction.risk_level, process_prediction.risk_level);
            let alert_flag = attitude_prediction.achievement_probability < 30
                || process_prediction.achievement_probability < 30
                || overall_risk == RiskLevel::Critical;
            let watch_reasons = group_watch_reasons(
                total_prediction.achievement_probability,
                total_prediction.current_rate,
                previous_week_rate(&total_prediction.weekly_rates),
                total_prediction.target_rate,
                total_prediction.trend,
                total_prediction.risk_level,
            );

            GroupPrediction {
                center,
                service,
                channel,
                attitude_prediction,
                process_prediction,
                total_prediction,
                overall_risk,
                alert_flag,
                watch_reasons,
                evaluation_count,
            }
        })
        .collect();

    rank_groups(&mut predictions);
    predictions
}

/// Worst first: overall severity, then how far the blended projection sits
/// over its target.
fn rank_groups(predictions: &mut [GroupPrediction]) {
    predictions.sort_by(|a, b| {
        b.overall_risk
            .severity()
            .cmp(&a.overall_risk.severity())
            .then_with(|| {
                over_target_ratio(&b.total_prediction)
                    .partial_cmp(&over_target_ratio(&a.total_prediction))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
}

fn over_target_ratio(prediction: &PredictionResult) -> f64 {
    if prediction.target_rate > 0.0 {
        prediction.predicted_rate / prediction.target_rate
    } else {
        prediction.predicted_rate
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub total_groups: usize,
    pub at_risk_groups: usize,
}

pub fn summarize_groups(predictions: &[GroupPrediction]) -> GroupSummary {
    GroupSummary {
        total_groups: predictions.len(),
        at_risk_groups: predictions.iter().filter(|p| p.alert_flag).count(),
    }
}

/// Build ranked agent predictions. Trend and risk come from the agent's
/// combined error series against the blended center target; the attitude and
/// ops rates feed the absolute watch-list thresholds.
pub fn build_agent_predictions(
    rows: &[AgentDayRow],
    top_errors: &HashMap<String, Vec<TopError>>,
    targets: &TargetBook<'_>,
    window: &MonthWindow,
    model: ProbabilityModel,
) -> Vec<AgentPrediction> {
    struct AgentDays {
        agent_name: String,
        center: String,
        team: String,
        by_category: HashMap<Category, Vec<DaySample>>,
        combined: HashMap<NaiveDate, (f64, f64, i64)>,
    }

    let mut agents: BTreeMap<String, AgentDays> = BTreeMap::new();

    for row in rows {
        let entry = agents.entry(row.agent_id.clone()).or_insert_with(|| AgentDays {
            agent_name: row.agent_name.clone(),
            center: row.center.clone(),
            team: row.team.clone(),
            by_category: HashMap::new(),
            combined: HashMap::new(),
        });
        entry.by_category.entry(row.category).or_default().push(DaySample {
            date: row.date,
            errors: row.error_sum,
            score: row.score_sum,
            evals: row.eval_count,
        });
        let combined = entry.combined.entry(row.date).or_insert((0.0, 0.0, 0));
        combined.0 += row.error_sum;
        combined.1 += row.score_sum;
        combined.2 += row.eval_count;
    }

    let mut predictions: Vec<AgentPrediction> = agents
        .into_iter()
        .map(|(agent_id, mut agent)| {
            let attitude_series = series_from_days(
                &agent.by_category.remove(&Category::Attitude).unwrap_or_default(),
            );
            let ops_series =
                series_from_days(&agent.by_category.remove(&Category::Ops).unwrap_or_default());
            let combined_days: Vec<DaySample> = agent
                .combined
                .into_iter()
                .map(|(date, (errors, score, evals))| DaySample {
                    date,
                    errors,
                    score,
                    evals,
                })
                .collect();
            let combined_series = series_from_days(&combined_days);

            let pair = (
                targets.rate_for(&agent.center, Category::Attitude),
                targets.rate_for(&agent.center, Category::Ops),
            );
            let target_rate = round2((pair.0 + pair.1) / 2.0);

            let weekly = combined_series.rates();
            let trend = classify_trend(&weekly);
            let forecast = forecast_month_end(
                combined_series.current_rate,
                &weekly,
                window.days_passed,
                window.days_remaining,
            );
            let probability =
                achievement_probability(model, forecast.predicted, target_rate, &weekly, trend);
            let risk_level = classify_risk(probability, forecast.predicted, target_rate, trend);

            let total_rate =
                round2((attitude_series.current_rate + ops_series.current_rate) / 2.0);
            let watch_reasons =
                agent_watch_reasons(attitude_series.current_rate, ops_series.current_rate);
            let evaluation_count: u32 = attitude_series
                .weekly
                .iter()
                .chain(ops_series.weekly.iter())
                .map(|w| w.sample_count)
                .sum();

            AgentPrediction {
                agent_name: agent.agent_name,
                center: agent.center,
                group: agent.team,
                attitude_rate: attitude_series.current_rate,
                process_rate: ops_series.current_rate,
                total_rate,
                trend,
                risk_level,
                watch_reasons,
                top_errors: top_errors.get(&agent_id).cloned().unwrap_or_default(),
                evaluation_count,
                agent_id,
            }
        })
        .collect();

    predictions.sort_by(|a, b| {
        b.risk_level
            .severity()
            .cmp(&a.risk_level.severity())
            .then_with(|| {
                b.total_rate
                    .partial_cmp(&a.total_rate)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
    predictions
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub total_agents: usize,
    pub watch_listed: usize,
}

pub fn summarize_agents(predictions: &[AgentPrediction]) -> AgentSummary {
    AgentSummary {
        total_agents: predictions.len(),
        watch_listed: predictions
            .iter()
            .filter(|p| !p.watch_reasons.is_empty())
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, day).unwrap()
    }

    fn window() -> MonthWindow {
        MonthWindow::new(2026, 7, date(19)).unwrap()
    }

    fn day_row(
        center: &str,
        category: Category,
        day: u32,
        errors: f64,
        score: f64,
    ) -> DayRow {
        DayRow {
            center: center.to_string(),
            service: "billing".to_string(),
            channel: "phone".to_string(),
            category,
            date: date(day),
            error_sum: errors,
            score_sum: score,
            eval_count: 1,
        }
    }

    #[test]
    fn series_buckets_days_into_weeks() {
        let days = vec![
            DaySample { date: date(2), errors: 2.0, score: 100.0, evals: 1 },
            DaySample { date: date(4), errors: 2.0, score: 100.0, evals: 1 },
            DaySample { date: date(10), errors: 6.0, score: 100.0, evals: 2 },
            DaySample { date: date(15), errors: 4.0, score: 100.0, evals: 1 },
        ];
        let series = series_from_days(&days);
        assert_eq!(series.weekly.len(), 3);
        assert_eq!(series.weekly[0].week, WeekBucket::W1);
        assert_eq!(series.weekly[0].rate, 2.0);
        assert_eq!(series.weekly[0].sample_count, 2);
        assert_eq!(series.weekly[1].rate, 6.0);
        assert_eq!(series.weekly[2].rate, 4.0);
        assert_eq!(series.current_rate, 3.5);
    }

    #[test]
    fn empty_series_degrades_to_zero_rate() {
        let series = series_from_days(&[]);
        assert_eq!(series.current_rate, 0.0);
        assert!(series.weekly.is_empty());
    }

    #[test]
    fn stable_group_under_target_is_low_risk_and_unenrolled() {
        // 1% across two weeks against a 3% target
        let rows = vec![
            day_row("C", Category::Attitude, 3, 1.0, 100.0),
            day_row("C", Category::Attitude, 10, 1.0, 100.0),
            day_row("C", Category::Ops, 3, 1.0, 100.0),
            day_row("C", Category::Ops, 10, 1.0, 100.0),
        ];
        let config = TargetConfig::default();
        let book = TargetBook::new(Vec::new(), &config);
        let predictions =
            build_group_predictions(&rows, &book, &window(), ProbabilityModel::Statistical);

        assert_eq!(predictions.len(), 1);
        let group = &predictions[0];
        assert_eq!(group.total_prediction.trend, Trend::Stable);
        assert_eq!(group.total_prediction.current_rate, 1.0);
        assert!(group.total_prediction.achievement_probability >= 70);
        assert_eq!(group.total_prediction.risk_level, RiskLevel::Low);
        assert_eq!(group.overall_risk, RiskLevel::Low);
        assert!(!group.alert_flag);
        assert!(group.watch_reasons.is_empty());
        assert_eq!(group.evaluation_count, 4);
    }

    #[test]
    fn surging_group_is_flagged_and_ranked_first() {
        let calm = vec![
            day_row("A", Category::Attitude, 3, 1.0, 100.0),
            day_row("A", Category::Attitude, 10, 1.0, 100.0),
            day_row("A", Category::Ops, 3, 1.0, 100.0),
            day_row("A", Category::Ops, 10, 1.0, 100.0),
        ];
        let mut surging: Vec<DayRow> = vec![
            day_row("A", Category::Attitude, 3, 2.0, 100.0),
            day_row("A", Category::Attitude, 10, 5.0, 100.0),
            day_row("A", Category::Attitude, 15, 9.0, 100.0),
            day_row("A", Category::Ops, 3, 3.0, 100.0),
            day_row("A", Category::Ops, 10, 6.0, 100.0),
            day_row("A", Category::Ops, 15, 9.0, 100.0),
        ];
        for row in &mut surging {
            row.service = "tech-support".to_string();
        }

        let rows: Vec<DayRow> = calm.into_iter().chain(surging).collect();
        let config = TargetConfig::default();
        let book = TargetBook::new(Vec::new(), &config);
        let predictions =
            build_group_predictions(&rows, &book, &window(), ProbabilityModel::Statistical);

        assert_eq!(predictions.len(), 2);
        let worst = &predictions[0];
        assert_eq!(worst.service, "tech-support");
        assert_eq!(worst.total_prediction.trend, Trend::Worsening);
        assert!(worst.alert_flag);
        assert!(!worst.watch_reasons.is_empty());
        assert!(worst.overall_risk.severity() >= predictions[1].overall_risk.severity());
    }

    #[test]
    fn warehouse_targets_override_config_defaults() {
        let config = TargetConfig::default();
        let book = TargetBook::new(
            vec![TargetRow {
                center: "A".to_string(),
                category: Category::Attitude,
                target_rate: 1.5,
            }],
            &config,
        );
        assert_eq!(book.rate_for("A", Category::Attitude), 1.5);
        assert_eq!(book.rate_for("A", Category::Ops), 3.9);
        assert_eq!(book.rate_for("B", Category::Attitude), 2.7);
    }

    #[test]
    fn trend_combine_rules() {
        assert_eq!(combine_trends(Trend::Worsening, Trend::Improving), Trend::Worsening);
        assert_eq!(combine_trends(Trend::Improving, Trend::Improving), Trend::Improving);
        assert_eq!(combine_trends(Trend::Improving, Trend::Stable), Trend::Stable);
        assert_eq!(combine_trends(Trend::Stable, Trend::Stable), Trend::Stable);
    }

    #[test]
    fn blended_weekly_takes_means_over_week_union() {
        let attitude = MetricSeries {
            current_rate: 2.0,
            weekly: vec![
                WeeklyRate { week: WeekBucket::W1, rate: 2.0, sample_count: 1 },
                WeeklyRate { week: WeekBucket::W2, rate: 3.0, sample_count: 1 },
            ],
        };
        let ops = MetricSeries {
            current_rate: 4.0,
            weekly: vec![
                WeeklyRate { week: WeekBucket::W2, rate: 5.0, sample_count: 1 },
                WeeklyRate { week: WeekBucket::W3, rate: 6.0, sample_count: 1 },
            ],
        };
        assert_eq!(blend_weekly(&attitude, &ops), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn agents_over_threshold_are_watch_listed() {
        let mk = |category: Category, day: u32, errors: f64| AgentDayRow {
            agent_id: "A-1042".to_string(),
            agent_name: "김하늘".to_string(),
            center: "A".to_string(),
            team: "1팀".to_string(),
            category,
            date: date(day),
            error_sum: errors,
            score_sum: 100.0,
            eval_count: 1,
        };
        let rows = vec![
            mk(Category::Attitude, 3, 5.0),
            mk(Category::Attitude, 10, 6.0),
            mk(Category::Ops, 3, 2.0),
            mk(Category::Ops, 10, 2.0),
        ];
        let config = TargetConfig::default();
        let book = TargetBook::new(Vec::new(), &config);
        let top = HashMap::new();
        let predictions = build_agent_predictions(
            &rows,
            &top,
            &book,
            &window(),
            ProbabilityModel::Statistical,
        );

        assert_eq!(predictions.len(), 1);
        let agent = &predictions[0];
        assert_eq!(agent.attitude_rate, 5.5);
        assert_eq!(agent.process_rate, 2.0);
        assert_eq!(agent.total_rate, 3.75);
        assert_eq!(agent.watch_reasons.len(), 1);
        assert!(agent.watch_reasons[0].contains("태도"));
        let summary = summarize_agents(&predictions);
        assert_eq!(summary.total_agents, 1);
        assert_eq!(summary.watch_listed, 1);
    }

    #[test]
    fn group_summary_counts_alerts() {
        let rows = vec![
            day_row("C", Category::Attitude, 3, 1.0, 100.0),
            day_row("C", Category::Attitude, 10, 1.0, 100.0),
            day_row("C", Category::Ops, 3, 1.0, 100.0),
            day_row("C", Category::Ops, 10, 1.0, 100.0),
        ];
        let config = TargetConfig::default();
        let book = TargetBook::new(Vec::new(), &config);
        let predictions =
            build_group_predictions(&rows, &book, &window(), ProbabilityModel::Statistical);
        let summary = summarize_groups(&predictions);
        assert_eq!(summary.total_groups, 1);
        assert_eq!(summary.at_risk_groups, 0);
    }
}
