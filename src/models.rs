use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Fixed calendar-day week buckets within a month: days 1-5, 6-12, 13-19, 20-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum WeekBucket {
    W1,
    W2,
    W3,
    W4,
}

/// The two top-level evaluation categories tracked per dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Attitude,
    Ops,
}

impl Category {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "attitude" => Some(Category::Attitude),
            "ops" => Some(Category::Ops),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Worsening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Severity ranking used for roll-ups: critical=4 > high=3 > medium=2 > low=1.
    pub fn severity(self) -> u8 {
        match self {
            RiskLevel::Low => 1,
            RiskLevel::Medium => 2,
            RiskLevel::High => 3,
            RiskLevel::Critical => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// One aggregated week of a dimension's error rate. Built per request from
/// warehouse day rows, never persisted.
#[derive(Debug, Clone, Copy)]
pub struct WeeklyRate {
    pub week: WeekBucket,
    pub rate: f64,
    pub sample_count: u32,
}

/// Forecast output for one metric (attitude or ops) of one dimension.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub current_rate: f64,
    pub predicted_rate: f64,
    pub target_rate: f64,
    /// Always clamped to [0, 100].
    pub achievement_probability: u8,
    pub trend: Trend,
    pub risk_level: RiskLevel,
    pub weekly_rates: Vec<f64>,
    pub w4_predicted: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPrediction {
    pub center: String,
    pub service: String,
    pub channel: String,
    pub attitude_prediction: PredictionResult,
    pub process_prediction: PredictionResult,
    pub total_prediction: PredictionResult,
    /// Worse of the two sub-metric risk tiers.
    pub overall_risk: RiskLevel,
    pub alert_flag: bool,
    /// Empty list means "not enrolled on the watch list".
    pub watch_reasons: Vec<String>,
    pub evaluation_count: u32,
}

/// A ranked error item for one agent. Computed by the warehouse query,
/// consumed as-is here.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopError {
    pub name: String,
    pub count: u32,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPrediction {
    pub agent_id: String,
    pub agent_name: String,
    pub center: String,
    pub group: String,
    pub attitude_rate: f64,
    pub process_rate: f64,
    pub total_rate: f64,
    pub trend: Trend,
    pub risk_level: RiskLevel,
    pub watch_reasons: Vec<String>,
    pub top_errors: Vec<TopError>,
    pub evaluation_count: u32,
}

/// Per-day aggregate for one group dimension and category, as returned by the
/// warehouse layer.
#[derive(Debug, Clone)]
pub struct DayRow {
    pub center: String,
    pub service: String,
    pub channel: String,
    pub category: Category,
    pub date: NaiveDate,
    pub error_sum: f64,
    pub score_sum: f64,
    pub eval_count: i64,
}

/// Per-day aggregate for one agent and category.
#[derive(Debug, Clone)]
pub struct AgentDayRow {
    pub agent_id: String,
    pub agent_name: String,
    pub center: String,
    pub team: String,
    pub category: Category,
    pub date: NaiveDate,
    pub error_sum: f64,
    pub score_sum: f64,
    pub eval_count: i64,
}

/// An active target row from the warehouse.
#[derive(Debug, Clone)]
pub struct TargetRow {
    pub center: String,
    pub category: Category,
    pub target_rate: f64,
}

/// Target rates for the two categories of one center.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TargetPair {
    pub attitude: f64,
    pub ops: f64,
}

impl TargetPair {
    pub fn rate_for(self, category: Category) -> f64 {
        match category {
            Category::Attitude => self.attitude,
            Category::Ops => self.ops,
        }
    }
}

/// Per-center default targets, applied when the warehouse has no active
/// target row. The built-in values are kept for parity with the legacy
/// dashboard; a JSON override file may replace any of them.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    centers: HashMap<String, TargetPair>,
    fallback: TargetPair,
}

impl Default for TargetConfig {
    fn default() -> Self {
        let mut centers = HashMap::new();
        centers.insert(
            "A".to_string(),
            TargetPair {
                attitude: 3.3,
                ops: 3.9,
            },
        );
        centers.insert(
            "B".to_string(),
            TargetPair {
                attitude: 2.7,
                ops: 1.7,
            },
        );
        TargetConfig {
            centers,
            fallback: TargetPair {
                attitude: 3.0,
                ops: 3.0,
            },
        }
    }
}

impl TargetConfig {
    pub fn for_center(&self, center: &str) -> TargetPair {
        self.centers.get(center).copied().unwrap_or(self.fallback)
    }

    /// Merge overrides loaded from a JSON file. The key "default" replaces
    /// the fallback pair; every other key is a center name.
    pub fn apply_overrides(&mut self, overrides: HashMap<String, TargetPair>) {
        for (center, pair) in overrides {
            if center == "default" {
                self.fallback = pair;
            } else {
                self.centers.insert(center, pair);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_targets_match_legacy_constants() {
        let config = TargetConfig::default();
        let a = config.for_center("A");
        assert_eq!(a.attitude, 3.3);
        assert_eq!(a.ops, 3.9);
        let b = config.for_center("B");
        assert_eq!(b.attitude, 2.7);
        assert_eq!(b.ops, 1.7);
        let other = config.for_center("C");
        assert_eq!(other.attitude, 3.0);
        assert_eq!(other.ops, 3.0);
    }

    #[test]
    fn overrides_replace_center_and_fallback() {
        let mut config = TargetConfig::default();
        let mut overrides = HashMap::new();
        overrides.insert(
            "A".to_string(),
            TargetPair {
                attitude: 2.0,
                ops: 2.5,
            },
        );
        overrides.insert(
            "default".to_string(),
            TargetPair {
                attitude: 4.0,
                ops: 4.0,
            },
        );
        config.apply_overrides(overrides);
        assert_eq!(config.for_center("A").attitude, 2.0);
        assert_eq!(config.for_center("Z").ops, 4.0);
        assert_eq!(config.for_center("B").attitude, 2.7);
    }

    #[test]
    fn severity_orders_risk_tiers() {
        assert!(RiskLevel::Critical.severity() > RiskLevel::High.severity());
        assert!(RiskLevel::High.severity() > RiskLevel::Medium.severity());
        assert!(RiskLevel::Medium.severity() > RiskLevel::Low.severity());
    }
}
