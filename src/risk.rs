use crate::models::{RiskLevel, Trend};

/// Map a prediction onto a discrete risk tier.
///
/// The rules are evaluated in priority order and the first match wins: a
/// dimension with a high achievement probability lands in `Low` even when its
/// projected rate is far over target. Probability dominates the raw-ratio
/// checks on purpose.
pub fn classify_risk(probability: u8, predicted: f64, target: f64, trend: Trend) -> RiskLevel {
    if probability >= 70 && matches!(trend, Trend::Improving | Trend::Stable) {
        return RiskLevel::Low;
    }
    if probability >= 40 && predicted <= target * 1.1 {
        return RiskLevel::Medium;
    }
    if probability >= 20 || predicted <= target * 1.3 {
        return RiskLevel::High;
    }
    RiskLevel::Critical
}

/// Roll two sub-metric tiers up to the worse one.
pub fn worse_of(a: RiskLevel, b: RiskLevel) -> RiskLevel {
    if b.severity() > a.severity() {
        b
    } else {
        a
    }
}
