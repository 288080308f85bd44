use crate::models::Trend;

/// tanh-based approximation of the standard normal CDF: sqrt(2/pi).
const CDF_SLOPE: f64 = 0.797885;

/// Floor applied to the weekly standard deviation when variance is zero.
const MIN_STD_DEV: f64 = 0.5;

/// The two achievement-probability formulas carried over from the legacy
/// system. They compute materially different numbers for the same inputs;
/// which one is authoritative is an open product question, so both stay
/// selectable. `Statistical` is the default because it is backed by the
/// actual weekly variance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbabilityModel {
    #[default]
    Statistical,
    TrendHeuristic,
}

impl ProbabilityModel {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "statistical" => Some(ProbabilityModel::Statistical),
            "trend" => Some(ProbabilityModel::TrendHeuristic),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProbabilityModel::Statistical => "statistical",
            ProbabilityModel::TrendHeuristic => "trend",
        }
    }
}

/// Probability, in whole percent [0, 100], that the dimension ends the month
/// at or under its target rate.
pub fn achievement_probability(
    model: ProbabilityModel,
    predicted: f64,
    target: f64,
    weekly_rates: &[f64],
    trend: Trend,
) -> u8 {
    match model {
        ProbabilityModel::Statistical => statistical(predicted, target, weekly_rates),
        ProbabilityModel::TrendHeuristic => trend_heuristic(predicted, target, trend),
    }
}

fn statistical(predicted: f64, target: f64, weekly_rates: &[f64]) -> u8 {
    if weekly_rates.len() < 2 {
        return if predicted <= target { 70 } else { 30 };
    }

    let n = weekly_rates.len() as f64;
    let mean = weekly_rates.iter().sum::<f64>() / n;
    let variance = weekly_rates
        .iter()
        .map(|rate| (rate - mean).powi(2))
        .sum::<f64>()
        / n;
    let std_dev = if variance == 0.0 {
        MIN_STD_DEV
    } else {
        variance.sqrt()
    };

    let z_score = (target - predicted) / std_dev;
    let probability = 100.0 * 0.5 * (1.0 + (CDF_SLOPE * z_score).tanh());
    clamp_percent(probability)
}

fn trend_heuristic(predicted: f64, target: f64, trend: Trend) -> u8 {
    let base = if target > f64::EPSILON {
        100.0 - ((predicted - target) / target) * 100.0
    } else if predicted <= target {
        100.0
    } else {
        0.0
    };

    let adjusted = match trend {
        Trend::Improving => base + 10.0,
        Trend::Stable => base,
        Trend::Worsening => base - 15.0,
    };
    clamp_percent(adjusted)
}

fn clamp_percent(value: f64) -> u8 {
    value.clamp(0.0, 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_history_short_circuits_to_coarse_defaults() {
        assert_eq!(
            achievement_probability(ProbabilityModel::Statistical, 2.5, 3.0, &[2.5], Trend::Stable),
            70
        );
        assert_eq!(
            achievement_probability(ProbabilityModel::Statistical, 3.5, 3.0, &[], Trend::Stable),
            30
        );
    }

    #[test]
    fn zero_variance_uses_the_std_dev_floor() {
        // mean 1.0, variance 0 -> std dev floored at 0.5, z = (3 - 1) / 0.5 = 4
        let probability = achievement_probability(
            ProbabilityModel::Statistical,
            1.0,
            3.0,
            &[1.0, 1.0],
            Trend::Stable,
        );
        assert!(probability >= 99);
    }

    #[test]
    fn statistical_probability_tracks_distance_to_target() {
        let close = achievement_probability(
            ProbabilityModel::Statistical,
            3.15,
            3.0,
            &[2.8, 3.0, 3.2],
            Trend::Worsening,
        );
        let far = achievement_probability(
            ProbabilityModel::Statistical,
            4.5,
            3.0,
            &[2.8, 3.0, 3.2],
            Trend::Worsening,
        );
        assert!(close > far);
        assert!(close < 50);
        assert_eq!(far, 0);
    }

    #[test]
    fn probability_is_always_a_percentage() {
        let extremes = [
            (0.0, 100.0, vec![0.0, 0.0]),
            (100.0, 0.1, vec![50.0, 100.0]),
            (5.0, 5.0, vec![5.0, 5.0, 5.0]),
        ];
        for (predicted, target, weekly) in extremes {
            let p = achievement_probability(
                ProbabilityModel::Statistical,
                predicted,
                target,
                &weekly,
                Trend::Stable,
            );
            assert!(p <= 100);
        }
    }

    #[test]
    fn heuristic_applies_trend_adjustments() {
        // base = 100 - ((3.3 - 3.0) / 3.0) * 100 = 90
        assert_eq!(
            achievement_probability(ProbabilityModel::TrendHeuristic, 3.3, 3.0, &[], Trend::Stable),
            90
        );
        assert_eq!(
            achievement_probability(
                ProbabilityModel::TrendHeuristic,
                3.3,
                3.0,
                &[],
                Trend::Improving
            ),
            100
        );
        assert_eq!(
            achievement_probability(
                ProbabilityModel::TrendHeuristic,
                3.3,
                3.0,
                &[],
                Trend::Worsening
            ),
            75
        );
    }

    #[test]
    fn heuristic_clamps_to_percentage_bounds() {
        assert_eq!(
            achievement_probability(
                ProbabilityModel::TrendHeuristic,
                9.0,
                3.0,
                &[],
                Trend::Worsening
            ),
            0
        );
        assert_eq!(
            achievement_probability(
                ProbabilityModel::TrendHeuristic,
                0.5,
                3.0,
                &[],
                Trend::Improving
            ),
            100
        );
    }

    #[test]
    fn model_names_round_trip() {
        assert_eq!(
            ProbabilityModel::parse("statistical"),
            Some(ProbabilityModel::Statistical)
        );
        assert_eq!(
            ProbabilityModel::parse("trend"),
            Some(ProbabilityModel::TrendHeuristic)
        );
        assert_eq!(ProbabilityModel::parse("bayes"), None);
        assert_eq!(ProbabilityModel::Statistical.label(), "statistical");
    }
}
