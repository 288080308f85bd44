use chrono::{Datelike, NaiveDate};

use crate::models::{Trend, WeekBucket};

/// Noise band for week-over-week deltas, in percentage points.
const TREND_NOISE_BAND: f64 = 0.3;

/// Map a day of month (1-31) to its week bucket.
pub fn bucket_day(day: u32) -> WeekBucket {
    match day {
        0..=5 => WeekBucket::W1,
        6..=12 => WeekBucket::W2,
        13..=19 => WeekBucket::W3,
        _ => WeekBucket::W4,
    }
}

/// Label the trajectory from the two most recent weekly rates. Fewer than two
/// points is not an error: it resolves to `Stable`.
pub fn classify_trend(weekly_rates: &[f64]) -> Trend {
    if weekly_rates.len() < 2 {
        return Trend::Stable;
    }
    let delta = weekly_rates[weekly_rates.len() - 1] - weekly_rates[weekly_rates.len() - 2];
    if delta < -TREND_NOISE_BAND {
        Trend::Improving
    } else if delta > TREND_NOISE_BAND {
        Trend::Worsening
    } else {
        Trend::Stable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Forecast {
    pub predicted: f64,
    pub w4_predicted: f64,
}

/// Project the month-end error rate.
///
/// The delta between the two most recent weeks is carried forward one more
/// week (floored at zero) to estimate W4, then the observed rate and the W4
/// estimate are blended by elapsed vs. remaining days. With fewer than two
/// weekly points the current rate is carried through unchanged.
pub fn forecast_month_end(
    current_rate: f64,
    weekly_rates: &[f64],
    days_passed: u32,
    days_remaining: u32,
) -> Forecast {
    if weekly_rates.len() < 2 {
        return Forecast {
            predicted: round2(current_rate),
            w4_predicted: round2(current_rate),
        };
    }

    let last = weekly_rates[weekly_rates.len() - 1];
    let weekly_change = last - weekly_rates[weekly_rates.len() - 2];
    let w4_predicted = (last + weekly_change).max(0.0);

    let total_days = days_passed + days_remaining;
    let predicted = if total_days == 0 {
        current_rate
    } else {
        (current_rate * f64::from(days_passed) + w4_predicted * f64::from(days_remaining))
            / f64::from(total_days)
    };

    Forecast {
        predicted: round2(predicted),
        w4_predicted: round2(w4_predicted),
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Calendar window of the month being forecast. `days_passed` and
/// `days_remaining` are derived from an injected `today` so every consumer of
/// this window stays clock-free and testable.
#[derive(Debug, Clone, Copy)]
pub struct MonthWindow {
    pub year: i32,
    pub month: u32,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub days_in_month: u32,
    pub days_passed: u32,
    pub days_remaining: u32,
}

impl MonthWindow {
    pub fn new(year: i32, month: u32, today: NaiveDate) -> Option<Self> {
        let days_in_month = days_in_month(year, month);
        let first_day = NaiveDate::from_ymd_opt(year, month, 1)?;
        let last_day = NaiveDate::from_ymd_opt(year, month, days_in_month)?;
        let days_passed = if today < first_day {
            0
        } else if today > last_day {
            days_in_month
        } else {
            today.day()
        };
        Some(MonthWindow {
            year,
            month,
            first_day,
            last_day,
            days_in_month,
            days_passed,
            days_remaining: days_in_month - days_passed,
        })
    }

    pub fn for_today(today: NaiveDate) -> Option<Self> {
        MonthWindow::new(today.year(), today.month(), today)
    }

    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

/// Resolve the requested month, falling back to the current calendar month
/// when the argument is missing or malformed.
pub fn resolve_window(month: Option<&str>, today: NaiveDate) -> Option<MonthWindow> {
    month
        .and_then(parse_month)
        .and_then(|(year, month)| MonthWindow::new(year, month, today))
        .or_else(|| MonthWindow::for_today(today))
}

/// Parse a "YYYY-MM" month label.
pub fn parse_month(value: &str) -> Option<(i32, u32)> {
    let (year, month) = value.split_once('-')?;
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some((year, month))
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        _ => 28,
    }
}
