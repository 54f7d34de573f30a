//! Cron schedule parsing and next-run estimation.
//!
//! Accepts standard 5-field cron (`min hour dom month dow`, Sunday = 0 or 7)
//! as well as the 6/7-field form with a leading seconds column. 5-field
//! expressions are normalised to the seconds form before parsing.

use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::AppError;

/// A validated cron schedule.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    inner: cron::Schedule,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, AppError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let invalid = |reason: String| AppError::InvalidSchedule {
            schedule: expression.to_string(),
            reason,
        };

        let normalized = match fields.len() {
            5 => format!(
                "0 {} {} {} {} {}",
                fields[0],
                fields[1],
                fields[2],
                fields[3],
                translate_day_of_week(fields[4])
            ),
            6 | 7 => fields.join(" "),
            n => return Err(invalid(format!("expected 5, 6 or 7 fields, got {n}"))),
        };

        let inner = cron::Schedule::from_str(&normalized).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            expression: fields.join(" "),
            inner,
        })
    }

    /// The expression as supplied (whitespace-normalised).
    pub fn as_str(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.inner.after(after).next()
    }

    /// The next `count` fire times strictly after `after`.
    pub fn upcoming(&self, after: &DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.inner.after(after).take(count).collect()
    }
}

/// Validate a schedule string without keeping the parsed form.
pub fn validate_schedule(expression: &str) -> Result<(), AppError> {
    CronSchedule::parse(expression).map(|_| ())
}

/// Map numeric day-of-week values from standard cron (0-7, Sunday = 0 or 7)
/// to the 1-7 (Sunday = 1) numbering of the `cron` crate. Names such as
/// `MON` pass through untouched.
fn translate_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(|part| {
            let (base, step) = match part.split_once('/') {
                Some((b, s)) => (b, Some(s)),
                None => (part, None),
            };
            let with_step = |s: String| match step {
                Some(step) => format!("{s}/{step}"),
                None => s,
            };

            if let Some((start, end)) = base.split_once('-') {
                match (shift_dow(start), shift_dow(end)) {
                    (Some(a), Some(b)) if a <= b => with_step(format!("{a}-{b}")),
                    // Wrapped past Saturday, e.g. `5-7` becomes `6-7,1`.
                    (Some(a), Some(b)) => format!(
                        "{},{}",
                        with_step(format!("{a}-7")),
                        with_step(format!("1-{b}"))
                    ),
                    _ => with_step(base.to_string()),
                }
            } else {
                match shift_dow(base) {
                    Some(n) => with_step(n.to_string()),
                    None => with_step(base.to_string()),
                }
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn shift_dow(token: &str) -> Option<u8> {
    let n: u8 = token.parse().ok()?;
    (n <= 7).then_some(n % 7 + 1)
}

/// Computes when a job should next run, given its schedule string.
///
/// Swappable so deployments can trade accuracy for the legacy fixed-offset
/// behaviour.
pub trait NextRunEstimator: Send + Sync {
    fn next_run(&self, schedule: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>>;
}

/// Exact next fire time from cron arithmetic.
#[derive(Debug, Default, Clone, Copy)]
pub struct CronEstimator;

impl NextRunEstimator for CronEstimator {
    fn next_run(&self, schedule: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        CronSchedule::parse(schedule).ok()?.next_after(&now)
    }
}

/// Legacy approximation: `now + offset`, ignoring the schedule entirely.
#[derive(Debug, Clone, Copy)]
pub struct FixedOffsetEstimator {
    pub offset: TimeDelta,
}

impl Default for FixedOffsetEstimator {
    fn default() -> Self {
        Self {
            offset: TimeDelta::hours(1),
        }
    }
}

impl NextRunEstimator for FixedOffsetEstimator {
    fn next_run(&self, _schedule: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        Some(now + self.offset)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn parses_five_field_expression() {
        let s = CronSchedule::parse("*/15 * * * *").unwrap();
        assert_eq!(s.as_str(), "*/15 * * * *");
        assert_eq!(
            s.next_after(&at(2026, 3, 1, 10, 7)),
            Some(at(2026, 3, 1, 10, 15))
        );
    }

    #[test]
    fn parses_six_field_expression() {
        let s = CronSchedule::parse("0 30 2 * * *").unwrap();
        assert_eq!(
            s.next_after(&at(2026, 3, 1, 10, 0)),
            Some(at(2026, 3, 2, 2, 30))
        );
    }

    #[test]
    fn daily_midnight_rolls_to_next_day() {
        let s = CronSchedule::parse("0 0 * * *").unwrap();
        assert_eq!(
            s.next_after(&at(2026, 3, 1, 0, 0)),
            Some(at(2026, 3, 2, 0, 0))
        );
        assert_eq!(s.upcoming(&at(2026, 3, 1, 12, 0), 2).len(), 2);
    }

    #[test]
    fn rejects_malformed_expressions() {
        for bad in ["", "every hour", "* * *", "61 * * * *", "* * * * * * * *"] {
            let err = CronSchedule::parse(bad).unwrap_err();
            assert!(
                matches!(err, AppError::InvalidSchedule { .. }),
                "expected InvalidSchedule for {bad:?}, got {err:?}"
            );
        }
        assert!(validate_schedule("0 * * * *").is_ok());
    }

    #[test]
    fn translates_standard_day_of_week_numbers() {
        assert_eq!(translate_day_of_week("0"), "1");
        assert_eq!(translate_day_of_week("7"), "1");
        assert_eq!(translate_day_of_week("1-5"), "2-6");
        assert_eq!(translate_day_of_week("0,6"), "1,7");
        assert_eq!(translate_day_of_week("5-7"), "6-7,1-1");
        assert_eq!(translate_day_of_week("*"), "*");
        assert_eq!(translate_day_of_week("MON-FRI"), "MON-FRI");
        assert_eq!(translate_day_of_week("*/2"), "*/2");
    }

    #[test]
    fn cron_estimator_uses_schedule() {
        let now = at(2026, 3, 1, 10, 7);
        assert_eq!(
            CronEstimator.next_run("0 12 * * *", now),
            Some(at(2026, 3, 1, 12, 0))
        );
        assert_eq!(CronEstimator.next_run("garbage", now), None);
    }

    #[test]
    fn fixed_offset_estimator_adds_an_hour() {
        let now = at(2026, 3, 1, 10, 7);
        assert_eq!(
            FixedOffsetEstimator::default().next_run("0 12 * * 1", now),
            Some(at(2026, 3, 1, 11, 7))
        );
    }
}
