//! Five-field cron expression parsing and evaluation.
//!
//! Fields are minute, hour,
//! day-of-month, month, day-of-week, in that order, each one of:
//! - `*` (any value)
//! - a single number
//! - a range `a-b`
//! - a step `*/n` or `a-b/n`
//! - a comma-separated list of any of the above

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use crate::error::CronError;

/// One parsed field: the set of values for which this field matches.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Field(Vec<u32>);

impl Field {
    fn contains(&self, value: u32) -> bool {
        self.0.contains(&value)
    }

    fn parse(raw: &str, min: u32, max: u32, field_name: &str, expression: &str) -> Result<Self, CronError> {
        let mut values = Vec::new();
        for part in raw.split(',') {
            values.extend(Self::parse_part(part, min, max, field_name, expression)?);
        }
        values.sort_unstable();
        values.dedup();
        if values.is_empty() {
            return Err(CronError::InvalidExpression {
                expression: expression.to_string(),
                reason: format!("{field_name} field '{raw}' produced no values"),
            });
        }
        Ok(Self(values))
    }

    fn parse_part(part: &str, min: u32, max: u32, field_name: &str, expression: &str) -> Result<Vec<u32>, CronError> {
        let invalid = |reason: String| CronError::InvalidExpression { expression: expression.to_string(), reason };

        let (range_part, step) = match part.split_once('/') {
            Some((range_part, step_str)) => {
                let step: u32 = step_str
                    .parse()
                    .map_err(|_| invalid(format!("{field_name} step '{step_str}' is not a number")))?;
                if step == 0 {
                    return Err(invalid(format!("{field_name} step must be non-zero")));
                }
                (range_part, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range_part == "*" {
            (min, max)
        } else if let Some((lo, hi)) = range_part.split_once('-') {
            let lo: u32 = lo.parse().map_err(|_| invalid(format!("{field_name} range start '{lo}' is not a number")))?;
            let hi: u32 = hi.parse().map_err(|_| invalid(format!("{field_name} range end '{hi}' is not a number")))?;
            (lo, hi)
        } else {
            let value: u32 = range_part
                .parse()
                .map_err(|_| invalid(format!("{field_name} value '{range_part}' is not a number")))?;
            (value, value)
        };

        if start < min || end > max || start > end {
            return Err(invalid(format!(
                "{field_name} range {start}-{end} out of bounds {min}-{max}"
            )));
        }

        Ok((start..=end).step_by(step as usize).collect())
    }
}

/// A parsed cron schedule, ready to be evaluated against a point in time.
///
/// Evaluation is performed in UTC; a timezone offset is the caller's
/// concern (the original config carries an optional IANA timezone name
/// alongside the expression but this crate does not interpret it itself).
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
    day_of_month_restricted: bool,
    day_of_week_restricted: bool,
}

/// Safety bound on how far into the future `next_after` will search before
/// giving up. Five-field cron expressions always have a match within a
/// year; two years leaves ample margin for leap-year day-of-month/month
/// combinations.
const MAX_LOOKAHEAD_MINUTES: i64 = 2 * 366 * 24 * 60;

impl CronSchedule {
    /// Parses a 5-field cron expression: minute hour day-of-month month
    /// day-of-week.
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::InvalidExpression {
                expression: expression.to_string(),
                reason: format!("expected 5 fields, got {}", fields.len()),
            });
        }

        let minute = Field::parse(fields[0], 0, 59, "minute", expression)?;
        let hour = Field::parse(fields[1], 0, 23, "hour", expression)?;
        let day_of_month = Field::parse(fields[2], 1, 31, "day-of-month", expression)?;
        let month = Field::parse(fields[3], 1, 12, "month", expression)?;
        // day-of-week accepts 0-7 where both 0 and 7 mean Sunday.
        let mut day_of_week = Field::parse(fields[4], 0, 7, "day-of-week", expression)?;
        if day_of_week.0.contains(&7) {
            if !day_of_week.0.contains(&0) {
                day_of_week.0.push(0);
            }
            day_of_week.0.retain(|&v| v != 7);
            day_of_week.0.sort_unstable();
        }

        Ok(Self {
            day_of_month_restricted: fields[2] != "*",
            day_of_week_restricted: fields[4] != "*",
            expression: expression.to_string(),
            minute,
            hour,
            day_of_month,
            month,
            day_of_week,
        })
    }

    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn matches_day(&self, dom: u32, dow: u32) -> bool {
        match (self.day_of_month_restricted, self.day_of_week_restricted) {
            (false, false) => true,
            (true, false) => self.day_of_month.contains(dom),
            (false, true) => self.day_of_week.contains(dow),
            // Standard cron semantics: when both are restricted, a day
            // matching either field is a match (logical OR).
            (true, true) => self.day_of_month.contains(dom) || self.day_of_week.contains(dow),
        }
    }

    /// Returns the first instant strictly after `after` at which this
    /// schedule fires.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(after)
            + Duration::minutes(1);

        let mut candidate = start;
        for _ in 0..MAX_LOOKAHEAD_MINUTES {
            if self.month.contains(candidate.month())
                && self.matches_day(candidate.day(), candidate.weekday().num_days_from_sunday())
                && self.hour.contains(candidate.hour())
                && self.minute.contains(candidate.minute())
            {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().expect("valid datetime")
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(CronSchedule::parse("* * *").is_err());
    }

    #[test]
    fn rejects_out_of_range_value() {
        assert!(CronSchedule::parse("60 * * * *").is_err());
    }

    #[test]
    fn every_minute() {
        let sched = CronSchedule::parse("* * * * *").expect("parse");
        let after = dt(2026, 3, 1, 10, 30);
        assert_eq!(sched.next_after(after), Some(dt(2026, 3, 1, 10, 31)));
    }

    #[test]
    fn daily_nine_am_weekdays_only() {
        // 0 9 * * 1 => Monday at 09:00
        let sched = CronSchedule::parse("0 9 * * 1").expect("parse");
        // 2026-07-27 is a Monday.
        let after = dt(2026, 7, 27, 10, 0);
        let next = sched.next_after(after).expect("has next");
        assert_eq!(next, dt(2026, 8, 3, 9, 0));
    }

    #[test]
    fn strictly_after_exact_match() {
        let sched = CronSchedule::parse("0 9 * * 1").expect("parse");
        let at_fire_time = dt(2026, 7, 27, 9, 0);
        let next = sched.next_after(at_fire_time).expect("has next");
        assert!(next > at_fire_time);
        assert_eq!(next, dt(2026, 8, 3, 9, 0));
    }

    #[test]
    fn step_values() {
        let sched = CronSchedule::parse("*/15 * * * *").expect("parse");
        let after = dt(2026, 1, 1, 0, 1);
        assert_eq!(sched.next_after(after), Some(dt(2026, 1, 1, 0, 15)));
    }

    #[test]
    fn day_of_month_or_day_of_week_is_union() {
        // Fires on the 1st of the month OR any Friday.
        let sched = CronSchedule::parse("0 0 1 * 5").expect("parse");
        // 2026-07-27 is a Monday; next Friday is 2026-07-31, before the 1st.
        let after = dt(2026, 7, 27, 0, 0);
        let next = sched.next_after(after).expect("has next");
        assert_eq!(next, dt(2026, 7, 31, 0, 0));
    }

    #[test]
    fn invalid_step_zero() {
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
    }

    #[test]
    fn sunday_as_seven_normalizes_to_zero() {
        let sched = CronSchedule::parse("0 0 * * 7").expect("parse");
        assert!(sched.day_of_week.contains(0));
        assert!(!sched.day_of_week.contains(7));
    }
}
