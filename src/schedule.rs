//! Monitoring schedule expressions.
//!
//! The schedule surface is the five-field cron subset the bot actually
//! offers as monitoring frequencies (every N minutes/hours, hourly, daily).
//! Each supported expression maps to a fixed period; the scheduler sleeps
//! that period between cycles.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("schedule must have 5 fields, got {0}")]
    FieldCount(usize),
    #[error("unsupported schedule expression: {0}")]
    Unsupported(String),
    #[error("schedule step must be positive")]
    ZeroStep,
}

/// A parsed schedule with a fixed period between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    period: Duration,
}

impl Schedule {
    /// Parse a cron-style expression into a schedule.
    ///
    /// Supported forms: `*/N * * * *`, `0 * * * *`, `0 */N * * *` and
    /// `0 0 * * *`. Anything else is rejected rather than silently
    /// approximated.
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleError::FieldCount(fields.len()));
        }
        let (minute, hour, dom, month, dow) =
            (fields[0], fields[1], fields[2], fields[3], fields[4]);
        if dom != "*" || month != "*" || dow != "*" {
            return Err(ScheduleError::Unsupported(expression.to_string()));
        }

        let period = match (parse_field(minute)?, parse_field(hour)?) {
            // "*/N * * * *" - every N minutes
            (Field::Step(n), Field::Any) => Duration::from_secs(n * 60),
            // "0 * * * *" - hourly
            (Field::Fixed(0), Field::Any) => Duration::from_secs(3600),
            // "0 */N * * *" - every N hours
            (Field::Fixed(0), Field::Step(n)) => Duration::from_secs(n * 3600),
            // "0 0 * * *" - daily
            (Field::Fixed(0), Field::Fixed(0)) => Duration::from_secs(24 * 3600),
            _ => return Err(ScheduleError::Unsupported(expression.to_string())),
        };

        Ok(Self { period })
    }

    /// Fixed period between cycle starts.
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.period.as_secs();
        if secs % 3600 == 0 {
            write!(f, "every {}h", secs / 3600)
        } else {
            write!(f, "every {}m", secs / 60)
        }
    }
}

enum Field {
    Any,
    Fixed(u64),
    Step(u64),
}

fn parse_field(field: &str) -> Result<Field, ScheduleError> {
    if field == "*" {
        return Ok(Field::Any);
    }
    if let Some(step) = field.strip_prefix("*/") {
        let n: u64 = step
            .parse()
            .map_err(|_| ScheduleError::Unsupported(field.to_string()))?;
        if n == 0 {
            return Err(ScheduleError::ZeroStep);
        }
        return Ok(Field::Step(n));
    }
    field
        .parse()
        .map(Field::Fixed)
        .map_err(|_| ScheduleError::Unsupported(field.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_n_minutes() {
        let schedule = Schedule::parse("*/5 * * * *").unwrap();
        assert_eq!(schedule.period(), Duration::from_secs(300));
        assert_eq!(schedule.to_string(), "every 5m");
    }

    #[test]
    fn hourly_and_every_n_hours() {
        assert_eq!(
            Schedule::parse("0 * * * *").unwrap().period(),
            Duration::from_secs(3600)
        );
        assert_eq!(
            Schedule::parse("0 */6 * * *").unwrap().period(),
            Duration::from_secs(6 * 3600)
        );
    }

    #[test]
    fn daily() {
        let schedule = Schedule::parse("0 0 * * *").unwrap();
        assert_eq!(schedule.period(), Duration::from_secs(86400));
        assert_eq!(schedule.to_string(), "every 24h");
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert_eq!(
            Schedule::parse("*/5 * * *"),
            Err(ScheduleError::FieldCount(4))
        );
    }

    #[test]
    fn rejects_unsupported_forms() {
        assert!(Schedule::parse("15 3 * * 1").is_err());
        assert!(Schedule::parse("*/5 * 1 * *").is_err());
        assert!(Schedule::parse("a b * * *").is_err());
    }

    #[test]
    fn rejects_zero_step() {
        assert_eq!(Schedule::parse("*/0 * * * *"), Err(ScheduleError::ZeroStep));
    }
}
