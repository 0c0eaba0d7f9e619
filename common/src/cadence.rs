// Sweep cadence parsing and next-run calculation

use crate::errors::CadenceError;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// When a background task fires: a cron expression evaluated in a timezone,
/// or a simple fixed rate anchored to the previous run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SweepCadence {
    Cron {
        /// Quartz-style expression with second precision
        expression: String,
        timezone: Tz,
    },
    FixedRate {
        interval_seconds: u32,
    },
}

impl SweepCadence {
    /// Hourly performance sweep, on the hour
    pub fn hourly(timezone: Tz) -> Self {
        Self::Cron {
            expression: "0 0 * * * *".to_string(),
            timezone,
        }
    }

    /// Nightly model training at 03:00 local time
    pub fn nightly_training(timezone: Tz) -> Self {
        Self::Cron {
            expression: "0 0 3 * * *".to_string(),
            timezone,
        }
    }

    /// Next time this cadence should fire, strictly after `last` (or now)
    pub fn next_run(&self, last: Option<DateTime<Utc>>) -> Result<DateTime<Utc>, CadenceError> {
        match self {
            Self::Cron {
                expression,
                timezone,
            } => {
                let schedule = parse_cron_expression(expression)?;
                let reference = last.unwrap_or_else(Utc::now).with_timezone(timezone);
                let next = schedule
                    .after(&reference)
                    .next()
                    .ok_or_else(|| CadenceError::NoNextRun {
                        cadence_type: "cron".to_string(),
                    })?;
                Ok(next.with_timezone(&Utc))
            }
            Self::FixedRate { interval_seconds } => match last {
                Some(last) => Ok(last + Duration::seconds(i64::from(*interval_seconds))),
                None => Ok(Utc::now()),
            },
        }
    }

    /// Validate without computing a run time
    pub fn validate(&self) -> Result<(), CadenceError> {
        if let Self::Cron { expression, .. } = self {
            parse_cron_expression(expression)?;
        }
        Ok(())
    }
}

/// Parse and validate a Quartz-style cron expression
pub fn parse_cron_expression(expression: &str) -> Result<CronSchedule, CadenceError> {
    CronSchedule::from_str(expression).map_err(|e| CadenceError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}
