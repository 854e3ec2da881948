//! Schedule expressions and trigger definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::key::SchedulerKey;
use crate::error::{Result, SyncError};

/// Expression used to register a job that must never fire.
///
/// It only matches on January 1st, 2200; entries carrying it are registered
/// without a trigger.
pub const NEVER_RUN_EXPRESSION: &str = "0 0 0 1 1 ? 2200";

/// Timezone applied to triggers unless configured otherwise.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Parse a schedule expression (seconds, minutes, hours, day of month, month,
/// day of week, optional year).
pub fn parse_expression(expression: &str) -> Result<cron::Schedule> {
    cron::Schedule::from_str(expression.trim())
        .map_err(|e| SyncError::invalid_expression(expression, e.to_string()))
}

/// Whether the expression can drive a trigger.
pub fn is_valid_expression(expression: &str) -> bool {
    parse_expression(expression).is_ok()
}

/// Expression to register for a definition: the sentinel replaces anything invalid.
pub fn effective_expression(expression: &str) -> String {
    if is_never_run(expression) || !is_valid_expression(expression) {
        NEVER_RUN_EXPRESSION.to_string()
    } else {
        expression.to_string()
    }
}

/// Whether the expression is the never-run sentinel.
pub fn is_never_run(expression: &str) -> bool {
    expression.trim() == NEVER_RUN_EXPRESSION
}

/// What the scheduler does with a fire time missed while it was unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MisfirePolicy {
    /// Skip missed fire times and wait for the next one
    #[default]
    DoNothing,
}

/// Cron-based schedule with a timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronSchedule {
    /// Cron expression (e.g., "0 0 * * * *" for hourly)
    pub expression: String,
    /// Timezone for the cron schedule
    pub timezone: String,
}

impl CronSchedule {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }

    pub fn in_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// Next fire time strictly after `after`, evaluated in UTC.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        parse_expression(&self.expression)
            .ok()
            .and_then(|schedule| schedule.after(&after).next())
    }
}

/// Trigger to register alongside a job entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
    /// Identity of the trigger
    pub key: SchedulerKey,
    /// Schedule the trigger follows
    pub schedule: CronSchedule,
    /// Misfire handling
    pub misfire: MisfirePolicy,
    /// Start immediately rather than at a deferred time
    pub start_now: bool,
}

impl TriggerSpec {
    /// Build a trigger for a job entry, or `None` for the never-run sentinel.
    pub fn for_entry(job_key: &SchedulerKey, expression: &str, timezone: &str) -> Option<Self> {
        if is_never_run(expression) {
            return None;
        }

        Some(Self {
            key: job_key.trigger_key(),
            schedule: CronSchedule::new(expression).in_timezone(timezone),
            misfire: MisfirePolicy::DoNothing,
            start_now: true,
        })
    }

    /// Schedule expression the trigger follows.
    pub fn expression(&self) -> &str {
        &self.schedule.expression
    }
}
