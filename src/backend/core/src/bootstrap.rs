//! Host wiring: seed data for the in-memory collaborators and the pulse's own
//! scheduler entry.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::config::SyncConfig;
use crate::error::{ErrorCode, ErrorContext, Result};
use crate::jobs::{
    InMemoryJobRepository, JobDefinition, JobRegistration, Scheduler, SchedulerKey,
    StaticTenantSource, Tenant, TriggerSpec, SYSTEM_GROUP,
};

/// Name of the pulse entry in the system group.
pub const PULSE_ENTRY_NAME: &str = "JobPulse";

const PULSE_HANDLER: &str = "jobsync::JobPulse";

/// Initial tenants and job definitions, read from JSON.
///
/// ```json
/// {
///   "tenants": [{ "id": 1, "name": "acme" }],
///   "jobs": [{
///     "id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
///     "tenant_id": 1,
///     "name": "Nightly report",
///     "schedule_expression": "0 0 2 * * *",
///     "handler": { "class": "Reports.Nightly", "assembly": "Reports" }
///   }]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub tenants: Vec<Tenant>,
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
}

impl Seed {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_error_code(ErrorCode::InvalidConfiguration)
            .map_err(|e| e.with_internal_message(format!("seed file {}", path.display())))?;
        Self::from_json(&raw)
    }

    /// Split into the in-memory job store and tenant source.
    pub fn into_collaborators(self) -> (InMemoryJobRepository, StaticTenantSource) {
        (
            InMemoryJobRepository::with_jobs(self.jobs),
            StaticTenantSource::new(self.tenants),
        )
    }
}

/// Cron expression of the pulse itself: every 15 minutes in production,
/// every minute otherwise.
pub fn pulse_expression(config: &SyncConfig) -> &'static str {
    if config.production_mode {
        "0 0/15 * * * *"
    } else {
        "0 * * * * *"
    }
}

/// Register the pulse in the system group unless it already is.
///
/// The system group is never reconciled, so this entry survives every cycle.
pub async fn register_pulse_entry(scheduler: &dyn Scheduler, config: &SyncConfig) -> Result<SchedulerKey> {
    let key = SchedulerKey::new(SYSTEM_GROUP, PULSE_ENTRY_NAME);
    if scheduler.get_handler_type(&key).await?.is_some() {
        return Ok(key);
    }

    let expression = pulse_expression(config);
    let registration = JobRegistration {
        key: key.clone(),
        handler_type: PULSE_HANDLER.to_string(),
        description: "Job schedule synchronization".to_string(),
        data: HashMap::new(),
        schedule_expression: expression.to_string(),
    };
    let trigger = TriggerSpec::for_entry(&key, expression, &config.timezone);
    scheduler.schedule(registration, trigger).await?;

    tracing::info!(key = %key, expression, "Job pulse registered");
    Ok(key)
}
