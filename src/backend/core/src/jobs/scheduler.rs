//! Live scheduler access.
//!
//! The reconciliation only ever talks to the scheduler through the
//! [`Scheduler`] trait. [`InMemoryScheduler`] keeps entries and triggers in a
//! map; it records what would fire but never fires anything itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::definition::{JobDefinition, TenantId};
use super::key::SchedulerKey;
use super::schedule::{TriggerSpec, NEVER_RUN_EXPRESSION};
use crate::error::{ErrorCode, Result, SyncError};

/// Data map key carrying the owning tenant of an entry.
pub const TENANT_DATA_KEY: &str = "TenantId";

/// A job entry as registered with the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRegistration {
    /// Entry identity
    pub key: SchedulerKey,
    /// Resolved handler type name
    pub handler_type: String,
    /// Job definition id, kept for lookups from a running job
    pub description: String,
    /// Handler parameters plus the tenant tag
    pub data: HashMap<String, String>,
    /// Expression the entry was registered with (the sentinel when it has no trigger)
    pub schedule_expression: String,
}

impl JobRegistration {
    /// Build a registration for a definition under the given key.
    ///
    /// The tenant tag comes from the scope the entry is registered in, not
    /// from the definition.
    pub fn from_definition(
        job: &JobDefinition,
        tenant: Option<TenantId>,
        key: SchedulerKey,
        handler_type: String,
        schedule_expression: String,
    ) -> Self {
        let mut data = job.parameters.clone();
        if let Some(tenant) = tenant {
            data.insert(TENANT_DATA_KEY.to_string(), tenant.to_string());
        }

        Self {
            key,
            handler_type,
            description: job.id.to_string(),
            data,
            schedule_expression,
        }
    }

    /// Tenant tag carried in the data map.
    pub fn tenant(&self) -> Option<TenantId> {
        self.data
            .get(TENANT_DATA_KEY)
            .and_then(|v| v.parse::<i64>().ok())
            .map(TenantId)
    }
}

/// Trigger currently attached to a live entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveTrigger {
    pub key: SchedulerKey,
    pub expression: String,
}

/// Operations the reconciliation needs from the live scheduler.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Keys of all entries in a group.
    async fn list_keys(&self, group: &str) -> Result<Vec<SchedulerKey>>;

    /// The cron trigger attached to an entry, if any.
    async fn get_trigger(&self, key: &SchedulerKey) -> Result<Option<LiveTrigger>>;

    /// Handler type registered for an entry.
    async fn get_handler_type(&self, key: &SchedulerKey) -> Result<Option<String>>;

    /// Register an entry and its trigger as one unit.
    async fn schedule(&self, registration: JobRegistration, trigger: Option<TriggerSpec>) -> Result<()>;

    /// Remove an entry and its triggers. Returns whether it existed.
    async fn delete(&self, key: &SchedulerKey) -> Result<bool>;

    /// Replace an existing trigger in place. Returns whether it was found.
    async fn reschedule(&self, trigger_key: &SchedulerKey, trigger: TriggerSpec) -> Result<bool>;
}

/// A registered entry.
#[derive(Debug, Clone)]
pub struct ScheduledEntry {
    pub registration: JobRegistration,
    pub trigger: Option<TriggerSpec>,
    pub registered_at: DateTime<Utc>,
}

impl ScheduledEntry {
    /// Expression the entry follows, the sentinel when it has no trigger.
    pub fn expression(&self) -> &str {
        self.trigger
            .as_ref()
            .map(|t| t.expression())
            .unwrap_or(NEVER_RUN_EXPRESSION)
    }

    /// Next fire time, if the entry has a trigger.
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.trigger
            .as_ref()
            .and_then(|t| t.schedule.next_fire_after(Utc::now()))
    }
}

/// Scheduler keeping entries in memory.
#[derive(Debug, Default)]
pub struct InMemoryScheduler {
    entries: RwLock<HashMap<SchedulerKey, ScheduledEntry>>,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of an entry.
    pub fn entry(&self, key: &SchedulerKey) -> Option<ScheduledEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Keys of every entry, sorted.
    pub fn keys(&self) -> Vec<SchedulerKey> {
        let mut keys: Vec<_> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of entries in a group.
    pub fn count_in_group(&self, group: &str) -> usize {
        self.entries.read().keys().filter(|k| k.group == group).count()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl Scheduler for InMemoryScheduler {
    async fn list_keys(&self, group: &str) -> Result<Vec<SchedulerKey>> {
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|k| k.group == group)
            .cloned()
            .collect())
    }

    async fn get_trigger(&self, key: &SchedulerKey) -> Result<Option<LiveTrigger>> {
        Ok(self.entries.read().get(key).and_then(|entry| {
            entry.trigger.as_ref().map(|t| LiveTrigger {
                key: t.key.clone(),
                expression: t.expression().to_string(),
            })
        }))
    }

    async fn get_handler_type(&self, key: &SchedulerKey) -> Result<Option<String>> {
        Ok(self
            .entries
            .read()
            .get(key)
            .map(|entry| entry.registration.handler_type.clone()))
    }

    async fn schedule(&self, registration: JobRegistration, trigger: Option<TriggerSpec>) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(&registration.key) {
            return Err(SyncError::new(
                ErrorCode::SchedulerError,
                format!("Entry already exists: {}", registration.key),
            ));
        }

        tracing::debug!(
            key = %registration.key,
            handler = %registration.handler_type,
            has_trigger = trigger.is_some(),
            "Entry registered"
        );

        entries.insert(
            registration.key.clone(),
            ScheduledEntry {
                registration,
                trigger,
                registered_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &SchedulerKey) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn reschedule(&self, trigger_key: &SchedulerKey, trigger: TriggerSpec) -> Result<bool> {
        let mut entries = self.entries.write();
        let entry = entries
            .values_mut()
            .find(|e| e.trigger.as_ref().is_some_and(|t| &t.key == trigger_key));

        match entry {
            Some(entry) => {
                entry.registration.schedule_expression = trigger.expression().to_string();
                entry.trigger = Some(trigger);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
