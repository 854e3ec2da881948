//! Per-tenant diff between desired and live state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::scope::TenantScope;
use super::until_cancelled;
use crate::error::{Result, SyncError};
use crate::jobs::{scheduler_key, JobDefinition, JobRepository, Scheduler, SchedulerKey, NEVER_RUN_EXPRESSION};

/// A definition whose live entry must be replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct RescheduleItem {
    pub job: JobDefinition,
    pub key: SchedulerKey,
}

/// Work discovered for one tenant.
///
/// When `error` is set the tenant could not be read and every list is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncBatch {
    pub tenant: TenantScope,
    pub jobs_to_delete: Vec<SchedulerKey>,
    pub jobs_to_schedule: Vec<JobDefinition>,
    pub jobs_to_reschedule: Vec<RescheduleItem>,
    pub error: Option<String>,
}

impl SyncBatch {
    pub fn empty(tenant: TenantScope) -> Self {
        Self {
            tenant,
            jobs_to_delete: Vec::new(),
            jobs_to_schedule: Vec::new(),
            jobs_to_reschedule: Vec::new(),
            error: None,
        }
    }

    pub fn failed(tenant: TenantScope, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::empty(tenant)
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Number of operations this batch plans.
    pub fn operation_count(&self) -> usize {
        self.jobs_to_delete.len() + self.jobs_to_schedule.len() + self.jobs_to_reschedule.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operation_count() == 0
    }
}

/// Builds a [`SyncBatch`] by comparing the job store with the scheduler.
pub struct BatchBuilder {
    repository: Arc<dyn JobRepository>,
    scheduler: Arc<dyn Scheduler>,
}

impl BatchBuilder {
    pub fn new(repository: Arc<dyn JobRepository>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            repository,
            scheduler,
        }
    }

    /// Build the batch for one tenant. Read failures are captured in the
    /// batch instead of being returned.
    pub async fn build(&self, tenant: TenantScope, cancel: &CancellationToken) -> SyncBatch {
        match self.diff(tenant, cancel).await {
            Ok(batch) => {
                debug!(
                    tenant = %tenant,
                    deletes = batch.jobs_to_delete.len(),
                    schedules = batch.jobs_to_schedule.len(),
                    reschedules = batch.jobs_to_reschedule.len(),
                    "Sync batch built"
                );
                batch
            }
            Err(e) if e.is_cancelled() => {
                debug!(tenant = %tenant, "Sync batch abandoned, cycle cancelled");
                SyncBatch::failed(tenant, e.message())
            }
            Err(e) => {
                let error = SyncError::tenant_fetch(tenant, e.message()).with_source(e);
                warn!(tenant = %tenant, error = %error.message(), "Failed to process tenant");
                metrics::counter!("jobsync_tenant_failures_total").increment(1);
                SyncBatch::failed(tenant, error.message())
            }
        }
    }

    async fn diff(&self, tenant: TenantScope, cancel: &CancellationToken) -> Result<SyncBatch> {
        let jobs = until_cancelled(cancel, self.repository.get_active_jobs(tenant.id())).await?;
        let live: HashSet<SchedulerKey> =
            until_cancelled(cancel, self.scheduler.list_keys(&tenant.group()))
                .await?
                .into_iter()
                .filter(|key| !key.is_system())
                .collect();

        let mut batch = SyncBatch::empty(tenant);
        let mut desired: HashMap<SchedulerKey, JobDefinition> = HashMap::with_capacity(jobs.len());

        for job in jobs {
            let key = scheduler_key(job.id, tenant.id());
            if let Some(first) = desired.get(&key) {
                warn!(
                    tenant = %tenant,
                    key = %key,
                    kept = %first.name,
                    ignored = %job.name,
                    "Duplicate job definition for scheduler key"
                );
                continue;
            }

            if live.contains(&key) {
                if self.has_changed(&job, &key, cancel).await? {
                    batch.jobs_to_reschedule.push(RescheduleItem {
                        job: job.clone(),
                        key: key.clone(),
                    });
                }
            } else {
                batch.jobs_to_schedule.push(job.clone());
            }
            desired.insert(key, job);
        }

        let mut stale: Vec<SchedulerKey> =
            live.into_iter().filter(|key| !desired.contains_key(key)).collect();
        stale.sort();
        batch.jobs_to_delete = stale;

        Ok(batch)
    }

    /// Compare a definition with the entry registered under its key.
    async fn has_changed(
        &self,
        job: &JobDefinition,
        key: &SchedulerKey,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let live_expression = until_cancelled(cancel, self.scheduler.get_trigger(key))
            .await?
            .map(|trigger| trigger.expression)
            .unwrap_or_else(|| NEVER_RUN_EXPRESSION.to_string());
        let live_handler = until_cancelled(cancel, self.scheduler.get_handler_type(key)).await?;

        let expression_changed = live_expression != job.effective_expression();
        // Handler type only counts when both sides name one
        let handler_changed = match (live_handler, job.handler.resolve()) {
            (Some(live), Some(desired)) => live != desired,
            _ => false,
        };

        if expression_changed || handler_changed {
            debug!(
                key = %key,
                expression_changed,
                handler_changed,
                "Job schedule differs from scheduler"
            );
        }

        Ok(expression_changed || handler_changed)
    }
}
