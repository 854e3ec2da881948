//! Turns a [`SyncBatch`] into scheduler operations.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::batch::SyncBatch;
use super::scope::TenantScope;
use crate::jobs::{scheduler_key, JobDefinition, SchedulerKey};

/// Kind of change applied to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Delete,
    Schedule,
    Reschedule,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Schedule => "schedule",
            Self::Reschedule => "reschedule",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduler mutation.
///
/// Deletes carry only a key; schedules and reschedules carry the definition
/// and the key it maps to.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOperation {
    pub tenant: TenantScope,
    pub kind: OperationKind,
    pub job: Option<JobDefinition>,
    pub key: Option<SchedulerKey>,
}

impl JobOperation {
    pub fn delete(tenant: TenantScope, key: SchedulerKey) -> Self {
        Self {
            tenant,
            kind: OperationKind::Delete,
            job: None,
            key: Some(key),
        }
    }

    pub fn schedule(tenant: TenantScope, job: JobDefinition) -> Self {
        let key = scheduler_key(job.id, tenant.id());
        Self {
            tenant,
            kind: OperationKind::Schedule,
            job: Some(job),
            key: Some(key),
        }
    }

    pub fn reschedule(tenant: TenantScope, job: JobDefinition, key: SchedulerKey) -> Self {
        Self {
            tenant,
            kind: OperationKind::Reschedule,
            job: Some(job),
            key: Some(key),
        }
    }

    /// Name used in logs: the job name, or the key for deletes.
    pub fn target(&self) -> String {
        match (&self.job, &self.key) {
            (Some(job), _) => job.name.clone(),
            (None, Some(key)) => key.to_string(),
            (None, None) => "<unknown>".to_string(),
        }
    }
}

/// Plan the operations for a batch: deletes, then schedules, then reschedules.
///
/// A failed batch plans nothing.
pub fn plan(batch: SyncBatch) -> Vec<JobOperation> {
    if batch.has_error() {
        return Vec::new();
    }

    let tenant = batch.tenant;
    let mut operations = Vec::with_capacity(batch.operation_count());

    operations.extend(
        batch
            .jobs_to_delete
            .into_iter()
            .map(|key| JobOperation::delete(tenant, key)),
    );
    operations.extend(
        batch
            .jobs_to_schedule
            .into_iter()
            .map(|job| JobOperation::schedule(tenant, job)),
    );
    operations.extend(
        batch
            .jobs_to_reschedule
            .into_iter()
            .map(|item| JobOperation::reschedule(tenant, item.job, item.key)),
    );

    operations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::HandlerRef;
    use crate::sync::batch::RescheduleItem;

    fn job(name: &str) -> JobDefinition {
        JobDefinition::new(name, "0 0 * * * *", HandlerRef::new("Handler")).for_tenant(3)
    }

    #[test]
    fn test_plan_order_and_counts() {
        let tenant = TenantScope::tenant(3);
        let moved = job("moved");
        let moved_key = scheduler_key(moved.id, tenant.id());

        let batch = SyncBatch {
            tenant,
            jobs_to_delete: vec![SchedulerKey::new("tenant_3", "stale_3")],
            jobs_to_schedule: vec![job("new-a"), job("new-b")],
            jobs_to_reschedule: vec![RescheduleItem {
                job: moved,
                key: moved_key.clone(),
            }],
            error: None,
        };

        let ops = plan(batch);
        let kinds: Vec<_> = ops.iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OperationKind::Delete,
                OperationKind::Schedule,
                OperationKind::Schedule,
                OperationKind::Reschedule,
            ]
        );
        assert!(ops.iter().all(|op| op.tenant == tenant));
        assert!(ops[0].job.is_none());
        assert_eq!(ops[3].key.as_ref(), Some(&moved_key));
    }

    #[test]
    fn test_schedule_operation_carries_key() {
        let tenant = TenantScope::tenant(3);
        let definition = job("a");
        let op = JobOperation::schedule(tenant, definition.clone());
        assert_eq!(op.key, Some(scheduler_key(definition.id, tenant.id())));
        assert_eq!(op.target(), "a");
    }

    #[test]
    fn test_failed_batch_plans_nothing() {
        let mut batch = SyncBatch::failed(TenantScope::tenant(3), "store down");
        batch.jobs_to_schedule.push(job("ignored"));
        assert!(plan(batch).is_empty());
    }

    #[test]
    fn test_empty_batch() {
        assert!(plan(SyncBatch::empty(TenantScope::DEFAULT)).is_empty());
    }
}
