//! Result aggregation and status write-back.

use std::collections::BTreeMap;
use std::sync::Arc;

use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::executor::OperationResult;
use super::limiter::ConcurrencyLimiter;
use super::planner::OperationKind;
use super::scope::TenantScope;
use super::until_cancelled;
use crate::jobs::{status, JobDefinitionId, JobRepository};

/// Counters for one tenant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TenantSyncResult {
    pub tenant: TenantScope,
    pub deleted: u64,
    pub updated: u64,
    pub failed: u64,
}

impl TenantSyncResult {
    fn new(tenant: TenantScope) -> Self {
        Self {
            tenant,
            ..Self::default()
        }
    }

    /// Whether any schedule changed for this tenant.
    pub fn has_changes(&self) -> bool {
        self.deleted + self.updated > 0
    }
}

/// Counters for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncMetrics {
    pub deleted: u64,
    pub updated: u64,
    pub failed: u64,
    pub tenants: BTreeMap<TenantScope, TenantSyncResult>,
}

impl SyncMetrics {
    fn tenant(&mut self, tenant: TenantScope) -> &mut TenantSyncResult {
        self.tenants
            .entry(tenant)
            .or_insert_with(|| TenantSyncResult::new(tenant))
    }

    fn record_success(&mut self, tenant: TenantScope, kind: OperationKind) {
        match kind {
            OperationKind::Delete => {
                self.deleted += 1;
                self.tenant(tenant).deleted += 1;
            }
            OperationKind::Schedule | OperationKind::Reschedule => {
                self.updated += 1;
                self.tenant(tenant).updated += 1;
            }
        }
    }

    fn record_failure(&mut self, tenant: TenantScope) {
        self.failed += 1;
        self.tenant(tenant).failed += 1;
    }

    /// Human-readable summary; empty when nothing changed.
    ///
    /// ```text
    /// Deleted 1 job schedule(s) and Updated 2 schedule(s)
    /// Tenant 4: 1 deleted, 2 updated
    /// ```
    pub fn summary(&self) -> String {
        let mut parts = Vec::with_capacity(2);
        if self.deleted > 0 {
            parts.push(format!("Deleted {} job schedule(s)", self.deleted));
        }
        if self.updated > 0 {
            parts.push(format!("Updated {} schedule(s)", self.updated));
        }

        let mut summary = parts.join(" and ");
        for result in self.tenants.values().filter(|r| r.has_changes()) {
            summary.push_str(&format!(
                "\nTenant {}: {} deleted, {} updated",
                result.tenant, result.deleted, result.updated
            ));
        }
        summary
    }
}

enum StatusWrite {
    Clear,
    Error { status: &'static str, message: String },
}

impl StatusWrite {
    fn kind(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Error { .. } => "error",
        }
    }
}

/// Folds operation results into [`SyncMetrics`] and persists job status.
pub struct ResultAggregator {
    repository: Arc<dyn JobRepository>,
    metrics: Mutex<SyncMetrics>,
}

impl ResultAggregator {
    pub fn new(repository: Arc<dyn JobRepository>) -> Self {
        Self {
            repository,
            metrics: Mutex::new(SyncMetrics::default()),
        }
    }

    /// Record one result. Status writes wait for a slot on `status_writes`
    /// and are skipped once the cycle is cancelled.
    pub async fn record(
        &self,
        result: OperationResult,
        status_writes: &ConcurrencyLimiter,
        cancel: &CancellationToken,
    ) {
        let OperationResult {
            operation,
            success,
            error,
            ..
        } = result;
        let tenant = operation.tenant;

        {
            let mut metrics = self.metrics.lock();
            if success {
                metrics.record_success(tenant, operation.kind);
            } else {
                metrics.record_failure(tenant);
            }
        }

        let Some(job) = operation.job else {
            if !success {
                warn!(
                    tenant = %tenant,
                    key = ?operation.key,
                    error = ?error,
                    "Failed to delete job schedule"
                );
            }
            return;
        };

        let write = if success {
            if !job.has_error_status() {
                return;
            }
            StatusWrite::Clear
        } else {
            let status = match operation.kind {
                OperationKind::Reschedule => status::ERROR_RESCHEDULING,
                _ => status::ERROR_SCHEDULING,
            };
            let message = status::error_message(&job.name, error.as_deref().unwrap_or_default());
            StatusWrite::Error { status, message }
        };

        self.persist(job.id, tenant, write, status_writes, cancel).await;
    }

    async fn persist(
        &self,
        job_id: JobDefinitionId,
        tenant: TenantScope,
        write: StatusWrite,
        status_writes: &ConcurrencyLimiter,
        cancel: &CancellationToken,
    ) {
        let kind = write.kind();
        let Ok(_permit) = status_writes.acquire(cancel).await else {
            debug!(job_id = %job_id, tenant = %tenant, kind, "Status write skipped, cycle cancelled");
            return;
        };

        let outcome = match &write {
            StatusWrite::Clear => {
                until_cancelled(cancel, self.repository.clear_status(job_id, tenant.id())).await
            }
            StatusWrite::Error { status, message } => {
                until_cancelled(
                    cancel,
                    self.repository
                        .update_status(job_id, tenant.id(), message, status),
                )
                .await
            }
        };

        match outcome {
            Ok(()) => {
                counter!("jobsync_status_writes_total", "kind" => kind).increment(1);
                debug!(job_id = %job_id, tenant = %tenant, kind, "Job status written");
            }
            Err(e) => {
                warn!(
                    job_id = %job_id,
                    tenant = %tenant,
                    kind,
                    error = %e,
                    "Failed to persist job status"
                );
            }
        }
    }

    /// Copy of the counters so far.
    pub fn snapshot(&self) -> SyncMetrics {
        self.metrics.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{HandlerRef, InMemoryJobRepository, JobDefinition, SchedulerKey};
    use crate::sync::limiter::LimiterConfig;
    use crate::sync::planner::JobOperation;
    use std::time::Duration;

    fn limiter() -> ConcurrencyLimiter {
        ConcurrencyLimiter::new(LimiterConfig::new("status_writes", 3))
    }

    #[test]
    fn test_summary_formats() {
        let mut metrics = SyncMetrics::default();
        assert_eq!(metrics.summary(), "");

        metrics.record_success(TenantScope::tenant(2), OperationKind::Schedule);
        metrics.record_success(TenantScope::tenant(2), OperationKind::Reschedule);
        assert_eq!(
            metrics.summary(),
            "Updated 2 schedule(s)\nTenant 2: 0 deleted, 2 updated"
        );

        metrics.record_success(TenantScope::tenant(1), OperationKind::Delete);
        metrics.record_failure(TenantScope::tenant(3));
        assert_eq!(
            metrics.summary(),
            "Deleted 1 job schedule(s) and Updated 2 schedule(s)\n\
             Tenant 1: 1 deleted, 0 updated\n\
             Tenant 2: 0 deleted, 2 updated"
        );
    }

    #[test]
    fn test_default_scope_summary() {
        let mut metrics = SyncMetrics::default();
        metrics.record_success(TenantScope::DEFAULT, OperationKind::Delete);
        assert_eq!(
            metrics.summary(),
            "Deleted 1 job schedule(s)\nTenant default: 1 deleted, 0 updated"
        );
    }

    #[tokio::test]
    async fn test_failure_writes_scoped_status() {
        let job = JobDefinition::new("Nightly", "0 0 * * * *", HandlerRef::new("A")).for_tenant(4);
        let sibling = JobDefinition::new("Hourly", "0 0 * * * *", HandlerRef::new("B")).for_tenant(4);
        let repo = Arc::new(InMemoryJobRepository::with_jobs([job.clone(), sibling.clone()]));
        let aggregator = ResultAggregator::new(repo.clone());

        let op = JobOperation::reschedule(TenantScope::tenant(4), job.clone(), SchedulerKey::new("tenant_4", "x"));
        let result = OperationResult::failed(op, "scheduler down", Duration::ZERO);
        aggregator.record(result, &limiter(), &CancellationToken::new()).await;

        let stored = repo.get(job.id, job.tenant_id).unwrap();
        assert_eq!(stored.last_status.as_deref(), Some(status::ERROR_RESCHEDULING));
        assert_eq!(
            stored.last_status_message.as_deref(),
            Some("Error scheduling the job: Nightly.\n\nscheduler down")
        );
        assert!(repo.get(sibling.id, sibling.tenant_id).unwrap().last_status.is_none());

        let metrics = aggregator.snapshot();
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.updated, 0);
    }

    #[tokio::test]
    async fn test_success_clears_error_status() {
        let job = JobDefinition::new("Nightly", "0 0 * * * *", HandlerRef::new("A"))
            .for_tenant(4)
            .with_status(status::ERROR_SCHEDULING, "old failure");
        let repo = Arc::new(InMemoryJobRepository::with_jobs([job.clone()]));
        let aggregator = ResultAggregator::new(repo.clone());

        let op = JobOperation::schedule(TenantScope::tenant(4), job.clone());
        aggregator
            .record(OperationResult::succeeded(op, Duration::ZERO), &limiter(), &CancellationToken::new())
            .await;

        let stored = repo.get(job.id, job.tenant_id).unwrap();
        assert!(stored.last_status.is_none());
        assert!(stored.last_status_message.is_none());
        assert_eq!(aggregator.snapshot().updated, 1);
    }

    #[tokio::test]
    async fn test_cancelled_cycle_counts_without_status_write() {
        let job = JobDefinition::new("Nightly", "0 0 * * * *", HandlerRef::new("A")).for_tenant(4);
        let repo = Arc::new(InMemoryJobRepository::with_jobs([job.clone()]));
        let aggregator = ResultAggregator::new(repo.clone());
        let status_writes = limiter();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let op = JobOperation::schedule(TenantScope::tenant(4), job.clone());
        aggregator
            .record(OperationResult::failed(op, "cancelled", Duration::ZERO), &status_writes, &cancel)
            .await;

        assert_eq!(aggregator.snapshot().failed, 1);
        assert!(repo.get(job.id, job.tenant_id).unwrap().last_status.is_none());
        assert_eq!(status_writes.stats().rejected, 1);
        assert_eq!(status_writes.stats().acquired, 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_swallowed() {
        let job = JobDefinition::new("Nightly", "0 0 * * * *", HandlerRef::new("A")).for_tenant(4);
        // Empty store: the status write fails with RecordNotFound
        let aggregator = ResultAggregator::new(Arc::new(InMemoryJobRepository::new()));

        let op = JobOperation::schedule(TenantScope::tenant(4), job);
        aggregator
            .record(OperationResult::failed(op, "boom", Duration::ZERO), &limiter(), &CancellationToken::new())
            .await;

        assert_eq!(aggregator.snapshot().failed, 1);
    }

    #[tokio::test]
    async fn test_failed_delete_counts_only() {
        let aggregator = ResultAggregator::new(Arc::new(InMemoryJobRepository::new()));
        let op = JobOperation::delete(TenantScope::tenant(1), SchedulerKey::new("tenant_1", "gone"));
        aggregator
            .record(OperationResult::failed(op, "boom", Duration::ZERO), &limiter(), &CancellationToken::new())
            .await;

        let metrics = aggregator.snapshot();
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.deleted, 0);
        assert_eq!(metrics.tenants[&TenantScope::tenant(1)].failed, 1);
    }
}
