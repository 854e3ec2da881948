//! Applies single operations to the scheduler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::planner::{JobOperation, OperationKind};
use super::scope::TenantScope;
use super::until_cancelled;
use crate::error::{Result, SyncError};
use crate::jobs::schedule::is_never_run;
use crate::jobs::{JobDefinition, JobRegistration, Scheduler, SchedulerKey, TriggerSpec};

/// Outcome of one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub operation: JobOperation,
    pub success: bool,
    pub error: Option<String>,
    pub duration: Duration,
}

impl OperationResult {
    pub fn succeeded(operation: JobOperation, duration: Duration) -> Self {
        Self {
            operation,
            success: true,
            error: None,
            duration,
        }
    }

    pub fn failed(operation: JobOperation, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            operation,
            success: false,
            error: Some(error.into()),
            duration,
        }
    }
}

/// Executes [`JobOperation`]s against a [`Scheduler`].
pub struct OperationExecutor {
    scheduler: Arc<dyn Scheduler>,
    timezone: String,
}

impl OperationExecutor {
    pub fn new(scheduler: Arc<dyn Scheduler>, timezone: impl Into<String>) -> Self {
        Self {
            scheduler,
            timezone: timezone.into(),
        }
    }

    /// Apply one operation. Failures, including cancellation of an in-flight
    /// call, are reported in the result.
    pub async fn execute(&self, operation: JobOperation, cancel: &CancellationToken) -> OperationResult {
        let start = Instant::now();
        let kind = operation.kind;

        let outcome = match kind {
            OperationKind::Delete => self.delete(&operation, cancel).await,
            OperationKind::Schedule => self.schedule(&operation, cancel).await,
            OperationKind::Reschedule => self.reschedule(&operation, cancel).await,
        };
        let duration = start.elapsed();

        histogram!("jobsync_operation_duration_seconds", "kind" => kind.as_str())
            .record(duration.as_secs_f64());

        match outcome {
            Ok(()) => {
                counter!("jobsync_operations_total", "kind" => kind.as_str(), "outcome" => "success")
                    .increment(1);
                debug!(
                    tenant = %operation.tenant,
                    kind = %kind,
                    target = %operation.target(),
                    duration_ms = duration.as_millis() as u64,
                    "Operation applied"
                );
                OperationResult::succeeded(operation, duration)
            }
            Err(e) => {
                counter!("jobsync_operations_total", "kind" => kind.as_str(), "outcome" => "failure")
                    .increment(1);
                let error = SyncError::operation_failed(kind, operation.target(), e);
                warn!(
                    tenant = %operation.tenant,
                    kind = %kind,
                    target = %operation.target(),
                    error = %error,
                    "Operation failed"
                );
                OperationResult::failed(operation, error.message(), duration)
            }
        }
    }

    async fn delete(&self, operation: &JobOperation, cancel: &CancellationToken) -> Result<()> {
        let key = required_key(operation)?;
        let existed = until_cancelled(cancel, self.scheduler.delete(key)).await?;
        if !existed {
            debug!(key = %key, "Entry already absent");
        }
        Ok(())
    }

    async fn schedule(&self, operation: &JobOperation, cancel: &CancellationToken) -> Result<()> {
        let job = required_job(operation)?;
        let key = required_key(operation)?;
        let (registration, trigger) = self.registration(job, operation.tenant, key)?;

        until_cancelled(cancel, self.scheduler.schedule(registration, trigger)).await
    }

    async fn reschedule(&self, operation: &JobOperation, cancel: &CancellationToken) -> Result<()> {
        let job = required_job(operation)?;
        let key = required_key(operation)?;
        let (registration, trigger) = self.registration(job, operation.tenant, key)?;

        until_cancelled(cancel, self.scheduler.delete(key)).await?;

        let Some(trigger) = trigger else {
            return until_cancelled(cancel, self.scheduler.schedule(registration, None)).await;
        };

        let replaced = match until_cancelled(cancel, self.scheduler.get_trigger(key)).await? {
            Some(live) => {
                until_cancelled(cancel, self.scheduler.reschedule(&live.key, trigger.clone())).await?
            }
            None => false,
        };

        if replaced {
            Ok(())
        } else {
            until_cancelled(cancel, self.scheduler.schedule(registration, Some(trigger))).await
        }
    }

    /// Build the entry and trigger for a definition in `tenant`.
    fn registration(
        &self,
        job: &JobDefinition,
        tenant: TenantScope,
        key: &SchedulerKey,
    ) -> Result<(JobRegistration, Option<TriggerSpec>)> {
        let handler_type = job.handler.resolve().ok_or_else(|| {
            SyncError::handler_unresolved("Failed to build job detail").with_internal_message(
                format!("handler '{}' could not be resolved", job.handler.class),
            )
        })?;

        let expression = job.effective_expression();
        if is_never_run(&expression) && !is_never_run(&job.schedule_expression) {
            warn!(
                job = %job.name,
                expression = %job.schedule_expression,
                "Invalid schedule expression, registering job without a trigger"
            );
        }

        let trigger = TriggerSpec::for_entry(key, &expression, &self.timezone);
        let registration = JobRegistration::from_definition(job, tenant.id(), key.clone(), handler_type, expression);
        Ok((registration, trigger))
    }
}

fn required_key(operation: &JobOperation) -> Result<&SchedulerKey> {
    operation.key.as_ref().ok_or_else(|| {
        SyncError::internal(format!("{} operation without a scheduler key", operation.kind))
    })
}

fn required_job(operation: &JobOperation) -> Result<&JobDefinition> {
    operation.job.as_ref().ok_or_else(|| {
        SyncError::internal(format!("{} operation without a job definition", operation.kind))
    })
}
