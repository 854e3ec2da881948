//! Reconciliation engine.
//!
//! One cycle diffs every tenant's desired job definitions against the live
//! scheduler and applies the delta:
//!
//! ```text
//! tenants ──► BatchBuilder ──► plan() ──► OperationExecutor ──► ResultAggregator ──► summary
//!   (20)        reads (5)      (100)        mutations (10)   (50)  status writes (3)
//! ```
//!
//! Stages are joined by bounded channels (capacities in parentheses) and each
//! class of external call has its own [`ConcurrencyLimiter`]. Tenant failures
//! end up in the tenant's batch, operation failures in the job's status; only
//! cancellation and overlapping cycles surface as errors from
//! [`JobPulse::run_cycle`].

pub mod aggregator;
pub mod batch;
pub mod executor;
pub mod limiter;
pub mod planner;
pub mod pulse;
pub mod runner;
pub mod scope;

pub use aggregator::{ResultAggregator, SyncMetrics, TenantSyncResult};
pub use batch::{BatchBuilder, RescheduleItem, SyncBatch};
pub use executor::{OperationExecutor, OperationResult};
pub use limiter::{ConcurrencyLimiter, LimiterConfig, LimiterPermit, LimiterStats};
pub use planner::{plan, JobOperation, OperationKind};
pub use pulse::{CycleState, CycleSummary, JobPulse, JobPulseBuilder};
pub use runner::{PulseHandle, PulseRunner, RunnerStats};
pub use scope::TenantScope;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{Result, SyncError};

/// Race an external call against cycle cancellation.
pub(crate) async fn until_cancelled<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::cancelled()),
        result = fut => result,
    }
}
