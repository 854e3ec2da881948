#![allow(clippy::result_large_err)]
//! # JobSync Core
//!
//! Periodic reconciliation of tenant-scoped job definitions against a live
//! job scheduler.
//!
//! ## Architecture
//!
//! - **Jobs**: job definitions, scheduler keys, schedule expressions and the
//!   repository / scheduler / tenant source seams
//! - **Sync**: the reconciliation cycle (batch building, planning, execution,
//!   aggregation) as a bounded-concurrency pipeline
//! - **Telemetry**: structured logging and Prometheus metrics
//! - **Config**: layered configuration from files and `JOBSYNC__` environment variables

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod jobs;
pub mod sync;
pub mod telemetry;

pub use error::{ErrorCode, ErrorContext, ErrorSeverity, Result, SyncError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, SyncConfig};
    pub use crate::error::{ErrorCode, ErrorContext, ErrorSeverity, Result, SyncError};
    pub use crate::jobs::{
        scheduler_key, HandlerRef, InMemoryJobRepository, InMemoryScheduler, JobDefinition,
        JobDefinitionId, JobRepository, Scheduler, SchedulerKey, StaticTenantSource, Tenant,
        TenantId, TenantSource,
    };
    pub use crate::sync::{
        CycleState, CycleSummary, JobPulse, JobPulseBuilder, PulseHandle, PulseRunner,
        TenantScope,
    };
}
