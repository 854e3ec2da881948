//! Job model and external collaborators.
//!
//! This module provides the desired-state model and the seams the
//! reconciliation talks through:
//!
//! - **Definitions**: persisted job definitions, tenant and handler identity
//! - **Keys**: the pure mapping from (job id, tenant) to a scheduler key
//! - **Schedules**: expression validation, the never-run sentinel, trigger specs
//! - **Repository**: job store access (active jobs, status writes)
//! - **Scheduler**: live scheduler access (keys, triggers, mutations)
//! - **Tenants**: the tenant list snapshotted each cycle
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐      ┌──────────────────┐      ┌──────────────────┐
//! │  JobRepository   │      │   TenantSource   │      │    Scheduler     │
//! │ (desired state)  │      │  (tenant list)   │      │  (live state)    │
//! └────────┬─────────┘      └────────┬─────────┘      └────────┬─────────┘
//!          │                         │                         │
//!          └────────────┬────────────┴────────────┬────────────┘
//!                       ▼                         ▼
//!               scheduler_key(id, tenant)   TriggerSpec / JobRegistration
//! ```
//!
//! In-memory implementations of all three collaborators are provided for the
//! host binary and for tests.

pub mod definition;
pub mod key;
pub mod repository;
pub mod schedule;
pub mod scheduler;
pub mod tenant;

pub use definition::{status, HandlerRef, JobDefinition, JobDefinitionId, TenantId};
pub use key::{scheduler_key, tenant_group, SchedulerKey, DEFAULT_GROUP, SYSTEM_GROUP};
pub use repository::{InMemoryJobRepository, JobRepository};
pub use schedule::{
    effective_expression, is_valid_expression, CronSchedule, MisfirePolicy, TriggerSpec,
    DEFAULT_TIMEZONE, NEVER_RUN_EXPRESSION,
};
pub use scheduler::{InMemoryScheduler, JobRegistration, LiveTrigger, ScheduledEntry, Scheduler};
pub use tenant::{StaticTenantSource, Tenant, TenantSource};
