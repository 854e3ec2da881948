//! Cycle orchestration.
//!
//! [`JobPulse::run_cycle`] snapshots the tenant list and drives every tenant
//! through a four-stage pipeline joined by bounded channels:
//!
//! 1. feed tenants (`tenant_buffer`)
//! 2. build and plan batches, `max_concurrent_reads` at a time (`operation_buffer`)
//! 3. execute operations, `max_concurrent_mutations` at a time (`result_buffer`)
//! 4. aggregate results, `max_concurrent_status_writes` status writes at a time
//!
//! A full channel blocks its producer, so memory stays bounded no matter how
//! many tenants or jobs there are. Cycles never overlap.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::StreamExt;
use metrics::{counter, histogram};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::aggregator::{ResultAggregator, SyncMetrics, TenantSyncResult};
use super::batch::BatchBuilder;
use super::executor::{OperationExecutor, OperationResult};
use super::limiter::{ConcurrencyLimiter, LimiterConfig, LimiterStats};
use super::planner::{plan, JobOperation};
use super::scope::TenantScope;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::jobs::{JobRepository, Scheduler, TenantSource};
use crate::telemetry::record_limiter_peaks;

/// Limiter bounding job store reads.
pub const READ_LIMITER: &str = "reads";
/// Limiter bounding scheduler mutations.
pub const MUTATION_LIMITER: &str = "mutations";
/// Limiter bounding job status writes.
pub const STATUS_WRITE_LIMITER: &str = "status_writes";

/// Phase of the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    #[default]
    Idle,
    FetchingTenants,
    Running,
    Summarizing,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::FetchingTenants => "fetching_tenants",
            Self::Running => "running",
            Self::Summarizing => "summarizing",
        };
        f.write_str(s)
    }
}

/// Result of one completed cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub cycle_id: Uuid,
    pub deleted: u64,
    pub updated: u64,
    pub failed: u64,
    pub tenants_processed: usize,
    pub tenant_failures: usize,
    /// Per-tenant counters, ordered by tenant
    pub tenants: Vec<TenantSyncResult>,
    /// Human-readable summary; empty when nothing changed
    pub message: String,
    pub limiters: Vec<LimiterStats>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl CycleSummary {
    fn new(
        cycle_id: Uuid,
        metrics: SyncMetrics,
        tenants_processed: usize,
        tenant_failures: usize,
        limiters: Vec<LimiterStats>,
        duration: Duration,
    ) -> Self {
        Self {
            cycle_id,
            deleted: metrics.deleted,
            updated: metrics.updated,
            failed: metrics.failed,
            tenants_processed,
            tenant_failures,
            message: metrics.summary(),
            tenants: metrics.tenants.into_values().collect(),
            limiters,
            duration,
        }
    }

    pub fn has_changes(&self) -> bool {
        self.deleted + self.updated > 0
    }

    /// Counters for one tenant, if it had any operation.
    pub fn tenant(&self, tenant: TenantScope) -> Option<&TenantSyncResult> {
        self.tenants.iter().find(|t| t.tenant == tenant)
    }

    /// Statistics of a limiter used by the cycle.
    pub fn limiter(&self, name: &str) -> Option<&LimiterStats> {
        self.limiters.iter().find(|s| s.name == name)
    }
}

/// Outcome of the pipeline before summarizing.
struct PipelineOutcome {
    metrics: SyncMetrics,
    tenant_failures: usize,
    limiters: Vec<LimiterStats>,
}

/// Resets the state to idle however the cycle ends.
struct StateGuard<'a>(&'a RwLock<CycleState>);

impl<'a> StateGuard<'a> {
    fn enter(state: &'a RwLock<CycleState>, next: CycleState) -> Self {
        *state.write() = next;
        Self(state)
    }

    fn advance(&self, next: CycleState) {
        *self.0.write() = next;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        *self.0.write() = CycleState::Idle;
    }
}

/// Reconciles job definitions with the scheduler, one cycle at a time.
pub struct JobPulse {
    repository: Arc<dyn JobRepository>,
    scheduler: Arc<dyn Scheduler>,
    tenants: Option<Arc<dyn TenantSource>>,
    config: SyncConfig,
    state: RwLock<CycleState>,
    cycle_lock: tokio::sync::Mutex<()>,
}

impl JobPulse {
    pub fn builder() -> JobPulseBuilder {
        JobPulseBuilder::default()
    }

    /// Current phase.
    pub fn state(&self) -> CycleState {
        *self.state.read()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Whether a cycle is running.
    pub fn is_running(&self) -> bool {
        self.cycle_lock.try_lock().is_err()
    }

    /// Run one reconciliation cycle.
    ///
    /// Tenant and operation failures are recorded in the summary, the logs
    /// and the job status fields. Only cancellation and an already running
    /// cycle are returned as errors.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleSummary> {
        let Ok(_cycle) = self.cycle_lock.try_lock() else {
            counter!("jobsync_cycles_total", "outcome" => "rejected").increment(1);
            warn!("Synchronization cycle requested while another is running");
            return Err(SyncError::cycle_in_progress());
        };

        let cycle_id = Uuid::new_v4();
        let span = info_span!("sync_cycle", cycle_id = %cycle_id);
        let start = Instant::now();

        let state = StateGuard::enter(&self.state, CycleState::FetchingTenants);
        let scopes = span.in_scope(|| {
            info!("Starting job pulse synchronization");
            self.scopes()
        });
        let tenants_processed = scopes.len();

        state.advance(CycleState::Running);
        let outcome = self.synchronize(scopes, cancel).instrument(span.clone()).await;

        if cancel.is_cancelled() {
            counter!("jobsync_cycles_total", "outcome" => "cancelled").increment(1);
            span.in_scope(|| warn!("Synchronization cycle cancelled"));
            return Err(SyncError::cancelled());
        }

        state.advance(CycleState::Summarizing);
        let duration = start.elapsed();
        record_limiter_peaks(&outcome.limiters);
        let summary = CycleSummary::new(
            cycle_id,
            outcome.metrics,
            tenants_processed,
            outcome.tenant_failures,
            outcome.limiters,
            duration,
        );

        counter!("jobsync_cycles_total", "outcome" => "completed").increment(1);
        histogram!("jobsync_cycle_duration_seconds").record(duration.as_secs_f64());

        span.in_scope(|| {
            if summary.message.is_empty() {
                info!(
                    tenants = tenants_processed,
                    failed = summary.failed,
                    tenant_failures = summary.tenant_failures,
                    duration_ms = duration.as_millis() as u64,
                    "Job pulse finished, no schedule changes"
                );
            } else {
                info!(
                    tenants = tenants_processed,
                    failed = summary.failed,
                    tenant_failures = summary.tenant_failures,
                    duration_ms = duration.as_millis() as u64,
                    "{}",
                    summary.message
                );
            }
        });

        Ok(summary)
    }

    /// Tenant scopes of this cycle.
    fn scopes(&self) -> Vec<TenantScope> {
        match (&self.tenants, self.config.multi_tenant) {
            (Some(source), true) => {
                let mut scopes: Vec<_> = source
                    .tenants()
                    .into_iter()
                    .map(|t| TenantScope::tenant(t.id))
                    .collect();
                scopes.sort();
                scopes.dedup();
                info!(tenant_count = scopes.len(), "Processing tenants");
                scopes
            }
            _ => vec![TenantScope::DEFAULT],
        }
    }

    async fn synchronize(&self, scopes: Vec<TenantScope>, cancel: &CancellationToken) -> PipelineOutcome {
        let cfg = &self.config;

        // Stage tasks stop with the cycle, also when this future is dropped
        let cancel = cancel.child_token();
        let _stop_stages = cancel.clone().drop_guard();

        let pipeline = Arc::new(Pipeline {
            builder: BatchBuilder::new(self.repository.clone(), self.scheduler.clone()),
            executor: OperationExecutor::new(self.scheduler.clone(), cfg.timezone.clone()),
            aggregator: ResultAggregator::new(self.repository.clone()),
            reads: ConcurrencyLimiter::new(LimiterConfig::new(READ_LIMITER, cfg.max_concurrent_reads)),
            mutations: ConcurrencyLimiter::new(LimiterConfig::new(
                MUTATION_LIMITER,
                cfg.max_concurrent_mutations,
            )),
            status_writes: ConcurrencyLimiter::new(LimiterConfig::new(
                STATUS_WRITE_LIMITER,
                cfg.max_concurrent_status_writes,
            )),
            tenant_failures: AtomicUsize::new(0),
            cancel,
        });

        let (tenant_tx, tenant_rx) = mpsc::channel(cfg.tenant_buffer);
        let (op_tx, op_rx) = mpsc::channel(cfg.operation_buffer);
        let (result_tx, result_rx) = mpsc::channel(cfg.result_buffer);

        let stages = [
            tokio::spawn(pipeline.clone().feed(scopes, tenant_tx).in_current_span()),
            tokio::spawn(
                pipeline
                    .clone()
                    .build_stage(tenant_rx, op_tx, cfg.max_concurrent_reads)
                    .in_current_span(),
            ),
            tokio::spawn(
                pipeline
                    .clone()
                    .execute_stage(op_rx, result_tx, cfg.max_concurrent_mutations)
                    .in_current_span(),
            ),
            tokio::spawn(
                pipeline
                    .clone()
                    .aggregate_stage(result_rx, cfg.max_concurrent_status_writes)
                    .in_current_span(),
            ),
        ];

        for stage in join_all(stages).await {
            if let Err(e) = stage {
                SyncError::internal("Pipeline stage task failed").with_source(e).log();
            }
        }

        PipelineOutcome {
            metrics: pipeline.aggregator.snapshot(),
            tenant_failures: pipeline.tenant_failures.load(Ordering::Relaxed),
            limiters: vec![
                pipeline.reads.stats(),
                pipeline.mutations.stats(),
                pipeline.status_writes.stats(),
            ],
        }
    }
}

/// State shared by the stage tasks of one cycle.
struct Pipeline {
    builder: BatchBuilder,
    executor: OperationExecutor,
    aggregator: ResultAggregator,
    reads: ConcurrencyLimiter,
    mutations: ConcurrencyLimiter,
    status_writes: ConcurrencyLimiter,
    tenant_failures: AtomicUsize,
    cancel: CancellationToken,
}

impl Pipeline {
    async fn feed(self: Arc<Self>, scopes: Vec<TenantScope>, tenants: mpsc::Sender<TenantScope>) {
        for scope in scopes {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                sent = tenants.send(scope) => if sent.is_err() { break },
            }
        }
    }

    async fn build_stage(
        self: Arc<Self>,
        tenants: mpsc::Receiver<TenantScope>,
        operations: mpsc::Sender<JobOperation>,
        limit: usize,
    ) {
        let stop = self.cancel.clone().cancelled_owned();
        ReceiverStream::new(tenants)
            .take_until(stop)
            .for_each_concurrent(limit, move |tenant| {
                let stage = self.clone();
                let operations = operations.clone();
                async move { stage.build_tenant(tenant, operations).await }
            })
            .await;
    }

    /// Diff one tenant and queue its operations.
    async fn build_tenant(&self, tenant: TenantScope, operations: mpsc::Sender<JobOperation>) {
        let batch = {
            let Ok(_permit) = self.reads.acquire(&self.cancel).await else {
                return;
            };
            self.builder.build(tenant, &self.cancel).await
        };

        if batch.has_error() {
            if !self.cancel.is_cancelled() {
                self.tenant_failures.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }

        for operation in plan(batch) {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                sent = operations.send(operation) => if sent.is_err() { return },
            }
        }
    }

    async fn execute_stage(
        self: Arc<Self>,
        operations: mpsc::Receiver<JobOperation>,
        results: mpsc::Sender<OperationResult>,
        limit: usize,
    ) {
        let stop = self.cancel.clone().cancelled_owned();
        ReceiverStream::new(operations)
            .take_until(stop)
            .for_each_concurrent(limit, move |operation| {
                let stage = self.clone();
                let results = results.clone();
                async move {
                    let result = {
                        let Ok(_permit) = stage.mutations.acquire(&stage.cancel).await else {
                            return;
                        };
                        stage.executor.execute(operation, &stage.cancel).await
                    };
                    let _ = results.send(result).await;
                }
            })
            .await;
    }

    /// Drains every result so the counters match what was applied.
    async fn aggregate_stage(self: Arc<Self>, results: mpsc::Receiver<OperationResult>, limit: usize) {
        ReceiverStream::new(results)
            .for_each_concurrent(limit, move |result| {
                let stage = self.clone();
                async move {
                    stage
                        .aggregator
                        .record(result, &stage.status_writes, &stage.cancel)
                        .await
                }
            })
            .await;
    }
}

/// Builder for [`JobPulse`].
#[derive(Default)]
pub struct JobPulseBuilder {
    repository: Option<Arc<dyn JobRepository>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    tenants: Option<Arc<dyn TenantSource>>,
    config: Option<SyncConfig>,
}

impl JobPulseBuilder {
    pub fn repository(mut self, repository: Arc<dyn JobRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn tenant_source(mut self, tenants: Arc<dyn TenantSource>) -> Self {
        self.tenants = Some(tenants);
        self
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// `MissingConfiguration` when the repository or scheduler is absent, or
    /// when multi-tenant mode has no tenant source; `InvalidConfiguration`
    /// for zero limits or capacities.
    pub fn build(self) -> Result<JobPulse> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let repository = self
            .repository
            .ok_or_else(|| SyncError::missing_configuration("job repository"))?;
        let scheduler = self
            .scheduler
            .ok_or_else(|| SyncError::missing_configuration("scheduler"))?;
        if config.multi_tenant && self.tenants.is_none() {
            return Err(SyncError::missing_configuration(
                "tenant source (required in multi-tenant mode)",
            ));
        }

        Ok(JobPulse {
            repository,
            scheduler,
            tenants: self.tenants,
            config,
            state: RwLock::new(CycleState::Idle),
            cycle_lock: tokio::sync::Mutex::new(()),
        })
    }
}
