//! Timer loop driving the pulse.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::pulse::{CycleSummary, JobPulse};
use crate::error::{ErrorCode, Result, SyncError};

/// Statistics for the runner.
#[derive(Debug, Clone, Default)]
pub struct RunnerStats {
    /// Cycles started
    pub cycles: Arc<AtomicU64>,
    /// Cycles that produced a summary
    pub succeeded: Arc<AtomicU64>,
    /// Cycles that ended with an unexpected error
    pub failed: Arc<AtomicU64>,
    /// Ticks skipped because a cycle was still running
    pub skipped: Arc<AtomicU64>,
    last_summary: Arc<Mutex<Option<CycleSummary>>>,
}

impl RunnerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Summary of the most recent completed cycle.
    pub fn last_summary(&self) -> Option<CycleSummary> {
        self.last_summary.lock().clone()
    }
}

/// Handle for controlling a running pulse loop.
pub struct PulseHandle {
    cancel: CancellationToken,
    stats: RunnerStats,
    task: JoinHandle<()>,
}

impl PulseHandle {
    /// Stop the loop. A cycle in flight is cancelled.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn stats(&self) -> &RunnerStats {
        &self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to exit.
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| SyncError::internal("Pulse runner task failed").with_source(e))
    }
}

/// Runs a [`JobPulse`] on a fixed cadence, starting immediately.
pub struct PulseRunner {
    pulse: Arc<JobPulse>,
    interval: Duration,
}

impl PulseRunner {
    /// Create a runner using the pulse's configured cadence.
    pub fn new(pulse: Arc<JobPulse>) -> Self {
        let interval = pulse.config().cadence();
        Self { pulse, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the loop, returning a handle for control.
    pub fn start(self) -> PulseHandle {
        self.start_with(CancellationToken::new())
    }

    /// Start the loop under an existing cancellation token.
    pub fn start_with(self, cancel: CancellationToken) -> PulseHandle {
        let stats = RunnerStats::new();
        let task = tokio::spawn(run_loop(self.pulse, self.interval, cancel.clone(), stats.clone()));

        PulseHandle {
            cancel,
            stats,
            task,
        }
    }
}

async fn run_loop(pulse: Arc<JobPulse>, interval: Duration, cancel: CancellationToken, stats: RunnerStats) {
    let mut ticker = tokio::time::interval(interval);
    // Missed ticks are dropped, never fired in a burst
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval = ?interval, "Job pulse runner started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        stats.cycles.fetch_add(1, Ordering::Relaxed);
        match pulse.run_cycle(&cancel).await {
            Ok(summary) => {
                stats.succeeded.fetch_add(1, Ordering::Relaxed);
                *stats.last_summary.lock() = Some(summary);
            }
            Err(e) if e.is_cancelled() => break,
            Err(e) if e.code() == ErrorCode::CycleInProgress => {
                stats.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                e.log();
            }
        }
    }

    tracing::info!(cycles = stats.cycles(), "Job pulse runner stopped");
}
