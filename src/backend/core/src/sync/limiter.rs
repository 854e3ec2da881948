//! Concurrency limiter - bounds one class of external calls with a tokio Semaphore.
//!
//! The `ConcurrencyLimiter` provides:
//! - A fixed number of slots per backing store (reads, scheduler mutations, status writes)
//! - Cancellation-aware slot acquisition
//! - In-flight and peak statistics for monitoring and tests

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SyncError};

/// Configuration for a limiter.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Maximum number of concurrent holders
    pub max_concurrent: usize,
    /// Name for this limiter (for logging/metrics)
    pub name: String,
}

impl LimiterConfig {
    pub fn new(name: impl Into<String>, max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            name: name.into(),
        }
    }
}

/// Internal statistics tracking.
#[derive(Debug, Default)]
struct LimiterCounters {
    acquired: AtomicU64,
    rejected: AtomicU64,
    total_wait_time_us: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl LimiterCounters {
    fn record_acquire(&self, wait_time: Duration) {
        self.acquired.fetch_add(1, Ordering::Relaxed);
        self.total_wait_time_us
            .fetch_add(wait_time.as_micros() as u64, Ordering::Relaxed);
        let current = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::Relaxed);
    }

    fn record_release(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }
}

/// A held slot; released when dropped.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<LimiterCounters>,
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        self.counters.record_release();
    }
}

/// Bounds concurrent access to one backing store.
pub struct ConcurrencyLimiter {
    config: LimiterConfig,
    semaphore: Arc<Semaphore>,
    counters: Arc<LimiterCounters>,
}

impl ConcurrencyLimiter {
    /// Create a new limiter.
    pub fn new(config: LimiterConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));

        tracing::debug!(
            limiter = %config.name,
            max_concurrent = config.max_concurrent,
            "Concurrency limiter created"
        );

        Self {
            config,
            semaphore,
            counters: Arc::new(LimiterCounters::default()),
        }
    }

    /// Get the limiter name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get the configured bound.
    pub fn max_concurrent(&self) -> usize {
        self.config.max_concurrent
    }

    /// Get currently available slots.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquire a slot, giving up when `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<LimiterPermit> {
        if cancel.is_cancelled() {
            self.counters.record_rejected();
            return Err(SyncError::cancelled());
        }

        let start = Instant::now();
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.counters.record_rejected();
                return Err(SyncError::cancelled());
            }
            permit = self.semaphore.clone().acquire_owned() => permit?,
        };

        let wait_time = start.elapsed();
        self.counters.record_acquire(wait_time);

        tracing::trace!(
            limiter = %self.config.name,
            wait_time_ms = wait_time.as_millis(),
            available = self.semaphore.available_permits(),
            "Limiter slot acquired"
        );

        Ok(LimiterPermit {
            _permit: permit,
            counters: self.counters.clone(),
        })
    }

    /// Get limiter statistics.
    pub fn stats(&self) -> LimiterStats {
        let acquired = self.counters.acquired.load(Ordering::Relaxed);
        let avg_wait_time_us = if acquired > 0 {
            self.counters.total_wait_time_us.load(Ordering::Relaxed) / acquired
        } else {
            0
        };

        LimiterStats {
            name: self.config.name.clone(),
            max_concurrent: self.config.max_concurrent,
            acquired,
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            peak_in_flight: self.counters.peak_in_flight.load(Ordering::Relaxed),
            avg_wait_time_us,
        }
    }
}

/// Statistics for a limiter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LimiterStats {
    /// Limiter name
    pub name: String,
    /// Configured bound
    pub max_concurrent: usize,
    /// Slots handed out
    pub acquired: u64,
    /// Acquisitions refused because of cancellation
    pub rejected: u64,
    /// Slots currently held
    pub in_flight: usize,
    /// Highest number of slots held at once
    pub peak_in_flight: usize,
    /// Average wait for a slot (microseconds)
    pub avg_wait_time_us: u64,
}
