//! Periodic poll driver for the auto-call scheduler.
//!
//! Auto-calling is a best-effort liveness sweep, not a precise timer:
//! the driver wakes on a coarse interval and hands control to a
//! [`PollTask`] that visits every room and lets each room's own
//! persisted interval decide whether a number is actually due. Waking
//! more often than any room's interval is safe by construction.
//!
//! # Disabled mode
//!
//! When `poll_interval` is zero the driver is disabled and
//! [`PollDriver::wait_for_sweep`] pends forever. This is the correct
//! behavior for deployments that only ever call numbers manually.
//!
//! # Integration
//!
//! The server spawns one driver task:
//!
//! ```ignore
//! tokio::spawn(async move {
//!     tambola_tick::run(PollDriver::new(config), task).await;
//! });
//! ```

#![allow(async_fn_in_trait)]

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the poll driver.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// How often the sweep runs. Zero disables the driver.
    pub poll_interval: Duration,
    /// Random jitter (0–max µs) added to the *first* sweep so several
    /// server instances started together don't sweep in lockstep.
    pub initial_jitter_us: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            initial_jitter_us: 200_000, // 0–200 ms
        }
    }
}

impl PollConfig {
    /// Fastest supported sweep cadence.
    pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

    /// Clamps out-of-range values so the config is safe to use. Called
    /// automatically by [`PollDriver::new`]. Zero (disabled) is kept
    /// as-is; anything else is raised to [`Self::MIN_POLL_INTERVAL`].
    pub fn validated(mut self) -> Self {
        if !self.poll_interval.is_zero()
            && self.poll_interval < Self::MIN_POLL_INTERVAL
        {
            warn!(
                interval_ms = self.poll_interval.as_millis() as u64,
                min_ms = Self::MIN_POLL_INTERVAL.as_millis() as u64,
                "poll interval below minimum, clamping"
            );
            self.poll_interval = Self::MIN_POLL_INTERVAL;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Task interface
// ---------------------------------------------------------------------------

/// What one sweep accomplished, for logging and metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Rooms visited this sweep.
    pub rooms_polled: usize,
    /// Numbers actually called (rooms that were due).
    pub numbers_called: usize,
    /// Rooms that hit a per-room error (logged, sweep continues).
    pub room_errors: usize,
}

/// The work the driver performs each sweep.
pub trait PollTask: Send + 'static {
    type Error: std::fmt::Display;

    /// Visits every candidate room once. Per-room failures should be
    /// handled internally and counted in [`SweepStats::room_errors`];
    /// an `Err` here means the whole sweep could not run.
    async fn poll(&mut self) -> Result<SweepStats, Self::Error>;
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Runtime metrics for the poll driver, updated after each sweep.
#[derive(Debug, Clone, Default)]
pub struct PollMetrics {
    /// Total sweeps executed.
    pub total_sweeps: u64,
    /// Sweeps that failed outright.
    pub total_sweep_errors: u64,
    /// Numbers called across all sweeps.
    pub total_numbers_called: u64,
    /// Exponential moving average of sweep execution time (α = 0.1).
    pub avg_sweep_time: Duration,
    /// Longest sweep observed.
    pub max_sweep_time: Duration,
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Schedules the auto-call sweep. One driver per server process.
pub struct PollDriver {
    config: PollConfig,
    sweep_count: u64,
    /// When the next sweep should fire; `None` when disabled.
    next_sweep: Option<TokioInstant>,
    /// Set by `wait_for_sweep`, consumed by `record_sweep_end`.
    sweep_start: Option<Instant>,
    metrics: PollMetrics,
}

impl PollDriver {
    pub fn new(config: PollConfig) -> Self {
        let config = config.validated();

        let next_sweep = if config.poll_interval.is_zero() {
            debug!("poll driver created in disabled mode");
            None
        } else {
            let jitter = if config.initial_jitter_us > 0 {
                let us =
                    rand::rng().random_range(0..config.initial_jitter_us);
                Duration::from_micros(us)
            } else {
                Duration::ZERO
            };
            debug!(
                interval_ms = config.poll_interval.as_millis() as u64,
                "poll driver created"
            );
            Some(TokioInstant::now() + config.poll_interval + jitter)
        };

        Self {
            config,
            sweep_count: 0,
            next_sweep,
            sweep_start: None,
            metrics: PollMetrics::default(),
        }
    }

    /// Waits until the next sweep is due. In disabled mode this pends
    /// forever, so it composes safely inside `tokio::select!`.
    pub async fn wait_for_sweep(&mut self) -> u64 {
        let Some(next) = self.next_sweep else {
            std::future::pending::<()>().await;
            unreachable!()
        };

        time::sleep_until(next).await;

        self.sweep_count += 1;
        self.sweep_start = Some(Instant::now());
        // Best-effort cadence: always schedule from now. A slow sweep
        // delays the next one instead of queueing catch-up sweeps.
        self.next_sweep =
            Some(TokioInstant::now() + self.config.poll_interval);

        trace!(sweep = self.sweep_count, "sweep due");
        self.sweep_count
    }

    /// Records the outcome of the sweep started by the last
    /// [`wait_for_sweep`](Self::wait_for_sweep).
    pub fn record_sweep_end(&mut self, stats: &SweepStats) {
        self.metrics.total_sweeps += 1;
        self.metrics.total_numbers_called +=
            stats.numbers_called as u64;

        let Some(start) = self.sweep_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        if elapsed > self.metrics.max_sweep_time {
            self.metrics.max_sweep_time = elapsed;
        }
        let alpha = 0.1;
        let prev = self.metrics.avg_sweep_time.as_secs_f64();
        self.metrics.avg_sweep_time = Duration::from_secs_f64(
            prev * (1.0 - alpha) + elapsed.as_secs_f64() * alpha,
        );

        if elapsed > self.config.poll_interval {
            warn!(
                sweep = self.sweep_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                interval_ms =
                    self.config.poll_interval.as_millis() as u64,
                "sweep took longer than the poll interval"
            );
        }
    }

    pub fn record_sweep_error(&mut self) {
        self.sweep_start = None;
        self.metrics.total_sweeps += 1;
        self.metrics.total_sweep_errors += 1;
    }

    /// Whether the driver will ever fire.
    pub fn is_disabled(&self) -> bool {
        self.next_sweep.is_none()
    }

    pub fn sweep_count(&self) -> u64 {
        self.sweep_count
    }

    pub fn metrics(&self) -> &PollMetrics {
        &self.metrics
    }
}

/// Drives `task` forever on `driver`'s cadence. Sweep failures are
/// logged and the loop keeps going; the next sweep may succeed.
pub async fn run<T: PollTask>(mut driver: PollDriver, mut task: T) {
    loop {
        let sweep = driver.wait_for_sweep().await;
        match task.poll().await {
            Ok(stats) => {
                driver.record_sweep_end(&stats);
                if stats.numbers_called > 0 || stats.room_errors > 0 {
                    debug!(
                        sweep,
                        rooms = stats.rooms_polled,
                        called = stats.numbers_called,
                        errors = stats.room_errors,
                        "sweep finished"
                    );
                }
            }
            Err(e) => {
                driver.record_sweep_error();
                warn!(sweep, error = %e, "sweep failed");
            }
        }
    }
}
