//! Operation counters, latency samples, tracked memory and progress/ETA.
//!
//! Memory is accounted explicitly: fetchers hold a [`ResidentGuard`] and grow
//! it by the estimated size of every record they keep. Dropping the guard
//! releases those bytes, so the resident figure always reflects what is alive.
//! Nothing here returns an error or panics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::config::ReconcilerConfig;

const MIB: f64 = 1024.0 * 1024.0;

/// Shared run-wide metrics. Cheap to call from any task.
#[derive(Debug)]
pub struct MetricsMonitor {
    started: Instant,
    operations: AtomicU64,
    errors: AtomicU64,
    latencies: Mutex<Vec<Duration>>,
    resident_bytes: AtomicU64,
    peak_bytes: AtomicU64,
    budget_bytes: u64,
    pause_threshold: f64,
    progress_interval: u64,
}

/// A progress line, as logged by [`MetricsMonitor::report_progress`].
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Items done.
    pub current: u64,
    /// Items expected.
    pub total: u64,
    /// Percentage of `total` done.
    pub percent: f64,
    /// Estimated time to finish, from the average pace so far.
    pub eta: Duration,
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalReport {
    /// Wall time since the monitor was created.
    pub total_duration: Duration,
    /// Remote operations recorded.
    pub operations: u64,
    /// Failed remote operations.
    pub errors: u64,
    /// Operations per second over the whole run.
    pub ops_per_sec: f64,
    /// `errors / operations`, in percent.
    pub error_rate_pct: f64,
    /// Mean latency of recorded operations.
    pub avg_latency_ms: f64,
    /// Highest tracked resident memory.
    pub peak_memory_mb: f64,
}

impl fmt::Display for FinalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ops in {:.1}s ({:.1} ops/s), error rate {:.2}%, avg latency {:.1}ms, peak memory {:.1}MB",
            self.operations,
            self.total_duration.as_secs_f64(),
            self.ops_per_sec,
            self.error_rate_pct,
            self.avg_latency_ms,
            self.peak_memory_mb,
        )
    }
}

impl MetricsMonitor {
    /// Monitor with an explicit memory budget, pause threshold (fraction of
    /// the budget) and progress interval (items).
    pub fn new(budget_bytes: u64, pause_threshold: f64, progress_interval: u64) -> Self {
        Self {
            started: Instant::now(),
            operations: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            latencies: Mutex::new(Vec::new()),
            resident_bytes: AtomicU64::new(0),
            peak_bytes: AtomicU64::new(0),
            budget_bytes: budget_bytes.max(1),
            pause_threshold,
            progress_interval: progress_interval.max(1),
        }
    }

    /// Monitor configured from the `[memory]` and `[progress]` sections.
    pub fn from_config(cfg: &ReconcilerConfig) -> Self {
        Self::new(
            cfg.memory.budget_bytes(),
            cfg.memory.pause_threshold,
            cfg.progress.interval,
        )
    }

    /// Appends a latency sample and bumps the operation (and error) counters.
    pub fn record_operation(&self, duration: Duration, success: bool) {
        self.operations.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        self.latencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }

    /// Samples the tracked resident bytes into the peak and returns the sample.
    pub fn record_memory_usage(&self) -> u64 {
        let now = self.resident_bytes.load(Ordering::Relaxed);
        self.peak_bytes.fetch_max(now, Ordering::Relaxed);
        now
    }

    /// `true` when tracked bytes exceed `pause_threshold` of the budget.
    pub fn should_pause_for_memory(&self) -> bool {
        let used = self.resident_bytes.load(Ordering::Relaxed) as f64;
        used / self.budget_bytes as f64 > self.pause_threshold
    }

    /// Bytes currently held through live [`ResidentGuard`]s.
    pub fn resident_bytes(&self) -> u64 {
        self.resident_bytes.load(Ordering::Relaxed)
    }

    /// Opens an accounting scope; grow it as records accumulate.
    pub fn track_resident(self: &Arc<Self>) -> ResidentGuard {
        ResidentGuard {
            monitor: Arc::clone(self),
            bytes: 0,
        }
    }

    /// Logs progress every `progress_interval` items and on completion.
    ///
    /// Returns the logged figures, or `None` when nothing was due.
    pub fn report_progress(&self, current: u64, total: u64, label: &str) -> Option<Progress> {
        if current == 0 || (current % self.progress_interval != 0 && current < total) {
            return None;
        }

        let elapsed = self.started.elapsed();
        let remaining = total.saturating_sub(current);
        let eta = Duration::try_from_secs_f64(
            elapsed.as_secs_f64() * remaining as f64 / current as f64,
        )
        .unwrap_or(Duration::MAX);
        let percent = if total == 0 {
            100.0
        } else {
            current as f64 * 100.0 / total as f64
        };

        info!(
            label,
            current,
            total,
            percent,
            eta_secs = eta.as_secs(),
            "progress"
        );
        Some(Progress {
            current,
            total,
            percent,
            eta,
        })
    }

    /// Totals since the monitor was created.
    pub fn final_report(&self) -> FinalReport {
        let total_duration = self.started.elapsed();
        let operations = self.operations.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let latencies = self
            .latencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let secs = total_duration.as_secs_f64();
        let ops_per_sec = if secs > 0.0 {
            operations as f64 / secs
        } else {
            0.0
        };
        let error_rate_pct = if operations > 0 {
            errors as f64 * 100.0 / operations as f64
        } else {
            0.0
        };
        let avg_latency_ms = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().map(Duration::as_secs_f64).sum::<f64>() * 1000.0
                / latencies.len() as f64
        };
        let peak = self
            .peak_bytes
            .load(Ordering::Relaxed)
            .max(self.resident_bytes.load(Ordering::Relaxed));

        FinalReport {
            total_duration,
            operations,
            errors,
            ops_per_sec,
            error_rate_pct,
            avg_latency_ms,
            peak_memory_mb: peak as f64 / MIB,
        }
    }
}

impl Default for MetricsMonitor {
    fn default() -> Self {
        Self::from_config(&ReconcilerConfig::default())
    }
}

/// Bytes held on behalf of one accumulated collection.
///
/// Released from the monitor when dropped.
#[derive(Debug)]
pub struct ResidentGuard {
    monitor: Arc<MetricsMonitor>,
    bytes: u64,
}

impl ResidentGuard {
    /// Adds `bytes` to this scope and to the monitor.
    pub fn grow(&mut self, bytes: usize) {
        let bytes = bytes as u64;
        self.bytes += bytes;
        let now = self.monitor.resident_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.monitor.peak_bytes.fetch_max(now, Ordering::Relaxed);
    }
}

impl Drop for ResidentGuard {
    fn drop(&mut self) {
        self.monitor
            .resident_bytes
            .fetch_sub(self.bytes, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_rate_and_latency_average() {
        let m = MetricsMonitor::new(1024, 0.8, 10);
        m.record_operation(Duration::from_millis(10), true);
        m.record_operation(Duration::from_millis(30), false);

        let report = m.final_report();
        assert_eq!(report.operations, 2);
        assert_eq!(report.errors, 1);
        assert!((report.error_rate_pct - 50.0).abs() < 1e-9);
        assert!((report.avg_latency_ms - 20.0).abs() < 1e-6);
    }

    #[test]
    fn empty_report_has_no_nans() {
        let report = MetricsMonitor::new(1024, 0.8, 10).final_report();
        assert_eq!(report.error_rate_pct, 0.0);
        assert_eq!(report.avg_latency_ms, 0.0);
        assert!(report.ops_per_sec.is_finite());
    }

    #[test]
    fn guards_drive_pressure_and_peak() {
        let m = Arc::new(MetricsMonitor::new(1000, 0.8, 10));
        let mut guard = m.track_resident();
        guard.grow(500);
        assert!(!m.should_pause_for_memory());
        guard.grow(400);
        assert!(m.should_pause_for_memory());
        assert_eq!(m.record_memory_usage(), 900);

        drop(guard);
        assert_eq!(m.resident_bytes(), 0);
        assert!(!m.should_pause_for_memory());
        assert!(m.final_report().peak_memory_mb > 0.0);
    }

    #[test]
    fn progress_is_reported_on_interval_and_completion() {
        let m = MetricsMonitor::new(1024, 0.8, 1000);
        assert!(m.report_progress(0, 2500, "x").is_none());
        assert!(m.report_progress(999, 2500, "x").is_none());
        assert!(m.report_progress(1000, 2500, "x").is_some());

        let done = m.report_progress(2500, 2500, "x").unwrap();
        assert_eq!(done.eta, Duration::ZERO);
        assert!((done.percent - 100.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn eta_extrapolates_the_pace_so_far() {
        let m = MetricsMonitor::new(1024, 0.8, 250);
        tokio::time::advance(Duration::from_secs(10)).await;

        let p = m.report_progress(250, 1000, "x").unwrap();

        assert_eq!(p.eta, Duration::from_secs(30));
        assert!((p.percent - 25.0).abs() < 1e-9);
    }
}
