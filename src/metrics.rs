// Preparation metrics module
//
// Lightweight counters for reporting what the runs of one preparer did and how long they took

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Metrics accumulated over every run of one preparer
///
/// Uses atomic operations so the counters can be shared by reference with
/// the pipeline while the controller keeps recording per-file outcomes.
#[derive(Debug)]
pub struct Metrics {
    /// Files whose full step sequence ran
    pub files_prepared: AtomicUsize,

    /// Files abandoned after a recoverable tool failure
    pub files_failed: AtomicUsize,

    /// Files skipped because a result already existed
    pub files_skipped: AtomicUsize,

    /// Files taken from an earlier project's preparation
    pub files_reused: AtomicUsize,

    /// Preparation steps completed
    pub steps_executed: AtomicU64,

    /// External tool processes started
    pub tool_invocations: AtomicU64,

    /// Time spent in step sequences, in milliseconds
    pub total_preparation_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            files_prepared: AtomicUsize::new(0),
            files_failed: AtomicUsize::new(0),
            files_skipped: AtomicUsize::new(0),
            files_reused: AtomicUsize::new(0),
            steps_executed: AtomicU64::new(0),
            tool_invocations: AtomicU64::new(0),
            total_preparation_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_file_prepared(&self) {
        self.files_prepared.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_reused(&self) {
        self.files_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_step(&self) {
        self.steps_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tool_invocation(&self) {
        self.tool_invocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time spent preparing one file
    pub fn record_preparation_time(&self, duration: Duration) {
        self.total_preparation_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Time since the metrics were created
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average preparation time per prepared file in milliseconds
    pub fn avg_preparation_time_ms(&self) -> f64 {
        let total = self.total_preparation_time_ms.load(Ordering::Relaxed);
        let count = self.files_prepared.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log the counters; they cover every run since the metrics were created.
    pub fn log_summary(&self) {
        tracing::info!("=== Preparation Summary (all runs so far) ===");
        tracing::info!("Elapsed: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Files: {} prepared, {} reused, {} skipped, {} failed",
            self.files_prepared.load(Ordering::Relaxed),
            self.files_reused.load(Ordering::Relaxed),
            self.files_skipped.load(Ordering::Relaxed),
            self.files_failed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Preparation time: {:.2}s (avg: {:.2}ms per file)",
            self.total_preparation_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_preparation_time_ms()
        );
        tracing::info!(
            "Steps executed: {}, tool invocations: {}",
            self.steps_executed.load(Ordering::Relaxed),
            self.tool_invocations.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.files_prepared.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tool_invocations.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_file_outcomes() {
        let metrics = Metrics::new();

        metrics.record_file_prepared();
        metrics.record_file_prepared();
        metrics.record_file_failed();
        metrics.record_file_skipped();
        metrics.record_file_reused();

        assert_eq!(metrics.files_prepared.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.files_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.files_skipped.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.files_reused.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_average_preparation_time() {
        let metrics = Metrics::new();
        assert_eq!(metrics.avg_preparation_time_ms(), 0.0);

        metrics.record_file_prepared();
        metrics.record_preparation_time(Duration::from_millis(100));
        metrics.record_file_prepared();
        metrics.record_preparation_time(Duration::from_millis(200));

        assert_eq!(metrics.total_preparation_time_ms.load(Ordering::Relaxed), 300);
        assert_eq!(metrics.avg_preparation_time_ms(), 150.0);
    }

    #[test]
    fn test_uptime() {
        let metrics = Metrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }
}
