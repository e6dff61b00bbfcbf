//! Failure-rate circuit breaker for a batch of files.

/// Share of a batch, in percent, that may fail before the run is aborted.
pub const TOLERATED_FAILURE_PERCENT: f64 = 0.5;

/// What the caller should do after a recoverable failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Abort,
}

/// Counts recoverable tool failures and decides when a batch has failed too often.
///
/// The threshold is fixed when the governor is created for a batch:
/// `max(round(n / 100 * 0.5), 1)` for more than one file, `0` otherwise, so a
/// single-file run aborts on its first failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureGovernor {
    errors_seen: usize,
    max_errors: usize,
}

impl FailureGovernor {
    /// Governor sized for a batch of `file_count` files.
    pub fn for_batch(file_count: usize) -> Self {
        Self::with_threshold(Self::threshold_for(file_count))
    }

    pub fn with_threshold(max_errors: usize) -> Self {
        Self {
            errors_seen: 0,
            max_errors,
        }
    }

    /// Number of failures tolerated in a batch of `file_count` files.
    pub fn threshold_for(file_count: usize) -> usize {
        if file_count <= 1 {
            return 0;
        }
        // f64::round rounds halves away from zero (round(0.5) == 1, round(2.5) == 3)
        let scaled = (file_count as f64 / 100.0 * TOLERATED_FAILURE_PERCENT).round() as usize;
        scaled.max(1)
    }

    /// Count one recoverable failure.
    pub fn record_failure(&mut self) -> Verdict {
        self.errors_seen += 1;
        if self.errors_seen > self.max_errors {
            Verdict::Abort
        } else {
            Verdict::Continue
        }
    }

    pub fn errors_seen(&self) -> usize {
        self.errors_seen
    }

    pub fn max_errors(&self) -> usize {
        self.max_errors
    }
}
