//! Lifecycle hooks
//!
//! The controller calls these directly, in a fixed order: `on_start` once
//! per attempt, then exactly one of `on_success`, `on_failure` or `on_skip`.
//! Suite hooks bracket a whole run.

use std::time::Duration;

use crate::common::Error;
use crate::report::EntryId;

use super::controller::SuiteSummary;

/// Identity of the attempt a hook is called for
#[derive(Debug, Clone)]
pub struct AttemptInfo {
    pub test_id: String,
    pub description: String,
    /// 1-based
    pub attempt: u32,
    pub entry: EntryId,
}

/// Observer of test and suite lifecycle events. Every method defaults to a
/// no-op.
pub trait LifecycleHooks: Send + Sync {
    fn on_suite_start(&self, _suite: &str, _tests: usize) {}

    fn on_start(&self, _attempt: &AttemptInfo) {}

    fn on_success(&self, _attempt: &AttemptInfo, _elapsed: Duration) {}

    /// `will_retry` is decided before this is called
    fn on_failure(&self, _attempt: &AttemptInfo, _error: &Error, _will_retry: bool) {}

    fn on_skip(&self, _attempt: &AttemptInfo, _reason: &str) {}

    fn on_suite_finish(&self, _summary: &SuiteSummary) {}
}

/// Hooks that only log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHooks;

impl LifecycleHooks for LoggingHooks {
    fn on_suite_start(&self, suite: &str, tests: usize) {
        tracing::info!(suite, tests, "Suite started");
    }

    fn on_start(&self, attempt: &AttemptInfo) {
        tracing::info!(test = %attempt.test_id, attempt = attempt.attempt, "Test started");
    }

    fn on_success(&self, attempt: &AttemptInfo, elapsed: Duration) {
        tracing::info!(test = %attempt.test_id, "Test passed in {:.1}s", elapsed.as_secs_f64());
    }

    fn on_failure(&self, attempt: &AttemptInfo, error: &Error, will_retry: bool) {
        if will_retry {
            tracing::warn!(test = %attempt.test_id, attempt = attempt.attempt, "Attempt failed, retrying: {}", error);
        } else {
            tracing::error!(test = %attempt.test_id, attempt = attempt.attempt, "Test failed: {}", error);
        }
    }

    fn on_skip(&self, attempt: &AttemptInfo, reason: &str) {
        tracing::warn!(test = %attempt.test_id, "Test skipped: {}", reason);
    }

    fn on_suite_finish(&self, summary: &SuiteSummary) {
        tracing::info!(
            suite = %summary.name,
            passed = summary.passed(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            "Suite finished in {:.1}s",
            summary.duration.as_secs_f64()
        );
    }
}
