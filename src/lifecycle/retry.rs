//! Bounded retry per test identity

use std::collections::HashMap;
use std::sync::Mutex;

use crate::common::Config;
use crate::report::TestStatus;

/// Retry bookkeeping for one test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempts: u32,
    pub max_attempts: u32,
}

/// Decides whether a failed test runs again
///
/// Counters are keyed by test id and never reset, so a test that keeps
/// failing gets `max_attempts` retries over the life of the policy no matter
/// how often it is scheduled.
#[derive(Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    states: Mutex<HashMap<String, RetryState>>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.retry_max_attempts)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// True, and counts the retry, iff `status` is a failure and the test
    /// has retries left
    pub fn should_retry(&self, test_id: &str, status: TestStatus) -> bool {
        if status != TestStatus::Failed {
            return false;
        }
        let mut states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        let state = states.entry(test_id.to_string()).or_insert(RetryState {
            attempts: 0,
            max_attempts: self.max_attempts,
        });
        if state.attempts < state.max_attempts {
            state.attempts += 1;
            tracing::info!(
                test = test_id,
                "Retrying test ({}/{})",
                state.attempts,
                state.max_attempts
            );
            true
        } else {
            tracing::debug!(test = test_id, "Retries exhausted");
            false
        }
    }

    /// Retries granted so far
    pub fn attempts(&self, test_id: &str) -> u32 {
        self.state(test_id).map(|s| s.attempts).unwrap_or(0)
    }

    pub fn state(&self, test_id: &str) -> Option<RetryState> {
        let states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        states.get(test_id).copied()
    }
}
