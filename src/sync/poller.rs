//! Condition poller
//!
//! The only place in the harness that waits on application state. A
//! predicate is evaluated repeatedly at the poll interval until it yields a
//! value, the timeout elapses, or the wait is cancelled. Errors whose kind is
//! in the [`WaitSpec`]'s ignored set count as "not ready yet"; any other error
//! ends the wait immediately.
//!
//! A single evaluation is cut off at the deadline, elapsed time is re-checked
//! after every evaluation and the sleep is capped at the time remaining, so a
//! never-satisfied or hung predicate fails within one poll interval of the
//! timeout.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::common::{Config, Error, ErrorKind, Result};

/// Error kinds swallowed by default: the element isn't attached yet, or was
/// replaced while being inspected
pub const DEFAULT_IGNORED: [ErrorKind; 2] = [ErrorKind::NoSuchElement, ErrorKind::StaleElement];

/// Timeout, poll interval and ignorable errors for one kind of wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitSpec {
    timeout: Duration,
    poll_interval: Duration,
    ignored: Vec<ErrorKind>,
}

impl WaitSpec {
    /// A spec that ignores [`DEFAULT_IGNORED`]
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            ignored: DEFAULT_IGNORED.to_vec(),
        }
    }

    /// Explicit wait and poll interval from the configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.waits.explicit_wait, config.waits.poll_interval)
    }

    /// Replace the ignored set
    pub fn ignoring(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.ignored = kinds.into_iter().collect();
        self
    }

    /// Same spec with a different timeout
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn ignores(&self, kind: ErrorKind) -> bool {
        self.ignored.contains(&kind)
    }
}

/// Polls predicates under a [`WaitSpec`]
#[derive(Debug, Clone)]
pub struct Poller {
    spec: WaitSpec,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(spec: WaitSpec) -> Self {
        Self {
            spec,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` to abort waits from outside (e.g. at suite shutdown)
    pub fn with_cancellation(spec: WaitSpec, cancel: CancellationToken) -> Self {
        Self { spec, cancel }
    }

    pub fn spec(&self) -> &WaitSpec {
        &self.spec
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Same cancellation token, different spec
    pub fn with_spec(&self, spec: WaitSpec) -> Self {
        Self {
            spec,
            cancel: self.cancel.clone(),
        }
    }

    /// Wait until `predicate` yields `Some(value)`
    ///
    /// `description` names the condition in timeout errors and logs, e.g.
    /// "css=#checkout to be visible".
    pub async fn until<T, F, Fut>(&self, description: &str, mut predicate: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let start = Instant::now();
        let deadline = start + self.spec.timeout;
        let mut last_error: Option<String> = None;
        let mut polls = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled {
                    condition: description.to_string(),
                });
            }

            polls += 1;
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(Error::Cancelled { condition: description.to_string() });
                }
                outcome = predicate() => outcome,
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::debug!(condition = description, polls, "Evaluation still running at timeout");
                    return Err(Error::timeout(description, start.elapsed(), last_error));
                }
            };

            match outcome {
                Ok(Some(value)) => {
                    tracing::trace!(
                        condition = description,
                        polls,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Condition met"
                    );
                    return Ok(value);
                }
                Ok(None) => {}
                Err(e) if self.spec.ignores(e.kind()) => {
                    tracing::trace!(condition = description, "Ignoring transient error: {}", e);
                    last_error = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }

            let elapsed = start.elapsed();
            if elapsed >= self.spec.timeout {
                tracing::debug!(condition = description, polls, "Wait timed out after {:?}", elapsed);
                return Err(Error::timeout(description, elapsed, last_error));
            }

            let remaining = self.spec.timeout - elapsed;
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(Error::Cancelled { condition: description.to_string() });
                }
                _ = tokio::time::sleep(self.spec.poll_interval.min(remaining)) => {}
            }
        }
    }

    /// Wait until `predicate` returns true
    pub async fn until_true<F, Fut>(&self, description: &str, mut predicate: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        self.until(description, || {
            let fut = predicate();
            async move { Ok(fut.await?.then_some(())) }
        })
        .await
    }
}
