//! Synchronized interaction layer
//!
//! Page objects depend on the [`InteractionExecutor`] capability rather than a
//! base class; [`SyncEngine`] is the one implementation. Every action waits
//! for its precondition through the [`Poller`] before touching the page.
//!
//! `click` is two-tier: native click first, then a script click that skips
//! hit-testing when the native path fails for any reason (overlay, animation,
//! element replaced between the wait and the click). A rescued click is
//! reported as [`InteractionOutcome::FallbackUsed`] and noted in the test's
//! report log, so flaky pages show up in the evidence.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::{Browser, Locator};
use crate::common::{Action, Error, Result};
use crate::report::TestLog;

use super::poller::Poller;

/// How a successful interaction went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionOutcome {
    /// Primary strategy worked
    Success,
    /// Primary strategy failed, the fallback worked
    FallbackUsed,
}

/// Strategy used for one tier of an interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Native,
    Script,
}

/// Final state of an [`InteractionAttempt`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    FallbackUsed,
    Failed(String),
}

/// Record of one interaction call; logged, never persisted
#[derive(Debug, Clone)]
pub struct InteractionAttempt {
    pub action: Action,
    pub target: String,
    pub primary: Strategy,
    pub fallback: Option<Strategy>,
    pub outcome: AttemptOutcome,
}

impl InteractionAttempt {
    fn emit(&self) {
        match &self.outcome {
            AttemptOutcome::Success => {
                tracing::debug!(action = %self.action, target = %self.target, "Interaction succeeded")
            }
            AttemptOutcome::FallbackUsed => tracing::warn!(
                action = %self.action,
                target = %self.target,
                fallback = ?self.fallback,
                "Interaction needed fallback"
            ),
            AttemptOutcome::Failed(reason) => tracing::error!(
                action = %self.action,
                target = %self.target,
                "Interaction failed: {}",
                reason
            ),
        }
    }
}

/// What a wait requires of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Condition {
    Present,
    Visible,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Visible => write!(f, "visible"),
        }
    }
}

/// Synchronized actions available to test code
#[async_trait]
pub trait InteractionExecutor: Send + Sync {
    type Element: Send + Sync;

    /// Wait until clickable, click; fall back to a script click on failure
    async fn click(&self, target: &Locator) -> Result<InteractionOutcome>;

    /// Wait until visible, clear, type `text`
    async fn type_text(&self, target: &Locator, text: &str) -> Result<()>;

    /// Wait until visible and return the element
    async fn wait_visible(&self, target: &Locator) -> Result<Self::Element>;

    /// Non-throwing visibility check; absent or stale elements are not displayed
    async fn is_displayed(&self, target: &Locator) -> bool;

    /// Wait until visible and return the rendered text
    async fn read_text(&self, target: &Locator) -> Result<String>;

    /// Wait until present and scroll the element into view
    async fn scroll_into_view(&self, target: &Locator) -> Result<()>;
}

/// The synchronization engine over one browser session
pub struct SyncEngine<'s, B: Browser> {
    browser: &'s B,
    poller: Poller,
    log: Option<TestLog>,
    fallbacks: Arc<AtomicU32>,
}

impl<'s, B: Browser> SyncEngine<'s, B> {
    pub fn new(browser: &'s B, poller: Poller) -> Self {
        Self {
            browser,
            poller,
            log: None,
            fallbacks: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Note rescued interactions in this test's report log
    pub fn with_log(mut self, log: TestLog) -> Self {
        self.log = Some(log);
        self
    }

    /// An engine sharing this one's browser, log and counters but waiting
    /// up to `timeout` instead of the configured explicit wait
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            browser: self.browser,
            poller: self.poller.with_spec(self.poller.spec().with_timeout(timeout)),
            log: self.log.clone(),
            fallbacks: Arc::clone(&self.fallbacks),
        }
    }

    pub fn browser(&self) -> &'s B {
        self.browser
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    /// Number of interactions that needed their fallback
    pub fn fallback_count(&self) -> u32 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    async fn wait_for(&self, target: &Locator, condition: Condition) -> Result<B::Element> {
        let description = format!("{} to be {}", target, condition);
        let browser = self.browser;
        self.poller
            .until(&description, || async move {
                let element = browser.find(target).await?;
                let ready = match condition {
                    Condition::Present => true,
                    Condition::Visible => browser.is_displayed(&element).await?,
                };
                Ok(ready.then_some(element))
            })
            .await
    }

    /// Wait until the element is attached to the DOM, visible or not
    pub async fn wait_present(&self, target: &Locator) -> Result<B::Element> {
        self.wait_for(target, Condition::Present).await
    }

    /// Wait for `document.readyState` to be "complete"
    pub async fn wait_page_load(&self) -> Result<()> {
        let browser = self.browser;
        self.poller
            .until_true("page load to complete", || async move {
                let state = browser.execute("return document.readyState").await?;
                Ok(state.as_str() == Some("complete"))
            })
            .await?;
        tracing::debug!("Page loaded completely");
        Ok(())
    }

    /// Wait for jQuery to report no active requests. Pages without jQuery
    /// count as idle.
    pub async fn wait_ajax_idle(&self) -> Result<()> {
        let browser = self.browser;
        self.poller
            .until_true("ajax requests to complete", || async move {
                match browser.execute("return jQuery.active").await {
                    Ok(Value::Number(n)) => Ok(n.as_i64() == Some(0)),
                    Ok(_) => Ok(true),
                    Err(Error::WebDriver(msg)) => {
                        tracing::trace!("jQuery unavailable, treating page as idle: {}", msg);
                        Ok(true)
                    }
                    Err(e) => Err(e),
                }
            })
            .await?;
        tracing::debug!("Ajax calls completed");
        Ok(())
    }

    /// Resolve, wait for visible and enabled, then click, all inside one
    /// wait: an ignorable error from the click itself re-resolves the element
    async fn native_click(&self, target: &Locator) -> Result<()> {
        let description = format!("{} to be clicked", target);
        let browser = self.browser;
        self.poller
            .until(&description, || async move {
                let element = browser.find(target).await?;
                if !browser.is_displayed(&element).await? || !browser.is_enabled(&element).await? {
                    return Ok(None);
                }
                browser.click(&element).await?;
                Ok(Some(()))
            })
            .await
    }

    async fn script_click(&self, target: &Locator) -> Result<()> {
        let element = self.browser.find(target).await?;
        self.browser.script_click(&element).await
    }

    fn note(&self, message: String) {
        if let Some(log) = &self.log {
            if let Err(e) = log.warning(message) {
                tracing::debug!("Could not add note to report: {}", e);
            }
        }
    }
}

#[async_trait]
impl<'s, B: Browser> InteractionExecutor for SyncEngine<'s, B> {
    type Element = B::Element;

    async fn click(&self, target: &Locator) -> Result<InteractionOutcome> {
        let mut attempt = InteractionAttempt {
            action: Action::Click,
            target: target.to_string(),
            primary: Strategy::Native,
            fallback: None,
            outcome: AttemptOutcome::Success,
        };

        let primary_error = match self.native_click(target).await {
            Ok(()) => {
                attempt.emit();
                return Ok(InteractionOutcome::Success);
            }
            Err(e @ Error::Cancelled { .. }) => return Err(e),
            Err(e) => e,
        };

        tracing::warn!("Native click on {} failed: {}; trying script click", target, primary_error);
        attempt.fallback = Some(Strategy::Script);

        match self.script_click(target).await {
            Ok(()) => {
                attempt.outcome = AttemptOutcome::FallbackUsed;
                attempt.emit();
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                self.note(format!(
                    "Click on {} needed script fallback after: {}",
                    target, primary_error
                ));
                Ok(InteractionOutcome::FallbackUsed)
            }
            Err(fallback_error) => {
                let err = Error::interaction(Action::Click, target, primary_error, Some(&fallback_error));
                attempt.outcome = AttemptOutcome::Failed(err.to_string());
                attempt.emit();
                Err(err)
            }
        }
    }

    async fn type_text(&self, target: &Locator, text: &str) -> Result<()> {
        let typed = async {
            let element = self.wait_for(target, Condition::Visible).await?;
            self.browser.clear(&element).await?;
            self.browser.send_keys(&element, text).await
        }
        .await;

        match typed {
            Ok(()) => {
                tracing::debug!("Typed {} chars into {}", text.chars().count(), target);
                Ok(())
            }
            Err(e @ Error::Cancelled { .. }) => Err(e),
            Err(e) => {
                tracing::error!("Failed to type into {}: {}", target, e);
                Err(Error::interaction(Action::Type, target, e, None))
            }
        }
    }

    async fn wait_visible(&self, target: &Locator) -> Result<B::Element> {
        self.wait_for(target, Condition::Visible).await
    }

    async fn is_displayed(&self, target: &Locator) -> bool {
        let element = match self.browser.find(target).await {
            Ok(element) => element,
            Err(e) => {
                tracing::debug!("{} is not displayed: {}", target, e);
                return false;
            }
        };
        match self.browser.is_displayed(&element).await {
            Ok(displayed) => displayed,
            Err(e) => {
                tracing::debug!("{} is not displayed: {}", target, e);
                false
            }
        }
    }

    async fn read_text(&self, target: &Locator) -> Result<String> {
        let element = self.wait_for(target, Condition::Visible).await?;
        self.browser.text(&element).await
    }

    async fn scroll_into_view(&self, target: &Locator) -> Result<()> {
        let element = self.wait_for(target, Condition::Present).await?;
        self.browser
            .scroll_into_view(&element)
            .await
            .map_err(|e| Error::interaction(Action::ScrollIntoView, target, e, None))?;
        tracing::debug!("Scrolled {} into view", target);
        Ok(())
    }
}
