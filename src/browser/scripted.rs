//! In-memory browser with scripted page behavior
//!
//! Used by `uiharness run --dry-run` to check scenarios without a driver and
//! by the test suite to reproduce timing and flakiness deterministically:
//! elements can appear after a delay, go stale a number of times, or reject
//! native clicks. Time is measured with `tokio::time`, so tests running on a
//! paused clock see exact delays.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use crate::common::config::{BrowserSettings, WindowSize};
use crate::common::{Error, Result};

use super::{Browser, Launcher, Locator};

/// A failure the scripted page can inject
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedFailure {
    Missing,
    Stale,
    Intercepted,
    NotInteractable,
    WebDriver(String),
}

impl ScriptedFailure {
    fn into_error(self, target: &Locator) -> Error {
        let target = target.to_string();
        match self {
            Self::Missing => Error::NoSuchElement(target),
            Self::Stale => Error::StaleElement(target),
            Self::Intercepted => Error::ClickIntercepted(target),
            Self::NotInteractable => Error::NotInteractable(target),
            Self::WebDriver(msg) => Error::WebDriver(msg),
        }
    }
}

/// Scripted behavior and observed state of one element
#[derive(Debug, Clone)]
pub struct ScriptedElement {
    present_after: Duration,
    visible_after: Option<Duration>,
    enabled: bool,
    text: String,
    find_failures: VecDeque<ScriptedFailure>,
    click_failures: VecDeque<ScriptedFailure>,
    script_click_failures: VecDeque<ScriptedFailure>,
    always_fail_click: Option<ScriptedFailure>,
    always_fail_script_click: Option<ScriptedFailure>,
    /// Native clicks that went through
    pub clicks: u32,
    /// Script clicks that went through
    pub script_clicks: u32,
    /// Current input value
    pub value: String,
    pub scrolled_into_view: bool,
}

impl Default for ScriptedElement {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedElement {
    /// Present, visible and enabled from the start
    pub fn new() -> Self {
        Self {
            present_after: Duration::ZERO,
            visible_after: Some(Duration::ZERO),
            enabled: true,
            text: String::new(),
            find_failures: VecDeque::new(),
            click_failures: VecDeque::new(),
            script_click_failures: VecDeque::new(),
            always_fail_click: None,
            always_fail_script_click: None,
            clicks: 0,
            script_clicks: 0,
            value: String::new(),
            scrolled_into_view: false,
        }
    }

    /// Not attached to the DOM until `delay` after the browser started
    pub fn present_after(mut self, delay: Duration) -> Self {
        self.present_after = delay;
        self
    }

    /// Rendered visible `delay` after the browser started
    pub fn visible_after(mut self, delay: Duration) -> Self {
        self.visible_after = Some(delay);
        self
    }

    /// Present but never visible
    pub fn hidden(mut self) -> Self {
        self.visible_after = None;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// The next `times` lookups fail with `failure`
    pub fn fail_find(mut self, failure: ScriptedFailure, times: usize) -> Self {
        self.find_failures.extend(std::iter::repeat(failure).take(times));
        self
    }

    /// The next `times` native clicks fail with `failure`
    pub fn fail_click(mut self, failure: ScriptedFailure, times: usize) -> Self {
        self.click_failures.extend(std::iter::repeat(failure).take(times));
        self
    }

    /// Every native click fails with `failure`
    pub fn always_fail_click(mut self, failure: ScriptedFailure) -> Self {
        self.always_fail_click = Some(failure);
        self
    }

    /// The next `times` script clicks fail with `failure`
    pub fn fail_script_click(mut self, failure: ScriptedFailure, times: usize) -> Self {
        self.script_click_failures.extend(std::iter::repeat(failure).take(times));
        self
    }

    /// Every script click fails with `failure`
    pub fn always_fail_script_click(mut self, failure: ScriptedFailure) -> Self {
        self.always_fail_script_click = Some(failure);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn present_at(&self, elapsed: Duration) -> bool {
        elapsed >= self.present_after
    }

    fn visible_at(&self, elapsed: Duration) -> bool {
        self.present_at(elapsed) && self.visible_after.is_some_and(|d| elapsed >= d)
    }
}

/// How the page answers screenshot requests
#[derive(Debug, Clone)]
pub enum ScreenshotBehavior {
    Png(Vec<u8>),
    Fail(String),
}

/// Minimal valid 1x1 PNG
const BLANK_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

#[derive(Debug)]
struct Page {
    elements: HashMap<Locator, ScriptedElement>,
    /// Unknown locators resolve to a fresh visible element
    permissive: bool,
    ready_after: Duration,
    jquery_active: Option<i64>,
    screenshot: ScreenshotBehavior,
    goto_failure: Option<String>,
    url: Option<String>,
    window: Option<WindowSize>,
    closed: bool,
}

/// Scripted browser; clones share the same page state
#[derive(Debug, Clone)]
pub struct ScriptedBrowser {
    page: Arc<Mutex<Page>>,
    events: Arc<Mutex<Vec<String>>>,
    started: Instant,
}

impl Default for ScriptedBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self {
            page: Arc::new(Mutex::new(Page {
                elements: HashMap::new(),
                permissive: false,
                ready_after: Duration::ZERO,
                jquery_active: None,
                screenshot: ScreenshotBehavior::Png(BLANK_PNG.to_vec()),
                goto_failure: None,
                url: None,
                window: None,
                closed: false,
            })),
            events: Arc::new(Mutex::new(Vec::new())),
            started: Instant::now(),
        }
    }

    /// A page on which every locator resolves to a visible, enabled element
    pub fn permissive() -> Self {
        let browser = Self::new();
        browser.page().permissive = true;
        browser
    }

    pub fn with_element(self, locator: Locator, element: ScriptedElement) -> Self {
        self.page().elements.insert(locator, element);
        self
    }

    /// `document.readyState` reports "complete" only after `delay`
    pub fn ready_after(self, delay: Duration) -> Self {
        self.page().ready_after = delay;
        self
    }

    /// Value reported for `jQuery.active`; `None` means no jQuery on the page
    pub fn with_jquery_active(self, active: Option<i64>) -> Self {
        self.page().jquery_active = active;
        self
    }

    pub fn with_screenshot(self, behavior: ScreenshotBehavior) -> Self {
        self.page().screenshot = behavior;
        self
    }

    /// Navigation fails with a WebDriver error
    pub fn fail_navigation(self, message: impl Into<String>) -> Self {
        self.page().goto_failure = Some(message.into());
        self
    }

    /// Replace or insert an element while a test is running
    pub fn set_element(&self, locator: Locator, element: ScriptedElement) {
        self.page().elements.insert(locator, element);
    }

    /// Snapshot of an element's state
    pub fn element(&self, locator: &Locator) -> Option<ScriptedElement> {
        self.page().elements.get(locator).cloned()
    }

    pub fn current_url(&self) -> Option<String> {
        self.page().url.clone()
    }

    pub fn window(&self) -> Option<WindowSize> {
        self.page().window
    }

    pub fn is_closed(&self) -> bool {
        self.page().closed
    }

    /// Calls made against the browser, in order
    pub fn events(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn page(&self) -> MutexGuard<'_, Page> {
        // A poisoned lock only means another test thread panicked
        self.page.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn record(&self, event: impl Into<String>) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.into());
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Run `f` against a live element, failing like a driver would when the
    /// session is closed or the element is gone
    fn with_live<T>(
        &self,
        locator: &Locator,
        f: impl FnOnce(&mut ScriptedElement, Duration) -> Result<T>,
    ) -> Result<T> {
        let elapsed = self.elapsed();
        let mut page = self.page();
        if page.closed {
            return Err(Error::SessionClosed);
        }
        let permissive = page.permissive;
        let element = if permissive {
            page.elements.entry(locator.clone()).or_default()
        } else {
            page.elements
                .get_mut(locator)
                .ok_or_else(|| Error::StaleElement(locator.to_string()))?
        };
        if !element.present_at(elapsed) {
            return Err(Error::StaleElement(locator.to_string()));
        }
        f(element, elapsed)
    }
}

#[async_trait]
impl Browser for ScriptedBrowser {
    type Element = Locator;

    async fn find(&self, locator: &Locator) -> Result<Locator> {
        let elapsed = self.elapsed();
        let mut page = self.page();
        if page.closed {
            return Err(Error::SessionClosed);
        }
        let permissive = page.permissive;
        let element = if permissive {
            page.elements.entry(locator.clone()).or_default()
        } else {
            match page.elements.get_mut(locator) {
                Some(el) => el,
                None => return Err(Error::NoSuchElement(locator.to_string())),
            }
        };
        if let Some(failure) = element.find_failures.pop_front() {
            return Err(failure.into_error(locator));
        }
        if !element.present_at(elapsed) {
            return Err(Error::NoSuchElement(locator.to_string()));
        }
        Ok(locator.clone())
    }

    async fn is_displayed(&self, element: &Locator) -> Result<bool> {
        self.with_live(element, |el, elapsed| Ok(el.visible_at(elapsed)))
    }

    async fn is_enabled(&self, element: &Locator) -> Result<bool> {
        self.with_live(element, |el, _| Ok(el.enabled))
    }

    async fn click(&self, element: &Locator) -> Result<()> {
        self.record(format!("click {}", element));
        self.with_live(element, |el, elapsed| {
            if let Some(failure) = el.always_fail_click.clone() {
                return Err(failure.into_error(element));
            }
            if let Some(failure) = el.click_failures.pop_front() {
                return Err(failure.into_error(element));
            }
            if !el.visible_at(elapsed) || !el.enabled {
                return Err(Error::NotInteractable(element.to_string()));
            }
            el.clicks += 1;
            Ok(())
        })
    }

    async fn script_click(&self, element: &Locator) -> Result<()> {
        self.record(format!("script_click {}", element));
        self.with_live(element, |el, _| {
            if let Some(failure) = el.always_fail_script_click.clone() {
                return Err(failure.into_error(element));
            }
            if let Some(failure) = el.script_click_failures.pop_front() {
                return Err(failure.into_error(element));
            }
            el.script_clicks += 1;
            Ok(())
        })
    }

    async fn clear(&self, element: &Locator) -> Result<()> {
        self.with_live(element, |el, _| {
            el.value.clear();
            Ok(())
        })
    }

    async fn send_keys(&self, element: &Locator, text: &str) -> Result<()> {
        self.record(format!("send_keys {}", element));
        self.with_live(element, |el, elapsed| {
            if !el.visible_at(elapsed) || !el.enabled {
                return Err(Error::NotInteractable(element.to_string()));
            }
            el.value.push_str(text);
            Ok(())
        })
    }

    async fn text(&self, element: &Locator) -> Result<String> {
        self.with_live(element, |el, elapsed| {
            Ok(if el.visible_at(elapsed) {
                el.text.clone()
            } else {
                String::new()
            })
        })
    }

    async fn scroll_into_view(&self, element: &Locator) -> Result<()> {
        self.with_live(element, |el, _| {
            el.scrolled_into_view = true;
            Ok(())
        })
    }

    async fn execute(&self, script: &str) -> Result<Value> {
        let elapsed = self.elapsed();
        let page = self.page();
        if page.closed {
            return Err(Error::SessionClosed);
        }
        if script.contains("document.readyState") {
            let state = if elapsed >= page.ready_after { "complete" } else { "loading" };
            return Ok(Value::String(state.to_string()));
        }
        if script.contains("jQuery.active") {
            return match page.jquery_active {
                Some(n) => Ok(Value::from(n)),
                None => Err(Error::WebDriver(
                    "javascript error: jQuery is not defined".to_string(),
                )),
            };
        }
        Ok(Value::Null)
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.record(format!("goto {}", url));
        let mut page = self.page();
        if page.closed {
            return Err(Error::SessionClosed);
        }
        if let Some(message) = &page.goto_failure {
            return Err(Error::WebDriver(message.clone()));
        }
        page.url = Some(url.to_string());
        Ok(())
    }

    async fn maximize(&self) -> Result<()> {
        self.page().window = Some(WindowSize::Maximize);
        Ok(())
    }

    async fn set_window_size(&self, width: u32, height: u32) -> Result<()> {
        self.page().window = Some(WindowSize::Fixed { width, height });
        Ok(())
    }

    async fn set_page_load_timeout(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.record("screenshot");
        let page = self.page();
        if page.closed {
            return Err(Error::SessionClosed);
        }
        match &page.screenshot {
            ScreenshotBehavior::Png(bytes) => Ok(bytes.clone()),
            ScreenshotBehavior::Fail(message) => Err(Error::ArtifactCapture(message.clone())),
        }
    }

    async fn close(&self) -> Result<()> {
        self.record("close");
        self.page().closed = true;
        Ok(())
    }
}

type BrowserFactory = dyn Fn(u32) -> Result<ScriptedBrowser> + Send + Sync;

/// Launcher that hands out scripted browsers
///
/// The factory receives the 1-based launch number, so a test can give the
/// second attempt of a retried test a different page than the first.
#[derive(Clone)]
pub struct ScriptedLauncher {
    factory: Arc<BrowserFactory>,
    launched: Arc<Mutex<Vec<ScriptedBrowser>>>,
}

impl ScriptedLauncher {
    pub fn new(factory: impl Fn(u32) -> Result<ScriptedBrowser> + Send + Sync + 'static) -> Self {
        Self {
            factory: Arc::new(factory),
            launched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every launch yields a permissive page
    pub fn permissive() -> Self {
        Self::new(|_| Ok(ScriptedBrowser::permissive()))
    }

    /// Every launch fails as if the driver were missing
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(move |_| Err(Error::FatalSetup(message.clone())))
    }

    /// Browsers handed out so far
    pub fn launched(&self) -> Vec<ScriptedBrowser> {
        self.launched.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    type Browser = ScriptedBrowser;

    async fn launch(&self, settings: &BrowserSettings) -> Result<ScriptedBrowser> {
        let n = self.launched().len() as u32 + 1;
        tracing::debug!(browser = %settings.browser, launch = n, "Launching scripted browser");
        let browser = (self.factory)(n)?;
        browser.record("launch");
        if let Ok(mut launched) = self.launched.lock() {
            launched.push(browser.clone());
        }
        Ok(browser)
    }
}
