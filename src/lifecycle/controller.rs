//! Execution lifecycle controller
//!
//! Owns one test from session acquisition to teardown:
//!
//! ```text
//! Idle -> SessionAcquired -> Ready -> Running -> Passed | Failed | Skipped -> TornDown
//! ```
//!
//! A launch failure is fatal for the test: no retry, and the failure
//! artifact has no screenshot. Any later failure (navigation, test body,
//! panic) is an ordinary failure; the retry decision and the artifact
//! pipeline run while the session is still open, then the session is closed
//! on every path. Each retry gets a fresh session and a fresh report entry.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::browser::{fatal_setup, Browser, Launcher, Session};
use crate::common::config::WindowSize;
use crate::common::{Config, Error, Result};
use crate::report::{ArtifactPipeline, EntryId, ReportAggregator, TestLog, TestStatus};
use crate::sync::{Poller, SyncEngine, WaitSpec};

use super::hooks::{AttemptInfo, LifecycleHooks, LoggingHooks};
use super::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    SessionAcquired,
    Ready,
    Running,
    Passed,
    Failed,
    Skipped,
    TornDown,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::SessionAcquired => "session acquired",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::TornDown => "torn down",
        };
        write!(f, "{}", name)
    }
}

/// A UI test runnable by the controller
///
/// Returning `Err(Error::Skipped(reason))` marks the test skipped; any other
/// error, or a panic, fails it.
#[async_trait]
pub trait UiTest<B: Browser>: Send + Sync {
    /// Stable identity; retry counters are keyed by it
    fn id(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// A declared skip; checked before any browser is launched
    fn skip_reason(&self) -> Option<&str> {
        None
    }

    async fn run(&self, ctx: &TestContext<'_, B>) -> Result<()>;
}

/// Everything test logic gets to work with
pub struct TestContext<'a, B: Browser> {
    session: &'a Session<B>,
    engine: SyncEngine<'a, B>,
    log: TestLog,
    config: &'a Config,
    attempt: u32,
}

impl<'a, B: Browser> TestContext<'a, B> {
    pub fn session(&self) -> &'a Session<B> {
        self.session
    }

    pub fn browser(&self) -> &'a B {
        self.session.browser()
    }

    pub fn engine(&self) -> &SyncEngine<'a, B> {
        &self.engine
    }

    pub fn log(&self) -> &TestLog {
        &self.log
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    /// 1-based attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Resolve `path` against the base URL; absolute URLs pass through
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed(String),
    Skipped(String),
}

impl TestOutcome {
    pub fn status(&self) -> TestStatus {
        match self {
            Self::Passed => TestStatus::Passed,
            Self::Failed(_) => TestStatus::Failed,
            Self::Skipped(_) => TestStatus::Skipped,
        }
    }
}

/// What happened in one attempt
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub entry: EntryId,
    pub outcome: TestOutcome,
    /// Every state the attempt went through, starting at `Idle`
    pub states: Vec<LifecycleState>,
    /// Interactions rescued by their fallback
    pub fallbacks: u32,
}

/// Final result of a test over all its attempts
#[derive(Debug, Clone)]
pub struct TestResult {
    pub test_id: String,
    pub outcome: TestOutcome,
    pub attempts: Vec<AttemptRecord>,
    pub duration: Duration,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.outcome == TestOutcome::Passed
    }
}

/// Results of a suite run
#[derive(Debug, Clone)]
pub struct SuiteSummary {
    pub name: String,
    pub results: Vec<TestResult>,
    pub duration: Duration,
}

impl SuiteSummary {
    fn count(&self, status: TestStatus) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome.status() == status)
            .count()
    }

    pub fn passed(&self) -> usize {
        self.count(TestStatus::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(TestStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(TestStatus::Skipped)
    }

    /// Tests that needed more than one attempt
    pub fn retried(&self) -> usize {
        self.results.iter().filter(|r| r.attempts.len() > 1).count()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }
}

/// Records state transitions of one attempt
struct Transitions<'t> {
    test_id: &'t str,
    states: Vec<LifecycleState>,
}

impl<'t> Transitions<'t> {
    fn new(test_id: &'t str) -> Self {
        Self {
            test_id,
            states: vec![LifecycleState::Idle],
        }
    }

    fn to(&mut self, next: LifecycleState) {
        let current = self.states.last().copied().unwrap_or(LifecycleState::Idle);
        tracing::debug!(test = self.test_id, "{} -> {}", current, next);
        self.states.push(next);
    }
}

/// Report writes that fail during an attempt must not stop teardown
fn keep_going(result: Result<()>) {
    if let Err(e) = result {
        tracing::warn!("Report update failed: {}", e);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

pub struct LifecycleController<L: Launcher> {
    config: Arc<Config>,
    launcher: L,
    report: Arc<ReportAggregator>,
    artifacts: ArtifactPipeline,
    retry: RetryPolicy,
    hooks: Arc<dyn LifecycleHooks>,
    cancel: CancellationToken,
}

impl<L: Launcher> LifecycleController<L> {
    pub fn new(config: Arc<Config>, launcher: L, report: Arc<ReportAggregator>) -> Self {
        Self {
            artifacts: ArtifactPipeline::new(config.artifacts.clone(), Arc::clone(&report)),
            retry: RetryPolicy::from_config(&config),
            hooks: Arc::new(LoggingHooks),
            cancel: CancellationToken::new(),
            config,
            launcher,
            report,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Cancelling `token` aborts in-flight waits, suppresses further retries
    /// and stops a suite before its next test
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn report(&self) -> &Arc<ReportAggregator> {
        &self.report
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Run `tests` in order under one set of suite hooks
    pub async fn run_suite<T>(&self, name: &str, tests: &[T]) -> Result<SuiteSummary>
    where
        T: UiTest<L::Browser>,
    {
        let started = Instant::now();
        self.hooks.on_suite_start(name, tests.len());

        let mut results = Vec::with_capacity(tests.len());
        for (i, test) in tests.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(suite = name, "Suite cancelled, {} tests not run", tests.len() - i);
                break;
            }
            results.push(self.run_test(test).await?);
        }

        let summary = SuiteSummary {
            name: name.to_string(),
            results,
            duration: started.elapsed(),
        };
        self.hooks.on_suite_finish(&summary);
        Ok(summary)
    }

    /// Run one test, retrying failed attempts as the retry policy allows.
    ///
    /// Errors only when the report can no longer take entries.
    pub async fn run_test<T>(&self, test: &T) -> Result<TestResult>
    where
        T: UiTest<L::Browser> + ?Sized,
    {
        let started = Instant::now();
        let mut attempts = Vec::new();
        loop {
            let attempt = attempts.len() as u32 + 1;
            let (record, will_retry) = self.run_attempt(test, attempt).await?;
            let outcome = record.outcome.clone();
            attempts.push(record);
            if !will_retry {
                return Ok(TestResult {
                    test_id: test.id().to_string(),
                    outcome,
                    attempts,
                    duration: started.elapsed(),
                });
            }
        }
    }

    async fn run_attempt<T>(&self, test: &T, attempt: u32) -> Result<(AttemptRecord, bool)>
    where
        T: UiTest<L::Browser> + ?Sized,
    {
        let test_id = test.id();
        let entry = self.report.create_entry(test_id, test.description())?;
        let log = self.report.test_log(entry, test_id);
        let info = AttemptInfo {
            test_id: test_id.to_string(),
            description: test.description().to_string(),
            attempt,
            entry,
        };
        let mut states = Transitions::new(test_id);
        let started = Instant::now();

        self.hooks.on_start(&info);
        keep_going(log.info(format!("Attempt {} started", attempt)));

        if let Some(reason) = test.skip_reason() {
            states.to(LifecycleState::Skipped);
            keep_going(log.skip(format!("Test skipped: {}", reason)));
            self.hooks.on_skip(&info, reason);
            states.to(LifecycleState::TornDown);
            keep_going(self.report.finish(entry));
            let record = AttemptRecord {
                attempt,
                entry,
                outcome: TestOutcome::Skipped(reason.to_string()),
                states: states.states,
                fallbacks: 0,
            };
            return Ok((record, false));
        }

        let browser = match self.launcher.launch(&self.config.browser).await {
            Ok(browser) => browser,
            Err(e) => {
                let error = fatal_setup(e);
                states.to(LifecycleState::Failed);
                self.artifacts
                    .record_failure(None::<&L::Browser>, entry, test_id, &error)
                    .await;
                self.hooks.on_failure(&info, &error, false);
                states.to(LifecycleState::TornDown);
                keep_going(self.report.finish(entry));
                let record = AttemptRecord {
                    attempt,
                    entry,
                    outcome: TestOutcome::Failed(error.to_string()),
                    states: states.states,
                    fallbacks: 0,
                };
                return Ok((record, false));
            }
        };

        let session = Session::new(format!("{}#{}", test_id, attempt), browser);
        states.to(LifecycleState::SessionAcquired);

        let poller = Poller::with_cancellation(WaitSpec::from_config(&self.config), self.cancel.clone());
        let ctx = TestContext {
            session: &session,
            engine: SyncEngine::new(session.browser(), poller).with_log(log.clone()),
            log: log.clone(),
            config: &self.config,
            attempt,
        };

        let result = match self.prepare(&ctx).await {
            Ok(()) => {
                states.to(LifecycleState::Ready);
                states.to(LifecycleState::Running);
                Self::run_body(test, &ctx).await
            }
            Err(e) => {
                tracing::error!(test = test_id, "Setup failed: {}", e);
                Err(e)
            }
        };
        let fallbacks = ctx.engine.fallback_count();
        // A FAIL line in the log overrides an Ok body
        let result = result.and_then(|()| match self.report.entry(entry).and_then(|e| e.status) {
            Some(TestStatus::Failed) => Err(Error::TestAssertion("test logged a failure".to_string())),
            _ => Ok(()),
        });

        let (outcome, will_retry) = match result {
            Ok(()) => {
                states.to(LifecycleState::Passed);
                keep_going(log.pass("Test passed"));
                self.hooks.on_success(&info, started.elapsed());
                (TestOutcome::Passed, false)
            }
            Err(Error::Skipped(reason)) => {
                states.to(LifecycleState::Skipped);
                keep_going(log.skip(format!("Test skipped: {}", reason)));
                self.hooks.on_skip(&info, &reason);
                (TestOutcome::Skipped(reason), false)
            }
            Err(error) => {
                states.to(LifecycleState::Failed);
                let will_retry =
                    !self.cancel.is_cancelled() && self.retry.should_retry(test_id, TestStatus::Failed);
                if !will_retry || self.config.artifacts.capture_intermediate {
                    self.artifacts
                        .record_failure(Some(session.browser()), entry, test_id, &error)
                        .await;
                } else {
                    keep_going(log.fail(format!("Attempt {} failed, will retry: {}", attempt, error)));
                }
                self.hooks.on_failure(&info, &error, will_retry);
                (TestOutcome::Failed(error.to_string()), will_retry)
            }
        };

        drop(ctx);
        if let Err(e) = session.close().await {
            keep_going(log.warning(format!("Browser did not close cleanly: {}", e)));
        }
        states.to(LifecycleState::TornDown);
        keep_going(self.report.finish(entry));

        let record = AttemptRecord {
            attempt,
            entry,
            outcome,
            states: states.states,
            fallbacks,
        };
        Ok((record, will_retry))
    }

    /// Window, timeouts, base URL, page load
    async fn prepare(&self, ctx: &TestContext<'_, L::Browser>) -> Result<()> {
        let browser = ctx.browser();
        let settings = &self.config.browser;
        match settings.window {
            WindowSize::Maximize => browser.maximize().await?,
            WindowSize::Fixed { width, height } => browser.set_window_size(width, height).await?,
        }
        browser.set_page_load_timeout(settings.page_load_timeout).await?;
        browser.goto(&self.config.base_url).await?;
        ctx.engine().wait_page_load().await?;
        keep_going(ctx.log().info(format!("Navigated to {}", self.config.base_url)));
        Ok(())
    }

    async fn run_body<T>(test: &T, ctx: &TestContext<'_, L::Browser>) -> Result<()>
    where
        T: UiTest<L::Browser> + ?Sized,
    {
        match AssertUnwindSafe(test.run(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(Error::TestAssertion(format!(
                "test panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::scripted::{ScriptedBrowser, ScriptedElement, ScriptedLauncher};
    use crate::browser::Locator;
    use crate::sync::{InteractionExecutor, InteractionOutcome};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn config(dir: &std::path::Path, retries: u32) -> Arc<Config> {
        let text = format!(
            "base_url = \"https://shop.example\"\n\
             retry_max_attempts = {}\n\
             explicit_wait_seconds = 5\n\
             screenshots_dir = {:?}\n\
             report_path = {:?}\n",
            retries,
            dir.join("shots").display().to_string(),
            dir.join("report.html").display().to_string(),
        );
        Arc::new(Config::from_toml(&text).unwrap())
    }

    fn controller(
        config: Arc<Config>,
        launcher: ScriptedLauncher,
    ) -> LifecycleController<ScriptedLauncher> {
        let report = Arc::new(ReportAggregator::from_config(&config));
        LifecycleController::new(config, launcher, report)
    }

    struct ClickBuy;

    #[async_trait]
    impl UiTest<ScriptedBrowser> for ClickBuy {
        fn id(&self) -> &str {
            "click buy"
        }

        async fn run(&self, ctx: &TestContext<'_, ScriptedBrowser>) -> Result<()> {
            let outcome = ctx.engine().click(&Locator::css("#buy")).await?;
            ctx.log().info(format!("clicked: {:?}", outcome))?;
            Ok(())
        }
    }

    /// Fails its first `failures` runs
    struct Flaky {
        failures: u32,
        runs: AtomicU32,
    }

    #[async_trait]
    impl UiTest<ScriptedBrowser> for Flaky {
        fn id(&self) -> &str {
            "flaky"
        }

        async fn run(&self, _ctx: &TestContext<'_, ScriptedBrowser>) -> Result<()> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if run < self.failures {
                Err(Error::TestAssertion(format!("run {} failed", run + 1)))
            } else {
                Ok(())
            }
        }
    }

    struct Panics;

    #[async_trait]
    impl UiTest<ScriptedBrowser> for Panics {
        fn id(&self) -> &str {
            "panics"
        }

        async fn run(&self, _ctx: &TestContext<'_, ScriptedBrowser>) -> Result<()> {
            panic!("cart total mismatch");
        }
    }

    struct Skips;

    #[async_trait]
    impl UiTest<ScriptedBrowser> for Skips {
        fn id(&self) -> &str {
            "skips"
        }

        async fn run(&self, _ctx: &TestContext<'_, ScriptedBrowser>) -> Result<()> {
            Err(Error::Skipped("payment sandbox down".into()))
        }
    }

    struct DeclaredSkip;

    #[async_trait]
    impl UiTest<ScriptedBrowser> for DeclaredSkip {
        fn id(&self) -> &str {
            "declared skip"
        }

        fn skip_reason(&self) -> Option<&str> {
            Some("checkout redesign in progress")
        }

        async fn run(&self, _ctx: &TestContext<'_, ScriptedBrowser>) -> Result<()> {
            panic!("skipped tests never run");
        }
    }

    /// Logs a failure but returns Ok
    struct SoftFailure;

    #[async_trait]
    impl UiTest<ScriptedBrowser> for SoftFailure {
        fn id(&self) -> &str {
            "soft failure"
        }

        async fn run(&self, ctx: &TestContext<'_, ScriptedBrowser>) -> Result<()> {
            ctx.log().fail("price badge missing")?;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingHooks {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingHooks {
        fn push(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl LifecycleHooks for RecordingHooks {
        fn on_suite_start(&self, suite: &str, tests: usize) {
            self.push(format!("suite_start {} {}", suite, tests));
        }
        fn on_start(&self, a: &AttemptInfo) {
            self.push(format!("start {} {}", a.test_id, a.attempt));
        }
        fn on_success(&self, a: &AttemptInfo, _elapsed: Duration) {
            self.push(format!("success {}", a.test_id));
        }
        fn on_failure(&self, a: &AttemptInfo, _error: &Error, will_retry: bool) {
            self.push(format!("failure {} retry={}", a.test_id, will_retry));
        }
        fn on_skip(&self, a: &AttemptInfo, _reason: &str) {
            self.push(format!("skip {}", a.test_id));
        }
        fn on_suite_finish(&self, summary: &SuiteSummary) {
            self.push(format!("suite_finish {}/{}", summary.passed(), summary.results.len()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn passing_test_walks_every_state() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ScriptedLauncher::permissive();
        let controller = controller(config(dir.path(), 2), launcher.clone());

        let result = controller.run_test(&ClickBuy).await.unwrap();

        assert!(result.passed());
        assert_eq!(
            result.attempts[0].states,
            vec![
                LifecycleState::Idle,
                LifecycleState::SessionAcquired,
                LifecycleState::Ready,
                LifecycleState::Running,
                LifecycleState::Passed,
                LifecycleState::TornDown,
            ]
        );
        let browser = &launcher.launched()[0];
        assert!(browser.is_closed());
        assert_eq!(browser.current_url().as_deref(), Some("https://shop.example"));
        assert_eq!(browser.window(), Some(WindowSize::Maximize));
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_test_retries_then_records_one_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ScriptedLauncher::permissive();
        let controller = controller(config(dir.path(), 2), launcher.clone());
        let test = Flaky {
            failures: u32::MAX,
            runs: AtomicU32::new(0),
        };

        let result = controller.run_test(&test).await.unwrap();

        assert!(matches!(result.outcome, TestOutcome::Failed(ref m) if m.contains("run 3 failed")));
        assert_eq!(result.attempts.len(), 3);
        assert_eq!(controller.retry_policy().attempts("flaky"), 2);

        let entries = controller.report().entries();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.status == Some(TestStatus::Failed)));
        assert_eq!(entries.iter().filter(|e| e.failure.is_some()).count(), 1);
        assert!(entries[2].failure.as_ref().unwrap().screenshot.is_some());

        let launched = launcher.launched();
        assert_eq!(launched.len(), 3);
        assert!(launched.iter().all(|b| b.is_closed()));
    }

    #[tokio::test(start_paused = true)]
    async fn flaky_test_passes_on_retry() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(config(dir.path(), 2), ScriptedLauncher::permissive());
        let test = Flaky {
            failures: 1,
            runs: AtomicU32::new(0),
        };
        let result = controller.run_test(&test).await.unwrap();
        assert!(result.passed());
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.attempts[0].outcome.status(), TestStatus::Failed);
        let entries = controller.report().entries();
        assert!(entries[0].failure.is_none());
        assert_eq!(entries[1].status, Some(TestStatus::Passed));
    }

    #[tokio::test(start_paused = true)]
    async fn launch_failure_is_fatal_and_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(
            config(dir.path(), 2),
            ScriptedLauncher::failing("chromedriver not running"),
        );
        let result = controller.run_test(&ClickBuy).await.unwrap();

        assert_eq!(result.attempts.len(), 1);
        assert!(matches!(result.outcome, TestOutcome::Failed(ref m) if m.contains("chromedriver")));
        assert_eq!(controller.retry_policy().attempts("click buy"), 0);
        let entry = &controller.report().entries()[0];
        assert_eq!(entry.status, Some(TestStatus::Failed));
        assert!(entry.failure.as_ref().unwrap().screenshot.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn declared_skip_never_launches_a_browser() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(
            config(dir.path(), 2),
            ScriptedLauncher::failing("chromedriver not running"),
        );
        let result = controller.run_test(&DeclaredSkip).await.unwrap();

        assert!(matches!(result.outcome, TestOutcome::Skipped(ref r) if r.contains("redesign")));
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(
            result.attempts[0].states,
            vec![LifecycleState::Idle, LifecycleState::Skipped, LifecycleState::TornDown]
        );
        assert_eq!(controller.retry_policy().attempts("declared skip"), 0);
        let entry = &controller.report().entries()[0];
        assert_eq!(entry.status, Some(TestStatus::Skipped));
        assert!(entry.failure.is_none());

        let launcher = ScriptedLauncher::permissive();
        let skipping = LifecycleController::new(
            config(dir.path(), 0),
            launcher.clone(),
            controller.report().clone(),
        );
        assert!(!skipping.run_test(&DeclaredSkip).await.unwrap().passed());
        assert!(launcher.launched().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn logged_failure_fails_the_test() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(config(dir.path(), 1), ScriptedLauncher::permissive());
        let result = controller.run_test(&SoftFailure).await.unwrap();

        assert!(matches!(result.outcome, TestOutcome::Failed(ref m) if m.contains("logged a failure")));
        assert_eq!(result.attempts.len(), 2);
        let entries = controller.report().entries();
        assert!(entries.iter().all(|e| e.status == Some(TestStatus::Failed)));
        assert_eq!(entries.iter().filter(|e| e.failure.is_some()).count(), 1);
        assert_eq!(controller.report().summary().passed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn setup_failure_still_closes_session() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ScriptedLauncher::new(|_| {
            Ok(ScriptedBrowser::permissive().fail_navigation("net::ERR_NAME_NOT_RESOLVED"))
        });
        let controller = controller(config(dir.path(), 1), launcher.clone());
        let result = controller.run_test(&ClickBuy).await.unwrap();

        assert_eq!(result.attempts.len(), 2);
        assert!(!result.attempts[0].states.contains(&LifecycleState::Running));
        assert_eq!(result.attempts[0].states.last(), Some(&LifecycleState::TornDown));
        assert!(launcher.launched().iter().all(|b| b.is_closed()));
    }

    #[tokio::test(start_paused = true)]
    async fn panic_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(config(dir.path(), 0), ScriptedLauncher::permissive());
        let result = controller.run_test(&Panics).await.unwrap();
        assert!(matches!(result.outcome, TestOutcome::Failed(ref m) if m.contains("cart total mismatch")));
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_clicks_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ScriptedLauncher::new(|_| {
            Ok(ScriptedBrowser::new().with_element(
                Locator::css("#buy"),
                ScriptedElement::new()
                    .fail_click(crate::browser::scripted::ScriptedFailure::Intercepted, 1),
            ))
        });
        let controller = controller(config(dir.path(), 0), launcher);
        let result = controller.run_test(&ClickBuy).await.unwrap();
        assert!(result.passed());
        assert_eq!(result.attempts[0].fallbacks, 1);
        let entry = &controller.report().entries()[0];
        assert!(entry
            .logs
            .iter()
            .any(|l| l.message.contains(&format!("{:?}", InteractionOutcome::FallbackUsed))));
    }

    #[tokio::test(start_paused = true)]
    async fn hooks_fire_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let hooks = Arc::new(RecordingHooks::default());
        let controller = controller(config(dir.path(), 1), ScriptedLauncher::permissive())
            .with_hooks(hooks.clone());

        let summary = controller
            .run_suite(
                "smoke",
                &[Flaky {
                    failures: 1,
                    runs: AtomicU32::new(0),
                }],
            )
            .await
            .unwrap();
        controller.run_test(&Skips).await.unwrap();

        assert_eq!(summary.passed(), 1);
        assert_eq!(summary.retried(), 1);
        assert_eq!(
            *hooks.calls.lock().unwrap(),
            vec![
                "suite_start smoke 1",
                "start flaky 1",
                "failure flaky retry=true",
                "start flaky 2",
                "success flaky",
                "suite_finish 1/1",
                "start skips 1",
                "skip skips",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_suite_stops_early() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let controller = controller(config(dir.path(), 2), ScriptedLauncher::permissive())
            .with_cancellation(cancel);
        let summary = controller.run_suite("smoke", &[ClickBuy, ClickBuy]).await.unwrap();
        assert!(summary.results.is_empty());
    }

    #[test]
    fn context_url_joins_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), 0);
        let session = Session::new("s", ScriptedBrowser::new());
        let report = Arc::new(ReportAggregator::from_config(&config));
        let entry = report.create_entry("t", "").unwrap();
        let ctx = TestContext {
            session: &session,
            engine: SyncEngine::new(session.browser(), Poller::new(WaitSpec::from_config(&config))),
            log: report.test_log(entry, "t"),
            config: &config,
            attempt: 1,
        };
        assert_eq!(ctx.url("/cart"), "https://shop.example/cart");
        assert_eq!(ctx.url("https://other.example/"), "https://other.example/");
    }
}
