//! End-to-end tests for the harness
//!
//! Every test drives the real poller, interaction layer, lifecycle controller
//! and report against the scripted browser, with tokio's clock paused so
//! timing assertions are exact.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use uiharness::browser::scripted::{ScriptedBrowser, ScriptedElement, ScriptedFailure, ScriptedLauncher};
use uiharness::browser::Locator;
use uiharness::lifecycle::TestOutcome;
use uiharness::report::TestStatus;
use uiharness::scenario::{Scenario, ScenarioTest};
use uiharness::sync::{Poller, WaitSpec};
use uiharness::{
    Config, Error, InteractionExecutor, InteractionOutcome, LifecycleController, ReportAggregator,
    Result, SyncEngine, TestContext, UiTest,
};

fn config(dir: &Path, retries: u32) -> Arc<Config> {
    let text = format!(
        "base_url = \"https://shop.example\"\n\
         retry_max_attempts = {}\n\
         explicit_wait_seconds = 5\n\
         poll_interval_millis = 500\n\
         screenshots_dir = {:?}\n\
         report_path = {:?}\n\
         report_title = \"Nightly regression\"\n",
        retries,
        dir.join("shots").display().to_string(),
        dir.join("reports").join("report.html").display().to_string(),
    );
    Arc::new(Config::from_toml(&text).unwrap())
}

fn controller(config: &Arc<Config>, launcher: ScriptedLauncher) -> LifecycleController<ScriptedLauncher> {
    let report = Arc::new(ReportAggregator::from_config(config));
    LifecycleController::new(Arc::clone(config), launcher, report)
}

fn engine(browser: &ScriptedBrowser) -> SyncEngine<'_, ScriptedBrowser> {
    let spec = WaitSpec::new(Duration::from_secs(5), Duration::from_millis(500));
    SyncEngine::new(browser, Poller::new(spec))
}

/// Fails the first `failures` runs, then passes
struct Checkout {
    failures: u32,
    runs: AtomicU32,
}

impl Checkout {
    fn failing(failures: u32) -> Self {
        Self {
            failures,
            runs: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl UiTest<ScriptedBrowser> for Checkout {
    fn id(&self) -> &str {
        "checkout"
    }

    fn description(&self) -> &str {
        "Guest checkout completes"
    }

    async fn run(&self, ctx: &TestContext<'_, ScriptedBrowser>) -> Result<()> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst);
        ctx.engine().click(&Locator::css("#place-order")).await?;
        if run < self.failures {
            return Err(Error::TestAssertion("order confirmation missing".into()));
        }
        ctx.log().pass("order placed")?;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn element_visible_at_two_seconds_is_seen_before_next_poll() {
    let target = Locator::css("#promo");
    let browser = ScriptedBrowser::new().with_element(
        target.clone(),
        ScriptedElement::new().visible_after(Duration::from_secs(2)),
    );
    let engine = engine(&browser);

    let start = Instant::now();
    engine.wait_visible(&target).await.unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_secs(2), "returned early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2500), "returned late: {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn stale_element_is_resolved_again_and_clicked() {
    let target = Locator::css("#add-to-cart");
    let browser = ScriptedBrowser::new().with_element(
        target.clone(),
        ScriptedElement::new().fail_find(ScriptedFailure::Stale, 2),
    );
    let engine = engine(&browser);

    let start = Instant::now();
    let outcome = engine.click(&target).await.unwrap();

    assert_eq!(outcome, InteractionOutcome::Success);
    assert!(start.elapsed() <= Duration::from_secs(5));
    let element = browser.element(&target).unwrap();
    assert_eq!(element.clicks, 1);
    assert_eq!(element.script_clicks, 0);
}

#[tokio::test(start_paused = true)]
async fn click_that_goes_stale_is_retried_before_fallback() {
    let target = Locator::css("#add-to-cart");
    let browser = ScriptedBrowser::new().with_element(
        target.clone(),
        ScriptedElement::new().fail_click(ScriptedFailure::Stale, 2),
    );
    let engine = engine(&browser);

    let start = Instant::now();
    let outcome = engine.click(&target).await.unwrap();

    assert_eq!(outcome, InteractionOutcome::Success);
    assert!(start.elapsed() <= Duration::from_secs(5));
    let element = browser.element(&target).unwrap();
    assert_eq!(element.clicks, 1);
    assert_eq!(element.script_clicks, 0);
}

#[tokio::test(start_paused = true)]
async fn never_visible_element_times_out_with_last_error() {
    let target = Locator::css("#spinner-done");
    let browser = ScriptedBrowser::new().with_element(
        target.clone(),
        ScriptedElement::new().present_after(Duration::from_secs(60)),
    );
    let engine = engine(&browser);

    let start = Instant::now();
    let err = engine.wait_visible(&target).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed <= Duration::from_millis(5500));
    match err {
        Error::Timeout { last_error, .. } => {
            assert!(last_error.unwrap().contains("#spinner-done"));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn failing_first_attempt_passes_on_fresh_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 1);
    let launcher = ScriptedLauncher::permissive();
    let controller = controller(&config, launcher.clone());

    let result = controller.run_test(&Checkout::failing(1)).await.unwrap();

    assert!(result.passed());
    assert_eq!(result.attempts.len(), 2);

    let launched = launcher.launched();
    assert_eq!(launched.len(), 2);
    assert!(launched.iter().all(|b| b.is_closed()));

    let entries = controller.report().entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].attempt, 1);
    assert_eq!(entries[0].status, Some(TestStatus::Failed));
    assert_eq!(entries[1].attempt, 2);
    assert_eq!(entries[1].status, Some(TestStatus::Passed));
    assert!(entries[1].failure.is_none());
    assert!(entries[1].attachments.is_empty());
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_leave_one_artifact_on_last_entry() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 2);
    let controller = controller(&config, ScriptedLauncher::permissive());

    let result = controller.run_test(&Checkout::failing(u32::MAX)).await.unwrap();

    assert_eq!(result.outcome.status(), TestStatus::Failed);
    assert_eq!(result.attempts.len(), 3);
    let entries = controller.report().entries();
    let with_artifact: Vec<_> = entries.iter().filter(|e| e.failure.is_some()).collect();
    assert_eq!(with_artifact.len(), 1);
    assert_eq!(with_artifact[0].attempt, 3);

    let artifact = with_artifact[0].failure.as_ref().unwrap();
    assert!(artifact.message.contains("order confirmation missing"));
    let shot = artifact.screenshot.as_ref().unwrap();
    assert!(shot.starts_with(dir.path().join("shots")));
    assert!(shot.exists());
}

#[tokio::test(start_paused = true)]
async fn missing_driver_fails_without_retry_or_screenshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 2);
    let controller = controller(&config, ScriptedLauncher::failing("geckodriver not reachable"));

    let result = controller.run_test(&Checkout::failing(0)).await.unwrap();

    assert_eq!(result.attempts.len(), 1);
    assert!(matches!(result.outcome, TestOutcome::Failed(ref m) if m.contains("geckodriver")));
    let entry = &controller.report().entries()[0];
    assert!(entry.failure.as_ref().unwrap().screenshot.is_none());
    assert!(!dir.path().join("shots").exists());
}

#[tokio::test(start_paused = true)]
async fn report_flushes_once_with_html_and_json() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 1);
    let controller = controller(&config, ScriptedLauncher::permissive());
    controller
        .run_suite("smoke", &[Checkout::failing(1)])
        .await
        .unwrap();

    let report = controller.report();
    let path = report.flush().unwrap();
    assert!(matches!(report.flush(), Err(Error::ReportAlreadyFlushed)));
    assert!(matches!(
        report.create_entry("late", ""),
        Err(Error::ReportFlushed)
    ));

    let html = std::fs::read_to_string(&path).unwrap();
    assert!(html.contains("Nightly regression"));
    assert!(html.contains("checkout"));
    assert!(html.contains("order placed"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report.json_path()).unwrap()).unwrap();
    assert_eq!(json["summary"]["total"], 2);
    assert_eq!(json["summary"]["passed"], 1);
    assert_eq!(json["summary"]["failed"], 1);
    assert_eq!(json["entries"].as_array().unwrap().len(), 2);
    assert_eq!(json["entries"][1]["status"], "passed");
}

const CART_SCENARIO: &str = r##"
name: Cart badge
description: Adding a product updates the cart badge
steps:
  - action: goto
    path: /products/42
  - action: click
    target: { css: "#add-to-cart" }
  - action: wait_ajax
  - action: expect_text
    target: { css: ".cart-count" }
    equals: "1"
  - action: expect_visible
    target: { css: ".error" }
    visible: false
"##;

fn shop_page() -> ScriptedBrowser {
    ScriptedBrowser::new()
        .with_jquery_active(Some(0))
        .with_element(
            Locator::css("#add-to-cart"),
            ScriptedElement::new().fail_click(ScriptedFailure::Intercepted, 1),
        )
        .with_element(
            Locator::css(".cart-count"),
            ScriptedElement::new()
                .with_text(" 1 ")
                .visible_after(Duration::from_secs(1)),
        )
        .with_element(Locator::css(".error"), ScriptedElement::new().hidden())
}

#[tokio::test(start_paused = true)]
async fn yaml_scenario_runs_through_controller() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 0);
    let launcher = ScriptedLauncher::new(|_| Ok(shop_page()));
    let controller = controller(&config, launcher.clone());
    let test = ScenarioTest::new(Scenario::parse(CART_SCENARIO).unwrap());

    let summary = controller.run_suite("cart", &[test]).await.unwrap();

    assert!(summary.all_passed());
    assert_eq!(summary.results[0].attempts[0].fallbacks, 1);
    let browser = &launcher.launched()[0];
    assert_eq!(
        browser.current_url().as_deref(),
        Some("https://shop.example/products/42")
    );
    let button = browser.element(&Locator::css("#add-to-cart")).unwrap();
    assert_eq!(button.script_clicks, 1);

    let entry = &controller.report().entries()[0];
    assert_eq!(entry.test_id, "Cart badge");
    assert!(entry.logs.iter().any(|l| l.message.contains("Step 4/5")));
}

#[tokio::test(start_paused = true)]
async fn yaml_assertion_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 0);
    let launcher = ScriptedLauncher::new(|_| {
        let page = shop_page();
        page.set_element(Locator::css(".cart-count"), ScriptedElement::new().with_text("0"));
        Ok(page)
    });
    let controller = controller(&config, launcher);
    let test = ScenarioTest::new(Scenario::parse(CART_SCENARIO).unwrap());

    let result = controller.run_test(&test).await.unwrap();

    assert!(matches!(result.outcome, TestOutcome::Failed(ref m) if m.contains("got '0'")));
    let entry = &controller.report().entries()[0];
    assert!(entry.failure.is_some());
}

#[tokio::test(start_paused = true)]
async fn dry_run_skips_assertions() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 0);
    let controller = controller(&config, ScriptedLauncher::permissive());
    let test = ScenarioTest::new(Scenario::parse(CART_SCENARIO).unwrap()).dry_run(true);

    let result = controller.run_test(&test).await.unwrap();

    assert!(result.passed());
    let entry = &controller.report().entries()[0];
    assert!(entry
        .logs
        .iter()
        .any(|l| l.message.starts_with("Dry run, not checked")));
}

#[tokio::test(start_paused = true)]
async fn declared_skip_is_reported_with_driver_down() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 2);
    let controller = controller(&config, ScriptedLauncher::failing("chromedriver not running"));
    let yaml = format!("{}skip: cart service migration\n", CART_SCENARIO);
    let test = ScenarioTest::new(Scenario::parse(&yaml).unwrap());

    let result = controller.run_test(&test).await.unwrap();

    assert!(matches!(result.outcome, TestOutcome::Skipped(ref r) if r == "cart service migration"));
    assert_eq!(result.attempts.len(), 1);
    let entry = &controller.report().entries()[0];
    assert_eq!(entry.status, Some(TestStatus::Skipped));
    assert!(entry.failure.is_none());
}
