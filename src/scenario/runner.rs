//! Scenario execution
//!
//! [`ScenarioTest`] adapts a parsed [`Scenario`] to the [`UiTest`] trait so
//! scenarios go through the same lifecycle, retry and artifact handling as
//! tests written in Rust. [`ConsoleHooks`] prints progress to the terminal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use colored::Colorize;

use crate::browser::Browser;
use crate::common::{Error, Result};
use crate::lifecycle::{
    AttemptInfo, LifecycleHooks, LoggingHooks, SuiteSummary, TestContext, TestOutcome, UiTest,
};
use crate::report::artifact::save_screenshot;
use crate::sync::InteractionExecutor;

use super::config::{Scenario, Step};

/// A scenario file ready to run
#[derive(Debug, Clone)]
pub struct ScenarioTest {
    scenario: Scenario,
    path: Option<PathBuf>,
    verbose: bool,
    dry_run: bool,
}

impl ScenarioTest {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            path: None,
            verbose: false,
            dry_run: false,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            scenario: Scenario::load(path)?,
            path: Some(path.to_path_buf()),
            verbose: false,
            dry_run: false,
        })
    }

    /// Print every step as it completes
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Run every step but don't evaluate `expect_*` assertions; used
    /// against the scripted browser, whose pages have no real content
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Load every scenario, failing on the first that doesn't parse
pub fn load_all(paths: &[PathBuf], verbose: bool) -> Result<Vec<ScenarioTest>> {
    paths
        .iter()
        .map(|p| ScenarioTest::load(p).map(|t| t.verbose(verbose)))
        .collect()
}

#[async_trait]
impl<B: Browser> UiTest<B> for ScenarioTest {
    fn id(&self) -> &str {
        &self.scenario.name
    }

    fn description(&self) -> &str {
        self.scenario.description.as_deref().unwrap_or("")
    }

    fn skip_reason(&self) -> Option<&str> {
        self.scenario.skip.as_deref()
    }

    async fn run(&self, ctx: &TestContext<'_, B>) -> Result<()> {
        let total = self.scenario.steps.len();
        for (i, step) in self.scenario.steps.iter().enumerate() {
            let step_num = i + 1;
            let description = step.describe();
            ctx.log().info(format!("Step {}/{}: {}", step_num, total, description))?;

            if self.dry_run && step.is_assertion() {
                ctx.log().info(format!("Dry run, not checked: {}", description))?;
                continue;
            }
            if let Err(e) = execute_step(ctx, &self.scenario.name, step).await {
                if self.verbose && !matches!(e, Error::Skipped(_)) {
                    println!("    {} Step {}: {}", "✗".red(), step_num, e);
                }
                return Err(e);
            }
            if self.verbose {
                println!("    {} Step {}: {}", "✓".green(), step_num, description.dimmed());
            }
        }
        Ok(())
    }
}

/// Execute a single step
async fn execute_step<B: Browser>(ctx: &TestContext<'_, B>, name: &str, step: &Step) -> Result<()> {
    let engine = ctx.engine();
    match step {
        Step::Goto { path } => {
            let url = ctx.url(path);
            ctx.browser().goto(&url).await?;
            engine.wait_page_load().await
        }
        Step::Click { target } => {
            engine.click(target).await?;
            Ok(())
        }
        Step::Type { target, text } => engine.type_text(target, text).await,
        Step::WaitVisible {
            target,
            timeout_seconds,
        } => {
            match timeout_seconds {
                Some(secs) => engine.with_timeout(Duration::from_secs(*secs)).wait_visible(target).await?,
                None => engine.wait_visible(target).await?,
            };
            Ok(())
        }
        Step::WaitPageLoad => engine.wait_page_load().await,
        Step::WaitAjax => engine.wait_ajax_idle().await,
        Step::Scroll { target } => engine.scroll_into_view(target).await,
        Step::ExpectText {
            target,
            equals,
            contains,
            timeout_seconds,
        } => {
            let actual = match timeout_seconds {
                Some(secs) => engine.with_timeout(Duration::from_secs(*secs)).read_text(target).await?,
                None => engine.read_text(target).await?,
            };
            check_text(&target.to_string(), &actual, equals.as_deref(), contains.as_deref())
        }
        Step::ExpectVisible { target, visible } => {
            let actual = engine.is_displayed(target).await;
            if actual == *visible {
                Ok(())
            } else {
                Err(Error::TestAssertion(format!(
                    "expected {} to be {}, but it was {}",
                    target,
                    if *visible { "visible" } else { "hidden" },
                    if actual { "visible" } else { "hidden" },
                )))
            }
        }
        Step::Screenshot { name: shot } => {
            let label = shot.as_deref().unwrap_or(name);
            let dir = &ctx.config().artifacts.screenshots_dir;
            let path = save_screenshot(ctx.browser(), dir, label).await?;
            ctx.log().attach(path)
        }
        Step::Log { message } => ctx.log().info(message.clone()),
        Step::Skip { reason } => Err(Error::Skipped(reason.clone())),
    }
}

fn check_text(target: &str, actual: &str, equals: Option<&str>, contains: Option<&str>) -> Result<()> {
    let actual = actual.trim();
    if let Some(expected) = equals {
        if actual != expected {
            return Err(Error::TestAssertion(format!(
                "expected {} text '{}', got '{}'",
                target, expected, actual
            )));
        }
    }
    if let Some(needle) = contains {
        if !actual.contains(needle) {
            return Err(Error::TestAssertion(format!(
                "expected {} text to contain '{}', got '{}'",
                target, needle, actual
            )));
        }
    }
    Ok(())
}

/// Prints suite progress to stdout and forwards every event to
/// [`LoggingHooks`] so the run log has it too
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleHooks;

impl LifecycleHooks for ConsoleHooks {
    fn on_suite_start(&self, suite: &str, tests: usize) {
        LoggingHooks.on_suite_start(suite, tests);
        println!(
            "\n{} {} ({} tests)",
            "Running Suite:".blue().bold(),
            suite.white().bold(),
            tests
        );
    }

    fn on_start(&self, attempt: &AttemptInfo) {
        LoggingHooks.on_start(attempt);
        if attempt.attempt > 1 {
            println!(
                "\n{} {} {}",
                "Running Test:".blue().bold(),
                attempt.test_id.white().bold(),
                format!("(attempt {})", attempt.attempt).yellow()
            );
        } else {
            println!("\n{} {}", "Running Test:".blue().bold(), attempt.test_id.white().bold());
        }
        if !attempt.description.is_empty() {
            println!("  {}", attempt.description.dimmed());
        }
    }

    fn on_success(&self, attempt: &AttemptInfo, elapsed: Duration) {
        LoggingHooks.on_success(attempt, elapsed);
        println!(
            "  {} {} {}",
            "✓".green().bold(),
            "Test Passed".green().bold(),
            format!("({:.1}s)", elapsed.as_secs_f64()).dimmed()
        );
    }

    fn on_failure(&self, attempt: &AttemptInfo, error: &Error, will_retry: bool) {
        LoggingHooks.on_failure(attempt, error, will_retry);
        if will_retry {
            println!("  {} {} {}", "↻".yellow(), "Attempt failed, retrying:".yellow(), error);
        } else {
            println!("  {} {} {}", "✗".red().bold(), "Test Failed:".red().bold(), error);
        }
    }

    fn on_skip(&self, attempt: &AttemptInfo, reason: &str) {
        LoggingHooks.on_skip(attempt, reason);
        println!("  {} {} {}", "-".yellow(), "Test Skipped:".yellow(), reason);
    }

    fn on_suite_finish(&self, summary: &SuiteSummary) {
        LoggingHooks.on_suite_finish(summary);
        let line = format!(
            "{} passed, {} failed, {} skipped ({} retried) in {:.1}s",
            summary.passed(),
            summary.failed(),
            summary.skipped(),
            summary.retried(),
            summary.duration.as_secs_f64()
        );
        if summary.all_passed() {
            println!("\n{} {}\n", "✓".green().bold(), line.green().bold());
        } else {
            println!("\n{} {}\n", "✗".red().bold(), line.red().bold());
            for result in summary.results.iter().filter(|r| !r.passed()) {
                if let TestOutcome::Failed(reason) = &result.outcome {
                    println!("  {} {}: {}", "✗".red(), result.test_id, reason);
                }
            }
        }
    }
}
