//! CLI command handling
//!
//! Loads configuration, wires the controller to a launcher and prints
//! results.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use tokio_util::sync::CancellationToken;

use crate::browser::{Launcher, ScriptedLauncher, WebDriverLauncher};
use crate::commands::Commands;
use crate::common::{logging, paths, Config, Overrides, Result};
use crate::lifecycle::{LifecycleController, SuiteSummary};
use crate::report::ReportAggregator;
use crate::scenario::{self, ConsoleHooks, Scenario, ScenarioTest};

/// Dispatch a CLI command
///
/// Returns `Ok(false)` when the command ran but tests failed or scenarios
/// were invalid.
pub async fn dispatch(command: Commands) -> Result<bool> {
    match command {
        Commands::Run {
            scenarios,
            config,
            browser,
            headless,
            retries,
            suite,
            dry_run,
            verbose,
        } => {
            let overrides = Overrides {
                browser,
                headless: headless.then_some(true),
                retry_max_attempts: retries,
            };
            let config = Arc::new(Config::load_with(config.as_deref(), &overrides)?);
            run(config, &scenarios, &suite, dry_run, verbose).await
        }

        Commands::Config { config } => {
            logging::init_cli();
            let config = Config::load(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(true)
        }

        Commands::Validate { scenarios } => {
            logging::init_cli();
            Ok(validate(&scenarios))
        }
    }
}

async fn run(
    config: Arc<Config>,
    scenarios: &[PathBuf],
    suite: &str,
    dry_run: bool,
    verbose: bool,
) -> Result<bool> {
    let (_guard, log_path) = logging::init_run(&config.logs_dir);
    tracing::info!(
        browser = %config.browser.browser,
        base_url = %config.base_url,
        dry_run,
        "Starting run of {} scenario(s)",
        scenarios.len()
    );

    let tests: Vec<ScenarioTest> = scenario::load_all(scenarios, verbose)?
        .into_iter()
        .map(|t| t.dry_run(dry_run))
        .collect();

    paths::ensure_dirs([config.artifacts.screenshots_dir.as_path()])?;
    let report = Arc::new(ReportAggregator::from_config(&config));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current test");
            on_signal.cancel();
        }
    });

    let summary = if dry_run {
        let launcher = ScriptedLauncher::permissive();
        let controller = LifecycleController::new(Arc::clone(&config), launcher, Arc::clone(&report));
        execute(controller, suite, &tests, cancel).await
    } else {
        let launcher = WebDriverLauncher::new();
        let controller = LifecycleController::new(Arc::clone(&config), launcher, Arc::clone(&report));
        execute(controller, suite, &tests, cancel).await
    };
    signal_task.abort();
    let summary = summary?;

    let report_path = report.flush()?;
    println!("{} {}", "Report:".cyan(), report_path.display());
    if let Some(path) = log_path {
        println!("{} {}", "Log:".cyan(), path.display());
    }

    Ok(summary.all_passed())
}

async fn execute<L: Launcher>(
    controller: LifecycleController<L>,
    suite: &str,
    tests: &[ScenarioTest],
    cancel: CancellationToken,
) -> Result<SuiteSummary> {
    controller
        .with_hooks(Arc::new(ConsoleHooks))
        .with_cancellation(cancel)
        .run_suite(suite, tests)
        .await
}

fn validate(scenarios: &[PathBuf]) -> bool {
    let mut all_valid = true;
    for path in scenarios {
        match Scenario::load(path) {
            Ok(scenario) => println!(
                "  {} {} {}",
                "✓".green(),
                scenario.name,
                format!("({} steps)", scenario.steps.len()).dimmed()
            ),
            Err(e) => {
                all_valid = false;
                println!("  {} {}", "✗".red(), e);
            }
        }
    }
    all_valid
}
