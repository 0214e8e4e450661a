//! uiharness - runs UI test scenarios against a WebDriver browser
//!
//! Waits are explicit and bounded, clicks fall back to a script click when the
//! native one is intercepted, failing tests are retried, and every terminal
//! failure leaves a screenshot and trace in the HTML report.

use clap::Parser;
use uiharness::cli;
use uiharness::commands::Commands;

#[derive(Parser)]
#[command(name = "uiharness", about = "Resilient UI test runner")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli::dispatch(cli.command).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
