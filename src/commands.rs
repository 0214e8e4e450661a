//! CLI command definitions
//!
//! Defines the clap commands for the uiharness CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run one or more YAML scenarios as a suite
    Run {
        /// Scenario files to run, in order
        #[arg(required = true)]
        scenarios: Vec<PathBuf>,

        /// Config file (default: ./uiharness.toml, then the user config dir)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Browser to use: chrome, firefox, edge or safari
        #[arg(long)]
        browser: Option<String>,

        /// Run the browser headless
        #[arg(long)]
        headless: bool,

        /// Maximum retries per failing test
        #[arg(long)]
        retries: Option<u32>,

        /// Suite name shown in output and logs
        #[arg(long, default_value = "uiharness")]
        suite: String,

        /// Run against an in-memory browser instead of WebDriver; assertions
        /// are not evaluated
        #[arg(long)]
        dry_run: bool,

        /// Print each step as it runs
        #[arg(long, short)]
        verbose: bool,
    },

    /// Print the resolved configuration
    Config {
        /// Config file (default: ./uiharness.toml, then the user config dir)
        #[arg(long, short)]
        config: Option<PathBuf>,
    },

    /// Parse scenario files without running them
    Validate {
        /// Scenario files to check
        #[arg(required = true)]
        scenarios: Vec<PathBuf>,
    },
}
