//! uiharness - a UI test-execution harness
//!
//! Drives a browser over WebDriver, synchronizes every action against the
//! page through an explicit condition poller, recovers from transient
//! interaction failures, and records each test attempt in an HTML/JSON report
//! with screenshots for terminal failures.

pub mod browser;
pub mod cli;
pub mod commands;
pub mod common;
pub mod lifecycle;
pub mod report;
pub mod scenario;
pub mod sync;

// Re-export commonly used types for tests
pub use browser::{Browser, Launcher, Locator, Session};
pub use common::{Config, Error, Result};
pub use lifecycle::{LifecycleController, TestContext, UiTest};
pub use report::{ReportAggregator, TestLog};
pub use sync::{InteractionExecutor, InteractionOutcome, SyncEngine};
