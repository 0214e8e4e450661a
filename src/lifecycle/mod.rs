//! Test execution lifecycle: sessions, hooks and retries

pub mod controller;
pub mod hooks;
pub mod retry;

pub use controller::{
    AttemptRecord, LifecycleController, LifecycleState, SuiteSummary, TestContext, TestOutcome,
    TestResult, UiTest,
};
pub use hooks::{AttemptInfo, LifecycleHooks, LoggingHooks};
pub use retry::{RetryPolicy, RetryState};
