//! Error types for the harness
//!
//! Messages name the locator, the condition or the config key involved so a
//! failure in a report can be acted on without re-running the test.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// The interaction that failed, for `Error::Interaction`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Click,
    Type,
    ReadText,
    ScrollIntoView,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Click => write!(f, "click"),
            Self::Type => write!(f, "type"),
            Self::ReadText => write!(f, "read text"),
            Self::ScrollIntoView => write!(f, "scroll into view"),
        }
    }
}

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Transient UI errors (ignorable while polling) ===
    #[error("No element matches {0}")]
    NoSuchElement(String),

    #[error("Element {0} is no longer attached to the page")]
    StaleElement(String),

    // === WebDriver errors ===
    #[error("Element {0} is not interactable")]
    NotInteractable(String),

    #[error("Click on {0} was intercepted by another element")]
    ClickIntercepted(String),

    #[error("WebDriver error: {0}")]
    WebDriver(String),

    // === Synchronization ===
    #[error("Timed out after {elapsed:?} waiting for {condition}{}", .last_error.as_ref().map(|e| format!(" (last error: {e})")).unwrap_or_default())]
    Timeout {
        condition: String,
        elapsed: Duration,
        last_error: Option<String>,
    },

    #[error("Wait for {condition} was cancelled")]
    Cancelled { condition: String },

    // === Interaction ===
    #[error("{action} on {target} failed: {cause}{}", .fallback_error.as_ref().map(|e| format!("; fallback failed: {e}")).unwrap_or_default())]
    Interaction {
        action: Action,
        target: String,
        #[source]
        cause: Box<Error>,
        fallback_error: Option<String>,
    },

    // === Session ===
    #[error("Could not start browser session: {0}")]
    FatalSetup(String),

    #[error("Browser session has already been closed")]
    SessionClosed,

    // === Artifacts and reporting ===
    #[error("Failed to capture failure artifact: {0}")]
    ArtifactCapture(String),

    #[error("Report entry {0} already has a failure artifact")]
    ArtifactAlreadyAttached(usize),

    #[error("Report has been flushed; no further entries or log lines can be recorded")]
    ReportFlushed,

    #[error("Report was already flushed")]
    ReportAlreadyFlushed,

    #[error("Unknown report entry {0}")]
    UnknownEntry(usize),

    // === Configuration Errors ===
    #[error("Missing required configuration key '{0}'")]
    MissingConfigKey(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === Test outcome ===
    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    #[error("Test skipped: {0}")]
    Skipped(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of errors, used by `WaitSpec` to decide which
/// errors a poll swallows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoSuchElement,
    StaleElement,
    NotInteractable,
    ClickIntercepted,
    WebDriver,
    Timeout,
    Cancelled,
    Interaction,
    FatalSetup,
    SessionClosed,
    ArtifactCapture,
    Report,
    Config,
    Assertion,
    Skipped,
    Io,
    Internal,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoSuchElement(_) => ErrorKind::NoSuchElement,
            Self::StaleElement(_) => ErrorKind::StaleElement,
            Self::NotInteractable(_) => ErrorKind::NotInteractable,
            Self::ClickIntercepted(_) => ErrorKind::ClickIntercepted,
            Self::WebDriver(_) => ErrorKind::WebDriver,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Interaction { .. } => ErrorKind::Interaction,
            Self::FatalSetup(_) => ErrorKind::FatalSetup,
            Self::SessionClosed => ErrorKind::SessionClosed,
            Self::ArtifactCapture(_) => ErrorKind::ArtifactCapture,
            Self::ArtifactAlreadyAttached(_)
            | Self::ReportFlushed
            | Self::ReportAlreadyFlushed
            | Self::UnknownEntry(_) => ErrorKind::Report,
            Self::MissingConfigKey(_) | Self::Config(_) | Self::ConfigParse(_) => {
                ErrorKind::Config
            }
            Self::TestAssertion(_) => ErrorKind::Assertion,
            Self::Skipped(_) => ErrorKind::Skipped,
            Self::Io(_) | Self::FileRead { .. } => ErrorKind::Io,
            Self::Json(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True for errors that mean "the element is not there yet"
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::NoSuchElement | ErrorKind::StaleElement)
    }

    /// Create a timeout error
    pub fn timeout(condition: &str, elapsed: Duration, last_error: Option<String>) -> Self {
        Self::Timeout {
            condition: condition.to_string(),
            elapsed,
            last_error,
        }
    }

    /// Create an interaction failure that keeps the primary cause as its source
    pub fn interaction(
        action: Action,
        target: impl fmt::Display,
        cause: Error,
        fallback_error: Option<&Error>,
    ) -> Self {
        Self::Interaction {
            action,
            target: target.to_string(),
            cause: Box::new(cause),
            fallback_error: fallback_error.map(|e| e.to_string()),
        }
    }

    /// Render the error followed by its source chain, one cause per line
    pub fn trace(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\n  caused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}
