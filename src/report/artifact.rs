//! Failure artifact pipeline
//!
//! Runs once per terminal failure: screenshot, trace, attach. Every step is
//! allowed to fail on its own; a broken screenshot source still leaves the
//! error message and trace in the report, and nothing here ever replaces the
//! error that failed the test.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::browser::Browser;
use crate::common::config::ArtifactSettings;
use crate::common::{paths, Error, Result};

use super::aggregator::{EntryId, LogLevel, ReportAggregator};

/// Evidence attached to a failed entry
#[derive(Debug, Clone, Serialize)]
pub struct FailureArtifact {
    pub test_id: String,
    pub timestamp: DateTime<Local>,
    pub screenshot: Option<PathBuf>,
    pub message: String,
    pub trace: String,
}

/// Write a screenshot of `browser` to `<dir>/<name>_<yyyyMMdd_HHmmss>.png`,
/// never overwriting an existing file
pub async fn save_screenshot<B: Browser>(browser: &B, dir: &Path, name: &str) -> Result<PathBuf> {
    let png = browser.screenshot().await?;

    paths::ensure_dirs([dir])
        .map_err(|e| Error::ArtifactCapture(format!("cannot create {}: {}", dir.display(), e)))?;

    let stem = format!(
        "{}_{}",
        paths::sanitize_file_stem(name),
        Local::now().format("%Y%m%d_%H%M%S")
    );
    let (path, mut file) = paths::create_unique_file(dir, &stem, "png")
        .map_err(|e| Error::ArtifactCapture(format!("cannot create screenshot file: {}", e)))?;
    file.write_all(&png)
        .map_err(|e| Error::ArtifactCapture(format!("cannot write {}: {}", path.display(), e)))?;

    tracing::info!("Screenshot saved: {}", path.display());
    Ok(path)
}

#[derive(Debug, Clone)]
pub struct ArtifactPipeline {
    settings: ArtifactSettings,
    report: Arc<ReportAggregator>,
}

impl ArtifactPipeline {
    pub fn new(settings: ArtifactSettings, report: Arc<ReportAggregator>) -> Self {
        Self { settings, report }
    }

    pub fn settings(&self) -> &ArtifactSettings {
        &self.settings
    }

    /// Save a screenshot as `<screenshots_dir>/<test>_<yyyyMMdd_HHmmss>.png`
    pub async fn capture_screenshot<B: Browser>(&self, browser: &B, test_id: &str) -> Result<PathBuf> {
        save_screenshot(browser, &self.settings.screenshots_dir, test_id).await
    }

    /// Record `error` against `entry`: screenshot of `browser` if there is one
    /// and screenshots are enabled, then the artifact, then the log lines.
    ///
    /// Returns the artifact when it was attached.
    pub async fn record_failure<B: Browser>(
        &self,
        browser: Option<&B>,
        entry: EntryId,
        test_id: &str,
        error: &Error,
    ) -> Option<FailureArtifact> {
        let screenshot = match browser {
            Some(browser) if self.settings.screenshot_on_failure => {
                match self.capture_screenshot(browser, test_id).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        tracing::warn!(test = test_id, "Screenshot capture failed: {}", e);
                        None
                    }
                }
            }
            _ => None,
        };

        let artifact = FailureArtifact {
            test_id: test_id.to_string(),
            timestamp: Local::now(),
            screenshot,
            message: error.to_string(),
            trace: error.trace(),
        };

        let attached = match self.report.attach_failure(entry, artifact.clone()) {
            Ok(()) => Some(artifact),
            Err(e) => {
                tracing::warn!(test = test_id, "Could not attach failure artifact: {}", e);
                None
            }
        };

        for (level, message) in [
            (LogLevel::Fail, format!("Test failed: {}", error)),
            (LogLevel::Info, error.trace()),
        ] {
            if let Err(e) = self.report.append(entry, level, message) {
                tracing::warn!(test = test_id, "Could not log failure to report: {}", e);
            }
        }

        attached
    }
}
