//! Report aggregator
//!
//! One aggregator per run, shared as `Arc<ReportAggregator>` between every
//! test. Entries are append-only while the run is in progress; `flush`
//! persists them once as HTML plus a JSON twin and seals the aggregator.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::common::{Config, Error, Result};

use super::artifact::FailureArtifact;
use super::html;

/// Handle to one entry in the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntryId(usize);

impl EntryId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Final status of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "PASS"),
            Self::Failed => write!(f, "FAIL"),
            Self::Skipped => write!(f, "SKIP"),
        }
    }
}

/// Severity of a log line. `Pass`, `Fail` and `Skip` also set the entry's
/// status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Pass,
    Fail,
    Skip,
    Warning,
}

impl LogLevel {
    fn status(self) -> Option<TestStatus> {
        match self {
            Self::Pass => Some(TestStatus::Passed),
            Self::Fail => Some(TestStatus::Failed),
            Self::Skip => Some(TestStatus::Skipped),
            Self::Info | Self::Warning => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
            Self::Warning => "WARNING",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

/// Record of one test attempt
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub id: EntryId,
    pub test_id: String,
    /// 1-based; retries of the same test get their own entries
    pub attempt: u32,
    pub description: String,
    /// `None` while the test is still running
    pub status: Option<TestStatus>,
    pub logs: Vec<LogLine>,
    pub attachments: Vec<PathBuf>,
    pub failure: Option<FailureArtifact>,
    pub started: DateTime<Local>,
    pub finished: Option<DateTime<Local>>,
}

/// Pass/fail/skip counts over all entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Environment description shown at the top of the report
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub harness: String,
    pub browser: String,
    pub environment: String,
    pub application_url: String,
}

impl SystemInfo {
    pub fn collect(config: &Config) -> Self {
        let os = os_info::get();
        Self {
            os: format!("{} {}", os.os_type(), os.version()),
            arch: std::env::consts::ARCH.to_string(),
            harness: format!("uiharness {}", env!("CARGO_PKG_VERSION")),
            browser: config.browser.browser.to_string(),
            environment: config.report.environment.clone(),
            application_url: config.base_url.clone(),
        }
    }
}

/// Title, name and system metadata of a report
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub title: String,
    pub name: String,
    pub system: SystemInfo,
}

impl ReportMeta {
    pub fn from_config(config: &Config) -> Self {
        Self {
            title: config.report.title.clone(),
            name: config.report.name.clone(),
            system: SystemInfo::collect(config),
        }
    }
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    #[serde(flatten)]
    meta: &'a ReportMeta,
    generated: DateTime<Local>,
    summary: Summary,
    entries: &'a [ReportEntry],
}

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<ReportEntry>,
    flushed: bool,
}

/// Process-wide sink for test results
#[derive(Debug)]
pub struct ReportAggregator {
    path: PathBuf,
    meta: ReportMeta,
    inner: Mutex<Inner>,
}

impl ReportAggregator {
    pub fn new(path: impl Into<PathBuf>, meta: ReportMeta) -> Self {
        Self {
            path: path.into(),
            meta,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.report.path.clone(), ReportMeta::from_config(config))
    }

    /// Where the HTML report will be written
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the JSON twin will be written
    pub fn json_path(&self) -> PathBuf {
        self.path.with_extension("json")
    }

    pub fn meta(&self) -> &ReportMeta {
        &self.meta
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Internal("report lock poisoned".to_string()))
    }

    /// Lock for mutation; fails once the report has been flushed
    fn lock_open(&self) -> Result<MutexGuard<'_, Inner>> {
        let inner = self.lock()?;
        if inner.flushed {
            return Err(Error::ReportFlushed);
        }
        Ok(inner)
    }

    /// Start a new entry. The attempt number counts earlier entries of the
    /// same test.
    pub fn create_entry(&self, test_id: &str, description: &str) -> Result<EntryId> {
        let mut inner = self.lock_open()?;
        let id = EntryId(inner.entries.len());
        let attempt = inner.entries.iter().filter(|e| e.test_id == test_id).count() as u32 + 1;
        inner.entries.push(ReportEntry {
            id,
            test_id: test_id.to_string(),
            attempt,
            description: description.to_string(),
            status: None,
            logs: Vec::new(),
            attachments: Vec::new(),
            failure: None,
            started: Local::now(),
            finished: None,
        });
        Ok(id)
    }

    /// Add a log line. `Fail` is sticky: a later `Pass` does not clear it.
    pub fn append(&self, entry: EntryId, level: LogLevel, message: impl Into<String>) -> Result<()> {
        let mut inner = self.lock_open()?;
        let entry = inner
            .entries
            .get_mut(entry.0)
            .ok_or(Error::UnknownEntry(entry.0))?;
        if let Some(status) = level.status() {
            if entry.status != Some(TestStatus::Failed) {
                entry.status = Some(status);
            }
        }
        entry.logs.push(LogLine {
            timestamp: Local::now(),
            level,
            message: message.into(),
        });
        Ok(())
    }

    /// Link a file (e.g. an intermediate screenshot) to an entry
    pub fn attach(&self, entry: EntryId, path: impl Into<PathBuf>) -> Result<()> {
        let mut inner = self.lock_open()?;
        let entry = inner
            .entries
            .get_mut(entry.0)
            .ok_or(Error::UnknownEntry(entry.0))?;
        entry.attachments.push(path.into());
        Ok(())
    }

    /// Attach the failure artifact; an entry takes at most one
    pub fn attach_failure(&self, entry: EntryId, artifact: FailureArtifact) -> Result<()> {
        let mut inner = self.lock_open()?;
        let entry = inner
            .entries
            .get_mut(entry.0)
            .ok_or(Error::UnknownEntry(entry.0))?;
        if entry.failure.is_some() {
            return Err(Error::ArtifactAlreadyAttached(entry.id.0));
        }
        if let Some(path) = &artifact.screenshot {
            entry.attachments.push(path.clone());
        }
        entry.failure = Some(artifact);
        Ok(())
    }

    /// Stamp the entry's end time
    pub fn finish(&self, entry: EntryId) -> Result<()> {
        let mut inner = self.lock_open()?;
        let entry = inner
            .entries
            .get_mut(entry.0)
            .ok_or(Error::UnknownEntry(entry.0))?;
        entry.finished = Some(Local::now());
        Ok(())
    }

    /// Per-test handle for test code
    pub fn test_log(self: &Arc<Self>, entry: EntryId, test_id: &str) -> TestLog {
        TestLog {
            report: Arc::clone(self),
            entry,
            test_id: Arc::from(test_id),
        }
    }

    pub fn entry(&self, entry: EntryId) -> Option<ReportEntry> {
        self.lock().ok()?.entries.get(entry.0).cloned()
    }

    /// Snapshot of all entries
    pub fn entries(&self) -> Vec<ReportEntry> {
        self.lock().map(|i| i.entries.clone()).unwrap_or_default()
    }

    pub fn summary(&self) -> Summary {
        summarize(&self.entries())
    }

    pub fn is_flushed(&self) -> bool {
        self.lock().map(|i| i.flushed).unwrap_or(false)
    }

    /// Write the HTML report and its JSON twin, then seal the aggregator.
    /// Only the first successful call writes; if writing fails the entries
    /// are kept and the report stays open.
    pub fn flush(&self) -> Result<PathBuf> {
        let mut inner = self.lock()?;
        if inner.flushed {
            return Err(Error::ReportAlreadyFlushed);
        }

        let summary = self.write(&inner.entries)?;
        inner.flushed = true;

        tracing::info!(
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            "Report written to {}",
            self.path.display()
        );
        Ok(self.path.clone())
    }

    fn write(&self, entries: &[ReportEntry]) -> Result<Summary> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let generated = Local::now();
        let summary = summarize(entries);

        let document = html::render(&self.meta, entries, &summary, generated);
        std::fs::write(&self.path, document)?;

        let json = serde_json::to_string_pretty(&ReportDocument {
            meta: &self.meta,
            generated,
            summary,
            entries,
        })?;
        std::fs::write(self.json_path(), json)?;
        Ok(summary)
    }
}

fn summarize(entries: &[ReportEntry]) -> Summary {
    let mut summary = Summary {
        total: entries.len(),
        ..Summary::default()
    };
    for entry in entries {
        match entry.status {
            Some(TestStatus::Passed) => summary.passed += 1,
            Some(TestStatus::Failed) => summary.failed += 1,
            Some(TestStatus::Skipped) => summary.skipped += 1,
            None => {}
        }
    }
    summary
}

/// Per-test log handle
///
/// Each call writes a line to the test's report entry and emits a matching
/// tracing event.
#[derive(Debug, Clone)]
pub struct TestLog {
    report: Arc<ReportAggregator>,
    entry: EntryId,
    test_id: Arc<str>,
}

impl TestLog {
    pub fn entry(&self) -> EntryId {
        self.entry
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    pub fn report(&self) -> &Arc<ReportAggregator> {
        &self.report
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        match level {
            LogLevel::Fail => tracing::error!(test = %self.test_id, "{}", message),
            LogLevel::Warning => tracing::warn!(test = %self.test_id, "{}", message),
            LogLevel::Info | LogLevel::Pass | LogLevel::Skip => {
                tracing::info!(test = %self.test_id, "{}", message)
            }
        }
        self.report.append(self.entry, level, message)
    }

    pub fn info(&self, message: impl Into<String>) -> Result<()> {
        self.log(LogLevel::Info, message)
    }

    pub fn pass(&self, message: impl Into<String>) -> Result<()> {
        self.log(LogLevel::Pass, message)
    }

    pub fn fail(&self, message: impl Into<String>) -> Result<()> {
        self.log(LogLevel::Fail, message)
    }

    pub fn skip(&self, message: impl Into<String>) -> Result<()> {
        self.log(LogLevel::Skip, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> Result<()> {
        self.log(LogLevel::Warning, message)
    }

    pub fn attach(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.report.attach(self.entry, path)
    }
}
