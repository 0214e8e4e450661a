//! Configuration file handling
//!
//! The file is read once at startup into an immutable [`Config`] that is
//! passed by reference (usually as `Arc<Config>`) into every component.
//! Optional keys fall back to defaults; required keys that are absent fail
//! the load with [`Error::MissingConfigKey`] naming the key.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::paths;
use super::{Error, Result};

/// Supported browsers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chrome,
    Firefox,
    Edge,
    Safari,
}

impl BrowserKind {
    /// Parse a browser name. Unknown names fall back to Chrome.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "chrome" | "chromium" => Self::Chrome,
            "firefox" => Self::Firefox,
            "edge" | "msedge" => Self::Edge,
            "safari" => Self::Safari,
            other => {
                tracing::warn!("Unknown browser '{}', defaulting to chrome", other);
                Self::Chrome
            }
        }
    }

    /// Default WebDriver endpoint for this browser's driver
    pub fn default_webdriver_url(&self) -> &'static str {
        match self {
            Self::Chrome => "http://localhost:9515",
            Self::Firefox => "http://localhost:4444",
            Self::Edge => "http://localhost:9515",
            Self::Safari => "http://localhost:4445",
        }
    }

    pub fn supports_headless(&self) -> bool {
        !matches!(self, Self::Safari)
    }
}

impl std::fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chrome => write!(f, "chrome"),
            Self::Firefox => write!(f, "firefox"),
            Self::Edge => write!(f, "edge"),
            Self::Safari => write!(f, "safari"),
        }
    }
}

/// Browser window geometry applied after the session starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WindowSize {
    Maximize,
    Fixed { width: u32, height: u32 },
}

impl WindowSize {
    /// Parse "maximize" or "WxH"
    fn parse(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("maximize") {
            return Ok(Self::Maximize);
        }
        let (w, h) = value
            .split_once(['x', 'X'])
            .ok_or_else(|| Error::Config(format!("window_size '{}' is not WxH", value)))?;
        let width = w
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("window_size '{}' has a bad width", value)))?;
        let height = h
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("window_size '{}' has a bad height", value)))?;
        Ok(Self::Fixed { width, height })
    }
}

/// Settings used to start a browser session
#[derive(Debug, Clone, Serialize)]
pub struct BrowserSettings {
    pub browser: BrowserKind,
    pub headless: bool,
    pub webdriver_url: String,
    pub window: WindowSize,
    pub page_load_timeout: Duration,
}

/// Synchronization settings
#[derive(Debug, Clone, Serialize)]
pub struct WaitSettings {
    pub explicit_wait: Duration,
    pub poll_interval: Duration,
}

/// Failure evidence settings
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSettings {
    pub screenshot_on_failure: bool,
    /// Also capture evidence for failing attempts that will be retried
    pub capture_intermediate: bool,
    pub screenshots_dir: PathBuf,
}

/// Report settings
#[derive(Debug, Clone, Serialize)]
pub struct ReportSettings {
    pub path: PathBuf,
    pub title: String,
    pub name: String,
    pub environment: String,
}

/// Resolved, immutable harness configuration
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub base_url: String,
    pub browser: BrowserSettings,
    pub waits: WaitSettings,
    pub retry_max_attempts: u32,
    pub artifacts: ArtifactSettings,
    pub report: ReportSettings,
    pub logs_dir: PathBuf,
}

/// On-disk shape of the config file; every key optional so that missing
/// required keys can be reported by name
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub base_url: Option<String>,
    pub browser: Option<String>,
    pub headless: Option<bool>,
    pub webdriver_url: Option<String>,
    pub window_size: Option<String>,
    pub explicit_wait_seconds: Option<u64>,
    pub poll_interval_millis: Option<u64>,
    pub page_load_timeout_seconds: Option<u64>,
    pub retry_max_attempts: Option<u32>,
    pub screenshot_on_failure: Option<bool>,
    pub capture_intermediate: Option<bool>,
    pub screenshots_dir: Option<PathBuf>,
    pub reports_dir: Option<PathBuf>,
    pub logs_dir: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub report_title: Option<String>,
    pub report_name: Option<String>,
    pub environment: Option<String>,
}

pub const DEFAULT_EXPLICIT_WAIT_SECS: u64 = 30;
pub const DEFAULT_POLL_INTERVAL_MILLIS: u64 = 500;
pub const DEFAULT_PAGE_LOAD_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 2;

/// Settings given on the command line; they take precedence over the file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub browser: Option<String>,
    pub headless: Option<bool>,
    pub retry_max_attempts: Option<u32>,
}

fn require<T>(value: Option<T>, key: &str) -> Result<T> {
    value.ok_or_else(|| Error::MissingConfigKey(key.to_string()))
}

impl RawConfig {
    /// Parse TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Apply command-line overrides before defaults are resolved, so a
    /// `--browser` switch also picks that browser's default driver URL
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(browser) = &overrides.browser {
            self.browser = Some(browser.clone());
        }
        if let Some(headless) = overrides.headless {
            self.headless = Some(headless);
        }
        if let Some(retries) = overrides.retry_max_attempts {
            self.retry_max_attempts = Some(retries);
        }
        self
    }

    /// Resolve defaults and check required keys
    pub fn resolve(self) -> Result<Config> {
        let base_url = require(self.base_url, "base_url")?;
        if base_url.trim().is_empty() {
            return Err(Error::Config("base_url must not be empty".to_string()));
        }

        let browser = self
            .browser
            .as_deref()
            .map(BrowserKind::from_name)
            .unwrap_or_default();
        let headless = self.headless.unwrap_or(false);
        if headless && !browser.supports_headless() {
            tracing::info!("{} does not support headless mode, running headed", browser);
        }

        let window = match self.window_size.as_deref() {
            Some(value) => WindowSize::parse(value)?,
            None => WindowSize::Maximize,
        };

        let poll_interval_millis = self
            .poll_interval_millis
            .unwrap_or(DEFAULT_POLL_INTERVAL_MILLIS);
        if poll_interval_millis == 0 {
            return Err(Error::Config(
                "poll_interval_millis must be greater than zero".to_string(),
            ));
        }

        let reports_dir = self.reports_dir.unwrap_or_else(|| PathBuf::from("reports"));
        let report_path = self
            .report_path
            .unwrap_or_else(|| paths::default_report_path(&reports_dir));

        Ok(Config {
            base_url,
            browser: BrowserSettings {
                browser,
                headless: headless && browser.supports_headless(),
                webdriver_url: self
                    .webdriver_url
                    .unwrap_or_else(|| browser.default_webdriver_url().to_string()),
                window,
                page_load_timeout: Duration::from_secs(
                    self.page_load_timeout_seconds
                        .unwrap_or(DEFAULT_PAGE_LOAD_TIMEOUT_SECS),
                ),
            },
            waits: WaitSettings {
                explicit_wait: Duration::from_secs(
                    self.explicit_wait_seconds.unwrap_or(DEFAULT_EXPLICIT_WAIT_SECS),
                ),
                poll_interval: Duration::from_millis(poll_interval_millis),
            },
            retry_max_attempts: self.retry_max_attempts.unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS),
            artifacts: ArtifactSettings {
                screenshot_on_failure: self.screenshot_on_failure.unwrap_or(true),
                capture_intermediate: self.capture_intermediate.unwrap_or(false),
                screenshots_dir: self
                    .screenshots_dir
                    .unwrap_or_else(|| PathBuf::from("screenshots")),
            },
            report: ReportSettings {
                path: report_path,
                title: self
                    .report_title
                    .unwrap_or_else(|| "Automation Test Report".to_string()),
                name: self
                    .report_name
                    .unwrap_or_else(|| "Test Execution Report".to_string()),
                environment: self.environment.unwrap_or_else(|| "QA".to_string()),
            },
            logs_dir: self.logs_dir.unwrap_or_else(|| PathBuf::from("logs")),
        })
    }
}

impl Config {
    /// Load configuration from an explicit path, or from the first config
    /// file found by [`paths::find_config`]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, &Overrides::default())
    }

    /// [`Config::load`] with command-line overrides applied
    pub fn load_with(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => paths::find_config().ok_or_else(|| {
                Error::Config(format!(
                    "No config file found. Create ./{} or pass --config",
                    paths::CONFIG_FILE_NAME
                ))
            })?,
        };

        let content = std::fs::read_to_string(&path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        let config = RawConfig::parse(&content)?.with_overrides(overrides).resolve()?;
        tracing::info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Parse and resolve configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        RawConfig::parse(content)?.resolve()
    }
}
