//! Browser abstraction
//!
//! The harness core talks to a browser only through the [`Browser`] trait and
//! obtains browsers only through a [`Launcher`]. Two implementations ship:
//! [`webdriver`] (fantoccini against a running WebDriver server) and
//! [`scripted`] (in-memory, for dry runs and tests).

pub mod scripted;
pub mod webdriver;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::config::BrowserSettings;
use crate::common::{Error, Result};

pub use scripted::{ScriptedBrowser, ScriptedElement, ScriptedLauncher};
pub use webdriver::{WebDriverBrowser, WebDriverLauncher};

/// Opaque descriptor of a page element
///
/// The harness never interprets the selector text; it is handed to the
/// browser as-is. Serialized form: `{ css: "#login" }`, `{ xpath: "//a" }`, ...
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "LocatorFields", into = "LocatorFields")]
pub enum Locator {
    Css(String),
    XPath(String),
    Id(String),
    LinkText(String),
}

/// Mapping form of a locator; exactly one field is set
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct LocatorFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    xpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    link_text: Option<String>,
}

impl TryFrom<LocatorFields> for Locator {
    type Error = String;

    fn try_from(fields: LocatorFields) -> std::result::Result<Self, String> {
        match fields {
            LocatorFields { css: Some(s), xpath: None, id: None, link_text: None } => Ok(Self::Css(s)),
            LocatorFields { css: None, xpath: Some(s), id: None, link_text: None } => Ok(Self::XPath(s)),
            LocatorFields { css: None, xpath: None, id: Some(s), link_text: None } => Ok(Self::Id(s)),
            LocatorFields { css: None, xpath: None, id: None, link_text: Some(s) } => {
                Ok(Self::LinkText(s))
            }
            _ => Err("a locator needs exactly one of css, xpath, id or link_text".to_string()),
        }
    }
}

impl From<Locator> for LocatorFields {
    fn from(locator: Locator) -> Self {
        match locator {
            Locator::Css(s) => Self { css: Some(s), ..Self::default() },
            Locator::XPath(s) => Self { xpath: Some(s), ..Self::default() },
            Locator::Id(s) => Self { id: Some(s), ..Self::default() },
            Locator::LinkText(s) => Self { link_text: Some(s), ..Self::default() },
        }
    }
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::XPath(expr.into())
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css={}", s),
            Self::XPath(s) => write!(f, "xpath={}", s),
            Self::Id(s) => write!(f, "id={}", s),
            Self::LinkText(s) => write!(f, "link={}", s),
        }
    }
}

/// One live browser-automation connection
#[async_trait]
pub trait Browser: Send + Sync {
    /// Handle to a resolved element
    type Element: Clone + Send + Sync + fmt::Debug;

    /// Resolve a locator to an element
    async fn find(&self, locator: &Locator) -> Result<Self::Element>;

    async fn is_displayed(&self, element: &Self::Element) -> Result<bool>;

    async fn is_enabled(&self, element: &Self::Element) -> Result<bool>;

    /// Native click, subject to hit-testing
    async fn click(&self, element: &Self::Element) -> Result<()>;

    /// Script-dispatched click that bypasses hit-testing
    async fn script_click(&self, element: &Self::Element) -> Result<()>;

    async fn clear(&self, element: &Self::Element) -> Result<()>;

    async fn send_keys(&self, element: &Self::Element, text: &str) -> Result<()>;

    /// Rendered text of the element
    async fn text(&self, element: &Self::Element) -> Result<String>;

    async fn scroll_into_view(&self, element: &Self::Element) -> Result<()>;

    /// Run a script in the page and return its JSON result
    async fn execute(&self, script: &str) -> Result<serde_json::Value>;

    async fn goto(&self, url: &str) -> Result<()>;

    async fn maximize(&self) -> Result<()>;

    async fn set_window_size(&self, width: u32, height: u32) -> Result<()>;

    async fn set_page_load_timeout(&self, timeout: Duration) -> Result<()>;

    /// PNG bytes of the current viewport
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// End the browser session
    async fn close(&self) -> Result<()>;
}

/// Creates browser sessions
#[async_trait]
pub trait Launcher: Send + Sync {
    type Browser: Browser;

    /// Start a new browser. Any error here is treated as fatal setup failure
    /// by the lifecycle controller.
    async fn launch(&self, settings: &BrowserSettings) -> Result<Self::Browser>;
}

/// Exclusively owned browser session for one test attempt
///
/// `close` consumes the session, so a session can't be used after teardown.
pub struct Session<B: Browser> {
    id: String,
    browser: B,
    closed: bool,
}

impl<B: Browser> Session<B> {
    pub fn new(id: impl Into<String>, browser: B) -> Self {
        Self {
            id: id.into(),
            browser,
            closed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    /// Close the browser. The session is gone afterwards whether or not the
    /// driver reported an error.
    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        let result = self.browser.close().await;
        match &result {
            Ok(()) => tracing::info!(session = %self.id, "Browser session closed"),
            Err(e) => tracing::warn!(session = %self.id, "Error while closing browser: {}", e),
        }
        result
    }
}

impl<B: Browser> Drop for Session<B> {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!(session = %self.id, "Session dropped without being closed");
        }
    }
}

impl<B: Browser> fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Map a launch failure to the fatal setup error
pub(crate) fn fatal_setup(e: Error) -> Error {
    match e {
        Error::FatalSetup(_) => e,
        other => Error::FatalSetup(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_display_and_yaml_shape() {
        assert_eq!(Locator::css("#buy").to_string(), "css=#buy");
        assert_eq!(Locator::xpath("//a").to_string(), "xpath=//a");

        let parsed: Locator = serde_yaml::from_str("css: \".cart-count\"").unwrap();
        assert_eq!(parsed, Locator::css(".cart-count"));
        let parsed: Locator = serde_yaml::from_str("link_text: Orders").unwrap();
        assert_eq!(parsed, Locator::LinkText("Orders".into()));
        let parsed: Locator = serde_yaml::from_str("xpath: //button").unwrap();
        assert_eq!(parsed, Locator::xpath("//button"));
    }

    #[test]
    fn locator_nested_in_step_and_json() {
        #[derive(Deserialize)]
        struct Click {
            target: Locator,
        }
        let click: Click = serde_yaml::from_str("target: { css: \"#add-to-cart\" }").unwrap();
        assert_eq!(click.target, Locator::css("#add-to-cart"));

        let json = serde_json::to_value(Locator::id("qty")).unwrap();
        assert_eq!(json, serde_json::json!({ "id": "qty" }));
    }

    #[test]
    fn locator_needs_exactly_one_kind() {
        assert!(serde_yaml::from_str::<Locator>("css: a\nid: b").is_err());
        assert!(serde_yaml::from_str::<Locator>("{}").is_err());
        assert!(serde_yaml::from_str::<Locator>("name: q").is_err());
    }

    #[test]
    fn fatal_setup_wraps_other_errors() {
        let err = fatal_setup(Error::WebDriver("connection refused".into()));
        assert!(matches!(err, Error::FatalSetup(ref m) if m.contains("connection refused")));
    }
}
