//! WebDriver backend built on fantoccini
//!
//! Expects a driver (chromedriver, geckodriver, msedgedriver, safaridriver)
//! to already be listening at `webdriver_url`; provisioning driver binaries is
//! outside the harness.

use std::time::Duration;

use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::wd::TimeoutConfiguration;
use fantoccini::{Client, ClientBuilder};
use serde_json::{json, Map, Value};

use crate::common::config::{BrowserKind, BrowserSettings};
use crate::common::{Error, Result};

use super::{Browser, Launcher, Locator};

/// Map a fantoccini command error onto the harness error taxonomy
fn map_cmd_error(e: CmdError, target: &str) -> Error {
    if e.is_no_such_element() {
        return Error::NoSuchElement(target.to_string());
    }
    if e.is_stale_element_reference() {
        return Error::StaleElement(target.to_string());
    }
    if e.is_element_not_interactable() {
        return Error::NotInteractable(target.to_string());
    }
    let message = e.to_string();
    if message.to_lowercase().contains("element click intercepted") {
        Error::ClickIntercepted(target.to_string())
    } else {
        Error::WebDriver(message)
    }
}

fn describe(element: &Element) -> String {
    element_label(&element.element_id())
}

/// Report text for a resolved element; only the driver's id, never the client handle
fn element_label(id: &str) -> String {
    format!("element {}", id)
}

/// Build W3C capabilities for the configured browser
pub fn capabilities(settings: &BrowserSettings) -> Map<String, Value> {
    let mut caps = Map::new();
    match settings.browser {
        BrowserKind::Chrome => {
            let mut args = vec![
                "--disable-gpu".to_string(),
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ];
            if settings.headless {
                args.push("--headless=new".to_string());
            }
            caps.insert("browserName".to_string(), json!("chrome"));
            caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        }
        BrowserKind::Firefox => {
            let args: Vec<&str> = if settings.headless { vec!["--headless"] } else { vec![] };
            caps.insert("browserName".to_string(), json!("firefox"));
            caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
        }
        BrowserKind::Edge => {
            let args: Vec<&str> = if settings.headless { vec!["--headless"] } else { vec![] };
            caps.insert("browserName".to_string(), json!("MicrosoftEdge"));
            caps.insert("ms:edgeOptions".to_string(), json!({ "args": args }));
        }
        BrowserKind::Safari => {
            caps.insert("browserName".to_string(), json!("safari"));
        }
    }
    caps
}

/// Starts fantoccini sessions against a WebDriver server
#[derive(Debug, Default, Clone)]
pub struct WebDriverLauncher;

impl WebDriverLauncher {
    pub fn new() -> Self {
        Self
    }

    /// Check that the driver answers `GET /status` before asking for a session
    async fn check_status(url: &str) -> Result<()> {
        let status_url = format!("{}/status", url.trim_end_matches('/'));
        match reqwest::get(&status_url).await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(Error::FatalSetup(format!(
                "WebDriver at {} answered {}",
                url,
                resp.status()
            ))),
            Err(e) => Err(Error::FatalSetup(format!(
                "WebDriver not reachable at {}: {}",
                url, e
            ))),
        }
    }
}

#[async_trait]
impl Launcher for WebDriverLauncher {
    type Browser = WebDriverBrowser;

    async fn launch(&self, settings: &BrowserSettings) -> Result<WebDriverBrowser> {
        Self::check_status(&settings.webdriver_url).await?;

        tracing::info!(
            browser = %settings.browser,
            headless = settings.headless,
            "Connecting to WebDriver at {}",
            settings.webdriver_url
        );

        let client = ClientBuilder::native()
            .capabilities(capabilities(settings))
            .connect(&settings.webdriver_url)
            .await
            .map_err(|e| Error::FatalSetup(format!("{} session not created: {}", settings.browser, e)))?;

        tracing::info!("{} driver initialized", settings.browser);
        Ok(WebDriverBrowser { client })
    }
}

/// A live fantoccini client
pub struct WebDriverBrowser {
    client: Client,
}

#[async_trait]
impl Browser for WebDriverBrowser {
    type Element = Element;

    async fn find(&self, locator: &Locator) -> Result<Element> {
        let target = locator.to_string();
        let wd_locator = match locator {
            Locator::Css(s) => fantoccini::Locator::Css(s),
            Locator::XPath(s) => fantoccini::Locator::XPath(s),
            Locator::Id(s) => fantoccini::Locator::Id(s),
            Locator::LinkText(s) => fantoccini::Locator::LinkText(s),
        };
        self.client
            .find(wd_locator)
            .await
            .map_err(|e| map_cmd_error(e, &target))
    }

    async fn is_displayed(&self, element: &Element) -> Result<bool> {
        element
            .is_displayed()
            .await
            .map_err(|e| map_cmd_error(e, &describe(element)))
    }

    async fn is_enabled(&self, element: &Element) -> Result<bool> {
        element
            .is_enabled()
            .await
            .map_err(|e| map_cmd_error(e, &describe(element)))
    }

    async fn click(&self, element: &Element) -> Result<()> {
        element
            .click()
            .await
            .map_err(|e| map_cmd_error(e, &describe(element)))
    }

    async fn script_click(&self, element: &Element) -> Result<()> {
        let arg = serde_json::to_value(element)?;
        self.client
            .execute("arguments[0].click();", vec![arg])
            .await
            .map(|_| ())
            .map_err(|e| map_cmd_error(e, &describe(element)))
    }

    async fn clear(&self, element: &Element) -> Result<()> {
        element
            .clear()
            .await
            .map_err(|e| map_cmd_error(e, &describe(element)))
    }

    async fn send_keys(&self, element: &Element, text: &str) -> Result<()> {
        element
            .send_keys(text)
            .await
            .map_err(|e| map_cmd_error(e, &describe(element)))
    }

    async fn text(&self, element: &Element) -> Result<String> {
        element
            .text()
            .await
            .map_err(|e| map_cmd_error(e, &describe(element)))
    }

    async fn scroll_into_view(&self, element: &Element) -> Result<()> {
        let arg = serde_json::to_value(element)?;
        self.client
            .execute("arguments[0].scrollIntoView(true);", vec![arg])
            .await
            .map(|_| ())
            .map_err(|e| map_cmd_error(e, &describe(element)))
    }

    async fn execute(&self, script: &str) -> Result<Value> {
        self.client
            .execute(script, vec![])
            .await
            .map_err(|e| map_cmd_error(e, "script"))
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.client
            .goto(url)
            .await
            .map_err(|e| map_cmd_error(e, url))
    }

    async fn maximize(&self) -> Result<()> {
        self.client
            .maximize_window()
            .await
            .map_err(|e| map_cmd_error(e, "window"))
    }

    async fn set_window_size(&self, width: u32, height: u32) -> Result<()> {
        self.client
            .set_window_size(width, height)
            .await
            .map_err(|e| map_cmd_error(e, "window"))
    }

    async fn set_page_load_timeout(&self, timeout: Duration) -> Result<()> {
        self.client
            .update_timeouts(TimeoutConfiguration::new(None, Some(timeout), None))
            .await
            .map_err(|e| map_cmd_error(e, "timeouts"))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.client
            .screenshot()
            .await
            .map_err(|e| Error::ArtifactCapture(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        self.client
            .clone()
            .close()
            .await
            .map_err(|e| map_cmd_error(e, "session"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::WindowSize;
    use fantoccini::error::{ErrorStatus, WebDriver};

    fn settings(browser: BrowserKind, headless: bool) -> BrowserSettings {
        BrowserSettings {
            browser,
            headless,
            webdriver_url: browser.default_webdriver_url().to_string(),
            window: WindowSize::Maximize,
            page_load_timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn element_errors_name_the_element_id() {
        let label = element_label("f.3C1B2A.d.9F00.e.17");
        assert_eq!(label, "element f.3C1B2A.d.9F00.e.17");
        let intercepted = CmdError::Standard(WebDriver::new(
            ErrorStatus::ElementClickIntercepted,
            "element click intercepted: other element would receive the click",
        ));
        assert!(matches!(
            map_cmd_error(intercepted, &label),
            Error::ClickIntercepted(ref t) if t == "element f.3C1B2A.d.9F00.e.17"
        ));
    }

    #[test]
    fn driver_errors_map_to_kinds() {
        let stale = CmdError::Standard(WebDriver::new(
            ErrorStatus::StaleElementReference,
            "element is not attached to the page document",
        ));
        assert!(matches!(
            map_cmd_error(stale, "css=#buy"),
            Error::StaleElement(ref t) if t == "css=#buy"
        ));

        let hidden = CmdError::Standard(WebDriver::new(
            ErrorStatus::ElementNotInteractable,
            "element has zero size",
        ));
        assert!(matches!(map_cmd_error(hidden, "id=qty"), Error::NotInteractable(_)));

        let crashed = CmdError::Standard(WebDriver::new(
            ErrorStatus::UnknownError,
            "tab crashed",
        ));
        assert!(matches!(map_cmd_error(crashed, "id=qty"), Error::WebDriver(ref m) if m.contains("tab crashed")));
    }

    #[test]
    fn chrome_headless_capabilities() {
        let caps = capabilities(&settings(BrowserKind::Chrome, true));
        assert_eq!(caps["browserName"], "chrome");
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--headless=new"));
        assert!(args.iter().any(|a| a == "--no-sandbox"));
    }

    #[test]
    fn firefox_headed_capabilities() {
        let caps = capabilities(&settings(BrowserKind::Firefox, false));
        assert_eq!(caps["browserName"], "firefox");
        assert!(caps["moz:firefoxOptions"]["args"].as_array().unwrap().is_empty());
    }

    #[test]
    fn safari_has_no_options() {
        let caps = capabilities(&settings(BrowserKind::Safari, false));
        assert_eq!(caps.len(), 1);
    }

    #[tokio::test]
    async fn unreachable_driver_is_fatal() {
        let mut s = settings(BrowserKind::Chrome, true);
        s.webdriver_url = "http://127.0.0.1:9".to_string();
        let err = WebDriverLauncher::new().launch(&s).await.err().unwrap();
        assert!(matches!(err, Error::FatalSetup(_)));
    }
}
