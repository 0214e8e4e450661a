//! Scenario file format
//!
//! A scenario is one UI test written as YAML:
//!
//! ```yaml
//! name: Add product to cart
//! description: Adding a product updates the cart badge
//! steps:
//!   - action: goto
//!     path: /products/42
//!   - action: click
//!     target: { css: "#add-to-cart" }
//!   - action: expect_text
//!     target: { css: ".cart-count" }
//!     equals: "1"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::browser::Locator;
use crate::common::{Error, Result};

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Name of the scenario; also its test id
    pub name: String,
    /// What the scenario verifies
    #[serde(default)]
    pub description: Option<String>,
    /// Skip the scenario without running it
    #[serde(default)]
    pub skip: Option<String>,
    /// The sequence of steps to execute
    pub steps: Vec<Step>,
}

/// A single step in a scenario
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    /// Navigate to a path relative to the base URL, or an absolute URL
    Goto { path: String },
    /// Click with native-then-script fallback
    Click { target: Locator },
    /// Clear the field and type text
    Type { target: Locator, text: String },
    /// Wait for the element to be visible
    WaitVisible {
        target: Locator,
        /// Overrides the configured explicit wait
        timeout_seconds: Option<u64>,
    },
    /// Wait until `document.readyState` is "complete"
    WaitPageLoad,
    /// Wait until jQuery reports no active requests
    WaitAjax,
    /// Scroll the element into view
    Scroll { target: Locator },
    /// Assert on the element's rendered text
    ExpectText {
        target: Locator,
        equals: Option<String>,
        contains: Option<String>,
        timeout_seconds: Option<u64>,
    },
    /// Assert on visibility without waiting
    ExpectVisible {
        target: Locator,
        #[serde(default = "default_true")]
        visible: bool,
    },
    /// Attach a screenshot to the report
    Screenshot { name: Option<String> },
    /// Add an info line to the report
    Log { message: String },
    /// Stop here and mark the test skipped
    Skip { reason: String },
}

fn default_true() -> bool {
    true
}

impl Step {
    /// Steps that check page content rather than act on it
    pub fn is_assertion(&self) -> bool {
        matches!(self, Self::ExpectText { .. } | Self::ExpectVisible { .. })
    }

    /// One-line description for logs and the report
    pub fn describe(&self) -> String {
        match self {
            Self::Goto { path } => format!("goto {}", path),
            Self::Click { target } => format!("click {}", target),
            Self::Type { target, text } => format!("type {:?} into {}", text, target),
            Self::WaitVisible { target, .. } => format!("wait for {} to be visible", target),
            Self::WaitPageLoad => "wait for page load".to_string(),
            Self::WaitAjax => "wait for ajax".to_string(),
            Self::Scroll { target } => format!("scroll to {}", target),
            Self::ExpectText {
                target,
                equals,
                contains,
                ..
            } => match (equals, contains) {
                (Some(e), _) => format!("expect {} text == {:?}", target, e),
                (None, Some(c)) => format!("expect {} text contains {:?}", target, c),
                (None, None) => format!("expect {} to have text", target),
            },
            Self::ExpectVisible { target, visible } => {
                if *visible {
                    format!("expect {} visible", target)
                } else {
                    format!("expect {} hidden", target)
                }
            }
            Self::Screenshot { name } => match name {
                Some(n) => format!("screenshot {}", n),
                None => "screenshot".to_string(),
            },
            Self::Log { message } => format!("log {:?}", message),
            Self::Skip { reason } => format!("skip: {}", reason),
        }
    }
}

impl Scenario {
    /// Parse YAML text
    pub fn parse(content: &str) -> Result<Self> {
        let scenario: Scenario = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse test scenario: {}", e)))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Load and parse a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("scenario name must not be empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(Error::Config(format!("scenario '{}' has no steps", self.name)));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if let Step::ExpectText {
                equals: Some(_),
                contains: Some(_),
                ..
            } = step
            {
                return Err(Error::Config(format!(
                    "step {} of '{}': use either 'equals' or 'contains', not both",
                    i + 1,
                    self.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CART: &str = r##"
name: Add to cart
description: Adding a product updates the badge
steps:
  - action: goto
    path: /products/42
  - action: click
    target: { css: "#add-to-cart" }
  - action: type
    target: { id: qty }
    text: "2"
  - action: wait_visible
    target: { xpath: "//div[@class='toast']" }
    timeout_seconds: 10
  - action: wait_ajax
  - action: expect_text
    target: { css: ".cart-count" }
    equals: "2"
  - action: expect_visible
    target: { css: ".spinner" }
    visible: false
  - action: screenshot
"##;

    #[test]
    fn parses_steps() {
        let scenario = Scenario::parse(CART).unwrap();
        assert_eq!(scenario.name, "Add to cart");
        assert_eq!(scenario.steps.len(), 8);
        assert_eq!(
            scenario.steps[1],
            Step::Click {
                target: Locator::css("#add-to-cart")
            }
        );
        assert_eq!(
            scenario.steps[3],
            Step::WaitVisible {
                target: Locator::xpath("//div[@class='toast']"),
                timeout_seconds: Some(10)
            }
        );
        assert_eq!(scenario.steps[4], Step::WaitAjax);
        assert!(matches!(
            scenario.steps[6],
            Step::ExpectVisible { visible: false, .. }
        ));
        assert_eq!(scenario.steps[7], Step::Screenshot { name: None });
    }

    #[test]
    fn rejects_empty_and_ambiguous_scenarios() {
        assert!(Scenario::parse("name: x\nsteps: []").is_err());
        let both = r#"
name: x
steps:
  - action: expect_text
    target: { css: a }
    equals: b
    contains: c
"#;
        let err = Scenario::parse(both).unwrap_err();
        assert!(err.to_string().contains("not both"));
    }

    #[test]
    fn rejects_unknown_actions() {
        let err = Scenario::parse("name: x\nsteps:\n  - action: hover\n    target: { css: a }")
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn describe_is_readable() {
        let step = Step::ExpectText {
            target: Locator::css(".total"),
            equals: None,
            contains: Some("$".into()),
            timeout_seconds: None,
        };
        assert_eq!(step.describe(), "expect css=.total text contains \"$\"");
    }
}
