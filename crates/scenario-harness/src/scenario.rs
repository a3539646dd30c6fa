//! Scenario definitions
//!
//! A [`Scenario`] is an ordered list of [`Step`]s plus metadata. Scenarios are
//! plain data: they deserialize from TOML or JSON and are never mutated by a
//! run.
//!
//! ```toml
//! name = "Subscribe flow"
//!
//! [[steps]]
//! type = "click"
//! locator = { by = "role", role = "link", name = "Subscribe" }
//! until = { condition = "visible", locator = { by = "label", text = "Name" } }
//!
//! [[steps]]
//! type = "assert_state"
//! locator = { by = "role", role = "heading", level = 1 }
//! subject = { read = "class_list" }
//! expected = { kind = "text", value = "text-red-600" }
//! comparison = "contains_token"
//! ```

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::assertion::Rgba;
use crate::error::ScenarioError;
use crate::locator::LocatorSpec;

pub use crate::assertion::{Comparison, ExpectedValue};
pub use crate::driver::Subject;
pub use crate::evidence::CaptureScope;
pub use crate::wait::WaitCondition;

fn default_blocking() -> bool {
    true
}

fn default_subject() -> Subject {
    Subject::Presence
}

/// One atomic action or check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Load a path relative to the scenario's base URL (or an absolute URL)
    Navigate {
        path: String,
        /// Settle condition; `document_ready` when absent
        #[serde(default)]
        until: Option<WaitCondition>,
        #[serde(default = "default_blocking")]
        blocking: bool,
    },
    Click {
        locator: LocatorSpec,
        #[serde(default)]
        until: Option<WaitCondition>,
        #[serde(default = "default_blocking")]
        blocking: bool,
    },
    /// Replace the value of a form control
    Fill {
        locator: LocatorSpec,
        text: String,
        #[serde(default)]
        until: Option<WaitCondition>,
        #[serde(default = "default_blocking")]
        blocking: bool,
    },
    ScrollIntoView {
        locator: LocatorSpec,
        #[serde(default = "default_blocking")]
        blocking: bool,
    },
    WaitFor {
        until: WaitCondition,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default = "default_blocking")]
        blocking: bool,
    },
    /// Sample `subject` from the first visible match and compare it
    AssertState {
        locator: LocatorSpec,
        #[serde(default = "default_subject")]
        subject: Subject,
        expected: ExpectedValue,
        comparison: Comparison,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default = "default_blocking")]
        blocking: bool,
    },
    Screenshot {
        label: String,
        #[serde(default)]
        scope: CaptureScope,
    },
    /// Record computed style values of an element as a JSON artifact
    StyleSnapshot {
        label: String,
        locator: LocatorSpec,
        properties: Vec<String>,
    },
    /// Evaluate `when` once and run `then` or `otherwise`
    Branch {
        when: WaitCondition,
        #[serde(default)]
        then: Vec<Step>,
        #[serde(default)]
        otherwise: Vec<Step>,
    },
}

impl Step {
    pub fn navigate(path: impl Into<String>) -> Self {
        Step::Navigate {
            path: path.into(),
            until: None,
            blocking: true,
        }
    }

    pub fn click(locator: LocatorSpec) -> Self {
        Step::Click {
            locator,
            until: None,
            blocking: true,
        }
    }

    pub fn fill(locator: LocatorSpec, text: impl Into<String>) -> Self {
        Step::Fill {
            locator,
            text: text.into(),
            until: None,
            blocking: true,
        }
    }

    pub fn scroll_into_view(locator: LocatorSpec) -> Self {
        Step::ScrollIntoView {
            locator,
            blocking: true,
        }
    }

    pub fn wait_for(until: WaitCondition) -> Self {
        Step::WaitFor {
            until,
            timeout_ms: None,
            blocking: true,
        }
    }

    pub fn assert_state(
        locator: LocatorSpec,
        subject: Subject,
        expected: ExpectedValue,
        comparison: Comparison,
    ) -> Self {
        Step::AssertState {
            locator,
            subject,
            expected,
            comparison,
            timeout_ms: None,
            blocking: true,
        }
    }

    pub fn screenshot(label: impl Into<String>, scope: CaptureScope) -> Self {
        Step::Screenshot {
            label: label.into(),
            scope,
        }
    }

    pub fn style_snapshot(label: impl Into<String>, locator: LocatorSpec, properties: &[&str]) -> Self {
        Step::StyleSnapshot {
            label: label.into(),
            locator,
            properties: properties.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn branch(when: WaitCondition, then: Vec<Step>, otherwise: Vec<Step>) -> Self {
        Step::Branch {
            when,
            then,
            otherwise,
        }
    }

    /// Set the settle condition of an action step
    pub fn until(mut self, condition: WaitCondition) -> Self {
        match &mut self {
            Step::Navigate { until, .. } | Step::Click { until, .. } | Step::Fill { until, .. } => {
                *until = Some(condition)
            }
            _ => {}
        }
        self
    }

    /// Override the wait/assert budget
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        match &mut self {
            Step::WaitFor { timeout_ms, .. } | Step::AssertState { timeout_ms, .. } => {
                *timeout_ms = Some(ms)
            }
            _ => {}
        }
        self
    }

    /// Mark the step non-blocking: its failure never aborts the run
    pub fn optional(mut self) -> Self {
        match &mut self {
            Step::Navigate { blocking, .. }
            | Step::Click { blocking, .. }
            | Step::Fill { blocking, .. }
            | Step::ScrollIntoView { blocking, .. }
            | Step::WaitFor { blocking, .. }
            | Step::AssertState { blocking, .. } => *blocking = false,
            _ => {}
        }
        self
    }

    /// Whether a `fail` from this step aborts the scenario.
    /// Evidence and branch steps never do.
    pub fn is_blocking(&self) -> bool {
        match self {
            Step::Navigate { blocking, .. }
            | Step::Click { blocking, .. }
            | Step::Fill { blocking, .. }
            | Step::ScrollIntoView { blocking, .. }
            | Step::WaitFor { blocking, .. }
            | Step::AssertState { blocking, .. } => *blocking,
            Step::Screenshot { .. } | Step::StyleSnapshot { .. } | Step::Branch { .. } => false,
        }
    }

    /// One-line human description used in reports and logs
    pub fn describe(&self) -> String {
        match self {
            Step::Navigate { path, .. } => format!("navigate {}", path),
            Step::Click { locator, .. } => format!("click {}", locator),
            Step::Fill { locator, text, .. } => format!("fill {} with {:?}", locator, text),
            Step::ScrollIntoView { locator, .. } => format!("scroll {} into view", locator),
            Step::WaitFor { until, .. } => format!("wait for {}", until),
            Step::AssertState {
                locator,
                subject,
                expected,
                comparison,
                ..
            } => format!(
                "assert {} {} {} {}",
                locator,
                subject_name(subject),
                comparison.name(),
                expected
            ),
            Step::Screenshot { label, .. } => format!("screenshot {:?}", label),
            Step::StyleSnapshot { label, locator, .. } => {
                format!("style snapshot {:?} of {}", label, locator)
            }
            Step::Branch { when, .. } => format!("branch on {}", when),
        }
    }
}

fn subject_name(subject: &Subject) -> String {
    match subject {
        Subject::Text => "text".to_string(),
        Subject::ClassList => "class_list".to_string(),
        Subject::Attribute { name } => format!("attribute {}", name),
        Subject::Style { property } => format!("style {}", property),
        Subject::Value => "value".to_string(),
        Subject::Presence => "presence".to_string(),
    }
}

/// An ordered verification run against one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Overrides the harness base URL for this scenario
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: None,
            steps: Vec::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Load a scenario from a `.toml` or `.json` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file: {}", path.display()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml(&content),
        }
    }

    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse TOML scenario")
    }

    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        serde_json::from_str(s).context("Failed to parse JSON scenario")
    }

    /// Check the definition without touching a browser.
    ///
    /// Step identifiers in errors are 1-based positions, with branch bodies
    /// addressed as `2.then.1` / `2.otherwise.1`.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.name.trim().is_empty() {
            return Err(ScenarioError::EmptyName);
        }
        validate_steps(&self.steps, "")
    }
}

fn validate_steps(steps: &[Step], prefix: &str) -> Result<(), ScenarioError> {
    for (i, step) in steps.iter().enumerate() {
        let id = format!("{}{}", prefix, i + 1);
        match step {
            Step::WaitFor {
                timeout_ms: Some(0),
                ..
            } => return Err(ScenarioError::ZeroTimeout { step: id }),
            Step::AssertState {
                expected,
                comparison,
                timeout_ms,
                ..
            } => {
                if *timeout_ms == Some(0) {
                    return Err(ScenarioError::ZeroTimeout { step: id });
                }
                validate_expectation(&id, expected, *comparison)?;
            }
            Step::Screenshot { label, .. } | Step::StyleSnapshot { label, .. }
                if label.trim().is_empty() =>
            {
                return Err(ScenarioError::EmptyLabel { step: id })
            }
            Step::Branch {
                then, otherwise, ..
            } => {
                validate_steps(then, &format!("{}.then.", id))?;
                validate_steps(otherwise, &format!("{}.otherwise.", id))?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_expectation(
    id: &str,
    expected: &ExpectedValue,
    comparison: Comparison,
) -> Result<(), ScenarioError> {
    if !comparison.accepts(expected) {
        return Err(ScenarioError::IncompatibleExpectation {
            step: id.to_string(),
            comparison: comparison.name().to_string(),
            expected: expected.kind().to_string(),
        });
    }
    match expected {
        ExpectedValue::Pattern { pattern } => {
            Regex::new(pattern).map_err(|e| ScenarioError::InvalidPattern {
                step: id.to_string(),
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        }
        ExpectedValue::Color { value, .. } if Rgba::parse(value).is_none() => {
            return Err(ScenarioError::InvalidColor {
                step: id.to_string(),
                value: value.clone(),
            });
        }
        _ => {}
    }
    Ok(())
}
