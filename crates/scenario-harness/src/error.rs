//! Error types for the scenario harness
//!
//! Only [`HarnessError`] ever reaches the caller of a run. Everything that
//! happens after a session is open is folded into the [`Report`](crate::report::Report).

use thiserror::Error;

/// Errors raised by an automation driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Browser protocol error: {0}")]
    Protocol(String),

    #[error("Element is no longer attached: {0}")]
    Detached(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Browser session is closed")]
    Closed,
}

impl DriverError {
    /// Whether a polling loop may retry after this error.
    ///
    /// DOM queries race with navigations and re-renders; a detached element or
    /// a destroyed execution context is expected to clear on the next poll.
    pub fn is_transient(&self) -> bool {
        match self {
            DriverError::Detached(_) | DriverError::Script(_) => true,
            DriverError::Protocol(msg) => {
                msg.contains("context") || msg.contains("No node") || msg.contains("detached")
            }
            DriverError::Launch(_) | DriverError::Navigation { .. } | DriverError::Closed => false,
        }
    }
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Problems found while validating a scenario definition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("Scenario name must not be empty")]
    EmptyName,

    #[error("Step {step}: comparison '{comparison}' cannot use a '{expected}' expectation")]
    IncompatibleExpectation {
        step: String,
        comparison: String,
        expected: String,
    },

    #[error("Step {step}: invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        step: String,
        pattern: String,
        reason: String,
    },

    #[error("Step {step}: unparsable color '{value}'")]
    InvalidColor { step: String, value: String },

    #[error("Step {step}: timeout must be greater than zero")]
    ZeroTimeout { step: String },

    #[error("Step {step}: label must not be empty")]
    EmptyLabel { step: String },
}

/// Errors from evidence capture (never fatal to a scenario)
#[derive(Error, Debug)]
pub enum EvidenceError {
    #[error("Capture failed: {0}")]
    Capture(#[from] DriverError),

    #[error("Nothing to capture: {0}")]
    NoTarget(String),

    #[error("Failed to write artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize style snapshot: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that end a run before a report can be produced
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Browser session could not be started: {0}")]
    SessionLaunch(#[source] DriverError),

    #[error("Target {url} is unreachable: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: DriverError,
    },

    #[error("Invalid scenario '{scenario}': {source}")]
    InvalidScenario {
        scenario: String,
        #[source]
        source: ScenarioError,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DriverError::Detached("#name".into()).is_transient());
        assert!(DriverError::Protocol("Execution context was destroyed".into()).is_transient());
        assert!(!DriverError::Closed.is_transient());
        assert!(!DriverError::Launch("no chrome".into()).is_transient());
        assert!(!DriverError::Navigation {
            url: "http://localhost".into(),
            reason: "net::ERR_CONNECTION_REFUSED".into()
        }
        .is_transient());
    }

    #[test]
    fn test_harness_error_display() {
        let err = HarnessError::Unreachable {
            url: "http://localhost:5173".to_string(),
            source: DriverError::Navigation {
                url: "http://localhost:5173".to_string(),
                reason: "refused".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("http://localhost:5173"));
        assert!(msg.contains("refused"));
    }
}
