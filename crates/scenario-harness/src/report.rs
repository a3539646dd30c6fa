//! Step results and run reports

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::evidence::ArtifactRef;

/// Outcome class of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pass,
    /// Recorded discrepancy that does not fail the run
    Warn,
    Fail,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Pass => "pass",
            Status::Warn => "warn",
            Status::Fail => "fail",
        };
        f.write_str(s)
    }
}

/// Orchestrator state machine
///
/// `Pending -> Running(0) -> ... -> Running(n) -> Completed | Aborted`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running { step: usize },
    Completed,
    /// A blocking step failed at `step`; later steps were skipped
    Aborted { step: usize },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted { .. })
    }
}

/// Result of one executed step. Immutable once pushed into a [`Report`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Execution ordinal within the run (branch bodies included)
    pub index: usize,
    /// Short description of the step
    pub step: String,
    pub status: Status,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactRef>,
    pub elapsed_ms: u64,
}

impl StepResult {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            index: 0,
            step: String::new(),
            status,
            message: message.into(),
            expected: None,
            actual: None,
            artifacts: Vec::new(),
            elapsed_ms: 0,
        }
    }

    pub fn pass(message: impl Into<String>) -> Self {
        Self::new(Status::Pass, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(Status::Warn, message)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(Status::Fail, message)
    }

    pub fn with_values(mut self, expected: impl Into<String>, actual: Option<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = actual;
        self
    }

    pub fn with_artifact(mut self, artifact: ArtifactRef) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// Itemized outcome of one scenario run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub scenario: String,
    pub base_url: String,
    /// Terminal state: `completed` or `aborted`
    pub state: RunState,
    /// `fail` iff any step failed; warnings alone still pass
    pub status: Status,
    pub steps: Vec<StepResult>,
    /// RFC 3339 start time
    pub started_at: String,
    pub duration_ms: u64,
}

impl Report {
    pub fn new(
        scenario: impl Into<String>,
        base_url: impl Into<String>,
        state: RunState,
        steps: Vec<StepResult>,
        started_at: String,
        duration_ms: u64,
    ) -> Self {
        let status = Self::aggregate(&steps);
        Self {
            scenario: scenario.into(),
            base_url: base_url.into(),
            state,
            status,
            steps,
            started_at,
            duration_ms,
        }
    }

    pub fn aggregate(steps: &[StepResult]) -> Status {
        if steps.iter().any(|s| s.status == Status::Fail) {
            Status::Fail
        } else {
            Status::Pass
        }
    }

    pub fn passed(&self) -> bool {
        self.status == Status::Pass
    }

    pub fn count(&self, status: Status) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| s.status == Status::Fail)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| s.status == Status::Warn)
    }
}

/// A scenario that never produced a report (launch failure, unreachable
/// target or invalid definition)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalFailure {
    pub scenario: String,
    pub error: String,
}

/// Outcome of every scenario in a configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub name: String,
    pub reports: Vec<Report>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fatal: Vec<FatalFailure>,
    pub passed: bool,
    pub started_at: String,
    pub duration_ms: u64,
}

impl SuiteReport {
    pub fn new(
        name: impl Into<String>,
        reports: Vec<Report>,
        fatal: Vec<FatalFailure>,
        started_at: String,
        duration_ms: u64,
    ) -> Self {
        let passed = fatal.is_empty() && reports.iter().all(Report::passed);
        Self {
            name: name.into(),
            reports,
            fatal,
            passed,
            started_at,
            duration_ms,
        }
    }
}
