//! Scenario orchestration
//!
//! [`ScenarioRunner`] executes scenarios step by step against a fresh browser
//! session and folds every outcome into a [`Report`].
//!
//! # Execution model
//!
//! ```text
//! Pending ──► Running(1) ──► Running(2) ──► ... ──► Completed
//!                 │               │
//!                 └───────────────┴──► Aborted (blocking step failed)
//! ```
//!
//! Within one scenario every step runs to completion before the next one
//! starts. Actions (`navigate`, `click`, `fill`) first wait for their target to
//! be visible and are always followed by a settle wait, either the step's
//! `until` condition or `document_ready`, so no assertion ever runs directly
//! after an action. Branch bodies are pushed onto the front of a work queue;
//! the scenario's own step list is never touched.
//!
//! Only session-level problems (browser launch, unreachable target, invalid
//! definition) surface as errors. Everything after the session is open ends up
//! in the report.
//!
//! # Example
//!
//! ```no_run
//! use scenario_harness::{Config, ScenarioRunner};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::from_file("verification.toml")?.apply_env();
//! let runner = ScenarioRunner::from_config(&config);
//! let suite = runner.run_suite(&config).await;
//!
//! for report in &suite.reports {
//!     println!("{}: {} ({} warnings)", report.scenario, report.status, report.warnings().count());
//! }
//! # Ok(())
//! # }
//! ```

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::assertion::{assert_matches, Actual, Comparison, ExpectedValue};
use crate::config::{Config, EvidenceSettings, TimingSettings};
use crate::driver::{ChromeLauncher, Launcher, Subject};
use crate::error::{DriverError, HarnessError, HarnessResult};
use crate::evidence::{CaptureScope, EvidenceStore};
use crate::locator::{self, ElementHandle, LocatorSpec};
use crate::report::{FatalFailure, Report, RunState, Status, StepResult, SuiteReport};
use crate::scenario::{Scenario, Step};
use crate::session::BrowserSession;
use crate::wait::{wait_for, ConditionState, WaitCondition, WaitOutcome, WaitPolicy};

/// Label of the screenshot attached to failed steps
pub const FAILURE_LABEL: &str = "failure";

/// Runs scenarios, one browser session per scenario
pub struct ScenarioRunner {
    launcher: Arc<dyn Launcher>,
    timing: TimingSettings,
    evidence: EvidenceSettings,
    artifact_dir: PathBuf,
}

impl ScenarioRunner {
    /// Runner with default timing and evidence settings
    pub fn new(launcher: impl Launcher + 'static) -> Self {
        Self {
            launcher: Arc::new(launcher),
            timing: TimingSettings::default(),
            evidence: EvidenceSettings::default(),
            artifact_dir: PathBuf::from("verification"),
        }
    }

    /// Chrome-backed runner configured from `config`
    pub fn from_config(config: &Config) -> Self {
        Self::with_launcher(ChromeLauncher::new(config.browser.clone()), config)
    }

    /// Runner using `launcher` with the timing, evidence and artifact settings of `config`
    pub fn with_launcher(launcher: impl Launcher + 'static, config: &Config) -> Self {
        Self::new(launcher)
            .with_timing(config.timing)
            .with_evidence(config.evidence.clone())
            .with_artifact_dir(&config.harness.artifact_dir)
    }

    pub fn with_timing(mut self, timing: TimingSettings) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_evidence(mut self, evidence: EvidenceSettings) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.artifact_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn timing(&self) -> &TimingSettings {
        &self.timing
    }

    /// Run one scenario on a fresh session.
    ///
    /// The scenario's own `base_url` wins over `base_url`.
    ///
    /// # Errors
    ///
    /// Invalid definitions, launch failures and an unreachable base URL are
    /// returned as errors before any step runs. The session is closed exactly
    /// once on every path that opened it.
    #[instrument(skip(self, scenario, base_url), fields(scenario = %scenario.name))]
    pub async fn run(&self, scenario: &Scenario, base_url: &str) -> HarnessResult<Report> {
        scenario
            .validate()
            .map_err(|source| HarnessError::InvalidScenario {
                scenario: scenario.name.clone(),
                source,
            })?;

        let base_url = scenario.base_url.as_deref().unwrap_or(base_url);
        let started_at = Utc::now().to_rfc3339();
        let start = Instant::now();

        info!("Running scenario '{}' against {}", scenario.name, base_url);
        let session = BrowserSession::open(self.launcher.as_ref(), base_url).await?;
        let (state, steps) = self.execute(&session, scenario).await;
        session.close().await;

        let report = Report::new(
            scenario.name.clone(),
            base_url,
            state,
            steps,
            started_at,
            start.elapsed().as_millis() as u64,
        );

        if report.passed() {
            info!(
                "Scenario '{}' passed in {}ms ({} warnings)",
                report.scenario,
                report.duration_ms,
                report.count(Status::Warn)
            );
        } else {
            warn!(
                "Scenario '{}' failed with {} failing step(s)",
                report.scenario,
                report.count(Status::Fail)
            );
        }
        Ok(report)
    }

    /// Run every scenario of `config`, at most `max_sessions` at a time.
    ///
    /// Fatal errors are itemized per scenario; they never stop the suite.
    #[instrument(skip(self, config), fields(suite = %config.harness.name))]
    pub async fn run_suite(&self, config: &Config) -> SuiteReport {
        let started_at = Utc::now().to_rfc3339();
        let start = Instant::now();
        let max_sessions = config.harness.max_sessions.max(1) as usize;

        info!(
            "Starting suite '{}' with {} scenarios",
            config.harness.name,
            config.scenarios.len()
        );

        let outcomes: Vec<(String, HarnessResult<Report>)> = stream::iter(config.scenarios.iter())
            .map(|scenario| async move {
                let result = self.run(scenario, config.base_url_for(scenario)).await;
                (scenario.name.clone(), result)
            })
            .buffered(max_sessions)
            .collect()
            .await;

        let mut reports = Vec::new();
        let mut fatal = Vec::new();
        for (scenario, outcome) in outcomes {
            match outcome {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!("Scenario '{}' did not run: {}", scenario, e);
                    fatal.push(FatalFailure {
                        scenario,
                        error: e.to_string(),
                    });
                }
            }
        }

        let suite = SuiteReport::new(
            config.harness.name.clone(),
            reports,
            fatal,
            started_at,
            start.elapsed().as_millis() as u64,
        );
        info!(
            "Suite '{}' finished in {}ms: {}",
            suite.name,
            suite.duration_ms,
            if suite.passed { "passed" } else { "failed" }
        );
        suite
    }

    /// Drive the state machine over the scenario's steps
    async fn execute(&self, session: &BrowserSession, scenario: &Scenario) -> (RunState, Vec<StepResult>) {
        let store = EvidenceStore::new(&self.artifact_dir, &scenario.name);
        let mut queue: VecDeque<&Step> = scenario.steps.iter().collect();
        let mut results = Vec::new();
        let mut ordinal = 0;

        while let Some(step) = queue.pop_front() {
            ordinal += 1;
            let state = RunState::Running { step: ordinal };
            debug!(?state, "{}", step.describe());
            let started = Instant::now();

            let mut result = match step {
                Step::Branch {
                    when,
                    then,
                    otherwise,
                } => {
                    let budget = self.timing.wait_policy(None).timeout;
                    let observed = tokio::time::timeout(budget, when.check(session))
                        .await
                        .unwrap_or_else(|_| {
                            ConditionState::Pending(Some(format!(
                                "no answer within {}ms",
                                budget.as_millis()
                            )))
                        });
                    if let ConditionState::Pending(Some(reason)) | ConditionState::Failed(reason) =
                        &observed
                    {
                        debug!("Branch condition {} not met: {}", when, reason);
                    }
                    let taken = observed == ConditionState::Satisfied;
                    let body = if taken { then } else { otherwise };
                    for inner in body.iter().rev() {
                        queue.push_front(inner);
                    }
                    StepResult::pass(format!(
                        "{} -> {} ({} step(s))",
                        when,
                        if taken { "then" } else { "otherwise" },
                        body.len()
                    ))
                }
                other => self.execute_step(session, &store, ordinal, other).await,
            };

            result.index = ordinal;
            result.step = step.describe();
            result.elapsed_ms = started.elapsed().as_millis() as u64;

            if result.status == Status::Fail && self.evidence.capture_on_failure {
                match store
                    .capture(session, ordinal, FAILURE_LABEL, &CaptureScope::Page)
                    .await
                {
                    Ok(artifact) => result.artifacts.push(artifact),
                    Err(e) => warn!("Failure screenshot for step {} not captured: {}", ordinal, e),
                }
            }

            match result.status {
                Status::Pass => info!("Step {} passed: {}", ordinal, result.step),
                Status::Warn => warn!("Step {} warning: {}", ordinal, result.message),
                Status::Fail => warn!("Step {} failed: {}", ordinal, result.message),
            }

            let abort = result.status == Status::Fail && step.is_blocking();
            results.push(result);
            if abort {
                warn!("Blocking step {} failed, aborting scenario", ordinal);
                return (RunState::Aborted { step: ordinal }, results);
            }
        }

        (RunState::Completed, results)
    }

    #[instrument(skip(self, session, store, step), fields(step = ordinal))]
    async fn execute_step(
        &self,
        session: &BrowserSession,
        store: &EvidenceStore,
        ordinal: usize,
        step: &Step,
    ) -> StepResult {
        match step {
            Step::Navigate {
                path,
                until,
                blocking,
            } => {
                if let Err(e) = session.navigate(path).await {
                    return driver_failure(e);
                }
                self.settle(session, until.as_ref(), *blocking, format!("loaded {}", path))
                    .await
            }

            Step::Click {
                locator,
                until,
                blocking,
            } => {
                let target = match self.actionable(session, locator, *blocking).await {
                    Ok(target) => target,
                    Err(result) => return result,
                };
                if let Err(e) = session.driver().click(&target).await {
                    return driver_failure(e);
                }
                self.settle(session, until.as_ref(), *blocking, format!("clicked {}", locator))
                    .await
            }

            Step::Fill {
                locator,
                text,
                until,
                blocking,
            } => {
                let target = match self.actionable(session, locator, *blocking).await {
                    Ok(target) => target,
                    Err(result) => return result,
                };
                if let Err(e) = session.driver().fill(&target, text).await {
                    return driver_failure(e);
                }
                self.settle(session, until.as_ref(), *blocking, format!("filled {}", locator))
                    .await
            }

            Step::ScrollIntoView { locator, blocking } => {
                let target = match self.actionable(session, locator, *blocking).await {
                    Ok(target) => target,
                    Err(result) => return result,
                };
                match session.driver().scroll_into_view(&target).await {
                    Ok(()) => StepResult::pass(format!("scrolled {} into view", locator)),
                    Err(e) => driver_failure(e),
                }
            }

            Step::WaitFor {
                until,
                timeout_ms,
                blocking,
            } => {
                let policy = self.timing.wait_policy(*timeout_ms);
                let outcome = wait_for(|| until.check(session), policy).await;
                classify_wait(until, outcome, *blocking, format!("{}", until))
            }

            Step::AssertState {
                locator,
                subject,
                expected,
                comparison,
                timeout_ms,
                blocking,
            } => {
                let policy = self.timing.assert_policy(*timeout_ms);
                self.assert_state(session, locator, subject, expected, *comparison, policy, *blocking)
                    .await
            }

            Step::Screenshot { label, scope } => {
                match store.capture(session, ordinal, label, scope).await {
                    Ok(artifact) => StepResult::pass(format!("captured {}", artifact.path.display()))
                        .with_artifact(artifact),
                    Err(e) => StepResult::warn(format!("screenshot {:?} not captured: {}", label, e)),
                }
            }

            Step::StyleSnapshot {
                label,
                locator,
                properties,
            } => match store
                .snapshot_styles(session, ordinal, label, locator, properties)
                .await
            {
                Ok(artifact) => StepResult::pass(format!("recorded {}", artifact.path.display()))
                    .with_artifact(artifact),
                Err(e) => StepResult::warn(format!("style snapshot {:?} not captured: {}", label, e)),
            },

            // Expanded by the work queue in `execute`
            Step::Branch { .. } => StepResult::pass("branch"),
        }
    }

    /// Wait until `locator` has a visible match and return it
    async fn actionable(
        &self,
        session: &BrowserSession,
        locator: &LocatorSpec,
        blocking: bool,
    ) -> Result<ElementHandle, StepResult> {
        let condition = WaitCondition::Visible {
            locator: locator.clone(),
        };
        let outcome = wait_for(|| condition.check(session), self.timing.wait_policy(None)).await;
        if !outcome.is_satisfied() {
            return Err(classify_wait(
                &condition,
                outcome,
                blocking,
                format!("{} not found", locator),
            ));
        }
        match locator::first_visible(session, locator).await {
            Ok(Some(target)) => Ok(target),
            Ok(None) => Err(unmet(blocking, format!("{} disappeared before the action", locator))),
            Err(e) => Err(driver_failure(e)),
        }
    }

    /// Post-action wait: the step's condition or `document_ready`
    async fn settle(
        &self,
        session: &BrowserSession,
        until: Option<&WaitCondition>,
        blocking: bool,
        action: String,
    ) -> StepResult {
        let condition = until.cloned().unwrap_or(WaitCondition::DocumentReady);
        let outcome = wait_for(|| condition.check(session), self.timing.wait_policy(None)).await;
        classify_wait(&condition, outcome, blocking, action)
    }

    /// Poll the comparison until it passes or the budget runs out; the last
    /// observation decides the result
    #[allow(clippy::too_many_arguments)]
    async fn assert_state(
        &self,
        session: &BrowserSession,
        locator: &LocatorSpec,
        subject: &Subject,
        expected: &ExpectedValue,
        comparison: Comparison,
        policy: WaitPolicy,
        blocking: bool,
    ) -> StepResult {
        let last: Mutex<Option<(Actual, StepResult)>> = Mutex::new(None);
        let last_ref = &last;

        let outcome = wait_for(
            move || async move {
                match sample(session, locator, subject, comparison).await {
                    Ok(actual) => {
                        let result = assert_matches(&actual, expected, comparison);
                        let state = if result.status == Status::Pass {
                            ConditionState::Satisfied
                        } else {
                            ConditionState::Pending(result.actual.clone())
                        };
                        *last_ref.lock().unwrap_or_else(|e| e.into_inner()) = Some((actual, result));
                        state
                    }
                    Err(e) if e.is_transient() => ConditionState::Pending(Some(e.to_string())),
                    Err(e) => ConditionState::Failed(e.to_string()),
                }
            },
            policy,
        )
        .await;

        let last = last.into_inner().unwrap_or_else(|e| e.into_inner());
        match (outcome, last) {
            (WaitOutcome::Failed { reason, .. }, _) => StepResult::fail(reason),
            (_, None) => unmet(
                blocking,
                format!("{} could not be sampled within {}ms", locator, policy.timeout.as_millis()),
            ),
            (_, Some((actual, result))) => {
                if !actual.present && result.status != Status::Pass {
                    let message = format!(
                        "{} not found within {}ms",
                        locator,
                        policy.timeout.as_millis()
                    );
                    StepResult {
                        status: if blocking { Status::Fail } else { Status::Warn },
                        message,
                        ..result
                    }
                } else {
                    result
                }
            }
        }
    }
}

/// Observe the first visible match (or the first match) of `locator`
async fn sample(
    session: &BrowserSession,
    locator: &LocatorSpec,
    subject: &Subject,
    comparison: Comparison,
) -> Result<Actual, DriverError> {
    let matches = locator::resolve(session, locator).await?;
    let Some(target) = matches.iter().find(|h| h.visible).or_else(|| matches.first()) else {
        return Ok(Actual::missing());
    };
    let value = if comparison.is_structural() || *subject == Subject::Presence {
        None
    } else {
        session.driver().read(target, subject).await?
    };
    Ok(Actual::sampled(target.visible, value))
}

/// Map a wait outcome onto a step result
fn classify_wait(condition: &WaitCondition, outcome: WaitOutcome, blocking: bool, what: String) -> StepResult {
    match outcome {
        WaitOutcome::Satisfied { elapsed, .. } => StepResult::pass(format!(
            "{}; {} after {}ms",
            what,
            condition,
            elapsed.as_millis()
        )),
        WaitOutcome::TimedOut {
            elapsed,
            last_observation,
            ..
        } => unmet(
            blocking,
            format!("{}: timed out after {}ms waiting for {}", what, elapsed.as_millis(), condition),
        )
        .with_values(condition.to_string(), last_observation),
        WaitOutcome::Failed { reason, .. } => {
            StepResult::fail(format!("{}: {}", what, reason)).with_values(condition.to_string(), None)
        }
    }
}

/// A condition that never held: `fail` on blocking steps, `warn` otherwise
fn unmet(blocking: bool, message: String) -> StepResult {
    if blocking {
        StepResult::fail(message)
    } else {
        StepResult::warn(message)
    }
}

fn driver_failure(e: DriverError) -> StepResult {
    StepResult::fail(e.to_string())
}
