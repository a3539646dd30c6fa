//! Condition polling with a hard upper bound
//!
//! [`wait_for`] polls a check at `poll_interval` boundaries until it reports
//! [`ConditionState::Satisfied`], reports [`ConditionState::Failed`], or the
//! timeout elapses. Each individual check is itself bounded by the time left,
//! so a hung driver call cannot stretch a wait past its budget.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::driver::Subject;
use crate::error::DriverError;
use crate::locator::{self, LocatorSpec};
use crate::session::BrowserSession;

/// Timeout and poll interval for one wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitPolicy {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            // A zero interval would spin; one millisecond keeps polling bounded
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn from_millis(timeout_ms: u64, poll_interval_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(poll_interval_ms),
        )
    }
}

/// Result of a single condition check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionState {
    /// Not satisfied yet; carries what was observed for diagnostics
    Pending(Option<String>),
    Satisfied,
    /// Can never become satisfied (e.g. the session went away)
    Failed(String),
}

/// How a wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied {
        elapsed: Duration,
        attempts: u32,
    },
    TimedOut {
        elapsed: Duration,
        attempts: u32,
        last_observation: Option<String>,
    },
    Failed {
        elapsed: Duration,
        reason: String,
    },
}

impl WaitOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, WaitOutcome::Satisfied { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            WaitOutcome::Satisfied { elapsed, .. }
            | WaitOutcome::TimedOut { elapsed, .. }
            | WaitOutcome::Failed { elapsed, .. } => *elapsed,
        }
    }
}

/// Poll `check` until it is satisfied, permanently fails, or `policy.timeout` elapses.
///
/// Returns within `timeout + poll_interval` regardless of what `check` does.
pub async fn wait_for<F, Fut>(mut check: F, policy: WaitPolicy) -> WaitOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ConditionState>,
{
    let start = Instant::now();
    let deadline = start + policy.timeout;
    let mut attempts = 0u32;
    let mut last_observation = None;

    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());

        match tokio::time::timeout(remaining, check()).await {
            Ok(ConditionState::Satisfied) => {
                return WaitOutcome::Satisfied {
                    elapsed: start.elapsed(),
                    attempts,
                };
            }
            Ok(ConditionState::Failed(reason)) => {
                return WaitOutcome::Failed {
                    elapsed: start.elapsed(),
                    reason,
                };
            }
            Ok(ConditionState::Pending(observation)) => {
                trace!(attempts, ?observation, "condition pending");
                if observation.is_some() {
                    last_observation = observation;
                }
            }
            Err(_) => {
                last_observation = Some("condition check did not return before the deadline".to_string());
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return WaitOutcome::TimedOut {
                elapsed: start.elapsed(),
                attempts,
                last_observation,
            };
        }
        tokio::time::sleep(policy.poll_interval.min(deadline - now)).await;
    }
}

/// Asynchronous UI states a scenario can wait on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum WaitCondition {
    /// At least one match is visible
    Visible { locator: LocatorSpec },
    /// No match is visible (zero matches counts as hidden)
    Hidden { locator: LocatorSpec },
    /// At least one match exists, visible or not
    Attached { locator: LocatorSpec },
    /// The first match's class list contains `token`
    ClassContains { locator: LocatorSpec, token: String },
    /// The first match's class list does not contain `token`
    ClassAbsent { locator: LocatorSpec, token: String },
    /// The first visible match's text contains `text`
    TextContains { locator: LocatorSpec, text: String },
    /// The current URL contains `fragment`
    UrlContains { fragment: String },
    /// `document.readyState` is `complete`
    DocumentReady,
}

impl WaitCondition {
    /// Evaluate the condition once against the live page
    pub async fn check(&self, session: &BrowserSession) -> ConditionState {
        match self.observe(session).await {
            Ok(state) => state,
            Err(e) if e.is_transient() => ConditionState::Pending(Some(e.to_string())),
            Err(e) => ConditionState::Failed(e.to_string()),
        }
    }

    async fn observe(&self, session: &BrowserSession) -> Result<ConditionState, DriverError> {
        let state = match self {
            WaitCondition::Visible { locator } => {
                let matches = locator::resolve(session, locator).await?;
                if matches.iter().any(|h| h.visible) {
                    ConditionState::Satisfied
                } else {
                    ConditionState::Pending(Some(format!(
                        "{} matched {} element(s), none visible",
                        locator,
                        matches.len()
                    )))
                }
            }
            WaitCondition::Hidden { locator } => {
                if locator::exists_and_visible(session, locator).await? {
                    ConditionState::Pending(Some(format!("{} is still visible", locator)))
                } else {
                    ConditionState::Satisfied
                }
            }
            WaitCondition::Attached { locator } => {
                if locator::resolve(session, locator).await?.is_empty() {
                    ConditionState::Pending(Some(format!("{} matched nothing", locator)))
                } else {
                    ConditionState::Satisfied
                }
            }
            WaitCondition::ClassContains { locator, token } => {
                match class_tokens(session, locator).await? {
                    Some(classes) if has_token(&classes, token) => ConditionState::Satisfied,
                    Some(classes) => ConditionState::Pending(Some(format!("class=\"{}\"", classes))),
                    None => ConditionState::Pending(Some(format!("{} matched nothing", locator))),
                }
            }
            WaitCondition::ClassAbsent { locator, token } => {
                match class_tokens(session, locator).await? {
                    Some(classes) if has_token(&classes, token) => {
                        ConditionState::Pending(Some(format!("class=\"{}\"", classes)))
                    }
                    Some(_) => ConditionState::Satisfied,
                    None => ConditionState::Pending(Some(format!("{} matched nothing", locator))),
                }
            }
            WaitCondition::TextContains { locator, text } => {
                match locator::first_visible(session, locator).await? {
                    Some(handle) => {
                        let actual = session
                            .driver()
                            .read(&handle, &Subject::Text)
                            .await?
                            .unwrap_or_default();
                        if actual.contains(text.as_str()) {
                            ConditionState::Satisfied
                        } else {
                            ConditionState::Pending(Some(format!("text=\"{}\"", actual)))
                        }
                    }
                    None => ConditionState::Pending(Some(format!("{} not visible", locator))),
                }
            }
            WaitCondition::UrlContains { fragment } => {
                let url = session.driver().current_url().await?;
                if url.contains(fragment.as_str()) {
                    ConditionState::Satisfied
                } else {
                    ConditionState::Pending(Some(format!("url={}", url)))
                }
            }
            WaitCondition::DocumentReady => {
                let ready = session.driver().ready_state().await?;
                if ready == "complete" {
                    ConditionState::Satisfied
                } else {
                    ConditionState::Pending(Some(format!("readyState={}", ready)))
                }
            }
        };
        Ok(state)
    }
}

impl std::fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitCondition::Visible { locator } => write!(f, "{} visible", locator),
            WaitCondition::Hidden { locator } => write!(f, "{} hidden", locator),
            WaitCondition::Attached { locator } => write!(f, "{} attached", locator),
            WaitCondition::ClassContains { locator, token } => {
                write!(f, "{} has class {:?}", locator, token)
            }
            WaitCondition::ClassAbsent { locator, token } => {
                write!(f, "{} lacks class {:?}", locator, token)
            }
            WaitCondition::TextContains { locator, text } => {
                write!(f, "{} contains text {:?}", locator, text)
            }
            WaitCondition::UrlContains { fragment } => write!(f, "url contains {:?}", fragment),
            WaitCondition::DocumentReady => write!(f, "document ready"),
        }
    }
}

/// Class attribute of the first match (visible or not)
async fn class_tokens(
    session: &BrowserSession,
    locator: &LocatorSpec,
) -> Result<Option<String>, DriverError> {
    let matches = locator::resolve(session, locator).await?;
    let Some(handle) = matches.into_iter().next() else {
        return Ok(None);
    };
    let classes = session
        .driver()
        .read(&handle, &Subject::ClassList)
        .await?
        .unwrap_or_default();
    Ok(Some(classes))
}

/// Whether a space separated class list contains `token` as a whole word
pub fn has_token(classes: &str, token: &str) -> bool {
    classes.split_whitespace().any(|c| c == token)
}
