//! Configuration parsing for verification runs
//!
//! This module provides TOML-based configuration: where the application under
//! test lives, how to launch the browser, default wait budgets, evidence
//! settings and the scenarios to execute.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};
use crate::evidence::scenario_dir_name;
use crate::scenario::Scenario;
use crate::wait::WaitPolicy;

/// Main configuration structure loaded from TOML files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Run-level settings
    pub harness: HarnessSettings,
    /// Browser launch settings
    #[serde(default)]
    pub browser: BrowserSettings,
    /// Wait and assertion budgets
    #[serde(default)]
    pub timing: TimingSettings,
    /// Evidence capture settings
    #[serde(default)]
    pub evidence: EvidenceSettings,
    /// Scenarios to execute
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML is malformed
    /// - Required fields are missing
    ///
    /// # Example
    ///
    /// ```no_run
    /// use scenario_harness::config::Config;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = Config::from_file("verification.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    ///
    /// # Example
    ///
    /// ```
    /// use scenario_harness::config::Config;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let toml = r#"
    ///     [harness]
    ///     name = "Site verification"
    ///     base_url = "http://localhost:5173"
    ///
    ///     [[scenarios]]
    ///     name = "Homepage"
    ///     steps = []
    /// "#;
    /// let config = Config::from_str(toml)?;
    /// # Ok(())
    /// # }
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse TOML configuration")
    }

    /// Apply `SCENARIO_HARNESS_*` environment overrides
    pub fn apply_env(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SCENARIO_HARNESS_BASE_URL") {
            self.harness.base_url = url;
        }
        if let Some(chrome) = lookup("SCENARIO_HARNESS_CHROME") {
            self.browser.chrome_executable = Some(PathBuf::from(chrome));
        }
        if let Some(dir) = lookup("SCENARIO_HARNESS_ARTIFACT_DIR") {
            self.harness.artifact_dir = PathBuf::from(dir);
        }
        if lookup("SCENARIO_HARNESS_HEADFUL").is_some() {
            self.browser.headless = false;
        }
        self
    }

    /// Validate harness settings and every scenario definition
    pub fn validate(&self) -> HarnessResult<()> {
        if self.harness.max_sessions == 0 {
            return Err(HarnessError::Config("max_sessions must be at least 1".to_string()));
        }
        if self.timing.poll_interval.is_zero() {
            return Err(HarnessError::Config("poll_interval_ms must be positive".to_string()));
        }
        let mut folders: HashMap<String, &str> = HashMap::new();
        for scenario in &self.scenarios {
            let folder = scenario_dir_name(&scenario.name);
            if let Some(previous) = folders.insert(folder.clone(), &scenario.name) {
                return Err(HarnessError::Config(format!(
                    "scenarios {:?} and {:?} would share the artifact folder '{}'",
                    previous, scenario.name, folder
                )));
            }
            scenario
                .validate()
                .map_err(|source| HarnessError::InvalidScenario {
                    scenario: scenario.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Base URL for a scenario: its own override, else the harness default
    pub fn base_url_for<'a>(&'a self, scenario: &'a Scenario) -> &'a str {
        scenario
            .base_url
            .as_deref()
            .unwrap_or(&self.harness.base_url)
    }
}

/// Core run parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessSettings {
    /// Name of the verification suite
    pub name: String,
    /// Base URL for the application under test
    pub base_url: String,
    /// Root directory for screenshots and style snapshots (default: "verification")
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    /// Scenarios run concurrently, each on its own browser (default: 1)
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u32,
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("verification")
}

fn default_max_sessions() -> u32 {
    1
}

/// Browser launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Run without a window (default: true)
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Explicit Chrome binary; auto-detected when absent
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    /// Pass `--no-sandbox` (containers running as root)
    #[serde(default)]
    pub no_sandbox: bool,
    #[serde(default = "default_launch_timeout_ms")]
    pub launch_timeout_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            chrome_executable: None,
            window_width: default_window_width(),
            window_height: default_window_height(),
            no_sandbox: false,
            launch_timeout_ms: default_launch_timeout_ms(),
        }
    }
}

fn default_headless() -> bool {
    true
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    800
}

fn default_launch_timeout_ms() -> u64 {
    30_000
}

/// Wait and assertion budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Default timeout of `wait_for` steps and action settle waits
    #[serde(rename = "wait_timeout_ms", with = "duration_ms", default = "default_wait_timeout")]
    pub wait_timeout: Duration,
    /// Default polling budget of `assert_state` steps
    #[serde(rename = "assert_timeout_ms", with = "duration_ms", default = "default_assert_timeout")]
    pub assert_timeout: Duration,
    #[serde(rename = "poll_interval_ms", with = "duration_ms", default = "default_poll_interval")]
    pub poll_interval: Duration,
    /// Hard cap applied to every per-step timeout
    #[serde(rename = "max_timeout_ms", with = "duration_ms", default = "default_max_timeout")]
    pub max_timeout: Duration,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            wait_timeout: default_wait_timeout(),
            assert_timeout: default_assert_timeout(),
            poll_interval: default_poll_interval(),
            max_timeout: default_max_timeout(),
        }
    }
}

impl TimingSettings {
    /// Policy for a wait, honoring a per-step override and the hard cap
    pub fn wait_policy(&self, override_ms: Option<u64>) -> WaitPolicy {
        self.policy(self.wait_timeout, override_ms)
    }

    /// Policy for an assertion, honoring a per-step override and the hard cap
    pub fn assert_policy(&self, override_ms: Option<u64>) -> WaitPolicy {
        self.policy(self.assert_timeout, override_ms)
    }

    fn policy(&self, default: Duration, override_ms: Option<u64>) -> WaitPolicy {
        let timeout = override_ms.map(Duration::from_millis).unwrap_or(default);
        WaitPolicy::new(timeout.min(self.max_timeout), self.poll_interval)
    }
}

fn default_wait_timeout() -> Duration {
    Duration::from_millis(5_000)
}

fn default_assert_timeout() -> Duration {
    Duration::from_millis(5_000)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_max_timeout() -> Duration {
    Duration::from_millis(60_000)
}

/// Evidence capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSettings {
    /// Attach a page screenshot to every failed step (default: true)
    #[serde(default = "default_capture_on_failure")]
    pub capture_on_failure: bool,
}

impl Default for EvidenceSettings {
    fn default() -> Self {
        Self {
            capture_on_failure: default_capture_on_failure(),
        }
    }
}

fn default_capture_on_failure() -> bool {
    true
}

/// Serde module for serializing/deserializing Duration as milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
