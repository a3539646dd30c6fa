//! Scenario-driven UI verification harness
//!
//! This crate drives a real browser through declarative scenarios (navigate,
//! click, fill, wait, assert, capture) against a running web application and
//! produces an itemized report with screenshot evidence.
//!
//! # Features
//!
//! - **Accessible locators**: find elements by role, label, attribute, CSS or text
//! - **Bounded waits**: every condition resolves or times out, never hangs
//! - **Polling assertions**: text, tokens, regex, color (with tolerance), presence
//! - **Evidence**: screenshots and computed-style snapshots tagged by scenario and step
//! - **Soft and hard failures**: `warn` for cosmetic drift, `fail` aborts on blocking steps
//! - **Scripted driver**: an in-memory page model for offline runs and tests
//!
//! # Example
//!
//! ```no_run
//! use scenario_harness::{Config, ScenarioRunner, reporter::{OutputFormat, Reporter}};
//!
//! # async fn example() -> anyhow::Result<()> {
//! // Load configuration
//! let config = Config::from_file("verification.toml")?.apply_env();
//! config.validate()?;
//!
//! // Run every scenario against Chrome
//! let runner = ScenarioRunner::from_config(&config);
//! let suite = runner.run_suite(&config).await;
//!
//! // Report results
//! Reporter::new(OutputFormat::JsonPretty).report(&suite)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! Suites are configured using TOML files:
//!
//! ```toml
//! [harness]
//! name = "Site verification"
//! base_url = "http://localhost:5173"
//!
//! [timing]
//! wait_timeout_ms = 5000
//!
//! [[scenarios]]
//! name = "Dark mode toggle"
//! steps = [
//!     { type = "navigate", path = "/" },
//!     { type = "click", locator = { by = "label", text = "Toggle dark mode" }, until = { condition = "class_contains", locator = { by = "css", selector = "html" }, token = "dark" } },
//!     { type = "screenshot", label = "dark" },
//! ]
//! ```

pub mod assertion;
pub mod config;
pub mod driver;
pub mod error;
pub mod evidence;
pub mod locator;
pub mod report;
pub mod reporter;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod wait;

// Re-export main types for convenience
pub use config::Config;
pub use driver::{ChromeLauncher, Driver, Launcher, MockLauncher};
pub use error::{DriverError, HarnessError, HarnessResult, ScenarioError};
pub use locator::LocatorSpec;
pub use report::{Report, RunState, Status, StepResult, SuiteReport};
pub use reporter::{OutputFormat, Reporter};
pub use runner::ScenarioRunner;
pub use scenario::{Comparison, ExpectedValue, Scenario, Step, Subject, WaitCondition};
pub use session::BrowserSession;
