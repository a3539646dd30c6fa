//! Report output
//!
//! Serializes [`Report`]s and [`SuiteReport`]s for CI pipelines and for the
//! `verification/` directory next to the captured evidence.
//!
//! # Example
//!
//! ```no_run
//! use scenario_harness::reporter::{OutputFormat, Reporter};
//! use scenario_harness::SuiteReport;
//!
//! # fn example(suite: SuiteReport) -> anyhow::Result<()> {
//! Reporter::new(OutputFormat::JsonPretty).report(&suite)?;
//!
//! // Or write to a file
//! Reporter::new(OutputFormat::Json).write_to_file(&suite, "verification/report.json")?;
//! # Ok(())
//! # }
//! ```

mod json;

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

pub use json::JsonReporter;

/// Output format for reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Single-line JSON
    Json,
    /// Pretty-printed JSON
    #[default]
    JsonPretty,
}

/// Writes reports in the configured format
pub struct Reporter {
    format: OutputFormat,
}

impl Reporter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Report to stdout
    pub fn report<T: Serialize>(&self, report: &T) -> Result<()> {
        let output = self.format(report)?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", output)?;
        stdout.flush()?;
        Ok(())
    }

    /// Write to `path`, creating parent directories as needed
    pub fn write_to_file<T: Serialize, P: AsRef<Path>>(&self, report: &T, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let output = self.format(report)?;
        fs::write(path, output).with_context(|| format!("Failed to write report: {}", path.display()))?;
        Ok(())
    }

    pub fn format<T: Serialize>(&self, report: &T) -> Result<String> {
        match self.format {
            OutputFormat::Json => JsonReporter::format(report, false),
            OutputFormat::JsonPretty => JsonReporter::format(report, true),
        }
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(OutputFormat::default())
    }
}
