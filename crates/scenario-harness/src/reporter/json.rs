//! JSON reporter

use anyhow::Result;
use serde::Serialize;

/// JSON format reporter
pub struct JsonReporter;

impl JsonReporter {
    /// Format a report (or suite report) as JSON
    ///
    /// # Arguments
    ///
    /// * `report` - Anything serializable, normally a `Report` or `SuiteReport`
    /// * `pretty` - Whether to pretty-print the JSON
    pub fn format<T: Serialize>(report: &T, pretty: bool) -> Result<String> {
        let output = if pretty {
            serde_json::to_string_pretty(report)?
        } else {
            serde_json::to_string(report)?
        };
        Ok(output)
    }
}
