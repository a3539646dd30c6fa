//! Run verification scenarios from a TOML config file
//!
//! Usage: cargo run -p scenario-harness --example run_scenarios -- [config.toml]
//!
//! Defaults to `crates/scenario-harness/scenarios/site.toml`. The JSON report
//! is printed and also written to `<artifact_dir>/report.json`.

use anyhow::Result;
use scenario_harness::config::Config;
use scenario_harness::reporter::{OutputFormat, Reporter};
use scenario_harness::runner::ScenarioRunner;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("crates/scenario-harness/scenarios/site.toml"));

    eprintln!("Loading config from: {}", config_path.display());
    let config = Config::from_file(&config_path)?.apply_env();
    config.validate()?;

    eprintln!("Starting suite: {}", config.harness.name);
    eprintln!("  Base URL: {}", config.harness.base_url);
    eprintln!("  Scenarios: {}", config.scenarios.len());
    eprintln!("  Artifacts: {}", config.harness.artifact_dir.display());

    let runner = ScenarioRunner::from_config(&config);
    let suite = runner.run_suite(&config).await;

    let reporter = Reporter::new(OutputFormat::JsonPretty);
    reporter.report(&suite)?;
    reporter.write_to_file(&suite, config.harness.artifact_dir.join("report.json"))?;

    Ok(if suite.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
