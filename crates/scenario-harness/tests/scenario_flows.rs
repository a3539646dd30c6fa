//! End-to-end scenario runs over the scripted mock driver
//!
//! These exercise the orchestrator, waits, assertions and evidence capture
//! without a browser.
//!
//! Run with: cargo test -p scenario-harness --test scenario_flows

#[path = "common/site.rs"]
mod site;

use pretty_assertions::assert_eq;
use scenario_harness::config::{EvidenceSettings, TimingSettings};
use scenario_harness::driver::MockLauncher;
use scenario_harness::evidence::{scenario_dir_name, ArtifactKind, CaptureScope};
use scenario_harness::{
    Comparison, Config, ExpectedValue, HarnessError, LocatorSpec, RunState, Scenario,
    ScenarioRunner, Status, Step, Subject, WaitCondition,
};
use site::BASE_URL;
use std::time::{Duration, Instant};

fn root() -> LocatorSpec {
    LocatorSpec::css("html")
}

fn toggle() -> LocatorSpec {
    LocatorSpec::label("Toggle dark mode")
}

fn heading_color(value: &str) -> Step {
    Step::assert_state(
        LocatorSpec::heading(1),
        Subject::Style {
            property: "color".to_string(),
        },
        ExpectedValue::color(value),
        Comparison::Color,
    )
}

fn dark_mode_scenario() -> Scenario {
    Scenario::new("Dark mode toggle")
        .step(Step::navigate("/"))
        .step(Step::click(toggle()).until(WaitCondition::ClassContains {
            locator: root(),
            token: "dark".to_string(),
        }))
        .step(Step::assert_state(
            root(),
            Subject::ClassList,
            ExpectedValue::text("dark"),
            Comparison::ContainsToken,
        ))
        .step(heading_color("rgb(239, 68, 68)"))
        .step(Step::screenshot("dark", CaptureScope::Page))
        .step(Step::style_snapshot("heading dark", LocatorSpec::heading(1), &["color"]))
        .step(Step::click(toggle()).until(WaitCondition::ClassAbsent {
            locator: root(),
            token: "dark".to_string(),
        }))
        .step(heading_color("#000000"))
        .step(Step::screenshot("light", CaptureScope::FullPage))
}

fn statuses(report: &scenario_harness::Report) -> Vec<Status> {
    report.steps.iter().map(|s| s.status).collect()
}

#[tokio::test]
async fn test_dark_mode_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let (runner, probe) = site::runner(site::site(), tmp.path());

    let report = runner.run(&dark_mode_scenario(), BASE_URL).await.unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(statuses(&report), vec![Status::Pass; 9], "{:#?}", report.steps);
    assert!(report.passed());

    let dark = &report.steps[4].artifacts[0];
    assert_eq!(dark.kind, ArtifactKind::Screenshot);
    assert!(dark.path.ends_with(format!("{}/step05_dark.png", scenario_dir_name("Dark mode toggle"))));
    assert!(dark.path.exists());

    let snapshot = std::fs::read_to_string(&report.steps[5].artifacts[0].path).unwrap();
    assert!(snapshot.contains("rgb(239, 68, 68)"));

    assert_eq!(probe.launches(), 1);
    assert_eq!(probe.closes(), 1);
}

#[tokio::test]
async fn test_subscribe_round_trip_completes() {
    let tmp = tempfile::tempdir().unwrap();
    let (runner, _) = site::runner(site::site(), tmp.path());

    let home = WaitCondition::Visible {
        locator: LocatorSpec::css("header#home"),
    };
    let scenario = Scenario::new("Subscribe")
        .step(Step::navigate("/").until(home.clone()))
        .step(
            Step::click(LocatorSpec::role("link", "Subscribe")).until(WaitCondition::Visible {
                locator: LocatorSpec::role("heading", "Subscribe to my Newsletter"),
            }),
        )
        .step(Step::screenshot("subscribe form", CaptureScope::Page))
        .step(Step::fill(LocatorSpec::css("input#name"), "Test User"))
        .step(Step::fill(LocatorSpec::label("Email"), "test@example.com"))
        .step(Step::assert_state(
            LocatorSpec::css("input#email"),
            Subject::Value,
            ExpectedValue::text("test@example.com"),
            Comparison::Exact,
        ))
        .step(
            Step::click(LocatorSpec::role("button", "Subscribe")).until(WaitCondition::Visible {
                locator: LocatorSpec::role("heading", "Thank You!"),
            }),
        )
        .step(Step::screenshot("subscribe success", CaptureScope::Page))
        .step(Step::click(LocatorSpec::text("Return to Home")).until(home))
        .step(Step::assert_state(
            LocatorSpec::css("header#home"),
            Subject::Presence,
            ExpectedValue::exists(true),
            Comparison::Visibility,
        ));

    let report = runner.run(&scenario, BASE_URL).await.unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert!(report.passed(), "{:#?}", report.steps);
    assert_eq!(report.count(Status::Pass), 10);
    assert_eq!(
        report.steps.iter().map(|s| s.index).collect::<Vec<_>>(),
        (1..=10).collect::<Vec<_>>()
    );
    assert!(report.steps[7].artifacts[0]
        .path
        .ends_with(format!("{}/step08_subscribe-success.png", scenario_dir_name("Subscribe"))));
}

#[tokio::test]
async fn test_subscribe_flow_from_toml() {
    let tmp = tempfile::tempdir().unwrap();
    let (runner, _) = site::runner(site::site(), tmp.path());

    let scenario = Scenario::from_toml(
        r##"
        name = "Subscribe (toml)"

        [[steps]]
        type = "navigate"
        path = "/subscribe"

        [[steps]]
        type = "fill"
        locator = { by = "label", text = "Name" }
        text = "Grace"

        [[steps]]
        type = "click"
        locator = { by = "role", role = "button", name = "Subscribe" }
        until = { condition = "text_contains", locator = { by = "role", role = "heading" }, text = "Thank You" }

        [[steps]]
        type = "assert_state"
        locator = { by = "text", text = "Return to Home", exact = true }
        expected = { kind = "exists", value = true }
        comparison = "visibility"
        "##,
    )
    .unwrap();

    let report = runner.run(&scenario, BASE_URL).await.unwrap();
    assert!(report.passed(), "{:#?}", report.steps);
    assert_eq!(report.state, RunState::Completed);
}

#[tokio::test]
async fn test_heading_token_regression_fails_with_values() {
    let tmp = tempfile::tempdir().unwrap();
    let scenario = Scenario::new("Heading")
        .step(Step::navigate("/"))
        .step(Step::assert_state(
            LocatorSpec::heading(1),
            Subject::ClassList,
            ExpectedValue::text("text-red-600"),
            Comparison::ContainsToken,
        ))
        .step(Step::screenshot("never taken", CaptureScope::Page));

    let (runner, _) = site::runner(site::site(), tmp.path());
    let passing = runner.run(&scenario, BASE_URL).await.unwrap();
    assert!(passing.passed());
    assert_eq!(passing.steps.len(), 3);

    let (runner, probe) = site::runner(site::site_with_heading_class("text-gray-900"), tmp.path());
    let failing = runner.run(&scenario, BASE_URL).await.unwrap();

    assert_eq!(failing.status, Status::Fail);
    assert_eq!(failing.state, RunState::Aborted { step: 2 });
    assert_eq!(failing.steps.len(), 2);

    let step = &failing.steps[1];
    assert_eq!(step.status, Status::Fail);
    assert_eq!(step.expected.as_deref(), Some("\"text-red-600\""));
    assert_eq!(step.actual.as_deref(), Some("\"text-gray-900\""));
    assert_eq!(step.artifacts.len(), 1);
    assert_eq!(step.artifacts[0].label, "failure");
    assert!(step.artifacts[0].path.ends_with(format!("{}/step02_failure.png", scenario_dir_name("Heading"))));
    assert_eq!(probe.closes(), 1);
}

#[tokio::test]
async fn test_optional_logos_warn_without_aborting() {
    let tmp = tempfile::tempdir().unwrap();
    let (runner, _) = site::runner(site::site(), tmp.path());

    let scenario = Scenario::new("Logos")
        .step(Step::navigate("/"))
        .step(Step::scroll_into_view(LocatorSpec::css("#projects")))
        .step(Step::assert_state(
            LocatorSpec::alt_text("Rust logo"),
            Subject::Presence,
            ExpectedValue::exists(true),
            Comparison::Visibility,
        ))
        .step(Step::scroll_into_view(LocatorSpec::alt_text("Go logo")).optional())
        .step(
            Step::assert_state(
                LocatorSpec::alt_text("Go logo"),
                Subject::Presence,
                ExpectedValue::exists(true),
                Comparison::Existence,
            )
            .optional(),
        )
        .step(
            Step::assert_state(
                LocatorSpec::alt_text("Go logo"),
                Subject::Attribute {
                    name: "src".to_string(),
                },
                ExpectedValue::text("/go.svg"),
                Comparison::Exact,
            )
            .optional(),
        )
        .step(Step::screenshot(
            "rust logo",
            CaptureScope::Element(LocatorSpec::alt_text("Rust logo")),
        ));

    let report = runner.run(&scenario, BASE_URL).await.unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(
        statuses(&report),
        vec![
            Status::Pass,
            Status::Pass,
            Status::Pass,
            Status::Warn,
            Status::Warn,
            Status::Warn,
            Status::Pass
        ]
    );
    assert!(report.passed());
    assert_eq!(report.steps[6].artifacts[0].kind, ArtifactKind::ElementScreenshot);
    // Warnings never carry failure screenshots
    assert!(report.warnings().all(|s| s.artifacts.is_empty()));
}

#[tokio::test]
async fn test_missing_required_element_aborts() {
    let tmp = tempfile::tempdir().unwrap();
    let (runner, _) = site::runner(site::site(), tmp.path());

    let scenario = Scenario::new("Missing")
        .step(Step::navigate("/"))
        .step(heading_color("rgb(0, 0, 0)"))
        .step(Step::assert_state(
            LocatorSpec::heading(2),
            Subject::Style {
                property: "color".to_string(),
            },
            ExpectedValue::color("rgb(0, 0, 0)"),
            Comparison::Color,
        ))
        .step(Step::navigate("/subscribe"));

    let report = runner.run(&scenario, BASE_URL).await.unwrap();
    assert_eq!(report.state, RunState::Aborted { step: 3 });
    assert_eq!(report.steps[2].status, Status::Fail);
    assert!(report.steps[2].message.contains("not found"));
}

#[tokio::test]
async fn test_color_mismatch_is_warn() {
    let tmp = tempfile::tempdir().unwrap();
    let (runner, _) = site::runner(site::site(), tmp.path());

    // Light mode: the heading is black, not red
    let scenario = Scenario::new("Colors")
        .step(Step::navigate("/"))
        .step(heading_color("rgb(239, 68, 68)"))
        .step(Step::assert_state(
            LocatorSpec::heading(1),
            Subject::Style {
                property: "color".to_string(),
            },
            ExpectedValue::Color {
                value: "rgb(2, 2, 2)".to_string(),
                tolerance: 3,
            },
            Comparison::Color,
        ));

    let report = runner.run(&scenario, BASE_URL).await.unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(statuses(&report), vec![Status::Pass, Status::Warn, Status::Pass]);
    assert_eq!(report.steps[1].actual.as_deref(), Some("\"rgb(0, 0, 0)\""));
    assert!(report.passed());
}

#[tokio::test]
async fn test_launch_failure_is_an_error() {
    let runner = ScenarioRunner::new(MockLauncher::failing()).with_timing(site::fast_timing());
    let err = runner
        .run(&dark_mode_scenario(), BASE_URL)
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::SessionLaunch(_)));
}

#[tokio::test]
async fn test_unreachable_target_is_an_error_and_closes_session() {
    let tmp = tempfile::tempdir().unwrap();
    let (runner, probe) = site::runner(site::site().unreachable(), tmp.path());

    let err = runner
        .run(&dark_mode_scenario(), BASE_URL)
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::Unreachable { ref url, .. } if url == BASE_URL));
    assert_eq!(probe.launches(), 1);
    assert_eq!(probe.closes(), 1);
}

#[tokio::test]
async fn test_session_closed_exactly_once_per_run() {
    let tmp = tempfile::tempdir().unwrap();
    let (runner, probe) = site::runner(site::site_with_heading_class("plain"), tmp.path());

    let completed = Scenario::new("Completed").step(Step::navigate("/"));
    let aborted = Scenario::new("Aborted").step(Step::click(LocatorSpec::text("Nowhere")));

    runner.run(&completed, BASE_URL).await.unwrap();
    runner.run(&aborted, BASE_URL).await.unwrap();
    runner.run(&completed, BASE_URL).await.unwrap();

    assert_eq!(probe.launches(), 3);
    assert_eq!(probe.closes(), 3);
}

#[tokio::test]
async fn test_similarly_named_scenarios_keep_separate_evidence() {
    let tmp = tempfile::tempdir().unwrap();
    let (runner, _) = site::runner(site::site(), tmp.path());

    let first = Scenario::new("Dark Mode").step(Step::screenshot("home", CaptureScope::Page));
    let second = Scenario::new("dark mode!").step(Step::screenshot("home", CaptureScope::Page));

    let (a, b) = tokio::join!(runner.run(&first, BASE_URL), runner.run(&second, BASE_URL));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(statuses(&a), vec![Status::Pass]);
    assert_eq!(statuses(&b), vec![Status::Pass]);

    let a_path = &a.steps[0].artifacts[0].path;
    let b_path = &b.steps[0].artifacts[0].path;
    assert_ne!(a_path, b_path);
    assert!(a_path.exists());
    assert!(b_path.exists());
}

#[tokio::test]
async fn test_repeated_runs_agree() {
    let tmp = tempfile::tempdir().unwrap();
    let (runner, _) = site::runner(site::site(), tmp.path());

    let mut scenario = dark_mode_scenario();
    scenario.steps.push(heading_color("rgb(1, 2, 3)"));

    let first = runner.run(&scenario, BASE_URL).await.unwrap();
    let second = runner.run(&scenario, BASE_URL).await.unwrap();

    assert_eq!(first.status, second.status);
    assert_eq!(first.state, second.state);
    assert_eq!(statuses(&first), statuses(&second));
    assert_eq!(first.count(Status::Warn), 1);
}

fn cookie_scenario() -> Scenario {
    Scenario::new("Branching")
        .step(Step::navigate("/"))
        .step(Step::branch(
            WaitCondition::Visible {
                locator: LocatorSpec::css("#cookies"),
            },
            vec![
                Step::click(LocatorSpec::text("Accept cookies")),
                Step::branch(
                    WaitCondition::Attached {
                        locator: LocatorSpec::alt_text("Rust logo"),
                    },
                    vec![Step::screenshot("after accept", CaptureScope::Page)],
                    vec![],
                ),
            ],
            vec![Step::screenshot("no banner", CaptureScope::Page)],
        ))
        .step(Step::assert_state(
            LocatorSpec::heading(1),
            Subject::Presence,
            ExpectedValue::exists(true),
            Comparison::Existence,
        ))
}

#[tokio::test]
async fn test_branch_bodies_are_spliced_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let scenario = cookie_scenario();
    let before = scenario.clone();

    let (runner, _) = site::runner(site::site_with_cookie_banner(), tmp.path());
    let taken = runner.run(&scenario, BASE_URL).await.unwrap();

    let steps: Vec<(usize, String)> = taken
        .steps
        .iter()
        .map(|s| (s.index, s.step.split_whitespace().next().unwrap_or_default().to_string()))
        .collect();
    assert_eq!(
        steps,
        vec![
            (1, "navigate".to_string()),
            (2, "branch".to_string()),
            (3, "click".to_string()),
            (4, "branch".to_string()),
            (5, "screenshot".to_string()),
            (6, "assert".to_string()),
        ]
    );
    assert!(taken.steps[4].artifacts[0]
        .path
        .ends_with(format!("{}/step05_after-accept.png", scenario_dir_name("Branching"))));
    assert!(taken.passed());

    let (runner, _) = site::runner(site::site(), tmp.path());
    let skipped = runner.run(&scenario, BASE_URL).await.unwrap();
    assert_eq!(skipped.steps.len(), 4);
    assert!(skipped.steps[2].step.contains("no banner"));
    assert_eq!(skipped.steps[3].index, 4);

    assert_eq!(scenario, before);
}

#[tokio::test]
async fn test_failure_capture_can_be_disabled() {
    let tmp = tempfile::tempdir().unwrap();
    let (runner, _) = site::runner(site::site(), tmp.path());
    let runner = runner.with_evidence(EvidenceSettings {
        capture_on_failure: false,
    });

    let scenario = Scenario::new("No capture").step(Step::wait_for(WaitCondition::Visible {
        locator: LocatorSpec::css("#never"),
    }));
    let report = runner.run(&scenario, BASE_URL).await.unwrap();

    assert_eq!(report.steps[0].status, Status::Fail);
    assert!(report.steps[0].artifacts.is_empty());
}

#[tokio::test]
async fn test_broken_screenshots_downgrade_to_warn() {
    let tmp = tempfile::tempdir().unwrap();
    let (runner, _) = site::runner(site::site().broken_screenshots(), tmp.path());

    let scenario = Scenario::new("Broken camera")
        .step(Step::navigate("/"))
        .step(Step::screenshot("home", CaptureScope::Page))
        .step(Step::wait_for(WaitCondition::Visible {
            locator: LocatorSpec::css("#never"),
        }));
    let report = runner.run(&scenario, BASE_URL).await.unwrap();

    assert_eq!(statuses(&report), vec![Status::Pass, Status::Warn, Status::Fail]);
    // The failure screenshot could not be taken either; the step stays failed
    assert!(report.steps[2].artifacts.is_empty());
    assert_eq!(report.state, RunState::Aborted { step: 3 });
}

#[tokio::test]
async fn test_waits_are_bounded_by_max_timeout() {
    let tmp = tempfile::tempdir().unwrap();
    let (runner, _) = site::runner(site::site(), tmp.path());
    let runner = runner.with_timing(TimingSettings {
        max_timeout: Duration::from_millis(150),
        ..site::fast_timing()
    });

    let scenario = Scenario::new("Bounded")
        .step(
            Step::wait_for(WaitCondition::Hidden {
                locator: LocatorSpec::heading(1),
            })
            .timeout_ms(600_000)
            .optional(),
        )
        .step(
            Step::assert_state(
                LocatorSpec::heading(1),
                Subject::Text,
                ExpectedValue::pattern("^Nobody$"),
                Comparison::Matches,
            )
            .timeout_ms(600_000)
            .optional(),
        );

    let start = Instant::now();
    let report = runner.run(&scenario, BASE_URL).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(statuses(&report), vec![Status::Warn, Status::Fail]);
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.steps[1].actual.as_deref(), Some("\"Jane Doe\""));
}

#[tokio::test]
async fn test_suite_itemizes_fatal_failures() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::from_str(
        r#"
        [harness]
        name = "Personal site"
        base_url = "http://localhost:5173"
        max_sessions = 2

        [[scenarios]]
        name = "Home"
        steps = [
            { type = "navigate", path = "/" },
            { type = "assert_state", locator = { by = "role", role = "heading", level = 1 }, subject = { read = "text" }, expected = { kind = "text", value = "Jane Doe" }, comparison = "exact" },
        ]

        [[scenarios]]
        name = "Broken"
        steps = [
            { type = "assert_state", locator = { by = "css", selector = "h1" }, subject = { read = "text" }, expected = { kind = "pattern", pattern = "(" }, comparison = "matches" },
        ]

        [[scenarios]]
        name = "Subscribe link"
        steps = [
            { type = "click", locator = { by = "text", text = "Subscribe" }, until = { condition = "url_contains", fragment = "/subscribe" } },
        ]
        "#,
    )
    .unwrap();

    let launcher = MockLauncher::new(site::site());
    let probe = launcher.probe();
    let runner = ScenarioRunner::with_launcher(launcher, &config)
        .with_timing(site::fast_timing())
        .with_artifact_dir(tmp.path());

    let suite = runner.run_suite(&config).await;

    assert_eq!(suite.name, "Personal site");
    assert_eq!(
        suite.reports.iter().map(|r| r.scenario.as_str()).collect::<Vec<_>>(),
        vec!["Home", "Subscribe link"]
    );
    assert!(suite.reports.iter().all(|r| r.passed()));
    assert_eq!(suite.fatal.len(), 1);
    assert_eq!(suite.fatal[0].scenario, "Broken");
    assert!(!suite.passed);
    assert_eq!(probe.launches(), 2);
    assert_eq!(probe.closes(), 2);
}

fn light_mode_scenario() -> Scenario {
    Scenario::new("Light mode")
        .step(Step::navigate("/"))
        .step(Step::branch(
            WaitCondition::ClassContains {
                locator: root(),
                token: "dark".to_string(),
            },
            vec![Step::click(toggle()).until(WaitCondition::ClassAbsent {
                locator: root(),
                token: "dark".to_string(),
            })],
            vec![],
        ))
        .step(heading_color("rgb(0, 0, 0)"))
}

#[tokio::test]
async fn test_branch_normalizes_theme_before_asserting() {
    let tmp = tempfile::tempdir().unwrap();

    let (runner, _) = site::runner(site::site().root_class("dark"), tmp.path());
    let from_dark = runner.run(&light_mode_scenario(), BASE_URL).await.unwrap();
    assert_eq!(statuses(&from_dark), vec![Status::Pass; 4]);
    assert!(from_dark.steps[1].message.contains("then"));

    let (runner, _) = site::runner(site::site(), tmp.path());
    let from_light = runner.run(&light_mode_scenario(), BASE_URL).await.unwrap();
    assert_eq!(statuses(&from_light), vec![Status::Pass; 3]);
    assert!(from_light.steps[1].message.contains("otherwise"));
}
