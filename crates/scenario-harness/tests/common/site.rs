//! Scripted personal site used by the mock-driven scenario tests

use scenario_harness::config::TimingSettings;
use scenario_harness::driver::{MockEffect, MockElement, MockLauncher, MockPage, MockProbe, MockSite};
use scenario_harness::ScenarioRunner;
use std::path::Path;
use std::sync::Once;
use std::time::Duration;

pub const BASE_URL: &str = "http://localhost:5173";

/// Install a test subscriber once per binary (`RUST_LOG=debug` for details)
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Short budgets so failing waits finish quickly
pub fn fast_timing() -> TimingSettings {
    TimingSettings {
        wait_timeout: Duration::from_millis(300),
        assert_timeout: Duration::from_millis(300),
        poll_interval: Duration::from_millis(10),
        max_timeout: Duration::from_millis(2_000),
    }
}

fn home_page(heading_class: Option<&str>, cookie_banner: bool) -> MockPage {
    let mut heading = MockElement::heading(1, "Jane Doe")
        .style("color", "rgb(0, 0, 0)")
        .dark_style("color", "rgb(239, 68, 68)");
    if let Some(class) = heading_class {
        heading = heading.class(class);
    }

    let mut page = MockPage::new()
        .with(MockElement::new("header").id("home"))
        .with(
            MockElement::button("")
                .label("Toggle dark mode")
                .on_click(MockEffect::toggle_root_class("dark").after(Duration::from_millis(20))),
        )
        .with(heading)
        .with(MockElement::new("img").attr("alt", "Rust logo").attr("src", "/rust.svg"))
        .with(MockElement::new("section").id("projects").text("Projects"))
        .with(MockElement::link("Subscribe", "/subscribe"));

    if cookie_banner {
        page = page
            .with(MockElement::new("div").id("cookies").text("We use cookies"))
            .with(MockElement::button("Accept cookies"));
    }
    page
}

fn subscribe_page() -> MockPage {
    MockPage::new()
        .with(MockElement::heading(2, "Subscribe to my Newsletter"))
        .with(MockElement::input("Name").id("name"))
        .with(MockElement::input("Email").id("email"))
        .with(
            MockElement::button("Subscribe")
                .on_click(MockEffect::navigate("/thank-you").after(Duration::from_millis(40))),
        )
}

fn thank_you_page() -> MockPage {
    MockPage::new()
        .with(MockElement::heading(2, "Thank You!"))
        .with(MockElement::link("Return to Home", "/"))
}

fn with_forms(site: MockSite) -> MockSite {
    site.page("/subscribe", subscribe_page())
        .page("/thank-you", thank_you_page())
}

/// The site as intended: red heading token, one logo, a newsletter form
pub fn site() -> MockSite {
    with_forms(MockSite::new().page("/", home_page(Some("text-red-600"), false)))
}

/// The same site with the heading class regressed
pub fn site_with_heading_class(class: &str) -> MockSite {
    with_forms(MockSite::new().page("/", home_page(Some(class), false)))
}

/// The site showing a cookie banner on the home page
pub fn site_with_cookie_banner() -> MockSite {
    with_forms(MockSite::new().page("/", home_page(Some("text-red-600"), true)))
}

/// Runner over `site` with fast timing, writing evidence below `artifact_dir`
pub fn runner(site: MockSite, artifact_dir: &Path) -> (ScenarioRunner, MockProbe) {
    init_tracing();
    let launcher = MockLauncher::new(site);
    let probe = launcher.probe();
    let runner = ScenarioRunner::new(launcher)
        .with_timing(fast_timing())
        .with_artifact_dir(artifact_dir);
    (runner, probe)
}
