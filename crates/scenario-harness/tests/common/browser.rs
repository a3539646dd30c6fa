//! Browser automation helpers

use scenario_harness::config::BrowserSettings;
use scenario_harness::driver::{ChromeLauncher, Launcher};

/// Check if browser tests should be skipped (when Chrome isn't available)
pub fn should_skip() -> bool {
    std::env::var("SKIP_BROWSER_TESTS").is_ok()
}

/// Macro to skip test if Chrome isn't available
#[macro_export]
macro_rules! skip_if_no_chrome {
    () => {
        if browser::should_skip() {
            eprintln!("Skipping test: SKIP_BROWSER_TESTS is set");
            return;
        }
    };
}

/// Headless launcher suitable for CI containers
pub fn test_launcher() -> ChromeLauncher {
    ChromeLauncher::new(BrowserSettings {
        no_sandbox: true,
        ..BrowserSettings::default()
    })
}

/// Launch once to probe for Chrome; `None` (skip) when it cannot start
pub async fn require_launcher() -> Option<ChromeLauncher> {
    let launcher = test_launcher();
    match launcher.launch().await {
        Ok(driver) => {
            let _ = driver.close().await;
            Some(launcher)
        }
        Err(e) => {
            eprintln!("Skipping: Chrome could not be launched ({})", e);
            None
        }
    }
}

/// Inline page as a `data:` URL so tests need no server
pub fn data_url(html: &str) -> String {
    let mut url = String::from("data:text/html;charset=utf-8,");
    for byte in html.bytes() {
        if byte.is_ascii_alphanumeric() || b"-_.~".contains(&byte) {
            url.push(byte as char);
        } else {
            url.push_str(&format!("%{:02X}", byte));
        }
    }
    url
}
