//! Chrome/Chromium driver over the DevTools protocol
//!
//! Elements are addressed by the structural `:nth-child` path returned by the
//! locator query script, so every CDP call after a query re-finds the element
//! without anything being written into the page.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{Driver, Launcher, ShotTarget, Subject};
use crate::config::BrowserSettings;
use crate::error::{DriverError, DriverResult};
use crate::locator::{js_string, ElementHandle, LocatorSpec};

static BROWSER_ID: AtomicU64 = AtomicU64::new(0);

/// Launches a fresh Chrome process per session
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    settings: BrowserSettings,
}

impl ChromeLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &BrowserSettings {
        &self.settings
    }

    fn browser_config(&self, user_data_dir: PathBuf) -> DriverResult<BrowserConfig> {
        let settings = &self.settings;
        let mut builder = BrowserConfig::builder()
            .user_data_dir(user_data_dir)
            .window_size(settings.window_width, settings.window_height)
            .viewport(None)
            .launch_timeout(Duration::from_millis(settings.launch_timeout_ms))
            .request_timeout(Duration::from_millis(settings.launch_timeout_ms));

        if let Some(executable) = settings
            .chrome_executable
            .clone()
            .or_else(find_chrome_for_testing)
        {
            debug!("Using Chrome executable: {}", executable.display());
            builder = builder.chrome_executable(executable);
        }
        if !settings.headless {
            builder = builder.with_head();
        }
        if settings.no_sandbox {
            builder = builder.no_sandbox();
        }

        builder
            .build()
            .map_err(|e| DriverError::Launch(format!("invalid browser configuration: {}", e)))
    }
}

/// Chrome for Testing installed by Puppeteer, newest version first
pub fn find_chrome_for_testing() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    let cache = Path::new(&home).join(".cache/puppeteer/chrome");
    let mut versions: Vec<PathBuf> = std::fs::read_dir(&cache)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    versions.sort_by(|a, b| b.cmp(a));

    const CANDIDATES: [&str; 3] = [
        "chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
        "chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
        "chrome-linux64/chrome",
    ];
    versions.iter().find_map(|version| {
        CANDIDATES
            .iter()
            .map(|c| version.join(c))
            .find(|p| p.exists())
    })
}

/// Unique profile directory so concurrent sessions never share Chrome state
fn unique_user_data_dir() -> PathBuf {
    let browser_id = BROWSER_ID.fetch_add(1, Ordering::SeqCst);
    let pid = std::process::id();
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    std::env::temp_dir().join(format!(
        "scenario-harness-{}-{}-{}",
        pid, browser_id, timestamp
    ))
}

#[async_trait]
impl Launcher for ChromeLauncher {
    #[instrument(skip(self))]
    async fn launch(&self) -> DriverResult<Box<dyn Driver>> {
        let user_data_dir = unique_user_data_dir();
        if user_data_dir.exists() {
            let _ = std::fs::remove_dir_all(&user_data_dir);
        }
        let config = self.browser_config(user_data_dir.clone())?;

        info!("Launching browser");
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler stopped: {}", e);
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handle.abort();
                return Err(DriverError::Launch(format!("failed to open a page: {}", e)));
            }
        };

        info!("Browser launched successfully");
        Ok(Box::new(ChromeDriver {
            browser: Mutex::new(Some(browser)),
            page,
            handler: handle,
            user_data_dir,
        }))
    }

    fn name(&self) -> &str {
        "chrome"
    }
}

/// One Chrome page driven over CDP
pub struct ChromeDriver {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: tokio::task::JoinHandle<()>,
    user_data_dir: PathBuf,
}

impl ChromeDriver {
    async fn element(&self, handle: &ElementHandle) -> DriverResult<Element> {
        self.page
            .find_element(handle.reference.as_str())
            .await
            .map_err(|_| DriverError::Detached(handle.reference.clone()))
    }

    async fn ensure_open(&self) -> DriverResult<()> {
        if self.browser.lock().await.is_none() {
            return Err(DriverError::Closed);
        }
        Ok(())
    }
}

fn protocol(err: CdpError) -> DriverError {
    DriverError::Protocol(err.to_string())
}

/// Expression reading `subject` from the element addressed by `reference`.
/// Evaluates to `{ missing: true }` when the element is gone.
fn read_script(reference: &str, subject: &Subject) -> String {
    let value = match subject {
        Subject::Text => "(el.innerText || el.textContent || '').replace(/\\s+/g, ' ').trim()".to_string(),
        Subject::ClassList => "el.getAttribute('class') || ''".to_string(),
        Subject::Attribute { name } => format!("el.getAttribute({})", js_string(name)),
        Subject::Style { property } => format!(
            "getComputedStyle(el).getPropertyValue({})",
            js_string(property)
        ),
        Subject::Value => "(el.value === undefined ? null : String(el.value))".to_string(),
        Subject::Presence => "String(el.isConnected)".to_string(),
    };
    format!(
        "(() => {{ const el = document.querySelector({}); \
         if (!el) return {{ missing: true }}; \
         return {{ missing: false, value: {} }}; }})()",
        js_string(reference),
        value
    )
}

/// Expression clearing a form control through the native value setter so
/// framework-controlled inputs observe the change
fn clear_script(reference: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({}); if (!el) return false; \
         const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype; \
         const desc = Object.getOwnPropertyDescriptor(proto, 'value'); \
         if (desc && desc.set) {{ desc.set.call(el, ''); }} else {{ el.value = ''; }} \
         el.dispatchEvent(new Event('input', {{ bubbles: true }})); return true; }})()",
        js_string(reference)
    )
}

#[async_trait]
impl Driver for ChromeDriver {
    #[instrument(skip(self))]
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.ensure_open().await?;
        self.page
            .goto(url)
            .await
            .map_err(|e| DriverError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.ensure_open().await?;
        Ok(self.page.url().await.map_err(protocol)?.unwrap_or_default())
    }

    async fn evaluate(&self, expression: &str) -> DriverResult<Value> {
        self.ensure_open().await?;
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn query(&self, locator: &LocatorSpec) -> DriverResult<Vec<ElementHandle>> {
        let value = self.evaluate(&locator.to_query_script()).await?;
        serde_json::from_value(value)
            .map_err(|e| DriverError::Script(format!("unexpected query result for {}: {}", locator, e)))
    }

    async fn click(&self, element: &ElementHandle) -> DriverResult<()> {
        let target = self.element(element).await?;
        target.scroll_into_view().await.map_err(protocol)?;
        target.click().await.map_err(protocol)?;
        Ok(())
    }

    async fn fill(&self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        let target = self.element(element).await?;
        target.click().await.map_err(protocol)?;
        self.evaluate(&clear_script(&element.reference)).await?;
        target.type_str(text).await.map_err(protocol)?;
        Ok(())
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> DriverResult<()> {
        let target = self.element(element).await?;
        target.scroll_into_view().await.map_err(protocol)?;
        Ok(())
    }

    async fn read(&self, element: &ElementHandle, subject: &Subject) -> DriverResult<Option<String>> {
        let value = self.evaluate(&read_script(&element.reference, subject)).await?;
        if value.get("missing").and_then(Value::as_bool).unwrap_or(true) {
            return Err(DriverError::Detached(element.reference.clone()));
        }
        Ok(match value.get("value") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
    }

    async fn screenshot(&self, target: ShotTarget<'_>) -> DriverResult<Vec<u8>> {
        self.ensure_open().await?;
        match target {
            ShotTarget::Viewport | ShotTarget::FullPage => {
                let params = ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(matches!(target, ShotTarget::FullPage))
                    .build();
                self.page.screenshot(params).await.map_err(protocol)
            }
            ShotTarget::Element(handle) => {
                let element = self.element(handle).await?;
                element
                    .screenshot(CaptureScreenshotFormat::Png)
                    .await
                    .map_err(protocol)
            }
        }
    }

    #[instrument(skip(self))]
    async fn close(&self) -> DriverResult<()> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Err(DriverError::Closed);
        };
        info!("Closing browser");
        let result = browser.close().await.map(|_| ()).map_err(protocol);
        if let Err(e) = browser.wait().await {
            warn!("Browser process did not exit cleanly: {}", e);
        }
        self.handler.abort();
        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            debug!("Could not remove {}: {}", self.user_data_dir.display(), e);
        }
        result
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
