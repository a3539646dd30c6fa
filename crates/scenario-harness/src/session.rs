//! Browser Session: one browser, one page, released exactly once

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::driver::{Driver, Launcher, ShotTarget};
use crate::error::{DriverResult, HarnessError, HarnessResult};

/// An open page on a launched browser, bound to a base URL
///
/// `close` consumes the session, so it can run at most once; a session that is
/// dropped without being closed logs a warning (the driver still tears down the
/// browser process on drop).
pub struct BrowserSession {
    driver: Box<dyn Driver>,
    base_url: String,
    closed: bool,
}

impl BrowserSession {
    /// Launch a browser and load `base_url`.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::SessionLaunch`] if the browser cannot be started
    /// - [`HarnessError::Unreachable`] if the first navigation fails; the
    ///   browser is closed before returning
    #[instrument(skip(launcher), fields(launcher = launcher.name()))]
    pub async fn open(launcher: &dyn Launcher, base_url: &str) -> HarnessResult<Self> {
        let driver = launcher
            .launch()
            .await
            .map_err(HarnessError::SessionLaunch)?;

        let session = Self {
            driver,
            base_url: base_url.to_string(),
            closed: false,
        };

        debug!("Loading base URL");
        if let Err(source) = session.driver.navigate(base_url).await {
            session.close().await;
            return Err(HarnessError::Unreachable {
                url: base_url.to_string(),
                source,
            });
        }

        info!("Session open");
        Ok(session)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    /// Absolute URL for `path`: absolute URLs pass through, anything else is
    /// joined onto the base URL
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    pub async fn navigate(&self, path: &str) -> DriverResult<()> {
        let url = self.resolve_url(path);
        debug!("Navigating to: {}", url);
        self.driver.navigate(&url).await
    }

    pub async fn evaluate(&self, expression: &str) -> DriverResult<Value> {
        self.driver.evaluate(expression).await
    }

    pub async fn screenshot(&self, target: ShotTarget<'_>) -> DriverResult<Vec<u8>> {
        self.driver.screenshot(target).await
    }

    /// Terminate the browser. Errors are logged, never returned: there is
    /// nothing a caller could do about a browser that refuses to exit.
    pub async fn close(mut self) {
        self.closed = true;
        match self.driver.close().await {
            Ok(()) => info!("Session closed"),
            Err(e) => warn!("Error while closing session: {}", e),
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Browser session for {} dropped without close()", self.base_url);
        }
    }
}
