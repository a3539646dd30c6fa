//! Generic browser automation interface
//!
//! The engine never talks to a concrete automation library directly. It is
//! written against [`Driver`] (one page of one browser) and [`Launcher`]
//! (how to obtain a driver). Two implementations ship with the crate:
//!
//! - [`chrome`]: Chrome/Chromium over the DevTools protocol (chromiumoxide)
//! - [`mock`]: an in-memory scripted page model for tests and dry runs

pub mod chrome;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DriverResult;
use crate::locator::{ElementHandle, LocatorSpec};

pub use chrome::{ChromeDriver, ChromeLauncher};
pub use mock::{MockDriver, MockEffect, MockElement, MockLauncher, MockPage, MockProbe, MockSite};

/// A value sampled from an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "read", rename_all = "snake_case")]
pub enum Subject {
    /// Normalized text content
    Text,
    /// The raw `class` attribute (space separated tokens)
    ClassList,
    /// An arbitrary attribute
    Attribute { name: String },
    /// A computed style property such as `color`
    Style { property: String },
    /// The current value of a form control
    Value,
    /// Existence/visibility only, no value is read
    Presence,
}

/// Target of a screenshot
#[derive(Debug, Clone, Copy)]
pub enum ShotTarget<'a> {
    /// The current viewport
    Viewport,
    /// The whole scrollable page
    FullPage,
    /// A single element's bounding box
    Element(&'a ElementHandle),
}

/// One page of one browser, driven step by step
#[async_trait]
pub trait Driver: Send + Sync {
    /// Load `url` and wait for the navigation to commit
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    /// URL of the document currently loaded
    async fn current_url(&self) -> DriverResult<String>;

    /// Evaluate a JavaScript expression and return its JSON value
    async fn evaluate(&self, expression: &str) -> DriverResult<serde_json::Value>;

    /// `document.readyState` of the current document
    async fn ready_state(&self) -> DriverResult<String> {
        let value = self.evaluate("document.readyState").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Every element currently matching `locator`, in document order
    async fn query(&self, locator: &LocatorSpec) -> DriverResult<Vec<ElementHandle>>;

    async fn click(&self, element: &ElementHandle) -> DriverResult<()>;

    /// Replace the value of a form control with `text`
    async fn fill(&self, element: &ElementHandle, text: &str) -> DriverResult<()>;

    async fn scroll_into_view(&self, element: &ElementHandle) -> DriverResult<()>;

    /// Sample `subject` from the element; `None` when the value is absent
    /// (e.g. a missing attribute)
    async fn read(&self, element: &ElementHandle, subject: &Subject) -> DriverResult<Option<String>>;

    /// PNG bytes of the requested target
    async fn screenshot(&self, target: ShotTarget<'_>) -> DriverResult<Vec<u8>>;

    /// Terminate the page and the browser behind it
    async fn close(&self) -> DriverResult<()>;
}

/// Produces fresh drivers, one per session
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> DriverResult<Box<dyn Driver>>;

    /// Identifier used in logs (e.g. "chrome", "mock")
    fn name(&self) -> &str;
}
