//! In-memory scripted page model
//!
//! [`MockDriver`] answers the [`Driver`] contract from a static description of
//! a site ([`MockSite`]) plus a small set of delayed effects triggered by
//! clicks. It understands just enough of locators and CSS (tag, `#id`,
//! `.class`, `html`) to drive scenarios offline and deterministically.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{Driver, Launcher, ShotTarget, Subject};
use crate::error::{DriverError, DriverResult};
use crate::locator::{ElementHandle, LocatorSpec};

/// Bytes returned for every mock screenshot (PNG signature + marker)
const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nmock-screenshot";

/// Something that happens when an element is clicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEffect {
    /// Add the class to the root element if absent, remove it otherwise
    ToggleRootClass { class: String, delay: Duration },
    /// Load another page of the site
    Navigate { path: String, delay: Duration },
    /// Make the element with this id visible on the current page
    Reveal { id: String, delay: Duration },
}

impl MockEffect {
    pub fn toggle_root_class(class: impl Into<String>) -> Self {
        Self::ToggleRootClass {
            class: class.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn navigate(path: impl Into<String>) -> Self {
        Self::Navigate {
            path: path.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn reveal(id: impl Into<String>) -> Self {
        Self::Reveal {
            id: id.into(),
            delay: Duration::ZERO,
        }
    }

    /// Apply the effect only after `delay` has passed
    pub fn after(mut self, delay: Duration) -> Self {
        match &mut self {
            Self::ToggleRootClass { delay: d, .. }
            | Self::Navigate { delay: d, .. }
            | Self::Reveal { delay: d, .. } => *d = delay,
        }
        self
    }

    fn delay(&self) -> Duration {
        match self {
            Self::ToggleRootClass { delay, .. }
            | Self::Navigate { delay, .. }
            | Self::Reveal { delay, .. } => *delay,
        }
    }
}

/// One element of a mock page
#[derive(Debug, Clone, Default)]
pub struct MockElement {
    pub tag: String,
    pub id: Option<String>,
    /// Explicit `role` attribute; implicit roles are derived from `tag`
    pub role: Option<String>,
    pub text: String,
    /// `aria-label` (or the text of an associated `<label>`)
    pub label: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub classes: Vec<String>,
    pub styles: BTreeMap<String, String>,
    /// Style overrides while the root element carries the `dark` class
    pub dark_styles: BTreeMap<String, String>,
    pub visible: bool,
    pub value: String,
    pub on_click: Option<MockEffect>,
}

impl MockElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            visible: true,
            ..Default::default()
        }
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self::new(format!("h{}", level)).text(text)
    }

    pub fn link(text: impl Into<String>, href: impl Into<String>) -> Self {
        Self::new("a").text(text).attr("href", href)
    }

    pub fn button(text: impl Into<String>) -> Self {
        Self::new("button").text(text)
    }

    pub fn input(label: impl Into<String>) -> Self {
        Self::new("input").label(label)
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn style(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.styles.insert(property.into(), value.into());
        self
    }

    pub fn dark_style(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.dark_styles.insert(property.into(), value.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn on_click(mut self, effect: MockEffect) -> Self {
        self.on_click = Some(effect);
        self
    }

    fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "id" => self.id.clone(),
            "class" => Some(self.classes.join(" ")),
            "aria-label" => self.label.clone(),
            "role" => self.role.clone(),
            _ => self.attributes.get(name).cloned(),
        }
    }

    fn implicit_role(&self) -> Option<&str> {
        if let Some(role) = self.role.as_deref() {
            return Some(role);
        }
        let role = match self.tag.as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => "heading",
            "a" if self.attributes.contains_key("href") => "link",
            "button" => "button",
            "input" | "textarea" => "textbox",
            "img" if self.attributes.get("alt").is_some_and(|a| !a.is_empty()) => "img",
            "header" => "banner",
            "nav" => "navigation",
            "main" => "main",
            "footer" => "contentinfo",
            _ => return None,
        };
        Some(role)
    }

    fn heading_level(&self) -> Option<u8> {
        let digit = self.tag.strip_prefix('h')?;
        digit.parse().ok().filter(|l| (1..=6).contains(l))
    }

    fn accessible_name(&self) -> String {
        self.label
            .clone()
            .or_else(|| self.attributes.get("alt").cloned())
            .or_else(|| self.attributes.get("title").cloned())
            .unwrap_or_else(|| self.text.clone())
    }

    fn is_form_control(&self) -> bool {
        matches!(self.tag.as_str(), "input" | "textarea" | "select")
    }
}

/// The elements of one path
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    pub elements: Vec<MockElement>,
}

impl MockPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, element: MockElement) -> Self {
        self.elements.push(element);
        self
    }
}

/// A whole mock application: pages by path plus the document root element
#[derive(Debug, Clone, Default)]
pub struct MockSite {
    pub pages: BTreeMap<String, MockPage>,
    /// Classes on `<html>`, shared by every page (theme state survives navigation)
    pub root_classes: Vec<String>,
    /// Every navigation fails as if the server were down
    pub unreachable: bool,
    /// Every screenshot fails
    pub broken_screenshots: bool,
    /// Time each DOM query takes to answer
    pub query_latency: Duration,
}

impl MockSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, path: impl Into<String>, page: MockPage) -> Self {
        self.pages.insert(path.into(), page);
        self
    }

    pub fn root_class(mut self, class: impl Into<String>) -> Self {
        self.root_classes.push(class.into());
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn broken_screenshots(mut self) -> Self {
        self.broken_screenshots = true;
        self
    }

    /// Delay every DOM query by `latency`
    pub fn slow_queries(mut self, latency: Duration) -> Self {
        self.query_latency = latency;
        self
    }
}

/// Counters shared between a launcher and every driver it creates
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    launches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl MockProbe {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Produces a [`MockDriver`] over a fresh copy of the site on every launch
#[derive(Debug, Clone, Default)]
pub struct MockLauncher {
    site: MockSite,
    probe: MockProbe,
    fail_launch: bool,
}

impl MockLauncher {
    pub fn new(site: MockSite) -> Self {
        Self {
            site,
            probe: MockProbe::default(),
            fail_launch: false,
        }
    }

    /// A launcher whose every launch fails, like a missing browser binary
    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Default::default()
        }
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl Launcher for MockLauncher {
    async fn launch(&self) -> DriverResult<Box<dyn Driver>> {
        if self.fail_launch {
            return Err(DriverError::Launch("mock browser refused to start".to_string()));
        }
        self.probe.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDriver::new(self.site.clone(), self.probe.clone())))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[derive(Debug)]
struct MockState {
    site: MockSite,
    url: String,
    path: String,
    pending: Vec<(Instant, MockEffect)>,
    closed: bool,
}

impl MockState {
    /// Apply every effect whose time has come, in scheduling order
    fn settle(&mut self) {
        let now = Instant::now();
        let (due, later): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|(at, _)| *at <= now);
        self.pending = later;
        for (_, effect) in due {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: MockEffect) {
        debug!(?effect, "mock effect applied");
        match effect {
            MockEffect::ToggleRootClass { class, .. } => {
                if let Some(pos) = self.site.root_classes.iter().position(|c| *c == class) {
                    self.site.root_classes.remove(pos);
                } else {
                    self.site.root_classes.push(class);
                }
            }
            MockEffect::Navigate { path, .. } => {
                let origin = origin_of(&self.url);
                self.url = format!("{}{}", origin, path);
                self.path = page_path(&path);
            }
            MockEffect::Reveal { id, .. } => {
                if let Some(page) = self.site.pages.get_mut(&self.path) {
                    for el in page.elements.iter_mut() {
                        if el.id.as_deref() == Some(id.as_str()) {
                            el.visible = true;
                        }
                    }
                }
            }
        }
    }

    fn schedule(&mut self, effect: MockEffect) {
        if effect.delay().is_zero() {
            self.apply(effect);
        } else {
            self.pending.push((Instant::now() + effect.delay(), effect));
        }
    }

    fn elements(&self) -> &[MockElement] {
        self.site
            .pages
            .get(&self.path)
            .map(|p| p.elements.as_slice())
            .unwrap_or(&[])
    }

    fn dark(&self) -> bool {
        self.site.root_classes.iter().any(|c| c == "dark")
    }

    fn reference(&self, target: Target) -> String {
        match target {
            Target::Root => format!("mock:{}:root", self.path),
            Target::Element(i) => format!("mock:{}:{}", self.path, i),
        }
    }

    /// Map a handle back to the live element, failing if the page changed
    fn target(&self, handle: &ElementHandle) -> DriverResult<Target> {
        let detached = || DriverError::Detached(handle.reference.clone());
        let rest = handle
            .reference
            .strip_prefix("mock:")
            .ok_or_else(detached)?;
        let (path, index) = rest.rsplit_once(':').ok_or_else(detached)?;
        if path != self.path {
            return Err(detached());
        }
        if index == "root" {
            return Ok(Target::Root);
        }
        let index: usize = index.parse().map_err(|_| detached())?;
        if index >= self.elements().len() {
            return Err(detached());
        }
        Ok(Target::Element(index))
    }
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Root,
    Element(usize),
}

/// Scheme and host of a URL (`http://localhost:5173`), empty for bare paths
fn origin_of(url: &str) -> &str {
    match url.find("://") {
        Some(scheme_end) => {
            let after = scheme_end + 3;
            match url[after..].find('/') {
                Some(slash) => &url[..after + slash],
                None => url,
            }
        }
        None => "",
    }
}

/// Page key for a URL or path: no origin, no query, no fragment
fn page_path(url: &str) -> String {
    let path = &url[origin_of(url).len()..];
    let path = path.split(['#', '?']).next().unwrap_or_default();
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn text_match(actual: &str, wanted: &str, exact: bool) -> bool {
    if exact {
        normalize(actual) == normalize(wanted)
    } else {
        normalize(actual)
            .to_lowercase()
            .contains(&normalize(wanted).to_lowercase())
    }
}

/// One compound selector: optional tag followed by `#id` / `.class` parts
#[derive(Debug, Default, PartialEq, Eq)]
struct SimpleSelector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

fn parse_selector(selector: &str) -> DriverResult<Vec<SimpleSelector>> {
    let unsupported = || DriverError::Script(format!("unsupported selector: {}", selector));
    let mut out = Vec::new();
    for part in selector.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(unsupported());
        }
        if part == ":root" {
            out.push(SimpleSelector {
                tag: Some("html".to_string()),
                ..Default::default()
            });
            continue;
        }
        let mut parsed = SimpleSelector::default();
        let mut rest = part;
        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
            .unwrap_or(rest.len());
        if tag_len > 0 {
            parsed.tag = Some(rest[..tag_len].to_ascii_lowercase());
        }
        rest = &rest[tag_len..];
        while let Some(sigil) = rest.chars().next() {
            let body = &rest[sigil.len_utf8()..];
            let len = body
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
                .unwrap_or(body.len());
            if len == 0 {
                return Err(unsupported());
            }
            let name = body[..len].to_string();
            match sigil {
                '#' => parsed.id = Some(name),
                '.' => parsed.classes.push(name),
                _ => return Err(unsupported()),
            }
            rest = &body[len..];
        }
        out.push(parsed);
    }
    Ok(out)
}

impl SimpleSelector {
    fn matches_root(&self, root_classes: &[String]) -> bool {
        self.tag.as_deref() == Some("html")
            && self.id.is_none()
            && self.classes.iter().all(|c| root_classes.contains(c))
    }

    fn matches(&self, el: &MockElement) -> bool {
        self.tag.as_deref().map_or(true, |t| t == el.tag)
            && self
                .id
                .as_deref()
                .map_or(true, |id| el.id.as_deref() == Some(id))
            && self.classes.iter().all(|c| el.classes.contains(c))
    }
}

fn element_matches(el: &MockElement, locator: &LocatorSpec) -> bool {
    match locator {
        LocatorSpec::Role {
            role,
            name,
            level,
            exact,
        } => {
            el.implicit_role() == Some(role.as_str())
                && level.map_or(true, |l| el.heading_level() == Some(l))
                && name
                    .as_deref()
                    .map_or(true, |n| text_match(&el.accessible_name(), n, *exact))
        }
        LocatorSpec::Label { text } => el
            .label
            .as_deref()
            .is_some_and(|l| text_match(l, text, false)),
        LocatorSpec::Attribute { name, contains } => el
            .attribute(name)
            .is_some_and(|v| v.contains(contains.as_str())),
        // Css is handled by the caller since it can also match the root
        LocatorSpec::Css { .. } => false,
        LocatorSpec::Text { text, exact } => !el.text.is_empty() && text_match(&el.text, text, *exact),
        LocatorSpec::AltText { text } => el
            .attributes
            .get("alt")
            .is_some_and(|alt| text_match(alt, text, false)),
    }
}

/// Driver over a [`MockSite`]
#[derive(Debug, Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
    probe: MockProbe,
}

impl MockDriver {
    pub fn new(site: MockSite, probe: MockProbe) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                site,
                url: "about:blank".to_string(),
                path: "about:blank".to_string(),
                pending: Vec::new(),
                closed: false,
            })),
            probe,
        }
    }

    /// Lock the state, apply due effects and refuse if closed
    fn live(&self) -> DriverResult<MutexGuard<'_, MockState>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.closed {
            return Err(DriverError::Closed);
        }
        state.settle();
        Ok(state)
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        let mut state = self.live()?;
        if state.site.unreachable {
            return Err(DriverError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_REFUSED".to_string(),
            });
        }
        state.pending.clear();
        state.url = url.to_string();
        state.path = page_path(url);
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.live()?.url.clone())
    }

    async fn evaluate(&self, expression: &str) -> DriverResult<Value> {
        let state = self.live()?;
        Ok(match expression.trim() {
            "document.readyState" => Value::String("complete".to_string()),
            "window.location.href" | "location.href" => Value::String(state.url.clone()),
            "document.documentElement.className" => {
                Value::String(state.site.root_classes.join(" "))
            }
            _ => Value::Null,
        })
    }

    async fn ready_state(&self) -> DriverResult<String> {
        drop(self.live()?);
        Ok("complete".to_string())
    }

    async fn query(&self, locator: &LocatorSpec) -> DriverResult<Vec<ElementHandle>> {
        let latency = self.state.lock().unwrap_or_else(|e| e.into_inner()).site.query_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let state = self.live()?;
        let mut found = Vec::new();

        if let LocatorSpec::Css { selector } = locator {
            let selectors = parse_selector(selector)?;
            if selectors
                .iter()
                .any(|s| s.matches_root(&state.site.root_classes))
            {
                found.push(ElementHandle {
                    reference: state.reference(Target::Root),
                    tag: "html".to_string(),
                    visible: true,
                });
            }
            for (i, el) in state.elements().iter().enumerate() {
                if selectors.iter().any(|s| s.matches(el)) {
                    found.push(ElementHandle {
                        reference: state.reference(Target::Element(i)),
                        tag: el.tag.clone(),
                        visible: el.visible,
                    });
                }
            }
            return Ok(found);
        }

        for (i, el) in state.elements().iter().enumerate() {
            if element_matches(el, locator) {
                found.push(ElementHandle {
                    reference: state.reference(Target::Element(i)),
                    tag: el.tag.clone(),
                    visible: el.visible,
                });
            }
        }
        Ok(found)
    }

    async fn click(&self, element: &ElementHandle) -> DriverResult<()> {
        let mut state = self.live()?;
        let Target::Element(i) = state.target(element)? else {
            return Ok(());
        };
        let el = &state.elements()[i];
        let effect = el.on_click.clone().or_else(|| {
            (el.tag == "a")
                .then(|| el.attributes.get("href").cloned())
                .flatten()
                .map(MockEffect::navigate)
        });
        if let Some(effect) = effect {
            state.schedule(effect);
        }
        Ok(())
    }

    async fn fill(&self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        let mut state = self.live()?;
        let Target::Element(i) = state.target(element)? else {
            return Err(DriverError::Script("cannot fill the document root".to_string()));
        };
        let path = state.path.clone();
        let el = state
            .site
            .pages
            .get_mut(&path)
            .and_then(|p| p.elements.get_mut(i))
            .ok_or_else(|| DriverError::Detached(element.reference.clone()))?;
        if !el.is_form_control() {
            return Err(DriverError::Script(format!("<{}> is not a form control", el.tag)));
        }
        el.value = text.to_string();
        Ok(())
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> DriverResult<()> {
        let state = self.live()?;
        state.target(element)?;
        Ok(())
    }

    async fn read(&self, element: &ElementHandle, subject: &Subject) -> DriverResult<Option<String>> {
        let state = self.live()?;
        let el = match state.target(element)? {
            Target::Root => {
                return Ok(match subject {
                    Subject::ClassList => Some(state.site.root_classes.join(" ")),
                    Subject::Attribute { name } if name == "class" => {
                        Some(state.site.root_classes.join(" "))
                    }
                    Subject::Text => Some(String::new()),
                    Subject::Presence => Some("true".to_string()),
                    _ => None,
                });
            }
            Target::Element(i) => &state.elements()[i],
        };
        Ok(match subject {
            Subject::Text => Some(normalize(&el.text)),
            Subject::ClassList => Some(el.classes.join(" ")),
            Subject::Attribute { name } => el.attribute(name),
            Subject::Style { property } => {
                let dark = state
                    .dark()
                    .then(|| el.dark_styles.get(property))
                    .flatten();
                dark.or_else(|| el.styles.get(property)).cloned()
            }
            Subject::Value => el.is_form_control().then(|| el.value.clone()),
            Subject::Presence => Some("true".to_string()),
        })
    }

    async fn screenshot(&self, target: ShotTarget<'_>) -> DriverResult<Vec<u8>> {
        let state = self.live()?;
        if state.site.broken_screenshots {
            return Err(DriverError::Protocol("screenshot capture failed".to_string()));
        }
        if let ShotTarget::Element(handle) = target {
            state.target(handle)?;
        }
        Ok(FAKE_PNG.to_vec())
    }

    async fn close(&self) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.closed {
            return Err(DriverError::Closed);
        }
        state.closed = true;
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
