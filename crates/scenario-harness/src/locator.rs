//! Locator resolution against the live DOM
//!
//! A [`LocatorSpec`] describes how to find elements; it is never cached.
//! Every call to [`resolve`] re-queries the current document, so a handle
//! obtained in one step is never reused by the next.
//!
//! Multiple matches are tolerated. Callers that need a single element use
//! [`first_visible`], which picks the first visible candidate and logs the
//! ambiguity instead of rejecting it (pages legitimately repeat decorative
//! elements such as logos).

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::DriverResult;
use crate::session::BrowserSession;

/// How to find one or more elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum LocatorSpec {
    /// Accessible role with an optional accessible name
    Role {
        role: String,
        #[serde(default)]
        name: Option<String>,
        /// Heading level filter (only meaningful for `heading`)
        #[serde(default)]
        level: Option<u8>,
        /// Require the accessible name to match exactly instead of by substring
        #[serde(default)]
        exact: bool,
    },
    /// Form control or element labelled by the given text (`aria-label` or `<label>`)
    Label { text: String },
    /// Elements whose attribute value contains a substring (`img[src*=...]`)
    Attribute { name: String, contains: String },
    /// Raw CSS selector
    Css { selector: String },
    /// Innermost elements whose text content matches
    Text {
        text: String,
        #[serde(default)]
        exact: bool,
    },
    /// Images (or other elements) by alt text
    AltText { text: String },
}

impl LocatorSpec {
    /// Locate by role and accessible name (substring match)
    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Role {
            role: role.into(),
            name: Some(name.into()),
            level: None,
            exact: false,
        }
    }

    /// Locate any heading of the given level
    pub fn heading(level: u8) -> Self {
        Self::Role {
            role: "heading".to_string(),
            name: None,
            level: Some(level),
            exact: false,
        }
    }

    pub fn label(text: impl Into<String>) -> Self {
        Self::Label { text: text.into() }
    }

    pub fn attribute(name: impl Into<String>, contains: impl Into<String>) -> Self {
        Self::Attribute {
            name: name.into(),
            contains: contains.into(),
        }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css {
            selector: selector.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            exact: false,
        }
    }

    pub fn alt_text(text: impl Into<String>) -> Self {
        Self::AltText { text: text.into() }
    }

    /// Build a JavaScript expression that returns every match as
    /// `[{ reference, tag, visible }]`. The reference is a structural
    /// `:nth-child` path from `html`; the script only reads the document.
    pub fn to_query_script(&self) -> String {
        format!(
            r#"(() => {{
    const norm = s => (s || '').replace(/\s+/g, ' ').trim();
    const textMatch = (actual, wanted, exact) => exact
        ? norm(actual) === norm(wanted)
        : norm(actual).toLowerCase().includes(norm(wanted).toLowerCase());
    const isVisible = el => {{
        const style = getComputedStyle(el);
        if (style.display === 'none' || style.visibility === 'hidden' || style.visibility === 'collapse') return false;
        const rect = el.getBoundingClientRect();
        return rect.width > 0 && rect.height > 0;
    }};
    const accessibleName = el => {{
        const labelledBy = el.getAttribute('aria-labelledby');
        const fromIds = labelledBy
            ? labelledBy.split(/\s+/).map(id => {{ const n = document.getElementById(id); return n ? n.textContent : ''; }}).join(' ')
            : '';
        const fromLabels = el.labels && el.labels.length
            ? Array.from(el.labels).map(l => l.textContent).join(' ')
            : '';
        return norm(el.getAttribute('aria-label') || fromIds || el.getAttribute('alt') || fromLabels
            || el.getAttribute('title') || el.textContent || el.getAttribute('placeholder') || '');
    }};
    const headingLevel = el => {{
        const m = /^H([1-6])$/.exec(el.tagName);
        if (m) return Number(m[1]);
        const aria = el.getAttribute('aria-level');
        return aria ? Number(aria) : null;
    }};
    const structuralPath = el => {{
        const parts = [];
        for (let n = el; n && n.parentElement; n = n.parentElement) {{
            const index = Array.prototype.indexOf.call(n.parentElement.children, n) + 1;
            parts.unshift(n.localName + ':nth-child(' + index + ')');
        }}
        parts.unshift(':root');
        return parts.join(' > ');
    }};
    const found = {candidates};
    return found.map(el => ({{
        reference: structuralPath(el),
        tag: el.tagName.toLowerCase(),
        visible: isVisible(el)
    }}));
}})()"#,
            candidates = self.candidates_expression(),
        )
    }

    fn candidates_expression(&self) -> String {
        match self {
            Self::Role {
                role,
                name,
                level,
                exact,
            } => {
                let level = level.map_or("null".to_string(), |l| l.to_string());
                let name = name.as_deref().map_or("null".to_string(), js_string);
                format!(
                    "Array.from(document.querySelectorAll({selector})).filter(el => \
                     ({level} === null || headingLevel(el) === {level}) && \
                     ({name} === null || textMatch(accessibleName(el), {name}, {exact})))",
                    selector = js_string(&implicit_role_selector(role)),
                )
            }
            Self::Label { text } => format!(
                "(() => {{ const out = []; \
                 document.querySelectorAll('[aria-label]').forEach(el => {{ \
                 if (textMatch(el.getAttribute('aria-label'), {text}, false)) out.push(el); }}); \
                 document.querySelectorAll('label').forEach(l => {{ \
                 if (!textMatch(l.textContent, {text}, false)) return; \
                 const c = l.control || (l.htmlFor ? document.getElementById(l.htmlFor) : l.querySelector('input,textarea,select')); \
                 if (c && !out.includes(c)) out.push(c); }}); \
                 return out; }})()",
                text = js_string(text)
            ),
            Self::Attribute { name, contains } => format!(
                "Array.from(document.querySelectorAll('[' + CSS.escape({name}) + ']')).filter(el => \
                 (el.getAttribute({name}) || '').includes({contains}))",
                name = js_string(name),
                contains = js_string(contains)
            ),
            Self::Css { selector } => format!(
                "Array.from(document.querySelectorAll({}))",
                js_string(selector)
            ),
            Self::Text { text, exact } => format!(
                "Array.from(document.querySelectorAll('body *')).filter(el => \
                 textMatch(el.textContent, {text}, {exact}) && \
                 !Array.from(el.children).some(c => textMatch(c.textContent, {text}, {exact})))",
                text = js_string(text)
            ),
            Self::AltText { text } => format!(
                "Array.from(document.querySelectorAll('[alt]')).filter(el => \
                 textMatch(el.getAttribute('alt'), {}, false))",
                js_string(text)
            ),
        }
    }
}

impl fmt::Display for LocatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role {
                role, name, level, ..
            } => {
                write!(f, "role={}", role)?;
                if let Some(level) = level {
                    write!(f, "[level={}]", level)?;
                }
                if let Some(name) = name {
                    write!(f, "[name={:?}]", name)?;
                }
                Ok(())
            }
            Self::Label { text } => write!(f, "label={:?}", text),
            Self::Attribute { name, contains } => write!(f, "[{}*={:?}]", name, contains),
            Self::Css { selector } => write!(f, "css={}", selector),
            Self::Text { text, .. } => write!(f, "text={:?}", text),
            Self::AltText { text } => write!(f, "alt={:?}", text),
        }
    }
}

/// CSS selector list matching elements that carry a role implicitly or explicitly
pub fn implicit_role_selector(role: &str) -> String {
    let implicit = match role {
        "heading" => "h1,h2,h3,h4,h5,h6",
        "link" => "a[href],area[href]",
        "button" => "button,input[type=\"button\"],input[type=\"submit\"],input[type=\"reset\"]",
        "textbox" => {
            "input:not([type]),input[type=\"text\"],input[type=\"email\"],input[type=\"search\"],\
             input[type=\"tel\"],input[type=\"url\"],input[type=\"password\"],textarea"
        }
        "img" => "img[alt]:not([alt=\"\"])",
        "checkbox" => "input[type=\"checkbox\"]",
        "banner" => "header",
        "navigation" => "nav",
        "main" => "main",
        "contentinfo" => "footer",
        "list" => "ul,ol",
        "listitem" => "li",
        _ => "",
    };
    if implicit.is_empty() {
        format!("[role=\"{}\"]", role)
    } else {
        format!("{},[role=\"{}\"]", implicit, role)
    }
}

/// Encode a Rust string as a JavaScript string literal
pub(crate) fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// A handle to one element as it existed when the locator was resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Driver-specific address of the element (a CSS selector for CDP drivers)
    pub reference: String,
    /// Lower-case tag name
    pub tag: String,
    /// Whether the element was rendered and visible at resolution time
    pub visible: bool,
}

/// Resolve every element currently matching `spec`
pub async fn resolve(session: &BrowserSession, spec: &LocatorSpec) -> DriverResult<Vec<ElementHandle>> {
    session.driver().query(spec).await
}

/// Whether at least one match exists and is visible
pub async fn exists_and_visible(session: &BrowserSession, spec: &LocatorSpec) -> DriverResult<bool> {
    Ok(first_visible(session, spec).await?.is_some())
}

/// The first visible match, if any
pub async fn first_visible(
    session: &BrowserSession,
    spec: &LocatorSpec,
) -> DriverResult<Option<ElementHandle>> {
    let matches = resolve(session, spec).await?;
    let visible = matches.iter().filter(|h| h.visible).count();
    if visible > 1 {
        debug!("{} matched {} visible elements, using the first", spec, visible);
    }
    Ok(matches.into_iter().find(|h| h.visible))
}
