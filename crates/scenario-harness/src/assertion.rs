//! Assertion Engine
//!
//! Compares a sampled [`Actual`] against an [`ExpectedValue`] using a
//! [`Comparison`] and classifies the outcome. Expected variability never
//! raises: a mismatch is a `fail` for structural checks (text, classes,
//! existence) and a `warn` for color checks, since rendering pipelines can
//! briefly report intermediate values during transitions.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::report::{Status, StepResult};
use crate::wait::has_token;

/// What the page is expected to show
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpectedValue {
    Text { value: String },
    /// Regular expression (Rust `regex` syntax)
    Pattern { pattern: String },
    /// CSS color such as `rgb(239, 68, 68)` or `#ef4444`, with a per-channel tolerance
    Color {
        value: String,
        #[serde(default)]
        tolerance: u8,
    },
    Exists { value: bool },
}

impl ExpectedValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
        }
    }

    pub fn color(value: impl Into<String>) -> Self {
        Self::Color {
            value: value.into(),
            tolerance: 0,
        }
    }

    pub fn exists(value: bool) -> Self {
        Self::Exists { value }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Pattern { .. } => "pattern",
            Self::Color { .. } => "color",
            Self::Exists { .. } => "exists",
        }
    }
}

impl fmt::Display for ExpectedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { value } => write!(f, "{:?}", value),
            Self::Pattern { pattern } => write!(f, "/{}/", pattern),
            Self::Color { value, tolerance: 0 } => write!(f, "{}", value),
            Self::Color { value, tolerance } => write!(f, "{} (±{})", value, tolerance),
            Self::Exists { value } => write!(f, "{}", value),
        }
    }
}

/// How actual and expected are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// String equality
    Exact,
    /// Substring containment
    Contains,
    /// Whole token of a space separated list (class lists)
    ContainsToken,
    /// Regular expression match
    Matches,
    /// Color channels within tolerance; mismatches are advisory
    Color,
    /// Element presence in the DOM
    Existence,
    /// Element visibility
    Visibility,
}

impl Comparison {
    /// Whether this comparison can evaluate the given expectation
    pub fn accepts(&self, expected: &ExpectedValue) -> bool {
        matches!(
            (self, expected),
            (
                Comparison::Exact | Comparison::Contains | Comparison::ContainsToken,
                ExpectedValue::Text { .. }
            ) | (Comparison::Matches, ExpectedValue::Pattern { .. })
                | (Comparison::Color, ExpectedValue::Color { .. })
                | (
                    Comparison::Existence | Comparison::Visibility,
                    ExpectedValue::Exists { .. }
                )
        )
    }

    /// Whether the comparison only needs presence/visibility, not a sampled value
    pub fn is_structural(&self) -> bool {
        matches!(self, Comparison::Existence | Comparison::Visibility)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Comparison::Exact => "exact",
            Comparison::Contains => "contains",
            Comparison::ContainsToken => "contains_token",
            Comparison::Matches => "matches",
            Comparison::Color => "color",
            Comparison::Existence => "existence",
            Comparison::Visibility => "visibility",
        }
    }
}

/// What was observed on the page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actual {
    /// Whether any element matched the locator
    pub present: bool,
    /// Whether a matched element is visible
    pub visible: bool,
    /// Sampled value; `None` when absent (no element, missing attribute)
    pub value: Option<String>,
}

impl Actual {
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn sampled(visible: bool, value: Option<String>) -> Self {
        Self {
            present: true,
            visible,
            value,
        }
    }

    fn describe(&self, comparison: Comparison) -> String {
        match comparison {
            Comparison::Existence => self.present.to_string(),
            Comparison::Visibility => self.visible.to_string(),
            _ => match &self.value {
                Some(v) => format!("{:?}", v),
                None if !self.present => "<no element>".to_string(),
                None => "<none>".to_string(),
            },
        }
    }
}

/// Evaluate one comparison.
///
/// The result carries the status, a message and both values; the caller
/// fills in step identity and timing.
pub fn assert_matches(actual: &Actual, expected: &ExpectedValue, comparison: Comparison) -> StepResult {
    let status = evaluate(actual, expected, comparison);
    let shown = actual.describe(comparison);
    let message = match status {
        Status::Pass => format!("{} {}", comparison.name(), expected),
        _ => format!(
            "expected {} {}, got {}",
            comparison.name(),
            expected,
            shown
        ),
    };
    StepResult::new(status, message).with_values(expected.to_string(), Some(shown))
}

fn evaluate(actual: &Actual, expected: &ExpectedValue, comparison: Comparison) -> Status {
    if !comparison.accepts(expected) {
        return Status::Fail;
    }
    let value = actual.value.as_deref();
    let pass = match (comparison, expected) {
        (Comparison::Existence, ExpectedValue::Exists { value }) => actual.present == *value,
        (Comparison::Visibility, ExpectedValue::Exists { value }) => actual.visible == *value,
        (Comparison::Exact, ExpectedValue::Text { value: want }) => value == Some(want.as_str()),
        (Comparison::Contains, ExpectedValue::Text { value: want }) => {
            value.is_some_and(|v| v.contains(want.as_str()))
        }
        (Comparison::ContainsToken, ExpectedValue::Text { value: want }) => {
            value.is_some_and(|v| has_token(v, want))
        }
        (Comparison::Matches, ExpectedValue::Pattern { pattern }) => match Regex::new(pattern) {
            Ok(re) => value.is_some_and(|v| re.is_match(v)),
            Err(_) => return Status::Fail,
        },
        (Comparison::Color, ExpectedValue::Color { value: want, tolerance }) => {
            let matched = match (value.and_then(Rgba::parse), Rgba::parse(want)) {
                (Some(got), Some(want)) => got.within(&want, *tolerance),
                _ => false,
            };
            return if matched { Status::Pass } else { Status::Warn };
        }
        _ => false,
    };
    if pass {
        Status::Pass
    } else {
        Status::Fail
    }
}

/// An sRGB color with 8-bit channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `rgb()`/`rgba()` (comma or space syntax), `#rgb`, `#rgba`,
    /// `#rrggbb`, `#rrggbbaa` and a handful of named colors
    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim().to_ascii_lowercase();
        if let Some(hex) = s.strip_prefix('#') {
            return Self::parse_hex(hex);
        }
        if let Some(args) = s
            .strip_prefix("rgba(")
            .or_else(|| s.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return Self::parse_functional(args);
        }
        Self::named(&s)
    }

    fn parse_hex(hex: &str) -> Option<Self> {
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match hex.len() {
            3 => Some(Self::rgb(nibble(0)?, nibble(1)?, nibble(2)?)),
            4 => Some(Self {
                a: nibble(3)?,
                ..Self::rgb(nibble(0)?, nibble(1)?, nibble(2)?)
            }),
            6 => Some(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Self {
                a: byte(6)?,
                ..Self::rgb(byte(0)?, byte(2)?, byte(4)?)
            }),
            _ => None,
        }
    }

    fn parse_functional(args: &str) -> Option<Self> {
        let (channels, alpha) = match args.split_once('/') {
            Some((channels, alpha)) => (channels, Some(alpha.trim())),
            None => (args, None),
        };
        let mut parts: Vec<&str> = channels
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect();
        let alpha = match (alpha, parts.len()) {
            (Some(a), 3) => Some(a),
            (None, 4) => parts.pop(),
            (None, 3) => None,
            _ => return None,
        };
        let channel = |p: &str| -> Option<u8> {
            let v = match p.strip_suffix('%') {
                Some(pct) => pct.parse::<f64>().ok()? * 2.55,
                None => p.parse::<f64>().ok()?,
            };
            (0.0..=255.0).contains(&v).then(|| v.round() as u8)
        };
        let a = match alpha {
            Some(a) => {
                let v = match a.strip_suffix('%') {
                    Some(pct) => pct.parse::<f64>().ok()? / 100.0,
                    None => a.parse::<f64>().ok()?,
                };
                if !(0.0..=1.0).contains(&v) {
                    return None;
                }
                (v * 255.0).round() as u8
            }
            None => 255,
        };
        Some(Self {
            r: channel(parts[0])?,
            g: channel(parts[1])?,
            b: channel(parts[2])?,
            a,
        })
    }

    fn named(name: &str) -> Option<Self> {
        let color = match name {
            "black" => Self::rgb(0, 0, 0),
            "white" => Self::rgb(255, 255, 255),
            "red" => Self::rgb(255, 0, 0),
            "green" => Self::rgb(0, 128, 0),
            "blue" => Self::rgb(0, 0, 255),
            "gray" | "grey" => Self::rgb(128, 128, 128),
            "transparent" => Self { a: 0, ..Self::rgb(0, 0, 0) },
            _ => return None,
        };
        Some(color)
    }

    /// Every channel (alpha included) differs by at most `tolerance`
    pub fn within(&self, other: &Rgba, tolerance: u8) -> bool {
        [
            (self.r, other.r),
            (self.g, other.g),
            (self.b, other.b),
            (self.a, other.a),
        ]
        .iter()
        .all(|(x, y)| x.abs_diff(*y) <= tolerance)
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
        } else {
            write!(
                f,
                "rgba({}, {}, {}, {:.3})",
                self.r,
                self.g,
                self.b,
                f64::from(self.a) / 255.0
            )
        }
    }
}
