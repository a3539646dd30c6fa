//! Evidence Capture
//!
//! Screenshots and computed-style snapshots written under
//! `<artifact_dir>/<scenario>/step<NN>_<label>.<ext>`. The scenario folder is
//! the slug of the name plus a digest of the exact name, so two scenarios whose
//! names only differ in case or punctuation still get separate folders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::driver::{ShotTarget, Subject};
use crate::error::EvidenceError;
use crate::locator::{self, LocatorSpec};
use crate::session::BrowserSession;

/// What a screenshot covers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureScope {
    /// The current viewport
    #[default]
    Page,
    /// The whole scrollable page
    FullPage,
    /// The first visible element matching the locator
    Element(LocatorSpec),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Screenshot,
    ElementScreenshot,
    StyleSnapshot,
}

/// A stored artifact and where it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub scenario: String,
    pub step: usize,
    pub label: String,
    pub captured_at: DateTime<Utc>,
}

/// Contents of a style snapshot file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleSnapshot {
    pub scenario: String,
    pub step: usize,
    pub label: String,
    pub locator: String,
    /// Property name to computed value (`None` when the property is unknown)
    pub styles: BTreeMap<String, Option<String>>,
    pub captured_at: DateTime<Utc>,
}

/// Writes artifacts for one scenario
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    scenario: String,
    dir: PathBuf,
}

impl EvidenceStore {
    pub fn new(artifact_dir: impl AsRef<Path>, scenario: impl Into<String>) -> Self {
        let scenario = scenario.into();
        let dir = artifact_dir.as_ref().join(scenario_dir_name(&scenario));
        Self { scenario, dir }
    }

    /// Directory holding this scenario's artifacts
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, step: usize, label: &str, extension: &str) -> PathBuf {
        self.dir
            .join(format!("step{:02}_{}.{}", step, slug(label), extension))
    }

    /// Take a screenshot of `scope` and store it as PNG
    pub async fn capture(
        &self,
        session: &BrowserSession,
        step: usize,
        label: &str,
        scope: &CaptureScope,
    ) -> Result<ArtifactRef, EvidenceError> {
        let (bytes, kind) = match scope {
            CaptureScope::Page => (
                session.screenshot(ShotTarget::Viewport).await?,
                ArtifactKind::Screenshot,
            ),
            CaptureScope::FullPage => (
                session.screenshot(ShotTarget::FullPage).await?,
                ArtifactKind::Screenshot,
            ),
            CaptureScope::Element(spec) => {
                let handle = locator::first_visible(session, spec)
                    .await?
                    .ok_or_else(|| EvidenceError::NoTarget(spec.to_string()))?;
                (
                    session.screenshot(ShotTarget::Element(&handle)).await?,
                    ArtifactKind::ElementScreenshot,
                )
            }
        };
        let path = self.path_for(step, label, "png");
        self.write(&path, &bytes)?;
        Ok(self.artifact(path, kind, step, label))
    }

    /// Record computed style `properties` of the first match of `spec` as JSON
    pub async fn snapshot_styles(
        &self,
        session: &BrowserSession,
        step: usize,
        label: &str,
        spec: &LocatorSpec,
        properties: &[String],
    ) -> Result<ArtifactRef, EvidenceError> {
        let matches = locator::resolve(session, spec).await?;
        let handle = matches
            .iter()
            .find(|h| h.visible)
            .or_else(|| matches.first())
            .ok_or_else(|| EvidenceError::NoTarget(spec.to_string()))?;

        let mut styles = BTreeMap::new();
        for property in properties {
            let subject = Subject::Style {
                property: property.clone(),
            };
            let value = session.driver().read(handle, &subject).await?;
            styles.insert(property.clone(), value);
        }

        let snapshot = StyleSnapshot {
            scenario: self.scenario.clone(),
            step,
            label: label.to_string(),
            locator: spec.to_string(),
            styles,
            captured_at: Utc::now(),
        };
        let path = self.path_for(step, label, "json");
        self.write(&path, serde_json::to_string_pretty(&snapshot)?.as_bytes())?;
        Ok(self.artifact(path, ArtifactKind::StyleSnapshot, step, label))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), EvidenceError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(path, bytes)?;
        debug!("Wrote artifact {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    fn artifact(&self, path: PathBuf, kind: ArtifactKind, step: usize, label: &str) -> ArtifactRef {
        ArtifactRef {
            path,
            kind,
            scenario: self.scenario.clone(),
            step,
            label: label.to_string(),
            captured_at: Utc::now(),
        }
    }
}

/// Folder name for a scenario's artifacts: `<slug>-<8 hex digits>`
///
/// The digest covers the exact name, so distinct names never share a folder.
pub fn scenario_dir_name(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    format!("{}-{}", slug(name), hex::encode(&digest[..4]))
}

/// Lower-case file-name-safe form of `name`
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{MockElement, MockLauncher, MockPage, MockSite};

    #[test]
    fn test_slug() {
        assert_eq!(slug("Dark mode: toggle round trip"), "dark-mode-toggle-round-trip");
        assert_eq!(slug("after_submit"), "after_submit");
        assert_eq!(slug("../../etc/passwd"), "etc-passwd");
        assert_eq!(slug("***"), "unnamed");
    }

    #[test]
    fn test_scenario_dir_name_keeps_distinct_names_apart() {
        assert!(scenario_dir_name("Dark Mode").starts_with("dark-mode-"));
        assert_eq!(scenario_dir_name("Dark Mode").len(), "dark-mode-".len() + 8);
        assert_eq!(scenario_dir_name("Dark Mode"), scenario_dir_name("Dark Mode"));
        assert_ne!(scenario_dir_name("Dark Mode"), scenario_dir_name("dark mode!"));
        assert_ne!(scenario_dir_name("Überblick"), scenario_dir_name("Ärger"));
        assert!(scenario_dir_name("日本").starts_with("unnamed-"));
    }

    #[tokio::test]
    async fn test_similar_names_do_not_overwrite_each_other() {
        let tmp = tempfile::tempdir().unwrap();
        let first = EvidenceStore::new(tmp.path(), "Dark Mode");
        let second = EvidenceStore::new(tmp.path(), "dark mode!");
        assert_ne!(first.dir(), second.dir());

        let session = session().await;
        let a = first.capture(&session, 1, "home", &CaptureScope::Page).await.unwrap();
        let b = second.capture(&session, 1, "home", &CaptureScope::Page).await.unwrap();
        assert_ne!(a.path, b.path);
        assert!(a.path.exists());
        assert!(b.path.exists());
        session.close().await;
    }

    #[test]
    fn test_paths_are_tagged_by_scenario_and_step() {
        let store = EvidenceStore::new("/tmp/verification", "Home Page");
        let dir = PathBuf::from("/tmp/verification").join(scenario_dir_name("Home Page"));
        assert_eq!(store.dir(), dir.as_path());
        assert_eq!(
            store.path_for(3, "Heading (dark)", "png"),
            dir.join("step03_heading-dark.png")
        );
        assert_ne!(store.path_for(3, "x", "png"), store.path_for(4, "x", "png"));
        assert_ne!(
            EvidenceStore::new("/tmp/v", "A").path_for(1, "x", "png"),
            EvidenceStore::new("/tmp/v", "B").path_for(1, "x", "png")
        );
    }

    #[test]
    fn test_capture_scope_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            scope: CaptureScope,
        }
        let parsed: Wrapper = toml::from_str(r#"scope = "full_page""#).unwrap();
        assert_eq!(parsed.scope, CaptureScope::FullPage);

        let parsed: Wrapper =
            toml::from_str(r#"scope = { element = { by = "css", selector = "h1" } }"#).unwrap();
        assert_eq!(parsed.scope, CaptureScope::Element(LocatorSpec::css("h1")));
    }

    async fn session() -> BrowserSession {
        let site = MockSite::new().page(
            "/",
            MockPage::new().with(
                MockElement::heading(1, "Home")
                    .style("color", "rgb(0, 0, 0)")
                    .style("font-family", "serif"),
            ),
        );
        BrowserSession::open(&MockLauncher::new(site), "http://localhost:5173/")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_capture_writes_png() {
        let tmp = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(tmp.path(), "Home");
        let session = session().await;

        let artifact = store
            .capture(&session, 1, "landing", &CaptureScope::FullPage)
            .await
            .unwrap();
        assert_eq!(artifact.kind, ArtifactKind::Screenshot);
        assert_eq!(artifact.step, 1);
        let bytes = fs::read(&artifact.path).unwrap();
        assert!(bytes.starts_with(b"\x89PNG"));

        let element = store
            .capture(&session, 2, "heading", &CaptureScope::Element(LocatorSpec::heading(1)))
            .await
            .unwrap();
        assert_eq!(element.kind, ArtifactKind::ElementScreenshot);
        session.close().await;
    }

    #[tokio::test]
    async fn test_missing_element_is_no_target() {
        let tmp = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(tmp.path(), "Home");
        let session = session().await;

        let err = store
            .capture(&session, 1, "logo", &CaptureScope::Element(LocatorSpec::alt_text("logo")))
            .await
            .unwrap_err();
        assert!(matches!(err, EvidenceError::NoTarget(_)));
        session.close().await;
    }

    #[tokio::test]
    async fn test_style_snapshot_records_requested_properties() {
        let tmp = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(tmp.path(), "Home");
        let session = session().await;

        let artifact = store
            .snapshot_styles(
                &session,
                4,
                "heading styles",
                &LocatorSpec::heading(1),
                &["color".to_string(), "margin-top".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(artifact.kind, ArtifactKind::StyleSnapshot);
        assert!(artifact
            .path
            .ends_with(format!("{}/step04_heading-styles.json", scenario_dir_name("Home"))));

        let snapshot: StyleSnapshot =
            serde_json::from_str(&fs::read_to_string(&artifact.path).unwrap()).unwrap();
        assert_eq!(snapshot.styles["color"].as_deref(), Some("rgb(0, 0, 0)"));
        assert_eq!(snapshot.styles["margin-top"], None);
        assert_eq!(snapshot.locator, "role=heading[level=1]");
        session.close().await;
    }
}
