/*
 * Core data types shared across the crate: the project locator (which owns
 * knowledge of the on-disk project layout), the saveable display-state map,
 * recent-project bookkeeping entries, and the version-mismatch surface used
 * by the upgrade gate. Higher layers work with these values; filesystem
 * topology stays inside `core`.
 */
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const PROJECT_MARKER_EXTENSION: &str = "wbproj";
pub const PROJECT_DATA_DIR_EXTENSION: &str = "wbdata";

pub fn is_valid_project_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == ' '
}

/*
 * Identifies a project by its parent directory and name, and resolves the
 * paths that make up the project on disk: a marker file `<name>.wbproj`
 * next to a data directory `<name>.wbdata/`. Callers use these resolvers
 * instead of hand-built paths.
 */
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectLocator {
    parent_dir: PathBuf,
    name: String,
}

impl ProjectLocator {
    pub fn new(parent_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        ProjectLocator {
            parent_dir: parent_dir.into(),
            name: name.into(),
        }
    }

    /*
     * Builds a locator from a marker file path, if the path carries the
     * project marker extension. Used when scanning directories for projects.
     */
    pub fn from_marker_path(marker: &Path) -> Option<Self> {
        let ext = marker.extension()?;
        if ext != PROJECT_MARKER_EXTENSION {
            return None;
        }
        let name = marker.file_stem()?.to_str()?.to_string();
        let parent = marker.parent()?.to_path_buf();
        Some(ProjectLocator::new(parent, name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_dir(&self) -> &Path {
        &self.parent_dir
    }

    pub fn marker_path(&self) -> PathBuf {
        self.parent_dir
            .join(format!("{}.{}", self.name, PROJECT_MARKER_EXTENSION))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.parent_dir
            .join(format!("{}.{}", self.name, PROJECT_DATA_DIR_EXTENSION))
    }
}

impl std::fmt::Display for ProjectLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.marker_path().display())
    }
}

/*
 * Display state persisted with the project metadata: a flat string map the
 * shell uses to restore window/tool arrangement on reopen. A BTreeMap keeps
 * the serialized form stable.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayState {
    entries: BTreeMap<String, String>,
}

impl DisplayState {
    pub fn new() -> Self {
        DisplayState::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// An entry in the recent-projects list, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentProjectEntry {
    pub marker_path: PathBuf,
    pub last_opened_unix: i64,
}

/*
 * Relationship between a document's on-disk format version and the version
 * this build writes. `Unknown` covers sidecars whose version stamp cannot
 * be interpreted at all.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionIndicator {
    Older,
    Newer,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct VersionMismatch {
    pub indicator: VersionIndicator,
    pub upgradable: bool,
    pub detail: Option<String>,
}

/*
 * The slice of document state the upgrade gate needs to decide whether an
 * in-place format upgrade is permitted. Mirrors the sidecar's
 * version-control markers without exposing the document itself.
 */
#[derive(Debug, Clone)]
pub struct DocumentVersionInfo {
    pub name: String,
    pub content_type: String,
    pub read_only: bool,
    pub versioned: bool,
    pub checked_out: bool,
    pub exclusive_checkout: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_locator_resolves_marker_and_data_dir() {
        let locator = ProjectLocator::new("/projects", "analysis");
        assert_eq!(
            locator.marker_path(),
            PathBuf::from("/projects/analysis.wbproj")
        );
        assert_eq!(
            locator.data_dir(),
            PathBuf::from("/projects/analysis.wbdata")
        );
        assert_eq!(locator.name(), "analysis");
    }

    #[test]
    fn test_locator_from_marker_path_round_trip() {
        let locator = ProjectLocator::new("/projects", "firmware_v2");
        let rebuilt = ProjectLocator::from_marker_path(&locator.marker_path())
            .expect("marker path should parse back into a locator");
        assert_eq!(rebuilt, locator);
    }

    #[test]
    fn test_locator_from_marker_path_rejects_other_extensions() {
        assert!(ProjectLocator::from_marker_path(Path::new("/projects/notes.txt")).is_none());
        assert!(ProjectLocator::from_marker_path(Path::new("/projects/plain")).is_none());
    }

    #[test]
    fn test_project_name_char_validation() {
        assert!("fw dump-2_x".chars().all(is_valid_project_name_char));
        assert!(!is_valid_project_name_char('/'));
        assert!(!is_valid_project_name_char('.'));
    }

    #[test]
    fn test_display_state_set_get() {
        let mut state = DisplayState::new();
        assert!(state.is_empty());
        state.set("tree.expanded", "true");
        assert_eq!(state.get("tree.expanded"), Some("true"));
        assert_eq!(state.get("missing"), None);
    }
}
