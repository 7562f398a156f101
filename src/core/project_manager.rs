/*
 * Project persistence. A project on disk is a marker file `<name>.wbproj`
 * (JSON: format version, name, owner) next to a data directory
 * `<name>.wbdata/` holding `project.json` (display state + the persisted
 * open-document list), `tools.json` (session-tool states), a `documents/`
 * subtree of content files with sidecars, and a `~lock` file while some
 * process has the project open.
 *
 * It includes a trait for project operations (`ProjectManagerOperations`) to
 * facilitate testing and dependency injection, and a concrete implementation
 * (`CoreProjectManager`). Documents whose on-disk format version differs
 * from the current one are passed through an `UpgradeGate` before they are
 * restored into the open list.
 */
use crate::core::document::{
    CURRENT_FORMAT_VERSION, CoreDocument, DocumentError, DocumentMetadata, DocumentOperations,
};
use crate::core::models::{
    DisplayState, DocumentVersionInfo, ProjectLocator, VersionIndicator, VersionMismatch,
    is_valid_project_name_char,
};
use crate::core::project::Project;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

pub const PROJECT_MARKER_FORMAT_VERSION: u32 = 1;
const PROJECT_METADATA_FILENAME: &str = "project.json";
const TOOL_STATE_FILENAME: &str = "tools.json";
const DOCUMENTS_SUBFOLDER_NAME: &str = "documents";
const LOCK_FILENAME: &str = "~lock";

// Depth bound for marker scans; projects live at most a few levels below
// the chosen projects directory.
const FIND_PROJECTS_MAX_DEPTH: usize = 3;

#[derive(Debug)]
pub enum ProjectManagerError {
    Io(io::Error),
    Serde(serde_json::Error),
    Document(DocumentError),
    NotFound(ProjectLocator),
    AlreadyExists(ProjectLocator),
    NotOwner { locator: ProjectLocator, owner: String },
    Locked(ProjectLocator),
    InvalidName(String),
}

impl From<io::Error> for ProjectManagerError {
    fn from(err: io::Error) -> Self {
        ProjectManagerError::Io(err)
    }
}

impl From<serde_json::Error> for ProjectManagerError {
    fn from(err: serde_json::Error) -> Self {
        ProjectManagerError::Serde(err)
    }
}

impl From<DocumentError> for ProjectManagerError {
    fn from(err: DocumentError) -> Self {
        ProjectManagerError::Document(err)
    }
}

impl std::fmt::Display for ProjectManagerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectManagerError::Io(e) => write!(f, "I/O error: {e}"),
            ProjectManagerError::Serde(e) => write!(f, "Serialization/Deserialization error: {e}"),
            ProjectManagerError::Document(e) => write!(f, "Document error: {e}"),
            ProjectManagerError::NotFound(l) => write!(f, "Project not found: {l}"),
            ProjectManagerError::AlreadyExists(l) => write!(f, "Project already exists: {l}"),
            ProjectManagerError::NotOwner { locator, owner } => {
                write!(f, "Project {locator} is owned by '{owner}'")
            }
            ProjectManagerError::Locked(l) => {
                write!(f, "Project {l} is locked by another session")
            }
            ProjectManagerError::InvalidName(name) => write!(
                f,
                "Invalid project name: {name}. Contains invalid characters or is empty."
            ),
        }
    }
}

impl std::error::Error for ProjectManagerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProjectManagerError::Io(e) => Some(e),
            ProjectManagerError::Serde(e) => Some(e),
            ProjectManagerError::Document(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProjectManagerError>;

/*
 * Decides whether a document with a format-version mismatch may be opened
 * and upgraded in place. The concrete implementation lives in the
 * orchestration layer, where the user-decision surface is available.
 */
pub trait UpgradeGate {
    fn upgrade_permitted(
        &self,
        info: &DocumentVersionInfo,
        action: &str,
        mismatch: &VersionMismatch,
    ) -> bool;
}

#[derive(Debug, Serialize, Deserialize)]
struct ProjectMarker {
    format_version: u32,
    name: String,
    owner: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProjectMetadataFile {
    display_state: DisplayState,
    open_documents: Vec<PathBuf>,
}

pub trait ProjectManagerOperations: Send + Sync {
    fn create_project(&self, locator: &ProjectLocator) -> Result<Project>;
    fn open_project(&self, locator: &ProjectLocator, gate: &dyn UpgradeGate) -> Result<Project>;

    // Persists metadata (display state + open-document list) and tool states.
    fn save_project(&self, project: &Project) -> Result<()>;

    // Drops the on-disk project lock; called when the project closes.
    fn release_project_lock(&self, locator: &ProjectLocator);

    fn delete_project(&self, locator: &ProjectLocator) -> Result<()>;
    fn project_exists(&self, locator: &ProjectLocator) -> bool;
    fn find_projects(&self, dir: &Path) -> Result<Vec<ProjectLocator>>;

    // Creates a document inside the project's data directory and opens it.
    fn create_document(
        &self,
        project: &mut Project,
        rel_path: &Path,
        content: &str,
        metadata: DocumentMetadata,
    ) -> Result<()>;

    // Opens a single existing document into the project, version-gated.
    fn open_document(
        &self,
        project: &mut Project,
        rel_path: &Path,
        gate: &dyn UpgradeGate,
    ) -> Result<bool>;
}

pub struct CoreProjectManager {}

impl CoreProjectManager {
    pub fn new() -> Self {
        CoreProjectManager {}
    }

    fn current_user() -> String {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string())
    }

    fn documents_dir(locator: &ProjectLocator) -> PathBuf {
        locator.data_dir().join(DOCUMENTS_SUBFOLDER_NAME)
    }

    fn lock_path(locator: &ProjectLocator) -> PathBuf {
        locator.data_dir().join(LOCK_FILENAME)
    }

    fn validate_name(name: &str) -> Result<()> {
        if name.trim().is_empty() || !name.chars().all(is_valid_project_name_char) {
            return Err(ProjectManagerError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    fn read_marker(locator: &ProjectLocator) -> Result<ProjectMarker> {
        let file = File::open(locator.marker_path())?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    fn take_project_lock(locator: &ProjectLocator) -> Result<()> {
        let lock_path = Self::lock_path(locator);
        if lock_path.exists() {
            return Err(ProjectManagerError::Locked(locator.clone()));
        }
        fs::write(&lock_path, Self::current_user())?;
        log::trace!("CoreProjectManager: Took project lock {lock_path:?}");
        Ok(())
    }

    fn mismatch_for(format_version: u32) -> Option<VersionMismatch> {
        if format_version == CURRENT_FORMAT_VERSION {
            return None;
        }
        let indicator = if format_version < CURRENT_FORMAT_VERSION {
            VersionIndicator::Older
        } else {
            VersionIndicator::Newer
        };
        Some(VersionMismatch {
            indicator,
            upgradable: indicator == VersionIndicator::Older,
            detail: Some(format!(
                "stored format v{format_version}, current format v{CURRENT_FORMAT_VERSION}"
            )),
        })
    }

    /*
     * Restores one document from the persisted open-document list. Returns
     * Ok(None) when the document exists but the upgrade gate refuses it, so
     * the caller drops it from the open list without failing the whole open.
     */
    fn restore_document(
        locator: &ProjectLocator,
        rel_path: &Path,
        gate: &dyn UpgradeGate,
    ) -> Result<Option<Arc<dyn DocumentOperations>>> {
        let documents_dir = Self::documents_dir(locator);
        let doc = CoreDocument::open(&documents_dir, rel_path)?;
        if let Some(mismatch) = Self::mismatch_for(doc.metadata().format_version) {
            let info = doc.version_info();
            if !gate.upgrade_permitted(&info, "open", &mismatch) {
                log::warn!(
                    "CoreProjectManager: Document {rel_path:?} not restored; format upgrade refused."
                );
                return Ok(None);
            }
            log::info!(
                "CoreProjectManager: Document {rel_path:?} will be upgraded to format v{CURRENT_FORMAT_VERSION} on next save."
            );
        }
        Ok(Some(Arc::new(doc)))
    }

    // Loads metadata, tool states, and the persisted open-document list.
    // The caller already holds the project lock.
    fn load_opened_project(locator: &ProjectLocator, gate: &dyn UpgradeGate) -> Result<Project> {
        let metadata_path = locator.data_dir().join(PROJECT_METADATA_FILENAME);
        let metadata: ProjectMetadataFile = match File::open(&metadata_path) {
            Ok(file) => serde_json::from_reader(BufReader::new(file))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => ProjectMetadataFile::default(),
            Err(e) => return Err(e.into()),
        };

        let mut project = Project::new(locator.clone());
        project.set_display_state(metadata.display_state);

        let tools_path = locator.data_dir().join(TOOL_STATE_FILENAME);
        if tools_path.exists() {
            let file = File::open(&tools_path)?;
            let states: BTreeMap<String, serde_json::Value> =
                serde_json::from_reader(BufReader::new(file))?;
            project.set_tool_states(states);
        }

        for rel_path in &metadata.open_documents {
            match Self::restore_document(locator, rel_path, gate) {
                Ok(Some(doc)) => {
                    if let Err(e) = project.open_document(doc) {
                        log::warn!("CoreProjectManager: Skipping document on reopen: {e}");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("CoreProjectManager: Failed to restore document {rel_path:?}: {e}");
                }
            }
        }

        log::debug!(
            "CoreProjectManager: Opened project '{}' with {} document(s).",
            locator.name(),
            project.open_documents().len()
        );
        Ok(project)
    }
}

impl Default for CoreProjectManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectManagerOperations for CoreProjectManager {
    fn create_project(&self, locator: &ProjectLocator) -> Result<Project> {
        log::trace!("CoreProjectManager: Creating project '{}'", locator.name());
        Self::validate_name(locator.name())?;
        if locator.marker_path().exists() {
            return Err(ProjectManagerError::AlreadyExists(locator.clone()));
        }

        fs::create_dir_all(Self::documents_dir(locator))?;
        let marker = ProjectMarker {
            format_version: PROJECT_MARKER_FORMAT_VERSION,
            name: locator.name().to_string(),
            owner: Self::current_user(),
        };
        let file = File::create(locator.marker_path())?;
        serde_json::to_writer_pretty(BufWriter::new(file), &marker)?;

        let metadata = ProjectMetadataFile::default();
        let file = File::create(locator.data_dir().join(PROJECT_METADATA_FILENAME))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &metadata)?;

        Self::take_project_lock(locator)?;
        log::debug!("CoreProjectManager: Created project at {locator}");
        Ok(Project::new(locator.clone()))
    }

    fn open_project(&self, locator: &ProjectLocator, gate: &dyn UpgradeGate) -> Result<Project> {
        log::trace!("CoreProjectManager: Opening project '{}'", locator.name());
        if !locator.marker_path().exists() {
            return Err(ProjectManagerError::NotFound(locator.clone()));
        }

        let marker = Self::read_marker(locator)?;
        let user = Self::current_user();
        if marker.owner != user {
            return Err(ProjectManagerError::NotOwner {
                locator: locator.clone(),
                owner: marker.owner,
            });
        }

        Self::take_project_lock(locator)?;

        // Any failure past this point must not leave the lock file behind.
        match Self::load_opened_project(locator, gate) {
            Ok(project) => Ok(project),
            Err(e) => {
                self.release_project_lock(locator);
                Err(e)
            }
        }
    }

    fn save_project(&self, project: &Project) -> Result<()> {
        let locator = project.locator();
        log::trace!("CoreProjectManager: Saving project '{}'", locator.name());

        let metadata = ProjectMetadataFile {
            display_state: project.display_state().clone(),
            open_documents: project
                .open_documents()
                .iter()
                .map(|d| d.rel_path().to_path_buf())
                .collect(),
        };
        let file = File::create(locator.data_dir().join(PROJECT_METADATA_FILENAME))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &metadata)?;

        let file = File::create(locator.data_dir().join(TOOL_STATE_FILENAME))?;
        serde_json::to_writer_pretty(BufWriter::new(file), project.tool_states())?;

        log::debug!("CoreProjectManager: Saved project metadata for '{}'.", locator.name());
        Ok(())
    }

    fn release_project_lock(&self, locator: &ProjectLocator) {
        let lock_path = Self::lock_path(locator);
        if lock_path.exists() {
            if let Err(e) = fs::remove_file(&lock_path) {
                log::error!("CoreProjectManager: Failed to remove project lock {lock_path:?}: {e}");
            }
        }
    }

    fn delete_project(&self, locator: &ProjectLocator) -> Result<()> {
        log::trace!("CoreProjectManager: Deleting project '{}'", locator.name());
        if !locator.marker_path().exists() {
            return Err(ProjectManagerError::NotFound(locator.clone()));
        }
        if Self::lock_path(locator).exists() {
            log::warn!(
                "CoreProjectManager: Refusing to delete {locator}; live lock file (remove {:?} manually if stale).",
                Self::lock_path(locator)
            );
            return Err(ProjectManagerError::Locked(locator.clone()));
        }

        fs::remove_file(locator.marker_path())?;
        if locator.data_dir().exists() {
            fs::remove_dir_all(locator.data_dir())?;
        }
        log::info!("CoreProjectManager: Deleted project {locator}");
        Ok(())
    }

    fn project_exists(&self, locator: &ProjectLocator) -> bool {
        locator.marker_path().is_file()
    }

    /*
     * Scans `dir` (bounded depth) for project marker files and returns their
     * locators, sorted by name for stable presentation.
     */
    fn find_projects(&self, dir: &Path) -> Result<Vec<ProjectLocator>> {
        let mut found = Vec::new();
        for entry in WalkDir::new(dir)
            .max_depth(FIND_PROJECTS_MAX_DEPTH)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file()
                && let Some(locator) = ProjectLocator::from_marker_path(entry.path())
            {
                found.push(locator);
            }
        }
        found.sort_unstable_by(|a, b| a.name().cmp(b.name()));
        log::debug!(
            "CoreProjectManager: Found {} project(s) under {dir:?}.",
            found.len()
        );
        Ok(found)
    }

    fn create_document(
        &self,
        project: &mut Project,
        rel_path: &Path,
        content: &str,
        metadata: DocumentMetadata,
    ) -> Result<()> {
        let documents_dir = Self::documents_dir(project.locator());
        let doc = CoreDocument::create(&documents_dir, rel_path, content, metadata)?;
        project
            .open_document(Arc::new(doc))
            .map_err(|e| ProjectManagerError::Io(io::Error::other(e.to_string())))?;
        Ok(())
    }

    fn open_document(
        &self,
        project: &mut Project,
        rel_path: &Path,
        gate: &dyn UpgradeGate,
    ) -> Result<bool> {
        let locator = project.locator().clone();
        match Self::restore_document(&locator, rel_path, gate)? {
            Some(doc) => {
                project
                    .open_document(doc)
                    .map_err(|e| ProjectManagerError::Io(io::Error::other(e.to_string())))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct AllowAll;
    impl UpgradeGate for AllowAll {
        fn upgrade_permitted(
            &self,
            _info: &DocumentVersionInfo,
            _action: &str,
            _mismatch: &VersionMismatch,
        ) -> bool {
            true
        }
    }

    struct DenyAll;
    impl UpgradeGate for DenyAll {
        fn upgrade_permitted(
            &self,
            _info: &DocumentVersionInfo,
            _action: &str,
            _mismatch: &VersionMismatch,
        ) -> bool {
            false
        }
    }

    fn locator_in(dir: &TempDir, name: &str) -> ProjectLocator {
        ProjectLocator::new(dir.path(), name)
    }

    #[test]
    fn test_create_open_round_trip_with_documents() {
        let temp = TempDir::new().unwrap();
        let manager = CoreProjectManager::new();
        let locator = locator_in(&temp, "demo");

        let mut project = manager.create_project(&locator).unwrap();
        manager
            .create_document(
                &mut project,
                Path::new("firmware/boot.txt"),
                "boot image notes",
                DocumentMetadata::default(),
            )
            .unwrap();
        manager.save_project(&project).unwrap();
        project.close();
        manager.release_project_lock(&locator);

        let reopened = manager.open_project(&locator, &AllowAll).unwrap();
        assert_eq!(reopened.open_documents().len(), 1);
        assert_eq!(
            reopened.open_documents()[0].rel_path(),
            Path::new("firmware/boot.txt")
        );
        manager.release_project_lock(&locator);
    }

    #[test]
    fn test_create_refuses_existing_project() {
        let temp = TempDir::new().unwrap();
        let manager = CoreProjectManager::new();
        let locator = locator_in(&temp, "demo");
        manager.create_project(&locator).unwrap();
        manager.release_project_lock(&locator);

        let result = manager.create_project(&locator);
        assert!(matches!(result, Err(ProjectManagerError::AlreadyExists(_))));
    }

    #[test]
    fn test_create_rejects_invalid_names() {
        let temp = TempDir::new().unwrap();
        let manager = CoreProjectManager::new();
        assert!(matches!(
            manager.create_project(&locator_in(&temp, "")),
            Err(ProjectManagerError::InvalidName(_))
        ));
        assert!(matches!(
            manager.create_project(&locator_in(&temp, "bad/name")),
            Err(ProjectManagerError::InvalidName(_))
        ));
    }

    #[test]
    fn test_open_missing_project_not_found() {
        let temp = TempDir::new().unwrap();
        let manager = CoreProjectManager::new();
        let result = manager.open_project(&locator_in(&temp, "ghost"), &AllowAll);
        assert!(matches!(result, Err(ProjectManagerError::NotFound(_))));
    }

    #[test]
    fn test_open_twice_without_release_is_locked() {
        let temp = TempDir::new().unwrap();
        let manager = CoreProjectManager::new();
        let locator = locator_in(&temp, "demo");
        let project = manager.create_project(&locator).unwrap();
        drop(project);

        // The create still holds the on-disk lock.
        let result = manager.open_project(&locator, &AllowAll);
        assert!(matches!(result, Err(ProjectManagerError::Locked(_))));

        manager.release_project_lock(&locator);
        assert!(manager.open_project(&locator, &AllowAll).is_ok());
        manager.release_project_lock(&locator);
    }

    #[test]
    fn test_open_foreign_project_not_owner() {
        let temp = TempDir::new().unwrap();
        let manager = CoreProjectManager::new();
        let locator = locator_in(&temp, "demo");
        manager.create_project(&locator).unwrap();
        manager.release_project_lock(&locator);

        // Rewrite the marker as if another user had created the project.
        let marker = ProjectMarker {
            format_version: PROJECT_MARKER_FORMAT_VERSION,
            name: "demo".to_string(),
            owner: "somebody-else".to_string(),
        };
        let file = File::create(locator.marker_path()).unwrap();
        serde_json::to_writer_pretty(BufWriter::new(file), &marker).unwrap();

        match manager.open_project(&locator, &AllowAll) {
            Err(ProjectManagerError::NotOwner { owner, .. }) => {
                assert_eq!(owner, "somebody-else");
            }
            other => panic!("expected NotOwner, got {other:?}"),
        }
    }

    #[test]
    fn test_delete_refuses_locked_project_then_deletes() {
        let temp = TempDir::new().unwrap();
        let manager = CoreProjectManager::new();
        let locator = locator_in(&temp, "demo");
        manager.create_project(&locator).unwrap();

        assert!(matches!(
            manager.delete_project(&locator),
            Err(ProjectManagerError::Locked(_))
        ));

        manager.release_project_lock(&locator);
        manager.delete_project(&locator).unwrap();
        assert!(!manager.project_exists(&locator));
        assert!(!locator.data_dir().exists());
    }

    #[test]
    fn test_find_projects_scans_markers() {
        let temp = TempDir::new().unwrap();
        let manager = CoreProjectManager::new();
        for name in ["beta", "alpha"] {
            let locator = locator_in(&temp, name);
            manager.create_project(&locator).unwrap();
            manager.release_project_lock(&locator);
        }
        fs::write(temp.path().join("stray.txt"), "not a project").unwrap();

        let found = manager.find_projects(temp.path()).unwrap();
        let names: Vec<&str> = found.iter().map(|l| l.name()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_version_gated_document_dropped_when_refused() {
        let temp = TempDir::new().unwrap();
        let manager = CoreProjectManager::new();
        let locator = locator_in(&temp, "demo");

        let mut project = manager.create_project(&locator).unwrap();
        let stale_meta = DocumentMetadata {
            format_version: CURRENT_FORMAT_VERSION - 1,
            ..DocumentMetadata::default()
        };
        manager
            .create_document(&mut project, Path::new("old.txt"), "legacy", stale_meta)
            .unwrap();
        manager.save_project(&project).unwrap();
        project.close();
        manager.release_project_lock(&locator);

        let denied = manager.open_project(&locator, &DenyAll).unwrap();
        assert!(denied.open_documents().is_empty());
        manager.release_project_lock(&locator);

        let allowed = manager.open_project(&locator, &AllowAll).unwrap();
        assert_eq!(allowed.open_documents().len(), 1);
        manager.release_project_lock(&locator);
    }

    #[test]
    fn test_save_project_persists_display_state_and_tool_states() {
        let temp = TempDir::new().unwrap();
        let manager = CoreProjectManager::new();
        let locator = locator_in(&temp, "demo");

        let mut project = manager.create_project(&locator).unwrap();
        project.display_state_mut().set("window.maximized", "true");
        let mut states = BTreeMap::new();
        states.insert("listing".to_string(), serde_json::json!({"cursor": 7}));
        project.set_tool_states(states);
        manager.save_project(&project).unwrap();
        project.close();
        manager.release_project_lock(&locator);

        let reopened = manager.open_project(&locator, &AllowAll).unwrap();
        assert_eq!(reopened.display_state().get("window.maximized"), Some("true"));
        assert_eq!(
            reopened.tool_states().get("listing"),
            Some(&serde_json::json!({"cursor": 7}))
        );
        manager.release_project_lock(&locator);
    }
}
