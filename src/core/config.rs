/*
 * Application-level configuration: the pointer to the last opened project
 * and the recent-projects list backing the shell's reopen menu. Both live in
 * the platform's local configuration directory (resolved via `path_utils`),
 * the pointer as a plain text file, the recent list as JSON.
 *
 * It uses a trait-based approach (`ConfigManagerOperations`) to allow for
 * different storage backends or mock implementations for testing; the
 * primary concrete implementation (`CoreConfigManager`) handles the file
 * system interactions.
 */
use crate::core::models::RecentProjectEntry;
use crate::core::path_utils;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const LAST_PROJECT_PATH_FILENAME: &str = "last_project_path.txt";
const RECENT_PROJECTS_FILENAME: &str = "recent_projects.json";

// Capacity of the recent-projects list, matching a shell reopen menu.
pub const RECENT_PROJECTS_CAP: usize = 8;

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Serde(serde_json::Error),
    NoConfigDirectory,
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Serde(err)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Configuration I/O error: {e}"),
            ConfigError::Serde(e) => write!(f, "Configuration serialization error: {e}"),
            ConfigError::NoConfigDirectory => {
                write!(f, "Could not determine configuration directory")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Serde(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

pub trait ConfigManagerOperations: Send + Sync {
    fn load_last_project_path(&self, app_name: &str) -> Result<Option<PathBuf>>;
    fn save_last_project_path(&self, app_name: &str, project_path: Option<&Path>) -> Result<()>;

    // Recent projects, most recent first.
    fn load_recent_projects(&self, app_name: &str) -> Result<Vec<RecentProjectEntry>>;

    /*
     * Moves (or inserts) the given marker path to the front of the recent
     * list, stamped with `opened_at_unix`, deduplicated and capped.
     */
    fn record_recent_project(
        &self,
        app_name: &str,
        marker_path: &Path,
        opened_at_unix: i64,
    ) -> Result<()>;
}

pub struct CoreConfigManager {}

impl CoreConfigManager {
    pub fn new() -> Self {
        CoreConfigManager {}
    }

    fn config_file(app_name: &str, filename: &str) -> Result<PathBuf> {
        let config_dir = path_utils::get_base_app_config_local_dir(app_name)
            .ok_or(ConfigError::NoConfigDirectory)?;
        Ok(config_dir.join(filename))
    }
}

impl Default for CoreConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

// Pure list maintenance, shared by the concrete manager and test doubles.
pub fn push_recent_entry(
    mut entries: Vec<RecentProjectEntry>,
    marker_path: &Path,
    opened_at_unix: i64,
) -> Vec<RecentProjectEntry> {
    entries.retain(|e| e.marker_path != marker_path);
    entries.insert(
        0,
        RecentProjectEntry {
            marker_path: marker_path.to_path_buf(),
            last_opened_unix: opened_at_unix,
        },
    );
    entries.truncate(RECENT_PROJECTS_CAP);
    entries
}

impl ConfigManagerOperations for CoreConfigManager {
    /*
     * Loads the path of the last opened project. An absent or empty pointer
     * file yields `None`.
     */
    fn load_last_project_path(&self, app_name: &str) -> Result<Option<PathBuf>> {
        log::trace!("CoreConfigManager: Loading last project path for app '{app_name}'");
        let file_path = Self::config_file(app_name, LAST_PROJECT_PATH_FILENAME)?;

        if !file_path.exists() {
            log::debug!("CoreConfigManager: Last project file {file_path:?} does not exist.");
            return Ok(None);
        }

        let mut file = File::open(&file_path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let trimmed = contents.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            log::debug!("CoreConfigManager: Loaded last project path '{trimmed}'.");
            Ok(Some(PathBuf::from(trimmed)))
        }
    }

    /*
     * Saves the path of the last opened project. Passing `None` clears the
     * stored value.
     */
    fn save_last_project_path(&self, app_name: &str, project_path: Option<&Path>) -> Result<()> {
        log::trace!(
            "CoreConfigManager: Saving last project path {project_path:?} for app '{app_name}'"
        );
        let file_path = Self::config_file(app_name, LAST_PROJECT_PATH_FILENAME)?;

        let mut file = File::create(&file_path)?;
        if let Some(path) = project_path {
            file.write_all(path.to_string_lossy().as_bytes())?;
        } else {
            file.write_all(b"")?;
        }
        Ok(())
    }

    fn load_recent_projects(&self, app_name: &str) -> Result<Vec<RecentProjectEntry>> {
        let file_path = Self::config_file(app_name, RECENT_PROJECTS_FILENAME)?;
        if !file_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&file_path)?;
        let entries: Vec<RecentProjectEntry> = serde_json::from_reader(BufReader::new(file))?;
        Ok(entries)
    }

    fn record_recent_project(
        &self,
        app_name: &str,
        marker_path: &Path,
        opened_at_unix: i64,
    ) -> Result<()> {
        let entries = self.load_recent_projects(app_name)?;
        let entries = push_recent_entry(entries, marker_path, opened_at_unix);

        let file_path = Self::config_file(app_name, RECENT_PROJECTS_FILENAME)?;
        let file = File::create(&file_path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &entries)?;
        log::debug!(
            "CoreConfigManager: Recorded recent project {marker_path:?} ({} entries).",
            entries.len()
        );
        Ok(())
    }
}
