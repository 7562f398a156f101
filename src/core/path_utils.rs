/*
 * Path helpers for application-level (not project-level) storage. The config
 * manager keeps its pointer files under the platform's local configuration
 * directory; this module centralizes how that directory is resolved and
 * created so the rest of core never touches `directories` directly.
 */
use directories::ProjectDirs;
use std::fs;
use std::path::PathBuf;

/*
 * Retrieves the application's local (non-roaming) configuration directory,
 * creating it if necessary. The path is derived without an organization
 * qualifier, placing it directly under the user's local application data
 * structure. Returns `None` when the platform directory cannot be
 * determined or created.
 */
pub fn get_base_app_config_local_dir(app_name: &str) -> Option<PathBuf> {
    log::trace!("PathUtils: Resolving base app config local dir for '{app_name}'");
    ProjectDirs::from("", "", app_name).and_then(|proj_dirs| {
        let config_path = proj_dirs.config_local_dir();
        if !config_path.exists() {
            if let Err(e) = fs::create_dir_all(config_path) {
                log::error!(
                    "PathUtils: Failed to create base app config directory {config_path:?}: {e}"
                );
                return None;
            }
            log::debug!("PathUtils: Created base app config directory: {config_path:?}");
        }
        Some(config_path.to_path_buf())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    // ProjectDirs behavior is environment-dependent; these tests assume a
    // typical environment and clean up after themselves.

    fn cleanup(app_name: &str) {
        if let Some(proj_dirs) = ProjectDirs::from("", "", app_name) {
            let dir = proj_dirs.config_local_dir();
            if dir.exists()
                && let Err(e) = fs::remove_dir_all(dir)
            {
                eprintln!("Test cleanup error for {app_name}: {e}");
            }
        }
    }

    #[test]
    fn test_get_base_app_config_local_dir_creates_if_not_exists() {
        let unique_app_name = format!("TestApp_WbPathUtils_Create_{}", rand::random::<u128>());
        cleanup(&unique_app_name);

        let path = get_base_app_config_local_dir(&unique_app_name)
            .expect("Should return a path for a new app name");
        assert!(path.exists(), "Directory should have been created");
        assert!(path.is_dir());
        assert!(
            path.to_string_lossy()
                .to_lowercase()
                .contains(&unique_app_name.to_lowercase()),
            "Path should contain the app name: {path:?}"
        );

        cleanup(&unique_app_name);
    }

    #[test]
    fn test_get_base_app_config_local_dir_returns_existing() {
        let unique_app_name = format!("TestApp_WbPathUtils_Existing_{}", rand::random::<u128>());

        let first_path = get_base_app_config_local_dir(&unique_app_name)
            .expect("First creation of base app config dir failed");
        assert!(first_path.exists());

        let second_path = get_base_app_config_local_dir(&unique_app_name)
            .expect("Should return a path on second call");
        assert_eq!(second_path, first_path);

        cleanup(&unique_app_name);
    }
}
