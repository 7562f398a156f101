/*
 * Project lifecycle actions around the close coordinator: creating, opening,
 * saving, and deleting projects, plus last-opened and recent-project
 * bookkeeping. Opening always closes the current project first; if the new
 * project fails to open, the previously active one is reopened so the
 * session is never silently left empty.
 */
use crate::app_logic::close_coordinator::{CloseCoordinator, CloseError};
use crate::app_logic::prompts::PromptOperations;
use crate::app_logic::session::AppSession;
use crate::app_logic::version_gate::PromptUpgradeGate;
use crate::core::config::ConfigManagerOperations;
use crate::core::models::{ProjectLocator, RecentProjectEntry};
use crate::core::project_manager::{ProjectManagerError, ProjectManagerOperations};
use std::sync::Arc;
use time::OffsetDateTime;

pub struct FileActionCoordinator {
    manager: Arc<dyn ProjectManagerOperations>,
    config: Arc<dyn ConfigManagerOperations>,
    prompts: Arc<dyn PromptOperations>,
    closer: CloseCoordinator,
    app_name: String,
}

impl FileActionCoordinator {
    pub fn new(
        manager: Arc<dyn ProjectManagerOperations>,
        config: Arc<dyn ConfigManagerOperations>,
        prompts: Arc<dyn PromptOperations>,
        app_name: impl Into<String>,
    ) -> Self {
        let app_name = app_name.into();
        let closer = CloseCoordinator::new(
            manager.clone(),
            config.clone(),
            prompts.clone(),
            app_name.clone(),
        );
        FileActionCoordinator {
            manager,
            config,
            prompts,
            closer,
            app_name,
        }
    }

    pub fn close_project(
        &self,
        session: &mut AppSession,
        is_exiting: bool,
    ) -> Result<bool, CloseError> {
        self.closer.close_project(session, is_exiting)
    }

    /*
     * Opens a project, closing the currently active one first. A cancel at
     * any close prompt keeps the old project active. On a failed open, the
     * previously active project is reopened.
     */
    pub fn open_project(&self, session: &mut AppSession, locator: &ProjectLocator) -> bool {
        let previous = session.active_project().map(|p| p.locator().clone());

        match self.closer.close_project(session, false) {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                log::error!("FileActions: Closing the current project failed: {e}");
                return false;
            }
        }

        if self.do_open(session, locator) {
            return true;
        }
        if let Some(prev) = previous
            && prev != *locator
        {
            log::info!(
                "FileActions: Reopening previously active project '{}' after failed open.",
                prev.name()
            );
            self.do_open(session, &prev);
        }
        false
    }

    /*
     * Creates a new project and makes it the active one; the current project
     * is closed first (a cancel there aborts the whole action).
     */
    pub fn new_project(&self, session: &mut AppSession, locator: &ProjectLocator) -> bool {
        match self.closer.close_project(session, false) {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                log::error!("FileActions: Closing the current project failed: {e}");
                return false;
            }
        }

        match self.manager.create_project(locator) {
            Ok(project) => {
                session.set_active_project(project);
                session.listeners().fire_project_opened(locator);
                self.record_open_bookkeeping(locator);
                log::info!("Created project: {}", locator.name());
                true
            }
            Err(e) => {
                self.prompts.show_error(
                    "Error Creating Project",
                    &format!("Error creating project '{}': {e}", locator.name()),
                );
                false
            }
        }
    }

    /*
     * Saves the active project: session-tool state first (a tool may decline,
     * which cancels the save), then display data and metadata. Without an
     * active project this is a no-op.
     */
    pub fn save_project(&self, session: &mut AppSession) -> bool {
        let Some(project) = session.active_project_mut() else {
            log::trace!("FileActions: No active project; nothing to save.");
            return true;
        };

        if !project.save_session_tools() {
            log::info!("FileActions: Save of '{}' cancelled by a session tool.", project.name());
            return false;
        }

        match self.manager.save_project(project) {
            Ok(()) => {
                log::info!("Saved project: {}", project.name());
                true
            }
            Err(e) => {
                self.prompts.show_error(
                    "Save Project Failed",
                    &format!("Unable to save project '{}': {e}", project.name()),
                );
                false
            }
        }
    }

    /*
     * Deletes a project from disk. The active project must be closed first;
     * deletion is confirmed through the prompt surface since it is not
     * reversible.
     */
    pub fn delete_project(&self, session: &AppSession, locator: &ProjectLocator) -> bool {
        if session
            .active_project()
            .is_some_and(|p| p.locator() == locator)
        {
            self.prompts.show_error(
                "Cannot Delete Active Project",
                "The project must be closed before it can be deleted.",
            );
            return false;
        }
        if !self.manager.project_exists(locator) {
            self.prompts.show_error(
                "Project Does Not Exist",
                &format!("Project '{}' was not found.", locator.name()),
            );
            return false;
        }
        if !self.prompts.confirm_delete(locator) {
            log::debug!("FileActions: Delete of '{}' cancelled.", locator.name());
            return false;
        }

        match self.manager.delete_project(locator) {
            Ok(()) => {
                log::info!("Deleted project: {}", locator.name());
                true
            }
            Err(ProjectManagerError::Locked(_)) => {
                self.prompts.show_error(
                    "Delete Project Failed",
                    &format!(
                        "Project '{}' is in use by another session.",
                        locator.name()
                    ),
                );
                false
            }
            Err(e) => {
                self.prompts.show_error(
                    "Delete Project Failed",
                    &format!("Error deleting project '{}': {e}", locator.name()),
                );
                false
            }
        }
    }

    // Reopens whatever the last-opened pointer refers to, if anything.
    pub fn reopen_last_project(&self, session: &mut AppSession) -> bool {
        match self.config.load_last_project_path(&self.app_name) {
            Ok(Some(marker)) => match ProjectLocator::from_marker_path(&marker) {
                Some(locator) => self.open_project(session, &locator),
                None => {
                    log::warn!("FileActions: Stored last project path {marker:?} is not a marker.");
                    false
                }
            },
            Ok(None) => {
                log::debug!("FileActions: No last project recorded.");
                false
            }
            Err(e) => {
                log::warn!("FileActions: Failed to load last project pointer: {e}");
                false
            }
        }
    }

    pub fn recent_projects(&self) -> Vec<RecentProjectEntry> {
        match self.config.load_recent_projects(&self.app_name) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("FileActions: Failed to load recent projects: {e}");
                Vec::new()
            }
        }
    }

    fn do_open(&self, session: &mut AppSession, locator: &ProjectLocator) -> bool {
        let gate = PromptUpgradeGate::new(self.prompts.as_ref());
        match self.manager.open_project(locator, &gate) {
            Ok(project) => {
                session.set_active_project(project);
                session.listeners().fire_project_opened(locator);
                self.record_open_bookkeeping(locator);
                log::info!("Opened project: {}", locator.name());
                true
            }
            Err(e) => {
                self.surface_open_error(locator, &e);
                false
            }
        }
    }

    fn surface_open_error(&self, locator: &ProjectLocator, error: &ProjectManagerError) {
        match error {
            ProjectManagerError::NotFound(_) => {
                self.prompts.show_error(
                    "Error Opening Project",
                    &format!("Project '{}' was not found.", locator.name()),
                );
            }
            ProjectManagerError::NotOwner { owner, .. } => {
                self.prompts.show_error(
                    "Not Project Owner",
                    &format!(
                        "Cannot open project '{}': it is owned by '{owner}'. Each user must \
                         create their own projects.",
                        locator.name()
                    ),
                );
            }
            ProjectManagerError::Locked(_) => {
                self.prompts.show_error(
                    "Error Opening Project",
                    &format!(
                        "Project '{}' is already open in another session.",
                        locator.name()
                    ),
                );
            }
            other => {
                self.prompts.show_error(
                    "Error Opening Project",
                    &format!("Error opening project '{}': {other}", locator.name()),
                );
            }
        }
        log::error!("FileActions: Failed to open {locator}: {error}");
    }

    fn record_open_bookkeeping(&self, locator: &ProjectLocator) {
        let marker = locator.marker_path();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        if let Err(e) = self
            .config
            .record_recent_project(&self.app_name, &marker, now)
        {
            log::warn!("FileActions: Failed to record recent project: {e}");
        }
        if let Err(e) = self
            .config
            .save_last_project_path(&self.app_name, Some(&marker))
        {
            log::warn!("FileActions: Failed to record last project pointer: {e}");
        }
    }
}
