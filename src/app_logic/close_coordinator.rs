/*
 * The project close coordinator. Closing walks a fixed sequence of phases:
 * tool veto check, lock phase over every open document, read-only conflict
 * check, save selection, unconditional metadata persistence, release, close.
 * Locking is all-or-nothing: any abort or fault unwinds every lock acquired
 * so far through the same release helper, so the coordinator never returns
 * with a document still locked. User cancels are expected outcomes
 * (`Ok(false)`), not errors; only persistence failures and backing-data
 * faults surface as `Err`.
 */
use crate::app_logic::prompts::{
    LockConflictDecision, PromptOperations, ReadOnlyDecision, SaveDecision,
};
use crate::app_logic::session::AppSession;
use crate::core::config::ConfigManagerOperations;
use crate::core::document::{DocumentError, DocumentOperations, LockAttempt};
use crate::core::project::Project;
use crate::core::project_manager::ProjectManagerOperations;
use std::path::PathBuf;
use std::sync::Arc;

// Owner name used for content locks and consumer registration during close.
pub const CLOSE_LOCK_OWNER: &str = "project-close";

#[derive(Debug)]
pub enum CloseError {
    // Unable to obtain a document's backing data; unrecoverable for this
    // close attempt.
    DocumentAccess(DocumentError),
    // Saving a document or persisting project metadata failed.
    Persistence(String),
}

impl std::fmt::Display for CloseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseError::DocumentAccess(e) => write!(f, "Document access failed: {e}"),
            CloseError::Persistence(msg) => write!(f, "Persistence failed: {msg}"),
        }
    }
}

impl std::error::Error for CloseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CloseError::DocumentAccess(e) => Some(e),
            _ => None,
        }
    }
}

/*
 * Phases of one close attempt. `Aborted` is terminal and reachable from the
 * tool check through the save phase; it guarantees no locks remain held and
 * nothing was persisted.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosePhase {
    Idle,
    CheckingTools,
    Locking,
    CheckingReadOnly,
    Saving,
    Persisting,
    Releasing,
    Closed,
    Aborted,
}

impl ClosePhase {
    fn advance(&mut self, next: ClosePhase, project_name: &str) {
        log::trace!("CloseCoordinator[{project_name}]: phase {self:?} -> {next:?}");
        *self = next;
    }
}

pub struct CloseCoordinator {
    manager: Arc<dyn ProjectManagerOperations>,
    config: Arc<dyn ConfigManagerOperations>,
    prompts: Arc<dyn PromptOperations>,
    app_name: String,
}

impl CloseCoordinator {
    pub fn new(
        manager: Arc<dyn ProjectManagerOperations>,
        config: Arc<dyn ConfigManagerOperations>,
        prompts: Arc<dyn PromptOperations>,
        app_name: impl Into<String>,
    ) -> Self {
        CloseCoordinator {
            manager,
            config,
            prompts,
            app_name: app_name.into(),
        }
    }

    /*
     * Closes the session's active project. Returns `Ok(true)` when the
     * project was closed or there was nothing to close, `Ok(false)` when the
     * user cancelled at any prompt (the project stays active and untouched),
     * and `Err` for persistence failures or document faults, with every
     * acquired lock rolled back before returning.
     */
    pub fn close_project(
        &self,
        session: &mut AppSession,
        is_exiting: bool,
    ) -> Result<bool, CloseError> {
        let mut phase = ClosePhase::Idle;
        let Some(mut project) = session.take_active_project() else {
            log::trace!("CloseCoordinator: No active project; nothing to close.");
            return Ok(true);
        };
        let name = project.name().to_string();

        phase.advance(ClosePhase::CheckingTools, &name);
        for tool in project.running_tools() {
            if !tool.can_close() {
                log::info!(
                    "CloseCoordinator: Tool '{}' does not permit closing '{name}'.",
                    tool.name()
                );
                phase.advance(ClosePhase::Aborted, &name);
                session.set_active_project(project);
                return Ok(false);
            }
        }

        phase.advance(ClosePhase::Locking, &name);
        let locked = match self.lock_open_documents(&project, is_exiting) {
            Ok(Some(locked)) => locked,
            Ok(None) => {
                log::info!("CloseCoordinator: Close of '{name}' cancelled at the lock step.");
                phase.advance(ClosePhase::Aborted, &name);
                session.set_active_project(project);
                return Ok(false);
            }
            Err(e) => {
                phase.advance(ClosePhase::Aborted, &name);
                session.set_active_project(project);
                return Err(e);
            }
        };

        phase.advance(ClosePhase::CheckingReadOnly, &name);
        let changed: Vec<Arc<dyn DocumentOperations>> = locked
            .iter()
            .filter(|d| d.is_changed())
            .cloned()
            .collect();
        let read_only: Vec<PathBuf> = changed
            .iter()
            .filter(|d| !d.can_save())
            .map(|d| d.rel_path().to_path_buf())
            .collect();
        if !read_only.is_empty()
            && self.prompts.confirm_read_only_discard(&read_only) != ReadOnlyDecision::DiscardChanges
        {
            log::info!(
                "CloseCoordinator: Close of '{name}' cancelled at the read-only conflict step."
            );
            self.release_all(&locked);
            phase.advance(ClosePhase::Aborted, &name);
            session.set_active_project(project);
            return Ok(false);
        }

        phase.advance(ClosePhase::Saving, &name);
        // Capture session-tool state before anything reaches disk; a
        // declining tool acts like a user cancel, and every abort path must
        // leave nothing persisted.
        if !project.save_session_tools() {
            self.release_all(&locked);
            phase.advance(ClosePhase::Aborted, &name);
            session.set_active_project(project);
            return Ok(false);
        }

        let saveable: Vec<Arc<dyn DocumentOperations>> =
            changed.iter().filter(|d| d.can_save()).cloned().collect();
        if !saveable.is_empty() {
            let offered: Vec<PathBuf> = saveable
                .iter()
                .map(|d| d.rel_path().to_path_buf())
                .collect();
            match self.prompts.select_documents_to_save(&offered) {
                SaveDecision::Cancel => {
                    log::info!("CloseCoordinator: Close of '{name}' cancelled at the save step.");
                    self.release_all(&locked);
                    phase.advance(ClosePhase::Aborted, &name);
                    session.set_active_project(project);
                    return Ok(false);
                }
                SaveDecision::Save(selection) => {
                    for doc in &saveable {
                        if !selection.iter().any(|p| p == doc.rel_path()) {
                            log::debug!(
                                "CloseCoordinator: Changes to {:?} discarded by selection.",
                                doc.rel_path()
                            );
                            continue;
                        }
                        if let Err(e) = doc.save() {
                            self.prompts.show_error(
                                "Save Failed",
                                &format!("Unable to save {:?}: {e}", doc.rel_path()),
                            );
                            self.release_all(&locked);
                            phase.advance(ClosePhase::Aborted, &name);
                            session.set_active_project(project);
                            return Err(CloseError::Persistence(e.to_string()));
                        }
                    }
                }
            }
        }

        phase.advance(ClosePhase::Persisting, &name);
        if let Err(e) = self.manager.save_project(&project) {
            self.prompts.show_error(
                "Close Failed",
                &format!("Unable to persist project metadata for '{name}': {e}"),
            );
            self.release_all(&locked);
            phase.advance(ClosePhase::Aborted, &name);
            session.set_active_project(project);
            return Err(CloseError::Persistence(e.to_string()));
        }

        phase.advance(ClosePhase::Releasing, &name);
        self.release_all(&locked);

        phase.advance(ClosePhase::Closed, &name);
        let locator = project.locator().clone();
        project.close();
        self.manager.release_project_lock(&locator);
        session.listeners().fire_project_closed(&locator);

        if is_exiting {
            if let Err(e) = self
                .config
                .save_last_project_path(&self.app_name, Some(&locator.marker_path()))
            {
                log::warn!("CloseCoordinator: Failed to record last project on exit: {e}");
            }
        } else {
            if let Err(e) = self.config.save_last_project_path(&self.app_name, None) {
                log::warn!("CloseCoordinator: Failed to clear last project pointer: {e}");
            }
            log::info!("Closed project: {name}");
        }

        Ok(true)
    }

    /*
     * Lock phase. Every open document is acquired and locked in open order.
     * A busy document is resolved through the prompt surface; a cancel or an
     * acquire fault unwinds everything obtained so far. `Ok(None)` means the
     * user cancelled.
     */
    fn lock_open_documents(
        &self,
        project: &Project,
        is_exiting: bool,
    ) -> Result<Option<Vec<Arc<dyn DocumentOperations>>>, CloseError> {
        let mut locked: Vec<Arc<dyn DocumentOperations>> = Vec::new();
        for doc in project.open_documents() {
            if let Err(e) = doc.acquire(CLOSE_LOCK_OWNER) {
                log::error!(
                    "CloseCoordinator: Unable to obtain backing data for {:?}: {e}",
                    doc.rel_path()
                );
                self.release_all(&locked);
                return Err(CloseError::DocumentAccess(e));
            }
            match doc.try_lock(CLOSE_LOCK_OWNER) {
                LockAttempt::Acquired => locked.push(doc.clone()),
                LockAttempt::Busy { transactions } => {
                    match self
                        .prompts
                        .resolve_lock_conflict(doc.rel_path(), &transactions, is_exiting)
                    {
                        LockConflictDecision::Cancel => {
                            // Acquired but never locked; release it alone.
                            doc.release(CLOSE_LOCK_OWNER);
                            self.release_all(&locked);
                            return Ok(None);
                        }
                        LockConflictDecision::DiscardAndForce => {
                            doc.force_lock(CLOSE_LOCK_OWNER);
                            locked.push(doc.clone());
                        }
                    }
                }
            }
        }
        Ok(Some(locked))
    }

    // The single unwind path: every abort, fault, and the regular release
    // phase go through here.
    fn release_all(&self, locked: &[Arc<dyn DocumentOperations>]) {
        for doc in locked {
            doc.unlock();
            doc.release(CLOSE_LOCK_OWNER);
        }
    }
}
