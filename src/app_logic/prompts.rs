/*
 * The user-decision surface. Coordinators treat every user interaction as a
 * blocking call returning an enumerated decision; presentation (console,
 * dialog, scripted test double) is entirely behind this trait. Decisions
 * default to the safe answer: implementations should treat "no response
 * possible" as Cancel.
 */
use crate::core::models::{DocumentVersionInfo, ProjectLocator, VersionMismatch};
use std::path::{Path, PathBuf};

// Answer to a lock conflict on one document during close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockConflictDecision {
    // Abort the document's in-progress sub-operations, discarding their
    // work, and force the lock.
    DiscardAndForce,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOnlyDecision {
    DiscardChanges,
    Cancel,
}

// Outcome of the save-selection step: which of the offered documents to
// persist, or cancel the whole operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveDecision {
    Save(Vec<PathBuf>),
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeDecision {
    Upgrade,
    Cancel,
}

pub trait PromptOperations: Send + Sync {
    /*
     * A document could not be locked because the named sub-operations are
     * still running against it. The user either discards that work and
     * forces the lock, or cancels the surrounding operation.
     */
    fn resolve_lock_conflict(
        &self,
        rel_path: &Path,
        transactions: &[String],
        is_exiting: bool,
    ) -> LockConflictDecision;

    // Changed documents that cannot be saved in place; discarding their
    // changes needs explicit confirmation.
    fn confirm_read_only_discard(&self, rel_paths: &[PathBuf]) -> ReadOnlyDecision;

    fn select_documents_to_save(&self, changed: &[PathBuf]) -> SaveDecision;

    fn confirm_delete(&self, locator: &ProjectLocator) -> bool;

    fn confirm_upgrade(
        &self,
        info: &DocumentVersionInfo,
        action: &str,
        detail: Option<&str>,
    ) -> UpgradeDecision;

    // Second confirmation for upgrading a checked-out shared document;
    // other users cannot read the new format until they upgrade too.
    fn confirm_shared_upgrade(&self, info: &DocumentVersionInfo, action: &str) -> UpgradeDecision;

    fn show_version_error(
        &self,
        info: &DocumentVersionInfo,
        action: &str,
        mismatch: &VersionMismatch,
    );

    fn show_error(&self, title: &str, message: &str);
}
