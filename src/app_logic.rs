/*
 * This module provides the orchestration layer: the close coordinator, the
 * file-action coordinator built around it, the session value that owns the
 * active project, the blocking user-decision surface (`PromptOperations`),
 * and the document format upgrade gate. Unit tests for the coordinators are
 * in `coordinator_tests.rs`.
 */
pub mod close_coordinator;
pub mod file_actions;
pub mod prompts;
pub mod session;
pub mod version_gate;


pub use close_coordinator::{CLOSE_LOCK_OWNER, CloseCoordinator, CloseError, ClosePhase};
pub use file_actions::FileActionCoordinator;
pub use prompts::{
    LockConflictDecision, PromptOperations, ReadOnlyDecision, SaveDecision, UpgradeDecision,
};
pub use session::AppSession;
pub use version_gate::PromptUpgradeGate;
