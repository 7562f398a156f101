/*
 * This module consolidates the core, headless logic of the shell. It
 * re-exports the key data structures and abstractions (`DocumentOperations`,
 * `ProjectManagerOperations`, `ConfigManagerOperations`, the listener
 * registry) for documents, project persistence, configuration, and
 * lifecycle events, plus digest and path utilities.
 */
pub mod checksum_utils;
pub mod config;
pub mod document;
pub mod events;
pub mod models;
pub mod path_utils;
pub mod project;
pub mod project_manager;

// Re-export key structures and enums
pub use models::{
    DisplayState, DocumentVersionInfo, ProjectLocator, RecentProjectEntry, VersionIndicator,
    VersionMismatch,
};

// Re-export document related items
pub use document::{
    CURRENT_FORMAT_VERSION, CoreDocument, DocumentError, DocumentMetadata, DocumentOperations,
    LockAttempt,
};

// Re-export project related items
pub use project::{Project, SessionTool};

// Re-export project manager related items
pub use project_manager::{
    CoreProjectManager, ProjectManagerError, ProjectManagerOperations, UpgradeGate,
};

// Re-export config related items
pub use config::{ConfigManagerOperations, CoreConfigManager};

// Re-export event related items
pub use events::{ListenerRegistry, ProjectListener};
