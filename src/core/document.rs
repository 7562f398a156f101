/*
 * The document store. A document is an open, mutable unit of project data:
 * a UTF-8 content file plus a JSON sidecar carrying the format version, the
 * digest recorded at last save, and version-control markers. The sidecar
 * digest against the working buffer's digest is the changed-flag.
 *
 * Locking protocol: consumers `acquire` the backing data (this is the step
 * that can fail outright), then `try_lock` the content. A lock attempt while
 * named sub-operations are open fails with their descriptions; `force_lock`
 * is the user-opt-in destructive override that throws those sub-operations
 * away and takes the lock anyway. The trait (`DocumentOperations`) exists so
 * coordinators can be tested against scripted documents.
 */
use crate::core::checksum_utils;
use crate::core::models::DocumentVersionInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// Format version written by this build. Sidecars with a different stamp go
// through the upgrade gate before the document is opened.
pub const CURRENT_FORMAT_VERSION: u32 = 3;

pub const DOCUMENT_META_SUFFIX: &str = ".meta.json";

#[derive(Debug)]
pub enum DocumentError {
    Io(io::Error),
    Serde(serde_json::Error),
    BackingUnavailable { path: PathBuf, source: io::Error },
    ReadOnly(PathBuf),
}

impl From<io::Error> for DocumentError {
    fn from(err: io::Error) -> Self {
        DocumentError::Io(err)
    }
}

impl From<serde_json::Error> for DocumentError {
    fn from(err: serde_json::Error) -> Self {
        DocumentError::Serde(err)
    }
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentError::Io(e) => write!(f, "Document I/O error: {e}"),
            DocumentError::Serde(e) => write!(f, "Document metadata error: {e}"),
            DocumentError::BackingUnavailable { path, source } => {
                write!(f, "Unable to obtain backing data for {path:?}: {source}")
            }
            DocumentError::ReadOnly(p) => write!(f, "Document is read-only: {p:?}"),
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocumentError::Io(e) => Some(e),
            DocumentError::Serde(e) => Some(e),
            DocumentError::BackingUnavailable { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DocumentError>;

// Outcome of a plain (non-forced) lock attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAttempt {
    Acquired,
    Busy { transactions: Vec<String> },
}

/*
 * Sidecar metadata persisted next to each content file as
 * `<rel_path>.meta.json`.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub format_version: u32,
    pub saved_digest: String,
    pub content_type: String,
    pub read_only: bool,
    pub versioned: bool,
    pub checked_out: bool,
    pub exclusive_checkout: bool,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        DocumentMetadata {
            format_version: CURRENT_FORMAT_VERSION,
            saved_digest: checksum_utils::digest_str(""),
            content_type: "text".to_string(),
            read_only: false,
            versioned: false,
            checked_out: false,
            exclusive_checkout: false,
        }
    }
}

pub trait DocumentOperations: Send + Sync {
    // Project-relative path of the document.
    fn rel_path(&self) -> &Path;

    /*
     * Loads the backing data (if not yet resident) and registers the named
     * consumer. Failure here is unrecoverable for the caller's current
     * operation; coordinators roll back everything acquired so far.
     */
    fn acquire(&self, consumer: &str) -> Result<()>;

    // Unregisters a consumer; the working buffer is dropped once the last
    // consumer is gone and no lock is held.
    fn release(&self, consumer: &str);

    fn try_lock(&self, owner: &str) -> LockAttempt;

    /*
     * Destructive override: discards the working buffer back to the snapshot
     * taken when the outermost open sub-operation began, clears the
     * sub-operation stack, and takes the lock for `owner`.
     */
    fn force_lock(&self, owner: &str);

    fn unlock(&self);
    fn is_locked(&self) -> bool;

    fn is_changed(&self) -> bool;
    fn can_save(&self) -> bool;
    fn open_transactions(&self) -> Vec<String>;

    // Persists the working buffer and refreshes the saved digest.
    fn save(&self) -> Result<()>;

    fn version_info(&self) -> DocumentVersionInfo;

    // Edit surface used by session tools (and tests).
    fn begin_operation(&self, description: &str);
    fn end_operation(&self);
    fn replace_content(&self, text: &str);
    fn content(&self) -> Option<String>;
}

#[derive(Debug, Default)]
struct DocumentInner {
    buffer: Option<String>,
    metadata: DocumentMetadata,
    lock_owner: Option<String>,
    open_ops: Vec<String>,
    op_snapshot: Option<String>,
    consumers: BTreeSet<String>,
}

pub struct CoreDocument {
    rel_path: PathBuf,
    content_path: PathBuf,
    meta_path: PathBuf,
    inner: Mutex<DocumentInner>,
}

impl CoreDocument {
    /*
     * Creates a new document under `documents_dir`: writes the content file
     * (creating intermediate directories) and its sidecar with a fresh
     * digest.
     */
    pub fn create(
        documents_dir: &Path,
        rel_path: &Path,
        content: &str,
        mut metadata: DocumentMetadata,
    ) -> Result<Self> {
        let content_path = documents_dir.join(rel_path);
        if let Some(parent) = content_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&content_path, content)?;
        metadata.saved_digest = checksum_utils::digest_str(content);
        let meta_path = Self::meta_path_for(&content_path);
        let file = fs::File::create(&meta_path)?;
        serde_json::to_writer_pretty(io::BufWriter::new(file), &metadata)?;
        log::debug!("CoreDocument: Created document {rel_path:?} under {documents_dir:?}");
        Ok(CoreDocument {
            rel_path: rel_path.to_path_buf(),
            content_path,
            meta_path,
            inner: Mutex::new(DocumentInner {
                metadata,
                ..DocumentInner::default()
            }),
        })
    }

    /*
     * Opens an existing document: reads the sidecar eagerly, leaves the
     * content on disk until the first `acquire`. The content file itself
     * must exist.
     */
    pub fn open(documents_dir: &Path, rel_path: &Path) -> Result<Self> {
        let content_path = documents_dir.join(rel_path);
        let meta_path = Self::meta_path_for(&content_path);
        if !content_path.is_file() {
            return Err(DocumentError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Content file missing for document {rel_path:?}"),
            )));
        }
        let file = fs::File::open(&meta_path)?;
        let metadata: DocumentMetadata = serde_json::from_reader(io::BufReader::new(file))?;
        log::trace!(
            "CoreDocument: Opened document {rel_path:?} (format v{})",
            metadata.format_version
        );
        Ok(CoreDocument {
            rel_path: rel_path.to_path_buf(),
            content_path,
            meta_path,
            inner: Mutex::new(DocumentInner {
                metadata,
                ..DocumentInner::default()
            }),
        })
    }

    fn meta_path_for(content_path: &Path) -> PathBuf {
        let mut name = content_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.push_str(DOCUMENT_META_SUFFIX);
        content_path.with_file_name(name)
    }

    pub fn metadata(&self) -> DocumentMetadata {
        self.inner.lock().unwrap().metadata.clone()
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.inner.lock().unwrap().metadata.read_only = read_only;
    }
}

impl DocumentOperations for CoreDocument {
    fn rel_path(&self) -> &Path {
        &self.rel_path
    }

    fn acquire(&self, consumer: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.buffer.is_none() {
            let content = fs::read_to_string(&self.content_path).map_err(|e| {
                DocumentError::BackingUnavailable {
                    path: self.rel_path.clone(),
                    source: e,
                }
            })?;
            inner.buffer = Some(content);
            log::trace!("CoreDocument: Loaded backing data for {:?}", self.rel_path);
        }
        inner.consumers.insert(consumer.to_string());
        Ok(())
    }

    fn release(&self, consumer: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.consumers.remove(consumer);
        if inner.consumers.is_empty() && inner.lock_owner.is_none() && inner.open_ops.is_empty() {
            if let Some(buffer) = &inner.buffer
                && checksum_utils::digest_str(buffer) != inner.metadata.saved_digest
            {
                log::warn!(
                    "CoreDocument: Releasing {:?} with unsaved changes; working buffer dropped.",
                    self.rel_path
                );
            }
            inner.buffer = None;
        }
    }

    fn try_lock(&self, owner: &str) -> LockAttempt {
        let mut inner = self.inner.lock().unwrap();
        if !inner.open_ops.is_empty() {
            return LockAttempt::Busy {
                transactions: inner.open_ops.clone(),
            };
        }
        if let Some(holder) = &inner.lock_owner {
            if holder != owner {
                return LockAttempt::Busy {
                    transactions: vec![format!("content lock held by '{holder}'")],
                };
            }
            return LockAttempt::Acquired;
        }
        inner.lock_owner = Some(owner.to_string());
        log::trace!("CoreDocument: {:?} locked by '{owner}'", self.rel_path);
        LockAttempt::Acquired
    }

    fn force_lock(&self, owner: &str) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.open_ops.is_empty() {
            log::warn!(
                "CoreDocument: Force-locking {:?}; aborting {} open sub-operation(s).",
                self.rel_path,
                inner.open_ops.len()
            );
            if let Some(snapshot) = inner.op_snapshot.take() {
                inner.buffer = Some(snapshot);
            }
            inner.open_ops.clear();
        }
        inner.lock_owner = Some(owner.to_string());
    }

    fn unlock(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.lock_owner.take().is_none() {
            log::warn!("CoreDocument: unlock on {:?} without a holder.", self.rel_path);
        }
    }

    fn is_locked(&self) -> bool {
        self.inner.lock().unwrap().lock_owner.is_some()
    }

    fn is_changed(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        match &inner.buffer {
            Some(buffer) => checksum_utils::digest_str(buffer) != inner.metadata.saved_digest,
            None => false,
        }
    }

    fn can_save(&self) -> bool {
        !self.inner.lock().unwrap().metadata.read_only
    }

    fn open_transactions(&self) -> Vec<String> {
        self.inner.lock().unwrap().open_ops.clone()
    }

    fn save(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.metadata.read_only {
            return Err(DocumentError::ReadOnly(self.rel_path.clone()));
        }
        let Some(buffer) = inner.buffer.clone() else {
            log::trace!(
                "CoreDocument: save on {:?} with no resident buffer; nothing to do.",
                self.rel_path
            );
            return Ok(());
        };
        fs::write(&self.content_path, &buffer)?;
        inner.metadata.saved_digest = checksum_utils::digest_str(&buffer);
        inner.metadata.format_version = CURRENT_FORMAT_VERSION;
        let file = fs::File::create(&self.meta_path)?;
        serde_json::to_writer_pretty(io::BufWriter::new(file), &inner.metadata)?;
        log::debug!("CoreDocument: Saved {:?}", self.rel_path);
        Ok(())
    }

    fn version_info(&self) -> DocumentVersionInfo {
        let inner = self.inner.lock().unwrap();
        DocumentVersionInfo {
            name: self
                .rel_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.rel_path.to_string_lossy().into_owned()),
            content_type: inner.metadata.content_type.clone(),
            read_only: inner.metadata.read_only,
            versioned: inner.metadata.versioned,
            checked_out: inner.metadata.checked_out,
            exclusive_checkout: inner.metadata.exclusive_checkout,
        }
    }

    fn begin_operation(&self, description: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.buffer.is_none() {
            log::error!(
                "CoreDocument: begin_operation('{description}') on {:?} before acquire; ignored.",
                self.rel_path
            );
            return;
        }
        if inner.open_ops.is_empty() {
            inner.op_snapshot = inner.buffer.clone();
        }
        inner.open_ops.push(description.to_string());
    }

    fn end_operation(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.open_ops.pop().is_none() {
            log::warn!(
                "CoreDocument: end_operation on {:?} with no open sub-operation.",
                self.rel_path
            );
        }
        if inner.open_ops.is_empty() {
            inner.op_snapshot = None;
        }
    }

    fn replace_content(&self, text: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.buffer.is_none() {
            log::error!(
                "CoreDocument: replace_content on {:?} before acquire; ignored.",
                self.rel_path
            );
            return;
        }
        inner.buffer = Some(text.to_string());
    }

    fn content(&self) -> Option<String> {
        self.inner.lock().unwrap().buffer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_doc(dir: &Path, rel: &str, content: &str) -> CoreDocument {
        CoreDocument::create(dir, Path::new(rel), content, DocumentMetadata::default())
            .expect("create should succeed")
    }

    #[test]
    fn test_create_then_open_round_trip() {
        let temp = TempDir::new().unwrap();
        new_doc(temp.path(), "notes/entry.txt", "first pass");

        let reopened = CoreDocument::open(temp.path(), Path::new("notes/entry.txt")).unwrap();
        reopened.acquire("t").unwrap();
        assert_eq!(reopened.content().as_deref(), Some("first pass"));
        assert!(!reopened.is_changed());
    }

    #[test]
    fn test_open_missing_content_file_fails() {
        let temp = TempDir::new().unwrap();
        let result = CoreDocument::open(temp.path(), Path::new("ghost.txt"));
        assert!(matches!(result, Err(DocumentError::Io(_))));
    }

    #[test]
    fn test_changed_flag_follows_digest() {
        let temp = TempDir::new().unwrap();
        let doc = new_doc(temp.path(), "a.txt", "v1");
        doc.acquire("t").unwrap();
        assert!(!doc.is_changed());

        doc.replace_content("v2");
        assert!(doc.is_changed());

        doc.replace_content("v1");
        assert!(!doc.is_changed(), "same content means unchanged");
    }

    #[test]
    fn test_save_clears_changed_and_persists() {
        let temp = TempDir::new().unwrap();
        let doc = new_doc(temp.path(), "a.txt", "v1");
        doc.acquire("t").unwrap();
        doc.replace_content("v2");
        doc.save().unwrap();
        assert!(!doc.is_changed());

        let reopened = CoreDocument::open(temp.path(), Path::new("a.txt")).unwrap();
        reopened.acquire("t").unwrap();
        assert_eq!(reopened.content().as_deref(), Some("v2"));
    }

    #[test]
    fn test_save_read_only_is_rejected() {
        let temp = TempDir::new().unwrap();
        let doc = new_doc(temp.path(), "a.txt", "v1");
        doc.set_read_only(true);
        doc.acquire("t").unwrap();
        doc.replace_content("v2");
        assert!(matches!(doc.save(), Err(DocumentError::ReadOnly(_))));
        assert!(!doc.can_save());
    }

    #[test]
    fn test_try_lock_busy_while_operation_open() {
        let temp = TempDir::new().unwrap();
        let doc = new_doc(temp.path(), "a.txt", "v1");
        doc.acquire("tool").unwrap();
        doc.begin_operation("Rename Function");

        match doc.try_lock("closer") {
            LockAttempt::Busy { transactions } => {
                assert_eq!(transactions, vec!["Rename Function".to_string()]);
            }
            other => panic!("expected Busy, got {other:?}"),
        }
        assert!(!doc.is_locked());
    }

    #[test]
    fn test_try_lock_busy_when_held_by_other_owner() {
        let temp = TempDir::new().unwrap();
        let doc = new_doc(temp.path(), "a.txt", "v1");
        doc.acquire("t").unwrap();
        assert_eq!(doc.try_lock("first"), LockAttempt::Acquired);

        match doc.try_lock("second") {
            LockAttempt::Busy { transactions } => assert_eq!(transactions.len(), 1),
            other => panic!("expected Busy, got {other:?}"),
        }
        // Re-entrant for the same owner.
        assert_eq!(doc.try_lock("first"), LockAttempt::Acquired);
    }

    #[test]
    fn test_force_lock_discards_to_operation_snapshot() {
        let temp = TempDir::new().unwrap();
        let doc = new_doc(temp.path(), "a.txt", "v1");
        doc.acquire("tool").unwrap();

        doc.begin_operation("Apply Patch");
        doc.replace_content("patched but never committed");
        doc.begin_operation("Nested Fixup");
        assert_eq!(doc.open_transactions().len(), 2);

        doc.force_lock("closer");
        assert!(doc.is_locked());
        assert!(doc.open_transactions().is_empty());
        assert_eq!(doc.content().as_deref(), Some("v1"));
        assert!(!doc.is_changed());
    }

    #[test]
    fn test_release_drops_buffer_when_last_consumer_leaves() {
        let temp = TempDir::new().unwrap();
        let doc = new_doc(temp.path(), "a.txt", "v1");
        doc.acquire("one").unwrap();
        doc.acquire("two").unwrap();

        doc.release("one");
        assert_eq!(doc.content().as_deref(), Some("v1"));

        doc.release("two");
        assert!(doc.content().is_none(), "buffer dropped with no consumers");
    }

    #[test]
    fn test_acquire_fails_when_backing_file_removed() {
        let temp = TempDir::new().unwrap();
        let doc = new_doc(temp.path(), "a.txt", "v1");
        std::fs::remove_file(temp.path().join("a.txt")).unwrap();

        match doc.acquire("t") {
            Err(DocumentError::BackingUnavailable { path, .. }) => {
                assert_eq!(path, PathBuf::from("a.txt"));
            }
            other => panic!("expected BackingUnavailable, got {other:?}"),
        }
    }
}
