/*
 * The project aggregate: the set of currently open documents, the session
 * tools attached to the project, and the display state persisted with the
 * project metadata. A project is created or opened by the project manager,
 * closed exactly once by the close coordinator, and is invalid afterwards:
 * operations on a closed project are rejected, never a panic.
 */
use crate::core::document::DocumentOperations;
use crate::core::models::{DisplayState, ProjectLocator};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug)]
pub enum ProjectError {
    Closed(String),
    DuplicateDocument(std::path::PathBuf),
}

impl std::fmt::Display for ProjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectError::Closed(name) => write!(f, "Project '{name}' is already closed"),
            ProjectError::DuplicateDocument(p) => {
                write!(f, "Document already open in project: {p:?}")
            }
        }
    }
}

impl std::error::Error for ProjectError {}

pub type Result<T> = std::result::Result<T, ProjectError>;

/*
 * A tool running against the active project. Tools may veto a project close
 * (unsaved tool-local state, a running analysis) and serialize their session
 * state to JSON so the shell can restore the arrangement on reopen.
 * `save_state` returning `None` means the tool declined to save, which
 * aborts the surrounding save or close, mirroring a user cancel.
 */
pub trait SessionTool: Send + Sync {
    fn name(&self) -> &str;

    fn can_close(&self) -> bool {
        true
    }

    fn save_state(&self) -> Option<serde_json::Value>;

    fn restore_state(&self, _state: &serde_json::Value) {}
}

pub struct Project {
    locator: ProjectLocator,
    documents: Vec<Arc<dyn DocumentOperations>>,
    tools: Vec<Box<dyn SessionTool>>,
    tool_states: BTreeMap<String, serde_json::Value>,
    display_state: DisplayState,
    closed: bool,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("locator", &self.locator)
            .field("documents", &self.documents.len())
            .field("tools", &self.tools.len())
            .field("tool_states", &self.tool_states)
            .field("display_state", &self.display_state)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Project {
    pub fn new(locator: ProjectLocator) -> Self {
        Project {
            locator,
            documents: Vec::new(),
            tools: Vec::new(),
            tool_states: BTreeMap::new(),
            display_state: DisplayState::new(),
            closed: false,
        }
    }

    pub fn locator(&self) -> &ProjectLocator {
        &self.locator
    }

    pub fn name(&self) -> &str {
        self.locator.name()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // Open documents, in the order they were opened.
    pub fn open_documents(&self) -> &[Arc<dyn DocumentOperations>] {
        &self.documents
    }

    pub fn find_document(&self, rel_path: &Path) -> Option<Arc<dyn DocumentOperations>> {
        self.documents
            .iter()
            .find(|d| d.rel_path() == rel_path)
            .cloned()
    }

    pub fn changed_documents(&self) -> Vec<Arc<dyn DocumentOperations>> {
        self.documents
            .iter()
            .filter(|d| d.is_changed())
            .cloned()
            .collect()
    }

    pub fn open_document(&mut self, document: Arc<dyn DocumentOperations>) -> Result<()> {
        if self.closed {
            return Err(ProjectError::Closed(self.name().to_string()));
        }
        if self
            .documents
            .iter()
            .any(|d| d.rel_path() == document.rel_path())
        {
            return Err(ProjectError::DuplicateDocument(
                document.rel_path().to_path_buf(),
            ));
        }
        log::debug!(
            "Project '{}': opened document {:?}",
            self.name(),
            document.rel_path()
        );
        self.documents.push(document);
        Ok(())
    }

    /*
     * Attaches a running tool; if a persisted state for the tool's name was
     * loaded with the project, the tool restores from it immediately.
     */
    pub fn attach_tool(&mut self, tool: Box<dyn SessionTool>) -> Result<()> {
        if self.closed {
            return Err(ProjectError::Closed(self.name().to_string()));
        }
        if let Some(state) = self.tool_states.get(tool.name()) {
            tool.restore_state(state);
        }
        log::debug!("Project '{}': attached tool '{}'", self.name(), tool.name());
        self.tools.push(tool);
        Ok(())
    }

    pub fn running_tools(&self) -> &[Box<dyn SessionTool>] {
        &self.tools
    }

    /*
     * Captures the session state of every running tool. Returns false when a
     * tool declines to save, which the caller treats like a user cancel.
     */
    pub fn save_session_tools(&mut self) -> bool {
        for tool in &self.tools {
            match tool.save_state() {
                Some(state) => {
                    self.tool_states.insert(tool.name().to_string(), state);
                }
                None => {
                    log::info!(
                        "Project '{}': tool '{}' declined to save its session state.",
                        self.name(),
                        tool.name()
                    );
                    return false;
                }
            }
        }
        true
    }

    pub fn tool_states(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.tool_states
    }

    pub fn set_tool_states(&mut self, states: BTreeMap<String, serde_json::Value>) {
        self.tool_states = states;
    }

    pub fn display_state(&self) -> &DisplayState {
        &self.display_state
    }

    pub fn display_state_mut(&mut self) -> &mut DisplayState {
        &mut self.display_state
    }

    pub fn set_display_state(&mut self, state: DisplayState) {
        self.display_state = state;
    }

    /*
     * Closes the project. Open document handles are dropped (the close
     * coordinator has unlocked and released them by this point). A second
     * close is rejected and logged.
     */
    pub fn close(&mut self) {
        if self.closed {
            log::error!("Project '{}': close called twice; ignored.", self.name());
            return;
        }
        self.closed = true;
        self.documents.clear();
        self.tools.clear();
        log::info!("Project '{}': closed.", self.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::{CoreDocument, DocumentMetadata};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct StubTool {
        name: String,
        allow_close: bool,
        state_to_save: Option<serde_json::Value>,
        restored: Mutex<Option<serde_json::Value>>,
    }

    impl StubTool {
        fn new(name: &str) -> Self {
            StubTool {
                name: name.to_string(),
                allow_close: true,
                state_to_save: Some(serde_json::json!({"open": true})),
                restored: Mutex::new(None),
            }
        }
    }

    impl SessionTool for StubTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn can_close(&self) -> bool {
            self.allow_close
        }
        fn save_state(&self) -> Option<serde_json::Value> {
            self.state_to_save.clone()
        }
        fn restore_state(&self, state: &serde_json::Value) {
            *self.restored.lock().unwrap() = Some(state.clone());
        }
    }

    fn doc_in(dir: &TempDir, rel: &str) -> Arc<dyn DocumentOperations> {
        Arc::new(
            CoreDocument::create(
                dir.path(),
                &PathBuf::from(rel),
                "content",
                DocumentMetadata::default(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_open_document_rejects_duplicates() {
        let temp = TempDir::new().unwrap();
        let mut project = Project::new(ProjectLocator::new("/p", "demo"));
        project.open_document(doc_in(&temp, "a.txt")).unwrap();

        let dup = project.open_document(doc_in(&temp, "a.txt"));
        assert!(matches!(dup, Err(ProjectError::DuplicateDocument(_))));
        assert_eq!(project.open_documents().len(), 1);
    }

    #[test]
    fn test_changed_documents_filters_unchanged() {
        let temp = TempDir::new().unwrap();
        let mut project = Project::new(ProjectLocator::new("/p", "demo"));
        let doc = doc_in(&temp, "a.txt");
        doc.acquire("test").unwrap();
        doc.replace_content("edited");
        project.open_document(doc).unwrap();
        project.open_document(doc_in(&temp, "b.txt")).unwrap();

        let changed = project.changed_documents();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].rel_path(), Path::new("a.txt"));
    }

    #[test]
    fn test_save_session_tools_declining_tool_aborts() {
        let mut project = Project::new(ProjectLocator::new("/p", "demo"));
        project.attach_tool(Box::new(StubTool::new("listing"))).unwrap();
        let mut decliner = StubTool::new("graph");
        decliner.state_to_save = None;
        project.attach_tool(Box::new(decliner)).unwrap();

        assert!(!project.save_session_tools());
        // The first tool's state was still captured before the abort.
        assert!(project.tool_states().contains_key("listing"));
    }

    #[test]
    fn test_attach_tool_restores_persisted_state() {
        let mut project = Project::new(ProjectLocator::new("/p", "demo"));
        let mut states = BTreeMap::new();
        states.insert("listing".to_string(), serde_json::json!({"cursor": 42}));
        project.set_tool_states(states);

        // Attach through a wrapper so the test keeps a handle to observe restore.
        let restored_handle = Arc::new(StubTool::new("listing"));
        project
            .attach_tool(Box::new(ObservableTool(restored_handle.clone())))
            .unwrap();

        let restored = restored_handle.restored.lock().unwrap();
        assert_eq!(*restored, Some(serde_json::json!({"cursor": 42})));
    }

    struct ObservableTool(Arc<StubTool>);

    impl SessionTool for ObservableTool {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn save_state(&self) -> Option<serde_json::Value> {
            self.0.save_state()
        }
        fn restore_state(&self, state: &serde_json::Value) {
            self.0.restore_state(state);
        }
    }

    #[test]
    fn test_close_is_idempotent_and_invalidates() {
        let temp = TempDir::new().unwrap();
        let mut project = Project::new(ProjectLocator::new("/p", "demo"));
        project.open_document(doc_in(&temp, "a.txt")).unwrap();

        project.close();
        assert!(project.is_closed());
        assert!(project.open_documents().is_empty());

        // Second close is a logged no-op; further opens are rejected.
        project.close();
        let result = project.open_document(doc_in(&temp, "b.txt"));
        assert!(matches!(result, Err(ProjectError::Closed(_))));
    }
}
