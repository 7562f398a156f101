/*
 * The top-level session value: at most one active project plus the listener
 * registry for lifecycle notifications. Coordinators receive the session by
 * parameter; there is no ambient global holding the active project.
 */
use crate::core::events::ListenerRegistry;
use crate::core::project::Project;

#[derive(Default)]
pub struct AppSession {
    active_project: Option<Project>,
    listeners: ListenerRegistry,
}

impl AppSession {
    pub fn new() -> Self {
        AppSession::default()
    }

    pub fn has_active_project(&self) -> bool {
        self.active_project.is_some()
    }

    pub fn active_project(&self) -> Option<&Project> {
        self.active_project.as_ref()
    }

    pub fn active_project_mut(&mut self) -> Option<&mut Project> {
        self.active_project.as_mut()
    }

    /*
     * Installs a newly opened project as the active one. The previous
     * project, if any, is returned to the caller, which is responsible for
     * having closed it first.
     */
    pub fn set_active_project(&mut self, project: Project) -> Option<Project> {
        if let Some(previous) = &self.active_project {
            log::warn!(
                "AppSession: Replacing active project '{}' without an explicit close.",
                previous.name()
            );
        }
        self.active_project.replace(project)
    }

    pub fn take_active_project(&mut self) -> Option<Project> {
        self.active_project.take()
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn listeners_mut(&mut self) -> &mut ListenerRegistry {
        &mut self.listeners
    }
}
