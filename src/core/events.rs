/*
 * Project lifecycle notifications. Interested subsystems register a
 * `ProjectListener`; the registry fans out opened/closed events in
 * registration order, which is the documented, deterministic fire order.
 */
use crate::core::models::ProjectLocator;
use std::sync::Arc;

pub trait ProjectListener: Send + Sync {
    fn project_opened(&self, locator: &ProjectLocator);
    fn project_closed(&self, locator: &ProjectLocator);
}

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Vec<Arc<dyn ProjectListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        ListenerRegistry::default()
    }

    pub fn register(&mut self, listener: Arc<dyn ProjectListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn fire_project_opened(&self, locator: &ProjectLocator) {
        log::debug!(
            "Events: project-opened '{}' to {} listener(s)",
            locator.name(),
            self.listeners.len()
        );
        for listener in &self.listeners {
            listener.project_opened(locator);
        }
    }

    pub fn fire_project_closed(&self, locator: &ProjectLocator) {
        log::debug!(
            "Events: project-closed '{}' to {} listener(s)",
            locator.name(),
            self.listeners.len()
        );
        for listener in &self.listeners {
            listener.project_closed(locator);
        }
    }
}
