//! Explicit wiring of the engine's long-lived handles for one server.

use crate::config::Settings;
use crate::manager::SymbolManager;
use crate::queue::{RequestQueueManager, WorkspaceLoadCoordinator, WorkspaceLoader};
use crate::scheduler::{Scheduler, SharedClock, SystemClock};
use std::cell::RefCell;
use std::rc::Rc;

/// Owns the scheduler, symbol manager and request queue of one server.
///
/// The queue is created on first use. After [`shutdown`](Self::shutdown)
/// the next call to [`queue`](Self::queue) builds a fresh one.
pub struct ServerContext {
    settings: Settings,
    scheduler: Scheduler,
    clock: SharedClock,
    manager: SymbolManager,
    queue: RefCell<Option<RequestQueueManager>>,
}

impl ServerContext {
    pub fn new(settings: Settings) -> Self {
        Self::with_clock(settings, Rc::new(SystemClock))
    }

    pub fn with_clock(settings: Settings, clock: SharedClock) -> Self {
        let scheduler = Scheduler::new();
        let manager = SymbolManager::with_config(
            scheduler.clone(),
            Rc::clone(&clock),
            settings.resolution.clone(),
        );
        Self {
            settings,
            scheduler,
            clock,
            manager,
            queue: RefCell::new(None),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn symbol_manager(&self) -> &SymbolManager {
        &self.manager
    }

    pub fn queue(&self) -> RequestQueueManager {
        self.queue
            .borrow_mut()
            .get_or_insert_with(|| {
                RequestQueueManager::with_clock(
                    self.manager.clone(),
                    &self.settings.queue,
                    Rc::clone(&self.clock),
                )
            })
            .clone()
    }

    pub fn workspace_coordinator(&self, loader: Rc<dyn WorkspaceLoader>) -> WorkspaceLoadCoordinator {
        WorkspaceLoadCoordinator::with_clock(
            self.manager.clone(),
            loader,
            Rc::clone(&self.clock),
            &self.settings.workspace,
        )
    }

    /// Shut down the current queue, if any. Returns false when there was
    /// nothing to shut down.
    pub fn shutdown(&self) -> bool {
        match self.queue.borrow_mut().take() {
            Some(queue) => queue.shutdown(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueError;
    use serde_json::json;

    #[test]
    fn test_queue_is_shared_until_shutdown() {
        let context = ServerContext::new(Settings::default());
        let first = context.queue();
        let _ = context.queue().submit_hover_request(json!({})).unwrap();
        assert_eq!(first.get_stats().submitted, 1);

        assert!(context.shutdown());
        assert!(!context.shutdown());
        assert_eq!(first.submit_hover_request(json!({})).err(), Some(QueueError::Shutdown));

        let fresh = context.queue();
        assert!(!fresh.is_shutdown());
        assert_eq!(fresh.get_stats().submitted, 0);
    }
}
