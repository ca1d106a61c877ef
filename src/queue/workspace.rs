//! Collapses concurrent "load the workspace" triggers into a single load.
//!
//! The first caller schedules the trigger at low priority plus one
//! background monitor that polls for completion. Callers arriving while a
//! load is in flight, or after it finished, are no-ops.

use crate::config::WorkspaceConfig;
use crate::manager::SymbolManager;
use crate::scheduler::{Priority, SharedClock, SystemClock, sleep};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// Starts a workspace load and reports whether it has finished.
pub trait WorkspaceLoader {
    fn trigger(&self, manager: &SymbolManager) -> anyhow::Result<()>;

    fn is_loaded(&self, manager: &SymbolManager) -> bool;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkspaceLoadStats {
    pub triggers: u64,
    pub collapsed: u64,
    pub monitors_started: u64,
    pub max_active_monitors: u64,
    pub completed: u64,
    pub failures: u64,
}

struct CoordinatorInner {
    manager: SymbolManager,
    loader: Rc<dyn WorkspaceLoader>,
    clock: SharedClock,
    interval: Duration,
    loading: Cell<bool>,
    loaded: Cell<bool>,
    active_monitors: Cell<u64>,
    stats: RefCell<WorkspaceLoadStats>,
}

#[derive(Clone)]
pub struct WorkspaceLoadCoordinator {
    inner: Rc<CoordinatorInner>,
}

impl WorkspaceLoadCoordinator {
    pub fn new(
        manager: SymbolManager,
        loader: Rc<dyn WorkspaceLoader>,
        config: &WorkspaceConfig,
    ) -> Self {
        Self::with_clock(manager, loader, Rc::new(SystemClock), config)
    }

    pub fn with_clock(
        manager: SymbolManager,
        loader: Rc<dyn WorkspaceLoader>,
        clock: SharedClock,
        config: &WorkspaceConfig,
    ) -> Self {
        Self {
            inner: Rc::new(CoordinatorInner {
                manager,
                loader,
                clock,
                interval: config.monitor_interval(),
                loading: Cell::new(false),
                loaded: Cell::new(false),
                active_monitors: Cell::new(0),
                stats: RefCell::new(WorkspaceLoadStats::default()),
            }),
        }
    }

    /// Schedule a load unless one is running or already done. Returns true
    /// if this call started the load.
    pub fn ensure_workspace_loaded(&self) -> bool {
        let inner = &self.inner;
        if inner.loading.get() || inner.loaded.get() {
            inner.stats.borrow_mut().collapsed += 1;
            return false;
        }

        inner.loading.set(true);
        inner.stats.borrow_mut().triggers += 1;
        crate::log_event!("workspace", "load requested");

        let trigger = Rc::clone(inner);
        inner
            .manager
            .scheduler()
            .offer(Priority::Low, "workspace-load", async move {
                if let Err(e) = trigger.loader.trigger(&trigger.manager) {
                    tracing::warn!(target: "workspace", "workspace load failed: {e:#}");
                    trigger.loading.set(false);
                    trigger.stats.borrow_mut().failures += 1;
                }
            });

        CoordinatorInner::spawn_monitor(inner);
        true
    }

    /// Record completion reported from outside the monitor.
    pub fn mark_loaded(&self) {
        if !self.inner.loaded.replace(true) {
            self.inner.stats.borrow_mut().completed += 1;
        }
        self.inner.loading.set(false);
    }

    /// Forget a finished or failed load so the next call triggers again.
    pub fn reset(&self) {
        self.inner.loading.set(false);
        self.inner.loaded.set(false);
    }

    pub fn is_loading(&self) -> bool {
        self.inner.loading.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.loaded.get()
    }

    pub fn active_monitors(&self) -> u64 {
        self.inner.active_monitors.get()
    }

    pub fn stats(&self) -> WorkspaceLoadStats {
        *self.inner.stats.borrow()
    }
}

impl CoordinatorInner {
    fn spawn_monitor(this: &Rc<Self>) {
        let active = this.active_monitors.get() + 1;
        this.active_monitors.set(active);
        {
            let mut stats = this.stats.borrow_mut();
            stats.monitors_started += 1;
            stats.max_active_monitors = stats.max_active_monitors.max(active);
        }

        let monitor = Rc::clone(this);
        this.manager
            .scheduler()
            .offer(Priority::Background, "workspace-monitor", async move {
                sleep(&monitor.clock, monitor.interval).await;
                monitor.active_monitors.set(monitor.active_monitors.get() - 1);

                if !monitor.loading.get() {
                    // Load failed, was reset, or was marked loaded elsewhere
                    return;
                }
                if monitor.loader.is_loaded(&monitor.manager) {
                    monitor.loading.set(false);
                    monitor.loaded.set(true);
                    monitor.stats.borrow_mut().completed += 1;
                    crate::log_event!("workspace", "loaded", "{} files", monitor.manager.files().len());
                    return;
                }
                crate::debug_event!("workspace", "still loading", "re-queueing monitor");
                Self::spawn_monitor(&monitor);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{ManualClock, Scheduler};
    use crate::symbol::SymbolTable;
    use crate::types::FileUri;

    /// Loader that reports done on its `ready_after`-th completion check.
    struct CountingLoader {
        triggers: Cell<u32>,
        polls: Cell<u32>,
        ready_after: u32,
        fail: bool,
    }

    impl CountingLoader {
        fn new(ready_after: u32) -> Rc<Self> {
            Rc::new(Self {
                triggers: Cell::new(0),
                polls: Cell::new(0),
                ready_after,
                fail: false,
            })
        }
    }

    impl WorkspaceLoader for CountingLoader {
        fn trigger(&self, manager: &SymbolManager) -> anyhow::Result<()> {
            self.triggers.set(self.triggers.get() + 1);
            if self.fail {
                anyhow::bail!("workspace root is not readable");
            }
            manager.add_symbol_table(SymbolTable::new(FileUri::new("file:///src/classes/A.cls")));
            Ok(())
        }

        fn is_loaded(&self, _manager: &SymbolManager) -> bool {
            self.polls.set(self.polls.get() + 1);
            self.polls.get() >= self.ready_after
        }
    }

    fn coordinator(loader: Rc<CountingLoader>) -> WorkspaceLoadCoordinator {
        let manager = SymbolManager::new(Scheduler::new());
        let clock = Rc::new(ManualClock::ticking(Duration::from_millis(5)));
        WorkspaceLoadCoordinator::with_clock(manager, loader, clock, &WorkspaceConfig::default())
    }

    fn run(coordinator: &WorkspaceLoadCoordinator) {
        coordinator.inner.manager.scheduler().run_until_idle();
    }

    #[test]
    fn test_concurrent_triggers_collapse() {
        let loader = CountingLoader::new(3);
        let coordinator = coordinator(Rc::clone(&loader));

        assert!(coordinator.ensure_workspace_loaded());
        for _ in 0..4 {
            assert!(!coordinator.ensure_workspace_loaded());
        }
        assert!(coordinator.is_loading());

        run(&coordinator);

        assert_eq!(loader.triggers.get(), 1);
        assert!(coordinator.is_loaded());
        assert!(!coordinator.is_loading());
        assert_eq!(coordinator.active_monitors(), 0);

        let stats = coordinator.stats();
        assert_eq!(stats.triggers, 1);
        assert_eq!(stats.collapsed, 4);
        assert_eq!(stats.monitors_started, 3);
        assert_eq!(stats.max_active_monitors, 1);
        assert_eq!(stats.completed, 1);

        assert!(!coordinator.ensure_workspace_loaded());
        run(&coordinator);
        assert_eq!(loader.triggers.get(), 1);
    }

    #[test]
    fn test_failed_trigger_clears_guard() {
        let loader = Rc::new(CountingLoader {
            triggers: Cell::new(0),
            polls: Cell::new(0),
            ready_after: 1,
            fail: true,
        });
        let coordinator = coordinator(Rc::clone(&loader));

        assert!(coordinator.ensure_workspace_loaded());
        run(&coordinator);

        assert!(!coordinator.is_loading());
        assert!(!coordinator.is_loaded());
        assert_eq!(coordinator.stats().failures, 1);
        assert_eq!(loader.polls.get(), 0);

        assert!(coordinator.ensure_workspace_loaded());
        run(&coordinator);
        assert_eq!(loader.triggers.get(), 2);
    }

    #[test]
    fn test_reset_allows_reload() {
        let loader = CountingLoader::new(1);
        let coordinator = coordinator(Rc::clone(&loader));

        coordinator.ensure_workspace_loaded();
        run(&coordinator);
        assert!(coordinator.is_loaded());

        coordinator.reset();
        assert!(coordinator.ensure_workspace_loaded());
        run(&coordinator);
        assert_eq!(loader.triggers.get(), 2);
    }
}
