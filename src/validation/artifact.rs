//! Bounded loading of missing dependency artifacts.
//!
//! During a thorough validation run a validator that cannot resolve a type may
//! ask for the type's artifact. Loading is capped per run by count and by a
//! time budget, and is never transitive: the types an artifact itself
//! references are not loaded. Names whose load failed or was skipped for
//! budget reasons are remembered so validators can suppress findings about
//! them instead of reporting false positives.

use crate::config::ValidationConfig;
use crate::manager::SymbolManager;
use crate::scheduler::SharedClock;
use crate::symbol::SymbolTable;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArtifactError {
    #[error("artifact source unavailable: {0}")]
    Unavailable(String),

    #[error("failed to load artifact for '{name}': {reason}")]
    LoadFailed { name: String, reason: String },
}

/// Source of dependency artifacts, e.g. a workspace cache or a remote org.
pub trait ArtifactLoader {
    /// `Ok(None)` means the source answered and has no such type.
    fn load_artifact(&self, type_name: &str) -> Result<Option<SymbolTable>, ArtifactError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactStatus {
    Loaded,
    /// The source has no artifact for this name.
    NotFound,
    Failed,
    SkippedBudget,
    SkippedTimeout,
    Disabled,
}

impl ArtifactStatus {
    /// Whether findings about the name should be withheld.
    pub fn suppresses(&self) -> bool {
        matches!(
            self,
            ArtifactStatus::Failed | ArtifactStatus::SkippedBudget | ArtifactStatus::SkippedTimeout
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactStats {
    pub attempted: usize,
    pub loaded: usize,
    pub not_found: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Default)]
struct LoadState {
    started_at: Option<Instant>,
    attempts: usize,
    outcomes: HashMap<String, ArtifactStatus>,
}

/// Per-run artifact loading with a count cap and a time budget.
pub struct ArtifactLoadingHelper {
    loader: Rc<dyn ArtifactLoader>,
    manager: SymbolManager,
    clock: SharedClock,
    max_artifacts: usize,
    timeout: Duration,
    enabled: bool,
    state: RefCell<LoadState>,
}

impl ArtifactLoadingHelper {
    pub fn new(
        loader: Rc<dyn ArtifactLoader>,
        manager: SymbolManager,
        clock: SharedClock,
        config: &ValidationConfig,
    ) -> Self {
        Self {
            loader,
            manager,
            clock,
            max_artifacts: config.max_artifacts,
            timeout: config.artifact_timeout(),
            enabled: config.enable_artifact_loading,
            state: RefCell::new(LoadState::default()),
        }
    }

    /// Try to make `type_name` known to the manager by loading its artifact.
    ///
    /// Each name is attempted at most once per helper; later calls return the
    /// recorded status.
    pub fn ensure_loaded(&self, type_name: &str) -> ArtifactStatus {
        let key = type_name.to_lowercase();
        if let Some(status) = self.state.borrow().outcomes.get(&key) {
            return *status;
        }

        if !self.enabled {
            return ArtifactStatus::Disabled;
        }

        let status = self.attempt(type_name);
        self.state.borrow_mut().outcomes.insert(key, status);
        status
    }

    fn attempt(&self, type_name: &str) -> ArtifactStatus {
        {
            let mut state = self.state.borrow_mut();
            if state.attempts >= self.max_artifacts {
                tracing::debug!(
                    target: "validation",
                    "artifact budget of {} exhausted, skipping '{type_name}'",
                    self.max_artifacts
                );
                return ArtifactStatus::SkippedBudget;
            }
            let started_at = *state.started_at.get_or_insert_with(|| self.clock.now());
            if self.clock.elapsed_since(started_at) >= self.timeout {
                tracing::debug!(
                    target: "validation",
                    "artifact time budget of {:?} spent, skipping '{type_name}'",
                    self.timeout
                );
                return ArtifactStatus::SkippedTimeout;
            }
            state.attempts += 1;
        }

        match self.loader.load_artifact(type_name) {
            Ok(Some(table)) => {
                let report = self.manager.add_symbol_table(table);
                tracing::debug!(
                    target: "validation",
                    "loaded artifact for '{type_name}' ({} symbols)",
                    report.symbols
                );
                ArtifactStatus::Loaded
            }
            Ok(None) => ArtifactStatus::NotFound,
            Err(e) => {
                tracing::warn!(target: "validation", "{e}");
                ArtifactStatus::Failed
            }
        }
    }

    /// Recorded status for a name, if it was requested during this run.
    pub fn status(&self, type_name: &str) -> Option<ArtifactStatus> {
        self.state
            .borrow()
            .outcomes
            .get(&type_name.to_lowercase())
            .copied()
    }

    /// Whether findings about `type_name` must be withheld.
    pub fn should_suppress(&self, type_name: &str) -> bool {
        self.status(type_name).is_some_and(|s| s.suppresses())
    }

    pub fn stats(&self) -> ArtifactStats {
        let state = self.state.borrow();
        let mut stats = ArtifactStats {
            attempted: state.attempts,
            ..ArtifactStats::default()
        };
        for status in state.outcomes.values() {
            match status {
                ArtifactStatus::Loaded => stats.loaded += 1,
                ArtifactStatus::NotFound => stats.not_found += 1,
                ArtifactStatus::Failed => stats.failed += 1,
                ArtifactStatus::SkippedBudget | ArtifactStatus::SkippedTimeout => {
                    stats.skipped += 1
                }
                ArtifactStatus::Disabled => {}
            }
        }
        stats
    }
}
