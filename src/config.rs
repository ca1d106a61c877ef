//! Configuration for the semantic engine.
//!
//! Layered configuration:
//! - Default values
//! - TOML configuration file (`.stratum/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `STRATUM_` and use double
//! underscores to separate nested levels:
//! - `STRATUM_RESOLUTION__BATCH_SIZE=25` sets `resolution.batch_size`
//! - `STRATUM_VALIDATION__MAX_ARTIFACTS=3` sets `validation.max_artifacts`
//! - `STRATUM_LOGGING__DEFAULT=debug` sets `logging.default`

use crate::queue::RequestType;
use crate::scheduler::Priority;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const CONFIG_DIR: &str = ".stratum";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "STRATUM_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write configuration to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .stratum is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Deferred reference resolution
    #[serde(default)]
    pub resolution: ResolutionConfig,

    /// Validation pipeline
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Request queue handlers
    #[serde(default)]
    pub queue: QueueConfig,

    /// Workspace load coordination
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Logging levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ResolutionConfig {
    /// References per batch task
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Elapsed time after which a batch yields twice as often
    #[serde(default = "default_yield_time_threshold_ms")]
    pub yield_time_threshold_ms: u64,

    /// Retries for single-reference tasks whose target is still missing
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Wait before retry N of a single-reference task is N times this
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Samples of queue depth kept in the rolling history
    #[serde(default = "default_queue_depth_history")]
    pub queue_depth_history: usize,

    /// Log a metrics summary after this many batches...
    #[serde(default = "default_summary_every_batches")]
    pub summary_every_batches: u64,

    /// ...or after this much wall time, whichever comes first
    #[serde(default = "default_summary_interval_ms")]
    pub summary_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ValidationConfig {
    /// Artifacts loaded at most per validation run
    #[serde(default = "default_max_artifacts")]
    pub max_artifacts: usize,

    /// Budget for all artifact loads of one run
    #[serde(default = "default_artifact_timeout_ms")]
    pub artifact_timeout_ms: u64,

    /// Allow THOROUGH validators to load missing artifacts
    #[serde(default = "default_true")]
    pub enable_artifact_loading: bool,
}

/// Per-request handler settings.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct HandlerConfig {
    pub priority: Priority,
    pub timeout_ms: u64,
    #[serde(default)]
    pub max_retries: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct QueueConfig {
    /// Keyed by LSP method name, e.g. `textDocument/hover`
    #[serde(default = "default_handlers")]
    pub handlers: IndexMap<String, HandlerConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WorkspaceConfig {
    /// Delay between workspace-load monitor checks
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `resolution = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 { 1 }
fn default_true() -> bool { true }
fn default_batch_size() -> usize { 10 }
fn default_yield_time_threshold_ms() -> u64 { 50 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 20 }
fn default_queue_depth_history() -> usize { 100 }
fn default_summary_every_batches() -> u64 { 50 }
fn default_summary_interval_ms() -> u64 { 5_000 }
fn default_max_artifacts() -> usize { 5 }
fn default_artifact_timeout_ms() -> u64 { 5_000 }
fn default_monitor_interval_ms() -> u64 { 250 }
fn default_log_level() -> String { "warn".to_string() }

fn default_handlers() -> IndexMap<String, HandlerConfig> {
    RequestType::ALL
        .iter()
        .map(|request| (request.method().to_string(), request.default_config()))
        .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            resolution: ResolutionConfig::default(),
            validation: ValidationConfig::default(),
            queue: QueueConfig::default(),
            workspace: WorkspaceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            yield_time_threshold_ms: default_yield_time_threshold_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            queue_depth_history: default_queue_depth_history(),
            summary_every_batches: default_summary_every_batches(),
            summary_interval_ms: default_summary_interval_ms(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_artifacts: default_max_artifacts(),
            artifact_timeout_ms: default_artifact_timeout_ms(),
            enable_artifact_loading: true,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            handlers: default_handlers(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            monitor_interval_ms: default_monitor_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl ResolutionConfig {
    pub fn yield_time_threshold(&self) -> Duration {
        Duration::from_millis(self.yield_time_threshold_ms)
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_millis(self.summary_interval_ms)
    }

    /// Backoff before the `retry`-th retry of a single-reference task.
    pub fn retry_delay(&self, retry: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(u64::from(retry)))
    }
}

impl ValidationConfig {
    pub fn artifact_timeout(&self) -> Duration {
        Duration::from_millis(self.artifact_timeout_ms)
    }
}

impl HandlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl QueueConfig {
    /// Configuration for a request type, falling back to its built-in default.
    pub fn handler(&self, request: RequestType) -> HandlerConfig {
        self.handlers
            .get(request.method())
            .copied()
            .unwrap_or_else(|| request.default_config())
    }
}

impl WorkspaceConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        let mut settings: Settings = Self::figment(config_path).extract().map_err(Box::new)?;
        if settings.workspace_root.is_none() {
            settings.workspace_root = Self::workspace_root();
        }
        Ok(settings)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Ok(Self::figment(path.as_ref().to_path_buf())
            .extract()
            .map_err(Box::new)?)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels; single underscores
            // stay part of the field name
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find `.stratum/settings.toml` from the current directory upwards
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Get the workspace root directory (where .stratum is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(|ancestor| ancestor.to_path_buf())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string).map_err(write_error)?;

        Ok(())
    }
}
