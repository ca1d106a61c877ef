//! Structured logging for the resolution, queue and validation subsystems.
//!
//! Every event carries one of the component targets in [`TARGETS`], so a
//! single component can be turned up without drowning in the others:
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! resolution = "debug"  # batch and retry decisions
//! workspace = "info"    # load start and completion
//! ```
//!
//! `RUST_LOG` replaces the configured filter entirely when set, e.g.
//! `RUST_LOG=queue=debug,resolution=trace`.

use std::sync::Once;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LoggingConfig, Settings};

/// Targets emitted by this crate, in pipeline order.
pub const TARGETS: [&str; 7] = [
    "scheduler",
    "graph",
    "resolution",
    "enrichment",
    "validation",
    "queue",
    "workspace",
];

/// Used when the configured filter does not parse.
const FALLBACK_FILTER: &str = "warn";

static INIT: Once = Once::new();

/// Local wall time with milliseconds, e.g. `14:03:27.481`.
struct WallClockMillis;

impl FormatTime for WallClockMillis {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Filter directives for `config`: the default level, then one override per
/// configured target in name order.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut overrides: Vec<(&String, &String)> = config.modules.iter().collect();
    overrides.sort();

    let mut directives = config.default.trim().to_string();
    for (target, level) in overrides {
        if !directives.is_empty() {
            directives.push(',');
        }
        directives.push_str(&format!("{}={}", target.trim(), level.trim()));
    }
    directives
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    if std::env::var_os("RUST_LOG").is_some()
        && let Ok(filter) = EnvFilter::try_from_default_env()
    {
        return filter;
    }
    EnvFilter::try_new(filter_directives(config))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_FILTER))
}

/// Install the global subscriber. Only the first call in a process has any
/// effect, so tests and embedders can call it freely.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_timer(WallClockMillis)
            .with_filter(build_filter(config));

        if tracing_subscriber::registry().with(layer).try_init().is_ok() {
            tracing::debug!(
                target: "scheduler",
                "logging ready: {}",
                filter_directives(config)
            );
        }
    });
}

/// Install the subscriber from the `[logging]` section of `settings`.
pub fn init_from_settings(settings: &Settings) {
    init_with_config(&settings.logging);
}

/// Install the subscriber with the default `warn` level.
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Log a lifecycle event under a component target.
///
/// # Examples
/// ```ignore
/// log_event!("workspace", "loaded", "{} files", count);
/// log_event!("queue", "shutdown");
/// ```
#[macro_export]
macro_rules! log_event {
    ($target:literal, $event:expr) => {
        tracing::info!(target: $target, "[{}] {}", $target, $event)
    };
    ($target:literal, $event:expr, $($arg:tt)*) => {
        tracing::info!(target: $target, "[{}] {}: {}", $target, $event, format!($($arg)*))
    };
}

/// Debug-level counterpart of [`log_event!`].
///
/// # Examples
/// ```ignore
/// debug_event!("resolution", "requeued", "{}", reference.name);
/// ```
#[macro_export]
macro_rules! debug_event {
    ($target:literal, $event:expr) => {
        tracing::debug!(target: $target, "[{}] {}", $target, $event)
    };
    ($target:literal, $event:expr, $($arg:tt)*) => {
        tracing::debug!(target: $target, "[{}] {}: {}", $target, $event, format!($($arg)*))
    };
}
