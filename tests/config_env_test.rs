use std::env;
use std::fs;
use std::time::Duration;
use stratum::Settings;
use stratum::queue::RequestType;
use stratum::scheduler::Priority;
use tempfile::TempDir;

// Single test: environment variables are process-wide and tests run in parallel
#[test]
fn test_env_overrides_file_and_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("settings.toml");
    fs::write(
        &config_path,
        r#"
[resolution]
batch_size = 25
max_retries = 5

[workspace]
monitor_interval_ms = 100
"#,
    )
    .unwrap();

    unsafe {
        // Double underscore separates nesting; single underscores stay in the key
        env::set_var("STRATUM_RESOLUTION__BATCH_SIZE", "40");
        env::set_var("STRATUM_VALIDATION__ENABLE_ARTIFACT_LOADING", "false");
        env::set_var("STRATUM_LOGGING__DEFAULT", "debug");
    }

    let settings = Settings::load_from(&config_path).unwrap();

    unsafe {
        env::remove_var("STRATUM_RESOLUTION__BATCH_SIZE");
        env::remove_var("STRATUM_VALIDATION__ENABLE_ARTIFACT_LOADING");
        env::remove_var("STRATUM_LOGGING__DEFAULT");
    }

    // Environment beats the file
    assert_eq!(settings.resolution.batch_size, 40);
    assert!(!settings.validation.enable_artifact_loading);
    assert_eq!(settings.logging.default, "debug");

    // File beats defaults
    assert_eq!(settings.resolution.max_retries, 5);
    assert_eq!(settings.workspace.monitor_interval(), Duration::from_millis(100));

    // Untouched sections keep their defaults
    assert_eq!(settings.validation.max_artifacts, 5);
    assert_eq!(
        settings.queue.handler(RequestType::Completion).priority,
        Priority::Immediate
    );
}

#[test]
fn test_missing_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let settings = Settings::load_from(temp_dir.path().join("absent.toml")).unwrap();

    assert_eq!(settings.version, 1);
    assert_eq!(settings.validation.artifact_timeout(), Duration::from_millis(5_000));
    assert_eq!(settings.queue.handler(RequestType::Rename).timeout_ms, 30_000);
}
