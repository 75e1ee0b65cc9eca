use std::fs;

use formflow_core::{ConfigManager, Settings};
use serial_test::serial;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).unwrap();
}

#[test]
#[serial]
fn missing_files_fall_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let settings = ConfigManager::load_from_sources(dir.path(), "test").unwrap();
    assert_eq!(settings.ingest.batch_size, Settings::default().ingest.batch_size);
    assert_eq!(settings.cache.public_form_ttl_secs, 300);
}

#[test]
#[serial]
fn environment_file_overrides_default_file() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "default.toml",
        r#"
[ingest]
queue_capacity = 500
batch_size = 50

[database]
path = "default.db"
"#,
    );
    write(
        &dir,
        "staging.toml",
        r#"
[ingest]
batch_size = 25
"#,
    );
    write(
        &dir,
        "local.toml",
        r#"
[database]
path = "local.db"
"#,
    );

    let settings = ConfigManager::load_from_sources(dir.path(), "staging").unwrap();
    assert_eq!(settings.ingest.queue_capacity, 500);
    assert_eq!(settings.ingest.batch_size, 25);
    assert_eq!(settings.ingest.flush_interval_ms, 1_000);
    assert_eq!(settings.database.path, "local.db");
}

#[test]
#[serial]
fn environment_variables_win_over_files() {
    let dir = TempDir::new().unwrap();
    write(&dir, "default.toml", "[ingest]\nbatch_size = 50\n");

    std::env::set_var("FORMFLOW__INGEST__BATCH_SIZE", "7");
    let loaded = ConfigManager::load_from_sources(dir.path(), "test");
    std::env::remove_var("FORMFLOW__INGEST__BATCH_SIZE");

    assert_eq!(loaded.unwrap().ingest.batch_size, 7);
}

#[test]
#[serial]
fn manager_rejects_invalid_settings() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "default.toml",
        "[ingest]\nqueue_capacity = 10\nbatch_size = 20\n",
    );

    let err = ConfigManager::new(Some(dir.path().to_path_buf()), Some("test".into())).unwrap_err();
    assert!(err.to_string().contains("batch_size"));
}

#[test]
#[serial]
fn manager_exposes_loaded_settings() {
    let dir = TempDir::new().unwrap();
    write(&dir, "default.toml", "[logging]\nlevel = \"debug\"\n");

    let manager =
        ConfigManager::new(Some(dir.path().to_path_buf()), Some("test".into())).unwrap();
    assert_eq!(manager.env(), "test");
    assert_eq!(manager.config_dir(), dir.path());
    assert_eq!(manager.settings().logging.level, "debug");
}
