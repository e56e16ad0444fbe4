#![allow(missing_docs)]

use std::fs;

use metacat::config::StoreConfig;
use metacat::migration::get_schema_version;
use metacat::source::ConnectionMode;
use metacat::store::connect;
use metacat::types::{ErrorCode, TypeKind};
use tempfile::TempDir;

fn file_config(dir: &TempDir) -> StoreConfig {
    StoreConfig::for_database(dir.path().join("catalog.db").display().to_string())
}

#[test]
fn connect_creates_and_reopens_a_catalog() {
    let dir = TempDir::new().expect("tempdir");
    let config = file_config(&dir);
    {
        let mut exec = connect(&config).unwrap();
        assert_eq!(get_schema_version(&mut exec).unwrap(), 6);
        exec.insert_artifact_type("Dataset", None, None).unwrap();
    }
    let mut exec = connect(&config).unwrap();
    let rs = exec
        .select_type_by_name("Dataset", None, TypeKind::Artifact)
        .unwrap();
    assert_eq!(rs.len(), 1);
}

#[test]
fn empty_uri_is_in_memory() {
    let mut exec = connect(&StoreConfig::default()).unwrap();
    assert_eq!(get_schema_version(&mut exec).unwrap(), 6);
}

#[test]
fn requested_downgrade_cancels_the_connection() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = file_config(&dir);
    connect(&config).unwrap();

    config.migration.downgrade_to_schema_version = Some(3);
    let err = connect(&config).err().expect("downgrade cancels");
    assert_eq!(err.code(), ErrorCode::Cancelled);
    assert!(err.to_string().contains("schema version 3"));

    config.migration.downgrade_to_schema_version = None;
    let err = connect(&config).err().expect("older database is refused");
    assert_eq!(err.code(), ErrorCode::FailedPrecondition);

    config.migration.enable_upgrade_migration = true;
    let mut exec = connect(&config).unwrap();
    assert_eq!(get_schema_version(&mut exec).unwrap(), 6);
}

#[test]
fn invalid_downgrade_target_leaves_database_untouched() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = file_config(&dir);
    connect(&config).unwrap();
    config.migration.downgrade_to_schema_version = Some(9);
    let err = connect(&config).err().expect("target out of range");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    config.migration.downgrade_to_schema_version = None;
    connect(&config).unwrap();
}

#[test]
fn read_only_mode_needs_an_existing_file() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = file_config(&dir);
    config.connection.connection_mode = ConnectionMode::ReadOnly;
    let err = connect(&config).err().expect("missing file");
    assert_eq!(err.code(), ErrorCode::Internal);
}

#[test]
fn broken_query_config_override_is_invalid_argument() {
    let dir = TempDir::new().expect("tempdir");
    let override_path = dir.path().join("queries.toml");
    fs::write(&override_path, "schema_version = 0\n").unwrap();
    let mut config = file_config(&dir);
    config.migration.query_config = Some(override_path);
    let err = connect(&config).err().expect("invalid catalog");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

#[test]
fn store_config_file_drives_connect() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("from_file.db");
    let config_path = dir.path().join("store.toml");
    fs::write(
        &config_path,
        format!(
            "[connection]\nfilename_uri = '{}'\n\n[migration]\nenable_upgrade_migration = true\n",
            db.display()
        ),
    )
    .unwrap();
    let config = StoreConfig::load(Some(config_path)).unwrap();
    connect(&config).unwrap();
    assert!(db.exists());
}
