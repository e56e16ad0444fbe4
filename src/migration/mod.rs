#![forbid(unsafe_code)]

//! Schema versioning for a metadata source.
//!
//! The database records its schema version in the single-row `MLMDEnv` table. A database
//! without that table is either empty, or a pre-versioning (version 0) layout recognised by
//! its legacy tables. Migrations move one version at a time using the schemes in the
//! [`QueryConfig`](crate::query::QueryConfig).

pub mod verify;

use tracing::{debug, info};

use crate::query::{QueryExecutor, TemplateQuery, Templates};
use crate::source::{parse_cell, MetadataSource};
use crate::types::{CatalogError, ErrorCode, Result, ResultExt};

pub use verify::{verify_downgrade_path, verify_upgrade_path, VerificationReport, VerificationStep};

/// Tables of a current-version database with their create and check templates, in
/// creation order.
fn tables(t: &Templates) -> [(&'static str, &TemplateQuery, &TemplateQuery); 15] {
    [
        ("Type", &t.create_type_table, &t.check_type_table),
        ("TypeProperty", &t.create_type_property_table, &t.check_type_property_table),
        ("ParentType", &t.create_parent_type_table, &t.check_parent_type_table),
        ("Artifact", &t.create_artifact_table, &t.check_artifact_table),
        (
            "ArtifactProperty",
            &t.create_artifact_property_table,
            &t.check_artifact_property_table,
        ),
        ("Execution", &t.create_execution_table, &t.check_execution_table),
        (
            "ExecutionProperty",
            &t.create_execution_property_table,
            &t.check_execution_property_table,
        ),
        ("Event", &t.create_event_table, &t.check_event_table),
        ("EventPath", &t.create_event_path_table, &t.check_event_path_table),
        ("MLMDEnv", &t.create_mlmd_env_table, &t.check_mlmd_env_table),
        ("Context", &t.create_context_table, &t.check_context_table),
        (
            "ContextProperty",
            &t.create_context_property_table,
            &t.check_context_property_table,
        ),
        (
            "ParentContext",
            &t.create_parent_context_table,
            &t.check_parent_context_table,
        ),
        ("Association", &t.create_association_table, &t.check_association_table),
        ("Attribution", &t.create_attribution_table, &t.check_attribution_table),
    ]
}

/// Reads the recorded schema version.
///
/// * `NotFound` when the database holds no catalog at all.
/// * `Aborted` when the marker table is empty, as during a concurrent first initialization.
/// * `DataLoss` when the marker holds several rows or an unreadable value.
pub fn get_schema_version<S: MetadataSource>(exec: &mut QueryExecutor<S>) -> Result<i64> {
    let config = exec.config_handle();
    let rs = match exec.execute(&config.templates.check_mlmd_env_table, &[]) {
        Ok(rs) => rs,
        Err(err) => {
            debug!(error = %err, "migration.version.no_marker");
            return match exec.execute(&config.templates.check_legacy_tables, &[]) {
                Ok(_) => Ok(0),
                Err(_) => Err(CatalogError::NotFound(
                    "schema version table does not exist".into(),
                )),
            };
        }
    };
    match rs.records.as_slice() {
        [] => Err(CatalogError::Aborted(
            "schema version table is empty; another connection may be initializing it".into(),
        )),
        [record] => parse_cell(record.first().and_then(Option::as_deref), "schema version")
            .map_err(|err| CatalogError::DataLoss(err.to_string())),
        rows => Err(CatalogError::DataLoss(format!(
            "schema version table should hold one row, found {}",
            rows.len()
        ))),
    }
}

/// Whether a library at `lib_version` may use a database at `db_version`.
pub fn is_compatible(db_version: i64, lib_version: i64) -> bool {
    db_version == lib_version
}

/// Brings an older database up to the library's version.
///
/// An empty database counts as current. A newer database, or an older one while
/// `enable_migration` is false, is `FailedPrecondition`.
pub fn upgrade_if_out_of_date<S: MetadataSource>(
    exec: &mut QueryExecutor<S>,
    enable_migration: bool,
) -> Result<()> {
    let config = exec.config_handle();
    let lib_version = config.schema_version;
    let db_version = match get_schema_version(exec) {
        Err(err) if err.code() == ErrorCode::NotFound => lib_version,
        other => other?,
    };
    if db_version > lib_version {
        return Err(CatalogError::FailedPrecondition(format!(
            "database schema version {db_version} is newer than library version {lib_version}; \
             use a newer library, or downgrade the database with one"
        )));
    }
    if is_compatible(db_version, lib_version) {
        return Ok(());
    }
    if !enable_migration {
        return Err(CatalogError::FailedPrecondition(format!(
            "database schema version {db_version} is older than library version {lib_version}; \
             enable upgrade migration to upgrade it"
        )));
    }
    for version in db_version + 1..=lib_version {
        let scheme = config.migration_scheme(version).ok_or_else(|| {
            CatalogError::Internal(format!("no migration scheme for version {version}"))
        })?;
        info!(from = version - 1, to = version, "migration.upgrade.step");
        for query in &scheme.upgrade {
            exec.execute(query, &[])
                .with_context(|| format!("Upgrade query failed: {}", query.query()))?;
        }
        exec.update_schema_version(version)
            .with_context(|| format!("failed to record schema version {version}"))?;
    }
    info!(from = db_version, to = lib_version, "migration.upgrade.completed");
    Ok(())
}

/// Moves the database back to `to_version`, one step at a time.
pub fn downgrade<S: MetadataSource>(exec: &mut QueryExecutor<S>, to_version: i64) -> Result<()> {
    let config = exec.config_handle();
    let lib_version = config.schema_version;
    if to_version < 0 || to_version > lib_version {
        return Err(CatalogError::InvalidArgument(format!(
            "downgrade target {to_version} must lie in 0..={lib_version}"
        )));
    }
    let db_version = match get_schema_version(exec) {
        Err(err) if err.code() == ErrorCode::NotFound => {
            return Err(CatalogError::InvalidArgument(
                "an empty database cannot be downgraded".into(),
            ));
        }
        other => other?,
    };
    if db_version > lib_version {
        return Err(CatalogError::FailedPrecondition(format!(
            "database schema version {db_version} is newer than library version {lib_version}"
        )));
    }
    for version in (to_version + 1..=db_version).rev() {
        let scheme = config.migration_scheme(version).ok_or_else(|| {
            CatalogError::Internal(format!("no migration scheme for version {version}"))
        })?;
        info!(from = version, to = version - 1, "migration.downgrade.step");
        for query in &scheme.downgrade {
            exec.execute(query, &[])
                .with_context(|| format!("Downgrade query failed: {}", query.query()))?;
        }
        // Version 0 has no marker table.
        if version - 1 > 0 {
            exec.update_schema_version(version - 1)
                .with_context(|| format!("failed to record schema version {}", version - 1))?;
        }
    }
    Ok(())
}

/// Creates every table and index of the current version and records the version.
pub fn initialize_if_absent<S: MetadataSource>(exec: &mut QueryExecutor<S>) -> Result<()> {
    let config = exec.config_handle();
    for (name, create, _) in tables(&config.templates) {
        exec.execute(create, &[])
            .with_context(|| format!("failed to create table {name}"))?;
    }
    for index in &config.secondary_indices {
        match exec.execute(index, &[]) {
            Err(err) if err.is_already_exists() => {
                debug!(query = index.query(), "migration.init.index_exists");
            }
            other => {
                other.with_context(|| format!("failed to create index: {}", index.query()))?;
            }
        }
    }
    let lib_version = config.schema_version;
    if let Err(insert_err) = exec.insert_schema_version(lib_version) {
        // Another connection may have finished the same initialization first.
        let recorded = get_schema_version(exec).map_err(|_| insert_err)?;
        if recorded != lib_version {
            return Err(CatalogError::DataLoss(format!(
                "database recorded schema version {recorded} while initializing version \
                 {lib_version}"
            )));
        }
    }
    info!(schema_version = lib_version, "migration.init.created");
    Ok(())
}

/// Opens an existing catalog or creates one in an empty database.
///
/// A database holding only some of the tables is `Aborted`.
pub fn init_if_not_exists<S: MetadataSource>(
    exec: &mut QueryExecutor<S>,
    enable_upgrade_migration: bool,
) -> Result<()> {
    upgrade_if_out_of_date(exec, enable_upgrade_migration)?;
    let config = exec.config_handle();
    let mut present = Vec::new();
    let mut missing = Vec::new();
    for (name, _, check) in tables(&config.templates) {
        match exec.execute(check, &[]) {
            Ok(_) => present.push(name),
            Err(_) => missing.push(name),
        }
    }
    if missing.is_empty() {
        return Ok(());
    }
    if present.is_empty() {
        return initialize_if_absent(exec);
    }
    Err(CatalogError::Aborted(format!(
        "database holds a partial table set, possibly from a concurrent initialization; \
         retry the connection. present: [{}] missing: [{}]",
        present.join(", "),
        missing.join(", ")
    )))
}
