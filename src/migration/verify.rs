#![forbid(unsafe_code)]

//! Replays the catalog's migration verification blocks against a scratch database.
//!
//! Every scheme can carry `setup` statements that recreate data at the previous version
//! and `checks` that must each return a single true cell once the migration has run.

use serde::Serialize;
use tracing::info;

use super::{downgrade, get_schema_version, init_if_not_exists};
use crate::query::{MigrationVerification, QueryExecutor, TemplateQuery};
use crate::source::MetadataSource;
use crate::types::{CatalogError, ErrorCode, Result, ResultExt};

/// One verified migration step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationStep {
    pub from: i64,
    pub to: i64,
    pub setup_statements: usize,
    pub checks_passed: usize,
}

/// Outcome of replaying one migration direction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub direction: &'static str,
    pub library_version: i64,
    pub steps: Vec<VerificationStep>,
}

/// Rebuilds a version 0 database from every upgrade setup, then upgrades it and runs the
/// library version's upgrade checks. `exec` must start out empty.
pub fn verify_upgrade_path<S: MetadataSource>(
    exec: &mut QueryExecutor<S>,
) -> Result<VerificationReport> {
    let config = exec.config_handle();
    let lib_version = config.schema_version;
    let mut setup_statements = 0;
    for (_, scheme) in config.migration_schemes() {
        if let Some(verification) = &scheme.upgrade_verification {
            setup_statements += run_setup(exec, &verification.setup)?;
        }
    }
    expect_version(exec, 0)?;
    match init_if_not_exists(exec, false) {
        Err(err) if err.code() == ErrorCode::FailedPrecondition => {}
        Err(err) => return Err(err).context("opening an old database without migration"),
        Ok(()) => {
            return Err(CatalogError::Internal(
                "an old database opened without upgrade migration".into(),
            ));
        }
    }
    init_if_not_exists(exec, true)?;
    expect_version(exec, lib_version)?;
    let checks_passed = match config
        .migration_scheme(lib_version)
        .and_then(|scheme| scheme.upgrade_verification.as_ref())
    {
        Some(verification) => run_checks(exec, verification)?,
        None => 0,
    };
    info!(from = 0, to = lib_version, checks = checks_passed, "migration.verify.upgrade");
    Ok(VerificationReport {
        direction: "upgrade",
        library_version: lib_version,
        steps: vec![VerificationStep {
            from: 0,
            to: lib_version,
            setup_statements,
            checks_passed,
        }],
    })
}

/// Initializes an empty database, then downgrades it one version at a time down to 0,
/// running each scheme's downgrade setup before and checks after the step.
pub fn verify_downgrade_path<S: MetadataSource>(
    exec: &mut QueryExecutor<S>,
) -> Result<VerificationReport> {
    let config = exec.config_handle();
    let lib_version = config.schema_version;
    match downgrade(exec, 0) {
        Err(err) if err.code() == ErrorCode::InvalidArgument => {}
        Err(err) => return Err(err).context("downgrading an empty database"),
        Ok(()) => {
            return Err(CatalogError::Internal(
                "downgrading an empty database succeeded".into(),
            ));
        }
    }
    init_if_not_exists(exec, false)?;
    let mut steps = Vec::new();
    for version in (1..=lib_version).rev() {
        let verification = config
            .migration_scheme(version)
            .and_then(|scheme| scheme.downgrade_verification.clone())
            .unwrap_or_default();
        let setup_statements = run_setup(exec, &verification.setup)?;
        downgrade(exec, version - 1)?;
        let checks_passed = run_checks(exec, &verification)?;
        expect_version(exec, version - 1)?;
        info!(from = version, to = version - 1, checks = checks_passed, "migration.verify.downgrade");
        steps.push(VerificationStep {
            from: version,
            to: version - 1,
            setup_statements,
            checks_passed,
        });
    }
    Ok(VerificationReport {
        direction: "downgrade",
        library_version: lib_version,
        steps,
    })
}

fn run_setup<S: MetadataSource>(
    exec: &mut QueryExecutor<S>,
    setup: &[TemplateQuery],
) -> Result<usize> {
    for query in setup {
        exec.execute(query, &[])
            .with_context(|| format!("Setup query failed: {}", query.query()))?;
    }
    Ok(setup.len())
}

fn run_checks<S: MetadataSource>(
    exec: &mut QueryExecutor<S>,
    verification: &MigrationVerification,
) -> Result<usize> {
    for query in &verification.checks {
        let rs = exec
            .execute(query, &[])
            .with_context(|| format!("Verification query failed: {}", query.query()))?;
        let [record] = rs.records.as_slice() else {
            return Err(CatalogError::Internal(format!(
                "Verification failed on query: {} (expected one row, got {})",
                query.query(),
                rs.len()
            )));
        };
        let cell = record.first().and_then(Option::as_deref).unwrap_or_default();
        match parse_bool(cell) {
            Some(true) => {}
            Some(false) => {
                return Err(CatalogError::Internal(format!(
                    "Verification failed on query: {}",
                    query.query()
                )));
            }
            None => {
                return Err(CatalogError::Internal(format!(
                    "Value incorrect '{cell}' on query: {}",
                    query.query()
                )));
            }
        }
    }
    Ok(verification.checks.len())
}

fn expect_version<S: MetadataSource>(exec: &mut QueryExecutor<S>, expected: i64) -> Result<()> {
    let version = get_schema_version(exec)?;
    if version != expected {
        return Err(CatalogError::Internal(format!(
            "expected schema version {expected}, found {version}"
        )));
    }
    Ok(())
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => Some(true),
        "0" | "false" | "f" | "no" | "n" => Some(false),
        _ => None,
    }
}
