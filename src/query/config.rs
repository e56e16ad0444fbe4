#![forbid(unsafe_code)]

//! Template catalog for one backend dialect.
//!
//! The catalog is plain TOML: a `schema_version`, one `[templates.<name>]` table per
//! template, the secondary index statements, and one `[migration_schemes.<v>]` table per
//! schema version. Everything is checked when the catalog is loaded so that a defect in
//! the data surfaces at startup rather than halfway through a migration.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use super::template::{TemplateQuery, MAX_PARAMETERS};
use crate::types::CatalogError;

const SQLITE_CATALOG: &str = include_str!("../../config/sqlite.toml");

macro_rules! templates {
    ($($name:ident),* $(,)?) => {
        /// Every named template the executor and migration engine issue.
        #[derive(Clone, Debug, Deserialize)]
        #[serde(deny_unknown_fields)]
        #[allow(missing_docs)]
        pub struct Templates {
            $(pub $name: TemplateQuery,)*
        }

        impl Templates {
            /// Iterates `(name, template)` pairs in declaration order.
            pub fn iter(&self) -> impl Iterator<Item = (&'static str, &TemplateQuery)> + '_ {
                [$((stringify!($name), &self.$name)),*].into_iter()
            }
        }
    };
}

templates!(
    create_type_table,
    check_type_table,
    insert_artifact_type,
    insert_execution_type,
    insert_context_type,
    select_type_by_id,
    select_type_by_name,
    select_type_by_name_and_version,
    select_all_types,
    create_parent_type_table,
    check_parent_type_table,
    insert_parent_type,
    select_parent_type_by_type_id,
    create_type_property_table,
    check_type_property_table,
    insert_type_property,
    select_property_by_type_id,
    select_last_insert_id,
    create_artifact_table,
    check_artifact_table,
    insert_artifact,
    select_artifact_by_id,
    select_artifact_by_type_id_and_name,
    select_artifacts_by_type_id,
    select_artifacts_by_uri,
    update_artifact,
    create_artifact_property_table,
    check_artifact_property_table,
    insert_artifact_property,
    select_artifact_property_by_artifact_id,
    update_artifact_property,
    delete_artifact_property,
    create_execution_table,
    check_execution_table,
    insert_execution,
    select_execution_by_id,
    select_execution_by_type_id_and_name,
    select_executions_by_type_id,
    update_execution,
    create_execution_property_table,
    check_execution_property_table,
    insert_execution_property,
    select_execution_property_by_execution_id,
    update_execution_property,
    delete_execution_property,
    create_context_table,
    check_context_table,
    insert_context,
    select_context_by_id,
    select_contexts_by_type_id,
    select_context_by_type_id_and_name,
    update_context,
    create_context_property_table,
    check_context_property_table,
    insert_context_property,
    select_context_property_by_context_id,
    update_context_property,
    delete_context_property,
    create_parent_context_table,
    check_parent_context_table,
    insert_parent_context,
    select_parent_context_by_context_id,
    select_parent_context_by_parent_context_id,
    create_event_table,
    check_event_table,
    insert_event,
    select_event_by_artifact_ids,
    select_event_by_execution_ids,
    create_event_path_table,
    check_event_path_table,
    insert_event_path,
    select_event_path_by_event_ids,
    create_association_table,
    check_association_table,
    insert_association,
    select_association_by_context_id,
    select_association_by_execution_id,
    create_attribution_table,
    check_attribution_table,
    insert_attribution,
    select_attribution_by_context_id,
    select_attribution_by_artifact_id,
    create_mlmd_env_table,
    check_mlmd_env_table,
    insert_schema_version,
    update_schema_version,
    check_legacy_tables,
);

/// Statements that recreate the previous version's state, and boolean checks run after a
/// migration step.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationVerification {
    /// Statements run before migrating.
    #[serde(default)]
    pub setup: Vec<TemplateQuery>,
    /// Queries that must each return one row holding boolean true.
    #[serde(default)]
    pub checks: Vec<TemplateQuery>,
}

/// Both directions of the step between version `v - 1` and `v`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationScheme {
    /// Applied in order to move from `v - 1` to `v`.
    #[serde(default)]
    pub upgrade: Vec<TemplateQuery>,
    /// Applied in order to move from `v` to `v - 1`.
    #[serde(default)]
    pub downgrade: Vec<TemplateQuery>,
    #[serde(default)]
    pub upgrade_verification: Option<MigrationVerification>,
    #[serde(default)]
    pub downgrade_verification: Option<MigrationVerification>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawQueryConfig {
    schema_version: i64,
    templates: Templates,
    #[serde(default)]
    indices: RawIndices,
    #[serde(default)]
    migration_schemes: BTreeMap<String, MigrationScheme>,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawIndices {
    #[serde(default)]
    secondary: Vec<TemplateQuery>,
}

/// Errors raised while loading or validating a template catalog.
#[derive(Debug, Error)]
pub enum QueryConfigError {
    #[error("failed to read query config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse query config {origin}: {source}")]
    Parse {
        origin: String,
        source: toml::de::Error,
    },
    #[error("schema_version must be at least 1 (got {0})")]
    InvalidSchemaVersion(i64),
    #[error("template '{name}' declares {count} parameters; at most {MAX_PARAMETERS} are supported")]
    TooManyParameters { name: String, count: usize },
    #[error("template '{name}' declares {declared} parameters but {detail}")]
    PlaceholderMismatch {
        name: String,
        declared: usize,
        detail: String,
    },
    #[error("migration scheme key '{key}' is not an integer")]
    InvalidSchemeKey { key: String },
    #[error("migration scheme for version {version} is missing")]
    MissingScheme { version: i64 },
    #[error("migration scheme {version} is outside 1..={schema_version}")]
    UnexpectedScheme { version: i64, schema_version: i64 },
}

impl From<QueryConfigError> for CatalogError {
    fn from(err: QueryConfigError) -> Self {
        CatalogError::InvalidArgument(err.to_string())
    }
}

/// A validated template catalog.
#[derive(Clone, Debug)]
pub struct QueryConfig {
    /// Schema version this catalog, and thus the library, targets.
    pub schema_version: i64,
    /// Named templates.
    pub templates: Templates,
    /// Secondary index statements run after table creation.
    pub secondary_indices: Vec<TemplateQuery>,
    migration_schemes: BTreeMap<i64, MigrationScheme>,
}

impl QueryConfig {
    /// The catalog shipped for SQLite.
    pub fn sqlite() -> Result<Self, QueryConfigError> {
        Self::from_toml_str(SQLITE_CATALOG, "embedded sqlite catalog")
    }

    /// Loads a catalog override from disk.
    pub fn from_path(path: &Path) -> Result<Self, QueryConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| QueryConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents, &path.display().to_string())
    }

    /// Parses and validates catalog text; `origin` names the source in errors.
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, QueryConfigError> {
        let raw: RawQueryConfig = toml::from_str(text).map_err(|source| QueryConfigError::Parse {
            origin: origin.to_string(),
            source,
        })?;
        if raw.schema_version < 1 {
            return Err(QueryConfigError::InvalidSchemaVersion(raw.schema_version));
        }
        for (name, template) in raw.templates.iter() {
            check_template(name, template)?;
        }
        for (idx, template) in raw.indices.secondary.iter().enumerate() {
            check_template(&format!("indices.secondary[{idx}]"), template)?;
        }
        let migration_schemes = validate_schemes(raw.schema_version, raw.migration_schemes)?;
        Ok(Self {
            schema_version: raw.schema_version,
            templates: raw.templates,
            secondary_indices: raw.indices.secondary,
            migration_schemes,
        })
    }

    /// Scheme for the step `version - 1 <-> version`.
    pub fn migration_scheme(&self, version: i64) -> Option<&MigrationScheme> {
        self.migration_schemes.get(&version)
    }

    /// All schemes in ascending version order.
    pub fn migration_schemes(&self) -> impl Iterator<Item = (i64, &MigrationScheme)> + '_ {
        self.migration_schemes.iter().map(|(v, s)| (*v, s))
    }
}

fn check_template(name: &str, template: &TemplateQuery) -> Result<(), QueryConfigError> {
    let declared = template.parameter_num();
    if declared > MAX_PARAMETERS {
        return Err(QueryConfigError::TooManyParameters {
            name: name.to_string(),
            count: declared,
        });
    }
    let used = template.placeholders();
    if let Some(extra) = used.iter().find(|idx| **idx >= declared) {
        return Err(QueryConfigError::PlaceholderMismatch {
            name: name.to_string(),
            declared,
            detail: format!("uses ${extra}"),
        });
    }
    if let Some(unused) = (0..declared).find(|idx| !used.contains(idx)) {
        return Err(QueryConfigError::PlaceholderMismatch {
            name: name.to_string(),
            declared,
            detail: format!("never uses ${unused}"),
        });
    }
    Ok(())
}

fn validate_schemes(
    schema_version: i64,
    raw: BTreeMap<String, MigrationScheme>,
) -> Result<BTreeMap<i64, MigrationScheme>, QueryConfigError> {
    let mut schemes = BTreeMap::new();
    for (key, scheme) in raw {
        let version: i64 = key
            .trim()
            .parse()
            .map_err(|_| QueryConfigError::InvalidSchemeKey { key: key.clone() })?;
        if version < 1 || version > schema_version {
            return Err(QueryConfigError::UnexpectedScheme {
                version,
                schema_version,
            });
        }
        let statements = scheme
            .upgrade
            .iter()
            .chain(&scheme.downgrade)
            .chain(scheme.upgrade_verification.iter().flat_map(|v| v.setup.iter().chain(&v.checks)))
            .chain(
                scheme
                    .downgrade_verification
                    .iter()
                    .flat_map(|v| v.setup.iter().chain(&v.checks)),
            );
        for statement in statements {
            check_template(&format!("migration_schemes.{version}"), statement)?;
        }
        schemes.insert(version, scheme);
    }
    if let Some(version) = (1..=schema_version).find(|v| !schemes.contains_key(v)) {
        return Err(QueryConfigError::MissingScheme { version });
    }
    Ok(schemes)
}
