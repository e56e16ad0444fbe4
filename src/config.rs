#![forbid(unsafe_code)]

//! Store configuration loaded from TOML.
//!
//! ```toml
//! [connection]
//! filename_uri = "/var/lib/metacat/catalog.db"
//! connection_mode = "readwrite_opencreate"
//!
//! [migration]
//! enable_upgrade_migration = true
//! # downgrade_to_schema_version = 4
//! # query_config = "custom-sqlite.toml"
//! ```
//!
//! A missing file yields the defaults: an in-memory database with migration disabled.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::query::{QueryConfig, QueryConfigError};
use crate::source::ConnectionMode;
use crate::types::CatalogError;

/// How to reach the database.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Database path or `file:` URI; empty means a private in-memory database.
    pub filename_uri: String,
    pub connection_mode: ConnectionMode,
}

/// What to do about schema version skew when connecting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationOptions {
    pub enable_upgrade_migration: bool,
    /// When set, connecting downgrades to this version and then refuses the connection.
    pub downgrade_to_schema_version: Option<i64>,
    /// Template catalog to use instead of the embedded one.
    pub query_config: Option<PathBuf>,
}

/// Connection and migration settings for [`store::connect`](crate::store::connect).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreConfig {
    pub connection: ConnectionOptions,
    pub migration: MigrationOptions,
}

impl StoreConfig {
    /// Loads `explicit`, or the default path when none is given. Missing files yield defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        match path {
            Some(config_path) if config_path.exists() => read_file(&config_path),
            _ => Ok(Self::default()),
        }
    }

    /// Parses config text. Relative `query_config` paths resolve against `base_dir`.
    pub fn from_toml_str(
        text: &str,
        origin: &Path,
        base_dir: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        convert(raw, base_dir)
    }

    /// Defaults pointed at the database `filename_uri`.
    pub fn for_database(filename_uri: impl Into<String>) -> Self {
        Self {
            connection: ConnectionOptions {
                filename_uri: filename_uri.into(),
                connection_mode: ConnectionMode::default(),
            },
            migration: MigrationOptions::default(),
        }
    }

    /// The template catalog this store uses.
    pub fn query_config(&self) -> Result<QueryConfig, ConfigError> {
        let config = match &self.migration.query_config {
            Some(path) => QueryConfig::from_path(path)?,
            None => QueryConfig::sqlite()?,
        };
        Ok(config)
    }
}

fn read_file(path: &Path) -> Result<StoreConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    StoreConfig::from_toml_str(&contents, path, path.parent())
}

fn convert(raw: RawConfig, base_dir: Option<&Path>) -> Result<StoreConfig, ConfigError> {
    let connection_mode = match raw.connection.connection_mode.as_deref() {
        Some(value) => ConnectionMode::parse(value).ok_or_else(|| ConfigError::InvalidMode {
            value: value.to_string(),
        })?,
        None => ConnectionMode::default(),
    };
    let query_config = raw.migration.query_config.map(|path| match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path,
    });
    Ok(StoreConfig {
        connection: ConnectionOptions {
            filename_uri: raw.connection.filename_uri.unwrap_or_default(),
            connection_mode,
        },
        migration: MigrationOptions {
            enable_upgrade_migration: raw.migration.enable_upgrade_migration.unwrap_or(false),
            downgrade_to_schema_version: raw.migration.downgrade_to_schema_version,
            query_config,
        },
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    connection: RawConnection,
    #[serde(default)]
    migration: RawMigration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConnection {
    filename_uri: Option<String>,
    connection_mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMigration {
    enable_upgrade_migration: Option<bool>,
    downgrade_to_schema_version: Option<i64>,
    query_config: Option<PathBuf>,
}

/// Errors raised while loading a store config.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error("failed to read store config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse store config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("connection_mode '{value}' is invalid; expected readonly, readwrite or readwrite_opencreate")]
    InvalidMode { value: String },
    #[error(transparent)]
    Query(#[from] QueryConfigError),
}

impl From<ConfigError> for CatalogError {
    fn from(err: ConfigError) -> Self {
        CatalogError::InvalidArgument(err.to_string())
    }
}

/// `<config_dir>/metacat/store.toml`, when the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("metacat").join("store.toml"))
}
