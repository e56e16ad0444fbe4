#![forbid(unsafe_code)]

//! Opening a catalog store from a [`StoreConfig`].

use std::sync::Arc;

use tracing::info;

use crate::config::StoreConfig;
use crate::migration::{downgrade, get_schema_version, init_if_not_exists};
use crate::query::QueryExecutor;
use crate::source::SqliteSource;
use crate::types::{CatalogError, Result};

/// Opens the configured database and brings it to the library's schema version.
///
/// When `downgrade_to_schema_version` is set the database is downgraded instead and the
/// connection is refused with `Cancelled`, since this library cannot use the result.
pub fn connect(config: &StoreConfig) -> Result<QueryExecutor<SqliteSource>> {
    let query_config = Arc::new(config.query_config()?);
    let uri = config.connection.filename_uri.as_str();
    let source = if uri.is_empty() {
        SqliteSource::in_memory()?
    } else {
        SqliteSource::open(uri, config.connection.connection_mode)?
    };
    let mut exec = QueryExecutor::new(source, query_config);

    if let Some(target) = config.migration.downgrade_to_schema_version {
        exec.in_transaction(|exec| downgrade(exec, target))?;
        let version = get_schema_version(&mut exec)?;
        info!(schema_version = version, "store.downgraded");
        return Err(CatalogError::Cancelled(format!(
            "downgrade migration was performed and the connection is closed; the database is \
             now at schema version {version}. Connect with a library at that version, or clear \
             downgrade_to_schema_version to upgrade it again"
        )));
    }

    let enable = config.migration.enable_upgrade_migration;
    exec.in_transaction(|exec| init_if_not_exists(exec, enable))?;
    Ok(exec)
}
