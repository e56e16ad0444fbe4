use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use tracing::debug;

use super::{MetadataSource, RecordSet};
use crate::types::{CatalogError, Result};

/// How a SQLite database file is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Existing file, no writes.
    ReadOnly,
    /// Existing file, writable.
    ReadWrite,
    /// Writable, created when missing.
    #[default]
    ReadWriteOpenCreate,
}

impl ConnectionMode {
    /// Parses the snake_case name used in configuration files.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "readonly" | "read_only" => Some(ConnectionMode::ReadOnly),
            "readwrite" | "read_write" => Some(ConnectionMode::ReadWrite),
            "readwrite_opencreate" | "read_write_open_create" => {
                Some(ConnectionMode::ReadWriteOpenCreate)
            }
            _ => None,
        }
    }

    fn flags(self) -> OpenFlags {
        let base = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        match self {
            ConnectionMode::ReadOnly => base | OpenFlags::SQLITE_OPEN_READ_ONLY,
            ConnectionMode::ReadWrite => base | OpenFlags::SQLITE_OPEN_READ_WRITE,
            ConnectionMode::ReadWriteOpenCreate => {
                base | OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
        }
    }
}

/// [`MetadataSource`] backed by a single SQLite connection.
pub struct SqliteSource {
    conn: Connection,
}

impl SqliteSource {
    /// Opens a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    /// Opens a database file (or `file:` URI) with the given mode.
    pub fn open(path: impl AsRef<Path>, mode: ConnectionMode) -> Result<Self> {
        let conn = Connection::open_with_flags(path.as_ref(), mode.flags())?;
        Ok(Self::from_connection(conn))
    }

    /// True while the connection holds an open transaction.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }
}

fn cell_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(v) => Some(v.to_string()),
        ValueRef::Real(v) => Some(v.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl MetadataSource for SqliteSource {
    fn execute_query(&mut self, query: &str) -> Result<RecordSet> {
        let sql = query.trim().trim_end_matches(';').trim_end();
        if sql.is_empty() {
            return Ok(RecordSet::default());
        }
        let mut stmt = self.conn.prepare(sql).map_err(|err| {
            debug!(error = %err, query = sql, "sqlite.prepare.failed");
            CatalogError::from(err)
        })?;
        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let width = column_names.len();
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(width);
            for idx in 0..width {
                record.push(cell_text(row.get_ref(idx)?));
            }
            records.push(record);
        }
        Ok(RecordSet::new(column_names, records))
    }

    fn escape_string(&self, value: &str) -> String {
        value.replace('\'', "''")
    }

    fn begin(&mut self) -> Result<()> {
        if self.in_transaction() {
            return Err(CatalogError::FailedPrecondition(
                "a transaction is already open".into(),
            ));
        }
        self.conn.execute("BEGIN TRANSACTION", [])?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if !self.in_transaction() {
            return Err(CatalogError::FailedPrecondition(
                "commit called without an open transaction".into(),
            ));
        }
        // a failed COMMIT (deferred constraints, busy) leaves the transaction open
        self.conn.execute("COMMIT", [])?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction() {
            return Err(CatalogError::FailedPrecondition(
                "rollback called without an open transaction".into(),
            ));
        }
        self.conn.execute("ROLLBACK", [])?;
        Ok(())
    }
}
