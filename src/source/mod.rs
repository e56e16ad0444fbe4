#![forbid(unsafe_code)]

//! Relational backend abstraction.
//!
//! A [`MetadataSource`] executes raw SQL text and returns string-typed rows. The catalog
//! core never talks to a database any other way, so a new backend only needs this trait.

mod sqlite;

use serde::Serialize;
use tracing::warn;

use crate::types::{CatalogError, Result};

pub use sqlite::{ConnectionMode, SqliteSource};

/// Tabular result of executing one query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecordSet {
    /// Column names in select order.
    pub column_names: Vec<String>,
    /// Rows of nullable text cells.
    pub records: Vec<Vec<Option<String>>>,
}

impl RecordSet {
    /// Builds a record set from column names and rows.
    pub fn new(column_names: Vec<String>, records: Vec<Vec<Option<String>>>) -> Self {
        Self {
            column_names,
            records,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Position of a named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|col| col == name)
    }

    /// Parses the first cell of every row as an id.
    pub fn ids(&self) -> Result<Vec<i64>> {
        self.records
            .iter()
            .map(|record| parse_cell(record.first().and_then(Option::as_deref), "id"))
            .collect()
    }
}

/// Parses a non-null integer cell; failures are internal errors.
pub(crate) fn parse_cell(cell: Option<&str>, what: &str) -> Result<i64> {
    let text = cell.ok_or_else(|| CatalogError::Internal(format!("{what} value is null")))?;
    text.trim()
        .parse::<i64>()
        .map_err(|_| CatalogError::Internal(format!("{what} value '{text}' is not an integer")))
}

/// Connection to a relational engine.
pub trait MetadataSource {
    /// Executes one statement and returns every row it produced.
    fn execute_query(&mut self, query: &str) -> Result<RecordSet>;

    /// Escapes a string so it can be placed between single quotes.
    fn escape_string(&self, value: &str) -> String;

    /// Opens a transaction. Fails with `FailedPrecondition` if one is already open.
    fn begin(&mut self) -> Result<()>;

    /// Commits the open transaction.
    fn commit(&mut self) -> Result<()>;

    /// Rolls back the open transaction.
    fn rollback(&mut self) -> Result<()>;
}

impl<S: MetadataSource + ?Sized> MetadataSource for Box<S> {
    fn execute_query(&mut self, query: &str) -> Result<RecordSet> {
        (**self).execute_query(query)
    }

    fn escape_string(&self, value: &str) -> String {
        (**self).escape_string(value)
    }

    fn begin(&mut self) -> Result<()> {
        (**self).begin()
    }

    fn commit(&mut self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<()> {
        (**self).rollback()
    }
}

/// Owner of a [`MetadataSource`] that transactions can be scoped over.
pub trait SourceHandle {
    /// Backend the transaction runs on.
    type Source: MetadataSource + ?Sized;

    /// Mutable access to the backend.
    fn source_mut(&mut self) -> &mut Self::Source;
}

impl SourceHandle for SqliteSource {
    type Source = SqliteSource;

    fn source_mut(&mut self) -> &mut SqliteSource {
        self
    }
}

impl<S: MetadataSource + ?Sized> SourceHandle for Box<S> {
    type Source = S;

    fn source_mut(&mut self) -> &mut S {
        self
    }
}

/// Runs `f` inside a transaction, committing on success.
///
/// A failure from `f` or from the commit itself rolls the transaction back, so the
/// backend is left at its state before `begin`.
pub fn run_in_transaction<H, T, F>(handle: &mut H, f: F) -> Result<T>
where
    H: SourceHandle + ?Sized,
    F: FnOnce(&mut H) -> Result<T>,
{
    handle.source_mut().begin()?;
    let outcome = f(&mut *handle).and_then(|value| handle.source_mut().commit().map(|()| value));
    if outcome.is_err() {
        if let Err(rollback_err) = handle.source_mut().rollback() {
            warn!(error = %rollback_err, "source.rollback.failed");
        }
    }
    outcome
}
