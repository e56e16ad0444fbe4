#![forbid(unsafe_code)]

//! Template querying.
//!
//! Every statement the catalog issues is a named template from a [`QueryConfig`]. Values
//! are rendered to literals by [`Bind`], substituted into the template, and executed by a
//! [`QueryExecutor`].

/// Value to SQL literal conversion.
pub mod bind;

/// Loading and validation of the template catalog.
pub mod config;

/// Typed entry points over the template catalog.
pub mod executor;

/// Ordering, boundary predicates and page tokens.
pub mod list;

/// Placeholder templates and substitution.
pub mod template;

pub use bind::{Bind, Ident};
pub use config::{MigrationScheme, MigrationVerification, QueryConfig, QueryConfigError, Templates};
pub use executor::{EventPathStep, Page, QueryExecutor};
pub use list::{ListOptions, OrderBy, OrderByField, PageToken};
pub use template::{TemplateQuery, MAX_PARAMETERS};
