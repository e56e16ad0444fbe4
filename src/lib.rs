//! Metacat: the relational core of a metadata catalog.
//!
//! Artifacts, executions and contexts, their types and properties, and the events and
//! edges between them live in ordinary tables. This crate owns the statements against
//! those tables: a catalog of SQL templates with a typed value binder
//! ([`query`]), cursor pagination over node listings ([`query::list`]), and the schema
//! version migration engine ([`migration`]).
//!
//! ```no_run
//! use metacat::config::StoreConfig;
//! use metacat::query::ListOptions;
//! use metacat::types::NodeKind;
//!
//! # fn main() -> metacat::types::Result<()> {
//! let mut exec = metacat::store::connect(&StoreConfig::for_database("catalog.db"))?;
//! let page = exec.list_page(NodeKind::Artifact, &ListOptions::default(), None)?;
//! println!("{:?}", page.ids);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod migration;
pub mod query;
pub mod source;
pub mod store;
pub mod types;
