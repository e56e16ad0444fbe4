#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Template executor.
//!
//! [`QueryExecutor`] owns a [`MetadataSource`] and a shared [`QueryConfig`]. Every typed
//! entry point binds its arguments into one named template and runs it; there is no other
//! path to the backend apart from [`QueryExecutor::execute_raw`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::bind::{Bind, Ident};
use super::config::{QueryConfig, Templates};
use super::list::{self, ListOptions, PageRow};
use super::template::TemplateQuery;
use crate::source::{parse_cell, run_in_transaction, MetadataSource, RecordSet, SourceHandle};
use crate::types::{
    ArtifactState, CatalogError, EventType, ExecutionState, NodeKind, PropertyType,
    PropertyValue, Result, TypeKind,
};

type Pick = fn(&Templates) -> &TemplateQuery;

/// One step of an event path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventPathStep {
    /// Position inside a list.
    Index(i64),
    /// Key inside a map.
    Key(String),
}

/// One page of node ids and the token for the page after it.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct Page {
    pub ids: Vec<i64>,
    pub next_page_token: Option<String>,
}

/// Executes catalog templates against a metadata source.
pub struct QueryExecutor<S> {
    source: S,
    config: Arc<QueryConfig>,
}

impl<S: MetadataSource> SourceHandle for QueryExecutor<S> {
    type Source = S;

    fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: MetadataSource> QueryExecutor<S> {
    /// Wraps `source`, issuing templates from `config`.
    pub fn new(source: S, config: Arc<QueryConfig>) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Shared handle to the catalog, for building sibling executors.
    pub fn config_handle(&self) -> Arc<QueryConfig> {
        Arc::clone(&self.config)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Runs SQL text as is.
    pub fn execute_raw(&mut self, sql: &str) -> Result<RecordSet> {
        self.source.execute_query(sql).inspect_err(|err| {
            debug!(error = %err, query = sql, "executor.query.failed");
        })
    }

    /// Binds `args` and runs `template`.
    ///
    /// # Panics
    ///
    /// When the number of arguments differs from the template's declared count.
    pub fn execute(&mut self, template: &TemplateQuery, args: &[&dyn Bind]) -> Result<RecordSet> {
        let source: &dyn MetadataSource = &self.source;
        let literals: Vec<String> = args.iter().map(|arg| arg.bind(source)).collect();
        let sql = template.render(&literals)?;
        self.execute_raw(&sql)
    }

    fn run(&mut self, pick: Pick, args: &[&dyn Bind]) -> Result<RecordSet> {
        let config = Arc::clone(&self.config);
        self.execute(pick(&config.templates), args)
    }

    fn run_unit(&mut self, pick: Pick, args: &[&dyn Bind]) -> Result<()> {
        self.run(pick, args).map(drop)
    }

    /// Runs an insert template and returns the id the backend assigned.
    pub fn insert_and_return_id(
        &mut self,
        template: &TemplateQuery,
        args: &[&dyn Bind],
    ) -> Result<i64> {
        self.execute(template, args)?;
        self.select_last_insert_id()
    }

    fn insert(&mut self, pick: Pick, args: &[&dyn Bind]) -> Result<i64> {
        let config = Arc::clone(&self.config);
        self.insert_and_return_id(pick(&config.templates), args)
    }

    /// Id of the most recent insert on this connection.
    pub fn select_last_insert_id(&mut self) -> Result<i64> {
        let rs = self.run(|t| &t.select_last_insert_id, &[])?;
        let record = rs
            .records
            .first()
            .ok_or_else(|| CatalogError::Internal("last insert id query returned no rows".into()))?;
        parse_cell(record.first().and_then(Option::as_deref), "last insert id")
    }

    /// Runs `f` inside a transaction on the source, rolling back if `f` or the commit fails.
    pub fn in_transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        run_in_transaction(self, f)
    }

    // Types

    pub fn insert_artifact_type(
        &mut self,
        name: &str,
        version: Option<&str>,
        description: Option<&str>,
    ) -> Result<i64> {
        self.insert(|t| &t.insert_artifact_type, &[&name, &version, &description])
    }

    pub fn insert_execution_type(
        &mut self,
        name: &str,
        version: Option<&str>,
        description: Option<&str>,
        input_type: Option<&serde_json::Value>,
        output_type: Option<&serde_json::Value>,
    ) -> Result<i64> {
        self.insert(
            |t| &t.insert_execution_type,
            &[&name, &version, &description, &input_type, &output_type],
        )
    }

    pub fn insert_context_type(
        &mut self,
        name: &str,
        version: Option<&str>,
        description: Option<&str>,
    ) -> Result<i64> {
        self.insert(|t| &t.insert_context_type, &[&name, &version, &description])
    }

    pub fn select_type_by_id(&mut self, id: i64, kind: TypeKind) -> Result<RecordSet> {
        self.run(|t| &t.select_type_by_id, &[&id, &kind])
    }

    /// Looks a type up by name; a missing version matches only unversioned types.
    pub fn select_type_by_name(
        &mut self,
        name: &str,
        version: Option<&str>,
        kind: TypeKind,
    ) -> Result<RecordSet> {
        match version {
            Some(version) => self.run(
                |t| &t.select_type_by_name_and_version,
                &[&name, &version, &kind],
            ),
            None => self.run(|t| &t.select_type_by_name, &[&name, &kind]),
        }
    }

    pub fn select_all_types(&mut self, kind: TypeKind) -> Result<RecordSet> {
        self.run(|t| &t.select_all_types, &[&kind])
    }

    pub fn insert_type_property(
        &mut self,
        type_id: i64,
        name: &str,
        data_type: PropertyType,
    ) -> Result<()> {
        self.run_unit(|t| &t.insert_type_property, &[&type_id, &name, &data_type])
    }

    /// Rows of `key` (property name) and `value` (property type ordinal).
    pub fn select_properties_by_type_id(&mut self, type_id: i64) -> Result<RecordSet> {
        self.run(|t| &t.select_property_by_type_id, &[&type_id])
    }

    pub fn insert_parent_type(&mut self, type_id: i64, parent_type_id: i64) -> Result<()> {
        self.run_unit(|t| &t.insert_parent_type, &[&type_id, &parent_type_id])
    }

    pub fn select_parent_types(&mut self, type_id: i64) -> Result<RecordSet> {
        self.run(|t| &t.select_parent_type_by_type_id, &[&type_id])
    }

    // Nodes

    pub fn insert_artifact(
        &mut self,
        type_id: i64,
        uri: Option<&str>,
        state: Option<ArtifactState>,
        name: Option<&str>,
        create_time_since_epoch: i64,
        last_update_time_since_epoch: i64,
    ) -> Result<i64> {
        self.insert(
            |t| &t.insert_artifact,
            &[
                &type_id,
                &uri,
                &state,
                &name,
                &create_time_since_epoch,
                &last_update_time_since_epoch,
            ],
        )
    }

    pub fn insert_execution(
        &mut self,
        type_id: i64,
        last_known_state: Option<ExecutionState>,
        name: Option<&str>,
        create_time_since_epoch: i64,
        last_update_time_since_epoch: i64,
    ) -> Result<i64> {
        self.insert(
            |t| &t.insert_execution,
            &[
                &type_id,
                &last_known_state,
                &name,
                &create_time_since_epoch,
                &last_update_time_since_epoch,
            ],
        )
    }

    pub fn insert_context(
        &mut self,
        type_id: i64,
        name: &str,
        create_time_since_epoch: i64,
        last_update_time_since_epoch: i64,
    ) -> Result<i64> {
        self.insert(
            |t| &t.insert_context,
            &[
                &type_id,
                &name,
                &create_time_since_epoch,
                &last_update_time_since_epoch,
            ],
        )
    }

    pub fn update_artifact(
        &mut self,
        id: i64,
        type_id: i64,
        uri: Option<&str>,
        state: Option<ArtifactState>,
        last_update_time_since_epoch: i64,
    ) -> Result<()> {
        self.run_unit(
            |t| &t.update_artifact,
            &[&id, &type_id, &uri, &state, &last_update_time_since_epoch],
        )
    }

    pub fn update_execution(
        &mut self,
        id: i64,
        type_id: i64,
        last_known_state: Option<ExecutionState>,
        last_update_time_since_epoch: i64,
    ) -> Result<()> {
        self.run_unit(
            |t| &t.update_execution,
            &[&id, &type_id, &last_known_state, &last_update_time_since_epoch],
        )
    }

    pub fn update_context(
        &mut self,
        id: i64,
        type_id: i64,
        name: &str,
        last_update_time_since_epoch: i64,
    ) -> Result<()> {
        self.run_unit(
            |t| &t.update_context,
            &[&id, &type_id, &name, &last_update_time_since_epoch],
        )
    }

    /// Full rows for the given node ids.
    pub fn select_nodes_by_id(&mut self, kind: NodeKind, ids: &[i64]) -> Result<RecordSet> {
        let pick: Pick = match kind {
            NodeKind::Artifact => |t| &t.select_artifact_by_id,
            NodeKind::Execution => |t| &t.select_execution_by_id,
            NodeKind::Context => |t| &t.select_context_by_id,
        };
        self.run(pick, &[&ids])
    }

    pub fn select_nodes_by_type_id(&mut self, kind: NodeKind, type_id: i64) -> Result<RecordSet> {
        let pick: Pick = match kind {
            NodeKind::Artifact => |t| &t.select_artifacts_by_type_id,
            NodeKind::Execution => |t| &t.select_executions_by_type_id,
            NodeKind::Context => |t| &t.select_contexts_by_type_id,
        };
        self.run(pick, &[&type_id])
    }

    pub fn select_node_by_type_id_and_name(
        &mut self,
        kind: NodeKind,
        type_id: i64,
        name: &str,
    ) -> Result<RecordSet> {
        let pick: Pick = match kind {
            NodeKind::Artifact => |t| &t.select_artifact_by_type_id_and_name,
            NodeKind::Execution => |t| &t.select_execution_by_type_id_and_name,
            NodeKind::Context => |t| &t.select_context_by_type_id_and_name,
        };
        self.run(pick, &[&type_id, &name])
    }

    pub fn select_artifacts_by_uri(&mut self, uri: &str) -> Result<RecordSet> {
        self.run(|t| &t.select_artifacts_by_uri, &[&uri])
    }

    // Node properties

    pub fn insert_property(
        &mut self,
        kind: NodeKind,
        node_id: i64,
        name: &str,
        is_custom_property: bool,
        value: &PropertyValue,
    ) -> Result<()> {
        let pick: Pick = match kind {
            NodeKind::Artifact => |t| &t.insert_artifact_property,
            NodeKind::Execution => |t| &t.insert_execution_property,
            NodeKind::Context => |t| &t.insert_context_property,
        };
        let column = value.column();
        self.run_unit(pick, &[&column, &node_id, &name, &is_custom_property, value])
    }

    /// Property rows (`id`, `key`, `is_custom_property`, value columns) of the given nodes.
    pub fn select_properties(&mut self, kind: NodeKind, node_ids: &[i64]) -> Result<RecordSet> {
        let pick: Pick = match kind {
            NodeKind::Artifact => |t| &t.select_artifact_property_by_artifact_id,
            NodeKind::Execution => |t| &t.select_execution_property_by_execution_id,
            NodeKind::Context => |t| &t.select_context_property_by_context_id,
        };
        self.run(pick, &[&node_ids])
    }

    pub fn update_property(
        &mut self,
        kind: NodeKind,
        node_id: i64,
        name: &str,
        value: &PropertyValue,
    ) -> Result<()> {
        let pick: Pick = match kind {
            NodeKind::Artifact => |t| &t.update_artifact_property,
            NodeKind::Execution => |t| &t.update_execution_property,
            NodeKind::Context => |t| &t.update_context_property,
        };
        let column = value.column();
        self.run_unit(pick, &[&column, value, &node_id, &name])
    }

    pub fn delete_property(&mut self, kind: NodeKind, node_id: i64, name: &str) -> Result<()> {
        let pick: Pick = match kind {
            NodeKind::Artifact => |t| &t.delete_artifact_property,
            NodeKind::Execution => |t| &t.delete_execution_property,
            NodeKind::Context => |t| &t.delete_context_property,
        };
        self.run_unit(pick, &[&node_id, &name])
    }

    // Events

    pub fn insert_event(
        &mut self,
        artifact_id: i64,
        execution_id: i64,
        event_type: EventType,
        milliseconds_since_epoch: i64,
    ) -> Result<i64> {
        self.insert(
            |t| &t.insert_event,
            &[
                &artifact_id,
                &execution_id,
                &event_type,
                &milliseconds_since_epoch,
            ],
        )
    }

    pub fn select_events_by_artifact_ids(&mut self, artifact_ids: &[i64]) -> Result<RecordSet> {
        self.run(|t| &t.select_event_by_artifact_ids, &[&artifact_ids])
    }

    pub fn select_events_by_execution_ids(&mut self, execution_ids: &[i64]) -> Result<RecordSet> {
        self.run(|t| &t.select_event_by_execution_ids, &[&execution_ids])
    }

    pub fn insert_event_path(&mut self, event_id: i64, step: &EventPathStep) -> Result<()> {
        match step {
            EventPathStep::Index(index) => self.run_unit(
                |t| &t.insert_event_path,
                &[&event_id, &Ident("step_index"), &true, index],
            ),
            EventPathStep::Key(key) => self.run_unit(
                |t| &t.insert_event_path,
                &[&event_id, &Ident("step_key"), &false, key],
            ),
        }
    }

    pub fn select_event_paths(&mut self, event_ids: &[i64]) -> Result<RecordSet> {
        self.run(|t| &t.select_event_path_by_event_ids, &[&event_ids])
    }

    // Associations, attributions and parent contexts

    pub fn insert_association(&mut self, context_id: i64, execution_id: i64) -> Result<i64> {
        self.insert(|t| &t.insert_association, &[&context_id, &execution_id])
    }

    pub fn select_associations_by_context_id(&mut self, context_id: i64) -> Result<RecordSet> {
        self.run(|t| &t.select_association_by_context_id, &[&context_id])
    }

    pub fn select_associations_by_execution_id(
        &mut self,
        execution_id: i64,
    ) -> Result<RecordSet> {
        self.run(|t| &t.select_association_by_execution_id, &[&execution_id])
    }

    pub fn insert_attribution(&mut self, context_id: i64, artifact_id: i64) -> Result<i64> {
        self.insert(|t| &t.insert_attribution, &[&context_id, &artifact_id])
    }

    pub fn select_attributions_by_context_id(&mut self, context_id: i64) -> Result<RecordSet> {
        self.run(|t| &t.select_attribution_by_context_id, &[&context_id])
    }

    pub fn select_attributions_by_artifact_id(&mut self, artifact_id: i64) -> Result<RecordSet> {
        self.run(|t| &t.select_attribution_by_artifact_id, &[&artifact_id])
    }

    pub fn insert_parent_context(&mut self, context_id: i64, parent_context_id: i64) -> Result<()> {
        self.run_unit(|t| &t.insert_parent_context, &[&context_id, &parent_context_id])
    }

    pub fn select_parent_contexts_by_context_id(&mut self, context_id: i64) -> Result<RecordSet> {
        self.run(|t| &t.select_parent_context_by_context_id, &[&context_id])
    }

    pub fn select_parent_contexts_by_parent_context_id(
        &mut self,
        parent_context_id: i64,
    ) -> Result<RecordSet> {
        self.run(
            |t| &t.select_parent_context_by_parent_context_id,
            &[&parent_context_id],
        )
    }

    // Version marker

    pub fn insert_schema_version(&mut self, version: i64) -> Result<()> {
        self.run_unit(|t| &t.insert_schema_version, &[&version])
    }

    pub fn update_schema_version(&mut self, version: i64) -> Result<()> {
        self.run_unit(|t| &t.update_schema_version, &[&version])
    }

    // Listing

    /// Ids of `kind` nodes in `options` order, including one look-ahead row past the page.
    ///
    /// With `candidate_ids`, only those nodes are considered; an empty candidate set
    /// returns nothing without touching the backend.
    pub fn list_node_ids(
        &mut self,
        kind: NodeKind,
        options: &ListOptions,
        candidate_ids: Option<&[i64]>,
    ) -> Result<Vec<i64>> {
        let (clauses, _) = list::list_clauses(options)?;
        self.list_with_clauses(kind, &clauses, candidate_ids)
    }

    fn list_with_clauses(
        &mut self,
        kind: NodeKind,
        clauses: &str,
        candidate_ids: Option<&[i64]>,
    ) -> Result<Vec<i64>> {
        let mut sql = format!("SELECT `id` FROM `{}` WHERE", kind.table_name());
        if let Some(ids) = candidate_ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let source: &dyn MetadataSource = &self.source;
            sql.push_str(&format!(" `id` IN ({}) AND ", ids.bind(source)));
        }
        sql.push_str(clauses);
        self.execute_raw(&sql)?.ids()
    }

    /// One page of `kind` node ids plus the token for the next page, if there is one.
    pub fn list_page(
        &mut self,
        kind: NodeKind,
        options: &ListOptions,
        candidate_ids: Option<&[i64]>,
    ) -> Result<Page> {
        let (clauses, previous) = list::list_clauses(options)?;
        let page_size = list::page_size(options.max_result_size)? as usize;
        let mut ids = self.list_with_clauses(kind, &clauses, candidate_ids)?;
        if ids.len() <= page_size {
            return Ok(Page {
                ids,
                next_page_token: None,
            });
        }
        ids.truncate(page_size);
        let rows = self.page_rows(kind, &ids)?;
        let next_page_token = list::next_page_token(options, previous.as_ref(), &rows)?;
        Ok(Page {
            ids,
            next_page_token,
        })
    }

    fn page_rows(&mut self, kind: NodeKind, ids: &[i64]) -> Result<Vec<PageRow>> {
        let rs = self.select_nodes_by_id(kind, ids)?;
        let column = |name: &str| {
            rs.column_index(name)
                .ok_or_else(|| CatalogError::Internal(format!("node rows lack column {name}")))
        };
        let (id_col, create_col, update_col) = (
            column("id")?,
            column("create_time_since_epoch")?,
            column("last_update_time_since_epoch")?,
        );
        let mut by_id = HashMap::with_capacity(rs.len());
        for record in &rs.records {
            let cell = |idx: usize| record.get(idx).and_then(Option::as_deref);
            let row = PageRow {
                id: parse_cell(cell(id_col), "id")?,
                create_time_since_epoch: parse_cell(cell(create_col), "create_time_since_epoch")?,
                last_update_time_since_epoch: parse_cell(
                    cell(update_col),
                    "last_update_time_since_epoch",
                )?,
            };
            by_id.insert(row.id, row);
        }
        ids.iter()
            .map(|id| {
                by_id
                    .get(id)
                    .copied()
                    .ok_or_else(|| CatalogError::Aborted(format!("node {id} vanished while listing")))
            })
            .collect()
    }
}
