#![allow(missing_docs)]

use std::sync::Arc;

use metacat::migration::init_if_not_exists;
use metacat::query::{EventPathStep, ListOptions, QueryConfig, QueryExecutor, TemplateQuery};
use metacat::source::{RecordSet, SqliteSource};
use metacat::types::{
    decode_struct, ArtifactState, ErrorCode, EventType, ExecutionState, NodeKind, PropertyType,
    PropertyValue, TypeKind,
};
use serde_json::json;

fn executor() -> QueryExecutor<SqliteSource> {
    let mut exec = QueryExecutor::new(
        SqliteSource::in_memory().expect("in-memory sqlite"),
        Arc::new(QueryConfig::sqlite().expect("embedded catalog")),
    );
    init_if_not_exists(&mut exec, false).expect("initialize catalog");
    exec
}

fn cell<'a>(rs: &'a RecordSet, row: usize, column: &str) -> Option<&'a str> {
    let idx = rs.column_index(column).expect("column present");
    rs.records[row][idx].as_deref()
}

#[test]
fn types_are_found_by_name_and_version() {
    let mut exec = executor();
    let plain = exec.insert_artifact_type("Dataset", None, Some("raw data")).unwrap();
    let versioned = exec.insert_artifact_type("Dataset", Some("v2"), None).unwrap();
    assert!(versioned > plain);

    let rs = exec.select_type_by_name("Dataset", None, TypeKind::Artifact).unwrap();
    assert_eq!(rs.ids().unwrap(), vec![plain]);
    let rs = exec
        .select_type_by_name("Dataset", Some("v2"), TypeKind::Artifact)
        .unwrap();
    assert_eq!(rs.ids().unwrap(), vec![versioned]);
    assert!(exec
        .select_type_by_name("Dataset", None, TypeKind::Context)
        .unwrap()
        .is_empty());

    let by_id = exec.select_type_by_id(plain, TypeKind::Artifact).unwrap();
    assert_eq!(cell(&by_id, 0, "description"), Some("raw data"));
    assert_eq!(exec.select_all_types(TypeKind::Artifact).unwrap().len(), 2);
}

#[test]
fn execution_types_store_signatures_as_json() {
    let mut exec = executor();
    let input = json!({"any": {}});
    let id = exec
        .insert_execution_type("Trainer", None, None, Some(&input), None)
        .unwrap();
    let rs = exec.select_type_by_id(id, TypeKind::Execution).unwrap();
    assert_eq!(cell(&rs, 0, "input_type"), Some(r#"{"any":{}}"#));
    assert_eq!(cell(&rs, 0, "output_type"), None);
}

#[test]
fn type_properties_and_parents() {
    let mut exec = executor();
    let parent = exec.insert_context_type("Pipeline", None, None).unwrap();
    let child = exec.insert_context_type("Run", None, None).unwrap();
    exec.insert_type_property(child, "owner", PropertyType::String).unwrap();
    exec.insert_parent_type(child, parent).unwrap();

    let props = exec.select_properties_by_type_id(child).unwrap();
    assert_eq!(cell(&props, 0, "key"), Some("owner"));
    assert_eq!(cell(&props, 0, "value"), Some("3"));
    let parents = exec.select_parent_types(child).unwrap();
    assert_eq!(cell(&parents, 0, "parent_type_id"), Some(parent.to_string().as_str()));
}

#[test]
fn artifacts_round_trip_through_templates() {
    let mut exec = executor();
    let type_id = exec.insert_artifact_type("Model", None, None).unwrap();
    let id = exec
        .insert_artifact(type_id, Some("gs://it's/here"), Some(ArtifactState::Live), Some("m1"), 10, 10)
        .unwrap();

    let rs = exec.select_nodes_by_id(NodeKind::Artifact, &[id]).unwrap();
    assert_eq!(cell(&rs, 0, "uri"), Some("gs://it's/here"));
    assert_eq!(cell(&rs, 0, "state"), Some("2"));

    exec.update_artifact(id, type_id, None, Some(ArtifactState::Deleted), 20)
        .unwrap();
    let rs = exec.select_nodes_by_id(NodeKind::Artifact, &[id]).unwrap();
    assert_eq!(cell(&rs, 0, "uri"), None);
    assert_eq!(cell(&rs, 0, "last_update_time_since_epoch"), Some("20"));

    let found = exec
        .select_node_by_type_id_and_name(NodeKind::Artifact, type_id, "m1")
        .unwrap();
    assert_eq!(found.ids().unwrap(), vec![id]);
    assert_eq!(
        exec.select_nodes_by_type_id(NodeKind::Artifact, type_id)
            .unwrap()
            .ids()
            .unwrap(),
        vec![id]
    );
    assert!(exec.select_artifacts_by_uri("gs://it's/here").unwrap().is_empty());
}

#[test]
fn node_properties_use_their_value_column() {
    let mut exec = executor();
    let type_id = exec.insert_execution_type("Step", None, None, None, None).unwrap();
    let id = exec
        .insert_execution(type_id, Some(ExecutionState::Running), Some("s"), 1, 1)
        .unwrap();
    let structured = json!({"b": [1, 2], "a": "x"});
    exec.insert_property(NodeKind::Execution, id, "epochs", false, &PropertyValue::Int(3))
        .unwrap();
    exec.insert_property(NodeKind::Execution, id, "lr", false, &PropertyValue::Double(0.5))
        .unwrap();
    exec.insert_property(
        NodeKind::Execution,
        id,
        "note",
        true,
        &PropertyValue::String("o'k".into()),
    )
    .unwrap();
    exec.insert_property(
        NodeKind::Execution,
        id,
        "cfg",
        true,
        &PropertyValue::Struct(structured.clone()),
    )
    .unwrap();

    let rs = exec.select_properties(NodeKind::Execution, &[id]).unwrap();
    assert_eq!(rs.len(), 4);
    let row = |key: &str| {
        (0..rs.len())
            .find(|&r| cell(&rs, r, "key") == Some(key))
            .expect("property row")
    };
    assert_eq!(cell(&rs, row("epochs"), "int_value"), Some("3"));
    assert_eq!(cell(&rs, row("lr"), "double_value"), Some("0.5"));
    assert_eq!(cell(&rs, row("note"), "string_value"), Some("o'k"));
    assert_eq!(cell(&rs, row("note"), "is_custom_property"), Some("1"));
    let stored = cell(&rs, row("cfg"), "string_value").unwrap();
    assert_eq!(decode_struct(stored), Some(structured));

    exec.update_property(NodeKind::Execution, id, "epochs", &PropertyValue::Int(9))
        .unwrap();
    exec.delete_property(NodeKind::Execution, id, "lr").unwrap();
    let rs = exec.select_properties(NodeKind::Execution, &[id]).unwrap();
    assert_eq!(rs.len(), 3);
    let epochs = (0..rs.len())
        .find(|&r| cell(&rs, r, "key") == Some("epochs"))
        .unwrap();
    assert_eq!(cell(&rs, epochs, "int_value"), Some("9"));
}

#[test]
fn events_and_their_paths() {
    let mut exec = executor();
    let event = exec.insert_event(4, 7, EventType::Output, 1234).unwrap();
    exec.insert_event_path(event, &EventPathStep::Index(2)).unwrap();
    exec.insert_event_path(event, &EventPathStep::Key("best".into()))
        .unwrap();

    let by_artifact = exec.select_events_by_artifact_ids(&[4, 5]).unwrap();
    assert_eq!(by_artifact.ids().unwrap(), vec![event]);
    assert_eq!(cell(&by_artifact, 0, "type"), Some("4"));
    assert_eq!(exec.select_events_by_execution_ids(&[7]).unwrap().len(), 1);

    let paths = exec.select_event_paths(&[event]).unwrap();
    assert_eq!(paths.len(), 2);
    assert_eq!(cell(&paths, 0, "is_index_step"), Some("1"));
    assert_eq!(cell(&paths, 0, "step_index"), Some("2"));
    assert_eq!(cell(&paths, 1, "is_index_step"), Some("0"));
    assert_eq!(cell(&paths, 1, "step_key"), Some("best"));
}

#[test]
fn context_edges() {
    let mut exec = executor();
    let type_id = exec.insert_context_type("Exp", None, None).unwrap();
    let parent = exec.insert_context(type_id, "parent", 1, 1).unwrap();
    let child = exec.insert_context(type_id, "child", 2, 2).unwrap();
    exec.update_context(child, type_id, "child-renamed", 3).unwrap();
    exec.insert_parent_context(child, parent).unwrap();
    let association = exec.insert_association(child, 11).unwrap();
    let attribution = exec.insert_attribution(child, 12).unwrap();

    assert_eq!(
        exec.select_associations_by_context_id(child).unwrap().ids().unwrap(),
        vec![association]
    );
    assert_eq!(
        exec.select_associations_by_execution_id(11).unwrap().ids().unwrap(),
        vec![association]
    );
    assert_eq!(
        exec.select_attributions_by_context_id(child).unwrap().ids().unwrap(),
        vec![attribution]
    );
    assert_eq!(
        exec.select_attributions_by_artifact_id(12).unwrap().ids().unwrap(),
        vec![attribution]
    );
    assert_eq!(
        exec.select_parent_contexts_by_context_id(child).unwrap().ids().unwrap(),
        vec![child]
    );
    assert_eq!(
        exec.select_parent_contexts_by_parent_context_id(parent)
            .unwrap()
            .ids()
            .unwrap(),
        vec![child]
    );
    let found = exec
        .select_node_by_type_id_and_name(NodeKind::Context, type_id, "child-renamed")
        .unwrap();
    assert_eq!(found.ids().unwrap(), vec![child]);
}

#[test]
fn more_than_ten_arguments_is_invalid() {
    let mut exec = executor();
    let template = TemplateQuery::new("SELECT 1", 11);
    let args: Vec<i64> = (0..11).collect();
    let bound: Vec<&dyn metacat::query::Bind> =
        args.iter().map(|v| v as &dyn metacat::query::Bind).collect();
    let err = exec.execute(&template, &bound).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

#[test]
#[should_panic(expected = "template declares 2 parameters but 1 were bound")]
fn argument_count_mismatch_panics() {
    let mut exec = executor();
    let template = TemplateQuery::new("SELECT $0, $1", 2);
    let _ = exec.execute(&template, &[&1i64]);
}

#[test]
fn inserts_return_backend_assigned_ids() {
    let mut exec = executor();
    exec.execute_raw("CREATE TABLE `Scratch` (`v` TEXT)").unwrap();
    let insert = TemplateQuery::new("INSERT INTO `Scratch` VALUES ($0)", 1);
    let first = exec.insert_and_return_id(&insert, &[&"a"]).unwrap();
    let second = exec.insert_and_return_id(&insert, &[&"b"]).unwrap();
    assert_eq!(second, first + 1);
}

#[test]
fn empty_candidate_set_skips_the_backend() {
    let mut exec = executor();
    let ids = exec
        .list_node_ids(NodeKind::Artifact, &ListOptions::default(), Some(&[][..]))
        .unwrap();
    assert!(ids.is_empty());
}

#[test]
fn transactions_roll_back_on_error() {
    let mut exec = executor();
    let err = exec
        .in_transaction(|exec| {
            exec.insert_artifact_type("Doomed", None, None)?;
            exec.execute_raw("SELECT * FROM `Missing`")
        })
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Internal);
    assert!(exec
        .select_type_by_name("Doomed", None, TypeKind::Artifact)
        .unwrap()
        .is_empty());
}

#[test]
fn failed_commit_rolls_back_and_frees_the_connection() {
    let mut exec = executor();
    for sql in [
        "PRAGMA foreign_keys = ON",
        "CREATE TABLE `Owner` (`id` INTEGER PRIMARY KEY)",
        "CREATE TABLE `Owned` (`owner_id` INTEGER REFERENCES `Owner`(`id`) DEFERRABLE INITIALLY DEFERRED)",
    ] {
        exec.execute_raw(sql).unwrap();
    }
    let err = exec
        .in_transaction(|exec| {
            exec.insert_artifact_type("Orphaned", None, None)?;
            exec.execute_raw("INSERT INTO `Owned` VALUES (42)")
        })
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Internal);
    assert!(!exec.source().in_transaction());
    assert!(exec
        .select_type_by_name("Orphaned", None, TypeKind::Artifact)
        .unwrap()
        .is_empty());

    let id = exec
        .in_transaction(|exec| exec.insert_artifact_type("Kept", None, None))
        .unwrap();
    let rs = exec.select_type_by_name("Kept", None, TypeKind::Artifact).unwrap();
    assert_eq!(rs.ids().unwrap(), vec![id]);
}
