#![allow(missing_docs)]

use std::sync::Arc;

use metacat::migration::init_if_not_exists;
use metacat::query::{ListOptions, OrderBy, OrderByField, QueryConfig, QueryExecutor};
use metacat::source::SqliteSource;
use metacat::types::{ErrorCode, NodeKind};
use proptest::prelude::*;

#[derive(Clone, Copy, Debug)]
struct Seed {
    create: i64,
    update: i64,
}

fn seeded(kind: NodeKind, seeds: &[Seed]) -> (QueryExecutor<SqliteSource>, Vec<(i64, Seed)>) {
    let mut exec = QueryExecutor::new(
        SqliteSource::in_memory().expect("in-memory sqlite"),
        Arc::new(QueryConfig::sqlite().expect("embedded catalog")),
    );
    init_if_not_exists(&mut exec, false).expect("initialize catalog");
    let mut rows = Vec::with_capacity(seeds.len());
    for (idx, seed) in seeds.iter().enumerate() {
        let name = format!("node-{idx}");
        let id = match kind {
            NodeKind::Artifact => {
                exec.insert_artifact(1, None, None, Some(name.as_str()), seed.create, seed.update)
            }
            NodeKind::Execution => exec.insert_execution(1, None, Some(name.as_str()), seed.create, seed.update),
            NodeKind::Context => exec.insert_context(1, &name, seed.create, seed.update),
        }
        .expect("insert node");
        rows.push((id, *seed));
    }
    (exec, rows)
}

fn expected_order(rows: &[(i64, Seed)], order_by: OrderBy) -> Vec<i64> {
    let key = |(id, seed): &(i64, Seed)| match order_by.field {
        OrderByField::CreateTime => (seed.create, *id),
        OrderByField::LastUpdateTime => (seed.update, *id),
        OrderByField::Id => (*id, *id),
    };
    let mut sorted = rows.to_vec();
    sorted.sort_by_key(key);
    if !order_by.is_asc {
        sorted.reverse();
    }
    sorted.into_iter().map(|(id, _)| id).collect()
}

fn page_through(
    exec: &mut QueryExecutor<SqliteSource>,
    kind: NodeKind,
    order_by: OrderBy,
    page_sizes: &[i64],
) -> Vec<i64> {
    let mut collected = Vec::new();
    let mut token = None;
    for round in 0.. {
        let options = ListOptions {
            max_result_size: page_sizes[round % page_sizes.len()],
            order_by,
            next_page_token: token.take(),
        };
        let page = exec.list_page(kind, &options, None).expect("list page");
        assert!((page.ids.len() as i64) <= options.max_result_size);
        collected.extend(page.ids);
        match page.next_page_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    collected
}

fn arb_order_by() -> impl Strategy<Value = OrderBy> {
    (
        prop_oneof![
            Just(OrderByField::CreateTime),
            Just(OrderByField::LastUpdateTime),
            Just(OrderByField::Id),
        ],
        any::<bool>(),
    )
        .prop_map(|(field, is_asc)| OrderBy { field, is_asc })
}

fn arb_kind() -> impl Strategy<Value = NodeKind> {
    prop_oneof![
        Just(NodeKind::Artifact),
        Just(NodeKind::Execution),
        Just(NodeKind::Context),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn paging_reproduces_the_full_ordering(
        seeds in prop::collection::vec((0i64..4, 0i64..4).prop_map(|(create, update)| Seed { create, update }), 0..40),
        order_by in arb_order_by(),
        kind in arb_kind(),
        page_sizes in prop::collection::vec(1i64..7, 1..4),
    ) {
        let (mut exec, rows) = seeded(kind, &seeds);
        let paged = page_through(&mut exec, kind, order_by, &page_sizes);
        prop_assert_eq!(paged, expected_order(&rows, order_by));
    }
}

#[test]
fn ties_on_the_boundary_are_neither_skipped_nor_repeated() {
    let seeds = vec![Seed { create: 56894, update: 0 }; 7];
    let (mut exec, rows) = seeded(NodeKind::Artifact, &seeds);
    let order_by = OrderBy {
        field: OrderByField::CreateTime,
        is_asc: false,
    };
    let paged = page_through(&mut exec, NodeKind::Artifact, order_by, &[3]);
    assert_eq!(paged, expected_order(&rows, order_by));
}

#[test]
fn page_size_is_capped_at_one_hundred() {
    let seeds = vec![Seed { create: 1, update: 1 }; 130];
    let (mut exec, _) = seeded(NodeKind::Context, &seeds);
    let options = ListOptions {
        max_result_size: 200,
        ..ListOptions::default()
    };
    let page = exec.list_page(NodeKind::Context, &options, None).unwrap();
    assert_eq!(page.ids.len(), 100);
    assert!(page.next_page_token.is_some());

    let ids = exec.list_node_ids(NodeKind::Context, &options, None).unwrap();
    assert_eq!(ids.len(), 101);
}

#[test]
fn last_page_has_no_token() {
    let seeds = vec![Seed { create: 1, update: 1 }; 4];
    let (mut exec, rows) = seeded(NodeKind::Execution, &seeds);
    let options = ListOptions {
        max_result_size: 4,
        ..ListOptions::default()
    };
    let page = exec.list_page(NodeKind::Execution, &options, None).unwrap();
    assert_eq!(page.ids, rows.iter().map(|(id, _)| *id).collect::<Vec<_>>());
    assert_eq!(page.next_page_token, None);
}

#[test]
fn non_positive_page_size_is_invalid() {
    let (mut exec, _) = seeded(NodeKind::Artifact, &[]);
    let options = ListOptions {
        max_result_size: 0,
        ..ListOptions::default()
    };
    let err = exec.list_page(NodeKind::Artifact, &options, None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

#[test]
fn token_is_bound_to_its_ordering() {
    let seeds = vec![Seed { create: 5, update: 5 }; 5];
    let (mut exec, _) = seeded(NodeKind::Artifact, &seeds);
    let first = ListOptions {
        max_result_size: 2,
        order_by: OrderBy {
            field: OrderByField::LastUpdateTime,
            is_asc: true,
        },
        next_page_token: None,
    };
    let page = exec.list_page(NodeKind::Artifact, &first, None).unwrap();
    let token = page.next_page_token.expect("more pages");

    let other_field = ListOptions {
        order_by: OrderBy {
            field: OrderByField::CreateTime,
            is_asc: true,
        },
        next_page_token: Some(token.clone()),
        ..first.clone()
    };
    let err = exec.list_page(NodeKind::Artifact, &other_field, None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    let bigger_page = ListOptions {
        max_result_size: 10,
        next_page_token: Some(token),
        ..first
    };
    let rest = exec.list_page(NodeKind::Artifact, &bigger_page, None).unwrap();
    assert_eq!(rest.ids.len(), 3);
}

#[test]
fn candidates_restrict_the_listing() {
    let seeds = vec![Seed { create: 1, update: 1 }; 6];
    let (mut exec, rows) = seeded(NodeKind::Artifact, &seeds);
    let candidates: Vec<i64> = rows.iter().map(|(id, _)| *id).filter(|id| id % 2 == 0).collect();
    let options = ListOptions {
        order_by: OrderBy {
            field: OrderByField::Id,
            is_asc: false,
        },
        ..ListOptions::default()
    };
    let page = exec
        .list_page(NodeKind::Artifact, &options, Some(candidates.as_slice()))
        .unwrap();
    let mut expected = candidates.clone();
    expected.reverse();
    assert_eq!(page.ids, expected);
}
