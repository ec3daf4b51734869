//! End-to-end fill tests against the in-memory catalog.
//!
//! These run the whole `Filler` flow (validation, planning, generation,
//! batching, draining) with `RecordingLoader` standing in for the store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tablefill_core::fill::{FillOptions, Filler, UnsupportedPolicy};
use tablefill_core::generate::value::Value;
use tablefill_core::resolve::resolve_dependencies;
use tablefill_core::sample::collect_samples;
use tablefill_core::schema::inspect::SchemaInspector;
use tablefill_core::schema::types::TableRef;
use tablefill_core::FillError;
use tablefill_testutil::*;
use tokio_util::sync::CancellationToken;

fn options(batch_size: usize) -> FillOptions {
    FillOptions {
        batch_size,
        seed: Some(42),
        ..Default::default()
    }
}

fn filler(
    catalog: InMemoryCatalog,
    options: FillOptions,
) -> (Filler<InMemoryCatalog, RecordingLoader>, Arc<RecordingLoader>) {
    let loader = Arc::new(RecordingLoader::new());
    (Filler::new(catalog, Arc::clone(&loader), options), loader)
}

// ---------------------------------------------------------------------------
// Row counts and batching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_table_without_foreign_keys_gets_exact_count() {
    let (filler, loader) = filler(shop_catalog(), options(100));

    let report = filler.fill_table(&users(), 1_000).await.unwrap();

    assert_eq!(report.rows_generated, 1_000);
    assert_eq!(report.rows_loaded, 1_000);
    assert_eq!(report.batches, 10);
    assert_eq!(loader.rows_received(), 1_000);
    assert!(report.is_success());
}

#[tokio::test]
async fn test_250_rows_in_batches_of_100() {
    let (filler, loader) = filler(shop_catalog(), options(100));

    filler.fill_table(&users(), 250).await.unwrap();

    let batches = loader.batches_for(&users());
    let sizes: Vec<usize> = batches.iter().map(|b| b.rows.len()).collect();
    let indices: Vec<usize> = batches.iter().map(|b| b.index).collect();
    let first_rows: Vec<usize> = batches.iter().map(|b| b.first_row).collect();
    assert_eq!(sizes, [100, 100, 50]);
    assert_eq!(indices, [0, 1, 2]);
    assert_eq!(first_rows, [0, 100, 200]);
}

#[tokio::test]
async fn test_exact_multiple_has_no_empty_tail() {
    let (filler, loader) = filler(shop_catalog(), options(100));

    let report = filler.fill_table(&users(), 200).await.unwrap();

    assert_eq!(report.batches, 2);
    assert!(loader.batches().iter().all(|b| b.rows.len() == 100));
}

#[tokio::test]
async fn test_zero_rows_dispatches_nothing() {
    let (filler, loader) = filler(shop_catalog(), options(100));

    let report = filler.fill_table(&users(), 0).await.unwrap();

    assert_eq!(report.rows_generated, 0);
    assert_eq!(report.batches, 0);
    assert!(loader.batches().is_empty());
}

#[tokio::test]
async fn test_rows_carry_every_column_in_order() {
    let (filler, loader) = filler(shop_catalog(), options(10));

    filler.fill_table(&users(), 5).await.unwrap();

    let batch = &loader.batches_for(&users())[0];
    assert_eq!(batch.columns, ["id", "email", "created_at", "active"]);
    for row in &batch.rows {
        let names: Vec<&str> = row.keys().map(String::as_str).collect();
        assert_eq!(names, ["id", "email", "created_at", "active"]);
        assert!(matches!(row["active"], Value::Bool(_)));
        assert!(matches!(row["created_at"], Value::TimestampTz(_)));
    }
}

// ---------------------------------------------------------------------------
// Foreign keys and sampling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_foreign_key_values_come_from_referenced_column() {
    let (filler, loader) = filler(shop_catalog(), options(50));

    filler.fill_table(&orders(), 200).await.unwrap();

    let existing = ["1", "2", "3"];
    for batch in loader.batches_for(&orders()) {
        for row in &batch.rows {
            let user_id = row["user_id"].to_string();
            assert!(
                existing.contains(&user_id.as_str()),
                "user_id {} is not an existing users.id",
                user_id
            );
        }
    }
}

#[tokio::test]
async fn test_requested_sample_column_reuses_existing_values() {
    let mut opts = options(100);
    opts.samples = vec!["status".to_string()];
    let (filler, loader) = filler(shop_catalog(), opts);

    filler.fill_table(&orders(), 100).await.unwrap();

    for row in &loader.batches_for(&orders())[0].rows {
        let status = row["status"].as_text().unwrap();
        assert!(status == "paid" || status == "open", "unexpected status {}", status);
    }
}

#[tokio::test]
async fn test_empty_sample_falls_back_to_generation() {
    // `details` has no stored values in the fixture.
    let mut opts = options(100);
    opts.samples = vec!["details".to_string(), "no_such_column".to_string()];
    let (filler, loader) = filler(shop_catalog(), opts);

    let report = filler.fill_table(&orders(), 20).await.unwrap();

    assert_eq!(report.rows_generated, 20);
    for row in &loader.batches_for(&orders())[0].rows {
        assert_eq!(row["details"], Value::Json(serde_json::json!({"foo": "bar"})));
    }
}

#[tokio::test]
async fn test_empty_referenced_table_fails_before_generation() {
    let (filler, loader) = filler(shop_catalog(), options(100));

    let err = filler.fill_table(&shipments(), 100).await.unwrap_err();

    match err {
        FillError::UnsatisfiedDependency { table, empty_tables } => {
            assert_eq!(table, "public.shipments");
            assert_eq!(empty_tables, ["public.warehouses"]);
        }
        other => panic!("expected UnsatisfiedDependency, got {:?}", other),
    }
    assert!(loader.batches().is_empty());
}

#[tokio::test]
async fn test_every_empty_referenced_table_is_listed() {
    let parts = TableRef::new("public", "parts");
    let catalog = shop_catalog()
        .with_table(&parts, &[("id", "integer")])
        .with_table(
            &TableRef::new("public", "stock"),
            &[
                ("warehouse_id", "integer"),
                ("part_id", "integer"),
                ("other_warehouse_id", "integer"),
                ("user_id", "integer"),
            ],
        )
        .with_foreign_key(
            &TableRef::new("public", "stock"),
            "warehouse_id",
            &warehouses(),
            "id",
        )
        .with_foreign_key(&TableRef::new("public", "stock"), "part_id", &parts, "id")
        .with_foreign_key(
            &TableRef::new("public", "stock"),
            "other_warehouse_id",
            &warehouses(),
            "id",
        )
        .with_foreign_key(&TableRef::new("public", "stock"), "user_id", &users(), "id");

    let edges = catalog
        .get_foreign_keys(&TableRef::new("public", "stock"))
        .await
        .unwrap();
    let err = resolve_dependencies(&catalog, &TableRef::new("public", "stock"), &edges)
        .await
        .unwrap_err();

    match err {
        FillError::UnsatisfiedDependency { empty_tables, .. } => {
            assert_eq!(empty_tables, ["public.warehouses", "public.parts"]);
        }
        other => panic!("expected UnsatisfiedDependency, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resolution_maps_columns_to_referenced_columns() {
    let catalog = shop_catalog();
    let edges = catalog.get_foreign_keys(&orders()).await.unwrap();

    let deps = resolve_dependencies(&catalog, &orders(), &edges)
        .await
        .unwrap();

    assert_eq!(deps.len(), 1);
    assert_eq!(deps["user_id"].referenced_table, users());
    assert_eq!(deps["user_id"].referenced_column, "id");
}

#[tokio::test]
async fn test_samples_collected_for_foreign_keys_and_requests_only() {
    let catalog = shop_catalog();
    let edges = catalog.get_foreign_keys(&orders()).await.unwrap();
    let deps = resolve_dependencies(&catalog, &orders(), &edges)
        .await
        .unwrap();
    let columns = catalog.get_columns(&orders()).await.unwrap();

    let samples = collect_samples(&catalog, &orders(), &columns, &deps, &[])
        .await
        .unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples["user_id"].values(), ["1", "2", "3"]);

    let requested = vec!["status".to_string()];
    let samples = collect_samples(&catalog, &orders(), &columns, &deps, &requested)
        .await
        .unwrap();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples["status"].values(), ["paid", "open"]);
}

#[tokio::test]
async fn test_missing_table_is_not_found() {
    let (filler, loader) = filler(shop_catalog(), options(100));

    let err = filler
        .fill_table(&TableRef::new("public", "ghosts"), 10)
        .await
        .unwrap_err();

    assert!(matches!(err, FillError::NotFound { .. }));
    assert!(loader.batches().is_empty());
}

#[tokio::test]
async fn test_introspection_failure_fails_the_table() {
    let catalog = shop_catalog();
    catalog.fail_queries(true);
    let (filler, loader) = filler(catalog, options(100));

    let err = filler.fill_table(&users(), 10).await.unwrap_err();

    assert!(matches!(err, FillError::Introspection { .. }));
    assert!(loader.batches().is_empty());
}

fn parent() -> TableRef {
    TableRef::new("pc", "parent")
}

fn child() -> TableRef {
    TableRef::new("pc", "child")
}

/// `child(a, b)` references `parent(a, b)` through one two-column key.
/// The parent tuples are chosen so that mixing `a` from one row with `b`
/// from another gives a pair that does not exist.
fn composite_catalog() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with_table(&parent(), &[("a", "integer"), ("b", "integer")])
        .with_rows(
            &parent(),
            &[
                &[("a", "1"), ("b", "10")],
                &[("a", "2"), ("b", "20")],
                &[("a", "3"), ("b", "30")],
                &[("a", "1"), ("b", "20")],
            ],
        )
        .with_table(
            &child(),
            &[("id", "integer"), ("a", "integer"), ("b", "integer")],
        )
        .with_composite_foreign_key(
            &child(),
            "child_a_b_fkey",
            &[("a", "a"), ("b", "b")],
            &parent(),
        )
}

const PARENT_TUPLES: [(&str, &str); 4] = [("1", "10"), ("2", "20"), ("3", "30"), ("1", "20")];

#[tokio::test]
async fn test_composite_key_sampled_as_linked_tuples() {
    let catalog = composite_catalog();
    let edges = catalog.get_foreign_keys(&child()).await.unwrap();
    assert!(edges.iter().all(|e| e.constraint == "child_a_b_fkey"));
    let deps = resolve_dependencies(&catalog, &child(), &edges)
        .await
        .unwrap();
    let columns = catalog.get_columns(&child()).await.unwrap();

    let samples = collect_samples(&catalog, &child(), &columns, &deps, &[])
        .await
        .unwrap();

    assert_eq!(samples["a"].values(), ["1", "2", "3", "1"]);
    assert_eq!(samples["b"].values(), ["10", "20", "30", "20"]);
    assert_eq!(samples["a"].link(), Some("child_a_b_fkey"));
    assert_eq!(samples["b"].link(), samples["a"].link());
}

#[tokio::test]
async fn test_composite_key_rows_reference_existing_tuples() {
    let (filler, loader) = filler(composite_catalog(), options(50));

    let report = filler.fill_table(&child(), 200).await.unwrap();

    assert_eq!(report.rows_loaded, 200);
    for batch in loader.batches_for(&child()) {
        for row in &batch.rows {
            let pair = (row["a"].to_csv_string(), row["b"].to_csv_string());
            assert!(
                PARENT_TUPLES
                    .iter()
                    .any(|(a, b)| pair.0 == *a && pair.1 == *b),
                "{:?} has no parent row",
                pair
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Unsupported types
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unsupported_type_fails_by_default() {
    let (filler, loader) = filler(shop_catalog(), options(100));

    let err = filler.fill_table(&events(), 10).await.unwrap_err();

    match err {
        FillError::UnsupportedType {
            column,
            declared_type,
            ..
        } => {
            assert_eq!(column, "span");
            assert_eq!(declared_type, "interval");
        }
        other => panic!("expected UnsupportedType, got {:?}", other),
    }
    assert!(loader.batches().is_empty());
}

#[tokio::test]
async fn test_skip_policy_leaves_column_out_of_load() {
    let mut opts = options(100);
    opts.unsupported = UnsupportedPolicy::Skip;
    let (filler, loader) = filler(shop_catalog(), opts);

    let report = filler.fill_table(&events(), 10).await.unwrap();

    assert_eq!(report.skipped_columns, ["span"]);
    let batch = &loader.batches_for(&events())[0];
    assert_eq!(batch.columns, ["id", "label"]);
    assert!(matches!(batch.rows[0]["id"], Value::Uuid(_)));
}

// ---------------------------------------------------------------------------
// Load failures, concurrency and draining
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_failed_batch_does_not_stop_siblings() {
    let loader = Arc::new(RecordingLoader::new().failing_on(&[1]));
    let filler = Filler::new(shop_catalog(), Arc::clone(&loader), options(100));

    let report = filler.fill_table(&users(), 300).await.unwrap();

    assert_eq!(report.batches, 3);
    assert_eq!(report.rows_loaded, 200);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.table, "public.users");
    assert_eq!(failure.batch_index, 1);
    assert_eq!(failure.first_row, 100);
    assert_eq!(failure.row_count, 100);
    assert!(!report.is_success());
    assert_eq!(loader.completed(), 3);
}

#[tokio::test]
async fn test_fill_returns_only_after_every_load_completes() {
    let loader = Arc::new(RecordingLoader::new().with_delay(Duration::from_millis(20)));
    let filler = Filler::new(shop_catalog(), Arc::clone(&loader), options(10));

    let report = filler.fill_table(&users(), 95).await.unwrap();

    assert_eq!(report.batches, 10);
    assert_eq!(loader.completed(), 10);
    assert_eq!(report.rows_loaded, 95);
}

#[tokio::test]
async fn test_in_flight_loads_are_bounded() {
    let loader = Arc::new(RecordingLoader::new().with_delay(Duration::from_millis(10)));
    let mut opts = options(10);
    opts.max_in_flight = 2;
    let filler = Filler::new(shop_catalog(), Arc::clone(&loader), opts);

    filler.fill_table(&users(), 200).await.unwrap();

    assert!(loader.peak_concurrency() <= 2);
    assert_eq!(loader.completed(), 20);
}

#[tokio::test]
async fn test_cancellation_stops_generation_and_drains() {
    let token = CancellationToken::new();
    let loader = Arc::new(RecordingLoader::new());
    let progress_token = token.clone();
    let filler = Filler::new(shop_catalog(), Arc::clone(&loader), options(100))
        .with_cancellation(token)
        .with_progress(Arc::new(move |_table: &TableRef, generated: usize, _count: usize| {
            if generated >= 300 {
                progress_token.cancel();
            }
        }));

    let err = filler.fill_table(&users(), 10_000).await.unwrap_err();

    match err {
        FillError::Cancelled { rows_generated, .. } => assert_eq!(rows_generated, 300),
        other => panic!("expected Cancelled, got {:?}", other),
    }
    // The three sealed batches finished; nothing past the cancel point loaded.
    assert_eq!(loader.completed(), 3);
    assert_eq!(loader.rows_received(), 300);
}

#[tokio::test]
async fn test_progress_reports_every_hundred_rows_and_at_the_end() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let loader = Arc::new(RecordingLoader::new());
    let filler = Filler::new(shop_catalog(), loader, options(100)).with_progress(Arc::new(
        move |_table: &TableRef, _generated: usize, count: usize| {
            assert_eq!(count, 250);
            seen.fetch_add(1, Ordering::SeqCst);
        },
    ));

    filler.fill_table(&users(), 250).await.unwrap();

    // 100, 200 and the final 250.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_plan_is_identical_across_runs() {
    let (filler, _) = filler(shop_catalog(), options(100));

    let first = filler.plan_table(&orders()).await.unwrap();
    let second = filler.plan_table(&orders()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.column_count(), 5);
    assert!(first.columns[1].is_foreign_key());
}

#[tokio::test]
async fn test_same_seed_same_integers() {
    let (a, loader_a) = filler(shop_catalog(), options(100));
    let (b, loader_b) = filler(shop_catalog(), options(100));

    a.fill_table(&users(), 50).await.unwrap();
    b.fill_table(&users(), 50).await.unwrap();

    let ids = |loader: &RecordingLoader| -> Vec<Option<i64>> {
        loader.batches()[0]
            .rows
            .iter()
            .map(|r| r["id"].as_int())
            .collect()
    };
    assert_eq!(ids(&loader_a), ids(&loader_b));
}

// ---------------------------------------------------------------------------
// All-tables mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_all_tables_stops_at_first_failure() {
    let (filler, loader) = filler(shop_catalog(), options(100));

    let report = filler.fill_schema("public", 10).await.unwrap();

    // Catalog order: events, orders, shipments, users, warehouses.
    assert!(report.reports.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, events());
    assert_eq!(report.skipped.len(), 4);
    assert!(loader.batches().is_empty());
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_all_tables_keep_going_fills_the_rest() {
    let mut opts = options(100);
    opts.keep_going = true;
    let (filler, loader) = filler(shop_catalog(), opts);

    let report = filler.fill_schema("public", 10).await.unwrap();

    let filled: Vec<TableRef> = report.reports.iter().map(|r| r.table.clone()).collect();
    assert_eq!(filled, [orders(), users(), warehouses()]);
    let failed: Vec<TableRef> = report.failed.iter().map(|(t, _)| t.clone()).collect();
    assert_eq!(failed, [events(), shipments()]);
    assert!(report.skipped.is_empty());
    assert_eq!(report.rows_generated(), 30);
    assert_eq!(loader.tables_loaded(), [orders(), users(), warehouses()]);
}

#[tokio::test]
async fn test_per_table_counts_override_default() {
    let mut opts = options(100);
    opts.keep_going = true;
    opts.per_table.insert(
        "users".to_string(),
        tablefill_core::fill::TableOptions {
            count: Some(3),
            samples: vec![],
        },
    );
    let (filler, _) = filler(shop_catalog(), opts);

    let report = filler.fill_schema("public", 10).await.unwrap();

    let users_report = report
        .reports
        .iter()
        .find(|r| r.table == users())
        .unwrap();
    assert_eq!(users_report.rows_generated, 3);
}

#[tokio::test]
async fn test_dependency_order_fills_parents_first() {
    // Catalog order lists both children before their empty parent.
    let authors = TableRef::new("library", "z_authors");
    let books = TableRef::new("library", "m_books");
    let reviews = TableRef::new("library", "a_reviews");
    let catalog = InMemoryCatalog::new()
        .with_table(&authors, &[("id", "integer"), ("name", "text")])
        .with_table(&books, &[("id", "integer"), ("author_id", "integer")])
        .with_foreign_key(&books, "author_id", &authors, "id")
        .with_table(&reviews, &[("book_id", "integer"), ("body", "text")])
        .with_foreign_key(&reviews, "book_id", &books, "id");

    let loader = Arc::new(RecordingLoader::new().writing_to(catalog.clone()));
    let mut opts = options(100);
    opts.order_by_dependencies = true;
    let filler = Filler::new(catalog.clone(), Arc::clone(&loader), opts);

    let report = filler.fill_schema("library", 5).await.unwrap();

    assert!(report.is_success(), "failed: {:?}", report.failed);
    assert_eq!(loader.tables_loaded(), [authors.clone(), books.clone(), reviews.clone()]);
    assert_eq!(catalog.row_count(&reviews), 5);

    let author_ids: Vec<String> = loader.batches_for(&authors)[0]
        .rows
        .iter()
        .map(|r| r["id"].to_string())
        .collect();
    for row in &loader.batches_for(&books)[0].rows {
        assert!(author_ids.contains(&row["author_id"].to_string()));
    }
}

#[tokio::test]
async fn test_catalog_order_fails_on_unfilled_parent() {
    let parent = TableRef::new("library", "z_authors");
    let child = TableRef::new("library", "m_books");
    let catalog = InMemoryCatalog::new()
        .with_table(&parent, &[("id", "integer")])
        .with_table(&child, &[("author_id", "integer")])
        .with_foreign_key(&child, "author_id", &parent, "id");

    let loader = Arc::new(RecordingLoader::new().writing_to(catalog.clone()));
    let filler = Filler::new(catalog, loader, options(100));

    let report = filler.fill_schema("library", 5).await.unwrap();

    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        report.failed[0].1,
        FillError::UnsatisfiedDependency { .. }
    ));
    assert_eq!(report.skipped, [parent]);
}

#[tokio::test]
async fn test_dependency_cycle_keeps_catalog_order() {
    let a = TableRef::new("loop", "a");
    let b = TableRef::new("loop", "b");
    let catalog = InMemoryCatalog::new()
        .with_table(&a, &[("b_id", "integer")])
        .with_table(&b, &[("a_id", "integer")])
        .with_foreign_key(&a, "b_id", &b, "a_id")
        .with_foreign_key(&b, "a_id", &a, "b_id")
        .with_rows(&a, &[&[("b_id", "1")]])
        .with_rows(&b, &[&[("a_id", "1")]]);

    let mut opts = options(100);
    opts.order_by_dependencies = true;
    let (filler, loader) = filler(catalog, opts);

    let report = filler.fill_schema("loop", 2).await.unwrap();

    assert!(report.is_success());
    assert_eq!(loader.tables_loaded(), [a, b]);
}
