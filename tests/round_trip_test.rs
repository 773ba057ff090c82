//! End-to-end export and import against the in-memory backend

mod common;

use common::*;
use tabport::core::codec::Format;
use tabport::core::export::ExportTableState;
use tabport::core::import::{ImportMode, ImportState};
use tabport::core::manifest::ArtifactStore;
use tabport::domain::{ErrorClass, TableFilter, Value};
use tempfile::TempDir;
use test_case::test_case;

#[test_case(Format::Csv, false ; "csv")]
#[test_case(Format::Json, false ; "json")]
#[test_case(Format::Sql, false ; "sql")]
#[test_case(Format::Csv, true ; "csv gzip")]
#[test_case(Format::Sql, true ; "sql gzip")]
#[tokio::test]
async fn test_round_trip_reproduces_rows(format: Format, compress: bool) {
    let dir = TempDir::new().unwrap();
    let source = source_database(120, 45);
    let mut config = export_config(dir.path(), format, 25, 4);
    config.compress = compress;

    let exported = run_export(source.clone(), config).await;
    assert!(exported.is_successful(), "{}", exported.format_report());

    let target = target_database();
    let imported = run_import(target.clone(), import_config(dir.path(), ImportMode::Skip)).await;
    assert!(imported.is_successful(), "{}", imported.format_report());

    for table in ["users", "orders"] {
        assert_eq!(
            imported.table(table).unwrap().state,
            ImportState::Verified,
            "{table}"
        );
        assert_eq!(target.rows(table), source.rows(table), "{table}");
    }
}

#[tokio::test]
async fn test_users_scenario_batch_layout_and_truncate() {
    let dir = TempDir::new().unwrap();
    let source = source_database(2500, 0);
    let mut config = export_config(dir.path(), Format::Sql, 1000, 8);
    config.filter = TableFilter::new(vec!["users".to_string()], vec![]);
    run_export(source, config).await;

    let manifest = ArtifactStore::new(dir.path())
        .read_manifest("users")
        .await
        .unwrap();
    assert_eq!(manifest.batch_count, 3);
    assert_eq!(manifest.row_count, 2500);
    assert_eq!(
        manifest.batches.iter().map(|b| b.rows).collect::<Vec<_>>(),
        vec![1000, 1000, 500]
    );

    let target = target_database();
    target
        .insert_rows("users", (10_001..=10_010).map(user_row).collect())
        .unwrap();

    let summary = run_import(target.clone(), import_config(dir.path(), ImportMode::Truncate)).await;
    assert_eq!(summary.table("users").unwrap().state, ImportState::Verified);
    assert_eq!(target.row_count("users"), 2500);
}

#[tokio::test]
async fn test_skip_reimport_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let source = source_database(60, 10);
    run_export(source, export_config(dir.path(), Format::Csv, 20, 2)).await;

    let target = target_database();
    let first = run_import(target.clone(), import_config(dir.path(), ImportMode::Skip)).await;
    assert_eq!(first.total_imported(), 70);

    let second = run_import(target.clone(), import_config(dir.path(), ImportMode::Skip)).await;
    assert_eq!(second.total_imported(), 0);
    assert_eq!(second.total_skipped(), 70);
    assert!(second.is_successful());
    assert_eq!(target.row_count("users"), 60);
    assert_eq!(target.row_count("orders"), 10);

    let users = second.table("users").unwrap();
    assert_eq!(users.state, ImportState::Verified);
    assert_eq!(users.errors.count_class(ErrorClass::Conflict), 3);
}

#[tokio::test]
async fn test_truncate_reimport_keeps_manifest_row_count() {
    let dir = TempDir::new().unwrap();
    run_export(source_database(33, 5), export_config(dir.path(), Format::Json, 10, 3)).await;

    let target = target_database();
    for _ in 0..2 {
        let summary = run_import(target.clone(), import_config(dir.path(), ImportMode::Truncate)).await;
        assert!(summary.is_successful());
    }
    assert_eq!(target.row_count("users"), 33);
    assert_eq!(target.row_count("orders"), 5);
}

#[tokio::test]
async fn test_skip_import_with_one_colliding_key() {
    let dir = TempDir::new().unwrap();
    let source = source_database(50, 0);
    run_export(source.clone(), export_config(dir.path(), Format::Csv, 20, 2)).await;

    let target = target_database();
    target.insert_rows("users", vec![user_row(17)]).unwrap();

    let summary = run_import(target.clone(), import_config(dir.path(), ImportMode::Skip)).await;
    let users = summary.table("users").unwrap();
    assert_eq!(users.state, ImportState::Verified);
    assert_eq!(users.rows_imported, 49);
    assert_eq!(users.rows_skipped, 1);
    assert_eq!(users.errors.count_class(ErrorClass::Conflict), 1);
    assert_eq!(target.row_count("users"), 50);
}

#[tokio::test]
async fn test_replace_overwrites_existing_rows() {
    let dir = TempDir::new().unwrap();
    let source = source_database(30, 0);
    run_export(source.clone(), export_config(dir.path(), Format::Sql, 8, 4)).await;

    let target = target_database();
    target
        .insert_rows(
            "users",
            vec![vec![
                Value::Int(3),
                Value::Text("stale@example.com".to_string()),
                Value::Float(0.0),
                Value::Bool(true),
            ]],
        )
        .unwrap();

    let summary = run_import(target.clone(), import_config(dir.path(), ImportMode::Replace)).await;
    assert!(summary.is_successful());
    assert_eq!(target.rows("users"), source.rows("users"));
}

#[tokio::test]
async fn test_checksum_independent_of_worker_count() {
    let source = source_database(500, 130);
    let single = TempDir::new().unwrap();
    let many = TempDir::new().unwrap();

    let one = run_export(source.clone(), export_config(single.path(), Format::Csv, 17, 1)).await;
    let sixteen = run_export(source, export_config(many.path(), Format::Csv, 17, 16)).await;

    for table in ["users", "orders"] {
        let a = one.table(table).unwrap();
        let b = sixteen.table(table).unwrap();
        assert_eq!(a.state, ExportTableState::Completed);
        assert!(a.checksum.is_some());
        assert_eq!(a.checksum, b.checksum, "{table}");
    }
}

#[tokio::test]
async fn test_batches_in_sequence_order_reconstruct_table() {
    let dir = TempDir::new().unwrap();
    let source = source_database(77, 0);
    run_export(source.clone(), export_config(dir.path(), Format::Json, 10, 5)).await;

    let store = ArtifactStore::new(dir.path());
    let manifest = store.read_manifest("users").await.unwrap();
    let mut rows = Vec::new();
    for entry in &manifest.batches {
        let bytes = store
            .read_batch("users", &entry.file, manifest.compressed)
            .await
            .unwrap();
        rows.extend(manifest.format.decode(&bytes).unwrap().rows);
    }
    assert_eq!(Some(rows), source.rows("users"));
}

#[tokio::test]
async fn test_where_clause_limits_export() {
    let dir = TempDir::new().unwrap();
    let mut config = export_config(dir.path(), Format::Csv, 15, 2);
    config.where_clause = Some("id <= 40".to_string());
    config.filter = TableFilter::new(vec!["users".to_string()], vec![]);

    let summary = run_export(source_database(100, 0), config).await;
    assert_eq!(summary.table("users").unwrap().rows, 40);

    let manifest = ArtifactStore::new(dir.path())
        .read_manifest("users")
        .await
        .unwrap();
    assert_eq!(manifest.where_clause.as_deref(), Some("id <= 40"));
    assert_eq!(manifest.batch_count, 3);
}

#[tokio::test]
async fn test_excluded_tables_are_not_exported() {
    let dir = TempDir::new().unwrap();
    let mut config = export_config(dir.path(), Format::Csv, 50, 2);
    config.filter = TableFilter::new(vec![], vec!["orders".to_string()]);

    let summary = run_export(source_database(10, 10), config).await;
    assert_eq!(summary.tables.len(), 1);
    assert!(summary.table("orders").is_none());

    let discovered = ArtifactStore::new(dir.path()).discover().await.unwrap();
    assert_eq!(discovered, vec!["users".to_string()]);
}
