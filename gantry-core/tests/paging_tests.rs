//! Integration tests for the import batch paging engine
//!
//! Covers pagination stability (cached total count), ordering
//! determinism, window assembly beyond the internal fetch ceiling,
//! end-of-import behavior, and malformed-blob failure handling.

use std::sync::Arc;

use sqlx::SqlitePool;
use uuid::Uuid;

use gantry_core::commands::{Command, CommandOutcome, Dispatcher};
use gantry_core::db::init_database_pool;
use gantry_core::events::EventBus;
use gantry_core::paging::ImportPager;
use gantry_core::{Error, FieldValue};

async fn setup() -> (tempfile::TempDir, SqlitePool, Dispatcher) {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = init_database_pool(&dir.path().join("gantry.db"))
        .await
        .expect("database init");
    let dispatcher = Dispatcher::new(pool.clone(), Arc::new(EventBus::new(64)));
    (dir, pool, dispatcher)
}

/// Create tenant → project → data source → import, returning the import id.
async fn setup_import(dispatcher: &Dispatcher) -> Uuid {
    let tenant_id = match dispatcher
        .dispatch(Command::CreateTenant {
            name: "Test Association".to_string(),
        })
        .await
        .unwrap()
    {
        CommandOutcome::TenantCreated { tenant_id } => tenant_id,
        other => panic!("unexpected outcome: {:?}", other),
    };

    let project_id = match dispatcher
        .dispatch(Command::CreateProject {
            tenant_id,
            name: "Membership Migration".to_string(),
            description: String::new(),
            project_info: None,
        })
        .await
        .unwrap()
    {
        CommandOutcome::ProjectCreated { project_id } => project_id,
        other => panic!("unexpected outcome: {:?}", other),
    };

    let data_source_id = match dispatcher
        .dispatch(Command::AddProjectDataSource {
            project_id,
            name: "Legacy AMS".to_string(),
            source_type: "csv".to_string(),
            config: None,
            seed_imports: vec![],
        })
        .await
        .unwrap()
    {
        CommandOutcome::DataSourceAdded { data_source_id } => data_source_id,
        other => panic!("unexpected outcome: {:?}", other),
    };

    match dispatcher
        .dispatch(Command::AddProjectImport {
            data_source_id,
            name: "members".to_string(),
            field_names: vec!["MemberId".to_string(), "Name".to_string()],
        })
        .await
        .unwrap()
    {
        CommandOutcome::ImportAdded { import_id } => import_id,
        other => panic!("unexpected outcome: {:?}", other),
    }
}

fn member_row(n: i64) -> Vec<FieldValue> {
    vec![FieldValue::Int(n), FieldValue::Text(format!("member-{}", n))]
}

/// Load `count` rows in batches, the way a connector would.
async fn load_rows(dispatcher: &Dispatcher, import_id: Uuid, count: i64) {
    let mut loaded = 0;
    while loaded < count {
        let batch = (count - loaded).min(500);
        let rows: Vec<Vec<FieldValue>> =
            (loaded + 1..=loaded + batch).map(member_row).collect();
        dispatcher
            .dispatch(Command::AddProjectImportData { import_id, rows })
            .await
            .unwrap();
        loaded += batch;
    }
}

#[tokio::test]
async fn end_to_end_1234_rows() {
    let (_dir, pool, dispatcher) = setup().await;
    let import_id = setup_import(&dispatcher).await;
    load_rows(&dispatcher, import_id, 1234).await;

    let mut pager = ImportPager::new(pool.clone(), import_id);

    let page = pager.get_page(0, 100).await.unwrap();
    assert_eq!(page.total_count, 1234);
    assert_eq!(page.rows.len(), 100);
    assert_eq!(page.rows[0].source.row_number, 1);
    assert_eq!(page.rows[99].source.row_number, 100);
    assert_eq!(page.rows[0].values, member_row(1));

    let tail = pager.get_page(1200, 100).await.unwrap();
    assert_eq!(tail.total_count, 1234);
    assert_eq!(tail.rows.len(), 34);
    assert_eq!(tail.rows[0].source.row_number, 1201);
    assert_eq!(tail.rows[33].source.row_number, 1234);
}

#[tokio::test]
async fn ordering_is_deterministic_across_windows() {
    let (_dir, pool, dispatcher) = setup().await;
    let import_id = setup_import(&dispatcher).await;
    load_rows(&dispatcher, import_id, 40).await;

    let mut pager = ImportPager::new(pool.clone(), import_id);

    let first = pager.get_page(0, 17).await.unwrap();
    let second = pager.get_page(17, 13).await.unwrap();
    let combined = pager.get_page(0, 30).await.unwrap();

    let split_ids: Vec<Uuid> = first
        .rows
        .iter()
        .chain(second.rows.iter())
        .map(|r| r.source.row_id)
        .collect();
    let combined_ids: Vec<Uuid> = combined.rows.iter().map(|r| r.source.row_id).collect();
    assert_eq!(split_ids, combined_ids);
}

#[tokio::test]
async fn total_count_is_cached_per_instance() {
    let (_dir, pool, dispatcher) = setup().await;
    let import_id = setup_import(&dispatcher).await;
    load_rows(&dispatcher, import_id, 10).await;

    let mut pager = ImportPager::new(pool.clone(), import_id);
    assert_eq!(pager.get_page(0, 5).await.unwrap().total_count, 10);

    // Concurrent writer adds rows; the existing pager must not notice
    load_rows(&dispatcher, import_id, 5).await;
    assert_eq!(pager.get_page(0, 5).await.unwrap().total_count, 10);
    assert_eq!(pager.total_count().await.unwrap(), 10);

    // A fresh pager computes its own count
    let mut fresh = ImportPager::new(pool.clone(), import_id);
    assert_eq!(fresh.total_count().await.unwrap(), 15);
}

#[tokio::test]
async fn limit_zero_returns_all_remaining_rows() {
    let (_dir, pool, dispatcher) = setup().await;
    let import_id = setup_import(&dispatcher).await;
    // More than the 500-row fetch ceiling, so the full window must be
    // assembled from multiple bounded fetches
    load_rows(&dispatcher, import_id, 1234).await;

    let mut pager = ImportPager::new(pool.clone(), import_id);

    let all = pager.get_page(0, 0).await.unwrap();
    assert_eq!(all.rows.len(), 1234);
    assert_eq!(all.rows.last().unwrap().source.row_number, 1234);

    let rest = pager.get_page(1000, -1).await.unwrap();
    assert_eq!(rest.rows.len(), 234);
    assert_eq!(rest.rows[0].source.row_number, 1001);
}

#[tokio::test]
async fn window_larger_than_fetch_ceiling_is_fully_assembled() {
    let (_dir, pool, dispatcher) = setup().await;
    let import_id = setup_import(&dispatcher).await;
    load_rows(&dispatcher, import_id, 800).await;

    let mut pager = ImportPager::new(pool.clone(), import_id);
    let page = pager.get_page(50, 700).await.unwrap();
    assert_eq!(page.rows.len(), 700);
    assert_eq!(page.rows[0].source.row_number, 51);
    assert_eq!(page.rows[699].source.row_number, 750);
}

#[tokio::test]
async fn negative_offset_starts_from_first_row() {
    let (_dir, pool, dispatcher) = setup().await;
    let import_id = setup_import(&dispatcher).await;
    load_rows(&dispatcher, import_id, 5).await;

    let mut pager = ImportPager::new(pool.clone(), import_id);
    let page = pager.get_page(-10, 3).await.unwrap();
    assert_eq!(page.offset, 0);
    assert_eq!(page.rows[0].source.row_number, 1);
}

#[tokio::test]
async fn offset_past_end_is_empty_page_not_error() {
    let (_dir, pool, dispatcher) = setup().await;
    let import_id = setup_import(&dispatcher).await;
    load_rows(&dispatcher, import_id, 5).await;

    let mut pager = ImportPager::new(pool.clone(), import_id);
    let page = pager.get_page(500, 100).await.unwrap();
    assert!(page.rows.is_empty());
    assert_eq!(page.total_count, 5);
}

#[tokio::test]
async fn empty_import_pages_cleanly() {
    let (_dir, pool, dispatcher) = setup().await;
    let import_id = setup_import(&dispatcher).await;

    let mut pager = ImportPager::new(pool.clone(), import_id);
    let page = pager.get_page(0, 100).await.unwrap();
    assert!(page.rows.is_empty());
    assert_eq!(page.total_count, 0);
}

#[tokio::test]
async fn row_refs_allow_point_refetch() {
    let (_dir, pool, dispatcher) = setup().await;
    let import_id = setup_import(&dispatcher).await;
    load_rows(&dispatcher, import_id, 20).await;

    let mut pager = ImportPager::new(pool.clone(), import_id);
    let page = pager.get_page(10, 1).await.unwrap();
    let row_ref = page.rows[0].source;
    assert_eq!(row_ref.import_id, import_id);

    // The back-reference identifies the persisted row directly
    let stored_number: i64 =
        sqlx::query_scalar("SELECT row_number FROM import_rows WHERE guid = ?")
            .bind(row_ref.row_id.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(stored_number, row_ref.row_number);
}

#[tokio::test]
async fn malformed_blob_fails_page_but_not_count() {
    let (_dir, pool, dispatcher) = setup().await;
    let import_id = setup_import(&dispatcher).await;
    load_rows(&dispatcher, import_id, 100).await;

    // Corrupt one stored blob directly in the store
    sqlx::query("UPDATE import_rows SET field_values = 'not a blob' WHERE row_number = 50")
        .execute(&pool)
        .await
        .unwrap();

    let mut pager = ImportPager::new(pool.clone(), import_id);

    // Count does not decode blobs, so it still succeeds
    assert_eq!(pager.total_count().await.unwrap(), 100);

    // The page containing the bad row fails as a whole, with the row
    // context prepended exactly once
    match pager.get_page(0, 100).await {
        Err(Error::Serialization(msg)) => {
            assert!(msg.contains("Row 50"), "missing row context: {}", msg);
            assert!(
                !msg.contains("Serialization failure"),
                "doubled error prefix: {}",
                msg
            );
        }
        other => panic!("expected serialization failure, got {:?}", other),
    }

    // A window that avoids the bad row still works
    let page = pager.get_page(50, 50).await.unwrap();
    assert_eq!(page.rows.len(), 50);
}
