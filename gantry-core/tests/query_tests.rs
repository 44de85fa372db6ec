//! Integration tests for the read-side query operations
//!
//! Reads are snapshot and side-effect free; these tests build state
//! through the command dispatcher and verify the query layer's scoping
//! and eager loading.

use std::sync::Arc;

use sqlx::SqlitePool;
use uuid::Uuid;

use gantry_core::commands::{Command, CommandOutcome, Dispatcher};
use gantry_core::db::{init_database_pool, queries};
use gantry_core::events::EventBus;
use gantry_core::{Error, FieldValue};

async fn setup() -> (tempfile::TempDir, SqlitePool, Dispatcher) {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = init_database_pool(&dir.path().join("gantry.db"))
        .await
        .expect("database init");
    let dispatcher = Dispatcher::new(pool.clone(), Arc::new(EventBus::new(16)));
    (dir, pool, dispatcher)
}

async fn dispatch_id(dispatcher: &Dispatcher, command: Command) -> Uuid {
    match dispatcher.dispatch(command).await.unwrap() {
        CommandOutcome::TenantCreated { tenant_id } => tenant_id,
        CommandOutcome::ProjectCreated { project_id } => project_id,
        CommandOutcome::DataSourceAdded { data_source_id } => data_source_id,
        CommandOutcome::ImportAdded { import_id } => import_id,
        CommandOutcome::JobCreated { job_id } => job_id,
        CommandOutcome::ImportMapCreated { import_map_id } => import_map_id,
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn get_project_eagerly_loads_data_sources() {
    let (_dir, pool, dispatcher) = setup().await;
    let tenant_id = dispatch_id(&dispatcher, Command::CreateTenant { name: "T".into() }).await;
    let project_id = dispatch_id(
        &dispatcher,
        Command::CreateProject {
            tenant_id,
            name: "P".into(),
            description: "desc".into(),
            project_info: Some(serde_json::json!({"source_system": "legacy-ams"})),
        },
    )
    .await;
    for name in ["Source A", "Source B"] {
        dispatch_id(
            &dispatcher,
            Command::AddProjectDataSource {
                project_id,
                name: name.into(),
                source_type: "csv".into(),
                config: None,
                seed_imports: vec![],
            },
        )
        .await;
    }

    let detail = queries::get_project(&pool, project_id).await.unwrap();
    assert_eq!(detail.project.guid, project_id);
    assert_eq!(detail.project.tenant_id, tenant_id);
    assert_eq!(detail.project.description, "desc");
    assert_eq!(
        detail.project.project_info,
        Some(serde_json::json!({"source_system": "legacy-ams"}))
    );
    assert_eq!(detail.data_sources.len(), 2);
    assert_eq!(detail.data_sources[0].name, "Source A");
}

#[tokio::test]
async fn listings_are_scoped_to_their_parent() {
    let (_dir, pool, dispatcher) = setup().await;
    let tenant_a = dispatch_id(&dispatcher, Command::CreateTenant { name: "A".into() }).await;
    let tenant_b = dispatch_id(&dispatcher, Command::CreateTenant { name: "B".into() }).await;

    for (tenant_id, name) in [(tenant_a, "P1"), (tenant_a, "P2"), (tenant_b, "P3")] {
        dispatch_id(
            &dispatcher,
            Command::CreateProject {
                tenant_id,
                name: name.into(),
                description: String::new(),
                project_info: None,
            },
        )
        .await;
    }

    let a_projects = queries::list_projects(&pool, tenant_a).await.unwrap();
    let b_projects = queries::list_projects(&pool, tenant_b).await.unwrap();
    assert_eq!(a_projects.len(), 2);
    assert_eq!(b_projects.len(), 1);
    assert_eq!(b_projects[0].name, "P3");
    assert!(queries::list_projects(&pool, Uuid::new_v4())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn get_data_source_eagerly_loads_imports() {
    let (_dir, pool, dispatcher) = setup().await;
    let tenant_id = dispatch_id(&dispatcher, Command::CreateTenant { name: "T".into() }).await;
    let project_id = dispatch_id(
        &dispatcher,
        Command::CreateProject {
            tenant_id,
            name: "P".into(),
            description: String::new(),
            project_info: None,
        },
    )
    .await;
    let ds = dispatch_id(
        &dispatcher,
        Command::AddProjectDataSource {
            project_id,
            name: "Source".into(),
            source_type: "csv".into(),
            config: Some(serde_json::json!({"path": "/data/members.csv"})),
            seed_imports: vec![],
        },
    )
    .await;
    let import_id = dispatch_id(
        &dispatcher,
        Command::AddProjectImport {
            data_source_id: ds,
            name: "members".into(),
            field_names: vec!["MemberId".into(), "JoinDate".into()],
        },
    )
    .await;

    let detail = queries::get_data_source(&pool, ds).await.unwrap();
    assert_eq!(detail.data_source.project_id, project_id);
    assert_eq!(
        detail.data_source.config,
        Some(serde_json::json!({"path": "/data/members.csv"}))
    );
    assert_eq!(detail.imports.len(), 1);
    assert_eq!(detail.imports[0].guid, import_id);
    assert_eq!(detail.imports[0].field_names, vec!["MemberId", "JoinDate"]);

    let import = queries::get_import(&pool, import_id).await.unwrap();
    assert_eq!(import.data_source_id, ds);
}

#[tokio::test]
async fn count_does_not_mutate_and_reflects_store() {
    let (_dir, pool, dispatcher) = setup().await;
    let tenant_id = dispatch_id(&dispatcher, Command::CreateTenant { name: "T".into() }).await;
    let project_id = dispatch_id(
        &dispatcher,
        Command::CreateProject {
            tenant_id,
            name: "P".into(),
            description: String::new(),
            project_info: None,
        },
    )
    .await;
    let ds = dispatch_id(
        &dispatcher,
        Command::AddProjectDataSource {
            project_id,
            name: "Source".into(),
            source_type: "csv".into(),
            config: None,
            seed_imports: vec![],
        },
    )
    .await;
    let import_id = dispatch_id(
        &dispatcher,
        Command::AddProjectImport {
            data_source_id: ds,
            name: "members".into(),
            field_names: vec![],
        },
    )
    .await;

    assert_eq!(queries::count_import_rows(&pool, import_id).await.unwrap(), 0);

    dispatcher
        .dispatch(Command::AddProjectImportData {
            import_id,
            rows: vec![vec![FieldValue::Int(1)], vec![FieldValue::Int(2)]],
        })
        .await
        .unwrap();

    // Every call reflects the store at call time
    assert_eq!(queries::count_import_rows(&pool, import_id).await.unwrap(), 2);
    assert_eq!(queries::count_import_rows(&pool, import_id).await.unwrap(), 2);
}

#[tokio::test]
async fn jobs_are_listed_per_tenant() {
    let (_dir, pool, dispatcher) = setup().await;
    let tenant_a = dispatch_id(&dispatcher, Command::CreateTenant { name: "A".into() }).await;
    let tenant_b = dispatch_id(&dispatcher, Command::CreateTenant { name: "B".into() }).await;
    let project_a = dispatch_id(
        &dispatcher,
        Command::CreateProject {
            tenant_id: tenant_a,
            name: "PA".into(),
            description: String::new(),
            project_info: None,
        },
    )
    .await;
    let project_b = dispatch_id(
        &dispatcher,
        Command::CreateProject {
            tenant_id: tenant_b,
            name: "PB".into(),
            description: String::new(),
            project_info: None,
        },
    )
    .await;

    let job_a = dispatch_id(&dispatcher, Command::CreateJob { project_id: project_a }).await;
    dispatch_id(&dispatcher, Command::CreateJob { project_id: project_b }).await;

    let jobs = queries::list_jobs(&pool, tenant_a).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].guid, job_a);
    assert_eq!(jobs[0].project_id, project_a);
}

#[tokio::test]
async fn import_maps_are_read_back_per_tenant() {
    let (_dir, pool, dispatcher) = setup().await;
    let tenant_id = dispatch_id(&dispatcher, Command::CreateTenant { name: "T".into() }).await;
    let mapping = serde_json::json!({"MemberId": "person.external_id"});
    let map_id = dispatch_id(
        &dispatcher,
        Command::CreateImportMap {
            tenant_id,
            name: "standard".into(),
            mapping: mapping.clone(),
        },
    )
    .await;

    let map = queries::get_import_map(&pool, map_id).await.unwrap();
    assert_eq!(map.tenant_id, tenant_id);
    assert_eq!(map.mapping, mapping);

    let maps = queries::list_import_maps(&pool, tenant_id).await.unwrap();
    assert_eq!(maps.len(), 1);
    assert_eq!(maps[0].name, "standard");
}

#[tokio::test]
async fn lookups_for_missing_entities_are_not_found() {
    let (_dir, pool, _dispatcher) = setup().await;

    assert!(matches!(
        queries::get_project(&pool, Uuid::new_v4()).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        queries::get_data_source(&pool, Uuid::new_v4()).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        queries::get_import(&pool, Uuid::new_v4()).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        queries::get_job(&pool, Uuid::new_v4()).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        queries::get_import_map(&pool, Uuid::new_v4()).await,
        Err(Error::NotFound(_))
    ));
}
