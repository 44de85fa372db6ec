//! Database connection and schema initialization

use std::path::Path;

use sqlx::SqlitePool;

use crate::Result;

/// Initialize the database connection pool.
///
/// Creates the database file (and parent directory) if missing, then
/// ensures the schema exists. Connections are leased from the returned
/// pool per operation; no caller holds one across operation boundaries.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and uniqueness indexes if they don't exist.
///
/// Uniqueness invariants of the hierarchy are enforced here, in the
/// store, so that check-then-insert races between concurrent writers
/// resolve to a constraint rejection rather than a duplicate:
/// - projects: (tenant_id, name)
/// - data_sources: (project_id, source_type, name)
/// - imports: (data_source_id, name)
/// - import_rows: (import_id, row_number)
/// - import_maps: (tenant_id, name)
///
/// `import_rows.seq` is the insertion identity used for pagination
/// ordering; it is independent of `row_number`, which may be sparse or
/// edited after the fact.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tenants (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            guid TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(guid),
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            project_info TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(tenant_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS data_sources (
            guid TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(guid),
            source_type TEXT NOT NULL,
            name TEXT NOT NULL,
            config TEXT,
            created_at INTEGER NOT NULL,
            UNIQUE(project_id, source_type, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS imports (
            guid TEXT PRIMARY KEY,
            data_source_id TEXT NOT NULL REFERENCES data_sources(guid),
            name TEXT NOT NULL,
            field_names TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(data_source_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_rows (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            guid TEXT NOT NULL UNIQUE,
            import_id TEXT NOT NULL REFERENCES imports(guid),
            row_number INTEGER NOT NULL,
            field_values TEXT NOT NULL,
            UNIQUE(import_id, row_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            guid TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(guid),
            status TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            started_at INTEGER,
            finished_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_messages (
            guid TEXT PRIMARY KEY,
            job_id TEXT NOT NULL REFERENCES jobs(guid),
            severity TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_maps (
            guid TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(guid),
            name TEXT NOT NULL,
            mapping TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(tenant_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Lookup indexes for scoped listings and the paging engine
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_import_rows_import ON import_rows(import_id, seq)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_data_sources_project ON data_sources(project_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_imports_data_source ON imports(data_source_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_project ON jobs(project_id)")
        .execute(pool)
        .await?;
    // One active job per project, enforced by the store so concurrent
    // job creation loses cleanly instead of racing a count check
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_one_active_per_project
         ON jobs(project_id) WHERE status IN ('queued', 'running')",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_messages_job ON job_messages(job_id)")
        .execute(pool)
        .await?;

    tracing::debug!("Database schema initialized");
    Ok(())
}
