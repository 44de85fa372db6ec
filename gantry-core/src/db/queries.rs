//! Read-side query operations over the migration hierarchy
//!
//! All reads are snapshot and non-mutating: each function leases a
//! connection from the pool for the duration of the call and releases
//! it before returning. Nothing is cached between calls; every call
//! reflects the store's state at call time.

use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::models::{
    DataSource, DataSourceDetail, Import, ImportMap, Job, JobMessage, JobStatus, MessageSeverity,
    Project, ProjectDetail,
};
use crate::{Error, Result};

/// Parse a stored TEXT guid column back into a Uuid.
pub(crate) fn parse_guid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Internal(format!("Invalid stored guid '{}': {}", s, e)))
}

/// Convert a stored unix-millisecond column back into a timestamp.
pub(crate) fn datetime_from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| Error::Internal(format!("Invalid stored timestamp: {}", ms)))
}

fn project_from_row(row: &SqliteRow) -> Result<Project> {
    let guid: String = row.get("guid");
    let tenant_id: String = row.get("tenant_id");
    let project_info: Option<String> = row.get("project_info");

    Ok(Project {
        guid: parse_guid(&guid)?,
        tenant_id: parse_guid(&tenant_id)?,
        name: row.get("name"),
        description: row.get("description"),
        project_info: project_info
            .map(|s| {
                serde_json::from_str(&s)
                    .map_err(|e| Error::Internal(format!("Invalid stored project_info: {}", e)))
            })
            .transpose()?,
        created_at: datetime_from_millis(row.get("created_at"))?,
        updated_at: datetime_from_millis(row.get("updated_at"))?,
    })
}

fn data_source_from_row(row: &SqliteRow) -> Result<DataSource> {
    let guid: String = row.get("guid");
    let project_id: String = row.get("project_id");
    let config: Option<String> = row.get("config");

    Ok(DataSource {
        guid: parse_guid(&guid)?,
        project_id: parse_guid(&project_id)?,
        source_type: row.get("source_type"),
        name: row.get("name"),
        config: config
            .map(|s| {
                serde_json::from_str(&s)
                    .map_err(|e| Error::Internal(format!("Invalid stored config: {}", e)))
            })
            .transpose()?,
        created_at: datetime_from_millis(row.get("created_at"))?,
    })
}

fn import_from_row(row: &SqliteRow) -> Result<Import> {
    let guid: String = row.get("guid");
    let data_source_id: String = row.get("data_source_id");
    let field_names: String = row.get("field_names");

    Ok(Import {
        guid: parse_guid(&guid)?,
        data_source_id: parse_guid(&data_source_id)?,
        name: row.get("name"),
        field_names: serde_json::from_str(&field_names)
            .map_err(|e| Error::Internal(format!("Invalid stored field_names: {}", e)))?,
        created_at: datetime_from_millis(row.get("created_at"))?,
    })
}

fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let guid: String = row.get("guid");
    let project_id: String = row.get("project_id");
    let status: String = row.get("status");
    let started_at: Option<i64> = row.get("started_at");
    let finished_at: Option<i64> = row.get("finished_at");

    Ok(Job {
        guid: parse_guid(&guid)?,
        project_id: parse_guid(&project_id)?,
        status: JobStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("Invalid stored job status: {}", status)))?,
        created_at: datetime_from_millis(row.get("created_at"))?,
        updated_at: datetime_from_millis(row.get("updated_at"))?,
        started_at: started_at.map(datetime_from_millis).transpose()?,
        finished_at: finished_at.map(datetime_from_millis).transpose()?,
    })
}

fn job_message_from_row(row: &SqliteRow) -> Result<JobMessage> {
    let guid: String = row.get("guid");
    let job_id: String = row.get("job_id");
    let severity: String = row.get("severity");

    Ok(JobMessage {
        guid: parse_guid(&guid)?,
        job_id: parse_guid(&job_id)?,
        severity: MessageSeverity::parse(&severity)
            .ok_or_else(|| Error::Internal(format!("Invalid stored severity: {}", severity)))?,
        message: row.get("message"),
        created_at: datetime_from_millis(row.get("created_at"))?,
    })
}

fn import_map_from_row(row: &SqliteRow) -> Result<ImportMap> {
    let guid: String = row.get("guid");
    let tenant_id: String = row.get("tenant_id");
    let mapping: String = row.get("mapping");

    Ok(ImportMap {
        guid: parse_guid(&guid)?,
        tenant_id: parse_guid(&tenant_id)?,
        name: row.get("name"),
        mapping: serde_json::from_str(&mapping)
            .map_err(|e| Error::Internal(format!("Invalid stored mapping: {}", e)))?,
        created_at: datetime_from_millis(row.get("created_at"))?,
    })
}

/// Count the rows of one import.
///
/// Does not decode any stored blob, so it succeeds even when individual
/// rows are malformed.
pub async fn count_import_rows(pool: &SqlitePool, import_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM import_rows WHERE import_id = ?")
        .bind(import_id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Load a project by identifier, with its data sources eagerly loaded.
pub async fn get_project(pool: &SqlitePool, project_id: Uuid) -> Result<ProjectDetail> {
    let row = sqlx::query(
        "SELECT guid, tenant_id, name, description, project_info, created_at, updated_at
         FROM projects WHERE guid = ?",
    )
    .bind(project_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Project {}", project_id)))?;

    let project = project_from_row(&row)?;
    let data_sources = list_data_sources(pool, project_id).await?;

    Ok(ProjectDetail {
        project,
        data_sources,
    })
}

/// List all projects owned by a tenant, oldest first.
pub async fn list_projects(pool: &SqlitePool, tenant_id: Uuid) -> Result<Vec<Project>> {
    let rows = sqlx::query(
        "SELECT guid, tenant_id, name, description, project_info, created_at, updated_at
         FROM projects WHERE tenant_id = ? ORDER BY created_at, name",
    )
    .bind(tenant_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(project_from_row).collect()
}

/// Load a data source by identifier, with its imports eagerly loaded.
pub async fn get_data_source(pool: &SqlitePool, data_source_id: Uuid) -> Result<DataSourceDetail> {
    let row = sqlx::query(
        "SELECT guid, project_id, source_type, name, config, created_at
         FROM data_sources WHERE guid = ?",
    )
    .bind(data_source_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Data source {}", data_source_id)))?;

    let data_source = data_source_from_row(&row)?;
    let imports = list_imports(pool, data_source_id).await?;

    Ok(DataSourceDetail {
        data_source,
        imports,
    })
}

/// List the data sources of a project.
pub async fn list_data_sources(pool: &SqlitePool, project_id: Uuid) -> Result<Vec<DataSource>> {
    let rows = sqlx::query(
        "SELECT guid, project_id, source_type, name, config, created_at
         FROM data_sources WHERE project_id = ? ORDER BY created_at, name",
    )
    .bind(project_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(data_source_from_row).collect()
}

/// Load an import by identifier.
pub async fn get_import(pool: &SqlitePool, import_id: Uuid) -> Result<Import> {
    let row = sqlx::query(
        "SELECT guid, data_source_id, name, field_names, created_at
         FROM imports WHERE guid = ?",
    )
    .bind(import_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Import {}", import_id)))?;

    import_from_row(&row)
}

/// List the imports of a data source.
pub async fn list_imports(pool: &SqlitePool, data_source_id: Uuid) -> Result<Vec<Import>> {
    let rows = sqlx::query(
        "SELECT guid, data_source_id, name, field_names, created_at
         FROM imports WHERE data_source_id = ? ORDER BY created_at, name",
    )
    .bind(data_source_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(import_from_row).collect()
}

/// Load a job by identifier.
pub async fn get_job(pool: &SqlitePool, job_id: Uuid) -> Result<Job> {
    let row = sqlx::query(
        "SELECT guid, project_id, status, created_at, updated_at, started_at, finished_at
         FROM jobs WHERE guid = ?",
    )
    .bind(job_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Job {}", job_id)))?;

    job_from_row(&row)
}

/// List all jobs under a tenant's projects, newest first.
pub async fn list_jobs(pool: &SqlitePool, tenant_id: Uuid) -> Result<Vec<Job>> {
    let rows = sqlx::query(
        "SELECT j.guid, j.project_id, j.status, j.created_at, j.updated_at,
                j.started_at, j.finished_at
         FROM jobs j
         JOIN projects p ON p.guid = j.project_id
         WHERE p.tenant_id = ?
         ORDER BY j.created_at DESC",
    )
    .bind(tenant_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// List a job's diagnostic messages in the order they were appended.
///
/// Ordered by insertion identity (rowid), not by timestamp: messages
/// appended within the same millisecond must still come back in append
/// order.
pub async fn list_job_messages(pool: &SqlitePool, job_id: Uuid) -> Result<Vec<JobMessage>> {
    let rows = sqlx::query(
        "SELECT guid, job_id, severity, message, created_at
         FROM job_messages WHERE job_id = ? ORDER BY rowid",
    )
    .bind(job_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_message_from_row).collect()
}

/// Load an import map by identifier.
pub async fn get_import_map(pool: &SqlitePool, import_map_id: Uuid) -> Result<ImportMap> {
    let row = sqlx::query(
        "SELECT guid, tenant_id, name, mapping, created_at
         FROM import_maps WHERE guid = ?",
    )
    .bind(import_map_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Import map {}", import_map_id)))?;

    import_map_from_row(&row)
}

/// List a tenant's import maps.
pub async fn list_import_maps(pool: &SqlitePool, tenant_id: Uuid) -> Result<Vec<ImportMap>> {
    let rows = sqlx::query(
        "SELECT guid, tenant_id, name, mapping, created_at
         FROM import_maps WHERE tenant_id = ? ORDER BY name",
    )
    .bind(tenant_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(import_map_from_row).collect()
}
