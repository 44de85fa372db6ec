//! Command/event dispatch layer
//!
//! Commands are intents to mutate the hierarchy. Each command maps to
//! exactly one handler; the handler validates parents and uniqueness,
//! applies the mutation inside a single transaction, and — only after
//! the commit succeeds — publishes at most one corresponding event on
//! the [`EventBus`]. A failed command leaves no partial state and
//! publishes nothing.

use std::sync::Arc;

use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::db::models::{JobStatus, MessageSeverity};
use crate::events::{EventBus, MigrationEvent};
use crate::value::{encode_row, FieldValue};
use crate::{Error, Result};

/// An import created together with its data source, so a connector can
/// seed a source's initial row-set in one command.
#[derive(Debug, Clone)]
pub struct SeedImport {
    pub name: String,
    pub field_names: Vec<String>,
    pub rows: Vec<Vec<FieldValue>>,
}

/// Intents accepted by the dispatcher.
#[derive(Debug, Clone)]
pub enum Command {
    CreateTenant {
        name: String,
    },
    CreateProject {
        tenant_id: Uuid,
        name: String,
        description: String,
        project_info: Option<serde_json::Value>,
    },
    /// Deep copy of a project (data sources, imports, rows) under a new
    /// name in the same tenant. The copy gets fresh identifiers.
    CopyProject {
        source_project_id: Uuid,
        new_name: String,
    },
    DeleteProject {
        project_id: Uuid,
    },
    AddProjectDataSource {
        project_id: Uuid,
        name: String,
        source_type: String,
        config: Option<serde_json::Value>,
        seed_imports: Vec<SeedImport>,
    },
    DeleteProjectDataSource {
        project_id: Uuid,
        data_source_id: Uuid,
    },
    AddProjectImport {
        data_source_id: Uuid,
        name: String,
        field_names: Vec<String>,
    },
    /// Append a batch of rows to an import. Row numbers continue from
    /// the current maximum inside the same transaction; a concurrent
    /// batch colliding on a number is rejected by the store's
    /// uniqueness index and surfaces as a constraint violation.
    AddProjectImportData {
        import_id: Uuid,
        rows: Vec<Vec<FieldValue>>,
    },
    DeleteImports {
        data_source_id: Uuid,
    },
    /// Touch a project's modification timestamp.
    UpdateProjectUpdatedOn {
        project_id: Uuid,
    },
    CreateImportMap {
        tenant_id: Uuid,
        name: String,
        mapping: serde_json::Value,
    },
    CreateJob {
        project_id: Uuid,
    },
    UpdateJobStatus {
        job_id: Uuid,
        status: JobStatus,
    },
    AddJobMessage {
        job_id: Uuid,
        severity: MessageSeverity,
        message: String,
    },
}

/// What a successful command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    TenantCreated { tenant_id: Uuid },
    ProjectCreated { project_id: Uuid },
    ProjectDeleted { project_id: Uuid },
    DataSourceAdded { data_source_id: Uuid },
    DataSourceDeleted { data_source_id: Uuid },
    ImportAdded { import_id: Uuid },
    ImportDataAdded { row_count: usize, first_row_number: i64 },
    ImportsDeleted { import_count: u64 },
    ProjectTouched { project_id: Uuid },
    ImportMapCreated { import_map_id: Uuid },
    JobCreated { job_id: Uuid },
    JobUpdated { job_id: Uuid },
    JobMessageAdded { message_id: Uuid },
}

/// Maps each command to its one handler and publishes post-commit
/// events. Holds the pool and the event bus; it leases a connection per
/// dispatch and never keeps one between calls.
pub struct Dispatcher {
    pool: SqlitePool,
    events: Arc<EventBus>,
}

impl Dispatcher {
    pub fn new(pool: SqlitePool, events: Arc<EventBus>) -> Self {
        Self { pool, events }
    }

    pub async fn dispatch(&self, command: Command) -> Result<CommandOutcome> {
        match command {
            Command::CreateTenant { name } => self.create_tenant(name).await,
            Command::CreateProject {
                tenant_id,
                name,
                description,
                project_info,
            } => {
                self.create_project(tenant_id, name, description, project_info)
                    .await
            }
            Command::CopyProject {
                source_project_id,
                new_name,
            } => self.copy_project(source_project_id, new_name).await,
            Command::DeleteProject { project_id } => self.delete_project(project_id).await,
            Command::AddProjectDataSource {
                project_id,
                name,
                source_type,
                config,
                seed_imports,
            } => {
                self.add_data_source(project_id, name, source_type, config, seed_imports)
                    .await
            }
            Command::DeleteProjectDataSource {
                project_id,
                data_source_id,
            } => self.delete_data_source(project_id, data_source_id).await,
            Command::AddProjectImport {
                data_source_id,
                name,
                field_names,
            } => self.add_import(data_source_id, name, field_names).await,
            Command::AddProjectImportData { import_id, rows } => {
                self.add_import_data(import_id, rows).await
            }
            Command::DeleteImports { data_source_id } => {
                self.delete_imports(data_source_id).await
            }
            Command::UpdateProjectUpdatedOn { project_id } => self.touch_project(project_id).await,
            Command::CreateImportMap {
                tenant_id,
                name,
                mapping,
            } => self.create_import_map(tenant_id, name, mapping).await,
            Command::CreateJob { project_id } => self.create_job(project_id).await,
            Command::UpdateJobStatus { job_id, status } => {
                self.update_job_status(job_id, status).await
            }
            Command::AddJobMessage {
                job_id,
                severity,
                message,
            } => self.add_job_message(job_id, severity, message).await,
        }
    }

    async fn create_tenant(&self, name: String) -> Result<CommandOutcome> {
        let tenant_id = Uuid::new_v4();
        sqlx::query("INSERT INTO tenants (guid, name, created_at) VALUES (?, ?, ?)")
            .bind(tenant_id.to_string())
            .bind(&name)
            .bind(now_millis())
            .execute(&self.pool)
            .await?;

        tracing::info!(%tenant_id, name, "Created tenant");
        Ok(CommandOutcome::TenantCreated { tenant_id })
    }

    async fn create_project(
        &self,
        tenant_id: Uuid,
        name: String,
        description: String,
        project_info: Option<serde_json::Value>,
    ) -> Result<CommandOutcome> {
        let mut tx = self.pool.begin().await?;
        ensure_tenant(&mut tx, tenant_id).await?;

        // Generated here, on the store's client side; the store never
        // replaces it.
        let project_id = Uuid::new_v4();
        let now = now_millis();
        sqlx::query(
            "INSERT INTO projects (guid, tenant_id, name, description, project_info,
                                   created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(project_id.to_string())
        .bind(tenant_id.to_string())
        .bind(&name)
        .bind(&description)
        .bind(project_info.map(|v| v.to_string()))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::from_write(e, &format!("Project name '{}' already exists for tenant", name))
        })?;

        tx.commit().await?;
        tracing::info!(%project_id, name, "Created project");
        self.events.emit(MigrationEvent::ProjectCreated {
            project_id,
            timestamp: chrono::Utc::now(),
        });
        Ok(CommandOutcome::ProjectCreated { project_id })
    }

    async fn copy_project(
        &self,
        source_project_id: Uuid,
        new_name: String,
    ) -> Result<CommandOutcome> {
        let mut tx = self.pool.begin().await?;

        let source = sqlx::query(
            "SELECT tenant_id, description, project_info FROM projects WHERE guid = ?",
        )
        .bind(source_project_id.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Project {}", source_project_id)))?;

        let tenant_id: String = source.get("tenant_id");
        let description: String = source.get("description");
        let project_info: Option<String> = source.get("project_info");

        let project_id = Uuid::new_v4();
        let now = now_millis();
        sqlx::query(
            "INSERT INTO projects (guid, tenant_id, name, description, project_info,
                                   created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(project_id.to_string())
        .bind(&tenant_id)
        .bind(&new_name)
        .bind(&description)
        .bind(&project_info)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::from_write(
                e,
                &format!("Project name '{}' already exists for tenant", new_name),
            )
        })?;

        let sources = sqlx::query(
            "SELECT guid, source_type, name, config FROM data_sources
             WHERE project_id = ? ORDER BY created_at, name",
        )
        .bind(source_project_id.to_string())
        .fetch_all(&mut *tx)
        .await?;

        for ds in &sources {
            let old_ds_id: String = ds.get("guid");
            let new_ds_id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO data_sources (guid, project_id, source_type, name, config, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(new_ds_id.to_string())
            .bind(project_id.to_string())
            .bind(ds.get::<String, _>("source_type"))
            .bind(ds.get::<String, _>("name"))
            .bind(ds.get::<Option<String>, _>("config"))
            .bind(now)
            .execute(&mut *tx)
            .await?;

            let imports = sqlx::query(
                "SELECT guid, name, field_names FROM imports WHERE data_source_id = ?",
            )
            .bind(&old_ds_id)
            .fetch_all(&mut *tx)
            .await?;

            for import in &imports {
                let old_import_id: String = import.get("guid");
                let new_import_id = Uuid::new_v4();
                sqlx::query(
                    "INSERT INTO imports (guid, data_source_id, name, field_names, created_at)
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(new_import_id.to_string())
                .bind(new_ds_id.to_string())
                .bind(import.get::<String, _>("name"))
                .bind(import.get::<String, _>("field_names"))
                .bind(now)
                .execute(&mut *tx)
                .await?;

                // Rows carry their numbers and encoded values over
                // verbatim; only the identifiers are fresh.
                let rows = sqlx::query(
                    "SELECT row_number, field_values FROM import_rows
                     WHERE import_id = ? ORDER BY seq ASC",
                )
                .bind(&old_import_id)
                .fetch_all(&mut *tx)
                .await?;

                for row in &rows {
                    sqlx::query(
                        "INSERT INTO import_rows (guid, import_id, row_number, field_values)
                         VALUES (?, ?, ?, ?)",
                    )
                    .bind(Uuid::new_v4().to_string())
                    .bind(new_import_id.to_string())
                    .bind(row.get::<i64, _>("row_number"))
                    .bind(row.get::<String, _>("field_values"))
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        tx.commit().await?;
        tracing::info!(%source_project_id, %project_id, "Copied project");
        self.events.emit(MigrationEvent::ProjectCreated {
            project_id,
            timestamp: chrono::Utc::now(),
        });
        Ok(CommandOutcome::ProjectCreated { project_id })
    }

    async fn delete_project(&self, project_id: Uuid) -> Result<CommandOutcome> {
        let mut tx = self.pool.begin().await?;
        ensure_project(&mut tx, project_id).await?;

        let id = project_id.to_string();
        // Child-first cascade inside one transaction
        sqlx::query(
            "DELETE FROM import_rows WHERE import_id IN
               (SELECT guid FROM imports WHERE data_source_id IN
                 (SELECT guid FROM data_sources WHERE project_id = ?))",
        )
        .bind(&id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM imports WHERE data_source_id IN
               (SELECT guid FROM data_sources WHERE project_id = ?)",
        )
        .bind(&id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM data_sources WHERE project_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM job_messages WHERE job_id IN
               (SELECT guid FROM jobs WHERE project_id = ?)",
        )
        .bind(&id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM jobs WHERE project_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM projects WHERE guid = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(%project_id, "Deleted project and descendants");
        self.events.emit(MigrationEvent::ProjectDeleted {
            project_id,
            timestamp: chrono::Utc::now(),
        });
        Ok(CommandOutcome::ProjectDeleted { project_id })
    }

    async fn add_data_source(
        &self,
        project_id: Uuid,
        name: String,
        source_type: String,
        config: Option<serde_json::Value>,
        seed_imports: Vec<SeedImport>,
    ) -> Result<CommandOutcome> {
        let mut tx = self.pool.begin().await?;
        ensure_project(&mut tx, project_id).await?;

        let data_source_id = Uuid::new_v4();
        let now = now_millis();
        sqlx::query(
            "INSERT INTO data_sources (guid, project_id, source_type, name, config, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(data_source_id.to_string())
        .bind(project_id.to_string())
        .bind(&source_type)
        .bind(&name)
        .bind(config.map(|v| v.to_string()))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::from_write(
                e,
                &format!("Data source '{}' ({}) already exists in project", name, source_type),
            )
        })?;

        for seed in &seed_imports {
            let import_id =
                insert_import(&mut tx, data_source_id, &seed.name, &seed.field_names, now).await?;
            insert_rows(&mut tx, import_id, 1, &seed.rows).await?;
        }

        touch_project_in_tx(&mut tx, project_id, now).await?;
        tx.commit().await?;

        tracing::info!(%project_id, %data_source_id, name, "Added data source");
        self.events.emit(MigrationEvent::DataSourceAdded {
            data_source_id,
            timestamp: chrono::Utc::now(),
        });
        Ok(CommandOutcome::DataSourceAdded { data_source_id })
    }

    async fn delete_data_source(
        &self,
        project_id: Uuid,
        data_source_id: Uuid,
    ) -> Result<CommandOutcome> {
        let mut tx = self.pool.begin().await?;

        let owner: Option<String> =
            sqlx::query_scalar("SELECT project_id FROM data_sources WHERE guid = ?")
                .bind(data_source_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        match owner {
            Some(owner) if owner == project_id.to_string() => {}
            _ => {
                return Err(Error::NotFound(format!(
                    "Data source {} in project {}",
                    data_source_id, project_id
                )))
            }
        }

        let id = data_source_id.to_string();
        sqlx::query(
            "DELETE FROM import_rows WHERE import_id IN
               (SELECT guid FROM imports WHERE data_source_id = ?)",
        )
        .bind(&id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM imports WHERE data_source_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM data_sources WHERE guid = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        touch_project_in_tx(&mut tx, project_id, now_millis()).await?;
        tx.commit().await?;

        tracing::info!(%project_id, %data_source_id, "Deleted data source");
        self.events.emit(MigrationEvent::ProjectDataSourceDeleted {
            project_id,
            data_source_id,
            timestamp: chrono::Utc::now(),
        });
        Ok(CommandOutcome::DataSourceDeleted { data_source_id })
    }

    async fn add_import(
        &self,
        data_source_id: Uuid,
        name: String,
        field_names: Vec<String>,
    ) -> Result<CommandOutcome> {
        let mut tx = self.pool.begin().await?;
        ensure_data_source(&mut tx, data_source_id).await?;

        let import_id =
            insert_import(&mut tx, data_source_id, &name, &field_names, now_millis()).await?;
        tx.commit().await?;

        tracing::info!(%data_source_id, %import_id, name, "Added import");
        Ok(CommandOutcome::ImportAdded { import_id })
    }

    async fn add_import_data(
        &self,
        import_id: Uuid,
        rows: Vec<Vec<FieldValue>>,
    ) -> Result<CommandOutcome> {
        let mut tx = self.pool.begin().await?;
        ensure_import(&mut tx, import_id).await?;

        // Numbers continue from the current maximum, read in the same
        // transaction as the inserts. Sparse numbering from earlier
        // deletes is fine; the unique index rejects collisions from a
        // concurrent batch.
        let next_number: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(row_number), 0) + 1 FROM import_rows WHERE import_id = ?",
        )
        .bind(import_id.to_string())
        .fetch_one(&mut *tx)
        .await?;

        insert_rows(&mut tx, import_id, next_number, &rows).await?;
        tx.commit().await?;

        tracing::info!(%import_id, count = rows.len(), "Appended import rows");
        Ok(CommandOutcome::ImportDataAdded {
            row_count: rows.len(),
            first_row_number: next_number,
        })
    }

    async fn delete_imports(&self, data_source_id: Uuid) -> Result<CommandOutcome> {
        let mut tx = self.pool.begin().await?;
        ensure_data_source(&mut tx, data_source_id).await?;

        let id = data_source_id.to_string();
        sqlx::query(
            "DELETE FROM import_rows WHERE import_id IN
               (SELECT guid FROM imports WHERE data_source_id = ?)",
        )
        .bind(&id)
        .execute(&mut *tx)
        .await?;
        let deleted = sqlx::query("DELETE FROM imports WHERE data_source_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        tracing::info!(%data_source_id, deleted, "Deleted imports");
        Ok(CommandOutcome::ImportsDeleted {
            import_count: deleted,
        })
    }

    async fn touch_project(&self, project_id: Uuid) -> Result<CommandOutcome> {
        let updated = sqlx::query("UPDATE projects SET updated_at = ? WHERE guid = ?")
            .bind(now_millis())
            .bind(project_id.to_string())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(Error::NotFound(format!("Project {}", project_id)));
        }
        Ok(CommandOutcome::ProjectTouched { project_id })
    }

    async fn create_import_map(
        &self,
        tenant_id: Uuid,
        name: String,
        mapping: serde_json::Value,
    ) -> Result<CommandOutcome> {
        let mut tx = self.pool.begin().await?;
        ensure_tenant(&mut tx, tenant_id).await?;

        let import_map_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO import_maps (guid, tenant_id, name, mapping, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(import_map_id.to_string())
        .bind(tenant_id.to_string())
        .bind(&name)
        .bind(mapping.to_string())
        .bind(now_millis())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::from_write(e, &format!("Import map '{}' already exists for tenant", name))
        })?;

        tx.commit().await?;
        tracing::info!(%tenant_id, %import_map_id, name, "Created import map");
        Ok(CommandOutcome::ImportMapCreated { import_map_id })
    }

    async fn create_job(&self, project_id: Uuid) -> Result<CommandOutcome> {
        let mut tx = self.pool.begin().await?;
        ensure_project(&mut tx, project_id).await?;

        // One active job per project; the partial unique index on
        // jobs(project_id) rejects a second queued/running job, so
        // concurrent creation resolves in the store. The external
        // scheduler drives the job through Running to a terminal
        // status.
        let job_id = Uuid::new_v4();
        let now = now_millis();
        sqlx::query(
            "INSERT INTO jobs (guid, project_id, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(job_id.to_string())
        .bind(project_id.to_string())
        .bind(JobStatus::Queued.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::from_write(
                e,
                &format!("Project {} already has an active job", project_id),
            )
        })?;

        tx.commit().await?;
        tracing::info!(%project_id, %job_id, "Created job");
        Ok(CommandOutcome::JobCreated { job_id })
    }

    async fn update_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<CommandOutcome> {
        let mut tx = self.pool.begin().await?;

        let started_at: Option<i64> =
            sqlx::query("SELECT started_at FROM jobs WHERE guid = ?")
                .bind(job_id.to_string())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Job {}", job_id)))?
                .get("started_at");

        let now = now_millis();
        let started_at = match status {
            JobStatus::Running => started_at.or(Some(now)),
            _ => started_at,
        };
        let finished_at = match status {
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled => Some(now),
            _ => None,
        };

        sqlx::query(
            "UPDATE jobs SET status = ?, updated_at = ?, started_at = ?, finished_at = ?
             WHERE guid = ?",
        )
        .bind(status.as_str())
        .bind(now)
        .bind(started_at)
        .bind(finished_at)
        .bind(job_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::from_write(
                e,
                &format!("Another job is already active for the project of job {}", job_id),
            )
        })?;

        tx.commit().await?;
        tracing::debug!(%job_id, status = status.as_str(), "Updated job status");
        Ok(CommandOutcome::JobUpdated { job_id })
    }

    async fn add_job_message(
        &self,
        job_id: Uuid,
        severity: MessageSeverity,
        message: String,
    ) -> Result<CommandOutcome> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM jobs WHERE guid = ?")
            .bind(job_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("Job {}", job_id)));
        }

        let message_id = Uuid::new_v4();
        let now = now_millis();
        sqlx::query(
            "INSERT INTO job_messages (guid, job_id, severity, message, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(message_id.to_string())
        .bind(job_id.to_string())
        .bind(severity.as_str())
        .bind(&message)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE jobs SET updated_at = ? WHERE guid = ?")
            .bind(now)
            .bind(job_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(CommandOutcome::JobMessageAdded { message_id })
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

async fn ensure_tenant(tx: &mut Transaction<'_, Sqlite>, tenant_id: Uuid) -> Result<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM tenants WHERE guid = ?")
        .bind(tenant_id.to_string())
        .fetch_optional(&mut **tx)
        .await?;
    if exists.is_none() {
        return Err(Error::NotFound(format!("Tenant {}", tenant_id)));
    }
    Ok(())
}

async fn ensure_project(tx: &mut Transaction<'_, Sqlite>, project_id: Uuid) -> Result<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM projects WHERE guid = ?")
        .bind(project_id.to_string())
        .fetch_optional(&mut **tx)
        .await?;
    if exists.is_none() {
        return Err(Error::NotFound(format!("Project {}", project_id)));
    }
    Ok(())
}

async fn ensure_data_source(tx: &mut Transaction<'_, Sqlite>, data_source_id: Uuid) -> Result<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM data_sources WHERE guid = ?")
        .bind(data_source_id.to_string())
        .fetch_optional(&mut **tx)
        .await?;
    if exists.is_none() {
        return Err(Error::NotFound(format!("Data source {}", data_source_id)));
    }
    Ok(())
}

async fn touch_project_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    project_id: Uuid,
    now: i64,
) -> Result<()> {
    sqlx::query("UPDATE projects SET updated_at = ? WHERE guid = ?")
        .bind(now)
        .bind(project_id.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn ensure_import(tx: &mut Transaction<'_, Sqlite>, import_id: Uuid) -> Result<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM imports WHERE guid = ?")
        .bind(import_id.to_string())
        .fetch_optional(&mut **tx)
        .await?;
    if exists.is_none() {
        return Err(Error::NotFound(format!("Import {}", import_id)));
    }
    Ok(())
}

async fn insert_import(
    tx: &mut Transaction<'_, Sqlite>,
    data_source_id: Uuid,
    name: &str,
    field_names: &[String],
    now: i64,
) -> Result<Uuid> {
    let import_id = Uuid::new_v4();
    let field_names_json = serde_json::to_string(field_names)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    sqlx::query(
        "INSERT INTO imports (guid, data_source_id, name, field_names, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(import_id.to_string())
    .bind(data_source_id.to_string())
    .bind(name)
    .bind(field_names_json)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        Error::from_write(e, &format!("Import '{}' already exists in data source", name))
    })?;
    Ok(import_id)
}

async fn insert_rows(
    tx: &mut Transaction<'_, Sqlite>,
    import_id: Uuid,
    start_number: i64,
    rows: &[Vec<FieldValue>],
) -> Result<()> {
    for (i, values) in rows.iter().enumerate() {
        let blob = encode_row(values)?;
        let row_number = start_number + i as i64;
        sqlx::query(
            "INSERT INTO import_rows (guid, import_id, row_number, field_values)
             VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(import_id.to_string())
        .bind(row_number)
        .bind(blob)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            Error::from_write(
                e,
                &format!("Row number {} already exists in import", row_number),
            )
        })?;
    }
    Ok(())
}
