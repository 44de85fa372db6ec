//! Entity models for the migration hierarchy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top-level isolation boundary owning projects and import maps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub guid: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A migration effort with a permanent client-assigned identifier
///
/// The guid is generated by the command issuer and never regenerated or
/// replaced by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub guid: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: String,
    pub project_info: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named, typed source-system connection within a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub guid: Uuid,
    pub project_id: Uuid,
    pub source_type: String,
    pub name: String,
    pub config: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A named row-set within a data source, with declared field names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Import {
    pub guid: Uuid,
    pub data_source_id: Uuid,
    pub name: String,
    pub field_names: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A project plus its direct children, for eager single-project reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDetail {
    pub project: Project,
    pub data_sources: Vec<DataSource>,
}

/// A data source plus its imports, for eager single-source reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceDetail {
    pub data_source: DataSource,
    pub imports: Vec<Import>,
}

/// Job execution status, driven by an external scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// Queued and Running jobs count against the one-active-job-per-
    /// project policy.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

/// Passive bookkeeping record tracking an external execution's status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub guid: Uuid,
    pub project_id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Severity of a job diagnostic message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageSeverity {
    Info,
    Warning,
    Error,
}

impl MessageSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSeverity::Info => "info",
            MessageSeverity::Warning => "warning",
            MessageSeverity::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(MessageSeverity::Info),
            "warning" => Some(MessageSeverity::Warning),
            "error" => Some(MessageSeverity::Error),
            _ => None,
        }
    }
}

/// One diagnostic line attached to a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub guid: Uuid,
    pub job_id: Uuid,
    pub severity: MessageSeverity,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Tenant-scoped, named mapping definition for an import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportMap {
    pub guid: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub mapping: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
