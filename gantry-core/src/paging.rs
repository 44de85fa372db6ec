//! Import batch paging engine
//!
//! Materializes bounded, ordered windows of an import's rows. One
//! [`ImportPager`] is bound to exactly one import for its lifetime and
//! owns its own cached total row count; independent pagers over the
//! same import never share state.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::queries::{count_import_rows, parse_guid};
use crate::value::{decode_row, FieldValue};
use crate::{Error, Result};

/// Ceiling on rows requested from the store in a single round-trip.
/// Larger caller windows are assembled from multiple bounded fetches.
pub const MAX_FETCH_ROWS: i64 = 500;

/// Advisory chunk size for downstream consumers batching their own
/// processing of a page. A policy constant, not a structural limit.
pub const SUGGESTED_CHUNK: usize = 100;

/// Non-owning back-reference to one persisted row, sufficient to
/// re-fetch or resume at that row without re-paging from the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRef {
    pub import_id: Uuid,
    pub row_id: Uuid,
    pub row_number: i64,
}

/// One materialized row: decoded values plus its back-reference.
#[derive(Debug, Clone)]
pub struct MaterializedRow {
    pub values: Vec<FieldValue>,
    pub source: RowRef,
}

/// A bounded, ordered window of materialized rows.
#[derive(Debug, Clone)]
pub struct RowPage {
    pub rows: Vec<MaterializedRow>,
    /// Total rows in the import as of this pager's first use.
    pub total_count: i64,
    /// Effective (clamped) offset this page started at.
    pub offset: i64,
}

/// Paging engine bound to one import.
pub struct ImportPager {
    pool: SqlitePool,
    import_id: Uuid,
    // Computed once on first use and kept for this instance's lifetime.
    // Intentionally stale-tolerant: concurrent writers to the import
    // are invisible to an existing pager, so repeated get_page calls
    // report a stable total while a migration run is in flight.
    total_count: Option<i64>,
}

impl ImportPager {
    pub fn new(pool: SqlitePool, import_id: Uuid) -> Self {
        Self {
            pool,
            import_id,
            total_count: None,
        }
    }

    pub fn import_id(&self) -> Uuid {
        self.import_id
    }

    /// Total row count of the bound import, computed on first call and
    /// cached for this instance's lifetime.
    pub async fn total_count(&mut self) -> Result<i64> {
        if let Some(count) = self.total_count {
            return Ok(count);
        }
        let count = count_import_rows(&self.pool, self.import_id).await?;
        tracing::debug!(import_id = %self.import_id, count, "Cached import row count");
        self.total_count = Some(count);
        Ok(count)
    }

    /// Fetch one window of materialized rows.
    ///
    /// `offset <= 0` starts from the first row; `limit <= 0` returns
    /// all remaining rows from the offset. Ordering is by insertion
    /// identity ascending, so pagination stays deterministic even when
    /// row numbers are sparse or edited. A window past the end of the
    /// import yields an empty page, not an error.
    ///
    /// Any decode failure aborts the whole page with
    /// [`Error::Serialization`]; partial pages are never returned.
    pub async fn get_page(&mut self, offset: i64, limit: i64) -> Result<RowPage> {
        let total_count = self.total_count().await?;
        let offset = offset.max(0);

        let mut remaining = if limit <= 0 { i64::MAX } else { limit };
        let mut cursor = offset;
        let mut rows: Vec<MaterializedRow> = Vec::new();

        loop {
            let chunk = remaining.min(MAX_FETCH_ROWS);
            let fetched = sqlx::query(
                "SELECT guid, row_number, field_values
                 FROM import_rows
                 WHERE import_id = ?
                 ORDER BY seq ASC
                 LIMIT ? OFFSET ?",
            )
            .bind(self.import_id.to_string())
            .bind(chunk)
            .bind(cursor)
            .fetch_all(&self.pool)
            .await?;

            let fetched_len = fetched.len() as i64;
            tracing::debug!(
                import_id = %self.import_id,
                cursor,
                fetched = fetched_len,
                "Fetched page chunk"
            );

            for row in &fetched {
                let guid: String = row.get("guid");
                let row_number: i64 = row.get("row_number");
                let blob: String = row.get("field_values");

                let values = decode_row(&blob).map_err(|e| {
                    let detail = match e {
                        Error::Serialization(msg) => msg,
                        other => other.to_string(),
                    };
                    Error::Serialization(format!(
                        "Row {} of import {}: {}",
                        row_number, self.import_id, detail
                    ))
                })?;

                rows.push(MaterializedRow {
                    values,
                    source: RowRef {
                        import_id: self.import_id,
                        row_id: parse_guid(&guid)?,
                        row_number,
                    },
                });
            }

            remaining -= fetched_len;
            cursor += fetched_len;

            // Short chunk means the import is exhausted
            if fetched_len < chunk || remaining == 0 {
                break;
            }
        }

        Ok(RowPage {
            rows,
            total_count,
            offset,
        })
    }
}
