//! Work entry rows.

use glossa_core::sampler::WorkEntry;
use glossa_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `work_entries` table.
#[derive(Debug, Clone, FromRow)]
pub struct WorkEntryRow {
    pub id: DbId,
    pub worker_id: DbId,
    pub doc_id: DbId,
    pub project_id: DbId,
    pub is_finished: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<WorkEntryRow> for WorkEntry {
    fn from(row: WorkEntryRow) -> Self {
        Self {
            id: row.id,
            worker_id: row.worker_id,
            doc_id: row.doc_id,
            project_id: row.project_id,
            is_finished: row.is_finished,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
