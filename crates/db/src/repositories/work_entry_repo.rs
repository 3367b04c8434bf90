//! Repository for the `work_entries` table.

use glossa_core::sampler::NewWorkEntry;
use glossa_core::types::DbId;
use sqlx::PgPool;

use crate::models::work_entry::WorkEntryRow;

/// Column list for `work_entries` queries.
const COLUMNS: &str = "\
    id, worker_id, doc_id, project_id, is_finished, created_at, updated_at";

/// Provides upsert and history queries for worker claims.
pub struct WorkEntryRepo;

impl WorkEntryRepo {
    /// Insert the entry, or update the existing one for the same
    /// `(worker_id, doc_id)`.
    pub async fn upsert(pool: &PgPool, input: &NewWorkEntry) -> Result<WorkEntryRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO work_entries (worker_id, doc_id, project_id, is_finished) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT ON CONSTRAINT uq_work_entries_worker_doc DO UPDATE SET \
                 project_id  = EXCLUDED.project_id, \
                 is_finished = EXCLUDED.is_finished \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkEntryRow>(&query)
            .bind(input.worker_id)
            .bind(input.doc_id)
            .bind(input.project_id)
            .bind(input.is_finished)
            .fetch_one(pool)
            .await
    }

    /// Documents of the project the worker has an entry for.
    pub async fn doc_ids_for_worker(
        pool: &PgPool,
        worker_id: DbId,
        project_id: DbId,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT doc_id FROM work_entries \
             WHERE worker_id = $1 AND project_id = $2 \
             ORDER BY id",
        )
        .bind(worker_id)
        .bind(project_id)
        .fetch_all(pool)
        .await
    }
}
