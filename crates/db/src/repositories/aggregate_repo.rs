//! Repository for `aggregate_states` and the cached statistic tables.
//!
//! Every `save_*` replaces the cached data and records the computation in
//! the same transaction. A scope only becomes valid again when its
//! `generation` still matches the one read before the recompute started.
//! Marking stale bumps the generation; `computed_at` keeps the time of the
//! last computation.

use glossa_core::stats::{
    AggregateKind, ConceptCount, ConceptOccurrence, ConceptScore, ImagePriority, ProjectProgress, RecomputeStamp,
};
use glossa_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::aggregate::{
    AggregateStateRow, ConceptCountRow, ConceptOccurrenceRow, ConceptScoreRow, ImagePriorityRow,
    ProjectProgressRow,
};

/// Provides state tracking and load/save for cached aggregates.
pub struct AggregateRepo;

impl AggregateRepo {
    // -- state ---------------------------------------------------------------

    pub async fn states(
        pool: &PgPool,
        kind: &str,
        scope_ids: &[DbId],
    ) -> Result<Vec<AggregateStateRow>, sqlx::Error> {
        sqlx::query_as::<_, AggregateStateRow>(
            "SELECT scope_id, is_valid, generation, computed_at FROM aggregate_states \
             WHERE kind = $1 AND scope_id = ANY($2) \
             ORDER BY scope_id",
        )
        .bind(kind)
        .bind(scope_ids)
        .fetch_all(pool)
        .await
    }

    /// Invalidate the given scopes, creating their state rows when missing.
    /// Returns the number of distinct scopes marked.
    pub async fn mark_stale(pool: &PgPool, kind: &str, scope_ids: &[DbId]) -> Result<u64, sqlx::Error> {
        let mut ids = scope_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let result = sqlx::query(
            "INSERT INTO aggregate_states (kind, scope_id, is_valid, generation) \
             SELECT $1, t.scope_id, FALSE, 1 FROM unnest($2::BIGINT[]) AS t(scope_id) \
             ON CONFLICT ON CONSTRAINT uq_aggregate_states_kind_scope DO UPDATE SET \
                 is_valid   = FALSE, \
                 generation = aggregate_states.generation + 1",
        )
        .bind(kind)
        .bind(&ids)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Invalidate every existing state row of `kind`.
    pub async fn mark_kind_stale(pool: &PgPool, kind: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE aggregate_states SET is_valid = FALSE, generation = generation + 1 \
             WHERE kind = $1",
        )
        .bind(kind)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Record a finished computation. Each row is valid only if nothing
    /// invalidated it after `stamp` was taken.
    async fn record_computed(
        conn: &mut PgConnection,
        kind: &str,
        scope_ids: &[DbId],
        stamp: &RecomputeStamp,
    ) -> Result<(), sqlx::Error> {
        let mut ids = scope_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let generations: Vec<i64> = ids.iter().map(|&id| stamp.generation(id)).collect();
        sqlx::query(
            "INSERT INTO aggregate_states (kind, scope_id, is_valid, generation, computed_at) \
             SELECT $1, t.scope_id, (t.generation = 0), t.generation, $4 \
             FROM unnest($2::BIGINT[], $3::BIGINT[]) AS t(scope_id, generation) \
             ON CONFLICT ON CONSTRAINT uq_aggregate_states_kind_scope DO UPDATE SET \
                 is_valid    = (aggregate_states.generation = EXCLUDED.generation), \
                 computed_at = EXCLUDED.computed_at",
        )
        .bind(kind)
        .bind(&ids)
        .bind(&generations)
        .bind(stamp.started_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    // -- concept label counts ------------------------------------------------

    /// Counts of a label, most frequent first.
    pub async fn load_label_counts(pool: &PgPool, label_id: DbId) -> Result<Vec<ConceptCountRow>, sqlx::Error> {
        sqlx::query_as::<_, ConceptCountRow>(
            "SELECT concept_id, count FROM concept_label_counts \
             WHERE label_id = $1 \
             ORDER BY count DESC, concept_id ASC",
        )
        .bind(label_id)
        .fetch_all(pool)
        .await
    }

    pub async fn save_label_counts(
        pool: &PgPool,
        label_id: DbId,
        counts: &[ConceptCount],
        stamp: &RecomputeStamp,
    ) -> Result<(), sqlx::Error> {
        let concept_ids: Vec<DbId> = counts.iter().map(|c| c.concept_id).collect();
        let values: Vec<i64> = counts.iter().map(|c| c.count).collect();

        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM concept_label_counts WHERE label_id = $1")
            .bind(label_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO concept_label_counts (label_id, concept_id, count) \
             SELECT $1, t.concept_id, t.count \
             FROM unnest($2::BIGINT[], $3::BIGINT[]) AS t(concept_id, count)",
        )
        .bind(label_id)
        .bind(&concept_ids)
        .bind(&values)
        .execute(&mut *tx)
        .await?;
        Self::record_computed(&mut *tx, AggregateKind::ConceptLabelCount.as_str(), &[label_id], stamp).await?;
        tx.commit().await
    }

    // -- concept occurrences -------------------------------------------------

    pub async fn load_occurrences(
        pool: &PgPool,
        concept_ids: &[DbId],
    ) -> Result<Vec<ConceptOccurrenceRow>, sqlx::Error> {
        sqlx::query_as::<_, ConceptOccurrenceRow>(
            "SELECT concept_id, num_labels FROM concept_occurrences \
             WHERE concept_id = ANY($1) \
             ORDER BY concept_id",
        )
        .bind(concept_ids)
        .fetch_all(pool)
        .await
    }

    /// Upsert occurrences. Rows for concepts that no longer exist are
    /// skipped.
    pub async fn save_occurrences(
        pool: &PgPool,
        occurrences: &[ConceptOccurrence],
        stamp: &RecomputeStamp,
    ) -> Result<(), sqlx::Error> {
        let concept_ids: Vec<DbId> = occurrences.iter().map(|o| o.concept_id).collect();
        let values: Vec<i64> = occurrences.iter().map(|o| o.num_labels).collect();

        let mut tx = pool.begin().await?;
        sqlx::query(
            "INSERT INTO concept_occurrences (concept_id, num_labels) \
             SELECT DISTINCT ON (t.concept_id) t.concept_id, t.num_labels \
             FROM unnest($1::BIGINT[], $2::BIGINT[]) AS t(concept_id, num_labels) \
             WHERE EXISTS (SELECT 1 FROM concepts c WHERE c.id = t.concept_id) \
             ON CONFLICT ON CONSTRAINT uq_concept_occurrences_concept DO UPDATE SET \
                 num_labels = EXCLUDED.num_labels",
        )
        .bind(&concept_ids)
        .bind(&values)
        .execute(&mut *tx)
        .await?;
        Self::record_computed(&mut *tx, AggregateKind::ConceptOccurrence.as_str(), &concept_ids, stamp).await?;
        tx.commit().await
    }

    // -- TF-IDF ----------------------------------------------------------------

    /// One page of a label's ranking, highest score first.
    pub async fn load_tf_idf(
        pool: &PgPool,
        label_id: DbId,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ConceptScoreRow>, sqlx::Error> {
        sqlx::query_as::<_, ConceptScoreRow>(
            "SELECT concept_id, count, tf_idf FROM concept_tf_idf \
             WHERE label_id = $1 \
             ORDER BY tf_idf DESC, concept_id ASC \
             OFFSET $2 LIMIT $3",
        )
        .bind(label_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn save_tf_idf(
        pool: &PgPool,
        label_id: DbId,
        scores: &[ConceptScore],
        stamp: &RecomputeStamp,
    ) -> Result<(), sqlx::Error> {
        let concept_ids: Vec<DbId> = scores.iter().map(|s| s.concept_id).collect();
        let counts: Vec<i64> = scores.iter().map(|s| s.count).collect();
        let values: Vec<f64> = scores.iter().map(|s| s.tf_idf).collect();

        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM concept_tf_idf WHERE label_id = $1")
            .bind(label_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO concept_tf_idf (label_id, concept_id, count, tf_idf) \
             SELECT $1, t.concept_id, t.count, t.tf_idf \
             FROM unnest($2::BIGINT[], $3::BIGINT[], $4::DOUBLE PRECISION[]) \
                 AS t(concept_id, count, tf_idf)",
        )
        .bind(label_id)
        .bind(&concept_ids)
        .bind(&counts)
        .bind(&values)
        .execute(&mut *tx)
        .await?;
        Self::record_computed(&mut *tx, AggregateKind::ConceptTfIdf.as_str(), &[label_id], stamp).await?;
        tx.commit().await
    }

    // -- image priorities ------------------------------------------------------

    pub async fn load_image_priorities(
        pool: &PgPool,
        image_ids: &[DbId],
    ) -> Result<Vec<ImagePriorityRow>, sqlx::Error> {
        sqlx::query_as::<_, ImagePriorityRow>(
            "SELECT image_id, priority FROM image_priorities \
             WHERE image_id = ANY($1) \
             ORDER BY image_id",
        )
        .bind(image_ids)
        .fetch_all(pool)
        .await
    }

    /// Upsert priorities. Rows for images that no longer exist are skipped.
    pub async fn save_image_priorities(
        pool: &PgPool,
        priorities: &[ImagePriority],
        stamp: &RecomputeStamp,
    ) -> Result<(), sqlx::Error> {
        let image_ids: Vec<DbId> = priorities.iter().map(|p| p.image_id).collect();
        let values: Vec<f64> = priorities.iter().map(|p| p.priority).collect();

        let mut tx = pool.begin().await?;
        sqlx::query(
            "INSERT INTO image_priorities (image_id, priority) \
             SELECT DISTINCT ON (t.image_id) t.image_id, t.priority \
             FROM unnest($1::BIGINT[], $2::DOUBLE PRECISION[]) AS t(image_id, priority) \
             WHERE EXISTS (SELECT 1 FROM images i WHERE i.id = t.image_id) \
             ON CONFLICT ON CONSTRAINT uq_image_priorities_image DO UPDATE SET \
                 priority = EXCLUDED.priority",
        )
        .bind(&image_ids)
        .bind(&values)
        .execute(&mut *tx)
        .await?;
        Self::record_computed(&mut *tx, AggregateKind::ImagePriority.as_str(), &image_ids, stamp).await?;
        tx.commit().await
    }

    // -- project progress ------------------------------------------------------

    pub async fn load_project_progress(
        pool: &PgPool,
        project_id: DbId,
    ) -> Result<Option<ProjectProgressRow>, sqlx::Error> {
        sqlx::query_as::<_, ProjectProgressRow>(
            "SELECT project_id, num_docs, total_prio, progress FROM project_progress \
             WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn save_project_progress(
        pool: &PgPool,
        progress: &ProjectProgress,
        stamp: &RecomputeStamp,
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query(
            "INSERT INTO project_progress (project_id, num_docs, total_prio, progress) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT ON CONSTRAINT uq_project_progress_project DO UPDATE SET \
                 num_docs   = EXCLUDED.num_docs, \
                 total_prio = EXCLUDED.total_prio, \
                 progress   = EXCLUDED.progress",
        )
        .bind(progress.project_id)
        .bind(progress.num_docs)
        .bind(progress.total_prio)
        .bind(progress.progress)
        .execute(&mut *tx)
        .await?;
        Self::record_computed(&mut *tx, AggregateKind::ProjectProgress.as_str(), &[progress.project_id], stamp).await?;
        tx.commit().await
    }
}
