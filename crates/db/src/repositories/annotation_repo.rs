//! Repository for the `annotations` table.
//!
//! Also hosts the label/concept aggregations, which unwind the
//! `concept_ids` arrays of annotations joined to their objects.

use glossa_core::annotation::NewAnnotation;
use glossa_core::types::DbId;
use sqlx::PgPool;

use crate::models::aggregate::ConceptCountRow;
use crate::models::annotation::AnnotationRow;

/// Column list for `annotations` queries.
const COLUMNS: &str = "\
    id, object_id, text, tokens, concept_mask, concept_ids, \
    created_by, created_at, updated_at";

/// Provides CRUD operations and concept aggregations for annotations.
pub struct AnnotationRepo;

impl AnnotationRepo {
    /// Insert annotations under one object, in order, in one transaction.
    pub async fn create_many(
        pool: &PgPool,
        object_id: DbId,
        inputs: &[NewAnnotation],
    ) -> Result<Vec<AnnotationRow>, sqlx::Error> {
        let query = format!(
            "INSERT INTO annotations \
                 (object_id, text, tokens, concept_mask, concept_ids, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        let mut tx = pool.begin().await?;
        let mut out = Vec::with_capacity(inputs.len());
        for input in inputs {
            let row = sqlx::query_as::<_, AnnotationRow>(&query)
                .bind(object_id)
                .bind(&input.text)
                .bind(&input.tokens)
                .bind(input.concept_mask.as_slice())
                .bind(&input.concept_ids)
                .bind(input.created_by)
                .fetch_one(&mut *tx)
                .await?;
            out.push(row);
        }
        tx.commit().await?;
        Ok(out)
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<AnnotationRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM annotations WHERE id = $1");
        sqlx::query_as::<_, AnnotationRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Replace the concept mask and concept ids together.
    pub async fn update_concepts(
        pool: &PgPool,
        id: DbId,
        concept_mask: &[i32],
        concept_ids: &[DbId],
    ) -> Result<Option<AnnotationRow>, sqlx::Error> {
        let query = format!(
            "UPDATE annotations SET concept_mask = $2, concept_ids = $3 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AnnotationRow>(&query)
            .bind(id)
            .bind(concept_mask)
            .bind(concept_ids)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: DbId) -> Result<Option<AnnotationRow>, sqlx::Error> {
        let query = format!("DELETE FROM annotations WHERE id = $1 RETURNING {COLUMNS}");
        sqlx::query_as::<_, AnnotationRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Occurrences of each concept across annotations of objects labelled
    /// `label_id`, one per array element.
    pub async fn count_label_concepts(pool: &PgPool, label_id: DbId) -> Result<Vec<ConceptCountRow>, sqlx::Error> {
        sqlx::query_as::<_, ConceptCountRow>(
            "SELECT c.concept_id, COUNT(*) AS count \
             FROM annotations a \
             JOIN objects o ON o.id = a.object_id \
             CROSS JOIN LATERAL unnest(a.concept_ids) AS c(concept_id) \
             WHERE o.label_id = $1 \
             GROUP BY c.concept_id \
             ORDER BY c.concept_id",
        )
        .bind(label_id)
        .fetch_all(pool)
        .await
    }

    /// Distinct `(concept_id, label_id)` pairs for the given concepts.
    pub async fn concept_labels(pool: &PgPool, concept_ids: &[DbId]) -> Result<Vec<(DbId, DbId)>, sqlx::Error> {
        sqlx::query_as::<_, (DbId, DbId)>(
            "SELECT DISTINCT c.concept_id, o.label_id \
             FROM annotations a \
             JOIN objects o ON o.id = a.object_id \
             CROSS JOIN LATERAL unnest(a.concept_ids) AS c(concept_id) \
             WHERE c.concept_id = ANY($1) \
             ORDER BY c.concept_id, o.label_id",
        )
        .bind(concept_ids)
        .fetch_all(pool)
        .await
    }
}
