//! Repository for the `concepts` table.

use glossa_core::concept::NewConcept;
use glossa_core::types::DbId;
use sqlx::PgPool;

use crate::models::concept::{ConceptMatchRow, ConceptRow};

/// Column list for `concepts` queries.
const COLUMNS: &str = "\
    id, key, lemma_indices, word_ids, surfaces, \
    noun_count, root_noun_id, filter_index, created_at";

/// Provides lookup, keyed insertion and overlap search of concepts.
pub struct ConceptRepo;

impl ConceptRepo {
    pub async fn find_by_keys(pool: &PgPool, keys: &[String]) -> Result<Vec<ConceptRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM concepts WHERE key = ANY($1) ORDER BY id");
        sqlx::query_as::<_, ConceptRow>(&query)
            .bind(keys)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_ids(pool: &PgPool, ids: &[DbId]) -> Result<Vec<ConceptRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM concepts WHERE id = ANY($1) ORDER BY id");
        sqlx::query_as::<_, ConceptRow>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Insert concepts in order, returning each stored row and whether
    /// this call created it. A key collision resolves to the existing row.
    pub async fn insert_many(
        pool: &PgPool,
        concepts: &[NewConcept],
    ) -> Result<Vec<(ConceptRow, bool)>, sqlx::Error> {
        let insert = format!(
            "INSERT INTO concepts \
                 (key, lemma_indices, word_ids, surfaces, noun_count, root_noun_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT ON CONSTRAINT uq_concepts_key DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let select = format!("SELECT {COLUMNS} FROM concepts WHERE key = $1");

        let mut tx = pool.begin().await?;
        let mut out = Vec::with_capacity(concepts.len());
        for concept in concepts {
            let inserted = sqlx::query_as::<_, ConceptRow>(&insert)
                .bind(&concept.key)
                .bind(&concept.lemma_indices)
                .bind(&concept.word_ids)
                .bind(&concept.surfaces)
                .bind(concept.noun_count)
                .bind(concept.root_noun_id)
                .fetch_optional(&mut *tx)
                .await?;
            let resolved = match inserted {
                Some(row) => (row, true),
                None => {
                    let row = sqlx::query_as::<_, ConceptRow>(&select)
                        .bind(&concept.key)
                        .fetch_one(&mut *tx)
                        .await?;
                    (row, false)
                }
            };
            out.push(resolved);
        }
        tx.commit().await?;
        Ok(out)
    }

    /// Concepts sharing at least one of `lemma_indices`, ordered by the
    /// number shared (descending) then id.
    pub async fn find_overlapping(
        pool: &PgPool,
        lemma_indices: &[i64],
        limit: i64,
    ) -> Result<Vec<ConceptMatchRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS}, \
                 (SELECT COUNT(*) FROM unnest(lemma_indices) AS li WHERE li = ANY($1)) AS matches \
             FROM concepts \
             WHERE lemma_indices && $1 \
             ORDER BY matches DESC, id ASC \
             LIMIT $2"
        );
        sqlx::query_as::<_, ConceptMatchRow>(&query)
            .bind(lemma_indices)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
