//! Repository for the `labels` and `categories` tables.

use glossa_core::label::NewLabel;
use glossa_core::types::DbId;
use sqlx::PgPool;

use crate::models::label::{CategoryRow, LabelRow};

/// Column list for `labels` queries.
const COLUMNS: &str = "\
    id, label_index, name, name_tokens, token_lemma_indices, categories, created_at";

/// Column list for `categories` queries.
const CATEGORY_COLUMNS: &str = "id, name, tokens, label_indices";

/// Provides CRUD operations for labels and their categories.
pub struct LabelRepo;

impl LabelRepo {
    /// Insert a label and register it with each of its categories,
    /// creating categories on demand.
    ///
    /// A duplicate name fails with a unique violation on `uq_labels_name`.
    pub async fn create(pool: &PgPool, input: &NewLabel) -> Result<LabelRow, sqlx::Error> {
        let category_names: Vec<String> = input.categories.iter().map(|(name, _)| name.clone()).collect();
        let query = format!(
            "INSERT INTO labels \
                 (label_index, name, name_tokens, token_lemma_indices, categories) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;
        let label = sqlx::query_as::<_, LabelRow>(&query)
            .bind(input.label_index)
            .bind(&input.name)
            .bind(&input.name_tokens)
            .bind(&input.token_lemma_indices)
            .bind(&category_names)
            .fetch_one(&mut *tx)
            .await?;

        for (name, tokens) in &input.categories {
            sqlx::query(
                "INSERT INTO categories (name, tokens, label_indices) \
                 VALUES ($1, $2, ARRAY[$3::BIGINT]) \
                 ON CONFLICT ON CONSTRAINT uq_categories_name DO UPDATE SET \
                     label_indices = CASE \
                         WHEN $3 = ANY(categories.label_indices) THEN categories.label_indices \
                         ELSE array_append(categories.label_indices, $3) \
                     END",
            )
            .bind(name)
            .bind(tokens)
            .bind(input.label_index)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(label)
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<LabelRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM labels WHERE id = $1");
        sqlx::query_as::<_, LabelRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Names are stored lowercased; `name` must already be lowercased.
    pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<LabelRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM labels WHERE name = $1");
        sqlx::query_as::<_, LabelRow>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM labels")
            .fetch_one(pool)
            .await
    }

    pub async fn find_category(pool: &PgPool, name: &str) -> Result<Option<CategoryRow>, sqlx::Error> {
        let query = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE name = $1");
        sqlx::query_as::<_, CategoryRow>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }
}
