//! Label and category rows.

use glossa_core::label::{Category, Label};
use glossa_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `labels` table.
#[derive(Debug, Clone, FromRow)]
pub struct LabelRow {
    pub id: DbId,
    pub label_index: i64,
    pub name: String,
    pub name_tokens: Vec<String>,
    pub token_lemma_indices: Vec<i64>,
    pub categories: Vec<String>,
    pub created_at: Timestamp,
}

impl From<LabelRow> for Label {
    fn from(row: LabelRow) -> Self {
        Self {
            id: row.id,
            label_index: row.label_index,
            name: row.name,
            name_tokens: row.name_tokens,
            token_lemma_indices: row.token_lemma_indices,
            categories: row.categories,
            created_at: row.created_at,
        }
    }
}

/// A row from the `categories` table. Categories are addressed by name.
#[derive(Debug, Clone, FromRow)]
pub struct CategoryRow {
    pub id: DbId,
    pub name: String,
    pub tokens: Vec<String>,
    pub label_indices: Vec<i64>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.name,
            tokens: row.tokens,
            label_indices: row.label_indices,
        }
    }
}
