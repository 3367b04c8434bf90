//! Concept rows.

use glossa_core::concept::{Concept, ConceptMatch};
use glossa_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `concepts` table.
#[derive(Debug, Clone, FromRow)]
pub struct ConceptRow {
    pub id: DbId,
    pub key: String,
    pub lemma_indices: Vec<i64>,
    pub word_ids: Vec<DbId>,
    pub surfaces: Vec<String>,
    pub noun_count: i32,
    pub root_noun_id: DbId,
    pub filter_index: Option<i32>,
    pub created_at: Timestamp,
}

impl From<ConceptRow> for Concept {
    fn from(row: ConceptRow) -> Self {
        Self {
            id: row.id,
            key: row.key,
            lemma_indices: row.lemma_indices,
            word_ids: row.word_ids,
            surfaces: row.surfaces,
            noun_count: row.noun_count,
            root_noun_id: row.root_noun_id,
            filter_index: row.filter_index,
            created_at: row.created_at,
        }
    }
}

/// A concept with the number of query lemma indices it contains.
#[derive(Debug, Clone, FromRow)]
pub struct ConceptMatchRow {
    #[sqlx(flatten)]
    pub concept: ConceptRow,
    pub matches: i64,
}

impl From<ConceptMatchRow> for ConceptMatch {
    fn from(row: ConceptMatchRow) -> Self {
        Self {
            concept: row.concept.into(),
            matches: row.matches,
        }
    }
}
