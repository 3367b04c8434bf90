//! Corpus word rows.

use glossa_core::corpus::CorpusWord;
use glossa_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `corpus_words` table.
#[derive(Debug, Clone, FromRow)]
pub struct CorpusWordRow {
    pub id: DbId,
    pub lemma_index: i64,
    pub surface: String,
    pub lemma: String,
    pub is_noun: bool,
    pub created_at: Timestamp,
}

impl From<CorpusWordRow> for CorpusWord {
    fn from(row: CorpusWordRow) -> Self {
        Self {
            id: row.id,
            lemma_index: row.lemma_index,
            surface: row.surface,
            lemma: row.lemma,
            is_noun: row.is_noun,
            created_at: row.created_at,
        }
    }
}
