//! Annotation rows.

use glossa_core::annotation::Annotation;
use glossa_core::concept_mask::ConceptMask;
use glossa_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `annotations` table.
#[derive(Debug, Clone, FromRow)]
pub struct AnnotationRow {
    pub id: DbId,
    pub object_id: DbId,
    pub text: String,
    pub tokens: Vec<String>,
    pub concept_mask: Vec<i32>,
    pub concept_ids: Vec<DbId>,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<AnnotationRow> for Annotation {
    fn from(row: AnnotationRow) -> Self {
        Self {
            id: row.id,
            object_id: row.object_id,
            text: row.text,
            tokens: row.tokens,
            concept_mask: ConceptMask::from_cells(row.concept_mask),
            concept_ids: row.concept_ids,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
