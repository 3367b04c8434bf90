//! Aggregate state and cached statistic rows.

use glossa_core::stats::{
    AggregateKind, AggregateState, ConceptCount, ConceptOccurrence, ConceptScore, ImagePriority,
    ProjectProgress,
};
use glossa_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `aggregate_states` table, minus the kind it was
/// queried by.
#[derive(Debug, Clone, FromRow)]
pub struct AggregateStateRow {
    pub scope_id: DbId,
    pub is_valid: bool,
    pub generation: i64,
    pub computed_at: Timestamp,
}

impl AggregateStateRow {
    pub fn into_state(self, kind: AggregateKind) -> AggregateState {
        AggregateState {
            kind,
            scope_id: self.scope_id,
            is_valid: self.is_valid,
            generation: self.generation,
            updated_at: self.computed_at,
        }
    }
}

#[derive(Debug, Clone, Copy, FromRow)]
pub struct ConceptCountRow {
    pub concept_id: DbId,
    pub count: i64,
}

impl From<ConceptCountRow> for ConceptCount {
    fn from(row: ConceptCountRow) -> Self {
        Self {
            concept_id: row.concept_id,
            count: row.count,
        }
    }
}

#[derive(Debug, Clone, Copy, FromRow)]
pub struct ConceptOccurrenceRow {
    pub concept_id: DbId,
    pub num_labels: i64,
}

impl From<ConceptOccurrenceRow> for ConceptOccurrence {
    fn from(row: ConceptOccurrenceRow) -> Self {
        Self {
            concept_id: row.concept_id,
            num_labels: row.num_labels,
        }
    }
}

#[derive(Debug, Clone, Copy, FromRow)]
pub struct ConceptScoreRow {
    pub concept_id: DbId,
    pub count: i64,
    pub tf_idf: f64,
}

impl From<ConceptScoreRow> for ConceptScore {
    fn from(row: ConceptScoreRow) -> Self {
        Self {
            concept_id: row.concept_id,
            count: row.count,
            tf_idf: row.tf_idf,
        }
    }
}

#[derive(Debug, Clone, Copy, FromRow)]
pub struct ImagePriorityRow {
    pub image_id: DbId,
    pub priority: f64,
}

impl From<ImagePriorityRow> for ImagePriority {
    fn from(row: ImagePriorityRow) -> Self {
        Self {
            image_id: row.image_id,
            priority: row.priority,
        }
    }
}

/// A row from the `project_progress` table.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct ProjectProgressRow {
    pub project_id: DbId,
    pub num_docs: i64,
    pub total_prio: f64,
    pub progress: f64,
}

impl From<ProjectProgressRow> for ProjectProgress {
    fn from(row: ProjectProgressRow) -> Self {
        Self {
            project_id: row.project_id,
            num_docs: row.num_docs,
            total_prio: row.total_prio,
            progress: row.progress,
        }
    }
}
