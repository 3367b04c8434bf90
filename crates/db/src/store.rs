//! [`Store`] implementation over a Postgres pool.

use async_trait::async_trait;
use glossa_core::annotation::{Annotation, NewAnnotation};
use glossa_core::concept::{Concept, ConceptMatch, NewConcept};
use glossa_core::concept_mask::ConceptMask;
use glossa_core::corpus::{CorpusWord, NewCorpusWord, Resolved};
use glossa_core::error::{StoreError, StoreResult};
use glossa_core::image::{DeletedObject, DetectedObject, Image, ImageObjectCounts, NewImage, NewObject, Project};
use glossa_core::label::{Category, Label, NewLabel};
use glossa_core::sampler::{NewWorkEntry, WorkEntry};
use glossa_core::stats::{
    AggregateKind, AggregateState, ConceptCount, ConceptOccurrence, ConceptScore, ImagePriority,
    ProjectProgress, RecomputeStamp,
};
use glossa_core::store::{
    AggregateStore, ConceptStore, CorpusStore, CounterStore, ImageStore, LabelStore, Store, WorkStore,
};
use glossa_core::types::DbId;

use crate::repositories::{
    AggregateRepo, AnnotationRepo, ConceptRepo, CorpusWordRepo, CounterRepo, ImageRepo, LabelRepo,
    ObjectRepo, ProjectRepo, WorkEntryRepo,
};
use crate::DbPool;

/// PostgreSQL unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

/// Store backed by a shared connection pool. Cheap to clone.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::backend(err)
}

/// Whether `err` is a unique violation of `constraint`.
fn violates(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some(UNIQUE_VIOLATION) && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

fn resolved<R, T: From<R>>(rows: Vec<(R, bool)>) -> Vec<Resolved<T>> {
    rows.into_iter()
        .map(|(row, created)| Resolved {
            record: row.into(),
            created,
        })
        .collect()
}

fn convert<R, T: From<R>>(rows: Vec<R>) -> Vec<T> {
    rows.into_iter().map(T::from).collect()
}

#[async_trait]
impl CounterStore for PgStore {
    async fn reserve_indices(&self, counter: &str, n: i64) -> StoreResult<i64> {
        CounterRepo::reserve(&self.pool, counter, n).await.map_err(backend)
    }

    async fn counter_value(&self, counter: &str) -> StoreResult<i64> {
        CounterRepo::current(&self.pool, counter).await.map_err(backend)
    }

    async fn advance_counter_to(&self, counter: &str, value: i64) -> StoreResult<i64> {
        CounterRepo::advance_to(&self.pool, counter, value)
            .await
            .map_err(backend)
    }
}

#[async_trait]
impl CorpusStore for PgStore {
    async fn find_words(&self, surfaces: &[String], lemmas: &[String]) -> StoreResult<Vec<CorpusWord>> {
        let rows = CorpusWordRepo::find_by_surfaces_or_lemmas(&self.pool, surfaces, lemmas)
            .await
            .map_err(backend)?;
        Ok(convert(rows))
    }

    async fn insert_words(&self, words: &[NewCorpusWord]) -> StoreResult<Vec<Resolved<CorpusWord>>> {
        let rows = CorpusWordRepo::insert_many(&self.pool, words)
            .await
            .map_err(backend)?;
        Ok(resolved(rows))
    }

    async fn max_lemma_index(&self) -> StoreResult<Option<i64>> {
        CorpusWordRepo::max_lemma_index(&self.pool).await.map_err(backend)
    }
}

#[async_trait]
impl ConceptStore for PgStore {
    async fn find_concepts_by_keys(&self, keys: &[String]) -> StoreResult<Vec<Concept>> {
        let rows = ConceptRepo::find_by_keys(&self.pool, keys).await.map_err(backend)?;
        Ok(convert(rows))
    }

    async fn find_concepts_by_ids(&self, ids: &[DbId]) -> StoreResult<Vec<Concept>> {
        let rows = ConceptRepo::find_by_ids(&self.pool, ids).await.map_err(backend)?;
        Ok(convert(rows))
    }

    async fn insert_concepts(&self, concepts: &[NewConcept]) -> StoreResult<Vec<Resolved<Concept>>> {
        let rows = ConceptRepo::insert_many(&self.pool, concepts)
            .await
            .map_err(backend)?;
        Ok(resolved(rows))
    }

    async fn find_concepts_overlapping(&self, lemma_indices: &[i64], limit: i64) -> StoreResult<Vec<ConceptMatch>> {
        let rows = ConceptRepo::find_overlapping(&self.pool, lemma_indices, limit)
            .await
            .map_err(backend)?;
        Ok(convert(rows))
    }
}

#[async_trait]
impl LabelStore for PgStore {
    async fn insert_label(&self, label: &NewLabel) -> StoreResult<Label> {
        match LabelRepo::create(&self.pool, label).await {
            Ok(row) => Ok(row.into()),
            Err(e) if violates(&e, "uq_labels_name") => Err(StoreError::Conflict(format!(
                "label '{}' already exists",
                label.name
            ))),
            Err(e) => Err(backend(e)),
        }
    }

    async fn find_label(&self, id: DbId) -> StoreResult<Option<Label>> {
        let row = LabelRepo::find_by_id(&self.pool, id).await.map_err(backend)?;
        Ok(row.map(Label::from))
    }

    async fn find_label_by_name(&self, name: &str) -> StoreResult<Option<Label>> {
        let row = LabelRepo::find_by_name(&self.pool, &name.to_lowercase())
            .await
            .map_err(backend)?;
        Ok(row.map(Label::from))
    }

    async fn count_labels(&self) -> StoreResult<i64> {
        LabelRepo::count(&self.pool).await.map_err(backend)
    }

    async fn find_category(&self, id: &str) -> StoreResult<Option<Category>> {
        let row = LabelRepo::find_category(&self.pool, id).await.map_err(backend)?;
        Ok(row.map(Category::from))
    }
}

#[async_trait]
impl ImageStore for PgStore {
    async fn insert_project(&self, name: &str) -> StoreResult<Project> {
        let row = ProjectRepo::create(&self.pool, name).await.map_err(backend)?;
        Ok(row.into())
    }

    async fn find_project(&self, id: DbId) -> StoreResult<Option<Project>> {
        let row = ProjectRepo::find_by_id(&self.pool, id).await.map_err(backend)?;
        Ok(row.map(Project::from))
    }

    async fn add_project_images(&self, project_id: DbId, image_ids: &[DbId]) -> StoreResult<u64> {
        ProjectRepo::add_images(&self.pool, project_id, image_ids)
            .await
            .map_err(backend)
    }

    async fn project_image_ids(&self, project_id: DbId) -> StoreResult<Vec<DbId>> {
        ProjectRepo::image_ids(&self.pool, project_id).await.map_err(backend)
    }

    async fn projects_of_images(&self, image_ids: &[DbId]) -> StoreResult<Vec<DbId>> {
        ProjectRepo::ids_containing_images(&self.pool, image_ids)
            .await
            .map_err(backend)
    }

    async fn insert_image(&self, image: &NewImage) -> StoreResult<Image> {
        let row = ImageRepo::create(&self.pool, image).await.map_err(backend)?;
        Ok(row.into())
    }

    async fn find_image(&self, id: DbId) -> StoreResult<Option<Image>> {
        let row = ImageRepo::find_by_id(&self.pool, id).await.map_err(backend)?;
        Ok(row.map(Image::from))
    }

    async fn insert_object(&self, object: &NewObject) -> StoreResult<DetectedObject> {
        let row = ObjectRepo::create(&self.pool, object).await.map_err(backend)?;
        Ok(row.into())
    }

    async fn find_object(&self, id: DbId) -> StoreResult<Option<DetectedObject>> {
        let row = ObjectRepo::find_by_id(&self.pool, id).await.map_err(backend)?;
        Ok(row.map(DetectedObject::from))
    }

    async fn delete_object(&self, id: DbId) -> StoreResult<Option<DeletedObject>> {
        let deleted = ObjectRepo::delete(&self.pool, id).await.map_err(backend)?;
        Ok(deleted.map(|(row, concept_ids)| DeletedObject {
            object: row.into(),
            concept_ids,
        }))
    }

    async fn insert_annotations(&self, object_id: DbId, annotations: &[NewAnnotation]) -> StoreResult<Vec<Annotation>> {
        let rows = AnnotationRepo::create_many(&self.pool, object_id, annotations)
            .await
            .map_err(backend)?;
        Ok(convert(rows))
    }

    async fn find_annotation(&self, id: DbId) -> StoreResult<Option<Annotation>> {
        let row = AnnotationRepo::find_by_id(&self.pool, id).await.map_err(backend)?;
        Ok(row.map(Annotation::from))
    }

    async fn update_annotation_concepts(
        &self,
        id: DbId,
        mask: &ConceptMask,
        concept_ids: &[DbId],
    ) -> StoreResult<Option<Annotation>> {
        let row = AnnotationRepo::update_concepts(&self.pool, id, mask.as_slice(), concept_ids)
            .await
            .map_err(backend)?;
        Ok(row.map(Annotation::from))
    }

    async fn delete_annotation(&self, id: DbId) -> StoreResult<Option<Annotation>> {
        let row = AnnotationRepo::delete(&self.pool, id).await.map_err(backend)?;
        Ok(row.map(Annotation::from))
    }

    async fn image_object_counts(&self, image_ids: &[DbId]) -> StoreResult<Vec<ImageObjectCounts>> {
        let rows = ImageRepo::object_counts(&self.pool, image_ids)
            .await
            .map_err(backend)?;
        Ok(convert(rows))
    }

    async fn count_label_concepts(&self, label_id: DbId) -> StoreResult<Vec<ConceptCount>> {
        let rows = AnnotationRepo::count_label_concepts(&self.pool, label_id)
            .await
            .map_err(backend)?;
        Ok(convert(rows))
    }

    async fn concept_labels(&self, concept_ids: &[DbId]) -> StoreResult<Vec<(DbId, DbId)>> {
        AnnotationRepo::concept_labels(&self.pool, concept_ids)
            .await
            .map_err(backend)
    }
}

#[async_trait]
impl WorkStore for PgStore {
    async fn upsert_work_entry(&self, entry: &NewWorkEntry) -> StoreResult<WorkEntry> {
        let row = WorkEntryRepo::upsert(&self.pool, entry).await.map_err(backend)?;
        Ok(row.into())
    }

    async fn worker_history(&self, worker_id: DbId, project_id: DbId) -> StoreResult<Vec<DbId>> {
        WorkEntryRepo::doc_ids_for_worker(&self.pool, worker_id, project_id)
            .await
            .map_err(backend)
    }
}

#[async_trait]
impl AggregateStore for PgStore {
    async fn aggregate_states(&self, kind: AggregateKind, scope_ids: &[DbId]) -> StoreResult<Vec<AggregateState>> {
        let rows = AggregateRepo::states(&self.pool, kind.as_str(), scope_ids)
            .await
            .map_err(backend)?;
        Ok(rows.into_iter().map(|row| row.into_state(kind)).collect())
    }

    async fn mark_stale(&self, kind: AggregateKind, scope_ids: &[DbId]) -> StoreResult<u64> {
        AggregateRepo::mark_stale(&self.pool, kind.as_str(), scope_ids)
            .await
            .map_err(backend)
    }

    async fn mark_kind_stale(&self, kind: AggregateKind) -> StoreResult<u64> {
        AggregateRepo::mark_kind_stale(&self.pool, kind.as_str())
            .await
            .map_err(backend)
    }

    async fn load_label_counts(&self, label_id: DbId) -> StoreResult<Vec<ConceptCount>> {
        let rows = AggregateRepo::load_label_counts(&self.pool, label_id)
            .await
            .map_err(backend)?;
        Ok(convert(rows))
    }

    async fn save_label_counts(&self, label_id: DbId, counts: &[ConceptCount], stamp: &RecomputeStamp) -> StoreResult<()> {
        AggregateRepo::save_label_counts(&self.pool, label_id, counts, stamp)
            .await
            .map_err(backend)
    }

    async fn load_occurrences(&self, concept_ids: &[DbId]) -> StoreResult<Vec<ConceptOccurrence>> {
        let rows = AggregateRepo::load_occurrences(&self.pool, concept_ids)
            .await
            .map_err(backend)?;
        Ok(convert(rows))
    }

    async fn save_occurrences(&self, occurrences: &[ConceptOccurrence], stamp: &RecomputeStamp) -> StoreResult<()> {
        AggregateRepo::save_occurrences(&self.pool, occurrences, stamp)
            .await
            .map_err(backend)
    }

    async fn load_tf_idf(&self, label_id: DbId, offset: i64, limit: i64) -> StoreResult<Vec<ConceptScore>> {
        let rows = AggregateRepo::load_tf_idf(&self.pool, label_id, offset, limit)
            .await
            .map_err(backend)?;
        Ok(convert(rows))
    }

    async fn save_tf_idf(&self, label_id: DbId, scores: &[ConceptScore], stamp: &RecomputeStamp) -> StoreResult<()> {
        AggregateRepo::save_tf_idf(&self.pool, label_id, scores, stamp)
            .await
            .map_err(backend)
    }

    async fn load_image_priorities(&self, image_ids: &[DbId]) -> StoreResult<Vec<ImagePriority>> {
        let rows = AggregateRepo::load_image_priorities(&self.pool, image_ids)
            .await
            .map_err(backend)?;
        Ok(convert(rows))
    }

    async fn save_image_priorities(&self, priorities: &[ImagePriority], stamp: &RecomputeStamp) -> StoreResult<()> {
        AggregateRepo::save_image_priorities(&self.pool, priorities, stamp)
            .await
            .map_err(backend)
    }

    async fn load_project_progress(&self, project_id: DbId) -> StoreResult<Option<ProjectProgress>> {
        let row = AggregateRepo::load_project_progress(&self.pool, project_id)
            .await
            .map_err(backend)?;
        Ok(row.map(ProjectProgress::from))
    }

    async fn save_project_progress(&self, progress: &ProjectProgress, stamp: &RecomputeStamp) -> StoreResult<()> {
        AggregateRepo::save_project_progress(&self.pool, progress, stamp)
            .await
            .map_err(backend)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn health_check(&self) -> StoreResult<()> {
        crate::health_check(&self.pool).await.map_err(backend)
    }
}
