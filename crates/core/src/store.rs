//! Store capabilities consumed by the pipeline services.
//!
//! Each trait covers one concern; a backend implements all of them and is
//! used through [`Store`]. Inserts that race on a unique key resolve to the
//! surviving record instead of failing.

use async_trait::async_trait;

use crate::annotation::{Annotation, NewAnnotation};
use crate::concept::{Concept, ConceptMatch, NewConcept};
use crate::concept_mask::ConceptMask;
use crate::corpus::{CorpusWord, NewCorpusWord, Resolved};
use crate::error::StoreResult;
use crate::image::{DeletedObject, DetectedObject, Image, ImageObjectCounts, NewImage, NewObject, Project};
use crate::label::{Category, Label, NewLabel};
use crate::sampler::{NewWorkEntry, WorkEntry};
use crate::stats::{
    AggregateKind, AggregateState, ConceptCount, ConceptOccurrence, ConceptScore, ImagePriority,
    ProjectProgress, RecomputeStamp,
};
use crate::types::DbId;

/// Named monotone counters. `value` is the next free index.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Reserve `n` consecutive indices and return the first.
    async fn reserve_indices(&self, counter: &str, n: i64) -> StoreResult<i64>;

    async fn counter_value(&self, counter: &str) -> StoreResult<i64>;

    /// Raise the counter to at least `value`; never lowers it.
    async fn advance_counter_to(&self, counter: &str, value: i64) -> StoreResult<i64>;
}

#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Words whose surface is in `surfaces` or whose lemma is in `lemmas`.
    async fn find_words(&self, surfaces: &[String], lemmas: &[String]) -> StoreResult<Vec<CorpusWord>>;

    /// Insert words, returning the stored record for every input. A word
    /// whose lemma already has an index takes that index.
    async fn insert_words(&self, words: &[NewCorpusWord]) -> StoreResult<Vec<Resolved<CorpusWord>>>;

    async fn max_lemma_index(&self) -> StoreResult<Option<i64>>;
}

#[async_trait]
pub trait ConceptStore: Send + Sync {
    async fn find_concepts_by_keys(&self, keys: &[String]) -> StoreResult<Vec<Concept>>;

    async fn find_concepts_by_ids(&self, ids: &[DbId]) -> StoreResult<Vec<Concept>>;

    /// Insert concepts, returning the stored record for every input.
    async fn insert_concepts(&self, concepts: &[NewConcept]) -> StoreResult<Vec<Resolved<Concept>>>;

    /// Concepts sharing at least one lemma index, most shared first.
    async fn find_concepts_overlapping(&self, lemma_indices: &[i64], limit: i64) -> StoreResult<Vec<ConceptMatch>>;
}

#[async_trait]
pub trait LabelStore: Send + Sync {
    /// Insert a label and upsert its categories. Fails with
    /// `StoreError::Conflict` on a duplicate name.
    async fn insert_label(&self, label: &NewLabel) -> StoreResult<Label>;

    async fn find_label(&self, id: DbId) -> StoreResult<Option<Label>>;

    /// `name` is matched lowercased.
    async fn find_label_by_name(&self, name: &str) -> StoreResult<Option<Label>>;

    async fn count_labels(&self) -> StoreResult<i64>;

    async fn find_category(&self, id: &str) -> StoreResult<Option<Category>>;
}

/// Projects, images and the objects and annotations nested under them.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn insert_project(&self, name: &str) -> StoreResult<Project>;

    async fn find_project(&self, id: DbId) -> StoreResult<Option<Project>>;

    /// Returns how many images were newly added.
    async fn add_project_images(&self, project_id: DbId, image_ids: &[DbId]) -> StoreResult<u64>;

    /// Member images in insertion order.
    async fn project_image_ids(&self, project_id: DbId) -> StoreResult<Vec<DbId>>;

    async fn projects_of_images(&self, image_ids: &[DbId]) -> StoreResult<Vec<DbId>>;

    async fn insert_image(&self, image: &NewImage) -> StoreResult<Image>;

    async fn find_image(&self, id: DbId) -> StoreResult<Option<Image>>;

    /// Appends the object to its image's ordered object list.
    async fn insert_object(&self, object: &NewObject) -> StoreResult<DetectedObject>;

    async fn find_object(&self, id: DbId) -> StoreResult<Option<DetectedObject>>;

    /// Deletes the object and its annotations.
    async fn delete_object(&self, id: DbId) -> StoreResult<Option<DeletedObject>>;

    /// Insert annotations in order under one object.
    async fn insert_annotations(&self, object_id: DbId, annotations: &[NewAnnotation]) -> StoreResult<Vec<Annotation>>;

    async fn find_annotation(&self, id: DbId) -> StoreResult<Option<Annotation>>;

    async fn update_annotation_concepts(
        &self,
        id: DbId,
        mask: &ConceptMask,
        concept_ids: &[DbId],
    ) -> StoreResult<Option<Annotation>>;

    async fn delete_annotation(&self, id: DbId) -> StoreResult<Option<Annotation>>;

    /// Object and annotated-object counts for each existing image.
    async fn image_object_counts(&self, image_ids: &[DbId]) -> StoreResult<Vec<ImageObjectCounts>>;

    /// Occurrences of each concept across annotations of objects with
    /// `label_id`.
    async fn count_label_concepts(&self, label_id: DbId) -> StoreResult<Vec<ConceptCount>>;

    /// Distinct `(concept_id, label_id)` pairs for the given concepts.
    async fn concept_labels(&self, concept_ids: &[DbId]) -> StoreResult<Vec<(DbId, DbId)>>;
}

#[async_trait]
pub trait WorkStore: Send + Sync {
    /// Insert or update the entry for `(worker_id, doc_id)`.
    async fn upsert_work_entry(&self, entry: &NewWorkEntry) -> StoreResult<WorkEntry>;

    /// Documents of `project_id` the worker has an entry for.
    async fn worker_history(&self, worker_id: DbId, project_id: DbId) -> StoreResult<Vec<DbId>>;
}

/// Cached aggregate records and their validity state.
///
/// Every `save_*` replaces the data with `updated_at = stamp.started_at`
/// and marks a scope valid only when its generation still equals the one
/// recorded in the stamp.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    async fn aggregate_states(&self, kind: AggregateKind, scope_ids: &[DbId]) -> StoreResult<Vec<AggregateState>>;

    /// Flip `is_valid` off and bump the generation, creating the state
    /// record when missing; data is kept.
    async fn mark_stale(&self, kind: AggregateKind, scope_ids: &[DbId]) -> StoreResult<u64>;

    /// [`AggregateStore::mark_stale`] for every existing record of `kind`.
    async fn mark_kind_stale(&self, kind: AggregateKind) -> StoreResult<u64>;

    async fn load_label_counts(&self, label_id: DbId) -> StoreResult<Vec<ConceptCount>>;

    async fn save_label_counts(&self, label_id: DbId, counts: &[ConceptCount], stamp: &RecomputeStamp) -> StoreResult<()>;

    async fn load_occurrences(&self, concept_ids: &[DbId]) -> StoreResult<Vec<ConceptOccurrence>>;

    async fn save_occurrences(&self, occurrences: &[ConceptOccurrence], stamp: &RecomputeStamp) -> StoreResult<()>;

    /// One page of scores, highest first, ties by concept id.
    async fn load_tf_idf(&self, label_id: DbId, offset: i64, limit: i64) -> StoreResult<Vec<ConceptScore>>;

    async fn save_tf_idf(&self, label_id: DbId, scores: &[ConceptScore], stamp: &RecomputeStamp) -> StoreResult<()>;

    async fn load_image_priorities(&self, image_ids: &[DbId]) -> StoreResult<Vec<ImagePriority>>;

    async fn save_image_priorities(&self, priorities: &[ImagePriority], stamp: &RecomputeStamp) -> StoreResult<()>;

    async fn load_project_progress(&self, project_id: DbId) -> StoreResult<Option<ProjectProgress>>;

    async fn save_project_progress(&self, progress: &ProjectProgress, stamp: &RecomputeStamp) -> StoreResult<()>;
}

/// The full capability set a backend provides.
#[async_trait]
pub trait Store:
    CounterStore + CorpusStore + ConceptStore + LabelStore + ImageStore + WorkStore + AggregateStore
{
    /// Cheap round trip used by the health endpoint.
    async fn health_check(&self) -> StoreResult<()>;
}
