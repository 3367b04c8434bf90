//! Process-local [`Store`] backend.
//!
//! Holds everything behind one mutex; no lock is held across an await.
//! Suitable for tests and single-process development runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::annotation::{Annotation, NewAnnotation};
use crate::concept::{Concept, ConceptMatch, NewConcept};
use crate::concept_mask::ConceptMask;
use crate::corpus::{CorpusWord, NewCorpusWord, Resolved};
use crate::error::{StoreError, StoreResult};
use crate::image::{DeletedObject, DetectedObject, Image, ImageObjectCounts, NewImage, NewObject, Project};
use crate::label::{Category, Label, NewLabel};
use crate::sampler::{NewWorkEntry, WorkEntry};
use crate::stats::{
    AggregateKind, AggregateState, ConceptCount, ConceptOccurrence, ConceptScore, ImagePriority,
    ProjectProgress, RecomputeStamp,
};
use crate::store::{
    AggregateStore, ConceptStore, CorpusStore, CounterStore, ImageStore, LabelStore, Store, WorkStore,
};
use crate::types::{DbId, Timestamp};

#[derive(Default)]
struct State {
    sequences: HashMap<&'static str, DbId>,
    counters: HashMap<String, i64>,
    reservations: usize,
    words: Vec<CorpusWord>,
    concepts: Vec<Concept>,
    labels: Vec<Label>,
    categories: BTreeMap<String, Category>,
    projects: Vec<Project>,
    project_images: HashMap<DbId, Vec<DbId>>,
    images: Vec<Image>,
    objects: Vec<DetectedObject>,
    annotations: Vec<Annotation>,
    work: Vec<WorkEntry>,
    aggregate_states: HashMap<(AggregateKind, DbId), AggregateState>,
    label_counts: HashMap<DbId, Vec<ConceptCount>>,
    occurrences: HashMap<DbId, i64>,
    tf_idf: HashMap<DbId, Vec<ConceptScore>>,
    priorities: HashMap<DbId, f64>,
    progress: HashMap<DbId, ProjectProgress>,
}

impl State {
    fn next_id(&mut self, table: &'static str) -> DbId {
        let id = self.sequences.entry(table).or_insert(0);
        *id += 1;
        *id
    }

    fn state_entry(&mut self, kind: AggregateKind, scope_id: DbId, now: Timestamp) -> &mut AggregateState {
        self.aggregate_states
            .entry((kind, scope_id))
            .or_insert_with(|| AggregateState {
                kind,
                scope_id,
                is_valid: false,
                generation: 0,
                updated_at: now,
            })
    }

    fn mark_computed(&mut self, kind: AggregateKind, scope_id: DbId, stamp: &RecomputeStamp) {
        let record = self.state_entry(kind, scope_id, stamp.started_at);
        record.is_valid = record.generation == stamp.generation(scope_id);
        record.updated_at = stamp.started_at;
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of counter reservations made so far.
    pub fn reservations(&self) -> usize {
        self.lock().reservations
    }

    /// Overwrite a counter, bypassing the monotonicity rule.
    pub fn force_counter(&self, counter: &str, value: i64) {
        self.lock().counters.insert(counter.to_string(), value);
    }

    pub fn corpus_size(&self) -> usize {
        self.lock().words.len()
    }

    pub fn concept_count(&self) -> usize {
        self.lock().concepts.len()
    }

    /// Shift every aggregate's `updated_at` into the past.
    pub fn age_aggregates(&self, by: chrono::Duration) {
        for state in self.lock().aggregate_states.values_mut() {
            state.updated_at -= by;
        }
    }
}

#[async_trait]
impl CounterStore for InMemoryStore {
    async fn reserve_indices(&self, counter: &str, n: i64) -> StoreResult<i64> {
        let mut state = self.lock();
        state.reservations += 1;
        let value = state.counters.entry(counter.to_string()).or_insert(0);
        let first = *value;
        *value += n;
        Ok(first)
    }

    async fn counter_value(&self, counter: &str) -> StoreResult<i64> {
        Ok(self.lock().counters.get(counter).copied().unwrap_or(0))
    }

    async fn advance_counter_to(&self, counter: &str, value: i64) -> StoreResult<i64> {
        let mut state = self.lock();
        let current = state.counters.entry(counter.to_string()).or_insert(0);
        *current = (*current).max(value);
        Ok(*current)
    }
}

#[async_trait]
impl CorpusStore for InMemoryStore {
    async fn find_words(&self, surfaces: &[String], lemmas: &[String]) -> StoreResult<Vec<CorpusWord>> {
        Ok(self
            .lock()
            .words
            .iter()
            .filter(|w| surfaces.contains(&w.surface) || lemmas.contains(&w.lemma))
            .cloned()
            .collect())
    }

    async fn insert_words(&self, words: &[NewCorpusWord]) -> StoreResult<Vec<Resolved<CorpusWord>>> {
        let mut state = self.lock();
        let now = Utc::now();
        let mut out = Vec::with_capacity(words.len());
        for word in words {
            if let Some(existing) = state
                .words
                .iter()
                .find(|w| w.surface == word.surface && w.is_noun == word.is_noun)
            {
                out.push(Resolved {
                    record: existing.clone(),
                    created: false,
                });
                continue;
            }
            let lemma_index = state
                .words
                .iter()
                .find(|w| w.lemma == word.lemma)
                .map_or(word.lemma_index, |w| w.lemma_index);
            let record = CorpusWord {
                id: state.next_id("corpus_words"),
                lemma_index,
                surface: word.surface.clone(),
                lemma: word.lemma.clone(),
                is_noun: word.is_noun,
                created_at: now,
            };
            state.words.push(record.clone());
            out.push(Resolved {
                record,
                created: true,
            });
        }
        Ok(out)
    }

    async fn max_lemma_index(&self) -> StoreResult<Option<i64>> {
        Ok(self.lock().words.iter().map(|w| w.lemma_index).max())
    }
}

#[async_trait]
impl ConceptStore for InMemoryStore {
    async fn find_concepts_by_keys(&self, keys: &[String]) -> StoreResult<Vec<Concept>> {
        Ok(self
            .lock()
            .concepts
            .iter()
            .filter(|c| keys.contains(&c.key))
            .cloned()
            .collect())
    }

    async fn find_concepts_by_ids(&self, ids: &[DbId]) -> StoreResult<Vec<Concept>> {
        let state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.concepts.iter().find(|c| c.id == *id).cloned())
            .collect())
    }

    async fn insert_concepts(&self, concepts: &[NewConcept]) -> StoreResult<Vec<Resolved<Concept>>> {
        let mut state = self.lock();
        let now = Utc::now();
        let mut out = Vec::with_capacity(concepts.len());
        for new in concepts {
            if let Some(existing) = state.concepts.iter().find(|c| c.key == new.key) {
                out.push(Resolved {
                    record: existing.clone(),
                    created: false,
                });
                continue;
            }
            let record = Concept {
                id: state.next_id("concepts"),
                key: new.key.clone(),
                lemma_indices: new.lemma_indices.clone(),
                word_ids: new.word_ids.clone(),
                surfaces: new.surfaces.clone(),
                noun_count: new.noun_count,
                root_noun_id: new.root_noun_id,
                filter_index: None,
                created_at: now,
            };
            state.concepts.push(record.clone());
            out.push(Resolved {
                record,
                created: true,
            });
        }
        Ok(out)
    }

    async fn find_concepts_overlapping(&self, lemma_indices: &[i64], limit: i64) -> StoreResult<Vec<ConceptMatch>> {
        let query: HashSet<i64> = lemma_indices.iter().copied().collect();
        let mut hits: Vec<ConceptMatch> = self
            .lock()
            .concepts
            .iter()
            .filter_map(|c| {
                let matches = c.lemma_indices.iter().filter(|i| query.contains(i)).count() as i64;
                (matches > 0).then(|| ConceptMatch {
                    concept: c.clone(),
                    matches,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.matches.cmp(&a.matches).then(a.concept.id.cmp(&b.concept.id)));
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }
}

#[async_trait]
impl LabelStore for InMemoryStore {
    async fn insert_label(&self, label: &NewLabel) -> StoreResult<Label> {
        let mut state = self.lock();
        let name = label.name.to_lowercase();
        if state.labels.iter().any(|l| l.name == name) {
            return Err(StoreError::Conflict(format!("label '{name}' already exists")));
        }
        let record = Label {
            id: state.next_id("labels"),
            label_index: label.label_index,
            name,
            name_tokens: label.name_tokens.clone(),
            token_lemma_indices: label.token_lemma_indices.clone(),
            categories: label.categories.iter().map(|(id, _)| id.clone()).collect(),
            created_at: Utc::now(),
        };
        for (id, tokens) in &label.categories {
            let category = state
                .categories
                .entry(id.clone())
                .or_insert_with(|| Category {
                    id: id.clone(),
                    tokens: tokens.clone(),
                    label_indices: Vec::new(),
                });
            if !category.label_indices.contains(&label.label_index) {
                category.label_indices.push(label.label_index);
            }
        }
        state.labels.push(record.clone());
        Ok(record)
    }

    async fn find_label(&self, id: DbId) -> StoreResult<Option<Label>> {
        Ok(self.lock().labels.iter().find(|l| l.id == id).cloned())
    }

    async fn find_label_by_name(&self, name: &str) -> StoreResult<Option<Label>> {
        let name = name.to_lowercase();
        Ok(self.lock().labels.iter().find(|l| l.name == name).cloned())
    }

    async fn count_labels(&self) -> StoreResult<i64> {
        Ok(self.lock().labels.len() as i64)
    }

    async fn find_category(&self, id: &str) -> StoreResult<Option<Category>> {
        Ok(self.lock().categories.get(id).cloned())
    }
}

#[async_trait]
impl ImageStore for InMemoryStore {
    async fn insert_project(&self, name: &str) -> StoreResult<Project> {
        let mut state = self.lock();
        let project = Project {
            id: state.next_id("projects"),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        state.projects.push(project.clone());
        Ok(project)
    }

    async fn find_project(&self, id: DbId) -> StoreResult<Option<Project>> {
        Ok(self.lock().projects.iter().find(|p| p.id == id).cloned())
    }

    async fn add_project_images(&self, project_id: DbId, image_ids: &[DbId]) -> StoreResult<u64> {
        let mut state = self.lock();
        let members = state.project_images.entry(project_id).or_default();
        let mut added = 0;
        for &id in image_ids {
            if !members.contains(&id) {
                members.push(id);
                added += 1;
            }
        }
        Ok(added)
    }

    async fn project_image_ids(&self, project_id: DbId) -> StoreResult<Vec<DbId>> {
        Ok(self
            .lock()
            .project_images
            .get(&project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn projects_of_images(&self, image_ids: &[DbId]) -> StoreResult<Vec<DbId>> {
        let state = self.lock();
        let mut projects: Vec<DbId> = state
            .project_images
            .iter()
            .filter(|(_, members)| members.iter().any(|m| image_ids.contains(m)))
            .map(|(project_id, _)| *project_id)
            .collect();
        projects.sort_unstable();
        Ok(projects)
    }

    async fn insert_image(&self, image: &NewImage) -> StoreResult<Image> {
        let mut state = self.lock();
        let record = Image {
            id: state.next_id("images"),
            file_name: image.file_name.clone(),
            width: image.width,
            height: image.height,
            created_at: Utc::now(),
        };
        state.images.push(record.clone());
        Ok(record)
    }

    async fn find_image(&self, id: DbId) -> StoreResult<Option<Image>> {
        Ok(self.lock().images.iter().find(|i| i.id == id).cloned())
    }

    async fn insert_object(&self, object: &NewObject) -> StoreResult<DetectedObject> {
        let mut state = self.lock();
        let position = state
            .objects
            .iter()
            .filter(|o| o.image_id == object.image_id)
            .map(|o| o.position + 1)
            .max()
            .unwrap_or(0);
        let record = DetectedObject {
            id: state.next_id("objects"),
            image_id: object.image_id,
            label_id: object.label_id,
            bbox: object.bbox,
            position,
            created_at: Utc::now(),
        };
        state.objects.push(record.clone());
        Ok(record)
    }

    async fn find_object(&self, id: DbId) -> StoreResult<Option<DetectedObject>> {
        Ok(self.lock().objects.iter().find(|o| o.id == id).cloned())
    }

    async fn delete_object(&self, id: DbId) -> StoreResult<Option<DeletedObject>> {
        let mut state = self.lock();
        let Some(position) = state.objects.iter().position(|o| o.id == id) else {
            return Ok(None);
        };
        let object = state.objects.remove(position);
        let mut concept_ids: Vec<DbId> = state
            .annotations
            .iter()
            .filter(|a| a.object_id == id)
            .flat_map(|a| a.concept_ids.iter().copied())
            .collect();
        concept_ids.sort_unstable();
        concept_ids.dedup();
        state.annotations.retain(|a| a.object_id != id);
        Ok(Some(DeletedObject { object, concept_ids }))
    }

    async fn insert_annotations(&self, object_id: DbId, annotations: &[NewAnnotation]) -> StoreResult<Vec<Annotation>> {
        let mut state = self.lock();
        let now = Utc::now();
        let mut out = Vec::with_capacity(annotations.len());
        for new in annotations {
            let record = Annotation {
                id: state.next_id("annotations"),
                object_id,
                text: new.text.clone(),
                tokens: new.tokens.clone(),
                concept_mask: new.concept_mask.clone(),
                concept_ids: new.concept_ids.clone(),
                created_by: new.created_by,
                created_at: now,
                updated_at: now,
            };
            state.annotations.push(record.clone());
            out.push(record);
        }
        Ok(out)
    }

    async fn find_annotation(&self, id: DbId) -> StoreResult<Option<Annotation>> {
        Ok(self.lock().annotations.iter().find(|a| a.id == id).cloned())
    }

    async fn update_annotation_concepts(
        &self,
        id: DbId,
        mask: &ConceptMask,
        concept_ids: &[DbId],
    ) -> StoreResult<Option<Annotation>> {
        let mut state = self.lock();
        let Some(annotation) = state.annotations.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };
        annotation.concept_mask = mask.clone();
        annotation.concept_ids = concept_ids.to_vec();
        annotation.updated_at = Utc::now();
        Ok(Some(annotation.clone()))
    }

    async fn delete_annotation(&self, id: DbId) -> StoreResult<Option<Annotation>> {
        let mut state = self.lock();
        let Some(position) = state.annotations.iter().position(|a| a.id == id) else {
            return Ok(None);
        };
        Ok(Some(state.annotations.remove(position)))
    }

    async fn image_object_counts(&self, image_ids: &[DbId]) -> StoreResult<Vec<ImageObjectCounts>> {
        let state = self.lock();
        let annotated: HashSet<DbId> = state.annotations.iter().map(|a| a.object_id).collect();
        Ok(image_ids
            .iter()
            .filter(|id| state.images.iter().any(|i| i.id == **id))
            .map(|&image_id| {
                let objects: Vec<&DetectedObject> =
                    state.objects.iter().filter(|o| o.image_id == image_id).collect();
                ImageObjectCounts {
                    image_id,
                    num_objects: objects.len() as i64,
                    num_annotated: objects.iter().filter(|o| annotated.contains(&o.id)).count() as i64,
                }
            })
            .collect())
    }

    async fn count_label_concepts(&self, label_id: DbId) -> StoreResult<Vec<ConceptCount>> {
        let state = self.lock();
        let objects: HashSet<DbId> = state
            .objects
            .iter()
            .filter(|o| o.label_id == label_id)
            .map(|o| o.id)
            .collect();
        let mut counts: BTreeMap<DbId, i64> = BTreeMap::new();
        for annotation in state.annotations.iter().filter(|a| objects.contains(&a.object_id)) {
            for &concept_id in &annotation.concept_ids {
                *counts.entry(concept_id).or_default() += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|(concept_id, count)| ConceptCount { concept_id, count })
            .collect())
    }

    async fn concept_labels(&self, concept_ids: &[DbId]) -> StoreResult<Vec<(DbId, DbId)>> {
        let state = self.lock();
        let label_of: HashMap<DbId, DbId> = state.objects.iter().map(|o| (o.id, o.label_id)).collect();
        let mut pairs: Vec<(DbId, DbId)> = Vec::new();
        for annotation in &state.annotations {
            let Some(&label_id) = label_of.get(&annotation.object_id) else {
                continue;
            };
            for &concept_id in annotation.concept_ids.iter().filter(|c| concept_ids.contains(c)) {
                if !pairs.contains(&(concept_id, label_id)) {
                    pairs.push((concept_id, label_id));
                }
            }
        }
        pairs.sort_unstable();
        Ok(pairs)
    }
}

#[async_trait]
impl WorkStore for InMemoryStore {
    async fn upsert_work_entry(&self, entry: &NewWorkEntry) -> StoreResult<WorkEntry> {
        let mut state = self.lock();
        let now = Utc::now();
        if let Some(existing) = state
            .work
            .iter_mut()
            .find(|w| w.worker_id == entry.worker_id && w.doc_id == entry.doc_id)
        {
            existing.project_id = entry.project_id;
            existing.is_finished = entry.is_finished;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let record = WorkEntry {
            id: state.next_id("work_entries"),
            worker_id: entry.worker_id,
            doc_id: entry.doc_id,
            project_id: entry.project_id,
            is_finished: entry.is_finished,
            created_at: now,
            updated_at: now,
        };
        state.work.push(record.clone());
        Ok(record)
    }

    async fn worker_history(&self, worker_id: DbId, project_id: DbId) -> StoreResult<Vec<DbId>> {
        Ok(self
            .lock()
            .work
            .iter()
            .filter(|w| w.worker_id == worker_id && w.project_id == project_id)
            .map(|w| w.doc_id)
            .collect())
    }
}

#[async_trait]
impl AggregateStore for InMemoryStore {
    async fn aggregate_states(&self, kind: AggregateKind, scope_ids: &[DbId]) -> StoreResult<Vec<AggregateState>> {
        let state = self.lock();
        Ok(scope_ids
            .iter()
            .filter_map(|id| state.aggregate_states.get(&(kind, *id)).cloned())
            .collect())
    }

    async fn mark_stale(&self, kind: AggregateKind, scope_ids: &[DbId]) -> StoreResult<u64> {
        let mut state = self.lock();
        let now = Utc::now();
        let unique: HashSet<DbId> = scope_ids.iter().copied().collect();
        for &id in &unique {
            let record = state.state_entry(kind, id, now);
            record.is_valid = false;
            record.generation += 1;
        }
        Ok(unique.len() as u64)
    }

    async fn mark_kind_stale(&self, kind: AggregateKind) -> StoreResult<u64> {
        let mut state = self.lock();
        let mut marked = 0;
        for record in state.aggregate_states.values_mut().filter(|r| r.kind == kind) {
            record.is_valid = false;
            record.generation += 1;
            marked += 1;
        }
        Ok(marked)
    }

    async fn load_label_counts(&self, label_id: DbId) -> StoreResult<Vec<ConceptCount>> {
        Ok(self
            .lock()
            .label_counts
            .get(&label_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_label_counts(&self, label_id: DbId, counts: &[ConceptCount], stamp: &RecomputeStamp) -> StoreResult<()> {
        let mut state = self.lock();
        state.label_counts.insert(label_id, counts.to_vec());
        state.mark_computed(AggregateKind::ConceptLabelCount, label_id, stamp);
        Ok(())
    }

    async fn load_occurrences(&self, concept_ids: &[DbId]) -> StoreResult<Vec<ConceptOccurrence>> {
        let state = self.lock();
        Ok(concept_ids
            .iter()
            .filter_map(|&concept_id| {
                state.occurrences.get(&concept_id).map(|&num_labels| ConceptOccurrence {
                    concept_id,
                    num_labels,
                })
            })
            .collect())
    }

    async fn save_occurrences(&self, occurrences: &[ConceptOccurrence], stamp: &RecomputeStamp) -> StoreResult<()> {
        let mut state = self.lock();
        for occ in occurrences {
            state.occurrences.insert(occ.concept_id, occ.num_labels);
            state.mark_computed(AggregateKind::ConceptOccurrence, occ.concept_id, stamp);
        }
        Ok(())
    }

    async fn load_tf_idf(&self, label_id: DbId, offset: i64, limit: i64) -> StoreResult<Vec<ConceptScore>> {
        Ok(self
            .lock()
            .tf_idf
            .get(&label_id)
            .map(|scores| {
                scores
                    .iter()
                    .skip(offset.max(0) as usize)
                    .take(limit.max(0) as usize)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn save_tf_idf(&self, label_id: DbId, scores: &[ConceptScore], stamp: &RecomputeStamp) -> StoreResult<()> {
        let mut state = self.lock();
        let mut sorted = scores.to_vec();
        crate::stats::sort_scores(&mut sorted);
        state.tf_idf.insert(label_id, sorted);
        state.mark_computed(AggregateKind::ConceptTfIdf, label_id, stamp);
        Ok(())
    }

    async fn load_image_priorities(&self, image_ids: &[DbId]) -> StoreResult<Vec<ImagePriority>> {
        let state = self.lock();
        Ok(image_ids
            .iter()
            .filter_map(|&image_id| {
                state
                    .priorities
                    .get(&image_id)
                    .map(|&priority| ImagePriority { image_id, priority })
            })
            .collect())
    }

    async fn save_image_priorities(&self, priorities: &[ImagePriority], stamp: &RecomputeStamp) -> StoreResult<()> {
        let mut state = self.lock();
        for p in priorities {
            state.priorities.insert(p.image_id, p.priority);
            state.mark_computed(AggregateKind::ImagePriority, p.image_id, stamp);
        }
        Ok(())
    }

    async fn load_project_progress(&self, project_id: DbId) -> StoreResult<Option<ProjectProgress>> {
        Ok(self.lock().progress.get(&project_id).copied())
    }

    async fn save_project_progress(&self, progress: &ProjectProgress, stamp: &RecomputeStamp) -> StoreResult<()> {
        let mut state = self.lock();
        state.progress.insert(progress.project_id, *progress);
        state.mark_computed(AggregateKind::ProjectProgress, progress.project_id, stamp);
        Ok(())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
