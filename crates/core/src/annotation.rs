//! Annotation assembler: raw description text to tokens, concept mask and
//! concept references.
//!
//! Within one insert, corpus words are written before concepts, concepts
//! before the annotation, and statistics are invalidated last.

use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::concept::{Concept, ConceptCatalog};
use crate::concept_mask::ConceptMask;
use crate::error::{CoreError, CoreResult};
use crate::image::DetectedObject;
use crate::label::Label;
use crate::nlp::{AnalyzedDoc, Analyzer};
use crate::noun_phrase::{self, Extraction, NounPhrase};
use crate::stats::StatsEngine;
use crate::store::Store;
use crate::text::{join_document, normalize_annotation, reconstruct_phrase};
use crate::types::{DbId, Timestamp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: DbId,
    pub object_id: DbId,
    pub text: String,
    /// Lowercased token surfaces.
    pub tokens: Vec<String>,
    /// One cell per token; see [`ConceptMask`] for the encoding.
    pub concept_mask: ConceptMask,
    /// `concept_ids[k]` is the concept whose span is marked `k`.
    pub concept_ids: Vec<DbId>,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnnotation {
    pub text: String,
    pub tokens: Vec<String>,
    pub concept_mask: ConceptMask,
    pub concept_ids: Vec<DbId>,
    pub created_by: Option<DbId>,
}

/// Assembly result for one annotation text, not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preprocessed {
    pub text: String,
    pub tokens: Vec<String>,
    pub concept_mask: ConceptMask,
    pub concept_ids: Vec<DbId>,
    pub concepts: Vec<Concept>,
}

impl Preprocessed {
    fn into_new(self, created_by: Option<DbId>) -> NewAnnotation {
        NewAnnotation {
            text: self.text,
            tokens: self.tokens,
            concept_mask: self.concept_mask,
            concept_ids: self.concept_ids,
            created_by,
        }
    }
}

/// Phrases and label spans of one line, before concept resolution.
struct LineDraft {
    text: String,
    doc: AnalyzedDoc,
    phrases: Vec<NounPhrase>,
    label_spans: Vec<Range<usize>>,
}

impl LineDraft {
    fn new(text: String, doc: AnalyzedDoc, items: Vec<Extraction>) -> Self {
        let mut phrases = Vec::new();
        let mut label_spans = Vec::new();
        for item in items {
            match item {
                Extraction::Phrase(phrase) => phrases.push(phrase),
                Extraction::LabelSpan { start, end } => label_spans.push(start..end),
            }
        }
        Self {
            text,
            doc,
            phrases,
            label_spans,
        }
    }

    fn finish(self, concepts: Vec<Concept>, label_index: i64) -> CoreResult<Preprocessed> {
        let tokens: Vec<String> = self.doc.tokens.iter().map(|t| t.lower()).collect();
        let spans: Vec<Range<usize>> = self
            .phrases
            .iter()
            .map(|p| p.token_start..p.token_end)
            .collect();
        let concept_mask = ConceptMask::build(tokens.len(), &spans, &self.label_spans, label_index)?;
        Ok(Preprocessed {
            text: self.text,
            tokens,
            concept_mask,
            concept_ids: concepts.iter().map(|c| c.id).collect(),
            concepts,
        })
    }
}

#[derive(Clone)]
pub struct Assembler {
    store: Arc<dyn Store>,
    analyzer: Arc<dyn Analyzer>,
    concepts: ConceptCatalog,
    stats: StatsEngine,
}

impl Assembler {
    pub fn new(store: Arc<dyn Store>, analyzer: Arc<dyn Analyzer>, stats: StatsEngine) -> Self {
        let concepts = ConceptCatalog::new(store.clone());
        Self {
            store,
            analyzer,
            concepts,
            stats,
        }
    }

    async fn label(&self, label_id: DbId) -> CoreResult<Label> {
        self.store
            .find_label(label_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Label", label_id))
    }

    async fn object(&self, object_id: DbId) -> CoreResult<DetectedObject> {
        self.store
            .find_object(object_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Object", object_id))
    }

    /// Assemble one text against a label. Writes corpus words and concepts
    /// but no annotation.
    pub async fn preprocess(&self, text: &str, label_id: DbId) -> CoreResult<Preprocessed> {
        let label = self.label(label_id).await?;
        let text = normalize_annotation(text);
        if text.is_empty() {
            return Err(CoreError::Validation("annotation text must not be empty".into()));
        }
        let doc = self.analyzer.analyze(&text).await?;
        let items = noun_phrase::extract(&doc, &label.token_set());
        let draft = LineDraft::new(text, doc, items);
        let concepts = self.concepts.find_or_add_many(&draft.phrases).await?;
        draft.finish(concepts, label.label_index)
    }

    /// Assemble several texts with one analyzer call and one concept batch.
    ///
    /// Results are in input order; blank texts yield a validation error in
    /// their slot.
    pub async fn preprocess_many(&self, texts: &[String], label: &Label) -> CoreResult<Vec<CoreResult<Preprocessed>>> {
        let joined = join_document(texts);
        let doc = self.analyzer.analyze(&joined.text).await?;
        let lines = noun_phrase::extract_lines(&doc, &joined, &label.token_set());

        let mut drafts: Vec<CoreResult<LineDraft>> = Vec::with_capacity(lines.len());
        for line in lines {
            let text = joined.text[joined.line_ranges[line.line].clone()].to_string();
            if text.is_empty() {
                drafts.push(Err(CoreError::Validation(format!(
                    "annotation {} is empty",
                    line.line
                ))));
            } else {
                drafts.push(Ok(LineDraft::new(text, line.doc, line.items)));
            }
        }

        let all_phrases: Vec<NounPhrase> = drafts
            .iter()
            .flatten()
            .flat_map(|d| d.phrases.iter().cloned())
            .collect();
        let mut concepts = self
            .concepts
            .find_or_add_many(&all_phrases)
            .await?
            .into_iter();

        Ok(drafts
            .into_iter()
            .map(|draft| {
                draft.and_then(|d| {
                    let own: Vec<Concept> = concepts.by_ref().take(d.phrases.len()).collect();
                    d.finish(own, label.label_index)
                })
            })
            .collect())
    }

    pub async fn insert_annotation(&self, object_id: DbId, text: &str, created_by: Option<DbId>) -> CoreResult<Annotation> {
        self.insert_annotations(object_id, &[text.to_string()], created_by, false)
            .await?
            .pop()
            .ok_or_else(|| CoreError::Internal("annotation insert returned nothing".into()))
    }

    /// Insert several annotations under one object, in input order.
    ///
    /// With `skip_invalid`, texts failing validation are logged and left out;
    /// otherwise the first failure aborts before any annotation is written.
    pub async fn insert_annotations(
        &self,
        object_id: DbId,
        texts: &[String],
        created_by: Option<DbId>,
        skip_invalid: bool,
    ) -> CoreResult<Vec<Annotation>> {
        if texts.is_empty() {
            return Err(CoreError::Validation("no annotations given".into()));
        }
        let object = self.object(object_id).await?;
        let label = self.label(object.label_id).await?;

        let mut new = Vec::with_capacity(texts.len());
        for (position, result) in self.preprocess_many(texts, &label).await?.into_iter().enumerate() {
            match result {
                Ok(pre) => new.push(pre.into_new(created_by)),
                Err(e) if skip_invalid => {
                    tracing::warn!(object_id, position, error = %e, "Skipping invalid annotation");
                }
                Err(e) => return Err(e),
            }
        }
        if new.is_empty() {
            return Ok(Vec::new());
        }

        let inserted = self.store.insert_annotations(object_id, &new).await?;
        let mut touched: Vec<DbId> = inserted.iter().flat_map(|a| a.concept_ids.iter().copied()).collect();
        touched.sort_unstable();
        touched.dedup();
        self.stats
            .annotations_changed(object.label_id, object.image_id, &touched)
            .await;
        tracing::info!(
            object_id,
            image_id = object.image_id,
            count = inserted.len(),
            "Annotations created"
        );
        Ok(inserted)
    }

    pub async fn get_annotation(&self, id: DbId) -> CoreResult<Annotation> {
        self.store
            .find_annotation(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Annotation", id))
    }

    /// Mark `[start, end)` of an annotation as one concept.
    ///
    /// Returns `None`, writing nothing, when the range holds no noun phrase.
    pub async fn update_concept_at_range(&self, annotation_id: DbId, start: usize, end: usize) -> CoreResult<Option<Annotation>> {
        let annotation = self.get_annotation(annotation_id).await?;
        if start >= end || end > annotation.tokens.len() {
            return Err(CoreError::Validation(format!(
                "range [{start}, {end}) is outside 0..{}",
                annotation.tokens.len()
            )));
        }

        let phrase_text = reconstruct_phrase(&annotation.tokens[start..end]);
        let doc = self.analyzer.analyze(&phrase_text).await?;
        let Some(phrase) = noun_phrase::extract_whole(&doc) else {
            tracing::debug!(annotation_id, start, end, phrase = %phrase_text, "No noun phrase in range");
            return Ok(None);
        };
        let (concept, _) = self.concepts.find_or_add_from_phrase(&phrase).await?;

        let (mask, concept_ids) =
            annotation
                .concept_mask
                .merge_range(&annotation.concept_ids, start..end, concept.id)?;
        let updated = self
            .store
            .update_annotation_concepts(annotation_id, &mask, &concept_ids)
            .await?
            .ok_or_else(|| CoreError::not_found("Annotation", annotation_id))?;

        let mut touched = annotation.concept_ids.clone();
        touched.extend(&updated.concept_ids);
        touched.sort_unstable();
        touched.dedup();
        self.invalidate_for(updated.object_id, &touched).await;
        tracing::info!(annotation_id, concept_id = concept.id, start, end, "Concept range updated");
        Ok(Some(updated))
    }

    pub async fn delete_annotation(&self, id: DbId) -> CoreResult<Annotation> {
        let deleted = self
            .store
            .delete_annotation(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Annotation", id))?;
        self.invalidate_for(deleted.object_id, &deleted.concept_ids).await;
        tracing::info!(annotation_id = id, object_id = deleted.object_id, "Annotation deleted");
        Ok(deleted)
    }

    async fn invalidate_for(&self, object_id: DbId, concept_ids: &[DbId]) {
        match self.store.find_object(object_id).await {
            Ok(Some(object)) => {
                self.stats
                    .annotations_changed(object.label_id, object.image_id, concept_ids)
                    .await;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(object_id, error = %e, "Failed to look up object for invalidation");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Duration;

    use super::*;
    use crate::concept::concept_key;
    use crate::corpus::Corpus;
    use crate::image::{BoundingBox, ImageCatalog, NewImage, NewObject};
    use crate::label::{LabelService, NewLabel};
    use crate::memory::InMemoryStore;
    use crate::nlp::lexicon::LexiconAnalyzer;
    use crate::stats::{AggregateKind, ImagePriority, ReadMode, RecomputeStamp, DEFAULT_STALE_GRACE_SECS};
    use crate::store::{AggregateStore, LabelStore};

    const FOX_SENTENCE: &str = "This is a fox, because it has orange fur.";

    struct Fixture {
        store: Arc<InMemoryStore>,
        assembler: Assembler,
        stats: StatsEngine,
        images: ImageCatalog,
        labels: LabelService,
        fox: Label,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            let stats = StatsEngine::new(store.clone(), Duration::seconds(DEFAULT_STALE_GRACE_SECS));
            let assembler = Assembler::new(store.clone(), Arc::new(LexiconAnalyzer::new()), stats.clone());
            let images = ImageCatalog::new(store.clone(), stats.clone());
            let labels = LabelService::new(store.clone(), stats.clone());
            for name in ["cat", "dog", "owl"] {
                labels.create_label(name, &[]).await.unwrap();
            }
            let fox = labels.create_label("fox", &[]).await.unwrap();
            Self {
                store,
                assembler,
                stats,
                images,
                labels,
                fox,
            }
        }

        async fn image_with_object(&self, label_id: DbId) -> (DbId, DbId) {
            let image = self
                .images
                .create_image(&NewImage {
                    file_name: "img.jpg".into(),
                    width: 100,
                    height: 100,
                })
                .await
                .unwrap();
            let object = self.add_object(image.id, label_id).await;
            (image.id, object)
        }

        async fn add_object(&self, image_id: DbId, label_id: DbId) -> DbId {
            self.images
                .add_object(&NewObject {
                    image_id,
                    label_id,
                    bbox: BoundingBox {
                        x: 0.0,
                        y: 0.0,
                        width: 10.0,
                        height: 10.0,
                    },
                })
                .await
                .unwrap()
                .id
        }
    }

    #[tokio::test]
    async fn fox_sentence_tokens_mask_and_concept() {
        let fx = Fixture::new().await;
        assert_eq!(fx.fox.label_index, 3);
        let (_, object_id) = fx.image_with_object(fx.fox.id).await;

        let annotation = fx
            .assembler
            .insert_annotation(object_id, FOX_SENTENCE, Some(7))
            .await
            .unwrap();
        assert_eq!(
            annotation.tokens,
            vec!["this", "is", "a", "fox", ",", "because", "it", "has", "orange", "fur"]
        );
        assert_eq!(
            annotation.concept_mask.as_slice(),
            &[-1, -1, -1, -5, -1, -1, -1, -1, 0, 0]
        );
        assert_eq!(annotation.concept_ids.len(), 1);
        assert_eq!(annotation.created_by, Some(7));

        let concept = crate::concept::ConceptCatalog::new(fx.store.clone())
            .get(annotation.concept_ids[0])
            .await
            .unwrap();
        assert_eq!(concept.surfaces, vec!["orange", "fur"]);
        assert_eq!(concept.noun_count, 1);
        let indices = Corpus::new(fx.store.clone())
            .lemma_indices(&["orange".into(), "fur".into()])
            .await
            .unwrap();
        assert_eq!(concept.key, concept_key(&[indices["orange"], indices["fur"]]));
    }

    #[tokio::test]
    async fn repeated_insert_reuses_corpus_and_concepts() {
        let fx = Fixture::new().await;
        let (_, object_id) = fx.image_with_object(fx.fox.id).await;
        let before = fx.store.corpus_size();

        fx.assembler.insert_annotation(object_id, FOX_SENTENCE, None).await.unwrap();
        assert_eq!(fx.store.corpus_size(), before + 2);
        assert_eq!(fx.store.concept_count(), 1);

        fx.assembler.insert_annotation(object_id, FOX_SENTENCE, None).await.unwrap();
        assert_eq!(fx.store.corpus_size(), before + 2);
        assert_eq!(fx.store.concept_count(), 1);
    }

    #[tokio::test]
    async fn preprocess_does_not_persist_the_annotation() {
        let fx = Fixture::new().await;
        let pre = fx.assembler.preprocess(FOX_SENTENCE, fx.fox.id).await.unwrap();
        assert_eq!(pre.text, "This is a fox, because it has orange fur");
        assert_eq!(pre.concept_ids.len(), 1);
        assert_eq!(pre.concepts[0].surfaces, vec!["orange", "fur"]);
        assert_matches!(fx.assembler.get_annotation(1).await, Err(CoreError::NotFound { .. }));
        assert_matches!(
            fx.assembler.preprocess(FOX_SENTENCE, 999).await,
            Err(CoreError::NotFound { entity: "Label", .. })
        );
    }

    #[tokio::test]
    async fn batch_lines_resolve_against_the_pinned_chunker() {
        let fx = Fixture::new().await;
        let (_, object_id) = fx.image_with_object(fx.fox.id).await;
        let texts = vec!["blue beak.".to_string(), "small blue beak and wings.".to_string()];
        let inserted = fx
            .assembler
            .insert_annotations(object_id, &texts, None, false)
            .await
            .unwrap();
        assert_eq!(inserted.len(), 2);

        // The lexicon chunker yields [blue beak] and [small blue beak] [wings];
        // the single-token chunk is skipped.
        let catalog = crate::concept::ConceptCatalog::new(fx.store.clone());
        let first = catalog.get(inserted[0].concept_ids[0]).await.unwrap();
        let second = catalog.get(inserted[1].concept_ids[0]).await.unwrap();
        assert_eq!(first.surfaces, vec!["blue", "beak"]);
        assert_eq!(second.surfaces, vec!["small", "blue", "beak"]);
        assert_eq!(inserted[1].tokens, vec!["small", "blue", "beak", "and", "wings"]);
        assert_eq!(inserted[1].concept_mask.as_slice(), &[0, 0, 0, -1, -1]);
        assert_eq!(fx.store.concept_count(), 2);
    }

    #[tokio::test]
    async fn invalid_batch_entries_skip_or_abort() {
        let fx = Fixture::new().await;
        let (_, object_id) = fx.image_with_object(fx.fox.id).await;
        let texts = vec!["blue beak".to_string(), " ".to_string(), "long tail".to_string()];

        assert_matches!(
            fx.assembler.insert_annotations(object_id, &texts, None, false).await,
            Err(CoreError::Validation(_))
        );
        assert_matches!(fx.assembler.get_annotation(1).await, Err(CoreError::NotFound { .. }));

        let kept = fx
            .assembler
            .insert_annotations(object_id, &texts, None, true)
            .await
            .unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].text, "blue beak");
        assert_eq!(kept[1].text, "long tail");
    }

    #[tokio::test]
    async fn range_update_round_trips_to_the_same_concept() {
        let fx = Fixture::new().await;
        let (_, object_id) = fx.image_with_object(fx.fox.id).await;
        let annotation = fx
            .assembler
            .insert_annotation(object_id, FOX_SENTENCE, None)
            .await
            .unwrap();

        let updated = fx
            .assembler
            .update_concept_at_range(annotation.id, 8, 10)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.concept_ids, annotation.concept_ids);
        assert_eq!(updated.concept_mask, annotation.concept_mask);
    }

    #[tokio::test]
    async fn range_update_adds_replaces_or_declines() {
        let fx = Fixture::new().await;
        let (_, object_id) = fx.image_with_object(fx.fox.id).await;
        let annotation = fx
            .assembler
            .insert_annotation(object_id, FOX_SENTENCE, None)
            .await
            .unwrap();

        // The label mention becomes a concept of its own, ahead of "orange fur".
        let updated = fx
            .assembler
            .update_concept_at_range(annotation.id, 3, 4)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            updated.concept_mask.as_slice(),
            &[-1, -1, -1, 0, -1, -1, -1, -1, 1, 1]
        );
        assert_eq!(updated.concept_ids[1], annotation.concept_ids[0]);
        updated
            .concept_mask
            .validate(updated.tokens.len(), updated.concept_ids.len())
            .unwrap();

        // "because" carries no noun phrase.
        assert!(fx
            .assembler
            .update_concept_at_range(annotation.id, 5, 6)
            .await
            .unwrap()
            .is_none());
        assert_eq!(fx.assembler.get_annotation(annotation.id).await.unwrap(), updated);

        assert_matches!(
            fx.assembler.update_concept_at_range(annotation.id, 9, 11).await,
            Err(CoreError::Validation(_))
        );
    }

    #[tokio::test]
    async fn next_progress_read_reflects_new_annotation() {
        let fx = Fixture::new().await;
        let (image_id, object_id) = fx.image_with_object(fx.fox.id).await;
        let project = fx.images.create_project("foxes").await.unwrap();
        fx.images
            .add_images_to_project(project.id, &[image_id])
            .await
            .unwrap();

        let before = fx.stats.project_progress(project.id, ReadMode::Cached).await.unwrap();
        assert_eq!((before.num_docs, before.total_prio, before.progress), (1, 1.0, 0.0));

        fx.assembler.insert_annotation(object_id, FOX_SENTENCE, None).await.unwrap();
        let states = fx
            .store
            .aggregate_states(AggregateKind::ProjectProgress, &[project.id])
            .await
            .unwrap();
        assert!(!states[0].is_valid);

        let after = fx.stats.project_progress(project.id, ReadMode::Cached).await.unwrap();
        assert_eq!((after.num_docs, after.total_prio, after.progress), (1, 0.0, 1.0));
        let states = fx
            .store
            .aggregate_states(AggregateKind::ProjectProgress, &[project.id])
            .await
            .unwrap();
        assert!(states[0].is_valid);
    }

    #[tokio::test]
    async fn label_index_beyond_mask_range_is_rejected() {
        let fx = Fixture::new().await;
        let huge = fx
            .store
            .insert_label(&NewLabel {
                label_index: i64::from(i32::MAX),
                name: "yak".into(),
                name_tokens: vec!["yak".into()],
                token_lemma_indices: Vec::new(),
                categories: Vec::new(),
            })
            .await
            .unwrap();
        assert_matches!(
            fx.assembler.preprocess("a yak with long hair", huge.id).await,
            Err(CoreError::Validation(_))
        );
    }

    #[tokio::test]
    async fn expired_records_are_recomputed_without_invalidation() {
        let fx = Fixture::new().await;
        let (_, object_id) = fx.image_with_object(fx.fox.id).await;
        fx.assembler.insert_annotation(object_id, "orange fur", None).await.unwrap();

        // Four labels, the concept under one of them.
        let first = fx.stats.tf_idf(fx.fox.id, 0, 50, ReadMode::Cached).await.unwrap();
        assert!((first[0].tf_idf - 4f64.ln()).abs() < 1e-9);

        // Labels written straight to the store skip the invalidation hook.
        for (name, label_index) in [("elk", 40), ("emu", 41)] {
            fx.store
                .insert_label(&NewLabel {
                    label_index,
                    name: name.into(),
                    name_tokens: vec![name.into()],
                    token_lemma_indices: Vec::new(),
                    categories: Vec::new(),
                })
                .await
                .unwrap();
        }
        let cached = fx.stats.tf_idf(fx.fox.id, 0, 50, ReadMode::Cached).await.unwrap();
        assert_eq!(cached, first);

        fx.store.age_aggregates(Duration::hours(1));
        let repaired = fx.stats.tf_idf(fx.fox.id, 0, 50, ReadMode::Cached).await.unwrap();
        assert!((repaired[0].tf_idf - 6f64.ln()).abs() < 1e-9);
    }

    #[tokio::test]
    async fn invalidation_during_recompute_is_not_lost() {
        let fx = Fixture::new().await;
        let (image_id, object_id) = fx.image_with_object(fx.fox.id).await;
        assert_eq!(fx.stats.image_priority(image_id, ReadMode::Cached).await.unwrap(), 1.0);

        // A recompute reads the state, then an annotation lands before it saves.
        let states = fx
            .store
            .aggregate_states(AggregateKind::ImagePriority, &[image_id])
            .await
            .unwrap();
        let stamp = RecomputeStamp::new(chrono::Utc::now(), &states);
        fx.assembler.insert_annotation(object_id, "orange fur", None).await.unwrap();
        fx.store
            .save_image_priorities(&[ImagePriority { image_id, priority: 1.0 }], &stamp)
            .await
            .unwrap();

        let states = fx
            .store
            .aggregate_states(AggregateKind::ImagePriority, &[image_id])
            .await
            .unwrap();
        assert!(!states[0].is_valid);
        assert_eq!(fx.stats.image_priority(image_id, ReadMode::Cached).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn deleting_annotations_restores_priority() {
        let fx = Fixture::new().await;
        let (image_id, object_id) = fx.image_with_object(fx.fox.id).await;
        fx.add_object(image_id, fx.fox.id).await;
        let annotation = fx
            .assembler
            .insert_annotation(object_id, "orange fur", None)
            .await
            .unwrap();
        assert_eq!(fx.stats.image_priority(image_id, ReadMode::Force).await.unwrap(), 0.5);

        fx.assembler.delete_annotation(annotation.id).await.unwrap();
        assert_eq!(fx.stats.image_priority(image_id, ReadMode::Force).await.unwrap(), 1.0);
        assert_matches!(
            fx.assembler.delete_annotation(annotation.id).await,
            Err(CoreError::NotFound { entity: "Annotation", .. })
        );
    }

    #[tokio::test]
    async fn tf_idf_ranks_label_specific_concepts_first() {
        let fx = Fixture::new().await;
        let owl = fx.labels.create_label("snowy owl", &[]).await.unwrap();
        let (_, fox_object) = fx.image_with_object(fx.fox.id).await;
        let (_, owl_object) = fx.image_with_object(owl.id).await;
        fx.assembler.insert_annotation(fox_object, "orange fur", None).await.unwrap();
        let owl_annotations = fx
            .assembler
            .insert_annotations(owl_object, &["orange fur".into(), "long tail".into()], None, false)
            .await
            .unwrap();
        let orange_fur = owl_annotations[0].concept_ids[0];
        let long_tail = owl_annotations[1].concept_ids[0];

        // Five labels; "orange fur" appears under two, "long tail" under one.
        let scores = fx.stats.tf_idf(owl.id, 0, 50, ReadMode::Cached).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].concept_id, long_tail);
        assert!((scores[0].tf_idf - 5f64.ln()).abs() < 1e-9);
        assert_eq!(scores[1].concept_id, orange_fur);
        assert!((scores[1].tf_idf - 2.5f64.ln()).abs() < 1e-9);

        let second_page = fx.stats.tf_idf(owl.id, 1, 1, ReadMode::Cached).await.unwrap();
        assert_eq!(second_page[0].concept_id, orange_fur);
        assert!(fx.stats.tf_idf(owl.id, 5, 50, ReadMode::Cached).await.unwrap().is_empty());

        // Recomputation is idempotent.
        fx.stats.recompute(AggregateKind::ConceptTfIdf, owl.id).await.unwrap();
        assert_eq!(fx.stats.tf_idf(owl.id, 0, 50, ReadMode::Cached).await.unwrap(), scores);

        // A fox annotation touching "orange fur" invalidates the owl ranking too.
        fx.assembler.insert_annotation(fox_object, "orange fur", None).await.unwrap();
        let states = fx
            .store
            .aggregate_states(AggregateKind::ConceptTfIdf, &[owl.id])
            .await
            .unwrap();
        assert!(!states[0].is_valid);
    }

    #[tokio::test]
    async fn every_annotation_mask_is_consistent() {
        let fx = Fixture::new().await;
        let (_, object_id) = fx.image_with_object(fx.fox.id).await;
        let texts: Vec<String> = [
            "A small fox with a bushy tail and black-and-white paws.",
            "The fox sits near a tall tree",
            "orange fur, long legs and pointed ears",
            "it",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        for annotation in fx
            .assembler
            .insert_annotations(object_id, &texts, None, false)
            .await
            .unwrap()
        {
            annotation
                .concept_mask
                .validate(annotation.tokens.len(), annotation.concept_ids.len())
                .unwrap();
        }
    }
}
