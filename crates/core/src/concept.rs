//! Concepts: canonical multi-word noun phrases identified by the sorted
//! lemma indices of their words.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::corpus::{Corpus, CorpusWord, Resolved, WordInput};
use crate::error::{CoreError, CoreResult};
use crate::nlp::Analyzer;
use crate::noun_phrase::{self, NounPhrase, PhraseToken};
use crate::store::Store;
use crate::text::normalize_annotation;
use crate::types::{DbId, Timestamp};

/// Default number of results returned by relevance search.
pub const DEFAULT_RELEVANCE_LIMIT: i64 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    pub id: DbId,
    /// Comma-joined ascending lemma indices. Unique.
    pub key: String,
    /// Sorted, deduplicated.
    pub lemma_indices: Vec<i64>,
    /// Corpus word ids, adjectives first then nouns, in order of first
    /// appearance within each role.
    pub word_ids: Vec<DbId>,
    /// Surfaces aligned with `word_ids`, as first observed.
    pub surfaces: Vec<String>,
    pub noun_count: i32,
    pub root_noun_id: DbId,
    /// Reference to an external ML artifact; never part of identity.
    pub filter_index: Option<i32>,
    pub created_at: Timestamp,
}

/// A concept ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConcept {
    pub key: String,
    pub lemma_indices: Vec<i64>,
    pub word_ids: Vec<DbId>,
    pub surfaces: Vec<String>,
    pub noun_count: i32,
    pub root_noun_id: DbId,
}

/// A relevance-search hit: the concept and how many lemma indices it shares
/// with the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptMatch {
    pub concept: Concept,
    pub matches: i64,
}

/// Canonical key: ascending, deduplicated, comma-joined decimal indices.
pub fn concept_key(lemma_indices: &[i64]) -> String {
    let mut sorted = lemma_indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn word_input(token: &PhraseToken) -> WordInput {
    WordInput::new(token.surface.clone(), token.pos.is_noun(), Some(token.lemma.clone()))
}

/// Build the insertable concept for one phrase from its resolved words.
///
/// `words` is aligned with [`NounPhrase::words`].
fn assemble(phrase: &NounPhrase, words: &[CorpusWord]) -> CoreResult<NewConcept> {
    let root_position = phrase
        .words()
        .iter()
        .position(|t| **t == phrase.root_noun)
        .ok_or_else(|| CoreError::Internal("phrase root is missing from its words".into()))?;
    let root_noun_id = words[root_position].id;

    let mut lemma_indices: Vec<i64> = Vec::with_capacity(words.len());
    let mut word_ids = Vec::with_capacity(words.len());
    let mut surfaces = Vec::with_capacity(words.len());
    for word in words {
        if lemma_indices.contains(&word.lemma_index) {
            continue;
        }
        lemma_indices.push(word.lemma_index);
        word_ids.push(word.id);
        surfaces.push(word.surface.clone());
    }
    let key = concept_key(&lemma_indices);
    lemma_indices.sort_unstable();

    Ok(NewConcept {
        key,
        lemma_indices,
        word_ids,
        surfaces,
        noun_count: phrase.nouns.len().max(1) as i32,
        root_noun_id,
    })
}

/// Concept store service.
#[derive(Clone)]
pub struct ConceptCatalog {
    store: Arc<dyn Store>,
    corpus: Corpus,
}

impl ConceptCatalog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let corpus = Corpus::new(store.clone());
        Self { store, corpus }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub async fn get(&self, id: DbId) -> CoreResult<Concept> {
        self.store
            .find_concepts_by_ids(&[id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::not_found("Concept", id))
    }

    pub async fn find_by_key(&self, key: &str) -> CoreResult<Option<Concept>> {
        Ok(self
            .store
            .find_concepts_by_keys(&[key.to_string()])
            .await?
            .into_iter()
            .next())
    }

    pub async fn find_or_add_from_phrase(&self, phrase: &NounPhrase) -> CoreResult<(Concept, bool)> {
        let resolved = self
            .resolve_many(std::slice::from_ref(phrase))
            .await?
            .pop()
            .ok_or_else(|| CoreError::Internal("concept resolution returned nothing".into()))?;
        Ok((resolved.record, resolved.created))
    }

    /// Resolve many phrases, returned in input order with duplicates kept.
    pub async fn find_or_add_many(&self, phrases: &[NounPhrase]) -> CoreResult<Vec<Concept>> {
        Ok(self
            .resolve_many(phrases)
            .await?
            .into_iter()
            .map(|r| r.record)
            .collect())
    }

    /// One corpus batch, one select by key and at most one insert.
    pub async fn resolve_many(&self, phrases: &[NounPhrase]) -> CoreResult<Vec<Resolved<Concept>>> {
        if phrases.is_empty() {
            return Ok(Vec::new());
        }

        let mut inputs = Vec::new();
        let mut bounds = Vec::with_capacity(phrases.len());
        for phrase in phrases {
            let start = inputs.len();
            inputs.extend(phrase.words().into_iter().map(word_input));
            bounds.push(start..inputs.len());
        }
        let words = self.corpus.find_or_add_many(&inputs).await?;

        let candidates: Vec<NewConcept> = phrases
            .iter()
            .zip(&bounds)
            .map(|(phrase, range)| assemble(phrase, &words[range.clone()]))
            .collect::<CoreResult<_>>()?;

        let mut keys: Vec<String> = candidates.iter().map(|c| c.key.clone()).collect();
        keys.sort();
        keys.dedup();
        let mut by_key: HashMap<String, Resolved<Concept>> = self
            .store
            .find_concepts_by_keys(&keys)
            .await?
            .into_iter()
            .map(|c| {
                (
                    c.key.clone(),
                    Resolved {
                        record: c,
                        created: false,
                    },
                )
            })
            .collect();

        let mut missing: Vec<NewConcept> = Vec::new();
        for candidate in &candidates {
            if !by_key.contains_key(&candidate.key) && !missing.iter().any(|m| m.key == candidate.key) {
                missing.push(candidate.clone());
            }
        }
        if !missing.is_empty() {
            let inserted = self.store.insert_concepts(&missing).await?;
            tracing::debug!(
                requested = missing.len(),
                created = inserted.iter().filter(|r| r.created).count(),
                "Concepts inserted"
            );
            for resolved in inserted {
                by_key.insert(resolved.record.key.clone(), resolved);
            }
        }

        // A concept created by this call reports `created` only at its
        // first position.
        let mut reported: Vec<DbId> = Vec::new();
        candidates
            .iter()
            .map(|candidate| {
                let mut resolved = by_key.get(&candidate.key).cloned().ok_or_else(|| {
                    CoreError::Internal(format!("concept '{}' was not resolved", candidate.key))
                })?;
                if reported.contains(&resolved.record.id) {
                    resolved.created = false;
                } else {
                    reported.push(resolved.record.id);
                }
                Ok(resolved)
            })
            .collect()
    }

    /// Concepts sharing the most lemma indices with `phrase`.
    ///
    /// Read-only: words of the phrase unknown to the corpus are ignored.
    pub async fn find_by_relevance(&self, phrase: &NounPhrase, limit: i64) -> CoreResult<Vec<ConceptMatch>> {
        let lemmas: Vec<String> = phrase.words().iter().map(|t| t.lemma.clone()).collect();
        let known = self.corpus.lemma_indices(&lemmas).await?;
        let mut indices: Vec<i64> = known.into_values().collect();
        indices.sort_unstable();
        indices.dedup();
        if indices.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .find_concepts_overlapping(&indices, limit.max(1))
            .await?)
    }

    /// Analyze free text as one phrase and run [`Self::find_by_relevance`].
    pub async fn search(
        &self,
        analyzer: &dyn Analyzer,
        query: &str,
        limit: i64,
    ) -> CoreResult<Vec<ConceptMatch>> {
        let text = normalize_annotation(query);
        if text.is_empty() {
            return Err(CoreError::Validation("search query must not be empty".into()));
        }
        let doc = analyzer.analyze(&text).await?;
        match noun_phrase::extract_whole(&doc) {
            Some(phrase) => self.find_by_relevance(&phrase, limit).await,
            None => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::memory::InMemoryStore;
    use crate::nlp::lexicon::LexiconAnalyzer;
    use crate::noun_phrase::Extraction;

    fn catalog() -> (Arc<InMemoryStore>, ConceptCatalog) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), ConceptCatalog::new(store))
    }

    async fn phrases(text: &str) -> Vec<NounPhrase> {
        let doc = LexiconAnalyzer::new().analyze(text).await.unwrap();
        noun_phrase::extract(&doc, &HashSet::new())
            .into_iter()
            .filter_map(|item| match item {
                Extraction::Phrase(p) => Some(p),
                Extraction::LabelSpan { .. } => None,
            })
            .collect()
    }

    #[test]
    fn key_is_sorted_and_deduplicated() {
        assert_eq!(concept_key(&[7, 2, 7, 10]), "2,7,10");
        assert_eq!(concept_key(&[]), "");
    }

    #[tokio::test]
    async fn key_matches_sorted_lemma_indices() {
        let (_, catalog) = catalog();
        let phrase = phrases("orange fur").await.remove(0);
        let (concept, created) = catalog.find_or_add_from_phrase(&phrase).await.unwrap();
        assert!(created);
        assert_eq!(concept.surfaces, vec!["orange", "fur"]);
        assert_eq!(concept.noun_count, 1);
        assert_eq!(concept.key, concept_key(&concept.lemma_indices));
        let mut sorted = concept.lemma_indices.clone();
        sorted.sort_unstable();
        assert_eq!(concept.lemma_indices, sorted);
    }

    #[tokio::test]
    async fn identical_lemma_sets_collapse_to_one_concept() {
        let (_, catalog) = catalog();
        let first = phrases("small wings").await.remove(0);
        let second = phrases("small wing").await.remove(0);
        let (a, created_a) = catalog.find_or_add_from_phrase(&first).await.unwrap();
        let (b, created_b) = catalog.find_or_add_from_phrase(&second).await.unwrap();
        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a.id, b.id);
        assert_eq!(b.surfaces, vec!["small", "wings"]);
    }

    #[tokio::test]
    async fn batch_preserves_order_and_duplicates() {
        let (store, catalog) = catalog();
        let mut input = phrases("blue beak").await;
        input.extend(phrases("long tail").await);
        input.extend(phrases("blue beak").await);
        let resolved = catalog.resolve_many(&input).await.unwrap();
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0].record.id, resolved[2].record.id);
        assert_ne!(resolved[0].record.id, resolved[1].record.id);
        assert!(resolved[0].created);
        assert!(!resolved[2].created);
        assert_eq!(store.concept_count(), 2);
    }

    #[tokio::test]
    async fn root_outside_nouns_is_part_of_the_key() {
        let (_, catalog) = catalog();
        let phrase = phrases("yellow").await;
        // Single-token chunks are skipped; build an adjective-only phrase by
        // hand through the range extractor instead.
        assert!(phrase.is_empty());
        let doc = LexiconAnalyzer::new().analyze("very yellow").await.unwrap();
        let phrase = noun_phrase::extract_whole(&doc).unwrap();
        let (concept, _) = catalog.find_or_add_from_phrase(&phrase).await.unwrap();
        assert_eq!(concept.surfaces, vec!["yellow", "subject"]);
        assert_eq!(concept.lemma_indices.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_of_one_phrase_resolve_to_one_concept() {
        let (store, catalog) = catalog();
        let phrase = phrases("orange fur").await.remove(0);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let catalog = catalog.clone();
                let phrase = phrase.clone();
                tokio::spawn(async move { catalog.find_or_add_from_phrase(&phrase).await })
            })
            .collect();

        let mut ids = HashSet::new();
        let mut created = 0;
        for handle in handles {
            let (concept, was_created) = handle.await.unwrap().unwrap();
            ids.insert(concept.id);
            created += usize::from(was_created);
        }
        assert_eq!(ids.len(), 1);
        assert_eq!(created, 1);
        assert_eq!(store.concept_count(), 1);
    }

    #[tokio::test]
    async fn relevance_ranks_by_shared_lemmas() {
        let (_, catalog) = catalog();
        let batch = [
            phrases("small blue beak").await,
            phrases("blue wings").await,
            phrases("long tail").await,
        ]
        .concat();
        let concepts = catalog.find_or_add_many(&batch).await.unwrap();

        let query = phrases("blue beak").await.remove(0);
        let hits = catalog.find_by_relevance(&query, 10).await.unwrap();
        assert_eq!(hits[0].concept.id, concepts[0].id);
        assert_eq!(hits[0].matches, 2);
        assert_eq!(hits[1].concept.id, concepts[1].id);
        assert_eq!(hits[1].matches, 1);
        assert!(hits.iter().all(|h| h.concept.id != concepts[2].id));
    }

    #[tokio::test]
    async fn relevance_does_not_grow_the_corpus() {
        let (store, catalog) = catalog();
        let query = phrases("green feathers").await.remove(0);
        assert!(catalog.find_by_relevance(&query, 10).await.unwrap().is_empty());
        assert_eq!(store.corpus_size(), 0);
    }

    #[tokio::test]
    async fn search_rejects_empty_queries() {
        let (_, catalog) = catalog();
        let err = catalog
            .search(&LexiconAnalyzer::new(), " . ", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
