//! Corpus: the canonical dictionary of word lemmas.
//!
//! Every distinct lemma gets a dense, monotonically increasing *lemma index*
//! dispensed by a single shared counter. The same lemma may appear as both a
//! noun and an adjective; those are separate entries sharing one index.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::store::Store;
use crate::types::{DbId, Timestamp};

/// Counter cell backing corpus lemma indices.
pub const CORPUS_COUNTER: &str = "corpus_words_idx";

/// One stored lemma / surface / role triple. Write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusWord {
    pub id: DbId,
    pub lemma_index: i64,
    /// Lowercased surface form.
    pub surface: String,
    /// Lowercased lemma.
    pub lemma: String,
    pub is_noun: bool,
    pub created_at: Timestamp,
}

/// A word ready to be inserted, with its lemma index already allocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCorpusWord {
    pub surface: String,
    pub lemma: String,
    pub is_noun: bool,
    pub lemma_index: i64,
}

/// Caller-side request for a corpus word.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WordInput {
    pub surface: String,
    pub is_noun: bool,
    /// Defaults to the surface form when absent.
    pub lemma: Option<String>,
}

impl WordInput {
    pub fn new(surface: impl Into<String>, is_noun: bool, lemma: Option<String>) -> Self {
        Self {
            surface: surface.into(),
            is_noun,
            lemma,
        }
    }

    /// `(surface, lemma)` lowercased and trimmed.
    fn normalized(&self) -> (String, String) {
        let surface = self.surface.trim().to_lowercase();
        let lemma = self
            .lemma
            .as_deref()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| surface.clone());
        (surface, lemma)
    }
}

/// Result of a find-or-insert: the stored record and whether this call
/// created it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub record: T,
    pub created: bool,
}

/// Corpus service over a shared store.
#[derive(Clone)]
pub struct Corpus {
    store: Arc<dyn Store>,
}

impl Corpus {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Find or insert a single word.
    pub async fn find_or_add(
        &self,
        surface: &str,
        is_noun: bool,
        lemma: Option<&str>,
    ) -> CoreResult<(CorpusWord, bool)> {
        let input = WordInput::new(surface, is_noun, lemma.map(str::to_string));
        let mut resolved = self.resolve_many(std::slice::from_ref(&input)).await?;
        let first = resolved
            .pop()
            .ok_or_else(|| CoreError::Internal("corpus resolution returned nothing".into()))?;
        Ok((first.record, first.created))
    }

    /// Find or insert many words, returned in input order (duplicates kept).
    pub async fn find_or_add_many(&self, inputs: &[WordInput]) -> CoreResult<Vec<CorpusWord>> {
        Ok(self
            .resolve_many(inputs)
            .await?
            .into_iter()
            .map(|r| r.record)
            .collect())
    }

    /// Batched resolution: one lookup read, at most one counter reservation
    /// and one insert.
    pub async fn resolve_many(&self, inputs: &[WordInput]) -> CoreResult<Vec<Resolved<CorpusWord>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        // Dedupe by (surface, is_noun); the first lemma seen wins.
        let normalized: Vec<(String, String, bool)> = inputs
            .iter()
            .map(|input| {
                let (surface, lemma) = input.normalized();
                (surface, lemma, input.is_noun)
            })
            .collect();
        if normalized.iter().any(|(s, _, _)| s.is_empty()) {
            return Err(CoreError::Validation("corpus word surface must not be empty".into()));
        }
        let mut unique: Vec<(String, String, bool)> = Vec::new();
        for item in &normalized {
            if !unique.iter().any(|(s, _, n)| *s == item.0 && *n == item.2) {
                unique.push(item.clone());
            }
        }

        let surfaces: Vec<String> = unique.iter().map(|(s, _, _)| s.clone()).collect();
        let mut lemmas: Vec<String> = unique.iter().map(|(_, l, _)| l.clone()).collect();
        lemmas.sort();
        lemmas.dedup();
        let existing = self.store.find_words(&surfaces, &lemmas).await?;

        let mut by_key: HashMap<(String, bool), Resolved<CorpusWord>> = HashMap::new();
        let mut lemma_index: HashMap<String, i64> = HashMap::new();
        for word in existing {
            lemma_index.insert(word.lemma.clone(), word.lemma_index);
            by_key.insert(
                (word.surface.clone(), word.is_noun),
                Resolved {
                    record: word,
                    created: false,
                },
            );
        }

        let missing: Vec<&(String, String, bool)> = unique
            .iter()
            .filter(|(s, _, n)| !by_key.contains_key(&(s.clone(), *n)))
            .collect();

        if !missing.is_empty() {
            let mut fresh_lemmas: Vec<&str> = Vec::new();
            for (_, lemma, _) in &missing {
                if !lemma_index.contains_key(lemma) && !fresh_lemmas.contains(&lemma.as_str()) {
                    fresh_lemmas.push(lemma);
                }
            }
            if !fresh_lemmas.is_empty() {
                let first = self
                    .store
                    .reserve_indices(CORPUS_COUNTER, fresh_lemmas.len() as i64)
                    .await?;
                for (offset, lemma) in fresh_lemmas.iter().enumerate() {
                    lemma_index.insert(lemma.to_string(), first + offset as i64);
                }
            }

            let new_words: Vec<NewCorpusWord> = missing
                .iter()
                .map(|(surface, lemma, is_noun)| NewCorpusWord {
                    surface: surface.clone(),
                    lemma: lemma.clone(),
                    is_noun: *is_noun,
                    lemma_index: lemma_index[lemma],
                })
                .collect();
            let inserted = self.store.insert_words(&new_words).await?;
            tracing::debug!(
                requested = new_words.len(),
                created = inserted.iter().filter(|r| r.created).count(),
                "Corpus words inserted"
            );
            for resolved in inserted {
                by_key.insert(
                    (resolved.record.surface.clone(), resolved.record.is_noun),
                    resolved,
                );
            }
        }

        normalized
            .into_iter()
            .map(|(surface, _, is_noun)| {
                by_key.get(&(surface.clone(), is_noun)).cloned().ok_or_else(|| {
                    CoreError::Internal(format!("corpus word '{surface}' was not resolved"))
                })
            })
            .collect()
    }

    /// Read-only lookup of lemma indices for the given lemmas.
    pub async fn lemma_indices(&self, lemmas: &[String]) -> CoreResult<HashMap<String, i64>> {
        let lemmas: Vec<String> = lemmas.iter().map(|l| l.to_lowercase()).collect();
        let words = self.store.find_words(&[], &lemmas).await?;
        Ok(words
            .into_iter()
            .map(|w| (w.lemma, w.lemma_index))
            .collect())
    }

    /// Advance the counter past the highest stored lemma index.
    ///
    /// Never moves the counter backwards. Returns the counter value after
    /// the check.
    pub async fn rehydrate_counter(&self) -> CoreResult<i64> {
        let current = self.store.counter_value(CORPUS_COUNTER).await?;
        let Some(max) = self.store.max_lemma_index().await? else {
            return Ok(current);
        };
        if current > max {
            return Ok(current);
        }
        let value = self.store.advance_counter_to(CORPUS_COUNTER, max + 1).await?;
        tracing::warn!(
            previous = current,
            current = value,
            "Corpus counter trailed the dictionary and was advanced"
        );
        Ok(value)
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
    use crate::store::CounterStore;

    fn corpus() -> (Arc<InMemoryStore>, Corpus) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), Corpus::new(store))
    }

    #[tokio::test]
    async fn same_lemma_shares_an_index_across_roles_and_surfaces() {
        let (_, corpus) = corpus();
        let (wing, created) = corpus.find_or_add("wing", true, None).await.unwrap();
        assert!(created);
        let (wings, created) = corpus.find_or_add("Wings", true, Some("wing")).await.unwrap();
        assert!(created);
        assert_eq!(wings.surface, "wings");
        assert_eq!(wing.lemma_index, wings.lemma_index);

        let (orange_adj, _) = corpus.find_or_add("orange", false, None).await.unwrap();
        let (orange_noun, _) = corpus.find_or_add("orange", true, None).await.unwrap();
        assert_ne!(orange_adj.id, orange_noun.id);
        assert_eq!(orange_adj.lemma_index, orange_noun.lemma_index);
    }

    #[tokio::test]
    async fn repeated_lookup_does_not_create() {
        let (_, corpus) = corpus();
        let (first, _) = corpus.find_or_add("fur", true, None).await.unwrap();
        let (second, created) = corpus.find_or_add("fur", true, None).await.unwrap();
        assert!(!created);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn batch_reserves_one_range_and_preserves_order() {
        let (store, corpus) = corpus();
        let inputs = vec![
            WordInput::new("blue", false, None),
            WordInput::new("beak", true, None),
            WordInput::new("blue", false, None),
            WordInput::new("beaks", true, Some("beak".into())),
        ];
        let words = corpus.find_or_add_many(&inputs).await.unwrap();
        assert_eq!(words.len(), 4);
        assert_eq!(words[0], words[2]);
        assert_eq!(words[1].lemma_index, words[3].lemma_index);
        assert_eq!(store.reservations(), 1);
        assert_eq!(store.counter_value(CORPUS_COUNTER).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn fully_known_batch_reserves_nothing() {
        let (store, corpus) = corpus();
        corpus
            .find_or_add_many(&[WordInput::new("tail", true, None)])
            .await
            .unwrap();
        corpus
            .find_or_add_many(&[WordInput::new("tail", true, None)])
            .await
            .unwrap();
        assert_eq!(store.reservations(), 1);
    }

    #[tokio::test]
    async fn empty_surface_is_rejected() {
        let (_, corpus) = corpus();
        let err = corpus.find_or_add("  ", true, None).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_of_one_word_resolve_to_one_record() {
        let (store, corpus) = corpus();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let corpus = corpus.clone();
                tokio::spawn(async move { corpus.find_or_add("feather", true, None).await })
            })
            .collect();

        let mut ids = HashSet::new();
        let mut indices = HashSet::new();
        let mut created = 0;
        for handle in handles {
            let (word, was_created) = handle.await.unwrap().unwrap();
            ids.insert(word.id);
            indices.insert(word.lemma_index);
            created += usize::from(was_created);
        }
        assert_eq!(ids.len(), 1);
        assert_eq!(indices.len(), 1);
        assert_eq!(created, 1);
        assert_eq!(store.corpus_size(), 1);
    }

    #[tokio::test]
    async fn rehydrate_only_moves_forward() {
        let (store, corpus) = corpus();
        corpus.find_or_add("owl", true, None).await.unwrap();
        corpus.find_or_add("hawk", true, None).await.unwrap();
        store.force_counter(CORPUS_COUNTER, 0);
        assert_eq!(corpus.rehydrate_counter().await.unwrap(), 2);

        store.force_counter(CORPUS_COUNTER, 10);
        assert_eq!(corpus.rehydrate_counter().await.unwrap(), 10);
    }
}
