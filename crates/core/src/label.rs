//! Object labels and the categories grouping them.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::corpus::{Corpus, WordInput};
use crate::error::{CoreError, CoreResult};
use crate::stats::StatsEngine;
use crate::store::Store;
use crate::text::tokenize;
use crate::types::{DbId, Timestamp};

/// Counter cell backing label indices.
pub const LABEL_COUNTER: &str = "labels_idx";

pub const MAX_LABEL_NAME_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: DbId,
    pub label_index: i64,
    pub name: String,
    pub name_tokens: Vec<String>,
    pub token_lemma_indices: Vec<i64>,
    pub categories: Vec<String>,
    pub created_at: Timestamp,
}

impl Label {
    /// Lowercased name tokens used for label-mention detection.
    pub fn token_set(&self) -> HashSet<String> {
        self.name_tokens.iter().cloned().collect()
    }
}

/// A category shared across labels; `label_indices` is the inverse index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// Lowercased name.
    pub id: String,
    pub tokens: Vec<String>,
    pub label_indices: Vec<i64>,
}

/// A label ready to be inserted together with its categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLabel {
    pub label_index: i64,
    pub name: String,
    pub name_tokens: Vec<String>,
    pub token_lemma_indices: Vec<i64>,
    /// `(category id, tokens)` pairs, created on demand.
    pub categories: Vec<(String, Vec<String>)>,
}

#[derive(Clone)]
pub struct LabelService {
    store: Arc<dyn Store>,
    corpus: Corpus,
    stats: StatsEngine,
}

impl LabelService {
    pub fn new(store: Arc<dyn Store>, stats: StatsEngine) -> Self {
        let corpus = Corpus::new(store.clone());
        Self { store, corpus, stats }
    }

    pub async fn create_label(&self, name: &str, categories: &[String]) -> CoreResult<Label> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("label name must not be empty".into()));
        }
        if name.len() > MAX_LABEL_NAME_LEN {
            return Err(CoreError::Validation(format!(
                "label name exceeds {MAX_LABEL_NAME_LEN} characters"
            )));
        }
        let name_tokens = tokenize(name, true);
        if name_tokens.is_empty() {
            return Err(CoreError::Validation(format!(
                "label name '{name}' has no word tokens"
            )));
        }
        if self.store.find_label_by_name(&name.to_lowercase()).await?.is_some() {
            return Err(CoreError::Conflict(format!("label '{name}' already exists")));
        }

        let inputs: Vec<WordInput> = name_tokens
            .iter()
            .map(|t| WordInput::new(t.clone(), true, None))
            .collect();
        let token_lemma_indices = self
            .corpus
            .find_or_add_many(&inputs)
            .await?
            .into_iter()
            .map(|w| w.lemma_index)
            .collect();

        let mut category_entries: Vec<(String, Vec<String>)> = Vec::new();
        for category in categories {
            let id = category.trim().to_lowercase();
            if id.is_empty() || category_entries.iter().any(|(c, _)| *c == id) {
                continue;
            }
            let tokens = tokenize(&id, true);
            category_entries.push((id, tokens));
        }

        let label_index = self.store.reserve_indices(LABEL_COUNTER, 1).await?;
        let label = self
            .store
            .insert_label(&NewLabel {
                label_index,
                name: name.to_lowercase(),
                name_tokens,
                token_lemma_indices,
                categories: category_entries,
            })
            .await
            .map_err(|e| match e {
                crate::error::StoreError::Conflict(msg) => CoreError::Conflict(msg),
                other => CoreError::Store(other),
            })?;

        self.stats.labels_changed().await;
        tracing::info!(label_id = label.id, label_index, name = %label.name, "Label created");
        Ok(label)
    }

    pub async fn get_label(&self, id: DbId) -> CoreResult<Label> {
        self.store
            .find_label(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Label", id))
    }

    pub async fn get_category(&self, name: &str) -> CoreResult<Option<Category>> {
        Ok(self.store.find_category(&name.trim().to_lowercase()).await?)
    }
}
