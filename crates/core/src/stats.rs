//! Statistics engine: cached aggregates with lazy recomputation.
//!
//! Writers only flip aggregates stale through the invalidation hooks; reads
//! serve a cached record while it is valid and younger than the grace
//! window, and otherwise recompute and save the result back. Every
//! invalidation bumps the record's generation, and a save only marks a
//! record valid when its generation is unchanged since the recompute
//! started. Recomputation is idempotent, so racing readers converge on the
//! same records.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::image::ImageObjectCounts;
use crate::store::Store;
use crate::types::{DbId, Timestamp};

/// Default maximum age of a valid cached record.
pub const DEFAULT_STALE_GRACE_SECS: i64 = 30 * 60;

// ---------------------------------------------------------------------------
// Aggregate records
// ---------------------------------------------------------------------------

/// The cached aggregates and the scope each one is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    /// Scoped by label.
    ConceptLabelCount,
    /// Scoped by concept.
    ConceptOccurrence,
    /// Scoped by label.
    ConceptTfIdf,
    /// Scoped by image.
    ImagePriority,
    /// Scoped by project.
    ProjectProgress,
}

impl AggregateKind {
    pub const ALL: [AggregateKind; 5] = [
        Self::ConceptLabelCount,
        Self::ConceptOccurrence,
        Self::ConceptTfIdf,
        Self::ImagePriority,
        Self::ProjectProgress,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConceptLabelCount => "concept_label_count",
            Self::ConceptOccurrence => "concept_occurrence",
            Self::ConceptTfIdf => "concept_tf_idf",
            Self::ImagePriority => "image_priority",
            Self::ProjectProgress => "project_progress",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("unknown aggregate kind '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateState {
    pub kind: AggregateKind,
    pub scope_id: DbId,
    pub is_valid: bool,
    /// Number of invalidations the record has seen.
    pub generation: i64,
    pub updated_at: Timestamp,
}

impl AggregateState {
    /// Valid and computed no more than `grace` ago.
    pub fn is_fresh(&self, now: Timestamp, grace: Duration) -> bool {
        self.is_valid && now - self.updated_at <= grace
    }
}

/// Generations observed when a recompute started.
///
/// Saving with a stamp marks a scope valid only if its generation still
/// matches, so an invalidation that lands mid-recompute survives the save.
#[derive(Debug, Clone, PartialEq)]
pub struct RecomputeStamp {
    pub started_at: Timestamp,
    generations: HashMap<DbId, i64>,
}

impl RecomputeStamp {
    pub fn new(started_at: Timestamp, states: &[AggregateState]) -> Self {
        Self {
            started_at,
            generations: states.iter().map(|s| (s.scope_id, s.generation)).collect(),
        }
    }

    /// Generation of `scope_id` at the start; scopes without a record are 0.
    pub fn generation(&self, scope_id: DbId) -> i64 {
        self.generations.get(&scope_id).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptCount {
    pub concept_id: DbId,
    pub count: i64,
}

/// Number of labels whose annotations contain the concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptOccurrence {
    pub concept_id: DbId,
    pub num_labels: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptScore {
    pub concept_id: DbId,
    pub count: i64,
    pub tf_idf: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePriority {
    pub image_id: DbId,
    pub priority: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectProgress {
    pub project_id: DbId,
    pub num_docs: i64,
    pub total_prio: f64,
    pub progress: f64,
}

/// Whether a read may serve cached records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    #[default]
    Cached,
    /// Recompute regardless of cache state.
    Force,
}

// ---------------------------------------------------------------------------
// Pure computations
// ---------------------------------------------------------------------------

/// `count * ln(total_labels / df)` per concept, highest first.
///
/// Concepts without a positive document frequency are dropped.
pub fn compute_tf_idf(
    counts: &[ConceptCount],
    occurrences: &HashMap<DbId, i64>,
    total_labels: i64,
) -> Vec<ConceptScore> {
    let mut scores: Vec<ConceptScore> = counts
        .iter()
        .filter_map(|c| {
            let df = *occurrences.get(&c.concept_id)?;
            if df <= 0 || total_labels <= 0 {
                return None;
            }
            let idf = (total_labels as f64 / df as f64).ln();
            Some(ConceptScore {
                concept_id: c.concept_id,
                count: c.count,
                tf_idf: c.count as f64 * idf,
            })
        })
        .collect();
    sort_scores(&mut scores);
    scores
}

pub fn sort_scores(scores: &mut [ConceptScore]) {
    scores.sort_by(|a, b| {
        b.tf_idf
            .total_cmp(&a.tf_idf)
            .then_with(|| a.concept_id.cmp(&b.concept_id))
    });
}

/// Fraction of the image's objects without annotations; `1.0` when the
/// image has no objects.
pub fn compute_image_priority(counts: &ImageObjectCounts) -> f64 {
    if counts.num_objects <= 0 {
        return 1.0;
    }
    let unannotated = (counts.num_objects - counts.num_annotated).max(0);
    (unannotated as f64 / counts.num_objects as f64).clamp(0.0, 1.0)
}

pub fn compute_project_progress(project_id: DbId, priorities: &[f64]) -> ProjectProgress {
    let num_docs = priorities.len() as i64;
    let total_prio: f64 = priorities.iter().sum();
    let progress = if num_docs == 0 {
        0.0
    } else {
        (num_docs as f64 - total_prio) / num_docs as f64
    };
    ProjectProgress {
        project_id,
        num_docs,
        total_prio,
        progress,
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StatsEngine {
    store: Arc<dyn Store>,
    grace: Duration,
}

impl StatsEngine {
    pub fn new(store: Arc<dyn Store>, grace: Duration) -> Self {
        Self { store, grace }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Scope ids of `kind` that must be recomputed, and the stamp to save
    /// their results with.
    async fn stale_scopes(
        &self,
        kind: AggregateKind,
        scope_ids: &[DbId],
        mode: ReadMode,
    ) -> CoreResult<(Vec<DbId>, RecomputeStamp)> {
        let now = Utc::now();
        let states = self.store.aggregate_states(kind, scope_ids).await?;
        let stamp = RecomputeStamp::new(now, &states);
        if mode == ReadMode::Force {
            return Ok((scope_ids.to_vec(), stamp));
        }
        let fresh: HashSet<DbId> = states
            .iter()
            .filter(|s| s.is_fresh(now, self.grace))
            .map(|s| s.scope_id)
            .collect();
        let stale = scope_ids.iter().copied().filter(|id| !fresh.contains(id)).collect();
        Ok((stale, stamp))
    }

    // -- invalidation hooks --------------------------------------------------

    /// Annotations of an object with `label_id` on `image_id` were inserted,
    /// updated or deleted, touching `concept_ids`.
    pub async fn annotations_changed(&self, label_id: DbId, image_id: DbId, concept_ids: &[DbId]) {
        if let Err(e) = self.invalidate_concepts(label_id, concept_ids).await {
            tracing::warn!(label_id, error = %e, "Failed to invalidate concept statistics");
        }
        self.objects_changed(image_id).await;
    }

    /// Objects of `image_id` were inserted or deleted, or their annotation
    /// state changed.
    pub async fn objects_changed(&self, image_id: DbId) {
        if let Err(e) = self.invalidate_image(image_id).await {
            tracing::warn!(image_id, error = %e, "Failed to invalidate image statistics");
        }
    }

    /// A label was created. The label total feeds every TF-IDF ranking.
    pub async fn labels_changed(&self) {
        if let Err(e) = self.store.mark_kind_stale(AggregateKind::ConceptTfIdf).await {
            tracing::warn!(error = %e, "Failed to invalidate TF-IDF rankings");
        }
    }

    /// Image membership of `project_id` changed.
    pub async fn membership_changed(&self, project_id: DbId) {
        if let Err(e) = self
            .store
            .mark_stale(AggregateKind::ProjectProgress, &[project_id])
            .await
        {
            tracing::warn!(project_id, error = %e, "Failed to invalidate project progress");
        }
    }

    async fn invalidate_concepts(&self, label_id: DbId, concept_ids: &[DbId]) -> CoreResult<()> {
        self.store
            .mark_stale(AggregateKind::ConceptLabelCount, &[label_id])
            .await?;
        let mut labels: Vec<DbId> = vec![label_id];
        if !concept_ids.is_empty() {
            self.store
                .mark_stale(AggregateKind::ConceptOccurrence, concept_ids)
                .await?;
            // A concept's document frequency feeds every label using it.
            for (_, other) in self.store.concept_labels(concept_ids).await? {
                if !labels.contains(&other) {
                    labels.push(other);
                }
            }
        }
        self.store
            .mark_stale(AggregateKind::ConceptTfIdf, &labels)
            .await?;
        Ok(())
    }

    async fn invalidate_image(&self, image_id: DbId) -> CoreResult<()> {
        self.store
            .mark_stale(AggregateKind::ImagePriority, &[image_id])
            .await?;
        let projects = self.store.projects_of_images(&[image_id]).await?;
        if !projects.is_empty() {
            self.store
                .mark_stale(AggregateKind::ProjectProgress, &projects)
                .await?;
        }
        Ok(())
    }

    // -- reads ---------------------------------------------------------------

    pub async fn label_concept_counts(&self, label_id: DbId, mode: ReadMode) -> CoreResult<Vec<ConceptCount>> {
        let (stale, stamp) = self
            .stale_scopes(AggregateKind::ConceptLabelCount, &[label_id], mode)
            .await?;
        if stale.is_empty() {
            return Ok(self.store.load_label_counts(label_id).await?);
        }
        let mut counts = self.store.count_label_concepts(label_id).await?;
        counts.sort_by(|a, b| b.count.cmp(&a.count).then(a.concept_id.cmp(&b.concept_id)));
        self.store
            .save_label_counts(label_id, &counts, &stamp)
            .await?;
        tracing::debug!(label_id, concepts = counts.len(), "Recomputed concept label counts");
        Ok(counts)
    }

    /// Occurrences in input order; concepts no label uses report zero.
    pub async fn concept_occurrences(&self, concept_ids: &[DbId], mode: ReadMode) -> CoreResult<Vec<ConceptOccurrence>> {
        if concept_ids.is_empty() {
            return Ok(Vec::new());
        }
        let (stale, stamp) = self
            .stale_scopes(AggregateKind::ConceptOccurrence, concept_ids, mode)
            .await?;
        let mut by_concept: HashMap<DbId, i64> = HashMap::new();

        let fresh: Vec<DbId> = concept_ids
            .iter()
            .copied()
            .filter(|id| !stale.contains(id))
            .collect();
        if !fresh.is_empty() {
            for occ in self.store.load_occurrences(&fresh).await? {
                by_concept.insert(occ.concept_id, occ.num_labels);
            }
        }

        if !stale.is_empty() {
            let mut labels: HashMap<DbId, HashSet<DbId>> = HashMap::new();
            for (concept_id, label_id) in self.store.concept_labels(&stale).await? {
                labels.entry(concept_id).or_default().insert(label_id);
            }
            let recomputed: Vec<ConceptOccurrence> = stale
                .iter()
                .map(|&concept_id| ConceptOccurrence {
                    concept_id,
                    num_labels: labels.get(&concept_id).map_or(0, |s| s.len() as i64),
                })
                .collect();
            self.store
                .save_occurrences(&recomputed, &stamp)
                .await?;
            for occ in recomputed {
                by_concept.insert(occ.concept_id, occ.num_labels);
            }
        }

        Ok(concept_ids
            .iter()
            .map(|&concept_id| ConceptOccurrence {
                concept_id,
                num_labels: by_concept.get(&concept_id).copied().unwrap_or(0),
            })
            .collect())
    }

    /// One page (zero-based) of a label's TF-IDF ranking.
    pub async fn tf_idf(&self, label_id: DbId, page: i64, page_size: i64, mode: ReadMode) -> CoreResult<Vec<ConceptScore>> {
        if page < 0 || page_size <= 0 {
            return Err(CoreError::Validation(format!(
                "invalid page {page} with size {page_size}"
            )));
        }
        let (stale, stamp) = self
            .stale_scopes(AggregateKind::ConceptTfIdf, &[label_id], mode)
            .await?;
        if !stale.is_empty() {
            self.recompute_tf_idf(label_id, mode, &stamp).await?;
        }
        Ok(self
            .store
            .load_tf_idf(label_id, page * page_size, page_size)
            .await?)
    }

    async fn recompute_tf_idf(
        &self,
        label_id: DbId,
        mode: ReadMode,
        stamp: &RecomputeStamp,
    ) -> CoreResult<Vec<ConceptScore>> {
        let counts = self.label_concept_counts(label_id, mode).await?;
        let concept_ids: Vec<DbId> = counts.iter().map(|c| c.concept_id).collect();
        let occurrences: HashMap<DbId, i64> = self
            .concept_occurrences(&concept_ids, mode)
            .await?
            .into_iter()
            .map(|o| (o.concept_id, o.num_labels))
            .collect();
        let total_labels = self.store.count_labels().await?;
        let scores = compute_tf_idf(&counts, &occurrences, total_labels);
        self.store.save_tf_idf(label_id, &scores, stamp).await?;
        tracing::debug!(label_id, total_labels, concepts = scores.len(), "Recomputed TF-IDF");
        Ok(scores)
    }

    /// Priorities in input order. Unknown images are omitted.
    pub async fn image_priorities(&self, image_ids: &[DbId], mode: ReadMode) -> CoreResult<Vec<ImagePriority>> {
        if image_ids.is_empty() {
            return Ok(Vec::new());
        }
        let (stale, stamp) = self
            .stale_scopes(AggregateKind::ImagePriority, image_ids, mode)
            .await?;
        let mut by_image: HashMap<DbId, f64> = HashMap::new();

        let fresh: Vec<DbId> = image_ids
            .iter()
            .copied()
            .filter(|id| !stale.contains(id))
            .collect();
        if !fresh.is_empty() {
            for p in self.store.load_image_priorities(&fresh).await? {
                by_image.insert(p.image_id, p.priority);
            }
        }

        if !stale.is_empty() {
            let recomputed: Vec<ImagePriority> = self
                .store
                .image_object_counts(&stale)
                .await?
                .iter()
                .map(|counts| ImagePriority {
                    image_id: counts.image_id,
                    priority: compute_image_priority(counts),
                })
                .collect();
            self.store
                .save_image_priorities(&recomputed, &stamp)
                .await?;
            for p in recomputed {
                by_image.insert(p.image_id, p.priority);
            }
        }

        Ok(image_ids
            .iter()
            .filter_map(|&image_id| {
                by_image
                    .get(&image_id)
                    .map(|&priority| ImagePriority { image_id, priority })
            })
            .collect())
    }

    pub async fn image_priority(&self, image_id: DbId, mode: ReadMode) -> CoreResult<f64> {
        self.image_priorities(&[image_id], mode)
            .await?
            .first()
            .map(|p| p.priority)
            .ok_or_else(|| CoreError::not_found("Image", image_id))
    }

    pub async fn project_progress(&self, project_id: DbId, mode: ReadMode) -> CoreResult<ProjectProgress> {
        if self.store.find_project(project_id).await?.is_none() {
            return Err(CoreError::not_found("Project", project_id));
        }
        let (stale, stamp) = self
            .stale_scopes(AggregateKind::ProjectProgress, &[project_id], mode)
            .await?;
        if stale.is_empty() {
            if let Some(progress) = self.store.load_project_progress(project_id).await? {
                return Ok(progress);
            }
        }

        let image_ids = self.store.project_image_ids(project_id).await?;
        let priorities: Vec<f64> = self
            .image_priorities(&image_ids, mode)
            .await?
            .into_iter()
            .map(|p| p.priority)
            .collect();
        let progress = compute_project_progress(project_id, &priorities);
        self.store
            .save_project_progress(&progress, &stamp)
            .await?;
        tracing::debug!(
            project_id,
            num_docs = progress.num_docs,
            total_prio = progress.total_prio,
            "Recomputed project progress"
        );
        Ok(progress)
    }

    /// Force-recompute one aggregate scope.
    pub async fn recompute(&self, kind: AggregateKind, scope_id: DbId) -> CoreResult<()> {
        let mode = ReadMode::Force;
        match kind {
            AggregateKind::ConceptLabelCount => {
                self.label_concept_counts(scope_id, mode).await?;
            }
            AggregateKind::ConceptOccurrence => {
                self.concept_occurrences(&[scope_id], mode).await?;
            }
            AggregateKind::ConceptTfIdf => {
                self.tf_idf(scope_id, 0, 1, mode).await?;
            }
            AggregateKind::ImagePriority => {
                self.image_priority(scope_id, mode).await?;
            }
            AggregateKind::ProjectProgress => {
                self.project_progress(scope_id, mode).await?;
            }
        }
        tracing::info!(kind = %kind, scope_id, "Aggregate recomputed on request");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
