//! Work assignment: weighted random sampling of under-annotated images.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::stats::{ReadMode, StatsEngine};
use crate::store::Store;
use crate::types::{DbId, Timestamp};

/// A worker's claim on a document, unique per `(worker_id, doc_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkEntry {
    pub id: DbId,
    pub worker_id: DbId,
    pub doc_id: DbId,
    pub project_id: DbId,
    pub is_finished: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkEntry {
    pub worker_id: DbId,
    pub doc_id: DbId,
    pub project_id: DbId,
    pub is_finished: bool,
}

/// Draw up to `n` distinct ids, each draw proportional to priority.
///
/// A draw landing on an already chosen image carries its overflow (the
/// offset into that image's interval) forward to the next unchosen image
/// whose priority is at least the overflow, cycling once; failing that it
/// takes the next unchosen image. Stops early when every candidate is
/// chosen.
pub fn weighted_sample<R: Rng + ?Sized>(candidates: &[(DbId, f64)], n: usize, rng: &mut R) -> Vec<DbId> {
    let mut starts = Vec::with_capacity(candidates.len());
    let mut total = 0.0;
    for &(_, priority) in candidates {
        starts.push(total);
        total += priority.max(0.0);
    }
    if candidates.is_empty() || total <= 0.0 {
        return Vec::new();
    }

    let len = candidates.len();
    let mut chosen = vec![false; len];
    let mut picked = Vec::with_capacity(n.min(len));
    while picked.len() < n && picked.len() < len {
        let x = rng.random_range(0.0..total);
        let hit = starts.partition_point(|&s| s <= x).saturating_sub(1);
        let index = if !chosen[hit] {
            hit
        } else {
            let overflow = x - starts[hit];
            let cycle = (1..len).map(|step| (hit + step) % len);
            match cycle
                .clone()
                .find(|&j| !chosen[j] && candidates[j].1 >= overflow)
                .or_else(|| cycle.clone().find(|&j| !chosen[j]))
            {
                Some(j) => j,
                None => break,
            }
        };
        chosen[index] = true;
        picked.push(candidates[index].0);
    }
    picked
}

#[derive(Clone)]
pub struct WorkSampler {
    store: Arc<dyn Store>,
    stats: StatsEngine,
}

impl WorkSampler {
    pub fn new(store: Arc<dyn Store>, stats: StatsEngine) -> Self {
        Self { store, stats }
    }

    /// Up to `n_fetch` member images of a project, favouring images with
    /// unannotated objects. With `history_of`, documents the worker already
    /// has an entry for are excluded from the weighted candidates.
    pub async fn fetch<R: Rng + ?Sized>(
        &self,
        project_id: DbId,
        n_fetch: usize,
        history_of: Option<DbId>,
        rng: &mut R,
    ) -> CoreResult<Vec<DbId>> {
        if self.store.find_project(project_id).await?.is_none() {
            return Err(CoreError::not_found("Project", project_id));
        }
        let docs = self.store.project_image_ids(project_id).await?;
        if n_fetch >= docs.len() {
            return Ok(docs);
        }

        let progress = self.stats.project_progress(project_id, ReadMode::Cached).await?;
        let history: HashSet<DbId> = match history_of {
            Some(worker_id) => self
                .store
                .worker_history(worker_id, project_id)
                .await?
                .into_iter()
                .collect(),
            None => HashSet::new(),
        };
        let candidates: Vec<(DbId, f64)> = self
            .stats
            .image_priorities(&docs, ReadMode::Cached)
            .await?
            .into_iter()
            .filter(|p| p.priority > 0.0 && !history.contains(&p.image_id))
            .map(|p| (p.image_id, p.priority))
            .collect();

        let picked = if candidates.is_empty() {
            docs.choose_multiple(rng, n_fetch).copied().collect()
        } else if candidates.len() <= n_fetch {
            candidates.iter().map(|(id, _)| *id).collect()
        } else if progress.total_prio <= 0.0 {
            let ids: Vec<DbId> = candidates.iter().map(|(id, _)| *id).collect();
            ids.choose_multiple(rng, n_fetch).copied().collect()
        } else {
            // More candidates than draws, so every draw finds an unchosen image.
            weighted_sample(&candidates, n_fetch, rng)
        };
        tracing::debug!(
            project_id,
            n_fetch,
            candidates = candidates.len(),
            returned = picked.len(),
            "Sampled work"
        );
        Ok(picked)
    }

    /// Record or update a worker's entry for a project document.
    pub async fn record_work(&self, entry: &NewWorkEntry) -> CoreResult<WorkEntry> {
        if self.store.find_project(entry.project_id).await?.is_none() {
            return Err(CoreError::not_found("Project", entry.project_id));
        }
        let members = self.store.project_image_ids(entry.project_id).await?;
        if !members.contains(&entry.doc_id) {
            return Err(CoreError::Validation(format!(
                "image {} is not part of project {}",
                entry.doc_id, entry.project_id
            )));
        }
        let saved = self.store.upsert_work_entry(entry).await?;
        tracing::info!(
            worker_id = entry.worker_id,
            doc_id = entry.doc_id,
            is_finished = entry.is_finished,
            "Work recorded"
        );
        Ok(saved)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn draws_are_distinct_and_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        let candidates = [(1, 0.2), (2, 0.9), (3, 0.4), (4, 1.0), (5, 0.1)];
        for _ in 0..200 {
            let picked = weighted_sample(&candidates, 3, &mut rng);
            assert_eq!(picked.len(), 3);
            let distinct: HashSet<_> = picked.iter().collect();
            assert_eq!(distinct.len(), 3);
        }
    }

    #[test]
    fn single_draw_frequency_tracks_priority() {
        let mut rng = StdRng::seed_from_u64(42);
        let candidates = [(1, 1.0), (2, 0.5), (3, 0.25)];
        let total: f64 = candidates.iter().map(|c| c.1).sum();
        let draws = 20_000;
        let mut hits: HashMap<DbId, usize> = HashMap::new();
        for _ in 0..draws {
            *hits.entry(weighted_sample(&candidates, 1, &mut rng)[0]).or_default() += 1;
        }
        for (id, priority) in candidates {
            let observed = hits[&id] as f64 / draws as f64;
            assert!((observed - priority / total).abs() < 0.02, "image {id}: {observed}");
        }
        assert!(hits[&1] > hits[&2] && hits[&2] > hits[&3]);
    }

    #[test]
    fn exhausted_candidates_stop_early() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut picked = weighted_sample(&[(1, 1.0), (2, 0.0)], 5, &mut rng);
        picked.sort_unstable();
        assert_eq!(picked, vec![1, 2]);
    }

    #[test]
    fn zero_total_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(weighted_sample(&[(1, 0.0)], 1, &mut rng).is_empty());
        assert!(weighted_sample(&[], 1, &mut rng).is_empty());
    }

    #[test]
    fn collisions_without_a_large_enough_neighbour_take_the_next_unchosen() {
        // After the first draw, every overflow exceeds the tiny priorities, so
        // the threshold pass finds nothing and the plain cycle picks.
        let mut rng = StdRng::seed_from_u64(11);
        let candidates = [(1, 1.0), (2, 1e-12), (3, 1e-12)];
        for _ in 0..50 {
            let mut picked = weighted_sample(&candidates, 3, &mut rng);
            assert_eq!(picked[0], 1);
            picked.sort_unstable();
            assert_eq!(picked, vec![1, 2, 3]);
        }
    }

    mod project {
        use assert_matches::assert_matches;
        use chrono::Duration;

        use super::*;
        use crate::annotation::Assembler;
        use crate::image::{BoundingBox, ImageCatalog, NewImage, NewObject};
        use crate::label::LabelService;
        use crate::memory::InMemoryStore;
        use crate::nlp::lexicon::LexiconAnalyzer;
        use crate::stats::DEFAULT_STALE_GRACE_SECS;

        struct Fixture {
            sampler: WorkSampler,
            images: ImageCatalog,
            assembler: Assembler,
            label_id: DbId,
            project_id: DbId,
        }

        impl Fixture {
            async fn new() -> Self {
                let store = Arc::new(InMemoryStore::new());
                let stats = StatsEngine::new(store.clone(), Duration::seconds(DEFAULT_STALE_GRACE_SECS));
                let images = ImageCatalog::new(store.clone(), stats.clone());
                let assembler = Assembler::new(store.clone(), Arc::new(LexiconAnalyzer::new()), stats.clone());
                let label_id = LabelService::new(store.clone(), stats.clone())
                    .create_label("fox", &[])
                    .await
                    .unwrap()
                    .id;
                let project_id = images.create_project("foxes").await.unwrap().id;
                Self {
                    sampler: WorkSampler::new(store, stats),
                    images,
                    assembler,
                    label_id,
                    project_id,
                }
            }

            /// Add a member image with `objects` objects, the first
            /// `annotated` of which carry an annotation.
            async fn image(&self, objects: usize, annotated: usize) -> DbId {
                let image_id = self
                    .images
                    .create_image(&NewImage {
                        file_name: "doc.jpg".into(),
                        width: 64,
                        height: 64,
                    })
                    .await
                    .unwrap()
                    .id;
                for i in 0..objects {
                    let object = self
                        .images
                        .add_object(&NewObject {
                            image_id,
                            label_id: self.label_id,
                            bbox: BoundingBox {
                                x: 0.0,
                                y: 0.0,
                                width: 5.0,
                                height: 5.0,
                            },
                        })
                        .await
                        .unwrap();
                    if i < annotated {
                        self.assembler
                            .insert_annotation(object.id, "orange fur", None)
                            .await
                            .unwrap();
                    }
                }
                self.images
                    .add_images_to_project(self.project_id, &[image_id])
                    .await
                    .unwrap();
                image_id
            }
        }

        #[tokio::test]
        async fn positive_priority_images_are_always_returned() {
            let fx = Fixture::new().await;
            let d1 = fx.image(0, 0).await;
            let d2 = fx.image(1, 1).await;
            let d3 = fx.image(2, 1).await;
            let mut rng = StdRng::seed_from_u64(11);
            for _ in 0..50 {
                let mut picked = fx.sampler.fetch(fx.project_id, 2, None, &mut rng).await.unwrap();
                picked.sort_unstable();
                assert_eq!(picked, vec![d1, d3]);
                assert!(!picked.contains(&d2));
            }
        }

        #[tokio::test]
        async fn small_projects_return_every_document() {
            let fx = Fixture::new().await;
            let d1 = fx.image(1, 1).await;
            let d2 = fx.image(1, 0).await;
            let mut rng = StdRng::seed_from_u64(1);
            assert_eq!(fx.sampler.fetch(fx.project_id, 5, None, &mut rng).await.unwrap(), vec![d1, d2]);
        }

        #[tokio::test]
        async fn fully_annotated_projects_fall_back_to_uniform() {
            let fx = Fixture::new().await;
            let mut docs = Vec::new();
            for _ in 0..4 {
                docs.push(fx.image(1, 1).await);
            }
            let mut rng = StdRng::seed_from_u64(5);
            let picked = fx.sampler.fetch(fx.project_id, 2, None, &mut rng).await.unwrap();
            assert_eq!(picked.len(), 2);
            assert_ne!(picked[0], picked[1]);
            assert!(picked.iter().all(|id| docs.contains(id)));
        }

        #[tokio::test]
        async fn weighted_draws_favour_unannotated_images() {
            let fx = Fixture::new().await;
            let open = fx.image(2, 0).await;
            let half = fx.image(2, 1).await;
            let done = fx.image(1, 1).await;
            let sparse = fx.image(4, 3).await;
            let mut rng = StdRng::seed_from_u64(99);
            let mut hits: HashMap<DbId, usize> = HashMap::new();
            for _ in 0..2_000 {
                for id in fx.sampler.fetch(fx.project_id, 1, None, &mut rng).await.unwrap() {
                    *hits.entry(id).or_default() += 1;
                }
            }
            assert!(!hits.contains_key(&done));
            assert!(hits[&open] > hits[&half]);
            assert!(hits[&half] > hits[&sparse]);
        }

        #[tokio::test]
        async fn weighted_fetch_fills_every_slot() {
            let fx = Fixture::new().await;
            let mut docs = Vec::new();
            for annotated in [0, 0, 1, 1, 1] {
                docs.push(fx.image(2, annotated).await);
            }
            let mut rng = StdRng::seed_from_u64(17);
            for _ in 0..100 {
                let picked = fx.sampler.fetch(fx.project_id, 4, None, &mut rng).await.unwrap();
                assert_eq!(picked.len(), 4);
                assert_eq!(picked.iter().collect::<HashSet<_>>().len(), 4);
                assert!(picked.iter().all(|id| docs.contains(id)));
            }
        }

        #[tokio::test]
        async fn worker_history_is_filtered() {
            let fx = Fixture::new().await;
            let d1 = fx.image(1, 0).await;
            let d2 = fx.image(1, 0).await;
            let d3 = fx.image(1, 0).await;
            fx.sampler
                .record_work(&NewWorkEntry {
                    worker_id: 5,
                    doc_id: d1,
                    project_id: fx.project_id,
                    is_finished: false,
                })
                .await
                .unwrap();
            let mut rng = StdRng::seed_from_u64(2);
            for _ in 0..20 {
                let mut picked = fx.sampler.fetch(fx.project_id, 2, Some(5), &mut rng).await.unwrap();
                picked.sort_unstable();
                assert_eq!(picked, vec![d2, d3]);
            }
        }

        #[tokio::test]
        async fn record_work_upserts_per_worker_and_document() {
            let fx = Fixture::new().await;
            let doc = fx.image(1, 0).await;
            let entry = |is_finished| NewWorkEntry {
                worker_id: 3,
                doc_id: doc,
                project_id: fx.project_id,
                is_finished,
            };
            let first = fx.sampler.record_work(&entry(false)).await.unwrap();
            let second = fx.sampler.record_work(&entry(true)).await.unwrap();
            assert_eq!(first.id, second.id);
            assert!(second.is_finished);

            let outsider = NewWorkEntry { doc_id: 999, ..entry(false) };
            assert_matches!(fx.sampler.record_work(&outsider).await, Err(CoreError::Validation(_)));
            assert_matches!(
                fx.sampler.fetch(404, 1, None, &mut StdRng::seed_from_u64(0)).await,
                Err(CoreError::NotFound { entity: "Project", id: 404 })
            );
        }
    }
}
