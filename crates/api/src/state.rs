use std::sync::Arc;

use glossa_core::annotation::Assembler;
use glossa_core::concept::ConceptCatalog;
use glossa_core::image::ImageCatalog;
use glossa_core::label::LabelService;
use glossa_core::nlp::Analyzer;
use glossa_core::sampler::WorkSampler;
use glossa_core::stats::StatsEngine;
use glossa_core::store::Store;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (every service holds its dependencies behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Backing store (Postgres or in-memory).
    pub store: Arc<dyn Store>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Tokenizer / tagger used by the assembler and concept search.
    pub analyzer: Arc<dyn Analyzer>,
    pub labels: LabelService,
    pub concepts: ConceptCatalog,
    pub images: ImageCatalog,
    pub assembler: Assembler,
    pub stats: StatsEngine,
    pub sampler: WorkSampler,
}

impl AppState {
    /// Wire every service over one store and analyzer.
    pub fn new(store: Arc<dyn Store>, analyzer: Arc<dyn Analyzer>, config: ServerConfig) -> Self {
        let stats = StatsEngine::new(Arc::clone(&store), config.stale_grace());
        Self {
            labels: LabelService::new(Arc::clone(&store), stats.clone()),
            concepts: ConceptCatalog::new(Arc::clone(&store)),
            images: ImageCatalog::new(Arc::clone(&store), stats.clone()),
            assembler: Assembler::new(Arc::clone(&store), Arc::clone(&analyzer), stats.clone()),
            sampler: WorkSampler::new(Arc::clone(&store), stats.clone()),
            stats,
            store,
            analyzer,
            config: Arc::new(config),
        }
    }
}
