//! Annotation linguistic pipeline: free-text object descriptions in, a
//! queryable concept graph, per-label statistics and weighted work
//! assignment out.

pub mod annotation;
pub mod concept;
pub mod concept_mask;
pub mod corpus;
pub mod error;
pub mod image;
pub mod label;
pub mod memory;
pub mod nlp;
pub mod noun_phrase;
pub mod sampler;
pub mod stats;
pub mod store;
pub mod text;
pub mod types;
