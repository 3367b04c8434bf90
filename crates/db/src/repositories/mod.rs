//! Repository layer for database access.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Batched writes run inside a
//! transaction; unique-key races are resolved with `ON CONFLICT DO NOTHING`
//! followed by a read of the surviving row.

pub mod aggregate_repo;
pub mod annotation_repo;
pub mod concept_repo;
pub mod corpus_word_repo;
pub mod counter_repo;
pub mod image_repo;
pub mod label_repo;
pub mod object_repo;
pub mod project_repo;
pub mod work_entry_repo;

pub use aggregate_repo::AggregateRepo;
pub use annotation_repo::AnnotationRepo;
pub use concept_repo::ConceptRepo;
pub use corpus_word_repo::CorpusWordRepo;
pub use counter_repo::CounterRepo;
pub use image_repo::ImageRepo;
pub use label_repo::LabelRepo;
pub use object_repo::ObjectRepo;
pub use project_repo::ProjectRepo;
pub use work_entry_repo::WorkEntryRepo;
