use crate::types::DbId;

/// Failure reported by a store backend.
///
/// Unique-index races are resolved inside the stores by re-reading the
/// winning record, so `Conflict` only escapes when a caller-visible
/// uniqueness rule is broken (e.g. a duplicate label name).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store conflict: {0}")]
    Conflict(String),

    #[error("Store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wrap any backend error (sqlx, io, ...) without classifying it.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The extractor produced no noun phrase for an input that needs one.
    #[error("Preprocessing failed: {0}")]
    Preprocessing(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: DbId) -> Self {
        Self::NotFound { entity, id }
    }
}

/// Convenience alias used across the pipeline services.
pub type CoreResult<T> = Result<T, CoreError>;
/// Result alias for store capability methods.
pub type StoreResult<T> = Result<T, StoreError>;
