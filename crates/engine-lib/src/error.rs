//! Error types shared across the engine

use thiserror::Error;

/// Failures raised by a [`Repository`](crate::store::Repository) implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {entity} {id}")]
    NotFound { entity: &'static str, id: u64 },

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by engine cycles
///
/// Insufficient data and zero denominators are not errors; they are reported
/// through empty results instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("platform collection failed: {0}")]
    Platform(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
