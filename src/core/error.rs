use crate::core::scoring::ScoringError;
use crate::models::{RecordId, RequestStatus};
use crate::services::StoreError;
use thiserror::Error;

/// Outcome taxonomy for every engine operation
///
/// `NotFound`, `Conflict` and `Validation` are expected results for the
/// caller. `Persistence` always means the enclosing unit was rolled back.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Request already exists with status: {existing}")]
    Conflict {
        request_id: RecordId,
        existing: RequestStatus,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Scoring model unavailable: {0}")]
    ScoringUnavailable(String),
}

/// Bad pair data is a validation failure; a broken model is unavailability
impl From<ScoringError> for EngineError {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::UnknownBloodType(_) | ScoringError::MissingField(_) => {
                EngineError::Validation(err.to_string())
            }
            ScoringError::Model(_) | ScoringError::Artifact(_) => {
                EngineError::ScoringUnavailable(err.to_string())
            }
        }
    }
}

impl EngineError {
    pub fn not_found(entity: &str, id: RecordId) -> Self {
        EngineError::NotFound(format!("{} {}", entity, id))
    }

    /// Stable machine-readable tag for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::Conflict { .. } => "conflict",
            EngineError::Validation(_) => "validation_error",
            EngineError::Persistence(_) => "persistence_error",
            EngineError::ScoringUnavailable(_) => "scoring_unavailable",
        }
    }
}
