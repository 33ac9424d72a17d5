use thiserror::Error;

use acp_store::StoreError;

/// Details of the open pull request that blocked a session creation.
#[derive(Debug, Clone)]
pub struct OpenPrConflict {
    pub number: u64,
    pub url: String,
    pub state: String,
    pub branch: String,
}

/// Service-layer failure taxonomy. The bridge maps each variant to exactly
/// one HTTP status.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input; reject synchronously, never retry.
    #[error("invalid: {0}")]
    Invalid(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The preflight gate found an open pull request.
    #[error("an open pull request already exists for this workflow")]
    OpenPr(OpenPrConflict),

    /// Store-level write conflict that survived the retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A source-control write on the create path failed.
    #[error("upstream source control error: {0}")]
    BadGateway(String),

    /// The external tracker is unreachable or misbehaving.
    #[error("upstream tracker error: {0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(m) => EngineError::NotFound(m),
            StoreError::Conflict(m) => EngineError::Conflict(m),
            StoreError::Forbidden(m) => EngineError::Forbidden(m),
            StoreError::Invalid(m) => EngineError::Invalid(m),
            StoreError::Transient(m) => EngineError::Internal(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_engine_taxonomy() {
        assert!(matches!(
            EngineError::from(StoreError::NotFound("x".into())),
            EngineError::NotFound(_)
        ));
        assert!(matches!(
            EngineError::from(StoreError::Conflict("x".into())),
            EngineError::Conflict(_)
        ));
        assert!(matches!(
            EngineError::from(StoreError::Invalid("x".into())),
            EngineError::Invalid(_)
        ));
        assert!(matches!(
            EngineError::from(StoreError::Transient("x".into())),
            EngineError::Internal(_)
        ));
    }
}
