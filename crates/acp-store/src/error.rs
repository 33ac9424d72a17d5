use thiserror::Error;

/// Failure taxonomy for resource-store operations.
///
/// `Conflict` and `Transient` are retriable; `Invalid` never is.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("transient store error: {0}")]
    Transient(String),

    #[error("invalid: {0}")]
    Invalid(String),
}

impl StoreError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Transient(_))
    }

    /// Map a kube client error onto the taxonomy.
    pub fn from_kube(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => match ae.code {
                404 => StoreError::NotFound(ae.message),
                409 => StoreError::Conflict(ae.message),
                401 | 403 => StoreError::Forbidden(ae.message),
                400 | 422 => StoreError::Invalid(ae.message),
                _ => StoreError::Transient(ae.message),
            },
            other => StoreError::Transient(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriability() {
        assert!(StoreError::Conflict("c".into()).is_retriable());
        assert!(StoreError::Transient("t".into()).is_retriable());
        assert!(!StoreError::NotFound("n".into()).is_retriable());
        assert!(!StoreError::Invalid("i".into()).is_retriable());
        assert!(!StoreError::Forbidden("f".into()).is_retriable());
    }

    #[test]
    fn kube_api_codes_map_onto_taxonomy() {
        let api_err = |code: u16| {
            kube::Error::Api(kube::core::ErrorResponse {
                status: "Failure".into(),
                message: "m".into(),
                reason: "r".into(),
                code,
            })
        };
        assert!(matches!(StoreError::from_kube(api_err(404)), StoreError::NotFound(_)));
        assert!(matches!(StoreError::from_kube(api_err(409)), StoreError::Conflict(_)));
        assert!(matches!(StoreError::from_kube(api_err(403)), StoreError::Forbidden(_)));
        assert!(matches!(StoreError::from_kube(api_err(422)), StoreError::Invalid(_)));
        assert!(matches!(StoreError::from_kube(api_err(500)), StoreError::Transient(_)));
    }
}
