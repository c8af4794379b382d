use thiserror::Error;

use crate::validation::ValidationError;

/// Unified error type for the lashes library
#[derive(Error, Debug)]
pub enum LashesError {
    // Selection errors
    #[error("no proxies available")]
    NoProxiesAvailable,

    #[error("global circuit breaker is open")]
    GlobalBreakerOpen,

    // Admission errors
    #[error("invalid proxy URL: {0}")]
    InvalidProxyUrl(String),

    #[error("duplicate proxy id: {0}")]
    DuplicateProxyId(String),

    #[error(transparent)]
    ValidationFailed(#[from] ValidationError),

    // Lookup errors
    #[error("proxy not found: {0}")]
    ProxyNotFound(String),

    // Metrics errors
    #[error("metrics collection not enabled")]
    MetricsNotEnabled,

    // Configuration errors
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Storage errors
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    // Transport errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for lashes operations
pub type Result<T> = std::result::Result<T, LashesError>;

impl LashesError {
    /// Check whether this error is a validation failure, regardless of the
    /// specific probe outcome it carries.
    pub fn is_validation_failed(&self) -> bool {
        matches!(self, LashesError::ValidationFailed(_))
    }

    /// Check whether this error means the referenced proxy does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LashesError::ProxyNotFound(_))
    }

    /// Check whether this error is recoverable by retrying selection later.
    pub fn is_selection_error(&self) -> bool {
        matches!(
            self,
            LashesError::NoProxiesAvailable | LashesError::GlobalBreakerOpen
        )
    }
}

impl From<url::ParseError> for LashesError {
    fn from(err: url::ParseError) -> Self {
        LashesError::InvalidProxyUrl(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationErrorKind;

    #[test]
    fn test_validation_failed_category() {
        let err = LashesError::from(ValidationError {
            proxy_id: "p1".to_string(),
            proxy_url: "http://proxy.example:8080".to_string(),
            kind: ValidationErrorKind::BadStatus,
            reason: "invalid status code: 500".to_string(),
            status: Some(500),
        });

        assert!(err.is_validation_failed());
        assert!(!err.is_not_found());

        match err {
            LashesError::ValidationFailed(inner) => {
                assert_eq!(inner.status, Some(500));
                assert_eq!(inner.kind, ValidationErrorKind::BadStatus);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_error_predicates() {
        assert!(LashesError::NoProxiesAvailable.is_selection_error());
        assert!(LashesError::GlobalBreakerOpen.is_selection_error());
        assert!(!LashesError::MetricsNotEnabled.is_selection_error());

        assert!(LashesError::ProxyNotFound("x".to_string()).is_not_found());
        assert!(!LashesError::NoProxiesAvailable.is_not_found());
    }

    #[test]
    fn test_url_parse_error_maps_to_invalid_url() {
        let err: LashesError = "not a url".parse::<url::Url>().unwrap_err().into();
        assert!(matches!(err, LashesError::InvalidProxyUrl(_)));
    }
}
