//! Error taxonomy for duplicate detection.
//!
//! Only resolution and infrastructure failures are errors. A candidate
//! the actor may not see is a normal `Rejected` classification, and an
//! empty result set is a successful outcome.

/// Error type for duplicate detection operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DuplicationError {
    /// Malformed field selector (wrong segment count or bad segment).
    #[error("Invalid field selector '{selector}': {reason}")]
    InvalidSelector {
        /// The selector as given.
        selector: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The selected field does not exist in the field catalog.
    #[error("Metadata field not found: {selector}")]
    FieldNotFound {
        /// The selector that failed to resolve.
        selector: String,
    },
    /// The candidate source or a lookup collaborator failed.
    #[error("Store error: {0}")]
    TransientStore(String),
}

impl DuplicationError {
    /// Create a store error from any error type.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::TransientStore(e.to_string())
    }

    /// Whether a retry could succeed without a configuration change.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }
}

/// Error raised when the authorization oracle cannot answer.
///
/// Never escalated to a [`DuplicationError`]; the classifier turns it
/// into a conservative rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Authorization unavailable: {0}")]
pub struct AuthorizationError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct Reset;

    #[test]
    fn test_from_store_keeps_message() {
        let err = DuplicationError::from_store(Reset);
        assert_eq!(err, DuplicationError::TransientStore("connection reset".to_string()));
        assert!(err.is_transient());
    }

    #[test]
    fn test_configuration_errors_are_not_transient() {
        let err = DuplicationError::FieldNotFound { selector: "dc.nope".to_string() };
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Metadata field not found: dc.nope");
    }
}
