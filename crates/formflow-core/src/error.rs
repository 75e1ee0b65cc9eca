use thiserror::Error;

use crate::FormId;

#[derive(Error, Debug)]
pub enum FormFlowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("Invalid slug: {0}")]
    InvalidSlug(String),

    #[error("Slug already taken: {0}")]
    SlugTaken(String),

    #[error("Invalid flow: {0}")]
    InvalidFlow(String),

    #[error("Form not found: {0}")]
    FormNotFound(String),

    #[error("Form {0} is not accepting responses")]
    FormNotAccepting(FormId),

    #[error("No submissions recorded for form {0}")]
    NoSubmissions(FormId),

    #[error("Ingestion buffer is closed")]
    BufferClosed,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FormFlowError {
    /// Errors caused by the caller's input rather than by a collaborator.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSubmission(_)
                | Self::InvalidSlug(_)
                | Self::SlugTaken(_)
                | Self::InvalidFlow(_)
                | Self::FormNotFound(_)
                | Self::FormNotAccepting(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FormFlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_classified() {
        assert!(FormFlowError::InvalidSubmission("empty path".into()).is_client_error());
        assert!(FormFlowError::SlugTaken("taken".into()).is_client_error());
        assert!(!FormFlowError::Database("locked".into()).is_client_error());
        assert!(!FormFlowError::BufferClosed.is_client_error());
    }

    #[test]
    fn display_includes_context() {
        let err = FormFlowError::InvalidSlug("AB".into());
        assert_eq!(err.to_string(), "Invalid slug: AB");
    }
}
