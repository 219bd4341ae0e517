//! Cloud capability error types

use thiserror::Error;

/// Classified failure of a cloud capability call.
///
/// Callers branch on the variant: permission problems skip the unit of work
/// with a warning, `NotFound`/`Api` skip it with an error, and
/// `TermsNotAccepted` sends the worker through the ToS gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Terms of Service not accepted: {message} (accept at {url})")]
    TermsNotAccepted { message: String, url: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl CloudError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, CloudError::PermissionDenied(_))
    }

    pub fn is_terms_not_accepted(&self) -> bool {
        matches!(self, CloudError::TermsNotAccepted { .. })
    }
}

impl From<serde_json::Error> for CloudError {
    fn from(err: serde_json::Error) -> Self {
        CloudError::Api(format!("malformed response: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
