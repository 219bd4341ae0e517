//! Google provider error types

use keyflow_cloud::{CloudError, GENERATIVE_LANGUAGE_TOS_URL};
use std::path::PathBuf;
use thiserror::Error;

/// Marker Google puts in the error details when service terms are pending
pub const TOS_NOT_ACCEPTED_REASON: &str = "UREQ_TOS_NOT_ACCEPTED";

#[derive(Error, Debug)]
pub enum GoogleError {
    #[error("token file not found: {0}")]
    TokenFileMissing(PathBuf),

    #[error("could not decode token file {path}: {reason}")]
    TokenFileMalformed { path: PathBuf, reason: String },

    #[error("client secrets file not found: {0}")]
    ClientSecretsMissing(PathBuf),

    #[error("could not decode client secrets {path}: {reason}")]
    ClientSecretsMalformed { path: PathBuf, reason: String },

    #[error("token is expired and has no refresh token")]
    NoRefreshToken,

    #[error("missing OAuth client id/secret for refresh")]
    MissingClientSecret,

    #[error("failed to refresh credentials after {attempts} attempt(s): {last}")]
    RefreshFailed { attempts: u32, last: String },

    #[error("Google API returned {status}: {message}")]
    Status {
        status: u16,
        message: String,
        body: String,
    },

    #[error("operation {name} failed with code {code}: {message}")]
    Operation {
        name: String,
        code: i32,
        message: String,
        details: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GoogleError>;

/// gRPC status codes carried by long-running operation errors
const GRPC_NOT_FOUND: i32 = 5;
const GRPC_PERMISSION_DENIED: i32 = 7;

impl From<GoogleError> for CloudError {
    fn from(err: GoogleError) -> Self {
        let text = err.to_string();
        match err {
            GoogleError::Status { status, body, .. } => {
                if body.contains(TOS_NOT_ACCEPTED_REASON) {
                    terms_not_accepted(text)
                } else {
                    match status {
                        403 => CloudError::PermissionDenied(text),
                        404 => CloudError::NotFound(text),
                        _ => CloudError::Api(text),
                    }
                }
            }
            GoogleError::Operation { code, details, .. } => {
                let tos = details.contains(TOS_NOT_ACCEPTED_REASON)
                    || text.contains(TOS_NOT_ACCEPTED_REASON);
                if tos {
                    terms_not_accepted(text)
                } else {
                    match code {
                        GRPC_PERMISSION_DENIED => CloudError::PermissionDenied(text),
                        GRPC_NOT_FOUND => CloudError::NotFound(text),
                        _ => CloudError::Api(text),
                    }
                }
            }
            _ => CloudError::Api(text),
        }
    }
}

fn terms_not_accepted(message: String) -> CloudError {
    CloudError::TermsNotAccepted {
        message,
        url: GENERATIVE_LANGUAGE_TOS_URL.to_string(),
    }
}
