//! Core error types

use keyflow_cloud::CloudError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Schema file not found: {}", .0.display())]
    SchemaNotFound(PathBuf),

    #[error("Invalid schema {}: {reason}", path.display())]
    SchemaInvalid { path: PathBuf, reason: String },

    #[error("Ledger failed validation, refusing to write {}: {reason}", path.display())]
    LedgerInvalid { path: PathBuf, reason: String },

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
