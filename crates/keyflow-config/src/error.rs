use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config directory not found; set KEYFLOW_HOME or pass --home")]
    ConfigDirNotFound,

    #[error(
        "email file not found at '{0}'.\n\
        Please create it and add one email address per line."
    )]
    EmailsFileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
