use clap::{Parser, ValueEnum};
use keyflow_core::KeyAction;
use keyflow_core::options::{DEFAULT_MAX_WORKERS, DEFAULT_TARGET_PROJECTS};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "keyflow", version)]
#[command(about = "Manage Gemini API keys in Google Cloud projects.", long_about = None)]
pub struct Cli {
    /// The action to perform
    #[arg(value_enum)]
    pub action: Action,

    /// Process a single account. Required for 'delete'; without it,
    /// 'create' reads the accounts from emails.txt
    #[arg(long, required_if_eq("action", "delete"))]
    pub email: Option<String>,

    /// Log every change instead of making it
    #[arg(long)]
    pub dry_run: bool,

    /// Projects processed concurrently per account
    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
    pub max_workers: usize,

    /// Attempts at refreshing an expired token
    #[arg(long, default_value_t = 3)]
    pub auth_retries: u32,

    /// Seconds between token refresh attempts
    #[arg(long, default_value_t = 5)]
    pub auth_retry_delay: u64,

    /// Number of projects every account is topped up to ('create' only)
    #[arg(long, default_value_t = DEFAULT_TARGET_PROJECTS)]
    pub target_projects: usize,

    /// keyflow home directory (credentials, ledger, logs)
    #[arg(long, env = "KEYFLOW_HOME")]
    pub home: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Ensure every project holds a managed key
    Create,
    /// Delete every "Gemini API Key" of one account
    Delete,
}

impl From<Action> for KeyAction {
    fn from(action: Action) -> Self {
        match action {
            Action::Create => KeyAction::Create,
            Action::Delete => KeyAction::Delete,
        }
    }
}
