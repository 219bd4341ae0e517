pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// Environment variable pointing at the keyflow home directory
pub const HOME_ENV: &str = "KEYFLOW_HOME";

pub const CLIENT_SECRETS_FILE: &str = "credentials.json";
pub const DATABASE_FILE: &str = "api_keys_database.json";
pub const EMAILS_FILE: &str = "emails.txt";
pub const CREDENTIALS_DIR: &str = "credentials";
pub const LOGS_DIR: &str = "logs";
pub const SCHEMA_FILE: &str = "schemas/v1/api_keys_database.schema.json";

/// File layout below the keyflow home directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Find the home directory.
    ///
    /// Lookup order:
    /// 1. `explicit` (the `--home` flag)
    /// 2. `KEYFLOW_HOME`
    /// 3. the current directory, if it holds `credentials.json`
    /// 4. `~/.config/keyflow` (platform config dir)
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        if let Some(root) = explicit {
            return Ok(Self::new(root));
        }

        if let Some(root) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(root));
        }

        let current_dir = std::env::current_dir()?;
        if current_dir.join(CLIENT_SECRETS_FILE).is_file() {
            return Ok(Self::new(current_dir));
        }

        let config_dir = dirs::config_dir().ok_or(ConfigError::ConfigDirNotFound)?;
        Ok(Self::new(config_dir.join("keyflow")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn client_secrets_file(&self) -> PathBuf {
        self.root.join(CLIENT_SECRETS_FILE)
    }

    pub fn database_file(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn schema_file(&self) -> PathBuf {
        self.root.join(SCHEMA_FILE)
    }

    pub fn emails_file(&self) -> PathBuf {
        self.root.join(EMAILS_FILE)
    }

    pub fn credentials_dir(&self) -> PathBuf {
        self.root.join(CREDENTIALS_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    /// Token file path as recorded in the ledger, relative to the root
    pub fn token_file_ref(&self, email: &str) -> String {
        format!("{}/{}.json", CREDENTIALS_DIR, email)
    }

    /// Create the credentials and logs directories if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.credentials_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

/// Read account emails, one per line. Blank lines and `#` comments are
/// skipped.
pub fn load_emails(path: &Path) -> Result<Vec<String>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::EmailsFileNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(parse_emails(&content))
}

fn parse_emails(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}
