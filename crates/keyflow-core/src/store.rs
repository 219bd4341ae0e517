//! Ledger persistence
//!
//! Reads and writes `api_keys_database.json`, validating the document against
//! the JSON schema on both boundaries. A ledger that cannot be read is
//! replaced by an empty one; a ledger that fails validation on save is never
//! written.

use crate::error::{CoreError, Result};
use crate::ledger::Ledger;
use std::path::{Path, PathBuf};
use tokio::fs;

const BACKUP_SUFFIX: &str = "backup";
const TEMP_SUFFIX: &str = "tmp";

/// Compiled JSON schema for the ledger document
pub struct LedgerSchema {
    path: PathBuf,
    validator: jsonschema::Validator,
}

impl LedgerSchema {
    /// Load and compile the schema at `path`
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(CoreError::SchemaNotFound(path));
        }

        let content = fs::read_to_string(&path).await?;
        let document: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| CoreError::SchemaInvalid {
                path: path.clone(),
                reason: format!("could not decode JSON: {}", e),
            })?;

        Self::from_value(path, &document)
    }

    pub fn from_value(path: impl Into<PathBuf>, document: &serde_json::Value) -> Result<Self> {
        let path = path.into();
        let validator = jsonschema::validator_for(document).map_err(|e| CoreError::SchemaInvalid {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self { path, validator })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate a document, joining every violation into one message
    pub fn validate(&self, instance: &serde_json::Value) -> std::result::Result<(), String> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(instance)
            .map(|e| e.to_string())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}

/// Reads and writes the ledger file
pub struct LedgerStore {
    path: PathBuf,
    schema: LedgerSchema,
}

impl LedgerStore {
    pub fn new(path: impl AsRef<Path>, schema: LedgerSchema) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            schema,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }

    fn backup_path(&self) -> PathBuf {
        self.sibling(BACKUP_SUFFIX)
    }

    /// Load the ledger. Never fails: a missing, undecodable or invalid file
    /// yields a fresh empty ledger.
    pub async fn load(&self) -> Ledger {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            tracing::debug!("Ledger not found at {}, starting empty", self.path.display());
            return Ledger::new();
        }

        match self.read_validated().await {
            Ok(ledger) => {
                tracing::debug!(
                    "Loaded ledger with {} account(s), {} key(s)",
                    ledger.accounts.len(),
                    ledger.key_count()
                );
                ledger
            }
            Err(reason) => {
                tracing::warn!(
                    "Ledger file '{}' is not usable ({}). Starting fresh.",
                    self.path.display(),
                    reason
                );
                Ledger::new()
            }
        }
    }

    async fn read_validated(&self) -> std::result::Result<Ledger, String> {
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| format!("read failed: {}", e))?;
        let document: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| format!("could not decode JSON: {}", e))?;
        self.schema.validate(&document)?;
        serde_json::from_value(document).map_err(|e| format!("unexpected shape: {}", e))
    }

    /// Validate and write the ledger, keeping the previous file as a backup.
    pub async fn save(&self, ledger: &mut Ledger) -> Result<()> {
        ledger.touch();

        let document = serde_json::to_value(&*ledger)?;
        self.schema
            .validate(&document)
            .map_err(|reason| CoreError::LedgerInvalid {
                path: self.path.clone(),
                reason,
            })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !fs::try_exists(parent).await.unwrap_or(false) {
                fs::create_dir_all(parent).await?;
            }
        }

        let temp = self.sibling(TEMP_SUFFIX);
        fs::write(&temp, serde_json::to_string_pretty(&document)?).await?;

        if fs::try_exists(&self.path).await.unwrap_or(false) {
            fs::copy(&self.path, self.backup_path()).await?;
        }
        fs::rename(&temp, &self.path).await?;

        tracing::info!("Ledger saved to {}", self.path.display());
        Ok(())
    }

    /// Save unless running dry. Returns whether anything was written.
    pub async fn persist(&self, ledger: &mut Ledger, dry_run: bool) -> Result<bool> {
        if dry_run {
            tracing::info!("[DRY RUN] Ledger not saved");
            return Ok(false);
        }
        self.save(ledger).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{AuthRef, ProvisionedKey};
    use keyflow_cloud::CloudProject;
    use tempfile::tempdir;

    const SCHEMA: &str = include_str!("../../../schemas/v1/api_keys_database.schema.json");

    fn schema() -> LedgerSchema {
        let document: serde_json::Value = serde_json::from_str(SCHEMA).unwrap();
        LedgerSchema::from_value("api_keys_database.schema.json", &document).unwrap()
    }

    fn sample_ledger() -> Ledger {
        let mut ledger = Ledger::new();
        let auth = AuthRef::new("credentials/a@example.com.json", &["scope"]);
        let (index, mut account) = ledger.take_account("a@example.com", &auth);
        account.add_key(
            &CloudProject::new("p1", "P1", "42"),
            &ProvisionedKey::synthetic("p1", "Gemini API Key", "generativelanguage.googleapis.com"),
        );
        ledger.restore_account(index, account);
        ledger
    }

    #[tokio::test]
    async fn test_ledger_save_load() {
        let temp_dir = tempdir().unwrap();
        let store = LedgerStore::new(temp_dir.path().join("api_keys_database.json"), schema());

        let mut ledger = sample_ledger();
        store.save(&mut ledger).await.unwrap();

        let loaded = store.load().await;
        assert_eq!(loaded, ledger);
        assert_eq!(loaded.key_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_ledger_is_empty() {
        let temp_dir = tempdir().unwrap();
        let store = LedgerStore::new(temp_dir.path().join("api_keys_database.json"), schema());

        let ledger = store.load().await;
        assert!(ledger.accounts.is_empty());
        assert_eq!(ledger.schema_version, "1.0.0");
    }

    #[tokio::test]
    async fn test_corrupt_ledger_falls_back_to_empty() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("api_keys_database.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = LedgerStore::new(&path, schema());
        assert!(store.load().await.accounts.is_empty());
    }

    #[tokio::test]
    async fn test_schema_violation_on_load_falls_back_to_empty() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("api_keys_database.json");
        std::fs::write(&path, r#"{"schema_version": "1.0.0", "accounts": "nope"}"#).unwrap();

        let store = LedgerStore::new(&path, schema());
        assert!(store.load().await.accounts.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_ledger_is_never_written() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("api_keys_database.json");
        let store = LedgerStore::new(&path, schema());

        let mut ledger = sample_ledger();
        ledger.schema_version = "two".to_string();

        let err = store.save(&mut ledger).await.unwrap_err();
        assert!(matches!(err, CoreError::LedgerInvalid { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_save_keeps_backup() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("api_keys_database.json");
        let store = LedgerStore::new(&path, schema());

        let mut ledger = Ledger::new();
        store.save(&mut ledger).await.unwrap();
        let mut ledger = sample_ledger();
        store.save(&mut ledger).await.unwrap();

        let backup = temp_dir.path().join("api_keys_database.json.backup");
        let previous: Ledger =
            serde_json::from_str(&std::fs::read_to_string(backup).unwrap()).unwrap();
        assert!(previous.accounts.is_empty());
        assert!(!temp_dir.path().join("api_keys_database.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_dry_run_never_persists() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("api_keys_database.json");
        let store = LedgerStore::new(&path, schema());

        let mut ledger = sample_ledger();
        assert!(!store.persist(&mut ledger, true).await.unwrap());
        assert!(!path.exists());

        assert!(store.persist(&mut ledger, false).await.unwrap());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_missing_schema() {
        let temp_dir = tempdir().unwrap();
        let result = LedgerSchema::load(temp_dir.path().join("absent.json")).await;
        assert!(matches!(result, Err(CoreError::SchemaNotFound(_))));
    }

    #[tokio::test]
    async fn test_undecodable_schema() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("schema.json");
        std::fs::write(&path, "][").unwrap();

        let result = LedgerSchema::load(&path).await;
        assert!(matches!(result, Err(CoreError::SchemaInvalid { .. })));
    }
}
