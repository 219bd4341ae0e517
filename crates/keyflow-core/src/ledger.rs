//! In-memory ledger of accounts, projects and API keys
//!
//! The ledger is the persisted record of every key keyflow knows about.
//! This module only holds data and mutation primitives; reading and writing
//! the JSON document lives in [`crate::store`].

use chrono::{DateTime, Utc};
use keyflow_cloud::{CloudKey, CloudProject};
use serde::{Deserialize, Serialize};

/// Version written into new ledgers
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Key id used for the placeholder key recorded in dry-run mode
pub const SYNTHETIC_KEY_ID: &str = "mock-key-id";

/// Key string used for the placeholder key recorded in dry-run mode
pub const SYNTHETIC_KEY_STRING: &str = "mock-key-string-for-dry-run";

/// Root document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub schema_version: String,

    pub accounts: Vec<Account>,

    #[serde(rename = "generation_timestamp_utc")]
    pub generation_timestamp: DateTime<Utc>,

    #[serde(rename = "last_modified_utc")]
    pub last_modified: DateTime<Utc>,
}

impl Default for Ledger {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            accounts: Vec::new(),
            generation_timestamp: now,
            last_modified: now,
        }
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self, email: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.email() == email)
    }

    /// Index of the account for `email`, creating it on first encounter
    pub fn ensure_account(&mut self, email: &str, auth_ref: &AuthRef) -> usize {
        if let Some(index) = self.accounts.iter().position(|a| a.email() == email) {
            return index;
        }
        tracing::debug!(email, "Adding account to ledger");
        self.accounts.push(Account::new(email, auth_ref.clone()));
        self.accounts.len() - 1
    }

    /// Move an account out of the ledger so it can be shared by a worker pool.
    ///
    /// The slot keeps an empty placeholder until [`Ledger::restore_account`]
    /// puts the account back.
    pub fn take_account(&mut self, email: &str, auth_ref: &AuthRef) -> (usize, Account) {
        let index = self.ensure_account(email, auth_ref);
        let auth_ref = self.accounts[index].account_details.auth_ref.clone();
        let placeholder = Account::new(email, auth_ref);
        let account = std::mem::replace(&mut self.accounts[index], placeholder);
        (index, account)
    }

    pub fn restore_account(&mut self, index: usize, account: Account) {
        match self.accounts.get_mut(index) {
            Some(slot) if slot.email() == account.email() => *slot = account,
            _ => self.accounts.push(account),
        }
    }

    /// Stamp the modification time before persisting
    pub fn touch(&mut self) {
        self.last_modified = Utc::now();
    }

    pub fn key_count(&self) -> usize {
        self.accounts
            .iter()
            .flat_map(|a| a.projects.iter())
            .map(|p| p.api_keys.len())
            .sum()
    }
}

/// Everything recorded for one Google account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_details: AccountDetails,
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDetails {
    pub email: String,

    #[serde(rename = "authentication_details")]
    pub auth_ref: AuthRef,
}

/// Where the account's OAuth token lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRef {
    pub token_file: String,
    pub scopes: Vec<String>,
}

impl AuthRef {
    pub fn new(token_file: impl Into<String>, scopes: &[&str]) -> Self {
        Self {
            token_file: token_file.into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Account {
    pub fn new(email: impl Into<String>, auth_ref: AuthRef) -> Self {
        Self {
            account_details: AccountDetails {
                email: email.into(),
                auth_ref,
            },
            projects: Vec::new(),
        }
    }

    pub fn email(&self) -> &str {
        &self.account_details.email
    }

    pub fn project(&self, project_id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.project_id() == project_id)
    }

    fn project_mut(&mut self, project_id: &str) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.project_id() == project_id)
    }

    /// Ledger entry for a cloud project, created the first time it is seen
    pub fn project_mut_or_insert(&mut self, cloud: &CloudProject) -> &mut Project {
        match self.projects.iter().position(|p| p.project_id() == cloud.project_id) {
            Some(index) => &mut self.projects[index],
            None => {
                tracing::debug!(
                    email = %self.account_details.email,
                    project_id = %cloud.project_id,
                    "Adding project to ledger"
                );
                self.projects.push(Project::from_cloud(cloud));
                let last = self.projects.len() - 1;
                &mut self.projects[last]
            }
        }
    }

    /// Record a key as ACTIVE unless a record with the same id already exists.
    ///
    /// Returns whether a record was inserted.
    pub fn add_key(&mut self, cloud: &CloudProject, key: &ProvisionedKey) -> bool {
        let project = self.project_mut_or_insert(cloud);
        if project.key(key.key_id()).is_some() {
            tracing::warn!(
                project_id = %cloud.project_id,
                key_id = key.key_id(),
                "Key already exists in ledger"
            );
            return false;
        }

        project.api_keys.push(key.to_record());
        tracing::info!(
            project_id = %cloud.project_id,
            key_id = key.key_id(),
            "Added key to ledger"
        );
        true
    }

    /// Flip an ACTIVE record to INACTIVE. Records that are already inactive
    /// are left untouched so repeated reconciliation is a no-op.
    pub fn deactivate_key(&mut self, project_id: &str, key_id: &str, now: DateTime<Utc>) -> bool {
        let Some(record) = self
            .project_mut(project_id)
            .and_then(|p| p.api_keys.iter_mut().find(|k| k.key_id() == key_id))
        else {
            return false;
        };

        if record.state == KeyState::Inactive {
            return false;
        }
        record.state = KeyState::Inactive;
        record.key_details.updated_at = now;
        true
    }

    /// Delete the records whose ids are in `key_ids`. Returns how many went.
    pub fn remove_keys(&mut self, project_id: &str, key_ids: &[String]) -> usize {
        let Some(project) = self.project_mut(project_id) else {
            return 0;
        };

        let before = project.api_keys.len();
        project
            .api_keys
            .retain(|k| !key_ids.iter().any(|id| id == k.key_id()));
        let removed = before - project.api_keys.len();

        if removed > 0 {
            tracing::info!(project_id, "Removed {} key(s) from ledger", removed);
        }
        removed
    }
}

/// A project and the keys recorded for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_info: ProjectInfo,
    pub api_keys: Vec<ApiKeyRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub project_id: String,
    pub project_name: String,
    pub project_number: String,
    pub state: String,
}

impl Project {
    pub fn from_cloud(cloud: &CloudProject) -> Self {
        Self {
            project_info: ProjectInfo {
                project_id: cloud.project_id.clone(),
                project_name: cloud.display_name.clone(),
                project_number: cloud.project_number().to_string(),
                state: cloud.state.to_string(),
            },
            api_keys: Vec::new(),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_info.project_id
    }

    pub fn key(&self, key_id: &str) -> Option<&ApiKeyRecord> {
        self.api_keys.iter().find(|k| k.key_id() == key_id)
    }
}

/// One API key as recorded in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub key_details: KeyDetails,
    pub restrictions: Restrictions,
    pub state: KeyState,
}

impl ApiKeyRecord {
    pub fn key_id(&self) -> &str {
        &self.key_details.key_id
    }

    pub fn is_active(&self) -> bool {
        self.state == KeyState::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDetails {
    pub key_string: String,
    pub key_id: String,
    pub key_name: String,
    pub display_name: String,

    #[serde(rename = "creation_timestamp_utc")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "last_updated_timestamp_utc")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Restrictions {
    pub api_targets: Vec<ApiTargetRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiTargetRecord {
    pub service: String,
    pub methods: Vec<String>,
}

impl From<&keyflow_cloud::KeyRestrictions> for Restrictions {
    fn from(cloud: &keyflow_cloud::KeyRestrictions) -> Self {
        Self {
            api_targets: cloud
                .api_targets
                .iter()
                .map(|t| ApiTargetRecord {
                    service: t.service.clone(),
                    methods: t.methods.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyState {
    Active,
    Inactive,
}

impl std::fmt::Display for KeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyState::Active => write!(f, "ACTIVE"),
            KeyState::Inactive => write!(f, "INACTIVE"),
        }
    }
}

/// A key about to be recorded: either a real cloud key with its secret or
/// the placeholder produced in dry-run mode.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionedKey {
    Cloud { key: CloudKey, key_string: String },
    Synthetic(SyntheticKey),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticKey {
    pub project_id: String,
    pub display_name: String,
    pub service: String,
    pub created_at: DateTime<Utc>,
}

impl ProvisionedKey {
    pub fn cloud(key: CloudKey, key_string: impl Into<String>) -> Self {
        ProvisionedKey::Cloud {
            key,
            key_string: key_string.into(),
        }
    }

    pub fn synthetic(project_id: &str, display_name: &str, service: &str) -> Self {
        ProvisionedKey::Synthetic(SyntheticKey {
            project_id: project_id.to_string(),
            display_name: display_name.to_string(),
            service: service.to_string(),
            created_at: Utc::now(),
        })
    }

    pub fn key_id(&self) -> &str {
        match self {
            ProvisionedKey::Cloud { key, .. } => &key.uid,
            ProvisionedKey::Synthetic(_) => SYNTHETIC_KEY_ID,
        }
    }

    pub fn to_record(&self) -> ApiKeyRecord {
        let (key_details, restrictions) = match self {
            ProvisionedKey::Cloud { key, key_string } => (
                KeyDetails {
                    key_string: key_string.clone(),
                    key_id: key.uid.clone(),
                    key_name: key.name.clone(),
                    display_name: key.display_name.clone(),
                    created_at: key.create_time,
                    updated_at: key.update_time,
                },
                Restrictions::from(&key.restrictions),
            ),
            ProvisionedKey::Synthetic(mock) => (
                KeyDetails {
                    key_string: SYNTHETIC_KEY_STRING.to_string(),
                    key_id: SYNTHETIC_KEY_ID.to_string(),
                    key_name: format!(
                        "projects/{}/locations/global/keys/{}",
                        mock.project_id, SYNTHETIC_KEY_ID
                    ),
                    display_name: mock.display_name.clone(),
                    created_at: mock.created_at,
                    updated_at: mock.created_at,
                },
                Restrictions {
                    api_targets: vec![ApiTargetRecord {
                        service: mock.service.clone(),
                        methods: Vec::new(),
                    }],
                },
            ),
        };

        ApiKeyRecord {
            key_details,
            restrictions,
            state: KeyState::Active,
        }
    }
}
