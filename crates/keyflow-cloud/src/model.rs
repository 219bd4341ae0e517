//! Cloud-side entities
//!
//! These mirror the JSON shapes returned by the Google Cloud REST APIs
//! (camelCase on the wire). keyflow never mutates them; they are read and
//! translated into ledger records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Google Cloud project as reported by Resource Manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudProject {
    /// User-chosen identifier (e.g. `project01-x7k2m9q4ab`)
    pub project_id: String,

    /// Human readable name
    #[serde(default)]
    pub display_name: String,

    /// Resource name, `projects/<project number>`
    #[serde(default)]
    pub name: String,

    /// Lifecycle state
    #[serde(default)]
    pub state: ProjectLifecycle,
}

impl CloudProject {
    pub fn new(
        project_id: impl Into<String>,
        display_name: impl Into<String>,
        project_number: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            display_name: display_name.into(),
            name: format!("projects/{}", project_number.into()),
            state: ProjectLifecycle::Active,
        }
    }

    pub fn with_state(mut self, state: ProjectLifecycle) -> Self {
        self.state = state;
        self
    }

    /// Numeric project number, taken from the resource name
    pub fn project_number(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        self.state == ProjectLifecycle::Active
    }
}

/// Lifecycle state of a project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectLifecycle {
    Active,
    DeleteRequested,
    #[default]
    #[serde(other)]
    StateUnspecified,
}

impl std::fmt::Display for ProjectLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectLifecycle::Active => write!(f, "ACTIVE"),
            ProjectLifecycle::DeleteRequested => write!(f, "DELETE_REQUESTED"),
            ProjectLifecycle::StateUnspecified => write!(f, "STATE_UNSPECIFIED"),
        }
    }
}

/// An API key as reported by the API Keys service.
///
/// `key_string` is only populated by key creation; listing never returns the
/// secret, it has to be fetched separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudKey {
    /// Unique id of the key
    pub uid: String,

    /// Resource name, `projects/<p>/locations/global/keys/<id>`
    pub name: String,

    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub restrictions: KeyRestrictions,

    pub create_time: DateTime<Utc>,

    pub update_time: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_string: Option<String>,
}

/// Restrictions attached to a key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRestrictions {
    #[serde(default)]
    pub api_targets: Vec<ApiTarget>,
}

impl KeyRestrictions {
    /// Restrict a key to a single service, all methods
    pub fn single_service(service: impl Into<String>) -> Self {
        Self {
            api_targets: vec![ApiTarget {
                service: service.into(),
                methods: Vec::new(),
            }],
        }
    }
}

/// A service (and optionally methods) a key may call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTarget {
    pub service: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
}
