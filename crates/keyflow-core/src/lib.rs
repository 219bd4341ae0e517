//! keyflow core
//!
//! The reconciliation engine behind keyflow. It keeps a local JSON ledger of
//! API keys consistent with what Google Cloud reports, and creates or deletes
//! managed keys across all projects of an account.
//!
//! # Flow
//!
//! ```text
//! AccountOrchestrator::process
//!   ├─ ensure_projects            (create only, tops up to 12 projects)
//!   └─ worker pool, one task per project
//!        ├─ create: reconcile → enable (ToS gate) → create key → ledger
//!        └─ delete: delete "Gemini API Key"s → drop ledger records
//! ```
//!
//! The cloud is only reached through [`keyflow_cloud::KeyCloud`], so every
//! piece here runs against an in-memory fake in tests.

pub mod context;
pub mod delete;
pub mod ensure;
pub mod error;
pub mod ledger;
pub mod options;
pub mod orchestrator;
pub mod provision;
pub mod reconcile;
pub mod store;
pub mod tos;

// Re-exports
pub use context::{AccountContext, SharedAccount};
pub use delete::delete_managed_keys;
pub use ensure::{ensure_projects, wait_until_ready};
pub use error::{CoreError, Result};
pub use ledger::{
    Account, ApiKeyRecord, AuthRef, KeyState, Ledger, Project, ProvisionedKey, SCHEMA_VERSION,
};
pub use options::{ReadinessConfig, RunOptions};
pub use orchestrator::{AccountOrchestrator, AccountReport, KeyAction};
pub use provision::{enable_with_tos_retry, provision};
pub use reconcile::reconcile;
pub use store::{LedgerSchema, LedgerStore};
pub use tos::{AcceptancePrompt, GatePass, GateState, TosGate};
