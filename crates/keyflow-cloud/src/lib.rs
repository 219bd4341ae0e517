//! keyflow Cloud Capabilities
//!
//! This crate defines the cloud-side surface keyflow depends on: the
//! projects, services and API keys of a single authenticated Google account.
//! The reconciliation engine in `keyflow-core` only ever talks to the
//! [`KeyCloud`] trait, so concrete providers (and test fakes) can be swapped
//! freely.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  keyflow CLI                     │
//! │             (keyflow create/delete)              │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                keyflow-core                      │
//! │   reconcile / provision / ensure / orchestrate   │
//! └─────────────────┬───────────────────────────────┘
//!                   │  trait KeyCloud { ... }
//! ┌─────────────────▼───────────────────────────────┐
//! │                keyflow-cloud                     │
//! │   CloudProject / CloudKey / CloudError           │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼────────┐
//!           │  cloud-google  │
//!           │ (REST + OAuth) │
//!           └────────────────┘
//! ```

pub mod capability;
pub mod error;
pub mod model;

// Re-exports
pub use capability::KeyCloud;
pub use error::{CloudError, Result};
pub use model::{
    ApiTarget, CloudKey, CloudProject, KeyRestrictions, ProjectLifecycle,
};

/// Service every managed key is restricted to.
pub const GENERATIVE_LANGUAGE_API: &str = "generativelanguage.googleapis.com";

/// Display name given to keys created by keyflow.
pub const GEMINI_API_KEY_DISPLAY_NAME: &str = "Gemini API Key";

/// Display name used by keys created through the Google AI Studio console.
pub const GENERATIVE_LANGUAGE_API_KEY_DISPLAY_NAME: &str = "Generative Language API Key";

/// Display names that mark a key as managed.
pub const MANAGED_KEY_DISPLAY_NAMES: [&str; 2] = [
    GEMINI_API_KEY_DISPLAY_NAME,
    GENERATIVE_LANGUAGE_API_KEY_DISPLAY_NAME,
];

/// Page shown to a human who has to accept the Generative Language API terms.
pub const GENERATIVE_LANGUAGE_TOS_URL: &str =
    "https://console.developers.google.com/terms/generative-language-api";

/// Returns true when `display_name` is one of the managed key names.
pub fn is_managed_display_name(display_name: &str) -> bool {
    MANAGED_KEY_DISPLAY_NAMES.contains(&display_name)
}
