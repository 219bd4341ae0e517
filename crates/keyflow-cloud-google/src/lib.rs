//! Google Cloud provider for keyflow
//!
//! Implements [`keyflow_cloud::KeyCloud`] over the Google Cloud REST APIs
//! and loads per-account OAuth tokens.
//!
//! # Requirements
//!
//! - An OAuth client registration in `credentials.json`
//! - A token file per account, `credentials/<email>.json`, created by a
//!   prior interactive login
//!
//! # Example
//!
//! ```ignore
//! use keyflow_cloud_google::{GoogleCloud, RefreshPolicy, TokenSource};
//! use keyflow_cloud::KeyCloud;
//! use std::sync::Arc;
//!
//! let tokens = Arc::new(TokenSource::new("credentials", RefreshPolicy::default()));
//! let token = tokens.access_token("dev@example.com").await?;
//! let cloud = GoogleCloud::new(tokens.clone(), "dev@example.com", token);
//!
//! for project in cloud.search_projects().await? {
//!     println!("{} ({})", project.project_id, project.state);
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;

pub use auth::{
    AccessToken, AuthorizedUser, CLOUD_PLATFORM_SCOPE, ClientSecrets, RefreshPolicy, TokenSource,
};
pub use client::{Endpoints, GoogleCloud};
pub use error::{GoogleError, Result, TOS_NOT_ACCEPTED_REASON};
