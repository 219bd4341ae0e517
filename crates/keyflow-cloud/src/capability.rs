//! Cloud capability trait definition

use crate::error::Result;
use crate::model::{CloudKey, CloudProject};
use async_trait::async_trait;

/// Everything keyflow needs from the cloud for one authenticated account.
///
/// Long-running operations (project creation, service enablement, key
/// creation and deletion) block the calling task until the operation has
/// finished or failed.
#[async_trait]
pub trait KeyCloud: Send + Sync {
    /// List the projects visible to the account
    async fn search_projects(&self) -> Result<Vec<CloudProject>>;

    /// Create a project and wait for the create operation to finish
    async fn create_project(&self, project_id: &str, display_name: &str) -> Result<CloudProject>;

    /// Fetch a single project (used for readiness polling)
    async fn get_project(&self, project_id: &str) -> Result<CloudProject>;

    /// Enable `service` on the project.
    ///
    /// Returns [`CloudError::TermsNotAccepted`](crate::CloudError::TermsNotAccepted)
    /// when a human still has to accept the service terms.
    async fn enable_service(&self, project_id: &str, service: &str) -> Result<()>;

    /// List the keys of a project. Secrets are never included.
    async fn list_keys(&self, project_id: &str) -> Result<Vec<CloudKey>>;

    /// Fetch the secret of a key by resource name
    async fn get_key_string(&self, key_name: &str) -> Result<String>;

    /// Create a key restricted to `service`. The returned key carries its secret.
    async fn create_key(
        &self,
        project_id: &str,
        display_name: &str,
        service: &str,
    ) -> Result<CloudKey>;

    /// Delete a key by resource name
    async fn delete_key(&self, key_name: &str) -> Result<()>;

    /// Delete every key of the project whose display name is `display_name`.
    ///
    /// Returns the uids that were actually removed. A failure deleting one key
    /// is logged and the remaining keys are still attempted; a failure listing
    /// the keys is returned.
    async fn delete_keys_named(&self, project_id: &str, display_name: &str) -> Result<Vec<String>> {
        let targets: Vec<CloudKey> = self
            .list_keys(project_id)
            .await?
            .into_iter()
            .filter(|k| k.display_name == display_name)
            .collect();

        if targets.is_empty() {
            tracing::info!(project_id, "No '{}' found to delete", display_name);
            return Ok(Vec::new());
        }

        tracing::info!(
            project_id,
            "Found {} key(s) with display name '{}'. Deleting...",
            targets.len(),
            display_name
        );

        let mut removed = Vec::with_capacity(targets.len());
        for key in targets {
            match self.delete_key(&key.name).await {
                Ok(()) => {
                    tracing::info!(project_id, key_id = %key.uid, "Deleted key");
                    removed.push(key.uid);
                }
                Err(e) => {
                    tracing::error!(project_id, key_id = %key.uid, "Error deleting key: {}", e);
                }
            }
        }
        Ok(removed)
    }
}
