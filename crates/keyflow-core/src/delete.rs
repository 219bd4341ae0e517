//! Key deletion for a single project

use crate::context::AccountContext;
use keyflow_cloud::{CloudError, CloudProject, GEMINI_API_KEY_DISPLAY_NAME};

/// Delete every "Gemini API Key" of the project and drop the matching
/// ledger records. Project and account rows are kept.
///
/// Returns the ids removed from the cloud (or that would be, in dry-run).
pub async fn delete_managed_keys(ctx: &AccountContext, project: &CloudProject) -> Vec<String> {
    let project_id = project.project_id.as_str();

    let removed = if ctx.dry_run() {
        ctx.cloud.list_keys(project_id).await.map(|keys| {
            keys.into_iter()
                .filter(|k| k.display_name == GEMINI_API_KEY_DISPLAY_NAME)
                .map(|k| {
                    tracing::info!(project_id, key_id = %k.uid, "[DRY RUN] Would delete key");
                    k.uid
                })
                .collect::<Vec<String>>()
        })
    } else {
        ctx.cloud
            .delete_keys_named(project_id, GEMINI_API_KEY_DISPLAY_NAME)
            .await
    };

    let removed = match removed {
        Ok(ids) => ids,
        Err(CloudError::PermissionDenied(reason)) => {
            tracing::warn!(
                project_id,
                "Permission denied to list or delete API keys, skipping: {}",
                reason
            );
            return Vec::new();
        }
        Err(e) => {
            tracing::error!(project_id, "API error while deleting keys: {}", e);
            return Vec::new();
        }
    };

    if !removed.is_empty() {
        ctx.account.lock().await.remove_keys(project_id, &removed);
    }
    removed
}
