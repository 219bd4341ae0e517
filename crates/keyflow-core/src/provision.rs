//! Key provisioning for a single project

use crate::context::AccountContext;
use crate::ledger::ProvisionedKey;
use crate::reconcile::reconcile;
use crate::tos::GatePass;
use keyflow_cloud::{
    CloudError, CloudProject, GEMINI_API_KEY_DISPLAY_NAME, GENERATIVE_LANGUAGE_API,
};

/// Make sure the project holds a managed key, creating and recording one if
/// reconciliation found none.
pub async fn provision(ctx: &AccountContext, project: &CloudProject) {
    let project_id = project.project_id.as_str();

    if reconcile(ctx, project).await {
        tracing::info!(
            project_id,
            "'{}' already exists, skipping creation",
            GEMINI_API_KEY_DISPLAY_NAME
        );
        return;
    }

    if !enable_with_tos_retry(ctx, project_id).await {
        tracing::error!(project_id, "Failed to enable API, skipping key creation");
        return;
    }

    let Some(key) = create_key(ctx, project_id).await else {
        return;
    };

    ctx.account.lock().await.add_key(project, &key);
}

/// Enable the generative-language service, looping through the ToS gate
/// for as long as the terms are reported as not accepted.
pub async fn enable_with_tos_retry(ctx: &AccountContext, project_id: &str) -> bool {
    loop {
        tracing::info!(project_id, "Attempting to enable Generative Language API");
        if ctx.dry_run() {
            tracing::info!(project_id, "[DRY RUN] Would enable API");
            return true;
        }

        match ctx
            .cloud
            .enable_service(project_id, GENERATIVE_LANGUAGE_API)
            .await
        {
            Ok(()) => {
                tracing::info!(project_id, "Enabled Generative Language API");
                return true;
            }
            Err(CloudError::TermsNotAccepted { message, url }) => {
                let pass = ctx.tos_gate.await_acceptance(&message, &url).await;
                tracing::debug!(project_id, ?pass, "Retrying enablement after ToS gate");
                if pass == GatePass::Prompted {
                    tracing::info!(project_id, "Terms confirmed, retrying");
                }
            }
            Err(CloudError::PermissionDenied(reason)) => {
                tracing::warn!(project_id, "Permission denied to enable API: {}", reason);
                return false;
            }
            Err(e) => {
                tracing::error!(project_id, "Error enabling API: {}", e);
                return false;
            }
        }
    }
}

/// Create the restricted key, or a placeholder in dry-run mode
async fn create_key(ctx: &AccountContext, project_id: &str) -> Option<ProvisionedKey> {
    if ctx.dry_run() {
        tracing::info!(project_id, "[DRY RUN] Would create API key");
        return Some(ProvisionedKey::synthetic(
            project_id,
            GEMINI_API_KEY_DISPLAY_NAME,
            GENERATIVE_LANGUAGE_API,
        ));
    }

    tracing::info!(project_id, "Creating API key");
    let key = match ctx
        .cloud
        .create_key(project_id, GEMINI_API_KEY_DISPLAY_NAME, GENERATIVE_LANGUAGE_API)
        .await
    {
        Ok(key) => key,
        Err(CloudError::PermissionDenied(reason)) => {
            tracing::warn!(project_id, "Permission denied to create API key: {}", reason);
            return None;
        }
        Err(e) => {
            tracing::error!(project_id, "Error creating API key: {}", e);
            return None;
        }
    };

    // creation normally returns the secret; fall back to fetching it
    let key_string = match key.key_string.clone() {
        Some(secret) => secret,
        None => match ctx.cloud.get_key_string(&key.name).await {
            Ok(secret) => secret,
            Err(e) => {
                tracing::error!(
                    project_id,
                    key_id = %key.uid,
                    "Key created but its string could not be fetched: {}",
                    e
                );
                return None;
            }
        },
    };

    tracing::info!(project_id, key_id = %key.uid, "Created restricted API key");
    Some(ProvisionedKey::cloud(key, key_string))
}
