//! Per-project reconciliation between cloud keys and the ledger
//!
//! Keys seen only in the cloud are added as ACTIVE, keys seen only in the
//! ledger are marked INACTIVE, keys seen in both are left alone.

use crate::context::AccountContext;
use crate::ledger::ProvisionedKey;
use chrono::Utc;
use keyflow_cloud::{CloudError, CloudKey, CloudProject, is_managed_display_name};
use std::collections::{BTreeSet, HashMap};

/// Reconcile one project and report whether a managed key already exists.
///
/// A failure listing the cloud keys returns `false`, so the caller goes on
/// to create a key even though one may exist.
pub async fn reconcile(ctx: &AccountContext, project: &CloudProject) -> bool {
    let project_id = project.project_id.as_str();
    tracing::info!(project_id, "Reconciling keys");

    let cloud_keys = match ctx.cloud.list_keys(project_id).await {
        Ok(keys) => keys,
        Err(CloudError::PermissionDenied(reason)) => {
            tracing::warn!(
                project_id,
                "Permission denied to list keys, skipping reconciliation: {}",
                reason
            );
            return false;
        }
        Err(e) => {
            tracing::error!(project_id, "API error while reconciling keys: {}", e);
            return false;
        }
    };

    let managed_key_exists = cloud_keys
        .iter()
        .any(|k| is_managed_display_name(&k.display_name));

    let cloud_by_id: HashMap<&str, &CloudKey> =
        cloud_keys.iter().map(|k| (k.uid.as_str(), k)).collect();

    // Diff and deactivate in one critical section.
    let cloud_only: Vec<&CloudKey> = {
        let mut account = ctx.account.lock().await;
        let ledger_project = account.project_mut_or_insert(project);
        let ledger_ids: BTreeSet<String> = ledger_project
            .api_keys
            .iter()
            .map(|k| k.key_id().to_string())
            .collect();

        for record in &ledger_project.api_keys {
            if cloud_by_id.contains_key(record.key_id()) {
                if record.is_active() {
                    tracing::info!(project_id, key_id = record.key_id(), "Key is synchronized");
                } else {
                    tracing::warn!(
                        project_id,
                        key_id = record.key_id(),
                        "Key is INACTIVE in the ledger but present in the cloud; leaving as is"
                    );
                }
            }
        }

        let ledger_only: Vec<String> = ledger_ids
            .iter()
            .filter(|id| !cloud_by_id.contains_key(id.as_str()))
            .cloned()
            .collect();

        let now = Utc::now();
        for key_id in &ledger_only {
            if ctx.dry_run() {
                tracing::info!(
                    project_id,
                    key_id = %key_id,
                    "[DRY RUN] Would mark key as INACTIVE"
                );
            } else if account.deactivate_key(project_id, key_id, now) {
                tracing::info!(
                    project_id,
                    key_id = %key_id,
                    "Key found in ledger only, marked INACTIVE"
                );
            }
        }

        cloud_keys
            .iter()
            .filter(|k| !ledger_ids.contains(&k.uid))
            .collect()
    };

    for key in cloud_only {
        tracing::info!(
            project_id,
            key_id = %key.uid,
            "Key ({}) found in cloud only, adding to ledger",
            key.display_name
        );
        if ctx.dry_run() {
            tracing::info!(
                project_id,
                key_id = %key.uid,
                "[DRY RUN] Would fetch key string and add to ledger"
            );
            continue;
        }

        let key_string = match ctx.cloud.get_key_string(&key.name).await {
            Ok(secret) => secret,
            Err(CloudError::PermissionDenied(_)) => {
                tracing::warn!(
                    project_id,
                    key_id = %key.uid,
                    "Permission denied to get key string, skipping"
                );
                continue;
            }
            Err(e) => {
                tracing::error!(project_id, key_id = %key.uid, "Error getting key string: {}", e);
                continue;
            }
        };

        let provisioned = ProvisionedKey::cloud(key.clone(), key_string);
        ctx.account.lock().await.add_key(project, &provisioned);
    }

    managed_key_exists
}
