mod common;

use common::{Call, MemoryCloud, context, test_options};
use keyflow_cloud::CloudError;
use keyflow_core::{KeyState, reconcile};

/// Empty ledger, cloud has p1/k1 "Gemini API Key": p1 and k1 land in the ledger
#[tokio::test]
async fn test_cloud_only_key_is_recorded() {
    let cloud = MemoryCloud::new();
    let project = cloud.add_project("p1");
    cloud.add_key("p1", "k1", "Gemini API Key");
    let ctx = context(cloud.clone(), test_options());

    assert!(reconcile(&ctx, &project).await);

    let account = ctx.account.lock().await;
    let recorded = account.project("p1").expect("project row created");
    assert_eq!(recorded.api_keys.len(), 1);
    let key = &recorded.api_keys[0];
    assert_eq!(key.key_id(), "k1");
    assert_eq!(key.state, KeyState::Active);
    assert_eq!(key.key_details.key_string, "AIza-k1");
    assert_eq!(recorded.project_info.project_name, "P1");
}

/// Ledger has p1/k1 ACTIVE, cloud has nothing: k1 becomes INACTIVE but stays
#[tokio::test]
async fn test_ledger_only_key_is_deactivated() {
    let cloud = MemoryCloud::new();
    let project = cloud.add_project("p1");
    cloud.add_key("p1", "k1", "Gemini API Key");
    let ctx = context(cloud.clone(), test_options());
    reconcile(&ctx, &project).await;
    let before = ctx.account.lock().await.project("p1").unwrap().api_keys[0]
        .key_details
        .updated_at;

    cloud.remove_all_keys("p1");
    assert!(!reconcile(&ctx, &project).await);

    let account = ctx.account.lock().await;
    let keys = &account.project("p1").unwrap().api_keys;
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].state, KeyState::Inactive);
    assert!(keys[0].key_details.updated_at > before);
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let cloud = MemoryCloud::new();
    let project = cloud.add_project("p1");
    cloud.add_key("p1", "k1", "Gemini API Key");
    cloud.add_key("p1", "k2", "Browser key");
    let ctx = context(cloud.clone(), test_options());

    // one stale record so deactivation is part of the picture
    reconcile(&ctx, &project).await;
    cloud.add_key("p1", "k3", "Old key");
    reconcile(&ctx, &project).await;
    cloud.remove_key("p1", "k3");
    reconcile(&ctx, &project).await;

    let first = ctx.account.lock().await.clone();
    reconcile(&ctx, &project).await;
    reconcile(&ctx, &project).await;
    let second = ctx.account.lock().await.clone();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_repeated_reconcile_never_duplicates() {
    let cloud = MemoryCloud::new();
    let project = cloud.add_project("p1");
    cloud.add_key("p1", "k1", "Gemini API Key");
    let ctx = context(cloud.clone(), test_options());

    let mut handles = Vec::new();
    for _ in 0..5 {
        let ctx = ctx.clone();
        let project = project.clone();
        handles.push(tokio::spawn(async move { reconcile(&ctx, &project).await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    let account = ctx.account.lock().await;
    assert_eq!(account.projects.len(), 1);
    assert_eq!(account.project("p1").unwrap().api_keys.len(), 1);
}

#[tokio::test]
async fn test_second_managed_name_counts_as_existing() {
    let cloud = MemoryCloud::new();
    let project = cloud.add_project("p1");
    cloud.add_key("p1", "k1", "Generative Language API Key");
    let ctx = context(cloud.clone(), test_options());

    assert!(reconcile(&ctx, &project).await);
}

#[tokio::test]
async fn test_unmanaged_keys_are_recorded_but_not_counted() {
    let cloud = MemoryCloud::new();
    let project = cloud.add_project("p1");
    cloud.add_key("p1", "k1", "Maps key");
    let ctx = context(cloud.clone(), test_options());

    assert!(!reconcile(&ctx, &project).await);
    assert_eq!(ctx.account.lock().await.project("p1").unwrap().api_keys.len(), 1);
}

#[tokio::test]
async fn test_permission_denied_on_key_string_skips_only_that_key() {
    let cloud = MemoryCloud::new();
    let project = cloud.add_project("p1");
    cloud.add_key("p1", "k1", "Gemini API Key");
    cloud.add_key("p1", "k2", "Other key");
    cloud.fail_key_string(
        "k1",
        CloudError::PermissionDenied("no apikeys.keys.getKeyString".into()),
    );
    let ctx = context(cloud.clone(), test_options());

    // still reported as existing: the listing saw it
    assert!(reconcile(&ctx, &project).await);

    let account = ctx.account.lock().await;
    let keys = &account.project("p1").unwrap().api_keys;
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].key_id(), "k2");
}

#[tokio::test]
async fn test_api_error_on_key_string_skips_key() {
    let cloud = MemoryCloud::new();
    let project = cloud.add_project("p1");
    cloud.add_key("p1", "k1", "Gemini API Key");
    cloud.fail_key_string("k1", CloudError::Api("503".into()));
    let ctx = context(cloud.clone(), test_options());

    reconcile(&ctx, &project).await;
    assert!(ctx.account.lock().await.project("p1").unwrap().api_keys.is_empty());
}

#[tokio::test]
async fn test_listing_failure_reports_no_key() {
    let cloud = MemoryCloud::new();
    let project = cloud.add_project("p1");
    cloud.add_key("p1", "k1", "Gemini API Key");
    cloud.fail_list_keys("p1", CloudError::PermissionDenied("apikeys.keys.list".into()));
    let ctx = context(cloud.clone(), test_options());

    assert!(!reconcile(&ctx, &project).await);
    // nothing touched, not even the project row
    assert!(ctx.account.lock().await.projects.is_empty());

    cloud.fail_list_keys("p1", CloudError::Api("internal".into()));
    assert!(!reconcile(&ctx, &project).await);
}

#[tokio::test]
async fn test_dry_run_reconcile_only_logs() {
    let cloud = MemoryCloud::new();
    let project = cloud.add_project("p1");
    cloud.add_key("p1", "k1", "Gemini API Key");
    let ctx = context(cloud.clone(), test_options());
    reconcile(&ctx, &project).await;
    cloud.remove_all_keys("p1");
    cloud.add_key("p1", "k2", "Gemini API Key");

    let dry = context(cloud.clone(), test_options().dry_run(true));
    *dry.account.lock().await = ctx.account.lock().await.clone();
    let calls_before = cloud.calls().len();

    assert!(reconcile(&dry, &project).await);

    let account = dry.account.lock().await;
    let keys = &account.project("p1").unwrap().api_keys;
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].key_id(), "k1");
    assert_eq!(keys[0].state, KeyState::Active);
    assert!(
        !cloud.calls()[calls_before..]
            .iter()
            .any(|c| matches!(c, Call::GetKeyString(_)))
    );
}
