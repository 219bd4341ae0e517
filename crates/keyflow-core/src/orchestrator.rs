//! Account-level orchestration
//!
//! For one authenticated account: resolve its ledger entry, list (and for
//! `create`, top up) its projects, then run one task per project on a
//! bounded worker pool. All tasks of the account share one ToS gate and one
//! ledger lock.

use crate::context::{AccountContext, SharedAccount};
use crate::delete::delete_managed_keys;
use crate::ensure::ensure_projects;
use crate::ledger::{AuthRef, Ledger};
use crate::options::RunOptions;
use crate::provision::provision;
use crate::tos::{AcceptancePrompt, TosGate};
use futures_util::FutureExt;
use keyflow_cloud::{CloudError, CloudProject, KeyCloud};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

const IAM_SETTINGS_URL: &str = "https://console.cloud.google.com/iam-admin/settings";

/// What to do with every project of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Create,
    Delete,
}

impl std::fmt::Display for KeyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyAction::Create => write!(f, "create"),
            KeyAction::Delete => write!(f, "delete"),
        }
    }
}

/// Outcome of one account run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountReport {
    /// Projects handed to the worker pool
    pub projects: usize,

    /// Projects created by the ensurer (zero in dry-run)
    pub created_projects: usize,

    /// Tasks that panicked or were aborted
    pub failed_tasks: usize,
}

pub struct AccountOrchestrator {
    options: RunOptions,
    prompt: Arc<dyn AcceptancePrompt>,
}

impl AccountOrchestrator {
    pub fn new(options: RunOptions, prompt: Arc<dyn AcceptancePrompt>) -> Self {
        Self { options, prompt }
    }

    /// Run `action` for one account against `ledger`.
    ///
    /// An error listing projects aborts this account only and is returned
    /// after being logged. Failures creating or processing single projects
    /// never surface here.
    pub async fn process(
        &self,
        email: &str,
        auth_ref: &AuthRef,
        cloud: Arc<dyn KeyCloud>,
        action: KeyAction,
        ledger: &mut Ledger,
    ) -> Result<AccountReport, CloudError> {
        tracing::info!(email, "--- Processing account for action: {} ---", action);
        if self.options.dry_run {
            tracing::info!("*** DRY RUN MODE ENABLED ***");
        }

        let (slot, account) = ledger.take_account(email, auth_ref);
        let shared: SharedAccount = Arc::new(Mutex::new(account));

        let ctx = AccountContext {
            email: email.to_string(),
            cloud,
            account: shared.clone(),
            tos_gate: Arc::new(TosGate::new(
                self.prompt.clone(),
                self.options.tos_retry_delay,
            )),
            options: self.options.clone(),
        };
        let result = run_account(&ctx, action).await;
        drop(ctx);

        let account = match Arc::try_unwrap(shared) {
            Ok(mutex) => mutex.into_inner(),
            Err(still_shared) => still_shared.lock().await.clone(),
        };
        ledger.restore_account(slot, account);

        match &result {
            Ok(report) => tracing::info!(
                email,
                projects = report.projects,
                created = report.created_projects,
                failed = report.failed_tasks,
                "--- Finished account ---"
            ),
            Err(CloudError::PermissionDenied(reason)) => tracing::error!(
                email,
                "Permission denied for account. Check IAM roles. {}",
                reason
            ),
            Err(e) => tracing::error!(
                email,
                "An API error occurred while processing account: {}",
                e
            ),
        }
        result
    }
}

async fn run_account(
    ctx: &AccountContext,
    action: KeyAction,
) -> Result<AccountReport, CloudError> {
    let mut report = AccountReport::default();
    let mut projects = ctx.cloud.search_projects().await?;

    if action == KeyAction::Create {
        if projects.is_empty() {
            tracing::warn!(
                email = %ctx.email,
                "No projects found. This could be due to several reasons:"
            );
            tracing::warn!("  1. The account truly has no projects.");
            tracing::warn!(
                "  2. The Cloud Resource Manager API Terms of Service have not been accepted."
            );
            tracing::warn!(
                "Please ensure the ToS are accepted by visiting: {}?user={}",
                IAM_SETTINGS_URL,
                ctx.email
            );
        }

        let before = projects.len();
        projects = ensure_projects(ctx, projects).await;
        report.created_projects = projects.len().saturating_sub(before);
    }

    if projects.is_empty() {
        tracing::info!(email = %ctx.email, "No projects to process");
        return Ok(report);
    }

    report.projects = projects.len();
    report.failed_tasks = run_pool(ctx, projects, action).await;
    Ok(report)
}

/// Run one task per project, at most `max_workers` at a time. Returns how
/// many tasks failed.
async fn run_pool(ctx: &AccountContext, projects: Vec<CloudProject>, action: KeyAction) -> usize {
    let semaphore = Arc::new(Semaphore::new(ctx.options.max_workers.max(1)));
    let mut tasks = JoinSet::new();

    for project in projects {
        let ctx = ctx.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let project_id = project.project_id.clone();
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (project_id, Err("worker pool closed".to_string()));
            };

            let outcome = AssertUnwindSafe(process_project(&ctx, &project, action))
                .catch_unwind()
                .await
                .map_err(panic_message);
            (project_id, outcome)
        });
    }

    let mut failed = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((project_id, Err(reason))) => {
                tracing::error!(project_id = %project_id, "Project task failed: {}", reason);
                failed += 1;
            }
            Err(e) => {
                tracing::error!("A project task was aborted: {}", e);
                failed += 1;
            }
        }
    }
    failed
}

async fn process_project(ctx: &AccountContext, project: &CloudProject, action: KeyAction) {
    let project_id = project.project_id.as_str();
    tracing::info!(project_id, "- Starting to process project ({})", project.display_name);

    match action {
        KeyAction::Create => provision(ctx, project).await,
        KeyAction::Delete => {
            delete_managed_keys(ctx, project).await;
        }
    }

    tracing::info!(project_id, "- Finished processing project");
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
