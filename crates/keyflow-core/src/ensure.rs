//! Tops an account up to the target number of projects

use crate::context::AccountContext;
use crate::options::ReadinessConfig;
use keyflow_cloud::{CloudError, CloudProject, KeyCloud};
use rand::Rng;
use tokio::time::{Instant, sleep};

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 10;

/// Random lowercase alphanumeric suffix for project ids
pub fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect()
}

/// `(project_id, display_name)` for the `number`-th project of an account
pub fn project_identity(number: usize) -> (String, String) {
    (
        format!("project{:02}-{}", number, random_suffix()),
        format!("Project{:02}", number),
    )
}

/// Create projects until the account has `options.target_projects`.
///
/// Projects are created one after another and appended to `projects` once
/// they report ACTIVE. A project that never becomes ready is dropped. A
/// failing create call stops the top-up; the projects gathered so far are
/// still returned.
pub async fn ensure_projects(
    ctx: &AccountContext,
    mut projects: Vec<CloudProject>,
) -> Vec<CloudProject> {
    let target = ctx.options.target_projects;
    if projects.len() >= target {
        return projects;
    }

    let existing = projects.len();
    tracing::info!(
        email = %ctx.email,
        "Account has {} project(s), creating {} more",
        existing,
        target - existing
    );

    for number in existing + 1..=target {
        let (project_id, display_name) = project_identity(number);
        tracing::info!(project_id = %project_id, "Attempting to create project '{}'", display_name);

        if ctx.dry_run() {
            tracing::info!(
                project_id = %project_id,
                "[DRY RUN] Would create project '{}'",
                display_name
            );
            continue;
        }

        let created = match ctx.cloud.create_project(&project_id, &display_name).await {
            Ok(created) => created,
            Err(e) => {
                log_create_failure(&project_id, &e);
                tracing::warn!(
                    email = %ctx.email,
                    "Stopping project creation, continuing with {} project(s)",
                    projects.len()
                );
                break;
            }
        };
        tracing::info!(project_id = %created.project_id, "Project create operation finished");

        let readiness = &ctx.options.readiness;
        match wait_until_ready(ctx.cloud.as_ref(), &created.project_id, readiness).await {
            Ok(ready) => projects.push(ready),
            Err(e) => {
                tracing::error!(
                    project_id = %created.project_id,
                    "Project did not become ready, dropping it: {}",
                    e
                );
            }
        }
    }

    projects
}

fn log_create_failure(project_id: &str, err: &CloudError) {
    match err {
        CloudError::PermissionDenied(reason) => tracing::error!(
            project_id,
            "Permission denied while creating project. Check IAM roles. {}",
            reason
        ),
        CloudError::TermsNotAccepted { message, url } => tracing::error!(
            project_id,
            "Terms of Service must be accepted before creating projects ({}): {}",
            url,
            message
        ),
        other => tracing::error!(project_id, "Failed to create project: {}", other),
    }
}

/// Poll the project until it is ACTIVE, backing off exponentially.
///
/// Errors while polling (a new project is often briefly invisible) are
/// treated like "not ready yet".
pub async fn wait_until_ready(
    cloud: &dyn KeyCloud,
    project_id: &str,
    config: &ReadinessConfig,
) -> Result<CloudProject, CloudError> {
    let deadline = Instant::now() + config.timeout;
    let mut attempt = 0;

    loop {
        match cloud.get_project(project_id).await {
            Ok(project) if project.is_active() => return Ok(project),
            Ok(project) => {
                tracing::debug!(project_id, state = %project.state, "Project not ready yet");
            }
            Err(e) => {
                tracing::debug!(project_id, "Readiness check failed: {}", e);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(CloudError::Timeout(format!(
                "project {} not ACTIVE after {:?}",
                project_id, config.timeout
            )));
        }

        let delay = config.delay_for_attempt(attempt).min(deadline - now);
        sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_identity() {
        let (id, name) = project_identity(7);
        assert!(id.starts_with("project07-"));
        assert_eq!(id.len(), "project07-".len() + SUFFIX_LEN);
        assert_eq!(name, "Project07");

        let suffix = &id["project07-".len()..];
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn test_suffixes_differ() {
        assert_ne!(random_suffix(), random_suffix());
    }
}
