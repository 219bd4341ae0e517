mod cli;
mod credentials;
mod logging;
mod prompt;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use colored::Colorize;
use keyflow_cloud::KeyCloud;
use keyflow_cloud_google::{
    CLOUD_PLATFORM_SCOPE, ClientSecrets, GoogleCloud, RefreshPolicy, TokenSource,
};
use keyflow_config::{Paths, load_emails};
use keyflow_core::{
    AccountOrchestrator, AuthRef, KeyAction, LedgerSchema, LedgerStore, RunOptions,
};
use prompt::ConsolePrompt;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let paths = match Paths::resolve(cli.home.clone()) {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let log_file = match logging::init(&paths.logs_dir()) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Logging to {}", log_file.display());
    tracing::info!(?cli, "Program arguments");

    match run(cli, paths).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, paths: Paths) -> anyhow::Result<()> {
    let action = KeyAction::from(cli.action);

    let client_secrets = ClientSecrets::load(&paths.client_secrets_file()).with_context(|| {
        format!(
            "OAuth client secrets are required at '{}'. \
             Create an OAuth client of type 'Desktop app' and save its JSON there.",
            paths.client_secrets_file().display()
        )
    })?;
    paths.ensure_dirs()?;

    let schema = LedgerSchema::load(paths.schema_file()).await?;
    let store = LedgerStore::new(paths.database_file(), schema);
    let mut ledger = store.load().await;

    let emails = match &cli.email {
        Some(email) => vec![email.clone()],
        None => load_emails(&paths.emails_file())?,
    };
    if emails.is_empty() {
        anyhow::bail!("No emails found in {}", paths.emails_file().display());
    }

    let tokens = Arc::new(
        TokenSource::new(
            paths.credentials_dir(),
            RefreshPolicy {
                retries: cli.auth_retries,
                delay: Duration::from_secs(cli.auth_retry_delay),
                ..RefreshPolicy::default()
            },
        )
        .with_client_secrets(client_secrets),
    );
    let acquired = credentials::acquire(&tokens, &emails, cli.max_workers).await;

    if acquired.ready.is_empty() {
        tracing::warn!("No accounts with usable credentials, nothing to do");
        return Ok(());
    }

    let options = RunOptions::default()
        .dry_run(cli.dry_run)
        .with_max_workers(cli.max_workers)
        .with_target_projects(cli.target_projects);
    let orchestrator = AccountOrchestrator::new(options, Arc::new(ConsolePrompt));

    for (email, access_token) in acquired.ready.iter().cloned() {
        let cloud: Arc<dyn KeyCloud> =
            Arc::new(GoogleCloud::new(tokens.clone(), email.as_str(), access_token));
        let auth_ref = AuthRef::new(paths.token_file_ref(&email), &[CLOUD_PLATFORM_SCOPE]);

        // the orchestrator already logged the failure; other accounts go on
        if let Err(e) = orchestrator
            .process(&email, &auth_ref, cloud, action, &mut ledger)
            .await
        {
            tracing::debug!(email = %email, "Account aborted: {}", e);
        }
    }

    store.persist(&mut ledger, cli.dry_run).await?;

    tracing::info!(
        accounts = acquired.ready.len(),
        skipped = acquired.missing.len(),
        keys = ledger.key_count(),
        "--- Run complete ---"
    );
    Ok(())
}
