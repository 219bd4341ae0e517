//! Credential acquisition for every requested account

use futures_util::{StreamExt, stream};
use keyflow_cloud_google::{AccessToken, GoogleError, TokenSource};

/// Result of checking credentials for all accounts
#[derive(Debug, Default)]
pub struct Acquired {
    /// `(email, access token)` in the order the accounts were requested
    pub ready: Vec<(String, AccessToken)>,

    /// Accounts that need a fresh login, sorted
    pub missing: Vec<String>,
}

/// Load (and refresh where needed) tokens for `emails`, at most `width`
/// accounts at a time.
pub async fn acquire(tokens: &TokenSource, emails: &[String], width: usize) -> Acquired {
    tracing::info!("Checking credentials and refreshing tokens for all accounts...");

    let mut results: Vec<(usize, String, Result<AccessToken, GoogleError>)> =
        stream::iter(emails.iter().enumerate())
            .map(|(index, email)| async move {
                (index, email.clone(), tokens.access_token(email).await)
            })
            .buffer_unordered(width.max(1))
            .collect()
            .await;
    results.sort_by_key(|(index, _, _)| *index);

    let mut acquired = Acquired::default();
    for (_, email, result) in results {
        match result {
            Ok(token) => acquired.ready.push((email, token)),
            Err(GoogleError::TokenFileMalformed { reason, .. }) => {
                tracing::warn!(
                    email = %email,
                    "Could not decode token file ({}). Re-authentication will be required.",
                    reason
                );
                acquired.missing.push(email);
            }
            Err(e) => {
                tracing::warn!(email = %email, "No usable credentials: {}", e);
                acquired.missing.push(email);
            }
        }
    }
    acquired.missing.sort();

    if !acquired.missing.is_empty() {
        tracing::warn!(
            "The following accounts require manual authentication and will be skipped: {}",
            acquired.missing.join(", ")
        );
    }
    tracing::info!("--- Credential checking complete ---");
    acquired
}
