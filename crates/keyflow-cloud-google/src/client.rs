//! Google Cloud REST client
//!
//! Talks directly to Resource Manager v3, Service Usage v1 and API Keys v2
//! with a bearer token. Long-running operations are polled until done.

use crate::auth::{AccessToken, TokenSource};
use crate::error::{GoogleError, Result};
use async_trait::async_trait;
use chrono::Utc;
use keyflow_cloud::{CloudKey, CloudProject, KeyCloud, KeyRestrictions};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Base URLs of the three services
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub resource_manager: String,
    pub service_usage: String,
    pub api_keys: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            resource_manager: "https://cloudresourcemanager.googleapis.com/v3".to_string(),
            service_usage: "https://serviceusage.googleapis.com/v1".to_string(),
            api_keys: "https://apikeys.googleapis.com/v2".to_string(),
        }
    }
}

/// Polling of long-running operations
#[derive(Debug, Clone)]
struct OperationPolling {
    interval: Duration,
    max_interval: Duration,
    timeout: Duration,
}

impl Default for OperationPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(600),
        }
    }
}

/// [`KeyCloud`] for one authenticated Google account.
///
/// The access token is refreshed through the account's [`TokenSource`] when
/// it is about to expire or when the API answers 401.
pub struct GoogleCloud {
    http: reqwest::Client,
    tokens: Arc<TokenSource>,
    email: String,
    token: Mutex<AccessToken>,
    endpoints: Endpoints,
    polling: OperationPolling,
}

impl GoogleCloud {
    pub fn new(tokens: Arc<TokenSource>, email: impl Into<String>, token: AccessToken) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
            email: email.into(),
            token: Mutex::new(token),
            endpoints: Endpoints::default(),
            polling: OperationPolling::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Current bearer token, refreshed first if it expires too soon
    async fn bearer(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if !token.lasts(Utc::now(), self.tokens.min_validity()) {
            tracing::info!(email = %self.email, "Access token is about to expire, refreshing");
            *token = self.tokens.access_token(&self.email).await?;
        }
        Ok(token.secret.clone())
    }

    /// Replace a token the API rejected
    async fn replace_rejected(&self, rejected: &str) -> Result<String> {
        let mut token = self.token.lock().await;
        // a concurrent request may have replaced it already
        if token.secret == rejected {
            tracing::info!(email = %self.email, "Access token was rejected, refreshing");
            *token = self.tokens.refreshed_token(&self.email).await?;
        }
        Ok(token.secret.clone())
    }

    /// Send the request built by `request`, retrying once with a fresh token
    /// on 401
    async fn send<T: DeserializeOwned>(
        &self,
        request: impl Fn(&str) -> reqwest::RequestBuilder,
    ) -> Result<T> {
        let bearer = self.bearer().await?;
        let mut response = request(&bearer).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let bearer = self.replace_rejected(&bearer).await?;
            response = request(&bearer).send().await?;
        }
        parse_response(response).await
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.send(|bearer| self.http.get(url).bearer_auth(bearer)).await
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        url: &str,
        page_token: Option<&str>,
    ) -> Result<T> {
        self.send(|bearer| self.page_request(url, page_token, bearer))
            .await
    }

    fn page_request(
        &self,
        url: &str,
        page_token: Option<&str>,
        bearer: &str,
    ) -> reqwest::RequestBuilder {
        let request = self.http.get(url).bearer_auth(bearer);
        match page_token {
            Some(page_token) => request.query(&[("pageToken", page_token)]),
            None => request,
        }
    }

    async fn post<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(|bearer| self.http.post(url).bearer_auth(bearer).json(body))
            .await
    }

    async fn delete<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.send(|bearer| self.http.delete(url).bearer_auth(bearer)).await
    }

    /// Poll `operation` under `base` until it is done and return its response
    async fn wait_operation(
        &self,
        base: &str,
        mut operation: Operation,
    ) -> Result<serde_json::Value> {
        let started = tokio::time::Instant::now();
        let mut interval = self.polling.interval;

        loop {
            if operation.done {
                return operation.into_result();
            }
            if started.elapsed() >= self.polling.timeout {
                return Err(GoogleError::Operation {
                    name: operation.name,
                    code: GRPC_DEADLINE_EXCEEDED,
                    message: format!("not done after {:?}", self.polling.timeout),
                    details: String::new(),
                });
            }

            tokio::time::sleep(interval).await;
            interval = (interval * 2).min(self.polling.max_interval);

            tracing::debug!(operation = %operation.name, "Polling operation");
            operation = self.get(&format!("{}/{}", base, operation.name)).await?;
        }
    }

    async fn list_keys_raw(&self, project_id: &str) -> Result<Vec<CloudKey>> {
        let base = format!(
            "{}/projects/{}/locations/global/keys",
            self.endpoints.api_keys, project_id
        );
        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page: KeyPage = self.get_page(&base, page_token.as_deref()).await?;
            keys.extend(page.keys);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => return Ok(keys),
            }
        }
    }

    async fn search_projects_raw(&self) -> Result<Vec<CloudProject>> {
        let base = format!("{}/projects:search", self.endpoints.resource_manager);
        let mut projects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page: ProjectPage = self.get_page(&base, page_token.as_deref()).await?;
            projects.extend(page.projects);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => return Ok(projects),
            }
        }
    }
}

#[async_trait]
impl KeyCloud for GoogleCloud {
    async fn search_projects(&self) -> keyflow_cloud::Result<Vec<CloudProject>> {
        Ok(self.search_projects_raw().await?)
    }

    async fn create_project(
        &self,
        project_id: &str,
        display_name: &str,
    ) -> keyflow_cloud::Result<CloudProject> {
        let body = CreateProjectRequest {
            project_id,
            display_name,
        };
        let base = &self.endpoints.resource_manager;
        let operation: Operation = self.post(&format!("{}/projects", base), &body).await?;
        let response = self.wait_operation(base, operation).await?;
        Ok(serde_json::from_value(response)?)
    }

    async fn get_project(&self, project_id: &str) -> keyflow_cloud::Result<CloudProject> {
        let url = format!("{}/projects/{}", self.endpoints.resource_manager, project_id);
        Ok(self.get(&url).await?)
    }

    async fn enable_service(&self, project_id: &str, service: &str) -> keyflow_cloud::Result<()> {
        let base = &self.endpoints.service_usage;
        let url = format!("{}/projects/{}/services/{}:enable", base, project_id, service);
        let operation: Operation = self.post(&url, &serde_json::json!({})).await?;
        self.wait_operation(base, operation).await?;
        Ok(())
    }

    async fn list_keys(&self, project_id: &str) -> keyflow_cloud::Result<Vec<CloudKey>> {
        Ok(self.list_keys_raw(project_id).await?)
    }

    async fn get_key_string(&self, key_name: &str) -> keyflow_cloud::Result<String> {
        let url = format!("{}/{}/keyString", self.endpoints.api_keys, key_name);
        let response: KeyStringResponse = self.get(&url).await?;
        Ok(response.key_string)
    }

    async fn create_key(
        &self,
        project_id: &str,
        display_name: &str,
        service: &str,
    ) -> keyflow_cloud::Result<CloudKey> {
        let body = CreateKeyRequest {
            display_name,
            restrictions: KeyRestrictions::single_service(service),
        };
        let base = &self.endpoints.api_keys;
        let url = format!("{}/projects/{}/locations/global/keys", base, project_id);
        let operation: Operation = self.post(&url, &body).await?;
        let response = self.wait_operation(base, operation).await?;
        Ok(serde_json::from_value(response)?)
    }

    async fn delete_key(&self, key_name: &str) -> keyflow_cloud::Result<()> {
        let base = &self.endpoints.api_keys;
        let operation: Operation = self.delete(&format!("{}/{}", base, key_name)).await?;
        self.wait_operation(base, operation).await?;
        Ok(())
    }
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(status_error(status.as_u16(), body));
    }
    Ok(serde_json::from_str(&body)?)
}

fn status_error(status: u16, body: String) -> GoogleError {
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());
    GoogleError::Status {
        status,
        message,
        body,
    }
}

// ============ API Types ============

const GRPC_DEADLINE_EXCEEDED: i32 = 4;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationStatus>,
    #[serde(default)]
    response: Option<serde_json::Value>,
}

impl Operation {
    fn into_result(self) -> Result<serde_json::Value> {
        match self.error {
            Some(status) => Err(GoogleError::Operation {
                name: self.name,
                code: status.code,
                message: status.message,
                details: status.details.to_string(),
            }),
            None => Ok(self.response.unwrap_or(serde_json::Value::Null)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectPage {
    #[serde(default)]
    projects: Vec<CloudProject>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyPage {
    #[serde(default)]
    keys: Vec<CloudKey>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStringResponse {
    key_string: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateProjectRequest<'a> {
    project_id: &'a str,
    display_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateKeyRequest<'a> {
    display_name: &'a str,
    restrictions: KeyRestrictions,
}
