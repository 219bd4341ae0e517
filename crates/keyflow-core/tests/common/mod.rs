#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use keyflow_cloud::{
    CloudError, CloudKey, CloudProject, GENERATIVE_LANGUAGE_TOS_URL, KeyCloud, KeyRestrictions,
    ProjectLifecycle, Result,
};
use keyflow_core::{
    AcceptancePrompt, Account, AccountContext, AuthRef, RunOptions, TosGate,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const EMAIL: &str = "dev@example.com";

/// Mutating or secret-revealing calls seen by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateProject(String),
    EnableService(String),
    CreateKey(String),
    DeleteKey(String),
    GetKeyString(String),
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Call::GetKeyString(_))
    }
}

#[derive(Default)]
struct State {
    projects: Vec<CloudProject>,
    keys: HashMap<String, Vec<CloudKey>>,
    secrets: HashMap<String, String>,
    calls: Vec<Call>,
    list_keys_errors: HashMap<String, CloudError>,
    key_string_errors: HashMap<String, CloudError>,
    enable_errors: HashMap<String, CloudError>,
    create_project_error: Option<CloudError>,
    search_error: Option<CloudError>,
    panic_on_list: HashSet<String>,
    terms_accepted: bool,
    never_ready: bool,
    next_uid: usize,
    next_number: usize,
}

/// In-memory stand-in for one Google account
pub struct MemoryCloud {
    state: Mutex<State>,
}

impl MemoryCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                terms_accepted: true,
                next_number: 1000,
                ..Default::default()
            }),
        })
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn add_project(&self, project_id: &str) -> CloudProject {
        self.with_state(|s| {
            s.next_number += 1;
            let project = CloudProject::new(
                project_id,
                project_id.to_uppercase(),
                s.next_number.to_string(),
            );
            s.projects.push(project.clone());
            project
        })
    }

    pub fn add_key(&self, project_id: &str, uid: &str, display_name: &str) -> CloudKey {
        self.with_state(|s| {
            let key = CloudKey {
                uid: uid.to_string(),
                name: format!("projects/{}/locations/global/keys/{}", project_id, uid),
                display_name: display_name.to_string(),
                restrictions: KeyRestrictions::single_service("generativelanguage.googleapis.com"),
                create_time: Utc::now(),
                update_time: Utc::now(),
                key_string: None,
            };
            s.secrets.insert(key.name.clone(), format!("AIza-{}", uid));
            s.keys.entry(project_id.to_string()).or_default().push(key.clone());
            key
        })
    }

    pub fn remove_all_keys(&self, project_id: &str) {
        self.with_state(|s| {
            s.keys.remove(project_id);
        });
    }

    pub fn remove_key(&self, project_id: &str, uid: &str) {
        self.with_state(|s| {
            if let Some(keys) = s.keys.get_mut(project_id) {
                keys.retain(|k| k.uid != uid);
            }
        });
    }

    pub fn keys(&self, project_id: &str) -> Vec<CloudKey> {
        self.with_state(|s| s.keys.get(project_id).cloned().unwrap_or_default())
    }

    pub fn projects(&self) -> Vec<CloudProject> {
        self.with_state(|s| s.projects.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutating).collect()
    }

    pub fn fail_list_keys(&self, project_id: &str, err: CloudError) {
        self.with_state(|s| {
            s.list_keys_errors.insert(project_id.to_string(), err);
        });
    }

    pub fn fail_key_string(&self, uid: &str, err: CloudError) {
        self.with_state(|s| {
            s.key_string_errors.insert(uid.to_string(), err);
        });
    }

    pub fn fail_enable(&self, project_id: &str, err: CloudError) {
        self.with_state(|s| {
            s.enable_errors.insert(project_id.to_string(), err);
        });
    }

    pub fn fail_create_project(&self, err: CloudError) {
        self.with_state(|s| s.create_project_error = Some(err));
    }

    pub fn fail_search(&self, err: CloudError) {
        self.with_state(|s| s.search_error = Some(err));
    }

    pub fn panic_on_list(&self, project_id: &str) {
        self.with_state(|s| {
            s.panic_on_list.insert(project_id.to_string());
        });
    }

    pub fn require_terms(&self) {
        self.with_state(|s| s.terms_accepted = false);
    }

    pub fn accept_terms(&self) {
        self.with_state(|s| s.terms_accepted = true);
    }

    pub fn never_ready(&self) {
        self.with_state(|s| s.never_ready = true);
    }
}

#[async_trait]
impl KeyCloud for MemoryCloud {
    async fn search_projects(&self) -> Result<Vec<CloudProject>> {
        self.with_state(|s| match &s.search_error {
            Some(err) => Err(err.clone()),
            None => Ok(s.projects.clone()),
        })
    }

    async fn create_project(&self, project_id: &str, display_name: &str) -> Result<CloudProject> {
        self.with_state(|s| {
            s.calls.push(Call::CreateProject(project_id.to_string()));
            if let Some(err) = &s.create_project_error {
                return Err(err.clone());
            }
            s.next_number += 1;
            let number = s.next_number.to_string();
            let mut project = CloudProject::new(project_id, display_name, number);
            if s.never_ready {
                project = project.with_state(ProjectLifecycle::StateUnspecified);
            }
            s.projects.push(project.clone());
            Ok(project)
        })
    }

    async fn get_project(&self, project_id: &str) -> Result<CloudProject> {
        self.with_state(|s| {
            s.projects
                .iter()
                .find(|p| p.project_id == project_id)
                .cloned()
                .ok_or_else(|| CloudError::NotFound(project_id.to_string()))
        })
    }

    async fn enable_service(&self, project_id: &str, _service: &str) -> Result<()> {
        // give sibling workers a chance to interleave
        tokio::task::yield_now().await;
        self.with_state(|s| {
            s.calls.push(Call::EnableService(project_id.to_string()));
            if let Some(err) = s.enable_errors.get(project_id) {
                return Err(err.clone());
            }
            if !s.terms_accepted {
                return Err(CloudError::TermsNotAccepted {
                    message: format!("Terms of Service not accepted for project {}", project_id),
                    url: GENERATIVE_LANGUAGE_TOS_URL.to_string(),
                });
            }
            Ok(())
        })
    }

    async fn list_keys(&self, project_id: &str) -> Result<Vec<CloudKey>> {
        let should_panic = self.with_state(|s| s.panic_on_list.contains(project_id));
        if should_panic {
            panic!("simulated crash listing keys for {}", project_id);
        }
        self.with_state(|s| match s.list_keys_errors.get(project_id) {
            Some(err) => Err(err.clone()),
            None => Ok(s.keys.get(project_id).cloned().unwrap_or_default()),
        })
    }

    async fn get_key_string(&self, key_name: &str) -> Result<String> {
        self.with_state(|s| {
            s.calls.push(Call::GetKeyString(key_name.to_string()));
            let uid = key_name.rsplit('/').next().unwrap_or_default();
            if let Some(err) = s.key_string_errors.get(uid) {
                return Err(err.clone());
            }
            s.secrets
                .get(key_name)
                .cloned()
                .ok_or_else(|| CloudError::NotFound(key_name.to_string()))
        })
    }

    async fn create_key(
        &self,
        project_id: &str,
        display_name: &str,
        service: &str,
    ) -> Result<CloudKey> {
        self.with_state(|s| {
            s.calls.push(Call::CreateKey(project_id.to_string()));
            s.next_uid += 1;
            let uid = format!("created-{}", s.next_uid);
            let key = CloudKey {
                uid: uid.clone(),
                name: format!("projects/{}/locations/global/keys/{}", project_id, uid),
                display_name: display_name.to_string(),
                restrictions: KeyRestrictions::single_service(service),
                create_time: Utc::now(),
                update_time: Utc::now(),
                key_string: Some(format!("AIza-{}", uid)),
            };
            let mut listed = key.clone();
            listed.key_string = None;
            s.secrets.insert(key.name.clone(), format!("AIza-{}", uid));
            s.keys.entry(project_id.to_string()).or_default().push(listed);
            Ok(key)
        })
    }

    async fn delete_key(&self, key_name: &str) -> Result<()> {
        self.with_state(|s| {
            s.calls.push(Call::DeleteKey(key_name.to_string()));
            for keys in s.keys.values_mut() {
                keys.retain(|k| k.name != key_name);
            }
            Ok(())
        })
    }
}

/// Accepts the terms in the fake cloud after a short pause
pub struct AcceptingPrompt {
    cloud: Arc<MemoryCloud>,
    pub shown: AtomicUsize,
}

impl AcceptingPrompt {
    pub fn new(cloud: Arc<MemoryCloud>) -> Arc<Self> {
        Arc::new(Self {
            cloud,
            shown: AtomicUsize::new(0),
        })
    }

    pub fn shown(&self) -> usize {
        self.shown.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AcceptancePrompt for AcceptingPrompt {
    async fn confirm(&self, _message: &str, _url: &str) {
        self.shown.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.cloud.accept_terms();
    }
}

pub fn auth_ref() -> AuthRef {
    AuthRef::new(
        format!("credentials/{}.json", EMAIL),
        &["https://www.googleapis.com/auth/cloud-platform"],
    )
}

pub fn test_options() -> RunOptions {
    let mut options = RunOptions::default();
    options.tos_retry_delay = Duration::from_millis(1);
    options
}

/// Context for driving per-project operations directly
pub fn context(cloud: Arc<MemoryCloud>, options: RunOptions) -> AccountContext {
    let prompt = AcceptingPrompt::new(cloud.clone());
    context_with_prompt(cloud, options, prompt)
}

pub fn context_with_prompt(
    cloud: Arc<MemoryCloud>,
    options: RunOptions,
    prompt: Arc<AcceptingPrompt>,
) -> AccountContext {
    AccountContext {
        email: EMAIL.to_string(),
        cloud,
        account: Arc::new(tokio::sync::Mutex::new(Account::new(EMAIL, auth_ref()))),
        tos_gate: Arc::new(TosGate::new(prompt, options.tos_retry_delay)),
        options,
    }
}
