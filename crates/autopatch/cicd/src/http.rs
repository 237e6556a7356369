//! HTTP providers: GitHub Actions, GitLab CI, Jenkins, CircleCI and an
//! internal deployment endpoint

use crate::error::{CicdError, Result};
use crate::provider::{CicdProvider, DispatchReceipt, PipelineState};
use async_trait::async_trait;
use autopatch_types::DeploymentTrigger;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Which CI/CD system to call, with its coordinates and credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    GithubActions {
        #[serde(default = "default_github_api")]
        api_url: String,
        #[serde(default = "default_github_web")]
        web_url: String,
        owner: String,
        repo: String,
        /// Workflow file name or id
        workflow: String,
        #[serde(default = "default_ref")]
        git_ref: String,
        token: String,
    },
    GitlabCi {
        base_url: String,
        /// Numeric id or url-encoded path
        project: String,
        trigger_token: String,
        #[serde(default)]
        api_token: Option<String>,
        #[serde(default = "default_ref")]
        git_ref: String,
    },
    Jenkins {
        base_url: String,
        job: String,
        username: String,
        api_token: String,
    },
    CircleCi {
        #[serde(default = "default_circleci_api")]
        api_url: String,
        /// e.g. `gh/org/repo`
        project_slug: String,
        #[serde(default = "default_ref")]
        branch: String,
        token: String,
    },
    Internal {
        endpoint: String,
        #[serde(default)]
        token: Option<String>,
    },
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_github_web() -> String {
    "https://github.com".to_string()
}

fn default_circleci_api() -> String {
    "https://circleci.com/api/v2".to_string()
}

fn default_ref() -> String {
    "main".to_string()
}

impl ProviderConfig {
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::GithubActions { .. } => "github-actions",
            Self::GitlabCi { .. } => "gitlab-ci",
            Self::Jenkins { .. } => "jenkins",
            Self::CircleCi { .. } => "circleci",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Provider that talks to a real CI/CD system over HTTP
#[derive(Debug, Clone)]
pub struct HttpCicdProvider {
    config: ProviderConfig,
    client: Client,
}

impl HttpCicdProvider {
    pub fn new(config: ProviderConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("autopatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn dispatch_error(&self, reason: impl Into<String>) -> CicdError {
        CicdError::Dispatch {
            provider: self.name().to_string(),
            reason: reason.into(),
        }
    }

    fn poll_error(&self, reason: impl Into<String>) -> CicdError {
        CicdError::Poll {
            provider: self.name().to_string(),
            reason: reason.into(),
        }
    }

    async fn send_dispatch(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.dispatch_error(format!("{status}: {}", truncate(&body))));
        }
        Ok(response)
    }

    async fn get_json(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(self.poll_error(format!("status {status}")));
        }
        Ok(response.json().await?)
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((i, _)) => &body[..i],
        None => body,
    }
}

fn config_string(trigger: &DeploymentTrigger) -> String {
    trigger.deployment_config().to_string()
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl CicdProvider for HttpCicdProvider {
    fn name(&self) -> &str {
        self.config.provider_name()
    }

    #[instrument(skip(self, trigger), fields(provider = %self.name(), trigger_id = %trigger.id()))]
    async fn dispatch(&self, trigger: &DeploymentTrigger) -> Result<DispatchReceipt> {
        let payload = trigger.payload();
        let receipt = match &self.config {
            ProviderConfig::GithubActions {
                api_url,
                web_url,
                owner,
                repo,
                workflow,
                git_ref,
                token,
            } => {
                let url = format!("{api_url}/repos/{owner}/{repo}/actions/workflows/{workflow}/dispatches");
                let inputs = json!({
                    "component": trigger.component(),
                    "version": trigger.version(),
                    "trigger_id": trigger.id().as_uuid().to_string(),
                    "deployment_config": config_string(trigger),
                });
                self.send_dispatch(
                    self.client
                        .post(&url)
                        .bearer_auth(token)
                        .header("Accept", "application/vnd.github+json")
                        .json(&json!({ "ref": git_ref, "inputs": inputs })),
                )
                .await?;
                let pipeline = format!("{web_url}/{owner}/{repo}/actions/workflows/{workflow}");
                DispatchReceipt {
                    logs_url: Some(pipeline.clone()),
                    pipeline_url: Some(pipeline),
                    external_id: None,
                }
            }
            ProviderConfig::GitlabCi {
                base_url,
                project,
                trigger_token,
                git_ref,
                ..
            } => {
                let url = format!("{base_url}/api/v4/projects/{project}/trigger/pipeline");
                let trigger_id = trigger.id().as_uuid().to_string();
                let deployment_config = config_string(trigger);
                let form = [
                    ("token", trigger_token.as_str()),
                    ("ref", git_ref.as_str()),
                    ("variables[COMPONENT]", trigger.component()),
                    ("variables[VERSION]", trigger.version()),
                    ("variables[TRIGGER_ID]", trigger_id.as_str()),
                    ("variables[DEPLOYMENT_CONFIG]", deployment_config.as_str()),
                ];
                let body: Value = self
                    .send_dispatch(self.client.post(&url).form(&form))
                    .await?
                    .json()
                    .await?;
                let id = str_field(&body, "id")
                    .ok_or_else(|| self.dispatch_error("response has no pipeline id"))?;
                let web = str_field(&body, "web_url");
                DispatchReceipt {
                    logs_url: web.clone(),
                    pipeline_url: web,
                    external_id: Some(id),
                }
            }
            ProviderConfig::Jenkins {
                base_url,
                job,
                username,
                api_token,
            } => {
                let url = format!("{base_url}/job/{job}/buildWithParameters");
                let trigger_id = trigger.id().as_uuid().to_string();
                let deployment_config = config_string(trigger);
                let params = [
                    ("COMPONENT", trigger.component()),
                    ("VERSION", trigger.version()),
                    ("TRIGGER_ID", trigger_id.as_str()),
                    ("DEPLOYMENT_CONFIG", deployment_config.as_str()),
                ];
                let response = self
                    .send_dispatch(
                        self.client
                            .post(&url)
                            .basic_auth(username, Some(api_token))
                            .form(&params),
                    )
                    .await?;
                let queue_item = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                DispatchReceipt {
                    pipeline_url: Some(format!("{base_url}/job/{job}/")),
                    logs_url: Some(format!("{base_url}/job/{job}/lastBuild/console")),
                    external_id: queue_item,
                }
            }
            ProviderConfig::CircleCi {
                api_url,
                project_slug,
                branch,
                token,
            } => {
                let url = format!("{api_url}/project/{project_slug}/pipeline");
                let body: Value = self
                    .send_dispatch(
                        self.client
                            .post(&url)
                            .header("Circle-Token", token)
                            .json(&json!({
                                "branch": branch,
                                "parameters": {
                                    "component": trigger.component(),
                                    "version": trigger.version(),
                                    "trigger_id": trigger.id().as_uuid().to_string(),
                                    "deployment_config": config_string(trigger),
                                }
                            })),
                    )
                    .await?
                    .json()
                    .await?;
                let id = str_field(&body, "id")
                    .ok_or_else(|| self.dispatch_error("response has no pipeline id"))?;
                let pipeline = str_field(&body, "number")
                    .map(|n| format!("https://app.circleci.com/pipelines/{project_slug}/{n}"));
                DispatchReceipt {
                    logs_url: pipeline.clone(),
                    pipeline_url: pipeline,
                    external_id: Some(id),
                }
            }
            ProviderConfig::Internal { endpoint, token } => {
                let mut request = self.client.post(format!("{endpoint}/deployments")).json(&payload);
                if let Some(token) = token {
                    request = request.bearer_auth(token);
                }
                let response = self.send_dispatch(request).await?;
                let body: Value = if response.status() == StatusCode::NO_CONTENT {
                    Value::Null
                } else {
                    response.json().await.unwrap_or(Value::Null)
                };
                let trigger_id = trigger.id().as_uuid().to_string();
                DispatchReceipt {
                    pipeline_url: str_field(&body, "pipeline_url")
                        .or_else(|| Some(format!("{endpoint}/deployments/{trigger_id}"))),
                    logs_url: str_field(&body, "logs_url"),
                    external_id: str_field(&body, "id").or(Some(trigger_id)),
                }
            }
        };

        info!(pipeline_url = ?receipt.pipeline_url, "Deployment dispatched");
        Ok(receipt)
    }

    async fn poll(
        &self,
        trigger: &DeploymentTrigger,
        receipt: &DispatchReceipt,
    ) -> Result<PipelineState> {
        let state = match &self.config {
            ProviderConfig::GithubActions {
                api_url,
                owner,
                repo,
                workflow,
                token,
                ..
            } => {
                let url = format!(
                    "{api_url}/repos/{owner}/{repo}/actions/workflows/{workflow}/runs?event=workflow_dispatch&per_page=1"
                );
                let body = self
                    .get_json(
                        self.client
                            .get(&url)
                            .bearer_auth(token)
                            .header("Accept", "application/vnd.github+json"),
                    )
                    .await?;
                match body["workflow_runs"].get(0) {
                    Some(run) => github_state(run),
                    None => PipelineState::Queued,
                }
            }
            ProviderConfig::GitlabCi {
                base_url,
                project,
                api_token,
                ..
            } => {
                let id = receipt
                    .external_id
                    .as_deref()
                    .ok_or_else(|| self.poll_error("no pipeline id recorded"))?;
                let mut request = self
                    .client
                    .get(format!("{base_url}/api/v4/projects/{project}/pipelines/{id}"));
                if let Some(token) = api_token {
                    request = request.header("PRIVATE-TOKEN", token);
                }
                let body = self.get_json(request).await?;
                gitlab_state(body["status"].as_str().unwrap_or_default())
            }
            ProviderConfig::Jenkins {
                base_url,
                job,
                username,
                api_token,
            } => {
                let response = self
                    .client
                    .get(format!("{base_url}/job/{job}/lastBuild/api/json"))
                    .basic_auth(username, Some(api_token))
                    .send()
                    .await?;
                if response.status() == StatusCode::NOT_FOUND {
                    PipelineState::Queued
                } else if !response.status().is_success() {
                    return Err(self.poll_error(format!("status {}", response.status())));
                } else {
                    jenkins_state(&response.json::<Value>().await?)
                }
            }
            ProviderConfig::CircleCi { api_url, token, .. } => {
                let id = receipt
                    .external_id
                    .as_deref()
                    .ok_or_else(|| self.poll_error("no pipeline id recorded"))?;
                let body = self
                    .get_json(
                        self.client
                            .get(format!("{api_url}/pipeline/{id}/workflow"))
                            .header("Circle-Token", token),
                    )
                    .await?;
                let statuses: Vec<&str> = body["items"]
                    .as_array()
                    .map(|items| items.iter().filter_map(|i| i["status"].as_str()).collect())
                    .unwrap_or_default();
                circleci_state(&statuses)
            }
            ProviderConfig::Internal { endpoint, token } => {
                let mut request = self
                    .client
                    .get(format!("{endpoint}/deployments/{}", trigger.id().as_uuid()));
                if let Some(token) = token {
                    request = request.bearer_auth(token);
                }
                let body = self.get_json(request).await?;
                internal_state(&body)
            }
        };
        debug!(provider = %self.name(), trigger_id = %trigger.id(), state = ?state, "Pipeline polled");
        Ok(state)
    }
}

// ── Status Mapping ─────────────────────────────────────────────────────

fn github_state(run: &Value) -> PipelineState {
    match run["status"].as_str().unwrap_or_default() {
        "completed" => match run["conclusion"].as_str().unwrap_or_default() {
            "success" => PipelineState::Succeeded,
            "cancelled" | "skipped" => PipelineState::Cancelled,
            other => PipelineState::Failed(format!("workflow run concluded {other}")),
        },
        "in_progress" => PipelineState::Running,
        _ => PipelineState::Queued,
    }
}

fn gitlab_state(status: &str) -> PipelineState {
    match status {
        "success" => PipelineState::Succeeded,
        "failed" => PipelineState::Failed("pipeline failed".to_string()),
        "canceled" | "skipped" => PipelineState::Cancelled,
        "running" | "manual" => PipelineState::Running,
        _ => PipelineState::Queued,
    }
}

fn jenkins_state(build: &Value) -> PipelineState {
    if build["building"].as_bool().unwrap_or(false) {
        return PipelineState::Running;
    }
    match build["result"].as_str() {
        Some("SUCCESS") => PipelineState::Succeeded,
        Some("ABORTED") | Some("NOT_BUILT") => PipelineState::Cancelled,
        Some(other) => PipelineState::Failed(format!("build result {other}")),
        None => PipelineState::Queued,
    }
}

fn circleci_state(statuses: &[&str]) -> PipelineState {
    if statuses.is_empty() {
        return PipelineState::Queued;
    }
    if let Some(bad) = statuses
        .iter()
        .find(|s| matches!(**s, "failed" | "error" | "failing" | "unauthorized"))
    {
        return PipelineState::Failed(format!("workflow {bad}"));
    }
    if statuses.iter().any(|s| *s == "canceled") {
        return PipelineState::Cancelled;
    }
    if statuses.iter().all(|s| *s == "success") {
        return PipelineState::Succeeded;
    }
    PipelineState::Running
}

fn internal_state(body: &Value) -> PipelineState {
    match body["status"].as_str().unwrap_or_default() {
        "success" | "succeeded" | "completed" => PipelineState::Succeeded,
        "failed" => PipelineState::Failed(
            str_field(body, "error").unwrap_or_else(|| "deployment failed".to_string()),
        ),
        "cancelled" | "canceled" => PipelineState::Cancelled,
        "running" | "in_progress" => PipelineState::Running,
        _ => PipelineState::Queued,
    }
}
