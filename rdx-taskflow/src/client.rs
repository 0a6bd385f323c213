//! The HTTP client that talks to the local worker agent.
//!
//! Every request targets `{worker_url}:{worker_port}/api/{api_version}/{resource}`
//! and carries the `app_env` and `app_id` query parameters when they are
//! configured.

use crate::config::ClientConfig;
use crate::error::ClientError;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// The maximum length, in bytes, of a custom workflow identifier.
pub const MAX_ID_SIZE: usize = 256;

/// Reported to the worker as the language the workflows are written in.
pub const PROGRAMMING_LANGUAGE: &str = "Rust";

const INSTANCES: &str = "instances";
const EVENTS: &str = "events";

/// The state a running workflow instance can be moved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowMode {
    Kill,
    Pause,
    Run,
}

impl WorkflowMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowMode::Kill => "kill",
            WorkflowMode::Pause => "pause",
            WorkflowMode::Run => "run",
        }
    }
}

/// A client for the worker agent's HTTP API.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    http: reqwest::Client,
    config: ClientConfig,
}

// Core implementation block for internal logic.
impl WorkerClient {
    #[doc(hidden)]
    fn url(&self, resource: &str) -> String {
        format!(
            "{}:{}/api/{}/{}",
            self.config.worker_url.trim_end_matches('/'),
            self.config.worker_port,
            self.config.api_version,
            resource
        )
    }

    /// The `app_env` and `app_id` query parameters, followed by `extra`.
    #[doc(hidden)]
    fn query<'a>(&'a self, extra: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
        let mut query = Vec::with_capacity(2 + extra.len());
        if let Some(app_env) = self.config.app_env.as_deref().filter(|v| !v.is_empty()) {
            query.push(("app_env", app_env));
        }
        if let Some(app_id) = self.config.app_id.as_deref().filter(|v| !v.is_empty()) {
            query.push(("app_id", app_id));
        }
        query.extend_from_slice(extra);
        query
    }

    #[doc(hidden)]
    async fn finish(&self, response: reqwest::Response) -> Result<Value, ClientError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "Worker rejected the request.");
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }

    #[doc(hidden)]
    async fn update_instance(
        &self,
        workflow: &str,
        custom_id: &str,
        mode: WorkflowMode,
    ) -> Result<Value, ClientError> {
        check_id(custom_id)?;
        let url = self.url(INSTANCES);
        debug!(%url, workflow, custom_id, mode = mode.as_str(), "Updating workflow instance.");
        let body = json!({
            "programming_language": PROGRAMMING_LANGUAGE,
            "mode": mode.as_str(),
        });
        let response = self
            .http
            .put(url)
            .query(&self.query(&[("custom_id", custom_id), ("name", workflow)]))
            .json(&body)
            .send()
            .await?;
        self.finish(response).await
    }
}

// Public API implementation block.
impl WorkerClient {
    /// Creates a client for application code, which must be fully configured.
    pub fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        if !config.has_credentials() {
            return Err(ClientError::MissingCredentials);
        }
        Ok(Self::for_worker(config))
    }

    /// Creates a client without checking credentials, as used from inside a
    /// worker process.
    pub fn for_worker(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Asks the worker to start a workflow instance.
    pub async fn start_workflow(
        &self,
        workflow: &str,
        custom_id: Option<&str>,
        data: &Value,
    ) -> Result<Value, ClientError> {
        if let Some(custom_id) = custom_id {
            check_id(custom_id)?;
        }
        let body = json!({
            "programming_language": PROGRAMMING_LANGUAGE,
            "name": workflow,
            "data": serde_json::to_string(data)?,
            "custom_id": custom_id,
        });
        let url = self.url(INSTANCES);
        debug!(%url, workflow, "Starting workflow.");
        let response = self
            .http
            .post(url)
            .query(&self.query(&[]))
            .json(&body)
            .send()
            .await?;
        self.finish(response).await
    }

    /// Sends an event to a running workflow instance.
    pub async fn send_event(
        &self,
        workflow: &str,
        custom_id: &str,
        event_name: &str,
        event_input: &Value,
    ) -> Result<Value, ClientError> {
        check_id(custom_id)?;
        let body = json!({
            "programming_language": PROGRAMMING_LANGUAGE,
            "name": workflow,
            "custom_id": custom_id,
            "event_name": event_name,
            "event_input": serde_json::to_string(event_input)?,
        });
        let url = self.url(EVENTS);
        debug!(%url, workflow, event = event_name, "Sending event.");
        let response = self
            .http
            .post(url)
            .query(&self.query(&[]))
            .json(&body)
            .send()
            .await?;
        self.finish(response).await
    }

    pub async fn kill_workflow(
        &self,
        workflow: &str,
        custom_id: &str,
    ) -> Result<Value, ClientError> {
        self.update_instance(workflow, custom_id, WorkflowMode::Kill)
            .await
    }

    pub async fn pause_workflow(
        &self,
        workflow: &str,
        custom_id: &str,
    ) -> Result<Value, ClientError> {
        self.update_instance(workflow, custom_id, WorkflowMode::Pause)
            .await
    }

    pub async fn resume_workflow(
        &self,
        workflow: &str,
        custom_id: &str,
    ) -> Result<Value, ClientError> {
        self.update_instance(workflow, custom_id, WorkflowMode::Run)
            .await
    }
}

fn check_id(custom_id: &str) -> Result<(), ClientError> {
    if custom_id.len() > MAX_ID_SIZE {
        return Err(ClientError::IdTooLong {
            len: custom_id.len(),
            max: MAX_ID_SIZE,
        });
    }
    Ok(())
}
