//! Workflows: named async handlers that orchestrate tasks and waits.
//!
//! A workflow runs locally through [`Workflow::run`], or is started and
//! steered on a worker through a [`WorkerClient`].

use crate::client::WorkerClient;
use crate::components::task::IdentityFn;
use crate::error::ClientError;
use crate::runtime::Runtime;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

type RunFn =
    Arc<dyn Fn(Arc<Runtime>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type EventFn = Arc<
    dyn Fn(Arc<Runtime>, String, Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync,
>;

/// A named workflow.
#[derive(Clone)]
pub struct Workflow {
    name: Arc<str>,
    handler: RunFn,
    on_event: Option<EventFn>,
    identity: Option<IdentityFn>,
    data: Value,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("handles_events", &self.on_event.is_some())
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

impl Workflow {
    /// Starts declaring a workflow whose body is `handler`.
    pub fn builder<F, Fut>(name: impl Into<String>, handler: F) -> WorkflowBuilder
    where
        F: Fn(Arc<Runtime>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        WorkflowBuilder {
            name: name.into(),
            handler: Arc::new(move |runtime| handler(runtime).boxed()),
            on_event: None,
            identity: None,
            data: Value::Null,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// The identifier produced by the workflow's identity function, if it has one.
    pub fn custom_id(&self) -> Option<String> {
        self.identity.as_ref().map(|identity| identity())
    }

    /// Runs the workflow body to completion in this process.
    pub async fn run(&self, runtime: Arc<Runtime>) -> anyhow::Result<()> {
        info!(workflow = %self.name, "Running workflow.");
        (self.handler)(runtime).await
    }

    /// Delivers an event to the workflow's event callback. Events are ignored
    /// when no callback is set.
    pub async fn handle_event(
        &self,
        runtime: Arc<Runtime>,
        event_name: &str,
        event_input: Value,
    ) -> anyhow::Result<()> {
        match &self.on_event {
            Some(on_event) => {
                debug!(workflow = %self.name, event = event_name, "Handling event.");
                on_event(runtime, event_name.to_string(), event_input).await
            }
            None => {
                debug!(workflow = %self.name, event = event_name, "No event callback; ignoring.");
                Ok(())
            }
        }
    }

    /// Asks the worker to start an instance of this workflow.
    pub async fn start(&self, client: &WorkerClient) -> Result<Value, ClientError> {
        let custom_id = self.custom_id();
        client
            .start_workflow(&self.name, custom_id.as_deref(), &self.data)
            .await
    }

    pub async fn send_event(
        &self,
        client: &WorkerClient,
        custom_id: &str,
        event_name: &str,
        event_input: &Value,
    ) -> Result<Value, ClientError> {
        client
            .send_event(&self.name, custom_id, event_name, event_input)
            .await
    }

    pub async fn kill(&self, client: &WorkerClient, custom_id: &str) -> Result<Value, ClientError> {
        client.kill_workflow(&self.name, custom_id).await
    }

    pub async fn pause(
        &self,
        client: &WorkerClient,
        custom_id: &str,
    ) -> Result<Value, ClientError> {
        client.pause_workflow(&self.name, custom_id).await
    }

    pub async fn resume(
        &self,
        client: &WorkerClient,
        custom_id: &str,
    ) -> Result<Value, ClientError> {
        client.resume_workflow(&self.name, custom_id).await
    }
}

/// Declares a [`Workflow`]. Obtained from [`Workflow::builder`].
pub struct WorkflowBuilder {
    name: String,
    handler: RunFn,
    on_event: Option<EventFn>,
    identity: Option<IdentityFn>,
    data: Value,
}

impl WorkflowBuilder {
    /// Sets the callback invoked for each event sent to the workflow.
    pub fn on_event<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<Runtime>, String, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_event = Some(Arc::new(move |runtime, name, input| {
            callback(runtime, name, input).boxed()
        }));
        self
    }

    /// Sets the function producing the instance identifier sent to the worker.
    pub fn id<F>(mut self, identity: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.identity = Some(Arc::new(identity));
        self
    }

    /// Sets the data the workflow is started with.
    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn build(self) -> Workflow {
        Workflow {
            name: Arc::from(self.name),
            handler: self.handler,
            on_event: self.on_event,
            identity: self.identity,
            data: self.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::task::Task;
    use crate::error::BoxError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_runtime(counter: Arc<AtomicUsize>) -> Arc<Runtime> {
        let mut runtime = Runtime::default();
        runtime
            .register(Task::builder("count").handler(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            }))
            .unwrap();
        Arc::new(runtime)
    }

    #[tokio::test]
    async fn run_executes_the_body_with_the_runtime() {
        let counter = Arc::new(AtomicUsize::new(0));
        let runtime = counting_runtime(counter.clone());

        let workflow = Workflow::builder("Sequential", |runtime: Arc<Runtime>| async move {
            let task = runtime.task("count", "")?;
            task.execute(&runtime).await?;
            task.execute(&runtime).await?;
            anyhow::Ok(())
        })
        .build();

        workflow.run(runtime).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn events_reach_the_callback_only_when_set() {
        let counter = Arc::new(AtomicUsize::new(0));
        let runtime = counting_runtime(counter.clone());

        let silent = Workflow::builder("Silent", |_| async { anyhow::Ok(()) }).build();
        silent
            .handle_event(runtime.clone(), "MyEvent", Value::Null)
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let listening = Workflow::builder("Listening", |_| async { anyhow::Ok(()) })
            .on_event(|runtime: Arc<Runtime>, name: String, _input: Value| async move {
                if name == "MyEvent" {
                    runtime.task("count", "")?.execute(&runtime).await?;
                }
                anyhow::Ok(())
            })
            .build();
        listening
            .handle_event(runtime.clone(), "Other", Value::Null)
            .await
            .unwrap();
        listening
            .handle_event(runtime, "MyEvent", Value::Null)
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn identity_and_data_are_kept() {
        let workflow = Workflow::builder("Identified", |_| async { anyhow::Ok(()) })
            .id(|| "MyId".to_string())
            .data(serde_json::json!({"email": "a@b.c"}))
            .build();
        assert_eq!(workflow.custom_id().as_deref(), Some("MyId"));
        assert_eq!(workflow.data()["email"], "a@b.c");
    }
}
