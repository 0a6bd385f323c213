//! The runtime context shared by tasks, waits and workflows.
//!
//! A [`Runtime`] owns the task registry, the engine and the loaded
//! configuration. Registration and processor installation need `&mut self`,
//! so they have to happen before the runtime is shared; once wrapped in an
//! `Arc`, it can only execute.

use crate::client::WorkerClient;
use crate::common::JobOutcome;
use crate::components::task::{Task, TaskBuilder};
use crate::components::wait::Wait;
use crate::config::RuntimeConfig;
use crate::engine::{Engine, Processor};
use crate::error::{ClientError, TaskError};
use crate::events::EngineEvent;
use crate::job::Job;
use crate::registry::TaskRegistry;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tracing::info;

#[derive(Default)]
pub struct Runtime {
    config: RuntimeConfig,
    registry: TaskRegistry,
    engine: Engine,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            registry: TaskRegistry::new(),
            engine: Engine::new(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TaskRegistry {
        &mut self.registry
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Builds and registers a task.
    pub fn register(&mut self, builder: TaskBuilder) -> Result<Task, TaskError> {
        builder.build(&mut self.registry)
    }

    /// Looks up a registered task and gives it the JSON-encoded `data`.
    pub fn task(&self, name: &str, data: &str) -> Result<Task, TaskError> {
        self.registry.materialize(name, data)
    }

    /// Routes every later batch through `processor`.
    pub fn set_processor(&mut self, processor: Arc<dyn Processor>) {
        info!("Installing job processor.");
        self.engine.set_processor(processor);
    }

    pub fn has_processor(&self) -> bool {
        self.engine.has_processor()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.engine.subscribe_events()
    }

    /// A new `Wait`, evaluated in the configured timezone when there is one.
    pub fn wait(&self) -> Wait {
        match self.config.timezone {
            Some(tz) => Wait::new().with_timezone(tz),
            None => Wait::new(),
        }
    }

    /// A worker client for the configured endpoint. Fails without credentials.
    pub fn client(&self) -> Result<WorkerClient, ClientError> {
        WorkerClient::connect(self.config.client.clone())
    }

    /// Runs a heterogeneous batch and waits for every outcome, in order.
    pub async fn execute(&self, jobs: Vec<Arc<dyn Job>>) -> Vec<JobOutcome> {
        self.engine.execute(jobs).await
    }

    /// Starts a heterogeneous batch; one channel per job, in order.
    pub fn dispatch(&self, jobs: Vec<Arc<dyn Job>>) -> Vec<oneshot::Receiver<JobOutcome>> {
        self.engine.dispatch(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::wait::WaitTarget;
    use crate::error::BoxError;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn registered_tasks_execute_through_the_engine() {
        let mut runtime = Runtime::default();
        let task = runtime
            .register(Task::builder("square").handler_with(|n: i64| Ok::<_, BoxError>(n * n)))
            .unwrap();
        assert!(task.data().is_none());

        let task = runtime.task("square", "9").unwrap();
        assert_eq!(
            task.execute(&runtime).await.unwrap(),
            Some(serde_json::json!(81))
        );
    }

    #[test]
    fn wait_inherits_configured_timezone() {
        let runtime = Runtime::new(RuntimeConfig {
            timezone: Some(chrono_tz::Asia::Tokyo),
            ..RuntimeConfig::default()
        });
        // 2024-05-15 00:00 UTC is 09:00 in Tokyo, so 10:00 is an hour later.
        let now = Utc.with_ymd_and_hms(2024, 5, 15, 0, 0, 0).unwrap();
        let wait = runtime.wait().with_clock(move || now).at("10:00");
        assert_eq!(
            wait.timestamp_or_duration().unwrap(),
            WaitTarget::Timestamp(now.timestamp() + 3600)
        );
    }

    #[test]
    fn client_needs_credentials() {
        assert!(matches!(
            Runtime::default().client(),
            Err(ClientError::MissingCredentials)
        ));
    }

    #[tokio::test]
    async fn mixed_batches_keep_their_order() {
        let mut runtime = Runtime::default();
        let hello = runtime
            .register(Task::builder("hello").handler(|| Ok::<_, BoxError>("hi")))
            .unwrap();
        let wait = runtime.wait().seconds(5);

        let jobs: Vec<Arc<dyn Job>> = vec![Arc::new(wait), Arc::new(hello)];
        let outcomes = runtime.execute(jobs).await;
        assert_eq!(outcomes.len(), 2);
        let first = outcomes[0].as_ref().unwrap().as_ref().unwrap();
        assert_eq!(first["duration"], serde_json::json!(5.0));
        assert_eq!(
            outcomes[1].as_ref().unwrap(),
            &Some(serde_json::json!("hi"))
        );
    }
}
