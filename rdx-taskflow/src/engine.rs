//! The core engine that runs batches of jobs.

use crate::common::{ExecutionMode, JobOutcome};
use crate::error::JobError;
use crate::events::EngineEvent;
use crate::job::{panic_message, Job};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinError;
use tracing::{debug, error, trace};

/// A delegate that takes over batch execution, typically by forwarding the
/// jobs to a remote worker.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Processes a batch of jobs.
    ///
    /// When `synchronous` is `true` the returned outcomes must be in the same
    /// order as `jobs`. For dispatched batches, outcome `i` (if present) is
    /// posted to the channel of job `i`.
    async fn process(&self, jobs: Vec<Arc<dyn Job>>, synchronous: bool) -> Vec<JobOutcome>;
}

/// The Taskflow engine.
///
/// Runs batches of jobs concurrently in-process, one blocking unit per job,
/// or hands them to an installed [`Processor`]. There is no built-in
/// cancellation: a job runs until its handler returns or panics.
///
/// The engine is cheap to clone; clones share the installed processor and
/// the event stream.
#[derive(Clone)]
pub struct Engine {
    processor: Option<Arc<dyn Processor>>,
    event_sender: broadcast::Sender<EngineEvent>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

// Core implementation block for internal logic.
impl Engine {
    /// Creates an engine that executes every batch locally.
    pub fn new() -> Self {
        const CHANNEL_CAPACITY: usize = 256;
        let (event_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            processor: None,
            event_sender,
        }
    }

    /// Returns the processor that should handle a batch of `size` jobs, if any.
    #[doc(hidden)]
    fn delegate_for(&self, size: usize) -> Option<Arc<dyn Processor>> {
        self.processor.clone().filter(|_| size > 0)
    }

    #[doc(hidden)]
    async fn execute_locally(&self, jobs: Vec<Arc<dyn Job>>) -> Vec<JobOutcome> {
        self.event_sender
            .send(EngineEvent::BatchStarted {
                size: jobs.len(),
                mode: ExecutionMode::Execute,
            })
            .ok();

        let handles: Vec<_> = jobs
            .iter()
            .cloned()
            .map(|job| tokio::task::spawn_blocking(move || job.handle()))
            .collect();

        // Awaiting the handles in submission order fills the result buffer
        // positionally, whatever order the jobs finish in.
        let mut outcomes = Vec::with_capacity(jobs.len());
        for (index, (job, handle)) in jobs.iter().zip(handles).enumerate() {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => Err(self.unit_failure(index, job.name(), join_error)),
            };
            trace!(index, job = job.name(), ok = outcome.is_ok(), "Job finished.");
            self.event_sender
                .send(EngineEvent::JobCompleted {
                    index,
                    name: job.name().to_string(),
                    succeeded: outcome.is_ok(),
                })
                .ok();
            outcomes.push(outcome);
        }
        outcomes
    }

    #[doc(hidden)]
    fn unit_failure(&self, index: usize, name: &str, join_error: JoinError) -> JobError {
        if join_error.is_panic() {
            let message = panic_message(join_error.into_panic().as_ref());
            error!(index, job = name, %message, "Job panicked.");
            self.event_sender
                .send(EngineEvent::JobPanicked {
                    index,
                    name: name.to_string(),
                    message: message.clone(),
                })
                .ok();
            JobError::Panicked {
                job: name.to_string(),
                message,
            }
        } else {
            JobError::Aborted {
                job: name.to_string(),
            }
        }
    }

    #[doc(hidden)]
    fn route_dispatch(&self, jobs: Vec<Arc<dyn Job>>, senders: Vec<oneshot::Sender<JobOutcome>>) {
        if let Some(processor) = self.delegate_for(jobs.len()) {
            debug!(size = jobs.len(), "Delegating dispatched batch to processor.");
            self.event_sender
                .send(EngineEvent::BatchDelegated {
                    size: jobs.len(),
                    mode: ExecutionMode::Dispatch,
                })
                .ok();
            tokio::spawn(async move {
                let outcomes = processor.process(jobs, false).await;
                for (sender, outcome) in senders.into_iter().zip(outcomes) {
                    sender.send(outcome).ok();
                }
            });
            return;
        }

        self.event_sender
            .send(EngineEvent::BatchStarted {
                size: jobs.len(),
                mode: ExecutionMode::Dispatch,
            })
            .ok();
        for (job, sender) in jobs.into_iter().zip(senders) {
            tokio::task::spawn_blocking(move || job.async_handle(sender));
        }
    }
}

// Public API implementation block.
impl Engine {
    /// Installs the delegate that takes over non-empty batches.
    pub fn set_processor(&mut self, processor: Arc<dyn Processor>) {
        self.processor = Some(processor);
        self.event_sender.send(EngineEvent::ProcessorInstalled).ok();
    }

    pub fn has_processor(&self) -> bool {
        self.processor.is_some()
    }

    /// Runs a batch of jobs and waits for all of them.
    ///
    /// Outcome `i` always belongs to job `i`. Without a processor, every job
    /// runs concurrently and a panicking handler only fails its own slot. With
    /// a processor, a non-empty batch is handed over and its outcomes are
    /// returned unchanged.
    pub async fn execute(&self, jobs: Vec<Arc<dyn Job>>) -> Vec<JobOutcome> {
        match self.delegate_for(jobs.len()) {
            Some(processor) => {
                debug!(size = jobs.len(), "Delegating batch to processor.");
                self.event_sender
                    .send(EngineEvent::BatchDelegated {
                        size: jobs.len(),
                        mode: ExecutionMode::Execute,
                    })
                    .ok();
                processor.process(jobs, true).await
            }
            None => {
                debug!(size = jobs.len(), "Executing batch locally.");
                self.execute_locally(jobs).await
            }
        }
    }

    /// Starts a batch of jobs without waiting for them.
    ///
    /// Returns one channel per job, in submission order, each receiving
    /// exactly one outcome. When a processor is installed it owns how the
    /// channels are populated. Must be called from within a Tokio runtime.
    pub fn dispatch(&self, jobs: Vec<Arc<dyn Job>>) -> Vec<oneshot::Receiver<JobOutcome>> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            jobs.iter().map(|_| oneshot::channel()).unzip();
        self.route_dispatch(jobs, senders);
        receivers
    }

    /// Runs a single job and waits for its outcome.
    pub async fn execute_one(&self, job: Arc<dyn Job>) -> JobOutcome {
        self.execute(vec![job])
            .await
            .into_iter()
            .next()
            .unwrap_or(Err(JobError::MissingOutcome { index: 0 }))
    }

    /// Starts a single job without waiting for it.
    pub fn dispatch_one(&self, job: Arc<dyn Job>) -> oneshot::Receiver<JobOutcome> {
        let (sender, receiver) = oneshot::channel();
        self.route_dispatch(vec![job], vec![sender]);
        receiver
    }

    /// Subscribes to the `EngineEvent` stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(&'static str);

    impl Job for Echo {
        fn name(&self) -> &str {
            self.0
        }

        fn handle(&self) -> JobOutcome {
            Ok(Some(serde_json::json!(self.0)))
        }
    }

    #[tokio::test]
    async fn empty_batch_executes_to_nothing() {
        let engine = Engine::new();
        assert!(engine.execute(Vec::new()).await.is_empty());
        assert!(engine.dispatch(Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn execute_one_returns_the_single_outcome() {
        let engine = Engine::new();
        let outcome = engine.execute_one(Arc::new(Echo("solo"))).await.unwrap();
        assert_eq!(outcome, Some(serde_json::json!("solo")));
    }

    #[tokio::test]
    async fn events_describe_a_local_batch() {
        let engine = Engine::new();
        let mut events = engine.subscribe_events();
        let jobs: Vec<Arc<dyn Job>> = vec![Arc::new(Echo("a")), Arc::new(Echo("b"))];
        engine.execute(jobs).await;

        assert!(matches!(
            events.recv().await.unwrap(),
            EngineEvent::BatchStarted {
                size: 2,
                mode: ExecutionMode::Execute
            }
        ));
        for expected in ["a", "b"] {
            match events.recv().await.unwrap() {
                EngineEvent::JobCompleted {
                    name, succeeded, ..
                } => {
                    assert_eq!(name, expected);
                    assert!(succeeded);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }
}
