//! # Taskflow
//!
//! A client-side runtime for declaring and running tasks, waits and
//! workflows, either in-process or through a worker agent.
//!
//! ## Core Concepts
//!
//! - **Job**: The contract every unit of work implements. A job can run
//!   synchronously (`handle`) or post its outcome to a channel (`async_handle`).
//! - **Task**: A named job wrapping a user handler and its input data. Tasks are
//!   validated when built and registered by name in a `TaskRegistry`, which can
//!   rehydrate them later from a name and a JSON payload.
//! - **Wait**: A job that reduces time directives ("next Monday at 8:30",
//!   "in 3 days") to an absolute timestamp or a relative duration.
//! - **Engine**: Runs batches of jobs concurrently, keeping outcomes in input
//!   order, or hands them to an installed `Processor`.
//! - **Runtime**: The context owning the registry, the engine and the
//!   configuration. Configure it mutably, then share it behind an `Arc`.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use taskflow::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Create a runtime from the default configuration.
//!     let mut runtime = Runtime::new(RuntimeConfig::default());
//!
//!     // 2. Register tasks before sharing the runtime.
//!     let double = runtime.register(
//!         Task::builder("Double")
//!             .handler_with(|n: i64| Ok::<_, BoxError>(n * 2))
//!             .data(21i64),
//!     )?;
//!     let runtime = Arc::new(runtime);
//!
//!     // 3. Subscribe to engine events.
//!     let mut events = runtime.subscribe_events();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Received Engine Event: {:?}", event);
//!         }
//!     });
//!
//!     // 4. Execute the task and a wait.
//!     println!("{:?}", double.execute(&runtime).await?);
//!     println!("{:?}", runtime.wait().minutes(5).timestamp_or_duration()?);
//!
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Taskflow Engine";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod client;
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod job;
pub mod registry;
pub mod runtime;
pub mod workflow;

/// A prelude module for easy importing of the most common Taskflow types.
pub mod prelude {
    pub use crate::client::{WorkerClient, WorkflowMode};
    pub use crate::common::{ExecutionMode, JobOutcome, TaskId};
    pub use crate::components::task::{Task, TaskBuilder, TaskOutput, Tasks};
    pub use crate::components::wait::{Wait, WaitMode, WaitTarget};
    pub use crate::config::{ClientConfig, RuntimeConfig};
    pub use crate::engine::{Engine, Processor};
    pub use crate::error::{BoxError, ClientError, JobError, TaskError, WaitError};
    pub use crate::events::EngineEvent;
    pub use crate::job::Job;
    pub use crate::registry::TaskRegistry;
    pub use crate::runtime::Runtime;
    pub use crate::workflow::{Workflow, WorkflowBuilder};
}
