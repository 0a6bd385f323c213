//! Defines the events broadcast by the Taskflow engine.
//!
//! Subscribers receive these through `Engine::subscribe_events`. Nothing in
//! the runtime depends on them being observed; sends to a stream without
//! subscribers are dropped.

use crate::common::ExecutionMode;

/// Events describing how the engine is running batches.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Fired when a batch starts running locally.
    BatchStarted { size: usize, mode: ExecutionMode },
    /// Fired, in submission order, as each job of a locally executed batch is collected.
    JobCompleted {
        index: usize,
        name: String,
        succeeded: bool,
    },
    /// Fired when a job's handler panicked during local execution.
    JobPanicked {
        index: usize,
        name: String,
        message: String,
    },
    /// Fired when a batch is handed to the installed processor.
    BatchDelegated { size: usize, mode: ExecutionMode },
    /// Fired when a processor is installed.
    ProcessorInstalled,
}
