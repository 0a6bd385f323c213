//! Contains common, primitive types shared across the runtime.
//!
//! Using distinct types for identifiers and outcomes improves type safety and
//! code clarity.

use crate::error::JobError;
use slotmap::new_key_type;

new_key_type! {
    /// Uniquely and safely identifies a task template inside a `TaskRegistry`.
    ///
    /// This key is returned when a task is registered. It is guaranteed to be
    /// unique for the lifetime of the registry.
    pub struct TaskId;
}

/// The outcome of running a single job.
///
/// `Ok(None)` means the handler finished without producing a value,
/// `Ok(Some(_))` carries its serialized success value and `Err(_)` is the
/// error slot.
pub type JobOutcome = Result<Option<serde_json::Value>, JobError>;

/// Identifies how a batch of jobs is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// The caller blocks until every job has produced its outcome.
    Execute,
    /// The caller receives one channel per job and returns immediately.
    Dispatch,
}
