//! The contract every unit of work implements.

use crate::common::JobOutcome;
use crate::error::JobError;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tokio::sync::oneshot;

/// A unit of work that the engine can run locally or hand to a processor.
///
/// Implemented by `Task` and `Wait`. The engine never looks past this trait, so
/// heterogeneous batches are expressed as `Vec<Arc<dyn Job>>`.
pub trait Job: Send + Sync + 'static {
    /// The name this job is registered or known under.
    fn name(&self) -> &str;

    /// Runs the job to completion on the calling thread.
    fn handle(&self) -> JobOutcome;

    /// Runs the job and posts its outcome through `outcome`.
    ///
    /// Posts exactly once. A panic inside `handle` is reported as
    /// [`JobError::Panicked`] rather than dropping the sender.
    fn async_handle(&self, outcome: oneshot::Sender<JobOutcome>) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.handle())).unwrap_or_else(
            |payload| {
                Err(JobError::Panicked {
                    job: self.name().to_string(),
                    message: panic_message(payload.as_ref()),
                })
            },
        );
        outcome.send(result).ok();
    }

    /// The serializable description of this job handed to a processor.
    fn payload(&self) -> Result<Option<serde_json::Value>, JobError> {
        Ok(None)
    }

    /// The caller-supplied identity of this job, if any.
    fn custom_id(&self) -> Option<String> {
        None
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Exploding;

    impl Job for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn handle(&self) -> JobOutcome {
            panic!("boom");
        }
    }

    struct Constant;

    impl Job for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        fn handle(&self) -> JobOutcome {
            Ok(Some(serde_json::json!(42)))
        }
    }

    #[test]
    fn async_handle_posts_value() {
        let (tx, mut rx) = oneshot::channel();
        Constant.async_handle(tx);
        let outcome = rx.try_recv().expect("outcome posted");
        assert_eq!(outcome.unwrap(), Some(serde_json::json!(42)));
    }

    #[test]
    fn async_handle_converts_panic_into_error() {
        let (tx, mut rx) = oneshot::channel();
        Exploding.async_handle(tx);
        match rx.try_recv().expect("outcome posted") {
            Err(JobError::Panicked { job, message }) => {
                assert_eq!(job, "exploding");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn panic_message_handles_owned_strings() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
    }
}
