//! Defines named tasks: validated jobs wrapping a user handler and its input.
//!
//! A handler takes zero or one input and returns one of the shapes accepted by
//! [`TaskOutput`]. Most handler rules are enforced by the type system; the
//! remaining checks run when the task is built, because the data attached to a
//! task (or rehydrated later from an encoded payload) has its type erased.

use crate::common::JobOutcome;
use crate::error::{BoxError, JobError, TaskError};
use crate::job::Job;
use crate::registry::TaskRegistry;
use crate::runtime::Runtime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// A function producing the caller-chosen identity of a task or workflow.
pub type IdentityFn = Arc<dyn Fn() -> String + Send + Sync>;

type Invoke = dyn Fn(&str, Option<&Value>) -> JobOutcome + Send + Sync;

/// Return shapes a task handler may have.
///
/// - `()`: the handler reports nothing.
/// - `Result<(), E>`: the handler only reports an error.
/// - `Result<R, E>`: the handler reports a serializable value or an error.
pub trait TaskOutput: Send + 'static {
    fn into_outcome(self, job: &str) -> JobOutcome;
}

impl TaskOutput for () {
    fn into_outcome(self, _job: &str) -> JobOutcome {
        Ok(None)
    }
}

impl<R, E> TaskOutput for Result<R, E>
where
    R: Serialize + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn into_outcome(self, job: &str) -> JobOutcome {
        match self {
            Ok(value) => {
                let value = serde_json::to_value(value).map_err(|source| JobError::Output {
                    job: job.to_string(),
                    source,
                })?;
                Ok((!value.is_null()).then_some(value))
            }
            Err(error) => Err(JobError::Failed {
                job: job.to_string(),
                source: error.into(),
            }),
        }
    }
}

/// The declared input of a single-argument handler.
#[derive(Clone, Copy)]
struct InputType {
    id: TypeId,
    name: &'static str,
    check: fn(&Value) -> Result<(), serde_json::Error>,
}

impl InputType {
    fn of<I: DeserializeOwned + 'static>() -> Self {
        Self {
            id: TypeId::of::<I>(),
            name: type_name::<I>(),
            check: check_input::<I>,
        }
    }
}

fn check_input<I: DeserializeOwned>(value: &Value) -> Result<(), serde_json::Error> {
    <I as Deserialize>::deserialize(value).map(|_| ())
}

#[derive(Clone)]
struct Handler {
    input: Option<InputType>,
    invoke: Arc<Invoke>,
}

struct Data {
    id: TypeId,
    name: &'static str,
    value: Result<Value, serde_json::Error>,
}

/// A named, validated job wrapping a user handler and optional input data.
///
/// Cloning a `Task` is cheap: the handler is shared.
#[derive(Clone)]
pub struct Task {
    name: Arc<str>,
    handler: Handler,
    data: Option<Value>,
    identity: Option<IdentityFn>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("input", &self.handler.input.map(|input| input.name))
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

impl Task {
    /// Starts declaring a task with the given name.
    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder {
            name: name.into(),
            handler: None,
            data: None,
            identity: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The input data the handler will be called with, in encoded form.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Returns `true` if the handler takes one input.
    pub fn takes_input(&self) -> bool {
        self.handler.input.is_some()
    }

    /// Produces a copy of this task carrying freshly decoded data.
    ///
    /// A `null` value is treated as "no data". Any other value must decode into
    /// the handler's input type.
    pub(crate) fn with_data(&self, value: Value) -> Result<Task, TaskError> {
        if value.is_null() {
            return Ok(Task {
                data: None,
                ..self.clone()
            });
        }
        let input = self.handler.input.ok_or_else(|| TaskError::UnexpectedData {
            name: self.name.to_string(),
        })?;
        (input.check)(&value).map_err(|source| TaskError::Decode {
            name: self.name.to_string(),
            source,
        })?;
        Ok(Task {
            data: Some(value),
            ..self.clone()
        })
    }

    /// Runs this task through the runtime's engine and waits for its outcome.
    pub async fn execute(&self, runtime: &Runtime) -> JobOutcome {
        runtime.engine().execute_one(Arc::new(self.clone())).await
    }

    /// Starts this task without waiting; the outcome arrives on the returned channel.
    pub fn dispatch(&self, runtime: &Runtime) -> oneshot::Receiver<JobOutcome> {
        runtime.engine().dispatch_one(Arc::new(self.clone()))
    }
}

impl Job for Task {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self) -> JobOutcome {
        (self.handler.invoke)(&self.name, self.data.as_ref())
    }

    fn payload(&self) -> Result<Option<Value>, JobError> {
        Ok(self.data.clone())
    }

    fn custom_id(&self) -> Option<String> {
        self.identity.as_ref().map(|identity| identity())
    }
}

/// Declares a [`Task`]. Obtained from [`Task::builder`].
pub struct TaskBuilder {
    name: String,
    handler: Option<Handler>,
    data: Option<Data>,
    identity: Option<IdentityFn>,
}

impl TaskBuilder {
    /// Sets a handler that takes no input.
    pub fn handler<F, O>(mut self, handler: F) -> Self
    where
        F: Fn() -> O + Send + Sync + 'static,
        O: TaskOutput,
    {
        self.handler = Some(Handler {
            input: None,
            invoke: Arc::new(move |job: &str, _data: Option<&Value>| {
                handler().into_outcome(job)
            }),
        });
        self
    }

    /// Sets a handler that takes a single input of type `I`.
    ///
    /// The input is decoded from the task's data on every invocation. A task
    /// without data passes `null`, which only decodes into types such as
    /// `Option<_>` or `()`.
    ///
    /// Several values travel as one tuple or struct input:
    ///
    /// ```
    /// use taskflow::prelude::*;
    ///
    /// let _sum = Task::builder("sum")
    ///     .handler_with(|(a, b): (i64, i64)| Ok::<_, BoxError>(a + b))
    ///     .data((1i64, 2i64));
    /// ```
    ///
    /// A handler with more than one parameter does not compile:
    ///
    /// ```compile_fail
    /// use taskflow::prelude::*;
    ///
    /// let _sum = Task::builder("sum")
    ///     .handler_with(|a: i64, b: i64| Ok::<_, BoxError>(a + b));
    /// ```
    pub fn handler_with<I, F, O>(mut self, handler: F) -> Self
    where
        I: DeserializeOwned + 'static,
        F: Fn(I) -> O + Send + Sync + 'static,
        O: TaskOutput,
    {
        self.handler = Some(Handler {
            input: Some(InputType::of::<I>()),
            invoke: Arc::new(move |job: &str, data: Option<&Value>| {
                let null = Value::Null;
                let input = <I as Deserialize>::deserialize(data.unwrap_or(&null)).map_err(
                    |source| JobError::Input {
                        job: job.to_string(),
                        source,
                    },
                )?;
                handler(input).into_outcome(job)
            }),
        });
        self
    }

    /// Attaches the data the handler will be called with.
    ///
    /// Its type must be exactly the handler's input type.
    pub fn data<D>(mut self, data: D) -> Self
    where
        D: Serialize + 'static,
    {
        self.data = Some(Data {
            id: TypeId::of::<D>(),
            name: type_name::<D>(),
            value: serde_json::to_value(&data),
        });
        self
    }

    /// Sets the function producing this task's custom identifier.
    pub fn id<F>(mut self, identity: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.identity = Some(Arc::new(identity));
        self
    }

    /// Validates the declaration and registers the task under its name.
    pub fn build(self, registry: &mut TaskRegistry) -> Result<Task, TaskError> {
        let task = self.validate()?;
        registry.register(task.clone())?;
        Ok(task)
    }

    fn validate(self) -> Result<Task, TaskError> {
        if self.name.is_empty() {
            return Err(TaskError::EmptyName);
        }
        let handler = self.handler.ok_or_else(|| TaskError::MissingHandler {
            name: self.name.clone(),
        })?;

        let data = match self.data {
            None => None,
            Some(data) => {
                let input = handler.input.ok_or_else(|| TaskError::UnexpectedData {
                    name: self.name.clone(),
                })?;
                if input.id != data.id {
                    return Err(TaskError::DataTypeMismatch {
                        name: self.name,
                        expected: input.name,
                        found: data.name,
                    });
                }
                let value = data.value.map_err(|source| TaskError::Encode {
                    name: self.name.clone(),
                    source,
                })?;
                Some(value)
            }
        };

        Ok(Task {
            name: Arc::from(self.name),
            handler,
            data,
            identity: self.identity,
        })
    }
}

/// An ordered batch of tasks executed or dispatched together.
#[derive(Debug, Clone, Default)]
pub struct Tasks(Vec<Task>);

impl Tasks {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self(tasks)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Runs every task concurrently; outcomes are in the same order as the tasks.
    pub async fn execute(&self, runtime: &Runtime) -> Vec<JobOutcome> {
        runtime.engine().execute(self.jobs()).await
    }

    /// Starts every task without waiting; one channel per task, in order.
    pub fn dispatch(&self, runtime: &Runtime) -> Vec<oneshot::Receiver<JobOutcome>> {
        runtime.engine().dispatch(self.jobs())
    }

    fn jobs(&self) -> Vec<Arc<dyn Job>> {
        self.0
            .iter()
            .map(|task| Arc::new(task.clone()) as Arc<dyn Job>)
            .collect()
    }
}

impl From<Vec<Task>> for Tasks {
    fn from(tasks: Vec<Task>) -> Self {
        Self(tasks)
    }
}

impl FromIterator<Task> for Tasks {
    fn from_iter<T: IntoIterator<Item = Task>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
