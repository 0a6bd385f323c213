//! Error types for the Taskflow runtime.
//!
//! Each concern gets its own enum so callers can match on exactly the failures
//! an operation can produce. [`Error`] aggregates them for code that only
//! needs to propagate.

/// A boxed error that can be sent across threads.
///
/// Task handlers report failures through any error type that converts into
/// this, which includes `anyhow::Error`, `String` and every
/// `std::error::Error + Send + Sync` type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for the runtime.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Wait error: {0}")]
    Wait(#[from] WaitError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while declaring, registering or rehydrating a task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("A task must have a non-empty name")]
    EmptyName,

    #[error("Task {name} has no handler")]
    MissingHandler { name: String },

    #[error("Task {name} was given data but its handler takes no input")]
    UnexpectedData { name: String },

    #[error("Task {name} expects data of type {expected}, found {found}")]
    DataTypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Task {name} can not be defined twice")]
    Duplicate { name: String },

    #[error("Task {name} is not registered")]
    Unknown { name: String },

    #[error("Failed to encode data for task {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode data for task {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that fill the error slot of a job's outcome.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {job} failed: {source}")]
    Failed {
        job: String,
        #[source]
        source: BoxError,
    },

    #[error("Job {job} panicked: {message}")]
    Panicked { job: String, message: String },

    #[error("Job {job} was aborted before completing")]
    Aborted { job: String },

    #[error("Job {job} could not decode its input: {source}")]
    Input {
        job: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Job {job} produced a value that could not be serialized: {source}")]
    Output {
        job: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No outcome was produced for job #{index}")]
    MissingOutcome { index: usize },

    #[error(transparent)]
    Wait(#[from] WaitError),
}

/// Errors raised while reducing the directives of a `Wait`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("Incompatible definition in Wait methods")]
    IncompatibleDefinition,

    #[error("Unknown mode: {0}")]
    UnknownMode(String),

    #[error("Time formatted incorrectly: {0:?}")]
    InvalidTimeOfDay(String),

    #[error("Invalid day of month: {0}")]
    InvalidDayOfMonth(u32),

    #[error("Week occurrence must be at least 1")]
    InvalidOccurrence,

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Computed instant is out of range")]
    OutOfRange,
}

/// Errors raised by the worker client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Please initialize the client with app_id, api_token and app_env")]
    MissingCredentials,

    #[error("Provided id must not exceed {max} bytes, got {len}")]
    IdTooLong { len: usize, max: usize },

    #[error("Failed to encode request payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Worker responded with status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Errors raised while loading the runtime configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}
