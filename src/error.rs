use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by [`BoundedQueue`](crate::queue::BoundedQueue) operations.
///
/// `Full` hands the rejected item back so a non-blocking producer never loses it.
#[derive(Error, PartialEq, Eq)]
pub enum QueueError<T> {
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,

    #[error("queue is full")]
    Full(T),

    #[error("mark_done() called more times than items were retrieved")]
    MarkDoneUnderflow,
}

// Manual impl so `T` does not need to be `Debug`.
impl<T> fmt::Debug for QueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::ZeroCapacity => f.write_str("ZeroCapacity"),
            QueueError::Full(_) => f.write_str("Full(..)"),
            QueueError::MarkDoneUnderflow => f.write_str("MarkDoneUnderflow"),
        }
    }
}

impl<T> QueueError<T> {
    /// Recover the item carried by a `Full` error.
    pub fn into_inner(self) -> Option<T> {
        match self {
            QueueError::Full(item) => Some(item),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("a pipeline needs at least one stage")]
    NoStages,

    #[error("stage '{stage}' must run at least one worker")]
    NoWorkers { stage: String },

    #[error("queue capacity must be at least 1")]
    ZeroCapacity,

    #[error("failed to spawn worker {worker} of stage '{stage}': {reason}")]
    Spawn {
        stage: String,
        worker: usize,
        reason: String,
    },

    #[error("pipeline is not running (state: {state})")]
    NotRunning { state: String },

    #[error("pipeline has already terminated")]
    AlreadyTerminated,

    #[error("worker {worker} of stage '{stage}' panicked")]
    WorkerPanicked { stage: String, worker: usize },

    #[error("stage '{stage}' did not drain in time")]
    DrainTimedOut { stage: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config must declare at least one [[stages]] entry")]
    NoStages,

    #[error("stage name at position {index} is blank")]
    BlankName { index: usize },

    #[error("stage '{0}' is declared more than once")]
    DuplicateStage(String),

    #[error("stage '{stage}' must run at least one worker")]
    ZeroWorkers { stage: String },

    #[error("capacity must be at least 1")]
    ZeroCapacity,
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
