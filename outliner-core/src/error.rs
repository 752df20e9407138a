use std::time::Duration;

use thiserror::Error;

use crate::entities::DocumentId;

/// A worker could not load its models and never served a task.
#[derive(Debug, Clone, Error)]
#[error("worker {worker} failed to load models: {message}")]
pub struct WorkerInitError {
    pub worker: usize,
    pub message: String,
}

impl WorkerInitError {
    pub fn new(worker: usize, err: &anyhow::Error) -> Self {
        Self {
            worker,
            message: format!("{err:#}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no worker could be started ({} failed)", .failures.len())]
    NoHealthyWorker { failures: Vec<WorkerInitError> },
    #[error("worker pool size must be at least 1")]
    EmptyPool,
    #[error("worker pool is shut down")]
    Closed,
}

/// Aggregation stopped before every document was finalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("no pipeline event within {0:?}")]
    Timeout(Duration),
    #[error("all workers exited with documents pending")]
    WorkersExited,
    #[error("worker pool closed before the run started")]
    PoolClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("document could not be opened: {0}")]
    Unreadable(String),
    #[error("abandoned after receiving {received} of {expected} pages")]
    Abandoned { received: usize, expected: usize },
    #[error("abandoned after receiving {received} pages before the page count was known")]
    Unannounced { received: usize },
    #[error("not processed before the run stopped")]
    NotProcessed,
    #[error("received {received} page results for a {expected} page document")]
    PageCountMismatch { received: usize, expected: usize },
}

/// A document that produced no output record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{doc_id}: {reason}")]
pub struct DocumentFailure {
    pub doc_id: DocumentId,
    pub reason: FailureReason,
}
