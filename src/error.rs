//! # Error Handling System
//!
//! Error types for the task-queue core, split per concern the way the rest of
//! the crate is: registry errors, graph construction errors, backend transport
//! errors and the caller-facing [`TaskError`].
//!
//! ## Propagation policy
//!
//! A task body's failure never escapes the executor; it is always captured
//! into a [`TaskResult`](crate::task::TaskResult) as an [`ErrorPayload`] plus
//! optional trace text. The payload is the only form in which a failure
//! crosses the backend boundary: `{ kind, message }` with the trace carried
//! alongside as plain text. No attempt is ever made to reconstruct the
//! original error type on the other side; only
//! [`AsyncResult::get`](crate::async_result::AsyncResult::get) turns the
//! locally cached payload back into a [`TaskError`] for the caller.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Classification of a captured task failure.
///
/// Serialized as part of the result wire shape, so consumers and producers
/// running in different processes agree on the failure category without
/// sharing error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
  /// The task name had no bound callable at execution time.
  NotFound,
  /// The task body ran past its configured deadline.
  Timeout,
  /// The task body returned or raised an error.
  Execution,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ErrorKind::NotFound => write!(f, "not found"),
      ErrorKind::Timeout => write!(f, "timeout"),
      ErrorKind::Execution => write!(f, "execution error"),
    }
  }
}

/// Serializable failure payload carried inside a
/// [`TaskResult`](crate::task::TaskResult).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
  /// Failure category.
  pub kind: ErrorKind,
  /// Human-readable failure message.
  pub message: String,
}

impl ErrorPayload {
  /// Payload for a task whose callable was missing at execution time.
  #[must_use]
  pub fn not_found(task_name: &str) -> Self {
    Self {
      kind: ErrorKind::NotFound,
      message: format!("task '{}' not found", task_name),
    }
  }

  /// Payload for a task body that exceeded its deadline.
  #[must_use]
  pub fn timeout(limit: Duration) -> Self {
    Self {
      kind: ErrorKind::Timeout,
      message: format!("task timed out after {:?}", limit),
    }
  }

  /// Payload for a task body that failed with `err`.
  #[must_use]
  pub fn execution(err: &(dyn std::error::Error + 'static)) -> Self {
    Self {
      kind: ErrorKind::Execution,
      message: err.to_string(),
    }
  }
}

impl fmt::Display for ErrorPayload {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.kind, self.message)
  }
}

/// Renders an error and its source chain as trace text, one frame per line.
///
/// This is the textual trace transmitted next to the payload; the chain is
/// never rebuilt into error values on the receiving side.
#[must_use]
pub fn trace_text(err: &(dyn std::error::Error + 'static)) -> String {
  let mut out = err.to_string();
  let mut source = err.source();
  while let Some(cause) = source {
    out.push_str("\ncaused by: ");
    out.push_str(&cause.to_string());
    source = cause.source();
  }
  out
}

/// Caller-facing error for task submission and result retrieval.
///
/// Execution failures of any category (not found, timeout, body error)
/// surface uniformly as [`TaskError::Failed`] carrying the captured payload;
/// the category lives in [`ErrorKind`], not in dedicated variants.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
  /// A result was requested for a task sent with `result_return` disabled.
  #[error("task {0} does not return a result")]
  NoResult(Uuid),

  /// The task executed and failed; wraps the captured payload and trace text.
  #[error("task failed: {0}")]
  Failed(ErrorPayload, Option<String>),

  /// The backend transport failed.
  #[error(transparent)]
  Backend(#[from] BackendError),

  /// A graph passed to a send operation was malformed.
  #[error(transparent)]
  Graph(#[from] GraphError),
}

/// Errors raised by [`TaskRegistry`](crate::registry::TaskRegistry).
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
  /// A task with the same name is already registered.
  #[error("task '{0}' already registered")]
  DuplicateTask(String),
}

/// Errors raised while building a [`Graph`](crate::graph::Graph).
#[derive(Debug, Clone, Error)]
pub enum GraphError {
  /// An edge or root referenced a node id that was never added.
  #[error("graph node '{0}' does not exist")]
  UnknownNode(String),

  /// A node with the same id was already added.
  #[error("graph node '{0}' already exists")]
  DuplicateNode(String),
}

/// Errors raised by a [`Backend`](crate::backend::Backend) implementation.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
  /// The backend connection has been closed.
  #[error("backend is closed")]
  Closed,

  /// Transport-level failure.
  #[error("connection error: {0}")]
  Connection(String),

  /// Encoding or decoding of a wire payload failed.
  #[error("serialization error: {0}")]
  Serialization(String),

  /// No result is available or expected for the given task.
  #[error("no result for task {0}")]
  ResultMissing(Uuid),

  /// Other backend-specific error.
  #[error("backend error: {0}")]
  Other(String),
}

impl From<serde_json::Error> for BackendError {
  fn from(err: serde_json::Error) -> Self {
    BackendError::Serialization(err.to_string())
  }
}
