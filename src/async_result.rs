//! Lazily-resolved result handle.
//!
//! An [`AsyncResult`] binds a [`Producer`] to the [`TaskInstance`] it sent.
//! The outcome is fetched from the backend on the first [`AsyncResult::get`]
//! and cached; the handle flips to ready at most once and never resets.

use serde_json::Value;
use uuid::Uuid;

use crate::error::TaskError;
use crate::producer::Producer;
use crate::task::TaskInstance;

/// Caller-held handle for a sent task's eventual outcome.
pub struct AsyncResult {
  producer: Producer,
  task_instance: TaskInstance,
  result: Option<Value>,
  error: Option<TaskError>,
  ready: bool,
}

impl AsyncResult {
  /// Creates a handle bound to the producer that performed the send.
  #[must_use]
  pub fn new(producer: Producer, task_instance: TaskInstance) -> Self {
    Self {
      producer,
      task_instance,
      result: None,
      error: None,
      ready: false,
    }
  }

  /// The sent task instance this handle resolves.
  #[must_use]
  pub fn task_instance(&self) -> &TaskInstance {
    &self.task_instance
  }

  /// Id of the sent task.
  #[must_use]
  pub fn task_id(&self) -> Uuid {
    self.task_instance.data.task_id
  }

  /// Whether an outcome (value or failure) is already cached.
  #[must_use]
  pub fn ready(&self) -> bool {
    self.ready
  }

  /// Resolves the task's outcome.
  ///
  /// Fails with [`TaskError::NoResult`] when the task was sent with
  /// `result_return` disabled. Otherwise the first call pops the result from
  /// the backend and caches it; later calls return the cached outcome
  /// without contacting the backend again. Backend connectivity failures are
  /// returned but not cached, so a retry may still succeed.
  pub async fn get(&mut self) -> Result<Value, TaskError> {
    if !self.task_instance.data.result_return {
      return Err(TaskError::NoResult(self.task_id()));
    }

    if !self.ready {
      match self.producer.pop_result(&self.task_instance).await {
        Ok(value) => {
          self.result = Some(value);
          self.ready = true;
        }
        Err(err @ TaskError::Failed(..)) => {
          self.error = Some(err);
          self.ready = true;
        }
        Err(err) => return Err(err),
      }
    }

    if let Some(err) = &self.error {
      return Err(err.clone());
    }
    Ok(self.result.clone().unwrap_or(Value::Null))
  }
}
