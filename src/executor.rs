//! Execution strategies for task bodies.
//!
//! [`InlineExecutor`] runs a body on the shared loop; [`WorkerThreadExecutor`]
//! isolates it on a dedicated OS thread with its own runtime, so blocking
//! work cannot stall the consumer's scheduling loop. The strategy is selected
//! per invocation by the `thread` flag via [`for_task`].
//!
//! An executor never lets a body failure escape: every outcome, including
//! missing callables and deadline expiry, lands in the returned
//! [`TaskResult`].

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::error::{ErrorKind, ErrorPayload, trace_text};
use crate::task::{TaskData, TaskInstance, TaskResult};

/// Runs one task body to completion, producing a [`TaskResult`].
#[async_trait]
pub trait Executor: Send + Sync {
  /// Executes `task_instance`, capturing any failure into the result.
  async fn execute(&self, task_instance: &TaskInstance) -> TaskResult;
}

/// Selects the execution strategy for `data` per its `thread` flag.
#[must_use]
pub fn for_task(data: &TaskData) -> Box<dyn Executor> {
  if data.thread {
    Box::new(WorkerThreadExecutor)
  } else {
    Box::new(InlineExecutor)
  }
}

/// Runs the task body in place on the shared loop.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

#[async_trait]
impl Executor for InlineExecutor {
  async fn execute(&self, task_instance: &TaskInstance) -> TaskResult {
    let data = &task_instance.data;
    let started = std::time::Instant::now();
    info!(task = %task_instance.task.name, task_id = %data.task_id, "execute");

    let result = match task_instance.call() {
      None => {
        error!(task = %task_instance.task.name, "callable not found");
        TaskResult::err(ErrorPayload::not_found(&task_instance.task.name), None)
      }
      Some(body) => {
        let outcome = match data.timeout {
          Some(limit) => tokio::time::timeout(limit, body).await.map_err(|_| limit),
          None => Ok(body.await),
        };
        match outcome {
          Ok(Ok(value)) => TaskResult::ok(value),
          Ok(Err(err)) => {
            error!(task_instance = %task_instance, error = %err, "task failed");
            let trace = trace_text(err.as_ref());
            TaskResult::err(ErrorPayload::execution(err.as_ref()), Some(trace))
          }
          Err(limit) => {
            error!(task_instance = %task_instance, ?limit, "task timeout");
            TaskResult::err(ErrorPayload::timeout(limit), None)
          }
        }
      }
    };

    info!(
      task = %task_instance.task.name,
      task_id = %data.task_id,
      elapsed = ?started.elapsed(),
      "done",
    );
    result
  }
}

/// Runs the task body on one dedicated worker thread.
///
/// The thread owns a private current-thread runtime and performs the full
/// inline sequence there; the calling side suspends on a completion channel
/// until the thread finishes.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerThreadExecutor;

#[async_trait]
impl Executor for WorkerThreadExecutor {
  async fn execute(&self, task_instance: &TaskInstance) -> TaskResult {
    let (done_tx, done_rx) = oneshot::channel();
    let task_instance = task_instance.clone();

    let spawned = std::thread::Builder::new()
      .name(format!("taskweave-{}", task_instance.data.task_id))
      .spawn(move || {
        let result = match tokio::runtime::Builder::new_current_thread()
          .enable_all()
          .build()
        {
          Ok(runtime) => runtime.block_on(InlineExecutor.execute(&task_instance)),
          Err(err) => TaskResult::err(ErrorPayload::execution(&err), None),
        };
        let _ = done_tx.send(result);
      });

    if let Err(err) = spawned {
      error!(error = %err, "failed to spawn worker thread");
      return TaskResult::err(ErrorPayload::execution(&err), None);
    }

    match done_rx.await {
      Ok(result) => result,
      // The sender is dropped without a result only if the body panicked.
      Err(_) => TaskResult::err(
        ErrorPayload {
          kind: ErrorKind::Execution,
          message: "worker thread terminated without a result".to_string(),
        },
        None,
      ),
    }
  }
}
