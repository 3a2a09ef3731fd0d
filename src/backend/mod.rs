//! Backend transport boundary.
//!
//! The backend is an external collaborator: it moves tasks and messages
//! between processes and stores task results. This core only depends on the
//! [`Backend`] trait; wire protocols, retries and durability are the
//! implementation's business. [`local::LocalBackend`] is the in-process
//! implementation shipped with the crate.
//!
//! Delivery is callback-driven: a consumer registers a [`TaskHandler`] /
//! [`MessageHandler`] per queue set, and the backend invokes it once per
//! delivered item. Implementations must not block a delivery on the handler
//! completing; the consumer applies its own admission control and may call
//! back into the backend (`stop_consume_tasks`) from inside a handler.

pub mod local;


use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::BackendError;
use crate::message::Message;
use crate::task::{TaskInstance, TaskResult};

/// Delivery callback for incoming tasks.
pub type TaskHandler = Arc<dyn Fn(TaskInstance) -> BoxFuture<'static, ()> + Send + Sync>;

/// Delivery callback for incoming messages.
pub type MessageHandler = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// Transport for sending tasks/messages and storing/retrieving results.
#[async_trait]
pub trait Backend: Send + Sync {
  /// Sends one task instance to its queue.
  async fn send_task(&self, task_instance: &TaskInstance) -> Result<(), BackendError>;

  /// Registers `on_task` as the delivery callback for `queues`.
  async fn consume_tasks(&self, queues: &[String], on_task: TaskHandler)
  -> Result<(), BackendError>;

  /// Stops delivering tasks. Already-delivered tasks are unaffected.
  async fn stop_consume_tasks(&self) -> Result<(), BackendError>;

  /// Registers `on_message` as the delivery callback for `queues`.
  async fn consume_messages(
    &self,
    queues: &[String],
    on_message: MessageHandler,
  ) -> Result<(), BackendError>;

  /// Stops delivering messages.
  async fn stop_consume_messages(&self) -> Result<(), BackendError>;

  /// Stores the result of an executed task for later retrieval.
  async fn push_task_result(
    &self,
    task_instance: &TaskInstance,
    result: &TaskResult,
  ) -> Result<(), BackendError>;

  /// Waits for and returns the stored result of `task_instance`.
  async fn pop_task_result(&self, task_instance: &TaskInstance) -> Result<TaskResult, BackendError>;

  /// Sends a raw message. `routing_key` selects the destination queue;
  /// `encrypt` is forwarded to the transport and not applied here.
  async fn send_message(
    &self,
    message: &Message,
    routing_key: Option<&str>,
    encrypt: bool,
  ) -> Result<(), BackendError>;

  /// Closes the transport. Subsequent operations fail with
  /// [`BackendError::Closed`].
  async fn close(&self) -> Result<(), BackendError>;
}
