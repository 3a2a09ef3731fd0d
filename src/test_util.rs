//! Shared test fixtures: a scriptable backend that records every call.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::backend::{Backend, MessageHandler, TaskHandler};
use crate::error::BackendError;
use crate::message::Message;
use crate::task::{TaskInstance, TaskResult};

/// Backend double: records sends, serves a scripted result on pop.
#[derive(Default)]
pub struct MockBackend {
  pub sent_tasks: Mutex<Vec<TaskInstance>>,
  pub sent_messages: Mutex<Vec<(Message, Option<String>, bool)>>,
  pub pop_count: AtomicUsize,
  pub scripted_result: Mutex<Option<TaskResult>>,
  pub pushed: Mutex<HashMap<uuid::Uuid, TaskResult>>,
}

impl MockBackend {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn script_result(&self, result: TaskResult) {
    *self.scripted_result.lock().unwrap() = Some(result);
  }

  pub fn sent_task_count(&self) -> usize {
    self.sent_tasks.lock().unwrap().len()
  }
}

#[async_trait]
impl Backend for MockBackend {
  async fn send_task(&self, task_instance: &TaskInstance) -> Result<(), BackendError> {
    self.sent_tasks.lock().unwrap().push(task_instance.clone());
    Ok(())
  }

  async fn consume_tasks(
    &self,
    _queues: &[String],
    _on_task: TaskHandler,
  ) -> Result<(), BackendError> {
    Ok(())
  }

  async fn stop_consume_tasks(&self) -> Result<(), BackendError> {
    Ok(())
  }

  async fn consume_messages(
    &self,
    _queues: &[String],
    _on_message: MessageHandler,
  ) -> Result<(), BackendError> {
    Ok(())
  }

  async fn stop_consume_messages(&self) -> Result<(), BackendError> {
    Ok(())
  }

  async fn push_task_result(
    &self,
    task_instance: &TaskInstance,
    result: &TaskResult,
  ) -> Result<(), BackendError> {
    self
      .pushed
      .lock()
      .unwrap()
      .insert(task_instance.data.task_id, result.clone());
    Ok(())
  }

  async fn pop_task_result(&self, task_instance: &TaskInstance) -> Result<TaskResult, BackendError> {
    self.pop_count.fetch_add(1, Ordering::SeqCst);
    match self.scripted_result.lock().unwrap().clone() {
      Some(result) => Ok(result),
      None => Err(BackendError::ResultMissing(task_instance.data.task_id)),
    }
  }

  async fn send_message(
    &self,
    message: &Message,
    routing_key: Option<&str>,
    encrypt: bool,
  ) -> Result<(), BackendError> {
    self.sent_messages.lock().unwrap().push((
      message.clone(),
      routing_key.map(str::to_string),
      encrypt,
    ));
    Ok(())
  }

  async fn close(&self) -> Result<(), BackendError> {
    Ok(())
  }
}
