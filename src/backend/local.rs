//! In-process backend.
//!
//! An in-memory broker keyed by queue name, useful for single-process
//! deployments and tests. Tasks still round-trip through the serialized
//! [`TaskData`] wire shape and are re-resolved against a [`TaskRegistry`] on
//! delivery, so the local path exercises the same contract as a networked
//! backend: the callable never travels, only the name does.
//!
//! Sends to a queue with no registered consumer buffer until one subscribes.
//! Deliveries are spawned onto the runtime rather than awaited in place,
//! which keeps `send_task` non-blocking and lets a handler call back into
//! this backend without deadlocking.

use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use crate::backend::{Backend, MessageHandler, TaskHandler};
use crate::error::BackendError;
use crate::message::Message;
use crate::registry::TaskRegistry;
use crate::task::{Task, TaskData, TaskInstance, TaskResult};

/// What actually travels for one task send.
#[derive(Serialize, Deserialize)]
struct WireTask {
  task: String,
  data: TaskData,
}

#[derive(Default)]
struct BrokerState {
  task_buffer: HashMap<String, VecDeque<Vec<u8>>>,
  task_consumer: Option<(HashSet<String>, TaskHandler)>,
  message_buffer: HashMap<String, VecDeque<Message>>,
  message_consumer: Option<(HashSet<String>, MessageHandler)>,
}

struct Inner {
  registry: Arc<TaskRegistry>,
  state: Mutex<BrokerState>,
  results: Mutex<HashMap<Uuid, TaskResult>>,
  results_ready: Notify,
  closed: AtomicBool,
}

/// In-memory [`Backend`] implementation.
#[derive(Clone)]
pub struct LocalBackend {
  inner: Arc<Inner>,
}

impl LocalBackend {
  /// Creates a local backend resolving delivered task names against
  /// `registry`.
  #[must_use]
  pub fn new(registry: Arc<TaskRegistry>) -> Self {
    Self {
      inner: Arc::new(Inner {
        registry,
        state: Mutex::new(BrokerState::default()),
        results: Mutex::new(HashMap::new()),
        results_ready: Notify::new(),
        closed: AtomicBool::new(false),
      }),
    }
  }

  fn ensure_open(&self) -> Result<(), BackendError> {
    if self.inner.closed.load(Ordering::SeqCst) {
      return Err(BackendError::Closed);
    }
    Ok(())
  }

  fn deliver_task(&self, wire: &[u8], handler: &TaskHandler) -> Result<(), BackendError> {
    let wire: WireTask = serde_json::from_slice(wire)?;
    let task = self
      .inner
      .registry
      .lookup(&wire.task)
      .unwrap_or_else(|| Task::unbound(&wire.task));
    let task_instance = task.instantiate(wire.data);
    debug!(task_instance = %task_instance, "deliver");
    tokio::spawn(handler(task_instance));
    Ok(())
  }

  fn deliver_message(&self, message: Message, handler: &MessageHandler) {
    debug!(message = %message, "deliver");
    tokio::spawn(handler(message));
  }

  fn state(&self) -> std::sync::MutexGuard<'_, BrokerState> {
    self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
  }
}

#[async_trait]
impl Backend for LocalBackend {
  async fn send_task(&self, task_instance: &TaskInstance) -> Result<(), BackendError> {
    self.ensure_open()?;
    let wire = serde_json::to_vec(&WireTask {
      task: task_instance.task.name.clone(),
      data: task_instance.data.clone(),
    })?;
    let queue = task_instance.data.queue.clone();

    let mut state = self.state();
    match &state.task_consumer {
      Some((queues, handler)) if queues.contains(&queue) => {
        let handler = handler.clone();
        drop(state);
        self.deliver_task(&wire, &handler)?;
      }
      _ => {
        debug!(queue = %queue, "no consumer, buffering task");
        state.task_buffer.entry(queue).or_default().push_back(wire);
      }
    }
    Ok(())
  }

  async fn consume_tasks(
    &self,
    queues: &[String],
    on_task: TaskHandler,
  ) -> Result<(), BackendError> {
    self.ensure_open()?;
    let buffered: Vec<Vec<u8>> = {
      let mut state = self.state();
      state.task_consumer = Some((queues.iter().cloned().collect(), on_task.clone()));
      queues
        .iter()
        .filter_map(|q| state.task_buffer.remove(q))
        .flatten()
        .collect()
    };
    for wire in buffered {
      self.deliver_task(&wire, &on_task)?;
    }
    Ok(())
  }

  async fn stop_consume_tasks(&self) -> Result<(), BackendError> {
    self.state().task_consumer = None;
    Ok(())
  }

  async fn consume_messages(
    &self,
    queues: &[String],
    on_message: MessageHandler,
  ) -> Result<(), BackendError> {
    self.ensure_open()?;
    let buffered: Vec<Message> = {
      let mut state = self.state();
      state.message_consumer = Some((queues.iter().cloned().collect(), on_message.clone()));
      queues
        .iter()
        .filter_map(|q| state.message_buffer.remove(q))
        .flatten()
        .collect()
    };
    for message in buffered {
      self.deliver_message(message, &on_message);
    }
    Ok(())
  }

  async fn stop_consume_messages(&self) -> Result<(), BackendError> {
    self.state().message_consumer = None;
    Ok(())
  }

  async fn push_task_result(
    &self,
    task_instance: &TaskInstance,
    result: &TaskResult,
  ) -> Result<(), BackendError> {
    self.ensure_open()?;
    let task_id = task_instance.data.task_id;
    if !task_instance.data.result_return {
      return Err(BackendError::ResultMissing(task_id));
    }
    self
      .inner
      .results
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .insert(task_id, result.clone());
    self.inner.results_ready.notify_waiters();
    Ok(())
  }

  async fn pop_task_result(&self, task_instance: &TaskInstance) -> Result<TaskResult, BackendError> {
    let task_id = task_instance.data.task_id;
    loop {
      // Register for a wakeup before checking, so a push between the check
      // and the await is not lost. `notify_waiters` only reaches futures
      // that are already enabled.
      let mut notified = pin!(self.inner.results_ready.notified());
      notified.as_mut().enable();
      let stored = self
        .inner
        .results
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&task_id);
      if let Some(result) = stored {
        return Ok(result);
      }
      if self.inner.closed.load(Ordering::SeqCst) {
        return Err(BackendError::Closed);
      }
      notified.await;
    }
  }

  async fn send_message(
    &self,
    message: &Message,
    routing_key: Option<&str>,
    _encrypt: bool,
  ) -> Result<(), BackendError> {
    self.ensure_open()?;
    let Some(routing_key) = routing_key else {
      return Err(BackendError::Other("invalid routing key".to_string()));
    };

    let mut state = self.state();
    match &state.message_consumer {
      Some((queues, handler)) if queues.contains(routing_key) => {
        let handler = handler.clone();
        drop(state);
        self.deliver_message(message.clone(), &handler);
      }
      _ => {
        debug!(queue = %routing_key, "no consumer, buffering message");
        state
          .message_buffer
          .entry(routing_key.to_string())
          .or_default()
          .push_back(message.clone());
      }
    }
    Ok(())
  }

  async fn close(&self) -> Result<(), BackendError> {
    self.inner.closed.store(true, Ordering::SeqCst);
    let mut state = self.state();
    state.task_consumer = None;
    state.message_consumer = None;
    drop(state);
    // Wake pending pops so they observe the closed flag.
    self.inner.results_ready.notify_waiters();
    Ok(())
  }
}
