//! Admission-controlled execution loop.
//!
//! The [`Consumer`] subscribes to the backend for incoming tasks and
//! messages, executes them under a bounded concurrency budget and propagates
//! results: on success it advances any attached graph by re-submitting child
//! nodes through its own embedded [`Producer`], and pushes the
//! [`TaskResult`](crate::task::TaskResult) back to the backend when the task
//! asked for one.
//!
//! ## Admission control
//!
//! Two tracking tables (running tasks, running messages) hold one cancellable
//! handle per in-flight item; their combined size never exceeds `pool_size`.
//! The tables and the admission decision share one lock: deciding "can I
//! accept more work" must be atomic with respect to completing items removing
//! themselves.
//!
//! When accepting one more item would reach the ceiling, the consumer stops
//! backend delivery, runs that item to completion while still holding the
//! admission lock, then re-subscribes. Throughput is deliberately traded for
//! a hard concurrency ceiling.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{Backend, MessageHandler, TaskHandler};
use crate::config::{ConsumerConfig, ProducerConfig};
use crate::error::BackendError;
use crate::executor;
use crate::message::Message;
use crate::producer::Producer;
use crate::registry::TaskRegistry;
use crate::task::TaskInstance;

/// Keyword under which a child task receives its parent's node id during
/// graph fan-out.
pub const GRAPH_SOURCE_NODE: &str = "graph_source_node";

#[derive(Default)]
struct TrackingTables {
  running_tasks: HashMap<Uuid, AbortHandle>,
  running_messages: HashMap<Uuid, AbortHandle>,
}

impl TrackingTables {
  fn in_flight(&self) -> usize {
    self.running_tasks.len() + self.running_messages.len()
  }
}

struct ConsumerInner {
  config: ConsumerConfig,
  backend: Arc<dyn Backend>,
  producer: Producer,
  on_message: MessageHandler,
  tables: Mutex<TrackingTables>,
  closed: AtomicBool,
}

/// Executes tasks delivered by the backend under a bounded concurrency pool.
#[derive(Clone)]
pub struct Consumer {
  inner: Arc<ConsumerInner>,
}

impl Consumer {
  /// Creates a consumer with a no-op message hook.
  #[must_use]
  pub fn new(config: ConsumerConfig, registry: Arc<TaskRegistry>, backend: Arc<dyn Backend>) -> Self {
    Self::with_message_handler(config, registry, backend, Arc::new(|_| Box::pin(async {})))
  }

  /// Creates a consumer invoking `on_message` for every delivered message.
  #[must_use]
  pub fn with_message_handler(
    config: ConsumerConfig,
    registry: Arc<TaskRegistry>,
    backend: Arc<dyn Backend>,
    on_message: MessageHandler,
  ) -> Self {
    let producer = Producer::new(ProducerConfig::default(), registry, Arc::clone(&backend));
    Self {
      inner: Arc::new(ConsumerInner {
        config,
        backend,
        producer,
        on_message,
        tables: Mutex::new(TrackingTables::default()),
        closed: AtomicBool::new(false),
      }),
    }
  }

  /// The embedded producer used for graph fan-out.
  #[must_use]
  pub fn producer(&self) -> &Producer {
    &self.inner.producer
  }

  /// Combined number of currently tracked tasks and messages.
  pub async fn in_flight(&self) -> usize {
    self.inner.tables.lock().await.in_flight()
  }

  /// Subscribes to the configured task queues. No-op when none are
  /// configured.
  pub async fn consume_tasks(&self) -> Result<(), BackendError> {
    if self.inner.config.task_queues.is_empty() {
      return Ok(());
    }
    info!(queues = ?self.inner.config.task_queues, "consuming task queues");
    self
      .inner
      .backend
      .consume_tasks(
        &self.inner.config.task_queues,
        ConsumerInner::task_handler(&self.inner),
      )
      .await
  }

  /// Cancels every tracked in-flight task and clears the tracking table.
  pub async fn stop_consume_tasks(&self) {
    let mut tables = self.inner.tables.lock().await;
    for (task_id, handle) in tables.running_tasks.drain() {
      debug!(%task_id, "cancel running task");
      handle.abort();
    }
  }

  /// Subscribes to the configured message queues. No-op when none are
  /// configured.
  pub async fn consume_messages(&self) -> Result<(), BackendError> {
    if self.inner.config.message_queues.is_empty() {
      return Ok(());
    }
    info!(queues = ?self.inner.config.message_queues, "consuming message queues");
    self
      .inner
      .backend
      .consume_messages(
        &self.inner.config.message_queues,
        ConsumerInner::message_handler(&self.inner),
      )
      .await
  }

  /// Cancels every tracked in-flight message and clears the tracking table.
  pub async fn stop_consume_messages(&self) {
    let mut tables = self.inner.tables.lock().await;
    for (message_id, handle) in tables.running_messages.drain() {
      debug!(%message_id, "cancel running message");
      handle.abort();
    }
  }

  /// Stops both consume loops and closes the underlying backend connection.
  pub async fn close(&self) -> Result<(), BackendError> {
    self.stop_consume_tasks().await;
    self.stop_consume_messages().await;
    self.inner.closed.store(true, Ordering::SeqCst);
    self.inner.backend.close().await
  }
}

impl ConsumerInner {
  fn task_handler(inner: &Arc<Self>) -> TaskHandler {
    let inner = Arc::clone(inner);
    Arc::new(move |task_instance| {
      let inner = Arc::clone(&inner);
      Box::pin(async move { inner.on_task(task_instance).await })
    })
  }

  fn message_handler(inner: &Arc<Self>) -> MessageHandler {
    let inner = Arc::clone(inner);
    Arc::new(move |message| {
      let inner = Arc::clone(&inner);
      Box::pin(async move { inner.on_message(message).await })
    })
  }

  fn is_closed(&self) -> bool {
    self.closed.load(Ordering::SeqCst)
  }

  async fn on_task(self: Arc<Self>, task_instance: TaskInstance) {
    let task_id = task_instance.data.task_id;

    let mut tables = self.tables.lock().await;
    if self.is_closed() {
      return;
    }

    if tables.in_flight() + 1 >= self.config.pool_size {
      // Backpressure path: pause delivery, run this one item to completion
      // while the admission lock stays held, then resume.
      if let Err(err) = self.backend.stop_consume_tasks().await {
        warn!(error = %err, "failed to pause task delivery");
      }
      let this = Arc::clone(&self);
      let handle = tokio::spawn(async move { this.execute_task(task_instance).await });
      tables.running_tasks.insert(task_id, handle.abort_handle());
      let _ = handle.await;
      tables.running_tasks.remove(&task_id);

      if !self.is_closed() {
        if let Err(err) = self
          .backend
          .consume_tasks(&self.config.task_queues, Self::task_handler(&self))
          .await
        {
          error!(error = %err, "failed to resume task delivery");
        }
      }
      return;
    }

    let this = Arc::clone(&self);
    let handle = tokio::spawn(async move {
      this.execute_task(task_instance).await;
      this.tables.lock().await.running_tasks.remove(&task_id);
    });
    tables.running_tasks.insert(task_id, handle.abort_handle());
  }

  async fn on_message(self: Arc<Self>, message: Message) {
    let message_id = message.message_id;

    let mut tables = self.tables.lock().await;
    if self.is_closed() {
      return;
    }

    if tables.in_flight() + 1 >= self.config.pool_size {
      if let Err(err) = self.backend.stop_consume_messages().await {
        warn!(error = %err, "failed to pause message delivery");
      }
      let hook = Arc::clone(&self.on_message);
      let handle = tokio::spawn(hook(message));
      tables.running_messages.insert(message_id, handle.abort_handle());
      let _ = handle.await;
      tables.running_messages.remove(&message_id);

      if !self.is_closed() {
        if let Err(err) = self
          .backend
          .consume_messages(&self.config.message_queues, Self::message_handler(&self))
          .await
        {
          error!(error = %err, "failed to resume message delivery");
        }
      }
      return;
    }

    let this = Arc::clone(&self);
    let hook = Arc::clone(&self.on_message);
    let handle = tokio::spawn(async move {
      hook(message).await;
      this.tables.lock().await.running_messages.remove(&message_id);
    });
    tables.running_messages.insert(message_id, handle.abort_handle());
  }

  /// Runs one task: execute, advance the attached graph on success, push the
  /// result when requested. Failures here are logged and swallowed; a push
  /// failure must never abort the scheduling loop.
  async fn execute_task(&self, task_instance: TaskInstance) {
    let executor = executor::for_task(&task_instance.data);
    let task_result = executor.execute(&task_instance).await;

    if let Some(graph) = &task_instance.data.graph {
      if task_result.exc.is_none() {
        // Attached graphs always have exactly one root: the node that just
        // ran. Its children each get the result as first positional arg.
        if let Some(root) = graph.roots().iter().next() {
          for child in graph.children(root) {
            let view = match graph.reroot(child) {
              Ok(view) => view,
              Err(err) => {
                error!(error = %err, "graph fan-out failed");
                continue;
              }
            };
            let args = vec![task_result.res.clone().unwrap_or(Value::Null)];
            let kwds = HashMap::from([(
              GRAPH_SOURCE_NODE.to_string(),
              Value::String(root.clone()),
            )]);
            if let Err(err) = self.producer.send_graph(&view, args, kwds).await {
              error!(error = %err, graph = %view, "graph fan-out failed");
            }
          }
        }
      }
    }

    if task_instance.data.result_return {
      if let Err(err) = self
        .backend
        .push_task_result(&task_instance, &task_result)
        .await
      {
        error!(error = %err, task_instance = %task_instance, "failed to push task result");
      }
    }
  }
}
