//! Task submission.
//!
//! The [`Producer`] turns a task name plus arguments into a
//! [`TaskInstance`], hands it to the backend and returns an
//! [`AsyncResult`] handle for the eventual outcome. It also drives graph
//! fan-out ([`Producer::send_graph`]) and raw message sends. Cloning a
//! producer is cheap; clones share the registry and backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::info;

use crate::async_result::AsyncResult;
use crate::backend::Backend;
use crate::config::ProducerConfig;
use crate::error::TaskError;
use crate::graph::Graph;
use crate::message::Message;
use crate::registry::TaskRegistry;
use crate::task::{Task, TaskData, TaskInstance, TaskOptionOverrides};

/// Call-site parameters for a raw message send.
#[derive(Debug, Clone, Default)]
pub struct MessageOptions {
  /// Destination exchange; the producer's default when `None`.
  pub exchange: Option<String>,
  /// Routing key selecting the destination queue.
  pub routing_key: Option<String>,
  /// Delivery priority.
  pub priority: Option<u8>,
  /// Time-to-live on the queue.
  pub ttl: Option<Duration>,
  /// Payload encryption flag, forwarded to the backend.
  pub encrypt: bool,
}

impl MessageOptions {
  /// Sets the destination exchange.
  #[must_use]
  pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
    self.exchange = Some(exchange.into());
    self
  }

  /// Sets the routing key.
  #[must_use]
  pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
    self.routing_key = Some(routing_key.into());
    self
  }

  /// Sets the delivery priority.
  #[must_use]
  pub fn with_priority(mut self, priority: u8) -> Self {
    self.priority = Some(priority);
    self
  }

  /// Sets the time-to-live.
  #[must_use]
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = Some(ttl);
    self
  }

  /// Sets the encryption flag.
  #[must_use]
  pub fn with_encrypt(mut self, encrypt: bool) -> Self {
    self.encrypt = encrypt;
    self
  }
}

struct ProducerInner {
  config: ProducerConfig,
  registry: Arc<TaskRegistry>,
  backend: Arc<dyn Backend>,
}

/// Submits tasks and messages to a backend.
#[derive(Clone)]
pub struct Producer {
  inner: Arc<ProducerInner>,
}

impl Producer {
  /// Creates a producer over `backend`, resolving task names against
  /// `registry`.
  #[must_use]
  pub fn new(config: ProducerConfig, registry: Arc<TaskRegistry>, backend: Arc<dyn Backend>) -> Self {
    Self {
      inner: Arc::new(ProducerInner {
        config,
        registry,
        backend,
      }),
    }
  }

  /// The registry task names are resolved against.
  #[must_use]
  pub fn registry(&self) -> &Arc<TaskRegistry> {
    &self.inner.registry
  }

  /// The backend this producer sends through.
  #[must_use]
  pub fn backend(&self) -> &Arc<dyn Backend> {
    &self.inner.backend
  }

  /// Submits one task invocation and returns a handle for its outcome.
  ///
  /// `name` is resolved against the registry; an unknown name still sends
  /// (as an unbound task) since the consuming process may own the
  /// definition. Call-site `overrides` are merged over the task's registered
  /// options. Exactly one backend send is performed.
  pub async fn send_task(
    &self,
    name: &str,
    args: Vec<Value>,
    kwds: HashMap<String, Value>,
    overrides: TaskOptionOverrides,
  ) -> Result<AsyncResult, TaskError> {
    let task = self.resolve(name);
    let options = task.options.merged(&overrides);
    let data = TaskData::from_options(&options, &overrides, args, kwds);
    let task_instance = task.instantiate(data);

    info!(task_instance = %task_instance, "send task");
    self.inner.backend.send_task(&task_instance).await?;

    Ok(AsyncResult::new(self.clone(), task_instance))
  }

  /// Submits every root of `graph`, fire and forget.
  ///
  /// For each root, the caller's `args` are appended to the node's stored
  /// args and the caller's `kwds` are merged into the node's stored kwds
  /// (caller wins on conflicts), and a view of the graph restricted to that
  /// single root travels with the send.
  pub async fn send_graph(
    &self,
    graph: &Graph,
    args: Vec<Value>,
    kwds: HashMap<String, Value>,
  ) -> Result<(), TaskError> {
    info!(graph = %graph, "send graph");

    for root in graph.roots() {
      let Some(spec) = graph.node(root) else {
        continue; // unreachable: construction keeps roots inside the node table
      };
      let task = self.resolve(&spec.task_name);
      let options = task.options.merged(&spec.options);

      let mut node_args = spec.args.clone();
      node_args.extend(args.iter().cloned());
      let mut node_kwds = spec.kwds.clone();
      node_kwds.extend(kwds.iter().map(|(k, v)| (k.clone(), v.clone())));

      let mut data = TaskData::from_options(&options, &spec.options, node_args, node_kwds);
      data.graph = Some(graph.reroot(root)?);

      let task_instance = task.instantiate(data);
      info!(task_instance = %task_instance, "send task");
      self.inner.backend.send_task(&task_instance).await?;
    }
    Ok(())
  }

  /// Wraps `data` in a [`Message`] and sends it outside the task-result
  /// contract.
  pub async fn send_message(&self, data: Value, options: MessageOptions) -> Result<(), TaskError> {
    let exchange = options
      .exchange
      .unwrap_or_else(|| self.inner.config.exchange.clone());
    let mut message = Message::new(exchange, data);
    if let Some(priority) = options.priority {
      message = message.with_priority(priority);
    }
    if let Some(ttl) = options.ttl {
      message = message.with_ttl(ttl);
    }

    info!(message = %message, "send message");
    self
      .inner
      .backend
      .send_message(&message, options.routing_key.as_deref(), options.encrypt)
      .await?;
    Ok(())
  }

  /// Retrieves the stored result of `task_instance` from the backend.
  ///
  /// A stored failure payload is surfaced as [`TaskError::Failed`]; the
  /// original error type is never reconstructed.
  pub async fn pop_result(&self, task_instance: &TaskInstance) -> Result<Value, TaskError> {
    let task_result = self.inner.backend.pop_task_result(task_instance).await?;
    match task_result.exc {
      Some(payload) => Err(TaskError::Failed(payload, task_result.trb)),
      None => Ok(task_result.res.unwrap_or(Value::Null)),
    }
  }

  /// Closes the underlying backend connection.
  pub async fn close(&self) -> Result<(), TaskError> {
    self.inner.backend.close().await?;
    Ok(())
  }

  fn resolve(&self, name: &str) -> Task {
    self
      .inner
      .registry
      .lookup(name)
      .unwrap_or_else(|| Task::unbound(name))
  }
}
