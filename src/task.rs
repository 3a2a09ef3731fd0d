//! Task definitions, per-invocation data and execution results.
//!
//! The core types here mirror one task's lifecycle:
//!
//! - [`Task`]: a named unit-of-work definition with default options, created
//!   once at registration and immutable afterwards.
//! - [`TaskData`]: the parameters of one invocation, owned by the
//!   [`TaskInstance`] that wraps it.
//! - [`TaskInstance`]: a definition bound to one invocation; ephemeral.
//! - [`TaskResult`]: the outcome of one executed instance, either transmitted
//!   to the backend or consumed locally.
//!
//! Whether a task can actually run locally is a tagged variant,
//! [`TaskCallable`]: a `Bound` task carries its body, an `Unbound` task is
//! known only by name (valid when the consuming process owns the definition)
//! and deterministically fails with a not-found outcome if executed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config;
use crate::error::ErrorPayload;
use crate::graph::Graph;

/// Boxed error a task body may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by a task body.
pub type TaskFuture = BoxFuture<'static, Result<Value, BoxError>>;

/// A task body: positional args and keyword args in, value or error out.
pub type TaskFn = Arc<dyn Fn(Vec<Value>, HashMap<String, Value>) -> TaskFuture + Send + Sync>;

/// Wraps an async closure into a [`TaskFn`].
pub fn task_fn<F, Fut>(f: F) -> TaskFn
where
  F: Fn(Vec<Value>, HashMap<String, Value>) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
{
  Arc::new(move |args, kwds| Box::pin(f(args, kwds)))
}

/// Whether a [`Task`] carries its body or is known only by name.
#[derive(Clone)]
pub enum TaskCallable {
  /// The body is available locally.
  Bound(TaskFn),
  /// Name-only definition; execution yields a not-found outcome.
  Unbound,
}

impl fmt::Debug for TaskCallable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TaskCallable::Bound(_) => write!(f, "Bound(..)"),
      TaskCallable::Unbound => write!(f, "Unbound"),
    }
  }
}

/// Default execution options of a registered task.
///
/// Every field is concrete; omitted values were already filled from the
/// process-wide defaults in [`config`] when the options were merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOptions {
  /// Queue the task is sent to.
  pub queue: String,
  /// Queue priority.
  pub priority: u8,
  /// Execution deadline, `None` for unbounded.
  pub timeout: Option<Duration>,
  /// Time-to-live on the queue.
  pub ttl: Option<Duration>,
  /// Acknowledge after execution instead of before.
  pub ack_late: bool,
  /// Time-to-live of the stored result.
  pub result_ttl: Option<Duration>,
  /// Whether a result is pushed back to the backend at all.
  pub result_return: bool,
  /// Whether the stored result is encrypted (flag is forwarded, not applied
  /// here).
  pub result_encrypt: bool,
  /// Run the body on a dedicated worker thread instead of the shared loop.
  pub thread: bool,
}

impl Default for TaskOptions {
  fn default() -> Self {
    Self {
      queue: config::DEFAULT_TASK_QUEUE.to_string(),
      priority: config::DEFAULT_TASK_PRIORITY,
      timeout: Some(config::DEFAULT_TASK_TIMEOUT),
      ttl: Some(config::DEFAULT_TASK_TTL),
      ack_late: config::DEFAULT_TASK_ACK_LATE,
      result_ttl: Some(config::DEFAULT_RESULT_TTL),
      result_return: config::DEFAULT_RESULT_RETURN,
      result_encrypt: config::DEFAULT_RESULT_ENCRYPT,
      thread: config::DEFAULT_TASK_THREAD,
    }
  }
}

impl TaskOptions {
  /// Pure merge: values present in `overrides` win, everything else is kept.
  ///
  /// Used once at registration (over the process defaults) and once per send
  /// (over the task's registered options).
  #[must_use]
  pub fn merged(&self, overrides: &TaskOptionOverrides) -> TaskOptions {
    TaskOptions {
      queue: overrides.queue.clone().unwrap_or_else(|| self.queue.clone()),
      priority: overrides.priority.unwrap_or(self.priority),
      timeout: overrides.timeout.or(self.timeout),
      ttl: overrides.ttl.or(self.ttl),
      ack_late: overrides.ack_late.unwrap_or(self.ack_late),
      result_ttl: overrides.result_ttl.or(self.result_ttl),
      result_return: overrides.result_return.unwrap_or(self.result_return),
      result_encrypt: overrides.result_encrypt.unwrap_or(self.result_encrypt),
      thread: overrides.thread.unwrap_or(self.thread),
    }
  }
}

/// Options a caller may override, at registration or per send.
///
/// `encrypt` and `extra` only apply at send time; the registration merge
/// ignores them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskOptionOverrides {
  /// Queue override.
  pub queue: Option<String>,
  /// Priority override.
  pub priority: Option<u8>,
  /// Deadline override.
  pub timeout: Option<Duration>,
  /// Queue time-to-live override.
  pub ttl: Option<Duration>,
  /// Payload encryption flag for this send (forwarded to the backend).
  pub encrypt: Option<bool>,
  /// Acknowledgement mode override.
  pub ack_late: Option<bool>,
  /// Result time-to-live override.
  pub result_ttl: Option<Duration>,
  /// Result mode override.
  pub result_return: Option<bool>,
  /// Result encryption override.
  pub result_encrypt: Option<bool>,
  /// Execution strategy override.
  pub thread: Option<bool>,
  /// Free-form metadata attached to this send.
  #[serde(default)]
  pub extra: HashMap<String, Value>,
}

impl TaskOptionOverrides {
  /// Sets the queue.
  #[must_use]
  pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
    self.queue = Some(queue.into());
    self
  }

  /// Sets the priority.
  #[must_use]
  pub fn with_priority(mut self, priority: u8) -> Self {
    self.priority = Some(priority);
    self
  }

  /// Sets the execution deadline.
  #[must_use]
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  /// Sets the queue time-to-live.
  #[must_use]
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = Some(ttl);
    self
  }

  /// Sets the payload encryption flag.
  #[must_use]
  pub fn with_encrypt(mut self, encrypt: bool) -> Self {
    self.encrypt = Some(encrypt);
    self
  }

  /// Sets the acknowledgement mode.
  #[must_use]
  pub fn with_ack_late(mut self, ack_late: bool) -> Self {
    self.ack_late = Some(ack_late);
    self
  }

  /// Sets the result time-to-live.
  #[must_use]
  pub fn with_result_ttl(mut self, result_ttl: Duration) -> Self {
    self.result_ttl = Some(result_ttl);
    self
  }

  /// Sets whether a result is pushed back to the backend.
  #[must_use]
  pub fn with_result_return(mut self, result_return: bool) -> Self {
    self.result_return = Some(result_return);
    self
  }

  /// Sets the result encryption flag.
  #[must_use]
  pub fn with_result_encrypt(mut self, result_encrypt: bool) -> Self {
    self.result_encrypt = Some(result_encrypt);
    self
  }

  /// Sets the execution strategy (dedicated thread vs. inline).
  #[must_use]
  pub fn with_thread(mut self, thread: bool) -> Self {
    self.thread = Some(thread);
    self
  }

  /// Adds one free-form metadata entry.
  #[must_use]
  pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
    self.extra.insert(key.into(), value);
    self
  }
}

/// A named, registered unit-of-work definition with default options.
///
/// Immutable after registration. Cloning is cheap: the body is `Arc`-shared.
#[derive(Debug, Clone)]
pub struct Task {
  /// Unique task name.
  pub name: String,
  /// The body, or `Unbound` when only the name is known.
  pub callable: TaskCallable,
  /// Default execution options, fully resolved at registration time.
  pub options: TaskOptions,
}

impl Task {
  /// Creates a task with a bound body.
  #[must_use]
  pub fn bound(name: impl Into<String>, func: TaskFn, options: TaskOptions) -> Self {
    Self {
      name: name.into(),
      callable: TaskCallable::Bound(func),
      options,
    }
  }

  /// Creates a name-only task with default options.
  #[must_use]
  pub fn unbound(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      callable: TaskCallable::Unbound,
      options: TaskOptions::default(),
    }
  }

  /// Binds this definition to one invocation's data.
  #[must_use]
  pub fn instantiate(&self, data: TaskData) -> TaskInstance {
    TaskInstance {
      task: self.clone(),
      data,
    }
  }
}

impl fmt::Display for Task {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Task[{}]", self.name)
  }
}

/// One invocation's parameters, with a generated unique `task_id`.
///
/// Immutable after creation, except for `graph` being swapped to a narrower
/// single-root view by the consumer during fan-out. This is exactly the shape
/// that crosses the wire; the task body itself never does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskData {
  /// Unique id of this invocation.
  pub task_id: Uuid,
  /// Positional arguments.
  pub args: Vec<Value>,
  /// Keyword arguments.
  pub kwds: HashMap<String, Value>,
  /// Destination queue.
  pub queue: String,
  /// Queue priority.
  pub priority: u8,
  /// Execution deadline.
  pub timeout: Option<Duration>,
  /// Queue time-to-live.
  pub ttl: Option<Duration>,
  /// Payload encryption flag, forwarded to the backend.
  pub encrypt: bool,
  /// Acknowledge after execution instead of before.
  pub ack_late: bool,
  /// Result time-to-live.
  pub result_ttl: Option<Duration>,
  /// Whether a result is pushed back to the backend.
  pub result_return: bool,
  /// Result encryption flag, forwarded to the backend.
  pub result_encrypt: bool,
  /// Run on a dedicated worker thread.
  pub thread: bool,
  /// Free-form metadata, round-tripped untouched.
  pub extra: HashMap<String, Value>,
  /// Attached single-root graph fragment, if this send is part of a chain.
  pub graph: Option<Graph>,
}

impl TaskData {
  /// Builds invocation data from merged options plus the call-site
  /// `encrypt`/`extra` overrides.
  #[must_use]
  pub fn from_options(
    options: &TaskOptions,
    overrides: &TaskOptionOverrides,
    args: Vec<Value>,
    kwds: HashMap<String, Value>,
  ) -> Self {
    Self {
      task_id: Uuid::new_v4(),
      args,
      kwds,
      queue: options.queue.clone(),
      priority: options.priority,
      timeout: options.timeout,
      ttl: options.ttl,
      encrypt: overrides.encrypt.unwrap_or(false),
      ack_late: options.ack_late,
      result_ttl: options.result_ttl,
      result_return: options.result_return,
      result_encrypt: options.result_encrypt,
      thread: options.thread,
      extra: overrides.extra.clone(),
      graph: None,
    }
  }
}

/// A [`Task`] definition bound to one invocation's [`TaskData`].
#[derive(Debug, Clone)]
pub struct TaskInstance {
  /// The definition being invoked.
  pub task: Task,
  /// The invocation parameters.
  pub data: TaskData,
}

impl TaskInstance {
  /// Invokes the bound body with this instance's args and kwds.
  ///
  /// Returns `None` when the task is [`TaskCallable::Unbound`]; the executor
  /// turns that into a not-found outcome.
  #[must_use]
  pub fn call(&self) -> Option<TaskFuture> {
    match &self.task.callable {
      TaskCallable::Bound(func) => Some(func(self.data.args.clone(), self.data.kwds.clone())),
      TaskCallable::Unbound => None,
    }
  }
}

impl fmt::Display for TaskInstance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "TaskInstance[{}({})]", self.task.name, self.data.task_id)
  }
}

/// Outcome of one executed [`TaskInstance`]: value or captured failure.
///
/// Created once per execution and immutable; either transmitted to the
/// backend or consumed locally. `res` and `exc` are mutually exclusive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResult {
  /// The return value on success.
  pub res: Option<Value>,
  /// The captured failure payload.
  pub exc: Option<ErrorPayload>,
  /// Trace text for the captured failure.
  pub trb: Option<String>,
}

impl TaskResult {
  /// Successful result.
  #[must_use]
  pub fn ok(value: Value) -> Self {
    Self {
      res: Some(value),
      exc: None,
      trb: None,
    }
  }

  /// Failed result with optional trace text.
  #[must_use]
  pub fn err(payload: ErrorPayload, trb: Option<String>) -> Self {
    Self {
      res: None,
      exc: Some(payload),
      trb,
    }
  }
}
