//! Process-wide option defaults and component configuration.
//!
//! Options omitted at registration time resolve from the constants below via
//! [`TaskOptions::default`](crate::task::TaskOptions); loading them from the
//! environment or a file is deliberately outside this core.

use std::time::Duration;

/// Default queue for task sends.
pub const DEFAULT_TASK_QUEUE: &str = "taskweave.tasks";
/// Default task priority.
pub const DEFAULT_TASK_PRIORITY: u8 = 1;
/// Default task execution deadline.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(300);
/// Default task time-to-live on the queue.
pub const DEFAULT_TASK_TTL: Duration = Duration::from_secs(300);
/// Default acknowledgement mode: ack before execution.
pub const DEFAULT_TASK_ACK_LATE: bool = false;
/// Default result time-to-live.
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(300);
/// Default result mode: results are pushed back to the backend.
pub const DEFAULT_RESULT_RETURN: bool = true;
/// Default result encryption flag.
pub const DEFAULT_RESULT_ENCRYPT: bool = false;
/// Default execution strategy: inline on the shared loop.
pub const DEFAULT_TASK_THREAD: bool = false;

/// Default exchange used by message sends when none is given.
pub const DEFAULT_EXCHANGE: &str = "taskweave";

/// Default hard ceiling on concurrently in-flight tasks and messages.
pub const DEFAULT_POOL_SIZE: usize = 100;

/// Configuration for a [`Producer`](crate::producer::Producer).
#[derive(Debug, Clone)]
pub struct ProducerConfig {
  /// Exchange used for raw message sends without an explicit exchange.
  pub exchange: String,
}

impl Default for ProducerConfig {
  fn default() -> Self {
    Self {
      exchange: DEFAULT_EXCHANGE.to_string(),
    }
  }
}

impl ProducerConfig {
  /// Sets the default exchange for message sends.
  #[must_use]
  pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
    self.exchange = exchange.into();
    self
  }
}

/// Configuration for a [`Consumer`](crate::consumer::Consumer).
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
  /// Task queues to subscribe to. Empty means task consumption is disabled.
  pub task_queues: Vec<String>,
  /// Message queues to subscribe to. Empty means message consumption is
  /// disabled.
  pub message_queues: Vec<String>,
  /// Hard ceiling on concurrently in-flight tasks plus messages.
  pub pool_size: usize,
}

impl Default for ConsumerConfig {
  fn default() -> Self {
    Self {
      task_queues: vec![DEFAULT_TASK_QUEUE.to_string()],
      message_queues: Vec::new(),
      pool_size: DEFAULT_POOL_SIZE,
    }
  }
}

impl ConsumerConfig {
  /// Sets the task queues to consume from.
  #[must_use]
  pub fn with_task_queues(mut self, queues: Vec<String>) -> Self {
    self.task_queues = queues;
    self
  }

  /// Sets the message queues to consume from.
  #[must_use]
  pub fn with_message_queues(mut self, queues: Vec<String>) -> Self {
    self.message_queues = queues;
    self
  }

  /// Sets the concurrency ceiling.
  #[must_use]
  pub fn with_pool_size(mut self, pool_size: usize) -> Self {
    self.pool_size = pool_size;
    self
  }
}
