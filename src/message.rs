//! Raw pub/sub message envelope.
//!
//! Independent of the task machinery: a [`Message`] carries an arbitrary
//! payload to an exchange, outside the task-result contract.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config;

/// A raw message for pure pub/sub sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
  /// Unique message id.
  pub message_id: Uuid,
  /// Destination exchange.
  pub exchange: String,
  /// Arbitrary payload.
  pub data: Value,
  /// Delivery priority.
  pub priority: u8,
  /// Time-to-live on the queue.
  pub ttl: Option<Duration>,
}

impl Message {
  /// Creates a message with a fresh id and default priority/ttl.
  #[must_use]
  pub fn new(exchange: impl Into<String>, data: Value) -> Self {
    Self {
      message_id: Uuid::new_v4(),
      exchange: exchange.into(),
      data,
      priority: config::DEFAULT_TASK_PRIORITY,
      ttl: None,
    }
  }

  /// Sets the delivery priority.
  #[must_use]
  pub fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }

  /// Sets the time-to-live.
  #[must_use]
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = Some(ttl);
    self
  }
}

impl fmt::Display for Message {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Message[{}@{}]", self.message_id, self.exchange)
  }
}
