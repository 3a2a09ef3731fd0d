//! Explicit task registry.
//!
//! Maps a task name to its definition and default execution options. The
//! registry is an ordinary object shared by reference (typically
//! `Arc<TaskRegistry>`) into producers, consumers and backends; there is no
//! process-global table. Options omitted at registration resolve from the
//! process-wide defaults once, at registration time, not at call time.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::info;

use crate::error::RegistryError;
use crate::task::{Task, TaskFn, TaskOptionOverrides, TaskOptions};

/// Name to [`Task`] table with duplicate-registration checking.
#[derive(Debug, Default)]
pub struct TaskRegistry {
  tasks: RwLock<HashMap<String, Task>>,
}

impl TaskRegistry {
  /// Creates an empty registry.
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers `func` under `name`, filling omitted options from the
  /// process-wide defaults.
  ///
  /// Fails with [`RegistryError::DuplicateTask`] if `name` is already
  /// present. Returns the immutable [`Task`] handle.
  pub fn register(
    &self,
    name: &str,
    func: TaskFn,
    overrides: TaskOptionOverrides,
  ) -> Result<Task, RegistryError> {
    let options = TaskOptions::default().merged(&overrides);
    let task = Task::bound(name, func, options);

    let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
    if tasks.contains_key(name) {
      return Err(RegistryError::DuplicateTask(name.to_string()));
    }
    tasks.insert(name.to_string(), task.clone());
    info!(task = %task, "registered");
    Ok(task)
  }

  /// Looks up a task definition by name.
  #[must_use]
  pub fn lookup(&self, name: &str) -> Option<Task> {
    self
      .tasks
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .get(name)
      .cloned()
  }
}
