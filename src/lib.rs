//! # taskweave
//!
//! Distributed task-queue client core: submit units of work to a message
//! backend, execute them locally under a bounded concurrency budget,
//! propagate results through a declared dependency graph, and retrieve
//! outcomes through a future-like handle.
//!
//! ## Components
//!
//! - [`registry::TaskRegistry`]: maps task names to definitions and default
//!   options.
//! - [`producer::Producer`]: turns a name plus arguments into a send and an
//!   [`async_result::AsyncResult`].
//! - [`consumer::Consumer`]: admission-controlled execution loop with graph
//!   fan-out.
//! - [`executor`]: inline and dedicated-thread execution strategies.
//! - [`backend`]: the transport boundary, with an in-process implementation.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::{Value, json};
//! use taskweave::backend::local::LocalBackend;
//! use taskweave::config::{ConsumerConfig, ProducerConfig};
//! use taskweave::consumer::Consumer;
//! use taskweave::producer::Producer;
//! use taskweave::registry::TaskRegistry;
//! use taskweave::task::{TaskOptionOverrides, task_fn};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(TaskRegistry::new());
//! registry.register(
//!   "add",
//!   task_fn(|args, _kwds| async move {
//!     let sum = args.iter().filter_map(Value::as_i64).sum::<i64>();
//!     Ok(json!(sum))
//!   }),
//!   TaskOptionOverrides::default(),
//! )?;
//!
//! let backend = Arc::new(LocalBackend::new(Arc::clone(&registry)));
//! let consumer = Consumer::new(ConsumerConfig::default(), Arc::clone(&registry), backend.clone());
//! consumer.consume_tasks().await?;
//!
//! let producer = Producer::new(ProducerConfig::default(), registry, backend);
//! let mut handle = producer
//!   .send_task("add", vec![json!(2), json!(3)], Default::default(), Default::default())
//!   .await?;
//! assert_eq!(handle.get().await?, json!(5));
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// Lazily-resolved result handle.
pub mod async_result;
/// Backend transport boundary and the in-process implementation.
pub mod backend;
/// Process-wide defaults and component configuration.
pub mod config;
/// Admission-controlled execution loop.
pub mod consumer;
/// Error taxonomy.
pub mod error;
/// Execution strategies.
pub mod executor;
/// Task dependency graphs.
pub mod graph;
/// Raw pub/sub messages.
pub mod message;
/// Task submission.
pub mod producer;
/// Explicit task registry.
pub mod registry;
/// Task definitions, invocation data and results.
pub mod task;

pub use async_result::AsyncResult;
pub use backend::Backend;
pub use config::{ConsumerConfig, ProducerConfig};
pub use consumer::Consumer;
pub use error::{BackendError, ErrorKind, ErrorPayload, GraphError, RegistryError, TaskError};
pub use executor::{Executor, InlineExecutor, WorkerThreadExecutor};
pub use graph::{Graph, NodeSpec};
pub use message::Message;
pub use producer::{MessageOptions, Producer};
pub use registry::TaskRegistry;
pub use task::{Task, TaskData, TaskInstance, TaskOptionOverrides, TaskOptions, TaskResult, task_fn};

#[cfg(test)]
mod test_util;

#[cfg(test)]
mod consumer_test;
#[cfg(test)]
mod graph_test;
#[cfg(test)]
mod task_test;
