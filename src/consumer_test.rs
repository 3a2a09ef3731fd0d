use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use crate::backend::local::LocalBackend;
use crate::config::{ConsumerConfig, ProducerConfig};
use crate::consumer::{Consumer, GRAPH_SOURCE_NODE};
use crate::graph::{Graph, NodeSpec};
use crate::producer::Producer;
use crate::registry::TaskRegistry;
use crate::task::{TaskOptionOverrides, task_fn};

struct Fixture {
  registry: Arc<TaskRegistry>,
  backend: Arc<LocalBackend>,
  consumer: Consumer,
  producer: Producer,
}

fn fixture(pool_size: usize) -> Fixture {
  let registry = Arc::new(TaskRegistry::new());
  let backend = Arc::new(LocalBackend::new(Arc::clone(&registry)));
  let consumer = Consumer::new(
    ConsumerConfig::default().with_pool_size(pool_size),
    Arc::clone(&registry),
    backend.clone(),
  );
  let producer = Producer::new(
    ProducerConfig::default(),
    Arc::clone(&registry),
    backend.clone(),
  );
  Fixture {
    registry,
    backend,
    consumer,
    producer,
  }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
  for _ in 0..500 {
    if cond() {
      return;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  panic!("condition not met in time");
}

#[tokio::test]
async fn test_delivered_task_executes_and_pushes_result() {
  let f = fixture(8);
  f.registry
    .register(
      "add",
      task_fn(|args, _kwds| async move {
        let sum = args.iter().filter_map(Value::as_i64).sum::<i64>();
        Ok(json!(sum))
      }),
      TaskOptionOverrides::default(),
    )
    .unwrap();
  f.consumer.consume_tasks().await.unwrap();

  let mut handle = f
    .producer
    .send_task("add", vec![json!(2), json!(3)], HashMap::new(), TaskOptionOverrides::default())
    .await
    .unwrap();

  assert_eq!(handle.get().await.unwrap(), json!(5));
  let _ = f.backend; // keep the broker alive for the whole exchange
}

#[tokio::test]
async fn test_in_flight_never_exceeds_pool_size() {
  let f = fixture(3);
  let current = Arc::new(AtomicUsize::new(0));
  let max_seen = Arc::new(AtomicUsize::new(0));
  let done = Arc::new(AtomicUsize::new(0));

  let (current2, max2, done2) = (current.clone(), max_seen.clone(), done.clone());
  f.registry
    .register(
      "occupy",
      task_fn(move |_args, _kwds| {
        let current = current2.clone();
        let max_seen = max2.clone();
        let done = done2.clone();
        async move {
          let running = current.fetch_add(1, Ordering::SeqCst) + 1;
          max_seen.fetch_max(running, Ordering::SeqCst);
          tokio::time::sleep(Duration::from_millis(20)).await;
          current.fetch_sub(1, Ordering::SeqCst);
          done.fetch_add(1, Ordering::SeqCst);
          Ok(json!(null))
        }
      }),
      TaskOptionOverrides::default().with_result_return(false),
    )
    .unwrap();
  f.consumer.consume_tasks().await.unwrap();

  for _ in 0..10 {
    f.producer
      .send_task("occupy", Vec::new(), HashMap::new(), TaskOptionOverrides::default())
      .await
      .unwrap();
  }

  wait_until(|| done.load(Ordering::SeqCst) == 10).await;
  assert!(
    max_seen.load(Ordering::SeqCst) <= 3,
    "observed {} concurrent executions",
    max_seen.load(Ordering::SeqCst)
  );

  // Completed tasks remove themselves from the tracking table.
  for _ in 0..500 {
    if f.consumer.in_flight().await == 0 {
      break;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  assert_eq!(f.consumer.in_flight().await, 0);
}

#[tokio::test]
async fn test_graph_chain_is_strictly_staged() {
  let f = fixture(8);
  let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

  let ev = events.clone();
  f.registry
    .register(
      "first",
      task_fn(move |_args, _kwds| {
        let ev = ev.clone();
        async move {
          ev.lock().unwrap().push("a:run".to_string());
          Ok(json!(1))
        }
      }),
      TaskOptionOverrides::default().with_result_return(false),
    )
    .unwrap();

  let ev = events.clone();
  f.registry
    .register(
      "second",
      task_fn(move |args, kwds| {
        let ev = ev.clone();
        async move {
          ev.lock().unwrap().push(format!(
            "b:start args={} source={}",
            args[0],
            kwds.get(GRAPH_SOURCE_NODE).cloned().unwrap_or(Value::Null)
          ));
          tokio::time::sleep(Duration::from_millis(30)).await;
          ev.lock().unwrap().push("b:end".to_string());
          Ok(json!(2))
        }
      }),
      TaskOptionOverrides::default().with_result_return(false),
    )
    .unwrap();

  let ev = events.clone();
  f.registry
    .register(
      "third",
      task_fn(move |args, _kwds| {
        let ev = ev.clone();
        async move {
          ev.lock().unwrap().push(format!("c:start args={}", args[0]));
          Ok(json!(3))
        }
      }),
      TaskOptionOverrides::default().with_result_return(false),
    )
    .unwrap();

  f.consumer.consume_tasks().await.unwrap();

  let mut graph = Graph::new("chain");
  graph.add_node("a", NodeSpec::new("first")).unwrap();
  graph.add_node("b", NodeSpec::new("second")).unwrap();
  graph.add_node("c", NodeSpec::new("third")).unwrap();
  graph.add_edge("a", "b").unwrap();
  graph.add_edge("b", "c").unwrap();
  graph.add_root("a").unwrap();

  f.producer
    .send_graph(&graph, Vec::new(), HashMap::new())
    .await
    .unwrap();

  wait_until(|| {
    events
      .lock()
      .unwrap()
      .iter()
      .any(|e| e.starts_with("c:start"))
  })
  .await;

  let log = events.lock().unwrap().clone();
  // B ran exactly once, fed by A's result and told who fed it.
  let b_starts: Vec<&String> = log.iter().filter(|e| e.starts_with("b:start")).collect();
  assert_eq!(b_starts.len(), 1);
  assert_eq!(b_starts[0], "b:start args=1 source=\"a\"");
  // C was only submitted after B's execution finished, with B's result.
  let b_end = log.iter().position(|e| e == "b:end").unwrap();
  let c_start = log.iter().position(|e| e.starts_with("c:start")).unwrap();
  assert!(b_end < c_start, "c started before b finished: {log:?}");
  assert_eq!(log[c_start], "c:start args=2");
}

#[tokio::test]
async fn test_stop_consume_tasks_cancels_in_flight_work() {
  let f = fixture(10);
  f.registry
    .register(
      "hang",
      task_fn(|_args, _kwds| async {
        futures::future::pending::<()>().await;
        Ok(json!(null))
      }),
      TaskOptionOverrides::default().with_result_return(false),
    )
    .unwrap();
  f.consumer.consume_tasks().await.unwrap();

  for _ in 0..4 {
    f.producer
      .send_task("hang", Vec::new(), HashMap::new(), TaskOptionOverrides::default())
      .await
      .unwrap();
  }

  for _ in 0..500 {
    if f.consumer.in_flight().await == 4 {
      break;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  assert_eq!(f.consumer.in_flight().await, 4);

  f.consumer.stop_consume_tasks().await;
  assert_eq!(f.consumer.in_flight().await, 0);
}

#[tokio::test]
async fn test_message_hook_receives_deliveries() {
  let registry = Arc::new(TaskRegistry::new());
  let backend = Arc::new(LocalBackend::new(Arc::clone(&registry)));
  let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));

  let seen2 = seen.clone();
  let consumer = Consumer::with_message_handler(
    ConsumerConfig::default().with_message_queues(vec!["events".to_string()]),
    Arc::clone(&registry),
    backend.clone(),
    Arc::new(move |message| {
      let seen = seen2.clone();
      Box::pin(async move {
        seen.lock().unwrap().push(message.data);
      })
    }),
  );
  consumer.consume_messages().await.unwrap();

  let producer = Producer::new(ProducerConfig::default(), registry, backend);
  producer
    .send_message(
      json!({"event": "ping"}),
      crate::producer::MessageOptions::default().with_routing_key("events"),
    )
    .await
    .unwrap();

  wait_until(|| !seen.lock().unwrap().is_empty()).await;
  assert_eq!(seen.lock().unwrap()[0], json!({"event": "ping"}));
}
