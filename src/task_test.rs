use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Value, json};

use crate::error::{ErrorKind, ErrorPayload};
use crate::graph::{Graph, NodeSpec};
use crate::task::{Task, TaskData, TaskOptionOverrides, TaskOptions, TaskResult, task_fn};

#[test]
fn test_options_merge_precedence() {
  let registered = TaskOptions::default().merged(
    &TaskOptionOverrides::default()
      .with_queue("bulk")
      .with_priority(7),
  );
  assert_eq!(registered.queue, "bulk");
  assert_eq!(registered.priority, 7);

  // Call-site overrides win over registered values, untouched fields keep
  // the registered ones.
  let call_site = registered.merged(&TaskOptionOverrides::default().with_priority(9));
  assert_eq!(call_site.queue, "bulk");
  assert_eq!(call_site.priority, 9);
}

#[test]
fn test_task_data_from_options() {
  let overrides = TaskOptionOverrides::default()
    .with_encrypt(true)
    .with_extra("tenant", json!("acme"));
  let options = TaskOptions::default().merged(&overrides);
  let data = TaskData::from_options(&options, &overrides, vec![json!(1)], HashMap::new());

  assert_eq!(data.args, vec![json!(1)]);
  assert!(data.encrypt);
  assert_eq!(data.extra.get("tenant"), Some(&json!("acme")));
  assert!(data.graph.is_none());
}

#[test]
fn test_task_data_ids_are_unique() {
  let options = TaskOptions::default();
  let overrides = TaskOptionOverrides::default();
  let a = TaskData::from_options(&options, &overrides, Vec::new(), HashMap::new());
  let b = TaskData::from_options(&options, &overrides, Vec::new(), HashMap::new());
  assert_ne!(a.task_id, b.task_id);
}

#[tokio::test]
async fn test_instance_call_invokes_body() {
  let task = Task::bound(
    "sum",
    task_fn(|args, _kwds| async move {
      let sum = args.iter().filter_map(Value::as_i64).sum::<i64>();
      Ok(json!(sum))
    }),
    TaskOptions::default(),
  );
  let data = TaskData::from_options(
    &task.options,
    &TaskOptionOverrides::default(),
    vec![json!(2), json!(3)],
    HashMap::new(),
  );
  let instance = task.instantiate(data);

  let value = instance.call().unwrap().await.unwrap();
  assert_eq!(value, json!(5));
}

#[test]
fn test_unbound_instance_has_no_body() {
  let task = Task::unbound("elsewhere");
  let data = TaskData::from_options(
    &task.options,
    &TaskOptionOverrides::default(),
    Vec::new(),
    HashMap::new(),
  );
  assert!(task.instantiate(data).call().is_none());
}

#[test]
fn test_task_data_wire_roundtrip() {
  let mut graph = Graph::new("g");
  graph.add_node("a", NodeSpec::new("first")).unwrap();
  graph.add_root("a").unwrap();

  let overrides = TaskOptionOverrides::default()
    .with_timeout(Duration::from_secs(30))
    .with_result_return(false)
    .with_extra("k", json!([1, 2]));
  let options = TaskOptions::default().merged(&overrides);
  let mut data = TaskData::from_options(
    &options,
    &overrides,
    vec![json!("x")],
    HashMap::from([("n".to_string(), json!(1))]),
  );
  data.graph = Some(graph);

  let wire = serde_json::to_string(&data).unwrap();
  let decoded: TaskData = serde_json::from_str(&wire).unwrap();

  assert_eq!(decoded.task_id, data.task_id);
  assert_eq!(decoded.args, data.args);
  assert_eq!(decoded.kwds, data.kwds);
  assert_eq!(decoded.timeout, Some(Duration::from_secs(30)));
  assert!(!decoded.result_return);
  assert_eq!(decoded.extra, data.extra);
  let decoded_graph = decoded.graph.unwrap();
  assert_eq!(decoded_graph.roots().len(), 1);
  assert!(decoded_graph.node("a").is_some());
}

#[test]
fn test_task_result_wire_roundtrip() {
  let failed = TaskResult::err(
    ErrorPayload::not_found("missing"),
    Some("missing\ncaused by: nothing".to_string()),
  );
  let wire = serde_json::to_string(&failed).unwrap();
  let decoded: TaskResult = serde_json::from_str(&wire).unwrap();

  assert!(decoded.res.is_none());
  let exc = decoded.exc.unwrap();
  assert_eq!(exc.kind, ErrorKind::NotFound);
  assert!(decoded.trb.unwrap().contains("caused by"));
}
