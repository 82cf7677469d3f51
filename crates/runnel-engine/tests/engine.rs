mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
  Counter, Emit, Fail, FailWithPort, Fixed, FlowBuilder, Panics, Slow, assert_well_formed,
};
use futures::StreamExt;
use runnel_config::FlowDef;
use runnel_engine::{
  ChannelNotifier, Engine, EngineError, FlowEvent, FlowStatus, RunOptions,
};
use runnel_flow::Flow;
use runnel_state::{StateSlot, StateType};
use runnel_step::{StepOutcome, StepStatus};
use runnel_steps::builtin_registry;
use serde_json::{Map, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn flow_from_json(value: serde_json::Value) -> Flow {
  let def: FlowDef = serde_json::from_value(value).unwrap();
  Flow::from_def(&def, &builtin_registry()).unwrap()
}

#[tokio::test]
async fn test_state_flows_between_steps() {
  let flow = flow_from_json(json!({
    "flow_id": "chain",
    "name": "Chain",
    "steps": [
      { "step_id": "start", "type": "trigger_manual" },
      { "step_id": "set_x", "type": "set_state", "config": { "key": "x", "value": "5" } },
      { "step_id": "set_y", "type": "set_state", "config": { "key": "y", "value": "{{x}}" } }
    ],
    "edges": [
      { "from": "start", "to": "set_x" },
      { "from": "set_x", "to": "set_y" }
    ]
  }));

  let report = Engine::new(flow).run("start").unwrap().wait().await;

  assert_well_formed(&report);
  assert_eq!(report.status, FlowStatus::Succeeded);
  assert_eq!(report.state["y"], json!("5"));
  assert_eq!(report.invocations("set_y"), 1);

  let snapshot = report
    .events
    .iter()
    .find_map(|e| match e {
      FlowEvent::StepCompleted { step_id, state_snapshot, .. } if step_id == "set_x" => {
        Some(state_snapshot.clone())
      }
      _ => None,
    })
    .unwrap();
  assert_eq!(snapshot.get("x"), Some(&json!("5")));
  assert!(!snapshot.contains_key("y"));
}

#[tokio::test]
async fn test_conditional_takes_one_branch() {
  let flow = FlowBuilder::new()
    .builtin(
      "check",
      "conditional",
      json!({ "left": "admin", "operator": "equals", "right": "admin" }),
    )
    .builtin("allow", "set_state", json!({ "key": "access", "value": "granted" }))
    .builtin("deny", "set_state", json!({ "key": "access", "value": "denied" }))
    .edge("start", "check")
    .port_edge("check", "true", "allow")
    .port_edge("check", "false", "deny")
    .build();

  let report = Engine::new(flow).run("start").unwrap().wait().await;

  assert_well_formed(&report);
  assert_eq!(report.status, FlowStatus::Succeeded);
  assert_eq!(report.result("check").unwrap().ports, vec!["true"]);
  assert_eq!(report.state["access"], json!("granted"));
  assert_eq!(report.state["condition_result"], json!(true));
  assert!(report.result("deny").is_none());
  assert!(report.events.iter().all(|e| e.step_id() != Some("deny")));
}

#[tokio::test]
async fn test_switch_falls_back_to_default() {
  let flow = FlowBuilder::new()
    .builtin(
      "route",
      "switch",
      json!({ "value": "{{tier}}", "cases": [{ "name": "gold", "value": "gold" }] }),
    )
    .builtin("vip", "reply", json!({ "template": "welcome back" }))
    .builtin("standard", "reply", json!({ "template": "hello" }))
    .edge("start", "route")
    .port_edge("route", "gold", "vip")
    .edge("route", "standard")
    .build();

  let mut seed = Map::new();
  seed.insert("tier".to_string(), json!("bronze"));
  let report = Engine::new(flow)
    .run_with("start", RunOptions::new().with_state(seed))
    .unwrap()
    .wait()
    .await;

  assert_eq!(report.result("route").unwrap().ports, vec!["default"]);
  assert_eq!(report.state["matched_case"], json!(null));
  assert_eq!(report.state["reply"], json!("hello"));
  assert_eq!(report.invocations("vip"), 0);
}

#[tokio::test]
async fn test_unresolved_reference_fails_the_step() {
  let flow = FlowBuilder::new()
    .builtin("save", "set_state", json!({ "key": "y", "value": "{{missing.path}}" }))
    .edge("start", "save")
    .build();

  let report = Engine::new(flow).run("start").unwrap().wait().await;

  assert_well_formed(&report);
  assert_eq!(report.status, FlowStatus::Failed);
  assert_eq!(report.invocations("save"), 1);
  let result = report.result("save").unwrap();
  assert_eq!(result.status, StepStatus::Failed);
  let error = result.error.as_ref().unwrap();
  assert_eq!(error.code.as_deref(), Some("resolution_error"));
  assert!(error.message.contains("missing.path"));
  assert!(!report.state.contains_key("y"));
}

#[tokio::test]
async fn test_panic_is_converted_to_failure() {
  let flow = FlowBuilder::new()
    .step("explode", Panics)
    .step("after", Emit(json!({ "after": true })))
    .edge("start", "explode")
    .edge("explode", "after")
    .build();

  let report = Engine::new(flow).run("start").unwrap().wait().await;

  assert_well_formed(&report);
  assert_eq!(report.status, FlowStatus::Failed);
  let result = report.result("explode").unwrap();
  assert_eq!(result.status, StepStatus::Failed);
  assert_eq!(result.error.as_ref().unwrap().code.as_deref(), Some("panic"));
  assert!(result.error_message().unwrap().contains("kaboom"));
  // A failed arrival still triggers a NO_WAIT step.
  assert_eq!(report.state["after"], json!(true));
}

#[tokio::test]
async fn test_failure_activates_error_port() {
  let flow = FlowBuilder::new()
    .step("call", FailWithPort)
    .step("on_ok", Emit(json!({ "ok": true })))
    .step("on_error", Emit(json!({ "handled": true })))
    .edge("start", "call")
    .edge("call", "on_ok")
    .port_edge("call", "error", "on_error")
    .build();

  let report = Engine::new(flow).run("start").unwrap().wait().await;

  assert_eq!(report.result("call").unwrap().ports, vec!["error"]);
  assert_eq!(report.state["handled"], json!(true));
  assert_eq!(report.invocations("on_ok"), 0);
  assert_eq!(report.status, FlowStatus::Failed);
}

#[tokio::test]
async fn test_failed_step_does_not_stop_siblings() {
  let flow = FlowBuilder::new()
    .step("bad", Fail)
    .step("good", Emit(json!({ "good": 1 })))
    .edge("start", "bad")
    .edge("start", "good")
    .build();

  let report = Engine::new(flow).run("start").unwrap().wait().await;

  assert_well_formed(&report);
  assert_eq!(report.status, FlowStatus::Failed);
  assert_eq!(report.result("bad").unwrap().error_message(), Some("boom"));
  assert_eq!(report.result("good").unwrap().status, StepStatus::Succeeded);
}

#[tokio::test]
async fn test_external_cancel() {
  let flow = FlowBuilder::new()
    .step("wait", Slow(Duration::from_secs(30)))
    .step("after", Emit(json!({ "after": true })))
    .edge("start", "wait")
    .edge("wait", "after")
    .build();

  let cancel = CancellationToken::new();
  let run = Engine::new(flow)
    .run_with("start", RunOptions::new().with_cancel(cancel.clone()))
    .unwrap();
  let handle = tokio::spawn(run.wait());

  tokio::time::sleep(Duration::from_millis(50)).await;
  cancel.cancel();
  let report = tokio::time::timeout(Duration::from_secs(5), handle)
    .await
    .unwrap()
    .unwrap();

  assert_well_formed(&report);
  assert_eq!(report.status, FlowStatus::Cancelled);
  let waited = report.result("wait").unwrap();
  assert_eq!(waited.status, StepStatus::Skipped);
  assert_eq!(waited.skip_reason.as_deref(), Some("cancelled"));
  assert_eq!(report.invocations("after"), 0);
}

#[tokio::test]
async fn test_start_errors() {
  let flow = FlowBuilder::new()
    .step("a", Emit(json!({})))
    .edge("start", "a")
    .build();
  let engine = Engine::new(flow);

  assert!(matches!(engine.run("a"), Err(EngineError::NotATrigger { step_id }) if step_id == "a"));
  assert!(matches!(engine.run("zzz"), Err(EngineError::UnknownStep { .. })));
  assert_eq!(engine.default_trigger().unwrap().step_id, "start");
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
  let flow = flow_from_json(json!({
    "flow_id": "echo",
    "name": "Echo",
    "steps": [
      { "step_id": "start", "type": "trigger_manual" },
      { "step_id": "pause", "type": "delay", "config": { "seconds": 0.05 } },
      { "step_id": "save", "type": "set_state", "config": { "key": "echo", "value": "{{name}}" } }
    ],
    "edges": [
      { "from": "start", "to": "pause" },
      { "from": "pause", "to": "save" }
    ]
  }));
  let engine = Arc::new(Engine::new(flow));

  let runs: Vec<_> = ["ada", "grace", "linus"]
    .into_iter()
    .map(|name| {
      let mut seed = Map::new();
      seed.insert("name".to_string(), json!(name));
      let run = engine
        .run_with("start", RunOptions::new().with_state(seed))
        .unwrap();
      tokio::spawn(run.wait())
    })
    .collect();

  let mut run_ids = Vec::new();
  for (handle, name) in runs.into_iter().zip(["ada", "grace", "linus"]) {
    let report = handle.await.unwrap();
    assert_eq!(report.status, FlowStatus::Succeeded);
    assert_eq!(report.state["echo"], json!(name));
    run_ids.push(report.run_id);
  }
  run_ids.sort();
  run_ids.dedup();
  assert_eq!(run_ids.len(), 3);
}

#[tokio::test]
async fn test_event_stream_and_notifier_agree() {
  let flow = FlowBuilder::new()
    .builtin("save", "set_state", json!({ "key": "done", "value": true }))
    .edge("start", "save")
    .build();
  let (tx, mut rx) = mpsc::unbounded_channel();
  let engine = Engine::with_notifier(flow, ChannelNotifier::new(tx));

  let run = engine.run("start").unwrap();
  let run_id = run.run_id().to_string();
  let state = run.state().clone();
  let streamed: Vec<FlowEvent> = run.into_stream().collect().await;

  let mut notified = Vec::new();
  while let Ok(event) = rx.try_recv() {
    notified.push(event);
  }

  assert_eq!(streamed, notified);
  assert_eq!(streamed.len(), 6);
  assert!(streamed.iter().all(|e| e.run_id() == run_id));
  assert_eq!(state.get("done").unwrap(), json!(true));

  match &streamed[1] {
    FlowEvent::StepStarted { step_id, step_type, .. } => {
      assert_eq!(step_id, "start");
      assert_eq!(step_type, "test_start");
    }
    other => panic!("unexpected event {:?}", other),
  }
}

#[tokio::test]
async fn test_run_does_nothing_until_polled() {
  let flow = FlowBuilder::new()
    .step("a", Emit(json!({ "touched": true })))
    .edge("start", "a")
    .build();
  let engine = Engine::new(flow);

  let run = engine.run("start").unwrap();
  tokio::time::sleep(Duration::from_millis(20)).await;
  assert!(run.state().is_empty());

  let report = run.wait().await;
  assert_eq!(report.state["touched"], json!(true));
}

#[tokio::test]
async fn test_failed_output_merge_leaves_state_untouched() {
  let flow = FlowBuilder::new()
    .step("write", Emit(json!({ "a": 1, "name.first": "y" })))
    .edge("start", "write")
    .build();

  let mut seed = Map::new();
  seed.insert("name".to_string(), json!("scalar"));
  let report = Engine::new(flow)
    .run_with("start", RunOptions::new().with_state(seed))
    .unwrap()
    .wait()
    .await;

  assert_well_formed(&report);
  assert_eq!(report.status, FlowStatus::Failed);
  let result = report.result("write").unwrap();
  assert_eq!(result.status, StepStatus::Failed);
  assert_eq!(result.error.as_ref().unwrap().code.as_deref(), Some("state_error"));
  assert_eq!(report.state, *json!({ "name": "scalar" }).as_object().unwrap());
}

#[tokio::test]
async fn test_outputs_are_cast_to_typed_slots() {
  let flow = FlowBuilder::new()
    .step("count", Emit(json!({ "count": "7" })))
    .builtin(
      "route",
      "switch",
      json!({ "value": "bronze", "cases": [{ "name": "gold", "value": "gold" }] }),
    )
    .edge("start", "count")
    .edge("count", "route")
    .build();

  let options = RunOptions::new().with_slots(vec![
    StateSlot::new("count", StateType::Number),
    StateSlot::new("matched_case", StateType::Text),
  ]);
  let report = Engine::new(flow)
    .run_with("start", options)
    .unwrap()
    .wait()
    .await;

  assert_well_formed(&report);
  assert_eq!(report.status, FlowStatus::Succeeded);
  assert_eq!(report.state["count"], json!(7));
  assert_eq!(report.state["matched_case"], json!(null));
}

#[tokio::test]
async fn test_initial_state_must_fit_slots() {
  let flow = FlowBuilder::new().build();
  let mut seed = Map::new();
  seed.insert("count".to_string(), json!("many"));
  let options = RunOptions::new()
    .with_state(seed)
    .with_slots(vec![StateSlot::new("count", StateType::Number)]);

  assert!(matches!(
    Engine::new(flow).run_with("start", options),
    Err(EngineError::State(_))
  ));
}

#[tokio::test]
async fn test_fire_and_forget_does_not_route() {
  let after = Counter::default();
  let flow = FlowBuilder::new()
    .step(
      "notify",
      Fixed::new(StepOutcome::success(json!({ "sent": true })).without_waiting()),
    )
    .step("after", after.clone())
    .edge("start", "notify")
    .edge("notify", "after")
    .build();

  let report = Engine::new(flow).run("start").unwrap().wait().await;

  assert_well_formed(&report);
  assert_eq!(report.status, FlowStatus::Succeeded);
  let result = report.result("notify").unwrap();
  assert!(result.continue_without_waiting);
  assert_eq!(report.state["sent"], json!(true));
  assert_eq!(after.count(), 0);
  assert!(report.result("after").is_none());
}

#[tokio::test]
async fn test_undeclared_port_fails_the_step() {
  let after = Counter::default();
  let flow = FlowBuilder::new()
    .step("odd", Fixed::new(StepOutcome::success(json!({ "odd": 1 })).on_port("nope")))
    .step("after", after.clone())
    .edge("start", "odd")
    .edge("odd", "after")
    .build();

  let report = Engine::new(flow).run("start").unwrap().wait().await;

  let result = report.result("odd").unwrap();
  assert_eq!(result.status, StepStatus::Failed);
  assert_eq!(result.error.as_ref().unwrap().code.as_deref(), Some("invalid_port"));
  assert_eq!(result.ports, vec!["default"]);
  assert!(!report.state.contains_key("odd"));
  // The failure still arrives at the NO_WAIT step behind it.
  assert_eq!(after.count(), 1);
  assert_eq!(report.status, FlowStatus::Failed);
}

#[tokio::test]
async fn test_step_skip_activates_every_port() {
  let flow = FlowBuilder::new()
    .step("pick", Fixed::new(StepOutcome::skipped().on_port("left")).ports(&["left", "right"]))
    .step("l", Emit(json!({})))
    .step("r", Emit(json!({})))
    .edge("start", "pick")
    .port_edge("pick", "left", "l")
    .port_edge("pick", "right", "r")
    .build();

  let report = Engine::new(flow).run("start").unwrap().wait().await;

  assert_well_formed(&report);
  let pick = report.result("pick").unwrap();
  assert_eq!(pick.ports, vec!["left", "right"]);
  assert_eq!(pick.skip_reason.as_deref(), Some("skipped by step"));
  assert_eq!(report.result("l").unwrap().status, StepStatus::Skipped);
  assert_eq!(report.result("r").unwrap().status, StepStatus::Skipped);
  assert_eq!(report.status, FlowStatus::Succeeded);
}
