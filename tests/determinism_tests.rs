//! Determinism properties: replaying the same history must always yield the
//! same Decision, growing a history prefix must never change already-made
//! choices, and action descriptors must be recorded exactly once per handle
//! per invocation however often the workflow observes them.

use chrono::{DateTime, TimeZone, Utc};
use durable_replay::{
    EventType, ExecutionContext, HistoryEvent, Orchestrator, Step, Workflow, Yielded,
};
use serde_json::{json, Value};

// Install a default subscriber if none set (ok to call many times).
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .try_init();
}

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn started(secs: i64) -> HistoryEvent {
    HistoryEvent::new(EventType::OrchestratorStarted, -1, ts(secs))
}

fn scheduled(id: i64, name: &str, secs: i64) -> HistoryEvent {
    let mut e = HistoryEvent::new(EventType::TaskScheduled, id, ts(secs));
    e.name = Some(name.into());
    e
}

fn completed(scheduled_id: i64, result: Value, secs: i64) -> HistoryEvent {
    let mut e = HistoryEvent::new(EventType::TaskCompleted, -1, ts(secs));
    e.task_scheduled_id = Some(scheduled_id);
    e.result = Some(result);
    e
}

fn blob(history: &[HistoryEvent]) -> String {
    json!({
        "history": history,
        "instanceId": "det-1",
        "isReplaying": false,
    })
    .to_string()
}

// Chain of three dependent steps, each feeding the next.
struct Pipeline {
    pc: usize,
    carry: Value,
}

impl Pipeline {
    fn boxed() -> Box<dyn Workflow> {
        Box::new(Pipeline {
            pc: 0,
            carry: json!(1),
        })
    }
}

impl Workflow for Pipeline {
    fn resume(&mut self, ctx: &mut ExecutionContext, value: Option<Value>) -> Step {
        if let Some(v) = value {
            self.carry = v;
        }
        if self.pc < 3 {
            let task = ctx.call_activity("Double", self.carry.clone());
            self.pc += 1;
            Step::Yield(Yielded::Task(task))
        } else {
            Step::Done(self.carry.clone())
        }
    }
}

fn pipeline_history(steps: usize) -> Vec<HistoryEvent> {
    let mut h = vec![started(0)];
    let mut carry = 1i64;
    for i in 0..steps {
        let id = (i + 1) as i64;
        let secs = (i as i64) * 10;
        h.push(scheduled(id, "Double", secs + 1));
        carry *= 2;
        h.push(completed(id, json!(carry), secs + 2));
        h.push(started(secs + 10));
    }
    h
}

#[test]
fn same_history_same_decision_every_time() {
    init_tracing();
    let orch = Orchestrator::new(Pipeline::boxed);
    for steps in 0..=3 {
        let blob = blob(&pipeline_history(steps));
        let first = orch.handle(&blob).unwrap();
        for _ in 0..10 {
            assert_eq!(orch.handle(&blob).unwrap(), first);
        }
    }
}

#[test]
fn growing_history_preserves_earlier_choices() {
    init_tracing();
    let orch = Orchestrator::new(Pipeline::boxed);
    // Each prefix suspends with exactly one new call; the completed prefix
    // replays the same chain and finishes with 2^3.
    for steps in 0..3 {
        let d = orch.run(&blob(&pipeline_history(steps))).unwrap();
        assert!(!d.is_done());
        assert_eq!(d.actions().len(), 1);
        assert_eq!(d.actions()[0].len(), 1);
    }
    let d = orch.run(&blob(&pipeline_history(3))).unwrap();
    assert!(d.is_done());
    assert_eq!(d.output(), Some(&json!(8)));
}

// Observes the same handles in two successive yields: first racing them,
// then (after the race resolves) waiting for the stragglers. The driver must
// not re-record descriptors already surfaced this invocation.
struct DoubleObserver {
    pc: usize,
    held: Vec<durable_replay::Task>,
}

impl Workflow for DoubleObserver {
    fn resume(&mut self, ctx: &mut ExecutionContext, _value: Option<Value>) -> Step {
        if self.pc == 0 {
            self.pc = 1;
            let a = ctx.call_activity("A", json!(null));
            let b = ctx.call_activity("B", json!(null));
            self.held = vec![a.clone(), b.clone()];
            Step::Yield(Yielded::Batch(ctx.task_any(vec![a, b])))
        } else {
            self.pc += 1;
            let set = ctx.task_all(self.held.clone());
            Step::Yield(Yielded::Batch(set))
        }
    }
}

#[test]
fn actions_are_recorded_once_per_handle_per_invocation() {
    init_tracing();
    // A completed; B is still outstanding and is observed by both yields.
    let history = vec![
        started(0),
        scheduled(1, "A", 1),
        completed(1, json!("a"), 2),
        started(3),
    ];
    let orch =
        Orchestrator::new(|| Box::new(DoubleObserver { pc: 0, held: Vec::new() }) as Box<dyn Workflow>);
    let d = orch.run(&blob(&history)).unwrap();
    assert!(!d.is_done());
    // B's descriptor appears exactly once despite being yielded twice.
    assert_eq!(d.actions().len(), 1);
    assert_eq!(d.actions()[0].len(), 1);
}

// Branches on the simulated clock, never on a real one.
struct Deadline;

impl Workflow for Deadline {
    fn resume(&mut self, ctx: &mut ExecutionContext, _value: Option<Value>) -> Step {
        let cutoff = ts(100);
        match ctx.current_utc_datetime() {
            Some(now) if now >= cutoff => Step::Done(json!("expired")),
            Some(_) => Step::Done(json!("on time")),
            None => Step::Done(json!("time unknown")),
        }
    }
}

#[test]
fn simulated_time_branches_are_stable_across_replays() {
    init_tracing();
    let orch = Orchestrator::new(|| Box::new(Deadline) as Box<dyn Workflow>);
    let early = orch.run(&blob(&[started(50)])).unwrap();
    assert_eq!(early.output(), Some(&json!("on time")));
    // Completing without awaiting anything schedules nothing and carries no
    // error.
    assert!(early.is_done());
    assert!(early.actions().is_empty());
    assert!(early.error().is_none());
    let late = orch.run(&blob(&[started(150)])).unwrap();
    assert_eq!(late.output(), Some(&json!("expired")));
    assert!(late.actions().is_empty());
    // Same blob, same branch, forever.
    for _ in 0..5 {
        assert_eq!(
            orch.run(&blob(&[started(50)])).unwrap().output(),
            Some(&json!("on time"))
        );
    }
}
