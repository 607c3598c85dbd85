//! Deterministic replay core for history-driven, checkpointed workflows.
//!
//! A host hands the engine a serialized context blob on every invocation:
//! the workflow's append-only event history plus its input. The engine
//! re-runs the workflow state machine from the start, feeding recorded
//! results back in instead of re-executing side effects, and stops at the
//! first point history cannot resolve. The output of each invocation is a
//! single [`Decision`]: the batches of operations the host must schedule,
//! plus completion state.
//!
//! ```no_run
//! use durable_replay::{ExecutionContext, Orchestrator, Step, Workflow, Yielded};
//! use serde_json::{json, Value};
//!
//! struct Hello {
//!     pc: usize,
//! }
//!
//! impl Workflow for Hello {
//!     fn resume(&mut self, ctx: &mut ExecutionContext, value: Option<Value>) -> Step {
//!         if self.pc == 0 {
//!             self.pc = 1;
//!             Step::Yield(Yielded::Task(ctx.call_activity("SayHello", json!("Tokyo"))))
//!         } else {
//!             Step::Done(value.unwrap_or(Value::Null))
//!         }
//!     }
//! }
//!
//! let orch = Orchestrator::new(|| Box::new(Hello { pc: 0 }) as Box<dyn Workflow>);
//! let decision_json = orch.handle(r#"{"history": []}"#).unwrap();
//! ```

use thiserror::Error;

pub mod context;
pub mod decision;
mod detect;
pub mod history;
pub mod orchestrator;
pub mod task;

pub use context::ExecutionContext;
pub use decision::{Action, Decision};
pub use history::{EventType, HistoryEvent, OrchestratorInput};
pub use orchestrator::{Orchestrator, Step, Workflow, WorkflowError};
pub use task::{should_suspend, Combinator, Task, TaskFault, TaskOutcome, TaskSet, Yielded};

/// Engine-level failure: the invocation could not produce a Decision at all.
/// Workflow failures never take this path; they are rendered into a failed
/// Decision instead.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("malformed execution context: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("failed to encode decision: {0}")]
    Encode(serde_json::Error),
}
