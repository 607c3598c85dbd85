//! Replay driver: turns one serialized context blob into exactly one
//! Decision by re-running the workflow state machine from its start against
//! recorded history.
//!
//! Each invocation constructs a fresh workflow instance, feeds recorded
//! results through [`Workflow::resume`], and stops at the first yielded value
//! history cannot resolve. Faulted operations are re-injected through
//! [`Workflow::resume_with_fault`] at the await point, so failure surfaces
//! inside the workflow deterministically across replays.

use serde_json::Value;
use thiserror::Error;

use crate::context::ExecutionContext;
use crate::decision::Decision;
use crate::detect;
use crate::task::{TaskFault, TaskOutcome, Yielded};
use crate::ContextError;

/// Failure escaping the workflow itself. Rendered into the Decision's error
/// field; never a panic, never an engine error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct WorkflowError(pub String);

impl WorkflowError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<TaskFault> for WorkflowError {
    fn from(fault: TaskFault) -> Self {
        Self(fault.reason)
    }
}

/// What a workflow step hands back to the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// An operation (or batch) to resolve before the workflow can continue.
    Yield(Yielded),
    /// Normal completion with the workflow's output value.
    Done(Value),
    /// The workflow gave up; the invocation ends with a failed Decision.
    Failed(WorkflowError),
}

/// A deterministic workflow as an explicit resumable state machine.
///
/// The driver calls `resume(ctx, None)` to start, then `resume(ctx,
/// Some(result))` after each resolved yield. Implementations must be
/// deterministic: every decision derives from resumed values and the
/// context's simulated clock, never from ambient state, so that a replay
/// over the same history retraces the identical path.
pub trait Workflow {
    fn resume(&mut self, ctx: &mut ExecutionContext, value: Option<Value>) -> Step;

    /// Called instead of `resume` when the awaited operation faulted. The
    /// default treats any fault as unhandled and fails the workflow;
    /// override to recover or compensate.
    fn resume_with_fault(&mut self, ctx: &mut ExecutionContext, fault: TaskFault) -> Step {
        let _ = ctx;
        Step::Failed(fault.into())
    }
}

/// The replay engine for one workflow definition. Holds a factory rather
/// than an instance: every invocation replays from a pristine state machine.
pub struct Orchestrator {
    factory: Box<dyn Fn() -> Box<dyn Workflow> + Send + Sync>,
}

impl Orchestrator {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn Workflow> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
        }
    }

    /// String-in/string-out entry point: parse the context blob, replay, and
    /// serialize the resulting Decision.
    pub fn handle(&self, context_string: &str) -> Result<String, ContextError> {
        self.run(context_string)?.to_json_string()
    }

    /// Replay one invocation to a structured Decision. Workflow failures and
    /// malformed history become failed Decisions; only an unusable context
    /// blob is an `Err`.
    pub fn run(&self, context_string: &str) -> Result<Decision, ContextError> {
        let mut ctx = ExecutionContext::from_context_str(context_string)?;
        tracing::debug!(
            instance_id = ctx.instance_id().unwrap_or("<none>"),
            history_len = ctx.history().len(),
            "starting replay"
        );

        if let Some(problem) = detect::find_orphaned_completion(ctx.history()) {
            tracing::error!(problem = %problem, "rejecting corrupt history");
            return Ok(Decision::failed(problem, Vec::new(), None));
        }

        let mut workflow = (self.factory)();
        let mut step = workflow.resume(&mut ctx, None);
        loop {
            match step {
                Step::Yield(yielded) => {
                    ctx.record_yielded(&yielded);
                    step = match yielded.outcome() {
                        // Pending is the suspension condition: history cannot
                        // resolve this yield yet.
                        TaskOutcome::Pending => {
                            let decision =
                                Decision::suspended(ctx.take_actions(), ctx.take_custom_status());
                            tracing::debug!(
                                batches = decision.actions().len(),
                                "suspending until new history arrives"
                            );
                            return Ok(decision);
                        }
                        TaskOutcome::Completed(value) => {
                            ctx.advance_replay_clock();
                            workflow.resume(&mut ctx, Some(value))
                        }
                        TaskOutcome::Faulted(fault) => {
                            tracing::debug!(reason = %fault.reason, "re-injecting recorded fault");
                            workflow.resume_with_fault(&mut ctx, fault)
                        }
                    };
                }
                Step::Done(output) => {
                    tracing::debug!("workflow completed");
                    return Ok(Decision::completed(
                        output,
                        ctx.take_actions(),
                        ctx.take_custom_status(),
                    ));
                }
                Step::Failed(err) => {
                    tracing::warn!(error = %err, "workflow failed");
                    return Ok(Decision::failed(
                        err.to_string(),
                        ctx.take_actions(),
                        ctx.take_custom_status(),
                    ));
                }
            }
        }
    }
}
