//! Operation handles: single tasks, batched task sets, and the suspension
//! predicate the replay driver applies to each yielded value.

use serde_json::Value;

use crate::decision::Action;

/// Recorded failure of a scheduled operation, re-injected into the workflow
/// at the point the operation was awaited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFault {
    pub reason: String,
    pub details: Option<String>,
}

impl TaskFault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            details: None,
        }
    }

    pub fn with_details(reason: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            details: Some(details.into()),
        }
    }
}

impl std::fmt::Display for TaskFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Outcome of one handle, reconciled against history. A handle moves
/// Pending -> Completed or Pending -> Faulted at most once and never reverts.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Pending,
    Completed(Value),
    Faulted(TaskFault),
}

impl TaskOutcome {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, TaskOutcome::Pending)
    }
}

/// A single pending or resolved asynchronous operation. Carries the action
/// descriptor to surface to the host when the operation is not yet
/// represented in history; the driver records that action exactly once per
/// handle per invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub(crate) id: u64,
    pub(crate) action: Option<Action>,
    pub(crate) outcome: TaskOutcome,
}

impl Task {
    pub(crate) fn new(id: u64, action: Option<Action>, outcome: TaskOutcome) -> Self {
        Self { id, action, outcome }
    }

    pub fn outcome(&self) -> &TaskOutcome {
        &self.outcome
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Pending)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Completed(_))
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Faulted(_))
    }

    /// The completion payload, when resolved successfully.
    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            TaskOutcome::Completed(v) => Some(v),
            _ => None,
        }
    }
}

/// Aggregate policy for a task set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Completed when every member completes; faulted as soon as any member
    /// faults (first fault in member order wins).
    All,
    /// Completed with the first completed member's result (member order);
    /// faulted only when every member has faulted.
    Any,
}

/// An ordered collection of handles evaluated together under one combinator.
/// Member actions not yet represented in history are surfaced for scheduling
/// as a single batch, independent of whether the set itself has resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSet {
    pub(crate) combinator: Combinator,
    pub(crate) tasks: Vec<Task>,
}

impl TaskSet {
    pub(crate) fn new(combinator: Combinator, tasks: Vec<Task>) -> Self {
        Self { combinator, tasks }
    }

    pub fn combinator(&self) -> Combinator {
        self.combinator
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Aggregate outcome per the declared combinator.
    pub fn outcome(&self) -> TaskOutcome {
        match self.combinator {
            Combinator::All => {
                for t in &self.tasks {
                    if let TaskOutcome::Faulted(fault) = &t.outcome {
                        return TaskOutcome::Faulted(fault.clone());
                    }
                }
                if self.tasks.iter().all(Task::is_completed) {
                    let results = self
                        .tasks
                        .iter()
                        .map(|t| match &t.outcome {
                            TaskOutcome::Completed(v) => v.clone(),
                            _ => Value::Null,
                        })
                        .collect();
                    TaskOutcome::Completed(Value::Array(results))
                } else {
                    TaskOutcome::Pending
                }
            }
            Combinator::Any => {
                for t in &self.tasks {
                    if let TaskOutcome::Completed(v) = &t.outcome {
                        return TaskOutcome::Completed(v.clone());
                    }
                }
                if !self.tasks.is_empty() && self.tasks.iter().all(Task::is_faulted) {
                    let first = self
                        .tasks
                        .iter()
                        .find_map(|t| match &t.outcome {
                            TaskOutcome::Faulted(f) => Some(f.clone()),
                            _ => None,
                        })
                        .unwrap_or_else(|| TaskFault::new("all tasks faulted"));
                    TaskOutcome::Faulted(first)
                } else {
                    TaskOutcome::Pending
                }
            }
        }
    }
}

/// The value a workflow step yields back to the driver, matched exhaustively
/// each step.
#[derive(Debug, Clone, PartialEq)]
pub enum Yielded {
    Task(Task),
    Batch(TaskSet),
    /// Nothing to resolve until new history arrives; always suspends.
    Idle,
}

impl Yielded {
    pub(crate) fn outcome(&self) -> TaskOutcome {
        match self {
            Yielded::Task(t) => t.outcome.clone(),
            Yielded::Batch(s) => s.outcome(),
            Yielded::Idle => TaskOutcome::Pending,
        }
    }
}

/// Pure suspension predicate over the most recently yielded value: suspend on
/// pending handles/batches and on the idle sentinel. Resolved values never
/// suspend; faulted values are fed back into the workflow as errors instead.
pub fn should_suspend(yielded: &Yielded) -> bool {
    !yielded.outcome().is_resolved()
}
