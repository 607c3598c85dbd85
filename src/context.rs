//! Per-invocation execution context: parsed history, replay-derived
//! simulated time, accumulated action batches, and the operation-descriptor
//! factory the workflow calls to obtain handles pre-reconciled against
//! history.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::decision::Action;
use crate::history::{self, EventType, HistoryEvent, OrchestratorInput};
use crate::task::{Combinator, Task, TaskFault, TaskOutcome, TaskSet, Yielded};
use crate::ContextError;

/// Mutable state for exactly one invocation of the replay driver. Created
/// fresh from the wire context, destroyed when the Decision is emitted;
/// nothing survives across invocations. Simulated time is derived strictly
/// from OrchestratorStarted timestamps in history, never from a real clock.
#[derive(Debug)]
pub struct ExecutionContext {
    histories: Vec<HistoryEvent>,
    input: Option<Value>,
    instance_id: Option<String>,
    is_replaying: bool,
    /// Index of the OrchestratorStarted event anchoring simulated time.
    decision_started: Option<usize>,
    current_time: Option<DateTime<Utc>>,
    actions: Vec<Vec<Action>>,
    custom_status: Option<Value>,
    /// Handle ids whose actions were already recorded this invocation.
    emitted: HashSet<u64>,
    next_task_id: u64,
}

impl ExecutionContext {
    /// Parse the host context blob and seed the simulated clock.
    pub fn from_context_str(context_string: &str) -> Result<Self, ContextError> {
        Ok(Self::from_input(OrchestratorInput::from_json(context_string)?))
    }

    pub fn from_input(parsed: OrchestratorInput) -> Self {
        let decision_started = history::initial_decision_started(&parsed.history);
        let current_time = decision_started.map(|i| parsed.history[i].timestamp);
        Self {
            histories: parsed.history,
            input: parsed.input,
            instance_id: parsed.instance_id,
            is_replaying: parsed.is_replaying,
            decision_started,
            current_time,
            actions: Vec::new(),
            custom_status: None,
            emitted: HashSet::new(),
            next_task_id: 0,
        }
    }

    /// The workflow's input payload, verbatim from the host.
    pub fn input(&self) -> Option<&Value> {
        self.input.as_ref()
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    pub fn is_replaying(&self) -> bool {
        self.is_replaying
    }

    pub fn history(&self) -> &[HistoryEvent] {
        &self.histories
    }

    /// Current simulated time. `None` means history does not yet contain a
    /// newer decision point; callers must treat that explicitly rather than
    /// fall back to an older timestamp.
    pub fn current_utc_datetime(&self) -> Option<DateTime<Utc>> {
        self.current_time
    }

    /// Opaque status echoed verbatim in every Decision.
    pub fn set_custom_status(&mut self, status: Value) {
        self.custom_status = Some(status);
    }

    pub fn custom_status(&self) -> Option<&Value> {
        self.custom_status.as_ref()
    }

    /// Re-anchor simulated time to the next unprocessed OrchestratorStarted
    /// strictly after the current anchor. When none exists the time becomes
    /// `None`; the anchor is kept so a later invocation re-derives the same
    /// sequence.
    pub(crate) fn advance_replay_clock(&mut self) {
        let last = match self.decision_started.map(|i| self.histories[i].timestamp) {
            Some(t) => t,
            None => return,
        };
        match history::next_decision_started(&self.histories, last) {
            Some(idx) => {
                self.decision_started = Some(idx);
                self.current_time = Some(self.histories[idx].timestamp);
            }
            None => self.current_time = None,
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_task_id;
        self.next_task_id += 1;
        id
    }

    // ---- operation-descriptor factory -------------------------------------

    /// Handle for an activity invocation, reconciled against history: adopt
    /// the first unprocessed TaskScheduled with this name, then resolve from
    /// its TaskCompleted/TaskFailed; otherwise pending with the CallActivity
    /// descriptor attached for scheduling.
    pub fn call_activity(&mut self, name: impl Into<String>, input: Value) -> Task {
        let name = name.into();
        match self.adopt_scheduled(EventType::TaskScheduled, &name) {
            Some(scheduled_id) => {
                let outcome = self.reconcile_completion(
                    scheduled_id,
                    EventType::TaskCompleted,
                    EventType::TaskFailed,
                );
                Task::new(self.next_id(), None, outcome)
            }
            None => {
                let action = Action::CallActivity {
                    function_name: name,
                    input,
                };
                Task::new(self.next_id(), Some(action), TaskOutcome::Pending)
            }
        }
    }

    /// Handle for a sub-orchestration call; same reconciliation shape as
    /// activities over the sub-orchestration event kinds.
    pub fn call_sub_orchestrator(
        &mut self,
        name: impl Into<String>,
        instance_id: Option<String>,
        input: Value,
    ) -> Task {
        let name = name.into();
        match self.adopt_scheduled(EventType::SubOrchestrationInstanceCreated, &name) {
            Some(scheduled_id) => {
                let outcome = self.reconcile_completion(
                    scheduled_id,
                    EventType::SubOrchestrationInstanceCompleted,
                    EventType::SubOrchestrationInstanceFailed,
                );
                Task::new(self.next_id(), None, outcome)
            }
            None => {
                let action = Action::CallSubOrchestrator {
                    function_name: name,
                    instance_id,
                    input,
                };
                Task::new(self.next_id(), Some(action), TaskOutcome::Pending)
            }
        }
    }

    /// Handle for a durable timer. Adopts the TimerCreated event matching
    /// `fire_at` and resolves once the paired TimerFired is present.
    pub fn create_timer(&mut self, fire_at: DateTime<Utc>) -> Task {
        let created = self.histories.iter().position(|e| {
            e.event_type == EventType::TimerCreated && !e.is_processed && e.fire_at == Some(fire_at)
        });
        match created {
            Some(idx) => {
                let timer_id = self.histories[idx].event_id;
                self.histories[idx].is_processed = true;
                let fired = self.histories.iter().position(|e| {
                    e.event_type == EventType::TimerFired
                        && !e.is_processed
                        && e.timer_id == Some(timer_id)
                });
                let outcome = match fired {
                    Some(fidx) => {
                        self.histories[fidx].is_processed = true;
                        TaskOutcome::Completed(Value::Null)
                    }
                    None => TaskOutcome::Pending,
                };
                Task::new(self.next_id(), None, outcome)
            }
            None => {
                let action = Action::CreateTimer {
                    fire_at,
                    is_canceled: false,
                };
                Task::new(self.next_id(), Some(action), TaskOutcome::Pending)
            }
        }
    }

    /// Handle for an external event subscription. There is no schedule-side
    /// history record for waits, so the descriptor is surfaced on every
    /// invocation until the matching EventRaised arrives.
    pub fn wait_for_external_event(&mut self, name: impl Into<String>) -> Task {
        let name = name.into();
        let raised = self.histories.iter().position(|e| {
            e.event_type == EventType::EventRaised
                && !e.is_processed
                && e.name.as_deref() == Some(name.as_str())
        });
        match raised {
            Some(idx) => {
                self.histories[idx].is_processed = true;
                let payload = self.histories[idx].input.clone().unwrap_or(Value::Null);
                Task::new(self.next_id(), None, TaskOutcome::Completed(payload))
            }
            None => {
                let action = Action::WaitForExternalEvent {
                    external_event_name: name,
                };
                Task::new(self.next_id(), Some(action), TaskOutcome::Pending)
            }
        }
    }

    /// Batch that completes when every member completes. Pure grouping: no
    /// context state is read or written until the batch is yielded.
    pub fn task_all(&self, tasks: Vec<Task>) -> TaskSet {
        TaskSet::new(Combinator::All, tasks)
    }

    /// Batch that completes with the first completed member.
    pub fn task_any(&self, tasks: Vec<Task>) -> TaskSet {
        TaskSet::new(Combinator::Any, tasks)
    }

    // ---- reconciliation helpers -------------------------------------------

    /// Adopt the first unprocessed schedule-kind event with a matching name,
    /// marking it processed so repeated operations with the same name pair
    /// with successive history records.
    fn adopt_scheduled(&mut self, kind: EventType, name: &str) -> Option<i64> {
        let idx = self
            .histories
            .iter()
            .position(|e| e.event_type == kind && !e.is_processed && e.name.as_deref() == Some(name))?;
        self.histories[idx].is_processed = true;
        Some(self.histories[idx].event_id)
    }

    /// Resolve a scheduled operation from its completion or failure event.
    fn reconcile_completion(
        &mut self,
        scheduled_id: i64,
        done_kind: EventType,
        fail_kind: EventType,
    ) -> TaskOutcome {
        let matches = |e: &HistoryEvent, kind: EventType| {
            e.event_type == kind && !e.is_processed && e.task_scheduled_id == Some(scheduled_id)
        };
        if let Some(idx) = self.histories.iter().position(|e| matches(e, done_kind)) {
            self.histories[idx].is_processed = true;
            return TaskOutcome::Completed(self.histories[idx].result.clone().unwrap_or(Value::Null));
        }
        if let Some(idx) = self.histories.iter().position(|e| matches(e, fail_kind)) {
            self.histories[idx].is_processed = true;
            let e = &self.histories[idx];
            let reason = e
                .reason
                .clone()
                .or_else(|| e.details.clone())
                .unwrap_or_else(|| format!("operation {scheduled_id} failed"));
            let mut fault = TaskFault::new(reason);
            fault.details = e.details.clone();
            return TaskOutcome::Faulted(fault);
        }
        TaskOutcome::Pending
    }

    // ---- action accumulation ----------------------------------------------

    /// Record the action descriptors of a yielded value, exactly once per
    /// handle per invocation no matter how many times the handle is
    /// observed. Single handles contribute a one-element batch; task sets
    /// contribute their unscheduled members as one batch.
    pub(crate) fn record_yielded(&mut self, yielded: &Yielded) {
        match yielded {
            Yielded::Task(t) => {
                if self.emitted.insert(t.id) {
                    if let Some(action) = &t.action {
                        self.actions.push(vec![action.clone()]);
                    }
                }
            }
            Yielded::Batch(set) => {
                let mut batch = Vec::new();
                for t in set.tasks() {
                    if self.emitted.insert(t.id) {
                        if let Some(action) = &t.action {
                            batch.push(action.clone());
                        }
                    }
                }
                if !batch.is_empty() {
                    self.actions.push(batch);
                }
            }
            Yielded::Idle => {}
        }
    }

    pub(crate) fn take_actions(&mut self) -> Vec<Vec<Action>> {
        std::mem::take(&mut self.actions)
    }

    pub(crate) fn take_custom_status(&mut self) -> Option<Value> {
        self.custom_status.take()
    }
}
