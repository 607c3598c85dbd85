//! History model: the append-only event log supplied by the host.
//!
//! Every invocation receives the entire history so far as one serialized
//! context blob. Events are parsed once, never mutated afterwards except for
//! the engine-local processed marking used while pairing schedule events with
//! their completions during replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Integer-coded event kind, matching the host protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum EventType {
    ExecutionStarted,
    ExecutionCompleted,
    ExecutionFailed,
    ExecutionTerminated,
    TaskScheduled,
    TaskCompleted,
    TaskFailed,
    SubOrchestrationInstanceCreated,
    SubOrchestrationInstanceCompleted,
    SubOrchestrationInstanceFailed,
    TimerCreated,
    TimerFired,
    OrchestratorStarted,
    OrchestratorCompleted,
    EventSent,
    EventRaised,
    ContinueAsNew,
    GenericEvent,
    HistoryState,
}

impl From<EventType> for i32 {
    fn from(t: EventType) -> i32 {
        match t {
            EventType::ExecutionStarted => 0,
            EventType::ExecutionCompleted => 1,
            EventType::ExecutionFailed => 2,
            EventType::ExecutionTerminated => 3,
            EventType::TaskScheduled => 4,
            EventType::TaskCompleted => 5,
            EventType::TaskFailed => 6,
            EventType::SubOrchestrationInstanceCreated => 7,
            EventType::SubOrchestrationInstanceCompleted => 8,
            EventType::SubOrchestrationInstanceFailed => 9,
            EventType::TimerCreated => 10,
            EventType::TimerFired => 11,
            EventType::OrchestratorStarted => 12,
            EventType::OrchestratorCompleted => 13,
            EventType::EventSent => 14,
            EventType::EventRaised => 15,
            EventType::ContinueAsNew => 16,
            EventType::GenericEvent => 17,
            EventType::HistoryState => 18,
        }
    }
}

impl TryFrom<i32> for EventType {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => EventType::ExecutionStarted,
            1 => EventType::ExecutionCompleted,
            2 => EventType::ExecutionFailed,
            3 => EventType::ExecutionTerminated,
            4 => EventType::TaskScheduled,
            5 => EventType::TaskCompleted,
            6 => EventType::TaskFailed,
            7 => EventType::SubOrchestrationInstanceCreated,
            8 => EventType::SubOrchestrationInstanceCompleted,
            9 => EventType::SubOrchestrationInstanceFailed,
            10 => EventType::TimerCreated,
            11 => EventType::TimerFired,
            12 => EventType::OrchestratorStarted,
            13 => EventType::OrchestratorCompleted,
            14 => EventType::EventSent,
            15 => EventType::EventRaised,
            16 => EventType::ContinueAsNew,
            17 => EventType::GenericEvent,
            18 => EventType::HistoryState,
            other => return Err(format!("unknown history event type code {other}")),
        })
    }
}

fn default_event_id() -> i64 {
    -1
}

/// One record from the append-only log. The host serializes events with
/// PascalCase keys; payload fields are populated per event type and left
/// `None` otherwise. User payloads (`input`, `result`) pass through as
/// opaque JSON values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct HistoryEvent {
    pub event_type: EventType,
    #[serde(default = "default_event_id")]
    pub event_id: i64,
    #[serde(default)]
    pub is_processed: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_scheduled_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fire_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl HistoryEvent {
    /// Bare event with only the fields every record carries.
    pub fn new(event_type: EventType, event_id: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type,
            event_id,
            is_processed: false,
            timestamp,
            name: None,
            input: None,
            result: None,
            task_scheduled_id: None,
            timer_id: None,
            fire_at: None,
            instance_id: None,
            reason: None,
            details: None,
        }
    }
}

/// The context blob the host hands to the engine on every invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorInput {
    #[serde(default)]
    pub history: Vec<HistoryEvent>,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub is_replaying: bool,
}

impl OrchestratorInput {
    pub fn from_json(context_string: &str) -> Result<Self, crate::ContextError> {
        serde_json::from_str(context_string).map_err(crate::ContextError::Malformed)
    }
}

/// Index of the first event not yet marked processed, or `history.len()`
/// when everything has been consumed by earlier decisions.
pub(crate) fn earliest_unprocessed(history: &[HistoryEvent]) -> usize {
    history
        .iter()
        .position(|e| !e.is_processed)
        .unwrap_or(history.len())
}

/// The first OrchestratorStarted event at or before the earliest unprocessed
/// point; this anchors simulated time at the start of an invocation.
pub(crate) fn initial_decision_started(history: &[HistoryEvent]) -> Option<usize> {
    let bound = earliest_unprocessed(history).min(history.len().saturating_sub(1));
    history
        .iter()
        .take(bound + 1)
        .position(|e| e.event_type == EventType::OrchestratorStarted)
}

/// The next unprocessed OrchestratorStarted strictly after timestamp `after`.
/// `None` means history does not yet contain the data needed to advance
/// simulated time; that is a signal, not an error.
pub(crate) fn next_decision_started(history: &[HistoryEvent], after: DateTime<Utc>) -> Option<usize> {
    history.iter().position(|e| {
        e.event_type == EventType::OrchestratorStarted && !e.is_processed && e.timestamp > after
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn event_type_codes_round_trip() {
        for code in 0..=18 {
            let t = EventType::try_from(code).unwrap();
            assert_eq!(i32::from(t), code);
        }
        assert!(EventType::try_from(42).is_err());
    }

    #[test]
    fn parses_host_context_blob() {
        let blob = r#"{
            "history": [
                {"EventType": 12, "EventId": -1, "IsProcessed": false,
                 "Timestamp": "2020-01-01T05:00:00Z"},
                {"EventType": 4, "EventId": 1, "IsProcessed": false,
                 "Timestamp": "2020-01-01T05:00:01Z", "Name": "Hello",
                 "Input": "\"Tokyo\""}
            ],
            "input": 7,
            "instanceId": "abc123",
            "isReplaying": true
        }"#;
        let parsed = OrchestratorInput::from_json(blob).unwrap();
        assert_eq!(parsed.history.len(), 2);
        assert_eq!(parsed.history[0].event_type, EventType::OrchestratorStarted);
        assert_eq!(parsed.history[1].name.as_deref(), Some("Hello"));
        assert_eq!(parsed.input, Some(serde_json::json!(7)));
        assert_eq!(parsed.instance_id.as_deref(), Some("abc123"));
        assert!(parsed.is_replaying);
    }

    #[test]
    fn malformed_blob_is_a_context_error() {
        assert!(OrchestratorInput::from_json("{not json").is_err());
        // An unknown event type code is a malformed blob as well.
        let blob = r#"{"history": [{"EventType": 99, "Timestamp": "2020-01-01T00:00:00Z"}]}"#;
        assert!(OrchestratorInput::from_json(blob).is_err());
    }

    #[test]
    fn initial_anchor_is_first_started_before_unprocessed_point() {
        let mut h = vec![
            HistoryEvent::new(EventType::OrchestratorStarted, -1, ts(0)),
            HistoryEvent::new(EventType::TaskScheduled, 1, ts(1)),
            HistoryEvent::new(EventType::TaskCompleted, 2, ts(2)),
        ];
        assert_eq!(initial_decision_started(&h), Some(0));
        // Fully processed history still anchors on the first started event.
        for e in &mut h {
            e.is_processed = true;
        }
        assert_eq!(initial_decision_started(&h), Some(0));
    }

    #[test]
    fn next_anchor_skips_processed_and_older_started_events() {
        let mut processed = HistoryEvent::new(EventType::OrchestratorStarted, -1, ts(5));
        processed.is_processed = true;
        let h = vec![
            HistoryEvent::new(EventType::OrchestratorStarted, -1, ts(0)),
            processed,
            HistoryEvent::new(EventType::OrchestratorStarted, -1, ts(10)),
        ];
        assert_eq!(next_decision_started(&h, ts(0)), Some(2));
        assert_eq!(next_decision_started(&h, ts(10)), None);
    }
}
