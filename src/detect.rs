//! Malformed-history checks. History referencing events the current replay
//! cannot account for is an external-input defect; it must surface as a
//! workflow failure in the Decision rather than be silently ignored or crash
//! the engine.

use crate::history::{EventType, HistoryEvent};

/// Returns a description of the first completion-type event whose
/// correlation id matches no schedule-type event of the same kind.
pub(crate) fn find_orphaned_completion(history: &[HistoryEvent]) -> Option<String> {
    for e in history {
        match e.event_type {
            EventType::TaskCompleted | EventType::TaskFailed => {
                let Some(id) = e.task_scheduled_id else { continue };
                if !has_schedule(history, EventType::TaskScheduled, id) {
                    return Some(format!(
                        "history corruption: {:?} references TaskScheduled id {} which is not in history",
                        e.event_type, id
                    ));
                }
            }
            EventType::SubOrchestrationInstanceCompleted | EventType::SubOrchestrationInstanceFailed => {
                let Some(id) = e.task_scheduled_id else { continue };
                if !has_schedule(history, EventType::SubOrchestrationInstanceCreated, id) {
                    return Some(format!(
                        "history corruption: {:?} references SubOrchestrationInstanceCreated id {} which is not in history",
                        e.event_type, id
                    ));
                }
            }
            EventType::TimerFired => {
                let Some(id) = e.timer_id else { continue };
                if !has_schedule(history, EventType::TimerCreated, id) {
                    return Some(format!(
                        "history corruption: TimerFired references TimerCreated id {id} which is not in history"
                    ));
                }
            }
            _ => {}
        }
    }
    None
}

fn has_schedule(history: &[HistoryEvent], kind: EventType, event_id: i64) -> bool {
    history.iter().any(|e| e.event_type == kind && e.event_id == event_id)
}
