//! Decision model: the engine's sole output. Action descriptors tell the
//! host what to schedule; the Decision wraps them with done/not-done state,
//! output, custom status, and an optional error rendering.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Declarative descriptor of one operation the host must schedule. The wire
/// shape is a map carrying a numeric `actionType` tag plus the parameters
/// the host needs, in camelCase.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    CallActivity {
        function_name: String,
        input: Value,
    },
    CallSubOrchestrator {
        function_name: String,
        instance_id: Option<String>,
        input: Value,
    },
    CreateTimer {
        fire_at: DateTime<Utc>,
        is_canceled: bool,
    },
    WaitForExternalEvent {
        external_event_name: String,
    },
}

impl Action {
    /// Numeric type tag from the host protocol.
    pub fn action_type(&self) -> u8 {
        match self {
            Action::CallActivity { .. } => 0,
            Action::CallSubOrchestrator { .. } => 2,
            Action::CreateTimer { .. } => 5,
            Action::WaitForExternalEvent { .. } => 6,
        }
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("actionType", &self.action_type())?;
        match self {
            Action::CallActivity { function_name, input } => {
                map.serialize_entry("functionName", function_name)?;
                map.serialize_entry("input", input)?;
            }
            Action::CallSubOrchestrator {
                function_name,
                instance_id,
                input,
            } => {
                map.serialize_entry("functionName", function_name)?;
                if let Some(id) = instance_id {
                    map.serialize_entry("instanceId", id)?;
                }
                map.serialize_entry("input", input)?;
            }
            Action::CreateTimer { fire_at, is_canceled } => {
                map.serialize_entry("fireAt", fire_at)?;
                map.serialize_entry("isCanceled", is_canceled)?;
            }
            Action::WaitForExternalEvent { external_event_name } => {
                map.serialize_entry("externalEventName", external_event_name)?;
            }
        }
        map.end()
    }
}

/// Per-invocation output contract. Construction is validated so the §3-style
/// invariants hold by type: a done decision carries no error, a failed
/// decision carries no output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    is_done: bool,
    actions: Vec<Vec<Action>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_status: Option<Value>,
}

impl Decision {
    /// Replay stopped waiting for new history; not an error.
    pub fn suspended(actions: Vec<Vec<Action>>, custom_status: Option<Value>) -> Self {
        Self {
            is_done: false,
            actions,
            output: None,
            error: None,
            custom_status,
        }
    }

    /// The workflow ran to normal completion with a final value.
    pub fn completed(output: Value, actions: Vec<Vec<Action>>, custom_status: Option<Value>) -> Self {
        Self {
            is_done: true,
            actions,
            output: Some(output),
            error: None,
            custom_status,
        }
    }

    /// An unhandled failure escaped the workflow this invocation. Terminal
    /// for the invocation, not for the orchestration: the host decides
    /// whether to replay again.
    pub fn failed(error: impl Into<String>, actions: Vec<Vec<Action>>, custom_status: Option<Value>) -> Self {
        Self {
            is_done: false,
            actions,
            output: None,
            error: Some(error.into()),
            custom_status,
        }
    }

    pub fn is_done(&self) -> bool {
        self.is_done
    }

    pub fn actions(&self) -> &[Vec<Action>] {
        &self.actions
    }

    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn custom_status(&self) -> Option<&Value> {
        self.custom_status.as_ref()
    }

    /// Serialize to the host wire shape. Field order is fixed, so the same
    /// decision always produces identical bytes.
    pub fn to_json_string(&self) -> Result<String, crate::ContextError> {
        serde_json::to_string(self).map_err(crate::ContextError::Encode)
    }
}
