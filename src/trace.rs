//! The execution trace: a flat, ordered, replayable stream of steps.
//! Every observable action of the engine appends exactly one step, so a
//! host UI can scrub to any prefix and reconstruct the picture with the
//! fold in `replay`.

use serde::{Deserialize, Serialize};

/// One trace event. `payload` carries the `type` tag; `line`/`column`
/// point into the source when the step has a position; `timestamp_ms` is
/// the virtual clock at emission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    #[serde(flatten)]
    pub payload: StepPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub timestamp_ms: u64,
}

/// The closed set of step types. Serialized with a `type` tag holding the
/// SCREAMING_SNAKE name and the remaining fields as the payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StepPayload {
    /// The frame's source line rides on the step-level `line` field.
    #[serde(rename = "PUSH_STACK")]
    PushStack { id: u64, name: String },
    #[serde(rename = "POP_STACK")]
    PopStack { id: u64 },
    /// The highlighted line is the step-level `line` field.
    #[serde(rename = "HIGHLIGHT_LINE")]
    HighlightLine,
    #[serde(rename = "SCHEDULE_MICROTASK")]
    ScheduleMicrotask {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        label: String,
        source: TaskSource,
    },
    #[serde(rename = "DEQUEUE_MICROTASK")]
    DequeueMicrotask { id: u64, label: String },
    #[serde(rename = "EXECUTE_MICROTASK")]
    ExecuteMicrotask { id: u64, label: String },
    #[serde(rename = "SCHEDULE_MACROTASK")]
    ScheduleMacrotask {
        id: u64,
        label: String,
        source: TaskSource,
    },
    #[serde(rename = "DEQUEUE_MACROTASK")]
    DequeueMacrotask { id: u64, label: String },
    #[serde(rename = "EXECUTE_MACROTASK")]
    ExecuteMacrotask { id: u64, label: String },
    #[serde(rename = "REGISTER_WEB_API")]
    RegisterWebApi { id: u64, label: String, delay: u64 },
    #[serde(rename = "RESOLVE_WEB_API")]
    ResolveWebApi { id: u64, label: String },
    #[serde(rename = "EVENT_LOOP_CHECK")]
    EventLoopCheck { phase: Phase },
    #[serde(rename = "CONSOLE_LOG")]
    ConsoleLog {
        args: Vec<String>,
        raw: Vec<serde_json::Value>,
    },
    #[serde(rename = "CONSOLE_WARN")]
    ConsoleWarn {
        args: Vec<String>,
        raw: Vec<serde_json::Value>,
    },
    #[serde(rename = "CONSOLE_ERROR")]
    ConsoleError {
        args: Vec<String>,
        raw: Vec<serde_json::Value>,
    },
}

impl StepPayload {
    pub fn type_name(&self) -> &'static str {
        match self {
            StepPayload::PushStack { .. } => "PUSH_STACK",
            StepPayload::PopStack { .. } => "POP_STACK",
            StepPayload::HighlightLine => "HIGHLIGHT_LINE",
            StepPayload::ScheduleMicrotask { .. } => "SCHEDULE_MICROTASK",
            StepPayload::DequeueMicrotask { .. } => "DEQUEUE_MICROTASK",
            StepPayload::ExecuteMicrotask { .. } => "EXECUTE_MICROTASK",
            StepPayload::ScheduleMacrotask { .. } => "SCHEDULE_MACROTASK",
            StepPayload::DequeueMacrotask { .. } => "DEQUEUE_MACROTASK",
            StepPayload::ExecuteMacrotask { .. } => "EXECUTE_MACROTASK",
            StepPayload::RegisterWebApi { .. } => "REGISTER_WEB_API",
            StepPayload::ResolveWebApi { .. } => "RESOLVE_WEB_API",
            StepPayload::EventLoopCheck { .. } => "EVENT_LOOP_CHECK",
            StepPayload::ConsoleLog { .. } => "CONSOLE_LOG",
            StepPayload::ConsoleWarn { .. } => "CONSOLE_WARN",
            StepPayload::ConsoleError { .. } => "CONSOLE_ERROR",
        }
    }
}

/// Where the event loop currently is, for `EVENT_LOOP_CHECK` markers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Stack,
    Microtask,
    Macrotask,
    Webapi,
    Timers,
    Pending,
    Poll,
    Check,
    Close,
    Idle,
}

/// What scheduled a queued task; drives queue routing and phase
/// filtering in node mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskSource {
    NextTick,
    Microtask,
    Timeout,
    Interval,
    SetImmediate,
    Raf,
    Generic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Warn,
    Error,
}

/// One console line, kept in parallel with the trace for hosts that only
/// want the transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    pub message: String,
    pub timestamp_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_serializes_with_type_tag() {
        let step = ExecutionStep {
            payload: StepPayload::PushStack {
                id: 3,
                name: "f".into(),
            },
            line: Some(2),
            column: None,
            timestamp_ms: 0,
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["type"], "PUSH_STACK");
        assert_eq!(json["id"], 3);
        assert_eq!(json["name"], "f");
        assert_eq!(json["line"], 2);
        assert_eq!(json["timestamp_ms"], 0);
    }

    #[test]
    fn push_stack_round_trips_with_its_line() {
        let step = ExecutionStep {
            payload: StepPayload::PushStack {
                id: 1,
                name: "tick".into(),
            },
            line: Some(4),
            column: None,
            timestamp_ms: 7,
        };
        let text = serde_json::to_string(&step).unwrap();
        let back: ExecutionStep = serde_json::from_str(&text).unwrap();
        assert_eq!(back, step);
    }

    #[test]
    fn phase_names_are_lowercase() {
        assert_eq!(
            serde_json::to_value(Phase::Microtask).unwrap(),
            serde_json::json!("microtask")
        );
        assert_eq!(
            serde_json::to_value(Phase::Close).unwrap(),
            serde_json::json!("close")
        );
    }

    #[test]
    fn source_names_are_camel_case() {
        assert_eq!(
            serde_json::to_value(TaskSource::NextTick).unwrap(),
            serde_json::json!("nextTick")
        );
        assert_eq!(
            serde_json::to_value(TaskSource::SetImmediate).unwrap(),
            serde_json::json!("setImmediate")
        );
    }

    #[test]
    fn console_step_round_trips() {
        let step = ExecutionStep {
            payload: StepPayload::ConsoleLog {
                args: vec!["A".into()],
                raw: vec![serde_json::json!("A")],
            },
            line: Some(1),
            column: Some(1),
            timestamp_ms: 5,
        };
        let text = serde_json::to_string(&step).unwrap();
        let back: ExecutionStep = serde_json::from_str(&text).unwrap();
        assert_eq!(back, step);
    }
}
