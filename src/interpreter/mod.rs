use std::collections::VecDeque;

use crate::error::RuntimeError;
use crate::parser;
use crate::trace::{
    ConsoleEntry, ConsoleLevel, ExecutionStep, Phase, StepPayload, TaskSource,
};
use crate::value::{stringify, value_to_json, Value};

mod types;
pub use types::*;

mod builtins;
mod eval;
mod exec;
mod helpers;
mod scheduler;

pub(crate) use scheduler::{QueuedTask, TimerEntry, TimerKind};

/// Which event loop the run simulates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Browser,
    Node,
}

/// Everything a run produces: the step stream, the console transcript,
/// and any runtime errors (which also appear in the stream as
/// `CONSOLE_ERROR` steps).
#[derive(Debug)]
pub struct RunOutcome {
    pub steps: Vec<ExecutionStep>,
    pub console: Vec<ConsoleEntry>,
    pub errors: Vec<RuntimeError>,
}

const XORSHIFT_SEED: u64 = 0x9e3779b97f4a7c15;

pub struct Interpreter {
    pub(crate) mode: RunMode,
    pub(crate) global_env: EnvRef,

    pub(crate) steps: Vec<ExecutionStep>,
    pub(crate) console: Vec<ConsoleEntry>,
    pub(crate) errors: Vec<RuntimeError>,

    pub(crate) microtasks: VecDeque<QueuedTask>,
    pub(crate) macrotasks: VecDeque<QueuedTask>,
    pub(crate) check_queue: VecDeque<QueuedTask>,
    pub(crate) timers: Vec<TimerEntry>,
    pub(crate) now_ms: u64,
    pub(crate) overflowed: bool,

    pub(crate) async_ctx: Option<AsyncContext>,
    pub(crate) current_line: Option<u32>,
    pub(crate) current_column: Option<u32>,

    next_frame_id: u64,
    next_task_id: u64,
    next_timer_id: u64,
    next_promise_id: u64,
    pub(crate) rng_state: u64,
}

impl Interpreter {
    pub fn new(mode: RunMode) -> Self {
        let mut interp = Self {
            mode,
            global_env: Environment::new_global(),
            steps: Vec::new(),
            console: Vec::new(),
            errors: Vec::new(),
            microtasks: VecDeque::new(),
            macrotasks: VecDeque::new(),
            check_queue: VecDeque::new(),
            timers: Vec::new(),
            now_ms: 0,
            overflowed: false,
            async_ctx: None,
            current_line: None,
            current_column: None,
            next_frame_id: 0,
            next_task_id: 0,
            next_timer_id: 0,
            next_promise_id: 0,
            rng_state: XORSHIFT_SEED,
        };
        interp.setup_globals();
        interp
    }

    /// All counters, queues, and buffers are engine-owned and start fresh
    /// here, so the same source always yields the same step stream.
    fn reset(&mut self) {
        self.global_env = Environment::new_global();
        self.steps.clear();
        self.console.clear();
        self.errors.clear();
        self.microtasks.clear();
        self.macrotasks.clear();
        self.check_queue.clear();
        self.timers.clear();
        self.now_ms = 0;
        self.overflowed = false;
        self.async_ctx = None;
        self.current_line = None;
        self.current_column = None;
        self.next_frame_id = 0;
        self.next_task_id = 0;
        self.next_timer_id = 0;
        self.next_promise_id = 0;
        self.rng_state = XORSHIFT_SEED;
        self.setup_globals();
    }

    pub fn run(&mut self, source: &str) -> RunOutcome {
        self.reset();

        let program = match parser::parse(source) {
            Ok(program) => program,
            Err(err) => {
                let (line, column) = (err.line, err.column);
                let runtime = RuntimeError::Parse(err);
                self.report_error(runtime, Some(line), Some(column));
                return self.take_outcome();
            }
        };

        self.emit(StepPayload::EventLoopCheck { phase: Phase::Stack });
        let frame = self.push_frame("<global>", Some(1));
        let global_env = self.global_env.clone();
        let comp = self.exec_statements(&program.body, &global_env);
        if let Completion::Throw(value) = comp {
            self.report_thrown(value);
        }
        self.pop_frame(frame);

        self.run_event_loop();
        self.take_outcome()
    }

    fn take_outcome(&mut self) -> RunOutcome {
        RunOutcome {
            steps: std::mem::take(&mut self.steps),
            console: std::mem::take(&mut self.console),
            errors: std::mem::take(&mut self.errors),
        }
    }

    // ----- trace emission -----

    pub(crate) fn emit(&mut self, payload: StepPayload) {
        self.emit_at(payload, None, None);
    }

    pub(crate) fn emit_here(&mut self, payload: StepPayload) {
        let (line, column) = (self.current_line, self.current_column);
        self.emit_at(payload, line, column);
    }

    pub(crate) fn emit_at(
        &mut self,
        payload: StepPayload,
        line: Option<u32>,
        column: Option<u32>,
    ) {
        self.steps.push(ExecutionStep {
            payload,
            line,
            column,
            timestamp_ms: self.now_ms,
        });
    }

    pub(crate) fn push_frame(&mut self, name: &str, line: Option<u32>) -> u64 {
        self.next_frame_id += 1;
        let id = self.next_frame_id;
        self.emit_at(
            StepPayload::PushStack {
                id,
                name: name.to_string(),
            },
            line,
            None,
        );
        id
    }

    pub(crate) fn pop_frame(&mut self, id: u64) {
        self.emit(StepPayload::PopStack { id });
    }

    pub(crate) fn highlight(&mut self, line: u32) {
        self.emit_at(StepPayload::HighlightLine, Some(line), None);
    }

    // ----- ids -----

    pub(crate) fn next_task_id(&mut self) -> u64 {
        self.next_task_id += 1;
        self.next_task_id
    }

    pub(crate) fn next_timer_id(&mut self) -> u64 {
        self.next_timer_id += 1;
        self.next_timer_id
    }

    pub(crate) fn next_promise_id(&mut self) -> u64 {
        self.next_promise_id += 1;
        self.next_promise_id
    }

    // ----- error surface -----

    pub(crate) fn throw_type_error(&self, message: impl std::fmt::Display) -> Completion {
        Completion::Throw(Value::String(format!("TypeError: {message}")))
    }

    pub(crate) fn throw_reference_error(&self, message: impl std::fmt::Display) -> Completion {
        Completion::Throw(Value::String(format!("ReferenceError: {message}")))
    }

    pub(crate) fn throw_range_error(&self, message: impl std::fmt::Display) -> Completion {
        Completion::Throw(Value::String(format!("RangeError: {message}")))
    }

    /// An uncaught thrown value: classify, log as CONSOLE_ERROR, record.
    pub(crate) fn report_thrown(&mut self, value: Value) {
        let text = stringify(&value);
        let error = RuntimeError::classify_thrown(&text);
        let (line, column) = (self.current_line, self.current_column);
        self.report_error(error, line, column);
    }

    pub(crate) fn report_error(
        &mut self,
        error: RuntimeError,
        line: Option<u32>,
        column: Option<u32>,
    ) {
        let message = error.to_string();
        self.emit_at(
            StepPayload::ConsoleError {
                args: vec![message.clone()],
                raw: vec![serde_json::Value::String(message.clone())],
            },
            line,
            column,
        );
        self.console.push(ConsoleEntry {
            level: ConsoleLevel::Error,
            message,
            timestamp_ms: self.now_ms,
        });
        self.errors.push(error);
    }

    pub(crate) fn console_emit(&mut self, level: ConsoleLevel, args: &[Value]) {
        let rendered: Vec<String> = args.iter().map(stringify).collect();
        let raw: Vec<serde_json::Value> = args.iter().map(value_to_json).collect();
        let message = rendered.join(" ");
        let payload = match level {
            ConsoleLevel::Log => StepPayload::ConsoleLog {
                args: rendered,
                raw,
            },
            ConsoleLevel::Warn => StepPayload::ConsoleWarn {
                args: rendered,
                raw,
            },
            ConsoleLevel::Error => StepPayload::ConsoleError {
                args: rendered,
                raw,
            },
        };
        self.emit_here(payload);
        self.console.push(ConsoleEntry {
            level,
            message,
            timestamp_ms: self.now_ms,
        });
    }

    /// Deterministic xorshift64 behind `Math.random`; reset per run.
    pub(crate) fn next_random(&mut self) -> f64 {
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_get_fresh_ids_per_run() {
        let mut interp = Interpreter::new(RunMode::Browser);
        let first = interp.run("console.log(1);");
        let second = interp.run("console.log(1);");
        assert_eq!(first.steps, second.steps);
    }

    #[test]
    fn random_is_deterministic_across_resets() {
        let mut interp = Interpreter::new(RunMode::Browser);
        let a = interp.next_random();
        interp.reset();
        let b = interp.next_random();
        assert_eq!(a, b);
        assert!((0.0..1.0).contains(&a));
    }
}
