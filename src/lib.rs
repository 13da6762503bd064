//! loopscope: an educational JavaScript runtime simulator.
//!
//! Feed [`run`] a source string and a [`RunMode`] and it parses,
//! interprets, and schedules the program on a virtual clock, emitting an
//! ordered, replayable trace of execution events: stack pushes and pops,
//! microtask/macrotask scheduling, timer registration and resolution,
//! console output, and event-loop phase markers. A host UI replays the
//! trace (see [`replay`]) to show how call stacks, Promises,
//! `async`/`await`, and the browser vs. Node event loops interleave.
//!
//! The engine is a library: no CLI, no files, no wall clock. Time is
//! virtual and only advances when the scheduler has nothing runnable.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod replay;
pub mod trace;
pub mod value;

mod interpreter;

pub use error::{ParseError, RuntimeError};
pub use interpreter::{
    BindingKind, Completion, Environment, EnvRef, Interpreter, RunMode, RunOutcome, SuspendHandle,
};
pub use replay::VisualState;
pub use trace::{ConsoleEntry, ConsoleLevel, ExecutionStep, Phase, StepPayload, TaskSource};

/// Run a source string to completion under the given event-loop mode and
/// return the accumulated trace, console transcript, and errors.
pub fn run(source: &str, mode: RunMode) -> RunOutcome {
    Interpreter::new(mode).run(source)
}
