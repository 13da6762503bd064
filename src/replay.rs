//! Pure fold from a step stream to the visual state a UI would draw at
//! that point. No engine access: everything a frontend needs to render a
//! prefix of a run is in the events themselves.

use serde::{Deserialize, Serialize};

use crate::trace::{ConsoleLevel, ExecutionStep, Phase, StepPayload, TaskSource};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualState {
    pub call_stack: Vec<FrameView>,
    pub microtasks: Vec<TaskView>,
    pub macrotasks: Vec<TaskView>,
    pub check_queue: Vec<TaskView>,
    pub web_apis: Vec<WebApiView>,
    pub console: Vec<ConsoleLine>,
    pub highlighted_line: Option<u32>,
    pub phase: Option<Phase>,
    pub now_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameView {
    pub id: u64,
    pub name: String,
    pub line: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: Option<u64>,
    pub label: String,
    pub source: TaskSource,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WebApiView {
    pub id: u64,
    pub label: String,
    pub delay: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsoleLine {
    pub level: ConsoleLevel,
    pub text: String,
}

impl VisualState {
    pub fn apply(&mut self, step: &ExecutionStep) {
        self.now_ms = step.timestamp_ms;
        match &step.payload {
            StepPayload::PushStack { id, name } => {
                self.call_stack.push(FrameView {
                    id: *id,
                    name: name.clone(),
                    line: step.line,
                });
            }
            StepPayload::PopStack { id } => {
                if let Some(pos) = self.call_stack.iter().rposition(|f| f.id == *id) {
                    self.call_stack.truncate(pos);
                }
            }
            StepPayload::HighlightLine => {
                self.highlighted_line = step.line;
            }
            StepPayload::ScheduleMicrotask { id, label, source } => {
                let task = TaskView {
                    id: *id,
                    label: label.clone(),
                    source: *source,
                };
                if *source == TaskSource::NextTick {
                    let insert_at = self
                        .microtasks
                        .iter()
                        .take_while(|t| t.source == TaskSource::NextTick)
                        .count();
                    self.microtasks.insert(insert_at, task);
                } else {
                    self.microtasks.push(task);
                }
            }
            StepPayload::DequeueMicrotask { id, label } => {
                remove_task(&mut self.microtasks, Some(*id), label);
            }
            StepPayload::ExecuteMicrotask { .. } => {}
            StepPayload::ScheduleMacrotask { id, label, source } => {
                let task = TaskView {
                    id: Some(*id),
                    label: label.clone(),
                    source: *source,
                };
                if *source == TaskSource::SetImmediate {
                    self.check_queue.push(task);
                } else {
                    self.macrotasks.push(task);
                }
            }
            StepPayload::DequeueMacrotask { id, label } => {
                if !remove_task(&mut self.macrotasks, Some(*id), label) {
                    remove_task(&mut self.check_queue, Some(*id), label);
                }
            }
            StepPayload::ExecuteMacrotask { .. } => {}
            StepPayload::RegisterWebApi { id, label, delay } => {
                self.web_apis.push(WebApiView {
                    id: *id,
                    label: label.clone(),
                    delay: *delay,
                });
            }
            StepPayload::ResolveWebApi { id, .. } => {
                self.web_apis.retain(|t| t.id != *id);
            }
            StepPayload::EventLoopCheck { phase } => {
                self.phase = Some(*phase);
            }
            StepPayload::ConsoleLog { args, .. } => self.push_console(ConsoleLevel::Log, args),
            StepPayload::ConsoleWarn { args, .. } => self.push_console(ConsoleLevel::Warn, args),
            StepPayload::ConsoleError { args, .. } => {
                self.push_console(ConsoleLevel::Error, args)
            }
        }
    }

    fn push_console(&mut self, level: ConsoleLevel, args: &[String]) {
        self.console.push(ConsoleLine {
            level,
            text: args.join(" "),
        });
    }
}

fn remove_task(queue: &mut Vec<TaskView>, id: Option<u64>, label: &str) -> bool {
    let pos = queue
        .iter()
        .position(|t| t.id == id)
        .or_else(|| queue.iter().position(|t| t.label == label));
    match pos {
        Some(pos) => {
            queue.remove(pos);
            true
        }
        None => false,
    }
}

/// Fold an entire stream. For scrubbing, fold a prefix.
pub fn replay(steps: &[ExecutionStep]) -> VisualState {
    replay_prefix(steps, steps.len())
}

pub fn replay_prefix(steps: &[ExecutionStep], prefix: usize) -> VisualState {
    let mut state = VisualState::default();
    for step in &steps[..prefix.min(steps.len())] {
        state.apply(step);
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{run, RunMode};

    #[test]
    fn final_state_of_a_run_is_quiescent() {
        let outcome = run(
            "setTimeout(() => console.log('t'), 10);\n\
             Promise.resolve().then(() => console.log('p'));\n\
             console.log('s');",
            RunMode::Browser,
        );
        let state = replay(&outcome.steps);
        assert!(state.call_stack.is_empty());
        assert!(state.microtasks.is_empty());
        assert!(state.macrotasks.is_empty());
        assert!(state.web_apis.is_empty());
        let lines: Vec<&str> = state.console.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(lines, vec!["s", "p", "t"]);
        assert_eq!(state.now_ms, 10);
    }

    #[test]
    fn mid_run_prefix_shows_pending_work() {
        let outcome = run(
            "setTimeout(() => console.log('t'), 5); console.log('s');",
            RunMode::Browser,
        );
        // Find the point right after the sync log: the timer is
        // registered but not yet resolved.
        let after_sync = outcome
            .steps
            .iter()
            .position(|s| matches!(s.payload, StepPayload::ConsoleLog { .. }))
            .unwrap()
            + 1;
        let state = replay_prefix(&outcome.steps, after_sync);
        assert_eq!(state.web_apis.len(), 1);
        assert_eq!(state.web_apis[0].delay, 5);
        assert!(!state.call_stack.is_empty()); // still inside <global>
    }

    #[test]
    fn check_queue_tasks_fold_separately() {
        let outcome = run(
            "setImmediate(() => console.log('i')); console.log('s');",
            RunMode::Node,
        );
        let scheduled = outcome
            .steps
            .iter()
            .position(|s| matches!(s.payload, StepPayload::ScheduleMacrotask { .. }))
            .unwrap()
            + 1;
        let state = replay_prefix(&outcome.steps, scheduled);
        assert_eq!(state.check_queue.len(), 1);
        assert!(state.macrotasks.is_empty());
        let done = replay(&outcome.steps);
        assert!(done.check_queue.is_empty());
    }

    #[test]
    fn next_tick_tasks_sit_ahead_of_promise_tasks() {
        let outcome = run(
            "Promise.resolve().then(() => console.log('p'));\n\
             process.nextTick(() => console.log('n'));",
            RunMode::Node,
        );
        // Prefix that contains both schedules but no dequeues yet.
        let both = outcome
            .steps
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s.payload, StepPayload::ScheduleMicrotask { .. }))
            .map(|(i, _)| i)
            .nth(1)
            .unwrap()
            + 1;
        let state = replay_prefix(&outcome.steps, both);
        assert_eq!(state.microtasks.len(), 2);
        assert_eq!(state.microtasks[0].source, TaskSource::NextTick);
    }
}
