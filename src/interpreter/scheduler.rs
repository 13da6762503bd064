//! Queues, virtual timers, and the two event loops. All "concurrency"
//! here is cooperative and single-threaded; the clock only moves inside
//! `advance_timers`.

use super::*;
use crate::error::RuntimeError;
use crate::value::Value;

/// Safety net for the outer loop; hitting it is a scheduler overflow.
const EVENT_LOOP_MAX_ITERATIONS: usize = 500;

/// Safety net for one microtask drain.
const MICROTASK_DRAIN_CAP: usize = 200;

pub(crate) type TaskCallback = Box<dyn FnOnce(&mut Interpreter) -> Completion>;

pub(crate) struct QueuedTask {
    pub id: u64,
    pub label: String,
    pub source: TaskSource,
    pub callback: TaskCallback,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TimerKind {
    Timeout,
    Interval,
}

pub(crate) struct TimerEntry {
    pub id: u64,
    pub label: String,
    pub delay_ms: u64,
    pub start_time_ms: u64,
    pub callback: Value,
    pub kind: TimerKind,
    pub cleared: bool,
}

impl TimerEntry {
    fn expiry(&self) -> u64 {
        self.start_time_ms + self.delay_ms
    }
}

impl Interpreter {
    // ----- scheduling -----

    /// Enqueue a microtask. `preassigned` carries an id that was already
    /// announced (await continuations); otherwise a fresh id is taken and
    /// a SCHEDULE_MICROTASK step emitted here.
    pub(crate) fn schedule_microtask(
        &mut self,
        label: String,
        source: TaskSource,
        preassigned: Option<u64>,
        callback: TaskCallback,
    ) -> u64 {
        let id = match preassigned {
            Some(id) => id,
            None => {
                let id = self.next_task_id();
                self.emit_here(StepPayload::ScheduleMicrotask {
                    id: Some(id),
                    label: label.clone(),
                    source,
                });
                id
            }
        };
        let task = QueuedTask {
            id,
            label,
            source,
            callback,
        };
        if source == TaskSource::NextTick {
            // Ahead of ordinary microtasks, FIFO among other nextTicks.
            let insert_at = self
                .microtasks
                .iter()
                .take_while(|t| t.source == TaskSource::NextTick)
                .count();
            self.microtasks.insert(insert_at, task);
        } else {
            self.microtasks.push_back(task);
        }
        id
    }

    pub(crate) fn schedule_macrotask(
        &mut self,
        label: String,
        source: TaskSource,
        callback: TaskCallback,
    ) -> u64 {
        let id = self.next_task_id();
        self.emit_here(StepPayload::ScheduleMacrotask {
            id,
            label: label.clone(),
            source,
        });
        let task = QueuedTask {
            id,
            label,
            source,
            callback,
        };
        if source == TaskSource::SetImmediate {
            self.check_queue.push_back(task);
        } else {
            self.macrotasks.push_back(task);
        }
        id
    }

    // ----- draining -----

    pub(crate) fn drain_microtasks(&mut self) {
        let mut drained = 0usize;
        while let Some(task) = self.microtasks.pop_front() {
            if drained >= MICROTASK_DRAIN_CAP {
                self.microtasks.push_front(task);
                self.overflowed = true;
                self.report_error(
                    RuntimeError::SchedulerOverflow(format!(
                        "more than {MICROTASK_DRAIN_CAP} microtasks in one drain"
                    )),
                    None,
                    None,
                );
                return;
            }
            drained += 1;

            self.emit(StepPayload::EventLoopCheck {
                phase: Phase::Microtask,
            });
            self.emit(StepPayload::DequeueMicrotask {
                id: task.id,
                label: task.label.clone(),
            });
            self.emit(StepPayload::ExecuteMicrotask {
                id: task.id,
                label: task.label.clone(),
            });
            self.run_task(task);
        }
    }

    pub(crate) fn execute_macrotask(&mut self, task: QueuedTask) {
        self.emit(StepPayload::DequeueMacrotask {
            id: task.id,
            label: task.label.clone(),
        });
        self.emit(StepPayload::ExecuteMacrotask {
            id: task.id,
            label: task.label.clone(),
        });
        self.run_task(task);
    }

    /// Run a task callback inside a stack frame named after it; an escaped
    /// throw is reported, never propagated into the loop.
    fn run_task(&mut self, task: QueuedTask) {
        let frame = self.push_frame(&task.label, None);
        let comp = (task.callback)(self);
        self.pop_frame(frame);
        if let Completion::Throw(value) = comp {
            self.report_thrown(value);
        }
    }

    // ----- timers -----

    pub(crate) fn register_timer(
        &mut self,
        label: String,
        delay_ms: u64,
        callback: Value,
        kind: TimerKind,
    ) -> u64 {
        let id = self.next_timer_id();
        self.emit_here(StepPayload::RegisterWebApi {
            id,
            label: label.clone(),
            delay: delay_ms,
        });
        self.timers.push(TimerEntry {
            id,
            label,
            delay_ms,
            start_time_ms: self.now_ms,
            callback,
            kind,
            cleared: false,
        });
        id
    }

    pub(crate) fn clear_timer(&mut self, id: u64) {
        if let Some(timer) = self.timers.iter_mut().find(|t| t.id == id) {
            timer.cleared = true;
        }
    }

    fn has_live_timers(&self) -> bool {
        self.timers.iter().any(|t| !t.cleared)
    }

    /// Advance the virtual clock to the nearest uncleared expiry (when it
    /// lies in the future) and move every due timer's callback onto the
    /// macrotask queue. Intervals re-arm; timeouts are spent.
    pub(crate) fn advance_timers(&mut self) {
        let min_expiry = self
            .timers
            .iter()
            .filter(|t| !t.cleared)
            .map(|t| t.expiry())
            .min();
        let min_expiry = match min_expiry {
            Some(v) => v,
            None => return,
        };
        if min_expiry > self.now_ms {
            self.now_ms = min_expiry;
        }

        let mut due: Vec<(u64, u64)> = self
            .timers
            .iter()
            .filter(|t| !t.cleared && t.expiry() <= self.now_ms)
            .map(|t| (t.expiry(), t.id))
            .collect();
        if due.is_empty() {
            return;
        }
        due.sort();
        self.emit(StepPayload::EventLoopCheck {
            phase: Phase::Webapi,
        });

        for (_, timer_id) in due {
            let (label, callback, source) = {
                let timer = self
                    .timers
                    .iter_mut()
                    .find(|t| t.id == timer_id)
                    .expect("due timer exists");
                let source = match timer.kind {
                    TimerKind::Timeout => TaskSource::Timeout,
                    TimerKind::Interval => TaskSource::Interval,
                };
                match timer.kind {
                    TimerKind::Timeout => timer.cleared = true,
                    TimerKind::Interval => timer.start_time_ms = self.now_ms,
                }
                (timer.label.clone(), timer.callback.clone(), source)
            };
            self.emit(StepPayload::ResolveWebApi {
                id: timer_id,
                label: label.clone(),
            });
            let cb = callback.clone();
            self.schedule_macrotask(
                label,
                source,
                Box::new(move |interp| interp.call_function(&cb, &[])),
            );
        }
    }

    // ----- loops -----

    pub(crate) fn has_work(&self) -> bool {
        !self.microtasks.is_empty()
            || !self.macrotasks.is_empty()
            || !self.check_queue.is_empty()
            || self.has_live_timers()
    }

    pub(crate) fn run_event_loop(&mut self) {
        match self.mode {
            RunMode::Browser => self.run_browser_loop(),
            RunMode::Node => self.run_node_loop(),
        }
    }

    /// Browser model: drain microtasks, fire due timers, then one
    /// macrotask per turn.
    fn run_browser_loop(&mut self) {
        let mut iterations = 0usize;
        while self.has_work() && !self.overflowed {
            if iterations >= EVENT_LOOP_MAX_ITERATIONS {
                self.report_loop_overflow();
                return;
            }
            iterations += 1;

            self.drain_microtasks();
            if self.overflowed || !self.has_work() {
                return;
            }
            self.advance_timers();
            if let Some(task) = self.macrotasks.pop_front() {
                self.emit(StepPayload::EventLoopCheck {
                    phase: Phase::Macrotask,
                });
                self.execute_macrotask(task);
                continue;
            }
            if self.has_live_timers() {
                self.advance_timers();
            }
        }
    }

    /// Node model: six phases per iteration, with a full microtask drain
    /// (nextTick first) between phases and after each executed task.
    fn run_node_loop(&mut self) {
        let mut iterations = 0usize;
        while self.has_work() && !self.overflowed {
            if iterations >= EVENT_LOOP_MAX_ITERATIONS {
                self.report_loop_overflow();
                return;
            }
            iterations += 1;

            self.drain_microtasks();
            if self.overflowed {
                return;
            }

            // Phase 1: timers. Due timer callbacks are pulled from the
            // macrotask queue by source tag, FIFO. (The reference drains a
            // shared queue by filter rather than keeping a timer heap.)
            self.emit(StepPayload::EventLoopCheck {
                phase: Phase::Timers,
            });
            self.advance_timers();
            loop {
                let pos = self
                    .macrotasks
                    .iter()
                    .position(|t| matches!(t.source, TaskSource::Timeout | TaskSource::Interval));
                let task = match pos {
                    Some(pos) => self.macrotasks.remove(pos).expect("position is valid"),
                    None => break,
                };
                self.execute_macrotask(task);
                self.drain_microtasks();
                if self.overflowed {
                    return;
                }
            }

            // Phase 2: pending callbacks. I/O is not simulated; marker only.
            self.drain_microtasks();
            self.emit(StepPayload::EventLoopCheck {
                phase: Phase::Pending,
            });

            // Phase 3: idle/prepare is internal to the real loop; skipped.

            // Phase 4: poll. One remaining macrotask, if any.
            self.drain_microtasks();
            self.emit(StepPayload::EventLoopCheck { phase: Phase::Poll });
            if let Some(task) = self.macrotasks.pop_front() {
                self.execute_macrotask(task);
                self.drain_microtasks();
                if self.overflowed {
                    return;
                }
            }

            // Phase 5: check. setImmediate callbacks, all of them.
            self.drain_microtasks();
            if !self.check_queue.is_empty() {
                self.emit(StepPayload::EventLoopCheck {
                    phase: Phase::Check,
                });
                while let Some(task) = self.check_queue.pop_front() {
                    self.execute_macrotask(task);
                    self.drain_microtasks();
                    if self.overflowed {
                        return;
                    }
                }
            }

            // Phase 6: close callbacks. Marker only.
            self.drain_microtasks();
            self.emit(StepPayload::EventLoopCheck {
                phase: Phase::Close,
            });

            // Only timers left: jump the clock so the next iteration has
            // something to do.
            if self.microtasks.is_empty()
                && self.macrotasks.is_empty()
                && self.check_queue.is_empty()
                && self.has_live_timers()
            {
                self.advance_timers();
            }
        }
    }

    fn report_loop_overflow(&mut self) {
        self.overflowed = true;
        self.report_error(
            RuntimeError::SchedulerOverflow(format!(
                "event loop exceeded {EVENT_LOOP_MAX_ITERATIONS} iterations"
            )),
            None,
            None,
        );
    }
}
