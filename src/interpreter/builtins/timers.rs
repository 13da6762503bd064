use super::*;
use crate::interpreter::TimerKind;
use crate::value::{NativeFunction, ObjectData, Value};

use super::helpers::to_number;

impl Interpreter {
    pub(crate) fn setup_timer_globals(&mut self) {
        let set_timeout = NativeFunction::new("setTimeout", |interp, args| {
            interp.register_timer_builtin(args, TimerKind::Timeout)
        });
        Environment::define(&self.global_env, "setTimeout", set_timeout, BindingKind::Const);

        let set_interval = NativeFunction::new("setInterval", |interp, args| {
            interp.register_timer_builtin(args, TimerKind::Interval)
        });
        Environment::define(
            &self.global_env,
            "setInterval",
            set_interval,
            BindingKind::Const,
        );

        let clear_timeout = NativeFunction::new("clearTimeout", |interp, args| {
            interp.clear_timer_builtin(args)
        });
        Environment::define(
            &self.global_env,
            "clearTimeout",
            clear_timeout,
            BindingKind::Const,
        );

        let clear_interval = NativeFunction::new("clearInterval", |interp, args| {
            interp.clear_timer_builtin(args)
        });
        Environment::define(
            &self.global_env,
            "clearInterval",
            clear_interval,
            BindingKind::Const,
        );

        let queue_microtask = NativeFunction::new("queueMicrotask", |interp, args| {
            let callback = args.first().cloned().unwrap_or(Value::Undefined);
            if !callback.is_callable() {
                return interp.throw_type_error("queueMicrotask requires a callable argument");
            }
            let label = callback_label(&callback, "queueMicrotask");
            let cb = callback.clone();
            interp.schedule_microtask(
                label,
                TaskSource::Microtask,
                None,
                Box::new(move |interp| interp.call_function(&cb, &[])),
            );
            Completion::Normal(Value::Undefined)
        });
        Environment::define(
            &self.global_env,
            "queueMicrotask",
            queue_microtask,
            BindingKind::Const,
        );

        match self.mode {
            RunMode::Browser => self.setup_browser_timer_globals(),
            RunMode::Node => self.setup_node_timer_globals(),
        }
    }

    fn setup_browser_timer_globals(&mut self) {
        let raf = NativeFunction::new("requestAnimationFrame", |interp, args| {
            let callback = args.first().cloned().unwrap_or(Value::Undefined);
            if !callback.is_callable() {
                return interp
                    .throw_type_error("requestAnimationFrame requires a callable argument");
            }
            let label = callback_label(&callback, "requestAnimationFrame");
            let cb = callback.clone();
            let id = interp.schedule_macrotask(
                label,
                TaskSource::Raf,
                Box::new(move |interp| interp.call_function(&cb, &[])),
            );
            Completion::Normal(Value::Number(id as f64))
        });
        Environment::define(
            &self.global_env,
            "requestAnimationFrame",
            raf,
            BindingKind::Const,
        );
    }

    fn setup_node_timer_globals(&mut self) {
        let mut process = ObjectData::new();
        process.set(
            "nextTick",
            NativeFunction::new("process.nextTick", |interp, args| {
                let callback = args.first().cloned().unwrap_or(Value::Undefined);
                if !callback.is_callable() {
                    return interp.throw_type_error("process.nextTick requires a callable argument");
                }
                let label = callback_label(&callback, "process.nextTick");
                let cb = callback.clone();
                interp.schedule_microtask(
                    label,
                    TaskSource::NextTick,
                    None,
                    Box::new(move |interp| interp.call_function(&cb, &[])),
                );
                Completion::Normal(Value::Undefined)
            }),
        );
        Environment::define(
            &self.global_env,
            "process",
            Value::object(process),
            BindingKind::Const,
        );

        let set_immediate = NativeFunction::new("setImmediate", |interp, args| {
            let callback = args.first().cloned().unwrap_or(Value::Undefined);
            if !callback.is_callable() {
                return interp.throw_type_error("setImmediate requires a callable argument");
            }
            let label = callback_label(&callback, "setImmediate");
            let cb = callback.clone();
            let id = interp.schedule_macrotask(
                label,
                TaskSource::SetImmediate,
                Box::new(move |interp| interp.call_function(&cb, &[])),
            );
            Completion::Normal(Value::Number(id as f64))
        });
        Environment::define(
            &self.global_env,
            "setImmediate",
            set_immediate,
            BindingKind::Const,
        );
    }

    fn register_timer_builtin(&mut self, args: &[Value], kind: TimerKind) -> Completion {
        let callback = args.first().cloned().unwrap_or(Value::Undefined);
        if !callback.is_callable() {
            let name = match kind {
                TimerKind::Timeout => "setTimeout",
                TimerKind::Interval => "setInterval",
            };
            return self.throw_type_error(format!("{name} requires a callable argument"));
        }
        let delay = args.get(1).map(to_number).unwrap_or(0.0);
        let delay_ms = if delay.is_finite() && delay > 0.0 {
            delay as u64
        } else {
            0
        };
        let fallback = match kind {
            TimerKind::Timeout => "setTimeout",
            TimerKind::Interval => "setInterval",
        };
        let label = callback_label(&callback, fallback);
        let id = self.register_timer(label, delay_ms, callback, kind);
        Completion::Normal(Value::Number(id as f64))
    }

    fn clear_timer_builtin(&mut self, args: &[Value]) -> Completion {
        let id = args.first().map(to_number).unwrap_or(f64::NAN);
        if id.is_finite() && id >= 0.0 {
            self.clear_timer(id as u64);
        }
        Completion::Normal(Value::Undefined)
    }
}

/// Trace label for a scheduled callback: its function name when it has
/// one, otherwise the API that queued it.
pub(super) fn callback_label(callback: &Value, fallback: &str) -> String {
    match callback.callable_name() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => fallback.to_string(),
    }
}
