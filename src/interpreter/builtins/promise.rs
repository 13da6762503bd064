use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::*;
use crate::value::{
    NativeFunction, ObjectData, PromiseHandler, PromiseRef, PromiseState, SimPromise, Value,
};

impl Interpreter {
    pub(crate) fn create_promise(&mut self) -> PromiseRef {
        let id = self.next_promise_id();
        Rc::new(RefCell::new(SimPromise {
            id,
            state: PromiseState::Pending,
            handlers: Vec::new(),
        }))
    }

    /// Coerce a value to a promise: promises pass through, anything else
    /// wraps pre-fulfilled.
    pub(crate) fn promise_from_value(&mut self, value: Value) -> PromiseRef {
        match value {
            Value::Promise(p) => p,
            other => {
                let promise = self.create_promise();
                promise.borrow_mut().state = PromiseState::Fulfilled(other);
                promise
            }
        }
    }

    /// Settle toward fulfilled. Resolving with a promise adopts its
    /// eventual state instead of fulfilling with the promise itself.
    pub(crate) fn resolve_promise(&mut self, promise: &PromiseRef, value: Value) {
        if !promise.borrow().state.is_pending() {
            return;
        }
        if let Value::Promise(inner) = value {
            if Rc::ptr_eq(promise, &inner) {
                let error = Value::String(
                    "TypeError: A promise cannot be resolved with itself".to_string(),
                );
                self.reject_promise(promise, error);
                return;
            }
            let settled = inner.borrow().state.clone();
            match settled {
                PromiseState::Fulfilled(v) => self.resolve_promise(promise, v),
                PromiseState::Rejected(r) => self.reject_promise(promise, r),
                PromiseState::Pending => {
                    // Forward both outcomes once the inner promise settles.
                    let (resolve_fn, reject_fn) = self.resolving_functions(promise);
                    self.attach_promise_handler(
                        &inner,
                        Some(resolve_fn),
                        Some(reject_fn),
                        None,
                        "promise".to_string(),
                        None,
                    );
                }
            }
            return;
        }
        promise.borrow_mut().state = PromiseState::Fulfilled(value);
        self.flush_promise(promise);
    }

    pub(crate) fn reject_promise(&mut self, promise: &PromiseRef, reason: Value) {
        if !promise.borrow().state.is_pending() {
            return;
        }
        promise.borrow_mut().state = PromiseState::Rejected(reason);
        self.flush_promise(promise);
    }

    /// One-shot resolve/reject pair; whichever runs first wins.
    pub(crate) fn resolving_functions(&mut self, promise: &PromiseRef) -> (Value, Value) {
        let settled = Rc::new(Cell::new(false));

        let resolve = {
            let promise = promise.clone();
            let settled = settled.clone();
            NativeFunction::new("resolve", move |interp, args| {
                if !settled.get() {
                    settled.set(true);
                    let value = args.first().cloned().unwrap_or(Value::Undefined);
                    interp.resolve_promise(&promise, value);
                }
                Completion::Normal(Value::Undefined)
            })
        };
        let reject = {
            let promise = promise.clone();
            let settled = settled.clone();
            NativeFunction::new("reject", move |interp, args| {
                if !settled.get() {
                    settled.set(true);
                    let reason = args.first().cloned().unwrap_or(Value::Undefined);
                    interp.reject_promise(&promise, reason);
                }
                Completion::Normal(Value::Undefined)
            })
        };
        (resolve, reject)
    }

    /// Register a handler. If the promise is already settled the flush
    /// happens immediately; user callbacks still never run synchronously
    /// here, only via a scheduled microtask.
    pub(crate) fn attach_promise_handler(
        &mut self,
        promise: &PromiseRef,
        on_fulfilled: Option<Value>,
        on_rejected: Option<Value>,
        child: Option<PromiseRef>,
        label: String,
        task_id: Option<u64>,
    ) {
        promise.borrow_mut().handlers.push(PromiseHandler {
            on_fulfilled,
            on_rejected,
            child,
            label,
            task_id,
        });
        if !promise.borrow().state.is_pending() {
            self.flush_promise(promise);
        }
    }

    /// Move every queued handler into the microtask queue. Each handler
    /// becomes exactly one microtask.
    fn flush_promise(&mut self, promise: &PromiseRef) {
        let state = promise.borrow().state.clone();
        let outcome = match state {
            PromiseState::Pending => return,
            PromiseState::Fulfilled(v) => (true, v),
            PromiseState::Rejected(r) => (false, r),
        };
        let handlers = std::mem::take(&mut promise.borrow_mut().handlers);
        for handler in handlers {
            let (fulfilled, value) = (outcome.0, outcome.1.clone());
            let preassigned = handler.task_id;
            let label = handler.label.clone();
            self.schedule_microtask(
                label,
                TaskSource::Microtask,
                preassigned,
                Box::new(move |interp| {
                    interp.run_promise_handler(handler, fulfilled, value)
                }),
            );
        }
    }

    /// The microtask body for one handler: call the side that matches the
    /// outcome and settle the child from what it does.
    fn run_promise_handler(
        &mut self,
        handler: PromiseHandler,
        fulfilled: bool,
        value: Value,
    ) -> Completion {
        let callback = if fulfilled {
            handler.on_fulfilled
        } else {
            handler.on_rejected
        };
        match callback {
            Some(callback) => {
                let comp = if matches!(callback, Value::Native(_)) {
                    self.call_native_direct(&callback, &[value])
                } else {
                    self.call_function(&callback, &[value])
                };
                match comp {
                    Completion::Normal(result) => {
                        if let Some(child) = handler.child {
                            // A returned promise chains; anything else
                            // fulfills the child directly.
                            self.resolve_promise(&child, result);
                        }
                        Completion::Normal(Value::Undefined)
                    }
                    Completion::Throw(error) => match handler.child {
                        Some(child) => {
                            self.reject_promise(&child, error);
                            Completion::Normal(Value::Undefined)
                        }
                        // Nothing to absorb it: surface through the task
                        // error route.
                        None => Completion::Throw(error),
                    },
                    other => other,
                }
            }
            None => {
                // Absent handler: the outcome falls through to the child.
                if let Some(child) = handler.child {
                    if fulfilled {
                        self.resolve_promise(&child, value);
                    } else {
                        self.reject_promise(&child, value);
                    }
                    Completion::Normal(Value::Undefined)
                } else if fulfilled {
                    Completion::Normal(Value::Undefined)
                } else {
                    Completion::Throw(value)
                }
            }
        }
    }

    /// `.then` / `.catch` / `.finally` dispatch from the call protocol.
    pub(crate) fn call_promise_method(
        &mut self,
        promise: &PromiseRef,
        method: &str,
        args: &[Value],
    ) -> Completion {
        match method {
            "then" => {
                let on_fulfilled = args.first().filter(|v| v.is_callable()).cloned();
                let on_rejected = args.get(1).filter(|v| v.is_callable()).cloned();
                let label = handler_label(on_fulfilled.as_ref(), "then");
                Completion::Normal(Value::Promise(self.promise_then(
                    promise,
                    on_fulfilled,
                    on_rejected,
                    label,
                )))
            }
            "catch" => {
                let on_rejected = args.first().filter(|v| v.is_callable()).cloned();
                let label = handler_label(on_rejected.as_ref(), "catch");
                Completion::Normal(Value::Promise(self.promise_then(
                    promise,
                    None,
                    on_rejected,
                    label,
                )))
            }
            "finally" => {
                let callback = args.first().cloned().unwrap_or(Value::Undefined);
                Completion::Normal(Value::Promise(self.promise_finally(promise, callback)))
            }
            _ => self.throw_type_error(format!("promise.{method} is not a function")),
        }
    }

    pub(crate) fn promise_then(
        &mut self,
        promise: &PromiseRef,
        on_fulfilled: Option<Value>,
        on_rejected: Option<Value>,
        label: String,
    ) -> PromiseRef {
        let child = self.create_promise();
        self.attach_promise_handler(
            promise,
            on_fulfilled,
            on_rejected,
            Some(child.clone()),
            label,
            None,
        );
        child
    }

    /// Run the callback on either outcome, then forward the original
    /// outcome; a throw from the callback supersedes it.
    fn promise_finally(&mut self, promise: &PromiseRef, callback: Value) -> PromiseRef {
        if !callback.is_callable() {
            // Nothing to run; the child just mirrors the outcome.
            return self.promise_then(promise, None, None, "finally".to_string());
        }
        let on_fulfilled = {
            let callback = callback.clone();
            NativeFunction::new("finally", move |interp, args| {
                let original = args.first().cloned().unwrap_or(Value::Undefined);
                match interp.call_function(&callback, &[]) {
                    Completion::Throw(e) => Completion::Throw(e),
                    Completion::Normal(_) => Completion::Normal(original),
                    other => other,
                }
            })
        };
        let on_rejected = {
            let callback = callback.clone();
            NativeFunction::new("finally", move |interp, args| {
                let original = args.first().cloned().unwrap_or(Value::Undefined);
                match interp.call_function(&callback, &[]) {
                    Completion::Throw(e) => Completion::Throw(e),
                    Completion::Normal(_) => Completion::Throw(original),
                    other => other,
                }
            })
        };
        self.promise_then(
            promise,
            Some(on_fulfilled),
            Some(on_rejected),
            "finally".to_string(),
        )
    }

    // ----- the Promise global -----

    pub(crate) fn setup_promise_global(&mut self) {
        let mut statics = ObjectData::new();

        statics.set(
            "resolve",
            NativeFunction::new("Promise.resolve", |interp, args| {
                let value = args.first().cloned().unwrap_or(Value::Undefined);
                if let Value::Promise(p) = value {
                    return Completion::Normal(Value::Promise(p));
                }
                let promise = interp.create_promise();
                interp.resolve_promise(&promise, value);
                Completion::Normal(Value::Promise(promise))
            }),
        );
        statics.set(
            "reject",
            NativeFunction::new("Promise.reject", |interp, args| {
                let reason = args.first().cloned().unwrap_or(Value::Undefined);
                let promise = interp.create_promise();
                interp.reject_promise(&promise, reason);
                Completion::Normal(Value::Promise(promise))
            }),
        );
        statics.set(
            "all",
            NativeFunction::new("Promise.all", |interp, args| {
                let iterable = args.first().cloned().unwrap_or(Value::Undefined);
                interp.promise_all(iterable)
            }),
        );
        statics.set(
            "race",
            NativeFunction::new("Promise.race", |interp, args| {
                let iterable = args.first().cloned().unwrap_or(Value::Undefined);
                interp.promise_race(iterable)
            }),
        );

        let ctor = NativeFunction::with_properties(
            "Promise",
            |interp, args| {
                let executor = args.first().cloned().unwrap_or(Value::Undefined);
                if !executor.is_callable() {
                    return interp.throw_type_error("Promise resolver is not a function");
                }
                let promise = interp.create_promise();
                let (resolve_fn, reject_fn) = interp.resolving_functions(&promise);
                // The executor runs synchronously, right here.
                let comp = interp.call_function(&executor, &[resolve_fn, reject_fn]);
                if let Completion::Throw(error) = comp {
                    interp.reject_promise(&promise, error);
                }
                Completion::Normal(Value::Promise(promise))
            },
            statics,
        );

        Environment::define(&self.global_env, "Promise", ctor, BindingKind::Const);
    }

    fn promise_all(&mut self, iterable: Value) -> Completion {
        let items = match iterable {
            Value::Array(items) => items.borrow().clone(),
            other => {
                return self.throw_type_error(format!(
                    "{} is not iterable",
                    crate::value::stringify(&other)
                ))
            }
        };
        let result = self.create_promise();
        if items.is_empty() {
            let empty = Value::array(Vec::new());
            self.resolve_promise(&result, empty);
            return Completion::Normal(Value::Promise(result));
        }

        let remaining = Rc::new(Cell::new(items.len()));
        let collected = Rc::new(RefCell::new(vec![Value::Undefined; items.len()]));
        let (_, reject_fn) = self.resolving_functions(&result);

        for (index, item) in items.into_iter().enumerate() {
            let promise = self.promise_from_value(item);
            let on_fulfilled = {
                let remaining = remaining.clone();
                let collected = collected.clone();
                let result = result.clone();
                NativeFunction::new("Promise.all", move |interp, args| {
                    collected.borrow_mut()[index] =
                        args.first().cloned().unwrap_or(Value::Undefined);
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        let values = collected.borrow().clone();
                        interp.resolve_promise(&result, Value::array(values));
                    }
                    Completion::Normal(Value::Undefined)
                })
            };
            self.attach_promise_handler(
                &promise,
                Some(on_fulfilled),
                Some(reject_fn.clone()),
                None,
                "Promise.all".to_string(),
                None,
            );
        }
        Completion::Normal(Value::Promise(result))
    }

    fn promise_race(&mut self, iterable: Value) -> Completion {
        let items = match iterable {
            Value::Array(items) => items.borrow().clone(),
            other => {
                return self.throw_type_error(format!(
                    "{} is not iterable",
                    crate::value::stringify(&other)
                ))
            }
        };
        let result = self.create_promise();
        let (resolve_fn, reject_fn) = self.resolving_functions(&result);
        for item in items {
            let promise = self.promise_from_value(item);
            self.attach_promise_handler(
                &promise,
                Some(resolve_fn.clone()),
                Some(reject_fn.clone()),
                None,
                "Promise.race".to_string(),
                None,
            );
        }
        Completion::Normal(Value::Promise(result))
    }
}

fn handler_label(callback: Option<&Value>, fallback: &str) -> String {
    match callback.and_then(|v| v.callable_name()) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => fallback.to_string(),
    }
}
