use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::Interpreter;
use crate::value::{PromiseRef, Value};

/// Result of evaluating a node. `Normal` is a value; the rest are
/// control-flow sentinels that propagate until something handles them.
/// `Suspended` unwinds an async function whose `await` hit a promise;
/// the handle lets each enclosing construct (statement list, try,
/// loop) chain the work it still owes, so the async promise settles
/// only when the whole body has finished.
#[derive(Debug)]
pub enum Completion {
    Normal(Value),
    Return(Value),
    Throw(Value),
    Break(Option<String>),
    Continue(Option<String>),
    Suspended(SuspendHandle),
}

impl Completion {
    pub(crate) fn is_abrupt(&self) -> bool {
        !matches!(self, Completion::Normal(_))
    }
}

type ResumeFn = Box<dyn FnOnce(&mut Interpreter, Completion)>;

/// One link in a suspended computation. The side that unwinds registers
/// what remains to do (`on_complete`); the side that resumes delivers
/// the inner completion (`complete`/`settle`). Registration happens
/// synchronously while the stack unwinds, strictly before the resuming
/// microtask can fire.
pub struct SuspendHandle {
    resume: Rc<RefCell<Option<ResumeFn>>>,
}

impl Clone for SuspendHandle {
    fn clone(&self) -> Self {
        SuspendHandle {
            resume: self.resume.clone(),
        }
    }
}

impl std::fmt::Debug for SuspendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SuspendHandle(registered: {})",
            self.resume.borrow().is_some()
        )
    }
}

impl SuspendHandle {
    pub(crate) fn new() -> Self {
        SuspendHandle {
            resume: Rc::new(RefCell::new(None)),
        }
    }

    pub(crate) fn on_complete(&self, f: impl FnOnce(&mut Interpreter, Completion) + 'static) {
        *self.resume.borrow_mut() = Some(Box::new(f));
    }

    /// Deliver a finished (never `Suspended`) completion to whoever
    /// registered on this handle.
    pub(crate) fn complete(&self, interp: &mut Interpreter, comp: Completion) {
        let resume = self.resume.borrow_mut().take();
        if let Some(resume) = resume {
            resume(interp, comp);
        }
    }

    /// Like `complete`, but a completion that suspended again forwards
    /// its eventual result here instead.
    pub(crate) fn settle(&self, interp: &mut Interpreter, comp: Completion) {
        match comp {
            Completion::Suspended(inner) => {
                let this = self.clone();
                inner.on_complete(move |interp, comp| this.settle(interp, comp));
            }
            other => self.complete(interp, other),
        }
    }
}

pub type EnvRef = Rc<RefCell<Environment>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    Var,
    Let,
    Const,
}

#[derive(Debug)]
pub(crate) struct Binding {
    pub(crate) value: Value,
    pub(crate) kind: BindingKind,
}

/// What went wrong in a scope-chain write; the interpreter maps these to
/// reference/type errors.
#[derive(Debug, PartialEq, Eq)]
pub enum SetError {
    NotFound,
    ConstAssignment,
}

/// One lexical environment. `var` definitions skip upward to the nearest
/// `is_function_scope` environment; `let`/`const` stay local.
pub struct Environment {
    bindings: HashMap<String, Binding>,
    parent: Option<EnvRef>,
    is_function_scope: bool,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("names", &self.bindings.keys().collect::<Vec<_>>())
            .field("is_function_scope", &self.is_function_scope)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

impl Environment {
    pub fn new_global() -> EnvRef {
        Rc::new(RefCell::new(Environment {
            bindings: HashMap::new(),
            parent: None,
            is_function_scope: true,
        }))
    }

    pub fn child(parent: &EnvRef, is_function_scope: bool) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            bindings: HashMap::new(),
            parent: Some(parent.clone()),
            is_function_scope,
        }))
    }

    /// Define a binding. `var` rewrites upward to the nearest function
    /// scope before inserting; `let`/`const` insert here.
    pub fn define(env: &EnvRef, name: &str, value: Value, kind: BindingKind) {
        if kind == BindingKind::Var {
            let mut target = env.clone();
            loop {
                let next = {
                    let borrowed = target.borrow();
                    if borrowed.is_function_scope || borrowed.parent.is_none() {
                        None
                    } else {
                        borrowed.parent.clone()
                    }
                };
                match next {
                    Some(parent) => target = parent,
                    None => break,
                }
            }
            target
                .borrow_mut()
                .bindings
                .insert(name.to_string(), Binding { value, kind });
        } else {
            env.borrow_mut()
                .bindings
                .insert(name.to_string(), Binding { value, kind });
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(binding) = self.bindings.get(name) {
            return Some(binding.value.clone());
        }
        match &self.parent {
            Some(parent) => parent.borrow().get(name),
            None => None,
        }
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<(), SetError> {
        if let Some(binding) = self.bindings.get_mut(name) {
            if binding.kind == BindingKind::Const {
                return Err(SetError::ConstAssignment);
            }
            binding.value = value;
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.borrow_mut().set(name, value),
            None => Err(SetError::NotFound),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        if self.bindings.contains_key(name) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.borrow().has(name),
            None => false,
        }
    }
}

/// Carried while an async function body runs; receives the function's
/// eventual settlement.
#[derive(Clone)]
pub struct AsyncContext {
    pub promise: PromiseRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_defines_in_nearest_function_scope() {
        let global = Environment::new_global();
        let func = Environment::child(&global, true);
        let block = Environment::child(&func, false);

        Environment::define(&block, "x", Value::Number(1.0), BindingKind::Var);
        assert!(!block.borrow().bindings.contains_key("x"));
        assert!(func.borrow().bindings.contains_key("x"));
        assert!(!global.borrow().bindings.contains_key("x"));
    }

    #[test]
    fn let_defines_locally() {
        let global = Environment::new_global();
        let block = Environment::child(&global, false);
        Environment::define(&block, "y", Value::Number(2.0), BindingKind::Let);
        assert!(block.borrow().bindings.contains_key("y"));
        assert!(!global.borrow().bindings.contains_key("y"));
    }

    #[test]
    fn get_walks_the_parent_chain() {
        let global = Environment::new_global();
        Environment::define(&global, "z", Value::Number(3.0), BindingKind::Let);
        let inner = Environment::child(&Environment::child(&global, false), false);
        assert!(matches!(inner.borrow().get("z"), Some(Value::Number(n)) if n == 3.0));
        assert!(inner.borrow().get("missing").is_none());
    }

    #[test]
    fn set_rejects_const_and_missing_names() {
        let global = Environment::new_global();
        Environment::define(&global, "k", Value::Number(1.0), BindingKind::Const);
        assert_eq!(
            global.borrow_mut().set("k", Value::Number(2.0)),
            Err(SetError::ConstAssignment)
        );
        assert_eq!(
            global.borrow_mut().set("nope", Value::Null),
            Err(SetError::NotFound)
        );
    }

    #[test]
    fn shadowing_in_child_scope() {
        let global = Environment::new_global();
        Environment::define(&global, "v", Value::Number(1.0), BindingKind::Let);
        let inner = Environment::child(&global, false);
        Environment::define(&inner, "v", Value::Number(2.0), BindingKind::Let);
        assert!(matches!(inner.borrow().get("v"), Some(Value::Number(n)) if n == 2.0));
        assert!(matches!(global.borrow().get("v"), Some(Value::Number(n)) if n == 1.0));
    }
}
