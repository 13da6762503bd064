use std::rc::Rc;

use super::*;
use crate::ast::*;
use crate::trace::TaskSource;
use crate::value::NativeFunction;

use super::helpers::{strict_equality, to_boolean};

/// Runaway-loop guard; exceeding it raises a range error.
const LOOP_GUARD: u64 = 10_000;

/// The three statement shapes that can suspend an async function.
#[derive(Clone)]
enum AwaitForm {
    Bind { name: String, kind: BindingKind },
    Discard,
    Return,
}

impl Interpreter {
    /// Run `after` on the final completion of `comp`. When `comp` is
    /// suspended, the after-step is parked on the handle (with the async
    /// context it was created under) and the suspension propagates; this
    /// is how statement tails, `finally` blocks, and loop resumption
    /// survive an inner `await`.
    pub(crate) fn chain(
        &mut self,
        comp: Completion,
        after: impl FnOnce(&mut Interpreter, Completion) -> Completion + 'static,
    ) -> Completion {
        match comp {
            Completion::Suspended(handle) => {
                let ctx = self.async_ctx.clone();
                let out = SuspendHandle::new();
                let chained = out.clone();
                handle.on_complete(move |interp, inner| {
                    let saved = interp.async_ctx.take();
                    interp.async_ctx = ctx;
                    let next = after(interp, inner);
                    interp.async_ctx = saved;
                    chained.settle(interp, next);
                });
                Completion::Suspended(out)
            }
            other => after(self, other),
        }
    }

    pub(crate) fn exec_statements(&mut self, stmts: &[Statement], env: &EnvRef) -> Completion {
        self.hoist_functions(stmts, env);

        let mut result = Value::Undefined;
        let mut index = 0;
        while index < stmts.len() {
            let stmt = &stmts[index];
            self.current_line = Some(stmt.line);
            self.current_column = Some(stmt.column);

            let comp = if self.async_ctx.is_some() {
                match self.try_exec_await_statement(stmt, env) {
                    Some(comp) => comp,
                    None => self.exec_statement(stmt, env),
                }
            } else {
                self.exec_statement(stmt, env)
            };

            match comp {
                Completion::Normal(value) => {
                    result = value;
                    index += 1;
                }
                Completion::Suspended(handle) => {
                    // Park the rest of this list behind the suspension.
                    let tail: Rc<Vec<Statement>> = Rc::new(stmts[index + 1..].to_vec());
                    let env = env.clone();
                    return self.chain(Completion::Suspended(handle), move |interp, comp| {
                        match comp {
                            Completion::Normal(_) => interp.exec_statements(&tail, &env),
                            other => other,
                        }
                    });
                }
                other => return other,
            }
        }
        Completion::Normal(result)
    }

    /// First pass over a block body: register every function declaration
    /// before any statement runs.
    fn hoist_functions(&mut self, stmts: &[Statement], env: &EnvRef) {
        for stmt in stmts {
            if let StmtKind::FunctionDeclaration(decl) = &stmt.kind {
                let func = self.create_user_function(
                    decl.name.clone(),
                    decl.params.clone(),
                    decl.body.clone(),
                    env.clone(),
                    decl.is_async,
                    false,
                    decl.line,
                );
                Environment::define(env, &decl.name, func, BindingKind::Var);
            }
        }
    }

    pub(crate) fn exec_statement(&mut self, stmt: &Statement, env: &EnvRef) -> Completion {
        self.current_line = Some(stmt.line);
        self.current_column = Some(stmt.column);
        match &stmt.kind {
            StmtKind::Empty => Completion::Normal(Value::Undefined),
            StmtKind::Expression(expr) => self.eval_expr(expr, env),
            StmtKind::Block(stmts) => {
                let block_env = Environment::child(env, false);
                self.exec_statements(stmts, &block_env)
            }
            StmtKind::Variable(decl) => self.exec_variable_declaration(decl, env),
            StmtKind::If(if_stmt) => {
                let test = match self.eval_expr(&if_stmt.test, env) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                if to_boolean(&test) {
                    self.exec_statement(&if_stmt.consequent, env)
                } else if let Some(alt) = &if_stmt.alternate {
                    self.exec_statement(alt, env)
                } else {
                    Completion::Normal(Value::Undefined)
                }
            }
            StmtKind::While(w) => self.run_while(Rc::new(w.clone()), env.clone(), 0),
            StmtKind::DoWhile(dw) => self.run_do_while(Rc::new(dw.clone()), env.clone(), 0),
            StmtKind::For(f) => self.exec_for(f, env),
            StmtKind::Return(expr) => {
                let value = if let Some(e) = expr {
                    match self.eval_expr(e, env) {
                        Completion::Normal(v) => v,
                        other => return other,
                    }
                } else {
                    Value::Undefined
                };
                Completion::Return(value)
            }
            StmtKind::Break(label) => Completion::Break(label.clone()),
            StmtKind::Continue(label) => Completion::Continue(label.clone()),
            StmtKind::Throw(expr) => {
                let value = match self.eval_expr(expr, env) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                Completion::Throw(value)
            }
            StmtKind::Try(t) => self.exec_try(t, env),
            StmtKind::Switch(s) => self.exec_switch(s, env),
            // Labels are not tracked for targeted break/continue; the body
            // just runs.
            StmtKind::Labeled(_, body) => self.exec_statement(body, env),
            StmtKind::FunctionDeclaration(_) => Completion::Normal(Value::Undefined), // hoisted
        }
    }

    fn exec_variable_declaration(
        &mut self,
        decl: &VariableDeclaration,
        env: &EnvRef,
    ) -> Completion {
        let kind = match decl.kind {
            VarKind::Var => BindingKind::Var,
            VarKind::Let => BindingKind::Let,
            VarKind::Const => BindingKind::Const,
        };
        for d in &decl.declarations {
            let value = if let Some(init) = &d.init {
                match self.eval_with_name_hint(init, env, &d.name) {
                    Completion::Normal(v) => v,
                    other => return other,
                }
            } else {
                Value::Undefined
            };
            Environment::define(env, &d.name, value, kind);
        }
        Completion::Normal(Value::Undefined)
    }

    fn run_while(&mut self, w: Rc<WhileStatement>, env: EnvRef, mut iterations: u64) -> Completion {
        loop {
            if iterations >= LOOP_GUARD {
                return self.throw_range_error(format!("Loop exceeded {LOOP_GUARD} iterations"));
            }
            iterations += 1;
            let test = match self.eval_expr(&w.test, &env) {
                Completion::Normal(v) => v,
                other => return other,
            };
            if !to_boolean(&test) {
                break;
            }
            match self.exec_statement(&w.body, &env) {
                Completion::Normal(_) | Completion::Continue(_) => {}
                Completion::Break(_) => break,
                Completion::Suspended(handle) => {
                    let w = w.clone();
                    let env = env.clone();
                    return self.chain(Completion::Suspended(handle), move |interp, comp| {
                        match comp {
                            Completion::Normal(_) | Completion::Continue(_) => {
                                interp.run_while(w, env, iterations)
                            }
                            Completion::Break(_) => Completion::Normal(Value::Undefined),
                            other => other,
                        }
                    });
                }
                other => return other,
            }
        }
        Completion::Normal(Value::Undefined)
    }

    fn run_do_while(
        &mut self,
        dw: Rc<DoWhileStatement>,
        env: EnvRef,
        mut iterations: u64,
    ) -> Completion {
        loop {
            if iterations >= LOOP_GUARD {
                return self.throw_range_error(format!("Loop exceeded {LOOP_GUARD} iterations"));
            }
            iterations += 1;
            match self.exec_statement(&dw.body, &env) {
                Completion::Normal(_) | Completion::Continue(_) => {}
                Completion::Break(_) => break,
                Completion::Suspended(handle) => {
                    let dw = dw.clone();
                    let env = env.clone();
                    return self.chain(Completion::Suspended(handle), move |interp, comp| {
                        match comp {
                            Completion::Normal(_) | Completion::Continue(_) => {
                                let test = match interp.eval_expr(&dw.test, &env) {
                                    Completion::Normal(v) => v,
                                    other => return other,
                                };
                                if to_boolean(&test) {
                                    interp.run_do_while(dw.clone(), env.clone(), iterations)
                                } else {
                                    Completion::Normal(Value::Undefined)
                                }
                            }
                            Completion::Break(_) => Completion::Normal(Value::Undefined),
                            other => other,
                        }
                    });
                }
                other => return other,
            }
            let test = match self.eval_expr(&dw.test, &env) {
                Completion::Normal(v) => v,
                other => return other,
            };
            if !to_boolean(&test) {
                break;
            }
        }
        Completion::Normal(Value::Undefined)
    }

    fn exec_for(&mut self, f: &ForStatement, env: &EnvRef) -> Completion {
        let for_env = Environment::child(env, false);
        if let Some(init) = &f.init {
            let comp = match init {
                ForInit::Variable(decl) => self.exec_variable_declaration(decl, &for_env),
                ForInit::Expression(expr) => self.eval_expr(expr, &for_env),
            };
            if comp.is_abrupt() {
                return comp;
            }
        }
        self.run_for(Rc::new(f.clone()), for_env, 0, false)
    }

    /// `pending_update` is set when the loop resumes after its body
    /// suspended: the update expression still has to run before the next
    /// test.
    fn run_for(
        &mut self,
        f: Rc<ForStatement>,
        env: EnvRef,
        mut iterations: u64,
        mut pending_update: bool,
    ) -> Completion {
        loop {
            if pending_update {
                pending_update = false;
                if let Some(update) = &f.update {
                    let comp = self.eval_expr(update, &env);
                    if comp.is_abrupt() {
                        return comp;
                    }
                }
            }
            if iterations >= LOOP_GUARD {
                return self.throw_range_error(format!("Loop exceeded {LOOP_GUARD} iterations"));
            }
            iterations += 1;
            if let Some(test) = &f.test {
                let value = match self.eval_expr(test, &env) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                if !to_boolean(&value) {
                    break;
                }
            }
            match self.exec_statement(&f.body, &env) {
                Completion::Normal(_) | Completion::Continue(_) => {}
                Completion::Break(_) => break,
                Completion::Suspended(handle) => {
                    let f = f.clone();
                    let env = env.clone();
                    return self.chain(Completion::Suspended(handle), move |interp, comp| {
                        match comp {
                            Completion::Normal(_) | Completion::Continue(_) => {
                                interp.run_for(f, env, iterations, true)
                            }
                            Completion::Break(_) => Completion::Normal(Value::Undefined),
                            other => other,
                        }
                    });
                }
                other => return other,
            }
            pending_update = true;
        }
        Completion::Normal(Value::Undefined)
    }

    /// The catch and finally clauses run on the block's *final*
    /// completion, so a suspension inside the block (or inside catch)
    /// still flows through `finally` before anything settles.
    fn exec_try(&mut self, t: &TryStatement, env: &EnvRef) -> Completion {
        let block_env = Environment::child(env, false);
        let block_comp = self.exec_statements(&t.block, &block_env);
        let handler = t.handler.clone();
        let finalizer = t.finalizer.clone();
        let env = env.clone();
        self.chain(block_comp, move |interp, comp| {
            let handled = match comp {
                Completion::Throw(value) => match &handler {
                    Some(h) => {
                        let catch_env = Environment::child(&env, false);
                        if let Some(param) = &h.param {
                            Environment::define(&catch_env, param, value, BindingKind::Let);
                        }
                        interp.exec_statements(&h.body, &catch_env)
                    }
                    None => Completion::Throw(value),
                },
                other => other,
            };
            interp.chain(handled, move |interp, handled_comp| match finalizer {
                Some(fin) => {
                    let fin_env = Environment::child(&env, false);
                    let fin_comp = interp.exec_statements(&fin, &fin_env);
                    interp.chain(fin_comp, move |_interp, fin_result| {
                        // An abrupt finally supersedes the try outcome.
                        if fin_result.is_abrupt() {
                            fin_result
                        } else {
                            handled_comp
                        }
                    })
                }
                None => handled_comp,
            })
        })
    }

    fn exec_switch(&mut self, s: &SwitchStatement, env: &EnvRef) -> Completion {
        let disc = match self.eval_expr(&s.discriminant, env) {
            Completion::Normal(v) => v,
            other => return other,
        };
        let switch_env = Environment::child(env, false);
        let mut start = None;
        let mut default_idx = None;
        for (i, case) in s.cases.iter().enumerate() {
            let test = match &case.test {
                Some(test) => test,
                None => {
                    default_idx = Some(i);
                    continue;
                }
            };
            let value = match self.eval_expr(test, &switch_env) {
                Completion::Normal(v) => v,
                other => return other,
            };
            if strict_equality(&disc, &value) {
                start = Some(i);
                break;
            }
        }
        let start = match start.or(default_idx) {
            Some(start) => start,
            None => return Completion::Normal(Value::Undefined),
        };
        // Fall-through: from the matched case onward, the consequents run
        // as one list until a break.
        let body: Vec<Statement> = s.cases[start..]
            .iter()
            .flat_map(|case| case.consequent.clone())
            .collect();
        let comp = self.exec_statements(&body, &switch_env);
        self.chain(comp, |_interp, comp| match comp {
            Completion::Break(_) => Completion::Normal(Value::Undefined),
            other => other,
        })
    }

    // ----- async suspension -----

    /// Recognize the three suspension shapes. Returns None when the
    /// statement is not one of them (normal execution takes over).
    fn try_exec_await_statement(&mut self, stmt: &Statement, env: &EnvRef) -> Option<Completion> {
        let (inner, form) = match &stmt.kind {
            StmtKind::Variable(decl) if decl.declarations.len() == 1 => {
                let d = &decl.declarations[0];
                match &d.init {
                    Some(Expression::Await(inner)) => {
                        let kind = match decl.kind {
                            VarKind::Var => BindingKind::Var,
                            VarKind::Let => BindingKind::Let,
                            VarKind::Const => BindingKind::Const,
                        };
                        (
                            inner.as_ref(),
                            AwaitForm::Bind {
                                name: d.name.clone(),
                                kind,
                            },
                        )
                    }
                    _ => return None,
                }
            }
            StmtKind::Expression(Expression::Await(inner)) => (inner.as_ref(), AwaitForm::Discard),
            StmtKind::Return(Some(Expression::Await(inner))) => (inner.as_ref(), AwaitForm::Return),
            _ => return None,
        };

        let value = match self.eval_expr(inner, env) {
            Completion::Normal(v) => v,
            other => return Some(other),
        };
        Some(self.await_with_continuation(value, form, env))
    }

    /// Awaiting a non-promise proceeds inline. Awaiting a promise
    /// unwinds with `Suspended`; the enclosing statement lists and
    /// control constructs chain the rest of the function onto the
    /// handle, and the settle handlers below feed it the awaited
    /// outcome. An already-rejected promise throws right away.
    fn await_with_continuation(
        &mut self,
        value: Value,
        form: AwaitForm,
        env: &EnvRef,
    ) -> Completion {
        let promise = match value {
            Value::Promise(p) => p,
            other => {
                return match form {
                    AwaitForm::Bind { name, kind } => {
                        Environment::define(env, &name, other, kind);
                        Completion::Normal(Value::Undefined)
                    }
                    AwaitForm::Discard => Completion::Normal(Value::Undefined),
                    AwaitForm::Return => Completion::Return(other),
                };
            }
        };

        if let crate::value::PromiseState::Rejected(reason) = &promise.borrow().state {
            return Completion::Throw(reason.clone());
        }

        if self.async_ctx.is_none() {
            return Completion::Normal(Value::Undefined);
        }
        let label = match &form {
            AwaitForm::Bind { name, .. } => format!("await → {name}"),
            AwaitForm::Discard => "await".to_string(),
            AwaitForm::Return => "return await".to_string(),
        };

        // Announce the continuation now; the flush reuses this id when the
        // promise settles, so schedule and dequeue line up in the trace.
        let task_id = self.next_task_id();
        self.emit_here(StepPayload::ScheduleMicrotask {
            id: Some(task_id),
            label: label.clone(),
            source: TaskSource::Microtask,
        });

        let handle = SuspendHandle::new();
        let resolved = {
            let handle = handle.clone();
            let captured_env = env.clone();
            let form = form.clone();
            NativeFunction::new(label.clone(), move |interp, args| {
                let value = args.first().cloned().unwrap_or(Value::Undefined);
                let comp = match &form {
                    AwaitForm::Return => Completion::Return(value),
                    AwaitForm::Bind { name, kind } => {
                        Environment::define(&captured_env, name, value, *kind);
                        Completion::Normal(Value::Undefined)
                    }
                    AwaitForm::Discard => Completion::Normal(Value::Undefined),
                };
                handle.complete(interp, comp);
                Completion::Normal(Value::Undefined)
            })
        };
        let rejected = {
            let handle = handle.clone();
            NativeFunction::new(label.clone(), move |interp, args| {
                let reason = args.first().cloned().unwrap_or(Value::Undefined);
                handle.complete(interp, Completion::Throw(reason));
                Completion::Normal(Value::Undefined)
            })
        };

        self.attach_promise_handler(
            &promise,
            Some(resolved),
            Some(rejected),
            None,
            label,
            Some(task_id),
        );
        Completion::Suspended(handle)
    }
}
