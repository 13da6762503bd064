use std::rc::Rc;

use super::helpers::{
    eval_binary, eval_unary, strict_equality, to_boolean, to_js_string, to_number, typeof_value,
};
use super::*;
use crate::ast::*;
use crate::value::{number_to_string, ObjectData, PromiseState, UserFunction, Value};

impl Interpreter {
    pub(crate) fn eval_expr(&mut self, expr: &Expression, env: &EnvRef) -> Completion {
        match expr {
            Expression::Literal(lit) => Completion::Normal(eval_literal(lit)),
            Expression::Identifier(name) => match env.borrow().get(name) {
                Some(value) => Completion::Normal(value),
                None => self.throw_reference_error(format!("{name} is not defined")),
            },
            Expression::This => {
                Completion::Normal(env.borrow().get("this").unwrap_or(Value::Undefined))
            }
            Expression::Array(elements) => self.eval_array_literal(elements, env),
            Expression::Object(props) => self.eval_object_literal(props, env),
            Expression::Function(f) => Completion::Normal(self.create_user_function(
                f.name.clone().unwrap_or_default(),
                f.params.clone(),
                f.body.clone(),
                env.clone(),
                f.is_async,
                false,
                f.line,
            )),
            Expression::ArrowFunction(arrow) => {
                Completion::Normal(self.create_arrow_function(arrow, env, ""))
            }
            Expression::Unary(op, operand) => {
                let value = match self.eval_expr(operand, env) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                Completion::Normal(eval_unary(*op, &value))
            }
            Expression::Binary(op, left, right) => {
                let lhs = match self.eval_expr(left, env) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                let rhs = match self.eval_expr(right, env) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                Completion::Normal(eval_binary(*op, &lhs, &rhs))
            }
            Expression::Logical(op, left, right) => {
                let lhs = match self.eval_expr(left, env) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                let take_right = match op {
                    LogicalOp::And => to_boolean(&lhs),
                    LogicalOp::Or => !to_boolean(&lhs),
                    LogicalOp::NullishCoalescing => lhs.is_nullish(),
                };
                if take_right {
                    self.eval_expr(right, env)
                } else {
                    Completion::Normal(lhs)
                }
            }
            Expression::Update(op, prefix, target) => self.eval_update(*op, *prefix, target, env),
            Expression::Assign(op, target, value) => self.eval_assign(*op, target, value, env),
            Expression::Conditional(test, consequent, alternate) => {
                let value = match self.eval_expr(test, env) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                if to_boolean(&value) {
                    self.eval_expr(consequent, env)
                } else {
                    self.eval_expr(alternate, env)
                }
            }
            Expression::Call(callee, args) => self.eval_call(callee, args, env),
            Expression::New(callee, args) => self.eval_new(callee, args, env),
            Expression::Member(object, property) => {
                let receiver = match self.eval_expr(object, env) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                let key = match self.member_key(property, env) {
                    Ok(key) => key,
                    Err(comp) => return comp,
                };
                self.get_member(&receiver, &key)
            }
            Expression::Spread(inner) => self.eval_expr(inner, env),
            Expression::Await(inner) => self.eval_await_fallback(inner, env),
            Expression::Template(template) => self.eval_template(template, env),
            Expression::Typeof(operand) => self.eval_typeof(operand, env),
            Expression::Void(operand) => match self.eval_expr(operand, env) {
                Completion::Normal(_) => Completion::Normal(Value::Undefined),
                other => other,
            },
            Expression::Delete(operand) => {
                // The property is never actually removed; `delete` just
                // reports true (and evaluates its receiver).
                if let Expression::Member(object, _) = operand.as_ref() {
                    let comp = self.eval_expr(object, env);
                    if comp.is_abrupt() {
                        return comp;
                    }
                }
                Completion::Normal(Value::Bool(true))
            }
            Expression::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for e in exprs {
                    match self.eval_expr(e, env) {
                        Completion::Normal(v) => last = v,
                        other => return other,
                    }
                }
                Completion::Normal(last)
            }
        }
    }

    /// Variable initializers name the anonymous functions they bind, so
    /// stack frames read `tick` instead of `anonymous`.
    pub(crate) fn eval_with_name_hint(
        &mut self,
        expr: &Expression,
        env: &EnvRef,
        hint: &str,
    ) -> Completion {
        match expr {
            Expression::Function(f) if f.name.is_none() => {
                Completion::Normal(self.create_user_function(
                    hint.to_string(),
                    f.params.clone(),
                    f.body.clone(),
                    env.clone(),
                    f.is_async,
                    false,
                    f.line,
                ))
            }
            Expression::ArrowFunction(arrow) => {
                Completion::Normal(self.create_arrow_function(arrow, env, hint))
            }
            _ => self.eval_expr(expr, env),
        }
    }

    pub(crate) fn create_user_function(
        &mut self,
        name: String,
        params: Vec<String>,
        body: Vec<Statement>,
        closure: EnvRef,
        is_async: bool,
        is_arrow: bool,
        line: u32,
    ) -> Value {
        Value::Function(Rc::new(UserFunction {
            name,
            params,
            body,
            closure,
            is_async,
            is_arrow,
            line,
        }))
    }

    fn create_arrow_function(&mut self, arrow: &ArrowFunction, env: &EnvRef, hint: &str) -> Value {
        let body = match &arrow.body {
            ArrowBody::Block(stmts) => stmts.clone(),
            // An expression body is its own return statement.
            ArrowBody::Expression(expr) => vec![Statement {
                kind: StmtKind::Return(Some(expr.as_ref().clone())),
                line: arrow.line,
                column: 1,
            }],
        };
        self.create_user_function(
            hint.to_string(),
            arrow.params.clone(),
            body,
            env.clone(),
            arrow.is_async,
            true,
            arrow.line,
        )
    }

    fn eval_typeof(&mut self, operand: &Expression, env: &EnvRef) -> Completion {
        // An unresolvable name under typeof is "undefined", not an error.
        if let Expression::Identifier(name) = operand {
            if !env.borrow().has(name) {
                return Completion::Normal(Value::String("undefined".to_string()));
            }
        }
        match self.eval_expr(operand, env) {
            Completion::Normal(value) => {
                Completion::Normal(Value::String(typeof_value(&value).to_string()))
            }
            other => other,
        }
    }

    fn eval_update(
        &mut self,
        op: UpdateOp,
        prefix: bool,
        target: &Expression,
        env: &EnvRef,
    ) -> Completion {
        let old = match self.eval_expr(target, env) {
            Completion::Normal(v) => to_number(&v),
            other => return other,
        };
        let new = match op {
            UpdateOp::Increment => old + 1.0,
            UpdateOp::Decrement => old - 1.0,
        };
        let comp = self.assign_to_target(target, Value::Number(new), env);
        if comp.is_abrupt() {
            return comp;
        }
        Completion::Normal(Value::Number(if prefix { new } else { old }))
    }

    fn eval_assign(
        &mut self,
        op: AssignOp,
        target: &Expression,
        value_expr: &Expression,
        env: &EnvRef,
    ) -> Completion {
        let value = if op == AssignOp::Assign {
            let hint = match target {
                Expression::Identifier(name) => name.as_str(),
                _ => "",
            };
            match self.eval_with_name_hint(value_expr, env, hint) {
                Completion::Normal(v) => v,
                other => return other,
            }
        } else {
            let current = match self.eval_expr(target, env) {
                Completion::Normal(v) => v,
                other => return other,
            };
            let rhs = match self.eval_expr(value_expr, env) {
                Completion::Normal(v) => v,
                other => return other,
            };
            let binop = match op {
                AssignOp::AddAssign => BinaryOp::Add,
                AssignOp::SubAssign => BinaryOp::Sub,
                AssignOp::MulAssign => BinaryOp::Mul,
                AssignOp::DivAssign => BinaryOp::Div,
                AssignOp::ModAssign => BinaryOp::Mod,
                AssignOp::ExpAssign => BinaryOp::Exp,
                AssignOp::LShiftAssign => BinaryOp::LShift,
                AssignOp::RShiftAssign => BinaryOp::RShift,
                AssignOp::URShiftAssign => BinaryOp::URShift,
                AssignOp::BitAndAssign => BinaryOp::BitAnd,
                AssignOp::BitOrAssign => BinaryOp::BitOr,
                AssignOp::BitXorAssign => BinaryOp::BitXor,
                AssignOp::Assign => unreachable!(),
            };
            eval_binary(binop, &current, &rhs)
        };
        let comp = self.assign_to_target(target, value.clone(), env);
        if comp.is_abrupt() {
            return comp;
        }
        Completion::Normal(value)
    }

    fn assign_to_target(
        &mut self,
        target: &Expression,
        value: Value,
        env: &EnvRef,
    ) -> Completion {
        match target {
            Expression::Identifier(name) => match env.borrow_mut().set(name, value) {
                Ok(()) => Completion::Normal(Value::Undefined),
                Err(SetError::NotFound) => {
                    self.throw_reference_error(format!("{name} is not defined"))
                }
                Err(SetError::ConstAssignment) => {
                    self.throw_type_error("Assignment to constant variable.")
                }
            },
            Expression::Member(object, property) => {
                let receiver = match self.eval_expr(object, env) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                let key = match self.member_key(property, env) {
                    Ok(key) => key,
                    Err(comp) => return comp,
                };
                self.set_member(&receiver, &key, value)
            }
            _ => self.throw_type_error("Invalid assignment target"),
        }
    }

    fn member_key(
        &mut self,
        property: &MemberProperty,
        env: &EnvRef,
    ) -> Result<String, Completion> {
        match property {
            MemberProperty::Dot(name) => Ok(name.clone()),
            MemberProperty::Computed(expr) => match self.eval_expr(expr, env) {
                Completion::Normal(v) => Ok(to_js_string(&v)),
                other => Err(other),
            },
        }
    }

    pub(crate) fn get_member(&mut self, object: &Value, key: &str) -> Completion {
        match object {
            Value::Undefined | Value::Null => self.throw_type_error(format!(
                "Cannot read properties of {} (reading '{key}')",
                if object.is_undefined() { "undefined" } else { "null" }
            )),
            Value::Object(obj) => {
                Completion::Normal(obj.borrow().get(key).unwrap_or(Value::Undefined))
            }
            Value::Array(items) => {
                if key == "length" {
                    return Completion::Normal(Value::Number(items.borrow().len() as f64));
                }
                if let Ok(index) = key.parse::<usize>() {
                    return Completion::Normal(
                        items.borrow().get(index).cloned().unwrap_or(Value::Undefined),
                    );
                }
                Completion::Normal(Value::Undefined)
            }
            Value::String(s) => {
                if key == "length" {
                    return Completion::Normal(Value::Number(s.chars().count() as f64));
                }
                if let Ok(index) = key.parse::<usize>() {
                    return Completion::Normal(
                        s.chars()
                            .nth(index)
                            .map(|c| Value::String(c.to_string()))
                            .unwrap_or(Value::Undefined),
                    );
                }
                Completion::Normal(Value::Undefined)
            }
            Value::Native(native) => {
                if let Some(props) = &native.properties {
                    if let Some(value) = props.borrow().get(key) {
                        return Completion::Normal(value);
                    }
                }
                if key == "name" {
                    return Completion::Normal(Value::String(native.name.clone()));
                }
                Completion::Normal(Value::Undefined)
            }
            Value::Function(func) => {
                if key == "name" {
                    return Completion::Normal(Value::String(func.name.clone()));
                }
                if key == "length" {
                    return Completion::Normal(Value::Number(func.params.len() as f64));
                }
                Completion::Normal(Value::Undefined)
            }
            Value::Number(_) | Value::Bool(_) | Value::Promise(_) => {
                Completion::Normal(Value::Undefined)
            }
        }
    }

    fn set_member(&mut self, object: &Value, key: &str, value: Value) -> Completion {
        match object {
            Value::Undefined | Value::Null => self.throw_type_error(format!(
                "Cannot set properties of {} (setting '{key}')",
                if object.is_undefined() { "undefined" } else { "null" }
            )),
            Value::Object(obj) => {
                obj.borrow_mut().set(key, value);
                Completion::Normal(Value::Undefined)
            }
            Value::Array(items) => {
                if key == "length" {
                    let new_len = to_number(&value).max(0.0) as usize;
                    items.borrow_mut().resize(new_len, Value::Undefined);
                    return Completion::Normal(Value::Undefined);
                }
                if let Ok(index) = key.parse::<usize>() {
                    let mut items = items.borrow_mut();
                    if index >= items.len() {
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                }
                Completion::Normal(Value::Undefined)
            }
            // Writes to other primitives vanish, as they do on the real
            // platforms in sloppy mode.
            _ => Completion::Normal(Value::Undefined),
        }
    }

    // ----- calls -----

    fn eval_call(
        &mut self,
        callee: &Expression,
        args: &[Expression],
        env: &EnvRef,
    ) -> Completion {
        if let Expression::Member(object, property) = callee {
            let receiver = match self.eval_expr(object, env) {
                Completion::Normal(v) => v,
                other => return other,
            };
            let key = match self.member_key(property, env) {
                Ok(key) => key,
                Err(comp) => return comp,
            };

            if let Value::Promise(promise) = &receiver {
                if matches!(key.as_str(), "then" | "catch" | "finally") {
                    let promise = promise.clone();
                    let argv = match self.eval_spread_args(args, env) {
                        Ok(a) => a,
                        Err(comp) => return comp,
                    };
                    return self.call_promise_method(&promise, &key, &argv);
                }
            }
            if let Value::Array(items) = &receiver {
                if is_array_method(&key) {
                    let items = items.clone();
                    let argv = match self.eval_spread_args(args, env) {
                        Ok(a) => a,
                        Err(comp) => return comp,
                    };
                    return self.call_array_method(&items, &key, &argv);
                }
            }
            if let Value::String(text) = &receiver {
                if is_string_method(&key) {
                    let text = text.clone();
                    let argv = match self.eval_spread_args(args, env) {
                        Ok(a) => a,
                        Err(comp) => return comp,
                    };
                    return self.call_string_method(&text, &key, &argv);
                }
            }

            let method = match self.get_member(&receiver, &key) {
                Completion::Normal(v) => v,
                other => return other,
            };
            let argv = match self.eval_spread_args(args, env) {
                Ok(a) => a,
                Err(comp) => return comp,
            };
            if !method.is_callable() {
                return self
                    .throw_type_error(format!("{} is not a function", describe_callee(callee)));
            }
            return self.call_function_with_this(&method, receiver, &argv);
        }

        let callee_val = match self.eval_expr(callee, env) {
            Completion::Normal(v) => v,
            other => return other,
        };
        let argv = match self.eval_spread_args(args, env) {
            Ok(a) => a,
            Err(comp) => return comp,
        };
        if !callee_val.is_callable() {
            return self.throw_type_error(format!(
                "{} is not a function",
                describe_callee(callee)
            ));
        }
        self.call_function(&callee_val, &argv)
    }

    pub(crate) fn eval_spread_args(
        &mut self,
        args: &[Expression],
        env: &EnvRef,
    ) -> Result<Vec<Value>, Completion> {
        let mut out = Vec::new();
        for arg in args {
            match arg {
                Expression::Spread(inner) => {
                    let spread = match self.eval_expr(inner, env) {
                        Completion::Normal(v) => v,
                        other => return Err(other),
                    };
                    match spread {
                        Value::Array(items) => out.extend(items.borrow().iter().cloned()),
                        other => {
                            return Err(self.throw_type_error(format!(
                                "{} is not iterable",
                                to_js_string(&other)
                            )))
                        }
                    }
                }
                _ => match self.eval_expr(arg, env) {
                    Completion::Normal(v) => out.push(v),
                    other => return Err(other),
                },
            }
        }
        Ok(out)
    }

    pub(crate) fn call_function(&mut self, callee: &Value, args: &[Value]) -> Completion {
        self.call_function_with_this(callee, Value::Undefined, args)
    }

    pub(crate) fn call_function_with_this(
        &mut self,
        callee: &Value,
        this: Value,
        args: &[Value],
    ) -> Completion {
        match callee {
            Value::Native(native) => {
                let frame = self.push_frame(&native.name, self.current_line);
                if let Some(line) = self.current_line {
                    self.highlight(line);
                }
                let func = native.func.clone();
                let comp = func(self, args);
                self.pop_frame(frame);
                comp
            }
            Value::Function(func) => self.call_user_function(func.clone(), this, args),
            other => {
                self.throw_type_error(format!("{} is not a function", to_js_string(other)))
            }
        }
    }

    /// Invoke a native callback without tracing a stack frame; used by
    /// the scheduler plumbing (promise handler dispatch, forwarding
    /// resolvers) where no user call happened.
    pub(crate) fn call_native_direct(&mut self, callee: &Value, args: &[Value]) -> Completion {
        match callee {
            Value::Native(native) => {
                let func = native.func.clone();
                func(self, args)
            }
            _ => self.call_function(callee, args),
        }
    }

    fn call_user_function(
        &mut self,
        func: Rc<UserFunction>,
        this: Value,
        args: &[Value],
    ) -> Completion {
        if func.is_async {
            return self.call_async_function(func, this, args);
        }
        let func_env = self.bind_call_scope(&func, this, args);
        let frame = self.push_frame(frame_name(&func.name), Some(func.line));
        self.highlight(func.line);
        let comp = self.exec_statements(&func.body, &func_env);
        self.pop_frame(frame);
        match comp {
            Completion::Return(value) => Completion::Normal(value),
            Completion::Normal(_) | Completion::Break(_) | Completion::Continue(_) => {
                Completion::Normal(Value::Undefined)
            }
            other => other,
        }
    }

    /// An async call returns its promise immediately; the body runs until
    /// it completes or suspends on an `await`.
    fn call_async_function(
        &mut self,
        func: Rc<UserFunction>,
        this: Value,
        args: &[Value],
    ) -> Completion {
        let promise = self.create_promise();
        let func_env = self.bind_call_scope(&func, this, args);
        let frame = self.push_frame(frame_name(&func.name), Some(func.line));
        self.highlight(func.line);

        let saved = self.async_ctx.take();
        self.async_ctx = Some(AsyncContext {
            promise: promise.clone(),
        });
        let comp = self.exec_statements(&func.body, &func_env);
        self.async_ctx = saved;
        self.pop_frame(frame);

        match comp {
            Completion::Suspended(handle) => {
                // The body is parked on an await; settle when the chained
                // continuations deliver its final completion.
                let settled = promise.clone();
                handle.on_complete(move |interp, final_comp| match final_comp {
                    Completion::Return(value) => interp.resolve_promise(&settled, value),
                    Completion::Throw(reason) => interp.reject_promise(&settled, reason),
                    _ => interp.resolve_promise(&settled, Value::Undefined),
                });
            }
            Completion::Return(value) => self.resolve_promise(&promise, value),
            Completion::Throw(reason) => self.reject_promise(&promise, reason),
            Completion::Normal(_) | Completion::Break(_) | Completion::Continue(_) => {
                self.resolve_promise(&promise, Value::Undefined)
            }
        }
        Completion::Normal(Value::Promise(promise))
    }

    fn bind_call_scope(&mut self, func: &UserFunction, this: Value, args: &[Value]) -> EnvRef {
        let func_env = Environment::child(&func.closure, true);
        for (i, param) in func.params.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or(Value::Undefined);
            Environment::define(&func_env, param, value, BindingKind::Var);
        }
        if !func.is_arrow {
            Environment::define(
                &func_env,
                "arguments",
                Value::array(args.to_vec()),
                BindingKind::Var,
            );
            Environment::define(&func_env, "this", this, BindingKind::Var);
        }
        func_env
    }

    fn eval_new(
        &mut self,
        callee: &Expression,
        args: &[Expression],
        env: &EnvRef,
    ) -> Completion {
        let callee_val = match self.eval_expr(callee, env) {
            Completion::Normal(v) => v,
            other => return other,
        };
        let argv = match self.eval_spread_args(args, env) {
            Ok(a) => a,
            Err(comp) => return comp,
        };
        match &callee_val {
            Value::Function(_) => {
                let this_obj = Value::object(ObjectData::new());
                // An explicit constructor return value is ignored; the
                // fresh object is the result either way.
                match self.call_function_with_this(&callee_val, this_obj.clone(), &argv) {
                    Completion::Throw(e) => Completion::Throw(e),
                    comp @ Completion::Suspended(_) => comp,
                    _ => Completion::Normal(this_obj),
                }
            }
            Value::Native(_) => self.call_function(&callee_val, &argv),
            _ => self.throw_type_error(format!(
                "{} is not a constructor",
                describe_callee(callee)
            )),
        }
    }

    // ----- literals -----

    fn eval_array_literal(
        &mut self,
        elements: &[Option<Expression>],
        env: &EnvRef,
    ) -> Completion {
        let mut values = Vec::new();
        for element in elements {
            match element {
                None => values.push(Value::Undefined), // hole
                Some(Expression::Spread(inner)) => {
                    let spread = match self.eval_expr(inner, env) {
                        Completion::Normal(v) => v,
                        other => return other,
                    };
                    match spread {
                        Value::Array(items) => values.extend(items.borrow().iter().cloned()),
                        other => {
                            return self.throw_type_error(format!(
                                "{} is not iterable",
                                to_js_string(&other)
                            ))
                        }
                    }
                }
                Some(expr) => match self.eval_expr(expr, env) {
                    Completion::Normal(v) => values.push(v),
                    other => return other,
                },
            }
        }
        Completion::Normal(Value::array(values))
    }

    fn eval_object_literal(&mut self, props: &[Property], env: &EnvRef) -> Completion {
        let mut data = ObjectData::new();
        for prop in props {
            match &prop.key {
                PropertyKey::Spread => {
                    let spread = match self.eval_expr(&prop.value, env) {
                        Completion::Normal(v) => v,
                        other => return other,
                    };
                    match spread {
                        Value::Object(obj) => {
                            let obj = obj.borrow();
                            for key in obj.keys() {
                                data.set(key, obj.get(key).unwrap_or(Value::Undefined));
                            }
                        }
                        Value::Array(items) => {
                            for (i, item) in items.borrow().iter().enumerate() {
                                data.set(&i.to_string(), item.clone());
                            }
                        }
                        // Spreading a primitive adds nothing.
                        _ => {}
                    }
                }
                key => {
                    let key = match key {
                        PropertyKey::Identifier(name) => name.clone(),
                        PropertyKey::String(s) => s.clone(),
                        PropertyKey::Number(n) => number_to_string(*n),
                        PropertyKey::Computed(expr) => match self.eval_expr(expr, env) {
                            Completion::Normal(v) => to_js_string(&v),
                            other => return other,
                        },
                        PropertyKey::Spread => unreachable!(),
                    };
                    let value = match self.eval_with_name_hint(&prop.value, env, &key) {
                        Completion::Normal(v) => v,
                        other => return other,
                    };
                    data.set(&key, value);
                }
            }
        }
        Completion::Normal(Value::object(data))
    }

    fn eval_template(&mut self, template: &TemplateLiteral, env: &EnvRef) -> Completion {
        let mut out = String::new();
        for (i, quasi) in template.quasis.iter().enumerate() {
            out.push_str(quasi);
            if let Some(expr) = template.expressions.get(i) {
                match self.eval_expr(expr, env) {
                    Completion::Normal(v) => out.push_str(&to_js_string(&v)),
                    other => return other,
                }
            }
        }
        Completion::Normal(Value::String(out))
    }

    /// `await` outside the three statement forms: inspect the promise
    /// synchronously, draining microtasks in the hope that it settles.
    fn eval_await_fallback(&mut self, inner: &Expression, env: &EnvRef) -> Completion {
        let value = match self.eval_expr(inner, env) {
            Completion::Normal(v) => v,
            other => return other,
        };
        let promise = match value {
            Value::Promise(p) => p,
            other => return Completion::Normal(other),
        };
        for _ in 0..100 {
            let state = promise.borrow().state.clone();
            match state {
                PromiseState::Fulfilled(v) => return Completion::Normal(v),
                PromiseState::Rejected(r) => return Completion::Throw(r),
                PromiseState::Pending => {
                    if self.microtasks.is_empty() {
                        break;
                    }
                    self.drain_microtasks();
                }
            }
        }
        Completion::Normal(Value::Undefined)
    }

    // ----- built-in method dispatch on primitives -----

    fn call_array_method(
        &mut self,
        items: &crate::value::ArrayRef,
        name: &str,
        args: &[Value],
    ) -> Completion {
        match name {
            "push" => {
                items.borrow_mut().extend(args.iter().cloned());
                Completion::Normal(Value::Number(items.borrow().len() as f64))
            }
            "pop" => Completion::Normal(items.borrow_mut().pop().unwrap_or(Value::Undefined)),
            "shift" => {
                let mut items = items.borrow_mut();
                if items.is_empty() {
                    Completion::Normal(Value::Undefined)
                } else {
                    Completion::Normal(items.remove(0))
                }
            }
            "slice" => {
                let len = items.borrow().len() as i64;
                let start = slice_index(args.first(), 0, len);
                let end = slice_index(args.get(1), len, len);
                let out: Vec<Value> = if start < end {
                    items.borrow()[start as usize..end as usize].to_vec()
                } else {
                    Vec::new()
                };
                Completion::Normal(Value::array(out))
            }
            "join" => {
                let sep = match args.first() {
                    Some(Value::Undefined) | None => ",".to_string(),
                    Some(v) => to_js_string(v),
                };
                let parts: Vec<String> = items
                    .borrow()
                    .iter()
                    .map(|v| {
                        if v.is_nullish() {
                            String::new()
                        } else {
                            to_js_string(v)
                        }
                    })
                    .collect();
                Completion::Normal(Value::String(parts.join(&sep)))
            }
            "indexOf" => {
                let needle = args.first().cloned().unwrap_or(Value::Undefined);
                let index = items
                    .borrow()
                    .iter()
                    .position(|v| strict_equality(v, &needle));
                Completion::Normal(Value::Number(
                    index.map(|i| i as f64).unwrap_or(-1.0),
                ))
            }
            "includes" => {
                let needle = args.first().cloned().unwrap_or(Value::Undefined);
                // SameValueZero: strict equality, except NaN finds NaN.
                let found = items.borrow().iter().any(|v| {
                    strict_equality(v, &needle)
                        || matches!(
                            (v, &needle),
                            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan()
                        )
                });
                Completion::Normal(Value::Bool(found))
            }
            "map" | "filter" | "forEach" => {
                let callback = args.first().cloned().unwrap_or(Value::Undefined);
                if !callback.is_callable() {
                    return self.throw_type_error(format!(
                        "{} is not a function",
                        to_js_string(&callback)
                    ));
                }
                let snapshot: Vec<Value> = items.borrow().clone();
                let mut out = Vec::new();
                for (i, item) in snapshot.into_iter().enumerate() {
                    let call_args = [item.clone(), Value::Number(i as f64)];
                    let result = match self.call_function(&callback, &call_args) {
                        Completion::Normal(v) => v,
                        other => return other,
                    };
                    match name {
                        "map" => out.push(result),
                        "filter" => {
                            if to_boolean(&result) {
                                out.push(item);
                            }
                        }
                        _ => {}
                    }
                }
                match name {
                    "forEach" => Completion::Normal(Value::Undefined),
                    _ => Completion::Normal(Value::array(out)),
                }
            }
            _ => self.throw_type_error(format!("array.{name} is not a function")),
        }
    }

    fn call_string_method(&mut self, text: &str, name: &str, args: &[Value]) -> Completion {
        match name {
            "toUpperCase" => Completion::Normal(Value::String(text.to_uppercase())),
            "toLowerCase" => Completion::Normal(Value::String(text.to_lowercase())),
            "includes" => {
                let needle = args.first().map(to_js_string).unwrap_or_default();
                Completion::Normal(Value::Bool(text.contains(&needle)))
            }
            "slice" => {
                let chars: Vec<char> = text.chars().collect();
                let len = chars.len() as i64;
                let start = slice_index(args.first(), 0, len);
                let end = slice_index(args.get(1), len, len);
                let out: String = if start < end {
                    chars[start as usize..end as usize].iter().collect()
                } else {
                    String::new()
                };
                Completion::Normal(Value::String(out))
            }
            _ => self.throw_type_error(format!("string.{name} is not a function")),
        }
    }
}

fn eval_literal(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Undefined => Value::Undefined,
        Literal::Boolean(b) => Value::Bool(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::String(s.clone()),
    }
}

pub(crate) fn frame_name(name: &str) -> &str {
    if name.is_empty() {
        "anonymous"
    } else {
        name
    }
}

fn is_array_method(name: &str) -> bool {
    matches!(
        name,
        "push" | "pop" | "shift" | "slice" | "join" | "indexOf" | "includes" | "map" | "filter"
            | "forEach"
    )
}

fn is_string_method(name: &str) -> bool {
    matches!(name, "toUpperCase" | "toLowerCase" | "includes" | "slice")
}

fn slice_index(arg: Option<&Value>, default: i64, len: i64) -> i64 {
    let raw = match arg {
        Some(Value::Undefined) | None => return default.clamp(0, len),
        Some(v) => to_number(v),
    };
    if raw.is_nan() {
        return 0;
    }
    let raw = raw as i64;
    if raw < 0 {
        (len + raw).clamp(0, len)
    } else {
        raw.clamp(0, len)
    }
}

fn describe_callee(expr: &Expression) -> String {
    match expr {
        Expression::Identifier(name) => name.clone(),
        Expression::Member(object, MemberProperty::Dot(name)) => match object.as_ref() {
            Expression::Identifier(base) => format!("{base}.{name}"),
            _ => name.clone(),
        },
        _ => "expression".to_string(),
    }
}
