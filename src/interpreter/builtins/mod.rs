//! Global scope population: console, timers, Promise, Math, JSON, Array,
//! and the loose numeric/string globals.

use super::helpers::{self, to_boolean, to_js_string, to_number};
use super::*;
use crate::value::{NativeFunction, ObjectData, Value};

mod promise;
mod timers;

impl Interpreter {
    pub(crate) fn setup_globals(&mut self) {
        self.setup_value_globals();
        self.setup_console();
        self.setup_math();
        self.setup_json();
        self.setup_array_global();
        self.setup_date();
        self.setup_promise_global();
        self.setup_timer_globals();
    }

    fn setup_value_globals(&mut self) {
        for (name, value) in [
            ("undefined", Value::Undefined),
            ("NaN", Value::Number(f64::NAN)),
            ("Infinity", Value::Number(f64::INFINITY)),
        ] {
            Environment::define(&self.global_env, name, value, BindingKind::Const);
        }

        let parse_int = NativeFunction::new("parseInt", |_interp, args| {
            let text = args.first().map(to_js_string).unwrap_or_default();
            let radix = args.get(1).map(to_number).unwrap_or(f64::NAN);
            Completion::Normal(Value::Number(parse_int_impl(&text, radix)))
        });
        Environment::define(&self.global_env, "parseInt", parse_int, BindingKind::Const);

        let parse_float = NativeFunction::new("parseFloat", |_interp, args| {
            let text = args.first().map(to_js_string).unwrap_or_default();
            Completion::Normal(Value::Number(parse_float_impl(&text)))
        });
        Environment::define(
            &self.global_env,
            "parseFloat",
            parse_float,
            BindingKind::Const,
        );

        let is_nan = NativeFunction::new("isNaN", |_interp, args| {
            let n = args.first().map(to_number).unwrap_or(f64::NAN);
            Completion::Normal(Value::Bool(n.is_nan()))
        });
        Environment::define(&self.global_env, "isNaN", is_nan, BindingKind::Const);

        let is_finite = NativeFunction::new("isFinite", |_interp, args| {
            let n = args.first().map(to_number).unwrap_or(f64::NAN);
            Completion::Normal(Value::Bool(n.is_finite()))
        });
        Environment::define(&self.global_env, "isFinite", is_finite, BindingKind::Const);

        let string_fn = NativeFunction::new("String", |_interp, args| {
            let text = args.first().map(to_js_string).unwrap_or_default();
            Completion::Normal(Value::String(text))
        });
        Environment::define(&self.global_env, "String", string_fn, BindingKind::Const);

        let number_fn = NativeFunction::new("Number", |_interp, args| {
            let n = args.first().map(to_number).unwrap_or(0.0);
            Completion::Normal(Value::Number(n))
        });
        Environment::define(&self.global_env, "Number", number_fn, BindingKind::Const);

        let boolean_fn = NativeFunction::new("Boolean", |_interp, args| {
            let b = args.first().map(to_boolean).unwrap_or(false);
            Completion::Normal(Value::Bool(b))
        });
        Environment::define(&self.global_env, "Boolean", boolean_fn, BindingKind::Const);
    }

    fn setup_console(&mut self) {
        let mut console = ObjectData::new();
        console.set(
            "log",
            NativeFunction::new("console.log", |interp, args| {
                interp.console_emit(ConsoleLevel::Log, args);
                Completion::Normal(Value::Undefined)
            }),
        );
        console.set(
            "warn",
            NativeFunction::new("console.warn", |interp, args| {
                interp.console_emit(ConsoleLevel::Warn, args);
                Completion::Normal(Value::Undefined)
            }),
        );
        console.set(
            "error",
            NativeFunction::new("console.error", |interp, args| {
                interp.console_emit(ConsoleLevel::Error, args);
                Completion::Normal(Value::Undefined)
            }),
        );
        Environment::define(
            &self.global_env,
            "console",
            Value::object(console),
            BindingKind::Const,
        );
    }

    fn setup_math(&mut self) {
        let mut math = ObjectData::new();
        math.set("PI", Value::Number(std::f64::consts::PI));
        math.set("E", Value::Number(std::f64::consts::E));

        for (name, op) in [
            ("floor", f64::floor as fn(f64) -> f64),
            ("ceil", f64::ceil),
            ("abs", f64::abs),
            ("sqrt", f64::sqrt),
            ("trunc", f64::trunc),
        ] {
            let full = format!("Math.{name}");
            math.set(
                name,
                NativeFunction::new(full, move |_interp, args| {
                    let n = args.first().map(to_number).unwrap_or(f64::NAN);
                    Completion::Normal(Value::Number(op(n)))
                }),
            );
        }

        math.set(
            "round",
            NativeFunction::new("Math.round", |_interp, args| {
                let n = args.first().map(to_number).unwrap_or(f64::NAN);
                // Half-up, like the platform: round(-0.5) is 0, not -1.
                Completion::Normal(Value::Number((n + 0.5).floor()))
            }),
        );
        math.set(
            "sign",
            NativeFunction::new("Math.sign", |_interp, args| {
                let n = args.first().map(to_number).unwrap_or(f64::NAN);
                let s = if n.is_nan() || n == 0.0 { n } else { n.signum() };
                Completion::Normal(Value::Number(s))
            }),
        );
        math.set(
            "pow",
            NativeFunction::new("Math.pow", |_interp, args| {
                let base = args.first().map(to_number).unwrap_or(f64::NAN);
                let exp = args.get(1).map(to_number).unwrap_or(f64::NAN);
                Completion::Normal(Value::Number(base.powf(exp)))
            }),
        );
        math.set(
            "min",
            NativeFunction::new("Math.min", |_interp, args| {
                Completion::Normal(Value::Number(fold_extremum(args, f64::INFINITY, f64::min)))
            }),
        );
        math.set(
            "max",
            NativeFunction::new("Math.max", |_interp, args| {
                Completion::Normal(Value::Number(fold_extremum(
                    args,
                    f64::NEG_INFINITY,
                    f64::max,
                )))
            }),
        );
        math.set(
            "random",
            NativeFunction::new("Math.random", |interp, _args| {
                Completion::Normal(Value::Number(interp.next_random()))
            }),
        );

        Environment::define(
            &self.global_env,
            "Math",
            Value::object(math),
            BindingKind::Const,
        );
    }

    fn setup_json(&mut self) {
        let mut json = ObjectData::new();
        json.set(
            "stringify",
            NativeFunction::new("JSON.stringify", |_interp, args| {
                let value = args.first().cloned().unwrap_or(Value::Undefined);
                match json_from_value(&value, 0) {
                    Some(v) => Completion::Normal(Value::String(v.to_string())),
                    None => Completion::Normal(Value::Undefined),
                }
            }),
        );
        json.set(
            "parse",
            NativeFunction::new("JSON.parse", |_interp, args| {
                let text = args.first().map(to_js_string).unwrap_or_default();
                match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(parsed) => Completion::Normal(value_from_json(&parsed)),
                    Err(err) => Completion::Throw(Value::String(format!(
                        "SyntaxError: JSON.parse: {err}"
                    ))),
                }
            }),
        );
        Environment::define(
            &self.global_env,
            "JSON",
            Value::object(json),
            BindingKind::Const,
        );
    }

    fn setup_array_global(&mut self) {
        let mut statics = ObjectData::new();
        statics.set(
            "isArray",
            NativeFunction::new("Array.isArray", |_interp, args| {
                let is_array = matches!(args.first(), Some(Value::Array(_)));
                Completion::Normal(Value::Bool(is_array))
            }),
        );
        statics.set(
            "of",
            NativeFunction::new("Array.of", |_interp, args| {
                Completion::Normal(Value::array(args.to_vec()))
            }),
        );
        statics.set(
            "from",
            NativeFunction::new("Array.from", |interp, args| {
                let source = args.first().cloned().unwrap_or(Value::Undefined);
                let map_fn = args.get(1).cloned().filter(|v| v.is_callable());
                let items = array_like_items(interp, &source);
                let items = match items {
                    Ok(items) => items,
                    Err(comp) => return comp,
                };
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    match &map_fn {
                        Some(f) => {
                            let mapped = interp
                                .call_function(f, &[item, Value::Number(index as f64)]);
                            match mapped {
                                Completion::Normal(v) => out.push(v),
                                other => return other,
                            }
                        }
                        None => out.push(item),
                    }
                }
                Completion::Normal(Value::array(out))
            }),
        );

        let ctor = NativeFunction::with_properties(
            "Array",
            |_interp, args| {
                // Array(n) pre-sizes; any other arity lists its arguments.
                if args.len() == 1 {
                    if let Value::Number(n) = &args[0] {
                        let len = if n.is_finite() && *n >= 0.0 {
                            *n as usize
                        } else {
                            0
                        };
                        return Completion::Normal(Value::array(vec![Value::Undefined; len]));
                    }
                }
                Completion::Normal(Value::array(args.to_vec()))
            },
            statics,
        );
        Environment::define(&self.global_env, "Array", ctor, BindingKind::Const);
    }

    fn setup_date(&mut self) {
        let mut date = ObjectData::new();
        date.set(
            "now",
            NativeFunction::new("Date.now", |interp, _args| {
                Completion::Normal(Value::Number(interp.now_ms as f64))
            }),
        );
        Environment::define(
            &self.global_env,
            "Date",
            Value::object(date),
            BindingKind::Const,
        );
    }
}

fn fold_extremum(args: &[Value], identity: f64, pick: fn(f64, f64) -> f64) -> f64 {
    let mut acc = identity;
    for arg in args {
        let n = to_number(arg);
        if n.is_nan() {
            return f64::NAN;
        }
        acc = pick(acc, n);
    }
    acc
}

fn array_like_items(
    interp: &mut Interpreter,
    source: &Value,
) -> Result<Vec<Value>, Completion> {
    match source {
        Value::Array(items) => Ok(items.borrow().clone()),
        Value::String(text) => Ok(text
            .chars()
            .map(|c| Value::String(c.to_string()))
            .collect()),
        Value::Object(obj) => {
            let len = obj
                .borrow()
                .get("length")
                .map(|v| to_number(&v))
                .unwrap_or(0.0);
            let len = if len.is_finite() && len > 0.0 {
                len as usize
            } else {
                0
            };
            let mut out = Vec::with_capacity(len);
            for i in 0..len {
                out.push(
                    obj.borrow()
                        .get(&i.to_string())
                        .unwrap_or(Value::Undefined),
                );
            }
            Ok(out)
        }
        Value::Undefined | Value::Null => Err(interp.throw_type_error(format!(
            "{} is not iterable",
            helpers::to_js_string(source)
        ))),
        _ => Ok(Vec::new()),
    }
}

/// JSON.stringify projection: None means "omitted" (undefined, functions,
/// promises); inside arrays those become null.
fn json_from_value(value: &Value, depth: usize) -> Option<serde_json::Value> {
    if depth > 16 {
        return Some(serde_json::Value::Null);
    }
    match value {
        Value::Undefined | Value::Function(_) | Value::Native(_) | Value::Promise(_) => None,
        Value::Null => Some(serde_json::Value::Null),
        Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
        Value::Number(n) => Some(
            serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        ),
        Value::String(s) => Some(serde_json::Value::String(s.clone())),
        Value::Array(items) => Some(serde_json::Value::Array(
            items
                .borrow()
                .iter()
                .map(|item| json_from_value(item, depth + 1).unwrap_or(serde_json::Value::Null))
                .collect(),
        )),
        Value::Object(obj) => {
            let obj = obj.borrow();
            let mut map = serde_json::Map::new();
            for key in obj.keys() {
                let item = obj.get(key).unwrap_or(Value::Undefined);
                if let Some(v) = json_from_value(&item, depth + 1) {
                    map.insert(key.clone(), v);
                }
            }
            Some(serde_json::Value::Object(map))
        }
    }
}

fn value_from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => {
            Value::array(items.iter().map(value_from_json).collect())
        }
        serde_json::Value::Object(map) => {
            let mut data = ObjectData::new();
            for (key, item) in map {
                data.set(key, value_from_json(item));
            }
            Value::object(data)
        }
    }
}

fn parse_int_impl(text: &str, radix: f64) -> f64 {
    let mut chars = text.trim_start().chars().peekable();
    let mut sign = 1.0;
    if matches!(chars.peek(), Some('+') | Some('-')) {
        if chars.next() == Some('-') {
            sign = -1.0;
        }
    }
    let mut radix = if radix.is_finite() && radix >= 2.0 && radix <= 36.0 {
        radix as u32
    } else {
        10
    };
    let rest: String = chars.collect();
    let mut body = rest.as_str();
    if (radix == 16 || radix == 10) && (body.starts_with("0x") || body.starts_with("0X")) {
        // A 0x prefix selects hexadecimal when the radix allows it.
        if radix == 10 && !rest.is_empty() {
            radix = 16;
        }
        body = &body[2..];
    }
    let mut value = 0.0f64;
    let mut seen = false;
    for c in body.chars() {
        match c.to_digit(radix) {
            Some(d) => {
                seen = true;
                value = value * radix as f64 + d as f64;
            }
            None => break,
        }
    }
    if seen {
        sign * value
    } else {
        f64::NAN
    }
}

fn parse_float_impl(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let mut end = 0;
    let bytes = trimmed.as_bytes();
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    while end < bytes.len() {
        let c = bytes[end] as char;
        match c {
            '+' | '-' if end == 0 => {}
            '+' | '-' if seen_exp && matches!(bytes[end - 1] as char, 'e' | 'E') => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot && !seen_exp => seen_dot = true,
            'e' | 'E' if seen_digit && !seen_exp => seen_exp = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return f64::NAN;
    }
    trimmed[..end].parse().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_variants() {
        assert_eq!(parse_int_impl("42", f64::NAN), 42.0);
        assert_eq!(parse_int_impl("  -17px", f64::NAN), -17.0);
        assert_eq!(parse_int_impl("0xff", f64::NAN), 255.0);
        assert_eq!(parse_int_impl("101", 2.0), 5.0);
        assert!(parse_int_impl("px", f64::NAN).is_nan());
    }

    #[test]
    fn parse_float_variants() {
        assert_eq!(parse_float_impl("3.25rem"), 3.25);
        assert_eq!(parse_float_impl("  -1e2x"), -100.0);
        assert!(parse_float_impl("abc").is_nan());
    }

    #[test]
    fn json_round_trip_drops_undefined_object_members() {
        let mut data = ObjectData::new();
        data.set("keep", Value::Number(1.0));
        data.set("drop", Value::Undefined);
        let json = json_from_value(&Value::object(data), 0).unwrap();
        assert_eq!(json, serde_json::json!({"keep": 1.0}));
    }

    #[test]
    fn json_arrays_null_out_undefined() {
        let arr = Value::array(vec![Value::Undefined, Value::Number(2.0)]);
        let json = json_from_value(&arr, 0).unwrap();
        assert_eq!(json, serde_json::json!([null, 2.0]));
    }
}
