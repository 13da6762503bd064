use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::Statement;
use crate::interpreter::{Completion, EnvRef, Interpreter};

pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
pub type ObjectRef = Rc<RefCell<ObjectData>>;
pub type PromiseRef = Rc<RefCell<SimPromise>>;

/// Runtime value. Reference variants share their backing store; strict
/// equality on them is pointer identity.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Rc<UserFunction>),
    Native(Rc<NativeFunction>),
    Promise(PromiseRef),
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Array(_) => write!(f, "Array(..)"),
            Value::Object(_) => write!(f, "Object(..)"),
            Value::Function(func) => write!(f, "Function({:?})", func.name),
            Value::Native(func) => write!(f, "Native({:?})", func.name),
            Value::Promise(p) => write!(f, "Promise(#{})", p.borrow().id),
        }
    }
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    pub fn array(values: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(values)))
    }

    pub fn object(data: ObjectData) -> Value {
        Value::Object(Rc::new(RefCell::new(data)))
    }

    /// Name used for stack frames and trace labels.
    pub fn callable_name(&self) -> Option<&str> {
        match self {
            Value::Function(func) => Some(&func.name),
            Value::Native(func) => Some(&func.name),
            _ => None,
        }
    }
}

/// Property storage with an insertion-order key list. The mapping
/// semantics ignores order; stringification must not, or the trace
/// would differ between runs.
#[derive(Debug, Default)]
pub struct ObjectData {
    properties: HashMap<String, Value>,
    order: Vec<String>,
}

impl ObjectData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.properties.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, value: Value) {
        if !self.properties.contains_key(key) {
            self.order.push(key.to_string());
        }
        self.properties.insert(key.to_string(), value);
    }

    pub fn has(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Immutable once created; closures share the captured scope.
pub struct UserFunction {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
    pub closure: EnvRef,
    pub is_async: bool,
    pub is_arrow: bool,
    pub line: u32,
}

pub type NativeFn = dyn Fn(&mut Interpreter, &[Value]) -> Completion;

/// Built-in function. `properties` backs callables that double as
/// namespaces (`Promise.resolve`, `Array.isArray`).
pub struct NativeFunction {
    pub name: String,
    pub func: Rc<NativeFn>,
    pub properties: Option<ObjectRef>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&mut Interpreter, &[Value]) -> Completion + 'static,
    ) -> Value {
        Value::Native(Rc::new(NativeFunction {
            name: name.into(),
            func: Rc::new(func),
            properties: None,
        }))
    }

    pub fn with_properties(
        name: impl Into<String>,
        func: impl Fn(&mut Interpreter, &[Value]) -> Completion + 'static,
        properties: ObjectData,
    ) -> Value {
        Value::Native(Rc::new(NativeFunction {
            name: name.into(),
            func: Rc::new(func),
            properties: Some(Rc::new(RefCell::new(properties))),
        }))
    }
}

// ---------------------------------------------------------------------------
// Simulated promises
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SimPromise {
    pub id: u64,
    pub state: PromiseState,
    pub handlers: Vec<PromiseHandler>,
}

#[derive(Clone, Debug)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

impl PromiseState {
    pub fn name(&self) -> &'static str {
        match self {
            PromiseState::Pending => "pending",
            PromiseState::Fulfilled(_) => "fulfilled",
            PromiseState::Rejected(_) => "rejected",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, PromiseState::Pending)
    }
}

/// One `.then`-style registration. `task_id` is set when the microtask id
/// was already announced in the trace at attach time (await
/// continuations), so the flush reuses it instead of emitting a second
/// schedule event.
pub struct PromiseHandler {
    pub on_fulfilled: Option<Value>,
    pub on_rejected: Option<Value>,
    pub child: Option<PromiseRef>,
    pub label: String,
    pub task_id: Option<u64>,
}

impl std::fmt::Debug for PromiseHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromiseHandler")
            .field("label", &self.label)
            .field("task_id", &self.task_id)
            .field("has_child", &self.child.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Stringification
// ---------------------------------------------------------------------------

const MAX_RENDER_DEPTH: usize = 6;

/// Console-style rendering: bare strings at the top level, quoted inside
/// containers.
pub fn stringify(value: &Value) -> String {
    render(value, 0, false)
}

fn render(value: &Value, depth: usize, quote_strings: bool) -> String {
    if depth > MAX_RENDER_DEPTH {
        return "…".to_string();
    }
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(*n),
        Value::String(s) => {
            if quote_strings {
                format!("'{s}'")
            } else {
                s.clone()
            }
        }
        Value::Array(items) => {
            let parts: Vec<String> = items
                .borrow()
                .iter()
                .map(|item| render(item, depth + 1, true))
                .collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Object(obj) => {
            let obj = obj.borrow();
            let parts: Vec<String> = obj
                .keys()
                .map(|key| {
                    let val = obj.get(key).unwrap_or(Value::Undefined);
                    format!("{key}: {}", render(&val, depth + 1, true))
                })
                .collect();
            if parts.is_empty() {
                "{}".to_string()
            } else {
                format!("{{{}}}", parts.join(", "))
            }
        }
        Value::Function(func) => format!("[Function: {}]", display_name(&func.name)),
        Value::Native(func) => format!("[Function: {}]", display_name(&func.name)),
        Value::Promise(p) => format!("Promise {{<{}>}}", p.borrow().state.name()),
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "anonymous"
    } else {
        name
    }
}

/// JS number-to-string: no trailing `.0` on integral values, `NaN`,
/// signed `Infinity`, and negative zero renders as plain `0`.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e21 {
        return format!("{}", n as i64);
    }
    format!("{n}")
}

/// Projection of a runtime value into JSON for the `raw` field of console
/// payloads (and `JSON.stringify`). Functions and promises render as their
/// console strings; `undefined` maps to JSON null.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    json_render(value, 0)
}

fn json_render(value: &Value, depth: usize) -> serde_json::Value {
    if depth > MAX_RENDER_DEPTH {
        return serde_json::Value::String("…".to_string());
    }
    match value {
        Value::Undefined | Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => serde_json::Value::Array(
            items
                .borrow()
                .iter()
                .map(|item| json_render(item, depth + 1))
                .collect(),
        ),
        Value::Object(obj) => {
            let obj = obj.borrow();
            let mut map = serde_json::Map::new();
            for key in obj.keys() {
                let val = obj.get(key).unwrap_or(Value::Undefined);
                map.insert(key.clone(), json_render(&val, depth + 1));
            }
            serde_json::Value::Object(map)
        }
        Value::Function(_) | Value::Native(_) | Value::Promise(_) => {
            serde_json::Value::String(render(value, depth, false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formatting() {
        assert_eq!(number_to_string(1.0), "1");
        assert_eq!(number_to_string(-4.0), "-4");
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::INFINITY), "Infinity");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_to_string(-0.0), "0");
    }

    #[test]
    fn stringify_containers_quote_strings() {
        let arr = Value::array(vec![
            Value::Number(1.0),
            Value::String("two".into()),
            Value::Null,
        ]);
        assert_eq!(stringify(&arr), "[1, 'two', null]");

        let mut data = ObjectData::new();
        data.set("name", Value::String("ada".into()));
        data.set("age", Value::Number(36.0));
        assert_eq!(stringify(&Value::object(data)), "{name: 'ada', age: 36}");
    }

    #[test]
    fn stringify_top_level_string_is_bare() {
        assert_eq!(stringify(&Value::String("plain".into())), "plain");
    }

    #[test]
    fn object_keys_keep_insertion_order() {
        let mut data = ObjectData::new();
        data.set("z", Value::Number(1.0));
        data.set("a", Value::Number(2.0));
        data.set("z", Value::Number(3.0));
        let keys: Vec<&String> = data.keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
        assert!(matches!(data.get("z"), Some(Value::Number(n)) if n == 3.0));
    }

    #[test]
    fn cyclic_array_rendering_is_bounded() {
        let arr = Rc::new(RefCell::new(Vec::new()));
        arr.borrow_mut().push(Value::Array(arr.clone()));
        let rendered = stringify(&Value::Array(arr));
        assert!(rendered.contains('…'));
    }

    #[test]
    fn json_projection() {
        let arr = Value::array(vec![Value::Undefined, Value::Number(2.0)]);
        assert_eq!(value_to_json(&arr), serde_json::json!([null, 2.0]));
    }
}
