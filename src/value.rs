//! The dynamic host value that guest code manipulates through the
//! `syscall/js` imports.
//!
//! Arrays and objects are shared mutable references: cloning a [`Value`]
//! aliases the same underlying storage, which is what gives value-table
//! handles their reference semantics.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Signature of host code callable from the guest.
pub type NativeFn = dyn Fn(&[Value]) -> anyhow::Result<Value>;

/// A function value.
#[derive(Clone)]
pub enum HostFunc {
    /// Host code invoked directly, e.g. `console.log`.
    Native(Rc<NativeFn>),
    /// A guest callback wrapper manufactured by `_makeFuncWrapper`.
    /// Invoking it writes a pending event and re-enters the module
    /// scheduler through the exported `resume`.
    Guest(Rc<GuestFunc>),
}

/// State captured by a `_makeFuncWrapper` wrapper: the registration id the
/// guest scheduler dispatches on.
pub struct GuestFunc {
    pub(crate) id: Value,
}

impl HostFunc {
    /// Wrap a Rust closure as a guest-callable function value.
    pub fn native<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + 'static,
    {
        HostFunc::Native(Rc::new(f))
    }

    /// Identity address: distinct functions intern to distinct table ids.
    pub(crate) fn addr(&self) -> usize {
        match self {
            HostFunc::Native(f) => Rc::as_ptr(f) as *const () as usize,
            HostFunc::Guest(g) => Rc::as_ptr(g) as usize,
        }
    }
}

/// A value crossing the guest/host boundary.
#[derive(Clone)]
pub enum Value {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<HashMap<String, Value>>>),
    Function(HostFunc),
}

impl Value {
    /// A fresh empty object.
    pub fn object() -> Value {
        Value::Object(Rc::new(RefCell::new(HashMap::new())))
    }

    /// A fresh empty array.
    pub fn array() -> Value {
        Value::Array(Rc::new(RefCell::new(Vec::new())))
    }

    /// Build an object from key/value pairs.
    pub fn from_entries<K>(entries: impl IntoIterator<Item = (K, Value)>) -> Value
    where
        K: Into<String>,
    {
        Value::Object(Rc::new(RefCell::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&HostFunc> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Read property `name`; `Undefined` when absent or when `self` is not
    /// an object.
    pub fn get(&self, name: &str) -> Value {
        match self {
            Value::Object(map) => map.borrow().get(name).cloned().unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }

    pub(crate) fn as_object(&self) -> Option<&Rc<RefCell<HashMap<String, Value>>>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub(crate) fn as_array(&self) -> Option<&Rc<RefCell<Vec<Value>>>> {
        match self {
            Value::Array(elems) => Some(elems),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Number(v)
    }
}

// Guest integers are coerced to floats on ingress; everything is an f64 on
// the wire.
impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::Number(v as f64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Value {
        Value::Number(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::String(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::String(Rc::from(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(v)))
    }
}

/// Scalars compare by content, reference types by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Undefined, Value::Undefined) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.addr() == b.addr(),
            _ => false,
        }
    }
}

/// The form `console.log` prints: strings bare, arrays space-joined in
/// brackets, object keys sorted so output is deterministic.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Undefined => write!(f, "undefined"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Array(elems) => {
                write!(f, "[")?;
                for (i, elem) in elems.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, "]")
            }
            Value::Object(map) => {
                let map = map.borrow();
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, map[key.as_str()])?;
                }
                write!(f, "}}")
            }
            Value::Function(_) => write!(f, "function"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Function(func) => write!(f, "function@{:#x}", func.addr()),
            other => write!(f, "{other}"),
        }
    }
}
