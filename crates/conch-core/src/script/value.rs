//! Values crossing the native/script boundary.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

// ---------------------------------------------------------------------------
// ScriptError
// ---------------------------------------------------------------------------

/// A script-level error: raised by a script, or returned to a script by a
/// native function. Never fatal on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ScriptError {
    message: String,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

// ---------------------------------------------------------------------------
// ScriptFunction
// ---------------------------------------------------------------------------

/// Opaque reference to a function owned by the scripting engine.
///
/// Clones share identity: two `ScriptFunction`s are equal only when they point
/// at the same engine closure. The payload is whatever the engine needs to
/// call it back (see [`ScriptFunction::downcast_ref`]).
#[derive(Clone)]
pub struct ScriptFunction {
    inner: Arc<dyn Any + Send + Sync>,
}

impl ScriptFunction {
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Access the engine-specific payload.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &ScriptFunction) -> bool {
        self.addr() == other.addr()
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.inner) as *const ()
    }
}

impl PartialEq for ScriptFunction {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ScriptFunction {}

impl fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function: {:p}", self.addr())
    }
}

// ---------------------------------------------------------------------------
// UserData
// ---------------------------------------------------------------------------

/// A native object exposed to scripts as an opaque handle.
///
/// Scripts only see the read-only fields served by [`UserData::get`] and the
/// methods dispatched by [`UserData::call_method`]; the native state behind
/// the handle is never reachable from the script side.
pub trait UserData: Any + Send + Sync + fmt::Debug {
    /// Name scripts see for this kind of handle (e.g. `"job"`).
    fn type_name(&self) -> &'static str;

    /// Read a field. `None` means the field does not exist (scripts see nil).
    fn get(&self, field: &str) -> Option<Value>;

    /// Invoke a method. The handle itself is not included in `args`.
    fn call_method(&self, method: &str, args: &[Value]) -> Result<Value, ScriptError>;

    fn as_any(&self) -> &dyn Any;
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A script value.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Key/value pairs in insertion order. Sequences use keys `1..=n`.
    Table(Vec<(Value, Value)>),
    Function(ScriptFunction),
    UserData(Arc<dyn UserData>),
}

impl Value {
    /// Build a sequence table keyed `1..=n`.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::Table(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::Int(i as i64 + 1), v.into()))
                .collect(),
        )
    }

    pub fn userdata<T: UserData>(data: T) -> Self {
        Value::UserData(Arc::new(data))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::UserData(ud) => ud.type_name(),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integers, and floats with no fractional part.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&ScriptFunction> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Downcast a userdata value to a concrete handle type.
    pub fn as_userdata<T: UserData>(&self) -> Option<&T> {
        match self {
            Value::UserData(ud) => ud.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Look up `key` in a table value.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        match self {
            Value::Table(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::UserData(a), Value::UserData(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<ScriptFunction> for Value {
    fn from(f: ScriptFunction) -> Self {
        Value::Function(f)
    }
}

impl From<Arc<dyn UserData>> for Value {
    fn from(ud: Arc<dyn UserData>) -> Self {
        Value::UserData(ud)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Nil)
    }
}
