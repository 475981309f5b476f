//! Returned values handed to the capture functions

use crate::capture::CaptureError;
use std::fmt;
use std::sync::Arc;

/// Object whose accessors can be invoked by name
pub trait Introspect: Send + Sync {
    /// Runtime type name, used in error reports
    fn type_name(&self) -> &str;

    /// Invoke the no-argument accessor `accessor`
    fn invoke(&self, accessor: &str) -> Result<Value, CaptureError>;

    /// Default string form
    fn display(&self) -> String {
        self.type_name().to_string()
    }
}

/// A value returned by an instrumented method
#[derive(Clone)]
pub enum Value {
    /// Absent reference
    Null,
    /// int-category value
    Int(i32),
    /// long
    Long(i64),
    /// float
    Float(f32),
    /// double
    Double(f64),
    /// String reference
    Str(String),
    /// Any other reference
    Object(Arc<dyn Introspect>),
}

impl Value {
    /// Whether the value is the null reference
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Str(s) => f.write_str(s),
            Value::Object(o) => f.write_str(&o.display()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Object(o) => write!(f, "Object({})", o.type_name()),
            Value::Str(s) => write!(f, "Str({:?})", s),
            other => write!(f, "{}", other),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
