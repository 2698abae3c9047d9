//! Values crossing the script boundary.

use std::fmt;

use thiserror::Error;

use crate::error::ScriptingError;
use crate::runtime::ProxyId;
use crate::wrapped::{Handle, Payload, WrappedKind};

/// A reference to a script-visible proxy, as script code holds it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    /// Proxy identity in the heap.
    pub id: ProxyId,
    /// Class of the wrapped payload.
    pub kind: WrappedKind,
}

/// A dynamically typed script value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ScriptValue {
    /// `undefined`
    #[default]
    Undefined,
    /// Boolean
    Bool(bool),
    /// Number (always f64 on the script side)
    Number(f64),
    /// String
    String(String),
    /// Array literal
    Array(Vec<ScriptValue>),
    /// Wrapped native object
    Object(ObjectRef),
}

impl ScriptValue {
    /// Script-visible value for a wrapper.
    #[must_use]
    pub fn from_handle<T: Payload>(handle: &Handle<T>) -> Self {
        Self::Object(ObjectRef {
            id: handle.id(),
            kind: T::KIND,
        })
    }

    /// Name of the value's type, as it appears in exception messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(obj) => obj.kind.script_name(),
        }
    }

    /// Number payload, if any.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// String payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean payload, if any.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Object reference, if any.
    #[must_use]
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Self::Object(obj) => Some(*obj),
            _ => None,
        }
    }

    /// Whether this is `undefined`.
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<f32> for ScriptValue {
    fn from(n: f32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<ObjectRef> for ScriptValue {
    fn from(obj: ObjectRef) -> Self {
        Self::Object(obj)
    }
}

impl From<Vec<ScriptValue>> for ScriptValue {
    fn from(items: Vec<ScriptValue>) -> Self {
        Self::Array(items)
    }
}

/// Standard script exception classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionKind {
    /// Plain `Error`
    Error,
    /// Wrong argument type or arity
    TypeError,
    /// Value out of range
    RangeError,
    /// Use of a dead or unknown object
    ReferenceError,
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "Error",
            Self::TypeError => "TypeError",
            Self::RangeError => "RangeError",
            Self::ReferenceError => "ReferenceError",
        })
    }
}

/// An exception raised into script code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ScriptException {
    /// Exception class
    pub kind: ExceptionKind,
    /// Message shown to the script
    pub message: String,
}

impl ScriptException {
    /// Creates an exception of the given class.
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// `Error`
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::Error, message)
    }

    /// `TypeError`
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::TypeError, message)
    }

    /// `RangeError`
    pub fn range_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::RangeError, message)
    }

    /// `ReferenceError`
    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::ReferenceError, message)
    }
}

impl From<ScriptingError> for ScriptException {
    fn from(err: ScriptingError) -> Self {
        match err {
            ScriptingError::DanglingReference { .. } => Self::reference_error(err.to_string()),
            ScriptingError::ScriptRuntime { exception, .. }
            | ScriptingError::EntryScript { exception, .. } => exception,
            other => Self::error(other.to_string()),
        }
    }
}
