//! Engine error types

use crate::string::JsString;
use crate::value::Value;
use thiserror::Error;

/// Engine execution errors
#[derive(Debug, Error)]
pub enum VmError {
    /// Type error (e.g., calling non-function, wrong receiver kind)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Range error
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Internal error
    #[error("InternalError: {0}")]
    InternalError(String),

    /// Thrown script exception
    #[error("Uncaught exception: {0}")]
    Exception(Box<ThrownValue>),
}

/// A thrown script value
#[derive(Debug)]
pub struct ThrownValue {
    /// The thrown value
    pub value: Value,
    /// The thrown value (as a string representation)
    pub message: String,
}

impl std::fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl VmError {
    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a range error
    pub fn range_error(msg: impl Into<String>) -> Self {
        Self::RangeError(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Create an exception from a thrown script value
    pub fn exception(value: Value) -> Self {
        let message = if let Some(s) = value.as_string() {
            s.as_str().to_string()
        } else {
            format!("{:?}", value)
        };
        Self::Exception(Box::new(ThrownValue { message, value }))
    }

    /// The value this error presents to script code.
    ///
    /// Thrown exceptions carry their original value; engine errors are
    /// surfaced as their interned message string.
    pub fn to_value(&self) -> Value {
        match self {
            VmError::Exception(thrown) => thrown.value.clone(),
            other => Value::String(JsString::intern(&other.to_string())),
        }
    }
}

impl From<String> for VmError {
    fn from(s: String) -> Self {
        VmError::type_error(s)
    }
}

impl From<&str> for VmError {
    fn from(s: &str) -> Self {
        VmError::type_error(s)
    }
}

/// Result type for engine operations
pub type VmResult<T> = std::result::Result<T, VmError>;
