//! Engine value representation
//!
//! The async-control-flow core consumes only a narrow slice of the full
//! object model, so values are a plain enum rather than the NaN-boxed
//! representation a complete engine would use. Primitives compare by
//! value; heap references compare by identity.

use crate::async_generator::JsAsyncGenerator;
use crate::error::VmResult;
use crate::generator::JsGenerator;
use crate::object::{JsArray, JsObject};
use crate::promise::JsPromise;
use crate::string::JsString;
use std::sync::Arc;

/// Native function handler type
pub type NativeFn = Arc<dyn Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync>;

/// An engine value
#[derive(Clone)]
pub enum Value {
    /// The undefined value
    Undefined,
    /// The null value
    Null,
    /// A boolean
    Boolean(bool),
    /// A double-precision number
    Number(f64),
    /// An interned string
    String(JsString),
    /// An array of values
    Array(Arc<JsArray>),
    /// A plain property-bag object
    Object(Arc<JsObject>),
    /// A callable native function
    Function(NativeFn),
    /// A promise
    Promise(Arc<JsPromise>),
    /// A synchronous generator
    Generator(Arc<JsGenerator>),
    /// An async generator
    AsyncGenerator(Arc<JsAsyncGenerator>),
}

impl Value {
    /// The undefined value
    pub fn undefined() -> Value {
        Value::Undefined
    }

    /// The null value
    pub fn null() -> Value {
        Value::Null
    }

    /// Create a boolean value
    pub fn boolean(b: bool) -> Value {
        Value::Boolean(b)
    }

    /// Create a number value
    pub fn number(n: f64) -> Value {
        Value::Number(n)
    }

    /// Create an interned string value
    pub fn string(s: &str) -> Value {
        Value::String(JsString::intern(s))
    }

    /// Create an array value
    pub fn array(elements: Vec<Value>) -> Value {
        Value::Array(JsArray::from_vec(elements))
    }

    /// Create an object value
    pub fn object(object: Arc<JsObject>) -> Value {
        Value::Object(object)
    }

    /// Create a native function value
    pub fn function<F>(f: F) -> Value
    where
        F: Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        Value::Function(Arc::new(f))
    }

    /// Create a promise value
    pub fn promise(promise: Arc<JsPromise>) -> Value {
        Value::Promise(promise)
    }

    /// Create a generator value
    pub fn generator(generator: Arc<JsGenerator>) -> Value {
        Value::Generator(generator)
    }

    /// Create an async generator value
    pub fn async_generator(generator: Arc<JsAsyncGenerator>) -> Value {
        Value::AsyncGenerator(generator)
    }

    /// Check for undefined
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check for null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check for a callable value
    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// ToBoolean: everything is truthy except undefined, null, false,
    /// zero/NaN numbers, and empty strings.
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Extract a boolean
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Extract a string
    pub fn as_string(&self) -> Option<&JsString> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Extract an array
    pub fn as_array(&self) -> Option<&Arc<JsArray>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Extract an object
    pub fn as_object(&self) -> Option<&Arc<JsObject>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Extract a native function
    pub fn as_function(&self) -> Option<&NativeFn> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Extract a promise
    pub fn as_promise(&self) -> Option<&Arc<JsPromise>> {
        match self {
            Value::Promise(p) => Some(p),
            _ => None,
        }
    }

    /// Extract a generator
    pub fn as_generator(&self) -> Option<&Arc<JsGenerator>> {
        match self {
            Value::Generator(g) => Some(g),
            _ => None,
        }
    }

    /// Extract an async generator
    pub fn as_async_generator(&self) -> Option<&Arc<JsAsyncGenerator>> {
        match self {
            Value::AsyncGenerator(g) => Some(g),
            _ => None,
        }
    }

    /// Call the value as a function
    pub fn call(&self, this: &Value, args: &[Value]) -> VmResult<Value> {
        match self {
            Value::Function(f) => f(this, args),
            _ => Err(crate::error::VmError::type_error("value is not callable")),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Promise(a), Value::Promise(b)) => Arc::ptr_eq(a, b),
            (Value::Generator(a), Value::Generator(b)) => Arc::ptr_eq(a, b),
            (Value::AsyncGenerator(a), Value::AsyncGenerator(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(a) => write!(f, "{:?}", a),
            Value::Object(o) => write!(f, "{:?}", o),
            Value::Function(_) => write!(f, "[native function]"),
            Value::Promise(p) => write!(f, "{:?}", p),
            Value::Generator(g) => write!(f, "{:?}", g),
            Value::AsyncGenerator(g) => write!(f, "{:?}", g),
        }
    }
}
