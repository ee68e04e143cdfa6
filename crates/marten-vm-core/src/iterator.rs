//! Iteration protocol records and delegation targets

use crate::error::{VmError, VmResult};
use crate::generator::JsGenerator;
use crate::object::JsObject;
use crate::value::Value;
use std::sync::Arc;

/// Result of resuming a generator or iterator
#[derive(Debug, Clone)]
pub struct IteratorResult {
    /// The yielded/returned value
    pub value: Value,
    /// Whether the iterator is done
    pub done: bool,
}

impl IteratorResult {
    /// Create a new iterator result
    pub fn new(value: Value, done: bool) -> Self {
        Self { value, done }
    }

    /// Create a "not done" result
    pub fn yielded(value: Value) -> Self {
        Self { value, done: false }
    }

    /// Create a "done" result
    pub fn done(value: Value) -> Self {
        Self { value, done: true }
    }

    /// Create a "done with undefined" result
    pub fn done_undefined() -> Self {
        Self {
            value: Value::undefined(),
            done: true,
        }
    }

    /// Read a `{value, done}` record object into a result.
    pub fn from_record(record: &Value) -> VmResult<IteratorResult> {
        let Some(object) = record.as_object() else {
            return Err(VmError::type_error("iterator result is not an object"));
        };
        let value = object.get("value").unwrap_or(Value::Undefined);
        let done = object
            .get("done")
            .map(|d| d.to_boolean())
            .unwrap_or(false);
        Ok(IteratorResult { value, done })
    }

    /// Build a `{value, done}` record object from this result.
    pub fn to_record(&self) -> Value {
        Value::object(JsObject::with_properties([
            ("value", self.value.clone()),
            ("done", Value::boolean(self.done)),
        ]))
    }
}

/// Outcome of looking up an optional iterator method.
///
/// Delegation distinguishes a missing `return`/`throw` member from one
/// that is present but not callable; the latter is a protocol violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodLookup {
    /// The method is absent (or undefined/null)
    Absent,
    /// The method is present and callable
    Callable,
    /// The method is present but not callable
    NotCallable,
}

/// A delegation target: the inner iterator behind `yield*`.
#[derive(Clone)]
pub enum IterTarget {
    /// A generator, driven through its native methods
    Generator(Arc<JsGenerator>),
    /// A protocol object with a callable `next` and optional
    /// `return`/`throw` members
    Object(Arc<JsObject>),
}

impl IterTarget {
    /// Resolve a value into a delegation target.
    ///
    /// Generators delegate to themselves, arrays iterate their elements
    /// through an array-backed generator, and objects must expose a
    /// callable `next`.
    pub fn from_value(value: &Value) -> VmResult<IterTarget> {
        match value {
            Value::Generator(generator) => Ok(IterTarget::Generator(generator.clone())),
            Value::Array(array) => Ok(IterTarget::Generator(JsGenerator::from_sequence(
                array.to_vec(),
            ))),
            Value::Object(object) => {
                match object.get("next") {
                    Some(next) if next.is_callable() => Ok(IterTarget::Object(object.clone())),
                    _ => Err(VmError::type_error("value is not iterable")),
                }
            }
            _ => Err(VmError::type_error("value is not iterable")),
        }
    }

    /// Forward a `next` call to the inner iterator.
    pub fn next(&self, arg: Value) -> VmResult<IteratorResult> {
        match self {
            IterTarget::Generator(generator) => generator.next(arg),
            IterTarget::Object(object) => self.call_protocol(object, "next", arg),
        }
    }

    /// Look up the inner iterator's `return` method.
    pub fn lookup_return(&self) -> MethodLookup {
        match self {
            IterTarget::Generator(_) => MethodLookup::Callable,
            IterTarget::Object(object) => lookup_method(object, "return"),
        }
    }

    /// Look up the inner iterator's `throw` method.
    pub fn lookup_throw(&self) -> MethodLookup {
        match self {
            IterTarget::Generator(_) => MethodLookup::Callable,
            IterTarget::Object(object) => lookup_method(object, "throw"),
        }
    }

    /// Invoke the inner iterator's `return` method.
    ///
    /// Callers must have observed [`MethodLookup::Callable`] first.
    pub fn call_return(&self, arg: Value) -> VmResult<IteratorResult> {
        match self {
            IterTarget::Generator(generator) => generator.return_(arg),
            IterTarget::Object(object) => self.call_protocol(object, "return", arg),
        }
    }

    /// Invoke the inner iterator's `throw` method.
    ///
    /// Callers must have observed [`MethodLookup::Callable`] first.
    pub fn call_throw(&self, error: Value) -> VmResult<IteratorResult> {
        match self {
            IterTarget::Generator(generator) => generator.throw(error),
            IterTarget::Object(object) => self.call_protocol(object, "throw", error),
        }
    }

    fn call_protocol(
        &self,
        object: &Arc<JsObject>,
        name: &str,
        arg: Value,
    ) -> VmResult<IteratorResult> {
        let method = object
            .get(name)
            .ok_or_else(|| VmError::type_error(format!("iterator has no '{}' method", name)))?;
        let record = method.call(&Value::Object(object.clone()), &[arg])?;
        IteratorResult::from_record(&record)
    }
}

fn lookup_method(object: &Arc<JsObject>, name: &str) -> MethodLookup {
    match object.get(name) {
        None | Some(Value::Undefined) | Some(Value::Null) => MethodLookup::Absent,
        Some(method) if method.is_callable() => MethodLookup::Callable,
        Some(_) => MethodLookup::NotCallable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iterator_result() {
        let yielded = IteratorResult::yielded(Value::number(1.0));
        assert!(!yielded.done);
        assert_eq!(yielded.value.as_number(), Some(1.0));

        let done = IteratorResult::done(Value::number(2.0));
        assert!(done.done);
        assert_eq!(done.value.as_number(), Some(2.0));

        let done_undef = IteratorResult::done_undefined();
        assert!(done_undef.done);
        assert!(done_undef.value.is_undefined());
    }

    #[test]
    fn test_record_round_trip() {
        let record = IteratorResult::yielded(Value::number(3.0)).to_record();
        let result = IteratorResult::from_record(&record).unwrap();
        assert!(!result.done);
        assert_eq!(result.value.as_number(), Some(3.0));
    }

    #[test]
    fn test_from_record_rejects_non_object() {
        assert!(IteratorResult::from_record(&Value::number(1.0)).is_err());
    }

    #[test]
    fn test_method_lookup() {
        let object = JsObject::new();
        object.set("next", Value::function(|_, _| Ok(Value::Undefined)));
        object.set("return", Value::number(5.0));
        assert_eq!(lookup_method(&object, "return"), MethodLookup::NotCallable);
        assert_eq!(lookup_method(&object, "throw"), MethodLookup::Absent);
        assert_eq!(lookup_method(&object, "next"), MethodLookup::Callable);
    }

    #[test]
    fn test_non_iterable() {
        assert!(IterTarget::from_value(&Value::number(1.0)).is_err());
        let bare = JsObject::new();
        assert!(IterTarget::from_value(&Value::object(bare)).is_err());
    }
}
