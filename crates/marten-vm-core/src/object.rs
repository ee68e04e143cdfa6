//! Minimal object and array support
//!
//! This crate only carries the seam of the object model that the
//! async-control-flow core consumes: property-bag objects (thenables,
//! iterator-protocol objects, result records) and growable arrays
//! (combinator inputs and outputs). The full object model — prototype
//! chains, descriptors, exotic objects — lives with the object-model
//! collaborator.

use crate::string::JsString;
use crate::value::Value;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A plain property-bag object
pub struct JsObject {
    properties: Mutex<FxHashMap<JsString, Value>>,
}

impl JsObject {
    /// Create a new empty object
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            properties: Mutex::new(FxHashMap::default()),
        })
    }

    /// Create an object from key/value pairs
    pub fn with_properties<I>(pairs: I) -> Arc<Self>
    where
        I: IntoIterator<Item = (&'static str, Value)>,
    {
        let object = JsObject::new();
        for (key, value) in pairs {
            object.set(key, value);
        }
        object
    }

    /// Get a property value
    pub fn get(&self, key: &str) -> Option<Value> {
        self.properties.lock().get(&JsString::intern(key)).cloned()
    }

    /// Set a property value
    pub fn set(&self, key: &str, value: Value) {
        self.properties.lock().insert(JsString::intern(key), value);
    }

    /// Whether the object has the property
    pub fn has(&self, key: &str) -> bool {
        self.properties.lock().contains_key(&JsString::intern(key))
    }
}

impl std::fmt::Debug for JsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let properties = self.properties.lock();
        let mut map = f.debug_map();
        for (key, value) in properties.iter() {
            map.entry(&key.as_str(), value);
        }
        map.finish()
    }
}

/// A growable array of values
pub struct JsArray {
    elements: Mutex<Vec<Value>>,
}

impl JsArray {
    /// Create a new empty array
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            elements: Mutex::new(Vec::new()),
        })
    }

    /// Create an array from existing elements
    pub fn from_vec(elements: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            elements: Mutex::new(elements),
        })
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.lock().len()
    }

    /// Whether the array is empty
    pub fn is_empty(&self) -> bool {
        self.elements.lock().is_empty()
    }

    /// Get the element at `index`
    pub fn get(&self, index: usize) -> Option<Value> {
        self.elements.lock().get(index).cloned()
    }

    /// Append an element
    pub fn push(&self, value: Value) {
        self.elements.lock().push(value);
    }

    /// Snapshot the elements
    pub fn to_vec(&self) -> Vec<Value> {
        self.elements.lock().clone()
    }
}

impl std::fmt::Debug for JsArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.elements.lock().iter()).finish()
    }
}
