//! Interned engine strings
//!
//! Strings are immutable and interned for deduplication.
//! This allows fast equality comparison (pointer comparison) in the
//! common case.

use dashmap::DashMap;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Global string intern table
static STRING_TABLE: std::sync::LazyLock<DashMap<u64, JsString>> =
    std::sync::LazyLock::new(DashMap::new);

/// An immutable, interned engine string
#[derive(Clone)]
pub struct JsString {
    data: Arc<str>,
    hash: u64,
}

impl JsString {
    /// Intern a string, reusing the existing allocation when one exists
    pub fn intern(s: &str) -> JsString {
        let hash = JsString::compute_hash(s);

        // Check if already interned
        if let Some(existing) = STRING_TABLE.get(&hash)
            && existing.data.as_ref() == s
        {
            return existing.clone();
        }

        let js_str = JsString {
            data: Arc::from(s),
            hash,
        };
        STRING_TABLE.insert(hash, js_str.clone());
        js_str
    }

    /// Get the string contents
    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the string is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn compute_hash(s: &str) -> u64 {
        let mut hasher = FxHasher::default();
        s.hash(&mut hasher);
        hasher.finish()
    }
}

impl PartialEq for JsString {
    fn eq(&self, other: &Self) -> bool {
        // Interned strings usually share the allocation
        Arc::ptr_eq(&self.data, &other.data)
            || (self.hash == other.hash && self.data == other.data)
    }
}

impl Eq for JsString {}

impl Hash for JsString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl std::fmt::Debug for JsString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.data)
    }
}

impl std::fmt::Display for JsString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.data)
    }
}

impl From<&str> for JsString {
    fn from(s: &str) -> Self {
        JsString::intern(s)
    }
}

impl From<String> for JsString {
    fn from(s: String) -> Self {
        JsString::intern(&s)
    }
}
