//! Session access for controllers.
//!
//! Storage backends live outside this crate; they plug in through
//! [`SessionStore`]. [`MemorySession`] keeps the data in process memory
//! and is installed by default.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;

/// Key-value session storage.
pub trait SessionStore {
    fn get(&self, key: &str) -> Option<JsonValue>;

    fn set(&self, key: &str, value: JsonValue);

    fn delete(&self, key: &str) -> Option<JsonValue>;

    fn clear(&self);

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// In-memory session with expiration.
/// Stores data as JSON values.
pub struct MemorySession {
    data: RefCell<HashMap<String, JsonValue>>,
    last_accessed: Cell<Instant>,
    /// Idle timeout (default: 24 hours)
    max_age: Duration,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySession {
    pub fn new() -> Self {
        Self::with_max_age(Duration::from_secs(24 * 60 * 60))
    }

    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            data: RefCell::new(HashMap::new()),
            last_accessed: Cell::new(Instant::now()),
            max_age,
        }
    }

    /// Drop the data if the session has been idle for too long, then
    /// refresh the access time.
    fn touch(&self) {
        if self.last_accessed.get().elapsed() > self.max_age {
            self.data.borrow_mut().clear();
        }
        self.last_accessed.set(Instant::now());
    }

    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.borrow().is_empty()
    }
}

impl SessionStore for MemorySession {
    fn get(&self, key: &str) -> Option<JsonValue> {
        self.touch();
        self.data.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: JsonValue) {
        self.touch();
        self.data.borrow_mut().insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) -> Option<JsonValue> {
        self.touch();
        self.data.borrow_mut().remove(key)
    }

    fn clear(&self) {
        self.data.borrow_mut().clear();
    }
}
