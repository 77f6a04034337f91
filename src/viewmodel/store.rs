//! Store adapters - where a model's value actually lives.
//!
//! Most models read straight out of the root data tree. A model can instead
//! be backed by a [`Store`]:
//! - [`ValueStore`] - settable, reports whether a write changed anything
//! - [`StateStore`] - fixed state, read-only
//! - [`ComputedStore`] - derived from a getter, cached until invalidated, read-only
//!
//! Read-only stores reject `set`/`get_settable` with
//! [`BindError::ReadOnlyStore`] instead of silently accepting the write.

use std::cell::RefCell;

use spark_signals::{signal, Signal};

use crate::error::{BindError, Result};
use crate::types::Value;

/// Value source for a model.
pub trait Store {
    /// Current value. Never mutates observable state.
    fn get(&self) -> Value;

    /// Value to use as the parent of a write to a child keypath.
    fn get_settable(&self) -> Result<Value>;

    /// Replace the value. Returns whether it changed.
    fn set(&self, value: Value) -> Result<bool>;

    /// Drop any cached value so the next `get` recomputes.
    fn invalidate(&self);
}

// =============================================================================
// ValueStore
// =============================================================================

/// Plain settable value, held in a signal so reads track.
pub struct ValueStore {
    value: Signal<Value>,
}

impl ValueStore {
    pub fn new(value: Value) -> Self {
        Self { value: signal(value) }
    }
}

impl Store for ValueStore {
    fn get(&self) -> Value {
        self.value.get()
    }

    fn get_settable(&self) -> Result<Value> {
        Ok(self.value.get())
    }

    fn set(&self, value: Value) -> Result<bool> {
        if self.value.get() == value {
            return Ok(false);
        }
        self.value.set(value);
        Ok(true)
    }

    fn invalidate(&self) {}
}

// =============================================================================
// StateStore
// =============================================================================

/// Fixed state exposed as a read-only model.
pub struct StateStore {
    state: Value,
}

impl StateStore {
    pub fn new(state: Value) -> Self {
        Self { state }
    }
}

impl Store for StateStore {
    fn get(&self) -> Value {
        self.state.clone()
    }

    fn get_settable(&self) -> Result<Value> {
        Err(BindError::ReadOnlyStore {
            operation: "take a settable value from",
        })
    }

    fn set(&self, _value: Value) -> Result<bool> {
        Err(BindError::ReadOnlyStore { operation: "set" })
    }

    fn invalidate(&self) {}
}

// =============================================================================
// ComputedStore
// =============================================================================

/// Value derived from a getter.
///
/// The result is cached until [`Store::invalidate`] is called. Invalidation
/// bumps a version signal, so effects that read through the store re-run.
pub struct ComputedStore {
    getter: Box<dyn Fn() -> Value>,
    cached: RefCell<Option<Value>>,
    version: Signal<u64>,
}

impl ComputedStore {
    pub fn new(getter: impl Fn() -> Value + 'static) -> Self {
        Self {
            getter: Box::new(getter),
            cached: RefCell::new(None),
            version: signal(0),
        }
    }
}

impl Store for ComputedStore {
    fn get(&self) -> Value {
        // Track invalidations
        let _ = self.version.get();

        if let Some(value) = self.cached.borrow().as_ref() {
            return value.clone();
        }
        let value = (self.getter)();
        *self.cached.borrow_mut() = Some(value.clone());
        value
    }

    fn get_settable(&self) -> Result<Value> {
        Err(BindError::ReadOnlyStore {
            operation: "take a settable value from",
        })
    }

    fn set(&self, _value: Value) -> Result<bool> {
        Err(BindError::ReadOnlyStore { operation: "set" })
    }

    fn invalidate(&self) {
        self.cached.borrow_mut().take();
        self.version.set(self.version.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_value_store_reports_change() {
        let store = ValueStore::new(json!(1));
        assert_eq!(store.set(json!(1)), Ok(false));
        assert_eq!(store.set(json!(2)), Ok(true));
        assert_eq!(store.get(), json!(2));
        assert_eq!(store.get_settable(), Ok(json!(2)));
    }

    #[test]
    fn test_state_store_is_read_only() {
        let store = StateStore::new(json!({ "a": 1 }));

        assert_eq!(
            store.set(json!(2)),
            Err(BindError::ReadOnlyStore { operation: "set" })
        );
        assert!(store.get_settable().is_err());

        // get never mutates
        assert_eq!(store.get(), json!({ "a": 1 }));
        assert_eq!(store.get(), json!({ "a": 1 }));
    }

    #[test]
    fn test_computed_store_caches_until_invalidated() {
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let store = ComputedStore::new(move || {
            calls_clone.set(calls_clone.get() + 1);
            json!(calls_clone.get())
        });

        assert_eq!(store.get(), json!(1));
        assert_eq!(store.get(), json!(1));
        assert_eq!(calls.get(), 1);

        store.invalidate();
        assert_eq!(store.get(), json!(2));
        assert_eq!(calls.get(), 2);

        assert!(store.set(json!(5)).is_err());
        assert_eq!(store.get(), json!(2));
    }
}
