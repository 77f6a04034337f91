//! Viewmodel - an instance's data root plus its store bindings.

use std::cell::RefCell;
use std::rc::Rc;

use super::model::Model;
use super::store::Store;
use crate::error::Result;
use crate::types::Value;

/// Owns the root model of one instance.
pub struct Viewmodel {
    root: Model,
    stores: RefCell<Vec<(String, Rc<dyn Store>)>>,
}

impl Viewmodel {
    pub fn new(data: Value) -> Self {
        Self {
            root: Model::new_root(data),
            stores: RefCell::new(Vec::new()),
        }
    }

    /// The absolute root model.
    pub fn root(&self) -> &Model {
        &self.root
    }

    pub fn join(&self, keypath: &str) -> Model {
        self.root.join(keypath)
    }

    /// Read the value at an absolute keypath.
    pub fn get(&self, keypath: &str) -> Option<Value> {
        self.root.join(keypath).get()
    }

    /// Write through `model`. Returns whether anything changed.
    pub fn set(&self, model: &Model, value: Value) -> Result<bool> {
        model.set(value)
    }

    /// Bind a store to an absolute keypath. Takes effect on [`Viewmodel::compute`].
    pub fn register_store(&self, keypath: &str, store: Rc<dyn Store>) {
        self.stores.borrow_mut().push((keypath.to_string(), store));
    }

    /// Attach every registered store to its model and drop stale caches.
    pub fn compute(&self) {
        let stores = self.stores.borrow().clone();
        for (keypath, store) in stores {
            store.invalidate();
            let model = self.root.join(&keypath);
            let existed = model.exists();
            model.attach_store(store);
            if !existed {
                if let Some(parent) = model.parent() {
                    parent.notify_child(model.key());
                }
            }
        }
    }
}
