//! Model - a node in the keypath tree.
//!
//! Models carry identity and linkage only. Values live in the root's data
//! signal (or in a [`Store`] attached to a node), so reading a model inside
//! an effect tracks the data it came from.
//!
//! Nodes own their children and point at their parent weakly:
//!
//! ```text
//! root ("")
//! ├── user            (keypath "user")
//! │   └── name        (keypath "user.name")
//! └── items
//!     └── 0           (keypath "items.0")
//! ```
//!
//! Besides data access, a model is a watch point: callers register a watcher
//! for a child key and are notified when that child starts to exist. The
//! resolver uses this to repair unresolved references.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use spark_signals::{signal, Signal};

use super::store::Store;
use super::unresolved::Unresolved;
use crate::error::{BindError, Result};
use crate::keypath;
use crate::types::{Value, WatcherId};

/// How far past the end of an array a write may land. The gap is filled
/// with nulls.
pub const MAX_ARRAY_GROWTH: usize = 1024;

/// Callback invoked with the model that gained the watched child.
pub type Watcher = Rc<dyn Fn(&Model)>;

thread_local! {
    static WATCHER_COUNTER: Cell<u64> = const { Cell::new(0) };
}

fn next_watcher_id() -> WatcherId {
    WATCHER_COUNTER.with(|counter| {
        let id = counter.get();
        counter.set(id + 1);
        WatcherId(id)
    })
}

struct ModelInner {
    key: String,
    keypath: String,
    parent: Option<Weak<ModelInner>>,
    root: Weak<ModelInner>,
    /// Root only.
    data: Option<Signal<Value>>,
    store: RefCell<Option<Rc<dyn Store>>>,
    children: RefCell<HashMap<String, Model>>,
    watchers: RefCell<HashMap<String, Vec<(WatcherId, Watcher)>>>,
    unresolved: RefCell<HashMap<String, Unresolved>>,
}

/// Shared handle to a node in the keypath tree.
#[derive(Clone)]
pub struct Model(Rc<ModelInner>);

/// Non-owning model handle.
#[derive(Clone)]
pub struct WeakModel(Weak<ModelInner>);

impl WeakModel {
    pub fn upgrade(&self) -> Option<Model> {
        self.0.upgrade().map(Model)
    }
}

impl Model {
    /// Create a root model holding `data`.
    pub fn new_root(data: Value) -> Self {
        Model(Rc::new_cyclic(|root| ModelInner {
            key: String::new(),
            keypath: String::new(),
            parent: None,
            root: root.clone(),
            data: Some(signal(data)),
            store: RefCell::new(None),
            children: RefCell::new(HashMap::new()),
            watchers: RefCell::new(HashMap::new()),
            unresolved: RefCell::new(HashMap::new()),
        }))
    }

    // =========================================================================
    // Identity and linkage
    // =========================================================================

    /// Last segment of this model's keypath (empty for the root).
    pub fn key(&self) -> &str {
        &self.0.key
    }

    /// Full keypath from the root.
    pub fn keypath(&self) -> &str {
        &self.0.keypath
    }

    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    pub fn parent(&self) -> Option<Model> {
        self.0.parent.as_ref().and_then(Weak::upgrade).map(Model)
    }

    /// The root of this model's tree.
    pub fn root(&self) -> Model {
        self.0.root.upgrade().map(Model).unwrap_or_else(|| self.clone())
    }

    pub fn ptr_eq(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakModel {
        WeakModel(Rc::downgrade(&self.0))
    }

    /// Join a relative keypath. Idempotent: the same path always yields the
    /// same node. An empty path yields `self`.
    pub fn join(&self, path: &str) -> Model {
        let mut current = self.clone();
        for segment in keypath::segments(path) {
            current = current.child(segment);
        }
        current
    }

    /// Join a relative keypath only if every segment already exists.
    pub fn try_join(&self, path: &str) -> Option<Model> {
        let mut current = self.clone();
        for segment in keypath::segments(path) {
            if !current.has_child(segment) {
                return None;
            }
            current = current.child(segment);
        }
        Some(current)
    }

    fn child(&self, key: &str) -> Model {
        if let Some(existing) = self.0.children.borrow().get(key) {
            return existing.clone();
        }

        let child = Model(Rc::new(ModelInner {
            key: key.to_string(),
            keypath: keypath::join(&self.0.keypath, key),
            parent: Some(Rc::downgrade(&self.0)),
            root: self.0.root.clone(),
            data: None,
            store: RefCell::new(None),
            children: RefCell::new(HashMap::new()),
            watchers: RefCell::new(HashMap::new()),
            unresolved: RefCell::new(HashMap::new()),
        }));
        self.0
            .children
            .borrow_mut()
            .insert(key.to_string(), child.clone());
        child
    }

    /// Whether a child named `key` currently exists, either as data under
    /// this model or as a store-backed child.
    pub fn has_child(&self, key: &str) -> bool {
        let store_backed = self
            .0
            .children
            .borrow()
            .get(key)
            .is_some_and(|child| child.0.store.borrow().is_some());
        if store_backed {
            return true;
        }
        self.get()
            .as_ref()
            .is_some_and(|value| index_value(value, key).is_some())
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Back this model with a store.
    pub fn attach_store(&self, store: Rc<dyn Store>) {
        *self.0.store.borrow_mut() = Some(store);
    }

    pub fn store(&self) -> Option<Rc<dyn Store>> {
        self.0.store.borrow().clone()
    }

    /// Ancestors from the root down to `self`, inclusive.
    fn lineage(&self) -> Vec<Model> {
        let mut lineage = vec![self.clone()];
        let mut current = self.parent();
        while let Some(model) = current {
            current = model.parent();
            lineage.push(model);
        }
        lineage.reverse();
        lineage
    }

    /// Current value, or `None` when nothing exists at this keypath.
    ///
    /// Reads the root data signal, so effects calling this re-run on writes.
    pub fn get(&self) -> Option<Value> {
        let lineage = self.lineage();
        let mut value: Option<Value> = None;

        for (depth, model) in lineage.iter().enumerate() {
            if let Some(store) = model.store() {
                value = Some(store.get());
                continue;
            }
            value = if depth == 0 {
                model.0.data.as_ref().map(|data| data.get())
            } else {
                value.and_then(|v| index_value(&v, model.key()).cloned())
            };
        }

        value
    }

    /// Write a value at this keypath.
    ///
    /// Missing intermediate objects are created. Returns whether anything
    /// changed. Writes through a read-only store fail, as do array writes
    /// more than [`MAX_ARRAY_GROWTH`] slots past the end. Every model that
    /// gains a watched child as a result is notified: parents along the
    /// path and already-joined models below this one.
    pub fn set(&self, value: Value) -> Result<bool> {
        let lineage = self.lineage();

        // Nearest store-backed ancestor (or self) owns the write
        let owner = lineage.iter().rposition(|model| model.store().is_some());

        let before: Vec<bool> = lineage
            .iter()
            .skip(1)
            .map(|model| model.exists())
            .collect();
        let watched = self.watched_children();

        let changed = match owner {
            Some(position) => {
                let owner_model = &lineage[position];
                let Some(store) = owner_model.store() else {
                    return Ok(false);
                };
                if position == lineage.len() - 1 {
                    store.set(value.clone())?
                } else {
                    let mut settable = store.get_settable()?;
                    let path: Vec<&str> = lineage[position + 1..]
                        .iter()
                        .map(|model| model.key())
                        .collect();
                    if lookup(&settable, &path) == Some(&value) {
                        false
                    } else {
                        write_at(&mut settable, &path, value.clone())?;
                        store.set(settable)?
                    }
                }
            }
            None => {
                let root = &lineage[0];
                let Some(data) = root.0.data.as_ref() else {
                    return Ok(false);
                };
                let mut tree = data.get();
                let path: Vec<&str> = lineage[1..].iter().map(|model| model.key()).collect();
                if lookup(&tree, &path) == Some(&value) {
                    false
                } else {
                    write_at(&mut tree, &path, value.clone())?;
                    data.set(tree);
                    true
                }
            }
        };

        if !changed {
            return Ok(false);
        }

        // Parents that gained a child along the path
        for (index, existed) in before.into_iter().enumerate() {
            if !existed {
                let parent = &lineage[index];
                let child = &lineage[index + 1];
                parent.notify_child(child.key());
            }
        }

        // Watched children that appeared at or below this model
        for (model, key, existed) in watched {
            if !existed && model.has_child(&key) {
                model.notify_child(&key);
            }
        }

        Ok(true)
    }

    /// Every watched key on this model and its joined descendants, with
    /// whether that child exists right now.
    fn watched_children(&self) -> Vec<(Model, String, bool)> {
        let mut watched = Vec::new();
        let mut pending = vec![self.clone()];

        while let Some(model) = pending.pop() {
            let keys: Vec<String> = model.0.watchers.borrow().keys().cloned().collect();
            for key in keys {
                let existed = model.has_child(&key);
                watched.push((model.clone(), key, existed));
            }
            pending.extend(model.0.children.borrow().values().cloned());
        }

        watched
    }

    /// Whether anything exists at this keypath.
    pub fn exists(&self) -> bool {
        match self.parent() {
            Some(parent) => parent.has_child(self.key()),
            None => true,
        }
    }

    // =========================================================================
    // Watchers
    // =========================================================================

    /// Watch for a child named `key` coming into existence.
    pub fn add_watcher(&self, key: &str, watcher: Watcher) -> WatcherId {
        let id = next_watcher_id();
        self.0
            .watchers
            .borrow_mut()
            .entry(key.to_string())
            .or_default()
            .push((id, watcher));
        id
    }

    /// Remove a watcher. Removing one that is already gone is a no-op.
    pub fn remove_watcher(&self, key: &str, id: WatcherId) {
        let mut watchers = self.0.watchers.borrow_mut();
        if let Some(list) = watchers.get_mut(key) {
            list.retain(|(existing, _)| *existing != id);
            if list.is_empty() {
                watchers.remove(key);
            }
        }
    }

    /// Number of watchers registered for `key`.
    pub fn watcher_count(&self, key: &str) -> usize {
        self.0.watchers.borrow().get(key).map_or(0, Vec::len)
    }

    /// Tell watchers of `key` that the child now exists.
    ///
    /// Watchers are snapshotted first; a watcher may add or remove
    /// registrations on this model while running.
    pub fn notify_child(&self, key: &str) {
        let watchers: Vec<Watcher> = self
            .0
            .watchers
            .borrow()
            .get(key)
            .map(|list| list.iter().map(|(_, watcher)| watcher.clone()).collect())
            .unwrap_or_default();

        if !watchers.is_empty() {
            log::trace!(
                "notifying {} watcher(s) of \"{}\" on \"{}\"",
                watchers.len(),
                key,
                self.keypath()
            );
        }

        for watcher in watchers {
            watcher(self);
        }
    }

    // =========================================================================
    // Pending placeholders
    // =========================================================================

    /// Placeholder waiting on this context for `key`, if any.
    pub fn unresolved(&self, key: &str) -> Option<Unresolved> {
        self.0.unresolved.borrow().get(key).cloned()
    }

    pub(crate) fn register_unresolved(&self, key: &str, placeholder: Unresolved) {
        self.0
            .unresolved
            .borrow_mut()
            .insert(key.to_string(), placeholder);
    }

    /// Drop the entry for `key` if it still refers to `placeholder`.
    pub(crate) fn remove_unresolved(&self, key: &str, placeholder: &Unresolved) {
        let mut unresolved = self.0.unresolved.borrow_mut();
        if unresolved
            .get(key)
            .is_some_and(|existing| existing.ptr_eq(placeholder))
        {
            unresolved.remove(key);
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Model").field(&self.0.keypath).finish()
    }
}

// =============================================================================
// Value tree helpers
// =============================================================================

fn index_value<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| index_value(current, key))
}

fn write_at(target: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((key, rest)) = path.split_first() else {
        *target = value;
        return Ok(());
    };

    if let (Value::Array(items), Ok(index)) = (&mut *target, key.parse::<usize>()) {
        if index >= items.len() {
            if index - items.len() > MAX_ARRAY_GROWTH {
                return Err(BindError::IndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
            items.resize(index + 1, Value::Null);
        }
        return write_at(&mut items[index], rest, value);
    }

    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(map) = target {
        let slot = map.entry(key.to_string()).or_insert(Value::Null);
        return write_at(slot, rest, value);
    }
    Ok(())
}
