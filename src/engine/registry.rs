//! Instance Registry - identity and mount bookkeeping.
//!
//! Manages the lifecycle of instance identities:
//! - Monotonic [`InstanceId`] allocation (ids are never reused)
//! - Id → instance lookup for live instances
//! - Mount targets: which instances are rendered into which named target
//! - Teardown callbacks registered per instance

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use super::instance::Instance;
use crate::types::InstanceId;

/// Callback run when an instance is torn down. Errors are reported, not fatal.
pub type TeardownCallback = Box<dyn FnOnce() -> std::result::Result<(), String>>;

// =============================================================================
// Registry State
// =============================================================================

thread_local! {
    /// Counter for generating unique ids.
    static GUID_COUNTER: RefCell<u64> = const { RefCell::new(0) };

    /// Live instances by id.
    static INSTANCES: RefCell<HashMap<InstanceId, Weak<Instance>>> = RefCell::new(HashMap::new());

    /// Instances mounted on each named target, in mount order.
    static TARGETS: RefCell<HashMap<String, Vec<Rc<Instance>>>> = RefCell::new(HashMap::new());

    /// Teardown callbacks registered per instance.
    static TEARDOWN_CALLBACKS: RefCell<HashMap<InstanceId, Vec<TeardownCallback>>> = RefCell::new(HashMap::new());
}

// =============================================================================
// Identity
// =============================================================================

/// Allocate the next instance id.
pub fn next_guid() -> InstanceId {
    GUID_COUNTER.with(|counter| {
        let mut counter = counter.borrow_mut();
        let id = InstanceId(*counter);
        *counter += 1;
        id
    })
}

/// Record a live instance.
pub fn register_instance(instance: &Rc<Instance>) {
    INSTANCES.with(|map| {
        map.borrow_mut()
            .insert(instance.guid(), Rc::downgrade(instance));
    });
}

/// Look up a live instance.
pub fn get_instance(id: InstanceId) -> Option<Rc<Instance>> {
    INSTANCES.with(|map| map.borrow().get(&id).and_then(Weak::upgrade))
}

/// Check if an id belongs to a live, registered instance.
pub fn is_live(id: InstanceId) -> bool {
    get_instance(id).is_some()
}

/// Drop entries for instances that were dropped without being released.
fn prune_dead() {
    INSTANCES.with(|map| {
        map.borrow_mut().retain(|_, weak| weak.strong_count() > 0);
    });
}

/// Count of registered instances that are still alive.
pub fn instance_count() -> usize {
    prune_dead();
    INSTANCES.with(|map| map.borrow().len())
}

/// Live instances whose parent is `id`.
pub fn children_of(id: InstanceId) -> Vec<Rc<Instance>> {
    prune_dead();
    let live: Vec<Rc<Instance>> =
        INSTANCES.with(|map| map.borrow().values().filter_map(Weak::upgrade).collect());

    let mut children: Vec<Rc<Instance>> = live
        .into_iter()
        .filter(|instance| instance.parent().is_some_and(|p| p.guid() == id))
        .collect();
    children.sort_by_key(|instance| instance.guid());
    children
}

/// Forget an instance: drop its id mapping, target mounts and callbacks.
pub fn release_instance(id: InstanceId) {
    INSTANCES.with(|map| {
        map.borrow_mut().remove(&id);
    });
    TARGETS.with(|targets| {
        for mounted in targets.borrow_mut().values_mut() {
            mounted.retain(|instance| instance.guid() != id);
        }
    });
    TEARDOWN_CALLBACKS.with(|callbacks| {
        callbacks.borrow_mut().remove(&id);
    });
}

// =============================================================================
// Mount Targets
// =============================================================================

/// Mount an instance on a named target.
pub fn attach_to_target(target: &str, instance: Rc<Instance>) {
    TARGETS.with(|targets| {
        targets
            .borrow_mut()
            .entry(target.to_string())
            .or_default()
            .push(instance);
    });
}

/// Instances currently mounted on `target`.
pub fn instances_on_target(target: &str) -> Vec<Rc<Instance>> {
    TARGETS.with(|targets| targets.borrow().get(target).cloned().unwrap_or_default())
}

/// Remove and return everything mounted on `target`.
pub fn detach_all(target: &str) -> Vec<Rc<Instance>> {
    TARGETS.with(|targets| {
        targets
            .borrow_mut()
            .get_mut(target)
            .map(std::mem::take)
            .unwrap_or_default()
    })
}

// =============================================================================
// Teardown Callbacks
// =============================================================================

/// Register a callback to run when the instance `id` is torn down.
pub fn on_teardown(
    id: InstanceId,
    callback: impl FnOnce() -> std::result::Result<(), String> + 'static,
) {
    TEARDOWN_CALLBACKS.with(|callbacks| {
        callbacks
            .borrow_mut()
            .entry(id)
            .or_default()
            .push(Box::new(callback));
    });
}

/// Run and clear teardown callbacks for an instance.
///
/// All callbacks run; the first error is returned.
pub(crate) fn run_teardown_callbacks(id: InstanceId) -> std::result::Result<(), String> {
    let callbacks = TEARDOWN_CALLBACKS.with(|callbacks| callbacks.borrow_mut().remove(&id));
    let mut first_error = None;
    for callback in callbacks.into_iter().flatten() {
        if let Err(err) = callback() {
            first_error.get_or_insert(err);
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

// =============================================================================
// Reset (for testing)
// =============================================================================

/// Reset all registry state (for testing).
///
/// Id allocation keeps counting so ids stay unique across resets.
pub fn reset_registry() {
    INSTANCES.with(|map| map.borrow_mut().clear());
    TARGETS.with(|targets| targets.borrow_mut().clear());
    TEARDOWN_CALLBACKS.with(|callbacks| callbacks.borrow_mut().clear());
}
