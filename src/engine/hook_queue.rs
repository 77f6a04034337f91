//! Hook Queue - ordered lifecycle hooks across nested instances.
//!
//! A hook named `init` has two variants:
//! - instance-scoped: method `on_init`, event `init`. Fires for every
//!   instance as soon as it ends, regardless of order.
//! - ordered: method `on_inited`, event `inited`. An instance's ordered hook
//!   never fires before its parent's.
//!
//! # Ordering
//!
//! ```text
//! begin(P)
//!   begin(C)          C constructed while P is in process
//!   end(C)            C fires `init`, then waits in P's queue
//! end(P)              P fires `init`, then `inited`, then drains: C fires `inited`
//! ```
//!
//! Queues are drained one entry at a time with no borrow held across firing.
//! An instance that joins a queue while it is being drained (a component
//! created by a handler) is still fired before the drain finishes.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use super::instance::Instance;
use crate::config::config;
use crate::types::InstanceId;

/// Name of the instance-scoped method that also triggers a deprecated
/// `init` method.
const LEGACY_INIT_METHOD: &str = "on_init";

pub struct HookQueue {
    instance_event: String,
    instance_method: String,
    event: String,
    method: String,
    in_process: RefCell<HashSet<InstanceId>>,
    queue: RefCell<HashMap<InstanceId, VecDeque<Rc<Instance>>>>,
}

impl HookQueue {
    pub fn new(name: &str) -> Self {
        Self {
            instance_event: name.to_string(),
            instance_method: format!("on_{name}"),
            event: format!("{name}ed"),
            method: format!("on_{name}ed"),
            in_process: RefCell::new(HashSet::new()),
            queue: RefCell::new(HashMap::new()),
        }
    }

    /// Mark `instance` as in process for this hook.
    pub fn begin(&self, instance: &Instance) {
        self.in_process.borrow_mut().insert(instance.guid());
    }

    /// Finish `instance`.
    ///
    /// The instance-scoped hook always fires. If the instance was begun, the
    /// ordered hook either fires now (together with everything queued behind
    /// this instance) or, when the parent is still in process, the instance is
    /// queued on the parent.
    pub fn end(&self, instance: &Rc<Instance>) {
        let parent = instance.parent();

        self.fire_for_instance(instance);

        let in_process = self.is_in_process(instance.guid());
        if !in_process {
            return;
        }

        match parent {
            Some(parent) if self.is_in_process(parent.guid()) => {
                log::trace!(
                    "{}: deferring {} behind {}",
                    self.event,
                    instance.guid(),
                    parent.guid()
                );
                self.queue
                    .borrow_mut()
                    .entry(parent.guid())
                    .or_default()
                    .push_back(instance.clone());
            }
            _ => self.fire_for_queue(instance),
        }

        self.in_process.borrow_mut().remove(&instance.guid());
    }

    /// Forget `instance` without firing anything. Used when construction
    /// fails between `begin` and `end`.
    ///
    /// Returns everything that was waiting behind it, including instances
    /// queued behind those, in queue order. Their ordered hooks will never
    /// fire; the caller decides what to do with them.
    pub fn cancel(&self, instance: &Instance) -> Vec<Rc<Instance>> {
        self.in_process.borrow_mut().remove(&instance.guid());

        let mut dropped: Vec<Rc<Instance>> = Vec::new();
        let mut next = Some(instance.guid());
        let mut index = 0;
        while let Some(id) = next {
            let waiting = self.queue.borrow_mut().remove(&id);
            dropped.extend(waiting.into_iter().flatten());
            next = dropped.get(index).map(|child| child.guid());
            index += 1;
        }

        dropped
    }

    pub fn is_in_process(&self, id: InstanceId) -> bool {
        self.in_process.borrow().contains(&id)
    }

    /// Instances waiting behind `id`.
    pub fn queued(&self, id: InstanceId) -> usize {
        self.queue.borrow().get(&id).map_or(0, VecDeque::len)
    }

    fn fire_for_instance(&self, instance: &Instance) {
        fire_hook(instance, &self.instance_method, &self.instance_event);
    }

    fn fire_for_queue(&self, instance: &Rc<Instance>) {
        fire_hook(instance, &self.method, &self.event);

        if self.method == LEGACY_INIT_METHOD {
            call_legacy_init(instance);
        }

        // Live queue: handlers above may have queued more children
        loop {
            let next = self
                .queue
                .borrow_mut()
                .get_mut(&instance.guid())
                .and_then(VecDeque::pop_front);
            let Some(child) = next else { break };
            self.fire_for_queue(&child);
        }

        self.queue.borrow_mut().remove(&instance.guid());
    }
}

fn fire_hook(instance: &Instance, method: &str, event: &str) {
    log::trace!("{}: firing {}", instance.guid(), event);

    if let Some(method) = instance.methods().get(method).cloned() {
        method(instance);
    }

    if method == LEGACY_INIT_METHOD {
        call_legacy_init(instance);
    }

    instance.fire(event);
}

fn call_legacy_init(instance: &Instance) {
    let cfg = config();
    if !cfg.legacy_init {
        return;
    }
    if let Some(init) = instance.methods().legacy_init().cloned() {
        if cfg.warn_deprecations {
            log::warn!(
                "{}: the `init` method is deprecated, use `on_init` instead",
                instance.guid()
            );
        }
        init(instance);
    }
}
