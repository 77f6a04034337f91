//! Unresolved - stand-in for a reference nothing in scope can satisfy yet.
//!
//! # Lifecycle
//!
//! 1. [`Unresolved::capture`] is called with every context the resolver
//!    searched. The placeholder is registered under `unresolved[key]` on each
//!    of them, and one resolution watcher per context is keyed by `key`.
//! 2. When any of those contexts gains a `key` child, the watcher fires:
//!    every registration in the chain is removed, then the placeholder is
//!    resolved to `context.join(key)`.
//! 3. Dependents registered with [`Unresolved::on_resolve`] are rebased, and
//!    effects reading [`Unresolved::resolved`] re-run.
//!
//! Resolution happens once. Later notifications find nothing to clean up and
//! a placeholder that is already resolved.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use spark_signals::{signal, Signal};

use super::model::{Model, WeakModel, Watcher};
use crate::types::WatcherId;

struct UnresolvedInner {
    key: String,
    resolved: RefCell<Option<Model>>,
    /// Bumped on resolution for reactive readers.
    version: Signal<u64>,
    dependents: RefCell<Vec<Box<dyn Fn(&Model)>>>,
    force: RefCell<Option<Rc<dyn Fn()>>>,
}

/// Shared deferred-resolution placeholder.
#[derive(Clone)]
pub struct Unresolved(Rc<UnresolvedInner>);

impl Unresolved {
    fn new(key: &str) -> Self {
        Unresolved(Rc::new(UnresolvedInner {
            key: key.to_string(),
            resolved: RefCell::new(None),
            version: signal(0),
            dependents: RefCell::new(Vec::new()),
            force: RefCell::new(None),
        }))
    }

    /// Create a placeholder for `key` watching every context in `chain`.
    ///
    /// `chain` is ordered innermost first; forcing resolution uses the
    /// innermost context.
    pub fn capture(chain: &[Model], key: &str) -> Self {
        let placeholder = Unresolved::new(key);
        let registrations: Rc<RefCell<Vec<(WeakModel, WatcherId)>>> =
            Rc::new(RefCell::new(Vec::with_capacity(chain.len())));

        let weak_self = Rc::downgrade(&placeholder.0);
        let cleanup = registrations.clone();
        let watched_key = key.to_string();

        let resolve: Watcher = Rc::new(move |context: &Model| {
            let Some(inner) = weak_self.upgrade() else {
                return;
            };
            let placeholder = Unresolved(inner);

            let registered: Vec<(WeakModel, WatcherId)> = cleanup.borrow_mut().drain(..).collect();
            for (weak_context, id) in registered {
                if let Some(current) = weak_context.upgrade() {
                    current.remove_watcher(&watched_key, id);
                    current.remove_unresolved(&watched_key, &placeholder);
                }
            }

            placeholder.resolve(context.join(&watched_key));
        });

        for context in chain {
            context.register_unresolved(key, placeholder.clone());
            let id = context.add_watcher(key, resolve.clone());
            registrations.borrow_mut().push((context.downgrade(), id));
        }

        if let Some(innermost) = chain.first() {
            let innermost = innermost.downgrade();
            placeholder.set_force_resolve(Rc::new(move || {
                if let Some(context) = innermost.upgrade() {
                    resolve(&context);
                }
            }));
        }

        log::debug!(
            "unresolved \"{}\" captured over {} context(s)",
            key,
            chain.len()
        );

        placeholder
    }

    /// The leading key this placeholder is waiting for.
    pub fn key(&self) -> &str {
        &self.0.key
    }

    pub fn is_resolved(&self) -> bool {
        self.0.resolved.borrow().is_some()
    }

    /// The real model, once resolved. Tracks resolution when read in an effect.
    pub fn resolved(&self) -> Option<Model> {
        let _ = self.0.version.get();
        self.0.resolved.borrow().clone()
    }

    /// Run `dependent` with the real model when this resolves, or right away
    /// if it already has.
    pub fn on_resolve(&self, dependent: impl Fn(&Model) + 'static) {
        let resolved = self.0.resolved.borrow().clone();
        match resolved {
            Some(model) => dependent(&model),
            None => self.0.dependents.borrow_mut().push(Box::new(dependent)),
        }
    }

    /// Point this placeholder at `model`. Only the first call has any effect.
    pub fn resolve(&self, model: Model) {
        if self.is_resolved() {
            return;
        }
        log::debug!("unresolved \"{}\" resolved to \"{}\"", self.0.key, model.keypath());

        *self.0.resolved.borrow_mut() = Some(model.clone());
        self.0.version.set(self.0.version.get() + 1);

        let dependents: Vec<Box<dyn Fn(&Model)>> = self.0.dependents.borrow_mut().drain(..).collect();
        for dependent in dependents {
            dependent(&model);
        }
    }

    pub(crate) fn set_force_resolve(&self, force: Rc<dyn Fn()>) {
        *self.0.force.borrow_mut() = Some(force);
    }

    /// Resolve against the innermost searched context without waiting for a
    /// notification.
    pub fn force_resolve(&self) {
        let force = self.0.force.borrow().clone();
        if let Some(force) = force {
            force();
        }
    }

    pub fn ptr_eq(&self, other: &Unresolved) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakUnresolved {
        WeakUnresolved(Rc::downgrade(&self.0))
    }
}

/// Non-owning placeholder handle.
#[derive(Clone)]
pub struct WeakUnresolved(Weak<UnresolvedInner>);

impl WeakUnresolved {
    pub fn upgrade(&self) -> Option<Unresolved> {
        self.0.upgrade().map(Unresolved)
    }
}

impl fmt::Debug for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unresolved")
            .field("key", &self.0.key)
            .field("resolved", &self.0.resolved.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn contexts() -> (Model, Model, Model) {
        let root = Model::new_root(json!({ "outer": { "inner": {} } }));
        let outer = root.join("outer");
        let inner = root.join("outer.inner");
        (root, outer, inner)
    }

    #[test]
    fn test_capture_registers_on_every_context() {
        let (root, outer, inner) = contexts();
        let chain = vec![inner.clone(), outer.clone(), root.clone()];
        let placeholder = Unresolved::capture(&chain, "foo");

        for context in &chain {
            assert_eq!(context.watcher_count("foo"), 1);
            assert!(context.unresolved("foo").is_some_and(|p| p.ptr_eq(&placeholder)));
        }
        assert!(!placeholder.is_resolved());
    }

    #[test]
    fn test_resolves_when_key_appears() {
        let (root, outer, inner) = contexts();
        let chain = vec![inner.clone(), outer.clone(), root.clone()];
        let placeholder = Unresolved::capture(&chain, "foo");

        let rebased = Rc::new(RefCell::new(None::<String>));
        let rebased_clone = rebased.clone();
        placeholder.on_resolve(move |model| {
            *rebased_clone.borrow_mut() = Some(model.keypath().to_string());
        });

        outer.join("foo").set(json!(42)).ok();

        assert!(placeholder.resolved().is_some_and(|m| m.ptr_eq(&outer.join("foo"))));
        assert_eq!(rebased.borrow().as_deref(), Some("outer.foo"));
        for context in &chain {
            assert_eq!(context.watcher_count("foo"), 0);
            assert!(context.unresolved("foo").is_none());
        }
    }

    #[test]
    fn test_repeated_notification_is_harmless() {
        let (root, outer, inner) = contexts();
        let chain = vec![inner.clone(), outer.clone(), root.clone()];
        let placeholder = Unresolved::capture(&chain, "foo");

        let hits = Rc::new(Cell::new(0));
        let hits_clone = hits.clone();
        placeholder.on_resolve(move |_| hits_clone.set(hits_clone.get() + 1));

        inner.join("foo").set(json!(1)).ok();
        inner.notify_child("foo");
        root.notify_child("foo");
        placeholder.force_resolve();

        assert_eq!(hits.get(), 1);
        assert!(placeholder.resolved().is_some_and(|m| m.ptr_eq(&inner.join("foo"))));
    }

    #[test]
    fn test_force_resolve_uses_innermost_context() {
        let (root, outer, inner) = contexts();
        let placeholder = Unresolved::capture(&[inner.clone(), outer, root.clone()], "bar");

        placeholder.force_resolve();

        assert!(placeholder.resolved().is_some_and(|m| m.ptr_eq(&inner.join("bar"))));
        assert_eq!(root.watcher_count("bar"), 0);
    }

    #[test]
    fn test_on_resolve_after_resolution_runs_immediately() {
        let (root, _, _) = contexts();
        let placeholder = Unresolved::capture(&[root.clone()], "late");
        placeholder.force_resolve();

        let hit = Rc::new(Cell::new(false));
        let hit_clone = hit.clone();
        placeholder.on_resolve(move |_| hit_clone.set(true));
        assert!(hit.get());
    }
}
