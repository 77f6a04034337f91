//! Reference resolution.
//!
//! Maps a template reference to a model:
//! - `~/a.b` - joined from the instance's root, never deferred
//! - `.`, `./a`, `../a` - relative to the innermost context
//! - `a.b` - searched through the context stack, innermost match wins;
//!   if only `a` exists somewhere the innermost such context owns the name,
//!   and a complete miss yields a pending [`Unresolved`] that repairs itself
//!   later

use std::rc::Rc;

use super::context_stack::ContextStack;
use crate::engine::{Fragment, Instance};
use crate::error::{BindError, Result};
use crate::keypath::{self, RefKind, ANCESTOR_PREFIX};
use crate::types::Value;
use crate::viewmodel::{Model, Unresolved, Viewmodel};

/// Outcome of resolving a reference.
#[derive(Debug, Clone)]
pub enum Reference {
    /// Bound to a real model.
    Model(Model),
    /// Waiting on a placeholder for the leading key; `tail` is joined onto
    /// the real model once it resolves.
    Pending { placeholder: Unresolved, tail: String },
}

impl Reference {
    /// The bound model, if there is one yet.
    pub fn model(&self) -> Option<Model> {
        match self {
            Reference::Model(model) => Some(model.clone()),
            Reference::Pending { placeholder, tail } => {
                placeholder.resolved().map(|model| model.join(tail))
            }
        }
    }

    /// Current value behind the reference.
    pub fn get(&self) -> Option<Value> {
        self.model().and_then(|model| model.get())
    }

    pub fn is_resolved(&self) -> bool {
        match self {
            Reference::Model(_) => true,
            Reference::Pending { placeholder, .. } => placeholder.is_resolved(),
        }
    }

    pub fn placeholder(&self) -> Option<&Unresolved> {
        match self {
            Reference::Model(_) => None,
            Reference::Pending { placeholder, .. } => Some(placeholder),
        }
    }
}

/// Resolve `raw` as written in a template at `fragment` inside `instance`.
pub fn resolve_ref(
    instance: &Instance,
    raw: &str,
    fragment: Option<&Rc<Fragment>>,
) -> Result<Reference> {
    let reference = keypath::normalise(raw);

    match keypath::classify(&reference) {
        RefKind::Root(path) => Ok(Reference::Model(instance.viewmodel().root().join(path))),
        RefKind::Relative => {
            let context = ContextStack::new(fragment).next();
            resolve_ancestor_ref(context, &reference).map(Reference::Model)
        }
        RefKind::Ambiguous => resolve_ambiguous_ref(instance.viewmodel(), &reference, fragment),
    }
}

fn resolve_ancestor_ref(context: Option<Model>, reference: &str) -> Result<Model> {
    let Some(mut context) = context else {
        return Err(BindError::NoBaseContext {
            reference: reference.to_string(),
        });
    };

    // `.` is the current context
    if reference == "." {
        return Ok(context);
    }

    let mut rest = reference;
    let mut is_ancestor = false;

    loop {
        let stepped = if rest == ".." {
            Some("")
        } else {
            rest.strip_prefix(ANCESTOR_PREFIX)
        };
        let Some(remaining) = stepped else { break };

        if context.is_root() {
            return Err(BindError::AncestorOverflow {
                reference: reference.to_string(),
            });
        }
        context = context.parent().ok_or_else(|| BindError::AncestorOverflow {
            reference: reference.to_string(),
        })?;
        rest = remaining;
        is_ancestor = true;
    }

    // Restricted reference: `./x` or `.x`
    if !is_ancestor {
        rest = rest
            .strip_prefix("./")
            .or_else(|| rest.strip_prefix('.'))
            .unwrap_or(rest);
    }

    Ok(context.join(rest))
}

fn resolve_ambiguous_ref(
    viewmodel: &Viewmodel,
    keypath: &str,
    fragment: Option<&Rc<Fragment>>,
) -> Result<Reference> {
    let first_key = keypath::first_key(keypath);
    let tail = keypath::tail(keypath).to_string();

    let mut stack = ContextStack::new(fragment);
    let mut chain: Vec<Model> = Vec::new();
    // Innermost context that already has the leading key
    let mut owner: Option<Model> = None;

    // Closer contexts take precedence
    while let Some(context) = stack.next() {
        if chain.is_empty() {
            if let Some(placeholder) = context.unresolved(first_key) {
                return Ok(Reference::Pending { placeholder, tail });
            }
        }

        if let Some(model) = context.try_join(keypath) {
            return Ok(Reference::Model(model));
        }

        if owner.is_none() && context.has_child(first_key) {
            owner = Some(context.clone());
        }

        chain.push(context);
    }

    // Only the rest of the keypath is missing: bind under the context that
    // owns the leading key, the value shows up there once written.
    if let Some(owner) = owner {
        return Ok(Reference::Model(owner.join(keypath)));
    }

    if !chain.is_empty() {
        log::debug!(
            "\"{}\" not found in {} context(s){}",
            keypath,
            chain.len(),
            if stack.crossed_boundary() { " across components" } else { "" }
        );
        let placeholder = Unresolved::capture(&chain, first_key);
        return Ok(Reference::Pending { placeholder, tail });
    }

    // No contexts at all: the keypath is taken as absolute. Give it an
    // explicit null so later lookups for it find something.
    let model = viewmodel.root().join(keypath);
    if model.get().is_none() {
        model.set(Value::Null)?;
    }
    Ok(Reference::Model(model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{initialise, reset_registry, InstanceOptions};
    use serde_json::json;

    fn instance(data: Value) -> Rc<Instance> {
        reset_registry();
        initialise(InstanceOptions::new().data(data)).unwrap()
    }

    #[test]
    fn test_root_reference() {
        let r = instance(json!({ "a": { "b": 1 }, "ctx": { "a": { "b": 2 } } }));
        let inner = r.fragment().unwrap().section("ctx");

        let resolved = resolve_ref(&r, "~/a.b", Some(&inner)).unwrap();
        assert!(resolved.model().unwrap().ptr_eq(&r.viewmodel().join("a.b")));
        assert_eq!(resolved.get(), Some(json!(1)));

        // Root references never defer
        let missing = resolve_ref(&r, "~/nope", Some(&inner)).unwrap();
        assert!(matches!(missing, Reference::Model(_)));
    }

    #[test]
    fn test_current_context() {
        let r = instance(json!({ "items": [{ "name": "a" }] }));
        let item = r.fragment().unwrap().section("items.0");

        let this = resolve_ref(&r, ".", Some(&item)).unwrap();
        assert_eq!(this.model().unwrap().keypath(), "items.0");

        let this_alias = resolve_ref(&r, "this", Some(&item)).unwrap();
        assert_eq!(this_alias.model().unwrap().keypath(), "items.0");

        let name = resolve_ref(&r, "./name", Some(&item)).unwrap();
        assert_eq!(name.get(), Some(json!("a")));

        let dotted = resolve_ref(&r, ".name", Some(&item)).unwrap();
        assert_eq!(dotted.model().unwrap().keypath(), "items.0.name");
    }

    #[test]
    fn test_ancestor_reference() {
        let r = instance(json!({ "items": [{ "name": "a" }], "title": "t" }));
        let item = r.fragment().unwrap().section("items.0");

        let up = resolve_ref(&r, "../", Some(&item)).unwrap();
        assert_eq!(up.model().unwrap().keypath(), "items");

        let up_two = resolve_ref(&r, "../../title", Some(&item)).unwrap();
        assert_eq!(up_two.get(), Some(json!("t")));

        let bare = resolve_ref(&r, "..", Some(&item)).unwrap();
        assert_eq!(bare.model().unwrap().keypath(), "items");
    }

    #[test]
    fn test_ancestor_overflow_is_an_error() {
        let r = instance(json!({ "a": { "x": 1 } }));
        let ctx = r.fragment().unwrap().section("a");

        let err = resolve_ref(&r, "../../../x", Some(&ctx)).unwrap_err();
        assert_eq!(
            err,
            BindError::AncestorOverflow {
                reference: "../../../x".into()
            }
        );
    }

    #[test]
    fn test_relative_without_context_is_an_error() {
        let r = instance(json!({}));
        let err = resolve_ref(&r, "../x", None).unwrap_err();
        assert!(matches!(err, BindError::NoBaseContext { .. }));
    }

    #[test]
    fn test_shadowing() {
        let r = instance(json!({ "x": "root", "outer": { "x": "outer", "inner": { "x": "inner" } } }));
        let outer = r.fragment().unwrap().section("outer");
        let inner = outer.section("outer.inner");

        let resolved = resolve_ref(&r, "x", Some(&inner)).unwrap();
        assert_eq!(resolved.get(), Some(json!("inner")));

        let from_outer = resolve_ref(&r, "x", Some(&outer)).unwrap();
        assert_eq!(from_outer.get(), Some(json!("outer")));
    }

    #[test]
    fn test_falls_through_to_outer_contexts() {
        let r = instance(json!({ "title": "t", "outer": { "inner": {} } }));
        let inner = r.fragment().unwrap().section("outer.inner");

        let resolved = resolve_ref(&r, "title", Some(&inner)).unwrap();
        assert!(resolved.model().unwrap().ptr_eq(&r.viewmodel().join("title")));
    }

    #[test]
    fn test_index_syntax_is_normalised() {
        let r = instance(json!({ "items": ["a", "b"] }));
        let resolved = r.resolve("items[1]", None).unwrap();
        assert_eq!(resolved.get(), Some(json!("b")));
    }

    #[test]
    fn test_missing_reference_is_pending_and_reused() {
        let r = instance(json!({ "ctx": {} }));
        let ctx = r.fragment().unwrap().section("ctx");

        let first = resolve_ref(&r, "foo", Some(&ctx)).unwrap();
        let second = resolve_ref(&r, "foo.bar", Some(&ctx)).unwrap();

        let (Some(a), Some(b)) = (first.placeholder(), second.placeholder()) else {
            panic!("expected pending references");
        };
        assert!(a.ptr_eq(b));
        assert!(!first.is_resolved());
        assert_eq!(first.get(), None);
    }

    #[test]
    fn test_pending_reference_self_repairs() {
        let r = instance(json!({ "ctx": {} }));
        let ctx_fragment = r.fragment().unwrap().section("ctx");
        let ctx = r.viewmodel().join("ctx");
        let root = r.viewmodel().root().clone();

        let pending = resolve_ref(&r, "foo.bar", Some(&ctx_fragment)).unwrap();
        assert_eq!(ctx.watcher_count("foo"), 1);
        assert_eq!(root.watcher_count("foo"), 1);

        ctx.join("foo").set(json!({ "bar": 7 })).unwrap();

        assert!(pending.is_resolved());
        assert_eq!(pending.model().unwrap().keypath(), "ctx.foo.bar");
        assert_eq!(pending.get(), Some(json!(7)));
        assert_eq!(ctx.watcher_count("foo"), 0);
        assert_eq!(root.watcher_count("foo"), 0);
        assert!(ctx.unresolved("foo").is_none());
        assert!(root.unresolved("foo").is_none());

        // A fresh lookup now finds the real model
        let again = resolve_ref(&r, "foo.bar", Some(&ctx_fragment)).unwrap();
        assert!(matches!(again, Reference::Model(_)));
    }

    #[test]
    fn test_existing_leading_key_binds_directly() {
        let r = instance(json!({ "ctx": { "foo": {} } }));
        let ctx_fragment = r.fragment().unwrap().section("ctx");
        let ctx = r.viewmodel().join("ctx");

        let reference = resolve_ref(&r, "foo.bar", Some(&ctx_fragment)).unwrap();
        let Reference::Model(model) = &reference else {
            panic!("expected a bound model");
        };
        assert_eq!(model.keypath(), "ctx.foo.bar");
        assert_eq!(reference.get(), None);
        assert_eq!(ctx.watcher_count("foo"), 0);
        assert!(ctx.unresolved("foo").is_none());

        ctx.join("foo.bar").set(json!(5)).unwrap();
        assert_eq!(reference.get(), Some(json!(5)));

        // Other lookups under the same key are not handed a placeholder
        let sibling = resolve_ref(&r, "foo.baz", Some(&ctx_fragment)).unwrap();
        assert!(matches!(sibling, Reference::Model(_)));
    }

    #[test]
    fn test_full_match_in_outer_context_wins_over_leading_key() {
        let r = instance(json!({ "foo": { "bar": 1 }, "ctx": { "foo": {} } }));
        let ctx_fragment = r.fragment().unwrap().section("ctx");

        let resolved = resolve_ref(&r, "foo.bar", Some(&ctx_fragment)).unwrap();
        assert_eq!(resolved.model().unwrap().keypath(), "foo.bar");
        assert_eq!(resolved.get(), Some(json!(1)));
    }

    #[test]
    fn test_placeholder_repairs_on_ancestor_write() {
        let r = instance(json!({ "ctx": {} }));
        let ctx_fragment = r.fragment().unwrap().section("ctx");
        let root = r.viewmodel().root().clone();

        let pending = resolve_ref(&r, "foo", Some(&ctx_fragment)).unwrap();
        assert!(!pending.is_resolved());

        root.set(json!({ "ctx": { "foo": 1 } })).unwrap();

        assert!(pending.is_resolved());
        assert_eq!(pending.model().unwrap().keypath(), "ctx.foo");
        assert_eq!(pending.get(), Some(json!(1)));
        assert_eq!(r.viewmodel().join("ctx").watcher_count("foo"), 0);
        assert_eq!(root.watcher_count("foo"), 0);
    }

    #[test]
    fn test_no_context_fallback_rejects_far_index() {
        let r = instance(json!({ "items": [] }));
        let err = resolve_ambiguous_ref(r.viewmodel(), "items.99999999999", None).unwrap_err();
        assert!(matches!(err, BindError::IndexOutOfRange { .. }));
    }

    #[test]
    fn test_no_context_falls_back_to_root() {
        let r = instance(json!({}));
        let resolved = resolve_ambiguous_ref(r.viewmodel(), "ghost", None).unwrap();

        let model = resolved.model().unwrap();
        assert!(model.ptr_eq(&r.viewmodel().join("ghost")));
        assert_eq!(model.get(), Some(Value::Null));

        // Same lookup resolves the same way
        let again = resolve_ambiguous_ref(r.viewmodel(), "ghost", None).unwrap();
        assert!(again.model().unwrap().ptr_eq(&model));
        assert!(r.viewmodel().root().try_join("ghost").is_some());
    }
}
