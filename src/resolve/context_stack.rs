//! Context Stack - enclosing data contexts, innermost first.
//!
//! Starting from a fragment, yields:
//! 1. the context of each fragment up the local chain (fragments without a
//!    context are skipped)
//! 2. the owning instance's root model
//! 3. if that instance is a non-isolated component, the same walk again from
//!    the enclosing fragment in the parent instance
//!
//! The walk is lazy and single-pass. It never crosses an isolated boundary.

use std::iter::FusedIterator;
use std::rc::Rc;

use crate::engine::{Fragment, Instance};
use crate::viewmodel::Model;

pub struct ContextStack {
    next_fragment: Option<Rc<Fragment>>,
    root: Option<Rc<Instance>>,
    crossed_boundary: bool,
}

impl ContextStack {
    pub fn new(fragment: Option<&Rc<Fragment>>) -> Self {
        let mut stack = Self {
            next_fragment: None,
            root: None,
            crossed_boundary: false,
        };
        if let Some(fragment) = fragment {
            stack.assign(fragment.clone());
        }
        stack
    }

    /// Whether the walk has continued into a parent instance.
    pub fn crossed_boundary(&self) -> bool {
        self.crossed_boundary
    }

    fn assign(&mut self, fragment: Rc<Fragment>) {
        self.root = fragment.root();
        self.next_fragment = Some(fragment);
    }

    fn next_local(&mut self) -> Option<Model> {
        while let Some(fragment) = self.next_fragment.take() {
            self.next_fragment = fragment.parent().cloned();
            if let Some(context) = fragment.context() {
                return Some(context.clone());
            }
        }
        None
    }

    fn next_root(&mut self) -> Option<Model> {
        let root = self.root.take()?;
        let context = root.viewmodel().root().clone();

        if !root.is_isolated() && root.parent().is_some() {
            if let Some(component) = root.component() {
                log::trace!("context stack crossing from {} into its parent", root.guid());
                self.crossed_boundary = true;
                self.assign(component.parent_fragment().clone());
            }
        }

        Some(context)
    }
}

impl Iterator for ContextStack {
    type Item = Model;

    fn next(&mut self) -> Option<Model> {
        self.next_local().or_else(|| self.next_root())
    }
}

impl FusedIterator for ContextStack {}
