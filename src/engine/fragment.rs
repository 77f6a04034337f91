//! Fragment - a position in an instance's rendered tree.
//!
//! Fragments form an upward-linked chain. Sections (`{{#each}}`, `{{#with}}`)
//! open child fragments that carry a context model; plain fragments inherit
//! whatever their ancestors provide.

use std::fmt;
use std::rc::{Rc, Weak};

use super::instance::Instance;
use crate::viewmodel::Model;

pub struct Fragment {
    context: Option<Model>,
    parent: Option<Rc<Fragment>>,
    root: Weak<Instance>,
}

impl Fragment {
    /// Top-level fragment of `instance`. Carries no context of its own.
    pub fn new_root(instance: &Rc<Instance>) -> Rc<Fragment> {
        Rc::new(Fragment {
            context: None,
            parent: None,
            root: Rc::downgrade(instance),
        })
    }

    /// Nested fragment owned by the same instance.
    pub fn child(self: &Rc<Self>, context: Option<Model>) -> Rc<Fragment> {
        Rc::new(Fragment {
            context,
            parent: Some(self.clone()),
            root: self.root.clone(),
        })
    }

    /// Nested fragment whose context is `keypath` joined onto the instance
    /// root, like a section over `keypath`.
    pub fn section(self: &Rc<Self>, keypath: &str) -> Rc<Fragment> {
        let context = self
            .root()
            .map(|instance| instance.viewmodel().join(keypath));
        self.child(context)
    }

    pub fn context(&self) -> Option<&Model> {
        self.context.as_ref()
    }

    pub fn parent(&self) -> Option<&Rc<Fragment>> {
        self.parent.as_ref()
    }

    /// The instance that owns this fragment.
    pub fn root(&self) -> Option<Rc<Instance>> {
        self.root.upgrade()
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("context", &self.context)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
