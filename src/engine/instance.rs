//! Instance - a component in the tree.
//!
//! Holds what the binding layer needs from a component:
//! - a unique [`InstanceId`]
//! - its placement under a parent ([`Component`]), if any
//! - the isolation flag
//! - its [`Viewmodel`]
//! - an optional method table ([`HookMethods`])
//! - an event sink (`on` / `fire`)

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use super::fragment::Fragment;
use super::registry;
use crate::error::{BindError, Result};
use crate::resolve::{resolve_ref, Reference};
use crate::types::{InstanceFlags, InstanceId};
use crate::viewmodel::Viewmodel;

/// Hook method or event handler.
pub type Method = Rc<dyn Fn(&Instance)>;

// =============================================================================
// HookMethods
// =============================================================================

/// Methods an instance may or may not implement.
///
/// Hook queues look methods up by name (`on_init`, `on_inited`, ...) and skip
/// the call when the instance has none.
#[derive(Clone, Default)]
pub struct HookMethods {
    methods: HashMap<String, Method>,
    legacy_init: Option<Method>,
}

impl HookMethods {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named method.
    pub fn with(mut self, name: &str, method: impl Fn(&Instance) + 'static) -> Self {
        self.methods.insert(name.to_string(), Rc::new(method));
        self
    }

    /// Add the deprecated single-shot `init` method.
    #[deprecated(note = "use an `on_init` method instead")]
    pub fn with_legacy_init(mut self, init: impl Fn(&Instance) + 'static) -> Self {
        self.legacy_init = Some(Rc::new(init));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    pub fn legacy_init(&self) -> Option<&Method> {
        self.legacy_init.as_ref()
    }
}

// =============================================================================
// Component placement
// =============================================================================

/// Where a component instance sits inside its parent.
#[derive(Clone)]
pub struct Component {
    parent: Weak<Instance>,
    parent_fragment: Rc<Fragment>,
}

impl Component {
    /// Place a component in `parent_fragment`. The parent instance is the
    /// fragment's owner.
    pub fn new(parent_fragment: &Rc<Fragment>) -> Self {
        let parent = parent_fragment
            .root()
            .map(|instance| Rc::downgrade(&instance))
            .unwrap_or_default();
        Self {
            parent,
            parent_fragment: parent_fragment.clone(),
        }
    }

    /// The fragment in the parent that encloses this component.
    pub fn parent_fragment(&self) -> &Rc<Fragment> {
        &self.parent_fragment
    }
}

// =============================================================================
// Instance
// =============================================================================

pub struct Instance {
    guid: InstanceId,
    flags: Cell<InstanceFlags>,
    component: Option<Component>,
    viewmodel: Viewmodel,
    methods: HookMethods,
    subscribers: RefCell<HashMap<String, Vec<Method>>>,
    fragment: RefCell<Option<Rc<Fragment>>>,
    target: Option<String>,
}

impl Instance {
    pub(crate) fn new(
        viewmodel: Viewmodel,
        component: Option<Component>,
        flags: InstanceFlags,
        methods: HookMethods,
        target: Option<String>,
    ) -> Rc<Instance> {
        Rc::new(Instance {
            guid: registry::next_guid(),
            flags: Cell::new(flags),
            component,
            viewmodel,
            methods,
            subscribers: RefCell::new(HashMap::new()),
            fragment: RefCell::new(None),
            target,
        })
    }

    pub fn guid(&self) -> InstanceId {
        self.guid
    }

    /// Enclosing instance, for components that are still alive.
    pub fn parent(&self) -> Option<Rc<Instance>> {
        self.component.as_ref().and_then(|c| c.parent.upgrade())
    }

    pub fn component(&self) -> Option<&Component> {
        self.component.as_ref()
    }

    pub fn is_isolated(&self) -> bool {
        self.flags.get().contains(InstanceFlags::ISOLATED)
    }

    pub fn is_torn_down(&self) -> bool {
        self.flags.get().contains(InstanceFlags::TORN_DOWN)
    }

    pub fn flags(&self) -> InstanceFlags {
        self.flags.get()
    }

    pub fn viewmodel(&self) -> &Viewmodel {
        &self.viewmodel
    }

    pub fn methods(&self) -> &HookMethods {
        &self.methods
    }

    /// Mount target name, if any.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Root fragment, once rendered.
    pub fn fragment(&self) -> Option<Rc<Fragment>> {
        self.fragment.borrow().clone()
    }

    pub(crate) fn set_fragment(&self, fragment: Rc<Fragment>) {
        *self.fragment.borrow_mut() = Some(fragment);
    }

    /// Resolve a template reference from `fragment` (or from the root
    /// fragment when `None`).
    pub fn resolve(&self, reference: &str, fragment: Option<&Rc<Fragment>>) -> Result<Reference> {
        let root_fragment = self.fragment();
        resolve_ref(self, reference, fragment.or(root_fragment.as_ref()))
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Subscribe to an event.
    pub fn on(&self, event: &str, handler: impl Fn(&Instance) + 'static) {
        self.subscribe(event, Rc::new(handler));
    }

    pub(crate) fn subscribe(&self, event: &str, handler: Method) {
        self.subscribers
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    /// Notify subscribers of `event`.
    pub fn fire(&self, event: &str) {
        let handlers: Vec<Method> = self
            .subscribers
            .borrow()
            .get(event)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(self);
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Tear down this instance and its live child components.
    ///
    /// Fires `teardown`, runs teardown callbacks and unregisters the instance.
    /// Every step runs even if a callback fails; the first failure is
    /// returned afterwards.
    pub fn teardown(&self) -> Result<()> {
        if self.is_torn_down() {
            return Err(BindError::Teardown {
                instance: self.guid,
                reason: "already torn down".to_string(),
            });
        }
        self.flags.set(self.flags.get() | InstanceFlags::TORN_DOWN);
        log::debug!("tearing down {}", self.guid);

        let mut failure = None;

        for child in registry::children_of(self.guid) {
            if !child.is_torn_down() {
                if let Err(err) = child.teardown() {
                    failure.get_or_insert(err);
                }
            }
        }

        self.fire("teardown");

        if let Err(reason) = registry::run_teardown_callbacks(self.guid) {
            failure.get_or_insert(BindError::Teardown {
                instance: self.guid,
                reason,
            });
        }

        registry::release_instance(self.guid);

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("guid", &self.guid)
            .field("flags", &self.flags.get())
            .field("parent", &self.parent().map(|p| p.guid()))
            .finish()
    }
}
