//! Instance construction.
//!
//! ```text
//! allocate id → on_construct → on_config → init.begin
//!     → compute stores → render template (children constructed here)
//!     → init.end → mount on target
//! ```
//!
//! Children created by the template end while their parent is still in
//! process, so their `on_inited` waits until the parent's has fired.

use std::rc::Rc;

use super::fragment::Fragment;
use super::hook_queue::HookQueue;
use super::instance::{Component, HookMethods, Instance, Method};
use super::registry;
use crate::error::Result;
use crate::types::{InstanceFlags, Value};
use crate::viewmodel::{Store, Viewmodel};

/// Renders an instance's root fragment. Child components are constructed
/// from here.
pub type Template = Box<dyn FnOnce(&Rc<Instance>) -> Result<Rc<Fragment>>>;

thread_local! {
    static INIT_HOOK: HookQueue = HookQueue::new("init");
}

/// Run `f` against the shared `init` hook queue.
pub fn with_init_hook<R>(f: impl FnOnce(&HookQueue) -> R) -> R {
    INIT_HOOK.with(f)
}

// =============================================================================
// Options
// =============================================================================

/// Per-instance configuration.
#[derive(Default)]
pub struct InstanceOptions {
    pub data: Value,
    pub isolated: bool,
    pub component: Option<Component>,
    pub methods: HookMethods,
    pub handlers: Vec<(String, Method)>,
    pub stores: Vec<(String, Rc<dyn Store>)>,
    pub template: Option<Template>,
    pub target: Option<String>,
    pub append: bool,
}

impl InstanceOptions {
    /// Options with an empty object as data.
    pub fn new() -> Self {
        Self {
            data: Value::Object(serde_json::Map::new()),
            ..Self::default()
        }
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn isolated(mut self, isolated: bool) -> Self {
        self.isolated = isolated;
        self
    }

    /// Construct as a component placed inside another instance.
    pub fn component(mut self, component: Component) -> Self {
        self.component = Some(component);
        self
    }

    pub fn methods(mut self, methods: HookMethods) -> Self {
        self.methods = methods;
        self
    }

    /// Subscribe to an event before any lifecycle hook fires.
    pub fn on(mut self, event: &str, handler: impl Fn(&Instance) + 'static) -> Self {
        self.handlers.push((event.to_string(), Rc::new(handler)));
        self
    }

    /// Back `keypath` with a store.
    pub fn store(mut self, keypath: &str, store: Rc<dyn Store>) -> Self {
        self.stores.push((keypath.to_string(), store));
        self
    }

    pub fn template(
        mut self,
        template: impl FnOnce(&Rc<Instance>) -> Result<Rc<Fragment>> + 'static,
    ) -> Self {
        self.template = Some(Box::new(template));
        self
    }

    /// Mount on a named target once initialised.
    pub fn target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    /// Keep instances already mounted on the target.
    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }
}

// =============================================================================
// Initialise
// =============================================================================

/// Construct and initialise an instance.
pub fn initialise(options: InstanceOptions) -> Result<Rc<Instance>> {
    let InstanceOptions {
        data,
        isolated,
        component,
        methods,
        handlers,
        stores,
        template,
        target,
        append,
    } = options;

    let mut flags = InstanceFlags::NONE;
    if isolated {
        flags |= InstanceFlags::ISOLATED;
    }
    if append {
        flags |= InstanceFlags::APPEND;
    }

    let viewmodel = Viewmodel::new(data);
    for (keypath, store) in stores {
        viewmodel.register_store(&keypath, store);
    }

    let instance = Instance::new(viewmodel, component, flags, methods, target);
    registry::register_instance(&instance);
    for (event, handler) in handlers {
        instance.subscribe(&event, handler);
    }
    log::debug!(
        "initialising {} (parent: {:?})",
        instance.guid(),
        instance.parent().map(|p| p.guid())
    );

    call_method(&instance, "on_construct");
    call_method(&instance, "on_config");

    with_init_hook(|hook| hook.begin(&instance));

    instance.viewmodel().compute();

    if let Some(template) = template {
        match template(&instance) {
            Ok(fragment) => instance.set_fragment(fragment),
            Err(err) => {
                abandon(&instance);
                return Err(err);
            }
        }
    } else {
        instance.set_fragment(Fragment::new_root(&instance));
    }

    with_init_hook(|hook| hook.end(&instance));

    try_render(&instance);

    Ok(instance)
}

/// Undo a construction whose template failed. Components the template
/// already built never get their `on_inited`, so they are torn down.
fn abandon(instance: &Instance) {
    let waiting = with_init_hook(|hook| hook.cancel(instance));
    for child in waiting {
        if child.is_torn_down() {
            continue;
        }
        if let Err(err) = child.teardown() {
            log::warn!(
                "ignoring teardown failure while abandoning {}: {err}",
                instance.guid()
            );
        }
    }
    registry::release_instance(instance.guid());
}

fn call_method(instance: &Instance, name: &str) {
    if let Some(method) = instance.methods().get(name).cloned() {
        method(instance);
    }
}

/// Mount on the instance's target, clearing the target first unless
/// appending. Teardown failures of replaced instances are logged and ignored.
fn try_render(instance: &Rc<Instance>) {
    let Some(target) = instance.target() else {
        return;
    };

    if !instance.flags().contains(InstanceFlags::APPEND) {
        for existing in registry::detach_all(target) {
            if let Err(err) = existing.teardown() {
                log::warn!("ignoring teardown failure on \"{target}\": {err}");
            }
        }
    }

    registry::attach_to_target(target, instance.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{reset_config, set_config, BindConfig};
    use crate::engine::registry::{instances_on_target, on_teardown, reset_registry};
    use crate::error::BindError;
    use serde_json::json;
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<String>>>;

    fn logging_methods(log: &Log, label: &str) -> HookMethods {
        let mut methods = HookMethods::new();
        for name in ["on_construct", "on_config", "on_init", "on_inited"] {
            let log = log.clone();
            let entry = format!("{label}:{name}");
            methods = methods.with(name, move |_| log.borrow_mut().push(entry.clone()));
        }
        methods
    }

    #[test]
    fn test_construction_order() {
        reset_registry();
        let log: Log = Rc::default();

        initialise(InstanceOptions::new().methods(logging_methods(&log, "p"))).unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["p:on_construct", "p:on_config", "p:on_init", "p:on_inited"]
        );
    }

    #[test]
    fn test_children_inited_after_parent() {
        reset_registry();
        let log: Log = Rc::default();
        let child_log = log.clone();

        let parent = initialise(
            InstanceOptions::new()
                .methods(logging_methods(&log, "p"))
                .template(move |instance| {
                    let fragment = Fragment::new_root(instance);
                    initialise(
                        InstanceOptions::new()
                            .methods(logging_methods(&child_log, "c"))
                            .component(Component::new(&fragment)),
                    )?;
                    Ok(fragment)
                }),
        )
        .unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                "p:on_construct",
                "p:on_config",
                "c:on_construct",
                "c:on_config",
                "c:on_init",
                "p:on_init",
                "p:on_inited",
                "c:on_inited",
            ]
        );
        with_init_hook(|hook| {
            assert!(!hook.is_in_process(parent.guid()));
            assert_eq!(hook.queued(parent.guid()), 0);
        });
    }

    #[test]
    fn test_events_fire() {
        reset_registry();
        let log: Log = Rc::default();
        let (a, b) = (log.clone(), log.clone());

        initialise(
            InstanceOptions::new()
                .on("init", move |_| a.borrow_mut().push("init".into()))
                .on("inited", move |_| b.borrow_mut().push("inited".into())),
        )
        .unwrap();

        assert_eq!(*log.borrow(), vec!["init", "inited"]);
    }

    #[test]
    #[allow(deprecated)]
    fn test_legacy_init_runs_once_with_on_init() {
        reset_registry();
        reset_config();
        let log: Log = Rc::default();
        let legacy = log.clone();

        initialise(
            InstanceOptions::new().methods(
                logging_methods(&log, "p")
                    .with_legacy_init(move |_| legacy.borrow_mut().push("p:init".into())),
            ),
        )
        .unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["p:on_construct", "p:on_config", "p:on_init", "p:init", "p:on_inited"]
        );
    }

    #[test]
    #[allow(deprecated)]
    fn test_legacy_init_can_be_disabled() {
        reset_registry();
        set_config(BindConfig {
            legacy_init: false,
            ..BindConfig::default()
        });
        let log: Log = Rc::default();
        let legacy = log.clone();

        initialise(
            InstanceOptions::new().methods(
                HookMethods::new()
                    .with_legacy_init(move |_| legacy.borrow_mut().push("init".into())),
            ),
        )
        .unwrap();

        assert!(log.borrow().is_empty());
        reset_config();
    }

    #[test]
    fn test_template_error_propagates() {
        reset_registry();

        let result = initialise(InstanceOptions::new().template(|_| {
            Err(BindError::NoBaseContext {
                reference: "../x".into(),
            })
        }));

        assert!(matches!(result, Err(BindError::NoBaseContext { .. })));
        assert_eq!(registry::instance_count(), 0);
    }

    #[test]
    fn test_template_error_tears_down_built_children() {
        reset_registry();
        let log: Log = Rc::default();
        let child_log = log.clone();
        let torn = Rc::new(RefCell::new(Vec::<String>::new()));
        let torn_clone = torn.clone();

        let result = initialise(
            InstanceOptions::new()
                .methods(logging_methods(&log, "p"))
                .template(move |instance| {
                    let fragment = Fragment::new_root(instance);
                    let child = initialise(
                        InstanceOptions::new()
                            .methods(logging_methods(&child_log, "c"))
                            .component(Component::new(&fragment)),
                    )?;
                    child.on("teardown", move |c| {
                        torn_clone.borrow_mut().push(c.guid().to_string())
                    });
                    Err(BindError::NoBaseContext {
                        reference: "../x".into(),
                    })
                }),
        );

        assert!(result.is_err());
        assert!(!log.borrow().iter().any(|entry| entry.ends_with("on_inited")));
        assert_eq!(torn.borrow().len(), 1);
        assert_eq!(registry::instance_count(), 0);
    }

    #[test]
    fn test_stores_are_computed_before_render() {
        reset_registry();

        let instance = initialise(
            InstanceOptions::new()
                .data(json!({ "a": 1 }))
                .store("fixed", Rc::new(crate::viewmodel::StateStore::new(json!("x")))),
        )
        .unwrap();

        assert_eq!(instance.viewmodel().get("fixed"), Some(json!("x")));
        assert_eq!(instance.viewmodel().get("a"), Some(json!(1)));
    }

    #[test]
    fn test_mount_replaces_existing_instances() {
        reset_registry();

        let first = initialise(InstanceOptions::new().target("main")).unwrap();
        let torn = Rc::new(RefCell::new(false));
        let torn_clone = torn.clone();
        first.on("teardown", move |_| *torn_clone.borrow_mut() = true);

        let second = initialise(InstanceOptions::new().target("main")).unwrap();

        assert!(*torn.borrow());
        assert!(first.is_torn_down());
        let mounted = instances_on_target("main");
        assert_eq!(mounted.len(), 1);
        assert_eq!(mounted[0].guid(), second.guid());
    }

    #[test]
    fn test_mount_append_keeps_existing() {
        reset_registry();

        let first = initialise(InstanceOptions::new().target("main")).unwrap();
        let _second = initialise(InstanceOptions::new().target("main").append(true)).unwrap();

        assert!(!first.is_torn_down());
        assert_eq!(instances_on_target("main").len(), 2);
    }

    #[test]
    fn test_mount_ignores_teardown_failures() {
        reset_registry();

        let first = initialise(InstanceOptions::new().target("main")).unwrap();
        on_teardown(first.guid(), || Err("host node vanished".to_string()));

        let second = initialise(InstanceOptions::new().target("main"));

        assert!(second.is_ok());
        assert!(first.is_torn_down());
        assert_eq!(instances_on_target("main").len(), 1);
    }
}
