//! # spark-bind
//!
//! Reactive keypath binding and lifecycle ordering for templated component trees.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for fine-grained reactivity.
//!
//! ## Architecture
//!
//! Templates name data with keypaths (`user.name`, `../title`, `~/config`).
//! Each reference is resolved against the stack of data contexts enclosing the
//! template position, crossing into parent components unless isolated. Values
//! live in the root model's signal, so reading a resolved model inside an
//! effect tracks it.
//!
//! References that cannot be satisfied yet resolve to an [`Unresolved`]
//! placeholder which repairs itself when the data appears.
//!
//! Construction runs lifecycle hooks through [`HookQueue`]s so a parent's
//! `on_inited` always fires before its children's:
//!
//! ```text
//! initialise(P) → template → initialise(C) → C: on_init (queued behind P)
//!               → P: on_init → P: on_inited → C: on_inited
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Ids, flags, values
//! - [`keypath`] - Reference normalisation and classification
//! - [`viewmodel`] - Models, placeholders, stores
//! - [`resolve`] - Context stack and reference resolution
//! - [`engine`] - Instances, fragments, hook queues, initialisation
//! - [`config`] - Global configuration signals

pub mod config;
pub mod engine;
pub mod error;
pub mod keypath;
pub mod resolve;
pub mod types;
pub mod viewmodel;

// Re-export commonly used items
pub use types::*;

pub use config::{config, reset_config, set_config, BindConfig};

pub use error::{BindError, Result};

pub use engine::{
    initialise, on_teardown, reset_registry, with_init_hook, Component, Fragment, HookMethods,
    HookQueue, Instance, InstanceOptions,
};

pub use resolve::{resolve_ref, ContextStack, Reference};

pub use viewmodel::{
    ComputedStore, Model, StateStore, Store, Unresolved, ValueStore, Viewmodel,
};
