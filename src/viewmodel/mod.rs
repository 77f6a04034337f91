//! Viewmodel - the keypath tree templates bind against.
//!
//! - [`Model`] - node in the keypath tree, watch point for new children
//! - [`Unresolved`] - placeholder for references that do not exist yet
//! - [`Store`] - pluggable value sources (settable, state, computed)
//! - [`Viewmodel`] - one instance's root model and store bindings

mod core;
mod model;
mod store;
mod unresolved;

pub use self::core::Viewmodel;
pub use model::{Model, WeakModel, Watcher};
pub use store::{ComputedStore, StateStore, Store, ValueStore};
pub use unresolved::{Unresolved, WeakUnresolved};
