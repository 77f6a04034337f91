//! Binding Engine - instances, fragments and lifecycle.
//!
//! The engine manages the component side of binding:
//! - Registry: Id allocation, live-instance lookup, mount targets, teardown callbacks
//! - Instance: Component placement, isolation, method table, event sink
//! - Fragment: Upward-linked positions in the rendered tree carrying contexts
//! - HookQueue: Parent-before-child ordering of lifecycle hooks
//! - Initialise: The construction sequence tying it together
//!
//! # Architecture
//!
//! ```text
//! Instance P ── root fragment ── section fragment (context: items.0)
//!                                   └── Component C (parent_fragment)
//!                                         └── Instance C ── root fragment
//! ```
//!
//! Reference lookups from inside C walk C's fragments, then C's root, then
//! cross into P through the section fragment unless C is isolated.

mod fragment;
mod hook_queue;
mod initialise;
mod instance;
pub mod registry;

pub use fragment::Fragment;
pub use hook_queue::HookQueue;
pub use initialise::{initialise, with_init_hook, InstanceOptions, Template};
pub use instance::{Component, HookMethods, Instance, Method};
pub use registry::{
    attach_to_target, detach_all, get_instance, instance_count, instances_on_target, is_live,
    on_teardown, reset_registry,
};
