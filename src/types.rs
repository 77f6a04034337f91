//! Core types for spark-bind.
//!
//! Identifiers and flags shared by the viewmodel, resolver and lifecycle
//! layers. Data values are plain `serde_json::Value`s.

use std::fmt;

pub use serde_json::Value;

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier of a component instance.
///
/// Allocated monotonically by the registry and never reused, so it is safe
/// to key per-instance bookkeeping (hook queues, mount targets) by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Handle for a watcher registered on a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(pub u64);

// =============================================================================
// Instance Flags (bitflags)
// =============================================================================

bitflags::bitflags! {
    /// Per-instance behaviour switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InstanceFlags: u8 {
        const NONE = 0;
        /// Context lookups stop at this instance's own root.
        const ISOLATED = 1 << 0;
        /// Mounting leaves instances already on the target in place.
        const APPEND = 1 << 1;
        /// Set once teardown has run.
        const TORN_DOWN = 1 << 2;
    }
}
