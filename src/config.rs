//! Binding configuration signals.
//!
//! Process-wide switches for the deprecated `init` compatibility path.
//! Per-instance configuration lives in [`crate::engine::InstanceOptions`].

use spark_signals::signal;
use std::cell::RefCell;

// =============================================================================
// Config
// =============================================================================

/// Global binding configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindConfig {
    /// Log a warning whenever an instance's deprecated `init` method runs.
    pub warn_deprecations: bool,
    /// Run an instance's deprecated `init` method alongside `on_init`.
    pub legacy_init: bool,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            warn_deprecations: true,
            legacy_init: true,
        }
    }
}

thread_local! {
    static CONFIG: RefCell<spark_signals::Signal<BindConfig>> = RefCell::new(signal(BindConfig::default()));
}

/// Get the current configuration.
pub fn config() -> BindConfig {
    CONFIG.with(|c| c.borrow().get())
}

/// Replace the current configuration.
pub fn set_config(config: BindConfig) {
    CONFIG.with(|c| c.borrow().set(config));
}

/// Get the configuration signal for reactive tracking.
pub fn config_signal() -> spark_signals::Signal<BindConfig> {
    CONFIG.with(|c| c.borrow().clone())
}

/// Restore the default configuration (for testing).
pub fn reset_config() {
    set_config(BindConfig::default());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        reset_config();
        let cfg = config();
        assert!(cfg.warn_deprecations);
        assert!(cfg.legacy_init);
    }

    #[test]
    fn test_set_config() {
        reset_config();
        set_config(BindConfig {
            legacy_init: false,
            ..BindConfig::default()
        });
        assert!(!config().legacy_init);
        assert!(config_signal().get().warn_deprecations);
        reset_config();
        assert!(config().legacy_init);
    }
}
