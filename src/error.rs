//! Binding errors

use thiserror::Error;

use crate::types::InstanceId;

/// Binding result type
pub type Result<T> = std::result::Result<T, BindError>;

/// Usage errors raised by reference resolution, stores and instance
/// lifecycle. An unresolved ambiguous reference is not an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("no base context for reference \"{reference}\"")]
    NoBaseContext { reference: String },

    #[error("could not resolve \"{reference}\": too many \"../\" prefixes")]
    AncestorOverflow { reference: String },

    #[error("cannot {operation} a read-only store")]
    ReadOnlyStore { operation: &'static str },

    #[error("index {index} is too far past the end of an array of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("teardown of {instance} failed: {reason}")]
    Teardown { instance: InstanceId, reason: String },
}
