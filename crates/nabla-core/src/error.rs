use crate::DType;

/// Errors raised by arrays, variables, contexts and functions.
#[derive(Debug, thiserror::Error)]
pub enum NablaError {
    #[error("Invalid context: {0}")]
    InvalidContext(String),

    #[error("Invalid device id '{id}': {reason}")]
    InvalidDeviceId { id: String, reason: String },

    #[error("No implementation of '{function}' for backends {backends:?}")]
    NotImplemented {
        function: String,
        backends: Vec<String>,
    },

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("{function}: expected {expected} {kind}, got {got}")]
    ArityMismatch {
        function: String,
        kind: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{function}: {msg}")]
    InvalidState { function: String, msg: String },

    #[error("{function} does not allow array class '{class}' (allowed: {allowed:?})")]
    ArrayClassNotAllowed {
        function: String,
        class: String,
        allowed: Vec<String>,
    },

    #[error("DType mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    #[error("Unsupported dtype: {0}")]
    UnsupportedDType(DType),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl NablaError {
    /// Shorthand for an [`NablaError::InvalidState`] raised by `function`.
    pub fn state(function: impl Into<String>, msg: impl Into<String>) -> Self {
        NablaError::InvalidState {
            function: function.into(),
            msg: msg.into(),
        }
    }
}
