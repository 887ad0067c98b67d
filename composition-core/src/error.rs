//! Error types.

use thiserror::Error;

/// Errors raised by the composition host and the hook API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositionError {
    /// A hook registration (or another setup-only API) was called while no
    /// component instance was executing setup.
    #[error("`{api}` can only be called during component setup: no current instance")]
    NoCurrentInstance { api: &'static str },

    /// Setup code reported a failure of its own.
    #[error("component setup failed: {0}")]
    Setup(String),
}

/// Errors raised when writing through reactive values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    #[error("property `{key}` is read-only")]
    ReadOnly { key: String },

    #[error("property `{key}` does not exist on this reactive object")]
    UnknownProperty { key: String },

    #[error("computed value was created without a setter")]
    ComputedReadOnly,

    /// A ref-backed property can only receive plain values.
    #[error("property `{key}` is backed by a ref and cannot be replaced by an object")]
    NotAValue { key: String },
}
