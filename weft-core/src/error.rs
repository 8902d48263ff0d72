//! Structural Errors
//!
//! These are caller mistakes: asking for a key nothing can produce, defining
//! the same output twice, touching a scope in the wrong state. They are
//! returned synchronously from the call that triggered them and never travel
//! through a future. Failures raised by node handlers are a different thing,
//! see [`Failure`](crate::Failure).

use thiserror::Error;

/// Errors returned by registries, scopes and graphs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// No given binding, seed, registered node or ancestor scope produces the key.
    #[error("no node is bound to key '{key}'")]
    UnboundKey { key: String },

    #[error("a node for output key '{key}' is already registered")]
    DuplicateOutputKey { key: String },

    #[error("incomplete node definition: {reason}")]
    IncompleteNodeDefinition { reason: String },

    #[error("graph for '{key}' has already been started")]
    GraphAlreadyStarted { key: String },

    #[error("scope is already entered")]
    ScopeAlreadyEntered,

    #[error("scope is not entered")]
    ScopeNotEntered,

    #[error("cannot seed '{key}' while the scope is entered")]
    ScopeCannotSeedWhileEntered { key: String },

    #[error("key '{key}' is already seeded in this scope")]
    DuplicateSeed { key: String },

    #[error("a computed value for '{key}' is already cached in this scope")]
    DuplicateComputedValue { key: String },

    /// The dependency walk came back to a key it is still resolving.
    /// `path` lists the keys from the first occurrence back to the repeat.
    #[error("dependency cycle: {}", path.join(" -> "))]
    CyclicDependency { path: Vec<String> },
}

/// Result alias for structural operations.
pub type Result<T> = std::result::Result<T, Error>;
