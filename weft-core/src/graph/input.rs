//! Handler Inputs
//!
//! An [`Input`] is a handler's view of one settled dependency. Reading it
//! either yields the value or re-raises the dependency's failure. A handler
//! that never reads a failed input is not affected by that failure.

use super::node::Outcome;
use crate::failure::Failure;

/// A settled dependency, handed to a node's handler.
#[derive(Debug, Clone)]
pub struct Input<V> {
    key: String,
    outcome: Outcome<V>,
}

impl<V: Clone> Input<V> {
    pub fn new(key: impl Into<String>, outcome: Outcome<V>) -> Self {
        Self {
            key: key.into(),
            outcome,
        }
    }

    /// The dependency's value, or the dependency's own failure.
    ///
    /// The failure returned is the one the dependency raised, not a copy:
    /// [`Failure::same`] holds between repeated reads and across every
    /// consumer of the same dependency.
    pub fn get(&self) -> Result<V, Failure> {
        self.outcome.clone()
    }

    /// Borrow the outcome without cloning the value.
    pub fn outcome(&self) -> &Outcome<V> {
        &self.outcome
    }

    /// The key this input was resolved from.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }
}
