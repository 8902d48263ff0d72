//! Handler Context
//!
//! Every handler invoked inside a scope receives that scope's [`Context`]: an
//! opaque, cheaply clonable value the application supplies when it enters the
//! scope (a request, a database handle, a user session). The engine never
//! looks inside it.
//!
//! [`ScopeGuard`] ties a scope's entered state to a lexical block: the scope
//! is exited when the guard drops, even if the code in between panics.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use super::Scope;

/// Opaque value handed to every handler invocation in a scope.
#[derive(Clone, Default)]
pub struct Context {
    value: Option<Arc<dyn Any + Send + Sync>>,
}

impl Context {
    /// Wrap an application value.
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            value: Some(Arc::new(value)),
        }
    }

    /// A context carrying nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Borrow the wrapped value as `T`, if that is what it holds.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.value.as_deref().and_then(|value| value.downcast_ref::<T>())
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("is_empty", &self.is_empty())
            .finish()
    }
}

/// Guard that exits its scope when dropped.
///
/// Created by [`Scope::enter_guarded`].
pub struct ScopeGuard<V>
where
    V: Clone + Send + Sync + 'static,
{
    scope: Arc<Scope<V>>,
}

impl<V> ScopeGuard<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(super) fn new(scope: Arc<Scope<V>>) -> Self {
        Self { scope }
    }

    /// The guarded scope.
    pub fn scope(&self) -> &Arc<Scope<V>> {
        &self.scope
    }
}

impl<V> Drop for ScopeGuard<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        // Someone exited the scope by hand while the guard was alive.
        if let Err(err) = self.scope.exit() {
            warn!(error = %err, "scope guard could not exit its scope");
        }
    }
}
