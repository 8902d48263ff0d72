//! Execution Scopes
//!
//! A [`Scope`] is the context a set of graphs executes in. It memoizes the
//! futures computed while it is entered, holds values seeded before entry,
//! and carries the [`Context`] handed to every handler.
//!
//! # Hierarchy
//!
//! Scopes form a parent chain. Node lookup and computed-value lookup fall
//! through to the parent when a key is absent locally, but writes always land
//! in the local caches. A request scope can therefore reuse values its
//! process-level parent already computed without polluting it.
//!
//! # Lifecycle
//!
//! ```text
//! new --seed*--> enter --create_graph*--> exit --> (seed*, enter, ...)
//! ```
//!
//! Exiting drops both the seeds and the computed values: nothing outlives a
//! single entered period.

mod cache;
mod context;

pub use cache::Cache;
pub use context::{Context, ScopeGuard};

use std::sync::Arc;

use futures_util::future::{self, FutureExt};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::{Graph, Node, Outcome, Registry, ValueFuture};

/// A value seeded into a scope before it is entered.
#[derive(Clone)]
enum Seed<V> {
    Value(V),
    Future(ValueFuture<V>),
}

#[derive(Default)]
struct ScopeState {
    entered: bool,
    context: Context,
}

/// Hierarchical execution context that caches computed and seeded values.
pub struct Scope<V>
where
    V: Clone + Send + Sync + 'static,
{
    registry: Arc<Registry<V>>,
    parent: Option<Arc<Scope<V>>>,
    seeds: Cache<Seed<V>>,
    values: Cache<ValueFuture<V>>,
    state: RwLock<ScopeState>,
}

impl<V> Scope<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a root scope over `registry`.
    pub fn new(registry: Arc<Registry<V>>) -> Self {
        Self::with_parent(registry, None)
    }

    /// Create a scope over `registry` that falls back to `parent`.
    pub fn with_parent(registry: Arc<Registry<V>>, parent: Option<Arc<Scope<V>>>) -> Self {
        Self {
            registry,
            parent,
            seeds: Cache::new(),
            values: Cache::new(),
            state: RwLock::new(ScopeState::default()),
        }
    }

    /// Create a child scope sharing this scope's registry.
    pub fn child(self: &Arc<Self>) -> Self {
        Self::with_parent(Arc::clone(&self.registry), Some(Arc::clone(self)))
    }

    pub fn registry(&self) -> &Arc<Registry<V>> {
        &self.registry
    }

    pub fn parent(&self) -> Option<&Arc<Scope<V>>> {
        self.parent.as_ref()
    }

    pub fn is_entered(&self) -> bool {
        self.state.read().entered
    }

    /// The context handlers in this scope receive.
    pub fn context(&self) -> Context {
        self.state.read().context.clone()
    }

    /// Activate the scope.
    ///
    /// Seeds set before entry are kept; computed values start empty.
    pub fn enter(&self, context: Context) -> Result<()> {
        let mut state = self.state.write();
        if state.entered {
            return Err(Error::ScopeAlreadyEntered);
        }
        self.values.clear();
        state.context = context;
        state.entered = true;
        debug!(seeds = self.seeds.len(), "entered scope");
        Ok(())
    }

    /// Enter the scope and exit it again when the returned guard drops.
    pub fn enter_guarded(self: &Arc<Self>, context: Context) -> Result<ScopeGuard<V>> {
        self.enter(context)?;
        Ok(ScopeGuard::new(Arc::clone(self)))
    }

    /// Deactivate the scope, discarding seeds, computed values and context.
    pub fn exit(&self) -> Result<()> {
        let mut state = self.state.write();
        if !state.entered {
            return Err(Error::ScopeNotEntered);
        }
        debug!(
            seeds = self.seeds.len(),
            values = self.values.len(),
            "exiting scope"
        );
        self.seeds.clear();
        self.values.clear();
        state.context = Context::empty();
        state.entered = false;
        Ok(())
    }

    /// Bind `key` to a fixed value for the next entered period.
    pub fn seed(&self, key: impl Into<String>, value: V) -> Result<()> {
        self.put_seed(key.into(), Seed::Value(value))
    }

    /// Bind `key` to a future. The future is driven at most once no matter how
    /// many graphs consume the seed.
    pub fn seed_future<F>(&self, key: impl Into<String>, future: F) -> Result<()>
    where
        F: std::future::Future<Output = Outcome<V>> + Send + 'static,
    {
        self.put_seed(key.into(), Seed::Future(future.boxed().shared()))
    }

    fn put_seed(&self, key: String, seed: Seed<V>) -> Result<()> {
        let state = self.state.read();
        if state.entered {
            return Err(Error::ScopeCannotSeedWhileEntered { key });
        }
        if !self.seeds.put_if_absent(key.clone(), seed) {
            return Err(Error::DuplicateSeed { key });
        }
        debug!(key = %key, "seeded key");
        Ok(())
    }

    /// Create a graph resolving `key` in this scope.
    pub fn create_graph(self: &Arc<Self>, key: impl Into<String>) -> Result<Graph<V>> {
        if !self.is_entered() {
            return Err(Error::ScopeNotEntered);
        }
        Ok(Graph::new(Arc::clone(self), key.into()))
    }

    /// Find the node producing `key`: local seeds, then the registry, then
    /// the parent chain.
    pub fn get_node(&self, key: &str) -> Option<Arc<Node<V>>> {
        if let Some(seed) = self.seeds.get(key) {
            let binding = match seed {
                Seed::Value(value) => future::ready(Ok(value)).boxed().shared(),
                Seed::Future(future) => future,
            };
            // Seeds are cached at the seed itself, so the node only needs to
            // report itself cacheable for its dependents.
            return Some(Arc::new(Node::explicit(key, binding, true)));
        }
        if let Some(node) = self.registry.get_node(key) {
            return Some(node);
        }
        self.parent.as_ref().and_then(|parent| parent.get_node(key))
    }

    /// Computed future for `key`, here or in an ancestor.
    pub fn get_value(&self, key: &str) -> Option<ValueFuture<V>> {
        self.values
            .get(key)
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.get_value(key)))
    }

    /// Memoize a computed future in this scope.
    pub fn cache(&self, key: impl Into<String>, value: ValueFuture<V>) -> Result<()> {
        let key = key.into();
        if !self.values.put_if_absent(key.clone(), value) {
            return Err(Error::DuplicateComputedValue { key });
        }
        Ok(())
    }

    /// Keys computed in this scope (not its ancestors), in caching order.
    pub fn cached_keys(&self) -> Vec<String> {
        self.values.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Arc<Scope<String>> {
        Arc::new(Scope::new(Arc::new(Registry::new())))
    }

    fn ready(value: &str) -> ValueFuture<String> {
        future::ready(Ok(value.to_owned())).boxed().shared()
    }

    #[test]
    fn enter_and_exit_are_checked() {
        let scope = scope();
        assert_eq!(scope.exit(), Err(Error::ScopeNotEntered));

        scope.enter(Context::empty()).unwrap();
        assert!(scope.is_entered());
        assert_eq!(scope.enter(Context::empty()), Err(Error::ScopeAlreadyEntered));

        scope.exit().unwrap();
        assert!(!scope.is_entered());
        scope.enter(Context::empty()).unwrap();
    }

    #[test]
    fn seeding_rules() {
        let scope = scope();
        scope.seed("name", "ada".to_owned()).unwrap();
        assert_eq!(
            scope.seed("name", "bob".to_owned()),
            Err(Error::DuplicateSeed { key: "name".into() })
        );

        scope.enter(Context::empty()).unwrap();
        assert_eq!(
            scope.seed("other", "x".to_owned()),
            Err(Error::ScopeCannotSeedWhileEntered { key: "other".into() })
        );
        let node = scope.get_node("name").unwrap();
        assert!(node.is_explicit());
        assert!(node.is_cacheable());
    }

    #[test]
    fn exit_discards_seeds_and_values() {
        let scope = scope();
        scope.seed("name", "ada".to_owned()).unwrap();
        scope.enter(Context::empty()).unwrap();
        scope.cache("greeting", ready("hi")).unwrap();

        scope.exit().unwrap();
        assert!(scope.get_node("name").is_none());
        assert!(scope.get_value("greeting").is_none());
    }

    #[test]
    fn enter_resets_values_but_keeps_seeds() {
        let scope = scope();
        scope.enter(Context::empty()).unwrap();
        scope.cache("greeting", ready("hi")).unwrap();
        scope.exit().unwrap();

        scope.seed("name", "ada".to_owned()).unwrap();
        scope.enter(Context::empty()).unwrap();
        assert!(scope.get_value("greeting").is_none());
        assert!(scope.get_node("name").is_some());
    }

    #[test]
    fn duplicate_computed_value_is_rejected() {
        let scope = scope();
        scope.enter(Context::empty()).unwrap();
        scope.cache("k", ready("a")).unwrap();
        assert_eq!(
            scope.cache("k", ready("b")),
            Err(Error::DuplicateComputedValue { key: "k".into() })
        );
    }

    #[test]
    fn child_reads_through_but_writes_locally() {
        let parent = scope();
        parent.enter(Context::empty()).unwrap();
        parent.cache("shared", ready("p")).unwrap();

        let child = Arc::new(parent.child());
        child.enter(Context::empty()).unwrap();
        assert!(child.get_value("shared").is_some());

        child.cache("local", ready("c")).unwrap();
        assert!(parent.get_value("local").is_none());
        assert_eq!(child.cached_keys(), vec!["local"]);
    }

    #[test]
    fn create_graph_requires_entry() {
        let scope = scope();
        assert!(matches!(scope.create_graph("x"), Err(Error::ScopeNotEntered)));
        scope.enter(Context::empty()).unwrap();
        assert!(scope.create_graph("x").is_ok());
    }

    #[test]
    fn guard_exits_on_drop() {
        let scope = scope();
        {
            let guard = scope.enter_guarded(Context::new(5_u8)).unwrap();
            assert!(guard.scope().is_entered());
            assert_eq!(scope.context().get::<u8>(), Some(&5));
        }
        assert!(!scope.is_entered());
        assert!(scope.context().is_empty());
    }
}
