//! Graph Resolution
//!
//! The resolver turns one requested key into a future in two passes over the
//! dependency subgraph.
//!
//! # Algorithm
//!
//! 1. Plan: look every reachable key up (given bindings, then the scope's
//!    seeds, registry and ancestors) and check for cycles. The plan lists each
//!    node once, dependencies before dependents. An unbound key or a cycle
//!    fails here, before any handler runs or anything is cached.
//! 2. Build, in plan order. For each node, collect its dependency futures and
//!    whether all of them are cacheable.
//! 3. If the node is eligible for caching, reuse the scope's memoized future
//!    for it when there is one.
//! 4. Otherwise build the node's future: wait for every dependency to settle,
//!    successfully or not, then call the handler with one [`Input`] per
//!    dependency. Leaves are called right away.
//! 5. Memoize the future in the scope when eligible.
//!
//! Only cacheable, non-explicit nodes touch the value cache. A given binding
//! is neither, so it wins over a value the scope already cached for the same
//! key, and so does everything built on top of it (see "Given bindings" in
//! DESIGN.md).
//!
//! Neither pass awaits. Every check-then-cache for a key finishes before
//! control goes back to the executor, so two requests for the same cacheable
//! key cannot both miss and both invoke its handler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::{self, join_all, BoxFuture, FutureExt};
use tracing::{debug, trace, warn};

use super::input::Input;
use super::node::{Node, Outcome, Output};
use super::ValueFuture;
use crate::error::{Error, Result};
use crate::scope::{Cache, Context, Scope};
use crate::trace::{NodeTiming, Probe};

/// A resolved node: its future and whether it may be memoized.
#[derive(Clone)]
pub(crate) struct Resolved<V> {
    pub(crate) future: ValueFuture<V>,
    pub(crate) cacheable: bool,
}

/// One planned node and the plan positions of its inputs, in declared order.
struct Step<V> {
    node: Arc<Node<V>>,
    inputs: Vec<usize>,
}

/// State for a single [`Graph::start`](super::Graph::start) walk.
pub(crate) struct Resolver<'g, V>
where
    V: Clone + Send + Sync + 'static,
{
    scope: &'g Scope<V>,
    givens: &'g Cache<ValueFuture<V>>,
    context: Context,
    probe: Option<Probe>,
    /// Nodes to build, dependencies first.
    steps: Vec<Step<V>>,
    /// Output key to position in `steps`.
    planned: HashMap<String, usize>,
    /// Keys currently being planned, outermost first.
    path: Vec<String>,
}

impl<'g, V> Resolver<'g, V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        scope: &'g Scope<V>,
        givens: &'g Cache<ValueFuture<V>>,
        probe: Option<Probe>,
    ) -> Self {
        Self {
            scope,
            givens,
            context: scope.context(),
            probe,
            steps: Vec::new(),
            planned: HashMap::new(),
            path: Vec::new(),
        }
    }

    /// Find the node producing `key` for this graph.
    pub(crate) fn lookup(&self, key: &str) -> Result<Arc<Node<V>>> {
        if let Some(binding) = self.givens.get(key) {
            // Given bindings are request-scoped and must never reach the scope cache.
            return Ok(Arc::new(Node::explicit(key, binding, false)));
        }
        self.scope
            .get_node(key)
            .ok_or_else(|| Error::UnboundKey { key: key.to_owned() })
    }

    /// Resolve `key` and everything it depends on.
    ///
    /// Nothing is invoked or cached unless the whole subgraph is bound and
    /// acyclic.
    pub(crate) fn resolve(mut self, key: &str) -> Result<Resolved<V>> {
        let root = self.lookup(key)?;
        let root = self.plan(&root)?;
        trace!(key, nodes = self.steps.len(), "planned graph");

        let mut resolved: Vec<Resolved<V>> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let mut dependencies = Vec::with_capacity(step.inputs.len());
            let mut all_cacheable = true;
            for &input in &step.inputs {
                all_cacheable &= resolved[input].cacheable;
                dependencies.push(resolved[input].future.clone());
            }
            resolved.push(self.resolve_node(&step.node, dependencies, all_cacheable));
        }
        Ok(resolved.swap_remove(root))
    }

    /// Add `node` and its dependencies to the plan, returning its position.
    fn plan(&mut self, node: &Arc<Node<V>>) -> Result<usize> {
        let key = node.output_key();
        if let Some(&index) = self.planned.get(key) {
            return Ok(index);
        }
        if let Some(start) = self.path.iter().position(|k| k == key) {
            let mut path = self.path[start..].to_vec();
            path.push(key.to_owned());
            return Err(Error::CyclicDependency { path });
        }

        self.path.push(key.to_owned());
        let mut inputs = Vec::with_capacity(node.input_keys().len());
        for input_key in node.input_keys() {
            let dependency = self.lookup(input_key)?;
            inputs.push(self.plan(&dependency)?);
        }
        self.path.pop();

        let index = self.steps.len();
        self.steps.push(Step {
            node: Arc::clone(node),
            inputs,
        });
        self.planned.insert(key.to_owned(), index);
        Ok(index)
    }

    /// Reuse the memoized future for `node` or invoke it, caching the result
    /// when it is eligible.
    fn resolve_node(
        &self,
        node: &Arc<Node<V>>,
        dependencies: Vec<ValueFuture<V>>,
        dependencies_cacheable: bool,
    ) -> Resolved<V> {
        let key = node.output_key();
        let cacheable = dependencies_cacheable && node.is_cacheable();
        let memoize = cacheable && !node.is_explicit();

        if memoize {
            if let Some(future) = self.scope.get_value(key) {
                debug!(key, "cache hit");
                return Resolved { future, cacheable };
            }
        }

        let future = self.invoke(node, dependencies);
        if !memoize {
            trace!(key, explicit = node.is_explicit(), "not caching");
            return Resolved { future, cacheable };
        }

        match self.scope.cache(key, future.clone()) {
            Ok(()) => {
                debug!(key, "cached computed value");
                Resolved { future, cacheable }
            }
            Err(err) => {
                // Another thread cached the key between our lookup and insert.
                warn!(key, error = %err, "adopting concurrently cached value");
                let future = self.scope.get_value(key).unwrap_or(future);
                Resolved { future, cacheable }
            }
        }
    }

    /// Build the future for `node` over its dependency futures.
    fn invoke(&self, node: &Arc<Node<V>>, dependencies: Vec<ValueFuture<V>>) -> ValueFuture<V> {
        if dependencies.is_empty() {
            return call(node, &[], &self.context, self.probe.as_ref()).shared();
        }

        let node = Arc::clone(node);
        let context = self.context.clone();
        let probe = self.probe.clone();
        async move {
            let settled = join_all(dependencies).await;
            let inputs: Vec<Input<V>> = node
                .input_keys()
                .iter()
                .zip(settled)
                .map(|(key, outcome)| Input::new(key.as_str(), outcome))
                .collect();
            call(&node, &inputs, &context, probe.as_ref()).await
        }
        .boxed()
        .shared()
    }
}

/// Call the handler and normalize what it hands back into a future that
/// reports the node's timing once it settles.
fn call<V>(
    node: &Node<V>,
    inputs: &[Input<V>],
    context: &Context,
    probe: Option<&Probe>,
) -> BoxFuture<'static, Outcome<V>>
where
    V: Clone + Send + Sync + 'static,
{
    let started = Instant::now();
    let future = match node.invoke(inputs, context) {
        Ok(Output::Ready(value)) => future::ready(Ok(value)).boxed(),
        Ok(Output::Future(future)) => future,
        Err(failure) => future::ready(Err(failure)).boxed(),
    };

    let output_key = node.output_key().to_owned();
    let input_keys = node.input_keys().to_vec();
    let probe = probe.cloned();
    future
        .map(move |outcome| {
            let elapsed = started.elapsed();
            match &outcome {
                Ok(_) => trace!(key = %output_key, ?elapsed, "node settled"),
                Err(failure) => warn!(key = %output_key, ?elapsed, error = %failure, "node failed"),
            }
            if let Some(probe) = probe {
                probe.record(NodeTiming {
                    output_key,
                    input_keys,
                    duration_nanos: u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX),
                    failure: outcome.as_ref().err().cloned(),
                });
            }
            outcome
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::Failure;
    use crate::graph::Registry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entered(registry: Registry<u32>) -> Scope<u32> {
        let scope = Scope::new(Arc::new(registry));
        scope.enter(Context::empty()).unwrap();
        scope
    }

    #[test]
    fn leaves_are_invoked_during_the_walk() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry: Registry<u32> = Registry::new();
        let counter = Arc::clone(&calls);
        registry
            .define_node()
            .outputs("leaf")
            .with(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .build()
            .unwrap();

        let scope = entered(registry);
        let givens = Cache::new();
        let resolved = Resolver::new(&scope, &givens, None).resolve("leaf").unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(resolved.cacheable);
        assert_eq!(resolved.future.clone().now_or_never(), Some(Ok(1)));
        assert_eq!(scope.cached_keys(), vec!["leaf"]);
    }

    #[test]
    fn cycles_are_reported_with_their_path() {
        let registry: Registry<u32> = Registry::new();
        registry.define_node().given(["b"]).outputs("a").with(|i, _| i[0].get()).build().unwrap();
        registry.define_node().given(["c"]).outputs("b").with(|i, _| i[0].get()).build().unwrap();
        registry.define_node().given(["a"]).outputs("c").with(|i, _| i[0].get()).build().unwrap();

        let scope = entered(registry);
        let givens = Cache::new();
        let err = Resolver::new(&scope, &givens, None).resolve("a").err().unwrap();
        assert_eq!(
            err,
            Error::CyclicDependency {
                path: vec!["a".into(), "b".into(), "c".into(), "a".into()]
            }
        );
    }

    fn counted(registry: &Registry<u32>, key: &str, calls: &Arc<AtomicUsize>) {
        let counter = Arc::clone(calls);
        registry
            .define_node()
            .outputs(key)
            .with(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .build()
            .unwrap();
    }

    #[test]
    fn unbound_sibling_fails_before_anything_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry: Registry<u32> = Registry::new();
        counted(&registry, "a", &calls);
        registry
            .define_node()
            .given(["a", "b"])
            .outputs("a+b")
            .with(|i, _| Ok(i[0].get()? + i[1].get()?))
            .build()
            .unwrap();

        let scope = entered(registry);
        let givens = Cache::new();
        let err = Resolver::new(&scope, &givens, None).resolve("a+b").err();

        assert_eq!(err, Some(Error::UnboundKey { key: "b".into() }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(scope.cached_keys().is_empty());
    }

    #[test]
    fn cycle_behind_a_leaf_fails_before_the_leaf_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry: Registry<u32> = Registry::new();
        counted(&registry, "leaf", &calls);
        registry.define_node().given(["leaf", "pong"]).outputs("ping").with(|i, _| i[0].get()).build().unwrap();
        registry.define_node().given(["ping"]).outputs("pong").with(|i, _| i[0].get()).build().unwrap();

        let scope = entered(registry);
        let givens = Cache::new();
        let err = Resolver::new(&scope, &givens, None).resolve("ping").err();

        assert_eq!(
            err,
            Some(Error::CyclicDependency {
                path: vec!["ping".into(), "pong".into(), "ping".into()]
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(scope.cached_keys().is_empty());
    }

    #[test]
    fn shared_dependency_is_planned_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry: Registry<u32> = Registry::new();
        counted(&registry, "base", &calls);
        registry.define_node().given(["base"]).outputs("left").with(|i, _| i[0].get()).build().unwrap();
        registry.define_node().given(["base"]).outputs("right").with(|i, _| i[0].get()).build().unwrap();
        registry
            .define_node()
            .given(["left", "right"])
            .outputs("top")
            .with(|i, _| Ok(i[0].get()? + i[1].get()?))
            .build()
            .unwrap();

        let scope = entered(registry);
        let givens = Cache::new();
        let resolved = Resolver::new(&scope, &givens, None).resolve("top").unwrap();

        assert_eq!(resolved.future.clone().now_or_never(), Some(Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(scope.cached_keys(), vec!["base", "left", "right", "top"]);
    }

    #[test]
    fn non_cacheable_leaf_poisons_dependents() {
        let registry: Registry<u32> = Registry::new();
        registry.define_node().outputs("now").with(|_, _| Ok(7)).not_cacheable().build().unwrap();
        registry
            .define_node()
            .given(["now"])
            .outputs("later")
            .with(|i, _| Ok(i[0].get()? + 1))
            .build()
            .unwrap();

        let scope = entered(registry);
        let givens = Cache::new();
        let resolved = Resolver::new(&scope, &givens, None).resolve("later").unwrap();

        assert!(!resolved.cacheable);
        assert!(scope.cached_keys().is_empty());
    }

    #[test]
    fn given_binding_shadows_registry() {
        let registry: Registry<u32> = Registry::new();
        registry.define_node().outputs("x").with(|_, _| Ok(1)).build().unwrap();

        let scope = entered(registry);
        let givens = Cache::new();
        givens.put("x", future::ready(Ok(99)).boxed().shared());
        let resolver = Resolver::new(&scope, &givens, None);
        let node = resolver.lookup("x").unwrap();
        assert!(node.is_explicit());
        assert!(!node.is_cacheable());
    }

    #[test]
    fn handler_errors_become_failed_futures() {
        let registry: Registry<u32> = Registry::new();
        registry
            .define_node()
            .outputs("broken")
            .with(|_, _| Err(Failure::msg("no")))
            .build()
            .unwrap();

        let scope = entered(registry);
        let givens = Cache::new();
        let resolved = Resolver::new(&scope, &givens, None).resolve("broken").unwrap();
        match resolved.future.clone().now_or_never() {
            Some(Err(failure)) => assert_eq!(failure.to_string(), "no"),
            _ => panic!("expected a settled failure"),
        }
    }
}
