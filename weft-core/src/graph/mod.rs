//! Dependency Graphs
//!
//! This module holds the node model and the resolution engine.
//!
//! # Overview
//!
//! Nodes live in a [`Registry`], keyed by the value they produce. Nothing is
//! wired ahead of time: a [`Graph`] is built on demand for one requested key
//! by following input keys from that node down to the leaves.
//!
//! - Nodes are looked up by key at resolution time, so a scope can shadow a
//!   registered node with a seed and a graph can shadow either with a given
//!   binding.
//! - Every node resolves to a shared future. Several consumers can await the
//!   same result, and a result can be handed to a different graph as a given
//!   binding before it has settled.
//! - Failures stay inside futures. A consumer sees a dependency's failure only
//!   when it reads the corresponding [`Input`].

mod input;
mod node;
mod registry;
mod resolver;

pub use input::Input;
pub use node::{Handler, Node, NodeBuilder, Outcome, Output};
pub use registry::Registry;

use std::future::Future;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use tracing::debug;

use crate::error::{Error, Result};
use crate::scope::{Cache, Scope};
use crate::trace::{Probe, TraceId, Tracer};
use resolver::Resolver;

/// Shared future of a node's outcome. Cloning it is cheap and every clone
/// observes the same outcome.
pub type ValueFuture<V> = Shared<BoxFuture<'static, Outcome<V>>>;

/// One evaluation of one output key inside a [`Scope`].
///
/// ```rust,ignore
/// let mut graph = scope.create_graph("a+b")?;
/// graph.give("b", "FOO".to_owned())?;
/// let value = graph.start()?.await?;
/// ```
pub struct Graph<V>
where
    V: Clone + Send + Sync + 'static,
{
    output_key: String,
    scope: Arc<Scope<V>>,
    givens: Cache<ValueFuture<V>>,
    started: bool,
    tracer: Option<Arc<dyn Tracer>>,
    trace_id: Option<TraceId>,
}

impl<V> Graph<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(scope: Arc<Scope<V>>, output_key: String) -> Self {
        Self {
            output_key,
            scope,
            givens: Cache::new(),
            started: false,
            tracer: None,
            trace_id: None,
        }
    }

    /// The key this graph resolves.
    pub fn output_key(&self) -> &str {
        &self.output_key
    }

    /// The trace id, once tracing has been enabled.
    pub fn trace_id(&self) -> Option<TraceId> {
        self.trace_id
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Bind `key` to a value for this graph only.
    pub fn give(&mut self, key: impl Into<String>, value: V) -> Result<&mut Self> {
        self.give_shared(key.into(), future::ready(Ok(value)).boxed().shared())
    }

    /// Bind `key` to a future for this graph only. The future may still be
    /// pending, for example the result of another graph's `start`.
    pub fn give_future<F>(&mut self, key: impl Into<String>, future: F) -> Result<&mut Self>
    where
        F: Future<Output = Outcome<V>> + Send + 'static,
    {
        self.give_shared(key.into(), future.boxed().shared())
    }

    fn give_shared(&mut self, key: String, binding: ValueFuture<V>) -> Result<&mut Self> {
        self.ensure_not_started()?;
        if self.givens.put(key.clone(), binding).is_some() {
            debug!(key = %key, "replaced given binding");
        }
        Ok(self)
    }

    /// Report this run to `tracer`.
    pub fn trace(&mut self, tracer: Arc<dyn Tracer>) -> Result<&mut Self> {
        self.ensure_not_started()?;
        self.tracer = Some(tracer);
        self.trace_id = Some(TraceId::new());
        Ok(self)
    }

    /// Resolve the output key.
    ///
    /// Structural problems (an unbound key, a cycle) are returned right away.
    /// Handler failures arrive through the returned future, and only when
    /// they lie on a path the requested value actually read.
    pub fn start(&mut self) -> Result<ValueFuture<V>> {
        self.ensure_not_started()?;
        self.started = true;

        let probe = match (&self.tracer, self.trace_id) {
            (Some(tracer), Some(trace_id)) => Some(Probe::new(Arc::clone(tracer), trace_id)),
            _ => None,
        };
        if let Some(probe) = &probe {
            probe.begin(&self.output_key);
        }
        debug!(
            key = %self.output_key,
            givens = self.givens.len(),
            trace_id = ?self.trace_id,
            "starting graph"
        );

        let root = Resolver::new(&self.scope, &self.givens, probe.clone())
            .resolve(&self.output_key)?
            .future;

        Ok(match probe {
            Some(probe) => root
                .map(move |outcome| {
                    probe.finish(outcome.as_ref().err());
                    outcome
                })
                .boxed()
                .shared(),
            None => root,
        })
    }

    fn ensure_not_started(&self) -> Result<()> {
        if self.started {
            return Err(Error::GraphAlreadyStarted {
                key: self.output_key.clone(),
            });
        }
        Ok(())
    }
}
