//! Graph Nodes
//!
//! A [`Node`] describes one named computation: the key it produces, the keys
//! it consumes, and the handler that turns settled inputs into a value.
//! Nodes are immutable once built and shared behind `Arc`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use smallvec::SmallVec;

use super::input::Input;
use super::registry::Registry;
use super::ValueFuture;
use crate::error::{Error, Result};
use crate::failure::Failure;
use crate::scope::Context;

/// Outcome of a node: its value or the failure its handler raised.
pub type Outcome<V> = std::result::Result<V, Failure>;

/// What a handler hands back when it does not fail outright.
pub enum Output<V> {
    /// The value is already known.
    Ready(V),
    /// The value will be known once the future completes.
    Future(BoxFuture<'static, Outcome<V>>),
}

impl<V> From<V> for Output<V> {
    fn from(value: V) -> Self {
        Output::Ready(value)
    }
}

/// Type-erased handler.
///
/// Every input is settled by the time the handler runs; reading one with
/// [`Input::get`] never waits.
pub type Handler<V> =
    Arc<dyn Fn(&[Input<V>], &Context) -> Outcome<Output<V>> + Send + Sync>;

/// An immutable description of one named computation.
pub struct Node<V> {
    output_key: String,
    input_keys: SmallVec<[String; 4]>,
    handler: Handler<V>,
    cacheable: bool,
    explicit: bool,
}

impl<V> Node<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a registrable node.
    pub fn new<I, K>(output_key: impl Into<String>, input_keys: I, handler: Handler<V>) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            output_key: output_key.into(),
            input_keys: input_keys.into_iter().map(Into::into).collect(),
            handler,
            cacheable: true,
            explicit: false,
        }
    }

    /// Builder-style toggle for the cacheable flag.
    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// Synthetic leaf bound to a fixed future, used for seeds and given bindings.
    pub(crate) fn explicit(output_key: &str, binding: ValueFuture<V>, cacheable: bool) -> Self {
        let handler: Handler<V> = Arc::new(move |_: &[Input<V>], _: &Context| {
            Ok(Output::Future(binding.clone().boxed()))
        });
        Self {
            output_key: output_key.to_owned(),
            input_keys: SmallVec::new(),
            handler,
            cacheable,
            explicit: true,
        }
    }

    pub fn output_key(&self) -> &str {
        &self.output_key
    }

    pub fn input_keys(&self) -> &[String] {
        &self.input_keys
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    /// True for nodes synthesized from seeds or given bindings.
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// True when the node has no dependencies.
    pub fn is_leaf(&self) -> bool {
        self.input_keys.is_empty()
    }

    /// Call the handler.
    pub fn invoke(&self, inputs: &[Input<V>], context: &Context) -> Outcome<Output<V>> {
        (self.handler)(inputs, context)
    }
}

impl<V> fmt::Debug for Node<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("output_key", &self.output_key)
            .field("input_keys", &self.input_keys)
            .field("cacheable", &self.cacheable)
            .field("explicit", &self.explicit)
            .finish()
    }
}

/// Fluent definition of a node, registered on [`build`](NodeBuilder::build).
///
/// ```rust,ignore
/// registry
///     .define_node()
///     .given(["first", "last"])
///     .outputs("full_name")
///     .with(|inputs, _| Ok(format!("{} {}", inputs[0].get()?, inputs[1].get()?)))
///     .build()?;
/// ```
#[must_use = "a node is only registered once `build` is called"]
pub struct NodeBuilder<'r, V> {
    registry: &'r Registry<V>,
    output_key: Option<String>,
    input_keys: SmallVec<[String; 4]>,
    handler: Option<Handler<V>>,
    cacheable: bool,
}

impl<'r, V> NodeBuilder<'r, V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(registry: &'r Registry<V>) -> Self {
        Self {
            registry,
            output_key: None,
            input_keys: SmallVec::new(),
            handler: None,
            cacheable: true,
        }
    }

    /// Append dependency keys, in the order the handler will see them.
    pub fn given<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.input_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn outputs(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    /// Use a synchronous handler.
    pub fn with<F>(self, handler: F) -> Self
    where
        F: Fn(&[Input<V>], &Context) -> Outcome<V> + Send + Sync + 'static,
    {
        self.with_handler(Arc::new(move |inputs: &[Input<V>], ctx: &Context| {
            handler(inputs, ctx).map(Output::Ready)
        }))
    }

    /// Use a handler that hands back a future.
    ///
    /// The handler must copy whatever it needs out of its inputs before
    /// building the future; the returned future cannot borrow them.
    pub fn with_future<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(&[Input<V>], &Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<V>> + Send + 'static,
    {
        self.with_handler(Arc::new(move |inputs: &[Input<V>], ctx: &Context| {
            Ok(Output::Future(handler(inputs, ctx).boxed()))
        }))
    }

    /// Use a handler that already speaks [`Output`].
    pub fn with_handler(mut self, handler: Handler<V>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Never memoize this node, nor anything built from it.
    pub fn not_cacheable(mut self) -> Self {
        self.cacheable = false;
        self
    }

    /// Validate the definition and register it.
    pub fn build(self) -> Result<Arc<Node<V>>> {
        let output_key = match self.output_key {
            Some(key) if !key.is_empty() => key,
            _ => {
                return Err(Error::IncompleteNodeDefinition {
                    reason: "missing output key".to_owned(),
                })
            }
        };
        let handler = self.handler.ok_or_else(|| Error::IncompleteNodeDefinition {
            reason: format!("node '{output_key}' has no handler"),
        })?;

        let node = Node {
            output_key,
            input_keys: self.input_keys,
            handler,
            cacheable: self.cacheable,
            explicit: false,
        };
        self.registry.add(node)
    }
}
