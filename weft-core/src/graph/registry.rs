//! Node Registry
//!
//! The registry maps output keys to node definitions. It is append-only:
//! nodes are added once, at wiring time, and never replaced or removed.
//! Registries are ordinary values shared by `Arc`; a process that wants a
//! single global registry keeps one in its own wiring code.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::node::{Node, NodeBuilder};
use crate::error::{Error, Result};

/// Store of node definitions, keyed by output key.
pub struct Registry<V> {
    nodes: DashMap<String, Arc<Node<V>>>,
}

impl<V> Registry<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
        }
    }

    /// Start defining a node that registers here on `build`.
    pub fn define_node(&self) -> NodeBuilder<'_, V> {
        NodeBuilder::new(self)
    }

    /// Register a node.
    ///
    /// Fails if the node has no output key or the key is already taken.
    pub fn add(&self, node: Node<V>) -> Result<Arc<Node<V>>> {
        if node.output_key().is_empty() {
            return Err(Error::IncompleteNodeDefinition {
                reason: "missing output key".to_owned(),
            });
        }

        match self.nodes.entry(node.output_key().to_owned()) {
            Entry::Occupied(slot) => Err(Error::DuplicateOutputKey {
                key: slot.key().clone(),
            }),
            Entry::Vacant(slot) => {
                debug!(
                    key = node.output_key(),
                    inputs = ?node.input_keys(),
                    cacheable = node.is_cacheable(),
                    "registered node"
                );
                let node = Arc::new(node);
                slot.insert(Arc::clone(&node));
                Ok(node)
            }
        }
    }

    /// Look up the node producing `key`.
    pub fn get_node(&self, key: &str) -> Option<Arc<Node<V>>> {
        self.nodes.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All registered output keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.nodes.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }
}

impl<V> Default for Registry<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
