//! Weft Core
//!
//! This crate resolves named values out of a graph of dependent, possibly
//! asynchronous computations. It implements:
//!
//! - Node definitions with declared input keys and a fluent builder
//! - Hierarchical scopes that memoize computed futures and hold seeded inputs
//! - On-demand graph resolution with concurrent dependency fan-out
//! - Lazy failure propagation through [`Input`] handles
//! - Optional execution tracing with JSON and Graphviz rendering
//!
//! # Architecture
//!
//! - `graph`: nodes, the registry, inputs and the resolution algorithm
//! - `scope`: execution contexts, their caches and the handler context
//! - `trace`: the tracer interface and an in-memory implementation
//! - `error` / `failure`: structural errors and handler failures
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weft_core::{Context, Registry, Scope};
//!
//! let registry = Arc::new(Registry::new());
//! registry.define_node().outputs("a").with(|_, _| Ok("A".to_owned())).build()?;
//! registry
//!     .define_node()
//!     .given(["a", "b"])
//!     .outputs("a+b")
//!     .with(|inputs, _| Ok(format!("{}{}", inputs[0].get()?, inputs[1].get()?)))
//!     .build()?;
//!
//! let scope = Arc::new(Scope::new(registry));
//! scope.enter(Context::empty())?;
//!
//! let mut graph = scope.create_graph("a+b")?;
//! graph.give("b", "FOO".to_owned())?;
//! assert_eq!(graph.start()?.await?, "AFOO");
//! ```

pub mod error;
pub mod failure;
pub mod graph;
pub mod scope;
pub mod trace;

pub use error::{Error, Result};
pub use failure::Failure;
pub use graph::{Graph, Handler, Input, Node, NodeBuilder, Outcome, Output, Registry, ValueFuture};
pub use scope::{Cache, Context, Scope, ScopeGuard};
pub use trace::{MemoryTracer, NodeTiming, Trace, TraceId, Tracer};
