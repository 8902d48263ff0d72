//! Execution Tracing
//!
//! A [`Tracer`] observes traced graph runs: it is told when a run begins, it
//! receives one [`NodeTiming`] per handler invocation as that invocation
//! settles, and it is told when the requested value settles. What it does
//! with that (store it, render it, ship it elsewhere) is its own business.
//! [`MemoryTracer`] keeps completed traces in memory and renders them.

mod memory;

pub use memory::{MemoryTracer, Trace, TraceNode};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::failure::Failure;

/// Identifier of one traced graph run.
///
/// A single tracer is commonly shared by graphs from many scopes, each
/// with its own registry, so ids come from one process-wide counter rather
/// than from the scope. Ids start at 1 and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraceId(u64);

static NEXT_TRACE: AtomicU64 = AtomicU64::new(1);

impl TraceId {
    /// Allocate the next id.
    pub fn new() -> Self {
        Self(NEXT_TRACE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trace-{}", self.0)
    }
}

/// Timing and outcome of one handler invocation.
#[derive(Debug, Clone)]
pub struct NodeTiming {
    pub output_key: String,
    pub input_keys: Vec<String>,
    /// Wall time from calling the handler until its result settled.
    pub duration_nanos: u64,
    pub failure: Option<Failure>,
}

/// Receiver of execution traces.
pub trait Tracer: Send + Sync {
    /// A traced graph for `output_key` is starting.
    fn begin(&self, trace_id: TraceId, output_key: &str);

    /// A node in the run settled.
    fn record(&self, trace_id: TraceId, timing: NodeTiming);

    /// The requested value settled.
    fn finish(&self, trace_id: TraceId, failure: Option<&Failure>);
}

/// A tracer bound to one run, threaded through resolution.
#[derive(Clone)]
pub(crate) struct Probe {
    tracer: Arc<dyn Tracer>,
    trace_id: TraceId,
}

impl Probe {
    pub(crate) fn new(tracer: Arc<dyn Tracer>, trace_id: TraceId) -> Self {
        Self { tracer, trace_id }
    }

    pub(crate) fn begin(&self, output_key: &str) {
        self.tracer.begin(self.trace_id, output_key);
    }

    pub(crate) fn record(&self, timing: NodeTiming) {
        self.tracer.record(self.trace_id, timing);
    }

    pub(crate) fn finish(&self, failure: Option<&Failure>) {
        self.tracer.finish(self.trace_id, failure);
    }
}
