//! In-memory tracer with JSON and Graphviz rendering.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{NodeTiming, TraceId, Tracer};
use crate::failure::Failure;

/// One node invocation inside a [`Trace`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceNode {
    pub output_key: String,
    pub input_keys: Vec<String>,
    pub duration_nanos: u64,
    pub error: Option<String>,
}

/// Everything recorded for one traced graph run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: TraceId,
    pub output_key: String,
    /// Invocations in the order they settled.
    pub nodes: Vec<TraceNode>,
    pub complete: bool,
    pub error: Option<String>,
}

impl Trace {
    fn new(trace_id: TraceId, output_key: &str) -> Self {
        Self {
            trace_id,
            output_key: output_key.to_owned(),
            nodes: Vec::new(),
            complete: false,
            error: None,
        }
    }

    pub fn node(&self, output_key: &str) -> Option<&TraceNode> {
        self.nodes.iter().find(|node| node.output_key == output_key)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Render the run as a Graphviz digraph, edges pointing from a dependency
    /// to its consumer. Inputs that were not invoked during the run (cache
    /// hits) are drawn dashed; failed nodes are drawn red.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", self.trace_id);
        let _ = writeln!(out, "  rankdir=BT;");
        let _ = writeln!(out, "  node [shape=box];");

        let invoked: BTreeSet<&str> = self.nodes.iter().map(|n| n.output_key.as_str()).collect();
        for node in &self.nodes {
            let millis = node.duration_nanos as f64 / 1_000_000.0;
            let color = if node.error.is_some() { ", color=red" } else { "" };
            let _ = writeln!(
                out,
                "  \"{}\" [label=\"{}\\n{:.3}ms\"{}];",
                escape(&node.output_key),
                escape(&node.output_key),
                millis,
                color
            );
        }

        let not_invoked: BTreeSet<&str> = self
            .nodes
            .iter()
            .flat_map(|n| n.input_keys.iter().map(String::as_str))
            .filter(|key| !invoked.contains(key))
            .collect();
        for key in not_invoked {
            let _ = writeln!(out, "  \"{}\" [style=dashed];", escape(key));
        }

        for node in &self.nodes {
            for input in &node.input_keys {
                let _ = writeln!(
                    out,
                    "  \"{}\" -> \"{}\";",
                    escape(input),
                    escape(&node.output_key)
                );
            }
        }
        out.push_str("}\n");
        out
    }
}

fn escape(key: &str) -> String {
    key.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A [`Tracer`] that keeps every trace in memory.
#[derive(Default)]
pub struct MemoryTracer {
    traces: Mutex<HashMap<TraceId, Trace>>,
}

impl MemoryTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a trace, complete or not.
    pub fn get(&self, trace_id: TraceId) -> Option<Trace> {
        self.traces.lock().get(&trace_id).cloned()
    }

    /// Remove and return a trace once its run has completed.
    pub fn take_completed(&self, trace_id: TraceId) -> Option<Trace> {
        let mut traces = self.traces.lock();
        if traces.get(&trace_id).is_some_and(|trace| trace.complete) {
            traces.remove(&trace_id)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.traces.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.lock().is_empty()
    }
}

impl Tracer for MemoryTracer {
    fn begin(&self, trace_id: TraceId, output_key: &str) {
        self.traces
            .lock()
            .insert(trace_id, Trace::new(trace_id, output_key));
    }

    fn record(&self, trace_id: TraceId, timing: NodeTiming) {
        if let Some(trace) = self.traces.lock().get_mut(&trace_id) {
            trace.nodes.push(TraceNode {
                output_key: timing.output_key,
                input_keys: timing.input_keys,
                duration_nanos: timing.duration_nanos,
                error: timing.failure.map(|failure| failure.to_string()),
            });
        }
    }

    fn finish(&self, trace_id: TraceId, failure: Option<&Failure>) {
        if let Some(trace) = self.traces.lock().get_mut(&trace_id) {
            trace.complete = true;
            trace.error = failure.map(ToString::to_string);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(key: &str, inputs: &[&str], failure: Option<Failure>) -> NodeTiming {
        NodeTiming {
            output_key: key.to_owned(),
            input_keys: inputs.iter().map(|s| s.to_string()).collect(),
            duration_nanos: 1_500_000,
            failure,
        }
    }

    fn recorded() -> (MemoryTracer, TraceId) {
        let tracer = MemoryTracer::new();
        let id = TraceId::new();
        tracer.begin(id, "a+b");
        tracer.record(id, timing("a", &[], None));
        tracer.record(id, timing("a+b", &["a", "b"], Some(Failure::msg("bad b"))));
        (tracer, id)
    }

    #[test]
    fn records_nodes_until_finished() {
        let (tracer, id) = recorded();
        let trace = tracer.get(id).unwrap();
        assert!(!trace.complete);
        assert_eq!(trace.nodes.len(), 2);
        assert_eq!(trace.node("a+b").unwrap().error.as_deref(), Some("bad b"));
        assert!(tracer.take_completed(id).is_none());

        tracer.finish(id, None);
        let trace = tracer.take_completed(id).unwrap();
        assert!(trace.complete);
        assert!(tracer.is_empty());
    }

    #[test]
    fn record_without_begin_is_ignored() {
        let tracer = MemoryTracer::new();
        tracer.record(TraceId::new(), timing("a", &[], None));
        assert!(tracer.is_empty());
    }

    #[test]
    fn dot_output_marks_failures_and_cache_hits() {
        let (tracer, id) = recorded();
        let dot = tracer.get(id).unwrap().to_dot();

        assert!(dot.starts_with(&format!("digraph \"trace-{}\" {{", id.raw())));
        assert!(dot.contains("\"a\" [label=\"a\\n1.500ms\"];"));
        assert!(dot.contains("\"a+b\" [label=\"a+b\\n1.500ms\", color=red];"));
        assert!(dot.contains("\"b\" [style=dashed];"));
        assert!(dot.contains("\"a\" -> \"a+b\";"));
        assert!(dot.contains("\"b\" -> \"a+b\";"));
    }

    #[test]
    fn json_round_trips() {
        let (tracer, id) = recorded();
        let trace = tracer.get(id).unwrap();
        let json = trace.to_json().unwrap();
        let parsed: Trace = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, trace);
    }
}
