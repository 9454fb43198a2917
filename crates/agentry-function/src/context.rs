use agentry_core::{Observation, ObservationKind, Tracer};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::tracers::NoopTracer;

/// Tracing sink plus the observation that encloses the current call.
///
/// Passed explicitly through every call; child functions receive
/// [`TraceContext::child`] so their observations nest under the parent.
#[derive(Clone)]
pub struct TraceContext {
    tracer: Arc<dyn Tracer>,
    current: Option<Observation>,
}

impl TraceContext {
    pub fn new(tracer: Arc<dyn Tracer>) -> Self {
        Self {
            tracer,
            current: None,
        }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopTracer))
    }

    pub fn tracer(&self) -> &Arc<dyn Tracer> {
        &self.tracer
    }

    pub fn current(&self) -> Option<&Observation> {
        self.current.as_ref()
    }

    pub fn child(&self, observation: Observation) -> Self {
        Self {
            tracer: self.tracer.clone(),
            current: Some(observation),
        }
    }

    /// Opens an observation under the current one. With nothing enclosing
    /// the call a new trace is started instead.
    pub fn open(&self, kind: ObservationKind, name: &str, input: &Value) -> Observation {
        let kind = if self.current.is_none() {
            ObservationKind::Trace
        } else {
            kind
        };
        self.tracer
            .create_observation(self.current.as_ref(), kind, name, input)
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceContext")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracers::InMemoryTracer;
    use serde_json::json;

    #[test]
    fn test_root_opens_trace_and_children_nest() {
        let tracer = Arc::new(InMemoryTracer::new());
        let root = TraceContext::new(tracer.clone());

        let trace = root.open(ObservationKind::Span, "agent", &json!({}));
        assert_eq!(trace.kind, ObservationKind::Trace);
        assert!(trace.parent_id.is_none());

        let child_ctx = root.child(trace.clone());
        let generation = child_ctx.open(ObservationKind::Generation, "llm", &json!({}));
        assert_eq!(generation.kind, ObservationKind::Generation);
        assert_eq!(generation.parent_id.as_deref(), Some(trace.id.as_str()));
        assert_eq!(generation.trace_id, trace.trace_id);
        assert_eq!(tracer.observations().len(), 2);
    }
}
