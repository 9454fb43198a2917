//! Tracing sink interface (trace / span / generation observations)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::TokenUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    Trace,
    Span,
    Generation,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationStatus {
    Success,
    Error,
}

/// Opaque handle to one observation held by a tracing backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub kind: ObservationKind,
    pub name: String,
}

#[async_trait]
pub trait Tracer: Send + Sync {
    /// Opens an observation. With no parent a new trace is started.
    fn create_observation(
        &self,
        parent: Option<&Observation>,
        kind: ObservationKind,
        name: &str,
        input: &Value,
    ) -> Observation;

    fn close(
        &self,
        observation: &Observation,
        output: &Value,
        status: ObservationStatus,
        usage: Option<TokenUsage>,
    );

    fn score(&self, observation: &Observation, name: &str, value: f64, comment: Option<&str>);

    async fn flush(&self) {}
}
