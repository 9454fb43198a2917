//! Built-in tracing sinks

use agentry_core::{Observation, ObservationKind, ObservationStatus, TokenUsage, Tracer};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

fn new_observation(
    parent: Option<&Observation>,
    kind: ObservationKind,
    name: &str,
) -> Observation {
    let id = Uuid::new_v4().to_string();
    let trace_id = parent
        .map(|p| p.trace_id.clone())
        .unwrap_or_else(|| id.clone());
    Observation {
        id,
        trace_id,
        parent_id: parent.map(|p| p.id.clone()),
        kind,
        name: name.to_string(),
    }
}

/// Discards everything; observations still get unique ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn create_observation(
        &self,
        parent: Option<&Observation>,
        kind: ObservationKind,
        name: &str,
        _input: &Value,
    ) -> Observation {
        new_observation(parent, kind, name)
    }

    fn close(&self, _: &Observation, _: &Value, _: ObservationStatus, _: Option<TokenUsage>) {}

    fn score(&self, _: &Observation, _: &str, _: f64, _: Option<&str>) {}
}

/// Emits observations as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTracer;

impl Tracer for LoggingTracer {
    fn create_observation(
        &self,
        parent: Option<&Observation>,
        kind: ObservationKind,
        name: &str,
        input: &Value,
    ) -> Observation {
        let observation = new_observation(parent, kind, name);
        debug!(
            observation_id = %observation.id,
            trace_id = %observation.trace_id,
            kind = ?kind,
            %input,
            "[{}] observation opened",
            name
        );
        observation
    }

    fn close(
        &self,
        observation: &Observation,
        output: &Value,
        status: ObservationStatus,
        usage: Option<TokenUsage>,
    ) {
        match status {
            ObservationStatus::Success => info!(
                observation_id = %observation.id,
                total_tokens = usage.map(|u| u.total_tokens).unwrap_or(0),
                "[{}] observation closed",
                observation.name
            ),
            ObservationStatus::Error => warn!(
                observation_id = %observation.id,
                %output,
                "[{}] observation closed with error",
                observation.name
            ),
        }
    }

    fn score(&self, observation: &Observation, name: &str, value: f64, comment: Option<&str>) {
        info!(
            observation_id = %observation.id,
            score = name,
            value,
            comment = comment.unwrap_or(""),
            "[{}] score",
            observation.name
        );
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedObservation {
    pub observation: Observation,
    pub input: Value,
    pub output: Option<Value>,
    pub status: Option<ObservationStatus>,
    pub usage: Option<TokenUsage>,
}

impl RecordedObservation {
    pub fn is_closed(&self) -> bool {
        self.status.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedScore {
    pub observation_id: String,
    pub name: String,
    pub value: f64,
    pub comment: Option<String>,
}

/// Keeps every observation, closure and score in memory for inspection.
#[derive(Debug, Default)]
pub struct InMemoryTracer {
    observations: RwLock<Vec<RecordedObservation>>,
    scores: RwLock<Vec<RecordedScore>>,
    flushes: AtomicUsize,
}

impl InMemoryTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> Vec<RecordedObservation> {
        self.observations.read().clone()
    }

    pub fn find(&self, name: &str) -> Vec<RecordedObservation> {
        self.observations
            .read()
            .iter()
            .filter(|o| o.observation.name == name)
            .cloned()
            .collect()
    }

    pub fn children_of(&self, parent_id: &str) -> Vec<RecordedObservation> {
        self.observations
            .read()
            .iter()
            .filter(|o| o.observation.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.observations
            .read()
            .iter()
            .filter(|o| !o.is_closed())
            .count()
    }

    pub fn scores(&self) -> Vec<RecordedScore> {
        self.scores.read().clone()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.observations.write().clear();
        self.scores.write().clear();
        self.flushes.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl Tracer for InMemoryTracer {
    fn create_observation(
        &self,
        parent: Option<&Observation>,
        kind: ObservationKind,
        name: &str,
        input: &Value,
    ) -> Observation {
        let observation = new_observation(parent, kind, name);
        self.observations.write().push(RecordedObservation {
            observation: observation.clone(),
            input: input.clone(),
            output: None,
            status: None,
            usage: None,
        });
        observation
    }

    fn close(
        &self,
        observation: &Observation,
        output: &Value,
        status: ObservationStatus,
        usage: Option<TokenUsage>,
    ) {
        let mut observations = self.observations.write();
        if let Some(record) = observations
            .iter_mut()
            .find(|o| o.observation.id == observation.id)
        {
            record.output = Some(output.clone());
            record.status = Some(status);
            record.usage = usage;
        }
    }

    fn score(&self, observation: &Observation, name: &str, value: f64, comment: Option<&str>) {
        self.scores.write().push(RecordedScore {
            observation_id: observation.id.clone(),
            name: name.to_string(),
            value,
            comment: comment.map(str::to_string),
        });
    }

    async fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }
}
