// src/provenance/event.rs

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Actor name used for events emitted by the coordinator itself.
pub const ORCHESTRATOR: &str = "orchestrator";

/// Actor name used for events about the synthesis worker.
pub const SYNTHESIS: &str = "synthesis";

/// Actor name for events about one task's worker, e.g. `worker_soccer`.
pub fn worker_actor(label: &str) -> String {
    format!("worker_{label}")
}

/// One line of the provenance log.
///
/// Serialised as a single JSON object:
/// `{"timestamp": 1712345678.123456, "timestamp_iso": "...Z", "actor": "...",
///   "action": "...", "details": {...}, "message": "..."}`.
#[derive(Debug, Clone, Serialize)]
pub struct ProvenanceEvent {
    pub timestamp: f64,
    pub timestamp_iso: String,
    pub actor: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProvenanceEvent {
    /// New event stamped with the current time.
    pub fn new(actor: impl Into<String>, action: impl Into<String>) -> Self {
        Self::at(Utc::now(), actor, action)
    }

    /// New event stamped with an explicit time.
    pub fn at(when: DateTime<Utc>, actor: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            timestamp: epoch_seconds(when),
            timestamp_iso: when.to_rfc3339_opts(SecondsFormat::Micros, true),
            actor: actor.into(),
            action: action.into(),
            details: None,
            message: None,
        }
    }

    /// Attach one structured detail field.
    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value.into());
        self
    }

    /// Attach a human-readable message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Seconds since the Unix epoch with microsecond precision.
pub fn epoch_seconds(when: DateTime<Utc>) -> f64 {
    when.timestamp_micros() as f64 / 1_000_000.0
}

/// Round a duration to centiseconds, the precision used in logs and summaries.
pub fn round_secs(duration: std::time::Duration) -> f64 {
    (duration.as_secs_f64() * 100.0).round() / 100.0
}
