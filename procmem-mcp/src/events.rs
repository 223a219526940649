//! Events emitted by the core and their stdio fan-out.
//!
//! `procmem-core` only exposes the domain shapes ([`procmem_core::sync::CapabilityEvent`],
//! [`procmem_core::types::TraceRecord`]); this module is where they're
//! projected into the wire-level event names a subscriber (e.g. an
//! `/events/stream?filter=algorithm.*` SSE endpoint) would see. The actual
//! SSE/HTTP transport is an external-collaborator concern; this crate
//! exposes the event shapes and a local broadcast channel a transport
//! layer can subscribe to.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use procmem_core::sync::CapabilityEvent;
use procmem_core::types::Signals;

/// Wire-level event envelope: `{type, ...payload}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "capability.start")]
    CapabilityStart { intent: String, tool_count: usize, code_length: Option<usize> },
    #[serde(rename = "capability.end")]
    CapabilityEnd { success: bool, execution_time_ms: u64, error: Option<String> },
    #[serde(rename = "algorithm.scored")]
    AlgorithmScored {
        item_id: String,
        item_type: String,
        intent: String,
        signals: Signals,
        final_score: f64,
        threshold: f64,
        decision: String,
    },
    #[serde(rename = "capability.zone.created")]
    ZoneCreated { id: String },
    #[serde(rename = "capability.zone.updated")]
    ZoneUpdated { id: String },
    #[serde(rename = "capability.merged")]
    Merged { source_id: String, target_id: String },
}

impl Event {
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<CapabilityEvent> for Event {
    fn from(e: CapabilityEvent) -> Self {
        match e {
            CapabilityEvent::ZoneCreated(id) => Event::ZoneCreated { id: id.to_string() },
            CapabilityEvent::ZoneUpdated(id) => Event::ZoneUpdated { id: id.to_string() },
            CapabilityEvent::Merged { source_id, target_id } => {
                Event::Merged { source_id: source_id.to_string(), target_id: target_id.to_string() }
            }
        }
    }
}

/// In-process fan-out for [`Event`]s. Lagging subscribers drop the oldest
/// events rather than block a publisher, matching `tokio::sync::broadcast`'s
/// default overflow behavior.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish an event; a publish with no subscribers is not an error.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
