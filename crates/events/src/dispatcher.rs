//! Routes discovery events to several sinks.
//!
//! The dispatcher is itself an [`EventSink`]. Events of a kind with
//! dedicated sinks go to those sinks; every other event goes to the
//! default sinks.

use std::collections::HashMap;
use std::sync::Arc;

use crate::event::{DiscoveryEvent, DiscoveryEventKind};
use crate::sink::EventSink;

/// Fans events out to multiple sinks, organized per event kind.
#[derive(Default)]
pub struct EventDispatcher {
    /// Event kind → sinks dedicated to that kind.
    kind_sinks: HashMap<DiscoveryEventKind, Vec<Arc<dyn EventSink>>>,
    /// Fallback sinks used when no kind-specific sinks exist.
    default_sinks: Vec<Arc<dyn EventSink>>,
}

impl EventDispatcher {
    /// Create an empty dispatcher (drops every event).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a dispatcher that sends every event to all `sinks`.
    pub fn with_defaults(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self {
            kind_sinks: HashMap::new(),
            default_sinks: sinks,
        }
    }

    pub fn add_default(&mut self, sink: Arc<dyn EventSink>) {
        self.default_sinks.push(sink);
    }

    /// Replace all sinks for a specific event kind.
    pub fn set_kind_sinks(&mut self, kind: DiscoveryEventKind, sinks: Vec<Arc<dyn EventSink>>) {
        self.kind_sinks.insert(kind, sinks);
    }

    /// Remove kind-specific routing, falling back to the defaults.
    pub fn remove_kind(&mut self, kind: DiscoveryEventKind) {
        self.kind_sinks.remove(&kind);
    }

    fn sinks_for(&self, kind: DiscoveryEventKind) -> &[Arc<dyn EventSink>] {
        self.kind_sinks
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&self.default_sinks)
    }
}

impl EventSink for EventDispatcher {
    fn send(&self, event: DiscoveryEvent) {
        let sinks = self.sinks_for(event.kind);
        if sinks.is_empty() {
            tracing::debug!(topic = event.topic(), "No event sinks configured");
            return;
        }

        let (last, rest) = match sinks.split_last() {
            Some(split) => split,
            None => return,
        };
        for sink in rest {
            sink.send(event.clone());
        }
        last.send(event);
    }

    fn sink_name(&self) -> &str {
        "dispatcher"
    }
}
