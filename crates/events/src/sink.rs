//! Event sink trait and its basic implementations.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::event::DiscoveryEvent;

/// Receives discovery lifecycle events.
///
/// Delivery is fire-and-forget: `send` must not block the caller and has
/// nothing to report back. Implementations deal with their own failures.
pub trait EventSink: Send + Sync {
    fn send(&self, event: DiscoveryEvent);

    /// Human-readable name for this sink (e.g., "channel", "log").
    fn sink_name(&self) -> &str;
}

/// Blanket implementation so `Arc<dyn EventSink>` can be used directly.
impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn send(&self, event: DiscoveryEvent) {
        (**self).send(event)
    }

    fn sink_name(&self) -> &str {
        (**self).sink_name()
    }
}

/// Forwards events into an unbounded tokio channel.
///
/// Unbounded so the sender never waits. Events sent after the receiver is
/// gone are dropped.
#[derive(Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<DiscoveryEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::UnboundedSender<DiscoveryEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving half.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DiscoveryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: DiscoveryEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!(
                topic = e.0.topic(),
                node_id = e.0.node_id,
                "event receiver closed, dropping event"
            );
        }
    }

    fn sink_name(&self) -> &str {
        "channel"
    }
}

/// Writes every event to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn send(&self, event: DiscoveryEvent) {
        info!(
            topic = event.topic(),
            node_id = event.node_id,
            address = %event.address,
            "discovery {}",
            event.kind
        );
    }

    fn sink_name(&self) -> &str {
        "log"
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: DiscoveryEvent) {}

    fn sink_name(&self) -> &str {
        "null"
    }
}
