//! Discovery lifecycle events and the sinks they are delivered to.
//!
//! This crate provides:
//! - `DiscoveryEvent` payloads tagged with the target's node and address
//! - Topic constants for routing
//! - `EventSink` trait with channel, log, and fan-out implementations

pub mod dispatcher;
pub mod event;
pub mod sink;
pub mod topics;

pub use dispatcher::EventDispatcher;
pub use event::{DiscoveryEvent, DiscoveryEventKind};
pub use sink::{ChannelEventSink, EventSink, LogEventSink, NullEventSink};
