//! Topic constants for discovery lifecycle events.
//!
//! Topics follow the pattern `linkd.<domain>.<event>`.

/// A discovery run started probing its target.
pub const DISCOVERY_STARTED: &str = "linkd.discovery.started";

/// A discovery run finished, whatever the probe's outcome.
pub const DISCOVERY_COMPLETED: &str = "linkd.discovery.completed";

/// A firing was skipped because the task is suspended.
pub const DISCOVERY_SUSPENDED: &str = "linkd.discovery.suspended";

/// Source tag stamped on every event emitted by the scheduler.
pub const SOURCE: &str = "linkd";
