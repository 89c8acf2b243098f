use std::net::IpAddr;
use std::sync::Arc;

use linkd_core::{CollectionConfig, DiscoveryTarget, LinkdConfig};

/// Performs the target-specific probing for one discovery flavor
/// (link discovery, topology discovery, ...).
///
/// Called synchronously from the task's run. The strategy owns its failure
/// handling: nothing is reported back and the task reschedules regardless.
pub trait CollectionStrategy: Send + Sync {
    fn perform_discovery(&self, target: &DiscoveryTarget, config: &CollectionConfig);

    /// Human-readable description of this flavor. Must be side-effect free.
    fn info(&self) -> String;
}

/// Authoritative source of collection configs, consulted when a suspended
/// task wakes up.
pub trait ConfigSource: Send + Sync {
    fn lookup_current_config(&self, address: IpAddr) -> CollectionConfig;
}

impl ConfigSource for LinkdConfig {
    fn lookup_current_config(&self, address: IpAddr) -> CollectionConfig {
        self.agent_config_for(address)
    }
}

/// Picks the strategy for a target scheduled under a package.
pub type StrategyFactory =
    Arc<dyn Fn(&DiscoveryTarget, &str) -> Arc<dyn CollectionStrategy> + Send + Sync>;
