use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::target::{
    default_port, default_read_community, default_retries, default_timeout_ms, CollectionConfig,
    DiscoveryTarget, NodeId, SnmpVersion,
};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

// ── Task timing ───────────────────────────────────────────────

/// Timing of a recurring discovery task, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskTiming {
    /// Time before the first run.
    pub initial_delay: Duration,
    /// Spacing between subsequent runs.
    pub interval: Duration,
}

impl TaskTiming {
    pub fn new(initial_delay: Duration, interval: Duration) -> Self {
        Self {
            initial_delay,
            interval,
        }
    }

    pub fn from_secs(initial_delay_secs: u64, interval_secs: u64) -> Self {
        Self::new(
            Duration::from_secs(initial_delay_secs),
            Duration::from_secs(interval_secs),
        )
    }
}

impl Default for TaskTiming {
    fn default() -> Self {
        Self::from_secs(default_initial_delay(), default_interval())
    }
}

// ── Top-level config ──────────────────────────────────────────

/// Daemon configuration, parsed from `linkd.toml` with env overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkdConfig {
    /// Default task timing.
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// Default agent parameters for every target.
    #[serde(default)]
    pub snmp: SnmpDefaults,

    /// Named configuration groups of targets.
    #[serde(default)]
    pub packages: BTreeMap<String, PackageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_initial_delay() -> u64 {
    300
}

fn default_interval() -> u64 {
    1800
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay(),
            interval_secs: default_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpDefaults {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_read_community")]
    pub read_community: String,
    #[serde(default)]
    pub version: SnmpVersion,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl Default for SnmpDefaults {
    fn default() -> Self {
        Self {
            port: default_port(),
            read_community: default_read_community(),
            version: SnmpVersion::default(),
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
        }
    }
}

/// A package: targets sharing timing overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageConfig {
    pub initial_delay_secs: Option<u64>,
    pub interval_secs: Option<u64>,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// A single configured target with optional agent overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub node_id: NodeId,
    pub address: IpAddr,
    pub port: Option<u16>,
    pub read_community: Option<String>,
    pub version: Option<SnmpVersion>,
}

impl TargetConfig {
    pub fn target(&self) -> DiscoveryTarget {
        DiscoveryTarget::new(self.node_id, self.address)
    }
}

impl LinkdConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, CoreError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults only, no packages.
    pub fn local() -> Self {
        Self {
            scheduler: SchedulerSection::default(),
            snmp: SnmpDefaults::default(),
            packages: BTreeMap::new(),
        }
    }

    // ── Environment variable overrides ──────────────────────────

    /// Apply environment variable overrides.
    ///
    /// Convention: `LINKD_SECTION_KEY` overrides `section.key`.
    /// - `LINKD_SCHEDULER_INITIAL_DELAY_SECS` -> `scheduler.initial_delay_secs`
    /// - `LINKD_SCHEDULER_INTERVAL_SECS` -> `scheduler.interval_secs`
    /// - `LINKD_SNMP_READ_COMMUNITY` -> `snmp.read_community`
    /// - `LINKD_SNMP_PORT` -> `snmp.port`
    /// - `LINKD_SNMP_TIMEOUT_MS` -> `snmp.timeout_ms`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secs) = lookup("LINKD_SCHEDULER_INITIAL_DELAY_SECS").and_then(|v| v.parse().ok()) {
            self.scheduler.initial_delay_secs = secs;
        }
        if let Some(secs) = lookup("LINKD_SCHEDULER_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.scheduler.interval_secs = secs;
        }
        if let Some(community) = lookup("LINKD_SNMP_READ_COMMUNITY").filter(|v| !v.is_empty()) {
            self.snmp.read_community = community;
        }
        if let Some(port) = lookup("LINKD_SNMP_PORT").and_then(|v| v.parse().ok()) {
            self.snmp.port = port;
        }
        if let Some(ms) = lookup("LINKD_SNMP_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.snmp.timeout_ms = ms;
        }
    }

    // ── Validation ──────────────────────────────────────────────

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.scheduler.interval_secs == 0 {
            return Err(CoreError::Config(
                "scheduler.interval_secs must be greater than zero".into(),
            ));
        }

        let mut seen = HashSet::new();
        for (name, package) in &self.packages {
            if name.trim().is_empty() {
                return Err(CoreError::Config("package name must not be empty".into()));
            }
            if package.interval_secs == Some(0) {
                return Err(CoreError::Config(format!(
                    "package '{name}' interval_secs must be greater than zero"
                )));
            }
            for target in &package.targets {
                if !seen.insert((name.as_str(), target.address)) {
                    return Err(CoreError::Config(format!(
                        "package '{name}' lists address {} more than once",
                        target.address
                    )));
                }
            }
        }
        Ok(())
    }

    // ── Resolution ──────────────────────────────────────────────

    /// Default timing with the package's overrides applied.
    pub fn timing_for(&self, package: &str) -> TaskTiming {
        let pkg = self.packages.get(package);
        let initial = pkg
            .and_then(|p| p.initial_delay_secs)
            .unwrap_or(self.scheduler.initial_delay_secs);
        let interval = pkg
            .and_then(|p| p.interval_secs)
            .unwrap_or(self.scheduler.interval_secs);
        TaskTiming::from_secs(initial, interval)
    }

    /// Authoritative agent config for `address`.
    ///
    /// The first configured target with this address contributes its
    /// overrides; anything it leaves unset comes from `[snmp]`.
    pub fn agent_config_for(&self, address: IpAddr) -> CollectionConfig {
        let target = self
            .packages
            .values()
            .flat_map(|p| p.targets.iter())
            .find(|t| t.address == address);

        CollectionConfig {
            address,
            port: target.and_then(|t| t.port).unwrap_or(self.snmp.port),
            read_community: target
                .and_then(|t| t.read_community.clone())
                .unwrap_or_else(|| self.snmp.read_community.clone()),
            version: target.and_then(|t| t.version).unwrap_or(self.snmp.version),
            timeout_ms: self.snmp.timeout_ms,
            retries: self.snmp.retries,
        }
    }

    /// Every configured `(package, target)` pair, in package order.
    pub fn configured_targets(&self) -> Vec<(String, DiscoveryTarget)> {
        self.packages
            .iter()
            .flat_map(|(name, p)| p.targets.iter().map(move |t| (name.clone(), t.target())))
            .collect()
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  scheduler:   initial_delay={}s, interval={}s",
            self.scheduler.initial_delay_secs,
            self.scheduler.interval_secs
        );
        tracing::info!(
            "  snmp:        port={}, version={}, timeout={}ms",
            self.snmp.port,
            self.snmp.version,
            self.snmp.timeout_ms
        );
        for (name, package) in &self.packages {
            tracing::info!("  package:     {} ({} targets)", name, package.targets.len());
        }
    }
}

impl Default for LinkdConfig {
    fn default() -> Self {
        Self::local()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const SAMPLE: &str = r#"
[scheduler]
initial_delay_secs = 60
interval_secs = 600

[snmp]
read_community = "secret"
timeout_ms = 1500

[packages.core]
interval_secs = 120

[[packages.core.targets]]
node_id = 1
address = "10.0.0.1"

[[packages.core.targets]]
node_id = 2
address = "10.0.0.2"
read_community = "routers"
port = 1161

[packages.edge]

[[packages.edge.targets]]
node_id = 3
address = "192.168.0.1"
version = "v1"
"#;

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let cfg = LinkdConfig::from_toml("").unwrap();
        assert_eq!(cfg.scheduler.initial_delay_secs, 300);
        assert_eq!(cfg.scheduler.interval_secs, 1800);
        assert_eq!(cfg.snmp.port, 161);
        assert!(cfg.packages.is_empty());
    }

    #[test]
    fn parse_full_toml() {
        let cfg: LinkdConfig = toml::from_str(SAMPLE).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.packages.len(), 2);
        assert_eq!(cfg.packages["core"].targets.len(), 2);
        assert_eq!(cfg.packages["edge"].targets[0].version, Some(SnmpVersion::V1));
        assert_eq!(cfg.snmp.read_community, "secret");
    }

    #[test]
    fn timing_for_applies_package_overrides() {
        let cfg: LinkdConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.timing_for("core"), TaskTiming::from_secs(60, 120));
        assert_eq!(cfg.timing_for("edge"), TaskTiming::from_secs(60, 600));
        assert_eq!(cfg.timing_for("unknown"), TaskTiming::from_secs(60, 600));
    }

    #[test]
    fn default_timing_is_five_and_thirty_minutes() {
        let timing = TaskTiming::default();
        assert_eq!(timing.initial_delay, Duration::from_secs(5 * 60));
        assert_eq!(timing.interval, Duration::from_secs(30 * 60));
        assert_eq!(LinkdConfig::local().timing_for("any"), timing);
    }

    #[test]
    fn agent_config_merges_target_overrides() {
        let cfg: LinkdConfig = toml::from_str(SAMPLE).unwrap();

        let routers = cfg.agent_config_for("10.0.0.2".parse().unwrap());
        assert_eq!(routers.read_community, "routers");
        assert_eq!(routers.port, 1161);
        assert_eq!(routers.timeout_ms, 1500);

        let plain = cfg.agent_config_for("10.0.0.1".parse().unwrap());
        assert_eq!(plain.read_community, "secret");
        assert_eq!(plain.port, 161);

        let unknown = cfg.agent_config_for("172.16.0.9".parse().unwrap());
        assert_eq!(unknown.read_community, "secret");
        assert_eq!(unknown.version, SnmpVersion::V2c);
    }

    #[test]
    fn configured_targets_in_package_order() {
        let cfg: LinkdConfig = toml::from_str(SAMPLE).unwrap();
        let targets = cfg.configured_targets();
        let ids: Vec<(&str, NodeId)> = targets.iter().map(|(p, t)| (p.as_str(), t.node_id)).collect();
        assert_eq!(ids, vec![("core", 1), ("core", 2), ("edge", 3)]);
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("LINKD_SCHEDULER_INTERVAL_SECS", "90"),
            ("LINKD_SNMP_READ_COMMUNITY", "override"),
            ("LINKD_SNMP_PORT", "not-a-port"),
        ]);
        let mut cfg = LinkdConfig::local();
        cfg.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.scheduler.interval_secs, 90);
        assert_eq!(cfg.scheduler.initial_delay_secs, 300);
        assert_eq!(cfg.snmp.read_community, "override");
        assert_eq!(cfg.snmp.port, 161); // unparseable, ignored
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut cfg = LinkdConfig::local();
        cfg.scheduler.interval_secs = 0;
        assert!(matches!(cfg.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn validate_rejects_duplicate_address_in_package() {
        let toml = r#"
[[packages.p.targets]]
node_id = 1
address = "10.0.0.1"

[[packages.p.targets]]
node_id = 2
address = "10.0.0.1"
"#;
        let err = LinkdConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn same_address_in_two_packages_is_allowed() {
        let toml = r#"
[[packages.a.targets]]
node_id = 1
address = "10.0.0.1"

[[packages.b.targets]]
node_id = 1
address = "10.0.0.1"
"#;
        let cfg: LinkdConfig = toml::from_str(toml).unwrap();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn from_file_missing_is_io_error() {
        let err = LinkdConfig::from_file("/nonexistent/linkd.toml").unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
