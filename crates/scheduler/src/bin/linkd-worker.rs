//! linkd-worker: runs recurring discovery for every configured target.
//!
//! Loads `linkd.toml`, schedules one discovery task per (package, target)
//! on a tokio timer queue, and logs lifecycle events until Ctrl-C.
//!
//! The bundled collection flavor is a TCP reachability probe; protocol
//! specific collectors plug in through `CollectionStrategy`.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::{debug, info, warn};

use linkd_core::config::load_dotenv;
use linkd_core::{CollectionConfig, DiscoveryTarget, LinkdConfig};
use linkd_events::{ChannelEventSink, DiscoveryEventKind, EventDispatcher, EventSink, LogEventSink};
use linkd_scheduler::{
    CollectionStrategy, DiscoveryCoordinator, StrategyFactory, TimerQueue, TokioTimerQueue,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Recurring network discovery worker.
#[derive(Parser, Debug)]
#[command(name = "linkd-worker", version, about)]
struct Cli {
    /// Path to linkd.toml config file.
    #[arg(long, env = "LINKD_CONFIG", default_value = "config/linkd.toml")]
    config: String,

    /// Override the delay before each target's first run.
    #[arg(long, env = "LINKD_INITIAL_DELAY_SECS")]
    initial_delay_secs: Option<u64>,

    /// Override the interval between runs.
    #[arg(long, env = "LINKD_INTERVAL_SECS")]
    interval_secs: Option<u64>,

    /// TCP port the reachability probe connects to.
    #[arg(long, env = "LINKD_PROBE_PORT", default_value_t = 22)]
    probe_port: u16,
}

// ── TcpReachabilityProbe ────────────────────────────────────────────

/// Checks that the target accepts TCP connections on a fixed port.
struct TcpReachabilityProbe {
    port: u16,
}

impl CollectionStrategy for TcpReachabilityProbe {
    fn perform_discovery(&self, target: &DiscoveryTarget, config: &CollectionConfig) {
        let addr = SocketAddr::new(config.effective_address(), self.port);
        let start = Instant::now();
        match TcpStream::connect_timeout(&addr, config.timeout()) {
            Ok(_) => info!(
                node_id = target.node_id,
                %addr,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "target reachable"
            ),
            Err(e) => warn!(node_id = target.node_id, %addr, error = %e, "target unreachable"),
        }
    }

    fn info(&self) -> String {
        format!("TcpReachabilityProbe: port {}", self.port)
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let mut config = match LinkdConfig::from_file(&cli.config) {
        Ok(cfg) => {
            info!(path = %cli.config, "loaded linkd config");
            cfg
        }
        Err(e) => {
            warn!(
                error = %e,
                path = %cli.config,
                "failed to load config, using local defaults"
            );
            LinkdConfig::local()
        }
    };
    if let Some(secs) = cli.initial_delay_secs {
        config.scheduler.initial_delay_secs = secs;
    }
    if let Some(secs) = cli.interval_secs {
        config.scheduler.interval_secs = secs;
    }
    config.validate()?;
    config.log_summary();

    let queue = Arc::new(TokioTimerQueue::new()?);
    let timer: Arc<dyn TimerQueue> = queue.clone();

    let (channel, mut rx) = ChannelEventSink::channel();
    let events: Arc<dyn EventSink> = Arc::new(EventDispatcher::with_defaults(vec![
        Arc::new(LogEventSink) as Arc<dyn EventSink>,
        Arc::new(channel),
    ]));

    let probe: Arc<dyn CollectionStrategy> = Arc::new(TcpReachabilityProbe {
        port: cli.probe_port,
    });
    let strategies: StrategyFactory =
        Arc::new(move |_: &DiscoveryTarget, _: &str| Arc::clone(&probe));

    let coordinator = DiscoveryCoordinator::new(Arc::new(config), timer, events, strategies);
    let scheduled = coordinator.schedule_configured()?;
    info!(scheduled, "linkd-worker started");

    let mut counts: HashMap<DiscoveryEventKind, u64> = HashMap::new();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                *counts.entry(event.kind).or_default() += 1;
                match event.to_json() {
                    Ok(json) => debug!(topic = event.topic(), %json, "event"),
                    Err(e) => warn!(error = %e, "failed to serialize event"),
                }
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
                break;
            }
        }
    }

    let removed = coordinator.shutdown()?;
    queue.shutdown();
    info!(removed, ?counts, "linkd-worker exited cleanly");

    Ok(())
}
