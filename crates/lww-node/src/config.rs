//! Command-line and environment configuration.

use crate::swim::FailureDetectorConfig;
use anyhow::{Context, Result, bail};
use clap::Parser;
use lww_core::LoopConfig;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "lww-node")]
#[command(about = "Replicated last-write-wins register node")]
pub struct Args {
    /// Node name, unique within the cluster (default: random UUID)
    #[arg(long, env = "NODE_NAME")]
    pub name: Option<String>,

    /// Address to bind the HTTP server to
    #[arg(long, env = "NODE_ADDR", default_value = "0.0.0.0")]
    pub bind_addr: String,

    /// Port to listen on
    #[arg(long, env = "NODE_PORT", default_value = "8080")]
    pub port: u16,

    /// Address other nodes use to reach us (default: derived from the bind address)
    #[arg(long, env = "ADVERTISE_ADDR")]
    pub advertise_addr: Option<String>,

    /// Seed addresses of an existing cluster, comma separated
    #[arg(long, env = "CLUSTER_ADDR", value_delimiter = ',')]
    pub cluster_addr: Vec<String>,

    /// Register value before any write
    #[arg(long, env = "INITIAL_VALUE", default_value = "42", allow_hyphen_values = true)]
    pub initial_value: i64,

    /// Milliseconds between anti-entropy broadcasts
    #[arg(long, env = "BROADCAST_INTERVAL_MS", default_value = "2000")]
    pub broadcast_interval_ms: u64,

    /// Milliseconds between status reports
    #[arg(long, env = "STATUS_INTERVAL_MS", default_value = "5000")]
    pub status_interval_ms: u64,

    /// Deadline in milliseconds for all pushes of one broadcast
    #[arg(long, env = "PUSH_TIMEOUT_MS", default_value = "1000")]
    pub push_timeout_ms: u64,

    /// Milliseconds between membership probes
    #[arg(long, env = "PROBE_INTERVAL_MS", default_value = "1000")]
    pub probe_interval_ms: u64,

    /// Milliseconds to wait for a probe ack
    #[arg(long, env = "PROBE_TIMEOUT_MS", default_value = "500")]
    pub probe_timeout_ms: u64,

    /// Milliseconds a member stays suspected before it is declared dead
    #[arg(long, env = "SUSPICION_TIMEOUT_MS", default_value = "5000")]
    pub suspicion_timeout_ms: u64,

    /// Milliseconds a dead or departed member is remembered before it is forgotten
    #[arg(long, env = "TOMBSTONE_TIMEOUT_MS", default_value = "60000")]
    pub tombstone_timeout_ms: u64,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,
}

/// Validated node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub name: String,
    pub bind: SocketAddr,
    /// Explicit advertised address; `None` means derive it from the bound socket.
    pub advertise_addr: Option<String>,
    pub seeds: Vec<String>,
    pub initial_value: i64,
    pub loop_config: LoopConfig,
    pub failure: FailureDetectorConfig,
}

impl NodeConfig {
    pub fn from_args(args: Args) -> Result<Self> {
        let name = match args.name {
            Some(name) => name.trim().to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        if name.is_empty() {
            bail!("node name must not be empty");
        }

        let ip: IpAddr = args
            .bind_addr
            .parse()
            .with_context(|| format!("invalid bind address {:?}", args.bind_addr))?;
        let bind = SocketAddr::new(ip, args.port);

        let durations = [
            ("broadcast interval", args.broadcast_interval_ms),
            ("status interval", args.status_interval_ms),
            ("push timeout", args.push_timeout_ms),
            ("probe interval", args.probe_interval_ms),
            ("probe timeout", args.probe_timeout_ms),
            ("suspicion timeout", args.suspicion_timeout_ms),
            ("tombstone timeout", args.tombstone_timeout_ms),
        ];
        for (what, ms) in durations {
            if ms == 0 {
                bail!("{} must be greater than zero", what);
            }
        }
        if args.push_timeout_ms > args.broadcast_interval_ms {
            bail!(
                "push timeout ({}ms) must not exceed the broadcast interval ({}ms)",
                args.push_timeout_ms,
                args.broadcast_interval_ms
            );
        }

        let advertise_addr = args
            .advertise_addr
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());

        let seeds = args
            .cluster_addr
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            name,
            bind,
            advertise_addr,
            seeds,
            initial_value: args.initial_value,
            loop_config: LoopConfig {
                broadcast_interval: Duration::from_millis(args.broadcast_interval_ms),
                status_interval: Duration::from_millis(args.status_interval_ms),
                push_timeout: Duration::from_millis(args.push_timeout_ms),
            },
            failure: FailureDetectorConfig {
                probe_interval: Duration::from_millis(args.probe_interval_ms),
                probe_timeout: Duration::from_millis(args.probe_timeout_ms),
                suspicion_timeout: Duration::from_millis(args.suspicion_timeout_ms),
                tombstone_timeout: Duration::from_millis(args.tombstone_timeout_ms),
            },
        })
    }

    /// Address to advertise given the socket we actually bound.
    pub fn advertise_for(&self, bound: SocketAddr) -> String {
        if let Some(addr) = &self.advertise_addr {
            return addr.clone();
        }
        if bound.ip().is_unspecified() {
            format!("127.0.0.1:{}", bound.port())
        } else {
            bound.to_string()
        }
    }
}
