//! Periodic schedules driving a node.
//!
//! Two independent tasks: the broadcast schedule runs one anti-entropy cycle
//! per tick, the status schedule logs and publishes a `NodeStatus`. Neither
//! waits on the other. On shutdown both are stopped and the node leaves the
//! cluster best-effort.

use crate::broadcast::{Broadcaster, PushTransport};
use crate::membership::Membership;
use crate::register::Register;
use crate::status::NodeStatus;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Timing for the two schedules.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// How often to push our state to peers (default: 2s)
    pub broadcast_interval: Duration,
    /// How often to report status (default: 5s)
    pub status_interval: Duration,
    /// Shared deadline for all pushes of one cycle (default: 1s)
    pub push_timeout: Duration,
}

/// Shortest period a schedule runs at. `tokio::time::interval` rejects zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

impl LoopConfig {
    /// Raise zero intervals to the minimum period.
    fn clamped(mut self) -> Self {
        self.broadcast_interval = self.broadcast_interval.max(MIN_PERIOD);
        self.status_interval = self.status_interval.max(MIN_PERIOD);
        self
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            broadcast_interval: Duration::from_secs(2),
            status_interval: Duration::from_secs(5),
            push_timeout: Duration::from_secs(1),
        }
    }
}

pub struct NodeLoop<T: PushTransport> {
    node_name: String,
    register: Arc<Register>,
    broadcaster: Arc<Broadcaster<T>>,
    config: LoopConfig,
    status_tx: watch::Sender<Option<NodeStatus>>,
}

impl<T: PushTransport> NodeLoop<T> {
    pub fn new(
        node_name: impl Into<String>,
        register: Arc<Register>,
        broadcaster: Broadcaster<T>,
        config: LoopConfig,
    ) -> Self {
        let node_name = node_name.into();
        if config.broadcast_interval.is_zero() || config.status_interval.is_zero() {
            warn!("[{}] zero schedule interval raised to {:?}", node_name, MIN_PERIOD);
        }
        let (status_tx, _) = watch::channel(None);
        Self {
            node_name,
            register,
            broadcaster: Arc::new(broadcaster),
            config: config.clamped(),
            status_tx,
        }
    }

    /// Receive each status published by the status schedule.
    pub fn subscribe_status(&self) -> watch::Receiver<Option<NodeStatus>> {
        self.status_tx.subscribe()
    }

    /// Run both schedules until `shutdown` resolves, then leave the cluster.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let membership = Arc::clone(self.broadcaster.view().membership());

        let broadcast = tokio::spawn(broadcast_schedule(
            self.node_name.clone(),
            Arc::clone(&self.broadcaster),
            self.config.clone(),
        ));
        let status = tokio::spawn(status_schedule(
            self.node_name.clone(),
            Arc::clone(&self.register),
            Arc::clone(&membership),
            self.config.status_interval,
            self.status_tx.clone(),
        ));

        info!(
            "[{}] node loop started (broadcast every {:?}, status every {:?})",
            self.node_name, self.config.broadcast_interval, self.config.status_interval
        );

        shutdown.await;

        broadcast.abort();
        status.abort();

        info!("[{}] leaving cluster", self.node_name);
        if let Err(e) = membership.leave().await {
            warn!("[{}] failed to leave cluster cleanly: {}", self.node_name, e);
        }
    }
}

async fn broadcast_schedule<T: PushTransport>(
    node_name: String,
    broadcaster: Arc<Broadcaster<T>>,
    config: LoopConfig,
) {
    let mut ticker = interval(config.broadcast_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let report = broadcaster
            .broadcast_once(Instant::now() + config.push_timeout)
            .await;

        if report.attempted == 0 {
            debug!("[{}] no peers to broadcast to", node_name);
        } else if report.is_complete() {
            debug!("[{}] broadcast: {}", node_name, report);
        } else {
            warn!("[{}] broadcast incomplete: {}", node_name, report);
        }
    }
}

async fn status_schedule(
    node_name: String,
    register: Arc<Register>,
    membership: Arc<dyn Membership>,
    period: Duration,
    status_tx: watch::Sender<Option<NodeStatus>>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let status = NodeStatus::capture(&node_name, &register, membership.as_ref());
        info!(
            "[{}] value={} gen={} live members={:?}",
            status.name,
            status.value,
            status.generation,
            status.live_members()
        );
        status_tx.send_replace(Some(status));
    }
}
