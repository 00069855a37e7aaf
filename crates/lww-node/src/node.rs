//! Wires configuration, membership, the register and the HTTP server into a
//! running node.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use lww_core::{
    Broadcaster, InboundHandler, LoopConfig, Membership, MembershipView, NodeLoop, Register,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::client::{HttpPushTransport, build_client};
use crate::config::NodeConfig;
use crate::gossip::SwimMembership;
use crate::http::{AppState, router};
use crate::swim::PeerInfo;

/// A node that is bound and has joined its cluster, but is not yet serving.
pub struct Node {
    name: String,
    listener: TcpListener,
    local_addr: SocketAddr,
    advertise_addr: String,
    register: Arc<Register>,
    membership: Arc<SwimMembership>,
    loop_config: LoopConfig,
}

impl Node {
    /// Bind the listener and join the cluster.
    ///
    /// Binding happens first so seeds can reach us as soon as they learn
    /// about us. A failed join is fatal.
    pub async fn start(config: NodeConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind)
            .await
            .with_context(|| format!("failed to bind {}", config.bind))?;
        let local_addr = listener.local_addr().context("failed to read bound address")?;
        let advertise_addr = config.advertise_for(local_addr);

        info!(
            "[{}] listening on {} (advertising {})",
            config.name, local_addr, advertise_addr
        );

        let client =
            build_client(config.failure.probe_timeout).context("failed to build HTTP client")?;
        let membership = Arc::new(SwimMembership::new(
            PeerInfo::new(config.name.clone(), advertise_addr.clone()),
            config.failure.clone(),
            client,
        ));

        let joined = membership
            .join(&config.seeds)
            .await
            .context("failed to join cluster")?;
        if joined > 0 {
            info!("[{}] joined via {}/{} seed(s)", config.name, joined, config.seeds.len());
        }

        Ok(Self {
            name: config.name,
            listener,
            local_addr,
            advertise_addr,
            register: Arc::new(Register::new(config.initial_value)),
            membership,
            loop_config: config.loop_config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn advertise_addr(&self) -> &str {
        &self.advertise_addr
    }

    /// Serve until `shutdown` resolves, then stop everything and leave.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let transport = Arc::new(HttpPushTransport::new(
            build_client(self.loop_config.push_timeout).context("failed to build HTTP client")?,
        ));

        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown.await;
            let _ = stop_tx.send(true);
        });

        let state = Arc::new(AppState {
            node_name: self.name.clone(),
            register: Arc::clone(&self.register),
            inbound: InboundHandler::new(self.name.clone(), Arc::clone(&self.register)),
            membership: Arc::clone(&self.membership),
        });
        let app = router(state);
        let listener = self.listener;
        let server_stop = stopped(stop_rx.clone());
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(server_stop)
                .await
        });

        let prober = self.membership.spawn_prober();

        let membership: Arc<dyn Membership> = self.membership.clone();
        let view = MembershipView::new(membership, self.advertise_addr.clone());
        let broadcaster = Broadcaster::new(
            self.name.clone(),
            Arc::clone(&self.register),
            view,
            transport,
        );
        let node_loop = NodeLoop::new(
            self.name.clone(),
            Arc::clone(&self.register),
            broadcaster,
            self.loop_config,
        );

        info!("[{}] serving on {}", self.name, self.local_addr);
        node_loop.run(stopped(stop_rx)).await;
        prober.abort();

        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("[{}] server error: {}", self.name, e);
                return Err(e).context("HTTP server failed");
            }
            Err(e) => return Err(e).context("HTTP server task failed"),
        }

        info!("[{}] stopped", self.name);
        Ok(())
    }
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    // A dropped sender also means stop.
    let _ = rx.wait_for(|stop| *stop).await;
}
