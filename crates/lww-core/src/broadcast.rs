//! Anti-entropy fan-out.
//!
//! Each cycle snapshots the register, resolves the current alive peers and
//! pushes the snapshot to all of them concurrently. Every push is bound by the
//! same deadline. A failed or slow peer never cancels its siblings; failures
//! are collected into a `BroadcastReport` after every task has finished or
//! timed out.

use crate::membership::{MembershipView, PeerTarget};
use crate::register::{Register, RegisterState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{self, JoinSet};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PushError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Peer rejected push with status {status}")]
    Rejected { status: u16 },

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Push task failed: {0}")]
    TaskFailed(String),
}

/// Delivers a register snapshot to one peer.
#[async_trait]
pub trait PushTransport: Send + Sync + 'static {
    async fn push(
        &self,
        target: &PeerTarget,
        state: RegisterState,
        notifier: &str,
    ) -> Result<(), PushError>;
}

/// A push that did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushFailure {
    pub target: PeerTarget,
    pub error: PushError,
}

/// Outcome of one broadcast cycle.
#[derive(Debug, Clone)]
pub struct BroadcastReport {
    /// State that was pushed
    pub snapshot: RegisterState,
    pub attempted: usize,
    pub delivered: usize,
    pub failures: Vec<PushFailure>,
}

impl BroadcastReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "pushed ({}, gen {}) to {}/{} peer(s)",
            self.snapshot.value, self.snapshot.generation, self.delivered, self.attempted
        );
        if !self.failures.is_empty() {
            let failed: Vec<String> = self
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.target, f.error))
                .collect();
            summary.push_str(&format!("; failed: [{}]", failed.join(", ")));
        }
        summary
    }
}

impl fmt::Display for BroadcastReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Pushes the local register to every alive peer.
pub struct Broadcaster<T: PushTransport> {
    node_name: String,
    register: Arc<Register>,
    view: MembershipView,
    transport: Arc<T>,
}

impl<T: PushTransport> Broadcaster<T> {
    pub fn new(
        node_name: impl Into<String>,
        register: Arc<Register>,
        view: MembershipView,
        transport: Arc<T>,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            register,
            view,
            transport,
        }
    }

    pub fn view(&self) -> &MembershipView {
        &self.view
    }

    /// Run one fan-out cycle, waiting at most until `deadline`.
    pub async fn broadcast_once(&self, deadline: Instant) -> BroadcastReport {
        let snapshot = self.register.read();
        let targets = self.view.current_targets();
        let attempted = targets.len();

        let mut tasks = JoinSet::new();
        let mut pending: HashMap<task::Id, PeerTarget> = HashMap::with_capacity(attempted);
        for target in targets {
            let transport = Arc::clone(&self.transport);
            let notifier = self.node_name.clone();
            let peer = target.clone();
            let handle = tasks.spawn(async move {
                let push = transport.push(&peer, snapshot, &notifier);
                match timeout_at(deadline, push).await {
                    Ok(result) => result,
                    Err(_) => Err(PushError::DeadlineExceeded),
                }
            });
            pending.insert(handle.id(), target);
        }

        let mut delivered = 0;
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => (e.id(), Err(PushError::TaskFailed(e.to_string()))),
            };
            let Some(target) = pending.remove(&id) else {
                continue;
            };
            match result {
                Ok(()) => {
                    debug!("[{}] pushed gen {} to {}", self.node_name, snapshot.generation, target);
                    delivered += 1;
                }
                Err(error) => {
                    if matches!(error, PushError::TaskFailed(_)) {
                        warn!(
                            "[{}] push task for {} did not complete: {}",
                            self.node_name, target, error
                        );
                    } else {
                        debug!("[{}] push to {} failed: {}", self.node_name, target, error);
                    }
                    failures.push(PushFailure { target, error });
                }
            }
        }

        BroadcastReport {
            snapshot,
            attempted,
            delivered,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::{Member, MemberStatus, Membership, MembershipError};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeMembership {
        members: Vec<Member>,
    }

    #[async_trait]
    impl Membership for FakeMembership {
        async fn join(&self, _seeds: &[String]) -> Result<usize, MembershipError> {
            Ok(0)
        }

        fn members(&self) -> Vec<Member> {
            self.members.clone()
        }

        fn local_identity(&self) -> String {
            "self".to_string()
        }

        async fn leave(&self) -> Result<(), MembershipError> {
            Ok(())
        }
    }

    /// Behaviour keyed by address prefix: `down-*` fails, `slow-*` hangs,
    /// `bad-*` is rejected, `panic-*` panics, everything else succeeds.
    #[derive(Default)]
    struct ScriptedTransport {
        delivered: Mutex<Vec<(String, RegisterState, String)>>,
    }

    #[async_trait]
    impl PushTransport for ScriptedTransport {
        async fn push(
            &self,
            target: &PeerTarget,
            state: RegisterState,
            notifier: &str,
        ) -> Result<(), PushError> {
            if target.address.starts_with("down") {
                return Err(PushError::Network("connection refused".into()));
            }
            if target.address.starts_with("bad") {
                return Err(PushError::Rejected { status: 400 });
            }
            if target.address.starts_with("panic") {
                panic!("transport blew up");
            }
            if target.address.starts_with("slow") {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.delivered.lock().unwrap().push((
                target.address.clone(),
                state,
                notifier.to_string(),
            ));
            Ok(())
        }
    }

    fn alive(name: &str) -> Member {
        Member {
            name: name.to_string(),
            address: name.to_string(),
            status: MemberStatus::Alive,
        }
    }

    fn broadcaster(
        members: Vec<Member>,
        register: Arc<Register>,
    ) -> (Broadcaster<ScriptedTransport>, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::default());
        let view = MembershipView::new(Arc::new(FakeMembership { members }), "self");
        (
            Broadcaster::new("self", register, view, Arc::clone(&transport)),
            transport,
        )
    }

    #[tokio::test]
    async fn test_no_targets_completes_immediately() {
        let (broadcaster, _) = broadcaster(vec![alive("self")], Arc::new(Register::new(1)));

        let report = broadcaster
            .broadcast_once(Instant::now() + Duration::from_secs(1))
            .await;

        assert_eq!(report.attempted, 0);
        assert_eq!(report.delivered, 0);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_pushes_snapshot_to_every_peer() {
        let register = Arc::new(Register::new(42));
        register.write(7);
        let (broadcaster, transport) = broadcaster(
            vec![alive("self"), alive("b"), alive("c"), alive("d")],
            register,
        );

        let report = broadcaster
            .broadcast_once(Instant::now() + Duration::from_secs(1))
            .await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 3);
        assert!(report.is_complete());

        let delivered = transport.delivered.lock().unwrap();
        let addresses: HashSet<_> = delivered.iter().map(|(a, _, _)| a.as_str()).collect();
        assert_eq!(addresses, HashSet::from(["b", "c", "d"]));
        for (_, state, notifier) in delivered.iter() {
            assert_eq!(*state, RegisterState { value: 7, generation: 1 });
            assert_eq!(notifier, "self");
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_block_other_peers() {
        let (broadcaster, transport) = broadcaster(
            vec![
                alive("b"),
                alive("down-1"),
                alive("c"),
                alive("bad-1"),
                alive("down-2"),
            ],
            Arc::new(Register::new(3)),
        );

        let report = broadcaster
            .broadcast_once(Instant::now() + Duration::from_secs(1))
            .await;

        assert_eq!(report.attempted, 5);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 3);
        assert_eq!(transport.delivered.lock().unwrap().len(), 2);

        let rejected = report
            .failures
            .iter()
            .find(|f| f.target.address == "bad-1")
            .unwrap();
        assert_eq!(rejected.error, PushError::Rejected { status: 400 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_peer_bounded_by_deadline() {
        let (broadcaster, transport) = broadcaster(
            vec![alive("b"), alive("slow-1"), alive("c")],
            Arc::new(Register::new(3)),
        );

        let started = Instant::now();
        let deadline = started + Duration::from_millis(500);
        let report = broadcaster.broadcast_once(deadline).await;

        assert!(Instant::now() <= deadline + Duration::from_millis(50));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].target.address, "slow-1");
        assert_eq!(report.failures[0].error, PushError::DeadlineExceeded);
        assert_eq!(transport.delivered.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_skips_non_alive_members() {
        let mut suspect = alive("e");
        suspect.status = MemberStatus::Suspect;
        let (broadcaster, _) = broadcaster(vec![alive("b"), suspect], Arc::new(Register::new(0)));

        let report = broadcaster
            .broadcast_once(Instant::now() + Duration::from_secs(1))
            .await;

        assert_eq!(report.attempted, 1);
    }

    #[test]
    fn test_summary_lists_failures() {
        let report = BroadcastReport {
            snapshot: RegisterState { value: 7, generation: 2 },
            attempted: 2,
            delivered: 1,
            failures: vec![PushFailure {
                target: PeerTarget {
                    name: "b".into(),
                    address: "10.0.0.2:8080".into(),
                },
                error: PushError::DeadlineExceeded,
            }],
        };

        let summary = report.summary();
        assert!(summary.contains("1/2"));
        assert!(summary.contains("b@10.0.0.2:8080: Deadline exceeded"));
    }

    #[tokio::test]
    async fn test_panicking_push_keeps_its_target() {
        let (broadcaster, _) = broadcaster(
            vec![alive("b"), alive("panic-1")],
            Arc::new(Register::new(3)),
        );

        let report = broadcaster
            .broadcast_once(Instant::now() + Duration::from_secs(1))
            .await;

        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failures.len(), 1);

        let failure = &report.failures[0];
        assert_eq!(failure.target.name, "panic-1");
        assert_eq!(failure.target.address, "panic-1");
        assert!(matches!(failure.error, PushError::TaskFailed(_)));
        assert!(report.summary().contains("panic-1@panic-1"));
    }
}
