//! SWIM membership over HTTP.
//!
//! `SwimMembership` is the node's membership collaborator. It owns the SWIM
//! state, answers `POST /swim`, probes a random member every probe interval and
//! announces departure on leave. The register only sees it through
//! `lww_core::Membership`.

use crate::client::base_url;
use crate::swim::{
    FailureDetectorConfig, GossipUpdate, MembershipList, PeerInfo, SuspicionTracker, SwimMessage,
};
use async_trait::async_trait;
use futures::future::join_all;
use lww_core::{Member, MemberStatus, Membership, MembershipError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Upper bound for a join request to one seed.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct SwimMembership {
    local: PeerInfo,
    list: Mutex<MembershipList>,
    suspicions: Mutex<SuspicionTracker>,
    /// Dead and departed members, dropped from the list once expired
    tombstones: Mutex<SuspicionTracker>,
    config: FailureDetectorConfig,
    client: reqwest::Client,
}

impl SwimMembership {
    /// Create the collaborator for the local node.
    ///
    /// The starting incarnation is the current wall-clock time in
    /// milliseconds, so a restarted node always outranks what the cluster
    /// remembers about its previous run.
    pub fn new(local: PeerInfo, config: FailureDetectorConfig, client: reqwest::Client) -> Self {
        let incarnation = now_ms().max(1);
        Self {
            list: Mutex::new(MembershipList::with_incarnation(local.clone(), incarnation)),
            suspicions: Mutex::new(SuspicionTracker::new(config.suspicion_timeout)),
            tombstones: Mutex::new(SuspicionTracker::new(config.tombstone_timeout)),
            local,
            config,
            client,
        }
    }

    fn lock_list(&self) -> std::sync::MutexGuard<'_, MembershipList> {
        self.list.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_suspicions(&self) -> std::sync::MutexGuard<'_, SuspicionTracker> {
        self.suspicions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_tombstones(&self) -> std::sync::MutexGuard<'_, SuspicionTracker> {
        self.tombstones.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ping(&self, full: bool) -> SwimMessage {
        let mut list = self.lock_list();
        let gossip = if full {
            list.generate_full_gossip()
        } else {
            list.drain_gossip()
        };
        SwimMessage::Ping {
            from: self.local.clone(),
            incarnation: list.local_incarnation(),
            gossip,
        }
    }

    /// Merge a message's sender and gossip into our list.
    ///
    /// Returns true if the sender was previously unknown.
    fn absorb(&self, msg: &SwimMessage) -> bool {
        let (from, incarnation) = msg.sender();
        let leaving = msg.gossip().iter().any(|u| {
            matches!(u, GossipUpdate::Left { name, .. } if *name == from.name)
        });

        let mut list = self.lock_list();
        let is_new = list.get(&from.name).is_none();
        if !leaving && list.observe(from.clone(), incarnation) && is_new {
            info!("[{}] member joined: {} ({})", self.local.name, from.name, from.address);
        }

        for name in list.apply_all(msg.gossip()) {
            if let Some(member) = list.get(&name) {
                info!("[{}] member {} is now {}", self.local.name, name, member.status);
            }
        }
        is_new
    }

    /// Server side of `POST /swim`.
    pub fn handle_message(&self, msg: SwimMessage) -> SwimMessage {
        let is_new = self.absorb(&msg);

        let mut list = self.lock_list();
        // A node we have never seen is probably joining: send it everything.
        let gossip = if is_new {
            list.generate_full_gossip()
        } else {
            list.drain_gossip()
        };
        SwimMessage::Ack {
            from: self.local.clone(),
            incarnation: list.local_incarnation(),
            gossip,
        }
    }

    async fn send(
        &self,
        address: &str,
        msg: &SwimMessage,
        timeout: Duration,
    ) -> Result<SwimMessage, reqwest::Error> {
        self.client
            .post(format!("{}/swim", base_url(address)))
            .timeout(timeout)
            .json(msg)
            .send()
            .await?
            .error_for_status()?
            .json::<SwimMessage>()
            .await
    }

    /// Probe one random member, then expire old suspicions and tombstones.
    pub async fn probe_once(&self) {
        let target = {
            let list = self.lock_list();
            if list.local_status() == MemberStatus::Left {
                return;
            }
            list.pick_probe_target().map(|m| m.info.clone())
        };

        if let Some(target) = target {
            let ping = self.ping(false);
            match self.send(&target.address, &ping, self.config.probe_timeout).await {
                Ok(reply) => {
                    debug!("[{}] probe of {} acked", self.local.name, target.name);
                    self.absorb(&reply);
                    if self.lock_suspicions().clear(&target.name) {
                        info!("[{}] {} answered, suspicion cleared", self.local.name, target.name);
                    }
                }
                Err(e) => {
                    if self.lock_list().suspect(&target.name) {
                        info!(
                            "[{}] suspecting {}: probe failed: {}",
                            self.local.name, target.name, e
                        );
                    }
                }
            }
        }

        self.reap(now_ms());
    }

    /// Sync the timers with the list, mark timed-out suspects dead and forget
    /// members whose tombstone has expired.
    fn reap(&self, now_ms: u64) {
        let mut list = self.lock_list();
        let suspected: Vec<String> = list
            .members_with_status(MemberStatus::Suspect)
            .map(|m| m.info.name.clone())
            .collect();

        let expired = {
            let mut suspicions = self.lock_suspicions();
            suspicions.track(&suspected, now_ms);
            suspicions.expired(now_ms)
        };

        for name in expired {
            if list.mark_dead(&name) {
                warn!("[{}] member {} declared dead", self.local.name, name);
            }
        }

        let departed: Vec<String> = list
            .members_with_status(MemberStatus::Dead)
            .chain(list.members_with_status(MemberStatus::Left))
            .map(|m| m.info.name.clone())
            .collect();

        let forgotten = {
            let mut tombstones = self.lock_tombstones();
            tombstones.track(&departed, now_ms);
            tombstones.expired(now_ms)
        };

        for name in forgotten {
            if list.remove(&name).is_some() {
                debug!(
                    "[{}] forgot member {} ({} remaining)",
                    self.local.name,
                    name,
                    list.len()
                );
            }
        }
    }

    /// Probe on a fixed interval until the task is aborted.
    pub fn spawn_prober(self: &Arc<Self>) -> JoinHandle<()> {
        let membership = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(membership.config.probe_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                membership.probe_once().await;
            }
        })
    }
}

#[async_trait]
impl Membership for SwimMembership {
    async fn join(&self, seeds: &[String]) -> Result<usize, MembershipError> {
        if seeds.is_empty() {
            info!("[{}] no seeds given, starting a new cluster", self.local.name);
            return Ok(0);
        }

        let ping = &self.ping(true);
        let results = join_all(
            seeds
                .iter()
                .map(|seed| async move { (seed, self.send(seed, ping, JOIN_TIMEOUT).await) }),
        )
        .await;

        let mut joined = 0;
        let mut last_error = String::new();
        for (seed, result) in results {
            match result {
                Ok(reply) => {
                    self.absorb(&reply);
                    joined += 1;
                    info!("[{}] joined cluster via {}", self.local.name, seed);
                }
                Err(e) => {
                    warn!("[{}] seed {} did not answer: {}", self.local.name, seed, e);
                    last_error = e.to_string();
                }
            }
        }

        if joined == 0 {
            return Err(MembershipError::JoinFailed {
                seeds: seeds.to_vec(),
                reason: last_error,
            });
        }
        Ok(joined)
    }

    fn members(&self) -> Vec<Member> {
        self.lock_list().members()
    }

    fn local_identity(&self) -> String {
        self.local.name.clone()
    }

    async fn leave(&self) -> Result<(), MembershipError> {
        let (msg, targets) = {
            let mut list = self.lock_list();
            let update = list.leave();
            let mut gossip = vec![update];
            gossip.extend(list.drain_gossip());
            let targets: Vec<PeerInfo> = list
                .members_with_status(MemberStatus::Alive)
                .chain(list.members_with_status(MemberStatus::Suspect))
                .map(|m| m.info.clone())
                .collect();
            let msg = SwimMessage::Ping {
                from: self.local.clone(),
                incarnation: list.local_incarnation(),
                gossip,
            };
            (msg, targets)
        };

        if targets.is_empty() {
            return Ok(());
        }

        let results = join_all(
            targets
                .iter()
                .map(|t| self.send(&t.address, &msg, self.config.probe_timeout)),
        )
        .await;

        let notified = results.iter().filter(|r| r.is_ok()).count();
        info!(
            "[{}] announced departure to {}/{} member(s)",
            self.local.name,
            notified,
            targets.len()
        );

        if notified == 0 {
            return Err(MembershipError::LeaveFailed(format!(
                "none of {} member(s) acknowledged",
                targets.len()
            )));
        }
        Ok(())
    }
}
