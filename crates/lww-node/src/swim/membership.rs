//! Membership list for tracking known nodes.
//!
//! Tracks every node we have heard of, its status and its incarnation number.
//! Incarnations order conflicting claims about the same node: a higher
//! incarnation always wins, and a node refutes suspicion about itself by
//! bumping its own.

use super::{GossipUpdate, PeerInfo};
use lww_core::{Member as ClusterMember, MemberStatus};
use std::collections::{HashMap, VecDeque};

/// Maximum number of pending gossip updates before oldest are dropped
const MAX_GOSSIP_QUEUE_SIZE: usize = 100;

/// A remote node in the membership list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub info: PeerInfo,
    pub status: MemberStatus,
    /// Incarnation number (increases when the node refutes suspicion or restarts)
    pub incarnation: u64,
}

impl Member {
    pub fn new(info: PeerInfo, incarnation: u64) -> Self {
        Self {
            info,
            status: MemberStatus::Alive,
            incarnation,
        }
    }

    fn to_cluster_member(&self) -> ClusterMember {
        ClusterMember {
            name: self.info.name.clone(),
            address: self.info.address.clone(),
            status: self.status,
        }
    }
}

/// Membership list keyed by node name.
pub struct MembershipList {
    local: PeerInfo,
    local_incarnation: u64,
    local_status: MemberStatus,
    members: HashMap<String, Member>,
    pending_gossip: VecDeque<GossipUpdate>,
    /// Maximum gossip updates to piggyback per message
    gossip_fanout: usize,
}

impl MembershipList {
    /// Create a membership list with incarnation 1.
    #[cfg(test)]
    pub fn new(local: PeerInfo) -> Self {
        Self::with_incarnation(local, 1)
    }

    /// Create a membership list starting at a specific incarnation.
    ///
    /// A restarted node must start above any incarnation the cluster remembers
    /// for it, otherwise its Alive claims are ignored.
    pub fn with_incarnation(local: PeerInfo, incarnation: u64) -> Self {
        Self {
            local,
            local_incarnation: incarnation,
            local_status: MemberStatus::Alive,
            members: HashMap::new(),
            pending_gossip: VecDeque::new(),
            gossip_fanout: 6,
        }
    }

    pub fn local_incarnation(&self) -> u64 {
        self.local_incarnation
    }

    pub fn local_status(&self) -> MemberStatus {
        self.local_status
    }

    pub fn set_gossip_fanout(&mut self, fanout: usize) {
        self.gossip_fanout = fanout;
    }

    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    /// Number of remote members (excluding ourselves).
    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }

    /// Forget a member entirely. Used once a tombstone has expired.
    pub fn remove(&mut self, name: &str) -> Option<Member> {
        self.members.remove(name)
    }

    /// Full member list including ourselves.
    pub fn members(&self) -> Vec<ClusterMember> {
        let mut members = Vec::with_capacity(self.members.len() + 1);
        members.push(ClusterMember {
            name: self.local.name.clone(),
            address: self.local.address.clone(),
            status: self.local_status,
        });
        members.extend(self.members.values().map(Member::to_cluster_member));
        members
    }

    /// Remote members in the given status.
    pub fn members_with_status(&self, status: MemberStatus) -> impl Iterator<Item = &Member> {
        self.members.values().filter(move |m| m.status == status)
    }

    /// Record direct contact from a node (it sent us a ping or an ack).
    ///
    /// Direct contact is proof of life, so it overrides Suspect and Dead at any
    /// incarnation. Left is only overridden by a higher incarnation (a restart).
    /// Returns true if the node is new or its status changed.
    pub fn observe(&mut self, info: PeerInfo, incarnation: u64) -> bool {
        if info.name == self.local.name {
            return false;
        }

        match self.members.get_mut(&info.name) {
            Some(existing) => {
                if existing.status == MemberStatus::Left && incarnation <= existing.incarnation {
                    return false;
                }
                let changed = existing.status != MemberStatus::Alive || existing.info != info;
                existing.info = info;
                existing.status = MemberStatus::Alive;
                existing.incarnation = existing.incarnation.max(incarnation);
                if changed {
                    let update = GossipUpdate::alive(existing.info.clone(), existing.incarnation);
                    self.queue_gossip(update);
                }
                changed
            }
            None => {
                self.queue_gossip(GossipUpdate::alive(info.clone(), incarnation));
                self.members
                    .insert(info.name.clone(), Member::new(info, incarnation));
                true
            }
        }
    }

    /// Apply one gossip update. Returns true if our view changed.
    ///
    /// Changed updates are re-queued so they keep spreading.
    pub fn apply(&mut self, update: &GossipUpdate) -> bool {
        if update.subject() == self.local.name {
            self.apply_about_self(update);
            return false;
        }

        let changed = match update {
            GossipUpdate::Alive { peer, incarnation } => self.apply_alive(peer, *incarnation),
            GossipUpdate::Suspect { name, incarnation } => {
                self.transition(name, *incarnation, MemberStatus::Suspect, |s| {
                    s == MemberStatus::Alive
                })
            }
            GossipUpdate::Dead { name, incarnation } => {
                self.transition(name, *incarnation, MemberStatus::Dead, |s| {
                    s == MemberStatus::Alive || s == MemberStatus::Suspect
                })
            }
            GossipUpdate::Left { name, incarnation } => {
                self.transition(name, *incarnation, MemberStatus::Left, |s| {
                    s != MemberStatus::Left
                })
            }
        };

        if changed {
            self.queue_gossip(update.clone());
        }
        changed
    }

    /// Apply a batch of updates. Returns names whose status changed.
    pub fn apply_all(&mut self, updates: &[GossipUpdate]) -> Vec<String> {
        updates
            .iter()
            .filter(|u| self.apply(u))
            .map(|u| u.subject().to_string())
            .collect()
    }

    fn apply_alive(&mut self, peer: &PeerInfo, incarnation: u64) -> bool {
        match self.members.get_mut(&peer.name) {
            Some(existing) => {
                if incarnation > existing.incarnation {
                    existing.info = peer.clone();
                    existing.incarnation = incarnation;
                    existing.status = MemberStatus::Alive;
                    true
                } else {
                    false
                }
            }
            None => {
                self.members
                    .insert(peer.name.clone(), Member::new(peer.clone(), incarnation));
                true
            }
        }
    }

    fn transition(
        &mut self,
        name: &str,
        incarnation: u64,
        to: MemberStatus,
        allowed_from: impl Fn(MemberStatus) -> bool,
    ) -> bool {
        let Some(member) = self.members.get_mut(name) else {
            return false;
        };

        if incarnation >= member.incarnation && allowed_from(member.status) {
            member.status = to;
            member.incarnation = incarnation;
            return true;
        }
        false
    }

    fn apply_about_self(&mut self, update: &GossipUpdate) {
        if self.local_status == MemberStatus::Left {
            return;
        }
        match update {
            GossipUpdate::Suspect { incarnation, .. } | GossipUpdate::Dead { incarnation, .. }
                if *incarnation >= self.local_incarnation =>
            {
                // Refute with a higher incarnation
                self.local_incarnation =
                    (*incarnation).max(self.local_incarnation).saturating_add(1);
                let refute = GossipUpdate::alive(self.local.clone(), self.local_incarnation);
                self.queue_gossip(refute);
            }
            _ => {}
        }
    }

    /// Mark a member suspected after a failed probe.
    pub fn suspect(&mut self, name: &str) -> bool {
        let Some(member) = self.members.get_mut(name) else {
            return false;
        };
        if member.status != MemberStatus::Alive {
            return false;
        }
        member.status = MemberStatus::Suspect;
        let update = GossipUpdate::suspect(name, member.incarnation);
        self.queue_gossip(update);
        true
    }

    /// Mark a suspected member dead after its suspicion timed out.
    pub fn mark_dead(&mut self, name: &str) -> bool {
        let Some(member) = self.members.get_mut(name) else {
            return false;
        };
        if member.status != MemberStatus::Suspect {
            return false;
        }
        member.status = MemberStatus::Dead;
        let update = GossipUpdate::dead(name, member.incarnation);
        self.queue_gossip(update);
        true
    }

    /// Mark ourselves as departed. Returns the update to announce.
    pub fn leave(&mut self) -> GossipUpdate {
        self.local_status = MemberStatus::Left;
        self.local_incarnation = self.local_incarnation.saturating_add(1);
        GossipUpdate::left(self.local.name.clone(), self.local_incarnation)
    }

    /// Queue a gossip update for propagation.
    pub fn queue_gossip(&mut self, update: GossipUpdate) {
        // Drop oldest if queue is full (FIFO eviction)
        if self.pending_gossip.len() >= MAX_GOSSIP_QUEUE_SIZE {
            self.pending_gossip.pop_front();
        }
        self.pending_gossip.push_back(update);
    }

    /// Take up to `gossip_fanout` updates to piggyback on the next message.
    pub fn drain_gossip(&mut self) -> Vec<GossipUpdate> {
        let count = self.gossip_fanout.min(self.pending_gossip.len());
        self.pending_gossip.drain(..count).collect()
    }

    /// Alive updates for us and every alive member.
    ///
    /// Sent to a node that just joined so it learns the whole cluster at once.
    pub fn generate_full_gossip(&self) -> Vec<GossipUpdate> {
        let mut updates = vec![GossipUpdate::alive(
            self.local.clone(),
            self.local_incarnation,
        )];
        updates.extend(
            self.members_with_status(MemberStatus::Alive)
                .map(|m| GossipUpdate::alive(m.info.clone(), m.incarnation)),
        );
        updates
    }

    /// Pick a random member worth probing (alive or suspected).
    pub fn pick_probe_target(&self) -> Option<&Member> {
        use rand::seq::IndexedRandom;

        let candidates: Vec<_> = self
            .members
            .values()
            .filter(|m| matches!(m.status, MemberStatus::Alive | MemberStatus::Suspect))
            .collect();
        candidates.choose(&mut rand::rng()).copied()
    }
}
