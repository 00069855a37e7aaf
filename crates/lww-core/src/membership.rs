//! Membership collaborator boundary.
//!
//! The register never discovers peers or detects failures itself. It consumes a
//! `Membership` implementation and turns its member list into push targets via
//! `MembershipView`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("Failed to join cluster via {seeds:?}: {reason}")]
    JoinFailed { seeds: Vec<String>, reason: String },

    #[error("Failed to leave cluster: {0}")]
    LeaveFailed(String),
}

/// Liveness of a member as reported by the collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberStatus {
    /// Responding normally
    Alive,
    /// Missed a probe, may be dead
    Suspect,
    /// Failed to refute suspicion
    Dead,
    /// Departed intentionally
    Left,
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemberStatus::Alive => "alive",
            MemberStatus::Suspect => "suspect",
            MemberStatus::Dead => "dead",
            MemberStatus::Left => "left",
        };
        f.write_str(s)
    }
}

/// One entry of the collaborator's member list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    /// Endpoint the member serves its wire interface on
    pub address: String,
    pub status: MemberStatus,
}

/// External membership/failure-detection system.
///
/// `members()` may include the local node itself.
#[async_trait]
pub trait Membership: Send + Sync {
    /// Join an existing cluster through the given seed addresses.
    ///
    /// Returns the number of seeds that answered. An empty seed list starts a
    /// single-node cluster and succeeds with 0.
    async fn join(&self, seeds: &[String]) -> Result<usize, MembershipError>;

    /// Current member list.
    fn members(&self) -> Vec<Member>;

    /// Name of the local node.
    fn local_identity(&self) -> String;

    /// Announce intentional departure.
    async fn leave(&self) -> Result<(), MembershipError>;
}

/// A peer to push register state to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerTarget {
    /// Member name, for logs only
    pub name: String,
    pub address: String,
}

impl fmt::Display for PeerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.address)
    }
}

/// Turns the collaborator's member list into "alive peers other than us".
pub struct MembershipView {
    membership: Arc<dyn Membership>,
    local_address: String,
}

impl MembershipView {
    pub fn new(membership: Arc<dyn Membership>, local_address: impl Into<String>) -> Self {
        Self {
            membership,
            local_address: local_address.into(),
        }
    }

    pub fn membership(&self) -> &Arc<dyn Membership> {
        &self.membership
    }

    /// Alive members, excluding ourselves by name or by address.
    ///
    /// Recomputed on every call; an empty result is valid.
    pub fn current_targets(&self) -> Vec<PeerTarget> {
        let local_name = self.membership.local_identity();

        self.membership
            .members()
            .into_iter()
            .filter(|m| m.status == MemberStatus::Alive)
            .filter(|m| m.name != local_name && m.address != self.local_address)
            .map(|m| PeerTarget {
                name: m.name,
                address: m.address,
            })
            .collect()
    }
}
