//! SWIM (Scalable Weakly-consistent Infection-style Membership) state.
//!
//! Pure state for the membership collaborator; networking lives in `gossip`.
//!
//! # Protocol Overview
//!
//! **Failure Detection:**
//! 1. Each node periodically pings a random other node
//! 2. If no ack within timeout, mark the target as "suspect"
//! 3. If the suspicion is not cleared before its timeout, mark it "dead"
//!
//! **Gossip Dissemination:**
//! - Membership updates are piggybacked on every ping/ack
//! - Updates: `Alive`, `Suspect`, `Dead`, `Left`
//! - A node refutes suspicion about itself by raising its incarnation

pub mod failure;
pub mod membership;
pub mod messages;

pub use failure::{FailureDetectorConfig, SuspicionTracker};
pub use membership::{Member, MembershipList};
pub use messages::{GossipUpdate, PeerInfo, SwimMessage};
