//! SWIM protocol message types.
//!
//! Sent as JSON bodies on `POST /swim`. Every message piggybacks gossip.

use lww_core::MemberStatus;
use serde::{Deserialize, Serialize};

/// Identity and endpoint of a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PeerInfo {
    pub name: String,
    /// Address the node serves HTTP on (host:port)
    pub address: String,
}

impl PeerInfo {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SwimMessage {
    /// Probe or join request. The sender's own info is always included.
    Ping {
        from: PeerInfo,
        incarnation: u64,
        gossip: Vec<GossipUpdate>,
    },

    /// Reply to a ping.
    Ack {
        from: PeerInfo,
        incarnation: u64,
        gossip: Vec<GossipUpdate>,
    },
}

impl SwimMessage {
    pub fn gossip(&self) -> &[GossipUpdate] {
        match self {
            SwimMessage::Ping { gossip, .. } | SwimMessage::Ack { gossip, .. } => gossip,
        }
    }

    pub fn sender(&self) -> (&PeerInfo, u64) {
        match self {
            SwimMessage::Ping {
                from, incarnation, ..
            }
            | SwimMessage::Ack {
                from, incarnation, ..
            } => (from, *incarnation),
        }
    }
}

/// Membership change piggybacked on pings and acks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GossipUpdate {
    Alive { peer: PeerInfo, incarnation: u64 },
    Suspect { name: String, incarnation: u64 },
    Dead { name: String, incarnation: u64 },
    Left { name: String, incarnation: u64 },
}

impl GossipUpdate {
    pub fn alive(peer: PeerInfo, incarnation: u64) -> Self {
        GossipUpdate::Alive { peer, incarnation }
    }

    pub fn suspect(name: impl Into<String>, incarnation: u64) -> Self {
        GossipUpdate::Suspect {
            name: name.into(),
            incarnation,
        }
    }

    pub fn dead(name: impl Into<String>, incarnation: u64) -> Self {
        GossipUpdate::Dead {
            name: name.into(),
            incarnation,
        }
    }

    pub fn left(name: impl Into<String>, incarnation: u64) -> Self {
        GossipUpdate::Left {
            name: name.into(),
            incarnation,
        }
    }

    /// Name of the member this update is about.
    pub fn subject(&self) -> &str {
        match self {
            GossipUpdate::Alive { peer, .. } => &peer.name,
            GossipUpdate::Suspect { name, .. }
            | GossipUpdate::Dead { name, .. }
            | GossipUpdate::Left { name, .. } => name,
        }
    }

    /// Status this update asserts.
    pub fn status(&self) -> MemberStatus {
        match self {
            GossipUpdate::Alive { .. } => MemberStatus::Alive,
            GossipUpdate::Suspect { .. } => MemberStatus::Suspect,
            GossipUpdate::Dead { .. } => MemberStatus::Dead,
            GossipUpdate::Left { .. } => MemberStatus::Left,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_json_shape() {
        let msg = SwimMessage::Ping {
            from: PeerInfo::new("a", "127.0.0.1:8080"),
            incarnation: 1,
            gossip: vec![GossipUpdate::suspect("b", 2)],
        };

        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "ping");
        assert_eq!(json["from"]["name"], "a");
        assert_eq!(json["gossip"][0]["kind"], "suspect");
        assert_eq!(json["gossip"][0]["name"], "b");

        let parsed: SwimMessage = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_subject_and_status() {
        let alive = GossipUpdate::alive(PeerInfo::new("a", "x:1"), 1);
        assert_eq!(alive.subject(), "a");
        assert_eq!(alive.status(), MemberStatus::Alive);
        assert_eq!(GossipUpdate::left("c", 3).status(), MemberStatus::Left);
    }

    #[test]
    fn test_unknown_message_rejected() {
        let json = r#"{"type": "shout", "from": {"name": "a", "address": "x"}}"#;
        assert!(serde_json::from_str::<SwimMessage>(json).is_err());
    }
}
