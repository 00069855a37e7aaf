//! Diagnostics snapshot.

use crate::membership::{Member, MemberStatus, Membership};
use crate::register::Register;
use serde::Serialize;

/// Point-in-time view of a node for logs and the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub name: String,
    pub value: i64,
    pub generation: u64,
    pub members: Vec<Member>,
}

impl NodeStatus {
    pub fn capture(name: &str, register: &Register, membership: &dyn Membership) -> Self {
        let state = register.read();
        let mut members = membership.members();
        members.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            name: name.to_string(),
            value: state.value,
            generation: state.generation,
            members,
        }
    }

    /// Names of members currently reported alive.
    pub fn live_members(&self) -> Vec<&str> {
        self.members
            .iter()
            .filter(|m| m.status == MemberStatus::Alive)
            .map(|m| m.name.as_str())
            .collect()
    }
}
