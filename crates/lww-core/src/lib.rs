//! lww-core: a last-write-wins replicated register.
//!
//! This crate provides:
//! - `Register`: value + generation behind a single lock
//! - `reconcile`: the strict-newer adoption rule
//! - `Membership` / `MembershipView`: the boundary to an external membership system
//! - `Broadcaster`: deadline-bound concurrent fan-out over a `PushTransport`
//! - `InboundHandler`: applying pushes received from peers
//! - `NodeLoop`: the broadcast and status schedules

pub mod broadcast;
pub mod inbound;
pub mod membership;
pub mod node_loop;
pub mod reconcile;
pub mod register;
pub mod status;

pub use broadcast::{BroadcastReport, Broadcaster, PushError, PushFailure, PushTransport};
pub use inbound::{InboundError, InboundHandler, parse_generation, parse_value};
pub use membership::{Member, MemberStatus, Membership, MembershipError, MembershipView, PeerTarget};
pub use node_loop::{LoopConfig, NodeLoop};
pub use reconcile::reconcile;
pub use register::{Register, RegisterState};
pub use status::NodeStatus;
