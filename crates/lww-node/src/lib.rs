//! lww-node library: the HTTP node around `lww-core`.
//!
//! This is a thin library layer over the binary's components,
//! allowing integration tests to start real nodes.

pub mod client;
pub mod config;
pub mod gossip;
pub mod http;
pub mod node;
pub mod swim;

// Re-export key types for convenience
pub use client::{HttpPushTransport, base_url, build_client};
pub use config::{Args, NodeConfig};
pub use gossip::SwimMembership;
pub use node::Node;
