//! Outgoing HTTP requests to peers.

use async_trait::async_trait;
use lww_core::{PeerTarget, PushError, PushTransport, RegisterState};
use std::time::Duration;

/// Turn a member address into a base URL, adding `http://` when no scheme is given.
pub fn base_url(address: &str) -> String {
    let address = address.trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

/// Shared HTTP client for pushes and membership traffic.
pub fn build_client(connect_timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
}

/// Pushes register state to `POST /notify/{value}/{generation}?notifier={name}`.
#[derive(Debug, Clone)]
pub struct HttpPushTransport {
    client: reqwest::Client,
}

impl HttpPushTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn push(
        &self,
        target: &PeerTarget,
        state: RegisterState,
        notifier: &str,
    ) -> Result<(), PushError> {
        let url = format!(
            "{}/notify/{}/{}",
            base_url(&target.address),
            state.value,
            state.generation
        );

        let response = self
            .client
            .post(&url)
            .query(&[("notifier", notifier)])
            .send()
            .await
            .map_err(|e| PushError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(PushError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_adds_scheme() {
        assert_eq!(base_url("10.0.0.1:8080"), "http://10.0.0.1:8080");
    }

    #[test]
    fn test_base_url_keeps_scheme_and_strips_slash() {
        assert_eq!(base_url("https://node-a:8443/"), "https://node-a:8443");
        assert_eq!(base_url("http://node-b:80"), "http://node-b:80");
    }

    #[tokio::test]
    async fn test_push_to_unreachable_peer_is_network_error() {
        let transport = HttpPushTransport::new(build_client(Duration::from_millis(200)).unwrap());
        // Grab a free port, then close it again.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let target = PeerTarget {
            name: "nobody".into(),
            address: addr.to_string(),
        };

        let result = transport
            .push(&target, RegisterState { value: 1, generation: 1 }, "me")
            .await;
        assert!(matches!(result, Err(PushError::Network(_))));
    }
}
