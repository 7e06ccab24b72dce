//! Peer exchange transport.
//!
//! The wire is `POST http://{peer}/api/v1/mesh/sync/exchange` with a
//! `SyncExchange` JSON body in both directions. The trait seam lets tests
//! wire two engines back to back without a network.

use crate::discovery::PeerAddr;
use crate::errors::{CoreError, CoreResult};
use crate::models::SyncExchange;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn exchange(&self, peer: &PeerAddr, request: &SyncExchange) -> CoreResult<SyncExchange>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// `timeout` is the total budget for one exchange (default 30 s).
    pub fn new(timeout: Duration) -> CoreResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpTransport { client })
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn exchange(&self, peer: &PeerAddr, request: &SyncExchange) -> CoreResult<SyncExchange> {
        let url = format!(
            "http://{}:{}/api/v1/mesh/sync/exchange",
            peer.host, peer.port
        );
        let response = self.client.post(&url).json(request).send().await?;
        if !response.status().is_success() {
            return Err(CoreError::PeerUnreachable(format!(
                "sync exchange with {} failed: HTTP {}",
                peer.peer_id,
                response.status()
            )));
        }
        Ok(response.json::<SyncExchange>().await?)
    }
}
