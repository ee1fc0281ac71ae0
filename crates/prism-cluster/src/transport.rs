//! Peer transport
//!
//! The request/response seam between nodes. Election, discovery, failure
//! detection, and coordination all talk to peers through [`PeerTransport`],
//! so they can be exercised against mock peers; the daemon wires in the
//! reqwest-backed [`HttpTransport`]. Every call is a bounded-timeout
//! round-trip: a hung peer never stalls the caller past its timeout, and
//! any non-success status or transport error reads as "peer unreachable".

use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::protocol::{ColorAssignment, NodeDetails, RegisterRequest, RegisterResponse};
use crate::state::Color;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::net::Ipv4Addr;
use std::time::Duration;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// `POST /greetings` — discovery probe; the probed node records the
    /// caller as a peer and reports its own details.
    async fn greet(&self, peer: Ipv4Addr) -> Result<NodeDetails>;

    /// `GET /health-check` — master liveness probe.
    async fn health_check(&self, peer: Ipv4Addr) -> Result<()>;

    /// `POST /election` — an affirmative reply means the peer outranks the
    /// caller and takes the election over.
    async fn send_election(&self, peer: Ipv4Addr) -> Result<()>;

    /// `POST /master-announcement` — tell a peer this node is the master.
    async fn announce_master(&self, peer: Ipv4Addr) -> Result<()>;

    /// `POST /color` — push a worker its assigned color.
    async fn push_color(&self, peer: Ipv4Addr, color: Color) -> Result<()>;

    /// `POST /worker_register` — register with a master and receive a
    /// color.
    async fn register_worker(
        &self,
        master: Ipv4Addr,
        request: RegisterRequest,
    ) -> Result<RegisterResponse>;
}

/// HTTP transport used by the daemon.
pub struct HttpTransport {
    client: reqwest::Client,
    port: u16,
    election_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &ClusterConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()?;

        Ok(Self {
            client,
            port: config.port,
            election_timeout: config.election_timeout,
        })
    }

    fn url(&self, peer: Ipv4Addr, path: &str) -> String {
        format!("http://{}:{}{}", peer, self.port, path)
    }
}

fn ack(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ClusterError::network(format!(
            "{} from {}",
            status,
            response.url()
        )))
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn greet(&self, peer: Ipv4Addr) -> Result<NodeDetails> {
        let response = self
            .client
            .post(self.url(peer, "/greetings"))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn health_check(&self, peer: Ipv4Addr) -> Result<()> {
        ack(self
            .client
            .get(self.url(peer, "/health-check"))
            .send()
            .await?)
    }

    async fn send_election(&self, peer: Ipv4Addr) -> Result<()> {
        ack(self
            .client
            .post(self.url(peer, "/election"))
            .timeout(self.election_timeout)
            .send()
            .await?)
    }

    async fn announce_master(&self, peer: Ipv4Addr) -> Result<()> {
        ack(self
            .client
            .post(self.url(peer, "/master-announcement"))
            .send()
            .await?)
    }

    async fn push_color(&self, peer: Ipv4Addr, color: Color) -> Result<()> {
        ack(self
            .client
            .post(self.url(peer, "/color"))
            .json(&ColorAssignment { color })
            .send()
            .await?)
    }

    async fn register_worker(
        &self,
        master: Ipv4Addr,
        request: RegisterRequest,
    ) -> Result<RegisterResponse> {
        let response = self
            .client
            .post(self.url(master, "/worker_register"))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}
