//! Single-address reachability checks.

use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use async_trait::async_trait;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, SurgeError};
use tokio::time::Instant;

use crate::error::{ProbeError, ScanError};
use crate::types::ProbeResult;

const PAYLOAD: [u8; 56] = [0u8; 56];

/// Sends one echo probe and reports the outcome. Never fails: every problem
/// is folded into a `ProbeResult` with `reachable == false`.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, address: Ipv4Addr, timeout: Duration) -> ProbeResult;
}

/// ICMP echo prober backed by one shared `surge_ping` client.
///
/// Opening the socket may require raw-socket privileges (root, `CAP_NET_RAW`,
/// or a permissive `net.ipv4.ping_group_range` on Linux).
pub struct IcmpProber {
    client: Client,
}

impl IcmpProber {
    pub fn new() -> Result<Self, ScanError> {
        let client = Client::new(&Config::default()).map_err(ScanError::ProberUnavailable)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for IcmpProber {
    async fn probe(&self, address: Ipv4Addr, timeout: Duration) -> ProbeResult {
        let start = Instant::now();
        let mut pinger = self
            .client
            .pinger(IpAddr::V4(address), PingIdentifier(rand::random::<u16>()))
            .await;
        pinger.timeout(timeout);

        match pinger.ping(PingSequence(0), &PAYLOAD).await {
            Ok((_packet, rtt)) => ProbeResult::reachable(address, rtt),
            Err(e) => {
                let error = classify(e);
                tracing::debug!(%address, "probe failed: {error}");
                ProbeResult::unreachable(address, start.elapsed(), error)
            }
        }
    }
}

fn classify(err: SurgeError) -> ProbeError {
    match err {
        SurgeError::Timeout { .. } => ProbeError::TimedOut,
        SurgeError::IOError(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            ProbeError::PermissionDenied(e.to_string())
        }
        other => ProbeError::Transport(other.to_string()),
    }
}
