//! Reverse-DNS name resolution.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use async_trait::async_trait;
use dns_lookup::lookup_addr;

/// Best-effort reverse lookup. Every failure is reported as `None`.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve(&self, address: Ipv4Addr) -> Option<String>;
}

/// System resolver (`getnameinfo`) run on the blocking pool with a timeout.
#[derive(Debug, Clone)]
pub struct DnsResolver {
    timeout: Duration,
}

impl DnsResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl NameResolver for DnsResolver {
    async fn resolve(&self, address: Ipv4Addr) -> Option<String> {
        let lookup = tokio::task::spawn_blocking(move || reverse_lookup(address));
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                tracing::warn!(%address, "reverse lookup worker failed: {e}");
                None
            }
            Err(_) => {
                tracing::debug!(%address, "reverse lookup timed out");
                None
            }
        }
    }
}

/// Resolver that never returns a name; used when DNS is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResolver;

#[async_trait]
impl NameResolver for NoopResolver {
    async fn resolve(&self, _address: Ipv4Addr) -> Option<String> {
        None
    }
}

fn reverse_lookup(ip: Ipv4Addr) -> Option<String> {
    let name = lookup_addr(&IpAddr::V4(ip)).ok()?;
    accept_name(ip, name)
}

// getnameinfo echoes the numeric address back when there is no PTR record
fn accept_name(ip: Ipv4Addr, name: String) -> Option<String> {
    if name.is_empty() || name == ip.to_string() {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_resolver_is_always_absent() {
        assert_eq!(NoopResolver.resolve(Ipv4Addr::new(10, 0, 0, 1)).await, None);
    }

    #[test]
    fn echoed_address_is_absent() {
        let ip = Ipv4Addr::new(192, 168, 1, 10);
        assert_eq!(accept_name(ip, "192.168.1.10".into()), None);
        assert_eq!(accept_name(ip, String::new()), None);
        assert_eq!(accept_name(ip, "nas.lan".into()).as_deref(), Some("nas.lan"));
    }

    #[tokio::test]
    #[ignore = "uses the host's system resolver"]
    async fn lookup_never_echoes_the_address() {
        // TEST-NET-1 has no PTR records; the outcome must be absence, not the literal IP
        let ip = Ipv4Addr::new(192, 0, 2, 1);
        let name = DnsResolver::new(Duration::from_secs(2)).resolve(ip).await;
        assert_ne!(name.as_deref(), Some("192.0.2.1"));
    }
}
