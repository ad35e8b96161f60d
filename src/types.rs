use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use ipnet::Ipv4Net;
use serde::{Serialize, Serializer};

use crate::error::{ProbeError, ScanError};

/// The first three octets of a /24 network, e.g. `192.168.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Prefix([u8; 3]);

impl Prefix {
    pub const fn new(a: u8, b: u8, c: u8) -> Self {
        Self([a, b, c])
    }

    pub fn addr(&self, host: u8) -> Ipv4Addr {
        let [a, b, c] = self.0;
        Ipv4Addr::new(a, b, c, host)
    }

    /// Usable host addresses `.1` through `.254`. The network (`.0`) and
    /// broadcast (`.255`) addresses are never probed.
    pub fn hosts(&self) -> Vec<Ipv4Addr> {
        (1..=254u8).map(|h| self.addr(h)).collect()
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let o = addr.octets();
        [o[0], o[1], o[2]] == self.0
    }
}

impl From<Ipv4Addr> for Prefix {
    fn from(ip: Ipv4Addr) -> Self {
        let o = ip.octets();
        Self([o[0], o[1], o[2]])
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a}.{b}.{c}")
    }
}

impl FromStr for Prefix {
    type Err = ScanError;

    /// Accepts `a.b.c` or a `/24` CIDR such as `a.b.c.0/24`. Octets with
    /// leading zeros and CIDRs with host bits set are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ScanError::InvalidPrefix(s.to_string());

        if s.contains('/') {
            let net: Ipv4Net = s.parse().map_err(|_| invalid())?;
            if net.prefix_len() != 24 || net.addr() != net.network() {
                return Err(invalid());
            }
            return Ok(Self::from(net.network()));
        }

        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }
        let mut octets = [0u8; 3];
        for (slot, part) in octets.iter_mut().zip(parts) {
            let leading_zero = part.len() > 1 && part.starts_with('0');
            if part.is_empty() || leading_zero || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = part.parse().map_err(|_| invalid())?;
        }
        Ok(Self(octets))
    }
}

impl Serialize for Prefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of one echo probe. Exactly one is produced per probed address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub address: Ipv4Addr,
    pub reachable: bool,
    pub latency: Duration,
    pub error: Option<ProbeError>,
}

impl ProbeResult {
    pub fn reachable(address: Ipv4Addr, latency: Duration) -> Self {
        Self { address, reachable: true, latency, error: None }
    }

    pub fn unreachable(address: Ipv4Addr, elapsed: Duration, error: ProbeError) -> Self {
        Self { address, reachable: false, latency: elapsed, error: Some(error) }
    }
}

/// One live host after enrichment.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    pub address: Ipv4Addr,
    #[serde(rename = "latency_ms", serialize_with = "serialize_millis")]
    pub latency: Duration,
    pub hostname: Option<String>,
    pub mac_address: Option<String>,
}

/// Aggregate outcome of a scan.
#[derive(Serialize, Debug, Clone)]
pub struct ScanReport {
    pub prefix: Prefix,
    pub started_at: String,
    pub scanned_total: u64,
    pub probed: u64,
    pub cancelled: bool,
    pub hosts: Vec<HostRecord>,
}

fn serialize_millis<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_three_octets() {
        let p: Prefix = "10.0.0".parse().unwrap();
        assert_eq!(p, Prefix::new(10, 0, 0));
        assert_eq!(p.to_string(), "10.0.0");
        // a lone zero octet is not a leading zero
        assert_eq!("0.0.0".parse::<Prefix>().unwrap(), Prefix::new(0, 0, 0));
    }

    #[test]
    fn parse_cidr_24() {
        let p: Prefix = "192.168.7.0/24".parse().unwrap();
        assert_eq!(p, Prefix::new(192, 168, 7));
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "10.0", "10.0.0.1", "10.0.256", "a.b.c", "10..0", "10.0.0.0/16", "+1.2.3",
            "010.0.0", "10.00.0", "10.0.0.5/24"] {
            assert!(bad.parse::<Prefix>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn hosts_skip_network_and_broadcast() {
        let hosts = Prefix::new(10, 0, 0).hosts();
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts[0], Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(hosts[253], Ipv4Addr::new(10, 0, 0, 254));
    }

    #[test]
    fn host_record_serializes_latency_in_ms() {
        let rec = HostRecord {
            address: Ipv4Addr::new(10, 0, 0, 5),
            latency: Duration::from_micros(3_700),
            hostname: Some("printer".into()),
            mac_address: None,
        };
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["address"], "10.0.0.5");
        assert_eq!(v["latency_ms"], 3);
        assert_eq!(v["hostname"], "printer");
        assert!(v["mac_address"].is_null());
    }
}
