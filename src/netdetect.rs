use anyhow::Result;
use if_addrs::{get_if_addrs, IfAddr};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use crate::types::Prefix;

/// Prefix used when no local IPv4 interface can be found.
pub const FALLBACK_PREFIX: Prefix = Prefix::new(192, 168, 1);

/// Detect local non-loopback IPv4 addresses and reduce each to its /24 prefix.
///
/// For example, an interface IP `192.168.1.42` becomes `192.168.1`.
/// Duplicates are removed and the result is sorted.
pub fn detect_local_prefixes() -> Result<Vec<Prefix>> {
    let mut set = BTreeSet::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            if is_scannable_local(v4.ip) {
                set.insert(Prefix::from(v4.ip));
            }
        }
    }
    Ok(set.into_iter().collect())
}

/// Pick the prefix to scan when none was given on the command line.
pub fn default_prefix() -> Prefix {
    match detect_local_prefixes() {
        Ok(prefixes) => prefixes.into_iter().next().unwrap_or(FALLBACK_PREFIX),
        Err(e) => {
            tracing::warn!("failed to detect local networks: {e}");
            FALLBACK_PREFIX
        }
    }
}

fn is_scannable_local(ip: Ipv4Addr) -> bool {
    !(ip.is_loopback() || ip.is_link_local() || ip.is_unspecified())
}
