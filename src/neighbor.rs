//! IP to MAC lookups against the operating system's neighbor (ARP) cache.
//!
//! The OS only holds entries for hosts it has exchanged traffic with recently.
//! The scanner therefore takes its single snapshot *after* all probes have
//! completed, which gives the echo traffic a chance to populate the cache. A
//! host whose entry has not appeared by then (or has already been evicted) is
//! reported without a MAC; nothing retries.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::NeighborError;

/// One IP to MAC mapping from a neighbor table snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborEntry {
    pub address: Ipv4Addr,
    pub mac_address: String,
}

/// Parsed, in-memory snapshot of the neighbor table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborTable {
    entries: Vec<NeighborEntry>,
}

impl NeighborTable {
    pub fn new(entries: Vec<NeighborEntry>) -> Self {
        Self { entries }
    }

    /// Parse textual neighbor table output. Understands BSD/macOS/Linux
    /// `arp -a`, Windows `arp -a`, `ip neigh` and `/proc/net/arp`. Lines
    /// without both an address and a complete MAC are skipped.
    pub fn parse(output: &str) -> Self {
        let entries = output.lines().filter_map(parse_line).collect();
        Self { entries }
    }

    /// MAC of the first entry for `address`, if any.
    pub fn lookup(&self, address: Ipv4Addr) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.address == address)
            .map(|e| e.mac_address.as_str())
    }

    pub fn entries(&self) -> &[NeighborEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Produces a neighbor table snapshot. Called at most once per scan.
#[async_trait]
pub trait NeighborSource: Send + Sync {
    async fn snapshot(&self) -> Result<NeighborTable, NeighborError>;
}

/// Reads the system ARP cache by running the platform `arp` tool. If the
/// command fails and a fallback file is set (`/proc/net/arp` on Linux), that
/// file is parsed instead.
#[derive(Debug, Clone)]
pub struct SystemNeighborSource {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    fallback: Option<PathBuf>,
}

#[cfg(target_os = "linux")]
const PROC_NET_ARP: &str = "/proc/net/arp";

fn default_fallback() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Some(PathBuf::from(PROC_NET_ARP))
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

impl SystemNeighborSource {
    pub fn new(timeout: Duration) -> Self {
        #[cfg(windows)]
        let args = vec!["-a".to_string()];
        #[cfg(not(windows))]
        let args = vec!["-an".to_string()];

        Self { program: "arp".to_string(), args, timeout, fallback: default_fallback() }
    }

    /// Use a different command, e.g. `ip neigh show`.
    pub fn with_command(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self { program: program.into(), args, timeout, fallback: default_fallback() }
    }

    /// Replace (or with `None`, disable) the file read when the command fails.
    pub fn with_fallback(mut self, path: Option<PathBuf>) -> Self {
        self.fallback = path;
        self
    }

    async fn run_command(&self) -> Result<String, NeighborError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(res) => res.map_err(|source| NeighborError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(NeighborError::TimedOut {
                    program: self.program.clone(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        };

        if !output.status.success() {
            return Err(NeighborError::Failed {
                program: self.program.clone(),
                status: output.status,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for SystemNeighborSource {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl NeighborSource for SystemNeighborSource {
    async fn snapshot(&self) -> Result<NeighborTable, NeighborError> {
        match (self.run_command().await, &self.fallback) {
            (Ok(text), _) => Ok(NeighborTable::parse(&text)),
            (Err(e), Some(path)) => {
                tracing::debug!("{e}; falling back to {}", path.display());
                read_table_file(path).await
            }
            (Err(e), None) => Err(e),
        }
    }
}

async fn read_table_file(path: &Path) -> Result<NeighborTable, NeighborError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| NeighborError::Read { path: path.display().to_string(), source })?;
    Ok(NeighborTable::parse(&text))
}

/// Source that never knows any MAC; used when MAC lookup is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyNeighborSource;

#[async_trait]
impl NeighborSource for EmptyNeighborSource {
    async fn snapshot(&self) -> Result<NeighborTable, NeighborError> {
        Ok(NeighborTable::default())
    }
}

fn parse_line(line: &str) -> Option<NeighborEntry> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    // Whole-token match so that 10.0.0.1 never picks up a 10.0.0.12 line.
    let address = tokens
        .iter()
        .find_map(|t| t.trim_matches(|c| c == '(' || c == ')').parse::<Ipv4Addr>().ok())?;

    let marked = tokens
        .windows(2)
        .find(|w| w[0] == "at" || w[0] == "lladdr")
        .map(|w| w[1]);

    let mac = match marked {
        Some(token) => normalize_mac(token)?,
        None => tokens.iter().find_map(|t| normalize_mac(t))?,
    };

    if mac == "00:00:00:00:00:00" {
        return None;
    }
    Some(NeighborEntry { address, mac_address: mac })
}

/// Normalise `0:1a:2b:3c:4d:5e` or `00-1A-2B-3C-4D-5E` to `00:1A:2B:3C:4D:5E`.
/// Returns `None` for anything that is not six hex octets.
pub fn normalize_mac(token: &str) -> Option<String> {
    let sep = if token.contains(':') { ':' } else { '-' };
    let groups: Vec<&str> = token.split(sep).collect();
    if groups.len() != 6 {
        return None;
    }

    let mut octets = Vec::with_capacity(6);
    for g in groups {
        if g.is_empty() || g.len() > 2 || !g.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        octets.push(format!("{:0>2}", g.to_ascii_uppercase()));
    }
    Some(octets.join(":"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_mac_forms() {
        assert_eq!(normalize_mac("0:1a:2b:3c:4d:5e").as_deref(), Some("00:1A:2B:3C:4D:5E"));
        assert_eq!(normalize_mac("aa-bb-cc-dd-ee-ff").as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(normalize_mac("(incomplete)"), None);
        assert_eq!(normalize_mac("aa:bb:cc:dd:ee"), None);
        assert_eq!(normalize_mac("aa:bb:cc:dd:ee:fg"), None);
    }

    #[test]
    fn parses_bsd_line() {
        let e = parse_line("? (192.168.1.1) at 0:11:22:33:44:55 on en0 ifscope [ethernet]").unwrap();
        assert_eq!(e.address, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(e.mac_address, "00:11:22:33:44:55");
    }

    #[test]
    fn incomplete_entry_is_skipped() {
        assert_eq!(parse_line("? (192.168.1.9) at <incomplete> on eth0"), None);
        assert_eq!(parse_line("? (192.168.1.9) at (incomplete) on en0 ifscope [ethernet]"), None);
    }

    #[test]
    fn headers_are_skipped() {
        assert_eq!(parse_line("Interface: 192.168.1.20 --- 0x4"), None);
        assert_eq!(parse_line("  Internet Address      Physical Address      Type"), None);
    }

    #[test]
    fn lookup_is_exact() {
        let table = NeighborTable::parse("? (10.0.0.12) at aa:aa:aa:aa:aa:aa on eth0\n");
        assert_eq!(table.lookup(Ipv4Addr::new(10, 0, 0, 1)), None);
        assert_eq!(table.lookup(Ipv4Addr::new(10, 0, 0, 12)), Some("AA:AA:AA:AA:AA:AA"));
    }
}
