use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;

use crate::types::{HostRecord, ScanReport};

/// Marker printed in place of a MAC that could not be resolved.
pub const ABSENT_MARKER: &str = "<absent>";

/// One console line per host, e.g.
/// `10.0.0.5 (printer) is online. (3 ms) MAC: <absent>`.
pub fn format_host_line(host: &HostRecord) -> String {
    let name = host
        .hostname
        .as_deref()
        .map(|h| format!(" ({h})"))
        .unwrap_or_default();
    format!(
        "{}{} is online. ({} ms) MAC: {}",
        host.address,
        name,
        host.latency.as_millis(),
        host.mac_address.as_deref().unwrap_or(ABSENT_MARKER)
    )
}

/// Closing summary line for the console.
pub fn format_summary(report: &ScanReport) -> String {
    let mut line = format!(
        "{} host(s) online in {}.0/24 ({} of {} addresses probed)",
        report.hosts.len(),
        report.prefix,
        report.probed,
        report.scanned_total
    );
    if report.cancelled {
        line.push_str(", scan cancelled early");
    }
    line
}

pub fn write_report_json(path: &Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)
        .with_context(|| format!("failed to write JSON to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Prefix;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn host(h: u8, hostname: Option<&str>, mac: Option<&str>) -> HostRecord {
        HostRecord {
            address: Ipv4Addr::new(10, 0, 0, h),
            latency: Duration::from_millis(3),
            hostname: hostname.map(String::from),
            mac_address: mac.map(String::from),
        }
    }

    #[test]
    fn line_with_hostname_and_no_mac() {
        assert_eq!(
            format_host_line(&host(5, Some("printer"), None)),
            "10.0.0.5 (printer) is online. (3 ms) MAC: <absent>"
        );
    }

    #[test]
    fn line_without_hostname() {
        assert_eq!(
            format_host_line(&host(7, None, Some("AA:BB:CC:DD:EE:FF"))),
            "10.0.0.7 is online. (3 ms) MAC: AA:BB:CC:DD:EE:FF"
        );
    }

    #[test]
    fn summary_mentions_cancellation() {
        let report = ScanReport {
            prefix: Prefix::new(10, 0, 0),
            started_at: "2024-01-01T00:00:00Z".into(),
            scanned_total: 254,
            probed: 100,
            cancelled: true,
            hosts: vec![host(5, None, None)],
        };
        let s = format_summary(&report);
        assert!(s.starts_with("1 host(s) online in 10.0.0.0/24 (100 of 254"));
        assert!(s.ends_with("cancelled early"));
    }

    #[test]
    fn writes_pretty_json() {
        let path = std::env::temp_dir().join(format!("lan-sweep-report-{}.json", std::process::id()));
        let report = ScanReport {
            prefix: Prefix::new(10, 0, 0),
            started_at: "2024-01-01T00:00:00Z".into(),
            scanned_total: 254,
            probed: 254,
            cancelled: false,
            hosts: vec![host(7, None, Some("AA:BB:CC:DD:EE:FF"))],
        };
        write_report_json(&path, &report).unwrap();
        let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(v["prefix"], "10.0.0");
        assert_eq!(v["hosts"][0]["mac_address"], "AA:BB:CC:DD:EE:FF");
    }
}
