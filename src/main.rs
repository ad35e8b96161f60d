use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use lan_sweep::neighbor::{EmptyNeighborSource, NeighborSource, SystemNeighborSource};
use lan_sweep::probe::IcmpProber;
use lan_sweep::resolve::{DnsResolver, NameResolver, NoopResolver};
use lan_sweep::scanner::{ScanOptions, Scanner};
use lan_sweep::types::Prefix;
use lan_sweep::{logging, netdetect, report};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

/// lan-sweep — find live hosts on a local /24 and show their names and MAC addresses.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "lan-sweep",
    version,
    about = "Find live hosts on a local /24 with ICMP echo, then resolve their names and MAC addresses.",
    long_about = None
)]
struct Cli {
    /// Network prefix to sweep (e.g. 192.168.1 or 192.168.1.0/24). If omitted, auto-detect the local /24.
    #[arg(long)]
    prefix: Option<String>,

    /// Per-probe echo timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 1000)]
    timeout_ms: u64,

    /// Max concurrent probes in flight.
    #[arg(long, default_value_t = 64)]
    concurrency: usize,

    /// Reverse DNS lookup timeout in milliseconds.
    #[arg(long = "dns-timeout-ms", default_value_t = 2000)]
    dns_timeout_ms: u64,

    /// Abort the whole scan after this many milliseconds and report what finished.
    #[arg(long = "deadline-ms")]
    deadline_ms: Option<u64>,

    /// Skip reverse DNS lookups.
    #[arg(long = "no-dns", default_value_t = false)]
    no_dns: bool,

    /// Skip the neighbor table (MAC) lookup.
    #[arg(long = "no-mac", default_value_t = false)]
    no_mac: bool,

    /// Write results as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Increase log verbosity on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let prefix: Prefix = match cli.prefix.as_deref() {
        Some(p) => p.parse()?,
        None => netdetect::default_prefix(),
    };
    let options = ScanOptions {
        concurrency: cli.concurrency,
        probe_timeout: Duration::from_millis(cli.timeout_ms),
        dns_timeout: Duration::from_millis(cli.dns_timeout_ms),
        deadline: cli.deadline_ms.map(Duration::from_millis),
    };

    let resolver: Arc<dyn NameResolver> = if cli.no_dns {
        Arc::new(NoopResolver)
    } else {
        Arc::new(DnsResolver::new(options.dns_timeout))
    };
    let neighbors: Arc<dyn NeighborSource> = if cli.no_mac {
        Arc::new(EmptyNeighborSource)
    } else {
        Arc::new(SystemNeighborSource::default())
    };
    let prober = Arc::new(IcmpProber::new()?);
    let scanner = Scanner::new(prober, resolver, neighbors, options)?;

    // Ctrl-C cancels the scan; whatever completed is still printed.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing with partial results");
            cancel_ctrlc.cancel();
        }
    });

    println!("Scanning {}.0/24...", prefix);
    let results = scanner
        .scan(prefix, cancel)
        .await
        .with_context(|| format!("scan of {prefix}.0/24 failed"))?;

    for host in &results.hosts {
        println!("{}", report::format_host_line(host));
    }
    println!("{}", report::format_summary(&results));

    if let Some(path) = cli.output.as_deref() {
        report::write_report_json(path, &results)?;
        println!("Wrote JSON results to {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["lan-sweep"]);
        assert_eq!(cli.prefix, None);
        assert_eq!(cli.timeout_ms, 1000);
        assert_eq!(cli.concurrency, 64);
        assert!(!cli.no_dns && !cli.no_mac);
    }

    #[test]
    fn cli_flags() {
        let cli = Cli::parse_from([
            "lan-sweep", "--prefix", "10.0.0", "--timeout-ms", "250", "--concurrency", "16", "-vv",
        ]);
        assert_eq!(cli.prefix.as_deref(), Some("10.0.0"));
        assert_eq!(cli.timeout_ms, 250);
        assert_eq!(cli.concurrency, 16);
        assert_eq!(cli.verbose, 2);
    }
}
