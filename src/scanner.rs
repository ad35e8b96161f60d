use crate::error::{ProbeError, ScanError};
use crate::neighbor::{NeighborSource, NeighborTable};
use crate::probe::Prober;
use crate::resolve::NameResolver;
use crate::types::{HostRecord, Prefix, ProbeResult, ScanReport};
use ::time::{format_description::well_known, OffsetDateTime};
use std::collections::BTreeMap;
use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CONCURRENCY: usize = 64;
pub const MAX_CONCURRENCY: usize = 1024;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_DNS_TIMEOUT: Duration = Duration::from_millis(2000);

/// Extra time a prober gets past its own timeout before the scanner gives up on it.
const PROBE_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Max simultaneously in-flight probes (and reverse lookups).
    pub concurrency: usize,
    pub probe_timeout: Duration,
    pub dns_timeout: Duration,
    /// Global wall-clock budget for the whole scan.
    pub deadline: Option<Duration>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            dns_timeout: DEFAULT_DNS_TIMEOUT,
            deadline: None,
        }
    }
}

impl ScanOptions {
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.concurrency == 0 {
            return Err(ScanError::InvalidOption("concurrency must be at least 1".into()));
        }
        if self.probe_timeout.is_zero() {
            return Err(ScanError::InvalidOption("probe timeout must be non-zero".into()));
        }
        if self.dns_timeout.is_zero() {
            return Err(ScanError::InvalidOption("DNS timeout must be non-zero".into()));
        }
        if self.deadline.is_some_and(|d| d.is_zero()) {
            return Err(ScanError::InvalidOption("deadline must be non-zero".into()));
        }
        Ok(())
    }

    fn permits(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

/// Outcome of the probe phase: one result per completed address, sorted by address.
#[derive(Debug, Clone, Default)]
pub struct ProbePhase {
    pub results: Vec<ProbeResult>,
    pub cancelled: bool,
}

impl ProbePhase {
    pub fn reachable(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|r| r.reachable)
    }
}

/// Probes every host of a /24 and enriches the live ones with a name and a MAC.
pub struct Scanner {
    prober: Arc<dyn Prober>,
    resolver: Arc<dyn NameResolver>,
    neighbors: Arc<dyn NeighborSource>,
    options: ScanOptions,
}

impl Scanner {
    pub fn new(
        prober: Arc<dyn Prober>,
        resolver: Arc<dyn NameResolver>,
        neighbors: Arc<dyn NeighborSource>,
        options: ScanOptions,
    ) -> Result<Self, ScanError> {
        options.validate()?;
        Ok(Self { prober, resolver, neighbors, options })
    }

    /// Scan `prefix.1` through `prefix.254`.
    ///
    /// Runs in two phases: probe everything (bounded fan-out), then enrich the
    /// reachable hosts. Cancelling `cancel`, or hitting the configured deadline,
    /// stops the scan early; only hosts whose probe completed are reported.
    pub async fn scan(&self, prefix: Prefix, cancel: CancellationToken) -> Result<ScanReport, ScanError> {
        let started_at = now_iso_like();
        let targets = prefix.hosts();

        // The deadline is folded into a child token so both phases observe one signal.
        let cancel = cancel.child_token();
        // Stops the deadline watcher however this function returns.
        let _stop_watcher = cancel.clone().drop_guard();
        if let Some(deadline) = self.options.deadline {
            let deadline_cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = time::sleep(deadline) => {
                        tracing::info!("scan deadline of {} ms reached", deadline.as_millis());
                        deadline_cancel.cancel();
                    }
                    _ = deadline_cancel.cancelled() => {}
                }
            });
        }

        tracing::info!(
            %prefix,
            targets = targets.len(),
            concurrency = self.options.permits(),
            timeout_ms = self.options.probe_timeout.as_millis() as u64,
            "probing"
        );
        let phase = self.probe_all(&targets, cancel.clone()).await;
        check_probe_capacity(&phase)?;

        let reachable: Vec<ProbeResult> = phase.reachable().cloned().collect();
        tracing::info!(
            probed = phase.results.len(),
            reachable = reachable.len(),
            cancelled = phase.cancelled,
            "probe phase complete"
        );

        let (hosts, enrich_cancelled) = self.enrich(reachable, &cancel).await;

        Ok(ScanReport {
            prefix,
            started_at,
            scanned_total: targets.len() as u64,
            probed: phase.results.len() as u64,
            cancelled: phase.cancelled || enrich_cancelled,
            hosts,
        })
    }

    /// Probe `targets` concurrently. At most one result per address is kept;
    /// tasks still running at cancellation are aborted and left out.
    pub async fn probe_all(&self, targets: &[Ipv4Addr], cancel: CancellationToken) -> ProbePhase {
        let sem = Arc::new(Semaphore::new(self.options.permits()));
        let timeout = self.options.probe_timeout;
        let mut set = JoinSet::new();
        let mut results: BTreeMap<Ipv4Addr, ProbeResult> = BTreeMap::new();
        let mut cancelled = false;

        for &address in targets {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => { cancelled = true; break; }
                permit = sem.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };
            let prober = self.prober.clone();
            set.spawn(async move {
                let _permit = permit;
                guarded_probe(prober.as_ref(), address, timeout).await
            });
            // Drain finished tasks as we go so the set stays small.
            while let Some(done) = set.try_join_next() {
                merge(&mut results, done);
            }
        }

        while !cancelled {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => cancelled = true,
                next = set.join_next() => match next {
                    Some(done) => merge(&mut results, done),
                    None => break,
                },
            }
        }

        if cancelled {
            set.abort_all();
            // Aborted tasks surface as JoinErrors; anything that finished in the meantime is kept.
            while let Some(done) = set.join_next().await {
                merge(&mut results, done);
            }
        }

        ProbePhase { results: results.into_values().collect(), cancelled }
    }

    /// Attach hostname and MAC to each reachable result. Returns the sorted
    /// records and whether cancellation cut the enrichment short.
    async fn enrich(&self, reachable: Vec<ProbeResult>, cancel: &CancellationToken) -> (Vec<HostRecord>, bool) {
        if reachable.is_empty() {
            return (Vec::new(), cancel.is_cancelled());
        }

        let table = if cancel.is_cancelled() {
            NeighborTable::default()
        } else {
            match until_cancelled(cancel, self.neighbors.snapshot()).await {
                Some(Ok(table)) => {
                    tracing::debug!(entries = table.len(), "neighbor table snapshot");
                    table
                }
                Some(Err(e)) => {
                    tracing::warn!("neighbor table unavailable, MAC addresses will be absent: {e}");
                    NeighborTable::default()
                }
                None => NeighborTable::default(),
            }
        };

        let mut hostnames: BTreeMap<Ipv4Addr, String> = BTreeMap::new();
        let mut cancelled = cancel.is_cancelled();
        if !cancelled {
            cancelled = self.resolve_names(&reachable, cancel, &mut hostnames).await;
        }

        let mut hosts: Vec<HostRecord> = reachable
            .into_iter()
            .map(|r| HostRecord {
                address: r.address,
                latency: r.latency,
                hostname: hostnames.remove(&r.address),
                mac_address: table.lookup(r.address).map(str::to_string),
            })
            .collect();
        hosts.sort_by_key(|h| h.address);
        (hosts, cancelled)
    }

    async fn resolve_names(
        &self,
        reachable: &[ProbeResult],
        cancel: &CancellationToken,
        hostnames: &mut BTreeMap<Ipv4Addr, String>,
    ) -> bool {
        let sem = Arc::new(Semaphore::new(self.options.permits()));
        let mut set = JoinSet::new();
        for r in reachable {
            let address = r.address;
            let resolver = self.resolver.clone();
            let sem = sem.clone();
            set.spawn(async move {
                let _permit = sem.acquire_owned().await.ok()?;
                resolver.resolve(address).await.map(|name| (address, name))
            });
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    set.abort_all();
                    return true;
                }
                next = set.join_next() => match next {
                    Some(Ok(Some((address, name)))) => {
                        hostnames.insert(address, name);
                    }
                    Some(Ok(None)) => {}
                    Some(Err(e)) => tracing::warn!("reverse lookup task failed: {e}"),
                    None => return false,
                },
            }
        }
    }
}

/// Run one probe, bounded even if the prober ignores its timeout.
async fn guarded_probe(prober: &dyn Prober, address: Ipv4Addr, timeout: Duration) -> ProbeResult {
    let start = Instant::now();
    match time::timeout(timeout + PROBE_GRACE, prober.probe(address, timeout)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!(%address, "probe exceeded {} ms", timeout.as_millis());
            ProbeResult::unreachable(address, start.elapsed(), ProbeError::TimedOut)
        }
    }
}

fn merge(results: &mut BTreeMap<Ipv4Addr, ProbeResult>, done: Result<ProbeResult, tokio::task::JoinError>) {
    match done {
        Ok(result) => {
            if results.contains_key(&result.address) {
                tracing::warn!(address = %result.address, "duplicate probe result ignored");
            } else {
                results.insert(result.address, result);
            }
        }
        Err(e) if e.is_cancelled() => {}
        Err(e) => tracing::warn!("probe task failed: {e}"),
    }
}

/// Fails when the probe phase ran to completion but not a single probe could
/// actually be sent. A cancelled phase always reports its partial results.
fn check_probe_capacity(phase: &ProbePhase) -> Result<(), ScanError> {
    if phase.cancelled {
        return Ok(());
    }
    let denied = |r: &ProbeResult| matches!(r.error, Some(ProbeError::PermissionDenied(_)));
    match phase.results.first() {
        Some(first) if phase.results.iter().all(denied) => {
            let cause = first.error.as_ref().map(ToString::to_string).unwrap_or_default();
            Err(ScanError::NoProbeCapacity(cause))
        }
        _ => Ok(()),
    }
}

async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

fn now_iso_like() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
