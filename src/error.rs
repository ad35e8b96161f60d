use thiserror::Error;

/// Failures that abort a whole scan. Per-address problems never end up here.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid network prefix `{0}`: expected three dotted octets such as 192.168.1 or a /24 CIDR")]
    InvalidPrefix(String),

    #[error("invalid scan option: {0}")]
    InvalidOption(String),

    #[error("unable to open an ICMP socket (raw socket privileges may be required): {0}")]
    ProberUnavailable(#[source] std::io::Error),

    #[error("no probe could be sent: {0}")]
    NoProbeCapacity(String),
}

/// Why a single probe did not report the host as reachable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("timed out waiting for echo reply")]
    TimedOut,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure to obtain a neighbor table snapshot.
#[derive(Debug, Error)]
pub enum NeighborError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}")]
    Failed { program: String, status: std::process::ExitStatus },

    #[error("`{program}` did not finish within {timeout_ms} ms")]
    TimedOut { program: String, timeout_ms: u64 },

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
