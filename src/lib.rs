//! Library crate for lan-sweep: concurrent ICMP sweep of a local /24 with
//! reverse-DNS and neighbor-table enrichment.
pub mod error;
pub mod logging;
pub mod neighbor;
pub mod netdetect;
pub mod probe;
pub mod report;
pub mod resolve;
pub mod scanner;
pub mod types;
