use lan_sweep::error::ScanError;
use lan_sweep::types::Prefix;
use std::net::Ipv4Addr;

#[test]
fn prefix_from_interface_address() {
    let p = Prefix::from(Ipv4Addr::new(192, 168, 42, 99));
    assert_eq!(p.to_string(), "192.168.42");
    assert!(p.contains(Ipv4Addr::new(192, 168, 42, 1)));
    assert!(!p.contains(Ipv4Addr::new(192, 168, 43, 1)));
}

#[test]
fn hosts_are_one_through_254() {
    let hosts = "10.0.0".parse::<Prefix>().unwrap().hosts();
    assert_eq!(hosts.len(), 254);
    assert!(!hosts.contains(&Ipv4Addr::new(10, 0, 0, 0)));
    assert!(!hosts.contains(&Ipv4Addr::new(10, 0, 0, 255)));
    let mut sorted = hosts.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted, hosts);
}

#[test]
fn malformed_prefix_is_invalid() {
    let err = "192.168.1.300".parse::<Prefix>().unwrap_err();
    assert!(matches!(err, ScanError::InvalidPrefix(ref s) if s == "192.168.1.300"));
}
