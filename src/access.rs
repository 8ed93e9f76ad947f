//! Access policy: a synchronous predicate asked before dialing upstream.
//!
//! Loopback is always denied. The original implementation this is modeled on
//! only denied loopback under a debug build (the deny branch lived behind
//! `!NDEBUG`), which meant release builds silently allowed it — almost
//! certainly a bug rather than a policy choice. This crate does not
//! reproduce that split; see DESIGN.md for the resolved open question.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Decides whether a resolved upstream address may be dialed.
pub trait AccessPolicy: Send + Sync {
    fn allow(&self, addr: &SocketAddr) -> bool;
}

/// Denies loopback (IPv4 `127.0.0.0/8`, IPv6 `::1`, IPv4-mapped
/// `::ffff:127.0.0.0/8`), permits everything else.
#[derive(Debug, Default)]
pub struct DenyLoopback;

impl AccessPolicy for DenyLoopback {
    fn allow(&self, addr: &SocketAddr) -> bool {
        match addr.ip() {
            IpAddr::V4(v4) => !v4.is_loopback(),
            IpAddr::V6(v6) => {
                if v6.is_loopback() {
                    return false;
                }
                if let Some(mapped) = v4_mapped(&v6) {
                    return !mapped.is_loopback();
                }
                true
            }
        }
    }
}

fn v4_mapped(v6: &std::net::Ipv6Addr) -> Option<Ipv4Addr> {
    let segments = v6.segments();
    if segments[0..5] == [0, 0, 0, 0, 0] && segments[5] == 0xffff {
        let [a, b, c, d] = v6.octets()[12..16].try_into().unwrap();
        Some(Ipv4Addr::new(a, b, c, d))
    } else {
        None
    }
}
