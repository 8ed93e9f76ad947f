//! The initial address package: the destination address block from the
//! client's SOCKS5 request, re-encoded verbatim as the first payload sent
//! upstream (and replayed inside the SOCKS5 success reply).

use bytes::{BufMut, BytesMut};
use socks5_proto::Address;

/// Upper bound on the initial package's encoded size (`SSR_BUFF_SIZE`).
pub const MAX_PACKAGE_SIZE: usize = 4096;

/// Encode `addr` as `ATYP | ADDR... | PORT`, with no separators or
/// terminator — the same wire shape the client's request carried it in.
pub fn encode_initial_package(addr: &Address) -> BytesMut {
    let mut buf = BytesMut::with_capacity(addr.serialized_len());
    addr.write_to_buf(&mut buf);
    debug_assert!(buf.len() <= MAX_PACKAGE_SIZE);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

    #[test]
    fn encodes_ipv4_address_with_port() {
        let addr = Address::SocketAddress(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::new(8, 8, 8, 8),
            80,
        )));
        let pkg = encode_initial_package(&addr);
        assert_eq!(&pkg[..], &[0x01, 8, 8, 8, 8, 0x00, 0x50]);
    }

    #[test]
    fn encodes_domain_address_with_length_prefix() {
        let addr = Address::DomainAddress(b"example.com".to_vec(), 443);
        let pkg = encode_initial_package(&addr);
        assert_eq!(pkg[0], 0x03);
        assert_eq!(pkg[1], 11);
        assert_eq!(&pkg[2..13], b"example.com");
        assert_eq!(&pkg[13..15], &[0x01, 0xbb]);
    }
}
