//! SOCKS5 authentication adaptor.
//!
//! Kept as an extension point the way the teacher crate exposes it, even
//! though the handshake policy (see [`crate::connection`]) only ever selects
//! [`NoAuth`]: password and GSSAPI methods are explicit non-goals, not
//! something this crate negotiates.

use async_trait::async_trait;
use socks5_proto::handshake::Method;
use std::sync::Arc;
use tokio::net::TcpStream;

/// A SOCKS5 authentication method handler.
#[async_trait]
pub trait Auth {
    type Output;

    /// The handshake method this adaptor answers for.
    fn as_handshake_method(&self) -> Method;

    /// Run the method-specific exchange after the method has been selected.
    async fn execute(&self, stream: &mut TcpStream) -> Self::Output;
}

/// Type-erased, shareable [`Auth`] adaptor.
pub type AuthAdaptor<O> = Arc<dyn Auth<Output = O> + Send + Sync>;

/// The only method this crate offers: no authentication required.
#[derive(Debug, Default)]
pub struct NoAuth;

#[async_trait]
impl Auth for NoAuth {
    type Output = ();

    #[inline]
    fn as_handshake_method(&self) -> Method {
        Method::NONE
    }

    #[inline]
    async fn execute(&self, _stream: &mut TcpStream) -> Self::Output {}
}
