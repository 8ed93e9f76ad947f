//! The outgoing transport: either a raw TCP socket or one wrapped in TLS.
//!
//! The source design describes the TLS transport as exposing `send(bytes)`
//! plus three upcalls (`established`, `data`, `shutting-down`). In the
//! async/await mapping those upcalls collapse onto ordinary control flow:
//! `established` is the point where the TLS handshake future resolves,
//! `data` is each `AsyncRead::read` call against the wrapped stream, and
//! `shutting-down` is any `Err` surfacing from that stream (see
//! DESIGN.md). [`OutgoingTransport`] implements `AsyncRead`/`AsyncWrite` so
//! the rest of the tunnel never needs to know which mode it's in.

use rustls::pki_types::ServerName;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Outgoing socket, dispatching between raw TCP and TLS-wrapped TCP.
pub enum OutgoingTransport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl OutgoingTransport {
    /// Wrap `stream` in TLS using `connector`, presenting `server_name` as
    /// SNI. This is the `TLS_CONNECTING -> TLS_FIRST_PACKAGE` transition's
    /// "established" upcall: the handshake future resolving *is* the upcall.
    pub async fn connect_tls(
        connector: &TlsConnector,
        server_name: &str,
        stream: TcpStream,
    ) -> io::Result<Self> {
        let name = ServerName::try_from(server_name.to_owned())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid TLS server name"))?;
        let tls_stream = connector.connect(name, stream).await?;
        Ok(OutgoingTransport::Tls(Box::new(tls_stream)))
    }
}

/// Builds a `TlsConnector` seeded with the Mozilla root program via
/// `webpki-roots`. Client certificates are not supported (the upstream SSR
/// endpoint authenticates by shared password, not mTLS).
pub fn build_tls_connector() -> TlsConnector {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

impl AsyncRead for OutgoingTransport {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            OutgoingTransport::Plain(s) => Pin::new(s).poll_read(cx, buf),
            OutgoingTransport::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for OutgoingTransport {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            OutgoingTransport::Plain(s) => Pin::new(s).poll_write(cx, buf),
            OutgoingTransport::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            OutgoingTransport::Plain(s) => Pin::new(s).poll_flush(cx),
            OutgoingTransport::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            OutgoingTransport::Plain(s) => Pin::new(s).poll_shutdown(cx),
            OutgoingTransport::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}
