//! The SOCKS5 listener: accepts raw TCP connections and hands them out as
//! [`IncomingConnection`]s, pairing each with the shared auth adaptor.

use crate::auth::AuthAdaptor;
use crate::connection::IncomingConnection;
use std::io::Result;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

/// Wraps a bound [`TcpListener`] with the auth adaptor every accepted
/// connection will be handed.
pub struct Server<O> {
    listener: TcpListener,
    auth: AuthAdaptor<O>,
}

impl<O> Server<O> {
    /// Accept one connection, producing an [`IncomingConnection`] ready for
    /// [`authenticate`](IncomingConnection::authenticate).
    pub async fn accept(&self) -> Result<(IncomingConnection<O>, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await?;
        Ok((IncomingConnection::new(stream, self.auth.clone()), addr))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl<O> From<(TcpListener, AuthAdaptor<O>)> for Server<O> {
    fn from((listener, auth): (TcpListener, AuthAdaptor<O>)) -> Self {
        Self { listener, auth }
    }
}

impl<O> TryFrom<(std::net::TcpListener, AuthAdaptor<O>)> for Server<O> {
    type Error = std::io::Error;

    fn try_from((listener, auth): (std::net::TcpListener, AuthAdaptor<O>)) -> Result<Self> {
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener: TcpListener::from_std(listener)?,
            auth,
        })
    }
}
