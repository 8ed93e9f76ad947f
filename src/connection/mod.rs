//! This module contains the connection abstraction of the SOCKS5 protocol.
//!
//! [`Server::accept`](crate::server::Server::accept) creates an
//! [`IncomingConnection`], the entry point of processing a SOCKS5
//! connection. Call [`authenticate`](IncomingConnection::authenticate) to
//! run the handshake (only [`crate::auth::NoAuth`] is ever selected, per
//! §4.2's handshake policy — password and GSSAPI are explicit non-goals),
//! then [`wait_request`](Authenticated::wait_request) to get the client's
//! command.

use self::{associate::Associate, connect::Connect};
use crate::auth::AuthAdaptor;
use socks5_proto::{
    handshake::{Method as HandshakeMethod, Request as HandshakeRequest, Response as HandshakeResponse},
    Address, Command as ProtocolCommand, Error, ProtocolError, Request,
};
use std::{io::Error as IoError, net::SocketAddr, time::Duration};
use tokio::{io::AsyncWriteExt, net::TcpStream};

pub mod associate;
pub mod connect;

/// A freshly established TCP connection.
///
/// This may not be a valid SOCKS5 connection. Call
/// [`authenticate`](Self::authenticate) to perform the handshake.
pub struct IncomingConnection<O> {
    stream: TcpStream,
    auth: AuthAdaptor<O>,
}

impl<O> IncomingConnection<O> {
    #[inline]
    pub(crate) fn new(stream: TcpStream, auth: AuthAdaptor<O>) -> Self {
        Self { stream, auth }
    }

    /// Perform a SOCKS5 authentication handshake using the given
    /// [`Auth`](crate::auth::Auth) adaptor.
    ///
    /// If the client doesn't offer the adaptor's method, replies `05 FF` and
    /// returns the error alongside the original stream — the caller is
    /// responsible for closing it (§4.2: "write-then-terminate").
    pub async fn authenticate(mut self) -> Result<(Authenticated, O), (Error, TcpStream)> {
        let req = match HandshakeRequest::read_from(&mut self.stream).await {
            Ok(req) => req,
            Err(err) => return Err((err, self.stream)),
        };
        let chosen_method = self.auth.as_handshake_method();

        if req.methods.contains(&chosen_method) {
            let resp = HandshakeResponse::new(chosen_method);

            if let Err(err) = resp.write_to(&mut self.stream).await {
                return Err((Error::Io(err), self.stream));
            }

            let output = self.auth.execute(&mut self.stream).await;

            Ok((Authenticated::new(self.stream), output))
        } else {
            let resp = HandshakeResponse::new(HandshakeMethod::UNACCEPTABLE);

            if let Err(err) = resp.write_to(&mut self.stream).await {
                return Err((Error::Io(err), self.stream));
            }

            Err((
                Error::Protocol(ProtocolError::NoAcceptableHandshakeMethod {
                    version: socks5_proto::SOCKS_VERSION,
                    chosen_method,
                    methods: req.methods,
                }),
                self.stream,
            ))
        }
    }

    #[inline]
    pub async fn shutdown(&mut self) -> Result<(), IoError> {
        self.stream.shutdown().await
    }

    #[inline]
    pub fn peer_addr(&self) -> Result<SocketAddr, IoError> {
        self.stream.peer_addr()
    }
}

impl<O> From<IncomingConnection<O>> for TcpStream {
    #[inline]
    fn from(conn: IncomingConnection<O>) -> Self {
        conn.stream
    }
}

/// A TCP stream that has completed the SOCKS5 authentication handshake.
pub struct Authenticated(TcpStream);

impl Authenticated {
    #[inline]
    fn new(stream: TcpStream) -> Self {
        Self(stream)
    }

    /// Wait for the client's SOCKS5 request and dispatch on its command.
    ///
    /// BIND has no reply affordance: per §4.2 it is rejected by closing the
    /// connection without writing anything, so it never becomes a
    /// [`Command`] variant — it's reported as a protocol error instead,
    /// alongside the original stream, exactly like a parse failure.
    pub async fn wait_request(mut self) -> Result<Command, (Error, TcpStream)> {
        let req = match Request::read_from(&mut self.0).await {
            Ok(req) => req,
            Err(err) => return Err((err, self.0)),
        };

        match req.command {
            ProtocolCommand::Associate => Ok(Command::Associate(
                Associate::<associate::NeedReply>::new(self.0),
                req.address,
            )),
            ProtocolCommand::Connect => Ok(Command::Connect(
                Connect::<connect::NeedReply>::new(self.0),
                req.address,
            )),
            // TODO: BIND is an explicit non-goal; surfaced as an I/O-shaped
            // error so the caller's existing "shut down, no reply" path
            // handles it without a dedicated typestate.
            ProtocolCommand::Bind => Err((
                Error::Io(IoError::new(std::io::ErrorKind::Unsupported, "BIND command is not supported")),
                self.0,
            )),
        }
    }

    #[inline]
    pub async fn shutdown(&mut self) -> Result<(), IoError> {
        self.0.shutdown().await
    }

    #[inline]
    pub fn peer_addr(&self) -> Result<SocketAddr, IoError> {
        self.0.peer_addr()
    }

    #[inline]
    pub fn linger(&self) -> Result<Option<Duration>, IoError> {
        self.0.linger()
    }
}

impl From<Authenticated> for TcpStream {
    #[inline]
    fn from(conn: Authenticated) -> Self {
        conn.0
    }
}

/// A command sent from the SOCKS5 client that this crate acts on.
pub enum Command {
    Associate(Associate<associate::NeedReply>, Address),
    Connect(Connect<connect::NeedReply>, Address),
}
