//! SOCKS5 command type `Associate`.
//!
//! Only the control-plane reply is implemented (§4.2, "UDP ASSOCIATE"): the
//! synthesized reply carries the configured local UDP bind, not any address
//! the client asked for, and the connection is closed once that reply has
//! been written. No UDP data plane exists in this crate.

use socks5_proto::{Address, Reply, Response};
use std::{
    io::Error,
    marker::PhantomData,
    net::SocketAddr,
    time::Duration,
};
use tokio::{io::AsyncWriteExt, net::TcpStream};

/// Socks5 command type `Associate`.
#[derive(Debug)]
pub struct Associate<S> {
    stream: TcpStream,
    _state: PhantomData<S>,
}

/// Marker type indicating that the connection needs to be replied to with
/// the synthesized UDP-ASSOCIATE address.
#[derive(Debug)]
pub struct NeedReply;

impl Associate<NeedReply> {
    #[inline]
    pub(super) fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            _state: PhantomData,
        }
    }

    /// Reply to the client with the given reply and address, then hand back
    /// the raw stream — the caller closes it immediately afterward, since no
    /// UDP relay follows.
    pub async fn reply(mut self, reply: Reply, addr: Address) -> Result<TcpStream, (Error, TcpStream)> {
        let resp = Response::new(reply, addr);

        if let Err(err) = resp.write_to(&mut self.stream).await {
            return Err((err, self.stream));
        }

        Ok(self.stream)
    }

    #[inline]
    pub async fn shutdown(&mut self) -> Result<(), Error> {
        self.stream.shutdown().await
    }

    #[inline]
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.stream.local_addr()
    }

    #[inline]
    pub fn peer_addr(&self) -> Result<SocketAddr, Error> {
        self.stream.peer_addr()
    }

    #[inline]
    pub fn linger(&self) -> Result<Option<Duration>, Error> {
        self.stream.linger()
    }

    #[inline]
    pub fn set_linger(&self, dur: Option<Duration>) -> Result<(), Error> {
        self.stream.set_linger(dur)
    }
}

impl<S> From<Associate<S>> for TcpStream {
    #[inline]
    fn from(conn: Associate<S>) -> Self {
        conn.stream
    }
}
