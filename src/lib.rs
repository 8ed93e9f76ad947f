//! Client-side SOCKS5 front-end that tunnels TCP payload to an obfuscated,
//! optionally TLS-wrapped upstream.
//!
//! [`Server::accept`] on a [`Server`] yields an [`IncomingConnection`], the entry
//! point for SOCKS5 negotiation. Once a client's request is parsed,
//! [`tunnel::serve_connection`] takes over: it dials the upstream, performs the
//! cipher/obfuscation handshake, and splices the two sockets together.

pub mod access;
pub mod auth;
pub mod cipher;
pub mod config;
pub mod connection;
pub mod env;
pub mod error;
pub mod registry;
pub mod server;
pub mod tunnel;

pub use auth::AuthAdaptor;
pub use connection::{Authenticated, Command, IncomingConnection};
pub use env::Environment;
pub use error::{ConfigError, TunnelError};
pub use server::Server;
