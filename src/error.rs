//! Error types, split by failure domain as described in the design's error
//! handling section: protocol errors, I/O errors, resolution failures,
//! access-policy denials, cipher failures and TLS failures each carry enough
//! context to pick the right SOCKS5 reply (or the absence of one).

use std::io;
use thiserror::Error;

/// Errors that can terminate a tunnel mid-flight.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("SOCKS5 protocol error: {0}")]
    Protocol(#[from] socks5_proto::Error),

    #[error("I/O error during {stage}: {source}")]
    Io {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to resolve upstream host {host}")]
    Resolution { host: String },

    #[error("access policy denied upstream {addr}")]
    AccessDenied { addr: std::net::SocketAddr },

    #[error("upstream connection refused")]
    ConnectionRefused,

    #[error("cipher/obfuscation failure: {0}")]
    Codec(#[from] CodecError),

    #[error("TLS failure: {0}")]
    Tls(#[from] io::Error),

    #[error("handshake decrypt produced application bytes; protocol violation")]
    FeedbackNotEmpty,
}

impl TunnelError {
    pub fn io(stage: &'static str, source: io::Error) -> Self {
        TunnelError::Io { stage, source }
    }
}

/// Errors from the cipher/obfuscation plugin boundary.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encrypt failed")]
    Encrypt,
}

/// Errors encountered while assembling a [`crate::config::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown cipher method {0}")]
    UnknownCipher(String),

    #[error("unknown protocol {0}")]
    UnknownProtocol(String),
}
