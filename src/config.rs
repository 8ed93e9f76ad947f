//! Read-only configuration consumed by the [`crate::env::Environment`].
//!
//! Parsing a config *file* is not this crate's concern beyond a thin `serde`
//! adapter (loading it from TOML, say, or wiring it up to `clap` overrides
//! belongs to the binary); the shape below is the actual contract the tunnel
//! reads from.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;

/// Cipher/protocol/obfuscation selector triple, mirroring the SSR config
/// vocabulary (`method`, `protocol`, `obfs`) without prescribing every
/// variant the ecosystem supports; unknown values are rejected at the
/// [`crate::cipher`] factory boundary, not here.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub remote_host: String,
    pub remote_port: u16,
    #[serde(default = "default_listen_host")]
    pub listen_host: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Whether to synthesize UDP ASSOCIATE replies. No UDP data plane is
    /// implemented regardless of this flag (see design notes, §9).
    #[serde(default)]
    pub udp: bool,
    #[serde(default)]
    pub over_tls_enable: bool,
    /// SNI to present during the TLS handshake; defaults to `remote_host`.
    #[serde(default)]
    pub tls_sni: Option<String>,
    #[serde(default = "default_cipher_method")]
    pub cipher_method: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_obfs")]
    pub obfs: String,
    pub password: String,
}

fn default_listen_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_listen_port() -> u16 {
    1080
}

fn default_cipher_method() -> String {
    "rc4".to_owned()
}

fn default_protocol() -> String {
    "origin".to_owned()
}

fn default_obfs() -> String {
    "plain".to_owned()
}

impl Config {
    /// Load from a TOML file on disk.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// The SNI to use for the outer TLS handshake.
    pub fn tls_server_name(&self) -> &str {
        self.tls_sni.as_deref().unwrap_or(&self.remote_host)
    }
}
