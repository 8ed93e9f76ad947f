//! Cipher/obfuscation pipeline contract.
//!
//! This module defines the plugin boundary only: a [`Codec`] transforms a
//! plaintext chunk into a wire chunk and back, and may demand a
//! challenge-response round trip ("feedback") on its first decrypt. Real SSR
//! cipher/protocol/obfuscation algorithms are an external concern (§1); the
//! two plugins shipped here ([`PlainCodec`], [`rc4_feedback::Rc4Codec`]) are
//! reference implementations sufficient to drive and test the tunnel state
//! machine end to end, not an exhaustive SSR cipher suite.

mod rc4_feedback;

pub use rc4_feedback::Rc4Codec;

use crate::error::CodecError;

/// Maximum plaintext chunk size a [`Codec`] is asked to operate on at once.
pub const MAX_PLAINTEXT_CHUNK: usize = 1452;

/// The result of decrypting one wire chunk.
#[derive(Debug, Default)]
pub struct DecryptOutput {
    /// Application bytes recovered from this chunk.
    pub plaintext: Vec<u8>,
    /// Present only on the call that completes a feedback handshake.
    pub feedback: Option<Vec<u8>>,
}

/// A stateful, per-tunnel encrypt/decrypt pipeline.
///
/// Not thread-safe and not required to be `Sync`: a [`Codec`] is owned
/// exclusively by the [`crate::tunnel::Tunnel`] that created it.
pub trait Codec: Send {
    /// Whether this codec's protocol requires a challenge-response exchange
    /// immediately after the first encrypted payload is sent upstream.
    fn needs_feedback(&self) -> bool;

    /// Encrypt `plaintext` in place into its wire representation.
    fn encrypt(&mut self, plaintext: &mut Vec<u8>) -> Result<(), CodecError>;

    /// Decrypt one wire chunk, possibly yielding feedback bytes that must be
    /// written back upstream before the handshake can complete.
    fn decrypt(&mut self, wire: &[u8]) -> Result<DecryptOutput, CodecError>;

    /// Seed the obfuscation layer, if any, with the fixed buffer size the
    /// tunnel reads in and the length of the first payload's header (§4.2
    /// "Request dispatch"). Called once, right before the first package is
    /// sent. Codecs with no obfs step leave this a no-op.
    fn seed_obfs(&mut self, _buffer_size: usize, _head_len: usize) {}
}

/// Obfuscation plugin boundary: wraps/unwraps a cipher's wire chunk in
/// whatever the transport-level obfuscation scheme expects. Seeded once,
/// before the first chunk, with the fixed read buffer size and the first
/// payload's header length.
pub trait Obfs: Send {
    fn seed(&mut self, buffer_size: usize, head_len: usize);
}

/// No-op obfuscation: passes chunks through unchanged. Reference plugin
/// standing in for the real SSR obfs plugins (http_simple, tls1.2_ticket_auth,
/// ...), which are an external concern (§1) just like the cipher plugins are.
#[derive(Debug, Default)]
pub struct PlainObfs {
    buffer_size: usize,
    head_len: usize,
}

impl PlainObfs {
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn head_len(&self) -> usize {
        self.head_len
    }
}

impl Obfs for PlainObfs {
    fn seed(&mut self, buffer_size: usize, head_len: usize) {
        self.buffer_size = buffer_size;
        self.head_len = head_len;
    }
}

/// Creates a [`Codec`] for a newly accepted tunnel.
///
/// Must be re-entrant: called independently, without shared mutable state,
/// from every tunnel's owning task across every event loop.
pub trait CodecFactory: Send + Sync {
    fn create(&self, max_chunk: usize) -> Box<dyn Codec>;
}

/// Identity codec: no encryption, no obfuscation, never needs feedback.
///
/// Useful as the `method = "none"` / `protocol = "origin"` baseline and as a
/// test double for exercising the non-feedback tunnel path in isolation.
#[derive(Debug, Default)]
pub struct PlainCodec;

impl Codec for PlainCodec {
    fn needs_feedback(&self) -> bool {
        false
    }

    fn encrypt(&mut self, _plaintext: &mut Vec<u8>) -> Result<(), CodecError> {
        Ok(())
    }

    fn decrypt(&mut self, wire: &[u8]) -> Result<DecryptOutput, CodecError> {
        Ok(DecryptOutput {
            plaintext: wire.to_vec(),
            feedback: None,
        })
    }
}

/// Builds the configured [`Codec`] from a cipher/protocol/obfs selector
/// triple. An unrecognized `obfs` selector logs a warning and falls back to
/// the no-op [`PlainObfs`]; method/protocol selection is unchanged.
pub struct ConfiguredCodecFactory {
    method: String,
    protocol: String,
    obfs: String,
    password: String,
}

impl ConfiguredCodecFactory {
    pub fn new(
        method: impl Into<String>,
        protocol: impl Into<String>,
        obfs: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            protocol: protocol.into(),
            obfs: obfs.into(),
            password: password.into(),
        }
    }
}

impl CodecFactory for ConfiguredCodecFactory {
    fn create(&self, max_chunk: usize) -> Box<dyn Codec> {
        if self.obfs != "plain" {
            tracing::warn!(obfs = %self.obfs, "unrecognized obfs plugin, falling back to plain");
        }

        match self.method.as_str() {
            "none" => Box::new(PlainCodec),
            _ => {
                let needs_feedback = self.protocol == "auth_simple" || self.protocol == "auth_chain_a";
                Box::new(Rc4Codec::new(&self.password, max_chunk, needs_feedback))
            }
        }
    }
}
