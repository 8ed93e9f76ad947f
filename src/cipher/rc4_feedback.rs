//! Reference stream-cipher plugin: RC4 keyed from a SHA-256 digest of the
//! shared password, with an optional SSR-`auth_simple`-style challenge
//! response on the first decrypt.
//!
//! This is a stand-in sufficient to exercise both tunnel handshake paths
//! (feedback and no-feedback) in tests; it is not meant to be a faithful
//! reimplementation of any specific SSR protocol plugin (those are an
//! external concern per §1 of the design).

use super::{Codec, DecryptOutput, Obfs, PlainObfs};
use crate::error::CodecError;
use rc4::consts::U32;
use rc4::{KeyInit, Rc4, StreamCipher};
use sha2::{Digest, Sha256};

type Rc4_256 = Rc4<U32>;

fn derive_key(password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

pub struct Rc4Codec {
    encryptor: Rc4_256,
    decryptor: Rc4_256,
    needs_feedback: bool,
    feedback_done: bool,
    max_chunk: usize,
    obfs: PlainObfs,
}

impl Rc4Codec {
    pub fn new(password: &str, max_chunk: usize, needs_feedback: bool) -> Self {
        let key = derive_key(password);
        Self {
            encryptor: Rc4_256::new(&key.into()),
            decryptor: Rc4_256::new(&key.into()),
            needs_feedback,
            feedback_done: !needs_feedback,
            max_chunk,
            obfs: PlainObfs::default(),
        }
    }

    /// Buffer size and head length the obfuscation layer was last seeded
    /// with (§4.2 "Request dispatch"). Exposed for tests; the codec itself
    /// only needs to forward the seed to `obfs`.
    pub fn obfs_seed(&self) -> (usize, usize) {
        (self.obfs.buffer_size(), self.obfs.head_len())
    }
}

impl Codec for Rc4Codec {
    fn needs_feedback(&self) -> bool {
        self.needs_feedback
    }

    fn encrypt(&mut self, plaintext: &mut Vec<u8>) -> Result<(), CodecError> {
        if plaintext.len() > self.max_chunk {
            return Err(CodecError::Encrypt);
        }
        self.encryptor.apply_keystream(plaintext);
        Ok(())
    }

    fn decrypt(&mut self, wire: &[u8]) -> Result<DecryptOutput, CodecError> {
        let mut buf = wire.to_vec();
        self.decryptor.apply_keystream(&mut buf);

        if !self.feedback_done {
            self.feedback_done = true;
            let mut hasher = Sha256::new();
            hasher.update(&buf);
            let response = hasher.finalize().to_vec();
            // No application bytes may appear in the handshake.
            return Ok(DecryptOutput {
                plaintext: Vec::new(),
                feedback: Some(response),
            });
        }

        Ok(DecryptOutput {
            plaintext: buf,
            feedback: None,
        })
    }

    fn seed_obfs(&mut self, buffer_size: usize, head_len: usize) {
        self.obfs.seed(buffer_size, head_len);
    }
}
