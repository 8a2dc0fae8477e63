//! Keystream generators and the inner random stream
//!
//! ```text
//! Keystream (trait)
//!   ├── Salsa20        64-byte blocks, 64-bit counter, 8-byte nonce
//!   ├── ChaCha20       64-byte blocks, 32-bit counter, 12-byte nonce
//!   └── ArcFourVariant byte-oriented legacy stream
//!
//! RandomStream: closed enum over the three, selected by the on-disk stream id
//! ```
//!
//! A generator is single-owner. `clone()` yields an independent generator at
//! the same cursor, including any buffered bytes of a partially consumed block.

use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroize;

use kpx_core::{InnerStreamId, KpxError, KpxResult};

use crate::arcfour::ArcFourVariant;
use crate::chacha20::ChaCha20;
use crate::salsa20::Salsa20;

/// Fixed Salsa20 nonce used for the inner random stream
pub const INNER_SALSA20_NONCE: [u8; 8] = [0xE8, 0x30, 0x09, 0x4B, 0x97, 0x20, 0x5D, 0x2A];

/// A stateful keystream with a byte cursor.
pub trait Keystream {
    /// Fill `out` with the next `out.len()` keystream bytes.
    fn fill(&mut self, out: &mut [u8]);

    /// Draw `n` keystream bytes.
    fn get_bytes(&mut self, n: usize) -> Vec<u8> {
        let mut out = vec![0u8; n];
        self.fill(&mut out);
        out
    }

    /// XOR the next `data.len()` keystream bytes into `data`.
    fn apply(&mut self, data: &mut [u8]) {
        let mut pad = self.get_bytes(data.len());
        for (d, k) in data.iter_mut().zip(pad.iter()) {
            *d ^= k;
        }
        pad.zeroize();
    }
}

/// 64-byte block buffer shared by the block-oriented generators.
#[derive(Clone)]
pub(crate) struct BlockBuffer {
    bytes: [u8; 64],
    used: usize,
}

impl BlockBuffer {
    pub(crate) fn empty() -> Self {
        Self {
            bytes: [0u8; 64],
            used: 64,
        }
    }

    /// Copy buffered bytes into `out`, refilling with `next_block` as needed.
    pub(crate) fn drain_into(&mut self, out: &mut [u8], mut next_block: impl FnMut() -> [u8; 64]) {
        let mut written = 0;
        while written < out.len() {
            if self.used == 64 {
                self.bytes = next_block();
                self.used = 0;
            }
            let take = (64 - self.used).min(out.len() - written);
            out[written..written + take].copy_from_slice(&self.bytes[self.used..self.used + take]);
            self.used += take;
            written += take;
        }
    }
}

impl Drop for BlockBuffer {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// The keystream protecting string values inside a payload.
#[derive(Clone)]
pub enum RandomStream {
    ArcFour(ArcFourVariant),
    Salsa20(Salsa20),
    ChaCha20(ChaCha20),
}

impl RandomStream {
    /// Build the stream for `id` from the protected stream key stored in the header.
    pub fn new(id: InnerStreamId, key: &[u8]) -> KpxResult<Self> {
        if key.is_empty() {
            return Err(KpxError::header("protected stream key is empty"));
        }
        Ok(Self::from_key(id, key))
    }

    /// Stream of kind `id` seeded with a fresh random 32-byte key; returns the key too.
    pub fn generate(id: InnerStreamId) -> (Self, Vec<u8>) {
        let mut key = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        (Self::from_key(id, &key), key)
    }

    fn from_key(id: InnerStreamId, key: &[u8]) -> Self {
        match id {
            InnerStreamId::ArcFour => RandomStream::ArcFour(ArcFourVariant::new(key)),
            InnerStreamId::Salsa20 => {
                let mut digest: [u8; 32] = Sha256::digest(key).into();
                let stream = Salsa20::new(&digest, &INNER_SALSA20_NONCE);
                digest.zeroize();
                RandomStream::Salsa20(stream)
            }
            InnerStreamId::ChaCha20 => {
                let mut digest = Sha512::digest(key);
                let mut k = [0u8; 32];
                let mut nonce = [0u8; 12];
                k.copy_from_slice(&digest[..32]);
                nonce.copy_from_slice(&digest[32..44]);
                let stream = ChaCha20::new(&k, &nonce, 0);
                digest.as_mut_slice().zeroize();
                k.zeroize();
                RandomStream::ChaCha20(stream)
            }
        }
    }

    pub fn id(&self) -> InnerStreamId {
        match self {
            RandomStream::ArcFour(_) => InnerStreamId::ArcFour,
            RandomStream::Salsa20(_) => InnerStreamId::Salsa20,
            RandomStream::ChaCha20(_) => InnerStreamId::ChaCha20,
        }
    }
}

impl Keystream for RandomStream {
    fn fill(&mut self, out: &mut [u8]) {
        match self {
            RandomStream::ArcFour(s) => s.fill(out),
            RandomStream::Salsa20(s) => s.fill(out),
            RandomStream::ChaCha20(s) => s.fill(out),
        }
    }
}

impl std::fmt::Debug for RandomStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomStream")
            .field("id", &self.id())
            .field("state", &"[REDACTED]")
            .finish()
    }
}
