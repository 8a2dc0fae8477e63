//! Obfuscated string fields and the binary attachment pool
//!
//! A protected value keeps `raw = clear XOR pad` where `pad` is a keystream
//! segment. The clear text is only materialized on request.

use kpx_crypto::{Keystream, RandomStream};
use zeroize::Zeroizing;

/// XOR `clear` with `pad`. `pad` must be at least as long as `clear`.
pub fn obfuscate(clear: &[u8], pad: &[u8]) -> Vec<u8> {
    clear.iter().zip(pad.iter()).map(|(c, p)| c ^ p).collect()
}

pub fn deobfuscate(raw: &[u8], pad: &[u8]) -> Vec<u8> {
    obfuscate(raw, pad)
}

/// A named string field, optionally held obfuscated in memory.
#[derive(Clone)]
pub struct ProtectedString {
    key: String,
    raw: Zeroizing<Vec<u8>>,
    pad: Zeroizing<Vec<u8>>,
    protected: bool,
}

impl ProtectedString {
    /// New field; a protected value draws its pad from `rng`.
    pub fn new(key: impl Into<String>, clear: &str, protected: bool, rng: &mut RandomStream) -> Self {
        let mut field = Self {
            key: key.into(),
            raw: Zeroizing::new(Vec::new()),
            pad: Zeroizing::new(Vec::new()),
            protected,
        };
        field.store(clear.as_bytes(), rng);
        field
    }

    /// Unprotected field.
    pub fn plain(key: impl Into<String>, clear: &str) -> Self {
        Self {
            key: key.into(),
            raw: Zeroizing::new(clear.as_bytes().to_vec()),
            pad: Zeroizing::new(Vec::new()),
            protected: false,
        }
    }

    /// Field read from a file: `raw` is the stored bytes, `pad` the inner
    /// stream segment that was positioned at this value.
    pub fn from_raw(key: impl Into<String>, raw: Vec<u8>, pad: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            raw: Zeroizing::new(raw),
            pad: Zeroizing::new(pad),
            protected: true,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// The stored (possibly obfuscated) representation.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn clear_bytes(&self) -> Zeroizing<Vec<u8>> {
        if self.protected {
            Zeroizing::new(deobfuscate(&self.raw, &self.pad))
        } else {
            Zeroizing::new(self.raw.to_vec())
        }
    }

    pub fn clear(&self) -> Zeroizing<String> {
        let bytes = self.clear_bytes();
        Zeroizing::new(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Replace the value; a protected field re-obfuscates under a fresh pad.
    pub fn set_clear(&mut self, clear: &str, rng: &mut RandomStream) {
        self.store(clear.as_bytes(), rng);
    }

    pub fn set_protected(&mut self, protected: bool, rng: &mut RandomStream) {
        if protected == self.protected {
            return;
        }
        let clear = self.clear_bytes();
        self.protected = protected;
        self.store(&clear, rng);
    }

    /// Obfuscate the clear value under `stream` for writing to a file.
    pub fn encode_with(&self, stream: &mut RandomStream) -> Vec<u8> {
        let clear = self.clear_bytes();
        let pad = Zeroizing::new(stream.get_bytes(clear.len()));
        obfuscate(&clear, &pad)
    }

    fn store(&mut self, clear: &[u8], rng: &mut RandomStream) {
        if self.protected {
            self.pad = Zeroizing::new(rng.get_bytes(clear.len()));
            self.raw = Zeroizing::new(obfuscate(clear, &self.pad));
        } else {
            self.pad = Zeroizing::new(Vec::new());
            self.raw = Zeroizing::new(clear.to_vec());
        }
    }
}

impl PartialEq for ProtectedString {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.protected == other.protected
            && *self.clear_bytes() == *other.clear_bytes()
    }
}

impl Eq for ProtectedString {}

impl std::fmt::Debug for ProtectedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("ProtectedString");
        s.field("key", &self.key).field("protected", &self.protected);
        if self.protected {
            s.field("value", &"[REDACTED]");
        } else {
            s.field("value", &String::from_utf8_lossy(&self.raw));
        }
        s.finish()
    }
}

/// Attachment bytes plus their in-file protection flag.
#[derive(Clone, PartialEq, Eq)]
pub struct ProtectedBinary {
    data: Zeroizing<Vec<u8>>,
    protected: bool,
}

impl ProtectedBinary {
    pub fn new(data: Vec<u8>, protected: bool) -> Self {
        Self {
            data: Zeroizing::new(data),
            protected,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }
}

impl std::fmt::Debug for ProtectedBinary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectedBinary")
            .field("len", &self.data.len())
            .field("protected", &self.protected)
            .finish()
    }
}

/// Document-wide binaries, referenced from entries by index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryPool {
    items: Vec<ProtectedBinary>,
}

impl BinaryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binary, reusing the id of an identical one.
    pub fn add(&mut self, binary: ProtectedBinary) -> usize {
        if let Some(id) = self.items.iter().position(|b| *b == binary) {
            return id;
        }
        self.items.push(binary);
        self.items.len() - 1
    }

    /// Append without deduplication, keeping ids as read from a file.
    pub fn push(&mut self, binary: ProtectedBinary) -> usize {
        self.items.push(binary);
        self.items.len() - 1
    }

    pub fn get(&self, id: usize) -> Option<&ProtectedBinary> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProtectedBinary> {
        self.items.iter()
    }
}
