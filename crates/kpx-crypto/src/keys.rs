//! Key hierarchy: credential tokens → composite key → transformed key → cipher/HMAC keys
//!
//! ```text
//! CompositeKey = SHA-256(token_1 || ... || token_n)
//!   └── TransformedKey = KDF(CompositeKey, params)
//!         ├── CipherKey   = SHA-256(masterSeed || transformed)
//!         └── HmacBaseKey = SHA-512(masterSeed || transformed || 0x01)
//!               └── block key i = SHA-512(u64le(i) || base)
//! ```

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256, Sha512};
use tokio_util::sync::CancellationToken;
use zeroize::{Zeroize, Zeroizing};

use kpx_core::KpxResult;

use crate::kdf::KdfParameters;
use crate::KEY_SIZE;

/// Block index whose key authenticates the V4 outer header
pub const HEADER_BLOCK_INDEX: u64 = u64::MAX;

macro_rules! secret_key {
    ($(#[$doc:meta])* $name:ident, $len:expr) => {
        $(#[$doc])*
        #[derive(Clone)]
        pub struct $name {
            bytes: [u8; $len],
        }

        impl $name {
            pub fn from_bytes(bytes: [u8; $len]) -> Self {
                Self { bytes }
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.bytes
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.bytes.zeroize();
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("bytes", &"[REDACTED]")
                    .finish()
            }
        }
    };
}

secret_key!(
    /// Output of the KDF. Never persisted.
    TransformedKey,
    KEY_SIZE
);
secret_key!(
    /// Key for the outer body cipher.
    CipherKey,
    KEY_SIZE
);
secret_key!(
    /// Root of the per-block HMAC keys.
    HmacBaseKey,
    64
);

/// One credential contributing to the composite key.
#[derive(Clone)]
pub enum KeyToken {
    /// `SHA-256` of the UTF-8 password
    Password([u8; KEY_SIZE]),
    /// Key data produced by the keyfile loader
    KeyFile(Zeroizing<Vec<u8>>),
}

impl KeyToken {
    fn bytes(&self) -> &[u8] {
        match self {
            KeyToken::Password(hash) => hash,
            KeyToken::KeyFile(data) => data,
        }
    }
}

impl Drop for KeyToken {
    fn drop(&mut self) {
        if let KeyToken::Password(hash) = self {
            hash.zeroize();
        }
    }
}

impl std::fmt::Debug for KeyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyToken::Password(_) => f.write_str("Password([REDACTED])"),
            KeyToken::KeyFile(_) => f.write_str("KeyFile([REDACTED])"),
        }
    }
}

/// Ordered credential tokens. Order is part of the key.
#[derive(Debug, Clone, Default)]
pub struct CompositeKey {
    tokens: Vec<KeyToken>,
}

impl CompositeKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_password(mut self, password: &SecretString) -> Self {
        self.add_password(password);
        self
    }

    pub fn with_keyfile(mut self, key_data: Vec<u8>) -> Self {
        self.add_keyfile(key_data);
        self
    }

    pub fn add_password(&mut self, password: &SecretString) {
        let hash: [u8; KEY_SIZE] = Sha256::digest(password.expose_secret().as_bytes()).into();
        self.tokens.push(KeyToken::Password(hash));
    }

    pub fn add_keyfile(&mut self, key_data: Vec<u8>) {
        self.tokens.push(KeyToken::KeyFile(Zeroizing::new(key_data)));
    }

    pub fn tokens(&self) -> &[KeyToken] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Pre-KDF key: hash of the concatenated tokens.
    pub fn raw_key(&self) -> Zeroizing<[u8; KEY_SIZE]> {
        let mut hasher = Sha256::new();
        for token in &self.tokens {
            hasher.update(token.bytes());
        }
        Zeroizing::new(hasher.finalize().into())
    }

    /// Run the KDF over the raw key.
    pub fn transform(
        &self,
        params: &KdfParameters,
        cancel: &CancellationToken,
    ) -> KpxResult<TransformedKey> {
        let raw = self.raw_key();
        let derived = params.derive(&raw, cancel)?;
        Ok(TransformedKey::from_bytes(derived))
    }
}

pub fn derive_cipher_key(master_seed: &[u8], transformed: &TransformedKey) -> CipherKey {
    let mut hasher = Sha256::new();
    hasher.update(master_seed);
    hasher.update(transformed.as_bytes());
    CipherKey::from_bytes(hasher.finalize().into())
}

pub fn derive_hmac_base(master_seed: &[u8], transformed: &TransformedKey) -> HmacBaseKey {
    let mut hasher = Sha512::new();
    hasher.update(master_seed);
    hasher.update(transformed.as_bytes());
    hasher.update([0x01]);
    let mut bytes = [0u8; 64];
    bytes.copy_from_slice(&hasher.finalize());
    HmacBaseKey::from_bytes(bytes)
}

impl HmacBaseKey {
    /// HMAC key for block `index` (`HEADER_BLOCK_INDEX` for the header).
    pub fn block_key(&self, index: u64) -> Zeroizing<Vec<u8>> {
        let mut hasher = Sha512::new();
        hasher.update(index.to_le_bytes());
        hasher.update(self.bytes);
        Zeroizing::new(hasher.finalize().to_vec())
    }
}
