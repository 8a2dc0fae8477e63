//! kpx-crypto: primitives behind the KDBX container
//!
//! ```text
//! Hash engine      blake2b         RFC 7693, 1..=64 byte digests, keyed mode
//! Stream ciphers   salsa20         inner stream id 2
//!                  chacha20        inner stream id 3, V4 body cipher
//!                  arcfour         legacy inner stream id 1
//! Key derivation   kdf::aes        rounds-based AES-KDF
//!                  kdf::argon2     Argon2d v1.3, lanes on rayon
//! Keys             keys            composite key → transformed → cipher/HMAC keys
//!                  keyfile         keyfile format detection
//! Body cipher      cipher          AES-256-CBC / ChaCha20
//! ```

pub mod arcfour;
pub mod blake2b;
pub mod chacha20;
pub mod cipher;
pub mod kdf;
pub mod keyfile;
pub mod keys;
pub mod salsa20;
pub mod stream;

pub use blake2b::{blake2b, Blake2b};
pub use kdf::{Argon2Params, KdfParameters};
pub use keyfile::load_keyfile;
pub use keys::{derive_cipher_key, derive_hmac_base, CipherKey, CompositeKey, HmacBaseKey, TransformedKey};
pub use stream::{Keystream, RandomStream};

/// Size of every symmetric key in the hierarchy (256-bit)
pub const KEY_SIZE: usize = 32;
