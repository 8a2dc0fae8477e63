//! Key derivation: composite key + parameters → 32-byte transformed key
//!
//! The algorithm is a closed choice identified on disk by a 16-byte UUID;
//! switching algorithms replaces the whole parameter set.

pub mod aes;
pub mod argon2;

use rand::RngCore;
use tokio_util::sync::CancellationToken;

use kpx_core::config::{KdfConfig, LimitsConfig};
use kpx_core::{KdfAlgorithm, KpxError, KpxResult};

pub use self::argon2::{Argon2Params, VERSION_13};

/// AES-KDF identifier `C9D9F39A-628A-4460-BF74-0D08C18A4FEA`
pub const AES_KDF_UUID: [u8; 16] = [
    0xC9, 0xD9, 0xF3, 0x9A, 0x62, 0x8A, 0x44, 0x60, 0xBF, 0x74, 0x0D, 0x08, 0xC1, 0x8A, 0x4F, 0xEA,
];

/// Argon2d identifier `EF636DDF-8C29-444B-91F7-A9A403E30A0C`
pub const ARGON2D_UUID: [u8; 16] = [
    0xEF, 0x63, 0x6D, 0xDF, 0x8C, 0x29, 0x44, 0x4B, 0x91, 0xF7, 0xA9, 0xA4, 0x03, 0xE3, 0x0A, 0x0C,
];

/// Rounds assumed when a stored AES parameter set omits them
pub const DEFAULT_AES_ROUNDS: u64 = 6000;

/// Output length of every derivation used by the container
pub const DERIVED_KEY_LEN: usize = 32;

#[derive(Debug, Clone)]
pub enum KdfParameters {
    Aes { rounds: u64, seed: [u8; 32] },
    Argon2d(Argon2Params),
}

impl KdfParameters {
    /// AES-KDF with a fresh random seed.
    pub fn aes(rounds: u64) -> Self {
        KdfParameters::Aes {
            rounds,
            seed: random_32(),
        }
    }

    /// Argon2d with a fresh random 32-byte salt.
    pub fn argon2d(iterations: u64, memory_kib: u64, parallelism: u32) -> Self {
        KdfParameters::Argon2d(Argon2Params {
            salt: random_32().to_vec(),
            parallelism,
            memory_kib,
            iterations,
            version: VERSION_13,
            secret: None,
            associated_data: None,
        })
    }

    /// Parameters for new databases from the `[kdf]` config section.
    pub fn from_config(config: &KdfConfig) -> Self {
        match config.algorithm {
            KdfAlgorithm::Aes => Self::aes(config.aes_rounds),
            KdfAlgorithm::Argon2d => Self::argon2d(
                config.argon2_iterations,
                config.argon2_memory_kib,
                config.argon2_parallelism,
            ),
        }
    }

    pub fn uuid(&self) -> [u8; 16] {
        match self {
            KdfParameters::Aes { .. } => AES_KDF_UUID,
            KdfParameters::Argon2d(_) => ARGON2D_UUID,
        }
    }

    pub fn algorithm(&self) -> KdfAlgorithm {
        match self {
            KdfParameters::Aes { .. } => KdfAlgorithm::Aes,
            KdfParameters::Argon2d(_) => KdfAlgorithm::Argon2d,
        }
    }

    /// Same costs, fresh seed/salt.
    pub fn reseed(&self) -> Self {
        match self {
            KdfParameters::Aes { rounds, .. } => KdfParameters::Aes {
                rounds: *rounds,
                seed: random_32(),
            },
            KdfParameters::Argon2d(p) => KdfParameters::Argon2d(Argon2Params {
                salt: random_32().to_vec(),
                ..p.clone()
            }),
        }
    }

    /// Algorithm bounds only, no resource limits.
    pub fn check(&self) -> KpxResult<()> {
        match self {
            KdfParameters::Aes { .. } => Ok(()),
            KdfParameters::Argon2d(p) => p.check(),
        }
    }

    /// Enforce algorithm bounds and the configured resource limits.
    ///
    /// Runs before any memory is allocated for a derivation.
    pub fn validate(&self, limits: &LimitsConfig) -> KpxResult<()> {
        self.check()?;
        match self {
            KdfParameters::Aes { .. } => Ok(()),
            KdfParameters::Argon2d(p) => {
                if p.memory_kib > limits.max_argon2_memory_kib {
                    return Err(KpxError::header(format!(
                        "Argon2 memory {} KiB exceeds limit {} KiB",
                        p.memory_kib, limits.max_argon2_memory_kib
                    )));
                }
                if p.parallelism > limits.max_argon2_parallelism {
                    return Err(KpxError::header(format!(
                        "Argon2 parallelism {} exceeds limit {}",
                        p.parallelism, limits.max_argon2_parallelism
                    )));
                }
                Ok(())
            }
        }
    }

    /// Run the derivation over the 32-byte composite key.
    pub fn derive(&self, raw_key: &[u8; 32], cancel: &CancellationToken) -> KpxResult<[u8; 32]> {
        match self {
            KdfParameters::Aes { rounds, seed } => {
                tracing::debug!(rounds, "running AES-KDF");
                aes::transform(raw_key, seed, *rounds, cancel)
            }
            KdfParameters::Argon2d(p) => {
                tracing::debug!(
                    iterations = p.iterations,
                    memory_kib = p.memory_kib,
                    parallelism = p.parallelism,
                    "running Argon2d"
                );
                let mut tag = argon2::argon2d(raw_key, p, DERIVED_KEY_LEN, cancel)?;
                let mut out = [0u8; 32];
                out.copy_from_slice(&tag);
                zeroize::Zeroize::zeroize(&mut tag);
                Ok(out)
            }
        }
    }
}

/// Equal when the algorithm and every cost parameter match; seed and salt
/// are ignored.
impl PartialEq for KdfParameters {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (KdfParameters::Aes { rounds: a, .. }, KdfParameters::Aes { rounds: b, .. }) => a == b,
            (KdfParameters::Argon2d(a), KdfParameters::Argon2d(b)) => {
                a.parallelism == b.parallelism
                    && a.memory_kib == b.memory_kib
                    && a.iterations == b.iterations
                    && a.version == b.version
                    && a.secret == b.secret
                    && a.associated_data == b.associated_data
            }
            _ => false,
        }
    }
}

impl Eq for KdfParameters {}

fn random_32() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}
