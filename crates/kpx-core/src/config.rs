use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::{CipherId, Compression, InnerStreamId, KdfAlgorithm};
use crate::{KpxError, KpxResult};

/// Top-level configuration (loaded from kpx.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KpxConfig {
    pub log: LogConfig,
    pub database: DatabaseConfig,
    pub kdf: KdfConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

/// Defaults applied when creating a new database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Body cipher (default: aes)
    pub cipher: CipherId,
    /// Payload compression (default: gzip)
    pub compression: Compression,
    /// Protected-value keystream (default: chacha20)
    pub inner_stream: InnerStreamId,
    /// History snapshots kept per entry, negative for unlimited (default: 10)
    pub history_max_items: i32,
}

/// Key derivation defaults for new databases and `rekey`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// "aes" or "argon2d" (default: argon2d)
    pub algorithm: KdfAlgorithm,
    /// AES-KDF rounds (default: 60000)
    pub aes_rounds: u64,
    /// Argon2d passes (default: 2)
    pub argon2_iterations: u64,
    /// Argon2d memory in KiB (default: 65536 = 64 MiB)
    pub argon2_memory_kib: u64,
    /// Argon2d lanes (default: 2)
    pub argon2_parallelism: u32,
}

/// Upper bounds enforced on KDF parameters read from untrusted headers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest Argon2 memory a header may request, in KiB (default: 4 GiB)
    pub max_argon2_memory_kib: u64,
    /// Largest Argon2 lane count a header may request (default: 64)
    pub max_argon2_parallelism: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            cipher: CipherId::Aes,
            compression: Compression::Gzip,
            inner_stream: InnerStreamId::ChaCha20,
            history_max_items: 10,
        }
    }
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            algorithm: KdfAlgorithm::Argon2d,
            aes_rounds: 60_000,
            argon2_iterations: 2,
            argon2_memory_kib: 65_536,
            argon2_parallelism: 2,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_argon2_memory_kib: 4 * 1024 * 1024,
            max_argon2_parallelism: 64,
        }
    }
}

/// Load configuration from `path`, falling back to defaults if it does not exist.
pub fn load(path: &Path) -> KpxResult<KpxConfig> {
    if !path.exists() {
        tracing::warn!("config file not found: {}  (using defaults)", path.display());
        return Ok(KpxConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| KpxError::Config(format!("parsing {}: {e}", path.display())))
}
