use serde::{Deserialize, Serialize};

use crate::{KpxError, KpxResult};

/// Container major version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatVersion {
    V3,
    V4,
}

impl FormatVersion {
    /// Version word written for V3 containers (3.1)
    pub const V3_WORD: u32 = 0x0003_0001;
    /// Version word written for V4 containers (4.0)
    pub const V4_WORD: u32 = 0x0004_0000;
    /// Only the major half of the version word is significant
    pub const CRITICAL_MASK: u32 = 0xFFFF_0000;

    /// Classify a raw version word read from a file.
    pub fn from_word(word: u32) -> KpxResult<Self> {
        let major = word & Self::CRITICAL_MASK;
        if major <= Self::V3_WORD & Self::CRITICAL_MASK {
            Ok(FormatVersion::V3)
        } else if major == Self::V4_WORD & Self::CRITICAL_MASK {
            Ok(FormatVersion::V4)
        } else {
            Err(KpxError::UnsupportedVersion(word))
        }
    }

    pub fn word(self) -> u32 {
        match self {
            FormatVersion::V3 => Self::V3_WORD,
            FormatVersion::V4 => Self::V4_WORD,
        }
    }
}

/// Outer body cipher, identified on disk by a 16-byte UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherId {
    Aes,
    ChaCha20,
}

impl CipherId {
    pub const AES_UUID: [u8; 16] = [
        0x31, 0xC1, 0xF2, 0xE6, 0xBF, 0x71, 0x43, 0x50, 0xBE, 0x58, 0x05, 0x21, 0x6A, 0xFC, 0x5A,
        0xFF,
    ];
    pub const CHACHA20_UUID: [u8; 16] = [
        0xD6, 0x03, 0x8A, 0x2B, 0x8B, 0x6F, 0x4C, 0xB5, 0xA5, 0x24, 0x33, 0x9A, 0x31, 0xDB, 0xB5,
        0x9A,
    ];

    pub fn from_uuid(bytes: &[u8]) -> KpxResult<Self> {
        if bytes == Self::AES_UUID {
            Ok(CipherId::Aes)
        } else if bytes == Self::CHACHA20_UUID {
            Ok(CipherId::ChaCha20)
        } else {
            Err(KpxError::header(format!("unknown cipher id {}", hex_string(bytes))))
        }
    }

    pub fn uuid(self) -> [u8; 16] {
        match self {
            CipherId::Aes => Self::AES_UUID,
            CipherId::ChaCha20 => Self::CHACHA20_UUID,
        }
    }

    /// Length of the encryption IV this cipher expects
    pub fn iv_len(self) -> usize {
        match self {
            CipherId::Aes => 16,
            CipherId::ChaCha20 => 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Gzip,
}

impl Compression {
    pub fn from_flag(flag: u32) -> KpxResult<Self> {
        match flag {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Gzip),
            other => Err(KpxError::header(format!("unknown compression flag {other}"))),
        }
    }

    pub fn flag(self) -> u32 {
        match self {
            Compression::None => 0,
            Compression::Gzip => 1,
        }
    }
}

/// Keystream used to obfuscate protected values inside the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InnerStreamId {
    ArcFour,
    Salsa20,
    ChaCha20,
}

impl InnerStreamId {
    pub fn from_id(id: u32) -> KpxResult<Self> {
        match id {
            1 => Ok(InnerStreamId::ArcFour),
            2 => Ok(InnerStreamId::Salsa20),
            3 => Ok(InnerStreamId::ChaCha20),
            other => Err(KpxError::header(format!("unsupported inner stream id {other}"))),
        }
    }

    pub fn id(self) -> u32 {
        match self {
            InnerStreamId::ArcFour => 1,
            InnerStreamId::Salsa20 => 2,
            InnerStreamId::ChaCha20 => 3,
        }
    }
}

/// Key derivation algorithm selector (config + CLI surface)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KdfAlgorithm {
    Aes,
    Argon2d,
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
