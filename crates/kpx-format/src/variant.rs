//! Typed key/value dictionary used for V4 KDF parameters and public custom data.
//!
//! ```text
//! u16 version (0x0100)
//! repeated: u8 type | i32 key_len | key | i32 value_len | value
//! u8 0x00 terminator
//! ```

use kpx_core::{KpxError, KpxResult};
use kpx_crypto::kdf::{Argon2Params, KdfParameters, DEFAULT_AES_ROUNDS};
use kpx_crypto::kdf::{AES_KDF_UUID, ARGON2D_UUID};

use crate::bytes::ByteReader;

pub const DICTIONARY_VERSION: u16 = 0x0100;
const CRITICAL_MASK: u16 = 0xFF00;

const TYPE_END: u8 = 0x00;
const TYPE_U32: u8 = 0x04;
const TYPE_U64: u8 = 0x05;
const TYPE_BOOL: u8 = 0x08;
const TYPE_I32: u8 = 0x0C;
const TYPE_I64: u8 = 0x0D;
const TYPE_STRING: u8 = 0x18;
const TYPE_BYTES: u8 = 0x42;

pub const KDF_UUID: &str = "$UUID";
pub const AES_ROUNDS: &str = "R";
pub const AES_SEED: &str = "S";
pub const ARGON2_SALT: &str = "S";
pub const ARGON2_PARALLELISM: &str = "P";
pub const ARGON2_MEMORY: &str = "M";
pub const ARGON2_ITERATIONS: &str = "I";
pub const ARGON2_VERSION: &str = "V";
pub const ARGON2_SECRET: &str = "K";
pub const ARGON2_ASSOCIATED: &str = "A";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum Variant {
    U32(u32),
    U64(u64),
    Bool(bool),
    I32(i32),
    I64(i64),
    String(String),
    Bytes(Vec<u8>),
}

impl Variant {
    fn type_byte(&self) -> u8 {
        match self {
            Variant::U32(_) => TYPE_U32,
            Variant::U64(_) => TYPE_U64,
            Variant::Bool(_) => TYPE_BOOL,
            Variant::I32(_) => TYPE_I32,
            Variant::I64(_) => TYPE_I64,
            Variant::String(_) => TYPE_STRING,
            Variant::Bytes(_) => TYPE_BYTES,
        }
    }

    fn value_bytes(&self) -> Vec<u8> {
        match self {
            Variant::U32(v) => v.to_le_bytes().to_vec(),
            Variant::U64(v) => v.to_le_bytes().to_vec(),
            Variant::Bool(v) => vec![u8::from(*v)],
            Variant::I32(v) => v.to_le_bytes().to_vec(),
            Variant::I64(v) => v.to_le_bytes().to_vec(),
            Variant::String(v) => v.as_bytes().to_vec(),
            Variant::Bytes(v) => v.clone(),
        }
    }

    fn decode(kind: u8, key: &str, value: &[u8]) -> KpxResult<Self> {
        let fixed = |n: usize| -> KpxResult<()> {
            if value.len() == n {
                Ok(())
            } else {
                Err(KpxError::header(format!(
                    "dictionary value {key:?} must be {n} bytes, got {}",
                    value.len()
                )))
            }
        };
        let le4 = || -> [u8; 4] {
            let mut b = [0u8; 4];
            b.copy_from_slice(&value[..4]);
            b
        };
        let le8 = || -> [u8; 8] {
            let mut b = [0u8; 8];
            b.copy_from_slice(&value[..8]);
            b
        };
        Ok(match kind {
            TYPE_U32 => {
                fixed(4)?;
                Variant::U32(u32::from_le_bytes(le4()))
            }
            TYPE_U64 => {
                fixed(8)?;
                Variant::U64(u64::from_le_bytes(le8()))
            }
            TYPE_BOOL => {
                fixed(1)?;
                Variant::Bool(value[0] != 0)
            }
            TYPE_I32 => {
                fixed(4)?;
                Variant::I32(i32::from_le_bytes(le4()))
            }
            TYPE_I64 => {
                fixed(8)?;
                Variant::I64(i64::from_le_bytes(le8()))
            }
            TYPE_STRING => Variant::String(
                String::from_utf8(value.to_vec())
                    .map_err(|_| KpxError::header(format!("dictionary string {key:?} is not UTF-8")))?,
            ),
            TYPE_BYTES => Variant::Bytes(value.to_vec()),
            other => {
                return Err(KpxError::header(format!(
                    "dictionary value {key:?} has unknown type {other:#04x}"
                )))
            }
        })
    }
}

/// Ordered dictionary; keys are unique and keep their insertion position.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct VariantDictionary {
    items: Vec<(String, Variant)>,
}

impl VariantDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Variant> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Variant) {
        let key = key.into();
        match self.items.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.items.push((key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variant)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn parse(data: &[u8]) -> KpxResult<Self> {
        let mut r = ByteReader::header(data);
        let version = r.u16()?;
        if version & CRITICAL_MASK > DICTIONARY_VERSION & CRITICAL_MASK {
            return Err(KpxError::header(format!(
                "unsupported dictionary version {version:#06x}"
            )));
        }

        let mut dict = VariantDictionary::new();
        loop {
            let kind = r.u8()?;
            if kind == TYPE_END {
                break;
            }
            let key_len = length(r.i32()?)?;
            let key = String::from_utf8(r.take(key_len)?.to_vec())
                .map_err(|_| KpxError::header("dictionary key is not UTF-8"))?;
            let value_len = length(r.i32()?)?;
            let value = r.take(value_len)?;
            dict.set(key.clone(), Variant::decode(kind, &key, value)?);
        }
        Ok(dict)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = DICTIONARY_VERSION.to_le_bytes().to_vec();
        for (key, value) in &self.items {
            let bytes = value.value_bytes();
            out.push(value.type_byte());
            out.extend_from_slice(&(key.len() as i32).to_le_bytes());
            out.extend_from_slice(key.as_bytes());
            out.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
            out.extend_from_slice(&bytes);
        }
        out.push(TYPE_END);
        out
    }

    fn bytes(&self, key: &str) -> KpxResult<Option<Vec<u8>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Variant::Bytes(b)) => Ok(Some(b.clone())),
            Some(other) => Err(wrong_type(key, other)),
        }
    }

    fn u32(&self, key: &str) -> KpxResult<Option<u32>> {
        match self.get(key) {
            None => Ok(None),
            Some(Variant::U32(v)) => Ok(Some(*v)),
            Some(other) => Err(wrong_type(key, other)),
        }
    }

    fn u64(&self, key: &str) -> KpxResult<Option<u64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Variant::U64(v)) => Ok(Some(*v)),
            Some(other) => Err(wrong_type(key, other)),
        }
    }
}

fn length(len: i32) -> KpxResult<usize> {
    usize::try_from(len).map_err(|_| KpxError::header(format!("negative dictionary length {len}")))
}

fn wrong_type(key: &str, value: &Variant) -> KpxError {
    KpxError::header(format!("dictionary value {key:?} has wrong type {value:?}"))
}

fn required<T>(value: Option<T>, key: &str) -> KpxResult<T> {
    value.ok_or_else(|| KpxError::header(format!("KDF parameters missing {key:?}")))
}

/// Decode KDF parameters, dispatching on `$UUID`.
pub fn kdf_from_dictionary(dict: &VariantDictionary) -> KpxResult<KdfParameters> {
    let uuid = required(dict.bytes(KDF_UUID)?, KDF_UUID)?;
    if uuid.as_slice() == AES_KDF_UUID {
        let seed = required(dict.bytes(AES_SEED)?, AES_SEED)?;
        let seed: [u8; 32] = seed
            .as_slice()
            .try_into()
            .map_err(|_| KpxError::header(format!("AES-KDF seed must be 32 bytes, got {}", seed.len())))?;
        let rounds = dict.u64(AES_ROUNDS)?.unwrap_or(DEFAULT_AES_ROUNDS);
        Ok(KdfParameters::Aes { rounds, seed })
    } else if uuid.as_slice() == ARGON2D_UUID {
        let memory_bytes = required(dict.u64(ARGON2_MEMORY)?, ARGON2_MEMORY)?;
        Ok(KdfParameters::Argon2d(Argon2Params {
            salt: required(dict.bytes(ARGON2_SALT)?, ARGON2_SALT)?,
            parallelism: required(dict.u32(ARGON2_PARALLELISM)?, ARGON2_PARALLELISM)?,
            memory_kib: memory_bytes / 1024,
            iterations: required(dict.u64(ARGON2_ITERATIONS)?, ARGON2_ITERATIONS)?,
            version: required(dict.u32(ARGON2_VERSION)?, ARGON2_VERSION)?,
            secret: dict.bytes(ARGON2_SECRET)?,
            associated_data: dict.bytes(ARGON2_ASSOCIATED)?,
        }))
    } else {
        Err(KpxError::header(format!("unknown KDF UUID {uuid:02x?}")))
    }
}

pub fn kdf_to_dictionary(params: &KdfParameters) -> VariantDictionary {
    let mut dict = VariantDictionary::new();
    dict.set(KDF_UUID, Variant::Bytes(params.uuid().to_vec()));
    match params {
        KdfParameters::Aes { rounds, seed } => {
            dict.set(AES_ROUNDS, Variant::U64(*rounds));
            dict.set(AES_SEED, Variant::Bytes(seed.to_vec()));
        }
        KdfParameters::Argon2d(p) => {
            dict.set(ARGON2_SALT, Variant::Bytes(p.salt.clone()));
            dict.set(ARGON2_PARALLELISM, Variant::U32(p.parallelism));
            dict.set(ARGON2_MEMORY, Variant::U64(p.memory_kib.saturating_mul(1024)));
            dict.set(ARGON2_ITERATIONS, Variant::U64(p.iterations));
            dict.set(ARGON2_VERSION, Variant::U32(p.version));
            if let Some(secret) = &p.secret {
                dict.set(ARGON2_SECRET, Variant::Bytes(secret.clone()));
            }
            if let Some(ad) = &p.associated_data {
                dict.set(ARGON2_ASSOCIATED, Variant::Bytes(ad.clone()));
            }
        }
    }
    dict
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_layout() {
        let mut dict = VariantDictionary::new();
        dict.set("P", Variant::U32(2));
        let bytes = dict.to_bytes();
        assert_eq!(
            bytes,
            [0x00, 0x01, 0x04, 1, 0, 0, 0, b'P', 4, 0, 0, 0, 2, 0, 0, 0, 0x00]
        );
        assert_eq!(VariantDictionary::parse(&bytes).unwrap(), dict);
    }

    #[test]
    fn test_all_types_parse_back() {
        let mut dict = VariantDictionary::new();
        dict.set("u32", Variant::U32(7));
        dict.set("u64", Variant::U64(u64::MAX));
        dict.set("bool", Variant::Bool(true));
        dict.set("i32", Variant::I32(-5));
        dict.set("i64", Variant::I64(i64::MIN));
        dict.set("str", Variant::String("héllo".into()));
        dict.set("bytes", Variant::Bytes(vec![1, 2, 3]));
        let parsed = VariantDictionary::parse(&dict.to_bytes()).unwrap();
        assert_eq!(parsed, dict);
        assert_eq!(parsed.len(), 7);
    }

    #[test]
    fn test_newer_major_version_rejected() {
        let bytes = [0x00, 0x02, 0x00];
        assert!(matches!(
            VariantDictionary::parse(&bytes),
            Err(KpxError::HeaderFieldMalformed(_))
        ));
        // minor bumps are accepted
        assert!(VariantDictionary::parse(&[0x05, 0x01, 0x00]).is_ok());
    }

    #[test]
    fn test_truncated_and_bad_sizes_rejected() {
        let mut bytes = VariantDictionary::new().to_bytes();
        bytes.pop();
        assert!(VariantDictionary::parse(&bytes).is_err());
        let bad_u32 = [0x00, 0x01, 0x04, 1, 0, 0, 0, b'P', 2, 0, 0, 0, 2, 0, 0x00];
        assert!(VariantDictionary::parse(&bad_u32).is_err());
        let unknown_type = [0x00, 0x01, 0x77, 1, 0, 0, 0, b'x', 0, 0, 0, 0, 0x00];
        assert!(VariantDictionary::parse(&unknown_type).is_err());
    }

    #[test]
    fn test_kdf_parameters_roundtrip() {
        for params in [KdfParameters::aes(1234), KdfParameters::argon2d(3, 1024, 2)] {
            let dict = kdf_to_dictionary(&params);
            let parsed = kdf_from_dictionary(&VariantDictionary::parse(&dict.to_bytes()).unwrap())
                .unwrap();
            assert_eq!(parsed, params);
            match (&parsed, &params) {
                (KdfParameters::Aes { seed: a, .. }, KdfParameters::Aes { seed: b, .. }) => {
                    assert_eq!(a, b)
                }
                (KdfParameters::Argon2d(a), KdfParameters::Argon2d(b)) => assert_eq!(a.salt, b.salt),
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn test_argon2_memory_stored_in_bytes() {
        let dict = kdf_to_dictionary(&KdfParameters::argon2d(1, 64, 1));
        assert_eq!(dict.get(ARGON2_MEMORY), Some(&Variant::U64(64 * 1024)));

        let huge = kdf_to_dictionary(&KdfParameters::argon2d(1, u64::MAX, 1));
        assert_eq!(huge.get(ARGON2_MEMORY), Some(&Variant::U64(u64::MAX)));
    }

    #[test]
    fn test_aes_rounds_default() {
        let mut dict = VariantDictionary::new();
        dict.set(KDF_UUID, Variant::Bytes(AES_KDF_UUID.to_vec()));
        dict.set(AES_SEED, Variant::Bytes(vec![9; 32]));
        match kdf_from_dictionary(&dict).unwrap() {
            KdfParameters::Aes { rounds, .. } => assert_eq!(rounds, DEFAULT_AES_ROUNDS),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_kdf_rejected() {
        let mut dict = VariantDictionary::new();
        dict.set(KDF_UUID, Variant::Bytes(vec![0; 16]));
        assert!(matches!(
            kdf_from_dictionary(&dict),
            Err(KpxError::HeaderFieldMalformed(_))
        ));
    }
}
