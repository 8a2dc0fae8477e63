//! Outer header: signature, version word and the TLV field list.
//!
//! ```text
//! u32 sig1 | u32 sig2 | u32 version
//! repeated: u8 id | u16 (V3) or u32 (V4) size | value
//! id 0 (end) with value 0D 0A 0D 0A
//! ```

use rand::RngCore;
use serde::Serialize;
use tracing::debug;
use zeroize::Zeroizing;

use kpx_core::{CipherId, Compression, FormatVersion, InnerStreamId, KpxError, KpxResult};
use kpx_crypto::KdfParameters;

use crate::bytes::ByteReader;
use crate::variant::{kdf_from_dictionary, kdf_to_dictionary, VariantDictionary};

pub const SIGNATURE_1: u32 = 0x9AA2_D903;
pub const SIGNATURE_2: u32 = 0xB54B_FB67;
/// Second signature of the legacy KeePass 1 format
pub const SIGNATURE_2_KDB: u32 = 0xB54B_FB65;
/// Second signature of pre-release 2.x files
pub const SIGNATURE_2_PRERELEASE: u32 = 0xB54B_FB66;

pub const END_OF_HEADER: [u8; 4] = [0x0D, 0x0A, 0x0D, 0x0A];
pub const MASTER_SEED_LEN: usize = 32;
pub const STREAM_START_LEN: usize = 32;

/// Field ids of the outer header
pub mod field {
    pub const END: u8 = 0;
    pub const COMMENT: u8 = 1;
    pub const CIPHER_ID: u8 = 2;
    pub const COMPRESSION: u8 = 3;
    pub const MASTER_SEED: u8 = 4;
    pub const TRANSFORM_SEED: u8 = 5;
    pub const TRANSFORM_ROUNDS: u8 = 6;
    pub const ENCRYPTION_IV: u8 = 7;
    pub const PROTECTED_STREAM_KEY: u8 = 8;
    pub const STREAM_START_BYTES: u8 = 9;
    pub const INNER_STREAM_ID: u8 = 10;
    pub const KDF_PARAMETERS: u8 = 11;
    pub const PUBLIC_CUSTOM_DATA: u8 = 12;
}

/// V3 keeps the inner stream setup in the outer header; V4 moves it into the
/// encrypted inner header.
#[derive(Clone)]
pub struct LegacyStream {
    pub protected_stream_key: Zeroizing<Vec<u8>>,
    pub stream_start_bytes: Vec<u8>,
    pub inner_stream: InnerStreamId,
}

/// A validated outer header.
#[derive(Clone)]
pub struct OuterHeader {
    pub version: FormatVersion,
    /// Version word as stored, minor half included
    pub version_word: u32,
    pub cipher: CipherId,
    pub compression: Compression,
    pub master_seed: [u8; MASTER_SEED_LEN],
    pub kdf: KdfParameters,
    pub iv: Vec<u8>,
    pub comment: Option<Vec<u8>>,
    pub public_custom_data: Option<VariantDictionary>,
    /// Present exactly for V3
    pub legacy: Option<LegacyStream>,
}

/// Non-secret header summary for display.
#[derive(Debug, Clone, Serialize)]
pub struct HeaderSummary {
    pub version: String,
    pub cipher: CipherId,
    pub compression: Compression,
    pub kdf: String,
    pub kdf_cost: String,
    pub inner_stream: Option<InnerStreamId>,
    pub public_custom_data: Option<VariantDictionary>,
}

impl OuterHeader {
    /// Fresh header for a write: random seed and IV, the given KDF reseeded.
    pub fn generate(
        version: FormatVersion,
        cipher: CipherId,
        compression: Compression,
        kdf: &KdfParameters,
        inner_stream: InnerStreamId,
    ) -> Self {
        let mut rng = rand::rngs::OsRng;
        let mut master_seed = [0u8; MASTER_SEED_LEN];
        rng.fill_bytes(&mut master_seed);
        let mut iv = vec![0u8; cipher.iv_len()];
        rng.fill_bytes(&mut iv);

        let legacy = (version == FormatVersion::V3).then(|| {
            let mut key = Zeroizing::new(vec![0u8; 32]);
            rng.fill_bytes(&mut key);
            let mut start = vec![0u8; STREAM_START_LEN];
            rng.fill_bytes(&mut start);
            LegacyStream {
                protected_stream_key: key,
                stream_start_bytes: start,
                inner_stream,
            }
        });

        Self {
            version,
            version_word: version.word(),
            cipher,
            compression,
            master_seed,
            kdf: kdf.reseed(),
            iv,
            comment: None,
            public_custom_data: None,
            legacy,
        }
    }

    /// Parse and validate the header at the start of `data`. Returns the
    /// header and its length in bytes, end field included.
    pub fn parse(data: &[u8]) -> KpxResult<(Self, usize)> {
        let mut r = ByteReader::header(data);
        let (sig1, sig2) = match (r.u32(), r.u32()) {
            (Ok(a), Ok(b)) => (a, b),
            _ => return Err(KpxError::SignatureInvalid("file too short".into())),
        };
        if sig1 != SIGNATURE_1 {
            return Err(KpxError::SignatureInvalid(format!("{sig1:#010x}")));
        }
        match sig2 {
            SIGNATURE_2 => {}
            SIGNATURE_2_KDB => {
                return Err(KpxError::SignatureInvalid(
                    "KeePass 1.x database, not supported".into(),
                ))
            }
            SIGNATURE_2_PRERELEASE => {
                return Err(KpxError::SignatureInvalid(
                    "pre-release 2.x database, not supported".into(),
                ))
            }
            other => return Err(KpxError::SignatureInvalid(format!("{other:#010x}"))),
        }

        let version_word = r.u32()?;
        let version = FormatVersion::from_word(version_word)?;
        let mut fields = RawFields::default();

        loop {
            let id = r.u8()?;
            let size = match version {
                FormatVersion::V3 => usize::from(r.u16()?),
                FormatVersion::V4 => r.u32()? as usize,
            };
            let value = r.take(size)?;
            if id == field::END {
                break;
            }
            fields.put(version, id, value)?;
        }

        let header = fields.finish(version, version_word)?;
        debug!(
            ?version,
            cipher = ?header.cipher,
            compression = ?header.compression,
            kdf = ?header.kdf.algorithm(),
            "outer header parsed"
        );
        Ok((header, r.position()))
    }

    /// Serialize signature, version and fields, end marker included.
    pub fn to_bytes(&self) -> KpxResult<Vec<u8>> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(&SIGNATURE_1.to_le_bytes());
        out.extend_from_slice(&SIGNATURE_2.to_le_bytes());
        out.extend_from_slice(&self.version_word.to_le_bytes());

        let v = self.version;
        if let Some(comment) = &self.comment {
            put_field(&mut out, v, field::COMMENT, comment)?;
        }
        put_field(&mut out, v, field::CIPHER_ID, &self.cipher.uuid())?;
        put_field(
            &mut out,
            v,
            field::COMPRESSION,
            &self.compression.flag().to_le_bytes(),
        )?;
        put_field(&mut out, v, field::MASTER_SEED, &self.master_seed)?;

        match (v, &self.legacy) {
            (FormatVersion::V3, Some(legacy)) => {
                let KdfParameters::Aes { rounds, seed } = &self.kdf else {
                    return Err(KpxError::header("V3 containers require the AES KDF"));
                };
                put_field(&mut out, v, field::TRANSFORM_SEED, seed)?;
                put_field(&mut out, v, field::TRANSFORM_ROUNDS, &rounds.to_le_bytes())?;
                put_field(&mut out, v, field::ENCRYPTION_IV, &self.iv)?;
                put_field(
                    &mut out,
                    v,
                    field::PROTECTED_STREAM_KEY,
                    &legacy.protected_stream_key,
                )?;
                put_field(
                    &mut out,
                    v,
                    field::STREAM_START_BYTES,
                    &legacy.stream_start_bytes,
                )?;
                put_field(
                    &mut out,
                    v,
                    field::INNER_STREAM_ID,
                    &legacy.inner_stream.id().to_le_bytes(),
                )?;
            }
            (FormatVersion::V4, None) => {
                put_field(
                    &mut out,
                    v,
                    field::KDF_PARAMETERS,
                    &kdf_to_dictionary(&self.kdf).to_bytes(),
                )?;
                put_field(&mut out, v, field::ENCRYPTION_IV, &self.iv)?;
                if let Some(custom) = &self.public_custom_data {
                    put_field(&mut out, v, field::PUBLIC_CUSTOM_DATA, &custom.to_bytes())?;
                }
            }
            _ => return Err(KpxError::header("inner stream setup does not match version")),
        }

        put_field(&mut out, v, field::END, &END_OF_HEADER)?;
        Ok(out)
    }

    pub fn summary(&self) -> HeaderSummary {
        let (kdf, kdf_cost) = match &self.kdf {
            KdfParameters::Aes { rounds, .. } => ("aes".to_string(), format!("{rounds} rounds")),
            KdfParameters::Argon2d(p) => (
                "argon2d".to_string(),
                format!(
                    "{} iterations, {} KiB, {} lanes",
                    p.iterations, p.memory_kib, p.parallelism
                ),
            ),
        };
        HeaderSummary {
            version: format!(
                "{}.{}",
                self.version_word >> 16,
                self.version_word & 0xFFFF
            ),
            cipher: self.cipher,
            compression: self.compression,
            kdf,
            kdf_cost,
            inner_stream: self.legacy.as_ref().map(|l| l.inner_stream),
            public_custom_data: self.public_custom_data.clone(),
        }
    }
}

impl std::fmt::Debug for OuterHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OuterHeader")
            .field("version_word", &format_args!("{:#010x}", self.version_word))
            .field("cipher", &self.cipher)
            .field("compression", &self.compression)
            .field("kdf", &self.kdf)
            .finish_non_exhaustive()
    }
}

fn put_field(out: &mut Vec<u8>, version: FormatVersion, id: u8, value: &[u8]) -> KpxResult<()> {
    out.push(id);
    match version {
        FormatVersion::V3 => {
            let size = u16::try_from(value.len())
                .map_err(|_| KpxError::header(format!("field {id} too large for V3")))?;
            out.extend_from_slice(&size.to_le_bytes());
        }
        FormatVersion::V4 => {
            let size = u32::try_from(value.len())
                .map_err(|_| KpxError::header(format!("field {id} too large")))?;
            out.extend_from_slice(&size.to_le_bytes());
        }
    }
    out.extend_from_slice(value);
    Ok(())
}

/// Fields collected while scanning, validated once the end marker is seen.
#[derive(Default)]
struct RawFields {
    comment: Option<Vec<u8>>,
    cipher: Option<CipherId>,
    compression: Option<Compression>,
    master_seed: Option<[u8; MASTER_SEED_LEN]>,
    transform_seed: Option<[u8; 32]>,
    transform_rounds: Option<u64>,
    iv: Option<Vec<u8>>,
    protected_stream_key: Option<Zeroizing<Vec<u8>>>,
    stream_start_bytes: Option<Vec<u8>>,
    inner_stream: Option<InnerStreamId>,
    kdf: Option<KdfParameters>,
    public_custom_data: Option<VariantDictionary>,
}

fn exact<const N: usize>(id: u8, value: &[u8]) -> KpxResult<[u8; N]> {
    value.try_into().map_err(|_| {
        KpxError::header(format!(
            "field {id} must be {N} bytes, got {}",
            value.len()
        ))
    })
}

impl RawFields {
    fn put(&mut self, version: FormatVersion, id: u8, value: &[u8]) -> KpxResult<()> {
        let v3_only = matches!(
            id,
            field::TRANSFORM_SEED
                | field::TRANSFORM_ROUNDS
                | field::PROTECTED_STREAM_KEY
                | field::STREAM_START_BYTES
                | field::INNER_STREAM_ID
        );
        let v4_only = matches!(id, field::KDF_PARAMETERS | field::PUBLIC_CUSTOM_DATA);
        if (v3_only && version != FormatVersion::V3) || (v4_only && version != FormatVersion::V4) {
            return Err(KpxError::header(format!(
                "field {id} not allowed in {version:?} header"
            )));
        }

        match id {
            field::COMMENT => self.comment = Some(value.to_vec()),
            field::CIPHER_ID => self.cipher = Some(CipherId::from_uuid(value)?),
            field::COMPRESSION => {
                self.compression = Some(Compression::from_flag(u32::from_le_bytes(exact(id, value)?))?)
            }
            field::MASTER_SEED => self.master_seed = Some(exact(id, value)?),
            field::TRANSFORM_SEED => self.transform_seed = Some(exact(id, value)?),
            field::TRANSFORM_ROUNDS => {
                self.transform_rounds = Some(u64::from_le_bytes(exact(id, value)?))
            }
            field::ENCRYPTION_IV => self.iv = Some(value.to_vec()),
            field::PROTECTED_STREAM_KEY => {
                if value.is_empty() {
                    return Err(KpxError::header("protected stream key is empty"));
                }
                self.protected_stream_key = Some(Zeroizing::new(value.to_vec()))
            }
            field::STREAM_START_BYTES => {
                self.stream_start_bytes = Some(exact::<STREAM_START_LEN>(id, value)?.to_vec())
            }
            field::INNER_STREAM_ID => {
                self.inner_stream =
                    Some(InnerStreamId::from_id(u32::from_le_bytes(exact(id, value)?))?)
            }
            field::KDF_PARAMETERS => {
                self.kdf = Some(kdf_from_dictionary(&VariantDictionary::parse(value)?)?)
            }
            field::PUBLIC_CUSTOM_DATA => {
                self.public_custom_data = Some(VariantDictionary::parse(value)?)
            }
            other => return Err(KpxError::header(format!("unknown header field {other}"))),
        }
        Ok(())
    }

    fn finish(self, version: FormatVersion, version_word: u32) -> KpxResult<OuterHeader> {
        fn need<T>(value: Option<T>, name: &str) -> KpxResult<T> {
            value.ok_or_else(|| KpxError::header(format!("missing required field: {name}")))
        }

        let cipher = need(self.cipher, "cipher id")?;
        let iv = need(self.iv, "encryption IV")?;
        if iv.len() != cipher.iv_len() {
            return Err(KpxError::header(format!(
                "{cipher:?} IV must be {} bytes, got {}",
                cipher.iv_len(),
                iv.len()
            )));
        }

        let (kdf, legacy) = match version {
            FormatVersion::V3 => {
                let kdf = KdfParameters::Aes {
                    seed: need(self.transform_seed, "transform seed")?,
                    rounds: need(self.transform_rounds, "transform rounds")?,
                };
                let legacy = LegacyStream {
                    protected_stream_key: need(self.protected_stream_key, "protected stream key")?,
                    stream_start_bytes: need(self.stream_start_bytes, "stream start bytes")?,
                    inner_stream: need(self.inner_stream, "inner stream id")?,
                };
                (kdf, Some(legacy))
            }
            FormatVersion::V4 => (need(self.kdf, "KDF parameters")?, None),
        };

        Ok(OuterHeader {
            version,
            version_word,
            cipher,
            compression: need(self.compression, "compression flag")?,
            master_seed: need(self.master_seed, "master seed")?,
            kdf,
            iv,
            comment: self.comment,
            public_custom_data: self.public_custom_data,
            legacy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4() -> OuterHeader {
        OuterHeader::generate(
            FormatVersion::V4,
            CipherId::ChaCha20,
            Compression::Gzip,
            &KdfParameters::argon2d(2, 1024, 2),
            InnerStreamId::ChaCha20,
        )
    }

    fn v3() -> OuterHeader {
        OuterHeader::generate(
            FormatVersion::V3,
            CipherId::Aes,
            Compression::None,
            &KdfParameters::aes(10),
            InnerStreamId::Salsa20,
        )
    }

    #[test]
    fn test_roundtrip_both_versions() {
        for header in [v3(), v4()] {
            let bytes = header.to_bytes().unwrap();
            let (parsed, len) = OuterHeader::parse(&bytes).unwrap();
            assert_eq!(len, bytes.len());
            assert_eq!(parsed.to_bytes().unwrap(), bytes, "byte-identical rewrite");
            assert_eq!(parsed.kdf, header.kdf);
            assert_eq!(parsed.master_seed, header.master_seed);
        }
    }

    #[test]
    fn test_signature_checks() {
        let mut bytes = v4().to_bytes().unwrap();
        assert!(matches!(
            OuterHeader::parse(&bytes[..5]),
            Err(KpxError::SignatureInvalid(_))
        ));
        bytes[4..8].copy_from_slice(&SIGNATURE_2_KDB.to_le_bytes());
        match OuterHeader::parse(&bytes) {
            Err(KpxError::SignatureInvalid(msg)) => assert!(msg.contains("1.x")),
            other => panic!("unexpected {other:?}"),
        }
        bytes[0] ^= 0xFF;
        assert!(matches!(
            OuterHeader::parse(&bytes),
            Err(KpxError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn test_version_gate() {
        let mut bytes = v4().to_bytes().unwrap();
        bytes[8..12].copy_from_slice(&0x0005_0000u32.to_le_bytes());
        assert!(matches!(
            OuterHeader::parse(&bytes),
            Err(KpxError::UnsupportedVersion(0x0005_0000))
        ));
    }

    #[test]
    fn test_field_in_wrong_version_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&SIGNATURE_1.to_le_bytes());
        bytes.extend_from_slice(&SIGNATURE_2.to_le_bytes());
        bytes.extend_from_slice(&FormatVersion::V4_WORD.to_le_bytes());
        put_field(&mut bytes, FormatVersion::V4, field::TRANSFORM_ROUNDS, &[0; 8]).unwrap();
        assert!(matches!(
            OuterHeader::parse(&bytes),
            Err(KpxError::HeaderFieldMalformed(_))
        ));
    }

    #[test]
    fn test_missing_field_rejected() {
        let header = v3();
        let bytes = header.to_bytes().unwrap();
        // drop everything after the master seed and close the header
        let cut = 12 + (3 + 16) + (3 + 4) + (3 + 32);
        let mut truncated = bytes[..cut].to_vec();
        put_field(&mut truncated, FormatVersion::V3, field::END, &END_OF_HEADER).unwrap();
        match OuterHeader::parse(&truncated) {
            Err(KpxError::HeaderFieldMalformed(msg)) => assert!(msg.contains("missing")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_field_and_bad_size_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&SIGNATURE_1.to_le_bytes());
        bytes.extend_from_slice(&SIGNATURE_2.to_le_bytes());
        bytes.extend_from_slice(&FormatVersion::V3_WORD.to_le_bytes());
        let mut unknown = bytes.clone();
        put_field(&mut unknown, FormatVersion::V3, 42, &[1]).unwrap();
        assert!(OuterHeader::parse(&unknown).is_err());

        put_field(&mut bytes, FormatVersion::V3, field::MASTER_SEED, &[0; 16]).unwrap();
        assert!(matches!(
            OuterHeader::parse(&bytes),
            Err(KpxError::HeaderFieldMalformed(_))
        ));
    }

    #[test]
    fn test_truncated_header_rejected() {
        let bytes = v4().to_bytes().unwrap();
        assert!(matches!(
            OuterHeader::parse(&bytes[..bytes.len() - 2]),
            Err(KpxError::HeaderFieldMalformed(_))
        ));
    }

    #[test]
    fn test_summary_has_no_secrets() {
        let header = v4();
        let summary = header.summary();
        assert_eq!(summary.version, "4.0");
        assert_eq!(summary.kdf, "argon2d");
        let debug = format!("{header:?}");
        assert!(!debug.contains("master_seed"));
    }
}
