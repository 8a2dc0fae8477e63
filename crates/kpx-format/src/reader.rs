//! Read pipeline: header phase, then body phase once credentials are known.

use std::path::Path;
use std::sync::OnceLock;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use kpx_core::config::LimitsConfig;
use kpx_core::{FormatVersion, InnerStreamId, KpxError, KpxResult};
use kpx_crypto::{cipher, derive_cipher_key, derive_hmac_base, CompositeKey, RandomStream};
use kpx_dom::{BinaryPool, Document};

use crate::compression::decompress;
use crate::hashed_block::read_hashed_blocks;
use crate::header::OuterHeader;
use crate::hmac_block::{read_hmac_blocks, verify_header_mac};
use crate::inner_header::InnerHeader;

const HASH_LEN: usize = 32;

/// A container whose header has been validated and whose body is still
/// encrypted.
#[derive(Debug)]
pub struct KdbxReader {
    header: OuterHeader,
    header_bytes: Vec<u8>,
    /// V4 header HMAC, checked in the body phase
    header_mac: Option<[u8; HASH_LEN]>,
    body: Vec<u8>,
    /// V4 inner stream, known once the inner header has been parsed
    inner_stream: OnceLock<InnerStreamId>,
}

impl KdbxReader {
    /// Header phase with the default resource limits.
    pub fn read_header(data: &[u8]) -> KpxResult<Self> {
        Self::read_header_with_limits(data, &LimitsConfig::default())
    }

    /// Parse the outer header, verify its hash (V4) and check the KDF
    /// parameters against `limits`.
    pub fn read_header_with_limits(data: &[u8], limits: &LimitsConfig) -> KpxResult<Self> {
        let (header, header_len) = OuterHeader::parse(data)?;
        header.kdf.validate(limits)?;
        let header_bytes = data[..header_len].to_vec();
        let mut rest = &data[header_len..];

        let header_mac = match header.version {
            FormatVersion::V3 => None,
            FormatVersion::V4 => {
                if rest.len() < 2 * HASH_LEN {
                    return Err(KpxError::header("header hash and HMAC missing"));
                }
                let (stored_hash, after) = rest.split_at(HASH_LEN);
                if Sha256::digest(&header_bytes).as_slice() != stored_hash {
                    return Err(KpxError::HeaderIntegrityMismatch);
                }
                let (mac, after) = after.split_at(HASH_LEN);
                rest = after;
                let mut stored = [0u8; HASH_LEN];
                stored.copy_from_slice(mac);
                Some(stored)
            }
        };

        Ok(Self {
            header,
            header_bytes,
            header_mac,
            body: rest.to_vec(),
            inner_stream: OnceLock::new(),
        })
    }

    /// Read a file and run the header phase.
    pub fn open(path: &Path, limits: &LimitsConfig) -> KpxResult<Self> {
        let data = std::fs::read(path)?;
        debug!(path = %path.display(), bytes = data.len(), "container read");
        Self::read_header_with_limits(&data, limits)
    }

    pub fn header(&self) -> &OuterHeader {
        &self.header
    }

    /// Raw header bytes as stored, end field included.
    pub fn header_bytes(&self) -> &[u8] {
        &self.header_bytes
    }

    /// Inner stream the payload was protected with. V3 carries it in the
    /// outer header; V4 only after a successful `decrypt_body`.
    pub fn inner_stream(&self) -> Option<InnerStreamId> {
        match &self.header.legacy {
            Some(legacy) => Some(legacy.inner_stream),
            None => self.inner_stream.get().copied(),
        }
    }

    /// Derive keys, decrypt, verify and parse the payload. Either a complete
    /// document or an error; wrong credentials are `CouldNotDecrypt`.
    pub fn decrypt_body(&self, key: &CompositeKey, cancel: &CancellationToken) -> KpxResult<Document> {
        let transformed = key.transform(&self.header.kdf, cancel)?;
        if cancel.is_cancelled() {
            return Err(KpxError::OperationCancelled);
        }
        let cipher_key = derive_cipher_key(&self.header.master_seed, &transformed);

        let document = match self.header.version {
            FormatVersion::V3 => {
                let legacy = self
                    .header
                    .legacy
                    .as_ref()
                    .ok_or_else(|| KpxError::header("V3 header without stream fields"))?;
                let plain = cipher::decrypt(self.header.cipher, &cipher_key, &self.header.iv, &self.body)?;
                let start = legacy.stream_start_bytes.len();
                if plain.len() < start || plain[..start] != legacy.stream_start_bytes[..] {
                    return Err(KpxError::CouldNotDecrypt);
                }
                let payload = read_hashed_blocks(&plain[start..], cancel)?;
                let xml = decompress(&payload, self.header.compression, cancel)?;

                let mut stream = RandomStream::new(legacy.inner_stream, &legacy.protected_stream_key)?;
                let document = Document::from_xml(&xml, FormatVersion::V3, &mut stream, BinaryPool::new())?;
                if let Some(stored) = &document.header_hash {
                    if Sha256::digest(&self.header_bytes).as_slice() != stored.as_slice() {
                        return Err(KpxError::HeaderIntegrityMismatch);
                    }
                }
                document
            }
            FormatVersion::V4 => {
                let hmac_base = derive_hmac_base(&self.header.master_seed, &transformed);
                let stored = self
                    .header_mac
                    .ok_or_else(|| KpxError::header("V4 header without HMAC"))?;
                verify_header_mac(&hmac_base, &self.header_bytes, &stored)?;
                let ciphertext = read_hmac_blocks(&self.body, &hmac_base, cancel)?;
                let plain = cipher::decrypt(self.header.cipher, &cipher_key, &self.header.iv, &ciphertext)?;
                let payload = decompress(&plain, self.header.compression, cancel)?;

                let (inner, xml) = InnerHeader::parse(&payload)?;
                let mut stream = RandomStream::new(inner.inner_stream, &inner.stream_key)?;
                let document = Document::from_xml(xml, FormatVersion::V4, &mut stream, inner.binaries)?;
                let _ = self.inner_stream.set(inner.inner_stream);
                document
            }
        };

        info!(
            version = ?self.header.version,
            nodes = document.tree.len(),
            "database decrypted"
        );
        Ok(document)
    }
}
