//! Write pipeline: serialize → compress → derive → encrypt → header + body.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use kpx_core::config::{DatabaseConfig, KdfConfig};
use kpx_core::{CipherId, Compression, FormatVersion, InnerStreamId, KdfAlgorithm, KpxError, KpxResult};
use kpx_crypto::{cipher, derive_cipher_key, derive_hmac_base, CompositeKey, KdfParameters, RandomStream};
use kpx_dom::Document;

use crate::compression::compress;
use crate::hashed_block::{self, write_hashed_blocks};
use crate::header::OuterHeader;
use crate::hmac_block::{self, header_mac, write_hmac_blocks};
use crate::inner_header::InnerHeader;
use crate::reader::KdbxReader;
use crate::variant::VariantDictionary;

/// Encryption settings plus the credentials to save with.
///
/// Every write draws a fresh master seed, IV, stream key and KDF seed; the
/// cost parameters and algorithm choices persist between writes.
#[derive(Debug, Clone)]
pub struct KdbxWriter {
    cipher: CipherId,
    compression: Compression,
    kdf: KdfParameters,
    inner_stream: InnerStreamId,
    comment: Option<Vec<u8>>,
    public_custom_data: Option<VariantDictionary>,
    /// Set for files read as V4, which are never written back as V3
    keep_v4: bool,
    key: CompositeKey,
}

impl KdbxWriter {
    /// Settings for a new database from config defaults.
    pub fn new(key: CompositeKey, database: &DatabaseConfig, kdf: &KdfConfig) -> Self {
        Self {
            cipher: database.cipher,
            compression: database.compression,
            kdf: KdfParameters::from_config(kdf),
            inner_stream: database.inner_stream,
            comment: None,
            public_custom_data: None,
            keep_v4: false,
            key,
        }
    }

    /// Keep the choices of a file that was read, so it can be saved again
    /// with the same credentials. A V4 file's inner stream is only known
    /// after `decrypt_body`; before that ChaCha20 is assumed.
    pub fn from_reader(reader: &KdbxReader, key: CompositeKey) -> Self {
        let header = reader.header();
        let inner_stream = reader.inner_stream().unwrap_or(InnerStreamId::ChaCha20);
        Self {
            cipher: header.cipher,
            compression: header.compression,
            kdf: header.kdf.clone(),
            inner_stream,
            comment: header.comment.clone(),
            public_custom_data: header.public_custom_data.clone(),
            keep_v4: header.version == FormatVersion::V4,
            key,
        }
    }

    pub fn cipher(&self) -> CipherId {
        self.cipher
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn kdf(&self) -> &KdfParameters {
        &self.kdf
    }

    pub fn inner_stream(&self) -> InnerStreamId {
        self.inner_stream
    }

    pub fn set_cipher(&mut self, cipher: CipherId) {
        self.cipher = cipher;
    }

    pub fn set_compression(&mut self, compression: Compression) {
        self.compression = compression;
    }

    /// Replace the KDF parameter set wholesale.
    pub fn set_kdf(&mut self, kdf: KdfParameters) {
        self.kdf = kdf;
    }

    pub fn set_inner_stream(&mut self, inner_stream: InnerStreamId) {
        self.inner_stream = inner_stream;
    }

    pub fn set_key(&mut self, key: CompositeKey) {
        self.key = key;
    }

    /// V4 whenever a choice needs it or the file was read as V4, V3 otherwise.
    pub fn version(&self) -> FormatVersion {
        if self.keep_v4
            || self.cipher == CipherId::ChaCha20
            || self.inner_stream == InnerStreamId::ChaCha20
            || self.kdf.algorithm() == KdfAlgorithm::Argon2d
        {
            FormatVersion::V4
        } else {
            FormatVersion::V3
        }
    }

    pub fn write(&self, document: &Document, cancel: &CancellationToken) -> KpxResult<Vec<u8>> {
        if self.key.is_empty() {
            return Err(KpxError::Other(anyhow::anyhow!("no credentials to save with")));
        }
        self.kdf.check()?;
        let version = self.version();
        let mut header = OuterHeader::generate(
            version,
            self.cipher,
            self.compression,
            &self.kdf,
            self.inner_stream,
        );
        header.comment = self.comment.clone();
        if version == FormatVersion::V4 {
            header.public_custom_data = self.public_custom_data.clone();
        }
        let header_bytes = header.to_bytes()?;

        let transformed = self.key.transform(&header.kdf, cancel)?;
        let cipher_key = derive_cipher_key(&header.master_seed, &transformed);
        debug!(?version, cipher = ?self.cipher, "keys derived for write");

        let mut out = header_bytes.clone();
        match version {
            FormatVersion::V3 => {
                let legacy = header
                    .legacy
                    .as_ref()
                    .ok_or_else(|| KpxError::header("V3 header without stream fields"))?;
                let header_hash = Sha256::digest(&header_bytes);
                let mut stream = RandomStream::new(legacy.inner_stream, &legacy.protected_stream_key)?;
                let xml = document.to_xml(
                    FormatVersion::V3,
                    self.compression,
                    &mut stream,
                    Some(header_hash.as_slice()),
                )?;
                let payload = compress(&xml, self.compression, cancel)?;

                let mut plain = legacy.stream_start_bytes.clone();
                plain.extend_from_slice(&write_hashed_blocks(&payload, hashed_block::BLOCK_SIZE));
                out.extend_from_slice(&cipher::encrypt(self.cipher, &cipher_key, &header.iv, &plain)?);
            }
            FormatVersion::V4 => {
                let hmac_base = derive_hmac_base(&header.master_seed, &transformed);
                out.extend_from_slice(&Sha256::digest(&header_bytes));
                out.extend_from_slice(&header_mac(&hmac_base, &header_bytes)?);

                let (mut stream, stream_key) = RandomStream::generate(self.inner_stream);
                let inner = InnerHeader {
                    inner_stream: self.inner_stream,
                    stream_key: stream_key.into(),
                    binaries: document.binaries.clone(),
                };
                let mut payload = inner.to_bytes();
                payload.extend_from_slice(&document.to_xml(
                    FormatVersion::V4,
                    self.compression,
                    &mut stream,
                    None,
                )?);
                let packed = compress(&payload, self.compression, cancel)?;
                let ciphertext = cipher::encrypt(self.cipher, &cipher_key, &header.iv, &packed)?;
                out.extend_from_slice(&write_hmac_blocks(&ciphertext, &hmac_base, hmac_block::BLOCK_SIZE)?);
            }
        }

        info!(?version, bytes = out.len(), "database encrypted");
        Ok(out)
    }

    /// Write to `path` via a sibling temp file and rename.
    pub fn write_file(&self, path: &Path, document: &Document, cancel: &CancellationToken) -> KpxResult<()> {
        let bytes = self.write(document, cancel)?;
        let tmp = path.with_extension("kpx-tmp");
        let result = std::fs::write(&tmp, &bytes).and_then(|()| std::fs::rename(&tmp, path));
        if let Err(err) = result {
            let _ = std::fs::remove_file(&tmp);
            return Err(err.into());
        }
        debug!(path = %path.display(), bytes = bytes.len(), "container written");
        Ok(())
    }
}
