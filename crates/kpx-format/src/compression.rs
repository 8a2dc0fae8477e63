//! Payload gzip, processed in chunks so cancellation is observed between them.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tokio_util::sync::CancellationToken;

use kpx_core::{Compression, KpxError, KpxResult};

const CHUNK: usize = 64 * 1024;

pub fn compress(data: &[u8], compression: Compression, cancel: &CancellationToken) -> KpxResult<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Gzip => {
            let mut enc = GzEncoder::new(Vec::with_capacity(data.len() / 2), flate2::Compression::default());
            for chunk in data.chunks(CHUNK) {
                if cancel.is_cancelled() {
                    return Err(KpxError::OperationCancelled);
                }
                enc.write_all(chunk).map_err(anyhow::Error::from)?;
            }
            Ok(enc.finish().map_err(anyhow::Error::from)?)
        }
    }
}

/// A stream that does not inflate is a malformed document; the block layer
/// has already authenticated it.
pub fn decompress(data: &[u8], compression: Compression, cancel: &CancellationToken) -> KpxResult<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Gzip => {
            let mut dec = GzDecoder::new(data);
            let mut out = Vec::with_capacity(data.len() * 4);
            let mut buf = vec![0u8; CHUNK];
            loop {
                if cancel.is_cancelled() {
                    return Err(KpxError::OperationCancelled);
                }
                let n = dec
                    .read(&mut buf)
                    .map_err(|e| KpxError::document(format!("gzip: {e}")))?;
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
            }
            Ok(out)
        }
    }
}
