//! V4 HMAC block stream and header authentication.
//!
//! ```text
//! repeated: 32-byte MAC | i32 size | data
//! MAC = HMAC-SHA-256(blockKey(i), u64le(i) || i32le(size) || data)
//! final block has size 0
//! ```

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio_util::sync::CancellationToken;

use kpx_core::{KpxError, KpxResult};
use kpx_crypto::keys::HEADER_BLOCK_INDEX;
use kpx_crypto::HmacBaseKey;

use crate::bytes::ByteReader;

type HmacSha256 = Hmac<Sha256>;

pub const BLOCK_SIZE: usize = 1024 * 1024;

fn block_mac(base: &HmacBaseKey, index: u64, size: i32, data: &[u8]) -> KpxResult<HmacSha256> {
    let key = base.block_key(index);
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| KpxError::Other(anyhow::anyhow!("HMAC init: {e}")))?;
    mac.update(&index.to_le_bytes());
    mac.update(&size.to_le_bytes());
    mac.update(data);
    Ok(mac)
}

/// HMAC of the serialized outer header.
pub fn header_mac(base: &HmacBaseKey, header: &[u8]) -> KpxResult<[u8; 32]> {
    let key = base.block_key(HEADER_BLOCK_INDEX);
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| KpxError::Other(anyhow::anyhow!("HMAC init: {e}")))?;
    mac.update(header);
    Ok(mac.finalize().into_bytes().into())
}

/// Constant-time check of the stored header MAC. Mismatch is `CouldNotDecrypt`.
pub fn verify_header_mac(base: &HmacBaseKey, header: &[u8], stored: &[u8]) -> KpxResult<()> {
    let key = base.block_key(HEADER_BLOCK_INDEX);
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| KpxError::Other(anyhow::anyhow!("HMAC init: {e}")))?;
    mac.update(header);
    mac.verify_slice(stored).map_err(|_| KpxError::CouldNotDecrypt)
}

/// Verify every block and return the reassembled ciphertext.
pub fn read_hmac_blocks(
    data: &[u8],
    base: &HmacBaseKey,
    cancel: &CancellationToken,
) -> KpxResult<Vec<u8>> {
    let mut r = ByteReader::body(data);
    let mut out = Vec::with_capacity(data.len());
    let mut index: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(KpxError::OperationCancelled);
        }
        let stored: [u8; 32] = r.array()?;
        let size = r.i32()?;
        let len = usize::try_from(size).map_err(|_| KpxError::CouldNotDecrypt)?;
        let block = r.take(len)?;
        block_mac(base, index, size, block)?
            .verify_slice(&stored)
            .map_err(|_| KpxError::CouldNotDecrypt)?;
        if len == 0 {
            break;
        }
        out.extend_from_slice(block);
        index += 1;
    }
    Ok(out)
}

pub fn write_hmac_blocks(data: &[u8], base: &HmacBaseKey, block_size: usize) -> KpxResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() + (data.len() / block_size.max(1) + 2) * 36);
    let mut index: u64 = 0;
    let push = |out: &mut Vec<u8>, index: u64, block: &[u8]| -> KpxResult<()> {
        let size = i32::try_from(block.len())
            .map_err(|_| KpxError::Other(anyhow::anyhow!("block of {} bytes", block.len())))?;
        let mac = block_mac(base, index, size, block)?.finalize().into_bytes();
        out.extend_from_slice(&mac);
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(block);
        Ok(())
    };
    for block in data.chunks(block_size.max(1)) {
        push(&mut out, index, block)?;
        index += 1;
    }
    push(&mut out, index, &[])?;
    Ok(out)
}
