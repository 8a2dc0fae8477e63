//! V3 hashed block stream.
//!
//! ```text
//! repeated: u32 index | 32-byte SHA-256(data) | u32 size | data
//! final:    u32 index | 32 zero bytes         | u32 0
//! ```

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use kpx_core::{KpxError, KpxResult};

use crate::bytes::ByteReader;

/// Block size used on write
pub const BLOCK_SIZE: usize = 1024 * 1024;

/// Verify and concatenate every block. Any mismatch is `CouldNotDecrypt`.
pub fn read_hashed_blocks(data: &[u8], cancel: &CancellationToken) -> KpxResult<Vec<u8>> {
    let mut r = ByteReader::body(data);
    let mut out = Vec::with_capacity(data.len());
    let mut expected: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(KpxError::OperationCancelled);
        }
        let index = r.u32()?;
        if index != expected {
            return Err(KpxError::CouldNotDecrypt);
        }
        let hash: [u8; 32] = r.array()?;
        let size = r.u32()? as usize;
        if size == 0 {
            if hash != [0u8; 32] {
                return Err(KpxError::CouldNotDecrypt);
            }
            break;
        }
        let block = r.take(size)?;
        if Sha256::digest(block).as_slice() != hash {
            return Err(KpxError::CouldNotDecrypt);
        }
        out.extend_from_slice(block);
        expected = expected.wrapping_add(1);
    }
    Ok(out)
}

pub fn write_hashed_blocks(data: &[u8], block_size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + (data.len() / block_size.max(1) + 2) * 40);
    let mut index: u32 = 0;
    for block in data.chunks(block_size.max(1)) {
        out.extend_from_slice(&index.to_le_bytes());
        out.extend_from_slice(&Sha256::digest(block));
        out.extend_from_slice(&(block.len() as u32).to_le_bytes());
        out.extend_from_slice(block);
        index = index.wrapping_add(1);
    }
    out.extend_from_slice(&index.to_le_bytes());
    out.extend_from_slice(&[0u8; 32]);
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}
