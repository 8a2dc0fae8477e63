//! V4 inner header, the first part of the decrypted payload.
//!
//! ```text
//! repeated: u8 id | u32 size | value
//! 0 end | 1 inner stream id (u32) | 2 inner stream key | 3 binary (flags, data)
//! ```

use zeroize::Zeroizing;

use kpx_core::{InnerStreamId, KpxError, KpxResult};
use kpx_dom::{BinaryPool, ProtectedBinary};

use crate::bytes::ByteReader;

const END: u8 = 0;
const STREAM_ID: u8 = 1;
const STREAM_KEY: u8 = 2;
const BINARY: u8 = 3;

const FLAG_PROTECTED: u8 = 0x01;

pub struct InnerHeader {
    pub inner_stream: InnerStreamId,
    pub stream_key: Zeroizing<Vec<u8>>,
    pub binaries: BinaryPool,
}

impl InnerHeader {
    /// Parse from the start of `data`; returns the header and the XML that follows.
    pub fn parse(data: &[u8]) -> KpxResult<(Self, &[u8])> {
        let mut r = ByteReader::header(data);
        let mut inner_stream = None;
        let mut stream_key = None;
        let mut binaries = BinaryPool::new();

        loop {
            let id = r.u8()?;
            let size = r.u32()? as usize;
            let value = r.take(size)?;
            match id {
                END => break,
                STREAM_ID => {
                    let raw: [u8; 4] = value.try_into().map_err(|_| {
                        KpxError::header(format!("inner stream id must be 4 bytes, got {size}"))
                    })?;
                    inner_stream = Some(InnerStreamId::from_id(u32::from_le_bytes(raw))?);
                }
                STREAM_KEY => {
                    if value.is_empty() {
                        return Err(KpxError::header("inner stream key is empty"));
                    }
                    stream_key = Some(Zeroizing::new(value.to_vec()));
                }
                BINARY => {
                    let (flags, bytes) = value
                        .split_first()
                        .ok_or_else(|| KpxError::header("inner binary without flags byte"))?;
                    binaries.push(ProtectedBinary::new(
                        bytes.to_vec(),
                        flags & FLAG_PROTECTED != 0,
                    ));
                }
                other => {
                    return Err(KpxError::header(format!("unknown inner header field {other}")))
                }
            }
        }

        let header = InnerHeader {
            inner_stream: inner_stream
                .ok_or_else(|| KpxError::header("missing required field: inner stream id"))?,
            stream_key: stream_key
                .ok_or_else(|| KpxError::header("missing required field: inner stream key"))?,
            binaries,
        };
        Ok((header, r.remaining()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut put = |id: u8, value: &[u8]| {
            out.push(id);
            out.extend_from_slice(&(value.len() as u32).to_le_bytes());
            out.extend_from_slice(value);
        };
        put(STREAM_ID, &self.inner_stream.id().to_le_bytes()[..]);
        put(STREAM_KEY, self.stream_key.as_slice());
        for binary in self.binaries.iter() {
            let mut value = Zeroizing::new(Vec::with_capacity(binary.data().len() + 1));
            value.push(if binary.is_protected() { FLAG_PROTECTED } else { 0 });
            value.extend_from_slice(binary.data());
            put(BINARY, value.as_slice());
        }
        put(END, &[]);
        out
    }
}
