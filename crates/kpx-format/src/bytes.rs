//! Little-endian cursor over an in-memory buffer.

use kpx_core::{KpxError, KpxResult};

pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    /// Builds the error for a short read
    short: fn(String) -> KpxError,
}

impl<'a> ByteReader<'a> {
    /// Short reads report `HeaderFieldMalformed`.
    pub fn header(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            short: KpxError::HeaderFieldMalformed,
        }
    }

    /// Short reads report `CouldNotDecrypt`.
    pub fn body(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            short: |_| KpxError::CouldNotDecrypt,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn take(&mut self, n: usize) -> KpxResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                (self.short)(format!(
                    "need {n} bytes at offset {}, {} left",
                    self.pos,
                    self.data.len() - self.pos
                ))
            })?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn array<const N: usize>(&mut self) -> KpxResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> KpxResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u16(&mut self) -> KpxResult<u16> {
        self.array().map(u16::from_le_bytes)
    }

    pub fn u32(&mut self) -> KpxResult<u32> {
        self.array().map(u32::from_le_bytes)
    }

    pub fn i32(&mut self) -> KpxResult<i32> {
        self.array().map(i32::from_le_bytes)
    }

    pub fn u64(&mut self) -> KpxResult<u64> {
        self.array().map(u64::from_le_bytes)
    }
}
