//! BLAKE2b (RFC 7693): keyed hash with a configurable 1..=64 byte digest
//!
//! Used directly for file checksums and inside Argon2d for the initial hash,
//! the variable-length hash H', and block seeding.

use anyhow::bail;
use zeroize::Zeroize;

/// Compression block size in bytes
pub const BLOCK_SIZE: usize = 128;

/// Largest digest (and key) length in bytes
pub const MAX_OUTPUT: usize = 64;

const IV: [u64; 8] = [
    0x6a09e667f3bcc908,
    0xbb67ae8584caa73b,
    0x3c6ef372fe94f82b,
    0xa54ff53a5f1d36f1,
    0x510e527fade682d1,
    0x9b05688c2b3e6c1f,
    0x1f83d9abfb41bd6b,
    0x5be0cd19137e2179,
];

const SIGMA: [[usize; 16]; 12] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
    [11, 8, 12, 0, 5, 2, 15, 13, 10, 14, 3, 6, 7, 1, 9, 4],
    [7, 9, 3, 1, 13, 12, 11, 14, 2, 6, 5, 10, 4, 0, 15, 8],
    [9, 0, 5, 7, 2, 4, 10, 15, 14, 1, 11, 12, 6, 8, 3, 13],
    [2, 12, 6, 10, 0, 11, 8, 3, 4, 13, 7, 5, 15, 14, 1, 9],
    [12, 5, 1, 15, 14, 13, 4, 10, 0, 7, 6, 3, 9, 2, 8, 11],
    [13, 11, 7, 14, 12, 1, 3, 9, 5, 0, 15, 4, 8, 6, 2, 10],
    [6, 15, 14, 9, 11, 3, 0, 8, 12, 2, 13, 7, 1, 4, 10, 5],
    [10, 2, 8, 4, 7, 6, 1, 5, 15, 11, 9, 14, 3, 12, 13, 0],
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
];

/// Incremental BLAKE2b state.
///
/// The final block must be flagged, so a full buffer is only compressed once
/// more input arrives.
#[derive(Clone)]
pub struct Blake2b {
    h: [u64; 8],
    counter: u128,
    buf: [u8; BLOCK_SIZE],
    buf_len: usize,
    out_len: usize,
}

impl Blake2b {
    /// Unkeyed hasher producing `out_len` bytes.
    pub fn new(out_len: usize) -> anyhow::Result<Self> {
        Self::new_keyed(&[], out_len)
    }

    /// Keyed hasher (MAC mode). An empty key is the unkeyed hash.
    pub fn new_keyed(key: &[u8], out_len: usize) -> anyhow::Result<Self> {
        if out_len == 0 || out_len > MAX_OUTPUT {
            bail!("BLAKE2b output length must be 1..={MAX_OUTPUT}, got {out_len}");
        }
        if key.len() > MAX_OUTPUT {
            bail!("BLAKE2b key must be at most {MAX_OUTPUT} bytes, got {}", key.len());
        }

        let mut h = IV;
        h[0] ^= 0x0101_0000 ^ ((key.len() as u64) << 8) ^ out_len as u64;

        let mut state = Self {
            h,
            counter: 0,
            buf: [0u8; BLOCK_SIZE],
            buf_len: 0,
            out_len,
        };
        if !key.is_empty() {
            state.buf[..key.len()].copy_from_slice(key);
            state.buf_len = BLOCK_SIZE;
        }
        Ok(state)
    }

    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            if self.buf_len == BLOCK_SIZE {
                self.counter += BLOCK_SIZE as u128;
                let block = self.buf;
                compress(&mut self.h, &block, self.counter, false);
                self.buf_len = 0;
            }
            let take = (BLOCK_SIZE - self.buf_len).min(data.len());
            self.buf[self.buf_len..self.buf_len + take].copy_from_slice(&data[..take]);
            self.buf_len += take;
            data = &data[take..];
        }
    }

    pub fn finalize(mut self) -> Vec<u8> {
        self.counter += self.buf_len as u128;
        self.buf[self.buf_len..].fill(0);
        let block = self.buf;
        compress(&mut self.h, &block, self.counter, true);

        let mut out = Vec::with_capacity(MAX_OUTPUT);
        for word in &self.h {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out.truncate(self.out_len);
        out
    }

    pub fn output_len(&self) -> usize {
        self.out_len
    }
}

impl Drop for Blake2b {
    fn drop(&mut self) {
        self.h.zeroize();
        self.buf.zeroize();
    }
}

impl std::fmt::Debug for Blake2b {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blake2b")
            .field("out_len", &self.out_len)
            .field("state", &"[REDACTED]")
            .finish()
    }
}

/// One-shot BLAKE2b of `data`, optionally keyed.
pub fn blake2b(data: &[u8], key: Option<&[u8]>, out_len: usize) -> anyhow::Result<Vec<u8>> {
    let mut hasher = Blake2b::new_keyed(key.unwrap_or(&[]), out_len)?;
    hasher.update(data);
    Ok(hasher.finalize())
}

#[inline(always)]
fn g(v: &mut [u64; 16], a: usize, b: usize, c: usize, d: usize, x: u64, y: u64) {
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(x);
    v[d] = (v[d] ^ v[a]).rotate_right(32);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(24);
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(y);
    v[d] = (v[d] ^ v[a]).rotate_right(16);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(63);
}

fn compress(h: &mut [u64; 8], block: &[u8; BLOCK_SIZE], counter: u128, last: bool) {
    let mut m = [0u64; 16];
    for (i, word) in m.iter_mut().enumerate() {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&block[i * 8..i * 8 + 8]);
        *word = u64::from_le_bytes(bytes);
    }

    let mut v = [0u64; 16];
    v[..8].copy_from_slice(h);
    v[8..].copy_from_slice(&IV);
    v[12] ^= counter as u64;
    v[13] ^= (counter >> 64) as u64;
    if last {
        v[14] = !v[14];
    }

    for s in &SIGMA {
        g(&mut v, 0, 4, 8, 12, m[s[0]], m[s[1]]);
        g(&mut v, 1, 5, 9, 13, m[s[2]], m[s[3]]);
        g(&mut v, 2, 6, 10, 14, m[s[4]], m[s[5]]);
        g(&mut v, 3, 7, 11, 15, m[s[6]], m[s[7]]);
        g(&mut v, 0, 5, 10, 15, m[s[8]], m[s[9]]);
        g(&mut v, 1, 6, 11, 12, m[s[10]], m[s[11]]);
        g(&mut v, 2, 7, 8, 13, m[s[12]], m[s[13]]);
        g(&mut v, 3, 4, 9, 14, m[s[14]], m[s[15]]);
    }

    for i in 0..8 {
        h[i] ^= v[i] ^ v[i + 8];
    }
    m.zeroize();
    v.zeroize();
}
