//! Argon2d (version 0x13) over the in-crate BLAKE2b
//!
//! Memory is `parallelism` lanes of `lane_len` 1 KiB blocks, each lane split
//! into four segments. One slice (the same segment index across all lanes) is
//! filled in parallel; lanes only read blocks outside the running slice from
//! other lanes, so finishing a slice is the synchronization point.

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroize;

use kpx_core::{KpxError, KpxResult};

use crate::blake2b::Blake2b;

/// Words per 1 KiB block
const QWORDS: usize = 128;
const BLOCK_BYTES: usize = QWORDS * 8;
const SYNC_POINTS: u32 = 4;
/// Argon2 type code for Argon2d
const TYPE_D: u32 = 0;

pub const VERSION_13: u32 = 0x13;
pub const MIN_TAG_LEN: usize = 4;
pub const MAX_PARALLELISM: u32 = (1 << 24) - 1;

type Block = [u64; QWORDS];

/// Argon2d inputs besides the password.
#[derive(Clone)]
pub struct Argon2Params {
    pub salt: Vec<u8>,
    pub parallelism: u32,
    pub memory_kib: u64,
    pub iterations: u64,
    pub version: u32,
    pub secret: Option<Vec<u8>>,
    pub associated_data: Option<Vec<u8>>,
}

impl Argon2Params {
    /// Reject parameter sets Argon2 cannot run.
    pub fn check(&self) -> KpxResult<()> {
        if self.version != VERSION_13 {
            return Err(KpxError::header(format!(
                "unsupported Argon2 version {:#x}",
                self.version
            )));
        }
        if self.parallelism == 0 || self.parallelism > MAX_PARALLELISM {
            return Err(KpxError::header(format!(
                "Argon2 parallelism {} out of range",
                self.parallelism
            )));
        }
        if self.memory_kib < 8 * u64::from(self.parallelism) || self.memory_kib > u64::from(u32::MAX) {
            return Err(KpxError::header(format!(
                "Argon2 memory {} KiB invalid for {} lanes",
                self.memory_kib, self.parallelism
            )));
        }
        if self.iterations == 0 || self.iterations > u64::from(u32::MAX) {
            return Err(KpxError::header(format!(
                "Argon2 iterations {} out of range",
                self.iterations
            )));
        }
        if self.salt.len() < 8 {
            return Err(KpxError::header("Argon2 salt shorter than 8 bytes"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Argon2Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2Params")
            .field("parallelism", &self.parallelism)
            .field("memory_kib", &self.memory_kib)
            .field("iterations", &self.iterations)
            .field("version", &self.version)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("associated_data_len", &self.associated_data.as_ref().map(Vec::len))
            .finish()
    }
}

struct Geometry {
    lanes: usize,
    lane_len: usize,
    segment_len: usize,
}

/// Hash `password` into `tag_len` bytes.
pub fn argon2d(
    password: &[u8],
    params: &Argon2Params,
    tag_len: usize,
    cancel: &CancellationToken,
) -> KpxResult<Vec<u8>> {
    params.check()?;
    if tag_len < MIN_TAG_LEN || tag_len > u32::MAX as usize {
        return Err(KpxError::header(format!("Argon2 tag length {tag_len} out of range")));
    }

    let lanes = params.parallelism as usize;
    let memory = params.memory_kib as usize;
    let segment_len = memory / (lanes * SYNC_POINTS as usize);
    let geo = Geometry {
        lanes,
        lane_len: segment_len * SYNC_POINTS as usize,
        segment_len,
    };

    let mut h0 = initial_hash(password, params, tag_len)?;
    let mut memory: Vec<Block> = vec![[0u64; QWORDS]; geo.lanes * geo.lane_len];
    for lane in 0..geo.lanes {
        for column in 0..2u32 {
            let mut seed = Vec::with_capacity(72);
            seed.extend_from_slice(&h0);
            seed.extend_from_slice(&column.to_le_bytes());
            seed.extend_from_slice(&(lane as u32).to_le_bytes());
            let mut bytes = hash_variable(&seed, BLOCK_BYTES)?;
            memory[lane * geo.lane_len + column as usize] = block_from_bytes(&bytes);
            bytes.zeroize();
            seed.zeroize();
        }
    }
    h0.zeroize();

    tracing::debug!(
        lanes = geo.lanes,
        lane_len = geo.lane_len,
        passes = params.iterations,
        "argon2d fill"
    );

    let result = fill_memory(&mut memory, &geo, params.iterations as u32, cancel);
    if let Err(e) = result {
        wipe(&mut memory);
        return Err(e);
    }

    let mut last = memory[geo.lane_len - 1];
    for lane in 1..geo.lanes {
        xor_into(&mut last, &memory[lane * geo.lane_len + geo.lane_len - 1]);
    }
    wipe(&mut memory);

    let mut last_bytes = block_to_bytes(&last);
    let tag = hash_variable(&last_bytes, tag_len);
    last.zeroize();
    last_bytes.zeroize();
    Ok(tag?)
}

fn fill_memory(
    memory: &mut [Block],
    geo: &Geometry,
    passes: u32,
    cancel: &CancellationToken,
) -> KpxResult<()> {
    for pass in 0..passes {
        for slice in 0..SYNC_POINTS as usize {
            if cancel.is_cancelled() {
                return Err(KpxError::OperationCancelled);
            }
            let shared: &[Block] = memory;
            let segments: Vec<Vec<Block>> = (0..geo.lanes)
                .into_par_iter()
                .map(|lane| fill_segment(shared, geo, pass, slice, lane))
                .collect();
            let skip = if pass == 0 && slice == 0 { 2 } else { 0 };
            for (lane, mut segment) in segments.into_iter().enumerate() {
                let base = lane * geo.lane_len + slice * geo.segment_len;
                memory[base + skip..base + geo.segment_len].copy_from_slice(&segment);
                wipe(&mut segment);
            }
        }
    }
    Ok(())
}

/// Compute one lane's segment of the current slice against a read-only view.
fn fill_segment(memory: &[Block], geo: &Geometry, pass: u32, slice: usize, lane: usize) -> Vec<Block> {
    let start = if pass == 0 && slice == 0 { 2 } else { 0 };
    let lane_base = lane * geo.lane_len;
    let segment_base = slice * geo.segment_len;
    let mut out: Vec<Block> = Vec::with_capacity(geo.segment_len - start);

    // Blocks of this lane's running segment live in `out`, not `memory`
    let read = |out: &Vec<Block>, lane_idx: usize, column: usize| -> Block {
        if lane_idx == lane && column >= segment_base + start && column < segment_base + geo.segment_len {
            out[column - segment_base - start]
        } else {
            memory[lane_idx * geo.lane_len + column]
        }
    };

    for index in start..geo.segment_len {
        let column = segment_base + index;
        let prev_column = if column == 0 { geo.lane_len - 1 } else { column - 1 };
        let prev = read(&out, lane, prev_column);

        let pseudo_rand = prev[0];
        let j1 = pseudo_rand & 0xFFFF_FFFF;
        let j2 = pseudo_rand >> 32;
        let ref_lane = if pass == 0 && slice == 0 {
            lane
        } else {
            (j2 % geo.lanes as u64) as usize
        };
        let ref_column = reference_column(geo, pass, slice, index, ref_lane == lane, j1);
        let reference = read(&out, ref_lane, ref_column);

        let mut next = compress(&prev, &reference);
        if pass > 0 {
            xor_into(&mut next, &memory[lane_base + column]);
        }
        out.push(next);
    }
    out
}

fn reference_column(
    geo: &Geometry,
    pass: u32,
    slice: usize,
    index: usize,
    same_lane: bool,
    j1: u64,
) -> usize {
    let finished = if pass == 0 {
        slice * geo.segment_len
    } else {
        geo.lane_len - geo.segment_len
    };
    let area = if same_lane {
        finished + index - 1
    } else if index == 0 {
        finished - 1
    } else {
        finished
    } as u64;

    let x = (j1 * j1) >> 32;
    let relative = area - 1 - ((area * x) >> 32);
    let start = if pass == 0 || slice == SYNC_POINTS as usize - 1 {
        0
    } else {
        (slice + 1) * geo.segment_len
    } as u64;
    ((start + relative) % geo.lane_len as u64) as usize
}

fn initial_hash(password: &[u8], params: &Argon2Params, tag_len: usize) -> KpxResult<Vec<u8>> {
    let secret = params.secret.as_deref().unwrap_or(&[]);
    let ad = params.associated_data.as_deref().unwrap_or(&[]);

    let mut h = Blake2b::new(64)?;
    for word in [
        params.parallelism,
        tag_len as u32,
        params.memory_kib as u32,
        params.iterations as u32,
        params.version,
        TYPE_D,
    ] {
        h.update(&word.to_le_bytes());
    }
    for field in [password, params.salt.as_slice(), secret, ad] {
        h.update(&(field.len() as u32).to_le_bytes());
        h.update(field);
    }
    Ok(h.finalize())
}

/// Variable-length hash H' built from BLAKE2b-512 chaining.
fn hash_variable(input: &[u8], out_len: usize) -> KpxResult<Vec<u8>> {
    let prefix = (out_len as u32).to_le_bytes();
    if out_len <= 64 {
        let mut h = Blake2b::new(out_len)?;
        h.update(&prefix);
        h.update(input);
        return Ok(h.finalize());
    }

    let rounds = out_len.div_ceil(32) - 2;
    let mut out = Vec::with_capacity(out_len);
    let mut h = Blake2b::new(64)?;
    h.update(&prefix);
    h.update(input);
    let mut v = h.finalize();
    out.extend_from_slice(&v[..32]);
    for _ in 1..rounds {
        let mut h = Blake2b::new(64)?;
        h.update(&v);
        let next = h.finalize();
        v.zeroize();
        v = next;
        out.extend_from_slice(&v[..32]);
    }
    let mut h = Blake2b::new(out_len - 32 * rounds)?;
    h.update(&v);
    out.extend_from_slice(&h.finalize());
    v.zeroize();
    Ok(out)
}

#[inline(always)]
fn blamka(x: u64, y: u64) -> u64 {
    let lo = (x & 0xFFFF_FFFF).wrapping_mul(y & 0xFFFF_FFFF);
    x.wrapping_add(y).wrapping_add(lo.wrapping_mul(2))
}

#[inline(always)]
fn gb(v: &mut [u64; 16], a: usize, b: usize, c: usize, d: usize) {
    v[a] = blamka(v[a], v[b]);
    v[d] = (v[d] ^ v[a]).rotate_right(32);
    v[c] = blamka(v[c], v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(24);
    v[a] = blamka(v[a], v[b]);
    v[d] = (v[d] ^ v[a]).rotate_right(16);
    v[c] = blamka(v[c], v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(63);
}

fn permute(v: &mut [u64; 16]) {
    gb(v, 0, 4, 8, 12);
    gb(v, 1, 5, 9, 13);
    gb(v, 2, 6, 10, 14);
    gb(v, 3, 7, 11, 15);
    gb(v, 0, 5, 10, 15);
    gb(v, 1, 6, 11, 12);
    gb(v, 2, 7, 8, 13);
    gb(v, 3, 4, 9, 14);
}

/// Compression function G: permute `x ^ y` by rows then columns, feed forward.
fn compress(x: &Block, y: &Block) -> Block {
    let mut r = *x;
    xor_into(&mut r, y);
    let mut z = r;

    let mut v = [0u64; 16];
    for row in 0..8 {
        v.copy_from_slice(&z[row * 16..row * 16 + 16]);
        permute(&mut v);
        z[row * 16..row * 16 + 16].copy_from_slice(&v);
    }
    for col in 0..8 {
        for k in 0..8 {
            v[2 * k] = z[2 * col + 16 * k];
            v[2 * k + 1] = z[2 * col + 16 * k + 1];
        }
        permute(&mut v);
        for k in 0..8 {
            z[2 * col + 16 * k] = v[2 * k];
            z[2 * col + 16 * k + 1] = v[2 * k + 1];
        }
    }

    xor_into(&mut z, &r);
    r.zeroize();
    v.zeroize();
    z
}

fn xor_into(dst: &mut Block, src: &Block) {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d ^= s;
    }
}

fn block_from_bytes(bytes: &[u8]) -> Block {
    let mut block = [0u64; QWORDS];
    for (word, chunk) in block.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut b = [0u8; 8];
        b.copy_from_slice(chunk);
        *word = u64::from_le_bytes(b);
    }
    block
}

fn block_to_bytes(block: &Block) -> Vec<u8> {
    block.iter().flat_map(|w| w.to_le_bytes()).collect()
}

fn wipe(blocks: &mut [Block]) {
    for block in blocks.iter_mut() {
        block.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(salt: &[u8], parallelism: u32, memory_kib: u64, iterations: u64) -> Argon2Params {
        Argon2Params {
            salt: salt.to_vec(),
            parallelism,
            memory_kib,
            iterations,
            version: VERSION_13,
            secret: None,
            associated_data: None,
        }
    }

    #[test]
    fn test_rfc9106_argon2d_vector() {
        let mut p = params(&[0x02; 16], 4, 32, 3);
        p.secret = Some(vec![0x03; 8]);
        p.associated_data = Some(vec![0x04; 12]);
        let tag = argon2d(&[0x01; 32], &p, 32, &CancellationToken::new()).unwrap();
        assert_eq!(
            hex::encode(tag),
            "512b391b6f1162975371d30919734294f868e3be3984f3c1a13a4db9fabe4acb"
        );
    }

    #[test]
    fn test_short_segment_vector() {
        // 8 KiB, one lane: two blocks per segment, nothing filled in slice 0 of pass 0
        let p = params(&[0x01; 16], 1, 8, 3);
        let tag = argon2d(&[0x00; 16], &p, 16, &CancellationToken::new()).unwrap();
        assert_eq!(hex::encode(tag), "6d1a2c5f654a277e039eade203682161");
    }

    #[test]
    fn test_two_lane_vector() {
        let p = params(b"somesalt", 2, 64, 1);
        let tag = argon2d(b"password", &p, 32, &CancellationToken::new()).unwrap();
        assert_eq!(
            hex::encode(tag),
            "ea93565f656bfe0df9fd3dd35f2db0a1e6caa3de2d9ad25967eb5ac8037c7942"
        );
    }

    #[test]
    fn test_matches_argon2_crate() {
        let p = params(b"kpx-salt-0123456", 3, 96, 2);
        let ours = argon2d(b"correct horse", &p, 32, &CancellationToken::new()).unwrap();

        let reference = argon2::Argon2::new(
            argon2::Algorithm::Argon2d,
            argon2::Version::V0x13,
            argon2::Params::new(96, 2, 3, Some(32)).unwrap(),
        );
        let mut expected = [0u8; 32];
        reference
            .hash_password_into(b"correct horse", b"kpx-salt-0123456", &mut expected)
            .unwrap();
        assert_eq!(ours, expected, "Argon2d must agree with the argon2 crate");
    }

    #[test]
    fn test_memory_not_a_lane_multiple() {
        // 37 KiB over 2 lanes fills 32 blocks; the requested size still feeds H0
        let cancel = CancellationToken::new();
        let a = argon2d(b"pw", &params(&[9; 16], 2, 37, 1), 32, &cancel).unwrap();
        let b = argon2d(b"pw", &params(&[9; 16], 2, 32, 1), 32, &cancel).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_long_tag() {
        let tag = argon2d(b"pw", &params(&[1; 16], 1, 8, 1), 100, &CancellationToken::new()).unwrap();
        assert_eq!(tag.len(), 100);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let cancel = CancellationToken::new();
        assert!(argon2d(b"pw", &params(&[1; 16], 0, 8, 1), 32, &cancel).is_err());
        assert!(argon2d(b"pw", &params(&[1; 16], 2, 15, 1), 32, &cancel).is_err());
        assert!(argon2d(b"pw", &params(&[1; 16], 1, 8, 0), 32, &cancel).is_err());
        assert!(argon2d(b"pw", &params(&[1; 16], 1, 8, 1), 3, &cancel).is_err());
        let mut old = params(&[1; 16], 1, 8, 1);
        old.version = 0x10;
        assert!(matches!(
            argon2d(b"pw", &old, 32, &cancel),
            Err(KpxError::HeaderFieldMalformed(_))
        ));
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = argon2d(b"pw", &params(&[1; 16], 1, 64, 1), 32, &cancel).unwrap_err();
        assert!(err.is_cancelled());
    }
}
