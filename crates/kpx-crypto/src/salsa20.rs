//! Salsa20/20 keystream
//!
//! State layout (32-bit little-endian words):
//! ```text
//!  c0  k0  k1  k2
//!  k3  c1  n0  n1
//!  t0  t1  c2  k4
//!  k5  k6  k7  c3
//! ```
//! Ten double rounds (column round then row round) per 64-byte block; the
//! 64-bit block counter `t` advances once per block.

use zeroize::Zeroize;

use crate::stream::{BlockBuffer, Keystream};

const SIGMA: [u32; 4] = [0x6170_7865, 0x3320_646e, 0x7962_2d32, 0x6b20_6574];

/// Salsa20 generator with a buffered byte cursor.
#[derive(Clone)]
pub struct Salsa20 {
    state: [u32; 16],
    buffer: BlockBuffer,
}

impl Salsa20 {
    /// Generator starting at block 0.
    pub fn new(key: &[u8; 32], nonce: &[u8; 8]) -> Self {
        Self::with_counter(key, nonce, 0)
    }

    pub fn with_counter(key: &[u8; 32], nonce: &[u8; 8], counter: u64) -> Self {
        Self {
            state: construct_state(key, nonce, counter),
            buffer: BlockBuffer::empty(),
        }
    }

    fn next_block(state: &mut [u32; 16]) -> [u8; 64] {
        let out = block(state);
        let counter = (u64::from(state[9]) << 32 | u64::from(state[8])).wrapping_add(1);
        state[8] = counter as u32;
        state[9] = (counter >> 32) as u32;
        out
    }
}

impl Keystream for Salsa20 {
    fn fill(&mut self, out: &mut [u8]) {
        let state = &mut self.state;
        self.buffer.drain_into(out, || Self::next_block(state));
    }
}

impl Drop for Salsa20 {
    fn drop(&mut self) {
        self.state.zeroize();
    }
}

/// Lay out key, nonce and counter into the initial 16-word state.
pub fn construct_state(key: &[u8; 32], nonce: &[u8; 8], counter: u64) -> [u32; 16] {
    let k = |i: usize| u32::from_le_bytes([key[i], key[i + 1], key[i + 2], key[i + 3]]);
    [
        SIGMA[0],
        k(0),
        k(4),
        k(8),
        k(12),
        SIGMA[1],
        u32::from_le_bytes([nonce[0], nonce[1], nonce[2], nonce[3]]),
        u32::from_le_bytes([nonce[4], nonce[5], nonce[6], nonce[7]]),
        counter as u32,
        (counter >> 32) as u32,
        SIGMA[2],
        k(16),
        k(20),
        k(24),
        k(28),
        SIGMA[3],
    ]
}

/// Produce one 64-byte keystream block from `state` (state is not advanced).
pub fn block(state: &[u32; 16]) -> [u8; 64] {
    let mut x = *state;
    for _ in 0..10 {
        x = double_round(x);
    }
    let mut out = [0u8; 64];
    for (i, (word, init)) in x.iter().zip(state.iter()).enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&word.wrapping_add(*init).to_le_bytes());
    }
    x.zeroize();
    out
}

pub fn quarter_round(y: [u32; 4]) -> [u32; 4] {
    let z1 = y[1] ^ y[0].wrapping_add(y[3]).rotate_left(7);
    let z2 = y[2] ^ z1.wrapping_add(y[0]).rotate_left(9);
    let z3 = y[3] ^ z2.wrapping_add(z1).rotate_left(13);
    let z0 = y[0] ^ z3.wrapping_add(z2).rotate_left(18);
    [z0, z1, z2, z3]
}

fn apply_groups(input: [u32; 16], groups: &[[usize; 4]; 4]) -> [u32; 16] {
    let mut out = [0u32; 16];
    for group in groups {
        let z = quarter_round([input[group[0]], input[group[1]], input[group[2]], input[group[3]]]);
        for (idx, value) in group.iter().zip(z) {
            out[*idx] = value;
        }
    }
    out
}

pub fn row_round(y: [u32; 16]) -> [u32; 16] {
    apply_groups(y, &[[0, 1, 2, 3], [5, 6, 7, 4], [10, 11, 8, 9], [15, 12, 13, 14]])
}

pub fn column_round(x: [u32; 16]) -> [u32; 16] {
    apply_groups(x, &[[0, 4, 8, 12], [5, 9, 13, 1], [10, 14, 2, 6], [15, 3, 7, 11]])
}

pub fn double_round(x: [u32; 16]) -> [u32; 16] {
    row_round(column_round(x))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARBITRARY: [u32; 16] = [
        0x08521bd6, 0x1fe88837, 0xbb2aa576, 0x3aa26365, 0xc54c6a5b, 0x2fc74c2f, 0x6dd39cc3,
        0xda0a64f6, 0x90a2f23d, 0x067f95a6, 0x06b35f61, 0x41e4732e, 0xe859c100, 0xea4d84b7,
        0x0f619bff, 0xbc6e965a,
    ];

    const UNIT_ROWS: [u32; 16] = [1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0];

    #[test]
    fn test_quarter_round_vectors() {
        assert_eq!(quarter_round([0, 0, 0, 0]), [0, 0, 0, 0]);
        assert_eq!(
            quarter_round([1, 0, 0, 0]),
            [0x08008145, 0x00000080, 0x00010200, 0x20500000]
        );
        assert_eq!(
            quarter_round([0, 1, 0, 0]),
            [0x88000100, 0x00000001, 0x00000200, 0x00402000]
        );
        assert_eq!(
            quarter_round([0, 0, 1, 0]),
            [0x80040000, 0x00000000, 0x00000001, 0x00002000]
        );
        assert_eq!(
            quarter_round([0, 0, 0, 1]),
            [0x00048044, 0x00000080, 0x00010000, 0x20100001]
        );
        assert_eq!(
            quarter_round([0xe7e8c006, 0xc4f9417d, 0x6479b4b2, 0x68c67137]),
            [0xe876d72b, 0x9361dfd5, 0xf1460244, 0x948541a3]
        );
        assert_eq!(
            quarter_round([0xd3917c5b, 0x55f1c407, 0x52a58a7a, 0x8f887a3b]),
            [0x3e2f308c, 0xd90a8f36, 0x6ab2a923, 0x2883524c]
        );
    }

    #[test]
    fn test_row_round_vectors() {
        assert_eq!(
            row_round(UNIT_ROWS),
            [
                0x08008145, 0x00000080, 0x00010200, 0x20500000, 0x20100001, 0x00048044,
                0x00000080, 0x00010000, 0x00000001, 0x00002000, 0x80040000, 0x00000000,
                0x00000001, 0x00000200, 0x00402000, 0x88000100,
            ]
        );
        assert_eq!(
            row_round(ARBITRARY),
            [
                0xa890d39d, 0x65d71596, 0xe9487daa, 0xc8ca6a86, 0x949d2192, 0x764b7754,
                0xe408d9b9, 0x7a41b4d1, 0x3402e183, 0x3c3af432, 0x50669f96, 0xd89ef0a8,
                0x0040ede5, 0xb545fbce, 0xd257ed4f, 0x1818882d,
            ]
        );
    }

    #[test]
    fn test_column_round_vectors() {
        assert_eq!(
            column_round(UNIT_ROWS),
            [
                0x10090288, 0, 0, 0, 0x00000101, 0, 0, 0, 0x00020401, 0, 0, 0, 0x40a04001, 0, 0,
                0,
            ]
        );
        assert_eq!(
            column_round(ARBITRARY),
            [
                0x8c9d190a, 0xce8e4c90, 0x1ef8e9d3, 0x1326a71a, 0x90a20123, 0xead3c4f3,
                0x63a091a0, 0xf0708d69, 0x789b010c, 0xd195a681, 0xeb7d5504, 0xa774135c,
                0x481c2027, 0x53a8e4b5, 0x4c1f89c5, 0x3f78c9c8,
            ]
        );
    }

    #[test]
    fn test_state_layout() {
        let key: [u8; 32] = core::array::from_fn(|i| i as u8);
        let state = construct_state(&key, &[0xE8, 0x30, 0x09, 0x4B, 0x97, 0x20, 0x5D, 0x2A], 0x1_0000_0002);
        assert_eq!(state[0], 0x61707865);
        assert_eq!(state[1], 0x03020100);
        assert_eq!(state[6], 0x4B0930E8);
        assert_eq!(state[8], 2);
        assert_eq!(state[9], 1);
        assert_eq!(state[15], 0x6b206574);
    }

    #[test]
    fn test_block_vector() {
        // expansion example from the Salsa20 specification, 32-byte key
        let mut key = [0u8; 32];
        key[..16].copy_from_slice(&core::array::from_fn::<u8, 16, _>(|i| i as u8 + 1));
        key[16..].copy_from_slice(&core::array::from_fn::<u8, 16, _>(|i| i as u8 + 201));
        let nonce: [u8; 8] = core::array::from_fn(|i| i as u8 + 101);
        let counter = u64::from_le_bytes(core::array::from_fn(|i| i as u8 + 109));
        assert_eq!(
            block(&construct_state(&key, &nonce, counter)),
            [
                69, 37, 68, 39, 41, 15, 107, 193, 255, 139, 122, 6, 170, 233, 217, 98, 89, 144,
                182, 106, 21, 51, 200, 65, 239, 49, 222, 34, 215, 114, 40, 126, 104, 197, 7, 225,
                197, 153, 31, 2, 102, 78, 76, 176, 84, 245, 246, 184, 177, 160, 133, 130, 6, 72,
                149, 119, 192, 195, 132, 236, 234, 103, 246, 74,
            ]
        );
    }

    #[test]
    fn test_get_bytes_vector() {
        // eSTREAM Salsa20/20 256-bit set 1, vector 0
        let mut key = [0u8; 32];
        key[0] = 0x80;
        let mut stream = Salsa20::new(&key, &[0u8; 8]);
        let mut drawn = stream.get_bytes(37);
        drawn.extend(stream.get_bytes(150));
        drawn.extend(stream.get_bytes(69));
        assert_eq!(drawn.len(), 256);
        assert_eq!(
            hex::encode_upper(&drawn[..64]),
            "E3BE8FDD8BECA2E3EA8EF9475B29A6E7003951E1097A5C38D23B7A5FAD9F6844\
             B22C97559E2723C7CBBD3FE4FC8D9A0744652A83E72A9C461876AF4D7EF1A117"
        );
        assert_eq!(
            hex::encode_upper(&drawn[192..]),
            "57BE81F47B17D9AE7C4FF15429A73E10ACF250ED3A90A93C711308A74C6216A9\
             ED84CD126DA7F28E8ABF8BB63517E1CA98E712F4FB2E1A6AED9FDC73291FAA17"
        );
    }

    #[test]
    fn test_get_bytes_matches_blocks() {
        let key = [7u8; 32];
        let nonce = [3u8; 8];
        let mut stream = Salsa20::new(&key, &nonce);
        let first = block(&construct_state(&key, &nonce, 0));
        let second = block(&construct_state(&key, &nonce, 1));

        // Odd-sized draws straddle block boundaries
        let mut drawn = stream.get_bytes(10);
        drawn.extend(stream.get_bytes(100));
        drawn.extend(stream.get_bytes(18));
        assert_eq!(&drawn[..64], &first[..]);
        assert_eq!(&drawn[64..], &second[..]);
    }

    #[test]
    fn test_clone_continues_mid_block() {
        let mut stream = Salsa20::new(&[1u8; 32], &[2u8; 8]);
        stream.get_bytes(33);
        let mut copy = stream.clone();
        assert_eq!(stream.get_bytes(64), copy.get_bytes(64));
    }
}
