//! ChaCha20 keystream (RFC 8439 layout: 32-bit counter, 96-bit nonce)

use zeroize::Zeroize;

use crate::stream::{BlockBuffer, Keystream};

const SIGMA: [u32; 4] = [0x6170_7865, 0x3320_646e, 0x7962_2d32, 0x6b20_6574];

/// ChaCha20 generator. Used both for the V4 body cipher and the inner stream.
#[derive(Clone)]
pub struct ChaCha20 {
    state: [u32; 16],
    buffer: BlockBuffer,
}

impl ChaCha20 {
    pub fn new(key: &[u8; 32], nonce: &[u8; 12], counter: u32) -> Self {
        Self {
            state: construct_state(key, nonce, counter),
            buffer: BlockBuffer::empty(),
        }
    }

    fn next_block(state: &mut [u32; 16]) -> [u8; 64] {
        let out = block(state);
        state[12] = state[12].wrapping_add(1);
        out
    }
}

impl Keystream for ChaCha20 {
    fn fill(&mut self, out: &mut [u8]) {
        let state = &mut self.state;
        self.buffer.drain_into(out, || Self::next_block(state));
    }
}

impl Drop for ChaCha20 {
    fn drop(&mut self) {
        self.state.zeroize();
    }
}

/// `c0..c3 k0..k7 ctr n0 n1 n2`, all little-endian words.
pub fn construct_state(key: &[u8; 32], nonce: &[u8; 12], counter: u32) -> [u32; 16] {
    let word = |b: &[u8], i: usize| u32::from_le_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]]);
    let mut state = [0u32; 16];
    state[..4].copy_from_slice(&SIGMA);
    for i in 0..8 {
        state[4 + i] = word(key, i * 4);
    }
    state[12] = counter;
    for i in 0..3 {
        state[13 + i] = word(nonce, i * 4);
    }
    state
}

pub fn quarter_round(mut a: u32, mut b: u32, mut c: u32, mut d: u32) -> (u32, u32, u32, u32) {
    a = a.wrapping_add(b);
    d = (d ^ a).rotate_left(16);
    c = c.wrapping_add(d);
    b = (b ^ c).rotate_left(12);
    a = a.wrapping_add(b);
    d = (d ^ a).rotate_left(8);
    c = c.wrapping_add(d);
    b = (b ^ c).rotate_left(7);
    (a, b, c, d)
}

#[inline(always)]
fn qr(x: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    (x[a], x[b], x[c], x[d]) = quarter_round(x[a], x[b], x[c], x[d]);
}

/// One serialized 64-byte block for `state`; the counter is not advanced.
pub fn block(state: &[u32; 16]) -> [u8; 64] {
    let mut x = *state;
    for _ in 0..10 {
        qr(&mut x, 0, 4, 8, 12);
        qr(&mut x, 1, 5, 9, 13);
        qr(&mut x, 2, 6, 10, 14);
        qr(&mut x, 3, 7, 11, 15);
        qr(&mut x, 0, 5, 10, 15);
        qr(&mut x, 1, 6, 11, 12);
        qr(&mut x, 2, 7, 8, 13);
        qr(&mut x, 3, 4, 9, 14);
    }
    let mut out = [0u8; 64];
    for (i, (word, init)) in x.iter().zip(state.iter()).enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&word.wrapping_add(*init).to_le_bytes());
    }
    x.zeroize();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rfc_key() -> [u8; 32] {
        core::array::from_fn(|i| i as u8)
    }

    fn nonce(hex_str: &str) -> [u8; 12] {
        let mut n = [0u8; 12];
        n.copy_from_slice(&hex::decode(hex_str).unwrap());
        n
    }

    #[test]
    fn test_quarter_round_vector() {
        assert_eq!(
            quarter_round(0x11111111, 0x01020304, 0x9b8d6f43, 0x01234567),
            (0xea2a92f4, 0xcb1cf8ce, 0x4581472e, 0x5881c4bb)
        );
    }

    #[test]
    fn test_state_layout() {
        let state = construct_state(&rfc_key(), &nonce("000000090000004a00000000"), 1);
        assert_eq!(
            state,
            [
                0x61707865, 0x3320646e, 0x79622d32, 0x6b206574, 0x03020100, 0x07060504,
                0x0b0a0908, 0x0f0e0d0c, 0x13121110, 0x17161514, 0x1b1a1918, 0x1f1e1d1c,
                0x00000001, 0x09000000, 0x4a000000, 0x00000000,
            ]
        );
    }

    #[test]
    fn test_block_vector() {
        let state = construct_state(&rfc_key(), &nonce("000000090000004a00000000"), 1);
        assert_eq!(
            hex::encode(block(&state)),
            "10f1e7e4d13b5915500fdd1fa32071c4c7d1f4c733c068030422aa9ac3d46c4e\
             d2826446079faa0914c2d705d98b02a2b5129cd1de164eb9cbd083e8a2503c4e"
        );
    }

    #[test]
    fn test_keystream_across_blocks() {
        let mut stream = ChaCha20::new(&rfc_key(), &nonce("000000000000004a00000000"), 1);
        let mut drawn = stream.get_bytes(50);
        drawn.extend(stream.get_bytes(64));
        assert_eq!(
            hex::encode(drawn),
            "224f51f3401bd9e12fde276fb8631ded8c131f823d2c06e27e4fcaec9ef3cf78\
             8a3b0aa372600a92b57974cded2b9334794cba40c63e34cdea212c4cf07d41b7\
             69a6749f3f630f4122cafe28ec4dc47e26d4346d70b98c73f3e9c53ac40c5945\
             398b6eda1a832c89c167eacd901d7e2bf363"
        );
    }

    #[test]
    fn test_apply_roundtrip() {
        let key = [9u8; 32];
        let iv = [4u8; 12];
        let mut data = vec![0xAAu8; 200];
        ChaCha20::new(&key, &iv, 0).apply(&mut data);
        assert_ne!(data, vec![0xAAu8; 200]);
        ChaCha20::new(&key, &iv, 0).apply(&mut data);
        assert_eq!(data, vec![0xAAu8; 200]);
    }
}
