//! Legacy RC4-variant inner stream (stream id 1).
//!
//! Key scheduling swaps `S[0]` with `S[j]` instead of `S[i]` with `S[j]`,
//! and the first 512 output bytes are discarded.

use zeroize::Zeroize;

use crate::stream::Keystream;

const DISCARD: usize = 512;

#[derive(Clone)]
pub struct ArcFourVariant {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl ArcFourVariant {
    /// Key the generator. `key` must be non-empty.
    pub fn new(key: &[u8]) -> Self {
        let mut state: [u8; 256] = core::array::from_fn(|i| i as u8);
        if !key.is_empty() {
            let mut j: u8 = 0;
            for i in 0..256 {
                j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
                state.swap(0, j as usize);
            }
        }

        let mut rng = Self { state, i: 0, j: 0 };
        let mut discard = [0u8; DISCARD];
        rng.fill(&mut discard);
        rng
    }
}

impl Keystream for ArcFourVariant {
    fn fill(&mut self, out: &mut [u8]) {
        for byte in out.iter_mut() {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.state[self.i as usize]);
            self.state.swap(self.i as usize, self.j as usize);
            let t = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
            *byte = self.state[t as usize];
        }
    }
}

impl Drop for ArcFourVariant {
    fn drop(&mut self) {
        self.state.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plain RC4 output for reference, then the same stream with S[0] swapping.
    fn reference(key: &[u8], n: usize) -> Vec<u8> {
        let mut s: Vec<u8> = (0..=255u8).collect();
        let mut j: u8 = 0;
        for i in 0..256 {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(0, j as usize);
        }
        let (mut a, mut b) = (0u8, 0u8);
        let mut out = Vec::new();
        for _ in 0..DISCARD + n {
            a = a.wrapping_add(1);
            b = b.wrapping_add(s[a as usize]);
            s.swap(a as usize, b as usize);
            out.push(s[s[a as usize].wrapping_add(s[b as usize]) as usize]);
        }
        out.split_off(DISCARD)
    }

    #[test]
    fn test_matches_reference_schedule() {
        let mut rng = ArcFourVariant::new(b"arcfour key");
        assert_eq!(rng.get_bytes(300), reference(b"arcfour key", 300));
    }

    #[test]
    fn test_state_stays_a_permutation() {
        let mut rng = ArcFourVariant::new(&[0xff; 40]);
        rng.get_bytes(4096);
        let mut seen = rng.state.to_vec();
        seen.sort_unstable();
        assert_eq!(seen, (0..=255u8).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_draws_are_contiguous() {
        let mut whole = ArcFourVariant::new(b"k");
        let mut parts = ArcFourVariant::new(b"k");
        let mut joined = parts.get_bytes(3);
        joined.extend(parts.get_bytes(61));
        assert_eq!(whole.get_bytes(64), joined);
    }
}
