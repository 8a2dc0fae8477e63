//! Rounds-based AES-KDF

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes256;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use zeroize::Zeroize;

use kpx_core::{KpxError, KpxResult};

/// Encrypt each 16-byte half of `key` `rounds` times under `seed`, then hash.
pub fn transform(
    key: &[u8; 32],
    seed: &[u8; 32],
    rounds: u64,
    cancel: &CancellationToken,
) -> KpxResult<[u8; 32]> {
    let cipher = Aes256::new(GenericArray::from_slice(seed));

    let mut lo = [0u8; 16];
    let mut hi = [0u8; 16];
    lo.copy_from_slice(&key[..16]);
    hi.copy_from_slice(&key[16..]);

    let (lo_done, hi_done) = rayon::join(
        || encrypt_rounds(&cipher, &mut lo, rounds, cancel),
        || encrypt_rounds(&cipher, &mut hi, rounds, cancel),
    );
    if let Err(e) = lo_done.and(hi_done) {
        lo.zeroize();
        hi.zeroize();
        return Err(e);
    }

    let mut hasher = Sha256::new();
    hasher.update(lo);
    hasher.update(hi);
    lo.zeroize();
    hi.zeroize();
    Ok(hasher.finalize().into())
}

fn encrypt_rounds(
    cipher: &Aes256,
    half: &mut [u8; 16],
    rounds: u64,
    cancel: &CancellationToken,
) -> KpxResult<()> {
    let block = GenericArray::from_mut_slice(half);
    for _ in 0..rounds {
        if cancel.is_cancelled() {
            return Err(KpxError::OperationCancelled);
        }
        cipher.encrypt_block(block);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ecb_rounds(seed: &[u8; 32], half: &[u8], rounds: u64) -> Vec<u8> {
        let cipher = Aes256::new(GenericArray::from_slice(seed));
        let mut block = GenericArray::clone_from_slice(half);
        for _ in 0..rounds {
            cipher.encrypt_block(&mut block);
        }
        block.to_vec()
    }

    #[test]
    fn test_zero_rounds_is_plain_hash() {
        let key = [0x42u8; 32];
        let out = transform(&key, &[7u8; 32], 0, &CancellationToken::new()).unwrap();
        let expected: [u8; 32] = Sha256::digest(key).into();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_halves_are_independent_ecb_chains() {
        let key: [u8; 32] = core::array::from_fn(|i| i as u8);
        let seed = [0xA5u8; 32];
        let out = transform(&key, &seed, 37, &CancellationToken::new()).unwrap();

        let mut joined = ecb_rounds(&seed, &key[..16], 37);
        joined.extend(ecb_rounds(&seed, &key[16..], 37));
        let expected: [u8; 32] = Sha256::digest(&joined).into();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_fips197_single_round() {
        // AES-256 known answer: one round of the KDF is one ECB block encryption
        let seed: [u8; 32] = core::array::from_fn(|i| i as u8);
        let plain = hex::decode("00112233445566778899aabbccddeeff").unwrap();
        assert_eq!(
            hex::encode(ecb_rounds(&seed, &plain, 1)),
            "8ea2b7ca516745bfeafc49904b496089"
        );
    }

    #[test]
    fn test_seed_changes_output() {
        let cancel = CancellationToken::new();
        let a = transform(&[1u8; 32], &[1u8; 32], 10, &cancel).unwrap();
        let b = transform(&[1u8; 32], &[2u8; 32], 10, &cancel).unwrap();
        assert_ne!(a, b, "different seeds must produce different keys");
    }

    #[test]
    fn test_cancellation_aborts() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = transform(&[1u8; 32], &[2u8; 32], 1_000_000, &cancel).unwrap_err();
        assert!(matches!(err, KpxError::OperationCancelled));
    }
}
