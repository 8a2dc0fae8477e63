//! Outer body ciphers: AES-256-CBC (PKCS#7) and ChaCha20

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use kpx_core::{CipherId, KpxError, KpxResult};

use crate::chacha20::ChaCha20;
use crate::keys::CipherKey;
use crate::stream::Keystream;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub fn encrypt(cipher: CipherId, key: &CipherKey, iv: &[u8], plaintext: &[u8]) -> KpxResult<Vec<u8>> {
    check_iv(cipher, iv)?;
    match cipher {
        CipherId::Aes => {
            let enc = Aes256CbcEnc::new_from_slices(key.as_bytes(), iv)
                .map_err(|e| KpxError::header(format!("AES init: {e}")))?;
            Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
        }
        CipherId::ChaCha20 => {
            let mut out = plaintext.to_vec();
            chacha(key, iv).apply(&mut out);
            Ok(out)
        }
    }
}

/// Bad padding is reported as `CouldNotDecrypt`, same as a wrong key.
pub fn decrypt(cipher: CipherId, key: &CipherKey, iv: &[u8], ciphertext: &[u8]) -> KpxResult<Vec<u8>> {
    check_iv(cipher, iv)?;
    match cipher {
        CipherId::Aes => {
            let dec = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
                .map_err(|e| KpxError::header(format!("AES init: {e}")))?;
            dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| KpxError::CouldNotDecrypt)
        }
        CipherId::ChaCha20 => {
            let mut out = ciphertext.to_vec();
            chacha(key, iv).apply(&mut out);
            Ok(out)
        }
    }
}

fn chacha(key: &CipherKey, iv: &[u8]) -> ChaCha20 {
    let mut nonce = [0u8; 12];
    nonce.copy_from_slice(iv);
    ChaCha20::new(key.as_bytes(), &nonce, 0)
}

fn check_iv(cipher: CipherId, iv: &[u8]) -> KpxResult<()> {
    if iv.len() != cipher.iv_len() {
        return Err(KpxError::header(format!(
            "{cipher:?} IV must be {} bytes, got {}",
            cipher.iv_len(),
            iv.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CipherKey {
        CipherKey::from_bytes([0x11; 32])
    }

    #[test]
    fn test_aes_roundtrip_pads_to_block() {
        let iv = [0x22u8; 16];
        let data = b"thirteen byte";
        let ct = encrypt(CipherId::Aes, &key(), &iv, data).unwrap();
        assert_eq!(ct.len(), 16);
        assert_eq!(decrypt(CipherId::Aes, &key(), &iv, &ct).unwrap(), data);

        // Block-aligned input gains a full padding block
        let ct = encrypt(CipherId::Aes, &key(), &iv, &[0u8; 32]).unwrap();
        assert_eq!(ct.len(), 48);
    }

    #[test]
    fn test_aes_wrong_key_is_could_not_decrypt() {
        let iv = [0x22u8; 16];
        let ct = encrypt(CipherId::Aes, &key(), &iv, &[7u8; 100]).unwrap();
        // A wrong key almost always breaks the padding; when it does not, the
        // plaintext still differs
        match decrypt(CipherId::Aes, &CipherKey::from_bytes([0x12; 32]), &iv, &ct) {
            Err(e) => assert!(matches!(e, KpxError::CouldNotDecrypt)),
            Ok(pt) => assert_ne!(pt, vec![7u8; 100]),
        }
    }

    #[test]
    fn test_truncated_aes_ciphertext_rejected() {
        let iv = [0u8; 16];
        let err = decrypt(CipherId::Aes, &key(), &iv, &[1u8; 15]).unwrap_err();
        assert!(matches!(err, KpxError::CouldNotDecrypt));
    }

    #[test]
    fn test_chacha_roundtrip_keeps_length() {
        let iv = [0x33u8; 12];
        let ct = encrypt(CipherId::ChaCha20, &key(), &iv, b"stream").unwrap();
        assert_eq!(ct.len(), 6);
        assert_eq!(decrypt(CipherId::ChaCha20, &key(), &iv, &ct).unwrap(), b"stream");
    }

    #[test]
    fn test_iv_length_checked() {
        let err = encrypt(CipherId::ChaCha20, &key(), &[0u8; 16], b"x").unwrap_err();
        assert!(matches!(err, KpxError::HeaderFieldMalformed(_)));
    }
}
