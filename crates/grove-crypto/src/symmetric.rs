use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use grove_core::types::CipherKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SymmetricError {
    #[error("AES-GCM encryption failed")]
    EncryptFailed,
    #[error("AES-GCM decryption failed (wrong key or tampered ciphertext)")]
    DecryptFailed,
    #[error("ciphertext too short to contain a nonce")]
    CiphertextTooShort,
}

const NONCE_LEN: usize = 12;

/// `aesEncrypt(plain, key) -> bytes` (spec §4.1). `key` is exactly 32 bytes.
/// Output is `nonce || ciphertext_with_tag`.
pub fn aes_encrypt(plain: &[u8], key: &CipherKey) -> Result<Vec<u8>, SymmetricError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plain)
        .map_err(|_| SymmetricError::EncryptFailed)?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// `aesDecrypt(cipher, key) -> plain` (spec §4.1).
pub fn aes_decrypt(ciphertext: &[u8], key: &CipherKey) -> Result<Vec<u8>, SymmetricError> {
    if ciphertext.len() < NONCE_LEN {
        return Err(SymmetricError::CiphertextTooShort);
    }
    let (nonce_bytes, body) = ciphertext.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), body)
        .map_err(|_| SymmetricError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = CipherKey([7u8; 32]);
        let plain = b"hello group";
        let ct = aes_encrypt(plain, &key).unwrap();
        let pt = aes_decrypt(&ct, &key).unwrap();
        assert_eq!(pt, plain);
    }

    #[test]
    fn wrong_key_fails() {
        let key = CipherKey([1u8; 32]);
        let other = CipherKey([2u8; 32]);
        let ct = aes_encrypt(b"secret", &key).unwrap();
        assert!(aes_decrypt(&ct, &other).is_err());
    }
}
