use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key as AesKey, Nonce};
use grove_core::error::{GroveError, GroveResult};
use rand::RngCore;
use scrypt::Params as ScryptParams;
use serde::{Deserialize, Serialize};

/// Scrypt cost parameters for at-rest key encryption, grounded on
/// go-ethereum's `StandardScryptN`/`StandardScryptP` (dirkeystore.go calls
/// `ethkeystore.EncryptKey` with these). Lowered from the upstream N=2^18 to
/// keep node startup/unlock latency reasonable for many keys.
const SCRYPT_LOG_N: u8 = 15;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    Sign,
    Encrypt,
}

/// On-disk, passphrase-encrypted representation of one keypair's secret
/// material. One file per key, named by the key's handle.
#[derive(Serialize, Deserialize)]
pub struct StoredKey {
    pub version: u8,
    pub key_type: KeyType,
    pub pubkey: String,
    scrypt_log_n: u8,
    scrypt_r: u32,
    scrypt_p: u32,
    salt: String,
    nonce: String,
    ciphertext: String,
}

fn derive_key(password: &str, salt: &[u8]) -> GroveResult<[u8; 32]> {
    let params = ScryptParams::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, 32)
        .map_err(|e| GroveError::Other(format!("bad scrypt params: {e}")))?;
    let mut out = [0u8; 32];
    scrypt::scrypt(password.as_bytes(), salt, &params, &mut out)
        .map_err(|e| GroveError::Other(format!("scrypt derivation failed: {e}")))?;
    Ok(out)
}

impl StoredKey {
    /// Encrypt `secret_bytes` under `password`, producing a file-ready record.
    pub fn seal(
        key_type: KeyType,
        pubkey_hex: &str,
        secret_bytes: &[u8],
        password: &str,
    ) -> GroveResult<Self> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let wrap_key = derive_key(password, &salt)?;

        let cipher = Aes256Gcm::new(AesKey::<Aes256Gcm>::from_slice(&wrap_key));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, secret_bytes)
            .map_err(|_| GroveError::Other("key encryption failed".into()))?;

        Ok(Self {
            version: 1,
            key_type,
            pubkey: pubkey_hex.to_string(),
            scrypt_log_n: SCRYPT_LOG_N,
            scrypt_r: SCRYPT_R,
            scrypt_p: SCRYPT_P,
            salt: hex::encode(salt),
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
        })
    }

    /// Decrypt the secret key bytes with `password`. Returns
    /// `GroveError::IncorrectPassphrase` on AEAD failure, matching
    /// `dirkeystore.go`'s behavior of treating decrypt failure as a bad
    /// password rather than a corrupt file.
    pub fn unseal(&self, password: &str) -> GroveResult<Vec<u8>> {
        let salt = hex::decode(&self.salt).map_err(|e| GroveError::Other(e.to_string()))?;
        let params = ScryptParams::new(self.scrypt_log_n, self.scrypt_r, self.scrypt_p, 32)
            .map_err(|e| GroveError::Other(format!("bad scrypt params: {e}")))?;
        let mut wrap_key = [0u8; 32];
        scrypt::scrypt(password.as_bytes(), &salt, &params, &mut wrap_key)
            .map_err(|e| GroveError::Other(format!("scrypt derivation failed: {e}")))?;

        let nonce_bytes = hex::decode(&self.nonce).map_err(|e| GroveError::Other(e.to_string()))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(GroveError::Other("malformed key file nonce".into()));
        }
        let ciphertext = hex::decode(&self.ciphertext).map_err(|e| GroveError::Other(e.to_string()))?;

        let cipher = Aes256Gcm::new(AesKey::<Aes256Gcm>::from_slice(&wrap_key));
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|_| GroveError::IncorrectPassphrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_unseal_round_trip() {
        let sealed = StoredKey::seal(KeyType::Sign, "abcd", b"super secret", "hunter2").unwrap();
        let out = sealed.unseal("hunter2").unwrap();
        assert_eq!(out, b"super secret");
    }

    #[test]
    fn wrong_password_is_incorrect_passphrase() {
        let sealed = StoredKey::seal(KeyType::Sign, "abcd", b"super secret", "hunter2").unwrap();
        assert!(matches!(
            sealed.unseal("wrong").unwrap_err(),
            GroveError::IncorrectPassphrase
        ));
    }
}
