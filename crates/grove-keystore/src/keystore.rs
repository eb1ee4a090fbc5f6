use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use grove_core::error::{GroveError, GroveResult};
use grove_core::types::{EncryptPublicKey, SignPublicKey, Signature};
use grove_crypto::keypair::{EncryptKeyPair, SignKeyPair};
use tracing::info;

use crate::storedkey::{KeyType, StoredKey};

enum UnlockedKey {
    Sign(SignKeyPair),
    Encrypt(EncryptKeyPair),
}

/// A directory of passphrase-encrypted keys, one file per key name
/// (`<name>.json` under `path`), grounded on `dirkeystore.go`'s
/// `DirKeyStore`. Keys are decrypted into memory only on `unlock` and
/// zeroized on `lock` (via the underlying keypairs' `Drop` impls).
pub struct Keystore {
    path: PathBuf,
    unlocked: Mutex<HashMap<String, UnlockedKey>>,
}

impl Keystore {
    /// Open (creating if needed) a keystore directory.
    pub fn open<P: AsRef<Path>>(path: P) -> GroveResult<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path).map_err(|e| GroveError::Other(e.to_string()))?;
        Ok(Self {
            path,
            unlocked: Mutex::new(HashMap::new()),
        })
    }

    fn key_path(&self, name: &str) -> PathBuf {
        self.path.join(format!("{name}.json"))
    }

    fn read_stored(&self, name: &str) -> GroveResult<StoredKey> {
        let bytes = std::fs::read(self.key_path(name))
            .map_err(|_| GroveError::KeyNotFound(name.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| GroveError::Serialization(e.to_string()))
    }

    fn write_stored(&self, name: &str, stored: &StoredKey) -> GroveResult<()> {
        let bytes = serde_json::to_vec_pretty(stored).map_err(|e| GroveError::Serialization(e.to_string()))?;
        std::fs::write(self.key_path(name), bytes).map_err(|e| GroveError::Other(e.to_string()))
    }

    pub fn key_exists(&self, name: &str) -> bool {
        self.key_path(name).exists()
    }

    // ── Key creation ─────────────────────────────────────────────────────────

    /// Generate and store a fresh key, leaving it unlocked in memory.
    pub fn new_key(&self, name: &str, key_type: KeyType, password: &str) -> GroveResult<String> {
        if self.key_exists(name) {
            return Err(GroveError::KeyAlreadyExists(name.to_string()));
        }
        match key_type {
            KeyType::Sign => {
                let kp = SignKeyPair::generate();
                let pubkey_hex = hex::encode(&kp.public_key.0);
                let stored = StoredKey::seal(key_type, &pubkey_hex, &kp.secret_key_bytes(), password)?;
                self.write_stored(name, &stored)?;
                self.unlocked.lock().unwrap().insert(name.to_string(), UnlockedKey::Sign(kp));
                Ok(pubkey_hex)
            }
            KeyType::Encrypt => {
                let kp = EncryptKeyPair::generate();
                let pubkey_hex = hex::encode(&kp.public_key.0);
                let stored = StoredKey::seal(key_type, &pubkey_hex, &kp.secret_key_bytes(), password)?;
                self.write_stored(name, &stored)?;
                self.unlocked.lock().unwrap().insert(name.to_string(), UnlockedKey::Encrypt(kp));
                Ok(pubkey_hex)
            }
        }
    }

    /// Import a raw secp256k1 scalar as a named sign key.
    pub fn import_sign_key(&self, name: &str, secret_bytes: &[u8], password: &str) -> GroveResult<String> {
        if self.key_exists(name) {
            return Err(GroveError::KeyAlreadyExists(name.to_string()));
        }
        let kp = SignKeyPair::from_secret_bytes(secret_bytes)
            .map_err(|_| GroveError::Validation("invalid secp256k1 secret key".into()))?;
        let pubkey_hex = hex::encode(&kp.public_key.0);
        let stored = StoredKey::seal(KeyType::Sign, &pubkey_hex, secret_bytes, password)?;
        self.write_stored(name, &stored)?;
        self.unlocked.lock().unwrap().insert(name.to_string(), UnlockedKey::Sign(kp));
        Ok(pubkey_hex)
    }

    // ── Unlock / lock ────────────────────────────────────────────────────────

    pub fn unlock(&self, name: &str, password: &str) -> GroveResult<()> {
        let stored = self.read_stored(name)?;
        let secret_bytes = stored.unseal(password)?;
        let unlocked = match stored.key_type {
            KeyType::Sign => UnlockedKey::Sign(
                SignKeyPair::from_secret_bytes(&secret_bytes)
                    .map_err(|_| GroveError::Other("corrupt sign key".into()))?,
            ),
            KeyType::Encrypt => {
                let mut arr = [0u8; 32];
                if secret_bytes.len() != 32 {
                    return Err(GroveError::Other("corrupt encrypt key".into()));
                }
                arr.copy_from_slice(&secret_bytes);
                UnlockedKey::Encrypt(EncryptKeyPair::from_secret_bytes(arr))
            }
        };
        self.unlocked.lock().unwrap().insert(name.to_string(), unlocked);
        info!(key = name, "key unlocked");
        Ok(())
    }

    /// Unlock every key on disk with the same passphrase (node startup path).
    pub fn unlock_all(&self, password: &str) -> GroveResult<usize> {
        let mut count = 0;
        for entry in std::fs::read_dir(&self.path).map_err(|e| GroveError::Other(e.to_string()))? {
            let entry = entry.map_err(|e| GroveError::Other(e.to_string()))?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(|s| s.strip_suffix(".json")) else {
                continue;
            };
            self.unlock(name, password)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn lock(&self, name: &str) {
        self.unlocked.lock().unwrap().remove(name);
    }

    pub fn lock_all(&self) {
        self.unlocked.lock().unwrap().clear();
    }

    pub fn is_unlocked(&self, name: &str) -> bool {
        self.unlocked.lock().unwrap().contains_key(name)
    }

    pub fn unlocked_key_count(&self) -> usize {
        self.unlocked.lock().unwrap().len()
    }

    // ── Public key lookup (no unlock required — stored in file header) ──────

    pub fn get_encoded_pubkey(&self, name: &str) -> GroveResult<String> {
        Ok(self.read_stored(name)?.pubkey)
    }

    // ── Sign / verify ────────────────────────────────────────────────────────

    pub fn sign_by_key_name(&self, name: &str, message: &[u8]) -> GroveResult<Signature> {
        let unlocked = self.unlocked.lock().unwrap();
        match unlocked.get(name) {
            Some(UnlockedKey::Sign(kp)) => Ok(kp.sign(message)),
            Some(UnlockedKey::Encrypt(_)) => {
                Err(GroveError::Validation(format!("{name} is not a sign key")))
            }
            None => Err(GroveError::KeystoreLocked),
        }
    }

    pub fn verify_sign_by_key_name(
        &self,
        name: &str,
        message: &[u8],
        signature: &Signature,
    ) -> GroveResult<()> {
        let pubkey_hex = self.get_encoded_pubkey(name)?;
        let pubkey_bytes = hex::decode(&pubkey_hex).map_err(|e| GroveError::Other(e.to_string()))?;
        grove_crypto::verify(&SignPublicKey(pubkey_bytes), message, signature)
            .map_err(|_| GroveError::InvalidSignature)
    }

    // ── Asymmetric envelope encryption ───────────────────────────────────────

    /// `encryptTo(recipients[], plain) -> bytes` (spec §4.1). Needs no local
    /// secret key — any node can encrypt to a set of public keys.
    pub fn encrypt_to(&self, recipients: &[EncryptPublicKey], plain: &[u8]) -> GroveResult<Vec<u8>> {
        grove_crypto::encrypt_to_many(recipients, plain)
            .map_err(|e| GroveError::Other(e.to_string()))
    }

    pub fn decrypt_with_key_name(&self, name: &str, envelope: &[u8]) -> GroveResult<Vec<u8>> {
        let unlocked = self.unlocked.lock().unwrap();
        match unlocked.get(name) {
            Some(UnlockedKey::Encrypt(kp)) => kp
                .decrypt(envelope)
                .map_err(|e| GroveError::DecryptFailed(e.to_string())),
            Some(UnlockedKey::Sign(_)) => {
                Err(GroveError::Validation(format!("{name} is not an encrypt key")))
            }
            None => Err(GroveError::KeystoreLocked),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_key_then_sign_verify() {
        let dir = tempfile::tempdir().unwrap();
        let ks = Keystore::open(dir.path()).unwrap();
        ks.new_key("owner-sign", KeyType::Sign, "pw").unwrap();
        let sig = ks.sign_by_key_name("owner-sign", b"hello").unwrap();
        ks.verify_sign_by_key_name("owner-sign", b"hello", &sig).unwrap();
    }

    #[test]
    fn lock_then_sign_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ks = Keystore::open(dir.path()).unwrap();
        ks.new_key("k", KeyType::Sign, "pw").unwrap();
        ks.lock("k");
        assert!(matches!(
            ks.sign_by_key_name("k", b"x").unwrap_err(),
            GroveError::KeystoreLocked
        ));
    }

    #[test]
    fn unlock_all_restores_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ks = Keystore::open(dir.path()).unwrap();
            ks.new_key("a", KeyType::Sign, "pw").unwrap();
            ks.new_key("b", KeyType::Encrypt, "pw").unwrap();
        }
        let ks2 = Keystore::open(dir.path()).unwrap();
        assert_eq!(ks2.unlock_all("pw").unwrap(), 2);
        assert!(ks2.is_unlocked("a"));
        assert!(ks2.is_unlocked("b"));
    }

    #[test]
    fn encrypt_decrypt_round_trip_via_keystore() {
        let dir = tempfile::tempdir().unwrap();
        let ks = Keystore::open(dir.path()).unwrap();
        let pubkey_hex = ks.new_key("recipient", KeyType::Encrypt, "pw").unwrap();
        let pubkey = EncryptPublicKey(hex::decode(pubkey_hex).unwrap());

        let envelope = ks.encrypt_to(&[pubkey], b"secret message").unwrap();
        let plain = ks.decrypt_with_key_name("recipient", &envelope).unwrap();
        assert_eq!(plain, b"secret message");
    }
}
