use grove_core::types::{EncryptPublicKey, SignPublicKey, Signature};
use k256::ecdsa::signature::Signer;
use k256::ecdsa::{Signature as K256Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroize;

/// A secp256k1 signing keypair (spec §4.1's `sign`/`verify` contract).
///
/// The secret key is zeroized on drop.
pub struct SignKeyPair {
    pub public_key: SignPublicKey,
    secret_key: SigningKey,
}

impl SignKeyPair {
    /// Generate a fresh secp256k1 keypair.
    pub fn generate() -> Self {
        let secret_key = SigningKey::random(&mut OsRng);
        let verifying_key = VerifyingKey::from(&secret_key);
        let public_key = SignPublicKey(verifying_key.to_encoded_point(true).as_bytes().to_vec());
        Self {
            public_key,
            secret_key,
        }
    }

    /// Restore a keypair from a raw 32-byte secp256k1 scalar.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, k256::ecdsa::Error> {
        let secret_key = SigningKey::from_slice(bytes)?;
        let verifying_key = VerifyingKey::from(&secret_key);
        let public_key = SignPublicKey(verifying_key.to_encoded_point(true).as_bytes().to_vec());
        Ok(Self {
            public_key,
            secret_key,
        })
    }

    /// Sign `message` using this keypair's secret key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig: K256Signature = self.secret_key.sign(message);
        Signature(sig.to_der().as_bytes().to_vec())
    }

    /// Raw scalar bytes, for handing to a keystore's at-rest encryption.
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.secret_key.to_bytes().into()
    }
}

impl Drop for SignKeyPair {
    fn drop(&mut self) {
        let mut bytes = self.secret_key.to_bytes();
        bytes.zeroize();
    }
}

impl std::fmt::Debug for SignKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SignKeyPair {{ public_key: {:?} }}", self.public_key)
    }
}

/// An X25519 encryption keypair backing `encryptTo`/`decrypt` (spec §4.1).
pub struct EncryptKeyPair {
    pub public_key: EncryptPublicKey,
    pub(crate) secret: StaticSecret,
}

impl EncryptKeyPair {
    /// Generate a fresh X25519 keypair.
    pub fn generate() -> Self {
        let mut scalar = [0u8; 32];
        rand::RngCore::fill_bytes(&mut OsRng, &mut scalar);
        let secret = StaticSecret::from(scalar);
        let public = X25519PublicKey::from(&secret);
        Self {
            public_key: EncryptPublicKey(public.to_bytes().to_vec()),
            secret,
        }
    }

    /// Restore a keypair from a raw 32-byte X25519 scalar.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = X25519PublicKey::from(&secret);
        Self {
            public_key: EncryptPublicKey(public.to_bytes().to_vec()),
            secret,
        }
    }

    /// Raw scalar bytes, for handing to a keystore's at-rest encryption.
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// `decryptWithIdentity(this, envelope) -> plain` (spec §4.1), scoped to
    /// this keypair's own secret so callers never need to see a raw scalar.
    pub fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>, crate::envelope::EnvelopeError> {
        crate::envelope::decrypt_with_identity(&self.secret, envelope)
    }
}

impl Drop for EncryptKeyPair {
    fn drop(&mut self) {
        let mut bytes = self.secret.to_bytes();
        bytes.zeroize();
    }
}

impl std::fmt::Debug for EncryptKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptKeyPair {{ public_key: {:?} }}", self.public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_keypair_round_trip() {
        let kp = SignKeyPair::generate();
        let sig = kp.sign(b"payload");
        assert!(crate::sign::verify(&kp.public_key, b"payload", &sig).is_ok());
    }

    #[test]
    fn sign_keypair_restores_from_bytes() {
        let kp = SignKeyPair::generate();
        let restored = SignKeyPair::from_secret_bytes(&kp.secret_key_bytes()).unwrap();
        assert_eq!(kp.public_key.0, restored.public_key.0);
    }

    #[test]
    fn encrypt_keypair_restores_from_bytes() {
        let kp = EncryptKeyPair::generate();
        let restored = EncryptKeyPair::from_secret_bytes(kp.secret_key_bytes());
        assert_eq!(kp.public_key.0, restored.public_key.0);
    }
}
