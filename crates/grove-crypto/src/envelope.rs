//! Multi-recipient asymmetric envelope encryption (spec §4.1 `encryptToMany` /
//! `decryptWithIdentity`), grounded on `original_source/crypto/age.go`'s
//! X25519 + scrypt age-style envelope: an ephemeral X25519 keypair performs
//! ECDH with each recipient to wrap a single random content key, which then
//! encrypts the payload once under AES-256-GCM.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key as AesKey, Nonce};
use grove_core::types::EncryptPublicKey;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("no recipients given")]
    NoRecipients,
    #[error("invalid recipient public key")]
    InvalidRecipientKey,
    #[error("this identity is not among the envelope's recipients")]
    IdentityNotRecipient,
    #[error("envelope is malformed: {0}")]
    Malformed(String),
    #[error("content decryption failed")]
    ContentDecryptFailed,
}

#[derive(Serialize, Deserialize)]
struct WrappedKey {
    /// The recipient's X25519 public key, so a receiver can find its own entry.
    recipient: [u8; 32],
    /// The content key, AES-256-GCM-wrapped under this recipient's ECDH secret.
    wrapped: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    ephemeral_pub: [u8; 32],
    recipients: Vec<WrappedKey>,
    /// Nonce for the body ciphertext (encrypted once under the content key).
    body_nonce: [u8; 12],
    body_ciphertext: Vec<u8>,
}

fn kdf(shared_secret: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"grove-envelope-v1");
    hasher.update(shared_secret);
    let out = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&out);
    key
}

/// `encryptToMany(recipients[], plain) -> bytes` (spec §4.1).
pub fn encrypt_to_many(
    recipients: &[EncryptPublicKey],
    plain: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    if recipients.is_empty() {
        return Err(EnvelopeError::NoRecipients);
    }

    let mut content_key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut content_key);

    let mut ephemeral_scalar = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut ephemeral_scalar);
    let ephemeral = StaticSecret::from(ephemeral_scalar);
    let ephemeral_pub = PublicKey::from(&ephemeral);

    let mut wrapped_keys = Vec::with_capacity(recipients.len());
    for recipient in recipients {
        if recipient.0.len() != 32 {
            return Err(EnvelopeError::InvalidRecipientKey);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&recipient.0);
        let recipient_pub = PublicKey::from(arr);

        let shared = ephemeral.diffie_hellman(&recipient_pub);
        let wrap_key = kdf(shared.as_bytes());

        let wrap_cipher = Aes256Gcm::new(AesKey::<Aes256Gcm>::from_slice(&wrap_key));
        let wrap_nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut wrapped = wrap_cipher
            .encrypt(&wrap_nonce, content_key.as_slice())
            .map_err(|_| EnvelopeError::Malformed("wrap encrypt failed".into()))?;
        let mut framed = wrap_nonce.to_vec();
        framed.append(&mut wrapped);

        wrapped_keys.push(WrappedKey {
            recipient: arr,
            wrapped: framed,
        });
    }

    let body_cipher = Aes256Gcm::new(AesKey::<Aes256Gcm>::from_slice(&content_key));
    let body_nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let body_ciphertext = body_cipher
        .encrypt(&body_nonce, plain)
        .map_err(|_| EnvelopeError::Malformed("body encrypt failed".into()))?;

    let envelope = Envelope {
        ephemeral_pub: ephemeral_pub.to_bytes(),
        recipients: wrapped_keys,
        body_nonce: body_nonce.into(),
        body_ciphertext,
    };
    bincode::serialize(&envelope)
        .map_err(|e| EnvelopeError::Malformed(format!("envelope serialization: {e}")))
}

/// `decryptWithIdentity(identity, envelope) -> plain` (spec §4.1).
pub fn decrypt_with_identity(
    identity_secret: &StaticSecret,
    envelope_bytes: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    let envelope: Envelope = bincode::deserialize(envelope_bytes)
        .map_err(|e| EnvelopeError::Malformed(format!("envelope deserialization: {e}")))?;

    let identity_pub = PublicKey::from(identity_secret).to_bytes();
    let entry = envelope
        .recipients
        .iter()
        .find(|w| w.recipient == identity_pub)
        .ok_or(EnvelopeError::IdentityNotRecipient)?;

    let ephemeral_pub = PublicKey::from(envelope.ephemeral_pub);
    let shared = identity_secret.diffie_hellman(&ephemeral_pub);
    let wrap_key = kdf(shared.as_bytes());

    if entry.wrapped.len() < 12 {
        return Err(EnvelopeError::Malformed("wrapped key too short".into()));
    }
    let (nonce_bytes, wrapped_ct) = entry.wrapped.split_at(12);
    let wrap_cipher = Aes256Gcm::new(AesKey::<Aes256Gcm>::from_slice(&wrap_key));
    let content_key = wrap_cipher
        .decrypt(Nonce::from_slice(nonce_bytes), wrapped_ct)
        .map_err(|_| EnvelopeError::ContentDecryptFailed)?;

    let body_cipher = Aes256Gcm::new(AesKey::<Aes256Gcm>::from_slice(&content_key));
    body_cipher
        .decrypt(Nonce::from_slice(&envelope.body_nonce), envelope.body_ciphertext.as_slice())
        .map_err(|_| EnvelopeError::ContentDecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::EncryptKeyPair;

    #[test]
    fn multi_recipient_round_trip() {
        let a = EncryptKeyPair::generate();
        let b = EncryptKeyPair::generate();
        let c = EncryptKeyPair::generate();

        let envelope =
            encrypt_to_many(&[a.public_key.clone(), b.public_key.clone()], b"hello").unwrap();

        let decrypted_a = decrypt_with_identity(&a.secret, &envelope).unwrap();
        assert_eq!(decrypted_a, b"hello");

        let decrypted_b = decrypt_with_identity(&b.secret, &envelope).unwrap();
        assert_eq!(decrypted_b, b"hello");

        assert!(decrypt_with_identity(&c.secret, &envelope).is_err());
    }

    #[test]
    fn rejects_empty_recipients() {
        assert!(matches!(
            encrypt_to_many(&[], b"x"),
            Err(EnvelopeError::NoRecipients)
        ));
    }
}
