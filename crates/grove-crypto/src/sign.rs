use grove_core::types::{SignPublicKey, Signature};
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature as K256Signature, SigningKey, VerifyingKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid secp256k1 secret key")]
    InvalidSecretKey,
    #[error("invalid secp256k1 public key")]
    InvalidPublicKey,
}

/// `sign(keyHandle, message) -> signature` using secp256k1 ECDSA (spec §4.1).
pub fn sign(secret_key_bytes: &[u8], message: &[u8]) -> Result<Signature, SignError> {
    let signing_key =
        SigningKey::from_slice(secret_key_bytes).map_err(|_| SignError::InvalidSecretKey)?;
    let sig: K256Signature = signing_key.sign(message);
    Ok(Signature(sig.to_der().as_bytes().to_vec()))
}

/// `verify(pubKey, message, signature) -> bool` (spec §4.1).
pub fn verify(
    public_key: &SignPublicKey,
    message: &[u8],
    signature: &Signature,
) -> Result<(), SignError> {
    let verifying_key =
        VerifyingKey::from_sec1_bytes(&public_key.0).map_err(|_| SignError::InvalidPublicKey)?;
    let sig =
        K256Signature::from_der(&signature.0).map_err(|_| SignError::InvalidSignature)?;
    verifying_key
        .verify(message, &sig)
        .map_err(|_| SignError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::SignKeyPair;

    #[test]
    fn sign_verify_round_trip() {
        let kp = SignKeyPair::generate();
        let msg = b"block hash to sign";
        let sig = kp.sign(msg);
        assert!(verify(&kp.public_key, msg, &sig).is_ok());
    }

    #[test]
    fn tampered_message_fails() {
        let kp = SignKeyPair::generate();
        let sig = kp.sign(b"original");
        assert!(verify(&kp.public_key, b"tampered", &sig).is_err());
    }
}
