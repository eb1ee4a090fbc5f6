pub mod envelope;
pub mod hash;
pub mod keypair;
pub mod sign;
pub mod symmetric;

pub use envelope::{decrypt_with_identity, encrypt_to_many, EnvelopeError};
pub use hash::hash;
pub use keypair::{EncryptKeyPair, SignKeyPair};
pub use sign::{sign, verify, SignError};
pub use symmetric::{aes_decrypt, aes_encrypt, SymmetricError};
