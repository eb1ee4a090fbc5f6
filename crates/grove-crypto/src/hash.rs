use grove_core::types::Digest32;
use sha2::{Digest, Sha256};

/// `hash(bytes) -> 32-byte digest` (spec §4.1, SHA-256).
pub fn hash(data: &[u8]) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let out = hasher.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    Digest32(arr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = hash(b"hello");
        let b = hash(b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_differs_on_tamper() {
        assert_ne!(hash(b"hello"), hash(b"hellp"));
    }
}
