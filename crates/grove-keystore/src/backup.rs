use std::path::Path;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key as AesKey, Nonce};
use grove_core::error::{GroveError, GroveResult};
use rand::RngCore;
use scrypt::Params as ScryptParams;
use serde::{Deserialize, Serialize};

const SCRYPT_LOG_N: u8 = 15;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// A three-part passphrase-wrapped backup archive: the group cipher-key
/// export, the keystore directory, and the config directory — grounded on
/// `dirkeystore.go`'s `Backup`, which returns three independently
/// age-encrypted base64 strings for the same three things.
#[derive(Serialize, Deserialize)]
pub struct BackupBundle {
    pub group_seeds: String,
    pub keystore_dir: String,
    pub config_dir: String,
}

#[derive(Serialize, Deserialize)]
struct DirSnapshot {
    files: Vec<(String, Vec<u8>)>,
}

fn snapshot_dir(path: &Path) -> GroveResult<DirSnapshot> {
    let mut files = Vec::new();
    if path.exists() {
        walk(path, path, &mut files)?;
    }
    Ok(DirSnapshot { files })
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<(String, Vec<u8>)>) -> GroveResult<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| GroveError::Other(e.to_string()))? {
        let entry = entry.map_err(|e| GroveError::Other(e.to_string()))?;
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, out)?;
        } else {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();
            let bytes = std::fs::read(&path).map_err(|e| GroveError::Other(e.to_string()))?;
            out.push((rel, bytes));
        }
    }
    Ok(())
}

fn seal_base64(plain: &[u8], passphrase: &str) -> GroveResult<String> {
    let mut salt = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut salt);
    let params = ScryptParams::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, 32)
        .map_err(|e| GroveError::Other(e.to_string()))?;
    let mut wrap_key = [0u8; 32];
    scrypt::scrypt(passphrase.as_bytes(), &salt, &params, &mut wrap_key)
        .map_err(|e| GroveError::Other(e.to_string()))?;

    let cipher = Aes256Gcm::new(AesKey::<Aes256Gcm>::from_slice(&wrap_key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plain)
        .map_err(|_| GroveError::Other("backup encryption failed".into()))?;

    let mut framed = salt.to_vec();
    framed.extend_from_slice(&nonce);
    framed.extend_from_slice(&ciphertext);
    Ok(base64_encode(&framed))
}

fn unseal_base64(encoded: &str, passphrase: &str) -> GroveResult<Vec<u8>> {
    let framed = base64_decode(encoded)?;
    if framed.len() < 32 + 12 {
        return Err(GroveError::Other("malformed backup archive".into()));
    }
    let (salt, rest) = framed.split_at(32);
    let (nonce_bytes, ciphertext) = rest.split_at(12);

    let params = ScryptParams::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, 32)
        .map_err(|e| GroveError::Other(e.to_string()))?;
    let mut wrap_key = [0u8; 32];
    scrypt::scrypt(passphrase.as_bytes(), salt, &params, &mut wrap_key)
        .map_err(|e| GroveError::Other(e.to_string()))?;

    let cipher = Aes256Gcm::new(AesKey::<Aes256Gcm>::from_slice(&wrap_key));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| GroveError::IncorrectPassphrase)
}

/// Produce a three-part encrypted backup of this node's keystore, config
/// directory, and a caller-supplied group-seed export (typically the JSON
/// of every `GroupItem` the node belongs to).
pub fn backup(
    keystore_path: &Path,
    config_path: &Path,
    group_seeds_json: &[u8],
    passphrase: &str,
) -> GroveResult<BackupBundle> {
    let keystore_snapshot = bincode::serialize(&snapshot_dir(keystore_path)?)
        .map_err(|e| GroveError::Serialization(e.to_string()))?;
    let config_snapshot = bincode::serialize(&snapshot_dir(config_path)?)
        .map_err(|e| GroveError::Serialization(e.to_string()))?;

    Ok(BackupBundle {
        group_seeds: seal_base64(group_seeds_json, passphrase)?,
        keystore_dir: seal_base64(&keystore_snapshot, passphrase)?,
        config_dir: seal_base64(&config_snapshot, passphrase)?,
    })
}

/// Restore a backup bundle into `keystore_path`/`config_path`, returning the
/// decrypted group-seeds JSON for the caller to hand to the group manager.
pub fn restore(
    bundle: &BackupBundle,
    keystore_path: &Path,
    config_path: &Path,
    passphrase: &str,
) -> GroveResult<Vec<u8>> {
    let group_seeds_json = unseal_base64(&bundle.group_seeds, passphrase)?;

    let keystore_snapshot: DirSnapshot =
        bincode::deserialize(&unseal_base64(&bundle.keystore_dir, passphrase)?)
            .map_err(|e| GroveError::Serialization(e.to_string()))?;
    restore_snapshot(&keystore_snapshot, keystore_path)?;

    let config_snapshot: DirSnapshot =
        bincode::deserialize(&unseal_base64(&bundle.config_dir, passphrase)?)
            .map_err(|e| GroveError::Serialization(e.to_string()))?;
    restore_snapshot(&config_snapshot, config_path)?;

    Ok(group_seeds_json)
}

fn restore_snapshot(snapshot: &DirSnapshot, root: &Path) -> GroveResult<()> {
    std::fs::create_dir_all(root).map_err(|e| GroveError::Other(e.to_string()))?;
    for (rel, bytes) in &snapshot.files {
        let dest = root.join(rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GroveError::Other(e.to_string()))?;
        }
        std::fs::write(&dest, bytes).map_err(|e| GroveError::Other(e.to_string()))?;
    }
    Ok(())
}

// Minimal base64 (standard alphabet, padded) so the backup format needs no
// extra dependency beyond what the rest of the workspace already pulls in.
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn base64_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() + 2) / 3 * 4);
    for chunk in data.chunks(3) {
        let b0 = chunk[0];
        let b1 = *chunk.get(1).unwrap_or(&0);
        let b2 = *chunk.get(2).unwrap_or(&0);
        out.push(ALPHABET[(b0 >> 2) as usize] as char);
        out.push(ALPHABET[(((b0 & 0x03) << 4) | (b1 >> 4)) as usize] as char);
        out.push(if chunk.len() > 1 {
            ALPHABET[(((b1 & 0x0f) << 2) | (b2 >> 6)) as usize] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            ALPHABET[(b2 & 0x3f) as usize] as char
        } else {
            '='
        });
    }
    out
}

fn base64_decode(s: &str) -> GroveResult<Vec<u8>> {
    fn val(c: u8) -> GroveResult<u8> {
        ALPHABET
            .iter()
            .position(|&a| a == c)
            .map(|p| p as u8)
            .ok_or_else(|| GroveError::Other("invalid base64 in backup archive".into()))
    }
    let clean: Vec<u8> = s.bytes().filter(|&b| b != b'=').collect();
    let mut out = Vec::with_capacity(clean.len() * 3 / 4);
    for chunk in clean.chunks(4) {
        let vals: Vec<u8> = chunk.iter().map(|&c| val(c)).collect::<GroveResult<_>>()?;
        out.push((vals[0] << 2) | (vals.get(1).unwrap_or(&0) >> 4));
        if vals.len() > 2 {
            out.push((vals[1] << 4) | (vals[2] >> 2));
        }
        if vals.len() > 3 {
            out.push((vals[2] << 6) | vals[3]);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_restore_round_trip() {
        let src_keystore = tempfile::tempdir().unwrap();
        let src_config = tempfile::tempdir().unwrap();
        std::fs::write(src_keystore.path().join("owner.json"), b"stored-key-bytes").unwrap();
        std::fs::write(src_config.path().join("node.toml"), b"peername = \"a\"").unwrap();

        let bundle = backup(src_keystore.path(), src_config.path(), b"[]", "archive-pw").unwrap();

        let dst_keystore = tempfile::tempdir().unwrap();
        let dst_config = tempfile::tempdir().unwrap();
        let group_seeds = restore(&bundle, dst_keystore.path(), dst_config.path(), "archive-pw").unwrap();

        assert_eq!(group_seeds, b"[]");
        assert_eq!(
            std::fs::read(dst_keystore.path().join("owner.json")).unwrap(),
            b"stored-key-bytes"
        );
        assert_eq!(
            std::fs::read(dst_config.path().join("node.toml")).unwrap(),
            b"peername = \"a\""
        );
    }

    #[test]
    fn restore_with_wrong_passphrase_fails() {
        let src_keystore = tempfile::tempdir().unwrap();
        let src_config = tempfile::tempdir().unwrap();
        let bundle = backup(src_keystore.path(), src_config.path(), b"[]", "right").unwrap();
        let dst_keystore = tempfile::tempdir().unwrap();
        let dst_config = tempfile::tempdir().unwrap();
        assert!(restore(&bundle, dst_keystore.path(), dst_config.path(), "wrong").is_err());
    }
}
