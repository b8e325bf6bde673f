//! Content-addressed chunk store.
//!
//! Chunks live in a single flat directory keyed by the SHA-1 of their raw
//! UTF-8 bytes: `{sha}.gz` for plain gzip, `{sha}.gz.enc` for the
//! encrypted format. The two are mutually exclusive per SHA; writing one
//! mode removes a residual file of the other.
//!
//! Encrypted layout: `"PAMPAE1" || salt(16) || iv(12) || ciphertext || tag(16)`
//! where the AES-256-GCM key is derived per chunk via
//! `HKDF-SHA256(master, salt, "pampa-chunk-v1")`. Salt and iv are freshly
//! random on every write.
//!
//! Writers always go through a same-directory temp file plus rename, so a
//! reader can never observe a partially written chunk.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::constants::{CHUNK_KEY_INFO, ENCRYPTED_CHUNK_MAGIC};
use crate::error::{PampaxError, Result};
use crate::pathutil;

const SALT_LEN: usize = 16;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// SHA-1 of raw bytes as 40 lowercase hex chars.
///
/// Computed over the exact bytes, BOM and line endings included; this is
/// the store's addressing function.
pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// 32-byte master key accepted as base64 (44 chars) or hex (64 chars).
#[derive(Clone)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    /// Parse key material, rejecting anything that is not exactly 32 bytes.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let bytes = if raw.len() == 44 {
            base64::engine::general_purpose::STANDARD
                .decode(raw)
                .map_err(|e| PampaxError::Config(format!("encryption key is not valid base64: {e}")))?
        } else if raw.len() == 64 {
            hex::decode(raw)
                .map_err(|e| PampaxError::Config(format!("encryption key is not valid hex: {e}")))?
        } else {
            return Err(PampaxError::Config(format!(
                "encryption key must be 32 bytes as base64 (44 chars) or hex (64 chars), got {} chars",
                raw.len()
            )));
        };

        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            PampaxError::Config("encryption key must decode to exactly 32 bytes".to_string())
        })?;
        Ok(MasterKey(arr))
    }

    fn derive_chunk_key(&self, salt: &[u8]) -> Result<[u8; 32]> {
        let hk = Hkdf::<Sha256>::new(Some(salt), &self.0);
        let mut okm = [0u8; 32];
        hk.expand(CHUNK_KEY_INFO, &mut okm)
            .map_err(|e| PampaxError::Internal(format!("HKDF expand failed: {e}")))?;
        Ok(okm)
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.write_str("MasterKey(..)")
    }
}

/// Flat content-addressed store under `.pampa/chunks/`.
pub struct ChunkStore {
    dir: PathBuf,
    key: Option<MasterKey>,
    encrypt_writes: bool,
}

impl ChunkStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    ///
    /// `encrypt_writes` requires a key; rejecting that combination here
    /// keeps every later write infallible on configuration.
    pub fn open(dir: PathBuf, key: Option<MasterKey>, encrypt_writes: bool) -> Result<Self> {
        if encrypt_writes && key.is_none() {
            return Err(PampaxError::Config(
                "encryption requested but no encryption key configured".to_string(),
            ));
        }
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            key,
            encrypt_writes,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn encrypts(&self) -> bool {
        self.encrypt_writes
    }

    fn plain_path(&self, sha: &str) -> PathBuf {
        self.dir.join(format!("{sha}.gz"))
    }

    fn encrypted_path(&self, sha: &str) -> PathBuf {
        self.dir.join(format!("{sha}.gz.enc"))
    }

    /// Whether any file (either mode) exists for `sha`.
    pub fn contains(&self, sha: &str) -> bool {
        self.encrypted_path(sha).exists() || self.plain_path(sha).exists()
    }

    /// Write chunk content, replacing any previous file for the SHA.
    ///
    /// The opposite-mode file is deleted so `.gz` and `.gz.enc` stay
    /// mutually exclusive per SHA.
    pub fn write_chunk(&self, sha: &str, content: &[u8]) -> Result<()> {
        let gz = gzip(content)?;

        if self.encrypt_writes {
            let key = self
                .key
                .as_ref()
                .expect("encrypt_writes implies key, checked at open");
            let payload = encrypt_payload(key, &gz)?;
            pathutil::atomic_write(&self.encrypted_path(sha), &payload)?;
            remove_if_exists(&self.plain_path(sha))?;
        } else {
            pathutil::atomic_write(&self.plain_path(sha), &gz)?;
            remove_if_exists(&self.encrypted_path(sha))?;
        }
        Ok(())
    }

    /// Read chunk content back as raw bytes.
    ///
    /// Prefers the encrypted file when both could exist transiently;
    /// reading an encrypted chunk without a key is a configuration error,
    /// and a failed GCM tag is reported as tampering/key mismatch.
    pub fn read_chunk(&self, sha: &str) -> Result<Vec<u8>> {
        let enc_path = self.encrypted_path(sha);
        if enc_path.exists() {
            let key = self
                .key
                .as_ref()
                .ok_or_else(|| PampaxError::EncryptionKeyMissing { sha: sha.to_string() })?;
            let payload = pathutil::with_io_retry(|| fs::read(&enc_path))?;
            let gz = decrypt_payload(key, &payload, sha)?;
            return gunzip(&gz);
        }

        let plain_path = self.plain_path(sha);
        if plain_path.exists() {
            let gz = pathutil::with_io_retry(|| fs::read(&plain_path))?;
            return gunzip(&gz);
        }

        Err(PampaxError::NotFound(format!("chunk {sha} not in store")))
    }

    /// Read chunk content as UTF-8 text.
    pub fn read_chunk_text(&self, sha: &str) -> Result<String> {
        let bytes = self.read_chunk(sha)?;
        String::from_utf8(bytes)
            .map_err(|_| PampaxError::Internal(format!("chunk {sha} is not valid UTF-8")))
    }

    /// Remove both mode files for `sha` (idempotent).
    pub fn remove_chunk(&self, sha: &str) -> Result<()> {
        remove_if_exists(&self.plain_path(sha))?;
        remove_if_exists(&self.encrypted_path(sha))?;
        Ok(())
    }

    /// Enumerate every SHA present in the store, sorted ascending.
    pub fn list_shas(&self) -> Result<Vec<String>> {
        let mut shas = Vec::new();
        if !self.dir.exists() {
            return Ok(shas);
        }
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let sha = if let Some(s) = name.strip_suffix(".gz.enc") {
                s
            } else if let Some(s) = name.strip_suffix(".gz") {
                s
            } else {
                continue;
            };
            if sha.len() == 40 && sha.bytes().all(|b| b.is_ascii_hexdigit()) {
                shas.push(sha.to_string());
            }
        }
        shas.sort();
        shas.dedup();
        Ok(shas)
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

fn encrypt_payload(key: &MasterKey, gz: &[u8]) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);

    let chunk_key = key.derive_chunk_key(&salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&chunk_key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), gz)
        .map_err(|_| PampaxError::Internal("AES-GCM encryption failed".to_string()))?;

    let mut out = Vec::with_capacity(ENCRYPTED_CHUNK_MAGIC.len() + SALT_LEN + IV_LEN + ciphertext.len());
    out.extend_from_slice(ENCRYPTED_CHUNK_MAGIC);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn decrypt_payload(key: &MasterKey, payload: &[u8], sha: &str) -> Result<Vec<u8>> {
    let header_len = ENCRYPTED_CHUNK_MAGIC.len() + SALT_LEN + IV_LEN;
    if payload.len() < header_len + TAG_LEN || !payload.starts_with(ENCRYPTED_CHUNK_MAGIC) {
        return Err(PampaxError::ChunkAuthFailed {
            sha: sha.to_string(),
        });
    }

    let salt = &payload[ENCRYPTED_CHUNK_MAGIC.len()..ENCRYPTED_CHUNK_MAGIC.len() + SALT_LEN];
    let iv = &payload[ENCRYPTED_CHUNK_MAGIC.len() + SALT_LEN..header_len];
    let ciphertext = &payload[header_len..];

    let chunk_key = key.derive_chunk_key(salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&chunk_key));
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| PampaxError::ChunkAuthFailed {
            sha: sha.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_key() -> MasterKey {
        // 00 01 02 .. 1f
        let bytes: Vec<u8> = (0u8..32).collect();
        MasterKey::parse(&hex::encode(bytes)).unwrap()
    }

    #[test]
    fn test_sha1_of_crlf_content() {
        assert_eq!(
            sha1_hex(b"hello\r\nworld"),
            "d07cff009c449bfdf131d865e1dc4413256e5f52"
        );
    }

    #[test]
    fn test_hkdf_derivation_vector() {
        let key = test_key();
        let salt = hex::decode("f0e0d0c0b0a090807060504030201000").unwrap();
        let derived = key.derive_chunk_key(&salt).unwrap();
        assert_eq!(
            hex::encode(derived),
            "6eed612f20f4bcb23e0f5f3023a337c73647da8e626041dea455feafe5ba3b99"
        );
    }

    #[test]
    fn test_master_key_formats() {
        let bytes: Vec<u8> = (0u8..32).collect();
        assert!(MasterKey::parse(&hex::encode(&bytes)).is_ok());
        assert!(MasterKey::parse(
            &base64::engine::general_purpose::STANDARD.encode(&bytes)
        )
        .is_ok());

        // Wrong lengths are rejected up front.
        assert!(MasterKey::parse("deadbeef").is_err());
        assert!(MasterKey::parse(&hex::encode([0u8; 16])).is_err());
        assert!(MasterKey::parse("").is_err());
    }

    #[test]
    fn test_plain_roundtrip_preserves_bytes() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(dir.path().join("chunks"), None, false).unwrap();

        let content = "line one\r\nline two\nmixed endings\r\n";
        let sha = sha1_hex(content.as_bytes());
        store.write_chunk(&sha, content.as_bytes()).unwrap();

        assert_eq!(store.read_chunk(&sha).unwrap(), content.as_bytes());
        assert_eq!(store.read_chunk_text(&sha).unwrap(), content);
        assert!(dir.path().join("chunks").join(format!("{sha}.gz")).exists());
    }

    #[test]
    fn test_encrypted_roundtrip() {
        let dir = tempdir().unwrap();
        let store =
            ChunkStore::open(dir.path().join("chunks"), Some(test_key()), true).unwrap();

        let content = b"fn secret() { 42 }";
        let sha = sha1_hex(content);
        store.write_chunk(&sha, content).unwrap();

        let enc_file = dir.path().join("chunks").join(format!("{sha}.gz.enc"));
        assert!(enc_file.exists());
        let payload = fs::read(&enc_file).unwrap();
        assert!(payload.starts_with(b"PAMPAE1"));

        assert_eq!(store.read_chunk(&sha).unwrap(), content);
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let dir = tempdir().unwrap();
        let chunks = dir.path().join("chunks");
        let store = ChunkStore::open(chunks.clone(), Some(test_key()), true).unwrap();

        let content = b"sensitive";
        let sha = sha1_hex(content);
        store.write_chunk(&sha, content).unwrap();

        let other_key = MasterKey::parse(&hex::encode([0xabu8; 32])).unwrap();
        let reader = ChunkStore::open(chunks, Some(other_key), false).unwrap();
        match reader.read_chunk(&sha) {
            Err(PampaxError::ChunkAuthFailed { .. }) => {}
            other => panic!("expected ChunkAuthFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_encrypted_read_without_key_is_config_error() {
        let dir = tempdir().unwrap();
        let chunks = dir.path().join("chunks");
        let store = ChunkStore::open(chunks.clone(), Some(test_key()), true).unwrap();

        let content = b"locked";
        let sha = sha1_hex(content);
        store.write_chunk(&sha, content).unwrap();

        let keyless = ChunkStore::open(chunks, None, false).unwrap();
        match keyless.read_chunk(&sha) {
            Err(PampaxError::EncryptionKeyMissing { .. }) => {}
            other => panic!("expected EncryptionKeyMissing, got {other:?}"),
        }
    }

    #[test]
    fn test_tampered_payload_fails() {
        let dir = tempdir().unwrap();
        let chunks = dir.path().join("chunks");
        let store = ChunkStore::open(chunks.clone(), Some(test_key()), true).unwrap();

        let content = b"integrity matters";
        let sha = sha1_hex(content);
        store.write_chunk(&sha, content).unwrap();

        let enc_file = chunks.join(format!("{sha}.gz.enc"));
        let mut payload = fs::read(&enc_file).unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0xff;
        fs::write(&enc_file, payload).unwrap();

        assert!(matches!(
            store.read_chunk(&sha),
            Err(PampaxError::ChunkAuthFailed { .. })
        ));
    }

    #[test]
    fn test_mode_toggle_removes_other_file() {
        let dir = tempdir().unwrap();
        let chunks = dir.path().join("chunks");
        let content = b"mode toggle";
        let sha = sha1_hex(content);

        let plain = ChunkStore::open(chunks.clone(), Some(test_key()), false).unwrap();
        plain.write_chunk(&sha, content).unwrap();
        assert!(chunks.join(format!("{sha}.gz")).exists());

        let encrypted = ChunkStore::open(chunks.clone(), Some(test_key()), true).unwrap();
        encrypted.write_chunk(&sha, content).unwrap();
        assert!(chunks.join(format!("{sha}.gz.enc")).exists());
        assert!(!chunks.join(format!("{sha}.gz")).exists());

        plain.write_chunk(&sha, content).unwrap();
        assert!(chunks.join(format!("{sha}.gz")).exists());
        assert!(!chunks.join(format!("{sha}.gz.enc")).exists());
    }

    #[test]
    fn test_remove_chunk_removes_both() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(dir.path().join("chunks"), None, false).unwrap();

        let content = b"to be removed";
        let sha = sha1_hex(content);
        store.write_chunk(&sha, content).unwrap();
        assert!(store.contains(&sha));

        store.remove_chunk(&sha).unwrap();
        assert!(!store.contains(&sha));
        // Idempotent.
        store.remove_chunk(&sha).unwrap();
    }

    #[test]
    fn test_list_shas() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(dir.path().join("chunks"), Some(test_key()), false).unwrap();

        let a = sha1_hex(b"alpha");
        let b = sha1_hex(b"beta");
        store.write_chunk(&a, b"alpha").unwrap();
        store.write_chunk(&b, b"beta").unwrap();

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(store.list_shas().unwrap(), expected);
    }

    #[test]
    fn test_encrypt_without_key_rejected_at_open() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            ChunkStore::open(dir.path().join("chunks"), None, true),
            Err(PampaxError::Config(_))
        ));
    }
}
