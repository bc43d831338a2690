//! Secure local storage for the license cache and device id.
//!
//! Values are opaque strings addressed by key. [`EncryptedFileStore`] keeps
//! one file per key, sealed with ChaCha20-Poly1305 under a key derived from
//! device-bound material, so a copied or edited file fails authentication
//! instead of granting a license.

use crate::error::{LicenseError, LicenseResult};
use crate::record::CachedLicense;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Storage keys.
pub mod keys {
    /// Serialized [`CachedLicense`](crate::CachedLicense).
    pub const LICENSE_CACHE: &str = "license_cache";
    /// Persisted device identifier.
    pub const DEVICE_ID: &str = "device_id";
}

/// Size of the nonce in bytes (96 bits for ChaCha20-Poly1305).
const NONCE_SIZE: usize = 12;

/// Size of the authentication tag in bytes.
const TAG_SIZE: usize = 16;

/// Domain separator for store key derivation.
const KEY_CONTEXT: &[u8] = b"ledgerly-license-store/v1";

/// Key/value storage for small secrets.
pub trait SecureStore: Send + Sync {
    /// Reads a value. `Ok(None)` when the key was never written.
    fn get(&self, key: &str) -> LicenseResult<Option<String>>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> LicenseResult<()>;

    /// Deletes a value. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> LicenseResult<()>;
}

/// In-memory store. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> LicenseError {
    LicenseError::Storage("memory store lock poisoned".to_string())
}

impl SecureStore for MemoryStore {
    fn get(&self, key: &str) -> LicenseResult<Option<String>> {
        Ok(self.values.read().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> LicenseResult<()> {
        self.values
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> LicenseResult<()> {
        self.values.write().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

/// A 256-bit store key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct StoreKey {
    bytes: [u8; 32],
}

impl StoreKey {
    fn derive(material: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(KEY_CONTEXT);
        hasher.update(material.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Self { bytes }
    }
}

/// File-backed encrypted store, one `<key>.enc` file per key.
pub struct EncryptedFileStore {
    dir: PathBuf,
    key: StoreKey,
}

impl EncryptedFileStore {
    /// Opens (creating if needed) a store in `dir`.
    ///
    /// `key_material` binds the store to something device-specific, usually
    /// the device fingerprint. Opening with different material makes existing
    /// values unreadable ([`LicenseError::Tampered`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>, key_material: &str) -> LicenseResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            key: StoreKey::derive(key_material),
        })
    }

    /// The directory holding the store files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> LicenseResult<PathBuf> {
        if key.is_empty()
            || !key
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        {
            return Err(LicenseError::Storage(format!("invalid store key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.enc")))
    }

    fn seal(&self, key: &str, plaintext: &[u8]) -> LicenseResult<String> {
        let cipher = ChaCha20Poly1305::new((&self.key.bytes).into());

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        // The key name is bound as associated data so files cannot be swapped.
        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: key.as_bytes(),
                },
            )
            .map_err(|e| LicenseError::Storage(format!("encryption failed: {e}")))?;

        let mut bytes = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        bytes.extend_from_slice(&nonce_bytes);
        bytes.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(&bytes))
    }

    fn open_sealed(&self, key: &str, encoded: &str) -> LicenseResult<String> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|_| LicenseError::Tampered)?;
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(LicenseError::Tampered);
        }

        let cipher = ChaCha20Poly1305::new((&self.key.bytes).into());
        let nonce = Nonce::from_slice(&bytes[..NONCE_SIZE]);
        let plaintext = cipher
            .decrypt(
                nonce,
                Payload {
                    msg: &bytes[NONCE_SIZE..],
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| LicenseError::Tampered)?;

        String::from_utf8(plaintext).map_err(|_| LicenseError::Tampered)
    }
}

impl SecureStore for EncryptedFileStore {
    fn get(&self, key: &str) -> LicenseResult<Option<String>> {
        let path = self.path_for(key)?;
        let encoded = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.open_sealed(key, &encoded).map(Some)
    }

    fn set(&self, key: &str, value: &str) -> LicenseResult<()> {
        let path = self.path_for(key)?;
        let sealed = self.seal(key, value.as_bytes())?;

        // Write-then-rename so a crash never leaves a half-written file.
        let tmp = path.with_extension("enc.tmp");
        std::fs::write(&tmp, sealed)?;
        std::fs::rename(&tmp, &path)?;
        debug!("Wrote secure store entry {key}");
        Ok(())
    }

    fn remove(&self, key: &str) -> LicenseResult<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for EncryptedFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFileStore")
            .field("dir", &self.dir)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Typed access to the cached license record.
#[derive(Clone)]
pub struct LicenseCache {
    store: Arc<dyn SecureStore>,
}

impl LicenseCache {
    /// Wraps a secure store.
    #[must_use]
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SecureStore> {
        &self.store
    }

    /// Loads the cached license, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if storage is unreadable or the entry is corrupt.
    pub fn load(&self) -> LicenseResult<Option<CachedLicense>> {
        match self.store.get(keys::LICENSE_CACHE)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Persists `cached`, replacing the previous entry.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, cached: &CachedLicense) -> LicenseResult<()> {
        let json = serde_json::to_string(cached)?;
        self.store.set(keys::LICENSE_CACHE, &json)
    }

    /// Deletes the cached license.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear(&self) -> LicenseResult<()> {
        self.store.remove(keys::LICENSE_CACHE)
    }
}

impl std::fmt::Debug for LicenseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseCache").finish_non_exhaustive()
    }
}
