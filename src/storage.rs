//! # Storage Module
//!
//! Persistent key/value slots shared by the response cache and by the
//! user library (favourites, local playlists).
//!
//! The contract mirrors a browser `localStorage`: string keys, string
//! values, synchronous calls, and writes that may fail once a byte quota
//! is reached. Two backends are provided:
//!
//! - [`JsonFileStore`]: one JSON file per slot under `<data_dir>/store`
//! - [`MemoryStore`]: in-process map, used by tests and as a fallback
//!
//! Quota accounting counts `key.len() + value.len()` per slot, the same
//! way for both backends.

use anyhow::Context;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::StorageError;

/// Almacenamiento clave/valor síncrono
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing an absent key is not an error.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove_item(key)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        (**self).keys()
    }
}

/// Longest percent-encoded key used verbatim as a file stem. Most
/// filesystems cap a name at 255 bytes.
const MAX_PLAIN_STEM: usize = 200;

/// Encoded bytes kept in front of the digest for hashed stems.
const HASHED_STEM_PREFIX: usize = 64;

/// Marks a hashed stem. `#` is always percent-encoded in plain stems.
const HASHED_MARKER: char = '#';

/// File stem for `key`: the percent-encoded key, or for long keys a
/// readable prefix plus a SHA-256 digest.
fn slot_stem(key: &str) -> String {
    let encoded = urlencoding::encode(key);
    if encoded.len() <= MAX_PLAIN_STEM {
        return encoded.into_owned();
    }

    // Percent-encoding is ASCII, so any byte offset is a char boundary.
    let digest = Sha256::digest(key.as_bytes());
    format!(
        "{}{}-{}",
        HASHED_MARKER,
        &encoded[..HASHED_STEM_PREFIX],
        hex::encode(&digest[..16])
    )
}

fn slot_cost(key: &str, value_len: usize) -> usize {
    key.len() + value_len
}

/// Byte budget shared by both backends.
#[derive(Debug)]
struct Quota {
    limit: Option<usize>,
    used: Mutex<usize>,
}

impl Quota {
    fn new(limit: Option<usize>, used: usize) -> Self {
        Self {
            limit,
            used: Mutex::new(used),
        }
    }

    /// Reserves room for replacing `old_len` bytes of `key` by `new_len`,
    /// runs `write`, and commits the new usage only if the write succeeded.
    fn reserve<F>(&self, key: &str, old_len: Option<usize>, new_len: usize, write: F) -> Result<(), StorageError>
    where
        F: FnOnce() -> Result<(), StorageError>,
    {
        let mut used = self.used.lock();
        let freed = old_len.map(|len| slot_cost(key, len)).unwrap_or(0);
        let needed = slot_cost(key, new_len);
        let after = used.saturating_sub(freed) + needed;

        if let Some(limit) = self.limit {
            if after > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available: limit.saturating_sub(used.saturating_sub(freed)),
                });
            }
        }

        write()?;
        *used = after;
        Ok(())
    }

    fn release(&self, key: &str, len: usize) {
        let mut used = self.used.lock();
        *used = used.saturating_sub(slot_cost(key, len));
    }

    fn used(&self) -> usize {
        *self.used.lock()
    }
}

/// In-memory store backed by a [`DashMap`].
#[derive(Debug)]
pub struct MemoryStore {
    slots: DashMap<String, String>,
    quota: Quota,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            quota: Quota::new(None, 0),
        }
    }

    /// Store that rejects writes once `limit` bytes are in use.
    pub fn with_quota(limit: usize) -> Self {
        Self {
            slots: DashMap::new(),
            quota: Quota::new(Some(limit), 0),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.quota.used()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.slots.get(key).map(|value| value.clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let old_len = self.slots.get(key).map(|v| v.len());
        self.quota.reserve(key, old_len, value.len(), || {
            self.slots.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        if let Some((_, old)) = self.slots.remove(key) {
            self.quota.release(key, old.len());
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.slots.iter().map(|entry| entry.key().clone()).collect())
    }
}

/// Manager de almacenamiento basado en archivos JSON
///
/// Every slot lives in its own file named after the percent-encoded key,
/// so a corrupted slot never affects its neighbours. Keys too long for a
/// file name get a hashed name plus a `.key` file holding the real key.
#[derive(Debug)]
pub struct JsonFileStore {
    store_dir: PathBuf,
    quota: Quota,
}

impl JsonFileStore {
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_inner(data_dir.as_ref(), None)
    }

    pub fn open_with_quota(data_dir: impl AsRef<Path>, limit: usize) -> Result<Self, StorageError> {
        Self::open_inner(data_dir.as_ref(), Some(limit))
    }

    fn open_inner(data_dir: &Path, limit: Option<usize>) -> Result<Self, StorageError> {
        let store_dir = data_dir.join("store");
        fs::create_dir_all(&store_dir).map_err(|source| StorageError::Io {
            key: store_dir.display().to_string(),
            source,
        })?;

        let mut store = Self {
            store_dir,
            quota: Quota::new(limit, 0),
        };
        let used = store.scan_usage()?;
        store.quota = Quota::new(limit, used);

        info!("📁 Storage inicializado en: {} ({} bytes en uso)", store.store_dir.display(), used);
        Ok(store)
    }

    fn scan_usage(&self) -> Result<usize, StorageError> {
        let mut used = 0;
        for key in self.keys()? {
            let path = self.slot_path(&key)?;
            match fs::metadata(&path) {
                Ok(meta) => used += slot_cost(&key, meta.len() as usize),
                Err(e) => warn!("No se pudo leer metadata de {}: {}", path.display(), e),
            }
        }
        Ok(used)
    }

    fn slot_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.store_dir.join(format!("{}.json", slot_stem(key))))
    }

    /// Companion file that keeps the original key of a hashed slot.
    fn key_path(slot: &Path) -> Option<PathBuf> {
        let stem = slot.file_stem()?.to_str()?;
        stem.starts_with(HASHED_MARKER).then(|| slot.with_extension("key"))
    }

    fn io_error(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
        move |source| StorageError::Io {
            key: key.to_string(),
            source,
        }
    }

    fn slot_len(path: &Path) -> Option<usize> {
        fs::metadata(path).ok().map(|meta| meta.len() as usize)
    }

    /// Obtiene estadísticas de almacenamiento
    pub fn stats(&self) -> Result<StorageStats, StorageError> {
        Ok(StorageStats {
            slots: self.keys()?.len(),
            total_size_bytes: self.quota.used(),
            quota_bytes: self.quota.limit,
            store_dir: self.store_dir.clone(),
        })
    }
}

impl KeyValueStore for JsonFileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.slot_path(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.slot_path(key)?;
        let old_len = Self::slot_len(&path);
        self.quota.reserve(key, old_len, value.len(), || {
            if let Some(key_path) = Self::key_path(&path) {
                fs::write(&key_path, key).map_err(Self::io_error(key))?;
            }
            fs::write(&path, value).map_err(Self::io_error(key))
        })?;
        debug!("💾 Slot guardado: {}", key);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let path = self.slot_path(key)?;
        let old_len = Self::slot_len(&path);
        match fs::remove_file(&path) {
            Ok(()) => {
                if let Some(len) = old_len {
                    self.quota.release(key, len);
                }
                if let Some(key_path) = Self::key_path(&path) {
                    if let Err(e) = fs::remove_file(&key_path) {
                        if e.kind() != ErrorKind::NotFound {
                            warn!("No se pudo borrar {}: {}", key_path.display(), e);
                        }
                    }
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let entries = fs::read_dir(&self.store_dir).map_err(|source| StorageError::Io {
            key: self.store_dir.display().to_string(),
            source,
        })?;

        let mut keys = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                if let Some(key_path) = Self::key_path(&path) {
                    match fs::read_to_string(&key_path) {
                        Ok(key) => keys.push(key),
                        Err(e) => warn!("Clave perdida para {}: {}", path.display(), e),
                    }
                } else if let Some(stem) = path.file_stem().and_then(|n| n.to_str()) {
                    match urlencoding::decode(stem) {
                        Ok(key) => keys.push(key.into_owned()),
                        Err(e) => warn!("Nombre de slot inválido {}: {}", stem, e),
                    }
                }
            }
        }
        Ok(keys)
    }
}

/// Estadísticas de almacenamiento
#[derive(Debug)]
pub struct StorageStats {
    pub slots: usize,
    pub total_size_bytes: usize,
    pub quota_bytes: Option<usize>,
    pub store_dir: PathBuf,
}

impl std::fmt::Display for StorageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "📊 Storage Stats:\n\
             📁 Store Directory: {}\n\
             📝 Slots: {}\n\
             📦 Total Size: {} bytes ({:.2} KB)",
            self.store_dir.display(),
            self.slots,
            self.total_size_bytes,
            self.total_size_bytes as f64 / 1024.0
        )?;
        if let Some(quota) = self.quota_bytes {
            write!(f, "\n🚧 Quota: {} bytes", quota)?;
        }
        Ok(())
    }
}

/// Reads a JSON value from `key`, falling back to `default` when the slot
/// is missing or unreadable.
pub fn load_json<T, S>(store: &S, key: &str, default: T) -> T
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    match store.get_item(key) {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Valor corrupto en '{}': {}", key, e);
                default
            }
        },
        Ok(None) => default,
        Err(e) => {
            warn!("Error leyendo '{}': {}", key, e);
            default
        }
    }
}

/// Persists `value` as JSON under `key`.
pub fn save_json<T, S>(store: &S, key: &str, value: &T) -> anyhow::Result<()>
where
    T: Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    let raw = serde_json::to_string(value).with_context(|| format!("No se pudo serializar '{}'", key))?;
    store
        .set_item(key, &raw)
        .with_context(|| format!("No se pudo guardar '{}'", key))
}
