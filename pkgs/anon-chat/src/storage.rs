//! Per-user blob storage for contacts and unread counts
//!
//! Storage is keyed by `(namespace, user_id)`. Values are JSON blobs; readers go
//! through [`load_or_default`], which treats missing or corrupt data as the
//! default value instead of failing.

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StorageError;

/// Logical partition of per-user state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Contacts,
    Unread,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Contacts, Namespace::Unread];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Contacts => "contacts",
            Namespace::Unread => "unread",
        }
    }
}

/// Storage collaborator injected into the engine
pub trait Storage: Send + Sync {
    fn load(&self, namespace: Namespace, user_id: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn store(&self, namespace: Namespace, user_id: &str, blob: &[u8]) -> Result<(), StorageError>;

    fn remove(&self, namespace: Namespace, user_id: &str) -> Result<(), StorageError>;
}

/// Read and deserialize, falling back to `T::default()` on any failure
pub fn load_or_default<T>(storage: &dyn Storage, namespace: Namespace, user_id: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let blob = match storage.load(namespace, user_id) {
        Ok(Some(blob)) => blob,
        Ok(None) => return T::default(),
        Err(e) => {
            warn!(namespace = namespace.as_str(), user = %user_id, "Failed to read stored state: {}", e);
            return T::default();
        }
    };

    match serde_json::from_slice(&blob) {
        Ok(value) => value,
        Err(e) => {
            warn!(namespace = namespace.as_str(), user = %user_id, "Discarding corrupt stored state: {}", e);
            T::default()
        }
    }
}

/// Serialize and write; failures are logged, never propagated
pub fn save<T: Serialize>(storage: &dyn Storage, namespace: Namespace, user_id: &str, value: &T) {
    let blob = match serde_json::to_vec(value) {
        Ok(blob) => blob,
        Err(e) => {
            warn!(namespace = namespace.as_str(), "Failed to serialize state: {}", e);
            return;
        }
    };

    if let Err(e) = storage.store(namespace, user_id, &blob) {
        warn!(namespace = namespace.as_str(), user = %user_id, "Failed to persist state: {}", e);
    } else {
        debug!(namespace = namespace.as_str(), user = %user_id, bytes = blob.len(), "Persisted state");
    }
}

/// Remove every namespace stored for `user_id`
pub fn clear_user(storage: &dyn Storage, user_id: &str) {
    for namespace in Namespace::ALL {
        if let Err(e) = storage.remove(namespace, user_id) {
            warn!(namespace = namespace.as_str(), user = %user_id, "Failed to clear state: {}", e);
        }
    }
}

/// In-memory storage; share it behind an `Arc`
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<(Namespace, String), Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write raw bytes, bypassing serialization
    pub fn insert_raw(&self, namespace: Namespace, user_id: &str, blob: impl Into<Vec<u8>>) {
        self.entries
            .lock()
            .insert((namespace, user_id.to_string()), blob.into());
    }

    pub fn contains(&self, namespace: Namespace, user_id: &str) -> bool {
        self.entries
            .lock()
            .contains_key(&(namespace, user_id.to_string()))
    }
}

impl Storage for MemoryStorage {
    fn load(&self, namespace: Namespace, user_id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .entries
            .lock()
            .get(&(namespace, user_id.to_string()))
            .cloned())
    }

    fn store(&self, namespace: Namespace, user_id: &str, blob: &[u8]) -> Result<(), StorageError> {
        self.entries
            .lock()
            .insert((namespace, user_id.to_string()), blob.to_vec());
        Ok(())
    }

    fn remove(&self, namespace: Namespace, user_id: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(&(namespace, user_id.to_string()));
        Ok(())
    }
}

/// One JSON file per `(namespace, user)` under a root directory
///
/// Layout: `<root>/<namespace>/<urlencoded user id>.json`
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, namespace: Namespace, user_id: &str) -> PathBuf {
        let file: String = url::form_urlencoded::byte_serialize(user_id.as_bytes()).collect();
        self.root
            .join(namespace.as_str())
            .join(format!("{}.json", file))
    }
}

impl Storage for FileStorage {
    fn load(&self, namespace: Namespace, user_id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(namespace, user_id);
        match std::fs::read(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn store(&self, namespace: Namespace, user_id: &str, blob: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(namespace, user_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        // Temp file + rename keeps the blob whole
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, blob).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StorageError::Io { path, source })
    }

    fn remove(&self, namespace: Namespace, user_id: &str) -> Result<(), StorageError> {
        let path = self.path_for(namespace, user_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_names() {
        assert_eq!(Namespace::Contacts.as_str(), "contacts");
        assert_eq!(Namespace::Unread.as_str(), "unread");
    }

    #[test]
    fn test_corrupt_blob_falls_back_to_default() {
        let storage = MemoryStorage::new();
        storage.insert_raw(Namespace::Contacts, "alice", "{not json");

        let contacts: Vec<String> = load_or_default(&storage, Namespace::Contacts, "alice");
        assert!(contacts.is_empty());
    }

    #[test]
    fn test_file_names_are_encoded() {
        let storage = FileStorage::new("/tmp/anon");
        let path = storage.path_for(Namespace::Unread, "../evil user");

        assert_eq!(
            path,
            PathBuf::from("/tmp/anon/unread/..%2Fevil+user.json")
        );
    }
}
