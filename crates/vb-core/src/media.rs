//! Downloaded media and the revocable local references handed to the
//! presentation layer.
//!
//! A [`BlobStore`] plays the role of a browser's object-URL table: every
//! inserted [`Blob`] gets a `blob:` URL that stays resolvable until it is
//! explicitly revoked. Nothing is released automatically.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

const SCHEME: &str = "blob:vb/";

/// Immutable binary payload, cheap to clone.
#[derive(Clone, PartialEq, Eq)]
pub struct Blob {
    bytes: Arc<[u8]>,
    content_type: String,
}

impl Blob {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
            content_type: content_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("len", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn key(&self) -> Option<Uuid> {
        self.0.strip_prefix(SCHEME).and_then(|id| Uuid::parse_str(id).ok())
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of one successful generation: the payload plus its local URL.
#[derive(Debug, Clone)]
pub struct GeneratedVideo {
    pub blob: Blob,
    pub url: ObjectUrl,
}

impl GeneratedVideo {
    pub fn is_empty(&self) -> bool {
        self.blob.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlobStore {
    entries: Arc<RwLock<HashMap<Uuid, Blob>>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `blob` and returns a URL that resolves to it until revoked.
    pub fn insert(&self, blob: Blob) -> ObjectUrl {
        let id = Uuid::new_v4();
        self.write().insert(id, blob);
        ObjectUrl(format!("{SCHEME}{id}"))
    }

    pub fn resolve(&self, url: &ObjectUrl) -> Option<Blob> {
        let key = url.key()?;
        self.read().get(&key).cloned()
    }

    /// Returns `false` if the URL was unknown or already revoked.
    pub fn revoke(&self, url: &ObjectUrl) -> bool {
        match url.key() {
            Some(key) => self.write().remove(&key).is_some(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Poisoning is ignored: every map update is a single call.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, Blob>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, Blob>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}
