//! Response cache: version-addressed store for remote responses.
//!
//! Entries never expire. A [`CacheKey`] embeds the entity's etag, so an
//! upstream change produces a different key and the old entry simply stops
//! being asked for.
//!
//! [`DiskCache`] layout:
//!
//! ```text
//! <dir>/
//!   members/<sha256(key)>.json
//!   user/<sha256(key)>.json
//! ```
//!
//! Each file holds `{ "key": "<kind>:<id>:<etag>", "value": … }` and is written
//! with the same `.tmp` + rename pattern as the output writer.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use roster_core::types::{EntityKind, Etag, Group, Member};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.into(),
        source,
    }
}

// ---------------------------------------------------------------------------
// CacheKey
// ---------------------------------------------------------------------------

/// Entity kind + id + etag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: EntityKind,
    pub id: String,
    pub etag: Etag,
}

impl CacheKey {
    /// Key for the member listing of `group`.
    ///
    /// `None` when the group carries no etag: without a version there is no
    /// way to tell a fresh entry from a stale one.
    pub fn members(group: &Group) -> Option<Self> {
        Self::versioned(EntityKind::Members, &group.id.0, &group.etag)
    }

    /// Key for the user profile behind `member`, versioned by the member
    /// record's etag.
    ///
    /// A profile-only change (rename, new photo) leaves the member etag as it
    /// is and is not detected; `cache.skip_users` bypasses this key.
    pub fn user(member: &Member) -> Option<Self> {
        Self::versioned(EntityKind::User, &member.id.0, &member.etag)
    }

    fn versioned(kind: EntityKind, id: &str, etag: &Etag) -> Option<Self> {
        if etag.0.is_empty() {
            return None;
        }
        Some(Self {
            kind,
            id: id.to_string(),
            etag: etag.clone(),
        })
    }

    fn digest(&self) -> String {
        let mut h = Sha256::new();
        h.update(self.to_string().as_bytes());
        hex::encode(h.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.id, self.etag)
    }
}

// ---------------------------------------------------------------------------
// ResponseCache
// ---------------------------------------------------------------------------

/// Get/set capability shared by every fetch of a run.
///
/// Implementations must tolerate concurrent calls. `set` overwrites; writing
/// the same key twice with the same value is a no-op in effect.
///
/// Calls are synchronous and made from inside the fetch futures. [`DiskCache`]
/// does blocking file I/O here, which is fine while fetches share one task;
/// moving the fan-out onto spawned tasks needs a `spawn_blocking` wrapper.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<serde_json::Value>, CacheError>;

    fn set(&self, key: &CacheKey, value: serde_json::Value) -> Result<(), CacheError>;
}

/// Typed read. An entry that no longer decodes into `T` counts as a miss.
pub fn get_json<T: DeserializeOwned>(
    cache: &dyn ResponseCache,
    key: &CacheKey,
) -> Result<Option<T>, CacheError> {
    let Some(value) = cache.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_value(value) {
        Ok(decoded) => Ok(Some(decoded)),
        Err(err) => {
            tracing::debug!(key = %key, error = %err, "discarding undecodable cache entry");
            Ok(None)
        }
    }
}

/// Typed write.
pub fn set_json<T: Serialize>(
    cache: &dyn ResponseCache,
    key: &CacheKey,
    value: &T,
) -> Result<(), CacheError> {
    cache.set(key, serde_json::to_value(value)?)
}

// ---------------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------------

/// Process-local cache. Lives as long as the value does.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, serde_json::Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<serde_json::Value>, CacheError> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &CacheKey, value: serde_json::Value) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key.clone(), value);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DiskCache
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    key: String,
    value: serde_json::Value,
}

/// One JSON file per entry under a root directory. Survives across runs.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<kind>/<sha256(key)>.json`: pure, no I/O.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(key.kind.to_string())
            .join(format!("{}.json", key.digest()))
    }
}

impl ResponseCache for DiskCache {
    fn get(&self, key: &CacheKey) -> Result<Option<serde_json::Value>, CacheError> {
        let path = self.entry_path(key);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_err(&path, err)),
        };
        let file: CacheFile = serde_json::from_str(&contents)?;
        if file.key != key.to_string() {
            return Ok(None);
        }
        Ok(Some(file.value))
    }

    fn set(&self, key: &CacheKey, value: serde_json::Value) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        let Some(dir) = path.parent() else {
            return Err(io_err(path, std::io::Error::other("invalid cache path")));
        };
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

        let json = serde_json::to_string(&CacheFile {
            key: key.to_string(),
            value,
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&path, e));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::types::{GroupId, UserId};
    use serde_json::json;
    use tempfile::TempDir;

    fn group(etag: &str) -> Group {
        Group {
            id: GroupId::from("g1"),
            etag: Etag::from(etag),
            email: String::new(),
            name: String::new(),
            description: String::new(),
            members: vec![],
        }
    }

    fn member(etag: &str) -> Member {
        Member {
            id: UserId::from("u1"),
            etag: Etag::from(etag),
            email: None,
            role: "MEMBER".to_string(),
            member_type: None,
            status: None,
        }
    }

    #[test]
    fn key_embeds_kind_id_and_etag() {
        let key = CacheKey::members(&group("\"v1\"")).unwrap();
        assert_eq!(key.to_string(), "members:g1:\"v1\"");
        let key = CacheKey::user(&member("m7")).unwrap();
        assert_eq!(key.to_string(), "user:u1:m7");
    }

    #[test]
    fn unversioned_entities_are_not_cacheable() {
        assert!(CacheKey::members(&group("")).is_none());
        assert!(CacheKey::user(&member("")).is_none());
    }

    #[test]
    fn memory_cache_get_set() {
        let cache = MemoryCache::new();
        let key = CacheKey::members(&group("v1")).unwrap();
        assert!(cache.get(&key).unwrap().is_none());
        cache.set(&key, json!([1, 2])).unwrap();
        assert_eq!(cache.get(&key).unwrap(), Some(json!([1, 2])));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn new_etag_misses_old_entry() {
        let tmp = TempDir::new().unwrap();
        for cache in [
            Box::new(MemoryCache::new()) as Box<dyn ResponseCache>,
            Box::new(DiskCache::new(tmp.path())) as Box<dyn ResponseCache>,
        ] {
            let old = CacheKey::members(&group("v1")).unwrap();
            let new = CacheKey::members(&group("v2")).unwrap();
            cache.set(&old, json!(["stale"])).unwrap();
            assert!(cache.get(&new).unwrap().is_none(), "stale entry served");
            assert_eq!(cache.get(&old).unwrap(), Some(json!(["stale"])));
        }
    }

    #[test]
    fn disk_cache_persists_across_instances() {
        let tmp = TempDir::new().unwrap();
        let key = CacheKey::user(&member("m1")).unwrap();
        DiskCache::new(tmp.path())
            .set(&key, json!({ "id": "u1" }))
            .unwrap();

        let reopened = DiskCache::new(tmp.path());
        assert_eq!(reopened.get(&key).unwrap(), Some(json!({ "id": "u1" })));
        let path = reopened.entry_path(&key);
        assert!(path.starts_with(tmp.path().join("user")));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn disk_cache_overwrite_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let cache = DiskCache::new(tmp.path());
        let key = CacheKey::members(&group("v1")).unwrap();
        cache.set(&key, json!(["a"])).unwrap();
        cache.set(&key, json!(["a"])).unwrap();
        assert_eq!(cache.get(&key).unwrap(), Some(json!(["a"])));
    }

    #[test]
    fn corrupt_disk_entry_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let cache = DiskCache::new(tmp.path());
        let key = CacheKey::members(&group("v1")).unwrap();
        let path = cache.entry_path(&key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(cache.get(&key), Err(CacheError::Json(_))));
    }

    #[test]
    fn typed_read_treats_shape_mismatch_as_miss() {
        let cache = MemoryCache::new();
        let key = CacheKey::members(&group("v1")).unwrap();
        cache.set(&key, json!({ "unexpected": true })).unwrap();
        let members: Option<Vec<Member>> = get_json(&cache, &key).unwrap();
        assert!(members.is_none());
    }
}
