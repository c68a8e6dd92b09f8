//! Boundary with the remote directory.
//!
//! [`DirectoryClient`] is the only way the sync reaches the remote system.
//! Every failure comes back as a classified [`DirectoryError`] so retry and
//! fallback decisions never have to inspect transport details.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{io_err, ConfigError};
use crate::types::{Group, GroupId, Member, User, UserId};

/// Classified failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// Rate limit hit; the same call may succeed after a wait.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Transient backend failure; the same call may succeed after a wait.
    #[error("backend error: {0}")]
    Backend(String),

    /// The requested entity does not exist (or is not visible).
    #[error("not found: {0}")]
    NotFound(String),

    /// Anything else. Not retried.
    #[error("directory error: {0}")]
    Other(String),
}

impl DirectoryError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DirectoryError::QuotaExceeded(_) | DirectoryError::Backend(_)
        )
    }
}

/// Remote operations consumed by the sync.
///
/// Implementations must be safe to call from many concurrent fetches.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Resolve the target domain, optionally from the identity the calling
    /// context acts as.
    async fn resolve_domain(&self, identity: Option<&str>) -> Result<String, DirectoryError>;

    async fn list_groups(&self, domain: &str) -> Result<Vec<Group>, DirectoryError>;

    async fn list_members(&self, group: &GroupId) -> Result<Vec<Member>, DirectoryError>;

    async fn get_user(&self, user: &UserId) -> Result<User, DirectoryError>;
}

// ---------------------------------------------------------------------------
// StaticDirectory
// ---------------------------------------------------------------------------

/// JSON dump of a whole directory.
///
/// ```json
/// {
///   "domain": "example.com",
///   "groups": [{ "id": "g1", "etag": "e1", "email": "eng@example.com" }],
///   "members": { "g1": [{ "id": "u1", "etag": "m1", "role": "OWNER" }] },
///   "users": [{ "id": "u1", "etag": "v1", "primaryEmail": "ada@example.com" }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryDump {
    pub domain: String,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub members: HashMap<GroupId, Vec<Member>>,
    #[serde(default)]
    pub users: Vec<User>,
}

impl DirectoryDump {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Dump {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// In-process directory serving a [`DirectoryDump`].
///
/// Unknown groups and users answer [`DirectoryError::NotFound`]. Counts every
/// call so offline runs can report remote traffic the same way live runs do.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    domain: String,
    groups: Vec<Group>,
    members: HashMap<GroupId, Vec<Member>>,
    users: HashMap<UserId, User>,
    calls: AtomicUsize,
}

impl StaticDirectory {
    pub fn new(dump: DirectoryDump) -> Self {
        let users = dump
            .users
            .into_iter()
            .map(|user| (user.id.clone(), user))
            .collect();
        Self {
            domain: dump.domain,
            groups: dump.groups,
            members: dump.members,
            users,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self::new(DirectoryDump::load(path)?))
    }

    /// Number of calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DirectoryClient for StaticDirectory {
    async fn resolve_domain(&self, _identity: Option<&str>) -> Result<String, DirectoryError> {
        self.record_call();
        Ok(self.domain.clone())
    }

    async fn list_groups(&self, domain: &str) -> Result<Vec<Group>, DirectoryError> {
        self.record_call();
        if domain != self.domain {
            return Err(DirectoryError::NotFound(format!("domain {domain}")));
        }
        Ok(self.groups.clone())
    }

    async fn list_members(&self, group: &GroupId) -> Result<Vec<Member>, DirectoryError> {
        self.record_call();
        if let Some(members) = self.members.get(group) {
            return Ok(members.clone());
        }
        if self.groups.iter().any(|g| &g.id == group) {
            return Ok(Vec::new());
        }
        Err(DirectoryError::NotFound(format!("group {group}")))
    }

    async fn get_user(&self, user: &UserId) -> Result<User, DirectoryError> {
        self.record_call();
        self.users
            .get(user)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(format!("user {user}")))
    }
}
