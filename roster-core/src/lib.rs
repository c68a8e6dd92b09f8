//! Roster core library: directory data model, configuration, and the
//! remote directory boundary.
//!
//! - [`types`]: newtypes, groups, members, users, and the [`Snapshot`]
//! - [`config`]: `config.yaml` load / save / validate
//! - [`directory`]: [`DirectoryClient`] trait and [`StaticDirectory`]
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod directory;
pub mod error;
pub mod types;

pub use config::{CacheBackend, PartialFailurePolicy, RetryConfig, RosterConfig};
pub use directory::{DirectoryClient, DirectoryDump, DirectoryError, StaticDirectory};
pub use error::ConfigError;
pub use types::{
    EntityKind, Etag, Group, GroupId, Member, MemberEntry, Snapshot, User, UserId, UserName,
};
