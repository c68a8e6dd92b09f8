//! Directory data model: groups, members, resolved users, and the snapshot.
//!
//! Field names follow the Admin Directory JSON shape (camelCase on the wire) so
//! remote responses deserialize straight into these types and cached values can
//! be stored as the same JSON.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Remote identifier of a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for GroupId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Remote identifier of a user. Members reference users by this id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque version marker of a remote entity. Any upstream change yields a new
/// etag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Etag(pub String);

impl fmt::Display for Etag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Etag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Etag {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The kind of remote entity a request or cache entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Domain,
    Groups,
    Members,
    User,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Domain => write!(f, "domain"),
            EntityKind::Groups => write!(f, "groups"),
            EntityKind::Members => write!(f, "members"),
            EntityKind::User => write!(f, "user"),
        }
    }
}

// ---------------------------------------------------------------------------
// Remote records
// ---------------------------------------------------------------------------

/// A group as returned by the group listing.
///
/// `members` is empty on the wire and filled in during a sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    #[serde(default)]
    pub etag: Etag,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub members: Vec<MemberEntry>,
}

impl Group {
    /// Whether this group must be left out of the snapshot.
    ///
    /// A group is excluded when its description contains `hidden_marker` or
    /// when its id or email appears in `ignore`.
    pub fn is_excluded<'a, I>(&self, hidden_marker: &str, ignore: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        if !hidden_marker.is_empty() && self.description.contains(hidden_marker) {
            return true;
        }
        ignore
            .into_iter()
            .any(|entry| *entry == self.id.0 || (!self.email.is_empty() && *entry == self.email))
    }
}

/// A lightweight membership reference as returned by the member listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: UserId,
    #[serde(default)]
    pub etag: Etag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub member_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Structured display name of a user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserName {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
}

/// A resolved user profile.
///
/// Profile fields the snapshot does not interpret are kept verbatim in
/// `extra` so the page template can still reach them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub etag: Etag,
    pub primary_email: String,
    #[serde(default)]
    pub name: UserName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_photo_url: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One entry of a group's final member list.
///
/// `Unresolved` carries the raw member record when the user lookup did not
/// produce a profile; the entry is never dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum MemberEntry {
    #[serde(rename = "user")]
    Resolved(User),
    #[serde(rename = "member")]
    Unresolved(Member),
}

impl MemberEntry {
    /// Sort key of the entry. Members without an email sort first.
    pub fn email(&self) -> &str {
        match self {
            MemberEntry::Resolved(user) => &user.primary_email,
            MemberEntry::Unresolved(member) => member.email.as_deref().unwrap_or(""),
        }
    }

    pub fn id(&self) -> &UserId {
        match self {
            MemberEntry::Resolved(user) => &user.id,
            MemberEntry::Unresolved(member) => &member.id,
        }
    }

    /// Best display name available: the full name of a resolved user, else
    /// the email, else the id.
    pub fn display_name(&self) -> &str {
        match self {
            MemberEntry::Resolved(user) if !user.name.full_name.is_empty() => {
                &user.name.full_name
            }
            _ if !self.email().is_empty() => self.email(),
            _ => &self.id().0,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, MemberEntry::Resolved(_))
    }
}

/// Point-in-time view of the domain: post-filter groups in listing order,
/// each with its sorted member list.
///
/// Carries no timestamps so that unchanged remote state serializes to the
/// same bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub domain: String,
    pub groups: Vec<Group>,
}

impl Snapshot {
    pub fn member_count(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
