//! Page context: serializable rendering payload built from a [`Snapshot`].
//!
//! Member entries are flattened to one shape regardless of whether the user
//! profile resolved, so templates never branch on the entry source.

use serde::{Deserialize, Serialize};

use roster_core::types::{Group, MemberEntry, Snapshot};

use crate::error::RenderError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContext {
    pub domain: String,
    pub groups: Vec<GroupCtx>,
    pub meta: MetaCtx,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCtx {
    pub id: String,
    pub name: String,
    pub email: String,
    pub description: String,
    pub members: Vec<MemberCtx>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberCtx {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Membership role; only known for unresolved entries.
    pub role: Option<String>,
    pub photo_url: Option<String>,
    /// `false` when the entry is the raw member record.
    pub resolved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaCtx {
    pub roster_version: String,
    pub group_count: usize,
    pub member_count: usize,
}

impl PageContext {
    /// Build a [`PageContext`] from a [`Snapshot`], keeping its order.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let groups: Vec<GroupCtx> = snapshot.groups.iter().map(GroupCtx::from_group).collect();
        PageContext {
            domain: snapshot.domain.clone(),
            meta: MetaCtx {
                roster_version: env!("CARGO_PKG_VERSION").to_string(),
                group_count: groups.len(),
                member_count: snapshot.member_count(),
            },
            groups,
        }
    }

    /// Convert to a [`tera::Context`] for rendering.
    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}

impl GroupCtx {
    fn from_group(group: &Group) -> Self {
        GroupCtx {
            id: group.id.0.clone(),
            name: if group.name.is_empty() {
                group.email.clone()
            } else {
                group.name.clone()
            },
            email: group.email.clone(),
            description: group.description.clone(),
            members: group.members.iter().map(MemberCtx::from_entry).collect(),
        }
    }
}

impl MemberCtx {
    fn from_entry(entry: &MemberEntry) -> Self {
        let (role, photo_url) = match entry {
            MemberEntry::Resolved(user) => (None, user.thumbnail_photo_url.clone()),
            MemberEntry::Unresolved(member) => {
                let role = (!member.role.is_empty()).then(|| member.role.clone());
                (role, None)
            }
        };
        MemberCtx {
            id: entry.id().0.clone(),
            name: entry.display_name().to_string(),
            email: entry.email().to_string(),
            role,
            photo_url,
            resolved: entry.is_resolved(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::types::{Etag, GroupId, Member, User, UserId, UserName};
    use std::collections::BTreeMap;

    fn snapshot() -> Snapshot {
        Snapshot {
            domain: "example.com".to_string(),
            groups: vec![Group {
                id: GroupId::from("g1"),
                etag: Etag::from("e1"),
                email: "eng@example.com".to_string(),
                name: String::new(),
                description: "Engineering".to_string(),
                members: vec![
                    MemberEntry::Resolved(User {
                        id: UserId::from("u1"),
                        etag: Etag::from("v1"),
                        primary_email: "ada@example.com".to_string(),
                        name: UserName {
                            full_name: "Ada Lovelace".to_string(),
                            ..UserName::default()
                        },
                        thumbnail_photo_url: Some("https://example.com/ada.png".to_string()),
                        extra: BTreeMap::new(),
                    }),
                    MemberEntry::Unresolved(Member {
                        id: UserId::from("u2"),
                        etag: Etag::from("m2"),
                        email: Some("ext@partner.org".to_string()),
                        role: "MEMBER".to_string(),
                        member_type: Some("USER".to_string()),
                        status: None,
                    }),
                ],
            }],
        }
    }

    #[test]
    fn context_fields_populated() {
        let ctx = PageContext::from_snapshot(&snapshot());
        assert_eq!(ctx.domain, "example.com");
        assert_eq!(ctx.meta.group_count, 1);
        assert_eq!(ctx.meta.member_count, 2);
        let group = &ctx.groups[0];
        assert_eq!(group.name, "eng@example.com", "empty name falls back to email");
        assert_eq!(group.members[0].name, "Ada Lovelace");
        assert!(group.members[0].resolved);
        assert_eq!(group.members[1].name, "ext@partner.org");
        assert_eq!(group.members[1].role.as_deref(), Some("MEMBER"));
        assert!(!group.members[1].resolved);
    }

    #[test]
    fn to_tera_context_succeeds() {
        let ctx = PageContext::from_snapshot(&snapshot());
        let tera_ctx = ctx.to_tera_context().expect("context conversion");
        let _ = tera_ctx;
    }
}
