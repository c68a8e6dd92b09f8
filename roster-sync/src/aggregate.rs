//! Aggregation: turns per-group fetch results into the ordered snapshot.
//!
//! Group order is the listing order (after filtering). Member lists are
//! stable-sorted by email, so entries sharing an email keep the order the
//! member listing returned them in. Pure; no I/O.

use roster_core::types::{EntityKind, Group, Member, MemberEntry, Snapshot};

use crate::outcome::{EntityFailure, EntityRef, Outcome};

/// Everything fetched for one group.
#[derive(Debug, Clone)]
pub struct GroupSync {
    pub group: Group,
    /// The member listing; degraded to an empty list when it failed.
    pub members: Outcome<Vec<Member>>,
    /// One entry per listed member, in listing order.
    pub entries: Vec<Outcome<MemberEntry>>,
}

/// Sort by email ascending; ties keep their current relative order.
pub fn sort_members(entries: &mut [MemberEntry]) {
    entries.sort_by(|a, b| a.email().cmp(b.email()));
}

/// Attach a sorted member list to its group.
pub fn attach(mut group: Group, mut entries: Vec<MemberEntry>) -> Group {
    sort_members(&mut entries);
    group.members = entries;
    group
}

/// Build the snapshot and collect every degraded entity, in snapshot order.
pub fn assemble(domain: &str, results: Vec<GroupSync>) -> (Snapshot, Vec<EntityFailure>) {
    let mut failures = Vec::new();
    let mut groups = Vec::with_capacity(results.len());

    for result in results {
        if let Some(reason) = result.members.reason() {
            failures.push(EntityFailure {
                entity: EntityRef::new(EntityKind::Members, result.group.id.0.clone()),
                reason: reason.clone(),
            });
        }

        let mut entries = Vec::with_capacity(result.entries.len());
        for outcome in result.entries {
            if let Some(reason) = outcome.reason() {
                failures.push(EntityFailure {
                    entity: EntityRef::new(EntityKind::User, outcome.value().id().0.clone()),
                    reason: reason.clone(),
                });
            }
            entries.push(outcome.into_value());
        }

        groups.push(attach(result.group, entries));
    }

    let snapshot = Snapshot {
        domain: domain.to_string(),
        groups,
    };
    (snapshot, failures)
}
