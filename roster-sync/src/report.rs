//! Run report: what a sync did and which entities it had to degrade.

use serde::{Deserialize, Serialize};

use roster_core::PartialFailurePolicy;

use crate::outcome::EntityFailure;

/// Summary of one orchestration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub domain: String,
    /// Groups returned by the listing, before filtering.
    pub groups_listed: usize,
    /// Groups dropped by the hidden marker or the ignore set.
    pub groups_excluded: usize,
    /// Groups in the snapshot.
    pub groups: usize,
    pub members: usize,
    /// Members backed by a resolved user profile.
    pub resolved: usize,
    pub remote_calls: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Cache reads or writes that errored. Never fatal.
    pub cache_errors: usize,
    pub failures: Vec<EntityFailure>,
}

impl SyncReport {
    pub fn unresolved(&self) -> usize {
        self.members.saturating_sub(self.resolved)
    }

    /// Degraded entities whose data exists remotely but is missing from the
    /// snapshot. Not-found fallbacks are excluded.
    pub fn real_failures(&self) -> impl Iterator<Item = &EntityFailure> {
        self.failures.iter().filter(|f| f.reason.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.real_failures().next().is_some()
    }

    /// Whether the run must report failure under `policy`, even though a
    /// snapshot was produced.
    pub fn fails_under(&self, policy: PartialFailurePolicy) -> bool {
        match policy {
            PartialFailurePolicy::Succeed => false,
            PartialFailurePolicy::Fail => self.has_failures(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{EntityRef, FailureReason};
    use roster_core::types::EntityKind;

    fn report_with(reason: FailureReason) -> SyncReport {
        SyncReport {
            members: 3,
            resolved: 2,
            failures: vec![EntityFailure {
                entity: EntityRef::new(EntityKind::User, "u1"),
                reason,
            }],
            ..SyncReport::default()
        }
    }

    #[test]
    fn not_found_fallback_never_fails_the_run() {
        let report = report_with(FailureReason::NotFound {
            message: "u1".into(),
        });
        assert!(!report.has_failures());
        assert!(!report.fails_under(PartialFailurePolicy::Fail));
        assert_eq!(report.unresolved(), 1);
    }

    #[test]
    fn policy_decides_on_real_failures() {
        let report = report_with(FailureReason::Fatal {
            message: "boom".into(),
        });
        assert!(report.has_failures());
        assert!(!report.fails_under(PartialFailurePolicy::Succeed));
        assert!(report.fails_under(PartialFailurePolicy::Fail));
    }
}
