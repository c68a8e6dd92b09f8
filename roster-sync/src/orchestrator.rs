//! Sync orchestration: walks domain → groups → members → users.
//!
//! ```text
//! Init → ResolveDomain → ListGroups → FetchMembers (per group)
//!      → ResolveUsers (per member) → Aggregate → Done
//! ```
//!
//! Only domain resolution and the group listing can fail a run. Everything
//! below them degrades per entity: a failed member listing becomes an empty
//! list, a failed user lookup falls back to the raw member record.
//!
//! Groups are fetched concurrently, and so are the members of each group, at
//! most `concurrency` in flight per level. Results are collected in input
//! order, so completion order never shows up in the snapshot.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use roster_core::config::DEFAULT_HIDDEN_MARKER;
use roster_core::types::{EntityKind, Group, Member, MemberEntry, Snapshot, User};
use roster_core::{DirectoryClient, RosterConfig};

use crate::aggregate::{self, GroupSync};
use crate::cache::{self, CacheKey, ResponseCache};
use crate::error::SyncError;
use crate::outcome::{EntityRef, FailureReason, Outcome};
use crate::report::SyncReport;
use crate::retry::{RetryError, RetryPolicy};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Inputs that shape a run. Opaque strings to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Skip domain resolution and use this domain.
    pub domain: Option<String>,
    /// Identity handed to domain resolution.
    pub impersonate: Option<String>,
    pub ignore_groups: BTreeSet<String>,
    pub hidden_marker: String,
    pub concurrency: usize,
    /// Read and write the user cache. Member listings are cached either way.
    pub cache_users: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            domain: None,
            impersonate: None,
            ignore_groups: BTreeSet::new(),
            hidden_marker: DEFAULT_HIDDEN_MARKER.to_string(),
            concurrency: 8,
            cache_users: true,
        }
    }
}

impl From<&RosterConfig> for SyncOptions {
    fn from(config: &RosterConfig) -> Self {
        Self {
            domain: config.domain.clone(),
            impersonate: config.impersonate.clone(),
            ignore_groups: config.ignore_groups.clone(),
            hidden_marker: config.hidden_marker.clone(),
            concurrency: config.concurrency.max(1),
            cache_users: !config.cache.skip_users,
        }
    }
}

// ---------------------------------------------------------------------------
// Phase / counters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    ResolveDomain,
    ListGroups,
    FetchMembers,
    Aggregate,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::ResolveDomain => "resolve-domain",
            Phase::ListGroups => "list-groups",
            Phase::FetchMembers => "fetch-members",
            Phase::Aggregate => "aggregate",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct Counters {
    remote_calls: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    cache_errors: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn read(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::Relaxed)
    }
}

/// What the user cache holds for one member record.
///
/// A not-found answer is as stable as a profile for a given member etag, so
/// it is cached too. Exhausted, fatal and cancelled lookups never are.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum UserLookup {
    Found(User),
    NotFound { message: String },
}

// ---------------------------------------------------------------------------
// SyncOrchestrator
// ---------------------------------------------------------------------------

/// Output of a successful orchestration.
#[derive(Debug, Clone)]
pub struct SyncRun {
    pub snapshot: Snapshot,
    pub report: SyncReport,
}

/// Drives one traversal of the directory.
///
/// The client and cache are injected; the orchestrator holds no global state
/// and can run repeatedly against the same cache.
pub struct SyncOrchestrator {
    client: Arc<dyn DirectoryClient>,
    cache: Arc<dyn ResponseCache>,
    retry: RetryPolicy,
    options: SyncOptions,
    counters: Counters,
}

impl SyncOrchestrator {
    pub fn new(
        client: Arc<dyn DirectoryClient>,
        cache: Arc<dyn ResponseCache>,
        retry: RetryPolicy,
        options: SyncOptions,
    ) -> Self {
        Self {
            client,
            cache,
            retry,
            options,
            counters: Counters::default(),
        }
    }

    pub fn from_config(
        client: Arc<dyn DirectoryClient>,
        cache: Arc<dyn ResponseCache>,
        config: &RosterConfig,
    ) -> Self {
        Self::new(
            client,
            cache,
            RetryPolicy::from_config(&config.retry),
            SyncOptions::from(config),
        )
    }

    /// Run the whole traversal.
    ///
    /// Fails only when the domain or the group listing cannot be obtained, or
    /// when `cancel` fires before the snapshot is assembled.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<SyncRun, SyncError> {
        let calls_before = Counters::read(&self.counters.remote_calls);
        let hits_before = Counters::read(&self.counters.cache_hits);
        let misses_before = Counters::read(&self.counters.cache_misses);
        let errors_before = Counters::read(&self.counters.cache_errors);

        self.enter(Phase::ResolveDomain);
        let domain = self.resolve_domain(cancel).await?;

        self.enter(Phase::ListGroups);
        let listed = self.list_groups(&domain, cancel).await?;
        let groups_listed = listed.len();
        let groups = self.filter_groups(listed);
        let groups_excluded = groups_listed - groups.len();
        tracing::info!(
            domain = %domain,
            listed = groups_listed,
            excluded = groups_excluded,
            "listed groups"
        );

        self.enter(Phase::FetchMembers);
        let concurrency = self.options.concurrency.max(1);
        let results: Vec<GroupSync> = stream::iter(groups)
            .map(|group| self.sync_group(group, cancel))
            .buffered(concurrency)
            .collect()
            .await;

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        self.enter(Phase::Aggregate);
        let (snapshot, failures) = aggregate::assemble(&domain, results);
        let members = snapshot.member_count();
        let resolved = snapshot
            .groups
            .iter()
            .flat_map(|g| g.members.iter())
            .filter(|entry| entry.is_resolved())
            .count();

        let report = SyncReport {
            domain,
            groups_listed,
            groups_excluded,
            groups: snapshot.groups.len(),
            members,
            resolved,
            remote_calls: Counters::read(&self.counters.remote_calls) - calls_before,
            cache_hits: Counters::read(&self.counters.cache_hits) - hits_before,
            cache_misses: Counters::read(&self.counters.cache_misses) - misses_before,
            cache_errors: Counters::read(&self.counters.cache_errors) - errors_before,
            failures,
        };

        self.enter(Phase::Done);
        for failure in report.real_failures() {
            tracing::warn!(%failure, "degraded entity");
        }
        Ok(SyncRun { snapshot, report })
    }

    fn enter(&self, phase: Phase) {
        tracing::debug!(%phase, "sync phase");
    }

    // -- prerequisites ------------------------------------------------------

    async fn resolve_domain(&self, cancel: &CancellationToken) -> Result<String, SyncError> {
        if let Some(domain) = &self.options.domain {
            return Ok(domain.clone());
        }
        let identity = self.options.impersonate.as_deref();
        let target = EntityRef::new(EntityKind::Domain, identity.unwrap_or("me"));
        self.retry
            .run(&target, cancel, || {
                Counters::bump(&self.counters.remote_calls);
                self.client.resolve_domain(identity)
            })
            .await
            .map_err(|err| global_failure(err, SyncError::DomainResolution))
    }

    async fn list_groups(
        &self,
        domain: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Group>, SyncError> {
        let target = EntityRef::new(EntityKind::Groups, domain);
        self.retry
            .run(&target, cancel, || {
                Counters::bump(&self.counters.remote_calls);
                self.client.list_groups(domain)
            })
            .await
            .map_err(|err| global_failure(err, SyncError::GroupListing))
    }

    /// Drop hidden and ignored groups. Runs before any per-group fetch.
    fn filter_groups(&self, groups: Vec<Group>) -> Vec<Group> {
        groups
            .into_iter()
            .filter(|group| {
                let excluded =
                    group.is_excluded(&self.options.hidden_marker, &self.options.ignore_groups);
                if excluded {
                    tracing::debug!(group = %group.id, "excluding group");
                }
                !excluded
            })
            .collect()
    }

    // -- per-entity ---------------------------------------------------------

    async fn sync_group(&self, group: Group, cancel: &CancellationToken) -> GroupSync {
        let members = self.fetch_members(&group, cancel).await;
        let concurrency = self.options.concurrency.max(1);
        let entries: Vec<Outcome<MemberEntry>> = stream::iter(members.value().iter())
            .map(|member| self.resolve_user(member, cancel))
            .buffered(concurrency)
            .collect()
            .await;
        tracing::debug!(group = %group.id, members = entries.len(), "group synced");
        GroupSync {
            group,
            members,
            entries,
        }
    }

    /// Cache-checked, retried member listing. Degrades to an empty list.
    async fn fetch_members(
        &self,
        group: &Group,
        cancel: &CancellationToken,
    ) -> Outcome<Vec<Member>> {
        let key = CacheKey::members(group);
        if let Some(members) = key.as_ref().and_then(|k| self.cached::<Vec<Member>>(k)) {
            return Outcome::Cached(members);
        }

        let target = EntityRef::new(EntityKind::Members, group.id.0.clone());
        let result = self
            .retry
            .run(&target, cancel, || {
                Counters::bump(&self.counters.remote_calls);
                self.client.list_members(&group.id)
            })
            .await;

        match result {
            Ok(members) => {
                if let Some(key) = &key {
                    self.store(key, &members);
                }
                Outcome::Fetched(members)
            }
            Err(err) => {
                tracing::warn!(group = %group.id, error = %err, "member listing failed; group left empty");
                Outcome::Degraded {
                    value: Vec::new(),
                    reason: err.into(),
                }
            }
        }
    }

    /// Cache-checked, retried user lookup. Falls back to the member record.
    async fn resolve_user(
        &self,
        member: &Member,
        cancel: &CancellationToken,
    ) -> Outcome<MemberEntry> {
        let key = if self.options.cache_users {
            CacheKey::user(member)
        } else {
            None
        };
        match key.as_ref().and_then(|k| self.cached::<UserLookup>(k)) {
            Some(UserLookup::Found(user)) => return Outcome::Cached(MemberEntry::Resolved(user)),
            Some(UserLookup::NotFound { message }) => {
                return Outcome::Degraded {
                    value: MemberEntry::Unresolved(member.clone()),
                    reason: FailureReason::NotFound { message },
                }
            }
            None => {}
        }

        let target = EntityRef::new(EntityKind::User, member.id.0.clone());
        let result = self
            .retry
            .run(&target, cancel, || {
                Counters::bump(&self.counters.remote_calls);
                self.client.get_user(&member.id)
            })
            .await;

        match result {
            Ok(user) => {
                if let Some(key) = &key {
                    self.store(key, &UserLookup::Found(user.clone()));
                }
                Outcome::Fetched(MemberEntry::Resolved(user))
            }
            Err(err) => {
                match (&err, &key) {
                    (RetryError::NotFound(message), Some(key)) => {
                        let message = message.clone();
                        self.store(key, &UserLookup::NotFound { message });
                    }
                    (RetryError::NotFound(_), None) => {}
                    _ => {
                        tracing::warn!(member = %member.id, error = %err, "user lookup failed; using member record");
                    }
                }
                Outcome::Degraded {
                    value: MemberEntry::Unresolved(member.clone()),
                    reason: err.into(),
                }
            }
        }
    }

    // -- cache plumbing -----------------------------------------------------

    /// Read-through. Cache errors count as a miss.
    fn cached<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        match cache::get_json::<T>(self.cache.as_ref(), key) {
            Ok(Some(value)) => {
                Counters::bump(&self.counters.cache_hits);
                Some(value)
            }
            Ok(None) => {
                Counters::bump(&self.counters.cache_misses);
                None
            }
            Err(err) => {
                Counters::bump(&self.counters.cache_errors);
                Counters::bump(&self.counters.cache_misses);
                tracing::warn!(key = %key, error = %err, "cache read failed");
                None
            }
        }
    }

    /// Fire-and-forget write. A failed write never fails the fetch.
    fn store<T: Serialize>(&self, key: &CacheKey, value: &T) {
        if let Err(err) = cache::set_json(self.cache.as_ref(), key, value) {
            Counters::bump(&self.counters.cache_errors);
            tracing::warn!(key = %key, error = %err, "cache write failed");
        }
    }
}

fn global_failure(err: RetryError, wrap: fn(RetryError) -> SyncError) -> SyncError {
    match err {
        RetryError::Cancelled => SyncError::Cancelled,
        other => wrap(other),
    }
}
