//! Per-entity results of a sync run.
//!
//! Downstream failures never abort a run. Instead each fetch yields an
//! [`Outcome`] that says whether the value is real data or a stand-in, and
//! why.

use std::fmt;

use serde::{Deserialize, Serialize};

use roster_core::types::EntityKind;

use crate::retry::RetryError;

/// Which remote entity a call or failure is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Why an entity only has a degraded value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    NotFound { message: String },
    RetryExhausted { attempts: u32, message: String },
    Fatal { message: String },
    Cancelled,
}

impl FailureReason {
    /// Not-found is an expected condition with a well-defined fallback; every
    /// other reason means data the remote side has is missing from the run.
    pub fn is_failure(&self) -> bool {
        !matches!(self, FailureReason::NotFound { .. })
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NotFound { message } => write!(f, "not found ({message})"),
            FailureReason::RetryExhausted { attempts, message } => {
                write!(f, "gave up after {attempts} attempts ({message})")
            }
            FailureReason::Fatal { message } => write!(f, "failed ({message})"),
            FailureReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl From<RetryError> for FailureReason {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::NotFound(message) => FailureReason::NotFound { message },
            RetryError::Exhausted { attempts, last } => FailureReason::RetryExhausted {
                attempts,
                message: last.to_string(),
            },
            RetryError::Fatal(err) => FailureReason::Fatal {
                message: err.to_string(),
            },
            RetryError::Cancelled => FailureReason::Cancelled,
        }
    }
}

/// Result of fetching one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// Fresh from the remote directory.
    Fetched(T),
    /// Served from the response cache.
    Cached(T),
    /// A stand-in value; the real one could not be obtained.
    Degraded { value: T, reason: FailureReason },
}

impl<T> Outcome<T> {
    pub fn value(&self) -> &T {
        match self {
            Outcome::Fetched(value) | Outcome::Cached(value) => value,
            Outcome::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Outcome::Fetched(value) | Outcome::Cached(value) => value,
            Outcome::Degraded { value, .. } => value,
        }
    }

    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            Outcome::Degraded { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Outcome::Cached(_))
    }
}

/// A degraded entity, as listed in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFailure {
    pub entity: EntityRef,
    #[serde(flatten)]
    pub reason: FailureReason,
}

impl fmt::Display for EntityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.entity, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::DirectoryError;

    #[test]
    fn not_found_is_not_a_failure() {
        let reason = FailureReason::from(RetryError::NotFound("user u1".into()));
        assert!(!reason.is_failure());
        let reason = FailureReason::from(RetryError::Exhausted {
            attempts: 3,
            last: DirectoryError::QuotaExceeded("slow down".into()),
        });
        assert!(reason.is_failure());
        assert_eq!(
            reason.to_string(),
            "gave up after 3 attempts (quota exceeded: slow down)"
        );
    }

    #[test]
    fn outcome_accessors() {
        let degraded = Outcome::Degraded {
            value: Vec::<u8>::new(),
            reason: FailureReason::Cancelled,
        };
        assert!(degraded.value().is_empty());
        assert_eq!(degraded.reason(), Some(&FailureReason::Cancelled));
        assert!(Outcome::Cached(1).is_cached());
        assert_eq!(Outcome::Fetched(7).into_value(), 7);
    }

    #[test]
    fn failure_serializes_flat() {
        let failure = EntityFailure {
            entity: EntityRef::new(EntityKind::Members, "g1"),
            reason: FailureReason::Fatal {
                message: "boom".into(),
            },
        };
        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(value["entity"]["kind"], "members");
        assert_eq!(value["reason"], "fatal");
        assert_eq!(value["message"], "boom");
    }
}
