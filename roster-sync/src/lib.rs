//! # roster-sync
//!
//! Fetch → cache → retry → aggregate pipeline over a remote directory, plus the
//! hash-gated atomic writer for its outputs.
//!
//! Build a [`Pipeline`] around a [`roster_core::DirectoryClient`] and a
//! [`ResponseCache`], then call [`Pipeline::sync`]. [`SyncOrchestrator`] can
//! be driven on its own when only the [`roster_core::Snapshot`] is needed.

pub mod aggregate;
pub mod cache;
pub mod diff;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod state;
pub mod writer;

pub use cache::{CacheError, CacheKey, DiskCache, MemoryCache, ResponseCache};
pub use error::SyncError;
pub use orchestrator::{SyncOptions, SyncOrchestrator, SyncRun};
pub use outcome::{EntityFailure, EntityRef, FailureReason, Outcome};
pub use pipeline::{open_cache, DiffOutcome, Pipeline, RunOutcome};
pub use report::SyncReport;
pub use retry::{RetryError, RetryPolicy};
pub use writer::WriteResult;
