//! Repository collaborators and storage backends.
//!
//! The detector talks to the repository through a per-invocation
//! [`RepositorySession`]. Concurrent invocations open their own sessions,
//! so each one owns its read-consistent view and entity cache.

pub mod scope;
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{
    CandidateRecord, FieldHandle, LineageGroupId, RecordId, SubmissionRef, WorkflowRef,
};

/// View mode of a repository session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Live view; writes allowed.
    ReadWrite,
    /// Stable snapshot; no writes.
    ReadOnly,
    /// Bulk editing with caching disabled.
    BatchEdit,
}

impl Default for SessionMode {
    fn default() -> Self {
        Self::ReadWrite
    }
}

/// Single-pass, lazily evaluated sequence of candidates.
///
/// Yields records whose value in the searched field lies within the
/// distance bound. Order is unspecified. Dropping the cursor terminates
/// the search early and must not leak resources.
#[async_trait]
pub trait CandidateCursor: Send {
    /// Error type for cursor operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Pull the next candidate; `None` once exhausted.
    async fn next_candidate(&mut self) -> Result<Option<CandidateRecord>, Self::Error>;
}

/// Per-invocation view of the repository.
///
/// Bundles the field catalog, approximate search, and the lifecycle
/// lookups the classifier needs. Mode changes and releases are
/// synchronous so they can run from `Drop`.
#[async_trait]
pub trait RepositorySession: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Cursor type returned by [`search`](Self::search).
    type Cursor: CandidateCursor<Error = Self::Error>;

    /// Current view mode.
    fn mode(&self) -> SessionMode;

    /// Switch view mode.
    fn set_mode(&self, mode: SessionMode);

    /// Drop any cached state for a record that will not be used again.
    fn release(&self, id: &RecordId);

    /// Whether version lineage tracking is available.
    fn versioning_enabled(&self) -> bool {
        true
    }

    /// Look up a field. A `None` qualifier matches only unqualified fields.
    async fn find_field(
        &self,
        schema: &str,
        element: &str,
        qualifier: Option<&str>,
    ) -> Result<Option<FieldHandle>, Self::Error>;

    /// First value of `field` on a record.
    async fn first_value(
        &self,
        record: &RecordId,
        field: &FieldHandle,
    ) -> Result<Option<String>, Self::Error>;

    /// Fetch a record's projected state.
    async fn get_record(&self, id: &RecordId) -> Result<Option<CandidateRecord>, Self::Error>;

    /// Start an approximate search.
    async fn search(
        &self,
        field: &FieldHandle,
        sample: &str,
        max_distance: u32,
    ) -> Result<Self::Cursor, Self::Error>;

    /// Version lineage group of a record.
    async fn version_lineage(&self, id: &RecordId) -> Result<Option<LineageGroupId>, Self::Error>;

    /// In-progress submission wrapping a record.
    async fn in_progress_submission(&self, id: &RecordId) -> Result<Option<SubmissionRef>, Self::Error>;

    /// Review workflow wrapping a record.
    async fn review_workflow(&self, id: &RecordId) -> Result<Option<WorkflowRef>, Self::Error>;
}

pub use memory::{InMemoryRepository, InMemorySession, InMemoryCursor, InMemoryError};
pub use scope::{ReadOnlyScope, CandidateLease};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresRepository, PostgresSession, PostgresConfig};
