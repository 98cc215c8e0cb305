//! # duplication-kernel
//!
//! Near-duplicate detection with actor-scoped visibility.
//!
//! The kernel answers one question:
//!
//! > Which records resembling this one is **this actor allowed to learn about**?
//!
//! ## Core Contract
//!
//! 1. Resolve the compared field and read the subject's value (the sample)
//! 2. Stream approximate matches from the repository, one at a time
//! 3. Classify each match with a fixed, ordered rule list and keep only
//!    what the actor may see, up to a cap
//!
//! ## Architecture
//!
//! ```text
//! DetectionConfig ─┐
//!                  ▼
//! Subject → FieldResolver → search (lazy) → VisibilityClassifier → DuplicateResultSet
//!                  │                              │
//!          RepositorySession              AuthorizationOracle
//!          (Memory or Postgres)
//! ```
//!
//! ## Guarantees
//!
//! - The subject and its other versions never appear in its own results
//! - Unknown workflow kinds and failed authorization checks never disclose
//! - A store failure aborts the scan; partial results are never returned
//! - The session's view mode is restored on every exit path

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod policy;
pub mod store;
pub mod resolver;
pub mod lineage;
pub mod authz;
pub mod classifier;
pub mod detector;
pub mod audit;
pub mod submission;
pub mod canonical;
pub mod logging;
pub mod error;

// Re-exports
pub use types::{
    RecordId, CollectionId, LineageGroupId, SubmissionRef, ActorId, Actor, CandidateRecord,
    FieldSelector, FieldId, FieldHandle, WorkflowKind, ReviewStage, ReviewPermission, WorkflowRef,
    Classification, RejectReason, ResultCap, AcceptedDuplicate, ScanStats, DuplicateResultSet,
    DetectionMetrics, NoOpMetrics, TestMetrics,
};
pub use policy::{
    ConfigSource, DetectionConfig, DetectionRequest, EnvConfigSource, StaticConfigSource,
    Rule, RULE_ORDER,
};
pub use store::{
    SessionMode, CandidateCursor, RepositorySession, ReadOnlyScope, CandidateLease,
    InMemoryRepository, InMemorySession, InMemoryError,
};
#[cfg(feature = "postgres")]
pub use store::{PostgresRepository, PostgresSession, PostgresConfig};
pub use resolver::FieldResolver;
pub use lineage::VersionGrouper;
pub use authz::{AuthorizationOracle, StaticAuthorization};
pub use classifier::{VisibilityClassifier, Screened};
pub use detector::DuplicationDetector;
pub use audit::{CandidateKind, SurveyEntry, describe_candidate};
pub use submission::{DuplicateCheckStep, StepOutcome};
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex, membership_hash};
pub use logging::init_tracing;
pub use error::{DuplicationError, AuthorizationError};

/// Schema version of the serialized result types.
/// Increment on breaking changes to any schema type.
pub const DUPLICATION_KERNEL_SCHEMA_VERSION: &str = "1.0.0";

/// Default maximum edit distance between sample and candidate values.
pub const DEFAULT_MAX_EDIT_DISTANCE: u32 = 8;

/// Default cap on accepted duplicates per invocation.
pub const DEFAULT_MAXIMUM_DUPLICATES: i64 = 10;
