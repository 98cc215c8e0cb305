//! Core types for duplicate detection.

pub mod record;
pub mod field;
pub mod workflow;
pub mod classification;
pub mod result_set;
pub mod metrics;

pub use record::{
    RecordId, CollectionId, LineageGroupId, SubmissionRef, ActorId, Actor, CandidateRecord,
};
pub use field::{FieldSelector, FieldId, FieldHandle};
pub use workflow::{WorkflowKind, ReviewStage, ReviewPermission, WorkflowRef};
pub use classification::{Classification, RejectReason};
pub use result_set::{ResultCap, AcceptedDuplicate, ScanStats, DuplicateResultSet};
pub use metrics::{DetectionMetrics, NoOpMetrics, TestMetrics, CANDIDATES_METRIC, SCANS_METRIC};
