//! Review workflow types.
//!
//! ## Stage → Permission Table
//!
//! | Stage | Permission |
//! |-------|------------|
//! | `Step1Pool`, `Step1` | `ReviewStep1` |
//! | `Step2Pool`, `Step2` | `ReviewStep2` |
//! | `Step3Pool`, `Step3` | `ReviewStep3` |
//! | anything else | none (not reviewable) |

use serde::{Deserialize, Serialize};
use std::fmt;

use super::record::{CollectionId, RecordId};

/// Discriminator for the workflow engine a wrapper belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum WorkflowKind {
    /// The three-step review workflow the classifier understands.
    Basic,
    /// Any other engine (e.g. a configurable XML workflow).
    Unrecognized(String),
}

impl WorkflowKind {
    /// Whether the classifier understands this workflow kind.
    pub fn is_recognized(&self) -> bool {
        matches!(self, Self::Basic)
    }
}

/// Current stage of a basic review workflow.
///
/// Numeric codes match the stored state column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStage {
    /// Submitted, not yet in any review pool.
    Submit,
    /// Waiting in the step 1 pool.
    Step1Pool,
    /// Claimed for step 1.
    Step1,
    /// Waiting in the step 2 pool.
    Step2Pool,
    /// Claimed for step 2.
    Step2,
    /// Waiting in the step 3 pool.
    Step3Pool,
    /// Claimed for step 3.
    Step3,
    /// Leaving the workflow into the archive.
    Archive,
    /// Unknown stored state.
    Other(i32),
}

impl ReviewStage {
    /// Decode a stored state code.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Submit,
            1 => Self::Step1Pool,
            2 => Self::Step1,
            3 => Self::Step2Pool,
            4 => Self::Step2,
            5 => Self::Step3Pool,
            6 => Self::Step3,
            8 => Self::Archive,
            other => Self::Other(other),
        }
    }

    /// Encode to the stored state code.
    pub fn code(&self) -> i32 {
        match self {
            Self::Submit => 0,
            Self::Step1Pool => 1,
            Self::Step1 => 2,
            Self::Step2Pool => 3,
            Self::Step2 => 4,
            Self::Step3Pool => 5,
            Self::Step3 => 6,
            Self::Archive => 8,
            Self::Other(code) => *code,
        }
    }

    /// Permission an actor needs to act on a record at this stage.
    pub fn required_permission(&self) -> Option<ReviewPermission> {
        match self {
            Self::Step1Pool | Self::Step1 => Some(ReviewPermission::ReviewStep1),
            Self::Step2Pool | Self::Step2 => Some(ReviewPermission::ReviewStep2),
            Self::Step3Pool | Self::Step3 => Some(ReviewPermission::ReviewStep3),
            Self::Submit | Self::Archive | Self::Other(_) => None,
        }
    }
}

impl fmt::Display for ReviewStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submit => write!(f, "submit"),
            Self::Step1Pool => write!(f, "step1_pool"),
            Self::Step1 => write!(f, "step1"),
            Self::Step2Pool => write!(f, "step2_pool"),
            Self::Step2 => write!(f, "step2"),
            Self::Step3Pool => write!(f, "step3_pool"),
            Self::Step3 => write!(f, "step3"),
            Self::Archive => write!(f, "archive"),
            Self::Other(code) => write!(f, "other({})", code),
        }
    }
}

/// Review permission granted per collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewPermission {
    /// May act on step 1 (accept/reject).
    ReviewStep1,
    /// May act on step 2 (accept/reject/edit metadata).
    ReviewStep2,
    /// May act on step 3 (edit metadata).
    ReviewStep3,
}

impl ReviewPermission {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReviewStep1 => "review_step_1",
            Self::ReviewStep2 => "review_step_2",
            Self::ReviewStep3 => "review_step_3",
        }
    }
}

/// A record's association with a review workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRef {
    /// Workflow wrapper identifier.
    pub id: i64,
    /// Record under review.
    pub record: RecordId,
    /// Collection whose reviewers handle the record.
    pub collection: CollectionId,
    /// Workflow engine.
    pub kind: WorkflowKind,
    /// Current stage.
    pub stage: ReviewStage,
}

impl WorkflowRef {
    /// Create a wrapper in the basic workflow.
    pub fn basic(id: i64, record: RecordId, collection: CollectionId, stage: ReviewStage) -> Self {
        Self {
            id,
            record,
            collection,
            kind: WorkflowKind::Basic,
            stage,
        }
    }

    /// Create a wrapper in an engine the classifier does not understand.
    pub fn unrecognized(
        id: i64,
        record: RecordId,
        collection: CollectionId,
        engine: impl Into<String>,
    ) -> Self {
        Self {
            id,
            record,
            collection,
            kind: WorkflowKind::Unrecognized(engine.into()),
            stage: ReviewStage::Other(-1),
        }
    }
}
