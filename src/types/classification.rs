//! Classification outcomes for duplicate candidates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a candidate was withheld from the actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    /// The candidate is the subject record.
    IsSelf,
    /// The candidate is another version of the subject.
    SameVersionLineage,
    /// The candidate is an unfinished submission.
    InProgressSubmission,
    /// The candidate is in review at a stage the actor may not act on.
    NotReviewableStage,
    /// The candidate is in a workflow engine the classifier does not understand.
    UnknownWorkflowKind,
    /// The candidate is withdrawn and the actor does not administer it.
    WithdrawnNotAdmin,
    /// The actor may not read the candidate.
    NotReadable,
    /// The authorization oracle could not answer.
    AuthorizationUnavailable,
}

impl RejectReason {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IsSelf => "is_self",
            Self::SameVersionLineage => "same_version_lineage",
            Self::InProgressSubmission => "in_progress_submission",
            Self::NotReviewableStage => "not_reviewable_stage",
            Self::UnknownWorkflowKind => "unknown_workflow_kind",
            Self::WithdrawnNotAdmin => "withdrawn_not_admin",
            Self::NotReadable => "not_readable",
            Self::AuthorizationUnavailable => "authorization_unavailable",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one candidate for one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// The actor administers the candidate directly.
    AdminVisible,
    /// The actor may review the candidate at its current workflow stage.
    Reviewable,
    /// The candidate is an ordinary record the actor may read.
    Readable,
    /// The actor must not learn about the candidate.
    Rejected(RejectReason),
}

impl Classification {
    /// Whether the candidate goes into the result set.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    /// The rejection reason, if rejected.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Stable label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AdminVisible => "admin_visible",
            Self::Reviewable => "reviewable",
            Self::Readable => "readable",
            Self::Rejected(reason) => reason.as_str(),
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(reason) => write!(f, "rejected({})", reason),
            other => f.write_str(other.label()),
        }
    }
}
