//! Administrative survey of the unfiltered candidate stream.
//!
//! Nothing here consults authorization. Survey output describes records
//! the caller may not be allowed to see and must only reach operators.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::RepositorySession;
use crate::types::{CandidateRecord, FieldHandle};

/// Lifecycle label of a surveyed candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    /// Inside a review workflow.
    InReview,
    /// Unfinished submission.
    InProgress,
    /// Withdrawn from the archive.
    Withdrawn,
    /// Archived but not discoverable.
    Private,
    /// Archived and discoverable.
    Archived,
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InReview => "in review",
            Self::InProgress => "in progress",
            Self::Withdrawn => "withdrawn",
            Self::Private => "private",
            Self::Archived => "archived",
        };
        f.write_str(label)
    }
}

/// One row of a survey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyEntry {
    /// The candidate.
    pub record: CandidateRecord,
    /// Its lifecycle label.
    pub kind: CandidateKind,
    /// Its value in the surveyed field.
    pub value: Option<String>,
}

/// Label a candidate and read its value in `field`.
///
/// Workflow membership is checked first, then in-progress submission,
/// then the record's own flags.
pub async fn describe_candidate<S: RepositorySession + ?Sized>(
    session: &S,
    field: &FieldHandle,
    record: CandidateRecord,
) -> Result<SurveyEntry, S::Error> {
    let kind = if session.review_workflow(&record.id).await?.is_some() {
        CandidateKind::InReview
    } else if session.in_progress_submission(&record.id).await?.is_some() {
        CandidateKind::InProgress
    } else if record.withdrawn {
        CandidateKind::Withdrawn
    } else if !record.discoverable {
        CandidateKind::Private
    } else {
        CandidateKind::Archived
    };

    let value = session.first_value(&record.id, field).await?;
    Ok(SurveyEntry { record, kind, value })
}
