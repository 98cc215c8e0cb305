//! Duplicate check run as a submission step.
//!
//! The submitter's typed title is matched against the repository before
//! the record is saved, so the step passes the title as the sample and
//! never writes it to the record.

use std::sync::Arc;

use crate::authz::AuthorizationOracle;
use crate::detector::DuplicationDetector;
use crate::error::DuplicationError;
use crate::policy::{ConfigSource, DetectionRequest};
use crate::store::RepositorySession;
use crate::types::{Actor, DuplicateResultSet, RecordId};

/// Result of the duplicate check step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Nothing blocks the submission.
    Complete,
    /// The submitter has not entered a title yet.
    MissingTitle,
    /// Visible duplicates need the submitter's attention.
    DuplicatesDetected(DuplicateResultSet),
}

impl StepOutcome {
    /// Whether the submission may proceed.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Submission step backed by a [`DuplicationDetector`].
pub struct DuplicateCheckStep<A: ?Sized, C: ?Sized> {
    detector: Arc<DuplicationDetector<A, C>>,
}

impl<A, C> DuplicateCheckStep<A, C>
where
    A: AuthorizationOracle + ?Sized,
    C: ConfigSource + ?Sized,
{
    /// Create the step.
    pub fn new(detector: Arc<DuplicationDetector<A, C>>) -> Self {
        Self { detector }
    }

    /// Check the submitted title of `subject`.
    ///
    /// `ignore_duplicates` is the submitter's explicit acknowledgement
    /// and skips the search entirely.
    pub async fn evaluate<S: RepositorySession + ?Sized>(
        &self,
        session: &S,
        actor: &Actor,
        subject: &RecordId,
        submitted_title: Option<&str>,
        ignore_duplicates: bool,
    ) -> Result<StepOutcome, DuplicationError> {
        if ignore_duplicates {
            tracing::debug!(subject = %subject, "Submitter chose to ignore duplicates");
            return Ok(StepOutcome::Complete);
        }

        let title = submitted_title.map(str::trim).unwrap_or_default();
        if title.is_empty() {
            return Ok(StepOutcome::MissingTitle);
        }

        let results = self
            .detector
            .find_readable_duplicates(session, actor, subject, DetectionRequest::new().with_sample(title))
            .await?;

        if results.is_empty() {
            Ok(StepOutcome::Complete)
        } else {
            tracing::info!(subject = %subject, duplicates = results.len(), "Submission has potential duplicates");
            Ok(StepOutcome::DuplicatesDetected(results))
        }
    }
}
