//! The ordered classification rule table.
//!
//! Each rule is one predicate → outcome pair. [`RULE_ORDER`] fixes the
//! precedence; evaluation lives in [`crate::classifier`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// One predicate → outcome pair of the classification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Candidate is the subject.
    IsSelf,
    /// Candidate shares the subject's version lineage.
    SameVersionLineage,
    /// Candidate is an unfinished submission.
    InProgressSubmission,
    /// Actor administers the candidate.
    Administrator,
    /// Candidate is in the basic review workflow.
    RecognizedWorkflow,
    /// Candidate is in some other workflow engine.
    UnrecognizedWorkflow,
    /// Candidate is withdrawn.
    Withdrawn,
    /// Terminal read check.
    Readable,
}

/// Evaluation order. Load-bearing: reordering changes what is disclosed.
pub const RULE_ORDER: [Rule; 8] = [
    Rule::IsSelf,
    Rule::SameVersionLineage,
    Rule::InProgressSubmission,
    Rule::Administrator,
    Rule::RecognizedWorkflow,
    Rule::UnrecognizedWorkflow,
    Rule::Withdrawn,
    Rule::Readable,
];

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IsSelf => "is_self",
            Self::SameVersionLineage => "same_version_lineage",
            Self::InProgressSubmission => "in_progress_submission",
            Self::Administrator => "administrator",
            Self::RecognizedWorkflow => "recognized_workflow",
            Self::UnrecognizedWorkflow => "unrecognized_workflow",
            Self::Withdrawn => "withdrawn",
            Self::Readable => "readable",
        };
        f.write_str(name)
    }
}

impl Rule {
    /// Position in [`RULE_ORDER`], 1-based.
    pub fn precedence(&self) -> usize {
        RULE_ORDER.iter().position(|r| r == self).map_or(RULE_ORDER.len(), |i| i + 1)
    }
}
