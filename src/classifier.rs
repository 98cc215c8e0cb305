//! Visibility classification of duplicate candidates.
//!
//! Rules are evaluated in [`RULE_ORDER`]; the first rule that produces an
//! outcome wins and later rules are never consulted.
//!
//! | # | Rule | Outcome when it matches |
//! |---|------|-------------------------|
//! | 1 | `IsSelf` | `Rejected(IsSelf)` |
//! | 2 | `SameVersionLineage` | `Rejected(SameVersionLineage)` |
//! | 3 | `InProgressSubmission` | `Rejected(InProgressSubmission)` |
//! | 4 | `Administrator` | `AdminVisible` |
//! | 5 | `RecognizedWorkflow` | `Reviewable` or `Rejected(NotReviewableStage)` |
//! | 6 | `UnrecognizedWorkflow` | `Rejected(UnknownWorkflowKind)` |
//! | 7 | `Withdrawn` | `Rejected(WithdrawnNotAdmin)` |
//! | 8 | `Readable` | `Readable` or `Rejected(NotReadable)` |
//!
//! An authorization check that errors yields
//! `Rejected(AuthorizationUnavailable)` at the rule that asked.

use crate::authz::AuthorizationOracle;
use crate::error::AuthorizationError;
use crate::lineage::VersionGrouper;
use crate::policy::rules::{Rule, RULE_ORDER};
use crate::store::{CandidateLease, RepositorySession};
use crate::types::{Actor, CandidateRecord, Classification, RecordId, RejectReason, WorkflowRef};

/// Lookups shared between rules for one candidate.
struct CandidateFacts<'c> {
    candidate: &'c CandidateRecord,
    workflow: Option<Option<WorkflowRef>>,
}

impl<'c> CandidateFacts<'c> {
    fn new(candidate: &'c CandidateRecord) -> Self {
        Self {
            candidate,
            workflow: None,
        }
    }
}

/// Outcome of screening one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Screened {
    /// The classification.
    pub classification: Classification,
    /// The rule that decided it.
    pub rule: Rule,
    /// The record, present only when accepted.
    pub accepted: Option<CandidateRecord>,
}

/// Classifies candidates for one actor and one subject.
pub struct VisibilityClassifier<'a, S: ?Sized, A: ?Sized> {
    session: &'a S,
    authz: &'a A,
    actor: &'a Actor,
    subject: RecordId,
}

impl<'a, S, A> VisibilityClassifier<'a, S, A>
where
    S: RepositorySession + ?Sized,
    A: AuthorizationOracle + ?Sized,
{
    /// Create a classifier.
    pub fn new(session: &'a S, authz: &'a A, actor: &'a Actor, subject: RecordId) -> Self {
        Self {
            session,
            authz,
            actor,
            subject,
        }
    }

    /// Classify a candidate, returning the outcome and the deciding rule.
    ///
    /// Store errors propagate; authorization errors become rejections.
    pub async fn classify(&self, candidate: &CandidateRecord) -> Result<(Classification, Rule), S::Error> {
        let mut facts = CandidateFacts::new(candidate);
        for rule in RULE_ORDER {
            if let Some(outcome) = self.evaluate_with(rule, &mut facts).await? {
                tracing::debug!(
                    candidate = %candidate.id,
                    rule = %rule,
                    outcome = %outcome,
                    "Classified duplicate candidate"
                );
                return Ok((outcome, rule));
            }
        }
        // Readable is terminal and always answers.
        Ok((Classification::Rejected(RejectReason::NotReadable), Rule::Readable))
    }

    /// Evaluate a single rule in isolation.
    ///
    /// `None` means the rule does not apply and the next one should run.
    pub async fn evaluate(
        &self,
        rule: Rule,
        candidate: &CandidateRecord,
    ) -> Result<Option<Classification>, S::Error> {
        self.evaluate_with(rule, &mut CandidateFacts::new(candidate)).await
    }

    /// Classify and settle the candidate's lease.
    ///
    /// Rejected candidates are released before this returns, as are
    /// candidates whose classification failed with a store error.
    pub async fn screen(&self, candidate: CandidateRecord) -> Result<Screened, S::Error> {
        let lease = CandidateLease::new(self.session, candidate.id);
        let (classification, rule) = self.classify(&candidate).await?;

        if classification.is_accepted() {
            lease.keep();
            Ok(Screened {
                classification,
                rule,
                accepted: Some(candidate),
            })
        } else {
            lease.release();
            Ok(Screened {
                classification,
                rule,
                accepted: None,
            })
        }
    }

    async fn evaluate_with(
        &self,
        rule: Rule,
        facts: &mut CandidateFacts<'_>,
    ) -> Result<Option<Classification>, S::Error> {
        let candidate = facts.candidate;
        let outcome = match rule {
            Rule::IsSelf => (candidate.id == self.subject).then_some(reject(RejectReason::IsSelf)),

            Rule::SameVersionLineage => VersionGrouper::same_lineage(self.session, &self.subject, &candidate.id)
                .await?
                .then_some(reject(RejectReason::SameVersionLineage)),

            Rule::InProgressSubmission => self
                .session
                .in_progress_submission(&candidate.id)
                .await?
                .map(|_| reject(RejectReason::InProgressSubmission)),

            Rule::Administrator => match self.ask(self.authz.is_admin(self.actor, candidate).await, rule, candidate) {
                Ok(true) => Some(Classification::AdminVisible),
                Ok(false) => None,
                Err(rejected) => Some(rejected),
            },

            Rule::RecognizedWorkflow => match self.workflow(facts).await? {
                Some(wf) if wf.kind.is_recognized() => Some(self.review_stage(&wf, candidate).await),
                _ => None,
            },

            Rule::UnrecognizedWorkflow => match self.workflow(facts).await? {
                Some(wf) if !wf.kind.is_recognized() => {
                    tracing::debug!(
                        candidate = %candidate.id,
                        kind = ?wf.kind,
                        "Candidate is in a workflow the classifier does not understand"
                    );
                    Some(reject(RejectReason::UnknownWorkflowKind))
                }
                _ => None,
            },

            Rule::Withdrawn => candidate.withdrawn.then_some(reject(RejectReason::WithdrawnNotAdmin)),

            Rule::Readable => match self.ask(self.authz.can_read(self.actor, candidate).await, rule, candidate) {
                Ok(true) => Some(Classification::Readable),
                Ok(false) => Some(reject(RejectReason::NotReadable)),
                Err(rejected) => Some(rejected),
            },
        };
        Ok(outcome)
    }

    async fn workflow(&self, facts: &mut CandidateFacts<'_>) -> Result<Option<WorkflowRef>, S::Error> {
        if let Some(cached) = &facts.workflow {
            return Ok(cached.clone());
        }
        let workflow = self.session.review_workflow(&facts.candidate.id).await?;
        facts.workflow = Some(workflow.clone());
        Ok(workflow)
    }

    async fn review_stage(&self, workflow: &WorkflowRef, candidate: &CandidateRecord) -> Classification {
        let Some(permission) = workflow.stage.required_permission() else {
            return reject(RejectReason::NotReviewableStage);
        };
        let answer = self
            .authz
            .can_act_on_stage(self.actor, workflow, permission)
            .await;
        match self.ask(answer, Rule::RecognizedWorkflow, candidate) {
            Ok(true) => Classification::Reviewable,
            Ok(false) => reject(RejectReason::NotReviewableStage),
            Err(rejected) => rejected,
        }
    }

    fn ask(
        &self,
        answer: Result<bool, AuthorizationError>,
        rule: Rule,
        candidate: &CandidateRecord,
    ) -> Result<bool, Classification> {
        answer.map_err(|e| {
            tracing::warn!(
                candidate = %candidate.id,
                actor = %self.actor,
                rule = %rule,
                error = %e,
                "Authorization check failed, withholding candidate"
            );
            reject(RejectReason::AuthorizationUnavailable)
        })
    }
}

fn reject(reason: RejectReason) -> Classification {
    Classification::Rejected(reason)
}
