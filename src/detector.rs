//! Duplicate detection pipeline.
//!
//! Resolves the compared field, streams approximate matches for the
//! subject's value and keeps the ones the actor may learn about.

use std::sync::Arc;

use crate::audit::{describe_candidate, SurveyEntry};
use crate::classifier::VisibilityClassifier;
use crate::error::DuplicationError;
use crate::authz::AuthorizationOracle;
use crate::policy::{ConfigSource, DetectionConfig, DetectionRequest};
use crate::resolver::FieldResolver;
use crate::store::{CandidateCursor, CandidateLease, ReadOnlyScope, RepositorySession};
use crate::types::{
    Actor, DetectionMetrics, DuplicateResultSet, FieldHandle, NoOpMetrics, RecordId, ResultCap,
};

/// Finds near-duplicate records visible to an actor.
///
/// ## Algorithm
///
/// 1. Load a fresh [`DetectionConfig`] and apply request overrides
/// 2. Switch the session to read-only for the whole scan
/// 3. Resolve the field and read the subject's first value (the sample)
/// 4. Pull candidates one at a time while the result set is not full:
///    - Classify the candidate
///    - Append accepted candidates, release rejected ones
/// 5. Restore the session's previous mode and return the result set
///
/// A store failure at any step aborts the scan; partial results are never
/// returned.
pub struct DuplicationDetector<A: ?Sized, C: ?Sized> {
    authz: Arc<A>,
    config: Arc<C>,
    metrics: Arc<dyn DetectionMetrics>,
}

impl<A, C> DuplicationDetector<A, C>
where
    A: AuthorizationOracle + ?Sized,
    C: ConfigSource + ?Sized,
{
    /// Create a detector.
    pub fn new(authz: Arc<A>, config: Arc<C>) -> Self {
        Self {
            authz,
            config,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Report counters to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn DetectionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The configuration currently in effect.
    pub fn current_config(&self) -> DetectionConfig {
        DetectionConfig::load(self.config.as_ref())
    }

    /// Duplicates of `subject` that `actor` may learn about.
    ///
    /// The session is held read-only for the duration of the scan and
    /// put back in its previous mode on every exit path.
    #[tracing::instrument(skip_all, fields(actor = %actor, subject = %subject))]
    pub async fn find_readable_duplicates<S: RepositorySession + ?Sized>(
        &self,
        session: &S,
        actor: &Actor,
        subject: &RecordId,
        request: DetectionRequest,
    ) -> Result<DuplicateResultSet, DuplicationError> {
        let result = self.scan(session, actor, subject, request).await;
        self.metrics.record_scan(result.is_ok());
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Duplicate scan aborted");
        }
        result
    }

    async fn scan<S: RepositorySession + ?Sized>(
        &self,
        session: &S,
        actor: &Actor,
        subject: &RecordId,
        request: DetectionRequest,
    ) -> Result<DuplicateResultSet, DuplicationError> {
        let config = self.current_config();
        let max_distance = request.max_distance.unwrap_or(config.max_distance);
        let cap = request.cap.unwrap_or(config.cap);
        if cap == ResultCap::Unbounded {
            tracing::warn!("Unbounded duplicate scan, the whole candidate stream will be consumed");
        }

        let scope = ReadOnlyScope::enter(session);

        let field = match &request.field {
            Some(selector) => FieldResolver::resolve_selector(&*scope, selector).await?,
            None => FieldResolver::resolve(&*scope, config.field_selector.as_deref()).await?,
        };

        let sample = match request.sample {
            Some(sample) => sample,
            None => scope
                .first_value(subject, &field)
                .await
                .map_err(DuplicationError::from_store)?
                .unwrap_or_default(),
        };
        if sample.is_empty() {
            tracing::debug!(field = %field, "Subject has no value, searching with an empty sample");
        }

        let mut cursor = scope
            .search(&field, &sample, max_distance)
            .await
            .map_err(DuplicationError::from_store)?;

        let classifier = VisibilityClassifier::new(session, self.authz.as_ref(), actor, *subject);
        let mut results = DuplicateResultSet::new(field, sample, max_distance, cap);

        loop {
            if results.is_full() {
                results.stats.cap_reached = true;
                break;
            }
            let Some(candidate) = cursor.next_candidate().await.map_err(DuplicationError::from_store)? else {
                break;
            };
            results.stats.inspected += 1;

            let screened = classifier.screen(candidate).await.map_err(DuplicationError::from_store)?;
            self.metrics.record_classification(&screened.classification);

            match (screened.accepted, screened.classification.reject_reason()) {
                (Some(record), _) => results.push(record, screened.classification),
                (None, Some(reason)) => results.stats.record_rejection(reason),
                (None, None) => {}
            }
        }

        tracing::info!(
            field = %results.field,
            max_distance,
            inspected = results.stats.inspected,
            accepted = results.len(),
            rejected = results.stats.rejected(),
            cap_reached = results.stats.cap_reached,
            "Duplicate scan complete"
        );
        Ok(results)
    }

    /// Unfiltered candidate stream for `value`.
    ///
    /// Performs no authorization filtering at all. Never hand the result
    /// to an unprivileged caller.
    #[tracing::instrument(level = "debug", skip(self, session, field), fields(field = %field))]
    pub async fn find_all_duplicates<S: RepositorySession + ?Sized>(
        &self,
        session: &S,
        field: &FieldHandle,
        value: &str,
        max_distance: u32,
    ) -> Result<S::Cursor, DuplicationError> {
        session
            .search(field, value, max_distance)
            .await
            .map_err(DuplicationError::from_store)
    }

    /// Resolve the configured comparison field.
    pub async fn metadata_field<S: RepositorySession + ?Sized>(
        &self,
        session: &S,
    ) -> Result<FieldHandle, DuplicationError> {
        let config = self.current_config();
        FieldResolver::resolve(session, config.field_selector.as_deref()).await
    }

    /// Label up to `limit` unfiltered candidates for operators.
    ///
    /// `selector` follows the usual `schema.element[.qualifier]` rules.
    /// Like [`find_all_duplicates`](Self::find_all_duplicates) this does
    /// no authorization filtering. Every surveyed candidate is released.
    pub async fn survey_duplicates<S: RepositorySession + ?Sized>(
        &self,
        session: &S,
        selector: &str,
        sample: &str,
        max_distance: u32,
        limit: Option<usize>,
    ) -> Result<Vec<SurveyEntry>, DuplicationError> {
        let scope = ReadOnlyScope::enter(session);
        let field = FieldResolver::resolve(&*scope, Some(selector)).await?;
        let mut cursor = self.find_all_duplicates(&*scope, &field, sample, max_distance).await?;

        let mut entries = Vec::new();
        while limit.map_or(true, |limit| entries.len() < limit) {
            let Some(candidate) = cursor.next_candidate().await.map_err(DuplicationError::from_store)? else {
                break;
            };
            let _lease = CandidateLease::new(session, candidate.id);
            let entry = describe_candidate(session, &field, candidate)
                .await
                .map_err(DuplicationError::from_store)?;
            entries.push(entry);
        }

        tracing::info!(field = %field, surveyed = entries.len(), "Duplicate survey complete");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::StaticAuthorization;
    use crate::policy::config::{EDIT_DISTANCE_KEY, FIELD_KEY, MAXIMUM_DUPLICATES_KEY};
    use crate::policy::StaticConfigSource;
    use crate::store::{InMemoryRepository, SessionMode};
    use crate::types::{
        ActorId, CandidateRecord, Classification, FieldSelector, RejectReason, TestMetrics,
        CANDIDATES_METRIC, SCANS_METRIC,
    };
    use crate::audit::CandidateKind;
    use uuid::Uuid;

    fn rid(n: u128) -> RecordId {
        RecordId::new(Uuid::from_u128(n))
    }

    fn alice() -> ActorId {
        ActorId(Uuid::from_u128(900))
    }

    struct Fixture {
        repo: InMemoryRepository,
        title: FieldHandle,
        authz: Arc<StaticAuthorization>,
        config: Arc<StaticConfigSource>,
        metrics: Arc<TestMetrics>,
    }

    impl Fixture {
        fn new() -> Self {
            let repo = InMemoryRepository::new();
            let title = repo.add_field(FieldSelector::default());
            Self {
                repo,
                title,
                authz: Arc::new(StaticAuthorization::new()),
                config: Arc::new(StaticConfigSource::new()),
                metrics: Arc::new(TestMetrics::default()),
            }
        }

        fn record(&self, n: u128, title: &str) -> RecordId {
            let id = rid(n);
            self.repo.insert_record(CandidateRecord::new(id));
            self.repo.set_value(id, &self.title, title);
            id
        }

        fn detector(&self) -> DuplicationDetector<StaticAuthorization, StaticConfigSource> {
            DuplicationDetector::new(Arc::clone(&self.authz), Arc::clone(&self.config))
                .with_metrics(self.metrics.clone())
        }
    }

    #[tokio::test]
    async fn test_subject_value_is_the_sample() {
        let fx = Fixture::new();
        let subject = fx.record(1, "Graph Kernels");
        let twin = fx.record(2, "Graph Kernel");
        fx.record(3, "Something Else Entirely");
        fx.authz.grant_read(alice(), twin);

        let session = fx.repo.session();
        let results = fx
            .detector()
            .find_readable_duplicates(&session, &Actor::User(alice()), &subject, DetectionRequest::new())
            .await
            .unwrap();

        assert_eq!(results.sample, "Graph Kernels");
        assert_eq!(results.record_ids(), vec![twin]);
        assert_eq!(results.stats.inspected, 2);
        assert_eq!(results.stats.rejected_by_reason.get(&RejectReason::IsSelf), Some(&1));
        assert_eq!(session.released_ids(), vec![subject]);
        assert_eq!(session.mode(), SessionMode::ReadWrite);
    }

    #[tokio::test]
    async fn test_missing_subject_value_still_searches() {
        let fx = Fixture::new();
        let subject = rid(1);
        fx.repo.insert_record(CandidateRecord::new(subject));
        let short = fx.record(2, "ab");
        fx.authz.grant_public_read(short);

        let session = fx.repo.session();
        let results = fx
            .detector()
            .find_readable_duplicates(&session, &Actor::Anonymous, &subject, DetectionRequest::new())
            .await
            .unwrap();

        assert_eq!(fx.repo.search_count(), 1);
        assert_eq!(results.sample, "");
        assert_eq!(results.record_ids(), vec![short]);
    }

    #[tokio::test]
    async fn test_request_overrides_config() {
        let fx = Fixture::new();
        fx.config.set(EDIT_DISTANCE_KEY, "0");
        fx.config.set(MAXIMUM_DUPLICATES_KEY, "1");
        let subject = fx.record(1, "Alpha");
        for n in 2..=4 {
            let id = fx.record(n, "Alphx");
            fx.authz.grant_public_read(id);
        }

        let session = fx.repo.session();
        let detector = fx.detector();
        let strict = detector
            .find_readable_duplicates(&session, &Actor::Anonymous, &subject, DetectionRequest::new())
            .await
            .unwrap();
        assert!(strict.is_empty());

        let relaxed = detector
            .find_readable_duplicates(
                &session,
                &Actor::Anonymous,
                &subject,
                DetectionRequest::new()
                    .with_max_distance(1)
                    .with_cap(ResultCap::from_config(2)),
            )
            .await
            .unwrap();
        assert_eq!(relaxed.len(), 2);
        assert!(relaxed.stats.cap_reached);
    }

    #[tokio::test]
    async fn test_unknown_field_fails_and_restores_mode() {
        let fx = Fixture::new();
        fx.config.set(FIELD_KEY, "dc.subject");
        let subject = fx.record(1, "Alpha");

        let session = fx.repo.session();
        session.set_mode(SessionMode::BatchEdit);
        let err = fx
            .detector()
            .find_readable_duplicates(&session, &Actor::Anonymous, &subject, DetectionRequest::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DuplicationError::FieldNotFound { .. }));
        assert_eq!(session.mode(), SessionMode::BatchEdit);
        assert_eq!(fx.metrics.get_labeled(SCANS_METRIC, "error"), 1);
    }

    #[tokio::test]
    async fn test_metrics_per_candidate() {
        let fx = Fixture::new();
        let subject = fx.record(1, "Beta");
        let visible = fx.record(2, "Beta");
        fx.record(3, "Beta");
        fx.authz.grant_public_read(visible);

        let session = fx.repo.session();
        fx.detector()
            .find_readable_duplicates(&session, &Actor::Anonymous, &subject, DetectionRequest::new())
            .await
            .unwrap();

        assert_eq!(fx.metrics.get_count(CANDIDATES_METRIC), 3);
        assert_eq!(fx.metrics.get_labeled(CANDIDATES_METRIC, Classification::Readable.label()), 1);
        assert_eq!(fx.metrics.get_labeled(SCANS_METRIC, "ok"), 1);
    }

    #[tokio::test]
    async fn test_find_all_duplicates_is_unfiltered() {
        let fx = Fixture::new();
        fx.record(1, "Gamma");
        fx.record(2, "Gamma");
        fx.repo.insert_record(CandidateRecord::new(rid(3)).with_withdrawn(true));
        fx.repo.set_value(rid(3), &fx.title, "Gamma");

        let session = fx.repo.session();
        let detector = fx.detector();
        let field = detector.metadata_field(&session).await.unwrap();
        let mut cursor = detector.find_all_duplicates(&session, &field, "Gamma", 0).await.unwrap();

        let mut seen = Vec::new();
        while let Some(record) = cursor.next_candidate().await.unwrap() {
            seen.push(record.id);
        }
        assert_eq!(seen, vec![rid(1), rid(2), rid(3)]);
    }

    #[tokio::test]
    async fn test_survey_labels_and_releases() {
        let fx = Fixture::new();
        fx.record(1, "Delta");
        fx.record(2, "Delta");
        fx.repo.set_in_progress(rid(2), 4);
        fx.record(3, "Delta");

        let session = fx.repo.session();
        let entries = fx
            .detector()
            .survey_duplicates(&session, "dc.title", "Delta", 0, Some(2))
            .await
            .unwrap();

        let kinds: Vec<_> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![CandidateKind::Archived, CandidateKind::InProgress]);
        assert_eq!(session.released_ids(), vec![rid(1), rid(2)]);
        assert_eq!(fx.repo.delivered_count(), 2);
    }
}
