//! End-to-end tests for the duplicate detection pipeline.
//!
//! These run the detector against the in-memory repository and check the
//! visibility rules, the cap and the session discipline together.

use std::sync::Arc;

use duplication_kernel::policy::config::{EDIT_DISTANCE_KEY, FIELD_KEY, MAXIMUM_DUPLICATES_KEY};
use duplication_kernel::{
    Actor, ActorId, CandidateRecord, Classification, CollectionId, DetectionRequest,
    DuplicationDetector, DuplicationError, FieldHandle, FieldSelector, InMemoryRepository,
    LineageGroupId, RecordId, RejectReason, RepositorySession, ResultCap, ReviewPermission,
    ReviewStage, SessionMode, StaticAuthorization, StaticConfigSource, WorkflowRef,
};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn rid(n: u128) -> RecordId {
    RecordId::new(Uuid::from_u128(n))
}

fn user(n: u128) -> ActorId {
    ActorId(Uuid::from_u128(1_000 + n))
}

fn collection() -> CollectionId {
    CollectionId(Uuid::from_u128(77))
}

struct World {
    repo: InMemoryRepository,
    title: FieldHandle,
    authz: Arc<StaticAuthorization>,
    config: Arc<StaticConfigSource>,
}

impl World {
    fn new() -> Self {
        let repo = InMemoryRepository::new();
        let title = repo.add_field(FieldSelector::default());
        Self {
            repo,
            title,
            authz: Arc::new(StaticAuthorization::new()),
            config: Arc::new(StaticConfigSource::new()),
        }
    }

    fn add(&self, record: CandidateRecord, title: &str) -> RecordId {
        let id = record.id;
        self.repo.insert_record(record.with_collection(collection()));
        self.repo.set_value(id, &self.title, title);
        id
    }

    fn titled(&self, n: u128, title: &str) -> RecordId {
        self.add(CandidateRecord::new(rid(n)), title)
    }

    fn detector(&self) -> DuplicationDetector<StaticAuthorization, StaticConfigSource> {
        DuplicationDetector::new(Arc::clone(&self.authz), Arc::clone(&self.config))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_withdrawn_near_match_is_hidden() {
    let world = World::new();
    world.config.set(EDIT_DISTANCE_KEY, "3");
    let alice = user(1);

    let subject = world.titled(1, "Deep Learning for Robotics");
    let robots = world.titled(2, "Deep Learning for Robots");
    let withdrawn = world.add(
        CandidateRecord::new(rid(3)).with_withdrawn(true),
        "Deep Learnin for Robotics",
    );
    world.titled(4, "Completely Unrelated");
    world.authz.grant_read(alice, robots);
    world.authz.grant_read(alice, withdrawn);

    let session = world.repo.session();
    let results = world
        .detector()
        .find_readable_duplicates(&session, &Actor::User(alice), &subject, DetectionRequest::new())
        .await
        .unwrap();

    assert_eq!(results.record_ids(), vec![robots]);
    assert_eq!(results.entries()[0].classification, Classification::Readable);
    assert_eq!(
        results.stats.rejected_by_reason.get(&RejectReason::WithdrawnNotAdmin),
        Some(&1)
    );
    // Subject, robots and the withdrawn twin; the unrelated title never arrives.
    assert_eq!(results.stats.inspected, 3);
    assert!(session.released_ids().contains(&withdrawn));
}

#[tokio::test]
async fn test_admin_cannot_see_in_progress_submission() {
    let world = World::new();
    let admin = user(1);
    let subject = world.titled(1, "Soil Carbon Survey");
    let draft = world.titled(2, "Soil Carbon Surveys");
    world.repo.set_in_progress(draft, 42);
    world.authz.grant_record_admin(admin, draft);

    let session = world.repo.session();
    let results = world
        .detector()
        .find_readable_duplicates(&session, &Actor::User(admin), &subject, DetectionRequest::new())
        .await
        .unwrap();

    assert!(results.is_empty());
    assert_eq!(
        results.stats.rejected_by_reason.get(&RejectReason::InProgressSubmission),
        Some(&1)
    );
}

#[tokio::test]
async fn test_cap_stops_pulling_candidates() {
    let world = World::new();
    world.config.set(MAXIMUM_DUPLICATES_KEY, "2");
    let subject = rid(100);
    world.repo.insert_record(CandidateRecord::new(subject));
    let x = world.titled(1, "Tidal Energy");
    let y = world.titled(2, "Tidal Energy");
    world.titled(3, "Tidal Energy");
    for id in [rid(1), rid(2), rid(3)] {
        world.authz.grant_public_read(id);
    }

    let session = world.repo.session();
    let results = world
        .detector()
        .find_readable_duplicates(
            &session,
            &Actor::Anonymous,
            &subject,
            DetectionRequest::new().with_sample("Tidal Energy"),
        )
        .await
        .unwrap();

    assert_eq!(results.record_ids(), vec![x, y]);
    assert!(results.stats.cap_reached);
    assert_eq!(world.repo.delivered_count(), 2);
}

#[tokio::test]
async fn test_unbounded_cap_returns_everything_visible() {
    let world = World::new();
    world.config.set(MAXIMUM_DUPLICATES_KEY, "0");
    let subject = world.titled(1, "Coral Reefs");
    for n in 2..=15 {
        let id = world.titled(n, "Coral Reef");
        world.authz.grant_public_read(id);
    }

    let session = world.repo.session();
    let results = world
        .detector()
        .find_readable_duplicates(&session, &Actor::Anonymous, &subject, DetectionRequest::new())
        .await
        .unwrap();

    assert_eq!(results.cap, ResultCap::Unbounded);
    assert_eq!(results.len(), 14);
    assert!(!results.stats.cap_reached);
}

#[tokio::test]
async fn test_subject_and_its_versions_are_excluded_for_admins() {
    let world = World::new();
    let admin = user(1);
    world.authz.grant_site_admin(admin);

    let subject = world.titled(1, "Arctic Sea Ice");
    let older = world.titled(2, "Arctic Sea Ice");
    let other = world.titled(3, "Arctic Sea Ice");
    world.repo.set_lineage(subject, LineageGroupId(9));
    world.repo.set_lineage(older, LineageGroupId(9));
    world.repo.set_lineage(other, LineageGroupId(10));

    let session = world.repo.session();
    let results = world
        .detector()
        .find_readable_duplicates(&session, &Actor::User(admin), &subject, DetectionRequest::new())
        .await
        .unwrap();

    assert_eq!(results.record_ids(), vec![other]);
    assert_eq!(results.entries()[0].classification, Classification::AdminVisible);
    assert_eq!(session.released_ids(), vec![subject, older]);
}

#[tokio::test]
async fn test_versions_are_ordinary_when_versioning_is_off() {
    let world = World::new();
    let reader = user(1);
    let subject = world.titled(1, "Urban Heat");
    let older = world.titled(2, "Urban Heat");
    world.repo.set_lineage(subject, LineageGroupId(1));
    world.repo.set_lineage(older, LineageGroupId(1));
    world.repo.set_versioning_enabled(false);
    world.authz.grant_read(reader, older);

    let session = world.repo.session();
    let results = world
        .detector()
        .find_readable_duplicates(&session, &Actor::User(reader), &subject, DetectionRequest::new())
        .await
        .unwrap();

    assert_eq!(results.record_ids(), vec![older]);
}

#[tokio::test]
async fn test_unknown_workflow_hidden_from_full_reviewer() {
    let world = World::new();
    let reviewer = user(1);
    let subject = world.titled(1, "Bee Decline");
    let pending = world.titled(2, "Bee Declines");
    world
        .repo
        .set_workflow(WorkflowRef::unrecognized(5, pending, collection(), "xmlworkflow"));
    for permission in [
        ReviewPermission::ReviewStep1,
        ReviewPermission::ReviewStep2,
        ReviewPermission::ReviewStep3,
    ] {
        world.authz.grant_review(reviewer, collection(), permission);
    }
    world.authz.grant_read(reviewer, pending);

    let session = world.repo.session();
    let results = world
        .detector()
        .find_readable_duplicates(&session, &Actor::User(reviewer), &subject, DetectionRequest::new())
        .await
        .unwrap();

    assert!(results.is_empty());
    assert_eq!(
        results.stats.rejected_by_reason.get(&RejectReason::UnknownWorkflowKind),
        Some(&1)
    );
}

#[tokio::test]
async fn test_reviewer_sees_item_at_their_stage_only() {
    let world = World::new();
    let reviewer = user(1);
    let subject = world.titled(1, "Wetland Birds");
    let at_step2 = world.titled(2, "Wetland Bird");
    let at_step3 = world.titled(3, "Wetland Birdz");
    world
        .repo
        .set_workflow(WorkflowRef::basic(1, at_step2, collection(), ReviewStage::Step2Pool));
    world
        .repo
        .set_workflow(WorkflowRef::basic(2, at_step3, collection(), ReviewStage::Step3));
    world
        .authz
        .grant_review(reviewer, collection(), ReviewPermission::ReviewStep2);

    let session = world.repo.session();
    let results = world
        .detector()
        .find_readable_duplicates(&session, &Actor::User(reviewer), &subject, DetectionRequest::new())
        .await
        .unwrap();

    assert_eq!(results.record_ids(), vec![at_step2]);
    assert_eq!(results.entries()[0].classification, Classification::Reviewable);
    assert_eq!(
        results.stats.rejected_by_reason.get(&RejectReason::NotReviewableStage),
        Some(&1)
    );
}

#[tokio::test]
async fn test_authorization_outage_discloses_nothing() {
    let world = World::new();
    let admin = user(1);
    world.authz.grant_site_admin(admin);
    let subject = world.titled(1, "Glacier Retreat");
    world.titled(2, "Glacier Retreats");
    world.authz.set_unavailable(true);

    let session = world.repo.session();
    let results = world
        .detector()
        .find_readable_duplicates(&session, &Actor::User(admin), &subject, DetectionRequest::new())
        .await
        .unwrap();

    assert!(results.is_empty());
    assert_eq!(
        results.stats.rejected_by_reason.get(&RejectReason::AuthorizationUnavailable),
        Some(&1)
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure and session discipline
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_store_failure_aborts_without_partial_results() {
    let world = World::new();
    let subject = world.titled(1, "Kelp Forests");
    for n in 2..=4 {
        let id = world.titled(n, "Kelp Forest");
        world.authz.grant_public_read(id);
    }
    world.repo.fail_search_after(Some(2));

    let session = world.repo.session();
    let err = world
        .detector()
        .find_readable_duplicates(&session, &Actor::Anonymous, &subject, DetectionRequest::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DuplicationError::TransientStore(_)));
    assert!(err.is_transient());
    assert_eq!(session.mode(), SessionMode::ReadWrite);
}

#[tokio::test]
async fn test_lookup_failure_mid_classification_aborts_and_releases() {
    let world = World::new();
    let subject = world.titled(1, "Salt Marshes");
    let readable = world.titled(2, "Salt Marsh");
    let broken = world.titled(3, "Salt Marsh");
    world.authz.grant_public_read(readable);
    world.authz.grant_public_read(broken);
    world.repo.fail_lookups_for(broken);

    let session = world.repo.session();
    session.set_mode(SessionMode::BatchEdit);
    let err = world
        .detector()
        .find_readable_duplicates(&session, &Actor::Anonymous, &subject, DetectionRequest::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DuplicationError::TransientStore(_)));
    assert!(session.released_ids().contains(&broken));
    assert!(!session.released_ids().contains(&readable));
    assert_eq!(session.mode(), SessionMode::BatchEdit);
}

#[tokio::test]
async fn test_subject_value_lookup_failure_aborts_before_search() {
    let world = World::new();
    let subject = world.titled(1, "Tundra Fires");
    world.repo.fail_lookups_for(subject);

    let session = world.repo.session();
    let err = world
        .detector()
        .find_readable_duplicates(&session, &Actor::Anonymous, &subject, DetectionRequest::new())
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert_eq!(world.repo.search_count(), 0);
    assert_eq!(session.mode(), SessionMode::ReadWrite);
}

#[tokio::test]
async fn test_prior_mode_is_restored() {
    let world = World::new();
    let subject = world.titled(1, "Peatlands");

    let session = world.repo.session();
    for mode in [SessionMode::ReadWrite, SessionMode::ReadOnly, SessionMode::BatchEdit] {
        session.set_mode(mode);
        world
            .detector()
            .find_readable_duplicates(&session, &Actor::Anonymous, &subject, DetectionRequest::new())
            .await
            .unwrap();
        assert_eq!(session.mode(), mode);
    }
}

#[tokio::test]
async fn test_scan_sees_snapshot_from_its_start() {
    let world = World::new();
    let subject = world.titled(1, "Mangroves");
    let early = world.titled(2, "Mangrove");
    world.authz.grant_public_read(early);
    world.authz.grant_public_read(rid(3));

    let session = world.repo.session();
    let detector = world.detector();

    // Pin a snapshot, then write behind it.
    session.set_mode(SessionMode::ReadOnly);
    world.titled(3, "Mangrove");

    let results = detector
        .find_readable_duplicates(&session, &Actor::Anonymous, &subject, DetectionRequest::new())
        .await
        .unwrap();
    assert_eq!(results.record_ids(), vec![early]);

    session.set_mode(SessionMode::ReadWrite);
    let results = detector
        .find_readable_duplicates(&session, &Actor::Anonymous, &subject, DetectionRequest::new())
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn test_concurrent_invocations_do_not_interfere() {
    let world = Arc::new(World::new());
    let subject = world.titled(1, "Seagrass");
    let twin = world.titled(2, "Seagrass");
    world.authz.grant_public_read(twin);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let world = Arc::clone(&world);
        handles.push(tokio::spawn(async move {
            let session = world.repo.session();
            let results = world
                .detector()
                .find_readable_duplicates(&session, &Actor::Anonymous, &subject, DetectionRequest::new())
                .await
                .unwrap();
            (results.membership_fingerprint(), session.mode())
        }));
    }

    let mut fingerprints = Vec::new();
    for handle in handles {
        let (fingerprint, mode) = handle.await.unwrap();
        assert_eq!(mode, SessionMode::ReadWrite);
        fingerprints.push(fingerprint);
    }
    fingerprints.dedup();
    assert_eq!(fingerprints.len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_live_reconfiguration_of_field() {
    let world = World::new();
    let alt = world
        .repo
        .add_field(FieldSelector::parse("dc.title.alternative").unwrap());
    let subject = world.titled(1, "River Deltas");
    let other = world.titled(2, "Something Different Here");
    world.repo.set_value(subject, &alt, "Deltas");
    world.repo.set_value(other, &alt, "Deltas");
    world.authz.grant_public_read(other);

    let session = world.repo.session();
    let detector = world.detector();

    let by_title = detector
        .find_readable_duplicates(&session, &Actor::Anonymous, &subject, DetectionRequest::new())
        .await
        .unwrap();
    assert!(by_title.is_empty());

    world.config.set(FIELD_KEY, "dc.title.alternative");
    let by_alt = detector
        .find_readable_duplicates(&session, &Actor::Anonymous, &subject, DetectionRequest::new())
        .await
        .unwrap();
    assert_eq!(by_alt.record_ids(), vec![other]);
    assert_eq!(by_alt.field, alt);
}

#[tokio::test]
async fn test_huge_configured_cap_is_accepted() {
    let world = World::new();
    world.config.set(MAXIMUM_DUPLICATES_KEY, "1000000000000000000");
    let subject = world.titled(1, "Sea Level Rise");
    let twin = world.titled(2, "Sea Level Rises");
    world.authz.grant_public_read(twin);

    let session = world.repo.session();
    let results = world
        .detector()
        .find_readable_duplicates(&session, &Actor::Anonymous, &subject, DetectionRequest::new())
        .await
        .unwrap();

    assert_eq!(results.cap.limit(), Some(1_000_000_000_000_000_000));
    assert_eq!(results.record_ids(), vec![twin]);
    assert!(!results.stats.cap_reached);
}

#[tokio::test]
async fn test_malformed_field_config_is_invalid_selector() {
    let world = World::new();
    world.config.set(FIELD_KEY, "dc.title.alternative.extra");
    let subject = world.titled(1, "Dunes");

    let session = world.repo.session();
    let err = world
        .detector()
        .find_readable_duplicates(&session, &Actor::Anonymous, &subject, DetectionRequest::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DuplicationError::InvalidSelector { .. }));
    assert_eq!(world.repo.search_count(), 0);
}

#[tokio::test]
async fn test_repeated_scans_are_idempotent() {
    let world = World::new();
    let reader = user(1);
    let subject = world.titled(1, "Permafrost Thaw");
    for n in 2..=6 {
        let id = world.titled(n, "Permafrost Thaws");
        if n % 2 == 0 {
            world.authz.grant_read(reader, id);
        }
    }

    let detector = world.detector();
    let first = detector
        .find_readable_duplicates(&world.repo.session(), &Actor::User(reader), &subject, DetectionRequest::new())
        .await
        .unwrap();
    let second = detector
        .find_readable_duplicates(&world.repo.session(), &Actor::User(reader), &subject, DetectionRequest::new())
        .await
        .unwrap();

    assert_eq!(first.len(), 3);
    assert_eq!(first.membership_fingerprint(), second.membership_fingerprint());
}
