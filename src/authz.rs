//! Authorization oracle consumed by the classifier.
//!
//! The classifier only asks yes/no questions. Any error is treated as
//! "do not disclose" by the caller.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::AuthorizationError;
use crate::types::{Actor, ActorId, CandidateRecord, CollectionId, RecordId, ReviewPermission, WorkflowRef};

/// Yes/no authorization decisions.
#[async_trait]
pub trait AuthorizationOracle: Send + Sync {
    /// Whether `actor` administers `record` directly.
    async fn is_admin(&self, actor: &Actor, record: &CandidateRecord) -> Result<bool, AuthorizationError>;

    /// Whether `actor` holds `permission` for the workflow's collection.
    async fn can_act_on_stage(
        &self,
        actor: &Actor,
        workflow: &WorkflowRef,
        permission: ReviewPermission,
    ) -> Result<bool, AuthorizationError>;

    /// Whether `actor` may read `record`.
    async fn can_read(&self, actor: &Actor, record: &CandidateRecord) -> Result<bool, AuthorizationError>;
}

#[derive(Debug, Default)]
struct Grants {
    site_admins: BTreeSet<ActorId>,
    record_admins: BTreeSet<(ActorId, RecordId)>,
    collection_admins: BTreeSet<(ActorId, CollectionId)>,
    reviewers: BTreeMap<(ActorId, CollectionId), BTreeSet<ReviewPermission>>,
    readers: BTreeSet<(ActorId, RecordId)>,
    public_read: BTreeSet<RecordId>,
    unavailable: bool,
}

/// Table-driven oracle for tests and embedded use.
///
/// Resolution mirrors a repository ACL: site administrators administer
/// everything, collection administrators administer the collection's
/// records, and administrators may always read.
#[derive(Debug, Default)]
pub struct StaticAuthorization {
    grants: RwLock<Grants>,
}

impl StaticAuthorization {
    /// Create an oracle with no grants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `actor` a site administrator.
    pub fn grant_site_admin(&self, actor: ActorId) -> &Self {
        self.grants.write().site_admins.insert(actor);
        self
    }

    /// Make `actor` administrator of one record.
    pub fn grant_record_admin(&self, actor: ActorId, record: RecordId) -> &Self {
        self.grants.write().record_admins.insert((actor, record));
        self
    }

    /// Make `actor` administrator of a collection.
    pub fn grant_collection_admin(&self, actor: ActorId, collection: CollectionId) -> &Self {
        self.grants.write().collection_admins.insert((actor, collection));
        self
    }

    /// Give `actor` a review permission on a collection.
    pub fn grant_review(&self, actor: ActorId, collection: CollectionId, permission: ReviewPermission) -> &Self {
        self.grants
            .write()
            .reviewers
            .entry((actor, collection))
            .or_default()
            .insert(permission);
        self
    }

    /// Let `actor` read one record.
    pub fn grant_read(&self, actor: ActorId, record: RecordId) -> &Self {
        self.grants.write().readers.insert((actor, record));
        self
    }

    /// Let everyone, including anonymous callers, read one record.
    pub fn grant_public_read(&self, record: RecordId) -> &Self {
        self.grants.write().public_read.insert(record);
        self
    }

    /// Simulate an outage of the policy backend.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.grants.write().unavailable = unavailable;
    }

    fn check_available(grants: &Grants) -> Result<(), AuthorizationError> {
        if grants.unavailable {
            return Err(AuthorizationError("policy backend unavailable".to_string()));
        }
        Ok(())
    }

    fn administers(grants: &Grants, actor: ActorId, record: &CandidateRecord) -> bool {
        grants.site_admins.contains(&actor)
            || grants.record_admins.contains(&(actor, record.id))
            || record
                .owning_collection
                .is_some_and(|c| grants.collection_admins.contains(&(actor, c)))
    }
}

#[async_trait]
impl AuthorizationOracle for StaticAuthorization {
    async fn is_admin(&self, actor: &Actor, record: &CandidateRecord) -> Result<bool, AuthorizationError> {
        let grants = self.grants.read();
        Self::check_available(&grants)?;
        Ok(actor.id().is_some_and(|a| Self::administers(&grants, a, record)))
    }

    async fn can_act_on_stage(
        &self,
        actor: &Actor,
        workflow: &WorkflowRef,
        permission: ReviewPermission,
    ) -> Result<bool, AuthorizationError> {
        let grants = self.grants.read();
        Self::check_available(&grants)?;
        let Some(actor) = actor.id() else {
            return Ok(false);
        };
        if grants.site_admins.contains(&actor) {
            return Ok(true);
        }
        Ok(grants
            .reviewers
            .get(&(actor, workflow.collection))
            .is_some_and(|perms| perms.contains(&permission)))
    }

    async fn can_read(&self, actor: &Actor, record: &CandidateRecord) -> Result<bool, AuthorizationError> {
        let grants = self.grants.read();
        Self::check_available(&grants)?;
        if grants.public_read.contains(&record.id) {
            return Ok(true);
        }
        Ok(actor.id().is_some_and(|a| {
            grants.readers.contains(&(a, record.id)) || Self::administers(&grants, a, record)
        }))
    }
}
