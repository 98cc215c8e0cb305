//! Record and actor types for duplicate detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a record in the repository.
///
/// Wraps a UUID and implements `Ord` for deterministic ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new RecordId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Create a new RecordId from a UUID string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Generate a new random RecordId.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RecordId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier of a collection that owns records and review workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionId(pub Uuid);

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a version lineage group (all revisions of one logical work).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineageGroupId(pub i64);

/// Reference to an in-progress submission wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionRef {
    /// Submission wrapper identifier.
    pub id: i64,
    /// Record wrapped by the submission.
    pub record: RecordId,
}

/// Identifier of a person acting against the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(pub Uuid);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The actor on whose behalf duplicates are disclosed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Actor {
    /// Unauthenticated caller.
    Anonymous,
    /// Authenticated user.
    User(ActorId),
}

impl Actor {
    /// Get the user ID, if authenticated.
    pub fn id(&self) -> Option<ActorId> {
        match self {
            Self::Anonymous => None,
            Self::User(id) => Some(*id),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::User(id) => write!(f, "{}", id),
        }
    }
}

/// Projected state of a candidate record.
///
/// This is a transient view; the store owns the record. Holders must
/// signal the store when they are done with a view they will not keep
/// (see [`crate::store::CandidateLease`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Record identifier.
    pub id: RecordId,
    /// Whether the record has been withdrawn.
    pub withdrawn: bool,
    /// Whether the record shows up in discovery (false = private).
    pub discoverable: bool,
    /// Collection owning the record, if any.
    pub owning_collection: Option<CollectionId>,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
}

impl CandidateRecord {
    /// Create a published, discoverable record.
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            withdrawn: false,
            discoverable: true,
            owning_collection: None,
            last_modified: None,
        }
    }

    /// Set the withdrawn flag.
    pub fn with_withdrawn(mut self, withdrawn: bool) -> Self {
        self.withdrawn = withdrawn;
        self
    }

    /// Set the discoverable flag.
    pub fn with_discoverable(mut self, discoverable: bool) -> Self {
        self.discoverable = discoverable;
        self
    }

    /// Set the owning collection.
    pub fn with_collection(mut self, collection: CollectionId) -> Self {
        self.owning_collection = Some(collection);
        self
    }

    /// Set the last modification time.
    pub fn with_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = Some(at);
        self
    }
}
