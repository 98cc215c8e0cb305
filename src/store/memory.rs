//! In-memory repository for testing and embedding.
//!
//! Record state lives behind an `Arc` that writers replace copy-on-write,
//! so a session in [`SessionMode::ReadOnly`] keeps reading the snapshot
//! it pinned while other writers move on.

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{CandidateCursor, RepositorySession, SessionMode};
use crate::types::{
    CandidateRecord, FieldHandle, FieldId, FieldSelector, LineageGroupId, RecordId,
    SubmissionRef, WorkflowRef,
};

/// Entities a session keeps cached before evicting the least recent.
const SESSION_CACHE_ENTRIES: usize = 1_000;

/// Error type for in-memory store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryError {
    /// Simulated backend outage.
    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Default)]
struct RepositoryState {
    records: BTreeMap<RecordId, CandidateRecord>,
    fields: BTreeMap<FieldId, FieldHandle>,
    values: BTreeMap<(RecordId, FieldId), Vec<String>>,
    lineage: BTreeMap<RecordId, LineageGroupId>,
    submissions: BTreeMap<RecordId, SubmissionRef>,
    workflows: BTreeMap<RecordId, WorkflowRef>,
}

#[derive(Debug, Default)]
struct Shared {
    state: RwLock<Arc<RepositoryState>>,
    versioning_disabled: AtomicBool,
    delivered: AtomicUsize,
    searches: AtomicUsize,
    fail_search_after: Mutex<Option<usize>>,
    failing_lookups: Mutex<BTreeSet<RecordId>>,
}

/// In-memory repository.
///
/// Cheap to clone; clones share state. Uses BTreeMap for deterministic
/// iteration order, so searches deliver candidates in `RecordId` order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    shared: Arc<Shared>,
}

impl InMemoryRepository {
    /// Create a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self, f: impl FnOnce(&mut RepositoryState)) {
        let mut guard = self.shared.state.write();
        f(Arc::make_mut(&mut guard));
    }

    /// Open a session with its own view mode and entity cache.
    pub fn session(&self) -> InMemorySession {
        InMemorySession::new(Arc::clone(&self.shared))
    }

    /// Register a field in the catalog and return its handle.
    pub fn add_field(&self, selector: FieldSelector) -> FieldHandle {
        let mut guard = self.shared.state.write();
        let state = Arc::make_mut(&mut guard);
        let next = state.fields.keys().next_back().map_or(1, |id| id.0 + 1);
        let handle = FieldHandle::new(FieldId(next), selector);
        state.fields.insert(handle.id, handle.clone());
        handle
    }

    /// Add or replace a record.
    pub fn insert_record(&self, record: CandidateRecord) {
        self.write(|state| {
            state.records.insert(record.id, record);
        });
    }

    /// Remove a record and everything attached to it.
    pub fn remove_record(&self, id: &RecordId) {
        self.write(|state| {
            state.records.remove(id);
            state.values.retain(|(rid, _), _| rid != id);
            state.lineage.remove(id);
            state.submissions.remove(id);
            state.workflows.remove(id);
        });
    }

    /// Append a value to a record's field.
    pub fn add_value(&self, id: RecordId, field: &FieldHandle, value: impl Into<String>) {
        let value = value.into();
        self.write(|state| {
            state.values.entry((id, field.id)).or_default().push(value);
        });
    }

    /// Replace all values of a record's field.
    pub fn set_value(&self, id: RecordId, field: &FieldHandle, value: impl Into<String>) {
        let value = value.into();
        self.write(|state| {
            state.values.insert((id, field.id), vec![value]);
        });
    }

    /// Place a record in a version lineage group.
    pub fn set_lineage(&self, id: RecordId, group: LineageGroupId) {
        self.write(|state| {
            state.lineage.insert(id, group);
        });
    }

    /// Mark a record as part of an in-progress submission.
    pub fn set_in_progress(&self, id: RecordId, submission_id: i64) {
        self.write(|state| {
            state.submissions.insert(id, SubmissionRef { id: submission_id, record: id });
        });
    }

    /// Put a record into a review workflow.
    pub fn set_workflow(&self, workflow: WorkflowRef) {
        self.write(|state| {
            state.workflows.insert(workflow.record, workflow);
        });
    }

    /// Enable or disable version lineage tracking.
    pub fn set_versioning_enabled(&self, enabled: bool) {
        self.shared.versioning_disabled.store(!enabled, Ordering::SeqCst);
    }

    /// Make every search fail after delivering `n` candidates (`None` heals).
    pub fn fail_search_after(&self, n: Option<usize>) {
        *self.shared.fail_search_after.lock() = n;
    }

    /// Make value, lineage, submission and workflow lookups for `id` fail.
    pub fn fail_lookups_for(&self, id: RecordId) {
        self.shared.failing_lookups.lock().insert(id);
    }

    /// Stop failing lookups injected with [`fail_lookups_for`](Self::fail_lookups_for).
    pub fn heal_lookups(&self) {
        self.shared.failing_lookups.lock().clear();
    }

    /// Total candidates delivered by all cursors.
    pub fn delivered_count(&self) -> usize {
        self.shared.delivered.load(Ordering::SeqCst)
    }

    /// Total searches started.
    pub fn search_count(&self) -> usize {
        self.shared.searches.load(Ordering::SeqCst)
    }

    /// Number of records.
    pub fn num_records(&self) -> usize {
        self.shared.state.read().records.len()
    }
}

#[derive(Debug, Default)]
struct SessionView {
    mode: SessionMode,
    pinned: Option<Arc<RepositoryState>>,
}

type EntityCache = Arc<Mutex<LruCache<RecordId, CandidateRecord>>>;

/// One caller's view of an [`InMemoryRepository`].
#[derive(Debug)]
pub struct InMemorySession {
    shared: Arc<Shared>,
    view: Mutex<SessionView>,
    cache: EntityCache,
    released: Mutex<Vec<RecordId>>,
}

impl InMemorySession {
    fn new(shared: Arc<Shared>) -> Self {
        let capacity = NonZeroUsize::new(SESSION_CACHE_ENTRIES).unwrap_or(NonZeroUsize::MIN);
        Self {
            shared,
            view: Mutex::new(SessionView::default()),
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
            released: Mutex::new(Vec::new()),
        }
    }

    /// State visible to this session: the pinned snapshot in read-only
    /// mode, otherwise the live state.
    fn state(&self) -> Arc<RepositoryState> {
        match &self.view.lock().pinned {
            Some(pinned) => Arc::clone(pinned),
            None => Arc::clone(&self.shared.state.read()),
        }
    }

    fn check_lookup(&self, id: &RecordId) -> Result<(), InMemoryError> {
        if self.shared.failing_lookups.lock().contains(id) {
            return Err(InMemoryError::Unavailable(format!("lookup for {id} failed")));
        }
        Ok(())
    }

    fn cache_record(&self, record: &CandidateRecord) {
        self.cache.lock().put(record.id, record.clone());
    }

    /// Records released so far, in release order.
    pub fn released_ids(&self) -> Vec<RecordId> {
        self.released.lock().clone()
    }

    /// Number of cached entities.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Whether a record is cached.
    pub fn is_cached(&self, id: &RecordId) -> bool {
        self.cache.lock().contains(id)
    }
}

#[async_trait]
impl RepositorySession for InMemorySession {
    type Error = InMemoryError;
    type Cursor = InMemoryCursor;

    fn mode(&self) -> SessionMode {
        self.view.lock().mode
    }

    fn set_mode(&self, mode: SessionMode) {
        let mut view = self.view.lock();
        view.pinned = match mode {
            SessionMode::ReadOnly => view
                .pinned
                .take()
                .or_else(|| Some(Arc::clone(&self.shared.state.read()))),
            SessionMode::ReadWrite | SessionMode::BatchEdit => None,
        };
        view.mode = mode;
    }

    fn release(&self, id: &RecordId) {
        self.cache.lock().pop(id);
        self.released.lock().push(*id);
    }

    fn versioning_enabled(&self) -> bool {
        !self.shared.versioning_disabled.load(Ordering::SeqCst)
    }

    async fn find_field(
        &self,
        schema: &str,
        element: &str,
        qualifier: Option<&str>,
    ) -> Result<Option<FieldHandle>, Self::Error> {
        Ok(self
            .state()
            .fields
            .values()
            .find(|f| f.schema == schema && f.element == element && f.qualifier.as_deref() == qualifier)
            .cloned())
    }

    async fn first_value(
        &self,
        record: &RecordId,
        field: &FieldHandle,
    ) -> Result<Option<String>, Self::Error> {
        self.check_lookup(record)?;
        Ok(self
            .state()
            .values
            .get(&(*record, field.id))
            .and_then(|values| values.first().cloned()))
    }

    async fn get_record(&self, id: &RecordId) -> Result<Option<CandidateRecord>, Self::Error> {
        let record = self.state().records.get(id).cloned();
        if let Some(record) = &record {
            self.cache_record(record);
        }
        Ok(record)
    }

    async fn search(
        &self,
        field: &FieldHandle,
        sample: &str,
        max_distance: u32,
    ) -> Result<Self::Cursor, Self::Error> {
        self.shared.searches.fetch_add(1, Ordering::SeqCst);
        Ok(InMemoryCursor {
            state: self.state(),
            shared: Arc::clone(&self.shared),
            cache: Arc::clone(&self.cache),
            field: field.id,
            sample: sample.to_string(),
            max_distance: max_distance as usize,
            last: None,
            delivered: 0,
            fail_after: *self.shared.fail_search_after.lock(),
        })
    }

    async fn version_lineage(&self, id: &RecordId) -> Result<Option<LineageGroupId>, Self::Error> {
        self.check_lookup(id)?;
        Ok(self.state().lineage.get(id).copied())
    }

    async fn in_progress_submission(&self, id: &RecordId) -> Result<Option<SubmissionRef>, Self::Error> {
        self.check_lookup(id)?;
        Ok(self.state().submissions.get(id).copied())
    }

    async fn review_workflow(&self, id: &RecordId) -> Result<Option<WorkflowRef>, Self::Error> {
        self.check_lookup(id)?;
        Ok(self.state().workflows.get(id).cloned())
    }
}

/// Lazy Levenshtein scan over an in-memory snapshot.
///
/// Walks records in `RecordId` order, resuming after the last one it
/// looked at, and computes distances only as candidates are pulled.
#[derive(Debug)]
pub struct InMemoryCursor {
    state: Arc<RepositoryState>,
    shared: Arc<Shared>,
    cache: EntityCache,
    field: FieldId,
    sample: String,
    max_distance: usize,
    last: Option<RecordId>,
    delivered: usize,
    fail_after: Option<usize>,
}

impl InMemoryCursor {
    fn matches(&self, state: &RepositoryState, id: &RecordId) -> bool {
        state.values.get(&(*id, self.field)).is_some_and(|values| {
            values
                .iter()
                .any(|v| strsim::levenshtein(v, &self.sample) <= self.max_distance)
        })
    }
}

#[async_trait]
impl CandidateCursor for InMemoryCursor {
    type Error = InMemoryError;

    async fn next_candidate(&mut self) -> Result<Option<CandidateRecord>, Self::Error> {
        if self.fail_after.is_some_and(|n| self.delivered >= n) {
            return Err(InMemoryError::Unavailable("search backend went away".to_string()));
        }

        let lower = match self.last {
            Some(last) => Bound::Excluded(last),
            None => Bound::Unbounded,
        };

        let state = Arc::clone(&self.state);
        let mut found = None;
        for (id, record) in state.records.range((lower, Bound::Unbounded)) {
            self.last = Some(*id);
            if self.matches(&state, id) {
                found = Some(record.clone());
                break;
            }
        }

        if let Some(record) = &found {
            self.delivered += 1;
            self.shared.delivered.fetch_add(1, Ordering::SeqCst);
            self.cache.lock().put(record.id, record.clone());
        }
        Ok(found)
    }
}
