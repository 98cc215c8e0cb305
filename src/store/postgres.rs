//! PostgreSQL repository for production use.
//!
//! Reads a DSpace-style schema (`item`, `metadatavalue`,
//! `metadatafieldregistry`, `metadataschemaregistry`, `versionitem`,
//! `workspaceitem`, `workflowitem`, `cwf_workflowitem`) and matches values
//! with `levenshtein_less_equal` from the `fuzzystrmatch` extension.
//!
//! ## Sessions
//!
//! Each [`PostgresSession`] holds one pooled connection. While the session
//! is in [`SessionMode::ReadOnly`] its statements run inside a
//! `REPEATABLE READ READ ONLY` transaction, so a whole scan sees one
//! snapshot. Mode changes are recorded synchronously and applied before
//! the next statement: entering read-only opens the transaction, leaving
//! it commits. A session dropped while its snapshot is still open
//! detaches the connection from the pool instead of returning it, so the
//! server aborts the transaction when the socket closes.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//! - `DB_SEARCH_PAGE_SIZE`: Candidates fetched per search query (default: 50)

use async_trait::async_trait;
use lru::LruCache;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row};
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{CandidateCursor, RepositorySession, SessionMode};
use crate::types::{
    CandidateRecord, CollectionId, FieldHandle, FieldId, LineageGroupId, RecordId, ReviewStage,
    SubmissionRef, WorkflowRef,
};

/// Entities a session keeps cached before evicting the least recent.
const SESSION_CACHE_ENTRIES: usize = 1_000;

/// Engine name reported for configurable-workflow items.
const CONFIGURABLE_WORKFLOW: &str = "xmlworkflow";

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Configuration for the PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
    /// Rows fetched per search page (default: 50).
    pub search_page_size: u32,
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/dspace".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800),
            search_page_size: env_or("DB_SEARCH_PAGE_SIZE", 50).max(1),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Error type for the PostgreSQL repository.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// The session was closed.
    #[error("Session is closed")]
    Closed,
}

/// PostgreSQL repository.
///
/// Owns the pool; open one [`PostgresSession`] per detection call.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
    search_page_size: u32,
}

impl PostgresRepository {
    /// Create a repository with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            search_page_size = config.search_page_size,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self {
            pool,
            search_page_size: config.search_page_size,
        })
    }

    /// Create a repository from environment variables.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Get the connection pool for health checks.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check if the database is reachable.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    /// Open a session. The connection is acquired on first use.
    pub fn session(&self) -> PostgresSession {
        let capacity = NonZeroUsize::new(SESSION_CACHE_ENTRIES).unwrap_or(NonZeroUsize::MIN);
        PostgresSession {
            link: Arc::new(Link {
                pool: self.pool.clone(),
                desired: parking_lot::Mutex::new(SessionMode::default()),
                conn: tokio::sync::Mutex::new(ConnState::default()),
                cache: parking_lot::Mutex::new(LruCache::new(capacity)),
            }),
            search_page_size: self.search_page_size,
        }
    }
}

#[derive(Default)]
struct ConnState {
    conn: Option<PoolConnection<Postgres>>,
    in_snapshot: bool,
    closed: bool,
}

impl ConnState {
    fn pg(&mut self) -> Result<&mut PgConnection, PostgresError> {
        self.conn.as_deref_mut().ok_or(PostgresError::Closed)
    }

    /// Forget an open snapshot, detaching its connection from the pool.
    ///
    /// Returns whether a connection was discarded.
    fn discard_open_snapshot(&mut self) -> bool {
        if !std::mem::take(&mut self.in_snapshot) {
            return false;
        }
        match self.conn.take() {
            Some(conn) => {
                drop(conn.detach());
                true
            }
            None => false,
        }
    }
}

/// State shared by a session and its cursors.
struct Link {
    pool: PgPool,
    desired: parking_lot::Mutex<SessionMode>,
    conn: tokio::sync::Mutex<ConnState>,
    cache: parking_lot::Mutex<LruCache<RecordId, CandidateRecord>>,
}

impl Link {
    /// Lock the connection, acquiring it and applying the requested mode.
    async fn connection(&self) -> Result<tokio::sync::MutexGuard<'_, ConnState>, PostgresError> {
        let mut state = self.conn.lock().await;
        if state.closed {
            return Err(PostgresError::Closed);
        }
        if state.conn.is_none() {
            state.conn = Some(self.pool.acquire().await?);
        }

        let want_snapshot = *self.desired.lock() == SessionMode::ReadOnly;
        match (want_snapshot, state.in_snapshot) {
            (true, false) => {
                sqlx::query("BEGIN ISOLATION LEVEL REPEATABLE READ READ ONLY")
                    .execute(state.pg()?)
                    .await?;
                state.in_snapshot = true;
                tracing::trace!("Opened read-only snapshot");
            }
            (false, true) => {
                sqlx::query("COMMIT").execute(state.pg()?).await?;
                state.in_snapshot = false;
                tracing::trace!("Closed read-only snapshot");
            }
            _ => {}
        }
        Ok(state)
    }

    fn cache(&self, record: &CandidateRecord) {
        self.cache.lock().put(record.id, record.clone());
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if self.conn.get_mut().discard_open_snapshot() {
            tracing::debug!("Session dropped inside a read-only snapshot, connection discarded");
        }
    }
}

const ITEM_COLUMNS: &str = "i.uuid, i.withdrawn, i.discoverable, i.owning_collection, i.last_modified";

fn parse_item_row(row: &PgRow) -> Result<CandidateRecord, sqlx::Error> {
    let id: Uuid = row.try_get("uuid")?;
    let withdrawn: Option<bool> = row.try_get("withdrawn")?;
    let discoverable: Option<bool> = row.try_get("discoverable")?;
    let owning_collection: Option<Uuid> = row.try_get("owning_collection")?;
    let last_modified: Option<chrono::DateTime<chrono::Utc>> = row.try_get("last_modified")?;

    Ok(CandidateRecord {
        id: RecordId::new(id),
        withdrawn: withdrawn.unwrap_or(false),
        discoverable: discoverable.unwrap_or(true),
        owning_collection: owning_collection.map(CollectionId),
        last_modified,
    })
}

/// One caller's session against a [`PostgresRepository`].
pub struct PostgresSession {
    link: Arc<Link>,
    search_page_size: u32,
}

impl PostgresSession {
    /// Commit any open snapshot and return the connection to the pool.
    pub async fn close(self) -> Result<(), PostgresError> {
        let mut state = self.link.conn.lock().await;
        if state.in_snapshot {
            sqlx::query("COMMIT").execute(state.pg()?).await?;
            state.in_snapshot = false;
        }
        state.conn = None;
        state.closed = true;
        Ok(())
    }

    /// Number of cached entities.
    pub fn cached_len(&self) -> usize {
        self.link.cache.lock().len()
    }
}

#[async_trait]
impl RepositorySession for PostgresSession {
    type Error = PostgresError;
    type Cursor = PostgresCursor;

    fn mode(&self) -> SessionMode {
        *self.link.desired.lock()
    }

    fn set_mode(&self, mode: SessionMode) {
        *self.link.desired.lock() = mode;
    }

    fn release(&self, id: &RecordId) {
        self.link.cache.lock().pop(id);
        tracing::trace!(record = %id, "Released candidate");
    }

    async fn find_field(
        &self,
        schema: &str,
        element: &str,
        qualifier: Option<&str>,
    ) -> Result<Option<FieldHandle>, Self::Error> {
        let mut state = self.link.connection().await?;
        let row = sqlx::query(
            r#"
            SELECT f.metadata_field_id, s.short_id, f.element, f.qualifier
            FROM metadatafieldregistry f
            JOIN metadataschemaregistry s ON s.metadata_schema_id = f.metadata_schema_id
            WHERE s.short_id = $1 AND f.element = $2 AND f.qualifier IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(schema)
        .bind(element)
        .bind(qualifier)
        .fetch_optional(state.pg()?)
        .await?;

        match row {
            Some(r) => Ok(Some(FieldHandle {
                id: FieldId(r.try_get("metadata_field_id")?),
                schema: r.try_get("short_id")?,
                element: r.try_get("element")?,
                qualifier: r.try_get("qualifier")?,
            })),
            None => Ok(None),
        }
    }

    async fn first_value(
        &self,
        record: &RecordId,
        field: &FieldHandle,
    ) -> Result<Option<String>, Self::Error> {
        let mut state = self.link.connection().await?;
        let value: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT text_value
            FROM metadatavalue
            WHERE dspace_object_id = $1 AND metadata_field_id = $2
            ORDER BY place
            LIMIT 1
            "#,
        )
        .bind(record.as_uuid())
        .bind(field.id.0)
        .fetch_optional(state.pg()?)
        .await?;
        Ok(value.flatten())
    }

    async fn get_record(&self, id: &RecordId) -> Result<Option<CandidateRecord>, Self::Error> {
        let mut state = self.link.connection().await?;
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM item i WHERE i.uuid = $1"))
            .bind(id.as_uuid())
            .fetch_optional(state.pg()?)
            .await?;

        let record = row.as_ref().map(parse_item_row).transpose()?;
        if let Some(record) = &record {
            self.link.cache(record);
        }
        Ok(record)
    }

    async fn search(
        &self,
        field: &FieldHandle,
        sample: &str,
        max_distance: u32,
    ) -> Result<Self::Cursor, Self::Error> {
        tracing::debug!(field = %field, max_distance, "Starting approximate search");
        Ok(PostgresCursor {
            link: Arc::clone(&self.link),
            field: field.id,
            sample: sample.to_string(),
            max_distance: i32::try_from(max_distance).unwrap_or(i32::MAX),
            page_size: i64::from(self.search_page_size),
            buffer: VecDeque::new(),
            last: None,
            exhausted: false,
        })
    }

    async fn version_lineage(&self, id: &RecordId) -> Result<Option<LineageGroupId>, Self::Error> {
        let mut state = self.link.connection().await?;
        let group: Option<Option<i32>> = sqlx::query_scalar(
            "SELECT versionhistory_id FROM versionitem WHERE item_id = $1 LIMIT 1",
        )
        .bind(id.as_uuid())
        .fetch_optional(state.pg()?)
        .await?;
        Ok(group.flatten().map(|g| LineageGroupId(i64::from(g))))
    }

    async fn in_progress_submission(&self, id: &RecordId) -> Result<Option<SubmissionRef>, Self::Error> {
        let mut state = self.link.connection().await?;
        let submission: Option<i32> = sqlx::query_scalar(
            "SELECT workspace_item_id FROM workspaceitem WHERE item_id = $1 LIMIT 1",
        )
        .bind(id.as_uuid())
        .fetch_optional(state.pg()?)
        .await?;
        Ok(submission.map(|s| SubmissionRef {
            id: i64::from(s),
            record: *id,
        }))
    }

    async fn review_workflow(&self, id: &RecordId) -> Result<Option<WorkflowRef>, Self::Error> {
        let mut state = self.link.connection().await?;

        let basic = sqlx::query(
            "SELECT workflow_id, collection_id, state FROM workflowitem WHERE item_id = $1 LIMIT 1",
        )
        .bind(id.as_uuid())
        .fetch_optional(state.pg()?)
        .await?;
        if let Some(row) = basic {
            let workflow_id: i32 = row.try_get("workflow_id")?;
            let collection: Uuid = row.try_get("collection_id")?;
            let stage: Option<i32> = row.try_get("state")?;
            return Ok(Some(WorkflowRef::basic(
                i64::from(workflow_id),
                *id,
                CollectionId(collection),
                ReviewStage::from_code(stage.unwrap_or(-1)),
            )));
        }

        let configurable = sqlx::query(
            "SELECT workflowitem_id, collection_id FROM cwf_workflowitem WHERE item_id = $1 LIMIT 1",
        )
        .bind(id.as_uuid())
        .fetch_optional(state.pg()?)
        .await?;
        match configurable {
            Some(row) => {
                let workflow_id: i32 = row.try_get("workflowitem_id")?;
                let collection: Uuid = row.try_get("collection_id")?;
                Ok(Some(WorkflowRef::unrecognized(
                    i64::from(workflow_id),
                    *id,
                    CollectionId(collection),
                    CONFIGURABLE_WORKFLOW,
                )))
            }
            None => Ok(None),
        }
    }
}

/// Keyset-paginated search cursor.
///
/// Fetches one page at a time, ordered by item UUID, resuming after the
/// last UUID seen. Dropping the cursor stops further queries.
pub struct PostgresCursor {
    link: Arc<Link>,
    field: FieldId,
    sample: String,
    max_distance: i32,
    page_size: i64,
    buffer: VecDeque<CandidateRecord>,
    last: Option<Uuid>,
    exhausted: bool,
}

impl PostgresCursor {
    async fn fetch_page(&mut self) -> Result<(), PostgresError> {
        let mut state = self.link.connection().await?;
        let rows = sqlx::query(&format!(
            r#"
            SELECT DISTINCT {ITEM_COLUMNS}
            FROM item i
            JOIN metadatavalue mv ON mv.dspace_object_id = i.uuid
            WHERE mv.metadata_field_id = $1
              AND levenshtein_less_equal(mv.text_value, $2, $3) <= $3
              AND ($4::uuid IS NULL OR i.uuid > $4)
            ORDER BY i.uuid
            LIMIT $5
            "#
        ))
        .bind(self.field.0)
        .bind(&self.sample)
        .bind(self.max_distance)
        .bind(self.last)
        .bind(self.page_size)
        .fetch_all(state.pg()?)
        .await?;

        self.exhausted = (rows.len() as i64) < self.page_size;
        for row in &rows {
            self.buffer.push_back(parse_item_row(row)?);
        }
        if let Some(last) = self.buffer.back() {
            self.last = Some(last.id.as_uuid());
        }
        tracing::trace!(rows = rows.len(), exhausted = self.exhausted, "Fetched search page");
        Ok(())
    }
}

#[async_trait]
impl CandidateCursor for PostgresCursor {
    type Error = PostgresError;

    async fn next_candidate(&mut self) -> Result<Option<CandidateRecord>, Self::Error> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }
        let next = self.buffer.pop_front();
        if let Some(record) = &next {
            self.link.cache(record);
        }
        Ok(next)
    }
}
