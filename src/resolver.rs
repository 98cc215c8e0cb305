//! Field resolution against the field catalog.
//!
//! Handles are resolved fresh on every invocation; nothing here caches,
//! so a changed `duplication.detection.field` applies on the next call.

use crate::error::DuplicationError;
use crate::store::RepositorySession;
use crate::types::{FieldHandle, FieldSelector};

/// Resolves selectors to field handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldResolver;

impl FieldResolver {
    /// Resolve a configured selector string; `None` or blank selects `dc.title`.
    #[tracing::instrument(level = "debug", skip(session))]
    pub async fn resolve<S: RepositorySession + ?Sized>(
        session: &S,
        configured: Option<&str>,
    ) -> Result<FieldHandle, DuplicationError> {
        let selector = FieldSelector::parse_or_default(configured)?;
        Self::resolve_selector(session, &selector).await
    }

    /// Resolve an already parsed selector.
    pub async fn resolve_selector<S: RepositorySession + ?Sized>(
        session: &S,
        selector: &FieldSelector,
    ) -> Result<FieldHandle, DuplicationError> {
        let field = session
            .find_field(&selector.schema, &selector.element, selector.qualifier.as_deref())
            .await
            .map_err(DuplicationError::from_store)?;

        match field {
            Some(field) => {
                tracing::debug!(field = %field, "Resolved metadata field");
                Ok(field)
            }
            None => {
                tracing::warn!(
                    selector = %selector,
                    "Field configured for duplicate detection does not exist in the catalog"
                );
                Err(DuplicationError::FieldNotFound {
                    selector: selector.to_string(),
                })
            }
        }
    }
}
