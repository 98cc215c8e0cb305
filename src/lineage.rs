//! Version lineage grouping.

use crate::store::RepositorySession;
use crate::types::RecordId;

/// Decides whether two records are revisions of the same work.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionGrouper;

impl VersionGrouper {
    /// True iff both records belong to the same non-null lineage group.
    ///
    /// Returns false when the session has versioning disabled, so
    /// duplicate detection keeps working without it.
    pub async fn same_lineage<S: RepositorySession + ?Sized>(
        session: &S,
        a: &RecordId,
        b: &RecordId,
    ) -> Result<bool, S::Error> {
        if !session.versioning_enabled() {
            return Ok(false);
        }

        let Some(group_a) = session.version_lineage(a).await? else {
            return Ok(false);
        };
        let Some(group_b) = session.version_lineage(b).await? else {
            return Ok(false);
        };
        Ok(group_a == group_b)
    }
}
