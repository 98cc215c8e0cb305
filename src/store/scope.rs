//! Scoped guards over a repository session.
//!
//! ```text
//! ReadOnlyScope::enter(session)      CandidateLease::new(session, id)
//!   │ previous = session.mode()        │
//!   │ session.set_mode(ReadOnly)       ├─ keep()  → no release
//!   ▼                                  └─ drop    → session.release(id)
//! drop → session.set_mode(previous)
//! ```
//!
//! Both guards run their cleanup from `Drop`, so early returns, `?`
//! and panics restore the session exactly like the normal path.

use std::ops::Deref;

use super::{RepositorySession, SessionMode};
use crate::types::RecordId;

/// Holds a session in read-only mode and restores the prior mode on drop.
#[must_use = "the previous mode is restored as soon as the scope is dropped"]
pub struct ReadOnlyScope<'s, S: RepositorySession + ?Sized> {
    session: &'s S,
    previous: SessionMode,
}

impl<'s, S: RepositorySession + ?Sized> ReadOnlyScope<'s, S> {
    /// Switch `session` to read-only until the scope is dropped.
    pub fn enter(session: &'s S) -> Self {
        let previous = session.mode();
        session.set_mode(SessionMode::ReadOnly);
        tracing::trace!(?previous, "Entered read-only scope");
        Self { session, previous }
    }

    /// Mode that will be restored.
    pub fn previous_mode(&self) -> SessionMode {
        self.previous
    }
}

impl<S: RepositorySession + ?Sized> Deref for ReadOnlyScope<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.session
    }
}

impl<S: RepositorySession + ?Sized> Drop for ReadOnlyScope<'_, S> {
    fn drop(&mut self) {
        self.session.set_mode(self.previous);
        tracing::trace!(restored = ?self.previous, "Left read-only scope");
    }
}

/// Ownership of one inspected candidate.
///
/// Released exactly once: on drop, unless [`keep`](Self::keep) was called.
#[must_use = "dropping a lease releases the candidate immediately"]
pub struct CandidateLease<'s, S: RepositorySession + ?Sized> {
    session: &'s S,
    id: RecordId,
    armed: bool,
}

impl<'s, S: RepositorySession + ?Sized> CandidateLease<'s, S> {
    /// Take ownership of an inspected candidate.
    pub fn new(session: &'s S, id: RecordId) -> Self {
        Self {
            session,
            id,
            armed: true,
        }
    }

    /// The leased record.
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Keep the candidate; the store keeps its cached state.
    pub fn keep(mut self) {
        self.armed = false;
    }

    /// Release the candidate now.
    pub fn release(self) {}
}

impl<S: RepositorySession + ?Sized> Drop for CandidateLease<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            self.session.release(&self.id);
        }
    }
}
