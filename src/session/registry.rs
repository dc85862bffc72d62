//! Connection identifiers and the registry of live sessions.
//!
//! [`SessionRegistry`] stores weak references so that a registered session
//! is dropped as soon as its owner and tasks finish. Dead entries are pruned
//! lazily at lookup time or by [`SessionRegistry::prune`].

use std::{
    fmt,
    sync::{
        Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;

use super::{Session, SessionInner};

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier assigned to each session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next identifier.
    #[must_use]
    pub fn next() -> Self { Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed)) }

    #[must_use]
    pub const fn as_u64(&self) -> u64 { self.0 }
}

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Concurrent registry of sessions keyed by [`ConnectionId`].
#[derive(Default)]
pub struct SessionRegistry(DashMap<ConnectionId, Weak<SessionInner>>);

impl SessionRegistry {
    /// Retrieve the session for `id` if it is still alive.
    pub fn get(&self, id: &ConnectionId) -> Option<Session> {
        let guard = self.0.get(id);
        let inner = guard.as_ref().and_then(|weak| weak.upgrade());
        drop(guard);
        if inner.is_none() {
            self.0.remove_if(id, |_, weak| weak.strong_count() == 0);
        }
        inner.map(Session::from_inner)
    }

    /// Track a newly created session.
    pub fn insert(&self, session: &Session) {
        self.0.insert(session.connection_id(), session.downgrade());
    }

    /// Stop tracking a session, typically once it has closed.
    pub fn remove(&self, id: &ConnectionId) { self.0.remove(id); }

    /// Drop entries whose session no longer exists.
    pub fn prune(&self) { self.0.retain(|_, weak| weak.strong_count() > 0); }

    /// Prune dead entries, then collect the sessions still alive.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<Session> {
        let mut sessions = Vec::with_capacity(self.0.len());
        self.0.retain(|_, weak| match weak.upgrade() {
            Some(inner) => {
                sessions.push(Session::from_inner(inner));
                true
            }
            None => false,
        });
        sessions
    }

    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}
