//! Live session counting.

use std::sync::atomic::{AtomicU64, Ordering};

static LIVE_SESSIONS: AtomicU64 = AtomicU64::new(0);

/// Held by a session's read loop; counts the session as live until dropped.
pub(super) struct LiveSession;

impl LiveSession {
    pub(super) fn enter() -> Self {
        LIVE_SESSIONS.fetch_add(1, Ordering::Relaxed);
        crate::metrics::inc_connections();
        Self
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        LIVE_SESSIONS.fetch_sub(1, Ordering::Relaxed);
        crate::metrics::dec_connections();
    }
}

/// Number of sessions whose read loop is still running in this process.
#[must_use]
pub fn live_session_count() -> u64 { LIVE_SESSIONS.load(Ordering::Relaxed) }
