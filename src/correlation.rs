//! In-flight request bookkeeping.
//!
//! A [`CorrelationTable`] maps request identifiers to pending completions.
//! Every entry is resolved at most once: whichever path removes it from the
//! map (terminal response, timeout eviction or teardown) owns the resolution,
//! and every other path finds nothing to do.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::oneshot;

use crate::error::CallError;

type Completion<T> = oneshot::Sender<Result<T, CallError>>;

/// Concurrent map of request id to pending completion.
pub struct CorrelationTable<T> {
    pending: DashMap<String, Completion<T>>,
    closed: AtomicBool,
}

impl<T> Default for CorrelationTable<T> {
    fn default() -> Self {
        Self {
            pending: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }
}

impl<T> CorrelationTable<T> {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register a pending completion for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::DuplicateId`] if `id` is already in flight and
    /// [`CallError::ConnectionClosed`] once the table has been closed.
    pub fn register(&self, id: impl Into<String>) -> Result<PendingCall<T>, CallError> {
        let id = id.into();
        if self.is_closed() {
            return Err(CallError::ConnectionClosed);
        }
        let (tx, rx) = oneshot::channel();
        match self.pending.entry(id.clone()) {
            Entry::Occupied(_) => return Err(CallError::DuplicateId(id)),
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }
        // A concurrent close may have drained the map before our insert.
        if self.is_closed()
            && let Some((_, tx)) = self.pending.remove(&id)
        {
            let _ = tx.send(Err(CallError::ConnectionClosed));
        }
        Ok(PendingCall { id, rx })
    }

    /// Remove `id` and resolve it with `outcome`.
    ///
    /// Returns `false` if no entry was pending, which makes duplicate terminal
    /// responses a no-op.
    pub fn complete(&self, id: &str, outcome: Result<T, CallError>) -> bool {
        match self.pending.remove(id) {
            Some((_, tx)) => {
                // The waiter may have given up already.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Remove `id` without resolving it.
    pub fn evict(&self, id: &str) -> bool { self.pending.remove(id).is_some() }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool { self.pending.contains_key(id) }

    #[must_use]
    pub fn len(&self) -> usize { self.pending.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.pending.is_empty() }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }

    /// Refuse new entries and fail every pending one with
    /// [`CallError::ConnectionClosed`]. Returns how many entries were failed.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        ids.iter()
            .filter(|id| self.complete(id, Err(CallError::ConnectionClosed)))
            .count()
    }
}

/// Receiving half of a registered entry.
#[must_use = "a pending call resolves only when awaited"]
pub struct PendingCall<T> {
    id: String,
    rx: oneshot::Receiver<Result<T, CallError>>,
}

impl<T> PendingCall<T> {
    #[must_use]
    pub fn id(&self) -> &str { &self.id }

    /// Wait for the entry to be resolved.
    ///
    /// # Errors
    ///
    /// Returns the failure the entry was resolved with, or
    /// [`CallError::ConnectionClosed`] if the table dropped it.
    pub async fn wait(self) -> Result<T, CallError> {
        self.rx.await.unwrap_or(Err(CallError::ConnectionClosed))
    }

    /// Wait at most `limit`, evicting the entry from `table` on expiry.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Timeout`] when the deadline passes first, or the
    /// failure the entry was resolved with.
    pub async fn wait_for(
        self,
        table: &CorrelationTable<T>,
        limit: Duration,
    ) -> Result<T, CallError> {
        let Self { id, mut rx } = self;
        match tokio::time::timeout(limit, &mut rx).await {
            Ok(outcome) => outcome.unwrap_or(Err(CallError::ConnectionClosed)),
            Err(_) if table.evict(&id) => Err(CallError::Timeout { id, after: limit }),
            // A resolver removed the entry as the deadline passed; its outcome wins.
            Err(_) => rx.await.unwrap_or(Err(CallError::ConnectionClosed)),
        }
    }
}
