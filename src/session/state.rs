//! Session lifecycle state.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a session.
///
/// Dialed sessions start in `Connecting` until the handshake completes;
/// accepted sessions start `Open`. Both move through `Closing` to `Closed`
/// exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl SessionState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Open => 1,
            Self::Closing => 2,
            Self::Closed => 3,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Whether envelopes may still be sent.
    #[must_use]
    pub const fn accepts_sends(self) -> bool { matches!(self, Self::Connecting | Self::Open) }
}

/// Lock-free cell holding a [`SessionState`].
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) const fn new(state: SessionState) -> Self { Self(AtomicU8::new(state.as_u8())) }

    pub(crate) fn load(&self) -> SessionState { SessionState::from_u8(self.0.load(Ordering::Acquire)) }

    /// Move from `from` to `to`; returns `false` if the state was elsewhere.
    pub(crate) fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enter `Closing` unless already closing or closed. Returns `true` for
    /// the caller that performed the move.
    pub(crate) fn begin_closing(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                SessionState::from_u8(raw)
                    .accepts_sends()
                    .then_some(SessionState::Closing.as_u8())
            })
            .is_ok()
    }

    pub(crate) fn store(&self, state: SessionState) { self.0.store(state.as_u8(), Ordering::Release); }
}
