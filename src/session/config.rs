//! Per-session tunables.

use std::time::Duration;

use crate::codec::{DEFAULT_MAX_FRAME_LENGTH, clamp_frame_length};

/// Default deadline for an outbound request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Default time allowed for session tasks to stop before they are aborted.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Settings applied to every session created by a server or client.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use toolwire::session::SessionConfig;
///
/// let config = SessionConfig::default()
///     .request_timeout(Duration::from_secs(30))
///     .max_frame_length(1 << 20);
/// assert_eq!(config.request_timeout_value(), Duration::from_secs(30));
/// assert_eq!(config.max_frame_length_value(), 1 << 20);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    request_timeout: Duration,
    shutdown_grace: Duration,
    max_frame_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

impl SessionConfig {
    /// Deadline applied by [`Session::send_request`](crate::session::Session::send_request).
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Time [`Session::close`](crate::session::Session::close) waits before
    /// aborting session tasks.
    #[must_use]
    pub const fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Largest frame accepted on framed transports. Clamped to the codec
    /// bounds.
    #[must_use]
    pub fn max_frame_length(mut self, length: usize) -> Self {
        self.max_frame_length = clamp_frame_length(length);
        self
    }

    #[must_use]
    pub const fn request_timeout_value(&self) -> Duration { self.request_timeout }

    #[must_use]
    pub const fn shutdown_grace_value(&self) -> Duration { self.shutdown_grace }

    #[must_use]
    pub const fn max_frame_length_value(&self) -> usize { self.max_frame_length }
}
