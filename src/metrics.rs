//! Metric helpers for `toolwire`.
//!
//! Names and thin wrappers over the [`metrics`](https://docs.rs/metrics)
//! crate. Without the `metrics` feature every helper is a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Gauge tracking live sessions.
pub const CONNECTIONS_ACTIVE: &str = "toolwire_connections_active";
/// Counter of envelopes read or written, labelled by `direction`.
pub const FRAMES_PROCESSED: &str = "toolwire_frames_total";
/// Counter of transport and dispatch errors.
pub const ERRORS_TOTAL: &str = "toolwire_errors_total";
/// Counter of outbound requests abandoned on timeout.
pub const CALL_TIMEOUTS: &str = "toolwire_call_timeouts_total";
/// Counter of panics caught in request handlers and connection tasks.
pub const HANDLER_PANICS: &str = "toolwire_handler_panics_total";

/// Direction of envelope traffic.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Received from the peer.
    Inbound,
    /// Sent to the peer.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "only used as a metric label"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the live sessions gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the live sessions gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record one envelope in `direction`.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record an error occurrence.
pub fn inc_errors() {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL).increment(1);
}

/// Record an outbound request that timed out.
pub fn inc_call_timeouts() {
    #[cfg(feature = "metrics")]
    counter!(CALL_TIMEOUTS).increment(1);
}

/// Record a caught panic.
pub fn inc_handler_panics() {
    #[cfg(feature = "metrics")]
    counter!(HANDLER_PANICS).increment(1);
}
