//! Hooks invoked by the session for wire traffic and notifications.

use std::borrow::Cow;

use tracing::info;

use super::ConnectionId;
use crate::{envelope::Envelope, rpc::RpcRequest};

/// Default number of payload characters included in wire logs.
pub const DEFAULT_PAYLOAD_PREVIEW: usize = 200;

/// Receives every envelope a session reads or writes.
///
/// Observers run inline on the read loop and under the writer lock, so they
/// must not block.
pub trait WireObserver: Send + Sync + 'static {
    /// An envelope was decoded from the transport.
    fn on_receive(&self, connection: ConnectionId, envelope: &Envelope);

    /// An envelope is about to be written to the transport.
    fn on_send(&self, connection: ConnectionId, envelope: &Envelope);
}

/// Logs one `RX`/`TX` line per envelope at `INFO`.
#[derive(Clone, Copy, Debug)]
pub struct TracingWireObserver {
    preview: usize,
}

impl Default for TracingWireObserver {
    fn default() -> Self {
        Self {
            preview: DEFAULT_PAYLOAD_PREVIEW,
        }
    }
}

impl TracingWireObserver {
    /// Truncate logged payloads to `preview` characters.
    #[must_use]
    pub const fn with_preview(preview: usize) -> Self { Self { preview } }

    fn log(&self, direction: &str, connection: ConnectionId, envelope: &Envelope) {
        info!(
            "{direction} conn={connection} type={} req={} corr={} final={} seq={} json={}",
            envelope.message_type(),
            envelope.request_id().unwrap_or("-"),
            envelope.correlation_id().unwrap_or("-"),
            envelope.fin(),
            envelope.seq(),
            truncate(envelope.jsonrpc(), self.preview),
        );
    }
}

impl WireObserver for TracingWireObserver {
    fn on_receive(&self, connection: ConnectionId, envelope: &Envelope) {
        self.log("RX", connection, envelope);
    }

    fn on_send(&self, connection: ConnectionId, envelope: &Envelope) {
        self.log("TX", connection, envelope);
    }
}

/// Observer that ignores all traffic.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentWireObserver;

impl WireObserver for SilentWireObserver {
    fn on_receive(&self, _connection: ConnectionId, _envelope: &Envelope) {}

    fn on_send(&self, _connection: ConnectionId, _envelope: &Envelope) {}
}

/// Shorten `text` to at most `max` characters, marking the cut with `…`.
///
/// ```
/// use toolwire::session::truncate;
///
/// assert_eq!(truncate("abcdef", 3), "abc…");
/// assert_eq!(truncate("héllo", 10), "héllo");
/// ```
#[must_use]
pub fn truncate(text: &str, max: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max) {
        Some((cut, _)) => Cow::Owned(format!("{}…", text.get(..cut).unwrap_or(text))),
        None => Cow::Borrowed(text),
    }
}

/// Receives notifications from the peer.
///
/// Called inline on the read loop; implementations must not block.
pub trait NotificationListener: Send + Sync + 'static {
    fn on_notification(&self, connection: ConnectionId, notification: RpcRequest);
}

impl<F> NotificationListener for F
where
    F: Fn(ConnectionId, RpcRequest) + Send + Sync + 'static,
{
    fn on_notification(&self, connection: ConnectionId, notification: RpcRequest) {
        self(connection, notification);
    }
}

/// Logs each notification and otherwise ignores it.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifications;

impl NotificationListener for LogNotifications {
    fn on_notification(&self, connection: ConnectionId, notification: RpcRequest) {
        info!(
            "notification conn={connection} method={} params={}",
            notification.method,
            notification
                .params
                .as_ref()
                .map_or_else(|| "null".to_owned(), ToString::to_string),
        );
    }
}
