#![doc(html_root_url = "https://docs.rs/toolwire/latest")]
//! Public API for the `toolwire` library.
//!
//! `toolwire` carries JSON-RPC between a tool host and its client over a
//! single connection in both directions: while the host services a client
//! request it may call back into the client and wait for the answer. The
//! layers, leaves first:
//!
//! - [`codec`]: 4-byte big-endian length-prefixed frames;
//! - [`envelope`] and [`rpc`]: the routing wrapper and the JSON-RPC payload;
//! - [`correlation`]: pending-call tables keyed by request id;
//! - [`session`]: one connection's read loop, writer and correlation state;
//! - [`dispatch`]: inbound request handling on a per-session worker;
//! - [`server`] and [`client`]: listener and dialer;
//! - [`host`] and [`tools`]: the tool catalogue served to clients.

pub mod client;
pub mod codec;
pub mod correlation;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod host;
pub mod metrics;
pub mod panic;
pub mod rpc;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;

pub use client::{ClientError, ToolClient, ToolClientBuilder};
pub use codec::{LengthPrefixedCodec, read_frame, write_frame};
pub use correlation::CorrelationTable;
pub use dispatch::{CallContext, RequestHandler, Router};
pub use envelope::{Envelope, MessageType};
pub use error::CallError;
pub use host::ToolHost;
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
pub use rpc::{RpcError, RpcRequest, RpcResponse};
pub use server::{ServerError, ToolServer};
pub use session::{ConnectionId, Session, SessionConfig, SessionRegistry};
pub use transport::Transport;
