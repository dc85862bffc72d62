//! Utilities for driving `toolwire` sessions in tests.
//!
//! [`RawPeer`] speaks envelopes directly over an in-memory duplex stream so
//! tests can observe exactly what a session writes. The fixtures build
//! connected session pairs and tool hosts rooted in temporary directories.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use toolwire::dispatch::MethodNotFound;
//! use toolwire_testing::acceptor_with_peer;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (session, mut peer) = acceptor_with_peer(Arc::new(MethodNotFound));
//! let response = peer.call("cli-1", "ping", None).await.expect("response");
//! assert_eq!(response.error.map(|e| e.code), Some(-32601));
//! session.close().await;
//! # }
//! ```

pub mod fixtures;
pub mod peer;

pub use fixtures::{
    FileHost,
    acceptor_with_peer,
    file_host,
    free_listener,
    session_pair,
    wait_until,
    within,
};
pub use peer::RawPeer;
