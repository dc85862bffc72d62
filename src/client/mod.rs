//! Dialer side: connects to a tool host and answers its confirmation
//! requests.
//!
//! [`ToolClientBuilder`] opens a connection (TCP, any byte stream, or a
//! WebSocket), spawns a [`Session`](crate::session::Session) whose only
//! inbound method is `elicitation/create`, and performs the `initialize`
//! handshake before returning a [`ToolClient`].

mod builder;
mod elicitation;
mod error;
mod runtime;

pub use builder::ToolClientBuilder;
pub use elicitation::{ConfirmationPolicy, ElicitationResponder};
pub use error::ClientError;
pub use runtime::{ToolClient, ToolInfo};

#[cfg(test)]
mod tests;
