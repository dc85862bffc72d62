//! Operations a [`ToolHost`](crate::host::ToolHost) exposes through
//! `tools/call`.
//!
//! A [`Tool`] receives the call's argument map and a [`CallContext`] it may
//! use to ask the peer for confirmation. The shipped implementations operate
//! on files inside a [`Sandbox`].

use std::io;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{dispatch::CallContext, error::CallError, rpc::RpcError};

mod files;
mod sandbox;

pub use files::{DeleteFile, ListFiles, ReadText, WriteText, file_tools};
pub use sandbox::Sandbox;

/// A named operation callable via `tools/call`.
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    /// Name used in `tools/list` and `tools/call`.
    fn name(&self) -> &str;

    /// One-line description advertised in `tools/list`.
    fn description(&self) -> &str;

    /// Run the tool.
    ///
    /// Implementations must not retain `ctx` beyond the call.
    async fn call(
        &self,
        arguments: Map<String, Value>,
        ctx: &CallContext<'_>,
    ) -> Result<Value, ToolError>;
}

/// Asks the peer a yes/no question on behalf of a tool.
#[async_trait]
pub(crate) trait Confirm: Sync {
    async fn confirm(&self, prompt: &str) -> Result<bool, CallError>;
}

#[async_trait]
impl Confirm for CallContext<'_> {
    async fn confirm(&self, prompt: &str) -> Result<bool, CallError> { CallContext::confirm(self, prompt).await }
}

/// Failure reported by a [`Tool`].
#[derive(Debug, Error)]
pub enum ToolError {
    /// A required argument was absent.
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    /// An argument had the wrong JSON type.
    #[error("argument {name} must be a {expected}")]
    InvalidArgument {
        name: &'static str,
        expected: &'static str,
    },

    /// The requested path resolves outside the sandbox.
    #[error("path escapes base directory: {0}")]
    PathEscapes(String),

    /// The target exists but is not a regular file.
    #[error("target exists but is not a regular file: {0}")]
    NotRegularFile(String),

    /// The target does not exist.
    #[error("no such file: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    /// A confirmation round-trip with the peer failed.
    #[error("confirmation failed: {0}")]
    Callback(#[from] CallError),
}

impl ToolError {
    /// JSON-RPC error reported to the caller.
    ///
    /// Argument problems are invalid params; everything else is an internal
    /// error carrying the message in `data.message`.
    #[must_use]
    pub fn into_rpc(self) -> RpcError {
        match self {
            Self::MissingArgument(_) | Self::InvalidArgument { .. } => {
                RpcError::invalid_params(self.to_string())
            }
            other => RpcError::internal(other),
        }
    }
}

/// Read an optional string argument.
pub(crate) fn string_arg<'a>(
    arguments: &'a Map<String, Value>,
    name: &'static str,
) -> Result<Option<&'a str>, ToolError> {
    match arguments.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ToolError::InvalidArgument {
            name,
            expected: "string",
        }),
    }
}

/// Read a required, non-blank string argument.
pub(crate) fn required_string_arg<'a>(
    arguments: &'a Map<String, Value>,
    name: &'static str,
) -> Result<&'a str, ToolError> {
    string_arg(arguments, name)?
        .filter(|s| !s.trim().is_empty())
        .ok_or(ToolError::MissingArgument(name))
}

/// Read an optional boolean argument, defaulting to `false`.
pub(crate) fn flag_arg(arguments: &Map<String, Value>, name: &'static str) -> Result<bool, ToolError> {
    match arguments.get(name) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(ToolError::InvalidArgument {
            name,
            expected: "boolean",
        }),
    }
}
