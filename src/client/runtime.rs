//! Connected tool client.

use serde::Deserialize;
use serde_json::{Value, json};

use super::{ClientError, ToolClientBuilder};
use crate::{rpc::methods, session::Session};

/// Entry from `tools/list`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
struct ToolList {
    tools: Vec<ToolInfo>,
}

/// Handle to a connection with a tool host.
///
/// Cheap to clone; clones share the session. Dropping every handle does not
/// close the connection: call [`close`](Self::close).
#[derive(Clone, Debug)]
pub struct ToolClient {
    session: Session,
    server_info: Value,
}

impl ToolClient {
    #[must_use]
    pub fn builder() -> ToolClientBuilder { ToolClientBuilder::new() }

    pub(super) fn new(session: Session, server_info: Value) -> Self {
        Self {
            session,
            server_info,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Session { &self.session }

    /// Session id assigned by the host.
    #[must_use]
    pub fn session_id(&self) -> String { self.session.session_id() }

    /// The `initialize` result.
    #[must_use]
    pub fn server_info(&self) -> &Value { &self.server_info }

    /// Call an arbitrary method on the host.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Call`] for RPC errors, timeouts and
    /// connection loss.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        Ok(self.session.send_request(method, params).await?)
    }

    /// Send a notification to the host.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Call`] if the notification cannot be sent.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ClientError> {
        Ok(self.session.notify(method, params).await?)
    }

    /// Tools advertised by the host.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidResult`] if the result does not list
    /// tools.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>, ClientError> {
        let result = self.call(methods::TOOLS_LIST, None).await?;
        let list: ToolList =
            serde_json::from_value(result).map_err(|e| ClientError::InvalidResult(e.to_string()))?;
        Ok(list.tools)
    }

    /// Invoke tool `name` with `arguments`.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ClientError> {
        self.call(
            methods::TOOLS_CALL,
            Some(json!({ "name": name, "arguments": arguments })),
        )
        .await
    }

    /// `list_files`.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn list_files(&self, dir: &str) -> Result<Value, ClientError> {
        self.call_tool("list_files", json!({ "dir": dir })).await
    }

    /// `read_text`.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn read_text(&self, path: &str) -> Result<Value, ClientError> {
        self.call_tool("read_text", json!({ "path": path })).await
    }

    /// `write_text`; the host asks for confirmation before replacing a file
    /// unless `overwrite` is set.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn write_text(&self, path: &str, content: &str, overwrite: bool) -> Result<Value, ClientError> {
        self.call_tool(
            "write_text",
            json!({ "path": path, "content": content, "overwrite": overwrite }),
        )
        .await
    }

    /// `delete_file`; the host asks for confirmation unless `force` is set.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn delete_file(&self, path: &str, force: bool) -> Result<Value, ClientError> {
        self.call_tool("delete_file", json!({ "path": path, "force": force }))
            .await
    }

    /// Close the connection. Idempotent.
    pub async fn close(&self) { self.session.close().await; }
}
