//! Request handler exposing a catalogue of [`Tool`]s.
//!
//! A [`ToolHost`] answers the three acceptor-side methods:
//!
//! - `initialize` reports the protocol version, capabilities and session id;
//! - `tools/list` describes each registered tool in registration order;
//! - `tools/call` runs one tool by name with an argument map.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::{
    dispatch::{CallContext, RequestHandler},
    rpc::{PROTOCOL_VERSION, RpcError, RpcRequest, methods},
    tools::{Sandbox, Tool, file_tools},
};

/// Serves `initialize`, `tools/list` and `tools/call`.
#[derive(Clone, Default)]
pub struct ToolHost {
    tools: Vec<Arc<dyn Tool>>,
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Map<String, Value>,
}

impl ToolHost {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register `tool`, replacing any tool with the same name.
    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
        self
    }

    /// Register the sandboxed file tools.
    #[must_use]
    pub fn with_file_tools(self, sandbox: &Sandbox) -> Self {
        file_tools(sandbox)
            .into_iter()
            .fold(self, ToolHost::with_tool)
    }

    /// Names of the registered tools in listing order.
    #[must_use]
    pub fn tool_names(&self) -> Vec<&str> { self.tools.iter().map(|t| t.name()).collect() }

    fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> { self.tools.iter().find(|t| t.name() == name) }

    fn initialize(ctx: &CallContext<'_>) -> Value {
        let session_id = ctx.session_id();
        info!(
            "client initialised: conn={} session={session_id}",
            ctx.connection_id()
        );
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "list": true },
                "elicitation": { "create": true },
            },
            "sessionId": session_id,
        })
    }

    fn list(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|t| json!({ "name": t.name(), "description": t.description() }))
            .collect();
        json!({ "tools": tools })
    }

    async fn call(&self, params: Option<Value>, ctx: &CallContext<'_>) -> Result<Value, RpcError> {
        let CallParams { name, arguments } =
            serde_json::from_value(params.unwrap_or(Value::Null))
                .map_err(|e| RpcError::invalid_params(format!("Invalid tools/call params: {e}")))?;
        let tool = self
            .find(&name)
            .ok_or_else(|| RpcError::invalid_params(format!("Unknown tool: {name}")))?;
        debug!(
            "calling tool: conn={} id={} tool={name}",
            ctx.connection_id(),
            ctx.request_id()
        );
        tool.call(arguments, ctx).await.map_err(|e| {
            debug!("tool failed: conn={} tool={name} error={e}", ctx.connection_id());
            e.into_rpc()
        })
    }
}

#[async_trait]
impl RequestHandler for ToolHost {
    async fn handle(&self, request: RpcRequest, ctx: &CallContext<'_>) -> Result<Value, RpcError> {
        match request.method.as_str() {
            methods::INITIALIZE => Ok(Self::initialize(ctx)),
            methods::TOOLS_LIST => Ok(self.list()),
            methods::TOOLS_CALL => self.call(request.params, ctx).await,
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

impl std::fmt::Debug for ToolHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolHost")
            .field("tools", &self.tool_names())
            .finish()
    }
}
