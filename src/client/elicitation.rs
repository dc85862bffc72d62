//! Client-side answers to `elicitation/create`.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use crate::{
    dispatch::{CallContext, MethodHandler},
    rpc::RpcError,
};

/// Decides how the client answers confirmation prompts from the host.
#[derive(Clone, Default)]
pub enum ConfirmationPolicy {
    /// Confirm every prompt.
    #[default]
    Accept,
    /// Decline every prompt.
    Decline,
    /// Ask a callback, which receives the prompt message.
    Ask(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl ConfirmationPolicy {
    /// Wrap `f` as an [`Ask`](Self::Ask) policy.
    pub fn ask(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self { Self::Ask(Arc::new(f)) }

    #[must_use]
    pub fn decide(&self, message: &str) -> bool {
        match self {
            Self::Accept => true,
            Self::Decline => false,
            Self::Ask(f) => f(message),
        }
    }
}

impl fmt::Debug for ConfirmationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => f.write_str("Accept"),
            Self::Decline => f.write_str("Decline"),
            Self::Ask(_) => f.write_str("Ask(<callback>)"),
        }
    }
}

/// Answers `elicitation/create` with
/// `{decision: "accept"|"decline", values: {confirm}}`.
#[derive(Clone, Debug, Default)]
pub struct ElicitationResponder {
    policy: ConfirmationPolicy,
}

impl ElicitationResponder {
    #[must_use]
    pub fn new(policy: ConfirmationPolicy) -> Self { Self { policy } }

    /// Build the answer to a prompt with `params`.
    #[must_use]
    pub fn answer(&self, params: Option<&Value>) -> Value {
        let message = params
            .and_then(|p| p.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let confirm = self.policy.decide(message);
        json!({
            "decision": if confirm { "accept" } else { "decline" },
            "values": { "confirm": confirm },
        })
    }
}

#[async_trait]
impl MethodHandler for ElicitationResponder {
    async fn call(&self, params: Option<Value>, ctx: &CallContext<'_>) -> Result<Value, RpcError> {
        let answer = self.answer(params.as_ref());
        info!(
            "answered confirmation: conn={} id={} decision={}",
            ctx.connection_id(),
            ctx.request_id(),
            answer["decision"]
        );
        Ok(answer)
    }
}
