use crate::errors::BoxedError;
use async_trait::async_trait;
use llm_engine::{JSONSchema, Part};
use serde_json::Value;
use std::{collections::HashMap, fmt::Debug, sync::Arc, time::Duration};

/// A handler for a built-in tool capability. Any type implementing
/// `ToolHandler` can be registered with the service and is dispatched
/// whenever the engine requests its capability tag.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The capability tag this handler resolves, e.g. "search".
    fn capability(&self) -> String;
    /// A description of the tool to instruct the engine how and when to
    /// use it.
    fn description(&self) -> String;
    /// The JSON schema of the parameters the tool accepts. The type must
    /// be "object".
    fn parameters(&self) -> JSONSchema;
    /// Resolve one invocation.
    ///
    /// A returned error is recorded as an `is_error` result on the call —
    /// it never fails the response. Other independent calls of the round
    /// still resolve.
    async fn invoke(&self, args: Value) -> Result<ToolOutput, BoxedError>;
}

impl Debug for dyn ToolHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolHandler")
            .field("capability", &self.capability())
            .field("description", &self.description())
            .field("parameters", &self.parameters())
            .field("invoke", &"Function")
            .finish()
    }
}

/// The resolved payload of one tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: Vec<Part>,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Part::text(text)],
            is_error: false,
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            content: vec![Part::text(detail)],
            is_error: true,
        }
    }
}

/// Registered built-in tool handlers, keyed by capability tag, with
/// per-capability invocation timeouts.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    default_timeout: Option<Duration>,
    timeouts: HashMap<String, Duration>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(handler.capability(), handler);
    }

    pub fn register_with_timeout(&mut self, handler: Arc<dyn ToolHandler>, timeout: Duration) {
        self.timeouts.insert(handler.capability(), timeout);
        self.register(handler);
    }

    /// Timeout applied to every capability without its own entry.
    pub fn set_default_timeout(&mut self, timeout: Duration) {
        self.default_timeout = Some(timeout);
    }

    #[must_use]
    pub fn get(&self, capability: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(capability).cloned()
    }

    #[must_use]
    pub fn timeout_for(&self, capability: &str) -> Option<Duration> {
        self.timeouts
            .get(capability)
            .copied()
            .or(self.default_timeout)
    }
}
