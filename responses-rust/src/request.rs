use crate::ResponsesError;
use llm_engine::{Message, ToolChoice, ToolSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub(crate) const METADATA_MAX_PAIRS: usize = 16;
pub(crate) const METADATA_MAX_KEY_LEN: usize = 64;
pub(crate) const METADATA_MAX_VALUE_LEN: usize = 512;

/// Rule for handling a context that exceeds the engine's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    /// Drop the oldest middle history until the context fits, preserving
    /// instructions and the most recent turn.
    Auto,
    /// Fail the response with `ContextWindowExceeded` instead of dropping
    /// anything.
    #[default]
    Disabled,
}

/// An immutable request to generate one response.
///
/// # Default Values
/// - `parallel_tool_calls`: `true`
/// - `truncation`: `Truncation::Disabled`
/// - `store`: `true`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRequest {
    /// Identifier of the model the engine should run.
    pub model: String,
    /// Ordered role-tagged input items for this turn.
    pub input: Vec<Message>,
    /// System text for this turn. Never inherited from a chained parent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Id of a stored response whose output seeds this turn's history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    /// Tools the engine may request, in catalogue order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Dispatch independent calls of one round concurrently.
    #[serde(default = "default_true")]
    pub parallel_tool_calls: bool,
    #[serde(default)]
    pub truncation: Truncation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Persist the terminal snapshot for later retrieval and chaining.
    #[serde(default = "default_true")]
    pub store: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

fn default_true() -> bool {
    true
}

impl ResponseRequest {
    pub fn new(model: impl Into<String>, input: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            input,
            instructions: None,
            previous_response_id: None,
            tools: Vec::new(),
            tool_choice: None,
            parallel_tool_calls: true,
            truncation: Truncation::Disabled,
            max_output_tokens: None,
            temperature: None,
            top_p: None,
            store: true,
            metadata: None,
        }
    }

    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    #[must_use]
    pub fn previous_response_id(mut self, id: impl Into<String>) -> Self {
        self.previous_response_id = Some(id.into());
        self
    }

    /// Add a tool spec to the catalogue.
    #[must_use]
    pub fn add_tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    #[must_use]
    pub fn tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    #[must_use]
    pub fn parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    #[must_use]
    pub fn truncation(mut self, truncation: Truncation) -> Self {
        self.truncation = truncation;
        self
    }

    #[must_use]
    pub fn max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    #[must_use]
    pub fn store(mut self, store: bool) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ResponsesError> {
        if self.model.is_empty() {
            return Err(ResponsesError::InvalidRequest("model must be set".into()));
        }

        if let Some(metadata) = &self.metadata {
            if metadata.len() > METADATA_MAX_PAIRS {
                return Err(ResponsesError::InvalidRequest(format!(
                    "metadata holds {} pairs, the maximum is {METADATA_MAX_PAIRS}",
                    metadata.len()
                )));
            }
            for (key, value) in metadata {
                if key.len() > METADATA_MAX_KEY_LEN {
                    return Err(ResponsesError::InvalidRequest(format!(
                        "metadata key \"{key}\" exceeds {METADATA_MAX_KEY_LEN} characters"
                    )));
                }
                if value.len() > METADATA_MAX_VALUE_LEN {
                    return Err(ResponsesError::InvalidRequest(format!(
                        "metadata value for \"{key}\" exceeds {METADATA_MAX_VALUE_LEN} characters"
                    )));
                }
            }
        }

        Ok(())
    }
}
