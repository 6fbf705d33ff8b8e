use crate::request::{ResponseRequest, Truncation};
use llm_engine::{Annotation, Part, ToolChoice, ToolSpec, Usage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

/// Lifecycle status of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Incomplete,
}

impl ResponseStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Incomplete)
    }
}

/// Status of a single output item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    InProgress,
    Completed,
    Incomplete,
}

/// One top-level unit of a response's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message(OutputMessage),
    FunctionCall(OutputFunctionCall),
    ToolCall(OutputToolCall),
    Reasoning(OutputReasoning),
}

impl OutputItem {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Message(item) => &item.id,
            Self::FunctionCall(item) => &item.id,
            Self::ToolCall(item) => &item.id,
            Self::Reasoning(item) => &item.id,
        }
    }

    #[must_use]
    pub fn status(&self) -> ItemStatus {
        match self {
            Self::Message(item) => item.status,
            Self::FunctionCall(item) => item.status,
            Self::ToolCall(item) => item.status,
            Self::Reasoning(item) => item.status,
        }
    }

    pub(crate) fn set_status(&mut self, status: ItemStatus) {
        match self {
            Self::Message(item) => item.status = status,
            Self::FunctionCall(item) => item.status = status,
            Self::ToolCall(item) => item.status = status,
            Self::Reasoning(item) => item.status = status,
        }
    }
}

/// A generated message and its ordered content parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMessage {
    pub id: String,
    pub status: ItemStatus,
    pub role: String,
    pub content: Vec<OutputContent>,
}

/// A content part of an output message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    OutputText(OutputText),
    Refusal(OutputRefusal),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputText {
    pub text: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRefusal {
    pub refusal: String,
}

/// A call to a caller-defined function. The response suspends until a
/// chained request supplies the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFunctionCall {
    pub id: String,
    pub call_id: String,
    pub name: String,
    /// JSON-encoded arguments, exactly as the engine produced them.
    pub arguments: String,
    pub status: ItemStatus,
}

/// A built-in tool invocation and, once resolved, its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputToolCall {
    pub id: String,
    pub call_id: String,
    pub capability: String,
    pub args: Value,
    /// Result parts, attached when the call resolves.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<Part>,
    #[serde(default)]
    pub is_error: bool,
    pub status: ItemStatus,
}

/// The engine's reasoning for a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputReasoning {
    pub id: String,
    pub status: ItemStatus,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Why a response ended `incomplete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteReason {
    /// Generation was cut off by the output token bound.
    MaxOutputTokens,
    /// The response suspended awaiting an externally supplied function
    /// result, resumable via a chained request.
    FunctionCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompleteDetails {
    pub reason: IncompleteReason,
}

/// Stable error kind plus human-readable detail, set on failed snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InputTokensDetails {
    pub cached_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OutputTokensDetails {
    pub reasoning_tokens: u32,
}

/// Usage counters, frozen at finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResponseUsage {
    pub input_tokens: u32,
    pub input_tokens_details: InputTokensDetails,
    pub output_tokens: u32,
    pub output_tokens_details: OutputTokensDetails,
    pub total_tokens: u32,
}

impl From<&Usage> for ResponseUsage {
    fn from(usage: &Usage) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            input_tokens_details: InputTokensDetails {
                cached_tokens: usage.cached_input_tokens,
            },
            output_tokens: usage.output_tokens,
            output_tokens_details: OutputTokensDetails {
                reasoning_tokens: usage.reasoning_tokens,
            },
            total_tokens: usage.total_tokens(),
        }
    }
}

/// The authoritative record of one generation request's full outcome.
///
/// Mutated in place only while the cycle runs; immutable once a terminal
/// status is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub object: String,
    pub created_at: u64,
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incomplete_details: Option<IncompleteDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub model: String,
    pub output: Vec<OutputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    pub parallel_tool_calls: bool,
    pub truncation: Truncation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResponseUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
    /// Gates persistence. Not part of the wire snapshot.
    #[serde(skip)]
    pub store: bool,
}

impl Response {
    pub(crate) fn from_request(request: &ResponseRequest) -> Self {
        Self {
            id: generate_id("resp"),
            object: "response".to_string(),
            created_at: unix_timestamp(),
            status: ResponseStatus::Queued,
            error: None,
            incomplete_details: None,
            instructions: request.instructions.clone(),
            model: request.model.clone(),
            output: Vec::new(),
            previous_response_id: request.previous_response_id.clone(),
            tools: request.tools.clone(),
            tool_choice: request.tool_choice.clone(),
            parallel_tool_calls: request.parallel_tool_calls,
            truncation: request.truncation,
            temperature: request.temperature,
            top_p: request.top_p,
            max_output_tokens: request.max_output_tokens,
            usage: None,
            metadata: request.metadata.clone(),
            store: request.store,
        }
    }

    /// Concatenation of every `output_text` part across message items.
    #[must_use]
    pub fn output_text(&self) -> String {
        let mut text = String::new();
        for item in &self.output {
            if let OutputItem::Message(message) = item {
                for content in &message.content {
                    if let OutputContent::OutputText(output_text) = content {
                        text.push_str(&output_text.text);
                    }
                }
            }
        }
        text
    }
}

/// A prefixed, collision-resistant identifier, e.g. `resp_1a2b...`.
pub(crate) fn generate_id(prefix: &str) -> String {
    format!("{prefix}_{:032x}", rand::random::<u128>())
}

pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
