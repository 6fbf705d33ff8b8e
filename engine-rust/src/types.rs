use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A part of a conversation item or an engine reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text(TextPart),
    Image(ImagePart),
    File(FilePart),
    ToolCall(ToolCallPart),
    ToolResult(ToolResultPart),
    Reasoning(ReasoningPart),
    Refusal(RefusalPart),
}

/// Delta parts used in partial updates while streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PartDelta {
    Text(TextPartDelta),
    ToolCall(ToolCallPartDelta),
    Reasoning(ReasoningPartDelta),
    Refusal(RefusalPartDelta),
}

/// A message in the conversation context submitted to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
    Tool(ToolMessage),
}

/// A part of the message that contains text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
    /// Citations attached to the text, in document order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<Annotation>>,
}

/// A citation anchored to a span of generated text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Annotation {
    UrlCitation(UrlCitation),
    FileCitation(FileCitation),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlCitation {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Byte offset where the cited span starts.
    pub start_index: usize,
    /// Byte offset one past the end of the cited span.
    pub end_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCitation {
    pub file_id: String,
    pub start_index: usize,
    pub end_index: usize,
}

/// A part of the message that references an image by URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePart {
    pub url: String,
    /// An identifier for the image, if the caller assigned one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A part of the message that references an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePart {
    pub file_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// A part that represents a call to a tool the engine wants to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPart {
    /// The ID of the call, used to match the result with the call.
    pub call_id: String,
    /// The name of the tool or the capability tag of the built-in to call.
    pub name: String,
    /// The arguments to pass to the tool.
    pub args: Value,
}

/// A part that represents the result of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultPart {
    /// The ID of the call from a previous assistant message.
    pub call_id: String,
    pub name: String,
    pub content: Vec<Part>,
    /// Marks the result as an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

// A part that represents the engine's reasoning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReasoningPart {
    pub text: String,
    /// The reasoning internal signature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// A part that marks the engine's refusal to answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefusalPart {
    pub refusal: String,
}

/// An input item sent by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: Vec<Part>,
}

/// An item generated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: Vec<Part>,
}

/// Carries tool results back into the context.
/// The only parts of `ToolMessage` should be `Part::ToolResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMessage {
    pub content: Vec<Part>,
}

/// A delta update for a text part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TextPartDelta {
    pub text: String,
}

/// A delta update for a tool call part, used in streaming of an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ToolCallPartDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The partial JSON string of the arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
}

// A delta update for a reasoning part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReasoningPartDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// A delta update for a refusal part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RefusalPartDelta {
    pub refusal: String,
}

/// A delta update in a reply's content, enabling partial streaming updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentDelta {
    pub index: usize,
    pub part: PartDelta,
}

/// Represents a JSON schema.
pub type JSONSchema = Value;

/// A tool the engine may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolSpec {
    /// A named function whose result is supplied by the caller in a
    /// follow-up request.
    Function(FunctionTool),
    /// A built-in capability resolved by a registered handler.
    Builtin(BuiltinTool),
}

impl ToolSpec {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Function(function) => &function.name,
            Self::Builtin(builtin) => &builtin.capability,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTool {
    pub name: String,
    pub description: String,
    /// The JSON schema of the parameters. The type must be "object".
    pub parameters: JSONSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltinTool {
    /// The capability tag, e.g. "search".
    pub capability: String,
}

/// Determines how the engine should choose which tool to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolChoice {
    /// The engine decides whether to call a tool.
    Auto,
    /// The engine must not call any tool.
    None,
    /// The engine must call at least one tool.
    Required,
    /// The engine must call the named tool.
    Tool(ToolChoiceTool),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolChoiceTool {
    pub name: String,
}

/// Token usage reported by the engine, accumulated across rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub cached_input_tokens: u32,
    pub output_tokens: u32,
    pub reasoning_tokens: u32,
}

impl Usage {
    /// Add another usage sample. Counters only grow.
    pub fn add(&mut self, other: &Self) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.cached_input_tokens = self
            .cached_input_tokens
            .saturating_add(other.cached_input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.reasoning_tokens = self.reasoning_tokens.saturating_add(other.reasoning_tokens);
    }

    #[must_use]
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Why the engine stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Generation ran to a natural stop.
    Stop,
    /// Generation was cut off by the output token bound.
    Length,
}

/// The input parameters for one engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineInput {
    /// System text providing context and guidance to the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// The conversation so far.
    pub messages: Vec<Message>,
    /// Tools the engine may request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    /// Bounds the number of tokens generated in this invocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Amount of randomness injected into the response. Ranges 0.0 to 1.0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling mass. Ranges 0.0 to 1.0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

/// A completed reply from the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineReply {
    pub content: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// A partial reply, yielded while streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PartialReply {
    pub delta: Option<ContentDelta>,
    pub usage: Option<Usage>,
    pub finish_reason: Option<FinishReason>,
}
