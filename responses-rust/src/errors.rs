use llm_engine::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResponsesError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// The previous response id could not be resolved into history.
    #[error("Cannot chain from response {id}: {reason}")]
    ChainResolution { id: String, reason: String },
    /// The assembled context does not fit the engine window and the
    /// truncation policy forbids dropping history.
    #[error("Context of ~{estimated} tokens exceeds the model window of {window}")]
    ContextWindowExceeded { estimated: u32, window: u32 },
    /// A built-in capability was requested with no registered handler.
    #[error("No handler registered for built-in tool capability \"{0}\"")]
    UnsupportedTool(String),
    /// The engine broke the tool_choice contract for the round.
    #[error("Tool choice violation: {0}")]
    ToolChoiceViolation(String),
    /// A tool fault that cannot be recovered locally because the call was
    /// forced by tool_choice.
    #[error("Forced tool call failed: {0}")]
    ToolFault(String),
    /// The tool-orchestration round budget ran out.
    #[error("The maximum number of tool rounds ({0}) has been exceeded")]
    ToolLoopExceeded(usize),
    #[error("Generation engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Response {0} not found")]
    NotFound(String),
    #[error("Invariant: {0}")]
    Invariant(String),
}

impl ResponsesError {
    /// Stable error kind recorded in a failed snapshot's `error` field.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::ChainResolution { .. } => "chain_resolution",
            Self::ContextWindowExceeded { .. } => "context_window_exceeded",
            Self::UnsupportedTool(_) => "unsupported_tool",
            Self::ToolChoiceViolation(_) => "tool_choice_violation",
            Self::ToolFault(_) => "tool_fault",
            Self::ToolLoopExceeded(_) => "tool_loop_exceeded",
            Self::Engine(_) => "engine_fault",
            Self::NotFound(_) => "not_found",
            Self::Invariant(_) => "invariant",
        }
    }
}

pub(crate) type BoxedError = Box<dyn std::error::Error + Send + Sync>;
