mod context;
mod errors;
mod events;
mod opentelemetry;
mod orchestrator;
mod request;
mod response;
mod run;
mod service;
mod store;
mod tool;

pub use errors::ResponsesError;
pub use events::{ResponseEvent, ResponseStream};
pub use request::{ResponseRequest, Truncation};
pub use response::{
    ErrorDetail, IncompleteDetails, IncompleteReason, InputTokensDetails, ItemStatus,
    OutputContent, OutputFunctionCall, OutputItem, OutputMessage, OutputReasoning, OutputRefusal,
    OutputText, OutputToolCall, OutputTokensDetails, Response, ResponseStatus, ResponseUsage,
};
pub use service::{ResponsesService, ServiceParams};
pub use store::{InMemoryResponseStore, ResponseStore};
pub use tool::{ToolHandler, ToolOutput, ToolRegistry};
