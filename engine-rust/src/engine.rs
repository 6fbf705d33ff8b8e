use std::{
    pin::Pin,
    task::{Context, Poll},
};

use crate::{EngineInput, EngineReply, EngineResult, PartialReply};
use futures::Stream;

/// Static properties of an engine that the orchestration layer consults.
#[derive(Debug, Clone, Default)]
pub struct EngineMetadata {
    /// The size of the engine's context window, in tokens.
    pub context_window: Option<u32>,
}

/// The opaque generation capability this crate orchestrates around.
///
/// Implementations accept a conversation context plus a tool catalogue and
/// return either a completed message, a set of tool-call requests, or a
/// function-call request, expressed uniformly as reply content parts.
#[async_trait::async_trait]
pub trait GenerationEngine: Send + Sync {
    fn provider(&self) -> &'static str;
    fn model_id(&self) -> String;
    fn metadata(&self) -> Option<&EngineMetadata> {
        None
    }
    async fn generate(&self, input: EngineInput) -> EngineResult<EngineReply>;
    async fn stream(&self, input: EngineInput) -> EngineResult<EngineStream>;
}

pub struct EngineStream(Pin<Box<dyn Stream<Item = EngineResult<PartialReply>> + Send>>);

impl EngineStream {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = EngineResult<PartialReply>> + Send + 'static,
    {
        Self(Box::pin(stream))
    }
}

impl Stream for EngineStream {
    type Item = EngineResult<PartialReply>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.0.as_mut().poll_next(cx)
    }
}
