use std::{collections::VecDeque, sync::Mutex};

use futures::stream;

use crate::{
    engine::{EngineMetadata, EngineStream, GenerationEngine},
    errors::{EngineError, EngineResult},
    EngineInput, EngineReply, PartialReply,
};

/// Result for a mocked `generate` call.
/// It can either be a full reply or an error to return.
pub enum MockGenerateResult {
    Reply(EngineReply),
    Error(EngineError),
}

impl MockGenerateResult {
    /// Construct a result that yields the provided reply.
    pub fn reply(reply: EngineReply) -> Self {
        Self::Reply(reply)
    }

    /// Construct a result that yields the provided error.
    pub fn error(error: EngineError) -> Self {
        Self::Error(error)
    }
}

impl From<EngineReply> for MockGenerateResult {
    fn from(reply: EngineReply) -> Self {
        Self::reply(reply)
    }
}

impl From<EngineResult<EngineReply>> for MockGenerateResult {
    fn from(result: EngineResult<EngineReply>) -> Self {
        match result {
            Ok(reply) => Self::Reply(reply),
            Err(error) => Self::Error(error),
        }
    }
}

/// Result for a mocked `stream` call.
/// It can either be a set of partial replies or an error to return.
pub enum MockStreamResult {
    Partials(Vec<PartialReply>),
    Error(EngineError),
}

impl MockStreamResult {
    /// Construct a result that yields the provided partial replies.
    pub fn partials(partials: Vec<PartialReply>) -> Self {
        Self::Partials(partials)
    }

    /// Construct a result that yields the provided error.
    pub fn error(error: EngineError) -> Self {
        Self::Error(error)
    }
}

impl From<Vec<PartialReply>> for MockStreamResult {
    fn from(partials: Vec<PartialReply>) -> Self {
        Self::partials(partials)
    }
}

impl From<PartialReply> for MockStreamResult {
    fn from(partial: PartialReply) -> Self {
        Self::partials(vec![partial])
    }
}

#[derive(Default)]
struct MockEngineState {
    mocked_generate_results: VecDeque<MockGenerateResult>,
    mocked_stream_results: VecDeque<MockStreamResult>,
    tracked_generate_inputs: Vec<EngineInput>,
    tracked_stream_inputs: Vec<EngineInput>,
}

/// A mock engine for testing that tracks inputs and yields predefined
/// outputs.
pub struct MockEngine {
    provider: &'static str,
    model_id: String,
    metadata: Option<EngineMetadata>,
    state: Mutex<MockEngineState>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            provider: "mock",
            model_id: "mock-model".to_string(),
            metadata: None,
            state: Mutex::new(MockEngineState::default()),
        }
    }
}

impl MockEngine {
    /// Construct a new mock engine instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the provider identifier returned by the mock.
    pub fn set_provider(&mut self, provider: &'static str) {
        self.provider = provider;
    }

    /// Override the model identifier returned by the mock.
    pub fn set_model_id<S: Into<String>>(&mut self, model_id: S) {
        self.model_id = model_id.into();
    }

    /// Override the metadata returned by the mock.
    pub fn set_metadata(&mut self, metadata: Option<EngineMetadata>) {
        self.metadata = metadata;
    }

    /// Enqueue one or more mocked generate results.
    pub fn enqueue_generate_results<I>(&self, results: I) -> &Self
    where
        I: IntoIterator<Item = MockGenerateResult>,
    {
        let mut state = self.state.lock().expect("mock state poisoned");
        for result in results {
            state.mocked_generate_results.push_back(result);
        }
        drop(state);
        self
    }

    /// Convenience to enqueue a single mocked generate result.
    pub fn enqueue_generate<R>(&self, result: R) -> &Self
    where
        R: Into<MockGenerateResult>,
    {
        self.enqueue_generate_results(std::iter::once(result.into()))
    }

    /// Enqueue one or more mocked stream results.
    pub fn enqueue_stream_results<I>(&self, results: I) -> &Self
    where
        I: IntoIterator<Item = MockStreamResult>,
    {
        let mut state = self.state.lock().expect("mock state poisoned");
        for result in results {
            state.mocked_stream_results.push_back(result);
        }
        drop(state);
        self
    }

    /// Convenience to enqueue a single mocked stream result.
    pub fn enqueue_stream<R>(&self, result: R) -> &Self
    where
        R: Into<MockStreamResult>,
    {
        self.enqueue_stream_results(std::iter::once(result.into()))
    }

    /// Retrieve the tracked generate inputs accumulated so far.
    pub fn tracked_generate_inputs(&self) -> Vec<EngineInput> {
        let state = self.state.lock().expect("mock state poisoned");
        state.tracked_generate_inputs.clone()
    }

    /// Retrieve the tracked stream inputs accumulated so far.
    pub fn tracked_stream_inputs(&self) -> Vec<EngineInput> {
        let state = self.state.lock().expect("mock state poisoned");
        state.tracked_stream_inputs.clone()
    }

    /// Reset tracked inputs without touching enqueued results.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.tracked_generate_inputs.clear();
        state.tracked_stream_inputs.clear();
    }

    /// Clear both tracked inputs and enqueued results.
    pub fn restore(&self) {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.mocked_generate_results.clear();
        state.mocked_stream_results.clear();
        state.tracked_generate_inputs.clear();
        state.tracked_stream_inputs.clear();
    }
}

#[async_trait::async_trait]
impl GenerationEngine for MockEngine {
    fn provider(&self) -> &'static str {
        self.provider
    }

    fn model_id(&self) -> String {
        self.model_id.clone()
    }

    fn metadata(&self) -> Option<&EngineMetadata> {
        self.metadata.as_ref()
    }

    async fn generate(&self, input: EngineInput) -> EngineResult<EngineReply> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.tracked_generate_inputs.push(input.clone());

        let result = state.mocked_generate_results.pop_front().ok_or_else(|| {
            EngineError::Invariant(self.provider, "no mocked generate results available".into())
        })?;

        match result {
            MockGenerateResult::Reply(reply) => Ok(reply),
            MockGenerateResult::Error(error) => Err(error),
        }
    }

    async fn stream(&self, input: EngineInput) -> EngineResult<EngineStream> {
        let mut state = self.state.lock().expect("mock state poisoned");

        let result = state.mocked_stream_results.pop_front().ok_or_else(|| {
            EngineError::Invariant(self.provider, "no mocked stream results available".into())
        })?;

        state.tracked_stream_inputs.push(input.clone());

        match result {
            MockStreamResult::Error(error) => Err(error),
            MockStreamResult::Partials(partials) => {
                let iter = stream::iter(partials.into_iter().map(Ok));
                Ok(EngineStream::from_stream(iter))
            }
        }
    }
}
