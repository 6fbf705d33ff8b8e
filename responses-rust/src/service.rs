use crate::{
    context::{self, ResolvedContext},
    events::ResponseStream,
    opentelemetry,
    request::ResponseRequest,
    response::Response,
    run::{self, EventSink, RunConfig, RunState},
    store::ResponseStore,
    tool::{ToolHandler, ToolRegistry},
    ResponsesError,
};
use async_stream::stream;
use llm_engine::GenerationEngine;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;

/// The orchestration facade: turns requests into terminal response
/// snapshots, optionally streaming ordered events along the way.
///
/// Each call processes one response as an independent unit of work; calls
/// may proceed fully in parallel, sharing nothing but the store.
pub struct ResponsesService {
    engine: Arc<dyn GenerationEngine>,
    store: Arc<dyn ResponseStore>,
    registry: Arc<ToolRegistry>,
    config: RunConfig,
}

impl ResponsesService {
    #[must_use]
    pub fn new(params: ServiceParams) -> Self {
        Self {
            engine: params.engine,
            store: params.store,
            registry: Arc::new(params.registry),
            config: RunConfig {
                max_tool_rounds: params.max_tool_rounds,
                engine_retries: params.engine_retries,
                retry_base_delay: params.retry_base_delay,
                default_context_window: params.default_context_window,
            },
        }
    }

    pub fn builder(
        engine: Arc<dyn GenerationEngine>,
        store: Arc<dyn ResponseStore>,
    ) -> ServiceParams {
        ServiceParams::new(engine, store)
    }

    /// Generate one response and return its terminal snapshot.
    ///
    /// Request-shape problems (`InvalidRequest`, `ChainResolution`) surface
    /// as `Err`; anything that happens after the snapshot exists is
    /// recorded on it instead, so a failed generation still returns `Ok`
    /// with status `failed` and partial output preserved.
    pub async fn create(&self, request: ResponseRequest) -> Result<Response, ResponsesError> {
        let model = request.model.clone();
        opentelemetry::trace_create(&model, self.create_inner(request)).await
    }

    async fn create_inner(&self, request: ResponseRequest) -> Result<Response, ResponsesError> {
        request.validate()?;
        let resolved = self.resolve_context(&request).await?;

        let mut state = RunState::new(Response::from_request(&request), EventSink::Null);
        run::drive(
            &self.engine,
            &self.registry,
            &self.config,
            &request,
            resolved,
            &mut state,
            false,
        )
        .await;

        let response = state.into_response();
        self.store.put(response.clone()).await?;
        Ok(response)
    }

    /// Generate one response, delivering ordered events as it progresses.
    ///
    /// The cycle runs in its own task. Dropping the stream stops delivery;
    /// a stored response still runs to completion in the background, a
    /// non-stored one is abandoned at the next round boundary.
    pub async fn create_stream(
        &self,
        request: ResponseRequest,
    ) -> Result<ResponseStream, ResponsesError> {
        request.validate()?;
        let resolved = self.resolve_context(&request).await?;
        let model = request.model.clone();

        let (sender, mut receiver) = mpsc::unbounded_channel();
        let engine = self.engine.clone();
        let registry = self.registry.clone();
        let config = self.config.clone();
        let store = self.store.clone();

        tokio::spawn(async move {
            let mut state =
                RunState::new(Response::from_request(&request), EventSink::Channel(sender));
            run::drive(
                &engine, &registry, &config, &request, resolved, &mut state, true,
            )
            .await;

            let response = state.into_response();
            if response.status.is_terminal() {
                if let Err(error) = store.put(response).await {
                    tracing::error!("failed to persist response snapshot: {error}");
                }
            }
        });

        let events = stream! {
            while let Some(event) = receiver.recv().await {
                yield event;
            }
        };

        Ok(opentelemetry::trace_create_stream(&model, events))
    }

    /// Retrieve a stored snapshot.
    pub async fn get(&self, id: &str) -> Result<Response, ResponsesError> {
        self.store.get(id).await
    }

    /// Evict a stored snapshot.
    pub async fn delete(&self, id: &str) -> Result<(), ResponsesError> {
        self.store.delete(id).await
    }

    async fn resolve_context(
        &self,
        request: &ResponseRequest,
    ) -> Result<ResolvedContext, ResponsesError> {
        let parent = match &request.previous_response_id {
            Some(id) => match self.store.get(id).await {
                Ok(parent) => Some(parent),
                // resolve() turns the missing parent into ChainResolution
                Err(ResponsesError::NotFound(_)) => None,
                Err(error) => return Err(error),
            },
            None => None,
        };
        context::resolve(request, parent.as_ref())
    }
}

/// Parameters required to build a `ResponsesService`.
/// # Default Values
/// - `max_tool_rounds`: 10
/// - `engine_retries`: 2
/// - `retry_base_delay`: 200ms
/// - `default_context_window`: `None`
pub struct ServiceParams {
    /// The generation engine driven by the cycle controller.
    pub engine: Arc<dyn GenerationEngine>,
    /// Persistence for terminal snapshots, also consulted for chaining.
    pub store: Arc<dyn ResponseStore>,
    /// Handlers for built-in tool capabilities.
    pub registry: ToolRegistry,
    /// Tool-orchestration rounds allowed per response.
    pub max_tool_rounds: usize,
    /// Additional engine attempts after a transient failure.
    pub engine_retries: usize,
    pub retry_base_delay: Duration,
    /// Context window assumed when the engine reports none. Truncation is
    /// skipped entirely without a window from either side.
    pub default_context_window: Option<u32>,
}

impl ServiceParams {
    pub fn new(engine: Arc<dyn GenerationEngine>, store: Arc<dyn ResponseStore>) -> Self {
        Self {
            engine,
            store,
            registry: ToolRegistry::new(),
            max_tool_rounds: 10,
            engine_retries: 2,
            retry_base_delay: Duration::from_millis(200),
            default_context_window: None,
        }
    }

    /// Register a handler for a built-in capability.
    #[must_use]
    pub fn add_tool(mut self, handler: impl ToolHandler + 'static) -> Self {
        self.registry.register(Arc::new(handler));
        self
    }

    /// Register a handler with its own invocation timeout.
    #[must_use]
    pub fn add_tool_with_timeout(
        mut self,
        handler: impl ToolHandler + 'static,
        timeout: Duration,
    ) -> Self {
        self.registry
            .register_with_timeout(Arc::new(handler), timeout);
        self
    }

    /// Set the timeout applied to capabilities without their own.
    #[must_use]
    pub fn default_tool_timeout(mut self, timeout: Duration) -> Self {
        self.registry.set_default_timeout(timeout);
        self
    }

    /// Set the tool-round budget.
    #[must_use]
    pub fn max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    /// Set how many times a transient engine fault is retried.
    #[must_use]
    pub fn engine_retries(mut self, engine_retries: usize) -> Self {
        self.engine_retries = engine_retries;
        self
    }

    /// Set the base delay of the exponential retry backoff.
    #[must_use]
    pub fn retry_base_delay(mut self, retry_base_delay: Duration) -> Self {
        self.retry_base_delay = retry_base_delay;
        self
    }

    /// Set the context window assumed when the engine reports none.
    #[must_use]
    pub fn default_context_window(mut self, default_context_window: u32) -> Self {
        self.default_context_window = Some(default_context_window);
        self
    }

    #[must_use]
    pub fn build(self) -> ResponsesService {
        ResponsesService::new(self)
    }
}
