use crate::{
    errors::BoxedError,
    events::{ResponseEvent, ResponseStream},
    response::{Response, ResponseUsage},
    tool::{ToolHandler, ToolOutput},
    ResponsesError,
};
use async_stream::stream;
use futures::{pin_mut, StreamExt};
use opentelemetry::trace::Status;
use serde_json::Value;
use std::future::Future;
use tracing::{info_span, Span};
use tracing_futures::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

#[derive(Clone, Copy)]
pub(crate) enum ResponseSpanMethod {
    Create,
    CreateStream,
}

impl ResponseSpanMethod {
    fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::CreateStream => "create_stream",
        }
    }
}

pub(crate) struct ResponseSpan {
    span: Span,
    usage: Option<ResponseUsage>,
}

impl ResponseSpan {
    pub(crate) fn new(model: &str, method: ResponseSpanMethod) -> Self {
        let span = match method {
            ResponseSpanMethod::Create => info_span!("llm_responses.create"),
            ResponseSpanMethod::CreateStream => info_span!("llm_responses.create_stream"),
        };
        span.set_attribute("gen_ai.operation.name", "generate_content");
        span.set_attribute("gen_ai.request.model", model.to_string());
        span.set_attribute("llm_responses.method", method.as_str());

        Self { span, usage: None }
    }

    pub(crate) fn span(&self) -> Span {
        self.span.clone()
    }

    fn on_response(&mut self, response: &Response) {
        self.span
            .set_attribute("llm_responses.id", response.id.clone());
        self.span
            .set_attribute("llm_responses.status", format!("{:?}", response.status));
        if let Some(error) = &response.error {
            self.span
                .set_attribute("exception.message", error.message.clone());
            self.span.set_status(Status::error(error.message.clone()));
        }
        self.usage = response.usage;
    }

    fn on_error(&mut self, error: &ResponsesError) {
        self.span
            .set_attribute("exception.message", error.to_string());
        self.span.set_status(Status::error(error.to_string()));
    }

    fn on_end(&mut self) {
        if let Some(usage) = &self.usage {
            self.span.set_attribute(
                "gen_ai.usage.input_tokens",
                i64::from(usage.input_tokens),
            );
            self.span.set_attribute(
                "gen_ai.usage.output_tokens",
                i64::from(usage.output_tokens),
            );
        }
    }
}

impl Drop for ResponseSpan {
    fn drop(&mut self) {
        self.on_end();
    }
}

/// Wraps one tool invocation in a span carrying the gen-ai tool attributes.
pub(crate) async fn invoke_tool_traced(
    call_id: &str,
    handler: &dyn ToolHandler,
    args: Value,
) -> Result<ToolOutput, BoxedError> {
    let span = info_span!("llm_responses.tool");
    span.set_attribute("gen_ai.operation.name", "execute_tool");
    span.set_attribute("gen_ai.tool.call.id", call_id.to_string());
    span.set_attribute("gen_ai.tool.name", handler.capability());
    span.set_attribute("gen_ai.tool.description", handler.description());
    span.set_attribute("gen_ai.tool.type", "builtin");

    match handler.invoke(args).instrument(span.clone()).await {
        Ok(result) => Ok(result),
        Err(err) => {
            span.set_attribute("exception.message", err.to_string());
            span.set_status(Status::error(err.to_string()));
            Err(err)
        }
    }
}

pub(crate) async fn trace_create<Fut>(
    model: &str,
    future: Fut,
) -> Result<Response, ResponsesError>
where
    Fut: Future<Output = Result<Response, ResponsesError>> + Send,
{
    let mut span = ResponseSpan::new(model, ResponseSpanMethod::Create);
    let result = future.instrument(span.span()).await;

    match &result {
        Ok(response) => span.on_response(response),
        Err(error) => span.on_error(error),
    }

    span.on_end();
    result
}

pub(crate) fn trace_create_stream<S>(model: &str, events: S) -> ResponseStream
where
    S: futures::Stream<Item = ResponseEvent> + Send + 'static,
{
    let response_span = ResponseSpan::new(model, ResponseSpanMethod::CreateStream);
    let span_handle = response_span.span();

    let instrumented = stream! {
        let mut span = response_span;
        let events = events;
        pin_mut!(events);

        while let Some(event) = events.next().await {
            if let Some(response) = event.terminal_response() {
                span.on_response(response);
                span.on_end();
            }
            yield event;
        }
    }
    .instrument(span_handle);

    ResponseStream::from_stream(instrumented)
}
