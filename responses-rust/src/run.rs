use crate::{
    context::{self, ResolvedContext},
    events::ResponseEvent,
    orchestrator::{self, RoundPlan},
    request::ResponseRequest,
    response::{
        generate_id, ErrorDetail, IncompleteDetails, IncompleteReason, ItemStatus, OutputContent,
        OutputFunctionCall, OutputItem, OutputMessage, OutputReasoning, OutputRefusal, OutputText,
        OutputToolCall, Response, ResponseStatus, ResponseUsage,
    },
    tool::{ToolOutput, ToolRegistry},
    ResponsesError,
};
use futures::StreamExt;
use llm_engine::{
    Annotation, EngineError, EngineInput, EngineReply, EngineStream, FinishReason,
    GenerationEngine, Message, Part, PartDelta, ReasoningPart, ReplyAccumulator, ToolCallPart,
    ToolChoice, ToolResultPart, ToolSpec, Usage,
};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::sync::mpsc::UnboundedSender;

/// Controller knobs assembled by the service.
#[derive(Debug, Clone)]
pub(crate) struct RunConfig {
    /// Tool-orchestration rounds allowed before the cycle is declared
    /// runaway.
    pub max_tool_rounds: usize,
    /// Additional attempts after a transient engine failure.
    pub engine_retries: usize,
    pub retry_base_delay: Duration,
    /// Window to assume when the engine reports none.
    pub default_context_window: Option<u32>,
}

/// Where state transitions are observed. Streaming is an observability
/// layer over the same mutations; `Null` runs the identical machine
/// silently.
pub(crate) enum EventSink {
    Null,
    Channel(UnboundedSender<ResponseEvent>),
}

/// The snapshot under construction plus its event plumbing. Every mutation
/// that matters to an observer goes through a method here, so the streamed
/// event sequence and the final snapshot can never disagree.
pub(crate) struct RunState {
    response: Response,
    usage: Usage,
    seq: u64,
    sink: EventSink,
    detached: bool,
}

impl RunState {
    pub(crate) fn new(response: Response, sink: EventSink) -> Self {
        Self {
            response,
            usage: Usage::default(),
            seq: 0,
            sink,
            detached: false,
        }
    }

    pub(crate) fn into_response(self) -> Response {
        self.response
    }

    /// True once the consumer hung up on a non-stored response: the
    /// remaining work would be observable by no one.
    pub(crate) fn abandoned(&self) -> bool {
        self.detached && !self.response.store
    }

    fn emit(&mut self, event: ResponseEvent) {
        if let EventSink::Channel(sender) = &self.sink {
            if sender.send(event).is_err() {
                self.sink = EventSink::Null;
                self.detached = true;
            }
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    fn mark_created(&mut self) {
        let sequence_number = self.next_seq();
        let response = self.response.clone();
        self.emit(ResponseEvent::Created {
            sequence_number,
            response,
        });
    }

    fn mark_in_progress(&mut self) {
        if self.response.status != ResponseStatus::Queued {
            return;
        }
        self.response.status = ResponseStatus::InProgress;
        let sequence_number = self.next_seq();
        let response = self.response.clone();
        self.emit(ResponseEvent::InProgress {
            sequence_number,
            response,
        });
    }

    fn add_usage(&mut self, usage: &Usage) {
        self.usage.add(usage);
        self.response.usage = Some(ResponseUsage::from(&self.usage));
    }

    fn push_item(&mut self, item: OutputItem) -> usize {
        let output_index = self.response.output.len();
        self.response.output.push(item.clone());
        let sequence_number = self.next_seq();
        self.emit(ResponseEvent::OutputItemAdded {
            sequence_number,
            output_index,
            item,
        });
        output_index
    }

    fn finish_item(&mut self, output_index: usize, status: ItemStatus) {
        let Some(item) = self.response.output.get_mut(output_index) else {
            return;
        };
        item.set_status(status);
        let item = item.clone();
        let sequence_number = self.next_seq();
        self.emit(ResponseEvent::OutputItemDone {
            sequence_number,
            output_index,
            item,
        });
    }

    fn begin_message(&mut self) -> usize {
        self.push_item(OutputItem::Message(OutputMessage {
            id: generate_id("msg"),
            status: ItemStatus::InProgress,
            role: "assistant".to_string(),
            content: Vec::new(),
        }))
    }

    fn begin_text_part(&mut self, message_index: usize) -> usize {
        let Some(OutputItem::Message(message)) = self.response.output.get_mut(message_index)
        else {
            return 0;
        };
        let content_index = message.content.len();
        message.content.push(OutputContent::OutputText(OutputText {
            text: String::new(),
            annotations: Vec::new(),
        }));
        let item_id = message.id.clone();
        let part = message.content[content_index].clone();
        let sequence_number = self.next_seq();
        self.emit(ResponseEvent::ContentPartAdded {
            sequence_number,
            item_id,
            output_index: message_index,
            content_index,
            part,
        });
        content_index
    }

    fn append_text_delta(&mut self, message_index: usize, content_index: usize, delta: &str) {
        let Some(OutputItem::Message(message)) = self.response.output.get_mut(message_index)
        else {
            return;
        };
        let Some(OutputContent::OutputText(text)) = message.content.get_mut(content_index) else {
            return;
        };
        text.text.push_str(delta);
        let item_id = message.id.clone();
        let sequence_number = self.next_seq();
        self.emit(ResponseEvent::OutputTextDelta {
            sequence_number,
            item_id,
            output_index: message_index,
            content_index,
            delta: delta.to_string(),
        });
    }

    fn finish_text_part(
        &mut self,
        message_index: usize,
        content_index: usize,
        annotations: Option<Vec<Annotation>>,
    ) {
        let Some(OutputItem::Message(message)) = self.response.output.get_mut(message_index)
        else {
            return;
        };
        let Some(OutputContent::OutputText(text)) = message.content.get_mut(content_index) else {
            return;
        };
        if let Some(annotations) = annotations {
            text.annotations = annotations;
        }
        let done_text = text.text.clone();
        let item_id = message.id.clone();
        let part = message.content[content_index].clone();
        let sequence_number = self.next_seq();
        self.emit(ResponseEvent::OutputTextDone {
            sequence_number,
            item_id: item_id.clone(),
            output_index: message_index,
            content_index,
            text: done_text,
        });
        let sequence_number = self.next_seq();
        self.emit(ResponseEvent::ContentPartDone {
            sequence_number,
            item_id,
            output_index: message_index,
            content_index,
            part,
        });
    }

    fn add_refusal_part(&mut self, message_index: usize, refusal: &str) {
        let Some(OutputItem::Message(message)) = self.response.output.get_mut(message_index)
        else {
            return;
        };
        let content_index = message.content.len();
        message.content.push(OutputContent::Refusal(OutputRefusal {
            refusal: refusal.to_string(),
        }));
        let item_id = message.id.clone();
        let part = message.content[content_index].clone();
        let sequence_number = self.next_seq();
        self.emit(ResponseEvent::ContentPartAdded {
            sequence_number,
            item_id: item_id.clone(),
            output_index: message_index,
            content_index,
            part: part.clone(),
        });
        let sequence_number = self.next_seq();
        self.emit(ResponseEvent::ContentPartDone {
            sequence_number,
            item_id,
            output_index: message_index,
            content_index,
            part,
        });
    }

    fn begin_reasoning_item(&mut self) -> usize {
        self.push_item(OutputItem::Reasoning(OutputReasoning {
            id: generate_id("rs"),
            status: ItemStatus::InProgress,
            text: String::new(),
            signature: None,
        }))
    }

    fn finish_reasoning_item(&mut self, output_index: usize, reasoning: &ReasoningPart) {
        if let Some(OutputItem::Reasoning(item)) = self.response.output.get_mut(output_index) {
            item.text = reasoning.text.clone();
            item.signature = reasoning.signature.clone();
        }
        self.finish_item(output_index, ItemStatus::Completed);
    }

    fn push_tool_call_item(&mut self, call: &ToolCallPart) -> usize {
        self.push_item(OutputItem::ToolCall(OutputToolCall {
            id: generate_id("tool"),
            call_id: call.call_id.clone(),
            capability: call.name.clone(),
            args: call.args.clone(),
            output: Vec::new(),
            is_error: false,
            status: ItemStatus::InProgress,
        }))
    }

    fn resolve_tool_call_item(&mut self, output_index: usize, output: &ToolOutput) {
        if let Some(OutputItem::ToolCall(item)) = self.response.output.get_mut(output_index) {
            item.output = output.content.clone();
            item.is_error = output.is_error;
        }
        self.finish_item(output_index, ItemStatus::Completed);
    }

    fn push_function_call_item(&mut self, call: &ToolCallPart) {
        let output_index = self.push_item(OutputItem::FunctionCall(OutputFunctionCall {
            id: generate_id("fc"),
            call_id: call.call_id.clone(),
            name: call.name.clone(),
            arguments: serde_json::to_string(&call.args).unwrap_or_default(),
            status: ItemStatus::InProgress,
        }));
        self.finish_item(output_index, ItemStatus::Completed);
    }

    fn finalize_completed(&mut self) {
        self.response.status = ResponseStatus::Completed;
        let sequence_number = self.next_seq();
        let response = self.response.clone();
        self.emit(ResponseEvent::Completed {
            sequence_number,
            response,
        });
    }

    fn finalize_incomplete(&mut self, reason: IncompleteReason) {
        self.response.status = ResponseStatus::Incomplete;
        self.response.incomplete_details = Some(IncompleteDetails { reason });
        let sequence_number = self.next_seq();
        let response = self.response.clone();
        self.emit(ResponseEvent::Incomplete {
            sequence_number,
            response,
        });
    }

    fn finalize_failed(&mut self, error: &ResponsesError) {
        self.response.status = ResponseStatus::Failed;
        self.response.error = Some(ErrorDetail {
            code: error.code().to_string(),
            message: error.to_string(),
        });
        let sequence_number = self.next_seq();
        let response = self.response.clone();
        self.emit(ResponseEvent::Failed {
            sequence_number,
            response,
        });
    }
}

/// Bookkeeping for items opened while a round streamed, keyed by the
/// engine's delta index so round-end content can be matched back to them.
#[derive(Default)]
struct RoundEmission {
    message_index: Option<usize>,
    text_slots: BTreeMap<usize, usize>,
    reasoning_slots: BTreeMap<usize, usize>,
}

/// Drives one response from `queued` to a terminal status. Never returns an
/// error: every failure is recorded on the snapshot and emitted as the
/// closing event.
pub(crate) async fn drive(
    engine: &Arc<dyn GenerationEngine>,
    registry: &ToolRegistry,
    config: &RunConfig,
    request: &ResponseRequest,
    resolved: ResolvedContext,
    state: &mut RunState,
    streaming: bool,
) {
    state.mark_created();

    if let Err(error) = check_tool_choice(request) {
        state.finalize_failed(&error);
        return;
    }

    let window = engine
        .metadata()
        .and_then(|metadata| metadata.context_window)
        .or(config.default_context_window);

    let ResolvedContext {
        instructions,
        history: mut conversation,
    } = resolved;
    let mut round_choice = request.tool_choice.clone();
    let mut tool_rounds = 0usize;

    loop {
        if let Some(window) = window {
            match context::fit_to_window(
                instructions.as_deref(),
                std::mem::take(&mut conversation),
                window,
                request.truncation,
            ) {
                Ok(fitted) => conversation = fitted,
                Err(error) => {
                    state.finalize_failed(&error);
                    return;
                }
            }
        }

        let input = EngineInput {
            instructions: instructions.clone(),
            messages: conversation.clone(),
            tools: effective_tools(&request.tools, round_choice.as_ref()),
            tool_choice: round_choice.clone(),
            parallel_tool_calls: Some(request.parallel_tool_calls),
            max_output_tokens: request.max_output_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
        };

        state.mark_in_progress();

        let round = if streaming {
            run_streamed_round(engine, config, input, state).await
        } else {
            run_generated_round(engine, config, input).await
        };
        let (reply, emission) = match round {
            Ok(round) => round,
            Err(error) => {
                state.finalize_failed(&error);
                return;
            }
        };

        if state.abandoned() {
            return;
        }

        if let Some(usage) = &reply.usage {
            state.add_usage(usage);
        }

        let plan = match orchestrator::classify_reply(
            &reply.content,
            &request.tools,
            round_choice.as_ref(),
            registry,
        ) {
            Ok(plan) => plan,
            Err(error) => {
                state.finalize_failed(&error);
                return;
            }
        };

        let truncated = reply.finish_reason == Some(FinishReason::Length);
        let message_status = if truncated {
            ItemStatus::Incomplete
        } else {
            ItemStatus::Completed
        };
        record_round_content(state, &reply, emission, message_status);

        if truncated {
            state.finalize_incomplete(IncompleteReason::MaxOutputTokens);
            return;
        }

        match plan {
            RoundPlan::Complete => {
                state.finalize_completed();
                return;
            }
            RoundPlan::Calls { builtin, function } => {
                conversation.push(Message::assistant(reply.content.clone()));

                if !builtin.is_empty() {
                    let resolved_calls = if request.parallel_tool_calls {
                        // all items open, the fan-out resolves, then each
                        // closes in request order
                        let item_indices: Vec<usize> = builtin
                            .iter()
                            .map(|call| state.push_tool_call_item(call))
                            .collect();
                        let resolved = orchestrator::dispatch_parallel(builtin, registry).await;
                        for (item_index, resolved) in item_indices.iter().zip(&resolved) {
                            state.resolve_tool_call_item(*item_index, &resolved.output);
                        }
                        resolved
                    } else {
                        // strictly sequential: each item closes before the
                        // next opens
                        let mut resolved = Vec::with_capacity(builtin.len());
                        for call in builtin {
                            let item_index = state.push_tool_call_item(&call);
                            let resolved_call = orchestrator::dispatch_one(call, registry).await;
                            state.resolve_tool_call_item(item_index, &resolved_call.output);
                            resolved.push(resolved_call);
                        }
                        resolved
                    };

                    let result_parts = resolved_calls
                        .iter()
                        .map(|resolved| {
                            Part::ToolResult(ToolResultPart {
                                call_id: resolved.call.call_id.clone(),
                                name: resolved.call.name.clone(),
                                content: resolved.output.content.clone(),
                                is_error: Some(resolved.output.is_error),
                            })
                        })
                        .collect();
                    conversation.push(Message::tool(result_parts));

                    // a timeout is recovered locally except when this
                    // round's tool_choice forced the call
                    let forced = matches!(
                        round_choice,
                        Some(ToolChoice::Required | ToolChoice::Tool(_))
                    );
                    if forced {
                        if let Some(timed_out) =
                            resolved_calls.iter().find(|resolved| resolved.timed_out)
                        {
                            state.finalize_failed(&ResponsesError::ToolFault(format!(
                                "required tool \"{}\" timed out",
                                timed_out.call.name
                            )));
                            return;
                        }
                    }
                }

                if !function.is_empty() {
                    for call in &function {
                        state.push_function_call_item(call);
                    }
                    state.finalize_incomplete(IncompleteReason::FunctionCall);
                    return;
                }

                if state.abandoned() {
                    return;
                }

                tool_rounds += 1;
                if tool_rounds > config.max_tool_rounds {
                    state.finalize_failed(&ResponsesError::ToolLoopExceeded(
                        config.max_tool_rounds,
                    ));
                    return;
                }

                // a forced choice binds the first round only; keeping it
                // would force a call out of every follow-up round
                if matches!(
                    round_choice,
                    Some(ToolChoice::Required | ToolChoice::Tool(_))
                ) {
                    round_choice = Some(ToolChoice::Auto);
                }
            }
        }
    }
}

fn check_tool_choice(request: &ResponseRequest) -> Result<(), ResponsesError> {
    match &request.tool_choice {
        Some(ToolChoice::Required) if request.tools.is_empty() => {
            Err(ResponsesError::ToolChoiceViolation(
                "tool_choice is required but the tool catalogue is empty".to_string(),
            ))
        }
        Some(ToolChoice::Tool(choice))
            if !request.tools.iter().any(|spec| spec.name() == choice.name) =>
        {
            Err(ResponsesError::ToolChoiceViolation(format!(
                "tool_choice names \"{}\" which is not in the catalogue",
                choice.name
            )))
        }
        _ => Ok(()),
    }
}

/// The eligible catalogue for a round: a specific tool_choice narrows the
/// engine's view to that single spec.
fn effective_tools(tools: &[ToolSpec], choice: Option<&ToolChoice>) -> Option<Vec<ToolSpec>> {
    let eligible: Vec<ToolSpec> = match choice {
        Some(ToolChoice::Tool(tool)) => tools
            .iter()
            .filter(|spec| spec.name() == tool.name)
            .cloned()
            .collect(),
        _ => tools.to_vec(),
    };
    if eligible.is_empty() {
        None
    } else {
        Some(eligible)
    }
}

async fn run_generated_round(
    engine: &Arc<dyn GenerationEngine>,
    config: &RunConfig,
    input: EngineInput,
) -> Result<(EngineReply, RoundEmission), ResponsesError> {
    let mut attempt = 0usize;
    let reply = loop {
        match engine.generate(input.clone()).await {
            Ok(reply) => break reply,
            Err(error) => {
                attempt = bounded_retry(engine, config, attempt, error).await?;
            }
        }
    };
    Ok((reply, RoundEmission::default()))
}

async fn run_streamed_round(
    engine: &Arc<dyn GenerationEngine>,
    config: &RunConfig,
    input: EngineInput,
    state: &mut RunState,
) -> Result<(EngineReply, RoundEmission), ResponsesError> {
    let mut attempt = 0usize;
    let mut stream: EngineStream = loop {
        match engine.stream(input.clone()).await {
            Ok(stream) => break stream,
            Err(error) => {
                attempt = bounded_retry(engine, config, attempt, error).await?;
            }
        }
    };

    let mut accumulator = ReplyAccumulator::new();
    let mut emission = RoundEmission::default();

    while let Some(partial) = stream.next().await {
        let partial = partial?;

        if let Some(delta) = &partial.delta {
            match &delta.part {
                PartDelta::Text(text_delta) => {
                    let message_index = ensure_message(state, &mut emission.message_index);
                    let content_index = match emission.text_slots.get(&delta.index) {
                        Some(content_index) => *content_index,
                        None => {
                            let content_index = state.begin_text_part(message_index);
                            emission.text_slots.insert(delta.index, content_index);
                            content_index
                        }
                    };
                    state.append_text_delta(message_index, content_index, &text_delta.text);
                }
                PartDelta::Reasoning(_) => {
                    if !emission.reasoning_slots.contains_key(&delta.index) {
                        let output_index = state.begin_reasoning_item();
                        emission.reasoning_slots.insert(delta.index, output_index);
                    }
                }
                PartDelta::Refusal(_) => {
                    ensure_message(state, &mut emission.message_index);
                }
                // tool calls surface as items once the round's reply is
                // complete; their argument fragments are not events
                PartDelta::ToolCall(_) => {}
            }
        }

        accumulator
            .add_partial(partial)
            .map_err(|e| ResponsesError::Invariant(format!("failed to accumulate stream: {e}")))?;

        if state.abandoned() {
            return Ok((EngineReply::default(), emission));
        }
    }

    let reply = accumulator.compute_reply()?;
    Ok((reply, emission))
}

/// Sleeps with exponential backoff and hands back the next attempt number,
/// or gives up. Only transient `Unavailable` faults are retried.
async fn bounded_retry(
    engine: &Arc<dyn GenerationEngine>,
    config: &RunConfig,
    attempt: usize,
    error: EngineError,
) -> Result<usize, ResponsesError> {
    if !matches!(error, EngineError::Unavailable(_, _)) || attempt >= config.engine_retries {
        return Err(error.into());
    }
    let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
    let delay = config.retry_base_delay * 2u32.saturating_pow(exponent);
    tracing::warn!(
        provider = engine.provider(),
        attempt,
        "engine unavailable, retrying in {delay:?}: {error}"
    );
    tokio::time::sleep(delay).await;
    Ok(attempt + 1)
}

fn ensure_message(state: &mut RunState, message_index: &mut Option<usize>) -> usize {
    match message_index {
        Some(index) => *index,
        None => {
            let index = state.begin_message();
            *message_index = Some(index);
            index
        }
    }
}

/// Folds the round's final content into the snapshot. Parts that streamed
/// live are finished in place; everything else is added whole. Both the
/// streamed and non-streamed paths end at the same items.
fn record_round_content(
    state: &mut RunState,
    reply: &EngineReply,
    emission: RoundEmission,
    message_status: ItemStatus,
) {
    let RoundEmission {
        mut message_index,
        text_slots,
        reasoning_slots,
    } = emission;
    let mut text_slot_iter = text_slots.into_values();
    let mut reasoning_slot_iter = reasoning_slots.into_values();

    for part in &reply.content {
        match part {
            Part::Text(text) => {
                let message = ensure_message(state, &mut message_index);
                match text_slot_iter.next() {
                    Some(content_index) => {
                        state.finish_text_part(message, content_index, text.annotations.clone());
                    }
                    None => {
                        let content_index = state.begin_text_part(message);
                        state.append_text_delta(message, content_index, &text.text);
                        state.finish_text_part(message, content_index, text.annotations.clone());
                    }
                }
            }
            Part::Refusal(refusal) => {
                let message = ensure_message(state, &mut message_index);
                state.add_refusal_part(message, &refusal.refusal);
            }
            Part::Reasoning(reasoning) => match reasoning_slot_iter.next() {
                Some(output_index) => state.finish_reasoning_item(output_index, reasoning),
                None => {
                    let output_index = state.begin_reasoning_item();
                    state.finish_reasoning_item(output_index, reasoning);
                }
            },
            Part::ToolCall(_) | Part::ToolResult(_) | Part::Image(_) | Part::File(_) => {}
        }
    }

    if let Some(message) = message_index {
        state.finish_item(message, message_status);
    }
}
