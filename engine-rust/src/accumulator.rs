use crate::{
    ContentDelta, EngineError, EngineReply, EngineResult, FinishReason, Part, PartDelta,
    PartialReply, ReasoningPart, RefusalPart, ReasoningPartDelta, RefusalPartDelta, TextPart,
    TextPartDelta, ToolCallPart, ToolCallPartDelta, Usage,
};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct AccumulatedTextData {
    text: String,
}

#[derive(Debug, Clone)]
struct AccumulatedToolCallData {
    call_id: Option<String>,
    name: String,
    args: String,
}

#[derive(Debug, Clone)]
struct AccumulatedReasoningData {
    text: String,
    signature: Option<String>,
}

#[derive(Debug, Clone)]
struct AccumulatedRefusalData {
    refusal: String,
}

/// Accumulated data for the delta-able part kinds.
#[derive(Debug, Clone)]
enum AccumulatedData {
    Text(AccumulatedTextData),
    ToolCall(AccumulatedToolCallData),
    Reasoning(AccumulatedReasoningData),
    Refusal(AccumulatedRefusalData),
}

fn initialize_accumulated_data(delta: ContentDelta) -> AccumulatedData {
    match delta.part {
        PartDelta::Text(text_delta) => AccumulatedData::Text(AccumulatedTextData {
            text: text_delta.text,
        }),
        PartDelta::ToolCall(tool_delta) => AccumulatedData::ToolCall(AccumulatedToolCallData {
            call_id: tool_delta.call_id,
            name: tool_delta.name.unwrap_or_default(),
            args: tool_delta.args.unwrap_or_default(),
        }),
        PartDelta::Reasoning(reasoning_delta) => {
            AccumulatedData::Reasoning(AccumulatedReasoningData {
                text: reasoning_delta.text.unwrap_or_default(),
                signature: reasoning_delta.signature,
            })
        }
        PartDelta::Refusal(refusal_delta) => AccumulatedData::Refusal(AccumulatedRefusalData {
            refusal: refusal_delta.refusal,
        }),
    }
}

fn merge_text_delta(existing: &mut AccumulatedTextData, delta: &TextPartDelta) {
    existing.text.push_str(&delta.text);
}

fn merge_tool_call_delta(existing: &mut AccumulatedToolCallData, delta: ToolCallPartDelta) {
    if delta.call_id.is_some() {
        existing.call_id = delta.call_id;
    }
    if let Some(name) = delta.name {
        existing.name.push_str(&name);
    }
    if let Some(args) = delta.args {
        existing.args.push_str(&args);
    }
}

fn merge_reasoning_delta(existing: &mut AccumulatedReasoningData, delta: ReasoningPartDelta) {
    if let Some(text) = delta.text {
        existing.text.push_str(&text);
    }
    if delta.signature.is_some() {
        existing.signature = delta.signature;
    }
}

fn merge_refusal_delta(existing: &mut AccumulatedRefusalData, delta: &RefusalPartDelta) {
    existing.refusal.push_str(&delta.refusal);
}

fn merge_delta(existing: &mut AccumulatedData, delta: ContentDelta) -> Result<(), String> {
    match (existing, delta.part) {
        (AccumulatedData::Text(ref mut existing_text), PartDelta::Text(text_delta)) => {
            merge_text_delta(existing_text, &text_delta);
        }
        (AccumulatedData::ToolCall(ref mut existing_tool), PartDelta::ToolCall(tool_delta)) => {
            merge_tool_call_delta(existing_tool, tool_delta);
        }
        (
            AccumulatedData::Reasoning(ref mut existing_reasoning),
            PartDelta::Reasoning(reasoning_delta),
        ) => {
            merge_reasoning_delta(existing_reasoning, reasoning_delta);
        }
        (AccumulatedData::Refusal(ref mut existing_refusal), PartDelta::Refusal(refusal_delta)) => {
            merge_refusal_delta(existing_refusal, &refusal_delta);
        }
        _ => Err(format!(
            "Type mismatch at index {}: existing type doesn't match incoming type",
            delta.index
        ))?,
    }

    Ok(())
}

fn parse_tool_call_args(args: &str) -> EngineResult<Value> {
    if args.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }

    serde_json::from_str(args)
        .map_err(|e| EngineError::Invariant("", format!("Invalid tool call arguments: {args}: {e}")))
}

fn create_tool_call_part(data: AccumulatedToolCallData, index: usize) -> EngineResult<Part> {
    let call_id = data.call_id.ok_or_else(|| {
        EngineError::Invariant("", format!("Missing required field call_id at index {index}"))
    })?;

    if data.name.is_empty() {
        return Err(EngineError::Invariant(
            "",
            format!("Missing required field name at index {index}"),
        ));
    }

    Ok(Part::ToolCall(ToolCallPart {
        call_id,
        name: data.name,
        args: parse_tool_call_args(&data.args)?,
    }))
}

fn create_part(data: AccumulatedData, index: usize) -> EngineResult<Part> {
    match data {
        AccumulatedData::Text(text_data) => Ok(Part::Text(TextPart {
            text: text_data.text,
            annotations: None,
        })),
        AccumulatedData::ToolCall(tool_data) => create_tool_call_part(tool_data, index),
        AccumulatedData::Reasoning(reasoning_data) => Ok(Part::Reasoning(ReasoningPart {
            text: reasoning_data.text,
            signature: reasoning_data.signature,
        })),
        AccumulatedData::Refusal(refusal_data) => Ok(Part::Refusal(RefusalPart {
            refusal: refusal_data.refusal,
        })),
    }
}

/// Merges the deltas of a streamed engine round into the reply the
/// non-streaming call would have returned. The concatenation of all text
/// deltas for an index equals that part's final text exactly.
pub struct ReplyAccumulator {
    /// Map of index to accumulated data; `BTreeMap` keeps content in
    /// generation order.
    accumulated_parts: BTreeMap<usize, AccumulatedData>,
    accumulated_usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
}

impl ReplyAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            accumulated_parts: BTreeMap::new(),
            accumulated_usage: None,
            finish_reason: None,
        }
    }

    /// Adds one partial reply to the accumulator.
    ///
    /// # Errors
    /// Returns an error if delta types mismatch for the same index.
    pub fn add_partial(&mut self, partial: PartialReply) -> Result<(), String> {
        if let Some(delta) = partial.delta {
            self.process_delta(delta)?;
        }
        if let Some(usage) = partial.usage {
            self.accumulated_usage
                .get_or_insert_with(Usage::default)
                .add(&usage);
        }
        if partial.finish_reason.is_some() {
            self.finish_reason = partial.finish_reason;
        }
        Ok(())
    }

    /// Computes the final reply from the accumulated deltas.
    ///
    /// # Errors
    /// Returns an error if required fields are missing or tool-call
    /// arguments do not parse.
    pub fn compute_reply(self) -> EngineResult<EngineReply> {
        let content = self
            .accumulated_parts
            .into_iter()
            .map(|(index, data)| create_part(data, index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EngineReply {
            content,
            usage: self.accumulated_usage,
            finish_reason: self.finish_reason,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accumulated_parts.is_empty()
    }

    fn process_delta(&mut self, delta: ContentDelta) -> Result<(), String> {
        let index = delta.index;

        if let Some(existing) = self.accumulated_parts.get_mut(&index) {
            merge_delta(existing, delta)
        } else {
            let accumulated = initialize_accumulated_data(delta);
            self.accumulated_parts.insert(index, accumulated);
            Ok(())
        }
    }
}

impl Default for ReplyAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
