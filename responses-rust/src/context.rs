use crate::{
    request::{ResponseRequest, Truncation},
    response::{ItemStatus, OutputContent, OutputItem, Response, ResponseStatus},
    ResponsesError,
};
use llm_engine::{Message, Part, TextPart, ToolResultPart};
use serde_json::Value;

/// The effective input context for one response, rebuilt from the request
/// and, when chaining, the parent snapshot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedContext {
    /// This request's own instructions. Deliberately never inherited from
    /// the parent: instructions are swappable per turn while history is not.
    pub instructions: Option<String>,
    pub history: Vec<Message>,
}

/// Pure function of the request and the looked-up parent snapshot.
pub(crate) fn resolve(
    request: &ResponseRequest,
    parent: Option<&Response>,
) -> Result<ResolvedContext, ResponsesError> {
    let mut history = Vec::new();

    if let Some(id) = &request.previous_response_id {
        let parent = parent.ok_or_else(|| ResponsesError::ChainResolution {
            id: id.clone(),
            reason: "response not found".to_string(),
        })?;

        if !matches!(
            parent.status,
            ResponseStatus::Completed | ResponseStatus::Incomplete
        ) {
            return Err(ResponsesError::ChainResolution {
                id: id.clone(),
                reason: format!("response has no usable history in its current state ({:?})", parent.status),
            });
        }

        history.extend(parent_history(parent));
    }

    history.extend(request.input.iter().cloned());

    Ok(ResolvedContext {
        instructions: request.instructions.clone(),
        history,
    })
}

/// Re-expresses a parent's output as context messages: message content and
/// resolved tool results, in output order. In-flight and failed items are
/// excluded; completed function calls are kept so a chained result can be
/// matched to its call. Reasoning items never re-enter the context.
fn parent_history(parent: &Response) -> Vec<Message> {
    let mut messages = Vec::new();

    for item in &parent.output {
        match item {
            OutputItem::Message(message) if message.status == ItemStatus::Completed => {
                let parts = message
                    .content
                    .iter()
                    .map(|content| match content {
                        OutputContent::OutputText(text) => Part::Text(TextPart {
                            text: text.text.clone(),
                            annotations: if text.annotations.is_empty() {
                                None
                            } else {
                                Some(text.annotations.clone())
                            },
                        }),
                        OutputContent::Refusal(refusal) => Part::refusal(refusal.refusal.clone()),
                    })
                    .collect();
                messages.push(Message::assistant(parts));
            }
            OutputItem::FunctionCall(call) if call.status == ItemStatus::Completed => {
                let args = serde_json::from_str(&call.arguments)
                    .unwrap_or(Value::String(call.arguments.clone()));
                messages.push(Message::assistant(vec![Part::tool_call(
                    call.call_id.clone(),
                    call.name.clone(),
                    args,
                )]));
            }
            OutputItem::ToolCall(call) if call.status == ItemStatus::Completed => {
                messages.push(Message::assistant(vec![Part::tool_call(
                    call.call_id.clone(),
                    call.capability.clone(),
                    call.args.clone(),
                )]));
                messages.push(Message::tool(vec![Part::ToolResult(ToolResultPart {
                    call_id: call.call_id.clone(),
                    name: call.capability.clone(),
                    content: call.output.clone(),
                    is_error: Some(call.is_error),
                })]));
            }
            _ => {}
        }
    }

    messages
}

const CHARS_PER_TOKEN: u32 = 4;
const IMAGE_REFERENCE_TOKENS: u32 = 85;
const FILE_REFERENCE_TOKENS: u32 = 170;
const MESSAGE_OVERHEAD_TOKENS: u32 = 3;

fn text_tokens(text: &str) -> u32 {
    let len = u32::try_from(text.len()).unwrap_or(u32::MAX);
    len.div_ceil(CHARS_PER_TOKEN)
}

fn part_tokens(part: &Part) -> u32 {
    match part {
        Part::Text(text) => text_tokens(&text.text),
        Part::Image(_) => IMAGE_REFERENCE_TOKENS,
        Part::File(_) => FILE_REFERENCE_TOKENS,
        Part::ToolCall(call) => text_tokens(&call.name) + text_tokens(&call.args.to_string()),
        Part::ToolResult(result) => result.content.iter().map(part_tokens).sum::<u32>(),
        Part::Reasoning(reasoning) => text_tokens(&reasoning.text),
        Part::Refusal(refusal) => text_tokens(&refusal.refusal),
    }
}

fn message_tokens(message: &Message) -> u32 {
    MESSAGE_OVERHEAD_TOKENS + message.content().iter().map(part_tokens).sum::<u32>()
}

/// A rough, monotonic token estimate for the assembled context.
pub(crate) fn estimate_tokens(instructions: Option<&str>, history: &[Message]) -> u32 {
    instructions.map(text_tokens).unwrap_or_default()
        + history.iter().map(message_tokens).sum::<u32>()
}

/// Applies the truncation policy before a round.
///
/// Under `auto`, oldest history items are dropped one at a time until the
/// estimate fits the window; instructions and the most recent turn (the
/// last user message onward) are never dropped. Under `disabled`, an
/// oversized context fails immediately.
pub(crate) fn fit_to_window(
    instructions: Option<&str>,
    mut history: Vec<Message>,
    window: u32,
    policy: Truncation,
) -> Result<Vec<Message>, ResponsesError> {
    let mut estimated = estimate_tokens(instructions, &history);
    if estimated <= window {
        return Ok(history);
    }

    if policy == Truncation::Disabled {
        return Err(ResponsesError::ContextWindowExceeded { estimated, window });
    }

    let last_turn_start = history
        .iter()
        .rposition(|message| matches!(message, Message::User(_)))
        .unwrap_or(history.len().saturating_sub(1));
    let mut droppable = last_turn_start;

    while estimated > window && droppable > 0 {
        history.remove(0);
        droppable -= 1;
        estimated = estimate_tokens(instructions, &history);
    }

    if estimated > window {
        return Err(ResponsesError::ContextWindowExceeded { estimated, window });
    }

    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{OutputMessage, OutputText};

    fn user(text: &str) -> Message {
        Message::user(vec![Part::text(text)])
    }

    fn completed_parent(items: Vec<OutputItem>) -> Response {
        let request = ResponseRequest::new("mock-model", vec![]);
        let mut parent = Response::from_request(&request);
        parent.status = ResponseStatus::Completed;
        parent.output = items;
        parent
    }

    #[test]
    fn instructions_come_from_the_request_alone() {
        let mut parent = completed_parent(vec![]);
        parent.instructions = Some("parent instructions".to_string());

        let request = ResponseRequest::new("mock-model", vec![user("hi")])
            .previous_response_id(parent.id.clone());
        let resolved = resolve(&request, Some(&parent)).expect("resolves");
        assert_eq!(resolved.instructions, None);

        let request = request.instructions("child instructions");
        let resolved = resolve(&request, Some(&parent)).expect("resolves");
        assert_eq!(
            resolved.instructions.as_deref(),
            Some("child instructions")
        );
    }

    #[test]
    fn incomplete_parents_are_chainable_but_failed_are_not() {
        let mut parent = completed_parent(vec![]);
        parent.status = ResponseStatus::Incomplete;
        let request = ResponseRequest::new("mock-model", vec![user("go on")])
            .previous_response_id(parent.id.clone());
        assert!(resolve(&request, Some(&parent)).is_ok());

        parent.status = ResponseStatus::Failed;
        let error = resolve(&request, Some(&parent)).expect_err("must fail");
        assert!(matches!(error, ResponsesError::ChainResolution { .. }));
    }

    #[test]
    fn in_flight_parent_items_are_excluded_from_history() {
        let parent = completed_parent(vec![
            OutputItem::Message(OutputMessage {
                id: "msg_done".to_string(),
                status: ItemStatus::Completed,
                role: "assistant".to_string(),
                content: vec![OutputContent::OutputText(OutputText {
                    text: "kept".to_string(),
                    annotations: vec![],
                })],
            }),
            OutputItem::Message(OutputMessage {
                id: "msg_open".to_string(),
                status: ItemStatus::InProgress,
                role: "assistant".to_string(),
                content: vec![],
            }),
        ]);

        let request = ResponseRequest::new("mock-model", vec![user("next")])
            .previous_response_id(parent.id.clone());
        let resolved = resolve(&request, Some(&parent)).expect("resolves");
        assert_eq!(
            resolved.history,
            vec![Message::assistant(vec![Part::text("kept")]), user("next")]
        );
    }

    #[test]
    fn auto_truncation_preserves_the_most_recent_turn() {
        let history = vec![user(&"a".repeat(400)), user(&"b".repeat(400)), user("now")];
        let fitted =
            fit_to_window(None, history, 60, Truncation::Auto).expect("fits after dropping");
        assert_eq!(fitted, vec![user("now")]);
    }

    #[test]
    fn disabled_truncation_fails_without_dropping() {
        let history = vec![user(&"a".repeat(400)), user("now")];
        let error = fit_to_window(None, history, 50, Truncation::Disabled).expect_err("must fail");
        assert!(matches!(
            error,
            ResponsesError::ContextWindowExceeded { .. }
        ));
    }
}
