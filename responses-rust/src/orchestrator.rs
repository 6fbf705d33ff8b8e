use crate::{
    opentelemetry::invoke_tool_traced,
    tool::{ToolOutput, ToolRegistry},
    ResponsesError,
};
use llm_engine::{Part, ToolCallPart, ToolChoice, ToolSpec};

/// What the engine's reply means for the round.
#[derive(Debug)]
pub(crate) enum RoundPlan {
    /// A final message: the cycle ends with this content.
    Complete,
    /// Calls to resolve before the next round. Function calls suspend the
    /// cycle after any built-in calls of the same round resolve.
    Calls {
        builtin: Vec<ToolCallPart>,
        function: Vec<ToolCallPart>,
    },
}

/// Classifies the engine's reply against the catalogue, the round's
/// tool_choice, and the handler registry.
pub(crate) fn classify_reply(
    content: &[Part],
    tools: &[ToolSpec],
    tool_choice: Option<&ToolChoice>,
    registry: &ToolRegistry,
) -> Result<RoundPlan, ResponsesError> {
    let calls: Vec<ToolCallPart> = content
        .iter()
        .filter_map(|part| {
            if let Part::ToolCall(call) = part {
                Some(call.clone())
            } else {
                None
            }
        })
        .collect();

    if calls.is_empty() {
        match tool_choice {
            Some(ToolChoice::Required) => {
                return Err(ResponsesError::ToolChoiceViolation(
                    "the engine returned a message where a tool call was required".to_string(),
                ))
            }
            Some(ToolChoice::Tool(tool)) => {
                return Err(ResponsesError::ToolChoiceViolation(format!(
                    "the engine returned a message instead of calling \"{}\"",
                    tool.name
                )))
            }
            _ => return Ok(RoundPlan::Complete),
        }
    }

    if matches!(tool_choice, Some(ToolChoice::None)) {
        return Err(ResponsesError::ToolChoiceViolation(
            "the engine requested a tool call while tool_choice is none".to_string(),
        ));
    }

    let mut builtin = Vec::new();
    let mut function = Vec::new();

    for call in calls {
        match tools.iter().find(|spec| spec.name() == call.name) {
            Some(ToolSpec::Function(_)) => function.push(call),
            Some(ToolSpec::Builtin(spec)) => {
                if registry.get(&spec.capability).is_none() {
                    return Err(ResponsesError::UnsupportedTool(spec.capability.clone()));
                }
                builtin.push(call);
            }
            None => return Err(ResponsesError::UnsupportedTool(call.name)),
        }
    }

    Ok(RoundPlan::Calls { builtin, function })
}

/// A built-in call together with its resolved payload.
#[derive(Debug)]
pub(crate) struct ResolvedCall {
    pub call: ToolCallPart,
    pub output: ToolOutput,
    /// Set when the payload is a timeout fault. A timed-out call that the
    /// round's tool_choice forced fails the response instead of being
    /// recovered locally.
    pub timed_out: bool,
}

/// Resolves one built-in call. A handler fault or timeout becomes an
/// `is_error` payload on the call, never a crash.
pub(crate) async fn dispatch_one(call: ToolCallPart, registry: &ToolRegistry) -> ResolvedCall {
    let (output, timed_out) = invoke_one(&call, registry).await;
    ResolvedCall {
        call,
        output,
        timed_out,
    }
}

/// Fans the round's built-in calls out concurrently. Results keep request
/// order because they are joined positionally, not by arrival.
pub(crate) async fn dispatch_parallel(
    calls: Vec<ToolCallPart>,
    registry: &ToolRegistry,
) -> Vec<ResolvedCall> {
    futures::future::join_all(calls.into_iter().map(|call| dispatch_one(call, registry))).await
}

async fn invoke_one(call: &ToolCallPart, registry: &ToolRegistry) -> (ToolOutput, bool) {
    let Some(handler) = registry.get(&call.name) else {
        // classify_reply already vetted registration; a disappearing
        // handler is still a fault, not a crash
        return (
            ToolOutput::error(format!("no handler for capability \"{}\"", call.name)),
            false,
        );
    };

    let invocation = invoke_tool_traced(&call.call_id, handler.as_ref(), call.args.clone());

    let result = match registry.timeout_for(&call.name) {
        Some(timeout) => match tokio::time::timeout(timeout, invocation).await {
            Ok(result) => result,
            Err(_) => {
                return (
                    ToolOutput::error(format!(
                        "tool \"{}\" timed out after {:?}",
                        call.name, timeout
                    )),
                    true,
                )
            }
        },
        None => invocation.await,
    };

    match result {
        Ok(output) => (output, false),
        Err(error) => (
            ToolOutput::error(format!("tool \"{}\" failed: {error}", call.name)),
            false,
        ),
    }
}
