use llm_engine::{
    ContentDelta, EngineError, FinishReason, Part, PartDelta, PartialReply, ReplyAccumulator,
    TextPartDelta, ToolCallPartDelta, Usage,
};
use serde_json::json;

fn text_delta(index: usize, text: &str) -> PartialReply {
    PartialReply {
        delta: Some(ContentDelta {
            index,
            part: PartDelta::Text(TextPartDelta {
                text: text.to_string(),
            }),
        }),
        ..Default::default()
    }
}

fn tool_call_delta(index: usize, delta: ToolCallPartDelta) -> PartialReply {
    PartialReply {
        delta: Some(ContentDelta {
            index,
            part: PartDelta::ToolCall(delta),
        }),
        ..Default::default()
    }
}

#[test]
fn concatenates_text_deltas_in_order() {
    let mut accumulator = ReplyAccumulator::new();
    for chunk in ["Hel", "lo, ", "world"] {
        accumulator
            .add_partial(text_delta(0, chunk))
            .expect("partial accepted");
    }

    let reply = accumulator.compute_reply().expect("reply computed");
    assert_eq!(reply.content, vec![Part::text("Hello, world")]);
}

#[test]
fn keeps_parts_in_index_order_regardless_of_arrival() {
    let mut accumulator = ReplyAccumulator::new();
    accumulator
        .add_partial(text_delta(1, "second"))
        .expect("partial accepted");
    accumulator
        .add_partial(text_delta(0, "first"))
        .expect("partial accepted");

    let reply = accumulator.compute_reply().expect("reply computed");
    assert_eq!(
        reply.content,
        vec![Part::text("first"), Part::text("second")]
    );
}

#[test]
fn merges_tool_call_fragments_and_parses_arguments() {
    let mut accumulator = ReplyAccumulator::new();
    accumulator
        .add_partial(tool_call_delta(
            0,
            ToolCallPartDelta {
                call_id: Some("call_1".to_string()),
                name: Some("search".to_string()),
                args: Some("{\"query\":".to_string()),
            },
        ))
        .expect("partial accepted");
    accumulator
        .add_partial(tool_call_delta(
            0,
            ToolCallPartDelta {
                call_id: None,
                name: None,
                args: Some("\"rust\"}".to_string()),
            },
        ))
        .expect("partial accepted");

    let reply = accumulator.compute_reply().expect("reply computed");
    assert_eq!(
        reply.content,
        vec![Part::tool_call("call_1", "search", json!({"query": "rust"}))]
    );
}

#[test]
fn empty_tool_call_arguments_become_an_empty_object() {
    let mut accumulator = ReplyAccumulator::new();
    accumulator
        .add_partial(tool_call_delta(
            0,
            ToolCallPartDelta {
                call_id: Some("call_1".to_string()),
                name: Some("ping".to_string()),
                args: None,
            },
        ))
        .expect("partial accepted");

    let reply = accumulator.compute_reply().expect("reply computed");
    assert_eq!(reply.content, vec![Part::tool_call("call_1", "ping", json!({}))]);
}

#[test]
fn missing_call_id_is_an_invariant_error() {
    let mut accumulator = ReplyAccumulator::new();
    accumulator
        .add_partial(tool_call_delta(
            0,
            ToolCallPartDelta {
                call_id: None,
                name: Some("search".to_string()),
                args: None,
            },
        ))
        .expect("partial accepted");

    let error = accumulator.compute_reply().expect_err("must fail");
    assert!(matches!(error, EngineError::Invariant(_, _)));
}

#[test]
fn mismatched_delta_types_at_same_index_are_rejected() {
    let mut accumulator = ReplyAccumulator::new();
    accumulator
        .add_partial(text_delta(0, "hello"))
        .expect("partial accepted");

    let error = accumulator
        .add_partial(tool_call_delta(0, ToolCallPartDelta::default()))
        .expect_err("must fail");
    assert!(error.contains("index 0"));
}

#[test]
fn accumulates_usage_and_keeps_last_finish_reason() {
    let mut accumulator = ReplyAccumulator::new();
    accumulator
        .add_partial(PartialReply {
            usage: Some(Usage {
                input_tokens: 10,
                output_tokens: 1,
                ..Default::default()
            }),
            ..Default::default()
        })
        .expect("partial accepted");
    accumulator
        .add_partial(PartialReply {
            usage: Some(Usage {
                output_tokens: 4,
                ..Default::default()
            }),
            finish_reason: Some(FinishReason::Length),
            ..Default::default()
        })
        .expect("partial accepted");

    let reply = accumulator.compute_reply().expect("reply computed");
    let usage = reply.usage.expect("usage accumulated");
    assert_eq!(usage.input_tokens, 10);
    assert_eq!(usage.output_tokens, 5);
    assert_eq!(reply.finish_reason, Some(FinishReason::Length));
}
