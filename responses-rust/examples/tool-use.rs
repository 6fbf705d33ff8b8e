use std::{error::Error, sync::Arc};

use async_trait::async_trait;
use llm_engine::{
    engine_test::MockEngine, BuiltinTool, EngineReply, JSONSchema, Message, Part, ToolSpec,
};
use llm_responses::{
    InMemoryResponseStore, ResponseRequest, ResponsesService, ToolHandler, ToolOutput,
};
use serde_json::{json, Value};

/// A pretend search capability: real deployments would register a handler
/// backed by an index or the web.
struct TidePoolSearch;

#[async_trait]
impl ToolHandler for TidePoolSearch {
    fn capability(&self) -> String {
        "search".into()
    }

    fn description(&self) -> String {
        "Search the tide pool almanac.".into()
    }

    fn parameters(&self) -> JSONSchema {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, args: Value) -> Result<ToolOutput, Box<dyn Error + Send + Sync>> {
        let query = args["query"].as_str().unwrap_or_default();
        Ok(ToolOutput::text(format!(
            "almanac entry for \"{query}\": hermit crabs trade shells at low tide"
        )))
    }
}

#[tokio::main]
async fn main() {
    let engine = Arc::new(MockEngine::new());
    engine.enqueue_generate(EngineReply {
        content: vec![Part::tool_call(
            "call_1",
            "search",
            json!({"query": "hermit crab shells"}),
        )],
        ..Default::default()
    });
    engine.enqueue_generate(EngineReply {
        content: vec![Part::text(
            "According to the almanac, hermit crabs trade shells at low tide.",
        )],
        ..Default::default()
    });

    let store = Arc::new(InMemoryResponseStore::new());
    let service = ResponsesService::builder(engine, store)
        .add_tool(TidePoolSearch)
        .build();

    let response = service
        .create(
            ResponseRequest::new(
                "mock-model",
                vec![Message::user(vec![Part::text(
                    "When do hermit crabs trade shells?",
                )])],
            )
            .add_tool(ToolSpec::Builtin(BuiltinTool {
                capability: "search".into(),
            })),
        )
        .await
        .unwrap();

    for item in &response.output {
        println!("{item:#?}");
    }
}
