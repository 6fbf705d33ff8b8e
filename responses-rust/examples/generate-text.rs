use std::sync::Arc;

use llm_engine::{engine_test::MockEngine, EngineReply, Message, Part, Usage};
use llm_responses::{InMemoryResponseStore, ResponseRequest, ResponsesService};

#[tokio::main]
async fn main() {
    let engine = Arc::new(MockEngine::new());
    engine.enqueue_generate(EngineReply {
        content: vec![Part::text(
            "Once upon a time, a crab learned to whistle and the tide came in early.",
        )],
        usage: Some(Usage {
            input_tokens: 12,
            output_tokens: 18,
            ..Default::default()
        }),
        finish_reason: None,
    });

    let store = Arc::new(InMemoryResponseStore::new());
    let service = ResponsesService::builder(engine, store).build();

    let response = service
        .create(
            ResponseRequest::new(
                "mock-model",
                vec![Message::user(vec![Part::text("Tell me a story.")])],
            )
            .instructions("You are a terse storyteller."),
        )
        .await
        .unwrap();

    println!("{response:#?}");
    println!("---\n{}", response.output_text());
}
