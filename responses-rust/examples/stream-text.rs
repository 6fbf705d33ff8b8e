use std::{
    io::{stdout, Write},
    sync::Arc,
};

use futures::StreamExt;
use llm_engine::{
    engine_test::MockEngine, ContentDelta, PartDelta, PartialReply, TextPartDelta, Usage,
};
use llm_engine::{Message, Part};
use llm_responses::{InMemoryResponseStore, ResponseEvent, ResponseRequest, ResponsesService};

fn chunk(index: usize, text: &str) -> PartialReply {
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

#[tokio::main]
async fn main() {
    let engine = Arc::new(MockEngine::new());
    engine.enqueue_stream(vec![
        chunk(0, "The tide "),
        chunk(0, "waits for "),
        chunk(0, "no crab."),
        PartialReply {
            usage: Some(Usage {
                input_tokens: 9,
                output_tokens: 7,
                ..Default::default()
            }),
            ..Default::default()
        },
    ]);

    let store = Arc::new(InMemoryResponseStore::new());
    let service = ResponsesService::builder(engine, store).build();

    let mut stream = service
        .create_stream(ResponseRequest::new(
            "mock-model",
            vec![Message::user(vec![Part::text("A proverb, please.")])],
        ))
        .await
        .unwrap();

    while let Some(event) = stream.next().await {
        match &event {
            ResponseEvent::OutputTextDelta { delta, .. } => {
                print!("{delta}");
                stdout().flush().unwrap();
            }
            ResponseEvent::Completed { response, .. } => {
                println!("\n--- final snapshot: {}", response.id);
            }
            _ => println!("[{}]", event.event_type()),
        }
    }
}
