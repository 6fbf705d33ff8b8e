use futures::StreamExt;
use llm_engine::{
    engine_test::MockEngine, ContentDelta, EngineInput, GenerationEngine, Message, Part, PartDelta,
    PartialReply, ReplyAccumulator, TextPartDelta,
};

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
    let engine = MockEngine::new();
    engine.enqueue_stream(vec![
        chunk(0, "Low tide "),
        chunk(0, "reveals "),
        chunk(0, "the rocks."),
    ]);

    let mut stream = engine
        .stream(EngineInput {
            messages: vec![Message::user(vec![Part::text("An observation, please.")])],
            ..Default::default()
        })
        .await
        .expect("engine.stream failed");

    let mut accumulator = ReplyAccumulator::new();
    while let Some(partial) = stream.next().await {
        let partial = partial.expect("stream yielded an error");
        if let Some(ContentDelta {
            part: PartDelta::Text(delta),
            ..
        }) = &partial.delta
        {
            println!("delta: {:?}", delta.text);
        }
        accumulator.add_partial(partial).expect("delta accepted");
    }

    let reply = accumulator.compute_reply().expect("reply computed");
    println!("final: {reply:#?}");
}
