use std::sync::Arc;

use llm_engine::{engine_test::MockEngine, EngineReply, Message, Part, Usage};
use llm_responses::{
    InMemoryResponseStore, Response, ResponseRequest, ResponseStore, ResponsesError,
    ResponsesService,
};

fn text_reply(text: &str) -> EngineReply {
    EngineReply {
        content: vec![Part::text(text)],
        usage: Some(Usage {
            input_tokens: 2,
            output_tokens: 3,
            ..Default::default()
        }),
        finish_reason: None,
    }
}

async fn stored_response(store: &Arc<InMemoryResponseStore>, text: &str, persist: bool) -> Response {
    let engine = Arc::new(MockEngine::new());
    engine.enqueue_generate(text_reply(text));
    let service = ResponsesService::builder(engine, store.clone()).build();
    service
        .create(
            ResponseRequest::new("mock-model", vec![Message::user(vec![Part::text("hi")])])
                .store(persist),
        )
        .await
        .expect("create succeeds")
}

#[tokio::test]
async fn put_is_a_noop_for_unstored_snapshots() {
    let store = Arc::new(InMemoryResponseStore::new());
    let response = stored_response(&store, "ephemeral", false).await;

    let error = store.get(&response.id).await.expect_err("must be absent");
    assert!(matches!(error, ResponsesError::NotFound(_)));

    // putting it again by hand is still a no-op under store = false
    store.put(response.clone()).await.expect("put accepts it");
    assert!(store.get(&response.id).await.is_err());
}

#[tokio::test]
async fn repeated_gets_return_the_same_snapshot() {
    let store = Arc::new(InMemoryResponseStore::new());
    let response = stored_response(&store, "durable", true).await;

    let first = store.get(&response.id).await.expect("first get");
    let second = store.get(&response.id).await.expect("second get");
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_vec(&first).expect("serializes"),
        serde_json::to_vec(&second).expect("serializes")
    );
}

#[tokio::test]
async fn delete_evicts_and_further_gets_miss() {
    let store = Arc::new(InMemoryResponseStore::new());
    let response = stored_response(&store, "evict me", true).await;

    store.delete(&response.id).await.expect("delete succeeds");
    assert!(matches!(
        store.get(&response.id).await,
        Err(ResponsesError::NotFound(_))
    ));
    assert!(matches!(
        store.delete(&response.id).await,
        Err(ResponsesError::NotFound(_))
    ));
}

#[tokio::test]
async fn non_terminal_snapshots_are_refused() {
    let store = Arc::new(InMemoryResponseStore::new());
    let mut response = stored_response(&store, "fine", true).await;
    response.status = llm_responses::ResponseStatus::InProgress;

    let error = store.put(response).await.expect_err("must refuse");
    assert!(matches!(error, ResponsesError::Invariant(_)));
}
