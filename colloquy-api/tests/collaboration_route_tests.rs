//! Route-level integration tests for the COLLOQUY API.
//!
//! Drive the real router with mock storage and scripted providers; nothing
//! here touches the network or a database.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use colloquy_api::{api_router, AppState};
use colloquy_core::{Conversation, PipelineMode, RunStatus};
use colloquy_llm::{MockChatProvider, ProviderRegistry};
use colloquy_storage::MockStorage;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// State plus its router, wired over mock storage and one scripted
/// "openai" provider.
fn test_app(provider: MockChatProvider) -> (Arc<AppState>, Router) {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(provider));
    let state = AppState::assemble(
        Arc::new(MockStorage::new()),
        Arc::new(registry),
        PipelineMode::Sequential,
    );
    let app = api_router(state.clone());
    (state, app)
}

/// A provider with plenty of distinct stage replies.
fn scripted_provider() -> MockChatProvider {
    let responses: Vec<String> = (1..=20).map(|i| format!("stage reply {}", i)).collect();
    MockChatProvider::new("openai", responses)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("serialize body")))
            .expect("build request"),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("build request"),
    };

    let response = app.clone().oneshot(request).await.expect("route");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse body")
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_registered_providers() {
    let (_, app) = test_app(scripted_provider());

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["providers"], json!(["openai"]));
}

#[tokio::test]
async fn collaborate_runs_all_five_stages() {
    let (state, app) = test_app(scripted_provider());

    let (status, body) = send(
        &app,
        "POST",
        "/collaborate",
        Some(json!({"message": "summarize the state of rust async runtimes"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["steps"].as_array().expect("steps").len(), 5);
    assert_eq!(body["steps"][0]["role"], "analyst");
    assert_eq!(body["steps"][4]["role"], "synthesizer");
    assert_eq!(body["final_output"], "stage reply 5");
    assert!(body["run_id"].is_string());

    // The run record settled as done with the final output attached.
    let conversation_id = body["conversation_id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("conversation id");
    let runs = state.storage.list_runs(conversation_id).await.expect("runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Done);
    assert_eq!(runs[0].final_output.as_deref(), Some("stage reply 5"));
}

#[tokio::test]
async fn collaborate_rejects_empty_message() {
    let (_, app) = test_app(scripted_provider());

    let (status, body) = send(&app, "POST", "/collaborate", Some(json!({"message": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn collaborate_rejects_unknown_mode() {
    let (_, app) = test_app(scripted_provider());

    let (status, body) = send(
        &app,
        "POST",
        "/collaborate",
        Some(json!({"message": "hello", "mode": "hivemind"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().expect("detail").contains("hivemind"));
}

#[tokio::test]
async fn follow_up_requires_existing_conversation() {
    let (_, app) = test_app(scripted_provider());

    let (status, body) = send(
        &app,
        "POST",
        "/follow-up",
        Some(json!({
            "conversation_id": uuid::Uuid::now_v7(),
            "message": "and then?"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "ENTITY_NOT_FOUND");
}

#[tokio::test]
async fn stage_failure_records_error_on_run() {
    // The third provider call (the creator stage) fails.
    let responses: Vec<String> = (1..=20).map(|i| format!("stage reply {}", i)).collect();
    let (state, app) = test_app(MockChatProvider::new("openai", responses).failing_on(vec![2]));

    let conversation = Conversation::new(None);
    state
        .storage
        .create_conversation(&conversation)
        .await
        .expect("seed conversation");

    let (status, body) = send(
        &app,
        "POST",
        "/collaborate",
        Some(json!({
            "conversation_id": conversation.id,
            "message": "write a short design document"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "PIPELINE_FAILED");

    // The stored run carries the structured failure; the only persisted
    // step is the failed one, and nothing after it ran.
    let runs = state.storage.list_runs(conversation.id).await.expect("runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Error);
    let failure = runs[0].error.as_ref().expect("failure payload");
    assert_eq!(failure.provider, "openai");
    assert_eq!(failure.error_type, "request_failed");
    assert!(failure.message.contains("scripted failure"));

    let steps = state.storage.list_steps(runs[0].id).await.expect("steps");
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].role.to_string(), "creator");
    assert!(steps[0].error.is_some());
}

#[tokio::test]
async fn pronoun_resolves_against_single_known_entity() {
    let (_, app) = test_app(scripted_provider());

    let (status, first) = send(
        &app,
        "POST",
        "/collaborate",
        Some(json!({"message": "tell me about Purdue University"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let conversation_id = first["conversation_id"].clone();

    let (status, second) = send(
        &app,
        "POST",
        "/follow-up",
        Some(json!({
            "conversation_id": conversation_id,
            "message": "what is the ranking at that university?"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let rewritten = second["rewritten_message"].as_str().expect("rewritten");
    assert!(rewritten.contains("Purdue University"));
    assert!(second["clarification"].is_null());
}

#[tokio::test]
async fn ambiguous_reference_returns_clarification() {
    let (state, app) = test_app(scripted_provider());

    let (status, first) = send(
        &app,
        "POST",
        "/collaborate",
        Some(json!({"message": "tell me about Purdue University and Indiana University"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let conversation_id: colloquy_core::EntityId = first["conversation_id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("conversation id");

    let runs_before = state.storage.list_runs(conversation_id).await.expect("runs");

    let (status, second) = send(
        &app,
        "POST",
        "/follow-up",
        Some(json!({
            "conversation_id": conversation_id,
            "message": "what is the ranking at that university?"
        })),
    )
    .await;

    // Clarification instead of a run: no run id, no pipeline execution.
    assert_eq!(status, StatusCode::OK);
    assert!(second["run_id"].is_null());
    let clarification = &second["clarification"];
    let options: Vec<&str> = clarification["options"]
        .as_array()
        .expect("options")
        .iter()
        .filter_map(|o| o.as_str())
        .collect();
    assert!(options.contains(&"Purdue University"));
    assert!(options.contains(&"Indiana University"));
    assert_eq!(options.last(), Some(&"Other"));
    assert!(clarification["question"]
        .as_str()
        .expect("question")
        .contains("university"));

    let runs_after = state.storage.list_runs(conversation_id).await.expect("runs");
    assert_eq!(runs_before.len(), runs_after.len());
}

#[tokio::test]
async fn meta_question_summarizes_thread_history() {
    let (_, app) = test_app(scripted_provider());

    let (_, first) = send(
        &app,
        "POST",
        "/collaborate",
        Some(json!({"message": "plan a migration to postgres"})),
    )
    .await;
    let conversation_id = first["conversation_id"].clone();

    let (status, body) = send(
        &app,
        "POST",
        "/meta-question",
        Some(json!({
            "conversation_id": conversation_id,
            "question": "how many runs happened here?"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let answer = body["answer"].as_str().expect("answer");
    assert!(answer.contains("1 collaboration runs"));
    assert_eq!(body["stats"]["run_count"], 1);
    assert_eq!(body["stats"]["completed_runs"], 1);
}

#[tokio::test]
async fn read_paths_serve_outputs_turns_and_stats() {
    let (state, app) = test_app(scripted_provider());

    let (_, first) = send(
        &app,
        "POST",
        "/collaborate",
        Some(json!({"message": "review this architecture sketch"})),
    )
    .await;
    let conversation_id = first["conversation_id"].as_str().expect("id").to_string();

    let (status, outputs) = send(
        &app,
        "GET",
        &format!("/threads/{}/agent-outputs", conversation_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outputs.as_array().expect("outputs").len(), 5);

    let (status, stats) = send(
        &app,
        "GET",
        &format!("/threads/{}/stats", conversation_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // One user message plus five agent messages.
    assert_eq!(stats["message_count"], 6);

    // The turn read path joins message, run, and steps.
    let parsed: colloquy_core::EntityId = conversation_id.parse().expect("uuid");
    let messages = state.storage.list_messages(parsed).await.expect("messages");
    let user_message = messages.iter().find(|m| m.content.contains("review")).expect("user turn");
    let (status, turn) = send(&app, "GET", &format!("/turns/{}", user_message.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(turn["steps"].as_array().expect("steps").len(), 5);
    assert_eq!(turn["run"]["status"], "done");

    let (status, global) = send(&app, "GET", "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(global["conversations"], 1);
    assert_eq!(global["runs"], 1);
    assert_eq!(global["steps"], 5);
}

#[tokio::test]
async fn unknown_thread_read_paths_return_404() {
    let (_, app) = test_app(scripted_provider());
    let ghost = uuid::Uuid::now_v7();

    for uri in [
        format!("/threads/{}/agent-outputs", ghost),
        format!("/threads/{}/stats", ghost),
        format!("/turns/{}", ghost),
    ] {
        let (status, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "uri {}", uri);
        assert_eq!(body["code"], "ENTITY_NOT_FOUND");
    }
}
