//! End-to-end tests for the streaming relay.
//!
//! A mock generation service feeds the relay over a real socket; the client
//! stream consumer drives the relay the way the browser front-end would.

use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use banter::client::{RelayClient, StreamOutcome};
use banter::session::Role;

mod common;
use common::{
    UpstreamBehavior, delta_record, done_record, spawn_app, spawn_upstream, test_app_with_upstream,
};

async fn relay_for(behavior: UpstreamBehavior) -> RelayClient {
    let upstream_url = spawn_upstream(behavior).await;
    let app = test_app_with_upstream(&upstream_url, Some("test-key")).await;
    let relay_url = spawn_app(app).await;
    RelayClient::new(relay_url)
}

/// The `2+2?` scenario: the client observes each partial state in order,
/// then commits the assistant turn, and the store holds exactly that text.
#[tokio::test]
async fn test_stream_and_commit_end_to_end() {
    let client = relay_for(UpstreamBehavior::Frames {
        frames: vec![
            delta_record("4"),
            delta_record(" is"),
            delta_record(" the answer"),
            done_record(),
        ],
        delay: Duration::from_millis(20),
    })
    .await;

    let session = client.create_session(None, None).await.unwrap();
    let detail = client.get_session(&session.id).await.unwrap();

    let mut partials = Vec::new();
    let commit = client
        .send_turn(&detail, "2+2?", &mut |partial: &str| {
            partials.push(partial.to_string())
        })
        .await
        .unwrap();

    assert_eq!(partials, vec!["4", "4 is", "4 is the answer"]);
    assert_eq!(commit.turn.role, Role::Assistant);
    assert_eq!(commit.turn.content, "4 is the answer");
    assert!(commit.persist_error.is_none());

    // The committed state equals the concatenation of the deltas.
    let stored = client.get_session(&session.id).await.unwrap();
    assert_eq!(stored.messages.len(), 2);
    assert_eq!(stored.messages[0].role, Role::User);
    assert_eq!(stored.messages[0].content, "2+2?");
    assert_eq!(stored.messages[1].role, Role::Assistant);
    assert_eq!(stored.messages[1].content, "4 is the answer");
}

/// One corrupted upstream line among N valid ones: the stream continues and
/// yields exactly N deltas.
#[tokio::test]
async fn test_corrupt_line_is_skipped() {
    let client = relay_for(UpstreamBehavior::Frames {
        frames: vec![
            delta_record("a"),
            "data: {this is not json\n".to_string(),
            delta_record("b"),
            delta_record("c"),
            done_record(),
        ],
        delay: Duration::from_millis(5),
    })
    .await;

    let mut deltas = 0;
    let outcome = client
        .stream_chat(
            &[banter::session::ConversationTurn::user("go")],
            None,
            &mut |_partial: &str| deltas += 1,
        )
        .await
        .unwrap();

    assert_eq!(outcome, StreamOutcome::Completed("abc".to_string()));
    assert_eq!(deltas, 3);
}

/// Upstream rejects before streaming begins: the client receives a non-2xx
/// structured error and no partial events.
#[tokio::test]
async fn test_upstream_error_before_streaming() {
    let upstream_url = spawn_upstream(UpstreamBehavior::Status {
        status: 401,
        body: serde_json::json!({
            "error": { "message": "Invalid API key", "type": "invalid_request_error" }
        })
        .to_string(),
    })
    .await;
    let app = test_app_with_upstream(&upstream_url, Some("bad-key")).await;
    let relay_url = spawn_app(app).await;

    let response = reqwest::Client::new()
        .post(format!("{relay_url}/api/chat"))
        .json(&serde_json::json!({ "messages": [{ "role": "user", "content": "2+2?" }] }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "UPSTREAM_ERROR");
    assert!(body["error"].as_str().unwrap().contains("Invalid API key"));
}

/// Upstream drops mid-stream without the sentinel: the relay synthesizes an
/// error terminal and the consumer commits an error turn, so the failure is
/// visible in history and nothing hangs.
#[tokio::test]
async fn test_upstream_disconnect_becomes_error_turn() {
    let client = relay_for(UpstreamBehavior::Frames {
        frames: vec![delta_record("half an ans")],
        delay: Duration::from_millis(5),
    })
    .await;

    let session = client.create_session(None, None).await.unwrap();
    let detail = client.get_session(&session.id).await.unwrap();

    let commit = client
        .send_turn(&detail, "2+2?", &mut |_: &str| {})
        .await
        .unwrap();

    assert_eq!(commit.turn.role, Role::Error);
    assert!(commit.turn.content.contains("closed before completion"));

    let stored = client.get_session(&session.id).await.unwrap();
    assert_eq!(stored.messages[1].role, Role::Error);
}

/// Exactly one terminal marker per exchange, and nothing after it.
#[tokio::test]
async fn test_exactly_one_terminal() {
    let upstream_url = spawn_upstream(UpstreamBehavior::Frames {
        frames: vec![
            delta_record("hello"),
            done_record(),
            // Anything after the sentinel must never reach the client.
            delta_record("late"),
            done_record(),
        ],
        delay: Duration::from_millis(5),
    })
    .await;
    let app = test_app_with_upstream(&upstream_url, Some("test-key")).await;
    let relay_url = spawn_app(app).await;

    let body = reqwest::Client::new()
        .post(format!("{relay_url}/api/chat"))
        .json(&serde_json::json!({ "messages": [{ "role": "user", "content": "hi" }] }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(body.matches("data: [DONE]").count(), 1);
    assert!(!body.contains("late"));

    let after_terminal = body.split("data: [DONE]").nth(1).unwrap();
    assert!(after_terminal.trim().is_empty());
}

/// Closing the client connection mid-stream releases the upstream
/// connection within a bounded time.
#[tokio::test]
async fn test_cancellation_releases_upstream() {
    let (on_drop, mut dropped) = mpsc::unbounded_channel();
    let upstream_url = spawn_upstream(UpstreamBehavior::Hang { on_drop }).await;
    let app = test_app_with_upstream(&upstream_url, Some("test-key")).await;
    let relay_url = spawn_app(app).await;

    let response = reqwest::Client::new()
        .post(format!("{relay_url}/api/chat"))
        .json(&serde_json::json!({ "messages": [{ "role": "user", "content": "talk forever" }] }))
        .send()
        .await
        .unwrap();

    // Read a little of the stream to prove the exchange is live, then hang up.
    let mut stream = response.bytes_stream();
    let first = stream.next().await.unwrap().unwrap();
    assert!(!first.is_empty());
    drop(stream);

    // The relay must abort its upstream request, which drops the mock's
    // response body and fires the signal.
    let released = tokio::time::timeout(Duration::from_secs(5), dropped.recv()).await;
    assert!(released.is_ok(), "upstream connection was not released");
}
