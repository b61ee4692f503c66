//! API integration tests.

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::{test_app, test_app_with_upstream};

async fn request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().uri(uri).method(method);
    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&value).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Test that the health endpoint works.
#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app().await;

    let (status, body) = request(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

/// An empty turn sequence is rejected before any upstream call.
#[tokio::test]
async fn test_chat_rejects_empty_messages() {
    let app = test_app().await;

    let (status, body) = request(
        &app,
        Method::POST,
        "/api/chat",
        Some(json!({ "messages": [] })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

/// A missing upstream credential is a per-request configuration error,
/// returned immediately and never partially streamed.
#[tokio::test]
async fn test_chat_without_api_key_is_config_error() {
    let app = test_app_with_upstream("http://127.0.0.1:9", None).await;

    let (status, body) = request(
        &app,
        Method::POST,
        "/api/chat",
        Some(json!({ "messages": [{ "role": "user", "content": "2+2?" }] })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "INTERNAL_ERROR");
}

/// Document analysis requires both the summary and the query.
#[tokio::test]
async fn test_analyze_file_requires_fields() {
    let app = test_app().await;

    let (status, _) = request(
        &app,
        Method::POST,
        "/api/analyze-file",
        Some(json!({ "summary": "", "query": "what is this?" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request(
        &app,
        Method::POST,
        "/api/analyze-file",
        Some(json!({ "summary": "a doc", "query": " " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Title generation requires a message.
#[tokio::test]
async fn test_generate_name_requires_message() {
    let app = test_app().await;

    let (status, body) = request(
        &app,
        Method::POST,
        "/api/generate-session-name",
        Some(json!({ "message": "" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

/// Conversation summarization requires messages.
#[tokio::test]
async fn test_generate_summary_requires_messages() {
    let app = test_app().await;

    let (status, _) = request(
        &app,
        Method::POST,
        "/api/generate-summary",
        Some(json!({ "messages": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

fn multipart_upload(filename: &str, content_type: &str, content: &[u8]) -> Request<Body> {
    let boundary = "test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .uri("/api/process-file")
        .method(Method::POST)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// An empty upload is rejected without calling the generation service; the
/// test app's upstream is unreachable, so reaching it would error as 502.
#[tokio::test]
async fn test_process_file_empty_rejected() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(multipart_upload("empty.txt", "text/plain", b"  \n"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Unsupported upload types are rejected by the closed dispatch.
#[tokio::test]
async fn test_process_file_unsupported_rejected() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(multipart_upload("photo.png", "image/png", b"\x89PNG\r\n"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// A request without any file field is rejected.
#[tokio::test]
async fn test_process_file_requires_file() {
    let app = test_app().await;

    let request = Request::builder()
        .uri("/api/process-file")
        .method(Method::POST)
        .header(
            header::CONTENT_TYPE,
            "multipart/form-data; boundary=empty-boundary",
        )
        .body(Body::from("--empty-boundary--\r\n"))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// The personality listing carries every selectable tag.
#[tokio::test]
async fn test_list_personalities() {
    let app = test_app().await;

    let (status, body) = request(&app, Method::GET, "/api/personalities", None).await;
    assert_eq!(status, StatusCode::OK);

    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 5);
    assert!(entries.iter().any(|p| p["id"] == "programmer"));
    assert!(entries.iter().all(|p| p["name"].is_string()));
}

/// Full session lifecycle over the API.
#[tokio::test]
async fn test_session_lifecycle() {
    let app = test_app().await;

    // Create
    let (status, session) = request(
        &app,
        Method::POST,
        "/api/sessions",
        Some(json!({ "name": "Homework", "personality": "teacher" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["name"], "Homework");
    assert_eq!(session["personality"], "teacher");
    let id = session["id"].as_str().unwrap().to_string();

    // List
    let (status, listed) = request(&app, Method::GET, "/api/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // Rename and pin
    let (status, _) = request(
        &app,
        Method::PATCH,
        &format!("/api/sessions/{id}"),
        Some(json!({ "name": "Algebra", "is_pinned": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Replace the main thread
    let (status, _) = request(
        &app,
        Method::PUT,
        &format!("/api/sessions/{id}/messages"),
        Some(json!({ "messages": [
            { "role": "user", "content": "2+2?" },
            { "role": "assistant", "content": "4" },
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Attach a document and a document thread
    let (status, _) = request(
        &app,
        Method::PUT,
        &format!("/api/sessions/{id}/document"),
        Some(json!({ "filename": "notes.txt", "summary": "Class notes." })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = request(
        &app,
        Method::PUT,
        &format!("/api/sessions/{id}/document/messages"),
        Some(json!({ "messages": [{ "role": "user", "content": "what do the notes say?" }]})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Fetch it all back
    let (status, detail) = request(&app, Method::GET, &format!("/api/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["name"], "Algebra");
    assert_eq!(detail["is_pinned"], true);
    assert_eq!(detail["messages"].as_array().unwrap().len(), 2);
    assert_eq!(detail["document_messages"].as_array().unwrap().len(), 1);
    assert_eq!(detail["document_filename"], "notes.txt");

    // Delete
    let (status, _) = request(&app, Method::DELETE, &format!("/api/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = request(&app, Method::GET, &format!("/api/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Two full-sequence replaces: the second wins, no merge.
#[tokio::test]
async fn test_replace_messages_last_write_wins() {
    let app = test_app().await;

    let (_, session) = request(&app, Method::POST, "/api/sessions", Some(json!({}))).await;
    let id = session["id"].as_str().unwrap().to_string();

    let (status, _) = request(
        &app,
        Method::PUT,
        &format!("/api/sessions/{id}/messages"),
        Some(json!({ "messages": [
            { "role": "user", "content": "2+2?" },
            { "role": "assistant", "content": "4" },
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // B does not include A's last element
    let (status, _) = request(
        &app,
        Method::PUT,
        &format!("/api/sessions/{id}/messages"),
        Some(json!({ "messages": [{ "role": "user", "content": "2+2?" }]})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, detail) = request(&app, Method::GET, &format!("/api/sessions/{id}"), None).await;
    let messages = detail["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "2+2?");
}

/// Writes against unknown sessions surface as 404s.
#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = test_app().await;

    let (status, body) = request(
        &app,
        Method::PUT,
        "/api/sessions/no-such-session/messages",
        Some(json!({ "messages": [{ "role": "user", "content": "hi" }]})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = request(&app, Method::GET, "/api/sessions/no-such-session", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// An update with an empty name is rejected.
#[tokio::test]
async fn test_rename_rejects_empty_name() {
    let app = test_app().await;

    let (_, session) = request(&app, Method::POST, "/api/sessions", Some(json!({}))).await;
    let id = session["id"].as_str().unwrap().to_string();

    let (status, _) = request(
        &app,
        Method::PATCH,
        &format!("/api/sessions/{id}"),
        Some(json!({ "name": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
