//! API request handlers.

use std::convert::Infallible;
use std::time::Duration;

use async_stream::stream;
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::extract::extract_text;
use crate::llm::{ChatMessage, DONE_SENTINEL, SseParser, StreamEvent};
use crate::persona::Personality;
use crate::session::{
    ConversationTurn, CreateSessionRequest, Role, Session, SessionDetail, UpdateSessionRequest,
};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Owning identity for sessions until an identity provider is wired in.
const DEFAULT_USER: &str = "default";

const ANALYSIS_SYSTEM_PROMPT: &str =
    "You are an AI assistant that analyzes documents and provides insights based on user \
     queries. Use the provided summary as context for answering questions or following \
     instructions. Respond using Markdown formatting for better readability.";

const INGEST_SYSTEM_PROMPT: &str = "Analyze and summarize the following document:";

const NAMING_SYSTEM_PROMPT: &str =
    "Generate a brief, descriptive title (max 6 words) for this conversation based on the \
     following message:";

const SUMMARY_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that generates concise summaries of conversations.";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for the turn-submission endpoint.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ConversationTurn>,
    /// Personality used for the leading system turn when the client did not
    /// send one itself.
    #[serde(default)]
    pub personality: Option<Personality>,
}

/// Request body for the document-analysis endpoint.
#[derive(Debug, Deserialize)]
pub struct AnalyzeFileRequest {
    pub summary: String,
    pub query: String,
}

/// Request body for title generation.
#[derive(Debug, Deserialize)]
pub struct GenerateNameRequest {
    pub message: String,
}

/// Request body for conversation summarization.
#[derive(Debug, Deserialize)]
pub struct GenerateSummaryRequest {
    pub messages: Vec<ConversationTurn>,
}

/// Response carrying a generated session name.
#[derive(Debug, Serialize)]
pub struct NameResponse {
    pub name: String,
}

/// Response carrying a generated summary.
#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
}

/// Request body for a full-sequence message replace.
#[derive(Debug, Deserialize)]
pub struct ReplaceMessagesRequest {
    pub messages: Vec<ConversationTurn>,
}

/// Request body for setting a session's personality.
#[derive(Debug, Deserialize)]
pub struct SetPersonalityRequest {
    pub personality: Personality,
}

/// Request body for attaching an auxiliary document.
#[derive(Debug, Deserialize)]
pub struct SetDocumentRequest {
    pub filename: String,
    pub summary: String,
}

/// One selectable personality, for UI listings.
#[derive(Debug, Serialize)]
pub struct PersonalityInfo {
    pub id: Personality,
    pub name: &'static str,
    pub description: &'static str,
}

// ============================================================================
// Health
// ============================================================================

/// Health check.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============================================================================
// Relay Endpoints
// ============================================================================

/// Submit a conversation turn and stream the generated answer.
///
/// The response is opened with streaming headers before any upstream data
/// arrives; each upstream delta is forwarded in order as
/// `data: {"content": ...}` and the exchange ends with exactly one terminal
/// record, either `data: [DONE]` or `data: {"error": ...}`. Persisting the
/// committed answer is the consumer's job, not this endpoint's.
#[instrument(skip(state, request))]
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    if request.messages.is_empty() {
        return Err(ApiError::bad_request("messages must not be empty"));
    }

    let mut messages = to_chat_messages(&request.messages);
    let has_system = messages.first().is_some_and(|m| m.role == "system");
    if !has_system {
        let personality = request.personality.unwrap_or_default();
        messages.insert(0, ChatMessage::system(personality.system_prompt()));
    }

    let upstream = state.llm.stream_chat(messages).await?;
    info!(turns = request.messages.len(), "relaying chat completion");

    Ok(sse_relay(upstream, state.relay.max_stream_duration))
}

/// Answer a query against an ingested document's summary, streamed.
#[instrument(skip(state, request))]
pub async fn analyze_file(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeFileRequest>,
) -> ApiResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    if request.summary.trim().is_empty() || request.query.trim().is_empty() {
        return Err(ApiError::bad_request("summary and query are required"));
    }

    let messages = vec![
        ChatMessage::system(ANALYSIS_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Document summary:\n{}\n\nUser query: {}",
            request.summary, request.query
        )),
    ];

    let upstream = state.llm.stream_chat(messages).await?;
    info!("relaying document analysis");

    Ok(sse_relay(upstream, state.relay.max_stream_duration))
}

/// Forward upstream bytes to the client as an ordered SSE event stream.
///
/// Single producer, single consumer, no reordering buffer. Dropping the
/// returned stream (client disconnect) drops the upstream response and
/// thereby aborts the upstream request. The deadline bounds how long one
/// exchange may hold its connections.
fn sse_relay(
    upstream: BoxStream<'static, reqwest::Result<Bytes>>,
    max_duration: Duration,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let stream = stream! {
        let mut upstream = upstream;
        let mut parser = SseParser::new();
        let deadline = tokio::time::Instant::now() + max_duration;

        'relay: loop {
            let chunk = match tokio::time::timeout_at(deadline, upstream.next()).await {
                Err(_) => {
                    warn!("stream exceeded maximum duration, terminating");
                    yield Ok(error_event("stream exceeded maximum duration"));
                    break 'relay;
                }
                Ok(None) => {
                    // Upstream closed without sending the sentinel; the
                    // client must not be left waiting for a terminal.
                    warn!("upstream closed before the end-of-stream sentinel");
                    yield Ok(error_event("upstream connection closed before completion"));
                    break 'relay;
                }
                Ok(Some(Err(err))) => {
                    warn!("upstream stream error: {}", err);
                    yield Ok(error_event(&format!("upstream stream error: {}", err)));
                    break 'relay;
                }
                Ok(Some(Ok(bytes))) => bytes,
            };

            for event in parser.push(&chunk) {
                match event {
                    StreamEvent::Delta(text) => {
                        let payload = serde_json::json!({ "content": text });
                        yield Ok(Event::default().data(payload.to_string()));
                    }
                    StreamEvent::Done => {
                        yield Ok(Event::default().data(DONE_SENTINEL));
                        break 'relay;
                    }
                    StreamEvent::Error(message) => {
                        yield Ok(error_event(&message));
                        break 'relay;
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn error_event(message: &str) -> Event {
    Event::default().data(serde_json::json!({ "error": message }).to_string())
}

/// Convert stored turns into the upstream wire shape.
///
/// Error turns stay in durable history but are never replayed upstream; the
/// generation service only accepts system/user/assistant roles.
fn to_chat_messages(turns: &[ConversationTurn]) -> Vec<ChatMessage> {
    turns
        .iter()
        .filter(|turn| turn.role != Role::Error)
        .map(|turn| ChatMessage {
            role: turn.role.to_string(),
            content: turn.content.clone(),
        })
        .collect()
}

// ============================================================================
// Document Ingestion and Non-Streamed Generation
// ============================================================================

/// Ingest an uploaded document: extract its text and summarize it.
#[instrument(skip(state, multipart))]
pub async fn process_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<SummaryResponse>> {
    let mut upload: Option<(String, Option<String>, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(|s| s.to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read upload: {}", e)))?;

        upload = Some((filename, content_type, data));
        break;
    }

    let Some((filename, content_type, data)) = upload else {
        return Err(ApiError::bad_request("no file uploaded"));
    };

    // Rejects empty or unsupported uploads before any upstream call.
    let text = extract_text(&filename, content_type.as_deref(), &data)?;
    info!(filename = %filename, chars = text.len(), "ingesting document");

    let summary = state
        .llm
        .complete(
            vec![
                ChatMessage::system(INGEST_SYSTEM_PROMPT),
                ChatMessage::user(text),
            ],
            None,
        )
        .await?;

    Ok(Json(SummaryResponse { summary }))
}

/// Generate a short session title from the first message.
#[instrument(skip(state, request))]
pub async fn generate_session_name(
    State(state): State<AppState>,
    Json(request): Json<GenerateNameRequest>,
) -> ApiResult<Json<NameResponse>> {
    if request.message.trim().is_empty() {
        return Err(ApiError::bad_request("message is required"));
    }

    let name = state
        .llm
        .complete(
            vec![
                ChatMessage::system(NAMING_SYSTEM_PROMPT),
                ChatMessage::user(request.message),
            ],
            Some(20),
        )
        .await?;

    Ok(Json(NameResponse {
        name: name.trim().to_string(),
    }))
}

/// Generate a concise summary of a conversation.
#[instrument(skip(state, request))]
pub async fn generate_summary(
    State(state): State<AppState>,
    Json(request): Json<GenerateSummaryRequest>,
) -> ApiResult<Json<SummaryResponse>> {
    if request.messages.is_empty() {
        return Err(ApiError::bad_request("messages must not be empty"));
    }

    let transcript = request
        .messages
        .iter()
        .map(|turn| format!("{}: {}", turn.role, turn.content))
        .collect::<Vec<_>>()
        .join("\n");

    let summary = state
        .llm
        .complete(
            vec![
                ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
                ChatMessage::user(format!(
                    "Please provide a concise summary of the following conversation:\n\n{}",
                    transcript
                )),
            ],
            None,
        )
        .await?;

    Ok(Json(SummaryResponse { summary }))
}

// ============================================================================
// Personalities
// ============================================================================

/// List the selectable personalities.
pub async fn list_personalities() -> Json<Vec<PersonalityInfo>> {
    let personalities = Personality::ALL
        .iter()
        .map(|p| PersonalityInfo {
            id: *p,
            name: p.display_name(),
            description: p.description(),
        })
        .collect();

    Json(personalities)
}

// ============================================================================
// Session Handlers
// ============================================================================

/// List sessions, most recently written first.
#[instrument(skip(state))]
pub async fn list_sessions(State(state): State<AppState>) -> ApiResult<Json<Vec<Session>>> {
    let sessions = state.sessions.list_sessions(DEFAULT_USER).await?;
    Ok(Json(sessions))
}

/// Create a new session.
#[instrument(skip(state, request))]
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    let session = state
        .sessions
        .create_session(DEFAULT_USER, request.name, request.personality)
        .await?;

    info!(session_id = %session.id, "created session");
    Ok((StatusCode::CREATED, Json(session)))
}

/// Fetch a session with both turn threads.
#[instrument(skip(state))]
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionDetail>> {
    let detail = state
        .sessions
        .get_session_detail(&session_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("session not found: {}", session_id)))?;

    Ok(Json(detail))
}

/// Rename and/or pin a session.
#[instrument(skip(state, request))]
pub async fn update_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<UpdateSessionRequest>,
) -> ApiResult<StatusCode> {
    if let Some(ref name) = request.name {
        if name.trim().is_empty() {
            return Err(ApiError::bad_request("name must not be empty"));
        }
        state.sessions.rename(&session_id, name.trim()).await?;
    }
    if let Some(pinned) = request.is_pinned {
        state.sessions.set_pinned(&session_id, pinned).await?;
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Replace the main conversation with a full turn sequence.
#[instrument(skip(state, request))]
pub async fn replace_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ReplaceMessagesRequest>,
) -> ApiResult<StatusCode> {
    state
        .sessions
        .replace_messages(&session_id, &request.messages)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Replace the document Q&A thread with a full turn sequence.
#[instrument(skip(state, request))]
pub async fn replace_document_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ReplaceMessagesRequest>,
) -> ApiResult<StatusCode> {
    state
        .sessions
        .replace_document_messages(&session_id, &request.messages)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Set a session's personality.
#[instrument(skip(state, request))]
pub async fn set_personality(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SetPersonalityRequest>,
) -> ApiResult<StatusCode> {
    state
        .sessions
        .set_personality(&session_id, request.personality)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Attach an auxiliary document to a session.
#[instrument(skip(state, request))]
pub async fn set_document(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SetDocumentRequest>,
) -> ApiResult<StatusCode> {
    if request.filename.trim().is_empty() {
        return Err(ApiError::bad_request("filename must not be empty"));
    }

    state
        .sessions
        .set_document(&session_id, &request.filename, &request.summary)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Delete a session.
#[instrument(skip(state))]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.sessions.delete_session(&session_id).await?;
    info!(session_id = %session_id, "deleted session");
    Ok(StatusCode::NO_CONTENT)
}
