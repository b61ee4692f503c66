//! API route definitions.

use axum::http::{HeaderValue, Method, header};
use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);

    // Tracing layer with request spans and timing
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let api_routes = Router::new()
        // Relay endpoints (streamed)
        .route("/chat", post(handlers::chat))
        .route("/analyze-file", post(handlers::analyze_file))
        // Document ingestion and non-streamed generation
        .route("/process-file", post(handlers::process_file))
        .route(
            "/generate-session-name",
            post(handlers::generate_session_name),
        )
        .route("/generate-summary", post(handlers::generate_summary))
        // Personalities
        .route("/personalities", get(handlers::list_personalities))
        // Session management
        .route(
            "/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route(
            "/sessions/{session_id}",
            get(handlers::get_session)
                .patch(handlers::update_session)
                .delete(handlers::delete_session),
        )
        .route(
            "/sessions/{session_id}/messages",
            put(handlers::replace_messages),
        )
        .route(
            "/sessions/{session_id}/personality",
            put(handlers::set_personality),
        )
        .route(
            "/sessions/{session_id}/document",
            put(handlers::set_document),
        )
        .route(
            "/sessions/{session_id}/document/messages",
            put(handlers::replace_document_messages),
        );

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(trace_layer)
        .with_state(state)
}

/// Build the CORS layer based on configuration.
///
/// With no configured origins, common local dev origins are allowed; the
/// browser front-end runs on a different port than the relay.
fn build_cors_layer(state: &AppState) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::PATCH,
        Method::OPTIONS,
    ];

    let headers = [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::ACCEPT,
        header::ORIGIN,
    ];

    let configured = &state.relay.allowed_origins;
    if configured.is_empty() {
        tracing::debug!("CORS: no origins configured, allowing localhost dev origins");
        CorsLayer::new()
            .allow_origin([
                "http://localhost:3000".parse::<HeaderValue>().unwrap(),
                "http://localhost:5173".parse::<HeaderValue>().unwrap(),
                "http://127.0.0.1:3000".parse::<HeaderValue>().unwrap(),
                "http://127.0.0.1:5173".parse::<HeaderValue>().unwrap(),
            ])
            .allow_methods(methods)
            .allow_headers(headers)
    } else {
        let origins: Vec<HeaderValue> = configured
            .iter()
            .filter_map(|origin| {
                origin.parse::<HeaderValue>().ok().or_else(|| {
                    tracing::warn!("CORS: invalid origin in config: {}", origin);
                    None
                })
            })
            .collect();

        if origins.is_empty() {
            tracing::error!("CORS: all configured origins are invalid!");
            CorsLayer::new().allow_origin(AllowOrigin::exact(HeaderValue::from_static("null")))
        } else {
            tracing::info!("CORS: allowing {} origin(s)", origins.len());
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(methods)
                .allow_headers(headers)
        }
    }
}
