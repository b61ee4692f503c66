//! Test utilities and common setup.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::Response;
use axum::routing::post;
use axum::{Router, extract::State};
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;

use banter::api::{self, AppState, RelayConfig};
use banter::db::Database;
use banter::llm::CompletionClient;
use banter::session::{SessionRepository, SessionService};

/// Create a test application with an in-memory store and an unreachable
/// upstream. Fine for everything that never reaches the generation service.
pub async fn test_app() -> Router {
    test_app_with_upstream("http://127.0.0.1:9", Some("test-key")).await
}

/// Create a test application against the given upstream base URL.
pub async fn test_app_with_upstream(base_url: &str, api_key: Option<&str>) -> Router {
    let db = Database::in_memory().await.unwrap();
    let session_service = SessionService::new(SessionRepository::new(db.pool().clone()));
    let llm = CompletionClient::new(base_url, api_key.map(String::from), "test-model")
        .with_timeout(Duration::from_secs(5));

    let state = AppState::new(session_service, llm, RelayConfig::default());
    api::create_router(state)
}

/// Serve a router on an ephemeral port and return its base URL.
pub async fn spawn_app(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// How the mock generation service behaves on /chat/completions.
#[derive(Clone)]
pub enum UpstreamBehavior {
    /// Emit each string as one network chunk, with a pause between them.
    Frames { frames: Vec<String>, delay: Duration },
    /// Respond with a non-2xx status and a canned body.
    Status { status: u16, body: String },
    /// Stream deltas forever; the sender fires when the connection drops.
    Hang { on_drop: mpsc::UnboundedSender<()> },
}

/// Spawn a mock upstream server and return its base URL.
pub async fn spawn_upstream(behavior: UpstreamBehavior) -> String {
    let app = Router::new()
        .route("/chat/completions", post(upstream_handler))
        .with_state(Arc::new(behavior));
    spawn_app(app).await
}

/// Build one upstream `data:` record carrying a content delta.
pub fn delta_record(content: &str) -> String {
    format!(
        "data: {}\n",
        serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
    )
}

/// The upstream end-of-stream sentinel record.
pub fn done_record() -> String {
    "data: [DONE]\n".to_string()
}

async fn upstream_handler(State(behavior): State<Arc<UpstreamBehavior>>) -> Response {
    match behavior.as_ref() {
        UpstreamBehavior::Frames { frames, delay } => {
            let frames = frames.clone();
            let delay = *delay;
            let stream = futures::stream::iter(frames).then(move |frame| async move {
                tokio::time::sleep(delay).await;
                Ok::<_, Infallible>(Bytes::from(frame))
            });

            Response::builder()
                .header(header::CONTENT_TYPE, "text/event-stream")
                .body(Body::from_stream(stream))
                .unwrap()
        }
        UpstreamBehavior::Status { status, body } => Response::builder()
            .status(StatusCode::from_u16(*status).unwrap())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.clone()))
            .unwrap(),
        UpstreamBehavior::Hang { on_drop } => {
            let guard = DropGuard(on_drop.clone());
            let stream = async_stream::stream! {
                let _guard = guard;
                let mut n = 0u64;
                loop {
                    tokio::time::sleep(Duration::from_millis(25)).await;
                    n += 1;
                    yield Ok::<_, Infallible>(Bytes::from(delta_record(&format!("chunk{n} "))));
                }
            };

            Response::builder()
                .header(header::CONTENT_TYPE, "text/event-stream")
                .body(Body::from_stream(stream))
                .unwrap()
        }
    }
}

/// Fires its channel when dropped, i.e. when the response body is released.
struct DropGuard(mpsc::UnboundedSender<()>);

impl Drop for DropGuard {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}
