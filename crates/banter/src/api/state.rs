//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::llm::CompletionClient;
use crate::session::SessionService;

/// Relay configuration for the API layer.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Maximum duration of one streamed exchange before it is cut off with
    /// an error terminal. Bounds resource usage per connection.
    pub max_stream_duration: Duration,
    /// Origins allowed by the CORS layer; empty means local dev defaults.
    pub allowed_origins: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_stream_duration: Duration::from_secs(300),
            allowed_origins: Vec::new(),
        }
    }
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session service owning durable conversation state.
    pub sessions: Arc<SessionService>,
    /// Client for the generation service.
    pub llm: Arc<CompletionClient>,
    /// Relay configuration.
    pub relay: RelayConfig,
}

impl AppState {
    /// Create new application state.
    pub fn new(sessions: SessionService, llm: CompletionClient, relay: RelayConfig) -> Self {
        Self {
            sessions: Arc::new(sessions),
            llm: Arc::new(llm),
            relay,
        }
    }
}
