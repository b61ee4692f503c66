//! Upstream completion client module.
//!
//! Talks to an OpenAI-compatible chat-completions service, either as a
//! single buffered request or as a server-sent-event stream, and reframes
//! the upstream stream into relay events.

mod client;
mod error;
mod sse;
mod types;

pub use client::CompletionClient;
pub use error::{UpstreamError, UpstreamResult};
pub use sse::{DONE_SENTINEL, SseParser, StreamEvent};
pub use types::*;
