//! Banter backend library.
//!
//! Streaming chat relay with durable per-conversation state: an HTTP API
//! that proxies a generation service's streamed completions to clients and
//! a session store that holds the committed conversation history.

pub mod api;
pub mod client;
pub mod db;
pub mod extract;
pub mod llm;
pub mod persona;
pub mod session;
