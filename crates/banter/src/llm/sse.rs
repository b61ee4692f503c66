//! Incremental parser for the upstream server-sent-event stream.
//!
//! Upstream frames arrive as newline-delimited `data: `-prefixed records,
//! and a logical record may be split across network chunks. The parser keeps
//! a single growing byte buffer, only interpreting complete lines, so a
//! record (or a multi-byte character inside one) can arrive in any number of
//! pieces. A malformed record is logged and skipped; the upstream protocol
//! is not under our control and partial corruption happens in practice.

use tracing::{debug, warn};

use super::types::ChatCompletionChunk;

/// End-of-stream sentinel sent by the generation service.
pub const DONE_SENTINEL: &str = "[DONE]";

/// A reframed event, scoped to a single relay exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// An incremental fragment of the generated answer.
    Delta(String),
    /// No further deltas will arrive.
    Done,
    /// The exchange failed; terminal like `Done`.
    Error(String),
}

/// Line-buffering parser over the upstream byte stream.
#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
    done: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminal sentinel has been observed.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one network chunk, returning the events completed by it.
    ///
    /// After the sentinel has been seen, remaining input is discarded and no
    /// further events are produced.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        self.buf.extend_from_slice(chunk);

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(event) = self.process_line(&line[..line.len() - 1]) {
                let terminal = !matches!(event, StreamEvent::Delta(_));
                events.push(event);
                if terminal {
                    self.buf.clear();
                    break;
                }
            }
        }

        events
    }

    fn process_line(&mut self, raw: &[u8]) -> Option<StreamEvent> {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim(),
            Err(err) => {
                warn!("skipping non-UTF-8 stream line: {}", err);
                return None;
            }
        };

        if line.is_empty() {
            return None;
        }

        let payload = line.strip_prefix("data: ")?;
        if payload == DONE_SENTINEL {
            self.done = true;
            return Some(StreamEvent::Done);
        }

        match serde_json::from_str::<ChatCompletionChunk>(payload) {
            Ok(chunk) => chunk
                .choices
                .first()
                .and_then(|choice| choice.delta.content.clone())
                .filter(|content| !content.is_empty())
                .map(StreamEvent::Delta),
            Err(err) => {
                debug!("skipping malformed stream record: {}", err);
                None
            }
        }
    }
}
