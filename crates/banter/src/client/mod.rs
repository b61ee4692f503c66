//! Client-side consumer of the relay's event stream.
//!
//! Reads the relay response body incrementally, applies the same
//! line-buffering discipline as the server-side reframer to the relay's own
//! framing, accumulates deltas into a growing partial answer, and commits
//! the finished answer into the session store once the terminal marker
//! arrives. Decoding is byte-buffered so multi-byte characters split across
//! network chunks never corrupt the text.

use anyhow::{Context, Result, bail};
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::llm::StreamEvent;
use crate::persona::Personality;
use crate::session::{ConversationTurn, Session, SessionDetail};

/// Outcome of one streamed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The exchange completed; the full accumulated answer.
    Completed(String),
    /// The exchange failed after streaming began; the error text.
    Failed(String),
}

/// A committed turn plus the persistence result.
///
/// Persistence failure is non-fatal to the visible conversation: the turn is
/// still returned for display and `persist_error` carries what went wrong.
#[derive(Debug)]
pub struct TurnCommit {
    /// The full message sequence as committed (or as it should have been).
    pub messages: Vec<ConversationTurn>,
    /// The turn produced by this exchange (assistant or error).
    pub turn: ConversationTurn,
    /// Set when the store write failed.
    pub persist_error: Option<String>,
}

/// Line-buffering reader over the relay's own event framing.
#[derive(Debug, Default)]
pub struct RelayFrameReader {
    buf: Vec<u8>,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct RelayFrame {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl RelayFrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning the events completed by it.
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
                    self.done = true;
                    self.buf.clear();
                    break;
                }
            }
        }

        events
    }

    fn process_line(&self, raw: &[u8]) -> Option<StreamEvent> {
        let line = std::str::from_utf8(raw).ok()?.trim();
        if line.is_empty() {
            return None;
        }

        // Keep-alive comments and other non-data lines are skipped.
        let payload = line.strip_prefix("data: ")?;
        if payload == "[DONE]" {
            return Some(StreamEvent::Done);
        }

        match serde_json::from_str::<RelayFrame>(payload) {
            Ok(frame) => {
                if let Some(error) = frame.error {
                    Some(StreamEvent::Error(error))
                } else {
                    frame
                        .content
                        .filter(|c| !c.is_empty())
                        .map(StreamEvent::Delta)
                }
            }
            Err(err) => {
                debug!("skipping malformed relay record: {}", err);
                None
            }
        }
    }
}

/// HTTP client for the relay API.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl RelayClient {
    /// Create a new client for the given relay base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Check if the relay is up.
    pub async fn health(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("connecting to relay at {}", url))?;
        Ok(response.status().is_success())
    }

    /// List sessions, most recently written first.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let url = format!("{}/api/sessions", self.base_url);
        let response = self.http.get(&url).send().await?;
        Self::parse_json(response).await
    }

    /// Create a session.
    pub async fn create_session(
        &self,
        name: Option<&str>,
        personality: Option<Personality>,
    ) -> Result<Session> {
        let url = format!("{}/api/sessions", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "name": name, "personality": personality }))
            .send()
            .await?;
        Self::parse_json(response).await
    }

    /// Fetch a session with both turn threads.
    pub async fn get_session(&self, id: &str) -> Result<SessionDetail> {
        let url = format!("{}/api/sessions/{}", self.base_url, id);
        let response = self.http.get(&url).send().await?;
        Self::parse_json(response).await
    }

    /// Delete a session.
    pub async fn delete_session(&self, id: &str) -> Result<()> {
        let url = format!("{}/api/sessions/{}", self.base_url, id);
        let response = self.http.delete(&url).send().await?;
        Self::expect_success(response).await
    }

    /// Rename a session.
    pub async fn rename_session(&self, id: &str, name: &str) -> Result<()> {
        let url = format!("{}/api/sessions/{}", self.base_url, id);
        let response = self
            .http
            .patch(&url)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        Self::expect_success(response).await
    }

    /// Replace a session's main conversation with a full turn sequence.
    pub async fn replace_messages(&self, id: &str, turns: &[ConversationTurn]) -> Result<()> {
        let url = format!("{}/api/sessions/{}/messages", self.base_url, id);
        let response = self
            .http
            .put(&url)
            .json(&serde_json::json!({ "messages": turns }))
            .send()
            .await?;
        Self::expect_success(response).await
    }

    /// Ask the relay for a short session title.
    pub async fn generate_name(&self, message: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct NameResponse {
            name: String,
        }

        let url = format!("{}/api/generate-session-name", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await?;
        let body: NameResponse = Self::parse_json(response).await?;
        Ok(body.name)
    }

    /// Stream one exchange, invoking `on_partial` with the growing answer.
    ///
    /// Returns `Failed` (not `Err`) for anything that happens after the
    /// stream opened, so callers can commit an error turn; `Err` means the
    /// exchange was rejected before any event arrived.
    pub async fn stream_chat(
        &self,
        turns: &[ConversationTurn],
        personality: Option<Personality>,
        on_partial: &mut dyn FnMut(&str),
    ) -> Result<StreamOutcome> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "messages": turns, "personality": personality }))
            .send()
            .await
            .with_context(|| format!("connecting to relay at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or(text);
            bail!("relay returned {}: {}", status, message);
        }

        let mut stream = response.bytes_stream();
        let mut reader = RelayFrameReader::new();
        let mut answer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    return Ok(StreamOutcome::Failed(format!(
                        "stream read failed: {}",
                        err
                    )));
                }
            };

            for event in reader.push(&chunk) {
                match event {
                    StreamEvent::Delta(text) => {
                        answer.push_str(&text);
                        on_partial(&answer);
                    }
                    StreamEvent::Done => return Ok(StreamOutcome::Completed(answer)),
                    StreamEvent::Error(message) => return Ok(StreamOutcome::Failed(message)),
                }
            }
        }

        // The relay always terminates a stream; reaching here means the
        // connection died underneath us.
        Ok(StreamOutcome::Failed(
            "connection closed before completion".to_string(),
        ))
    }

    /// Submit one user turn against a session and commit the result.
    ///
    /// The exchange's outcome becomes an assistant turn (on completion) or
    /// an error turn (on failure), appended to the full sequence and written
    /// back through the store's full-sequence replace. A failed write does
    /// not discard the turn; it is surfaced in `persist_error`.
    pub async fn send_turn(
        &self,
        session: &SessionDetail,
        input: &str,
        on_partial: &mut dyn FnMut(&str),
    ) -> Result<TurnCommit> {
        let mut messages = session.messages.clone();
        messages.push(ConversationTurn::user(input));

        let outcome = self
            .stream_chat(&messages, Some(session.session.personality), on_partial)
            .await?;

        let turn = match outcome {
            StreamOutcome::Completed(answer) => ConversationTurn::assistant(answer),
            StreamOutcome::Failed(message) => ConversationTurn::error(message),
        };
        messages.push(turn.clone());

        let persist_error = self
            .replace_messages(&session.session.id, &messages)
            .await
            .err()
            .map(|e| e.to_string());

        Ok(TurnCommit {
            messages,
            turn,
            persist_error,
        })
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("relay returned {}: {}", status, text);
        }
        response.json().await.context("parsing relay response")
    }

    async fn expect_success(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("relay returned {}: {}", status, text);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "content": content })
        )
    }

    #[test]
    fn test_accumulation_order() {
        let mut reader = RelayFrameReader::new();
        let input = format!("{}{}{}data: [DONE]\n\n", frame("4"), frame(" is"), frame(" the answer"));

        let mut answer = String::new();
        let mut partials = Vec::new();
        let mut terminal = false;

        for event in reader.push(input.as_bytes()) {
            match event {
                StreamEvent::Delta(text) => {
                    answer.push_str(&text);
                    partials.push(answer.clone());
                }
                StreamEvent::Done => terminal = true,
                StreamEvent::Error(_) => panic!("unexpected error event"),
            }
        }

        assert_eq!(partials, vec!["4", "4 is", "4 is the answer"]);
        assert!(terminal);
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let mut reader = RelayFrameReader::new();
        let full = frame("café");
        let bytes = full.as_bytes();
        let split = full.find("é").unwrap() + 1;

        assert!(reader.push(&bytes[..split]).is_empty());
        let events = reader.push(&bytes[split..]);
        assert_eq!(events, vec![StreamEvent::Delta("café".to_string())]);
    }

    #[test]
    fn test_error_frame_is_terminal() {
        let mut reader = RelayFrameReader::new();
        let input = format!(
            "data: {}\n\n{}",
            serde_json::json!({ "error": "upstream stream error" }),
            frame("late")
        );

        let events = reader.push(input.as_bytes());
        assert_eq!(
            events,
            vec![StreamEvent::Error("upstream stream error".to_string())]
        );

        // Nothing after a terminal.
        assert!(reader.push(frame("more").as_bytes()).is_empty());
    }

    #[test]
    fn test_keepalive_comments_ignored() {
        let mut reader = RelayFrameReader::new();
        let input = format!(":\n\n{}data: [DONE]\n\n", frame("hi"));
        let events = reader.push(input.as_bytes());
        assert_eq!(
            events,
            vec![StreamEvent::Delta("hi".to_string()), StreamEvent::Done]
        );
    }
}
