//! HTTP client for the generation service.

use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::debug;

use super::error::{UpstreamError, UpstreamResult};
use super::types::*;

/// Client for the OpenAI-compatible chat-completions API.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    /// HTTP client.
    client: reqwest::Client,
    /// Base URL of the generation service (e.g. "https://api.openai.com/v1").
    base_url: String,
    /// Bearer credential; requests fail fast when absent.
    api_key: Option<String>,
    /// Model identifier sent with every request.
    model: String,
    /// Timeout applied to non-streamed requests.
    timeout: Duration,
}

impl CompletionClient {
    /// Create a new client.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.filter(|key| !key.is_empty()),
            model: model.into(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Override the non-streamed request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The configured model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether a credential is configured.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> UpstreamResult<&str> {
        self.api_key
            .as_deref()
            .ok_or(UpstreamError::MissingApiKey)
    }

    /// Open a streamed completion and return the raw upstream byte feed.
    ///
    /// Forwarding can begin as soon as the first frame arrives; nothing is
    /// buffered beyond the in-flight network chunk. Dropping the stream
    /// aborts the upstream connection.
    pub async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
    ) -> UpstreamResult<BoxStream<'static, reqwest::Result<Bytes>>> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: None,
            stream: Some(true),
        };

        let response = self.send(&request, true).await?;
        Ok(response.bytes_stream().boxed())
    }

    /// Issue a non-streamed completion and return the answer text.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: Option<u32>,
    ) -> UpstreamResult<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens,
            stream: None,
        };

        let response = self.send(&request, false).await?;
        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::ParseError(e.to_string()))?;

        let choice = body.choices.first().ok_or(UpstreamError::EmptyResponse)?;
        Ok(choice.message.content.clone().unwrap_or_default())
    }

    async fn send(
        &self,
        request: &ChatCompletionRequest,
        streaming: bool,
    ) -> UpstreamResult<reqwest::Response> {
        let key = self.api_key()?;
        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            streaming,
            "sending chat completion request"
        );

        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(request);
        // A whole-request timeout would cut long generations short, so it only
        // applies to non-streamed calls.
        if !streaming {
            builder = builder.timeout(self.timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<UpstreamErrorResponse>(&text) {
                Ok(parsed) => parsed.error.message,
                Err(_) if text.is_empty() => status.to_string(),
                Err(_) => text,
            };
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = CompletionClient::new(
            "https://api.openai.com/v1",
            Some("test-key".to_string()),
            "gpt-4o-mini",
        );
        assert!(client.is_configured());
        assert_eq!(client.model(), "gpt-4o-mini");
    }

    #[test]
    fn test_empty_key_counts_as_missing() {
        let client =
            CompletionClient::new("http://localhost:9", Some(String::new()), "gpt-4o-mini");
        assert!(!client.is_configured());
        assert!(matches!(
            client.api_key(),
            Err(UpstreamError::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_any_request() {
        // Unroutable base URL: the call must fail on configuration, not I/O.
        let client = CompletionClient::new("http://localhost:9", None, "gpt-4o-mini");
        let result = client.stream_chat(vec![ChatMessage::user("hi")]).await;
        assert!(matches!(result, Err(UpstreamError::MissingApiKey)));
    }

    #[test]
    fn test_request_serialization_skips_unset_fields() {
        let request = ChatCompletionRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![ChatMessage::user("2+2?")],
            max_tokens: None,
            stream: Some(true),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], true);
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
