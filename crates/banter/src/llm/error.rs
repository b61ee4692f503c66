//! Upstream client error types.

use thiserror::Error;

/// Result type for upstream operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Errors that can occur while talking to the generation service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// No API key configured for the upstream service.
    #[error("upstream API key is not configured")]
    MissingApiKey,

    /// HTTP request failed before a response was received.
    #[error("upstream request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The upstream service returned a non-success status.
    #[error("upstream returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The upstream response could not be parsed.
    #[error("failed to parse upstream response: {0}")]
    ParseError(String),

    /// A non-streamed response carried no choices.
    #[error("upstream response contained no choices")]
    EmptyResponse,
}
