//! Error types for the orchestration engine.

use thiserror::Error;

/// Errors that can occur while producing a reply.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Inference request failed (network, rate limit, malformed output).
    #[error("inference request failed: {0}")]
    Inference(String),

    /// Web search failed.
    #[error("search failed: {0}")]
    Search(String),

    /// A media item could not be processed (download, decode, analysis).
    #[error("media processing failed: {0}")]
    Media(String),

    /// The model requested a tool this engine does not provide.
    #[error("unsupported tool: {0}")]
    UnsupportedTool(String),

    /// Tool arguments did not parse against the tool's schema.
    #[error("malformed arguments for tool {name}: {source}")]
    ToolArguments {
        /// Tool name.
        name: String,
        /// Underlying parse failure.
        source: serde_json::Error,
    },

    /// Messaging-platform operation failed.
    #[error("platform operation failed: {0}")]
    Platform(String),

    /// A reminder duration did not match the `1d`/`2h`/`30m` grammar.
    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    /// HTTP transport failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Regex compilation failure.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Whether the failed operation may succeed if retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Inference(_) | Self::Search(_) | Self::Http(_))
    }
}
