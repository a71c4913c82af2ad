//! External capability seams.
//!
//! Every network-backed collaborator of the engine sits behind one of these
//! traits: model inference, speech-to-text, vision, OCR, web search, table
//! rendering, PDF extraction, and the messaging platform itself. The
//! orchestration core only ever talks to the traits, so tests swap in
//! scripted stubs and production wires the HTTP clients below.

pub mod brave;
pub mod console;
pub mod openai;
pub mod vision;
pub mod whisper;

pub use brave::BraveSearchClient;
pub use console::ConsolePlatform;
pub use openai::OpenAiChatClient;
pub use vision::{OcrSpaceClient, VisionChatClient};
pub use whisper::WhisperClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::error::AgentError;
use crate::agent::tools::ToolSchema;
use crate::agent::types::{ConversationTurn, PlatformMessage, ToolCall};

/// One inference request: system instruction, dialogue, optional tools.
#[derive(Clone, Debug)]
pub struct InferenceRequest {
    /// Model identifier.
    pub model: String,
    /// Fixed system instruction.
    pub system_prompt: String,
    /// Dialogue history, oldest first.
    pub turns: Vec<ConversationTurn>,
    /// Tool schemas offered to the model; empty disables tool calling.
    pub tools: Vec<ToolSchema>,
    /// Token budget.
    pub max_tokens: u32,
}

/// The model's reply to one inference request.
#[derive(Clone, Debug, Default)]
pub struct InferenceResponse {
    /// Assistant text, possibly empty when tools are requested.
    pub content: String,
    /// Tool invocations the model wants executed before answering.
    pub tool_calls: Vec<ToolCall>,
}

/// Chat-completion inference. Errors are deliberately coarse: rate limits,
/// network failures and malformed output all surface alike and trigger the
/// single fallback retry.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Submit one request and return the model's message.
    async fn complete(&self, request: InferenceRequest) -> Result<InferenceResponse, AgentError>;
}

/// Speech-to-text over raw audio bytes.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an audio clip.
    async fn transcribe(&self, audio: &[u8]) -> Result<String, AgentError>;
}

/// Vision description of an image locator (URL or `data:` URL).
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Describe the image in prose.
    async fn describe(&self, image_ref: &str) -> Result<String, AgentError>;
}

/// OCR text extraction from an image locator.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Extract any readable text from the image.
    async fn extract_text(&self, image_ref: &str) -> Result<String, AgentError>;
}

/// One web search result as fed back to the model.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result title.
    pub title: String,
    /// Result URL.
    pub link: String,
    /// Short description.
    pub description: String,
    /// Extra text snippets, when the engine provides them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snippets: Vec<String>,
    /// Whether this came from a breaking-news vertical.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub news: bool,
}

/// Web search capability.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search the web, biased towards `country` results.
    async fn search(&self, query: &str, country: &str)
        -> Result<Vec<SearchResult>, AgentError>;
}

/// Structured table data to render as an image.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableSpec {
    /// Column headers.
    pub headers: Vec<String>,
    /// Row cells, already stringified.
    pub rows: Vec<Vec<String>>,
    /// Optional title drawn above the table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Renders tabular data into a PNG delivered out-of-band.
#[async_trait]
pub trait TableRenderer: Send + Sync {
    /// Render the table; returns encoded image bytes.
    async fn render(&self, spec: &TableSpec) -> Result<Vec<u8>, AgentError>;
}

/// PDF text extraction.
#[async_trait]
pub trait PdfExtractor: Send + Sync {
    /// Extract the document's text content.
    async fn extract_text(&self, bytes: &[u8]) -> Result<String, AgentError>;
}

/// The messaging platform the engine replies through. Consumed, not
/// designed here: delivery, history retrieval and presence signaling are
/// platform concerns.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Deliver a text reply.
    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<(), AgentError>;

    /// Deliver an image attachment.
    async fn send_image(&self, conversation_id: &str, png: &[u8]) -> Result<(), AgentError>;

    /// Fetch up to `limit` recent messages, newest first.
    async fn fetch_history(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<PlatformMessage>, AgentError>;

    /// Signal that the bot is composing a reply.
    async fn set_typing(&self, conversation_id: &str) -> Result<(), AgentError>;

    /// Clear the composing signal.
    async fn clear_typing(&self, conversation_id: &str) -> Result<(), AgentError>;

    /// Clear the conversation's history on the platform side.
    async fn clear_history(&self, conversation_id: &str) -> Result<(), AgentError>;
}
