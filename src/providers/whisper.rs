//! Whisper-compatible audio transcription client.

use serde::Deserialize;

use crate::agent::error::AgentError;
use crate::providers::Transcriber;

/// HTTP client for an OpenAI-compatible `/audio/transcriptions` endpoint.
pub struct WhisperClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl WhisperClient {
    /// Create a client targeting `model` (e.g. `whisper-large-v3`).
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[async_trait::async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, AgentError> {
        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("audio.ogg")
            .mime_str("audio/ogg")?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", part);

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::Media(format!(
                "transcription returned {status}: {detail}"
            )));
        }

        let parsed: TranscriptionResponse = response.json().await?;
        Ok(parsed.text.trim().to_string())
    }
}
