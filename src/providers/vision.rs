//! Image understanding: a vision chat model for prose descriptions plus an
//! OCR.space client for literal text extraction. The two are combined by
//! the history normalizer, not here.

use serde::{Deserialize, Serialize};

use crate::agent::error::AgentError;
use crate::providers::{OcrProvider, VisionProvider};

const DESCRIBE_PROMPT: &str =
    "Describe this image concisely in one or two sentences. Mention any text \
     that is clearly visible.";

/// Vision-capable chat-completions client used only for image descriptions.
pub struct VisionChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl VisionChatClient {
    /// Create a client targeting a vision-capable `model`.
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

#[derive(Serialize)]
struct VisionRequest<'a> {
    model: &'a str,
    messages: [VisionMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Serialize)]
struct VisionMessage<'a> {
    role: &'static str,
    content: [VisionPart<'a>; 2],
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum VisionPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: VisionImageUrl<'a> },
}

#[derive(Serialize)]
struct VisionImageUrl<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct VisionResponse {
    choices: Vec<VisionChoice>,
}

#[derive(Deserialize)]
struct VisionChoice {
    message: VisionChoiceMessage,
}

#[derive(Deserialize)]
struct VisionChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait::async_trait]
impl VisionProvider for VisionChatClient {
    async fn describe(&self, image_ref: &str) -> Result<String, AgentError> {
        let body = VisionRequest {
            model: &self.model,
            messages: [VisionMessage {
                role: "user",
                content: [
                    VisionPart::Text {
                        text: DESCRIBE_PROMPT,
                    },
                    VisionPart::ImageUrl {
                        image_url: VisionImageUrl { url: image_ref },
                    },
                ],
            }],
            max_tokens: 512,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::Media(format!(
                "vision model returned {status}: {detail}"
            )));
        }

        let parsed: VisionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| AgentError::Media("vision model returned no description".to_string()))
    }
}

/// OCR.space text extraction client.
pub struct OcrSpaceClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl OcrSpaceClient {
    /// Create a client for the OCR.space parse endpoint.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OcrResponse {
    #[serde(default)]
    parsed_results: Vec<OcrParsedResult>,
    #[serde(default)]
    is_errored_on_processing: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OcrParsedResult {
    #[serde(default)]
    parsed_text: String,
}

#[async_trait::async_trait]
impl OcrProvider for OcrSpaceClient {
    async fn extract_text(&self, image_ref: &str) -> Result<String, AgentError> {
        // OCR.space takes inline images and remote URLs through different
        // form fields.
        let image_field = if image_ref.starts_with("data:") {
            "base64Image"
        } else {
            "url"
        };
        let form = [
            (image_field, image_ref),
            ("OCREngine", "2"),
            ("scale", "true"),
            ("detectOrientation", "true"),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .header("apikey", &self.api_key)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Media(format!("ocr returned {status}")));
        }

        let parsed: OcrResponse = response.json().await?;
        if parsed.is_errored_on_processing {
            return Err(AgentError::Media("ocr failed to process image".to_string()));
        }
        Ok(parsed
            .parsed_results
            .into_iter()
            .next()
            .map(|result| result.parsed_text.trim().to_string())
            .unwrap_or_default())
    }
}
