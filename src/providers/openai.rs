//! OpenAI-compatible chat-completions client.
//!
//! One client serves both the primary (tool-capable) and fallback paths;
//! the model and tool set are chosen per request. Rate limits, transport
//! failures and malformed responses all surface as a generic inference
//! error, which is what triggers the fallback retry upstream.

use serde::{Deserialize, Serialize};

use crate::agent::error::AgentError;
use crate::agent::tools::ToolSchema;
use crate::agent::types::{ContentPart, ConversationTurn, Role, ToolCall};
use crate::providers::{InferenceProvider, InferenceRequest, InferenceResponse};

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiChatClient {
    /// Create a client for `base_url` (e.g. `https://api.groq.com/openai/v1`).
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait::async_trait]
impl InferenceProvider for OpenAiChatClient {
    async fn complete(&self, request: InferenceRequest) -> Result<InferenceResponse, AgentError> {
        let body = WireRequest::from_request(&request);
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::Inference(format!(
                "chat completion returned {status}: {detail}"
            )));
        }

        let completion: WireResponse = response.json().await?;
        let message = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| AgentError::Inference("response carried no choices".to_string()))?;

        Ok(InferenceResponse {
            content: message.content.unwrap_or_default(),
            tool_calls: message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
        })
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

impl<'a> WireRequest<'a> {
    fn from_request(request: &'a InferenceRequest) -> Self {
        let mut messages = vec![WireMessage {
            role: "system",
            content: Some(WireContent::Text(&request.system_prompt)),
            tool_call_id: None,
            tool_calls: None,
        }];
        messages.extend(request.turns.iter().map(wire_message));

        Self {
            model: &request.model,
            messages,
            max_tokens: request.max_tokens,
            tools: request.tools.iter().map(|schema| WireTool {
                kind: "function",
                function: schema,
            }).collect(),
            tool_choice: if request.tools.is_empty() {
                None
            } else {
                Some("auto")
            },
        }
    }
}

fn wire_message(turn: &ConversationTurn) -> WireMessage<'_> {
    match turn.role {
        Role::User => WireMessage {
            role: "user",
            content: Some(WireContent::Parts(
                turn.content.iter().map(wire_part).collect(),
            )),
            tool_call_id: None,
            tool_calls: None,
        },
        Role::Assistant if !turn.tool_calls.is_empty() => WireMessage {
            role: "assistant",
            content: None,
            tool_call_id: None,
            tool_calls: Some(
                turn.tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: &call.id,
                        kind: "function",
                        function: WireFunction {
                            name: &call.name,
                            arguments: &call.arguments,
                        },
                    })
                    .collect(),
            ),
        },
        Role::Assistant => WireMessage {
            role: "assistant",
            content: turn
                .content
                .first()
                .and_then(ContentPart::as_text)
                .map(WireContent::Text),
            tool_call_id: None,
            tool_calls: None,
        },
        Role::Tool => WireMessage {
            role: "tool",
            content: turn
                .content
                .first()
                .and_then(ContentPart::as_text)
                .map(WireContent::Text),
            tool_call_id: turn.tool_call_id.as_deref(),
            tool_calls: None,
        },
    }
}

fn wire_part(part: &ContentPart) -> WirePart<'_> {
    match part {
        ContentPart::Text(text) => WirePart::Text { text },
        ContentPart::Image { url } => WirePart::ImageUrl {
            image_url: WireImageUrl { url },
        },
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<WireContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall<'a>>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireContent<'a> {
    Text(&'a str),
    Parts(Vec<WirePart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: WireImageUrl<'a> },
}

#[derive(Serialize)]
struct WireImageUrl<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolSchema,
}

#[derive(Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireResponseToolCall>>,
}

#[derive(Deserialize)]
struct WireResponseToolCall {
    id: String,
    function: WireResponseFunction,
}

#[derive(Deserialize)]
struct WireResponseFunction {
    name: String,
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn request() -> InferenceRequest {
        InferenceRequest {
            model: "test-model".to_string(),
            system_prompt: "be helpful".to_string(),
            turns: vec![
                ConversationTurn::user(vec![
                    ContentPart::Text("what is this?".to_string()),
                    ContentPart::Image {
                        url: "data:image/png;base64,AAAA".to_string(),
                    },
                ]),
                ConversationTurn::assistant("a square"),
            ],
            tools: vec![crate::agent::tools::ToolSchema {
                name: "web_search".to_string(),
                description: "search".to_string(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            max_tokens: 256,
        }
    }

    #[test]
    fn test_request_wire_shape() {
        let request = request();
        let wire = WireRequest::from_request(&request);
        let json: Value = serde_json::to_value(&wire).expect("serialize");

        assert_eq!(json["model"], "test-model");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"][1]["type"], "image_url");
        assert_eq!(json["messages"][2]["content"], "a square");
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["function"]["name"], "web_search");
        assert_eq!(json["tool_choice"], "auto");
    }

    #[test]
    fn test_toolless_request_omits_tool_fields() {
        let mut request = request();
        request.tools.clear();
        let json: Value =
            serde_json::to_value(WireRequest::from_request(&request)).expect("serialize");
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
    }

    #[test]
    fn test_tool_call_turn_wire_shape() {
        let turn = ConversationTurn::assistant_tool_calls(vec![ToolCall {
            id: "call-7".to_string(),
            name: "web_search".to_string(),
            arguments: r#"{"query":"x"}"#.to_string(),
        }]);
        let json: Value = serde_json::to_value(wire_message(&turn)).expect("serialize");
        assert_eq!(json["tool_calls"][0]["id"], "call-7");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "web_search");
        assert!(json.get("content").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call-1",
                        "type": "function",
                        "function": {"name": "web_search", "arguments": "{\"query\":\"rust\"}"}
                    }]
                }
            }]
        }"#;
        let response: WireResponse = serde_json::from_str(raw).expect("parse");
        let message = &response.choices[0].message;
        assert!(message.content.is_none());
        let calls = message.tool_calls.as_ref().expect("tool calls");
        assert_eq!(calls[0].function.name, "web_search");
    }
}
