//! The tool-call request/response loop.
//!
//! Drives the primary model, executes requested tools, re-submits, and
//! falls back to a tool-incapable model pool on primary failure. The loop
//! is iterative with an explicit depth bound so termination is guaranteed
//! even against a model that requests tools forever.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::agent::config::AgentConfig;
use crate::agent::error::AgentError;
use crate::agent::tools::ToolExecutor;
use crate::agent::types::{ChatReply, ConversationTurn};
use crate::providers::{InferenceProvider, InferenceRequest};

/// Substituted when the primary path produces an empty answer.
pub const EMPTY_ANSWER_APOLOGY: &str = "I apologize, but I couldn't generate a proper response. \
     Could you please rephrase your message or try again?";

/// Substituted when the fallback path produces an empty answer.
pub const FALLBACK_APOLOGY: &str = "I encountered an error and couldn't generate a proper \
     response. Please try again in a moment.";

/// Substituted when the tool-depth budget runs out.
pub const TOOL_BUDGET_APOLOGY: &str = "I wasn't able to finish researching that. Please try \
     asking again.";

/// Delimiters of the model's optional reasoning segment.
const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Drives one exchange against the model.
pub struct Orchestrator {
    inference: Arc<dyn InferenceProvider>,
    executor: ToolExecutor,
    primary_model: String,
    fallback_models: Vec<String>,
    max_tokens: u32,
    fallback_max_tokens: u32,
    max_tool_depth: usize,
    system_prompt: String,
    // Round-robin cursor over `fallback_models`; deterministic under test.
    fallback_cursor: AtomicUsize,
}

impl Orchestrator {
    /// Create an orchestrator from the shared config.
    #[must_use]
    pub fn new(
        inference: Arc<dyn InferenceProvider>,
        executor: ToolExecutor,
        config: &AgentConfig,
    ) -> Self {
        Self {
            inference,
            executor,
            primary_model: config.primary_model.clone(),
            fallback_models: config.fallback_models.clone(),
            max_tokens: config.max_tokens,
            fallback_max_tokens: config.fallback_max_tokens,
            max_tool_depth: config.max_tool_depth,
            system_prompt: default_system_prompt(),
            fallback_cursor: AtomicUsize::new(0),
        }
    }

    /// Replace the system instruction.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Run the exchange to a final answer.
    ///
    /// # Errors
    /// Tool failures (unknown tool, malformed arguments, search failure)
    /// are fatal to the exchange. A primary inference failure is not: it
    /// triggers exactly one fallback request, whose own failure propagates.
    pub async fn converse(
        &self,
        mut turns: Vec<ConversationTurn>,
        conversation_id: &str,
    ) -> Result<ChatReply, AgentError> {
        let tools = self.executor.schemas();
        let mut artifact = None;

        for round in 0..self.max_tool_depth {
            let request = InferenceRequest {
                model: self.primary_model.clone(),
                system_prompt: self.system_prompt.clone(),
                turns: turns.clone(),
                tools: tools.clone(),
                max_tokens: self.max_tokens,
            };

            let response = match self.inference.complete(request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("primary inference failed, falling back: {e}");
                    return self.fallback(turns, artifact).await;
                }
            };

            if response.tool_calls.is_empty() {
                return Ok(finish(&response.content, artifact, EMPTY_ANSWER_APOLOGY));
            }

            tracing::debug!(
                "round {round}: model requested {} tool call(s)",
                response.tool_calls.len()
            );
            let (results, round_artifact) = self
                .executor
                .execute_all(conversation_id, &response.tool_calls)
                .await?;
            if round_artifact.is_some() {
                artifact = round_artifact;
            }
            turns.push(ConversationTurn::assistant_tool_calls(response.tool_calls));
            turns.extend(results);
        }

        tracing::warn!("tool-call depth budget exhausted after {} rounds", self.max_tool_depth);
        Ok(ChatReply {
            answer: TOOL_BUDGET_APOLOGY.to_string(),
            thinking: None,
            artifact,
        })
    }

    /// One retry against the fallback pool, without tools.
    async fn fallback(
        &self,
        turns: Vec<ConversationTurn>,
        artifact: Option<Vec<u8>>,
    ) -> Result<ChatReply, AgentError> {
        let index = self.fallback_cursor.fetch_add(1, Ordering::Relaxed);
        let model = self
            .fallback_models
            .get(index % self.fallback_models.len().max(1))
            .cloned()
            .unwrap_or_else(|| self.primary_model.clone());
        tracing::info!("retrying with fallback model {model}");

        let request = InferenceRequest {
            model,
            system_prompt: self.system_prompt.clone(),
            turns,
            tools: Vec::new(),
            max_tokens: self.fallback_max_tokens,
        };
        let response = self.inference.complete(request).await?;
        Ok(finish(&response.content, artifact, FALLBACK_APOLOGY))
    }
}

/// Build the terminal reply: strip the reasoning segment and never return
/// an empty answer.
fn finish(content: &str, artifact: Option<Vec<u8>>, apology: &str) -> ChatReply {
    let (answer, thinking) = split_thinking(content);
    let answer = if answer.trim().is_empty() {
        apology.to_string()
    } else {
        answer.trim().to_string()
    };
    ChatReply {
        answer,
        thinking,
        artifact,
    }
}

/// Split a `<think>…</think>` prefix off the answer text.
fn split_thinking(content: &str) -> (&str, Option<String>) {
    let Some(close) = content.find(THINK_CLOSE) else {
        return (content, None);
    };
    let thinking = content[..close]
        .trim_start()
        .strip_prefix(THINK_OPEN)
        .unwrap_or(&content[..close])
        .trim();
    let answer = &content[close + THINK_CLOSE.len()..];
    (answer, Some(thinking.to_string()))
}

/// Fixed system instruction for the messaging assistant.
fn default_system_prompt() -> String {
    let today = chrono::Utc::now().format("%Y-%m-%d");
    format!(
        "You are a friendly, conversational AI assistant on a messaging platform. \
         Today's date is {today}.\n\n\
         Guidelines:\n\
         1. In group chats, messages are prefixed with the author in brackets, like \
         [+1234567890]. Use it to understand who is speaking, but never include such \
         markers in your answers.\n\
         2. [Image: description] means the user sent an actual image; treat it as \
         something you can see, not as second-hand text. [PDF: ...] means an actual \
         PDF was attached.\n\
         3. The platform does not render LaTeX. Use simple notation: * for \
         multiplication, / for division, ^ for exponents.\n\
         4. Always respond in the user's language, and keep answers brief and to the \
         point.\n\
         5. Users can type /clear to remove the conversation history.\n\
         6. Proactively use web search for current events, time-sensitive facts, and \
         claims worth verifying, and cite the sources."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::types::ToolCall;
    use crate::providers::{InferenceResponse, SearchProvider, SearchResult};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedInference {
        script: Mutex<VecDeque<Result<InferenceResponse, AgentError>>>,
        requests: Mutex<Vec<InferenceRequest>>,
    }

    impl ScriptedInference {
        fn new(script: Vec<Result<InferenceResponse, AgentError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().expect("lock").len()
        }

        fn request(&self, index: usize) -> InferenceRequest {
            self.requests.lock().expect("lock")[index].clone()
        }
    }

    #[async_trait]
    impl crate::providers::InferenceProvider for ScriptedInference {
        async fn complete(
            &self,
            request: InferenceRequest,
        ) -> Result<InferenceResponse, AgentError> {
            self.requests.lock().expect("lock").push(request);
            self.script
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(|| Err(AgentError::Inference("script exhausted".to_string())))
        }
    }

    struct StubSearch;

    #[async_trait]
    impl SearchProvider for StubSearch {
        async fn search(
            &self,
            query: &str,
            _country: &str,
        ) -> Result<Vec<SearchResult>, AgentError> {
            Ok(vec![SearchResult {
                title: query.to_string(),
                link: "https://example.com".to_string(),
                ..SearchResult::default()
            }])
        }
    }

    fn text_response(content: &str) -> Result<InferenceResponse, AgentError> {
        Ok(InferenceResponse {
            content: content.to_string(),
            tool_calls: Vec::new(),
        })
    }

    fn tool_response(name: &str) -> Result<InferenceResponse, AgentError> {
        Ok(InferenceResponse {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "call-1".to_string(),
                name: name.to_string(),
                arguments: r#"{"query": "weather"}"#.to_string(),
            }],
        })
    }

    fn orchestrator(
        script: Vec<Result<InferenceResponse, AgentError>>,
    ) -> (Orchestrator, Arc<ScriptedInference>) {
        let inference = ScriptedInference::new(script);
        let executor = ToolExecutor::new(
            Arc::new(StubSearch),
            None,
            None,
            Duration::from_millis(1),
        );
        let config = AgentConfig::default().with_max_tool_depth(3);
        let orchestrator = Orchestrator::new(
            Arc::clone(&inference) as Arc<dyn InferenceProvider>,
            executor,
            &config,
        );
        (orchestrator, inference)
    }

    fn user_turns(text: &str) -> Vec<ConversationTurn> {
        vec![ConversationTurn::user(vec![
            crate::agent::types::ContentPart::Text(text.to_string()),
        ])]
    }

    #[tokio::test]
    async fn test_plain_answer_needs_one_request() {
        let (orchestrator, inference) = orchestrator(vec![text_response("The answer is 5.")]);
        let reply = orchestrator
            .converse(user_turns("What's 2+3?"), "conv")
            .await
            .expect("reply");

        assert_eq!(reply.answer, "The answer is 5.");
        assert_eq!(inference.request_count(), 1);
        let request = inference.request(0);
        assert_eq!(request.model, AgentConfig::default().primary_model);
        assert!(!request.tools.is_empty());
    }

    #[tokio::test]
    async fn test_tool_loop_feeds_results_back() {
        let (orchestrator, inference) = orchestrator(vec![
            tool_response(crate::agent::tools::WEB_SEARCH),
            text_response("It is sunny, per example.com."),
        ]);
        let reply = orchestrator
            .converse(user_turns("weather?"), "conv")
            .await
            .expect("reply");

        assert_eq!(reply.answer, "It is sunny, per example.com.");
        assert_eq!(inference.request_count(), 2);
        let followup = inference.request(1);
        // Assistant tool-call turn plus the paired tool result were appended.
        assert_eq!(followup.turns.len(), 3);
        assert_eq!(
            followup.turns[2].tool_call_id.as_deref(),
            Some("call-1")
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fatal() {
        let (orchestrator, _) = orchestrator(vec![tool_response("drop_tables")]);
        let result = orchestrator.converse(user_turns("hi"), "conv").await;
        assert!(matches!(result, Err(AgentError::UnsupportedTool(_))));
    }

    #[tokio::test]
    async fn test_primary_failure_triggers_exactly_one_fallback() {
        let (orchestrator, inference) = orchestrator(vec![
            Err(AgentError::Inference("rate limited".to_string())),
            text_response(""),
        ]);
        let reply = orchestrator
            .converse(user_turns("hi"), "conv")
            .await
            .expect("reply");

        assert_eq!(reply.answer, FALLBACK_APOLOGY);
        assert_eq!(inference.request_count(), 2);
        let fallback = inference.request(1);
        assert!(fallback.tools.is_empty());
        assert_eq!(fallback.model, AgentConfig::default().fallback_models[0]);
        assert_eq!(
            fallback.max_tokens,
            AgentConfig::default().fallback_max_tokens
        );
    }

    #[tokio::test]
    async fn test_fallback_error_propagates() {
        let (orchestrator, inference) = orchestrator(vec![
            Err(AgentError::Inference("down".to_string())),
            Err(AgentError::Inference("also down".to_string())),
        ]);
        let result = orchestrator.converse(user_turns("hi"), "conv").await;
        assert!(result.is_err());
        assert_eq!(inference.request_count(), 2);
    }

    #[tokio::test]
    async fn test_fallback_models_rotate() {
        let pool = AgentConfig::default().fallback_models;
        let (orchestrator, inference) = orchestrator(vec![
            Err(AgentError::Inference("one".to_string())),
            text_response("ok"),
            Err(AgentError::Inference("two".to_string())),
            text_response("ok"),
        ]);
        orchestrator
            .converse(user_turns("a"), "conv")
            .await
            .expect("reply");
        orchestrator
            .converse(user_turns("b"), "conv")
            .await
            .expect("reply");
        assert_eq!(inference.request(1).model, pool[0]);
        assert_eq!(inference.request(3).model, pool[1]);
    }

    #[tokio::test]
    async fn test_empty_primary_answer_becomes_apology() {
        let (orchestrator, _) = orchestrator(vec![text_response("   ")]);
        let reply = orchestrator
            .converse(user_turns("hi"), "conv")
            .await
            .expect("reply");
        assert_eq!(reply.answer, EMPTY_ANSWER_APOLOGY);
    }

    #[tokio::test]
    async fn test_thinking_segment_is_stripped() {
        let (orchestrator, _) = orchestrator(vec![text_response(
            "<think>2+3 is simple addition</think>\n  The answer is 5.",
        )]);
        let reply = orchestrator
            .converse(user_turns("2+3?"), "conv")
            .await
            .expect("reply");
        assert_eq!(reply.answer, "The answer is 5.");
        assert_eq!(reply.thinking.as_deref(), Some("2+3 is simple addition"));
    }

    #[tokio::test]
    async fn test_endless_tool_requests_hit_the_depth_bound() {
        let script = (0..10)
            .map(|_| tool_response(crate::agent::tools::WEB_SEARCH))
            .collect();
        let (orchestrator, inference) = orchestrator(script);
        let reply = orchestrator
            .converse(user_turns("loop"), "conv")
            .await
            .expect("reply");

        assert_eq!(reply.answer, TOOL_BUDGET_APOLOGY);
        assert_eq!(inference.request_count(), 3);
    }

    #[test]
    fn test_split_thinking_without_segment() {
        let (answer, thinking) = split_thinking("plain answer");
        assert_eq!(answer, "plain answer");
        assert!(thinking.is_none());
    }
}
