//! Console chat adapter for local runs.
//!
//! Keeps per-conversation history in memory and delivers replies to
//! stdout. Useful for driving the full pipeline without a real messaging
//! platform; also serves as the platform double in end-to-end tests.

// Printing is this adapter's delivery channel.
#![allow(clippy::print_stdout)]

use std::collections::HashMap;
use std::sync::Mutex;

use crate::agent::error::AgentError;
use crate::agent::types::PlatformMessage;
use crate::providers::ChatPlatform;

/// In-memory chat platform that prints replies to stdout.
#[derive(Default)]
pub struct ConsolePlatform {
    history: Mutex<HashMap<String, Vec<PlatformMessage>>>,
}

impl ConsolePlatform {
    /// Create an empty console platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an inbound message so it shows up in fetched history.
    pub fn record_incoming(&self, message: PlatformMessage) {
        if let Ok(mut history) = self.history.lock() {
            history
                .entry(message.conversation_id.clone())
                .or_default()
                .push(message);
        }
    }

    fn record_outgoing(&self, conversation_id: &str, text: &str) {
        let mut message = PlatformMessage::text(conversation_id, "assistant", text);
        message.from_me = true;
        self.record_incoming(message);
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<PlatformMessage>>>, AgentError>
    {
        self.history
            .lock()
            .map_err(|_| AgentError::Platform("console history poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl ChatPlatform for ConsolePlatform {
    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<(), AgentError> {
        println!("{text}");
        self.record_outgoing(conversation_id, text);
        Ok(())
    }

    async fn send_image(&self, _conversation_id: &str, png: &[u8]) -> Result<(), AgentError> {
        println!("[image attachment, {} bytes]", png.len());
        Ok(())
    }

    async fn fetch_history(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<PlatformMessage>, AgentError> {
        let history = self.lock()?;
        let messages = history
            .get(conversation_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        // Stored oldest first; callers expect newest first.
        Ok(messages
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn set_typing(&self, _conversation_id: &str) -> Result<(), AgentError> {
        Ok(())
    }

    async fn clear_typing(&self, _conversation_id: &str) -> Result<(), AgentError> {
        Ok(())
    }

    async fn clear_history(&self, conversation_id: &str) -> Result<(), AgentError> {
        self.lock()?.remove(conversation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_history_newest_first_with_limit() {
        let platform = ConsolePlatform::new();
        for body in ["one", "two", "three"] {
            platform.record_incoming(PlatformMessage::text("conv", "user", body));
        }

        let history = platform.fetch_history("conv", 2).await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].body, "three");
        assert_eq!(history[1].body, "two");
    }

    #[tokio::test]
    async fn test_replies_recorded_as_own() {
        let platform = ConsolePlatform::new();
        platform.send_text("conv", "hello").await.expect("send");

        let history = platform.fetch_history("conv", 10).await.expect("history");
        assert!(history[0].from_me);
        assert_eq!(history[0].body, "hello");
    }

    #[tokio::test]
    async fn test_clear_history() {
        let platform = ConsolePlatform::new();
        platform.record_incoming(PlatformMessage::text("conv", "user", "hi"));
        platform.clear_history("conv").await.expect("clear");
        assert!(platform.fetch_history("conv", 10).await.expect("history").is_empty());
    }
}
