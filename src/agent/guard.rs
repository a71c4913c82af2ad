//! Per-conversation admission guard.
//!
//! Chat semantics, not request semantics: at most one in-flight reply per
//! conversation, and rapid duplicate triggers inside the quiet period are
//! dropped rather than queued. Admitted tasks get a typing signal and a
//! short pacing delay before they run.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::agent::config::GuardConfig;
use crate::providers::ChatPlatform;

#[derive(Debug, Default)]
struct GuardState {
    busy: bool,
    last_reply_at: Option<Instant>,
}

/// Serializes and deduplicates replies per conversation.
pub struct ConversationGuard {
    config: GuardConfig,
    platform: Arc<dyn ChatPlatform>,
    states: DashMap<String, GuardState>,
}

impl ConversationGuard {
    /// Create a guard that signals typing through `platform`.
    #[must_use]
    pub fn new(config: GuardConfig, platform: Arc<dyn ChatPlatform>) -> Self {
        Self {
            config,
            platform,
            states: DashMap::new(),
        }
    }

    /// Run `task` exclusively for `conversation_id`.
    ///
    /// Returns `true` if the task ran. Dropped triggers (conversation busy,
    /// or still inside the quiet period after the previous reply) return
    /// `false` immediately; there is no queueing.
    ///
    /// The busy flag is cleared on every exit path, task failure included;
    /// the task itself reports its errors, this method only sequences it.
    pub async fn run_exclusive<F, Fut>(&self, conversation_id: &str, task: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        {
            let mut state = self
                .states
                .entry(conversation_id.to_string())
                .or_default();
            if state.busy {
                tracing::debug!("dropping trigger for busy conversation {conversation_id}");
                return false;
            }
            if let Some(last) = state.last_reply_at {
                if last.elapsed() < self.config.quiet_period {
                    tracing::debug!(
                        "dropping duplicate trigger for {conversation_id} inside quiet period"
                    );
                    return false;
                }
            }
            state.busy = true;
        }

        if let Err(e) = self.platform.set_typing(conversation_id).await {
            tracing::warn!("failed to signal typing: {e}");
        }
        tokio::time::sleep(self.config.typing_delay).await;

        task().await;

        if let Err(e) = self.platform.clear_typing(conversation_id).await {
            tracing::warn!("failed to clear typing: {e}");
        }

        if let Some(mut state) = self.states.get_mut(conversation_id) {
            state.busy = false;
            state.last_reply_at = Some(Instant::now());
        }
        true
    }
}
