//! The orchestration core.
//!
//! `AgentService` is the single entry point for an inbound platform
//! message. It runs the whole exchange under the per-conversation
//! admission guard: consent gate, live commands, history normalization,
//! the tool-call loop, and reply delivery.

pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod history;
pub mod orchestrator;
pub mod tools;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::agent::config::AgentConfig;
use crate::agent::error::AgentError;
use crate::agent::guard::ConversationGuard;
use crate::agent::history::{HistoryNormalizer, is_clear_command};
use crate::agent::orchestrator::Orchestrator;
use crate::agent::types::{ConversationContext, MessageKind, PlatformMessage};
use crate::providers::ChatPlatform;
use crate::store::{ConsentStore, ReminderStore, StatEvent, UsageStats, consent::CONSENT_NOTICE};

/// Sent when the pipeline fails for any reason.
pub const ERROR_REPLY: &str =
    "Sorry, I encountered an error processing your message. Please try again.";

/// Sent for message kinds the engine refuses to process.
pub const UNSUPPORTED_REPLY: &str = "Sorry, I can't process calls, videos, locations or group \
     invites. Text, voice notes, images and documents all work.";

/// Confirmation for a live `/clear` command.
pub const CLEAR_CONFIRMATION: &str = "Conversation history cleared. Let's start fresh!";

/// Every n-th reply to a non-whitelisted user carries the sponsor nudge.
const NUDGE_PERIOD: u64 = 10;

/// End-to-end message pipeline.
pub struct AgentService {
    config: AgentConfig,
    platform: Arc<dyn ChatPlatform>,
    guard: ConversationGuard,
    normalizer: HistoryNormalizer,
    orchestrator: Orchestrator,
    consent: Arc<ConsentStore>,
    stats: Arc<UsageStats>,
    reminders: Option<Arc<ReminderStore>>,
    sponsor_message: Option<String>,
    sponsor_whitelist: HashSet<String>,
    reply_counter: AtomicU64,
}

impl AgentService {
    /// Assemble the pipeline from its already-wired parts.
    #[must_use]
    pub fn new(
        config: AgentConfig,
        platform: Arc<dyn ChatPlatform>,
        normalizer: HistoryNormalizer,
        orchestrator: Orchestrator,
        consent: Arc<ConsentStore>,
        stats: Arc<UsageStats>,
    ) -> Self {
        let guard = ConversationGuard::new(config.guard.clone(), Arc::clone(&platform));
        Self {
            config,
            platform,
            guard,
            normalizer,
            orchestrator,
            consent,
            stats,
            reminders: None,
            sponsor_message: None,
            sponsor_whitelist: HashSet::new(),
            reply_counter: AtomicU64::new(0),
        }
    }

    /// Attach the reminder store so a live `/clear` also drops the
    /// conversation's pending reminders.
    #[must_use]
    pub fn with_reminder_store(mut self, reminders: Arc<ReminderStore>) -> Self {
        self.reminders = Some(reminders);
        self
    }

    /// Enable the periodic sponsor nudge, skipping whitelisted senders.
    #[must_use]
    pub fn with_sponsor_nudge(
        mut self,
        message: impl Into<String>,
        whitelist: HashSet<String>,
    ) -> Self {
        self.sponsor_message = Some(message.into());
        self.sponsor_whitelist = whitelist;
        self
    }

    /// Handle one inbound message end to end.
    ///
    /// Returns `true` if the message was admitted (group messages that do
    /// not mention the bot, busy conversations and quiet-period triggers
    /// are dropped). Pipeline failures never propagate: the sender gets a
    /// fixed error reply and the guard state is always released.
    pub async fn handle_message(&self, message: PlatformMessage) -> bool {
        if message.from_me {
            return false;
        }
        if message.is_group && !message.mentions_me {
            tracing::debug!(
                conversation = %message.conversation_id,
                "ignoring group message without mention"
            );
            return false;
        }

        self.guard
            .run_exclusive(&message.conversation_id, || async {
                if let Err(e) = self.respond(&message).await {
                    tracing::error!(
                        conversation = %message.conversation_id,
                        "pipeline failed: {e}"
                    );
                    if let Err(e) = self
                        .platform
                        .send_text(&message.conversation_id, ERROR_REPLY)
                        .await
                    {
                        tracing::error!("failed to deliver error reply: {e}");
                    }
                }
            })
            .await
    }

    async fn respond(&self, message: &PlatformMessage) -> Result<(), AgentError> {
        if !self.consent.has_accepted(&message.sender) {
            self.consent.mark_accepted(&message.sender)?;
            return self
                .platform
                .send_text(&message.conversation_id, CONSENT_NOTICE)
                .await;
        }

        if message.kind.is_unsupported() {
            return self
                .platform
                .send_text(&message.conversation_id, UNSUPPORTED_REPLY)
                .await;
        }

        if let Some(event) = stat_event(message.kind) {
            self.stats.record(&message.sender, event);
        }

        if message.kind == MessageKind::Text && is_clear_command(&message.body) {
            self.platform.clear_history(&message.conversation_id).await?;
            if let Some(reminders) = &self.reminders {
                reminders.clear_for(&message.conversation_id)?;
            }
            return self
                .platform
                .send_text(&message.conversation_id, CLEAR_CONFIRMATION)
                .await;
        }

        let history = self
            .platform
            .fetch_history(&message.conversation_id, self.config.history_limit)
            .await?;
        let ctx = ConversationContext {
            conversation_id: message.conversation_id.clone(),
            is_group: message.is_group,
        };
        let turns = self.normalizer.normalize(&history, &ctx).await;

        let reply = self
            .orchestrator
            .converse(turns, &message.conversation_id)
            .await?;

        if let Some(thinking) = &reply.thinking {
            tracing::debug!(
                conversation = %message.conversation_id,
                "model reasoning: {thinking}"
            );
        }

        if let Some(png) = &reply.artifact {
            self.platform
                .send_image(&message.conversation_id, png)
                .await?;
        }

        let mut answer = reply.answer;
        if let Some(nudge) = self.nudge_for(&message.sender) {
            answer.push_str("\n\n");
            answer.push_str(nudge);
        }
        self.platform
            .send_text(&message.conversation_id, &answer)
            .await
    }

    /// Deterministic nudge cadence: every `NUDGE_PERIOD`-th reply overall,
    /// unless the sender is whitelisted or the nudge is disabled.
    fn nudge_for(&self, sender: &str) -> Option<&str> {
        let message = self.sponsor_message.as_deref()?;
        if self.sponsor_whitelist.contains(sender) {
            return None;
        }
        let n = self.reply_counter.fetch_add(1, Ordering::Relaxed) + 1;
        (n % NUDGE_PERIOD == 0).then_some(message)
    }
}

const fn stat_event(kind: MessageKind) -> Option<StatEvent> {
    match kind {
        MessageKind::Text => Some(StatEvent::Message),
        MessageKind::Voice | MessageKind::Audio => Some(StatEvent::Audio),
        MessageKind::Image => Some(StatEvent::Image),
        MessageKind::Sticker => Some(StatEvent::Sticker),
        MessageKind::Document => Some(StatEvent::Document),
        MessageKind::Call
        | MessageKind::Video
        | MessageKind::Location
        | MessageKind::GroupInvite => None,
    }
}
