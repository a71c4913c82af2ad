//! Reminder persistence and delivery.
//!
//! Reminders are set through the `set_reminder` tool, stored as a JSON
//! list, and delivered by a 60-second sweep. Delivered reminders are
//! dropped from the list.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::error::AgentError;
use crate::providers::ChatPlatform;

/// Sweep period for due reminders.
const CHECK_PERIOD: Duration = Duration::from_secs(60);

/// One pending reminder.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reminder {
    /// Reminder id.
    pub id: Uuid,
    /// Conversation to deliver into.
    pub conversation_id: String,
    /// What to remind about.
    pub message: String,
    /// When the reminder is due.
    pub due_at: DateTime<Utc>,
}

/// On-disk reminder list.
pub struct ReminderStore {
    path: PathBuf,
    reminders: Mutex<Vec<Reminder>>,
}

impl ReminderStore {
    /// Open (or create) the store at `path`. Unreadable or corrupt files
    /// degrade to an empty list.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let reminders = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(reminders) => reminders,
                Err(e) => {
                    tracing::warn!("corrupt reminder store, starting empty: {e}");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self {
            path,
            reminders: Mutex::new(reminders),
        }
    }

    /// Add a reminder and return the confirmation text fed back to the
    /// model as the tool result.
    ///
    /// # Errors
    /// Returns an error for a malformed duration or a failed write.
    pub fn add(
        &self,
        conversation_id: &str,
        message: &str,
        duration: &str,
    ) -> Result<String, AgentError> {
        let delay = parse_duration(duration)?;
        let reminder = Reminder {
            id: Uuid::new_v4(),
            conversation_id: conversation_id.to_string(),
            message: message.to_string(),
            due_at: Utc::now()
                + chrono::Duration::from_std(delay)
                    .map_err(|_| AgentError::InvalidDuration(duration.to_string()))?,
        };
        {
            let mut reminders = self.lock()?;
            reminders.push(reminder);
            self.persist(&reminders)?;
        }
        Ok(format!(
            "Reminder set! I'll remind you about \"{message}\" in {}.",
            format_time_left(delay)
        ))
    }

    /// Remove every reminder belonging to a conversation.
    ///
    /// # Errors
    /// Returns an error if the updated list cannot be written.
    pub fn clear_for(&self, conversation_id: &str) -> Result<(), AgentError> {
        let mut reminders = self.lock()?;
        reminders.retain(|r| r.conversation_id != conversation_id);
        self.persist(&reminders)
    }

    /// Drain every reminder due at or before `now`.
    #[must_use]
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<Reminder> {
        let Ok(mut reminders) = self.reminders.lock() else {
            return Vec::new();
        };
        let (due, pending): (Vec<_>, Vec<_>) =
            reminders.drain(..).partition(|r| r.due_at <= now);
        *reminders = pending;
        if !due.is_empty() {
            if let Err(e) = self.persist(&reminders) {
                tracing::warn!("failed to persist reminder list: {e}");
            }
        }
        due
    }

    /// Number of pending reminders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reminders.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether no reminders are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the delivery sweep: every minute, send due reminders through
    /// the platform.
    pub fn spawn_checker(
        self: &Arc<Self>,
        platform: Arc<dyn ChatPlatform>,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CHECK_PERIOD);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                for reminder in store.take_due(Utc::now()) {
                    let text = format!("*Reminder*\n{}", reminder.message);
                    if let Err(e) = platform
                        .send_text(&reminder.conversation_id, &text)
                        .await
                    {
                        tracing::warn!("failed to deliver reminder {}: {e}", reminder.id);
                    }
                }
            }
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Reminder>>, AgentError> {
        self.reminders
            .lock()
            .map_err(|_| AgentError::Platform("reminder store poisoned".to_string()))
    }

    fn persist(&self, reminders: &[Reminder]) -> Result<(), AgentError> {
        let json = serde_json::to_string_pretty(reminders)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Parse a duration in the `1d` / `2h` / `30m` grammar.
///
/// # Errors
/// Returns `AgentError::InvalidDuration` for anything else.
pub fn parse_duration(input: &str) -> Result<Duration, AgentError> {
    let pattern = Regex::new(r"^(\d+)([dhm])$")?;
    let normalized = input.trim().to_lowercase();
    let captures = pattern
        .captures(normalized.as_str())
        .ok_or_else(|| AgentError::InvalidDuration(input.to_string()))?;
    let amount: u64 = captures[1]
        .parse()
        .map_err(|_| AgentError::InvalidDuration(input.to_string()))?;
    let seconds = match &captures[2] {
        "d" => amount * 24 * 60 * 60,
        "h" => amount * 60 * 60,
        _ => amount * 60,
    };
    Ok(Duration::from_secs(seconds))
}

/// Human form of a delay, e.g. "1 day, 2 hours, 30 minutes".
fn format_time_left(delay: Duration) -> String {
    let mut seconds = delay.as_secs();
    let days = seconds / 86_400;
    seconds %= 86_400;
    let hours = seconds / 3_600;
    seconds %= 3_600;
    let minutes = seconds / 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days} day{}", plural(days)));
    }
    if hours > 0 {
        parts.push(format!("{hours} hour{}", plural(hours)));
    }
    if minutes > 0 {
        parts.push(format!("{minutes} minute{}", plural(minutes)));
    }
    if parts.is_empty() {
        parts.push("less than a minute".to_string());
    }
    parts.join(", ")
}

const fn plural(n: u64) -> &'static str {
    if n == 1 { "" } else { "s" }
}
