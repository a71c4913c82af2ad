//! Thin JSON-file persistence wrappers.
//!
//! None of these are a source of truth for answers; every store degrades
//! to an empty state when its file is missing or unreadable.

pub mod consent;
pub mod reminders;
pub mod stats;

pub use consent::ConsentStore;
pub use reminders::ReminderStore;
pub use stats::{StatEvent, UsageStats};
