//! Consent-acceptance record.
//!
//! Keyed by a one-way hash of the user identifier; the raw identifier is
//! never written to disk.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::agent::error::AgentError;

/// First-contact notice shown before the engine starts replying.
pub const CONSENT_NOTICE: &str = "*Privacy Notice*\n\n\
Before we continue:\n\
1. Your identifier is never stored in its original form, only a one-way hash.\n\
2. Your messages are processed to generate replies but not permanently stored.\n\
3. Nothing is shared with third parties.\n\n\
By continuing to use this bot you accept these terms. Type /clear at any time \
to remove the conversation history. You can now ask your question again.";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ConsentRecord {
    accepted: bool,
    timestamp: DateTime<Utc>,
}

/// On-disk record of which users have seen and accepted the notice.
pub struct ConsentStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, ConsentRecord>>,
}

impl ConsentStore {
    /// Open (or create) the store at `path`. An unreadable or corrupt file
    /// degrades to an empty store.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!("corrupt consent store, starting empty: {e}");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            records: Mutex::new(records),
        }
    }

    /// Whether this user has already accepted the notice.
    #[must_use]
    pub fn has_accepted(&self, user_id: &str) -> bool {
        let key = hash_user_id(user_id);
        self.records
            .lock()
            .map(|records| records.get(&key).is_some_and(|r| r.accepted))
            .unwrap_or(false)
    }

    /// Record acceptance for this user.
    ///
    /// # Errors
    /// Returns an error if the record cannot be written to disk.
    pub fn mark_accepted(&self, user_id: &str) -> Result<(), AgentError> {
        let key = hash_user_id(user_id);
        let snapshot = {
            let mut records = self
                .records
                .lock()
                .map_err(|_| AgentError::Platform("consent store poisoned".to_string()))?;
            records.insert(
                key,
                ConsentRecord {
                    accepted: true,
                    timestamp: Utc::now(),
                },
            );
            serde_json::to_string_pretty(&*records)?
        };
        std::fs::write(&self.path, snapshot)?;
        Ok(())
    }
}

fn hash_user_id(user_id: &str) -> String {
    hex::encode(Sha256::digest(user_id.as_bytes()))
}
