//! Per-country usage counters.
//!
//! Best-effort telemetry: counters are bumped per inbound message and
//! flushed to a JSON file. Failures are logged and never surface to the
//! pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::country;

/// Kind of usage event being counted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatEvent {
    /// Plain text message.
    Message,
    /// Voice or audio message.
    Audio,
    /// Image message.
    Image,
    /// Sticker message.
    Sticker,
    /// Document message.
    Document,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct CountryStats {
    messages: u64,
    audios: u64,
    images: u64,
    stickers: u64,
    documents: u64,
}

impl CountryStats {
    fn bump(&mut self, event: StatEvent) {
        match event {
            StatEvent::Message => self.messages += 1,
            StatEvent::Audio => self.audios += 1,
            StatEvent::Image => self.images += 1,
            StatEvent::Sticker => self.stickers += 1,
            StatEvent::Document => self.documents += 1,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Totals {
    totals: CountryStats,
    by_country: BTreeMap<String, CountryStats>,
}

/// On-disk usage counters, grouped by sender country.
pub struct UsageStats {
    path: PathBuf,
    inner: Mutex<Totals>,
}

impl UsageStats {
    /// Open (or create) the stats file. Unreadable or corrupt files reset
    /// the counters.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let inner = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(totals) => totals,
                Err(e) => {
                    tracing::warn!("corrupt stats file, resetting counters: {e}");
                    Totals::default()
                }
            },
            Err(_) => Totals::default(),
        };
        Self {
            path,
            inner: Mutex::new(inner),
        }
    }

    /// Count one event for the sender's country (falls back to `"??"` when
    /// the country cannot be derived from the identifier).
    pub fn record(&self, sender: &str, event: StatEvent) {
        let country = country::from_phone(sender).unwrap_or("??");
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.totals.bump(event);
        inner.by_country.entry(country.to_string()).or_default().bump(event);

        let result = serde_json::to_string_pretty(&*inner)
            .map_err(std::io::Error::other)
            .and_then(|json| std::fs::write(&self.path, json));
        if let Err(e) = result {
            tracing::warn!("failed to write stats: {e}");
        }
    }

    /// Total counted messages of any kind.
    #[must_use]
    pub fn total_events(&self) -> u64 {
        self.inner
            .lock()
            .map(|inner| {
                let t = &inner.totals;
                t.messages + t.audios + t.images + t.stickers + t.documents
            })
            .unwrap_or(0)
    }
}
