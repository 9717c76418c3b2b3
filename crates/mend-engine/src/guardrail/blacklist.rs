use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub original_locator: String,
    pub healed_locator: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Permanently rejected (original → healed) pairs. Entries are never removed.
#[derive(Debug, Default)]
pub struct Blacklist {
    entries: HashMap<(String, String), BlacklistEntry>,
}

impl Blacklist {
    pub fn contains(&self, original: &str, healed: &str) -> bool {
        self.entries
            .contains_key(&(original.to_string(), healed.to_string()))
    }

    /// Returns false when the pair was already present; the first reason is kept.
    pub fn insert(&mut self, entry: BlacklistEntry) -> bool {
        let key = (entry.original_locator.clone(), entry.healed_locator.clone());
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, entry);
        true
    }

    pub fn entries(&self) -> Vec<BlacklistEntry> {
        let mut all: Vec<_> = self.entries.values().cloned().collect();
        all.sort_by_key(|e| e.timestamp);
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
