use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StabilityLevel {
    VeryStable,
    Stable,
    Moderate,
    Unstable,
    VeryUnstable,
}

impl StabilityLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            StabilityLevel::VeryStable
        } else if score >= 0.75 {
            StabilityLevel::Stable
        } else if score >= 0.5 {
            StabilityLevel::Moderate
        } else if score >= 0.25 {
            StabilityLevel::Unstable
        } else {
            StabilityLevel::VeryUnstable
        }
    }
}

/// Track record of one locator. `score` and `level` are derived and get
/// recomputed by every mutator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatorStabilityEntry {
    pub locator: String,
    successes: u64,
    failures: u64,
    heals: u64,
    score: f64,
    level: StabilityLevel,
}

impl LocatorStabilityEntry {
    pub fn new(locator: impl Into<String>) -> Self {
        let mut entry = Self {
            locator: locator.into(),
            successes: 0,
            failures: 0,
            heals: 0,
            score: 1.0,
            level: StabilityLevel::VeryStable,
        };
        entry.recompute();
        entry
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn heals(&self) -> u64 {
        self.heals
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn level(&self) -> StabilityLevel {
        self.level
    }

    pub fn record_success(&mut self) {
        self.successes += 1;
        self.recompute();
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
        self.recompute();
    }

    /// A heal lowers stability even when it worked: the locator needed help.
    pub fn record_heal(&mut self) {
        self.heals += 1;
        self.recompute();
    }

    fn recompute(&mut self) {
        let numerator = self.successes as f64 + 1.0;
        let denominator =
            self.successes as f64 + 2.0 * self.failures as f64 + self.heals as f64 + 1.0;
        self.score = numerator / denominator;
        self.level = StabilityLevel::from_score(self.score);
    }

    /// Entries read from disk carry whatever score was written; recompute.
    pub(crate) fn normalized(mut self) -> Self {
        self.recompute();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StabilitySummary {
    pub counts: BTreeMap<StabilityLevel, usize>,
    pub total: usize,
}

impl StabilitySummary {
    pub fn count(&self, level: StabilityLevel) -> usize {
        self.counts.get(&level).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
pub struct StabilityTracker {
    entries: HashMap<String, LocatorStabilityEntry>,
}

impl StabilityTracker {
    pub fn entry(&mut self, locator: &str) -> &mut LocatorStabilityEntry {
        self.entries
            .entry(locator.to_string())
            .or_insert_with(|| LocatorStabilityEntry::new(locator))
    }

    pub fn get(&self, locator: &str) -> Option<&LocatorStabilityEntry> {
        self.entries.get(locator)
    }

    pub fn entries(&self) -> Vec<LocatorStabilityEntry> {
        let mut all: Vec<_> = self.entries.values().cloned().collect();
        all.sort_by(|a, b| a.locator.cmp(&b.locator));
        all
    }

    pub fn replace(&mut self, entry: LocatorStabilityEntry) {
        let entry = entry.normalized();
        self.entries.insert(entry.locator.clone(), entry);
    }

    pub fn summary(&self) -> StabilitySummary {
        let mut summary = StabilitySummary::default();
        for entry in self.entries.values() {
            *summary.counts.entry(entry.level()).or_default() += 1;
            summary.total += 1;
        }
        summary
    }
}
