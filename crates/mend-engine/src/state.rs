use crate::cache::HealCache;
use crate::config::{ConfigError, HealConfig};
use crate::guardrail::{Guardrails, StabilitySummary};
use crate::history::{DecisionLog, HealHistory, StorageError};
use std::path::Path;
use tracing::info;

/// State shared by every engine of a run: guardrails, the heal cache and
/// heal history. Build one, wrap it in an `Arc` and hand it to each engine.
#[derive(Debug)]
pub struct HealState {
    pub guardrails: Guardrails,
    pub cache: HealCache,
    pub history: HealHistory,
}

impl HealState {
    pub fn new(config: &HealConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            guardrails: Guardrails::new(&config.guardrails)?,
            cache: HealCache::new(),
            history: HealHistory::default(),
        })
    }

    pub fn stability_summary(&self) -> StabilitySummary {
        self.guardrails.stability_summary()
    }

    /// Blacklist a heal pair and drop any remembered heal that applies it.
    pub fn blacklist(&self, original: &str, healed: &str, reason: &str) {
        self.guardrails.blacklist(original, healed, reason);
        self.cache.forget_pair(original, healed);
    }

    /// Forget every remembered heal.
    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Heal cache cleared");
    }

    pub fn export_decisions(&self) -> DecisionLog {
        DecisionLog {
            history: self.history.records(),
            blacklist: self.guardrails.blacklist_entries(),
            stability: self.guardrails.stability_entries(),
            remembered: self.cache.remembered(),
        }
    }

    pub fn import_decisions(&self, log: DecisionLog) {
        let DecisionLog {
            history,
            blacklist,
            stability,
            remembered,
        } = log;
        info!(
            history = history.len(),
            blacklist = blacklist.len(),
            stability = stability.len(),
            remembered = remembered.len(),
            "Importing heal decisions"
        );
        self.history.merge(history);
        self.guardrails.restore(blacklist, stability);
        for heal in remembered {
            self.cache.remember(heal);
        }
        for entry in self.guardrails.blacklist_entries() {
            self.cache
                .forget_pair(&entry.original_locator, &entry.healed_locator);
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), StorageError> {
        self.export_decisions().save(path).await?;
        info!(path = %path.display(), "Heal decisions saved");
        Ok(())
    }

    pub async fn load(&self, path: &Path) -> Result<(), StorageError> {
        let log = DecisionLog::load(path).await?;
        self.import_decisions(log);
        Ok(())
    }
}
