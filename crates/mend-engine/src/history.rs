use crate::cache::RememberedHeal;
use crate::guardrail::{BlacklistEntry, LocatorStabilityEntry};
use chrono::{DateTime, Utc};
use mend_common::HealProposal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealStatus {
    Pending,
    Accepted,
    Rejected,
    Blacklisted,
}

impl HealStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HealStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub feature: String,
    pub scenario: String,
    pub step: String,
    pub original_locator: String,
    pub healed_locator: String,
    pub confidence: f64,
    pub reasoning: String,
    pub status: HealStatus,
}

impl HealRecord {
    pub fn pending(proposal: &HealProposal) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            feature: proposal.feature.clone(),
            scenario: proposal.scenario.clone(),
            step: proposal.step.clone(),
            original_locator: proposal.original_locator.to_string(),
            healed_locator: proposal.proposed_locator.to_string(),
            confidence: proposal.confidence,
            reasoning: proposal.reasoning.clone(),
            status: HealStatus::Pending,
        }
    }
}

/// Append-only record of heal proposals. A record leaves `Pending` once and
/// never changes status again.
#[derive(Debug, Default)]
pub struct HealHistory {
    records: Mutex<Vec<HealRecord>>,
}

impl HealHistory {
    fn lock(&self) -> MutexGuard<'_, Vec<HealRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, record: HealRecord) -> Uuid {
        let id = record.id;
        self.lock().push(record);
        id
    }

    /// Move a pending record to a terminal status. Returns false when the
    /// record is unknown or already settled.
    pub fn settle(&self, id: Uuid, status: HealStatus) -> bool {
        if !status.is_terminal() {
            return false;
        }
        let mut records = self.lock();
        match records.iter_mut().find(|r| r.id == id) {
            Some(record) if record.status == HealStatus::Pending => {
                record.status = status;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: Uuid) -> Option<HealRecord> {
        self.lock().iter().find(|r| r.id == id).cloned()
    }

    pub fn records(&self) -> Vec<HealRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Add records not already present (matched by id).
    pub fn merge(&self, incoming: Vec<HealRecord>) {
        let mut records = self.lock();
        for record in incoming {
            if !records.iter().any(|r| r.id == record.id) {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.timestamp);
    }
}

/// Everything the engine persists between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionLog {
    #[serde(default)]
    pub history: Vec<HealRecord>,
    #[serde(default)]
    pub blacklist: Vec<BlacklistEntry>,
    #[serde(default)]
    pub stability: Vec<LocatorStabilityEntry>,
    #[serde(default)]
    pub remembered: Vec<RememberedHeal>,
}

impl DecisionLog {
    pub async fn save(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
            && !dir.exists()
        {
            fs::create_dir_all(dir).await?;
        }
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml).await?;
        Ok(())
    }

    /// A missing file is an empty log.
    pub async fn load(path: &Path) -> Result<Self, StorageError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).await?;
        Ok(serde_yaml::from_str(&content)?)
    }
}
